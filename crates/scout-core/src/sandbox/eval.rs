//! Tree-walking evaluator
//!
//! Only the whitelisted primitives are callable and the only outside data is
//! the map of input values.

use super::parser::{BinaryOp, Expr, Stmt};
use super::SandboxError;
use crate::collaborators::CalculationInputs;
use once_cell::sync::Lazy;
use regex::Regex;
use scout_graph::NodeId;
use std::collections::HashMap;

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number pattern is valid"));

/// Name under which the input map is visible to code
const INPUTS_NAME: &str = "input_data";
/// Binding read as the calculation result
const RESULT_NAME: &str = "result";
/// Nested evaluations of one expression tree
const MAX_EVAL_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Value {
    Number(f64),
    Text(String),
    List(Vec<Value>),
    Inputs,
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Text(_) => "string",
            Self::List(_) => "list",
            Self::Inputs => "input map",
        }
    }

    fn into_json(self) -> Result<serde_json::Value, SandboxError> {
        match self {
            Self::Number(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .ok_or(SandboxError::NonFinite),
            Self::Text(s) => Ok(serde_json::Value::String(s)),
            Self::List(items) => items
                .into_iter()
                .map(Value::into_json)
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array),
            Self::Inputs => Err(SandboxError::Type(format!(
                "{INPUTS_NAME} cannot be the result"
            ))),
        }
    }
}

pub(super) struct Evaluator<'a> {
    inputs: &'a CalculationInputs,
    env: HashMap<String, Value>,
    coerced: HashMap<String, f64>,
    depth: usize,
    pub(super) warnings: Vec<String>,
}

impl<'a> Evaluator<'a> {
    pub(super) fn new(inputs: &'a CalculationInputs) -> Self {
        Self {
            inputs,
            env: HashMap::new(),
            coerced: HashMap::new(),
            depth: 0,
            warnings: Vec::new(),
        }
    }

    /// Run every statement and produce the result value
    pub(super) fn run(&mut self, program: &[Stmt]) -> Result<serde_json::Value, SandboxError> {
        let mut last = None;
        for stmt in program {
            match stmt {
                Stmt::Assign(name, expr) => {
                    if name == INPUTS_NAME {
                        return Err(SandboxError::Type(format!("cannot assign to {INPUTS_NAME}")));
                    }
                    let value = self.eval(expr)?;
                    self.env.insert(name.clone(), value);
                    last = None;
                }
                Stmt::Expr(expr) => last = Some(self.eval(expr)?),
            }
        }
        let result = self
            .env
            .remove(RESULT_NAME)
            .or(last)
            .ok_or(SandboxError::MissingResult)?;
        result.into_json()
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, SandboxError> {
        if self.depth == MAX_EVAL_DEPTH {
            return Err(SandboxError::TooComplex {
                limit: "evaluation depth",
                max: MAX_EVAL_DEPTH,
            });
        }
        self.depth += 1;
        let value = self.eval_node(expr);
        self.depth -= 1;
        value
    }

    fn eval_node(&mut self, expr: &Expr) -> Result<Value, SandboxError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Text(s) => Ok(Value::Text(s.clone())),
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Expr::Neg(inner) => Ok(Value::Number(-self.number(inner)?)),
            Expr::Binary(op, left, right) => {
                let left = self.number(left)?;
                let right = self.number(right)?;
                binary(*op, left, right).map(Value::Number)
            }
            Expr::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Self::call(name, args)
            }
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                self.index(target, index)
            }
        }
    }

    fn number(&mut self, expr: &Expr) -> Result<f64, SandboxError> {
        match self.eval(expr)? {
            Value::Number(n) => Ok(n),
            other => Err(SandboxError::Type(format!(
                "expected a number, found {}",
                other.type_name()
            ))),
        }
    }

    fn lookup(&mut self, name: &str) -> Result<Value, SandboxError> {
        if let Some(value) = self.env.get(name) {
            return Ok(value.clone());
        }
        if name == INPUTS_NAME {
            return Ok(Value::Inputs);
        }
        if self.inputs.contains_key(&NodeId::new(name)) {
            return self.input(name).map(Value::Number);
        }
        Err(SandboxError::UnknownName(name.to_string()))
    }

    fn index(&mut self, target: Value, index: Value) -> Result<Value, SandboxError> {
        match (target, index) {
            (Value::Inputs, Value::Text(id)) => self.input(&id).map(Value::Number),
            (Value::List(items), Value::Number(i)) => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                let i = i as i64;
                let len = items.len() as i64;
                let at = if i < 0 { len + i } else { i };
                usize::try_from(at)
                    .ok()
                    .and_then(|at| items.into_iter().nth(at))
                    .ok_or(SandboxError::IndexOutOfRange(i))
            }
            (target, index) => Err(SandboxError::Type(format!(
                "cannot index {} with {}",
                target.type_name(),
                index.type_name()
            ))),
        }
    }

    /// Numeric value of an input node
    fn input(&mut self, id: &str) -> Result<f64, SandboxError> {
        if let Some(&n) = self.coerced.get(id) {
            return Ok(n);
        }
        let inputs = self.inputs;
        let raw = match inputs.get(&NodeId::new(id)) {
            None => return Err(SandboxError::UnknownInput(id.to_string())),
            Some(None) => return Err(SandboxError::MissingInput(id.to_string())),
            Some(Some(raw)) => raw,
        };
        let (n, exact) = coerce(raw).ok_or_else(|| SandboxError::NonNumeric {
            input: id.to_string(),
            raw: raw.clone(),
        })?;
        if !exact {
            self.warnings
                .push(format!("input {id} read as {n} from {raw:?}"));
        }
        self.coerced.insert(id.to_string(), n);
        Ok(n)
    }

    fn call(name: &str, args: Vec<Value>) -> Result<Value, SandboxError> {
        let arity = |expected: &'static str| SandboxError::Arity {
            function: name.to_string(),
            expected,
            found: args.len(),
        };
        let value = match (name, args.as_slice()) {
            ("abs", [Value::Number(n)]) => n.abs(),
            ("float", [Value::Number(n)]) => *n,
            ("float", [Value::Text(s)]) => text_number(s)?,
            ("int", [Value::Number(n)]) => n.trunc(),
            ("int", [Value::Text(s)]) => text_number(s)?.trunc(),
            ("len", [Value::List(items)]) => count(items.len()),
            ("len", [Value::Text(s)]) => count(s.chars().count()),
            ("pow", [Value::Number(base), Value::Number(exp)]) => base.powf(*exp),
            ("round", [Value::Number(n)]) => round_half_even(*n),
            ("round", [Value::Number(n), Value::Number(digits)]) => {
                #[allow(clippy::cast_possible_truncation)]
                let scale = 10f64.powi(*digits as i32);
                round_half_even(n * scale) / scale
            }
            ("sum", [Value::List(items)]) => numbers(items)?.iter().sum(),
            ("max" | "min", [Value::List(items)]) => extremum(name, &numbers(items)?)?,
            ("max" | "min", [_, _, ..]) => extremum(name, &numbers(&args)?)?,
            ("abs" | "float" | "int" | "len" | "round" | "sum" | "max" | "min", [_]) => {
                return Err(SandboxError::Type(format!(
                    "{name}() does not accept {}",
                    args[0].type_name()
                )))
            }
            ("abs" | "float" | "int" | "len" | "sum", _) => return Err(arity("1")),
            ("round", _) => return Err(arity("1 or 2")),
            ("pow", _) => return Err(arity("2 numbers")),
            ("max" | "min", _) => return Err(arity("at least 1")),
            _ => return Err(SandboxError::UnknownFunction(name.to_string())),
        };
        Ok(Value::Number(value))
    }
}

fn binary(op: BinaryOp, left: f64, right: f64) -> Result<f64, SandboxError> {
    let zero_check = || {
        if right == 0.0 {
            Err(SandboxError::DivisionByZero)
        } else {
            Ok(())
        }
    };
    Ok(match op {
        BinaryOp::Add => left + right,
        BinaryOp::Sub => left - right,
        BinaryOp::Mul => left * right,
        BinaryOp::Div => {
            zero_check()?;
            left / right
        }
        BinaryOp::FloorDiv => {
            zero_check()?;
            (left / right).floor()
        }
        BinaryOp::Rem => {
            zero_check()?;
            left - right * (left / right).floor()
        }
        BinaryOp::Pow => left.powf(right),
    })
}

/// First numeric token of a free-form value, ignoring `$` and `,`
///
/// The flag is false when the value held more than the number.
fn coerce(raw: &str) -> Option<(f64, bool)> {
    let cleaned: String = raw.chars().filter(|c| *c != '$' && *c != ',').collect();
    let found = NUMBER.find(&cleaned)?;
    let n = found.as_str().parse().ok()?;
    Some((n, found.as_str() == cleaned.trim()))
}

fn text_number(s: &str) -> Result<f64, SandboxError> {
    coerce(s).map(|(n, _)| n).ok_or_else(|| SandboxError::NonNumeric {
        input: "literal".to_string(),
        raw: s.to_string(),
    })
}

fn numbers(items: &[Value]) -> Result<Vec<f64>, SandboxError> {
    items
        .iter()
        .map(|item| match item {
            Value::Number(n) => Ok(*n),
            other => Err(SandboxError::Type(format!(
                "expected numbers, found {}",
                other.type_name()
            ))),
        })
        .collect()
}

fn extremum(name: &str, values: &[f64]) -> Result<f64, SandboxError> {
    let fold = if name == "max" { f64::max } else { f64::min };
    values
        .iter()
        .copied()
        .reduce(fold)
        .ok_or_else(|| SandboxError::Type(format!("{name}() of an empty list")))
}

#[allow(clippy::cast_precision_loss)]
fn count(n: usize) -> f64 {
    n as f64
}

fn round_half_even(n: f64) -> f64 {
    let rounded = n.round();
    if (n - n.trunc()).abs() == 0.5 {
        2.0 * (n / 2.0).round()
    } else {
        rounded
    }
}

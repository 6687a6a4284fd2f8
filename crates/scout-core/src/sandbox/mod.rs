//! Calculation sandbox
//!
//! Executes synthesized calculation code in a small expression language with
//! no access to anything but the input values:
//! - `name = expr` statements separated by `;` or newlines
//! - numbers, strings, lists, `+ - * / // % **`, unary minus, indexing
//! - inputs as `input_data["n1"]` or bare `n1`
//! - primitives `abs float int len max min pow round sum`
//!
//! The result is the `result` binding, or else the last bare expression.

mod eval;
mod lexer;
mod parser;

use crate::collaborators::{CalculationExecutor, CalculationFailure, CalculationInputs, Evaluation};

/// Why a calculation could not produce a result
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SandboxError {
    /// Character outside the language
    #[error("unexpected character {ch:?} at {pos}")]
    UnexpectedChar {
        /// The character
        ch: char,
        /// Byte offset
        pos: usize,
    },

    /// String literal without closing quote
    #[error("unterminated string starting at {0}")]
    UnterminatedString(usize),

    /// Numeric literal did not parse
    #[error("invalid number {0:?}")]
    InvalidNumber(String),

    /// Token in the wrong place
    #[error("unexpected {found} at {pos}")]
    UnexpectedToken {
        /// Token description
        found: String,
        /// Byte offset
        pos: usize,
    },

    /// Code ended mid-expression
    #[error("unexpected end of code")]
    UnexpectedEnd,

    /// Unbound name
    #[error("name {0:?} is not defined")]
    UnknownName(String),

    /// Function outside the whitelist
    #[error("function {0:?} is not available")]
    UnknownFunction(String),

    /// Input id not among the calculation inputs
    #[error("no input named {0:?}")]
    UnknownInput(String),

    /// Input node has no value
    #[error("input {0:?} has no value")]
    MissingInput(String),

    /// Input value holds no number
    #[error("input {input:?} is not numeric: {raw:?}")]
    NonNumeric {
        /// Input id
        input: String,
        /// Raw value
        raw: String,
    },

    /// Wrong number of arguments
    #[error("{function}() expects {expected} argument(s), got {found}")]
    Arity {
        /// Function name
        function: String,
        /// Expected count
        expected: &'static str,
        /// Supplied count
        found: usize,
    },

    /// Operation applied to the wrong kind of value
    #[error("type error: {0}")]
    Type(String),

    /// Division or modulo by zero
    #[error("division by zero")]
    DivisionByZero,

    /// Result is infinite or NaN
    #[error("result is not a finite number")]
    NonFinite,

    /// List index outside the list
    #[error("index {0} out of range")]
    IndexOutOfRange(i64),

    /// Neither a `result` binding nor a final expression
    #[error("code produced no result")]
    MissingResult,

    /// Code is larger or more deeply nested than the sandbox accepts
    #[error("code exceeds the {limit} limit of {max}")]
    TooComplex {
        /// Which budget was exhausted
        limit: &'static str,
        /// The budget
        max: usize,
    },
}

/// Bytes of code accepted for one calculation
pub const MAX_CODE_LEN: usize = 16 * 1024;

/// Evaluate code over inputs
pub fn evaluate(code: &str, inputs: &CalculationInputs) -> Result<Evaluation, CalculationFailure> {
    let mut evaluator = eval::Evaluator::new(inputs);
    let outcome = check_length(code)
        .and_then(|()| lexer::tokenize(code))
        .and_then(|tokens| parser::parse(&tokens))
        .and_then(|program| evaluator.run(&program));
    match outcome {
        Ok(result) => Ok(Evaluation {
            result,
            warnings: evaluator.warnings,
        }),
        Err(err) => {
            tracing::warn!("Calculation failed: {}", err);
            Err(CalculationFailure::new(evaluator.warnings, err))
        }
    }
}

fn check_length(code: &str) -> Result<(), SandboxError> {
    if code.len() > MAX_CODE_LEN {
        return Err(SandboxError::TooComplex {
            limit: "code length",
            max: MAX_CODE_LEN,
        });
    }
    Ok(())
}

/// The default calculation executor
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionSandbox;

impl ExpressionSandbox {
    /// Create the sandbox
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CalculationExecutor for ExpressionSandbox {
    fn execute(
        &self,
        code: &str,
        inputs: &CalculationInputs,
    ) -> Result<Evaluation, CalculationFailure> {
        evaluate(code, inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_graph::NodeId;
    use serde_json::json;

    fn inputs(pairs: &[(&str, Option<&str>)]) -> CalculationInputs {
        pairs
            .iter()
            .map(|(id, value)| (NodeId::new(*id), value.map(str::to_string)))
            .collect()
    }

    #[test]
    fn coffee_shop_square_footage() {
        let inputs = inputs(&[("n1", Some("$40")), ("n2", Some("$5000"))]);
        let code = "monthly_rent_per_sqft = input_data[\"n1\"] / 12\nresult = round(input_data[\"n2\"] / monthly_rent_per_sqft)";
        let eval = evaluate(code, &inputs).unwrap();
        assert_eq!(eval.result, json!(1500.0));
        assert!(eval.warnings.is_empty());
    }

    #[test]
    fn bare_ids_and_last_expression() {
        let inputs = inputs(&[("rent", Some("1,200")), ("months", Some("12"))]);
        let eval = evaluate("rent * months", &inputs).unwrap();
        assert_eq!(eval.result, json!(14400.0));
    }

    #[test]
    fn aggregates() {
        let inputs = inputs(&[("a", Some("3")), ("b", Some("7"))]);
        let eval = evaluate("xs = [a, b, 5]; result = [sum(xs), max(xs), min(a, b), len(xs)]", &inputs).unwrap();
        assert_eq!(eval.result, json!([15.0, 7.0, 3.0, 3.0]));
    }

    #[test]
    fn embedded_number_is_warned() {
        let inputs = inputs(&[("n1", Some("rent is $40/sqft; vacancy 8%"))]);
        let eval = evaluate("result = n1 * 2", &inputs).unwrap();
        assert_eq!(eval.result, json!(80.0));
        assert_eq!(eval.warnings.len(), 1);
    }

    #[test]
    fn missing_input_value_fails_softly() {
        let inputs = inputs(&[("n1", None)]);
        let failure = evaluate("result = n1 + 1", &inputs).unwrap_err();
        assert_eq!(
            failure.warnings,
            vec!["Calculation failed: input \"n1\" has no value".to_string()]
        );
    }

    #[test]
    fn forbidden_function_rejected() {
        let failure = evaluate("result = open(\"/etc/passwd\")", &CalculationInputs::new()).unwrap_err();
        assert!(failure.warnings[0].contains("not available"));
    }

    #[test]
    fn division_by_zero_fails() {
        let failure = evaluate("result = 1 / 0", &CalculationInputs::new()).unwrap_err();
        assert!(failure.warnings[0].ends_with("division by zero"));
    }

    #[test]
    fn overflow_is_not_finite() {
        let failure = evaluate("result = 10 ** 400", &CalculationInputs::new()).unwrap_err();
        assert!(failure.warnings[0].contains("finite"));
    }

    #[test]
    fn assignment_only_has_no_result() {
        let failure = evaluate("x = 1", &CalculationInputs::new()).unwrap_err();
        assert!(failure.warnings[0].contains("no result"));
    }

    #[test]
    fn oversized_code_fails_softly() {
        let nested = format!("result = {}1{}", "(".repeat(200_000), ")".repeat(200_000));
        let failure = evaluate(&nested, &CalculationInputs::new()).unwrap_err();
        assert!(failure.warnings[0].starts_with("Calculation failed"));
        assert!(failure.warnings[0].contains("code length"));

        let flat = format!("result = 1{}", "+1".repeat(500_000));
        let failure = evaluate(&flat, &CalculationInputs::new()).unwrap_err();
        assert!(failure.warnings[0].starts_with("Calculation failed"));
    }

    #[test]
    fn deep_nesting_within_length_fails_softly() {
        let code = format!("result = {}1{}", "(".repeat(1_000), ")".repeat(1_000));
        let failure = evaluate(&code, &CalculationInputs::new()).unwrap_err();
        assert!(failure.warnings[0].starts_with("Calculation failed"));
        assert!(failure.warnings[0].contains("nesting"));
    }

    #[test]
    fn long_chain_within_budgets_fails_softly() {
        // Parses within every budget but nests deeper than evaluation allows
        let code = format!("result = 1{}", "+1".repeat(400));
        let failure = evaluate(&code, &CalculationInputs::new()).unwrap_err();
        assert!(failure.warnings[0].starts_with("Calculation failed"));
        assert!(failure.warnings[0].contains("evaluation depth"));
    }

    #[test]
    fn moderate_chain_evaluates() {
        let code = format!("result = 0{}", "+1".repeat(100));
        assert_eq!(evaluate(&code, &CalculationInputs::new()).unwrap().result, json!(100.0));
    }
}

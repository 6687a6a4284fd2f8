//! Specification validation
//!
//! A hard gate per generation round: the first violation rejects the whole
//! specification. Nodes are checked in generation order, so a dependency must
//! name a node declared earlier in the specification or in a previous round.

use crate::error::ValidationError;
use crate::spec::{GraphSpecification, NodeSpec, NodeSpecKind};
use crate::types::{GatherMethod, NodeId};
use std::collections::HashSet;

/// Validates specifications against the ids already present in a cumulative graph
#[derive(Debug, Clone, Default)]
pub struct SpecValidator {
    known: HashSet<NodeId>,
}

impl SpecValidator {
    /// Validator with no prior ids
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validator seeded with ids from earlier rounds
    #[must_use]
    pub fn with_known_ids<'a>(ids: impl IntoIterator<Item = &'a NodeId>) -> Self {
        Self {
            known: ids.into_iter().cloned().collect(),
        }
    }

    /// Check a specification without recording its ids
    pub fn validate(&self, spec: &GraphSpecification) -> Result<(), ValidationError> {
        if spec.is_empty() {
            return Err(ValidationError::EmptySpecification);
        }

        let mut seen: HashSet<&NodeId> = HashSet::with_capacity(spec.len());
        for node in &spec.nodes {
            check_required_fields(node)?;

            if self.known.contains(&node.id) || seen.contains(&node.id) {
                return Err(ValidationError::DuplicateId(node.id.clone()));
            }

            if let Some(dependency) = node
                .depends_on_ids
                .iter()
                .find(|d| !self.known.contains(*d) && !seen.contains(d))
            {
                return Err(ValidationError::UnresolvedDependency {
                    node: node.id.clone(),
                    dependency: dependency.clone(),
                });
            }

            check_kind(node)?;
            seen.insert(&node.id);
        }
        Ok(())
    }

    /// Validate, then remember the specification's ids for later rounds
    pub fn accept(&mut self, spec: &GraphSpecification) -> Result<(), ValidationError> {
        self.validate(spec)?;
        self.known.extend(spec.nodes.iter().map(|n| n.id.clone()));
        Ok(())
    }

    /// Number of ids known to the validator
    #[inline]
    #[must_use]
    pub fn known_len(&self) -> usize {
        self.known.len()
    }
}

/// Validate a standalone specification
pub fn validate_specification(spec: &GraphSpecification) -> Result<(), ValidationError> {
    SpecValidator::new().validate(spec)
}

fn check_required_fields(node: &NodeSpec) -> Result<(), ValidationError> {
    let missing = |field| ValidationError::MissingField {
        node: node.id.to_string(),
        field,
    };
    if node.id.is_empty() {
        return Err(missing("id"));
    }
    if node.question.trim().is_empty() {
        return Err(missing("question"));
    }
    if node.rationale.trim().is_empty() {
        return Err(missing("rationale"));
    }
    Ok(())
}

fn check_kind(node: &NodeSpec) -> Result<(), ValidationError> {
    match &node.kind {
        NodeSpecKind::Gather {
            gathering_method: GatherMethod::WebSearch,
            search_queries,
        } => {
            let has_query = search_queries
                .iter()
                .flatten()
                .any(|q| !q.query.trim().is_empty());
            if !has_query {
                return Err(ValidationError::MissingQueries(node.id.clone()));
            }
        }
        NodeSpecKind::Gather {
            gathering_method: GatherMethod::AskUser,
            ..
        } => {}
        NodeSpecKind::Calculate {
            calculation_explanation,
            input_node_ids,
        } => {
            let inputs = match input_node_ids {
                Some(inputs) if !inputs.is_empty() => inputs,
                _ => return Err(ValidationError::MissingInputs(node.id.clone())),
            };
            if calculation_explanation
                .as_deref()
                .map_or(true, |e| e.trim().is_empty())
            {
                return Err(ValidationError::MissingExplanation(node.id.clone()));
            }
            if let Some(input) = inputs.iter().find(|i| !node.depends_on_ids.contains(i)) {
                return Err(ValidationError::InputNotDependency {
                    node: node.id.clone(),
                    input: input.clone(),
                });
            }
        }
    }
    Ok(())
}

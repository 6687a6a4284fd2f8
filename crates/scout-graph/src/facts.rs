//! Fact set: resolved questions and their values
//!
//! Shared across rounds and between the information and exploration graphs.
//! Entries are never removed.

use crate::node::Node;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mapping from question text to resolved value, in resolution order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactSet {
    facts: IndexMap<String, String>,
}

impl FactSet {
    /// Create an empty fact set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resolved question; a later answer to the same question replaces the earlier one
    pub fn record(&mut self, question: impl Into<String>, value: impl Into<String>) {
        self.facts.insert(question.into(), value.into());
    }

    /// Fold every valued node into the set
    pub fn fold<'a>(&mut self, nodes: impl IntoIterator<Item = &'a Node>) {
        for node in nodes {
            if let Some(value) = node.value() {
                self.record(node.question.clone(), value);
            }
        }
    }

    /// Look up a question
    #[inline]
    #[must_use]
    pub fn get(&self, question: &str) -> Option<&str> {
        self.facts.get(question).map(String::as_str)
    }

    /// Number of facts
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// True when nothing is known yet
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Iterate `(question, value)` pairs in resolution order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.facts.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Renders one `- question: value` line per fact
impl fmt::Display for FactSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (question, value)) in self.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "- {question}: {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::NodeSpec;
    use crate::types::{NodeState, ValueSource};

    #[test]
    fn fold_skips_unvalued_nodes() {
        let mut valued: Node = NodeSpec::ask_user("n1", "budget?", "r").into();
        valued.transition(NodeState::Blocked).unwrap();
        valued
            .complete_with("$5000".to_string(), ValueSource::User)
            .unwrap();
        let unvalued: Node = NodeSpec::ask_user("n2", "location?", "r").into();

        let mut facts = FactSet::new();
        facts.fold([&valued, &unvalued]);

        assert_eq!(facts.len(), 1);
        assert_eq!(facts.get("budget?"), Some("$5000"));
    }

    #[test]
    fn display_lists_facts_in_order() {
        let mut facts = FactSet::new();
        facts.record("rent", "$40");
        facts.record("budget", "$5000");
        assert_eq!(facts.to_string(), "- rent: $40\n- budget: $5000");
    }
}

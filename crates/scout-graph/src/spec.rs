//! Graph specifications
//!
//! The immutable output of the generation collaborator: a goal plus the node
//! specifications proposed for one round. Specifications are validated before
//! they are converted into processing nodes.

use crate::types::{GatherMethod, NodeId, SearchQuery};
use serde::{Deserialize, Serialize};

/// Proposed set of nodes for one generation round
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraphSpecification {
    /// The user's goal
    pub goal: String,
    /// Nodes in generation order
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

impl GraphSpecification {
    /// Create a specification
    #[inline]
    #[must_use]
    pub fn new(goal: impl Into<String>, nodes: Vec<NodeSpec>) -> Self {
        Self {
            goal: goal.into(),
            nodes,
        }
    }

    /// Check for an empty node list
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// One proposed node, in the generation collaborator's wire shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique identifier
    pub id: NodeId,
    /// What we need to know
    pub question: String,
    /// Why we need it
    pub rationale: String,
    /// Gather or calculate payload
    #[serde(flatten)]
    pub kind: NodeSpecKind,
    /// Ids that must complete before this node runs
    #[serde(default)]
    pub depends_on_ids: Vec<NodeId>,
}

/// Kind-specific part of a node specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node_type", rename_all = "snake_case")]
pub enum NodeSpecKind {
    /// Value comes from an external source
    Gather {
        /// Search or ask the user
        gathering_method: GatherMethod,
        /// Required for web search
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search_queries: Option<Vec<SearchQuery>>,
    },
    /// Value is derived from other nodes
    Calculate {
        /// How the calculation should work
        #[serde(default, skip_serializing_if = "Option::is_none")]
        calculation_explanation: Option<String>,
        /// Nodes whose values feed the calculation
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input_node_ids: Option<Vec<NodeId>>,
    },
}

impl NodeSpec {
    /// Web-search gather node
    #[must_use]
    pub fn web_search(
        id: impl Into<NodeId>,
        question: impl Into<String>,
        rationale: impl Into<String>,
        queries: Vec<SearchQuery>,
    ) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            rationale: rationale.into(),
            kind: NodeSpecKind::Gather {
                gathering_method: GatherMethod::WebSearch,
                search_queries: Some(queries),
            },
            depends_on_ids: Vec::new(),
        }
    }

    /// Ask-user gather node
    #[must_use]
    pub fn ask_user(
        id: impl Into<NodeId>,
        question: impl Into<String>,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            rationale: rationale.into(),
            kind: NodeSpecKind::Gather {
                gathering_method: GatherMethod::AskUser,
                search_queries: None,
            },
            depends_on_ids: Vec::new(),
        }
    }

    /// Calculate node; inputs are also recorded as dependencies
    #[must_use]
    pub fn calculate(
        id: impl Into<NodeId>,
        question: impl Into<String>,
        rationale: impl Into<String>,
        explanation: impl Into<String>,
        inputs: Vec<NodeId>,
    ) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            rationale: rationale.into(),
            kind: NodeSpecKind::Calculate {
                calculation_explanation: Some(explanation.into()),
                input_node_ids: Some(inputs.clone()),
            },
            depends_on_ids: inputs,
        }
    }

    /// With dependency
    #[inline]
    #[must_use]
    pub fn depends_on(mut self, id: impl Into<NodeId>) -> Self {
        let id = id.into();
        if !self.depends_on_ids.contains(&id) {
            self.depends_on_ids.push(id);
        }
        self
    }

    /// Queries carried by a gather node, empty otherwise
    #[must_use]
    pub fn queries(&self) -> &[SearchQuery] {
        match &self.kind {
            NodeSpecKind::Gather {
                search_queries: Some(queries),
                ..
            } => queries,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_generation_wire_shape() {
        let json = r#"{
            "goal": "Should I open a coffee shop downtown?",
            "nodes": [
                {
                    "id": "n1",
                    "question": "average commercial rent per sqft downtown",
                    "rationale": "rent dominates costs",
                    "node_type": "gather",
                    "gathering_method": "web_search",
                    "search_queries": [{"query": "downtown rent per sqft", "context": "cost"}]
                },
                {
                    "id": "n2",
                    "question": "what is your monthly budget?",
                    "rationale": "bounds the options",
                    "node_type": "gather",
                    "gathering_method": "ask_user"
                },
                {
                    "id": "n3",
                    "question": "affordable square footage",
                    "rationale": "feasibility",
                    "node_type": "calculate",
                    "calculation_explanation": "budget divided by rent",
                    "input_node_ids": ["n1", "n2"],
                    "depends_on_ids": ["n1", "n2"]
                }
            ]
        }"#;

        let spec: GraphSpecification = serde_json::from_str(json).unwrap();
        assert_eq!(spec.len(), 3);
        assert_eq!(spec.nodes[0].queries().len(), 1);
        assert_eq!(
            spec.nodes[1].kind,
            NodeSpecKind::Gather {
                gathering_method: GatherMethod::AskUser,
                search_queries: None,
            }
        );
        assert_eq!(
            spec.nodes[2].depends_on_ids,
            vec![NodeId::new("n1"), NodeId::new("n2")]
        );
    }

    #[test]
    fn calculate_builder_records_dependencies() {
        let spec = NodeSpec::calculate(
            "n3",
            "q",
            "r",
            "explain",
            vec![NodeId::new("n1"), NodeId::new("n2")],
        );
        assert_eq!(spec.depends_on_ids.len(), 2);
    }

    #[test]
    fn depends_on_is_deduplicated() {
        let spec = NodeSpec::ask_user("n2", "q", "r").depends_on("n1").depends_on("n1");
        assert_eq!(spec.depends_on_ids, vec![NodeId::new("n1")]);
    }
}

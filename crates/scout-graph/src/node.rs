//! Processing nodes
//!
//! A `Node` is created once from a `NodeSpec` and afterwards only mutated
//! through the methods here, which enforce the state machine and the
//! write-once rules on `value_source` and `breakdown_attempt`.

use crate::error::NodeError;
use crate::spec::{NodeSpec, NodeSpecKind};
use crate::state_machine::validate_transition;
use crate::types::{
    BreakdownAttempt, CalculationRecord, Estimate, GatherMethod, NodeId, NodeState, SearchQuery,
    SearchResult, ValueSource,
};
use serde::{Deserialize, Serialize};

/// Behavior selector for a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node_type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Value comes from search or from the user
    Gather {
        /// Gathering method
        method: GatherMethod,
        /// Queries for web search (empty for ask-user)
        queries: Vec<SearchQuery>,
    },
    /// Value is computed from other nodes
    Calculate {
        /// How the calculation should work
        explanation: String,
        /// Nodes whose values feed the calculation
        input_node_ids: Vec<NodeId>,
    },
}

impl From<NodeSpecKind> for NodeKind {
    fn from(kind: NodeSpecKind) -> Self {
        match kind {
            NodeSpecKind::Gather {
                gathering_method,
                search_queries,
            } => Self::Gather {
                method: gathering_method,
                queries: search_queries.unwrap_or_default(),
            },
            NodeSpecKind::Calculate {
                calculation_explanation,
                input_node_ids,
            } => Self::Calculate {
                explanation: calculation_explanation.unwrap_or_default(),
                input_node_ids: input_node_ids.unwrap_or_default(),
            },
        }
    }
}

/// One unit of work in a processing graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Identifier
    pub id: NodeId,
    /// What we need to know
    pub question: String,
    /// Why we need it
    pub rationale: String,
    /// Gather or calculate
    pub kind: NodeKind,
    /// Ids that must be complete before this node runs
    pub depends_on_ids: Vec<NodeId>,
    state: NodeState,
    value: Option<String>,
    value_source: Option<ValueSource>,
    /// Facts backing a search-sourced value
    pub search_results: Option<Vec<SearchResult>>,
    /// Estimate backing an estimate-sourced value
    pub estimate: Option<Estimate>,
    breakdown_attempt: Option<BreakdownAttempt>,
    /// Last calculation attempt
    pub calculation_result: Option<CalculationRecord>,
    /// Set when processing failed and the node was forced to `Blocked`
    pub failure: Option<String>,
}

impl From<NodeSpec> for Node {
    fn from(spec: NodeSpec) -> Self {
        Self {
            id: spec.id,
            question: spec.question,
            rationale: spec.rationale,
            kind: spec.kind.into(),
            depends_on_ids: spec.depends_on_ids,
            state: NodeState::Pending,
            value: None,
            value_source: None,
            search_results: None,
            estimate: None,
            breakdown_attempt: None,
            calculation_result: None,
            failure: None,
        }
    }
}

impl Node {
    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Resolved value
    #[inline]
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Provenance of the value
    #[inline]
    #[must_use]
    pub fn value_source(&self) -> Option<ValueSource> {
        self.value_source
    }

    /// The breakdown attempt, if search failed
    #[inline]
    #[must_use]
    pub fn breakdown_attempt(&self) -> Option<&BreakdownAttempt> {
        self.breakdown_attempt.as_ref()
    }

    /// Gathering method for gather nodes
    #[inline]
    #[must_use]
    pub fn gather_method(&self) -> Option<GatherMethod> {
        match self.kind {
            NodeKind::Gather { method, .. } => Some(method),
            NodeKind::Calculate { .. } => None,
        }
    }

    /// Blocked on a human rather than on a failure
    #[inline]
    #[must_use]
    pub fn is_awaiting_input(&self) -> bool {
        self.state == NodeState::Blocked
            && self.gather_method() == Some(GatherMethod::AskUser)
            && self.failure.is_none()
    }

    /// Forced to `Blocked` by a processing failure
    #[inline]
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.state == NodeState::Blocked && self.failure.is_some()
    }

    /// Move to a new state
    pub fn transition(&mut self, to: NodeState) -> Result<(), NodeError> {
        validate_transition(self.state, to).map_err(|source| NodeError::IllegalTransition {
            node: self.id.clone(),
            source,
        })?;
        self.state = to;
        Ok(())
    }

    /// Assign the value and move to `Complete`
    pub fn complete_with(&mut self, value: String, source: ValueSource) -> Result<(), NodeError> {
        if self.value_source.is_some() {
            return Err(NodeError::ValueAlreadySet(self.id.clone()));
        }
        self.transition(NodeState::Complete)?;
        self.value = Some(value);
        self.value_source = Some(source);
        Ok(())
    }

    /// Move to `Complete` leaving the value unset
    pub fn complete_without_value(&mut self) -> Result<(), NodeError> {
        self.transition(NodeState::Complete)
    }

    /// Record the single breakdown attempt
    pub fn record_breakdown(&mut self, attempt: BreakdownAttempt) -> Result<(), NodeError> {
        if self.breakdown_attempt.is_some() {
            return Err(NodeError::BreakdownAlreadyRecorded(self.id.clone()));
        }
        self.breakdown_attempt = Some(attempt);
        Ok(())
    }

    /// Mark whether the recorded breakdown's sub-searches found anything
    pub fn settle_breakdown(&mut self, was_successful: bool) -> Result<(), NodeError> {
        let attempt = self
            .breakdown_attempt
            .as_mut()
            .ok_or_else(|| NodeError::NoBreakdown(self.id.clone()))?;
        attempt.was_successful = was_successful;
        Ok(())
    }

    /// Force to `Blocked` after a processing failure
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), NodeError> {
        self.transition(NodeState::Blocked)?;
        self.failure = Some(reason.into());
        Ok(())
    }
}

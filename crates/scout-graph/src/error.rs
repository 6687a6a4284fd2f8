//! Error types for the graph model
//!
//! - Specification validation failures (fatal per generation round)
//! - Illegal node state transitions
//! - Write-once violations on node values

use crate::types::{NodeId, NodeState};

/// A malformed graph specification
///
/// Any of these rejects the whole specification; no node of the batch runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Specification has no nodes
    #[error("specification has no nodes")]
    EmptySpecification,

    /// Required field is blank
    #[error("node {node:?} is missing {field}")]
    MissingField {
        /// Offending node id (may itself be blank)
        node: String,
        /// Field name
        field: &'static str,
    },

    /// Id already used in this or an earlier round
    #[error("duplicate node id: {0}")]
    DuplicateId(NodeId),

    /// Dependency does not name an earlier node
    #[error("dependency {dependency} of node {node} not found")]
    UnresolvedDependency {
        /// Dependent node
        node: NodeId,
        /// Unknown dependency id
        dependency: NodeId,
    },

    /// Web-search gather node without queries
    #[error("search node {0} has no queries")]
    MissingQueries(NodeId),

    /// Calculate node without input nodes
    #[error("calculate node {0} has no input nodes")]
    MissingInputs(NodeId),

    /// Calculate node without explanation
    #[error("calculate node {0} has no explanation")]
    MissingExplanation(NodeId),

    /// Calculate input that is not also a dependency
    #[error("input {input} of calculate node {node} is not among its dependencies")]
    InputNotDependency {
        /// Calculate node
        node: NodeId,
        /// Input missing from `depends_on_ids`
        input: NodeId,
    },
}

/// Illegal state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition {from} -> {to}")]
pub struct StateMachineError {
    /// Current state
    pub from: NodeState,
    /// Requested state
    pub to: NodeState,
}

/// Node mutation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    /// Transition rejected by the state machine
    #[error("node {node}: {source}")]
    IllegalTransition {
        /// Node id
        node: NodeId,
        /// Rejected transition
        #[source]
        source: StateMachineError,
    },

    /// `value_source` was already set
    #[error("node {0} already has a value")]
    ValueAlreadySet(NodeId),

    /// A breakdown attempt already exists
    #[error("node {0} already has a breakdown attempt")]
    BreakdownAlreadyRecorded(NodeId),

    /// Breakdown outcome settled before any attempt was recorded
    #[error("node {0} has no breakdown attempt")]
    NoBreakdown(NodeId),

    /// Node is not part of the graph
    #[error("node {0} not found")]
    NotFound(NodeId),
}

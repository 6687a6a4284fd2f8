//! Error types for the exploration engine
//!
//! Provides error handling for:
//! - Collaborator failures (generation, search, breakdown, estimate, calculation)
//! - Node processing failures (recovered by blocking the node)
//! - External input delivery
//! - Round-level validation and generation failures
//! - Configuration loading

use scout_graph::{GatherMethod, NodeError, NodeId, NodeState, ValidationError};

/// Main exploration error type
#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    /// A generated specification was rejected; nothing from that round ran
    #[error("{graph} round {round}: invalid specification: {source}")]
    Validation {
        /// Which graph was being generated
        graph: GraphKind,
        /// Zero-based round number
        round: usize,
        /// Validation failure
        #[source]
        source: ValidationError,
    },

    /// The generation collaborator failed
    #[error("{graph} round {round}: generation failed: {source}")]
    Generation {
        /// Which graph was being generated
        graph: GraphKind,
        /// Zero-based round number
        round: usize,
        /// Collaborator failure
        #[source]
        source: CollaboratorError,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Input delivery error
    #[error("input error: {0}")]
    Input(#[from] InputError),

    /// Session lookup failed
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Another scheduler is driving the same graph of the session
    #[error("{0} graph is already being scheduled")]
    AlreadyRunning(GraphKind),
}

impl ExplorerError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Generation {
                source: CollaboratorError::Unavailable(_) | CollaboratorError::Timeout(_),
                ..
            }
        )
    }

    /// Round the error occurred in, if any
    #[inline]
    #[must_use]
    pub fn round(&self) -> Option<usize> {
        match self {
            Self::Validation { round, .. } | Self::Generation { round, .. } => Some(*round),
            _ => None,
        }
    }
}

/// The two independent graphs of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphKind {
    /// Information needs: facts required to answer the goal
    Information,
    /// Solution exploration: candidate approaches
    Exploration,
}

impl std::fmt::Display for GraphKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Information => f.write_str("information"),
            Self::Exploration => f.write_str("exploration"),
        }
    }
}

/// Failure reported by an external collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// Backend unreachable or returned an error
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// Response did not have the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),

    /// A replay transcript has no entry for the request
    #[error("no recorded response for {0}")]
    NotRecorded(String),

    /// Leaf call timed out
    #[error("timed out: {0}")]
    Timeout(String),
}

/// Failure while processing one node
///
/// Never escapes the node processor: the node is forced to `Blocked` and the
/// error is logged.
#[derive(Debug, thiserror::Error)]
pub enum NodeProcessingError {
    /// A collaborator call failed
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// The node model rejected a mutation
    #[error(transparent)]
    Node(#[from] NodeError),

    /// A calculation input has not completed
    #[error("input {input} of {node} is not complete")]
    InputNotReady {
        /// Calculate node
        node: NodeId,
        /// Offending input
        input: NodeId,
    },
}

/// Errors returned by `provide_input`; the node is left untouched
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    /// No graph in the session holds the node
    #[error("node not found: {0}")]
    NotFound(NodeId),

    /// Node is not blocked on the user
    #[error("node {node} cannot accept input in state {state} (method {method:?})")]
    InvalidState {
        /// Target node
        node: NodeId,
        /// Its current state
        state: NodeState,
        /// Its gathering method, if it is a gather node
        method: Option<GatherMethod>,
    },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that was read
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML did not parse
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// What is wrong
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_unavailable_is_retryable() {
        let err = ExplorerError::Generation {
            graph: GraphKind::Information,
            round: 0,
            source: CollaboratorError::Unavailable("503".to_string()),
        };
        assert!(err.is_retryable());
        assert_eq!(err.round(), Some(0));
    }

    #[test]
    fn validation_is_not_retryable() {
        let err = ExplorerError::Validation {
            graph: GraphKind::Exploration,
            round: 1,
            source: ValidationError::EmptySpecification,
        };
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "exploration round 1: invalid specification: specification has no nodes"
        );
    }

    #[test]
    fn invalid_state_display() {
        let err = InputError::InvalidState {
            node: NodeId::new("n1"),
            state: NodeState::Complete,
            method: Some(GatherMethod::WebSearch),
        };
        assert_eq!(
            err.to_string(),
            "node n1 cannot accept input in state complete (method Some(WebSearch))"
        );
    }
}

//! Scout Graph - task graph model for goal exploration
//!
//! Pure, synchronous building blocks used by the exploration engine:
//! - Graph specifications as produced by the generation collaborator
//! - Processing nodes with an enforced state machine
//! - The cumulative processing graph and its ready-set computation
//! - The fact set shared across rounds
//! - Per-round specification validation
//!
//! # Example
//!
//! ```rust,ignore
//! use scout_graph::prelude::*;
//!
//! let spec = GraphSpecification::new(
//!     "Should I open a coffee shop downtown?",
//!     vec![NodeSpec::ask_user("n1", "what is your monthly budget?", "bounds the options")],
//! );
//! validate_specification(&spec)?;
//!
//! let graph = ProcessingGraph::from_specification(spec);
//! assert_eq!(graph.ready_ids().len(), 1);
//! ```

pub mod error;
pub mod facts;
pub mod graph;
pub mod node;
pub mod spec;
pub mod state_machine;
pub mod types;
pub mod validation;

pub use error::{NodeError, StateMachineError, ValidationError};
pub use facts::FactSet;
pub use graph::ProcessingGraph;
pub use node::{Node, NodeKind};
pub use spec::{GraphSpecification, NodeSpec, NodeSpecKind};
pub use state_machine::{allowed_transitions, validate_transition};
pub use types::{
    join_facts, stringify_result, BreakdownAttempt, CalculationRecord, Estimate, GatherMethod,
    NodeId, NodeState, SearchQuery, SearchResult, ValueSource,
};
pub use validation::{validate_specification, SpecValidator};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with scout graphs
    pub use crate::{
        validate_specification, FactSet, GatherMethod, GraphSpecification, Node, NodeId, NodeKind,
        NodeSpec, NodeState, ProcessingGraph, SearchQuery, SpecValidator, ValueSource,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

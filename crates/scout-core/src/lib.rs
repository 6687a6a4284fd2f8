//! Scout Core - goal exploration engine
//!
//! Drives the task graphs of `scout-graph` to answer an open-ended goal:
//! - Collaborator interfaces for generation, search, breakdown, estimation
//!   and calculation
//! - The fallback chain (search → breakdown → estimate)
//! - The node processor and the ready-set scheduler (batch or suspend/resume)
//! - Session state, user input resumption and progress events
//! - The multi-round driver tying it together
//!
//! # Example
//!
//! ```rust,ignore
//! use scout_core::prelude::*;
//!
//! # async fn example(collaborators: Collaborators) -> Result<(), ExplorerError> {
//! let explorer = Explorer::new(ExplorerConfig::new().with_max_depth(2), collaborators);
//! let session = explorer.open_session("Should I open a coffee shop downtown?", "");
//!
//! let report = explorer.explore(&session).await?;
//! for id in &report.information.last().unwrap().awaiting_input {
//!     println!("waiting on {id}");
//! }
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod explorer;
pub mod fallback;
pub mod generation;
pub mod processor;
pub mod replay;
pub mod retry;
pub mod sandbox;
pub mod scheduler;
pub mod search;
pub mod session;

// Re-exports for convenience
pub use collaborators::{
    BreakdownPlan, BreakdownPlanner, CalculationExecutor, CalculationFailure, CalculationInputs,
    CalculationSpec, CalculationSynthesizer, Collaborators, Estimator, Evaluation, GraphGenerator,
    Searcher,
};
pub use config::{ExecutionMode, ExplorerConfig, RetryPolicy, SearchConfig};
pub use error::{
    CollaboratorError, ConfigError, ExplorerError, GraphKind, InputError, NodeProcessingError,
};
pub use events::{ChannelObserver, ProgressEvent, ProgressObserver, TracingObserver};
pub use explorer::{ExplorationReport, Explorer, RoundsReport};
pub use fallback::{FallbackChain, FallbackOutcome};
pub use generation::{node_context, round_context, GenerationEnsemble};
pub use processor::NodeProcessor;
pub use replay::{ReplayCollaborators, ReplayGenerator, Transcript, TranscriptError};
pub use retry::with_backoff;
pub use sandbox::{ExpressionSandbox, SandboxError};
pub use scheduler::{RunSummary, Scheduler};
pub use search::{CitationSearch, CitationSource, ContentAnalyzer, PageCache, PageFetcher};
pub use session::{Session, SessionId, SessionRegistry, SessionSnapshot, SessionState};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Scout Core
    pub use crate::{
        Collaborators, ExecutionMode, ExplorationReport, Explorer, ExplorerConfig, ExplorerError,
        GraphKind, ProgressEvent, ProgressObserver, RunSummary, Session, SessionId,
    };
    pub use scout_graph::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

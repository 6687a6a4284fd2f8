//! Progress notification
//!
//! A side channel only: observers see events in processing order but cannot
//! influence scheduling.

use crate::error::GraphKind;
use crate::session::SessionId;
use scout_graph::{
    CalculationRecord, Estimate, NodeId, NodeSpec, NodeState, SearchResult, ValueSource,
};
use serde::Serialize;
use tokio::sync::mpsc;

/// Something observable happened to a session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A generation round was accepted
    RoundGenerated {
        /// Graph the round belongs to
        graph: GraphKind,
        /// Zero-based round
        round: usize,
        /// Ids of the new nodes
        nodes: Vec<NodeId>,
    },
    /// A node changed state
    StateChanged {
        /// Graph holding the node
        graph: GraphKind,
        /// Node id
        node: NodeId,
        /// Previous state
        from: NodeState,
        /// New state
        to: NodeState,
    },
    /// A node received its value
    ValueAssigned {
        /// Graph holding the node
        graph: GraphKind,
        /// Node id
        node: NodeId,
        /// The value
        value: String,
        /// Its provenance
        source: ValueSource,
        /// Facts backing a search value
        #[serde(skip_serializing_if = "Option::is_none")]
        search_results: Option<Vec<SearchResult>>,
        /// Calculation backing a calculated value
        #[serde(skip_serializing_if = "Option::is_none")]
        calculation: Option<CalculationRecord>,
    },
    /// A breakdown was planned for a node whose search found nothing
    BreakdownCreated {
        /// Graph holding the parent
        graph: GraphKind,
        /// Parent node
        parent: NodeId,
        /// Parent question
        question: String,
        /// Breakdown rationale
        rationale: String,
        /// Sub-node specifications
        nodes: Vec<NodeSpec>,
    },
    /// A last-resort estimate was produced
    EstimateCreated {
        /// Graph holding the parent
        graph: GraphKind,
        /// Parent node
        parent: NodeId,
        /// The estimate
        estimate: Estimate,
    },
}

impl ProgressEvent {
    /// Node the event is about, if any
    #[must_use]
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            Self::RoundGenerated { .. } => None,
            Self::StateChanged { node, .. } | Self::ValueAssigned { node, .. } => Some(node),
            Self::BreakdownCreated { parent, .. } | Self::EstimateCreated { parent, .. } => {
                Some(parent)
            }
        }
    }
}

/// Receives session events
pub trait ProgressObserver: Send + Sync {
    /// Called synchronously, in processing order
    fn notify(&self, session: &SessionId, event: &ProgressEvent);
}

/// Forwards events to a tokio channel for a transport to consume
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<(SessionId, ProgressEvent)>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(SessionId, ProgressEvent)>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressObserver for ChannelObserver {
    fn notify(&self, session: &SessionId, event: &ProgressEvent) {
        if self.sender.send((*session, event.clone())).is_err() {
            tracing::debug!("Progress receiver dropped for session {}", session);
        }
    }
}

/// Logs every event at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn notify(&self, session: &SessionId, event: &ProgressEvent) {
        tracing::debug!("session {}: {:?}", session, event);
    }
}

//! Ready-set scheduler
//!
//! One scheduler serves both execution modes. Each pass derives the ready set
//! from scratch and processes it sequentially, so notification order is
//! deterministic. When nothing is ready:
//! - batch mode stops and reports what is left
//! - suspend mode parks on one-shot signals from `provide_input`, optionally
//!   bounded by the configured input timeout
//!
//! Nodes blocked by a failure are never waited on. A graph is driven by at
//! most one scheduler at a time.

use crate::collaborators::Collaborators;
use crate::config::ExecutionMode;
use crate::error::{ExplorerError, GraphKind};
use crate::processor::NodeProcessor;
use crate::session::Session;
use futures::stream::{FuturesUnordered, StreamExt};
use scout_graph::NodeId;
use serde::Serialize;
use tokio::sync::oneshot;

/// What a scheduler run left behind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Graph that was run
    pub graph: GraphKind,
    /// Nodes handed to the processor
    pub processed: usize,
    /// Nodes blocked on the user
    pub awaiting_input: Vec<NodeId>,
    /// Nodes blocked by a processing failure
    pub failed: Vec<NodeId>,
    /// Pending nodes whose dependencies never completed
    pub stalled: Vec<NodeId>,
    /// The input wait bound elapsed
    pub timed_out: bool,
}

impl RunSummary {
    /// Every node reached `Complete`
    #[inline]
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.awaiting_input.is_empty() && self.failed.is_empty() && self.stalled.is_empty()
    }
}

enum Wake {
    Input(NodeId),
    TimedOut,
    Closed,
}

/// Drives a graph of a session to fixpoint
#[derive(Debug, Clone, Copy)]
pub struct Scheduler<'a> {
    session: &'a Session,
    collaborators: &'a Collaborators,
    mode: ExecutionMode,
}

impl<'a> Scheduler<'a> {
    /// Create a scheduler
    #[must_use]
    pub fn new(session: &'a Session, collaborators: &'a Collaborators, mode: ExecutionMode) -> Self {
        Self {
            session,
            collaborators,
            mode,
        }
    }

    /// Run until no node is ready and nothing more can be waited on
    ///
    /// # Errors
    /// `AlreadyRunning` when another scheduler holds the graph; nothing is
    /// processed in that case.
    pub async fn run(&self, graph: GraphKind) -> Result<RunSummary, ExplorerError> {
        let guard = self
            .session
            .claim_graph(graph)
            .ok_or(ExplorerError::AlreadyRunning(graph))?;
        let processor = NodeProcessor::new(self.session, graph, self.collaborators);
        let mut processed = 0;
        let mut timed_out = false;

        loop {
            let ready = self.ready(graph);
            if ready.is_empty() {
                if !self.mode.waits_for_input() {
                    break;
                }
                let waiters = self.session.register_input_waiters(&guard);
                // Input delivered before registration shows up here
                if !self.ready(graph).is_empty() {
                    continue;
                }
                if waiters.is_empty() {
                    break;
                }
                tracing::info!("{} graph waiting on {} input(s)", graph, waiters.len());
                match self.wait_for_input(waiters).await {
                    Wake::Input(id) => {
                        tracing::debug!("Resumed by input on {}", id);
                        continue;
                    }
                    Wake::TimedOut => {
                        tracing::warn!("{} graph timed out waiting for input", graph);
                        timed_out = true;
                        break;
                    }
                    Wake::Closed => break,
                }
            }

            tracing::debug!("{} graph: {} ready node(s)", graph, ready.len());
            for id in ready {
                processor.process(&id).await;
                processed += 1;
            }
        }

        let summary = self.session.with_state(|s| {
            let g = s.graph(graph);
            RunSummary {
                graph,
                processed,
                awaiting_input: g.awaiting_input(),
                failed: g.failed(),
                stalled: g.stalled(),
                timed_out,
            }
        });
        tracing::info!(
            "{} graph at fixpoint: {} processed, {} awaiting input, {} failed, {} stalled",
            graph,
            summary.processed,
            summary.awaiting_input.len(),
            summary.failed.len(),
            summary.stalled.len()
        );
        drop(guard);
        Ok(summary)
    }

    fn ready(&self, graph: GraphKind) -> Vec<NodeId> {
        self.session.with_state(|s| s.graph(graph).ready_ids())
    }

    async fn wait_for_input(&self, waiters: Vec<oneshot::Receiver<NodeId>>) -> Wake {
        let mut pending: FuturesUnordered<_> = waiters.into_iter().collect();
        let first = async {
            while let Some(signal) = pending.next().await {
                if let Ok(id) = signal {
                    return Wake::Input(id);
                }
            }
            Wake::Closed
        };
        match self.mode.input_timeout() {
            Some(limit) => tokio::time::timeout(limit, first)
                .await
                .unwrap_or(Wake::TimedOut),
            None => first.await,
        }
    }
}

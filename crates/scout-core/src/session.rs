//! Session-scoped state
//!
//! A session carries the fact set and the two processing graphs for one goal.
//! State sits behind a `parking_lot::Mutex` that is never held across an
//! await point; events are emitted after the lock is released.

use crate::error::{GraphKind, InputError};
use crate::events::{ProgressEvent, ProgressObserver};
use dashmap::DashMap;
use parking_lot::Mutex;
use scout_graph::{FactSet, NodeId, NodeState, ProcessingGraph, ValueSource};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::oneshot;
use ulid::Ulid;

/// Session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Ulid);

impl SessionId {
    /// Generate a new id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// Mutable per-session state
#[derive(Debug)]
pub struct SessionState {
    /// Resolved questions
    pub facts: FactSet,
    /// Information-needs graph
    pub information: ProcessingGraph,
    /// Solution-exploration graph
    pub exploration: ProcessingGraph,
    input_waiters: HashMap<(GraphKind, NodeId), oneshot::Sender<NodeId>>,
    running: HashSet<GraphKind>,
}

impl SessionState {
    fn new(goal: &str) -> Self {
        Self {
            facts: FactSet::new(),
            information: ProcessingGraph::new(goal),
            exploration: ProcessingGraph::new(goal),
            input_waiters: HashMap::new(),
            running: HashSet::new(),
        }
    }

    /// Whether a scheduler currently holds the graph
    #[inline]
    #[must_use]
    pub fn is_running(&self, kind: GraphKind) -> bool {
        self.running.contains(&kind)
    }

    /// Borrow a graph
    #[inline]
    #[must_use]
    pub fn graph(&self, kind: GraphKind) -> &ProcessingGraph {
        match kind {
            GraphKind::Information => &self.information,
            GraphKind::Exploration => &self.exploration,
        }
    }

    /// Borrow a graph mutably
    #[inline]
    pub fn graph_mut(&mut self, kind: GraphKind) -> &mut ProcessingGraph {
        match kind {
            GraphKind::Information => &mut self.information,
            GraphKind::Exploration => &mut self.exploration,
        }
    }

    /// Fold every valued node of a graph into the facts
    pub fn fold_facts(&mut self, kind: GraphKind) {
        let graph = match kind {
            GraphKind::Information => &self.information,
            GraphKind::Exploration => &self.exploration,
        };
        self.facts.fold(graph.nodes());
    }
}

/// Point-in-time copy of a session's state
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Session id
    pub id: SessionId,
    /// Goal
    pub goal: String,
    /// Resolved questions
    pub facts: FactSet,
    /// Information-needs graph
    pub information: ProcessingGraph,
    /// Solution-exploration graph
    pub exploration: ProcessingGraph,
}

/// Handle to one exploration session; clones share state
#[derive(Clone)]
pub struct Session {
    id: SessionId,
    goal: Arc<str>,
    context: Arc<str>,
    state: Arc<Mutex<SessionState>>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl Session {
    /// Create a session for a goal
    #[must_use]
    pub fn new(goal: impl Into<String>, context: impl Into<String>) -> Self {
        let goal: String = goal.into();
        let context: String = context.into();
        Self {
            id: SessionId::new(),
            state: Arc::new(Mutex::new(SessionState::new(&goal))),
            goal: goal.into(),
            context: context.into(),
            observer: None,
        }
    }

    /// With a progress observer
    #[inline]
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Session id
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The user's goal
    #[inline]
    #[must_use]
    pub fn goal(&self) -> &str {
        &self.goal
    }

    /// Base context for generation
    #[inline]
    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Run a closure with the state locked
    pub fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Copy of the current facts
    #[must_use]
    pub fn facts(&self) -> FactSet {
        self.state.lock().facts.clone()
    }

    /// Copy of the current state
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            id: self.id,
            goal: self.goal.to_string(),
            facts: state.facts.clone(),
            information: state.information.clone(),
            exploration: state.exploration.clone(),
        }
    }

    /// Deliver an event to the observer, if any
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(observer) = &self.observer {
            observer.notify(&self.id, &event);
        }
    }

    /// Claim exclusive scheduling of a graph
    ///
    /// Returns `None` while another claim on the same graph is alive. The
    /// claim is released when the guard drops, including on cancellation.
    #[must_use]
    pub fn claim_graph(&self, graph: GraphKind) -> Option<RunGuard> {
        if !self.state.lock().running.insert(graph) {
            return None;
        }
        Some(RunGuard {
            state: Arc::clone(&self.state),
            graph,
        })
    }

    /// Register one-shot waiters for every node of the claimed graph awaiting input
    ///
    /// Only the claim holder registers, so a replaced waiter always belongs to
    /// an earlier wait of the same scheduler.
    pub(crate) fn register_input_waiters(&self, guard: &RunGuard) -> Vec<oneshot::Receiver<NodeId>> {
        let graph = guard.graph;
        let mut state = self.state.lock();
        let awaiting = state.graph(graph).awaiting_input();
        awaiting
            .into_iter()
            .map(|id| {
                let (tx, rx) = oneshot::channel();
                state.input_waiters.insert((graph, id), tx);
                rx
            })
            .collect()
    }

    /// Supply the value of a node blocked on the user
    ///
    /// The first graph holding an awaiting node with this id wins. On error the
    /// node is left untouched.
    pub fn provide_input(&self, node_id: &NodeId, value: impl Into<String>) -> Result<GraphKind, InputError> {
        let value = value.into();
        let (graph, waiter) = {
            let mut state = self.state.lock();
            let graph = locate(&state, node_id)?;
            let node = state
                .graph_mut(graph)
                .get_mut(node_id)
                .ok_or_else(|| InputError::NotFound(node_id.clone()))?;
            node.complete_with(value.clone(), ValueSource::User)
                .map_err(|_| InputError::InvalidState {
                    node: node_id.clone(),
                    state: node.state(),
                    method: node.gather_method(),
                })?;
            let question = node.question.clone();
            state.facts.record(question, value.clone());
            (graph, state.input_waiters.remove(&(graph, node_id.clone())))
        };

        tracing::info!("Input received for {} node {}", graph, node_id);
        self.emit(ProgressEvent::StateChanged {
            graph,
            node: node_id.clone(),
            from: NodeState::Blocked,
            to: NodeState::Complete,
        });
        self.emit(ProgressEvent::ValueAssigned {
            graph,
            node: node_id.clone(),
            value,
            source: ValueSource::User,
            search_results: None,
            calculation: None,
        });

        if let Some(waiter) = waiter {
            // Receiver may be gone when no scheduler is waiting
            let _ = waiter.send(node_id.clone());
        }
        Ok(graph)
    }
}

/// Exclusive scheduling claim on one graph of a session
#[derive(Debug)]
pub struct RunGuard {
    state: Arc<Mutex<SessionState>>,
    graph: GraphKind,
}

impl RunGuard {
    /// The claimed graph
    #[inline]
    #[must_use]
    pub fn graph(&self) -> GraphKind {
        self.graph
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.state.lock().running.remove(&self.graph);
    }
}

fn locate(state: &SessionState, node_id: &NodeId) -> Result<GraphKind, InputError> {
    let kinds = [GraphKind::Information, GraphKind::Exploration];
    if let Some(kind) = kinds.into_iter().find(|&k| {
        state
            .graph(k)
            .get(node_id)
            .is_some_and(scout_graph::Node::is_awaiting_input)
    }) {
        return Ok(kind);
    }
    let node = kinds
        .into_iter()
        .find_map(|k| state.graph(k).get(node_id))
        .ok_or_else(|| InputError::NotFound(node_id.clone()))?;
    Err(InputError::InvalidState {
        node: node_id.clone(),
        state: node.state(),
        method: node.gather_method(),
    })
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("goal", &self.goal)
            .finish_non_exhaustive()
    }
}

/// Live sessions by id, for routing external input
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, Session>>,
}

impl SessionRegistry {
    /// Create an empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session
    pub fn insert(&self, session: Session) {
        self.sessions.insert(session.id(), session);
    }

    /// Look up a session
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Drop a session
    pub fn remove(&self, id: &SessionId) -> Option<Session> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// Number of live sessions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no session is live
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_graph::{GraphSpecification, NodeSpec, SearchQuery};

    fn session_with_nodes() -> Session {
        let session = Session::new("coffee shop", "");
        session.with_state(|s| {
            s.information.extend(GraphSpecification::new(
                "coffee shop",
                vec![
                    NodeSpec::web_search("n1", "rent", "r", vec![SearchQuery::new("rent", "c")]),
                    NodeSpec::ask_user("n2", "budget", "r"),
                ],
            ));
            let n2 = s.information.get_mut(&NodeId::new("n2")).unwrap();
            n2.transition(NodeState::Blocked).unwrap();
        });
        session
    }

    #[test]
    fn provide_input_completes_and_records_fact() {
        let session = session_with_nodes();
        let graph = session.provide_input(&NodeId::new("n2"), "$5000").unwrap();
        assert_eq!(graph, GraphKind::Information);

        let snapshot = session.snapshot();
        let n2 = snapshot.information.get(&NodeId::new("n2")).unwrap();
        assert_eq!(n2.state(), NodeState::Complete);
        assert_eq!(n2.value(), Some("$5000"));
        assert_eq!(n2.value_source(), Some(ValueSource::User));
        assert_eq!(snapshot.facts.get("budget"), Some("$5000"));
    }

    #[test]
    fn provide_input_on_search_node_is_invalid() {
        let session = session_with_nodes();
        let before = session.snapshot().information.get(&NodeId::new("n1")).cloned();

        let err = session.provide_input(&NodeId::new("n1"), "x").unwrap_err();
        assert!(matches!(err, InputError::InvalidState { state: NodeState::Pending, .. }));
        assert_eq!(session.snapshot().information.get(&NodeId::new("n1")).cloned(), before);
    }

    #[test]
    fn provide_input_unknown_node() {
        let session = session_with_nodes();
        assert_eq!(
            session.provide_input(&NodeId::new("zz"), "x"),
            Err(InputError::NotFound(NodeId::new("zz")))
        );
    }

    #[test]
    fn second_input_is_rejected() {
        let session = session_with_nodes();
        session.provide_input(&NodeId::new("n2"), "$5000").unwrap();
        let err = session.provide_input(&NodeId::new("n2"), "$6000").unwrap_err();
        assert!(matches!(err, InputError::InvalidState { state: NodeState::Complete, .. }));
    }

    #[tokio::test]
    async fn waiter_is_signalled() {
        let session = session_with_nodes();
        let guard = session.claim_graph(GraphKind::Information).unwrap();
        let mut waiters = session.register_input_waiters(&guard);
        assert_eq!(waiters.len(), 1);
        session.provide_input(&NodeId::new("n2"), "$5000").unwrap();
        assert_eq!(waiters.remove(0).await.unwrap(), NodeId::new("n2"));
    }

    #[test]
    fn graph_claim_is_exclusive_until_dropped() {
        let session = session_with_nodes();
        let guard = session.claim_graph(GraphKind::Information).unwrap();
        assert!(session.claim_graph(GraphKind::Information).is_none());
        assert!(session.claim_graph(GraphKind::Exploration).is_some());
        assert!(session.with_state(|s| s.is_running(GraphKind::Information)));

        drop(guard);
        assert!(!session.with_state(|s| s.is_running(GraphKind::Information)));
        assert!(session.claim_graph(GraphKind::Information).is_some());
    }

    #[test]
    fn registry_round_trip() {
        let registry = SessionRegistry::new();
        let session = Session::new("goal", "");
        let id = session.id();
        registry.insert(session);
        assert_eq!(registry.get(&id).map(|s| s.id()), Some(id));
        assert!(registry.remove(&id).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn session_id_parses_display() {
        let id = SessionId::new();
        assert_eq!(id.to_string().parse::<SessionId>().unwrap(), id);
    }
}

//! Multi-round exploration driver
//!
//! The entry point of the engine. For each of the two graphs it repeats
//! generation and processing for up to `max_depth` rounds, feeding the
//! accumulated facts and every explored node into the next round.

use crate::collaborators::Collaborators;
use crate::config::ExplorerConfig;
use crate::error::{ExplorerError, GraphKind};
use crate::events::{ProgressEvent, ProgressObserver};
use crate::generation::round_context;
use crate::scheduler::{RunSummary, Scheduler};
use crate::session::{Session, SessionId, SessionRegistry};
use scout_graph::{FactSet, NodeId, SpecValidator, ValidationError};
use serde::Serialize;
use std::sync::Arc;

/// Outcome of the rounds run for one graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundsReport {
    /// Graph the rounds belong to
    pub graph: GraphKind,
    /// Scheduler summary per accepted round
    pub rounds: Vec<RunSummary>,
    /// Nodes in the cumulative graph
    pub nodes: usize,
}

impl RoundsReport {
    /// Summary of the last round, if any ran
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&RunSummary> {
        self.rounds.last()
    }
}

/// Outcome of a full exploration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplorationReport {
    /// Session explored
    pub session: SessionId,
    /// Information-needs rounds
    pub information: RoundsReport,
    /// Solution-exploration rounds
    pub exploration: RoundsReport,
    /// Facts at the end
    pub facts: FactSet,
}

/// Drives sessions through generation rounds
pub struct Explorer {
    config: ExplorerConfig,
    collaborators: Collaborators,
    observer: Option<Arc<dyn ProgressObserver>>,
    registry: SessionRegistry,
}

impl Explorer {
    /// Create an explorer
    #[must_use]
    pub fn new(config: ExplorerConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            observer: None,
            registry: SessionRegistry::new(),
        }
    }

    /// With an observer attached to every session opened afterwards
    #[inline]
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    /// Live sessions
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Open and register a session for a goal
    pub fn open_session(&self, goal: impl Into<String>, context: impl Into<String>) -> Session {
        let mut session = Session::new(goal, context);
        if let Some(observer) = &self.observer {
            session = session.with_observer(Arc::clone(observer));
        }
        tracing::info!("Opened session {} for goal: {}", session.id(), session.goal());
        self.registry.insert(session.clone());
        session
    }

    /// Look up a registered session
    pub fn session(&self, id: &SessionId) -> Result<Session, ExplorerError> {
        self.registry
            .get(id)
            .ok_or_else(|| ExplorerError::SessionNotFound(id.to_string()))
    }

    /// Unregister a session; in-flight leaf calls are not interrupted
    pub fn close_session(&self, id: &SessionId) -> Option<Session> {
        self.registry.remove(id)
    }

    /// Explore a goal: information-needs rounds, then solution-exploration rounds
    ///
    /// # Workflow
    /// 1. Run up to `max_depth` rounds of the information graph
    /// 2. Run up to `max_depth` rounds of the exploration graph, which sees
    ///    the facts gathered in step 1
    ///
    /// # Errors
    /// A rejected specification, a failed generation call, or a graph
    /// already driven by another scheduler aborts the exploration; nodes from
    /// earlier rounds keep their state.
    pub async fn explore(&self, session: &Session) -> Result<ExplorationReport, ExplorerError> {
        tracing::info!("Exploring goal: {}", session.goal());
        let information = self.run_rounds(session, GraphKind::Information).await?;
        let exploration = self.run_rounds(session, GraphKind::Exploration).await?;
        Ok(ExplorationReport {
            session: session.id(),
            information,
            exploration,
            facts: session.facts(),
        })
    }

    /// Run the generation rounds of one graph
    ///
    /// An empty specification ends the rounds early, except in round 0 where
    /// it is rejected.
    pub async fn run_rounds(
        &self,
        session: &Session,
        graph: GraphKind,
    ) -> Result<RoundsReport, ExplorerError> {
        let mut rounds = Vec::new();

        for round in 0..self.config.max_depth {
            let (facts, explored) =
                session.with_state(|s| (s.facts.clone(), s.graph(graph).nodes().to_vec()));
            let context = round_context(session.context(), round, &facts);

            tracing::info!("Generating {} graph, round {}", graph, round);
            let spec = self
                .collaborators
                .generator(graph)
                .generate(session.goal(), &context, &facts, &explored)
                .await
                .map_err(|source| ExplorerError::Generation {
                    graph,
                    round,
                    source,
                })?;

            if spec.is_empty() && round > 0 {
                tracing::info!("{} graph round {} produced no nodes, stopping", graph, round);
                break;
            }

            let added = session
                .with_state(|s| {
                    let target = s.graph_mut(graph);
                    SpecValidator::with_known_ids(target.ids()).validate(&spec)?;
                    Ok::<_, ValidationError>(target.extend(spec))
                })
                .map_err(|source| ExplorerError::Validation {
                    graph,
                    round,
                    source,
                })?;
            tracing::info!("{} graph round {}: {} new node(s)", graph, round, added.len());
            session.emit(ProgressEvent::RoundGenerated {
                graph,
                round,
                nodes: added,
            });

            let summary = Scheduler::new(session, &self.collaborators, self.config.mode)
                .run(graph)
                .await?;
            session.with_state(|s| s.fold_facts(graph));
            rounds.push(summary);
        }

        let nodes = session.with_state(|s| s.graph(graph).len());
        Ok(RoundsReport {
            graph,
            rounds,
            nodes,
        })
    }

    /// Re-drive the scheduler over a graph, e.g. after input arrived post-run
    ///
    /// # Errors
    /// `AlreadyRunning` while an exploration or another resume is driving the
    /// graph; input delivered to that run is picked up by it.
    pub async fn resume(
        &self,
        session: &Session,
        graph: GraphKind,
    ) -> Result<RunSummary, ExplorerError> {
        tracing::info!("Resuming {} graph of session {}", graph, session.id());
        let summary = Scheduler::new(session, &self.collaborators, self.config.mode)
            .run(graph)
            .await?;
        session.with_state(|s| s.fold_facts(graph));
        Ok(summary)
    }

    /// Route user input to a registered session
    pub fn provide_input(
        &self,
        session: &SessionId,
        node: &NodeId,
        value: impl Into<String>,
    ) -> Result<GraphKind, ExplorerError> {
        Ok(self.session(session)?.provide_input(node, value)?)
    }
}

impl std::fmt::Debug for Explorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Explorer")
            .field("config", &self.config)
            .field("sessions", &self.registry.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        MockBreakdownPlanner, MockCalculationSynthesizer, MockEstimator, MockGraphGenerator,
        MockSearcher,
    };
    use crate::error::InputError;
    use scout_graph::{GraphSpecification, Node, NodeSpec, SearchQuery, SearchResult};

    fn explorer(generator: MockGraphGenerator, max_depth: usize) -> Explorer {
        let mut searcher = MockSearcher::new();
        searcher
            .expect_search()
            .returning(|q, _| Ok(vec![SearchResult::new(format!("{q} is known"), "quote", "https://s")]));
        let collaborators = Collaborators::new(
            Arc::new(generator),
            Arc::new(searcher),
            Arc::new(MockBreakdownPlanner::new()),
            Arc::new(MockEstimator::new()),
            Arc::new(MockCalculationSynthesizer::new()),
        );
        Explorer::new(ExplorerConfig::new().with_max_depth(max_depth), collaborators)
    }

    fn round(depth: usize) -> impl Fn(&str, &str, &FactSet, &[Node]) -> bool + Send + 'static {
        move |_, context, _, _| context.contains(&format!("Current exploration depth: {depth}"))
    }

    #[tokio::test]
    async fn facts_flow_into_next_round() {
        let mut generator = MockGraphGenerator::new();
        generator.expect_generate().withf(round(0)).returning(|goal, _, _, explored| {
            assert!(explored.is_empty());
            Ok(GraphSpecification::new(
                goal,
                vec![NodeSpec::web_search("n1", "rent", "r", vec![SearchQuery::new("rent", "")])],
            ))
        });
        generator.expect_generate().withf(round(1)).returning(|goal, context, facts, explored| {
            assert_eq!(facts.get("rent"), Some("rent is known"));
            assert!(context.contains("- rent: rent is known"));
            assert_eq!(explored.len(), 1);
            Ok(GraphSpecification::new(
                goal,
                vec![NodeSpec::web_search("n2", "foot traffic", "r", vec![SearchQuery::new("traffic", "")])
                    .depends_on("n1")],
            ))
        });
        let explorer = explorer(generator, 2);
        let session = explorer.open_session("coffee shop", "");

        let report = explorer.run_rounds(&session, GraphKind::Information).await.unwrap();

        assert_eq!(report.rounds.len(), 2);
        assert_eq!(report.nodes, 2);
        assert!(report.last().unwrap().is_settled());
        assert_eq!(session.facts().len(), 2);
    }

    #[tokio::test]
    async fn empty_later_round_stops_early() {
        let mut generator = MockGraphGenerator::new();
        generator.expect_generate().withf(round(0)).times(1).returning(|goal, _, _, _| {
            Ok(GraphSpecification::new(goal, vec![NodeSpec::ask_user("n1", "budget", "r")]))
        });
        generator
            .expect_generate()
            .withf(round(1))
            .times(1)
            .returning(|goal, _, _, _| Ok(GraphSpecification::new(goal, vec![])));
        let explorer = explorer(generator, 5);
        let session = explorer.open_session("coffee shop", "");

        let report = explorer.run_rounds(&session, GraphKind::Information).await.unwrap();
        assert_eq!(report.rounds.len(), 1);
        assert_eq!(report.last().unwrap().awaiting_input, vec![NodeId::new("n1")]);
    }

    #[tokio::test]
    async fn empty_first_round_is_rejected() {
        let mut generator = MockGraphGenerator::new();
        generator
            .expect_generate()
            .returning(|goal, _, _, _| Ok(GraphSpecification::new(goal, vec![])));
        let explorer = explorer(generator, 1);
        let session = explorer.open_session("coffee shop", "");

        let err = explorer.explore(&session).await.unwrap_err();
        assert!(matches!(
            err,
            ExplorerError::Validation {
                graph: GraphKind::Information,
                round: 0,
                source: ValidationError::EmptySpecification,
            }
        ));
    }

    #[tokio::test]
    async fn duplicate_id_across_rounds_runs_nothing() {
        let mut generator = MockGraphGenerator::new();
        generator.expect_generate().returning(|goal, _, _, _| {
            Ok(GraphSpecification::new(
                goal,
                vec![NodeSpec::web_search("n1", "rent", "r", vec![SearchQuery::new("rent", "")])],
            ))
        });
        let explorer = explorer(generator, 2);
        let session = explorer.open_session("coffee shop", "");

        let err = explorer.run_rounds(&session, GraphKind::Information).await.unwrap_err();
        assert_eq!(err.round(), Some(1));
        assert_eq!(session.snapshot().information.len(), 1);
    }

    #[tokio::test]
    async fn input_routes_through_registry() {
        let mut generator = MockGraphGenerator::new();
        generator.expect_generate().returning(|goal, _, _, _| {
            Ok(GraphSpecification::new(goal, vec![NodeSpec::ask_user("n1", "budget", "r")]))
        });
        let explorer = explorer(generator, 1);
        let session = explorer.open_session("coffee shop", "");
        explorer.run_rounds(&session, GraphKind::Information).await.unwrap();

        let graph = explorer
            .provide_input(&session.id(), &NodeId::new("n1"), "$5000")
            .unwrap();
        assert_eq!(graph, GraphKind::Information);
        assert!(matches!(
            explorer.provide_input(&session.id(), &NodeId::new("n1"), "$6000"),
            Err(ExplorerError::Input(InputError::InvalidState { .. }))
        ));
        assert!(matches!(
            explorer.provide_input(&SessionId::new(), &NodeId::new("n1"), "x"),
            Err(ExplorerError::SessionNotFound(_))
        ));
        assert!(explorer.resume(&session, GraphKind::Information).await.unwrap().is_settled());
    }
}

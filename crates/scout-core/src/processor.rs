//! Node processor
//!
//! Dispatches on node kind and drives one node through its state machine:
//! - web-search gather: search, then the fallback chain when nothing is found
//! - ask-user gather: block until `provide_input`
//! - calculate: synthesize, then execute in the sandbox
//!
//! Any error is contained here: the node is forced to `Blocked` with the
//! failure recorded, and processing of the graph continues.

use crate::collaborators::{CalculationInputs, Collaborators};
use crate::error::{GraphKind, NodeProcessingError};
use crate::events::ProgressEvent;
use crate::fallback::{FallbackChain, FallbackOutcome};
use crate::generation::node_context;
use crate::session::Session;
use scout_graph::{
    join_facts, stringify_result, CalculationRecord, GatherMethod, Node, NodeError, NodeId,
    NodeKind, NodeState, SearchQuery, ValueSource,
};

/// Processes nodes of one graph within a session
#[derive(Debug, Clone, Copy)]
pub struct NodeProcessor<'a> {
    session: &'a Session,
    graph: GraphKind,
    collaborators: &'a Collaborators,
}

impl<'a> NodeProcessor<'a> {
    /// Processor for a graph of the session
    #[must_use]
    pub fn new(session: &'a Session, graph: GraphKind, collaborators: &'a Collaborators) -> Self {
        Self {
            session,
            graph,
            collaborators,
        }
    }

    /// Process a node and return the state it ended in
    ///
    /// Never fails: processing errors leave the node `Blocked`.
    pub async fn process(&self, id: &NodeId) -> Option<NodeState> {
        if let Err(err) = self.try_process(id).await {
            tracing::error!("Error processing {} node {}: {}", self.graph, id, err);
            self.block(id, &err);
        }
        self.session
            .with_state(|s| s.graph(self.graph).get(id).map(Node::state))
    }

    async fn try_process(&self, id: &NodeId) -> Result<(), NodeProcessingError> {
        let node = self.node(id)?;
        tracing::info!("Processing {} node {}: {}", self.graph, id, node.question);

        match &node.kind {
            NodeKind::Gather {
                method: GatherMethod::WebSearch,
                queries,
            } => self.gather_by_search(&node, queries).await,
            NodeKind::Gather {
                method: GatherMethod::AskUser,
                ..
            } => {
                self.transition(id, NodeState::Blocked)?;
                tracing::info!("Node {} is waiting for user input", id);
                Ok(())
            }
            NodeKind::Calculate { input_node_ids, .. } => {
                self.calculate(&node, input_node_ids).await
            }
        }
    }

    async fn gather_by_search(
        &self,
        node: &Node,
        queries: &[SearchQuery],
    ) -> Result<(), NodeProcessingError> {
        let id = &node.id;
        self.transition(id, NodeState::Searching)?;

        let results = self
            .collaborators
            .searcher
            .search(&node.question, queries)
            .await?;
        if !results.is_empty() {
            let value = join_facts(&results);
            return self.complete(id, value, ValueSource::Search, |n| {
                n.search_results = Some(results);
            });
        }

        tracing::info!("No search results for {}, attempting breakdown", id);
        self.transition(id, NodeState::NeedsBreakdown)?;

        let facts = self.session.facts();
        let context = node_context(&node.question, &node.rationale);
        let chain = FallbackChain::new(self.collaborators);

        let attempt = chain.plan(&node.question, &context, queries, &facts).await?;
        self.update(id, |n| n.record_breakdown(attempt.clone()))?;
        self.session.emit(ProgressEvent::BreakdownCreated {
            graph: self.graph,
            parent: id.clone(),
            question: node.question.clone(),
            rationale: attempt.rationale.clone(),
            nodes: attempt.new_nodes.clone(),
        });

        let outcome = chain.resolve(&attempt, &context, queries, &facts).await?;
        self.update(id, |n| n.settle_breakdown(outcome.was_successful()))?;

        let value = outcome.value();
        let source = outcome.source();
        match outcome {
            FallbackOutcome::Found(results) => self.complete(id, value, source, |n| {
                n.search_results = Some(results);
            }),
            FallbackOutcome::Estimated(estimate) => {
                self.session.emit(ProgressEvent::EstimateCreated {
                    graph: self.graph,
                    parent: id.clone(),
                    estimate: estimate.clone(),
                });
                self.complete(id, value, source, |n| n.estimate = Some(estimate))
            }
        }
    }

    async fn calculate(&self, node: &Node, input_ids: &[NodeId]) -> Result<(), NodeProcessingError> {
        let id = &node.id;
        self.transition(id, NodeState::Calculating)?;

        let inputs = self.collect_inputs(id, input_ids)?;
        let spec = self
            .collaborators
            .synthesizer
            .synthesize(&node.question, &inputs)
            .await?;

        match self.collaborators.executor.execute(&spec.code, &inputs) {
            Ok(evaluation) => {
                let value = stringify_result(&evaluation.result);
                let record = CalculationRecord {
                    code: spec.code,
                    explanation: spec.explanation,
                    result: Some(evaluation.result),
                    warnings: evaluation.warnings,
                };
                self.complete(id, value, ValueSource::Calculation, |n| {
                    n.calculation_result = Some(record);
                })
            }
            Err(failure) => {
                tracing::warn!(
                    "Calculation for {} failed, completing without value: {:?}",
                    id,
                    failure.warnings
                );
                let record = CalculationRecord {
                    code: spec.code,
                    explanation: spec.explanation,
                    result: None,
                    warnings: failure.warnings,
                };
                self.update(id, |n| {
                    n.complete_without_value()?;
                    n.calculation_result = Some(record);
                    Ok(())
                })?;
                self.emit_transition(id, NodeState::Calculating, NodeState::Complete);
                Ok(())
            }
        }
    }

    fn collect_inputs(
        &self,
        id: &NodeId,
        input_ids: &[NodeId],
    ) -> Result<CalculationInputs, NodeProcessingError> {
        self.session.with_state(|s| {
            let graph = s.graph(self.graph);
            input_ids
                .iter()
                .map(|input| {
                    graph
                        .get(input)
                        .filter(|n| n.state().is_complete())
                        .map(|n| (input.clone(), n.value().map(str::to_string)))
                        .ok_or_else(|| NodeProcessingError::InputNotReady {
                            node: id.clone(),
                            input: input.clone(),
                        })
                })
                .collect()
        })
    }

    fn node(&self, id: &NodeId) -> Result<Node, NodeError> {
        self.session.with_state(|s| {
            s.graph(self.graph)
                .get(id)
                .cloned()
                .ok_or_else(|| NodeError::NotFound(id.clone()))
        })
    }

    fn update<R>(
        &self,
        id: &NodeId,
        f: impl FnOnce(&mut Node) -> Result<R, NodeError>,
    ) -> Result<R, NodeError> {
        self.session.with_state(|s| {
            let node = s
                .graph_mut(self.graph)
                .get_mut(id)
                .ok_or_else(|| NodeError::NotFound(id.clone()))?;
            f(node)
        })
    }

    fn transition(&self, id: &NodeId, to: NodeState) -> Result<(), NodeError> {
        let from = self.update(id, |n| {
            let from = n.state();
            n.transition(to).map(|()| from)
        })?;
        self.emit_transition(id, from, to);
        Ok(())
    }

    /// Assign the value, attach its payload and fold it into the facts
    fn complete(
        &self,
        id: &NodeId,
        value: String,
        source: ValueSource,
        attach: impl FnOnce(&mut Node),
    ) -> Result<(), NodeProcessingError> {
        let (from, search_results, calculation) = self.session.with_state(|s| {
            let node = s
                .graph_mut(self.graph)
                .get_mut(id)
                .ok_or_else(|| NodeError::NotFound(id.clone()))?;
            let from = node.state();
            node.complete_with(value.clone(), source)?;
            attach(node);
            let payload = (from, node.search_results.clone(), node.calculation_result.clone());
            let question = node.question.clone();
            s.facts.record(question, value.clone());
            Ok::<_, NodeError>(payload)
        })?;

        tracing::info!("Node {} complete ({}): {}", id, source, value);
        self.emit_transition(id, from, NodeState::Complete);
        self.session.emit(ProgressEvent::ValueAssigned {
            graph: self.graph,
            node: id.clone(),
            value,
            source,
            search_results,
            calculation,
        });
        Ok(())
    }

    fn block(&self, id: &NodeId, err: &NodeProcessingError) {
        let blocked = self.update(id, |n| {
            let from = n.state();
            n.fail(err.to_string()).map(|()| from)
        });
        match blocked {
            Ok(from) => self.emit_transition(id, from, NodeState::Blocked),
            Err(e) => tracing::warn!("Could not block node {}: {}", id, e),
        }
    }

    fn emit_transition(&self, id: &NodeId, from: NodeState, to: NodeState) {
        tracing::debug!("{} node {}: {} -> {}", self.graph, id, from, to);
        self.session.emit(ProgressEvent::StateChanged {
            graph: self.graph,
            node: id.clone(),
            from,
            to,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        BreakdownPlan, CalculationSpec, MockBreakdownPlanner, MockCalculationSynthesizer,
        MockEstimator, MockGraphGenerator, MockSearcher,
    };
    use scout_graph::{Estimate, GraphSpecification, NodeSpec, SearchResult};
    use std::sync::Arc;

    struct Mocks {
        searcher: MockSearcher,
        planner: MockBreakdownPlanner,
        estimator: MockEstimator,
        synthesizer: MockCalculationSynthesizer,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                searcher: MockSearcher::new(),
                planner: MockBreakdownPlanner::new(),
                estimator: MockEstimator::new(),
                synthesizer: MockCalculationSynthesizer::new(),
            }
        }

        fn into_collaborators(self) -> Collaborators {
            Collaborators::new(
                Arc::new(MockGraphGenerator::new()),
                Arc::new(self.searcher),
                Arc::new(self.planner),
                Arc::new(self.estimator),
                Arc::new(self.synthesizer),
            )
        }
    }

    fn session(nodes: Vec<NodeSpec>) -> Session {
        let session = Session::new("coffee shop", "");
        session.with_state(|s| {
            s.information
                .extend(GraphSpecification::new("coffee shop", nodes));
        });
        session
    }

    fn rent_node() -> NodeSpec {
        NodeSpec::web_search(
            "n1",
            "average commercial rent per sqft downtown",
            "costs",
            vec![SearchQuery::new("commercial rent downtown", "")],
        )
    }

    fn node(session: &Session, id: &str) -> Node {
        session
            .snapshot()
            .information
            .get(&NodeId::new(id))
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn search_hit_completes_with_joined_facts() {
        let mut mocks = Mocks::new();
        mocks.searcher.expect_search().times(1).returning(|_, _| {
            Ok(vec![
                SearchResult::new("rent is $40/sqft", "q", "https://a"),
                SearchResult::new("vacancy is low", "q", "https://b"),
            ])
        });
        mocks.planner.expect_breakdown().never();
        let collaborators = mocks.into_collaborators();
        let session = session(vec![rent_node()]);

        let state = NodeProcessor::new(&session, GraphKind::Information, &collaborators)
            .process(&NodeId::new("n1"))
            .await;

        assert_eq!(state, Some(NodeState::Complete));
        let n1 = node(&session, "n1");
        assert_eq!(n1.value(), Some("rent is $40/sqft; vacancy is low"));
        assert_eq!(n1.value_source(), Some(ValueSource::Search));
        assert!(n1.breakdown_attempt().is_none());
        assert_eq!(
            session.facts().get("average commercial rent per sqft downtown"),
            Some("rent is $40/sqft; vacancy is low")
        );
    }

    #[tokio::test]
    async fn empty_search_breaks_down_exactly_once() {
        let mut mocks = Mocks::new();
        mocks.searcher.expect_search().times(2).returning(|_, _| Ok(vec![]));
        mocks.planner.expect_breakdown().times(1).returning(|_, _, _, _| {
            Ok(BreakdownPlan {
                rationale: "narrow".to_string(),
                new_nodes: vec![NodeSpec::web_search(
                    "n1a",
                    "median retail rent downtown 2024",
                    "narrow",
                    vec![SearchQuery::new("median retail rent downtown 2024", "")],
                )],
            })
        });
        mocks.estimator.expect_estimate().times(1).returning(|_, _, _, _| {
            Ok(Estimate {
                value: "$35/sqft".to_string(),
                reasoning: "averages".to_string(),
                assumptions: vec![],
            })
        });
        let collaborators = mocks.into_collaborators();
        let session = session(vec![rent_node()]);
        let processor = NodeProcessor::new(&session, GraphKind::Information, &collaborators);

        processor.process(&NodeId::new("n1")).await;
        // Complete nodes cannot be re-entered
        processor.process(&NodeId::new("n1")).await;

        let n1 = node(&session, "n1");
        assert_eq!(n1.state(), NodeState::Complete);
        assert_eq!(n1.value(), Some("$35/sqft"));
        assert_eq!(n1.value_source(), Some(ValueSource::Estimate));
        assert!(!n1.breakdown_attempt().unwrap().was_successful);
        assert!(n1.estimate.is_some());
    }

    #[tokio::test]
    async fn collaborator_failure_blocks_node() {
        let mut mocks = Mocks::new();
        mocks
            .searcher
            .expect_search()
            .returning(|_, _| Err(crate::error::CollaboratorError::Unavailable("down".into())));
        let collaborators = mocks.into_collaborators();
        let session = session(vec![rent_node()]);

        let state = NodeProcessor::new(&session, GraphKind::Information, &collaborators)
            .process(&NodeId::new("n1"))
            .await;

        assert_eq!(state, Some(NodeState::Blocked));
        let n1 = node(&session, "n1");
        assert!(n1.has_failed());
        assert!(n1.value().is_none());
    }

    #[tokio::test]
    async fn ask_user_blocks() {
        let collaborators = Mocks::new().into_collaborators();
        let session = session(vec![NodeSpec::ask_user("n2", "monthly budget?", "bounds")]);

        let state = NodeProcessor::new(&session, GraphKind::Information, &collaborators)
            .process(&NodeId::new("n2"))
            .await;

        assert_eq!(state, Some(NodeState::Blocked));
        assert!(node(&session, "n2").is_awaiting_input());
    }

    fn calc_session() -> Session {
        let session = session(vec![
            NodeSpec::ask_user("n1", "rent per sqft?", "r"),
            NodeSpec::ask_user("n2", "monthly budget?", "r"),
            NodeSpec::calculate("n3", "affordable sqft", "r", "budget over monthly rent", vec![
                "n1".into(),
                "n2".into(),
            ]),
        ]);
        session.with_state(|s| {
            for id in ["n1", "n2"] {
                s.information
                    .get_mut(&NodeId::new(id))
                    .unwrap()
                    .transition(NodeState::Blocked)
                    .unwrap();
            }
        });
        session.provide_input(&NodeId::new("n1"), "$40").unwrap();
        session.provide_input(&NodeId::new("n2"), "$5000").unwrap();
        session
    }

    #[tokio::test]
    async fn calculation_success_records_result() {
        let mut mocks = Mocks::new();
        mocks
            .synthesizer
            .expect_synthesize()
            .times(1)
            .withf(|_, inputs| inputs.get(&NodeId::new("n2")) == Some(&Some("$5000".to_string())))
            .returning(|_, _| {
                Ok(CalculationSpec {
                    code: "result = round(n2 / (n1 / 12))".to_string(),
                    explanation: "budget over monthly rent".to_string(),
                })
            });
        let collaborators = mocks.into_collaborators();
        let session = calc_session();

        NodeProcessor::new(&session, GraphKind::Information, &collaborators)
            .process(&NodeId::new("n3"))
            .await;

        let n3 = node(&session, "n3");
        assert_eq!(n3.value(), Some("1500"));
        assert_eq!(n3.value_source(), Some(ValueSource::Calculation));
        assert!(n3.calculation_result.as_ref().unwrap().succeeded());
    }

    #[tokio::test]
    async fn calculation_failure_is_soft() {
        let mut mocks = Mocks::new();
        mocks.synthesizer.expect_synthesize().returning(|_, _| {
            Ok(CalculationSpec {
                code: "result = n2 / 0".to_string(),
                explanation: "broken".to_string(),
            })
        });
        let collaborators = mocks.into_collaborators();
        let session = calc_session();

        let state = NodeProcessor::new(&session, GraphKind::Information, &collaborators)
            .process(&NodeId::new("n3"))
            .await;

        assert_eq!(state, Some(NodeState::Complete));
        let n3 = node(&session, "n3");
        assert!(n3.value().is_none());
        assert!(n3.value_source().is_none());
        let record = n3.calculation_result.unwrap();
        assert!(record.result.is_none());
        assert!(!record.warnings.is_empty());
    }

    #[tokio::test]
    async fn incomplete_input_blocks_calculation() {
        let mut mocks = Mocks::new();
        mocks.synthesizer.expect_synthesize().never();
        let collaborators = mocks.into_collaborators();
        let session = session(vec![
            NodeSpec::ask_user("n1", "rent?", "r"),
            NodeSpec::calculate("n3", "sqft", "r", "e", vec!["n1".into()]),
        ]);

        let state = NodeProcessor::new(&session, GraphKind::Information, &collaborators)
            .process(&NodeId::new("n3"))
            .await;

        assert_eq!(state, Some(NodeState::Blocked));
        assert!(node(&session, "n3").has_failed());
    }
}

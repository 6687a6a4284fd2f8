//! Testing utilities for the scout workspace
//!
//! Shared fixtures: the coffee-shop scenario, collaborator wrappers that
//! count or fail calls, and an observer that records every event.

#![allow(missing_docs)]

use indexmap::IndexMap;
use parking_lot::Mutex;
use scout_core::{
    BreakdownPlan, BreakdownPlanner, CalculationSpec, CollaboratorError, Collaborators, Estimator,
    ProgressEvent, ProgressObserver, ReplayCollaborators, Searcher, SessionId, Transcript,
};
use scout_graph::{
    Estimate, FactSet, GraphSpecification, NodeId, NodeSpec, NodeState, SearchQuery, SearchResult,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const COFFEE_GOAL: &str = "Should I open a coffee shop downtown?";
pub const RENT_QUESTION: &str = "average commercial rent per sqft downtown";
pub const BUDGET_QUESTION: &str = "what is your monthly budget?";
pub const SQFT_QUESTION: &str = "how many square feet can I afford?";
pub const RENT_QUERY: &str = "average commercial rent per sqft downtown";
pub const NARROW_RENT_QUERY: &str = "median retail rent downtown 2024";
pub const BUDGET: &str = "$5000";

pub fn id(raw: &str) -> NodeId {
    NodeId::new(raw)
}

/// Round 0 of the information graph: n1 (search), n2 (ask user), n3 (calculate)
pub fn coffee_shop_round() -> GraphSpecification {
    GraphSpecification::new(
        COFFEE_GOAL,
        vec![
            NodeSpec::web_search(
                "n1",
                RENT_QUESTION,
                "rent is the largest fixed cost",
                vec![SearchQuery::new(RENT_QUERY, "commercial real estate listings")],
            ),
            NodeSpec::ask_user("n2", BUDGET_QUESTION, "bounds the affordable space"),
            NodeSpec::calculate(
                "n3",
                SQFT_QUESTION,
                "decides which locations are realistic",
                "monthly budget divided by monthly rent per sqft",
                vec![id("n1"), id("n2")],
            ),
        ],
    )
}

/// One exploration round with a single searchable approach
pub fn coffee_shop_exploration_round() -> GraphSpecification {
    GraphSpecification::new(
        COFFEE_GOAL,
        vec![NodeSpec::web_search(
            "e1",
            "what does a small coffee kiosk cost to set up?",
            "a kiosk avoids most of the rent",
            vec![SearchQuery::new("coffee kiosk startup cost", "")],
        )],
    )
}

pub fn rent_breakdown() -> BreakdownPlan {
    BreakdownPlan {
        rationale: "a narrower, dated query is more likely to be cited".to_string(),
        new_nodes: vec![NodeSpec::web_search(
            "n1a",
            "median retail rent downtown in 2024",
            "recent listings",
            vec![SearchQuery::new(NARROW_RENT_QUERY, "")],
        )],
    }
}

pub fn rent_estimate() -> Estimate {
    Estimate {
        value: "$35 per sqft per year".to_string(),
        reasoning: "regional averages for mid-size downtowns".to_string(),
        assumptions: vec!["mid-size city".to_string()],
    }
}

/// The coffee-shop scenario: the rent search finds nothing, the narrower
/// breakdown query succeeds, the budget comes from the user.
pub fn coffee_shop_transcript() -> Transcript {
    let mut user_inputs = IndexMap::new();
    user_inputs.insert(id("n2"), BUDGET.to_string());

    Transcript {
        goal: COFFEE_GOAL.to_string(),
        context: String::new(),
        information_rounds: vec![coffee_shop_round()],
        exploration_rounds: vec![coffee_shop_exploration_round()],
        searches: HashMap::from([
            (
                NARROW_RENT_QUERY.to_string(),
                vec![SearchResult::new(
                    "Median retail rent downtown: $40/sqft per year",
                    "Downtown retail space leased at a median of $40 per square foot",
                    "https://example.com/downtown-rent-2024",
                )],
            ),
            (
                "coffee kiosk startup cost".to_string(),
                vec![SearchResult::new(
                    "Kiosk setup typically costs $25,000",
                    "Most kiosk operators spent around $25,000 to open",
                    "https://example.com/kiosk",
                )],
            ),
        ]),
        breakdowns: HashMap::from([(RENT_QUESTION.to_string(), rent_breakdown())]),
        estimates: HashMap::from([(RENT_QUESTION.to_string(), rent_estimate())]),
        calculations: HashMap::from([(
            SQFT_QUESTION.to_string(),
            CalculationSpec {
                code: "monthly_rent_per_sqft = input_data[\"n1\"] / 12\nresult = round(input_data[\"n2\"] / monthly_rent_per_sqft)".to_string(),
                explanation: "monthly budget divided by monthly rent per sqft".to_string(),
            },
        )]),
        user_inputs,
    }
}

/// The same scenario with no narrower citation either, so rent is estimated
pub fn coffee_shop_transcript_without_citations() -> Transcript {
    let mut transcript = coffee_shop_transcript();
    transcript.searches.remove(NARROW_RENT_QUERY);
    transcript
}

pub fn collaborators(transcript: Transcript) -> Collaborators {
    ReplayCollaborators::new(transcript).into_collaborators()
}

/// Counts breakdown calls before delegating
pub struct CountingPlanner {
    inner: Arc<dyn BreakdownPlanner>,
    calls: AtomicUsize,
}

impl CountingPlanner {
    pub fn new(inner: Arc<dyn BreakdownPlanner>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl BreakdownPlanner for CountingPlanner {
    async fn breakdown(
        &self,
        question: &str,
        context: &str,
        failed_queries: &[SearchQuery],
        facts: &FactSet,
    ) -> Result<BreakdownPlan, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .breakdown(question, context, failed_queries, facts)
            .await
    }
}

/// Records the failed queries each estimate was asked with
#[derive(Default)]
pub struct RecordingEstimator {
    pub requests: Mutex<Vec<Vec<String>>>,
}

#[async_trait::async_trait]
impl Estimator for RecordingEstimator {
    async fn estimate(
        &self,
        _question: &str,
        _context: &str,
        failed_queries: &[SearchQuery],
        _facts: &FactSet,
    ) -> Result<Estimate, CollaboratorError> {
        self.requests
            .lock()
            .push(failed_queries.iter().map(|q| q.query.clone()).collect());
        Ok(rent_estimate())
    }
}

/// Search that is always down
#[derive(Debug, Default)]
pub struct UnavailableSearcher;

#[async_trait::async_trait]
impl Searcher for UnavailableSearcher {
    async fn search(
        &self,
        _question: &str,
        _queries: &[SearchQuery],
    ) -> Result<Vec<SearchResult>, CollaboratorError> {
        Err(CollaboratorError::Unavailable("search backend down".to_string()))
    }
}

/// Observer keeping every event in order
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<(SessionId, ProgressEvent)>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    /// States a node moved through, starting from `Pending`
    pub fn states_of(&self, node: &str) -> Vec<NodeState> {
        let node = id(node);
        let mut states = vec![NodeState::Pending];
        for event in self.events() {
            if let ProgressEvent::StateChanged { node: n, to, .. } = event {
                if n == node {
                    states.push(to);
                }
            }
        }
        states
    }

    pub fn count(&self, pred: impl Fn(&ProgressEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|(_, e)| pred(e)).count()
    }
}

impl ProgressObserver for RecordingObserver {
    fn notify(&self, session: &SessionId, event: &ProgressEvent) {
        self.events.lock().push((*session, event.clone()));
    }
}

//! Fallback chain for searches that found nothing
//!
//! search → breakdown → estimate, attempted once per node:
//! 1. Plan a breakdown into narrower sub-questions
//! 2. Search every sub-question that carries queries
//! 3. Any findings win; otherwise ask for an estimate using every failed query
//!
//! Sub-nodes are never scheduled; only their aggregated outcome reaches the parent.

use crate::collaborators::{BreakdownPlanner, Collaborators, Estimator, Searcher};
use crate::error::CollaboratorError;
use scout_graph::{
    join_facts, BreakdownAttempt, Estimate, FactSet, SearchQuery, SearchResult, ValueSource,
};

/// How the fallback resolved a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackOutcome {
    /// At least one sub-search returned findings
    Found(Vec<SearchResult>),
    /// Every sub-search came back empty
    Estimated(Estimate),
}

impl FallbackOutcome {
    /// Whether the breakdown's sub-searches succeeded
    #[inline]
    #[must_use]
    pub fn was_successful(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Value for the parent node
    #[must_use]
    pub fn value(&self) -> String {
        match self {
            Self::Found(results) => join_facts(results),
            Self::Estimated(estimate) => estimate.value.clone(),
        }
    }

    /// Provenance of the parent's value
    #[inline]
    #[must_use]
    pub fn source(&self) -> ValueSource {
        match self {
            Self::Found(_) => ValueSource::Search,
            Self::Estimated(_) => ValueSource::Estimate,
        }
    }
}

/// Runs the breakdown and estimate steps against the session's collaborators
#[derive(Clone, Copy)]
pub struct FallbackChain<'a> {
    searcher: &'a dyn Searcher,
    planner: &'a dyn BreakdownPlanner,
    estimator: &'a dyn Estimator,
}

impl<'a> FallbackChain<'a> {
    /// Chain over the given collaborators
    #[must_use]
    pub fn new(collaborators: &'a Collaborators) -> Self {
        Self {
            searcher: collaborators.searcher.as_ref(),
            planner: collaborators.planner.as_ref(),
            estimator: collaborators.estimator.as_ref(),
        }
    }

    /// Ask for a breakdown; `was_successful` starts false
    pub async fn plan(
        &self,
        question: &str,
        context: &str,
        failed_queries: &[SearchQuery],
        facts: &FactSet,
    ) -> Result<BreakdownAttempt, CollaboratorError> {
        let plan = self
            .planner
            .breakdown(question, context, failed_queries, facts)
            .await?;
        if plan.rationale.trim().is_empty() || plan.new_nodes.is_empty() {
            return Err(CollaboratorError::Malformed(format!(
                "breakdown for {question:?} has no rationale or sub-questions"
            )));
        }
        tracing::info!(
            "Breakdown for {:?}: {} sub-question(s)",
            question,
            plan.new_nodes.len()
        );
        Ok(BreakdownAttempt {
            original_question: question.to_string(),
            rationale: plan.rationale,
            new_nodes: plan.new_nodes,
            was_successful: false,
        })
    }

    /// Search the sub-questions, falling back to an estimate
    pub async fn resolve(
        &self,
        attempt: &BreakdownAttempt,
        context: &str,
        failed_queries: &[SearchQuery],
        facts: &FactSet,
    ) -> Result<FallbackOutcome, CollaboratorError> {
        let mut all_failed = failed_queries.to_vec();
        let mut found = Vec::new();

        for sub in &attempt.new_nodes {
            let queries = sub.queries();
            if queries.is_empty() {
                continue;
            }
            let results = self.searcher.search(&sub.question, queries).await?;
            if results.is_empty() {
                all_failed.extend_from_slice(queries);
            } else {
                found.extend(results);
            }
        }

        if !found.is_empty() {
            tracing::info!(
                "Breakdown of {:?} found {} result(s)",
                attempt.original_question,
                found.len()
            );
            return Ok(FallbackOutcome::Found(found));
        }

        tracing::info!(
            "Breakdown of {:?} found nothing, estimating",
            attempt.original_question
        );
        let estimate = self
            .estimator
            .estimate(&attempt.original_question, context, &all_failed, facts)
            .await?;
        Ok(FallbackOutcome::Estimated(estimate))
    }
}

impl std::fmt::Debug for FallbackChain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        BreakdownPlan, MockBreakdownPlanner, MockCalculationSynthesizer, MockEstimator,
        MockGraphGenerator, MockSearcher,
    };
    use mockall::predicate::eq;
    use scout_graph::NodeSpec;
    use std::sync::Arc;

    fn collaborators(
        searcher: MockSearcher,
        planner: MockBreakdownPlanner,
        estimator: MockEstimator,
    ) -> Collaborators {
        Collaborators::new(
            Arc::new(MockGraphGenerator::new()),
            Arc::new(searcher),
            Arc::new(planner),
            Arc::new(estimator),
            Arc::new(MockCalculationSynthesizer::new()),
        )
    }

    fn plan() -> BreakdownPlan {
        BreakdownPlan {
            rationale: "narrow by year".to_string(),
            new_nodes: vec![
                NodeSpec::web_search(
                    "n1a",
                    "median retail rent downtown 2024",
                    "narrower",
                    vec![SearchQuery::new("median retail rent downtown 2024", "")],
                ),
                NodeSpec::ask_user("n1b", "do you know a landlord?", "no queries"),
            ],
        }
    }

    fn estimate() -> Estimate {
        Estimate {
            value: "$35/sqft".to_string(),
            reasoning: "regional averages".to_string(),
            assumptions: vec!["mid-size city".to_string()],
        }
    }

    #[tokio::test]
    async fn sub_search_success_uses_findings() {
        let mut searcher = MockSearcher::new();
        searcher
            .expect_search()
            .with(eq("median retail rent downtown 2024"), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Ok(vec![SearchResult::new("median rent is $42/sqft", "quote", "https://x")]));
        let mut planner = MockBreakdownPlanner::new();
        planner.expect_breakdown().times(1).returning(|_, _, _, _| Ok(plan()));
        let mut estimator = MockEstimator::new();
        estimator.expect_estimate().never();

        let collaborators = collaborators(searcher, planner, estimator);
        let chain = FallbackChain::new(&collaborators);
        let failed = [SearchQuery::new("rent downtown", "")];
        let attempt = chain.plan("rent?", "ctx", &failed, &FactSet::new()).await.unwrap();
        assert!(!attempt.was_successful);
        let outcome = chain.resolve(&attempt, "ctx", &failed, &FactSet::new()).await.unwrap();

        assert!(outcome.was_successful());
        assert_eq!(outcome.source(), ValueSource::Search);
        assert_eq!(outcome.value(), "median rent is $42/sqft");
    }

    #[tokio::test]
    async fn empty_sub_searches_estimate_with_all_failed_queries() {
        let mut searcher = MockSearcher::new();
        searcher.expect_search().times(1).returning(|_, _| Ok(vec![]));
        let mut planner = MockBreakdownPlanner::new();
        planner.expect_breakdown().times(1).returning(|_, _, _, _| Ok(plan()));
        let mut estimator = MockEstimator::new();
        estimator
            .expect_estimate()
            .times(1)
            .withf(|question, _, failed, _| {
                question == "rent?"
                    && failed.iter().map(|q| q.query.as_str()).eq([
                        "rent downtown",
                        "median retail rent downtown 2024",
                    ])
            })
            .returning(|_, _, _, _| Ok(estimate()));

        let collaborators = collaborators(searcher, planner, estimator);
        let chain = FallbackChain::new(&collaborators);
        let failed = [SearchQuery::new("rent downtown", "")];
        let attempt = chain.plan("rent?", "ctx", &failed, &FactSet::new()).await.unwrap();
        let outcome = chain.resolve(&attempt, "ctx", &failed, &FactSet::new()).await.unwrap();

        assert!(!outcome.was_successful());
        assert_eq!(outcome.source(), ValueSource::Estimate);
        assert_eq!(outcome.value(), "$35/sqft");
    }

    #[tokio::test]
    async fn plan_without_sub_questions_is_malformed() {
        let mut planner = MockBreakdownPlanner::new();
        planner.expect_breakdown().returning(|_, _, _, _| {
            Ok(BreakdownPlan {
                rationale: "none".to_string(),
                new_nodes: vec![],
            })
        });
        let collaborators = collaborators(MockSearcher::new(), planner, MockEstimator::new());
        let result = FallbackChain::new(&collaborators)
            .plan("rent?", "ctx", &[], &FactSet::new())
            .await;
        assert!(matches!(result, Err(CollaboratorError::Malformed(_))));
    }
}

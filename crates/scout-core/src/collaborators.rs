//! External collaborator interfaces
//!
//! Everything the engine does not do itself sits behind one of these traits:
//! - graph generation
//! - search
//! - breakdown planning and estimation
//! - calculation synthesis and execution
//!
//! `Collaborators` bundles one implementation of each for a session.

use crate::error::{CollaboratorError, GraphKind};
use crate::sandbox::ExpressionSandbox;
use indexmap::IndexMap;
use scout_graph::{Estimate, FactSet, GraphSpecification, Node, NodeId, NodeSpec, SearchQuery, SearchResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Current values of a calculation's inputs, keyed by node id in declaration order
pub type CalculationInputs = IndexMap<NodeId, Option<String>>;

/// Proposes the nodes of one generation round
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GraphGenerator: Send + Sync {
    /// Generate a specification given the facts so far and every node already explored
    async fn generate(
        &self,
        goal: &str,
        context: &str,
        facts: &FactSet,
        explored: &[Node],
    ) -> Result<GraphSpecification, CollaboratorError>;
}

/// Finds facts for a question
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Searcher: Send + Sync {
    /// Search; an empty list means nothing was found
    async fn search(
        &self,
        question: &str,
        queries: &[SearchQuery],
    ) -> Result<Vec<SearchResult>, CollaboratorError>;
}

/// Rationale plus more specific sub-node specifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownPlan {
    /// Why the narrower questions might succeed
    pub rationale: String,
    /// Sub-node specifications
    #[serde(default)]
    pub new_nodes: Vec<NodeSpec>,
}

/// Plans a breakdown of a question whose search found nothing
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BreakdownPlanner: Send + Sync {
    /// Propose narrower sub-questions
    async fn breakdown(
        &self,
        question: &str,
        context: &str,
        failed_queries: &[SearchQuery],
        facts: &FactSet,
    ) -> Result<BreakdownPlan, CollaboratorError>;
}

/// Produces a last-resort estimate
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Estimator: Send + Sync {
    /// Estimate a value for the question
    async fn estimate(
        &self,
        question: &str,
        context: &str,
        failed_queries: &[SearchQuery],
        facts: &FactSet,
    ) -> Result<Estimate, CollaboratorError>;
}

/// Executable calculation specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationSpec {
    /// Code in the sandbox language
    pub code: String,
    /// How the calculation works
    pub explanation: String,
}

/// Writes the calculation for a question
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CalculationSynthesizer: Send + Sync {
    /// Synthesize code over the given inputs
    async fn synthesize(
        &self,
        question: &str,
        inputs: &CalculationInputs,
    ) -> Result<CalculationSpec, CollaboratorError>;
}

/// Successful calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Computed result
    pub result: serde_json::Value,
    /// Non-fatal notes about the run
    pub warnings: Vec<String>,
}

/// Failed calculation; always carries at least one warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationFailure {
    /// Warnings, ending with the failure reason
    pub warnings: Vec<String>,
}

impl CalculationFailure {
    /// Failure with earlier warnings followed by the reason
    #[must_use]
    pub fn new(mut warnings: Vec<String>, reason: impl fmt::Display) -> Self {
        warnings.push(format!("Calculation failed: {reason}"));
        Self { warnings }
    }
}

/// Runs synthesized code in isolation
#[cfg_attr(test, mockall::automock)]
pub trait CalculationExecutor: Send + Sync {
    /// Execute code over the inputs
    fn execute(
        &self,
        code: &str,
        inputs: &CalculationInputs,
    ) -> Result<Evaluation, CalculationFailure>;
}

/// One implementation of every collaborator
#[derive(Clone)]
pub struct Collaborators {
    /// Generator for the information-needs graph
    pub information: Arc<dyn GraphGenerator>,
    /// Generator for the solution-exploration graph
    pub exploration: Arc<dyn GraphGenerator>,
    /// Search
    pub searcher: Arc<dyn Searcher>,
    /// Breakdown planning
    pub planner: Arc<dyn BreakdownPlanner>,
    /// Estimation
    pub estimator: Arc<dyn Estimator>,
    /// Calculation synthesis
    pub synthesizer: Arc<dyn CalculationSynthesizer>,
    /// Calculation execution
    pub executor: Arc<dyn CalculationExecutor>,
}

impl Collaborators {
    /// Bundle using one generator for both graphs and the expression sandbox
    #[must_use]
    pub fn new(
        generator: Arc<dyn GraphGenerator>,
        searcher: Arc<dyn Searcher>,
        planner: Arc<dyn BreakdownPlanner>,
        estimator: Arc<dyn Estimator>,
        synthesizer: Arc<dyn CalculationSynthesizer>,
    ) -> Self {
        Self {
            information: Arc::clone(&generator),
            exploration: generator,
            searcher,
            planner,
            estimator,
            synthesizer,
            executor: Arc::new(ExpressionSandbox::new()),
        }
    }

    /// With a separate exploration-graph generator
    #[inline]
    #[must_use]
    pub fn with_exploration_generator(mut self, generator: Arc<dyn GraphGenerator>) -> Self {
        self.exploration = generator;
        self
    }

    /// With a calculation executor
    #[inline]
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn CalculationExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Generator for a graph
    #[inline]
    #[must_use]
    pub fn generator(&self, kind: GraphKind) -> &dyn GraphGenerator {
        match kind {
            GraphKind::Information => self.information.as_ref(),
            GraphKind::Exploration => self.exploration.as_ref(),
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_appends_reason() {
        let failure = CalculationFailure::new(vec!["input n1 coerced".to_string()], "division by zero");
        assert_eq!(
            failure.warnings,
            vec![
                "input n1 coerced".to_string(),
                "Calculation failed: division by zero".to_string()
            ]
        );
    }
}

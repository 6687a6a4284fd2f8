//! Graph generation helpers
//!
//! - `GenerationEnsemble`: several backends explored one after another
//! - Round and node context strings handed to collaborators

use crate::collaborators::GraphGenerator;
use crate::error::CollaboratorError;
use scout_graph::{FactSet, GraphSpecification, Node};
use std::sync::Arc;

/// Generator that asks each backend in turn and concatenates their nodes
///
/// Backend *k* sees the explored nodes plus every node produced by backends
/// `0..k` this round, so later backends can take different directions.
#[derive(Clone, Default)]
pub struct GenerationEnsemble {
    backends: Vec<Arc<dyn GraphGenerator>>,
}

impl GenerationEnsemble {
    /// Create an empty ensemble
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With another backend
    #[inline]
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn GraphGenerator>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Number of backends
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// True without backends
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[async_trait::async_trait]
impl GraphGenerator for GenerationEnsemble {
    async fn generate(
        &self,
        goal: &str,
        context: &str,
        facts: &FactSet,
        explored: &[Node],
    ) -> Result<GraphSpecification, CollaboratorError> {
        let mut seen: Vec<Node> = explored.to_vec();
        let mut combined = GraphSpecification::new(goal, Vec::new());

        for (i, backend) in self.backends.iter().enumerate() {
            let spec = backend.generate(goal, context, facts, &seen).await?;
            if spec.is_empty() {
                tracing::debug!("Backend {} proposed no nodes", i);
                continue;
            }
            tracing::debug!("Backend {} proposed {} node(s)", i, spec.len());
            seen.extend(spec.nodes.iter().cloned().map(Node::from));
            combined.nodes.extend(spec.nodes);
        }
        Ok(combined)
    }
}

impl std::fmt::Debug for GenerationEnsemble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationEnsemble")
            .field("backends", &self.backends.len())
            .finish()
    }
}

/// Context for a generation round: base context, depth, then known facts
#[must_use]
pub fn round_context(base: &str, round: usize, facts: &FactSet) -> String {
    let mut parts = vec![base.to_string(), format!("\nCurrent exploration depth: {round}")];
    if !facts.is_empty() {
        parts.push("\nInformation gathered so far:".to_string());
        parts.push(facts.to_string());
    }
    parts.join("\n")
}

/// Context passed to breakdown and estimate calls for one node
#[must_use]
pub fn node_context(question: &str, rationale: &str) -> String {
    format!("Attempting to answer: {question}\nRationale: {rationale}")
}

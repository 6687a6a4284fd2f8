//! Replay collaborators
//!
//! A `Transcript` records what every collaborator answered during a run.
//! `ReplayCollaborators` serves those answers back, so an exploration can be
//! reproduced offline and deterministically.
//!
//! ```json
//! {
//!   "goal": "Should I open a coffee shop downtown?",
//!   "information_rounds": [{ "goal": "...", "nodes": [] }],
//!   "searches": { "median retail rent downtown 2024": [{ "fact": "...", "quote": "...", "source_url": "..." }] },
//!   "breakdowns": { "<question>": { "rationale": "...", "new_nodes": [] } },
//!   "estimates": { "<question>": { "value": "...", "reasoning": "..." } },
//!   "calculations": { "<question>": { "code": "...", "explanation": "..." } },
//!   "user_inputs": { "n2": "$5000" }
//! }
//! ```

use crate::collaborators::{
    BreakdownPlan, BreakdownPlanner, CalculationInputs, CalculationSpec, CalculationSynthesizer,
    Collaborators, Estimator, GraphGenerator, Searcher,
};
use crate::error::CollaboratorError;
use indexmap::IndexMap;
use scout_graph::{
    Estimate, FactSet, GatherMethod, GraphSpecification, Node, NodeId, NodeSpecKind, SearchQuery,
    SearchResult,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Transcript loading errors
#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that was read
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON did not parse
    #[error("invalid transcript: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Recorded collaborator responses for one goal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transcript {
    /// The user's goal
    pub goal: String,
    /// Base generation context
    pub context: String,
    /// Information-graph specifications, one per round
    pub information_rounds: Vec<GraphSpecification>,
    /// Exploration-graph specifications, one per round
    pub exploration_rounds: Vec<GraphSpecification>,
    /// Search results by query text
    pub searches: HashMap<String, Vec<SearchResult>>,
    /// Breakdown plans by question
    pub breakdowns: HashMap<String, BreakdownPlan>,
    /// Estimates by question
    pub estimates: HashMap<String, Estimate>,
    /// Calculation specifications by question
    pub calculations: HashMap<String, CalculationSpec>,
    /// Answers to ask-user nodes, in the order a user would give them
    pub user_inputs: IndexMap<NodeId, String>,
}

impl Transcript {
    /// Parse a JSON transcript
    pub fn from_json(raw: &str) -> Result<Self, TranscriptError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Read and parse a JSON transcript file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TranscriptError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| TranscriptError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Ask-user nodes of every recorded round that have no recorded answer
    #[must_use]
    pub fn missing_inputs(&self) -> Vec<NodeId> {
        self.information_rounds
            .iter()
            .chain(&self.exploration_rounds)
            .flat_map(|round| &round.nodes)
            .filter(|spec| {
                matches!(
                    spec.kind,
                    NodeSpecKind::Gather {
                        gathering_method: GatherMethod::AskUser,
                        ..
                    }
                )
            })
            .map(|spec| spec.id.clone())
            .filter(|id| !self.user_inputs.contains_key(id))
            .collect()
    }
}

/// Serves recorded specifications round by round
#[derive(Debug)]
pub struct ReplayGenerator {
    rounds: Vec<GraphSpecification>,
    cursor: AtomicUsize,
}

impl ReplayGenerator {
    /// Generator over recorded rounds
    #[must_use]
    pub fn new(rounds: Vec<GraphSpecification>) -> Self {
        Self {
            rounds,
            cursor: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl GraphGenerator for ReplayGenerator {
    async fn generate(
        &self,
        goal: &str,
        _context: &str,
        _facts: &FactSet,
        _explored: &[Node],
    ) -> Result<GraphSpecification, CollaboratorError> {
        let round = self.cursor.fetch_add(1, Ordering::SeqCst);
        // Past the recording there is nothing new to explore
        Ok(self
            .rounds
            .get(round)
            .cloned()
            .unwrap_or_else(|| GraphSpecification::new(goal, Vec::new())))
    }
}

/// Serves every non-generation collaborator from a transcript
#[derive(Debug, Clone)]
pub struct ReplayCollaborators {
    transcript: Arc<Transcript>,
}

impl ReplayCollaborators {
    /// Replay a transcript
    #[must_use]
    pub fn new(transcript: Transcript) -> Self {
        Self {
            transcript: Arc::new(transcript),
        }
    }

    /// The transcript being replayed
    #[inline]
    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Bundle with one replay generator per graph
    #[must_use]
    pub fn into_collaborators(self) -> Collaborators {
        let information = Arc::new(ReplayGenerator::new(self.transcript.information_rounds.clone()));
        let exploration = Arc::new(ReplayGenerator::new(self.transcript.exploration_rounds.clone()));
        let shared = Arc::new(self);
        Collaborators::new(
            information,
            shared.clone(),
            shared.clone(),
            shared.clone(),
            shared,
        )
        .with_exploration_generator(exploration)
    }
}

fn recorded<'a, T>(
    map: &'a HashMap<String, T>,
    kind: &str,
    question: &str,
) -> Result<&'a T, CollaboratorError> {
    map.get(question)
        .ok_or_else(|| CollaboratorError::NotRecorded(format!("{kind} for {question:?}")))
}

#[async_trait::async_trait]
impl Searcher for ReplayCollaborators {
    async fn search(
        &self,
        _question: &str,
        queries: &[SearchQuery],
    ) -> Result<Vec<SearchResult>, CollaboratorError> {
        let mut results = Vec::new();
        for query in queries {
            match self.transcript.searches.get(&query.query) {
                Some(found) => results.extend(found.iter().cloned()),
                None => tracing::debug!("No recorded results for query {:?}", query.query),
            }
        }
        Ok(results)
    }
}

#[async_trait::async_trait]
impl BreakdownPlanner for ReplayCollaborators {
    async fn breakdown(
        &self,
        question: &str,
        _context: &str,
        _failed_queries: &[SearchQuery],
        _facts: &FactSet,
    ) -> Result<BreakdownPlan, CollaboratorError> {
        recorded(&self.transcript.breakdowns, "breakdown", question).cloned()
    }
}

#[async_trait::async_trait]
impl Estimator for ReplayCollaborators {
    async fn estimate(
        &self,
        question: &str,
        _context: &str,
        _failed_queries: &[SearchQuery],
        _facts: &FactSet,
    ) -> Result<Estimate, CollaboratorError> {
        recorded(&self.transcript.estimates, "estimate", question).cloned()
    }
}

#[async_trait::async_trait]
impl CalculationSynthesizer for ReplayCollaborators {
    async fn synthesize(
        &self,
        question: &str,
        _inputs: &CalculationInputs,
    ) -> Result<CalculationSpec, CollaboratorError> {
        recorded(&self.transcript.calculations, "calculation", question).cloned()
    }
}

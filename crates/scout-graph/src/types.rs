//! Core value types shared by specifications and processing nodes
//!
//! Defines:
//! - Node identity
//! - Node states and value provenance
//! - Gathering methods and search queries
//! - Search, estimate, breakdown and calculation payloads

use crate::spec::NodeSpec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Node identifier, unique within a cumulative graph
///
/// Ids are chosen by the generation collaborator, so they are free-form strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Create a node id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty id
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Processing state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Waiting for dependencies
    #[default]
    Pending,
    /// Search collaborator in flight
    Searching,
    /// Search returned nothing; fallback chain in flight
    NeedsBreakdown,
    /// Calculation being synthesized or executed
    Calculating,
    /// Terminal; value may still be unset (soft calculation failure)
    Complete,
    /// Waiting for a human, or failed during processing
    Blocked,
}

impl NodeState {
    /// States that mean work is in flight for the node
    #[inline]
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Searching | Self::NeedsBreakdown | Self::Calculating)
    }

    /// Terminal state check
    #[inline]
    #[must_use]
    pub fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Searching => "searching",
            Self::NeedsBreakdown => "needs_breakdown",
            Self::Calculating => "calculating",
            Self::Complete => "complete",
            Self::Blocked => "blocked",
        };
        f.write_str(name)
    }
}

/// Where a node's value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// Facts returned by search, directly or through a breakdown
    Search,
    /// Last-resort estimate
    Estimate,
    /// Sandbox calculation over other node values
    Calculation,
    /// Supplied by the human operator
    User,
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Search => "search",
            Self::Estimate => "estimate",
            Self::Calculation => "calculation",
            Self::User => "user",
        };
        f.write_str(name)
    }
}

/// How a gather node obtains its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatherMethod {
    /// Ask the search collaborator
    WebSearch,
    /// Ask the human operator
    AskUser,
}

/// A single search query with its purpose
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// The query text
    pub query: String,
    /// Why the query is issued
    #[serde(default)]
    pub context: String,
}

impl SearchQuery {
    /// Create a query with context
    #[inline]
    #[must_use]
    pub fn new(query: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            context: context.into(),
        }
    }
}

/// One fact returned by the search collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The extracted fact
    pub fact: String,
    /// Supporting quote from the source
    pub quote: String,
    /// Page the fact was extracted from
    pub source_url: String,
}

impl SearchResult {
    /// Create a search result
    #[inline]
    #[must_use]
    pub fn new(
        fact: impl Into<String>,
        quote: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            fact: fact.into(),
            quote: quote.into(),
            source_url: source_url.into(),
        }
    }
}

/// Join the facts of a result list into a node value
#[must_use]
pub fn join_facts(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| r.fact.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A reasoned approximate value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Estimate {
    /// Estimated value
    pub value: String,
    /// How the value was reached
    pub reasoning: String,
    /// Assumptions behind the estimate
    #[serde(default)]
    pub assumptions: Vec<String>,
}

/// The single retry plan recorded on a gather node whose search found nothing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownAttempt {
    /// Question that failed the initial search
    pub original_question: String,
    /// Why the breakdown might help
    pub rationale: String,
    /// More specific sub-node specifications (never scheduled)
    pub new_nodes: Vec<NodeSpec>,
    /// Set once the sub-searches ran: true if any returned facts
    pub was_successful: bool,
}

/// Record of a calculation attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationRecord {
    /// Synthesized code specification
    pub code: String,
    /// How the calculation works
    pub explanation: String,
    /// Result on success
    pub result: Option<serde_json::Value>,
    /// Warnings, including the failure reason when `result` is unset
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl CalculationRecord {
    /// Whether the calculation produced a result
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.result.is_some()
    }
}

/// Render a calculation result as a node value
#[must_use]
pub fn stringify_result(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

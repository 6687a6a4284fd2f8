//! Processing graph
//!
//! A goal plus the ordered, cumulative list of nodes built from one or more
//! validated specifications. Nodes are only ever appended.

use crate::node::Node;
use crate::spec::GraphSpecification;
use crate::types::{NodeId, NodeState};
use serde::Serialize;
use std::collections::HashMap;

/// Mutable graph the scheduler drives
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingGraph {
    /// The user's goal
    pub goal: String,
    nodes: Vec<Node>,
    #[serde(skip)]
    index: HashMap<NodeId, usize>,
}

impl ProcessingGraph {
    /// Create an empty graph for a goal
    #[must_use]
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Convert a specification 1:1 into a fresh graph
    #[must_use]
    pub fn from_specification(spec: GraphSpecification) -> Self {
        let mut graph = Self::new(spec.goal.clone());
        graph.extend(spec);
        graph
    }

    /// Append the nodes of another round, returning their ids in order
    ///
    /// The specification must already be validated against this graph's ids.
    pub fn extend(&mut self, spec: GraphSpecification) -> Vec<NodeId> {
        let mut added = Vec::with_capacity(spec.nodes.len());
        for node_spec in spec.nodes {
            let node = Node::from(node_spec);
            added.push(node.id.clone());
            self.index.insert(node.id.clone(), self.nodes.len());
            self.nodes.push(node);
        }
        added
    }

    /// Look up a node
    #[inline]
    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Look up a node for mutation
    #[inline]
    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.index.get(id).map(|&i| &mut self.nodes[i])
    }

    /// Whether the graph holds a node
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    /// Nodes in generation order
    #[inline]
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Node ids in generation order
    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter().map(|n| &n.id)
    }

    /// Number of nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True for a graph with no nodes
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True when every dependency of `node` is `Complete`
    ///
    /// An unknown dependency counts as incomplete.
    #[must_use]
    pub fn dependencies_complete(&self, node: &Node) -> bool {
        node.depends_on_ids
            .iter()
            .all(|d| self.get(d).is_some_and(|dep| dep.state().is_complete()))
    }

    /// Pending nodes whose dependencies are all complete, in generation order
    #[must_use]
    pub fn ready_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.state() == NodeState::Pending && self.dependencies_complete(n))
            .map(|n| n.id.clone())
            .collect()
    }

    /// Any node in `Searching`, `NeedsBreakdown` or `Calculating`
    #[must_use]
    pub fn has_in_flight(&self) -> bool {
        self.nodes.iter().any(|n| n.state().is_in_flight())
    }

    /// Nodes blocked on a human
    #[must_use]
    pub fn awaiting_input(&self) -> Vec<NodeId> {
        self.filter_ids(Node::is_awaiting_input)
    }

    /// Nodes blocked by a processing failure
    #[must_use]
    pub fn failed(&self) -> Vec<NodeId> {
        self.filter_ids(Node::has_failed)
    }

    /// Pending nodes that cannot become ready yet
    #[must_use]
    pub fn stalled(&self) -> Vec<NodeId> {
        self.filter_ids(|n| n.state() == NodeState::Pending && !self.dependencies_complete(n))
    }

    /// Count of nodes in `Complete`
    #[must_use]
    pub fn completed(&self) -> usize {
        self.nodes.iter().filter(|n| n.state().is_complete()).count()
    }

    fn filter_ids(&self, pred: impl Fn(&Node) -> bool) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| pred(n))
            .map(|n| n.id.clone())
            .collect()
    }
}

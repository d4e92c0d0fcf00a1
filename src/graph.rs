//! Minimal SEM graph: measured, latent and error nodes with directed and
//! bidirected edges.
//!
//! Every measured or latent variable owns exactly one error node, created
//! together with the variable and connected to it by an error edge. Directed
//! edges run between variables; bidirected edges stand for correlated errors.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SemOptError};

/// Role of a node in a SEM graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// Observed variable, present in the sample covariance
    Measured,

    /// Unobserved variable
    Latent,

    /// Disturbance term of a measured or latent variable
    Error,
}

/// A named node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub role: NodeRole,
}

/// A SEM graph over named nodes.
#[derive(Debug, Clone, Default)]
pub struct SemGraph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    /// `(parent, child)` pairs, error edges included
    directed: Vec<(usize, usize)>,
    /// Correlated-error edges between two variables
    bidirected: Vec<(usize, usize)>,
    /// Error node of each variable node
    error_of: HashMap<usize, usize>,
}

impl SemGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a measured variable together with its error node `E_<name>`.
    pub fn add_measured(&mut self, name: &str) -> Result<usize> {
        self.add_variable(name, NodeRole::Measured)
    }

    /// Add a latent variable together with its error node `E_<name>`.
    pub fn add_latent(&mut self, name: &str) -> Result<usize> {
        self.add_variable(name, NodeRole::Latent)
    }

    fn add_variable(&mut self, name: &str, role: NodeRole) -> Result<usize> {
        let error_name = format!("E_{}", name);
        if self.index.contains_key(name) || self.index.contains_key(&error_name) {
            return Err(SemOptError::InvalidInput(format!(
                "Duplicate node name '{}'",
                name
            )));
        }

        let node = self.push_node(name, role);
        let error = self.push_node(&error_name, NodeRole::Error);
        self.directed.push((error, node));
        self.error_of.insert(node, error);

        Ok(node)
    }

    fn push_node(&mut self, name: &str, role: NodeRole) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node {
            name: name.to_string(),
            role,
        });
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Add the directed edge `from -> to` between two variables.
    pub fn add_directed_edge(&mut self, from: &str, to: &str) -> Result<()> {
        let (a, b) = self.variable_pair(from, to)?;
        if self.directed.contains(&(a, b)) {
            return Err(SemOptError::InvalidInput(format!(
                "Duplicate edge {} -> {}",
                from, to
            )));
        }
        self.directed.push((a, b));
        Ok(())
    }

    /// Add a bidirected (correlated error) edge between two variables.
    pub fn add_bidirected_edge(&mut self, a: &str, b: &str) -> Result<()> {
        let (a_idx, b_idx) = self.variable_pair(a, b)?;
        let pair = (a_idx.min(b_idx), a_idx.max(b_idx));
        if self.bidirected.contains(&pair) {
            return Err(SemOptError::InvalidInput(format!(
                "Duplicate edge {} <-> {}",
                a, b
            )));
        }
        self.bidirected.push(pair);
        Ok(())
    }

    fn variable_pair(&self, a: &str, b: &str) -> Result<(usize, usize)> {
        let a_idx = self.require(a)?;
        let b_idx = self.require(b)?;
        if a_idx == b_idx {
            return Err(SemOptError::InvalidInput(format!(
                "Self-loop on '{}' is not allowed",
                a
            )));
        }
        for (idx, name) in [(a_idx, a), (b_idx, b)] {
            if self.nodes[idx].role == NodeRole::Error {
                return Err(SemOptError::InvalidInput(format!(
                    "Error node '{}' cannot be an edge endpoint",
                    name
                )));
            }
        }
        Ok((a_idx, b_idx))
    }

    fn require(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| SemOptError::UnknownVariable(name.to_string()))
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Look up a node index by name.
    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Node at `idx`.
    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    /// Indices of measured and latent nodes, in insertion order.
    pub fn variables(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.role != NodeRole::Error)
            .map(|(i, _)| i)
            .collect()
    }

    /// Error node of a variable.
    pub fn error_of(&self, node: usize) -> Option<usize> {
        self.error_of.get(&node).copied()
    }

    /// Parents of `node`, excluding its error node.
    pub fn parents(&self, node: usize) -> Vec<usize> {
        let error = self.error_of(node);
        self.directed
            .iter()
            .filter(|(p, c)| *c == node && Some(*p) != error)
            .map(|(p, _)| *p)
            .collect()
    }

    /// Directed edges between variables, as `(parent, child)`.
    pub fn structural_edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.directed
            .iter()
            .copied()
            .filter(move |(p, _)| self.nodes[*p].role != NodeRole::Error)
    }

    /// Bidirected edges, smaller index first.
    pub fn bidirected_edges(&self) -> &[(usize, usize)] {
        &self.bidirected
    }
}

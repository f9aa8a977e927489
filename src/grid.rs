//! Mesh nodes and the grid that owns them.
//!
//! Faces never hold node coordinates; they hold indices into a [`Grid`], so
//! that a node shared by several faces moves once when the grid is updated.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};
use crate::vector::Vector3d;

/// An indexed point with a position and a velocity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: usize,
    pub position: Vector3d,
    #[serde(default = "Vector3d::zeros")]
    pub velocity: Vector3d,
}

impl Node {
    pub fn new(id: usize, position: Vector3d, velocity: Vector3d) -> Self {
        Self {
            id,
            position,
            velocity,
        }
    }

    /// A node at rest.
    pub fn at(id: usize, position: Vector3d) -> Self {
        Self::new(id, position, Vector3d::zeros())
    }
}

/// Ordered collection of nodes, where a node's id equals its index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid {
    nodes: Vec<Node>,
}


impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(n),
        }
    }

    /// Appends a node, whose id must equal the current size.
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if node.id != self.nodes.len() {
            return Err(TraceError::InvalidMesh(format!(
                "node id {} added at position {}",
                node.id,
                self.nodes.len()
            )));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Replaces the node with the same id.
    pub fn replace_node(&mut self, node: Node) -> Result<()> {
        let len = self.nodes.len();
        let slot = self
            .nodes
            .get_mut(node.id)
            .ok_or_else(|| TraceError::out_of_range("node", node.id, len))?;
        *slot = node;
        Ok(())
    }

    pub fn node(&self, id: usize) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| TraceError::out_of_range("node", id, self.nodes.len()))
    }

    pub fn position(&self, id: usize) -> Result<Vector3d> {
        Ok(self.node(id)?.position)
    }

    pub fn velocity(&self, id: usize) -> Result<Vector3d> {
        Ok(self.node(id)?.velocity)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Checks that every node id matches its index.
    pub fn validate(&self) -> Result<()> {
        match self.nodes.iter().enumerate().find(|(i, n)| n.id != *i) {
            Some((i, n)) => Err(TraceError::InvalidMesh(format!(
                "node at index {} has id {}",
                i, n.id
            ))),
            None => Ok(()),
        }
    }
}

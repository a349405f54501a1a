//! Graph vertices.

use ahash::AHashSet;

use crate::component::Component;
use crate::id::{EdgeId, NodeId};
use crate::position::Position;

/// A graph vertex covering one or more mutually adjacent lattice
/// positions.
///
/// A node's `block_positions` are never empty and are all mutually
/// reachable within the node (this matters once
/// [`is_extendable_node`](crate::oracle::LatticeOracle::is_extendable_node)
/// lets several positions share one node). `component` is the aggregate
/// of every block position's own attribute, kept in sync by
/// [`Network`](crate::network::Network)'s structural mutations through
/// [`Component::add`]/[`Component::del`]/[`Component::partition`] — the
/// node never recomputes it from scratch.
#[derive(Debug, Clone)]
pub struct Node<C: Component> {
	pub(crate) id: NodeId,
	pub(crate) block_positions: Vec<Position>,
	pub(crate) component: C,
	pub(crate) edges: AHashSet<EdgeId>,
}

impl<C: Component> Node<C> {
	pub(crate) fn singleton(id: NodeId, pos: Position, component: C) -> Self {
		Node {
			id,
			block_positions: vec![pos],
			component,
			edges: AHashSet::new(),
		}
	}

	/// This node's id, stable for its lifetime within its owning network.
	pub fn id(&self) -> NodeId {
		self.id
	}

	/// The lattice positions this node covers.
	pub fn block_positions(&self) -> &[Position] {
		&self.block_positions
	}

	/// The node's aggregated component.
	pub fn component(&self) -> &C {
		&self.component
	}

	/// The node's degree: the number of distinct incident edges. A
	/// self-loop (an edge whose two endpoints are both this node) counts
	/// once here, matching the "unordered set of incident edges" wording
	/// of the data model — degree is edge-set size, not edge-endpoint
	/// count.
	pub fn degree(&self) -> usize {
		self.edges.len()
	}

	/// The ids of this node's incident edges.
	pub fn incident_edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
		self.edges.iter().copied()
	}

	pub(crate) fn insert_edge(&mut self, edge: EdgeId) {
		self.edges.insert(edge);
	}

	pub(crate) fn remove_edge(&mut self, edge: EdgeId) {
		self.edges.remove(&edge);
	}
}

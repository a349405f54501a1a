//! Opaque, stable identities for graph elements.
//!
//! Nodes and edges reference each other (an edge's two endpoints, a
//! node's incident edge set) without forming Rust ownership cycles: each
//! [`Network`](crate::network::Network) owns its nodes and edges in
//! `HashMap`s keyed by these ids, and elements only ever hold the id of
//! their neighbors, never a direct reference.

use std::fmt::Display;

macro_rules! opaque_id {
	($name:ident, $doc:literal) => {
		#[doc = $doc]
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
		#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
		pub struct $name(u64);

		impl $name {
			pub(crate) fn new(raw: u64) -> Self {
				Self(raw)
			}
		}

		impl Display for $name {
			fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				write!(f, "{}#{}", stringify!($name), self.0)
			}
		}
	};
}

opaque_id!(NodeId, "Identifies a node within one network.");
opaque_id!(EdgeId, "Identifies an edge within one network.");
opaque_id!(NetworkId, "Identifies a network within one registry.");

/// Monotonically increasing id allocator, one per network (for node/edge
/// ids) or per registry (for network ids).
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub(crate) struct IdCounter {
	next: u64,
}

impl IdCounter {
	pub fn next_node(&mut self) -> NodeId {
		let id = NodeId::new(self.next);
		self.next += 1;
		id
	}

	pub fn next_edge(&mut self) -> EdgeId {
		let id = EdgeId::new(self.next);
		self.next += 1;
		id
	}

	pub fn next_network(&mut self) -> NetworkId {
		let id = NetworkId::new(self.next);
		self.next += 1;
		id
	}
}

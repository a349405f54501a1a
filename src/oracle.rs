//! The pluggable predicates the core consults but never defines itself.
//!
//! The host decides which positions are structurally special
//! ([`LatticeOracle::is_always_node`]), which ones prefer to merge into a
//! single multi-block node when adjacent
//! ([`LatticeOracle::is_extendable_node`]), and — only during
//! [`rebuild`](crate::network::Network::rebuild) and
//! [`recalculate_networks`](crate::registry::Registry::recalculate_networks) —
//! whether two lattice-adjacent positions are actually connected at all
//! (the face-mask / connection predicate referenced in the system
//! overview, owned by the host and out of scope for this crate).

use crate::position::{adjacent, Position};

/// The three predicates the graph engine consults to decide node-ness,
/// multi-block merging, and (during flood-fill passes) connectivity.
///
/// Implement this on a small marker type that borrows whatever block-type
/// registry or world snapshot the host needs to answer these questions;
/// the core never constructs or clones an oracle, it only borrows one for
/// the duration of a single call.
pub trait LatticeOracle {
	/// True if `p` must be a graph node regardless of its in-network
	/// degree (for example, a block type that always exposes a
	/// distinct interaction surface).
	fn is_always_node(&self, p: Position) -> bool;

	/// True if `p` is a candidate for merging into a shared multi-block
	/// node with an adjacent position that also answers `true` here.
	fn is_extendable_node(&self, p: Position) -> bool;

	/// True if `a` and `b`, which are assumed lattice-adjacent, are
	/// actually connected for the purposes of this network (the
	/// face-mask predicate). Defaults to plain lattice adjacency.
	fn are_connected(&self, a: Position, b: Position) -> bool {
		adjacent(a, b)
	}
}

/// A trivial, always-available [`LatticeOracle`] implementation for
/// tests, doctests, and examples.
pub mod test_support {
	use super::*;
	use std::collections::HashSet;

	/// A test oracle with explicitly enumerated always-node and
	/// extendable-node position sets, and default lattice-adjacency
	/// connectivity.
	#[derive(Debug, Default, Clone)]
	pub struct TestOracle {
		pub always_nodes: HashSet<Position>,
		pub extendable: HashSet<Position>,
	}

	impl LatticeOracle for TestOracle {
		fn is_always_node(&self, p: Position) -> bool {
			self.always_nodes.contains(&p)
		}

		fn is_extendable_node(&self, p: Position) -> bool {
			self.extendable.contains(&p)
		}
	}
}

//! Crate error types.
//!
//! Per the core's error model there are three kinds of failure:
//! programmer errors (an invariant was violated by a caller misusing a
//! structural primitive), "unknown position" cases which are no-ops and
//! never produce a [`GraphError`], and algebra-precondition misuse, whose
//! outcome is defined by the [`Component`](crate::component::Component)
//! implementation rather than trapped here. [`GraphError`] covers the
//! first kind; lookups that can be a plain no-op return `Option` instead.

use crate::id::NodeId;
use thiserror::Error;

/// A structural invariant was violated while mutating a
/// [`Network`](crate::network::Network).
///
/// Every variant here is a programmer error: the caller asked the graph
/// to do something the data does not support (split at a position that
/// isn't an intermediate, reference a node that isn't an edge endpoint,
/// and so on). A `Network` that returns one of these from a structural
/// primitive should be treated as poisoned — the mutation may have been
/// partially applied, and the caller's only safe option is to discard or
/// rebuild that network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
	/// A position was expected to be a member of this network's
	/// `component_map` but wasn't.
	#[error("position is not part of this network")]
	UnknownPosition,

	/// [`split_edge_at`](crate::network::graph::Network::split_edge_at)
	/// was called with a position that is not one of the edge's
	/// intermediate blocks.
	#[error("edge does not contain the given intermediate position")]
	PositionNotOnEdge,

	/// A node was assumed to be one of an edge's two endpoints but isn't.
	#[error("node {0} is not an endpoint of this edge")]
	NotAnEndpoint(NodeId),

	/// A structural mutation found the graph in a shape its own
	/// invariants rule out (for example, a non-node position with a
	/// degree other than two). This should never happen for correctly
	/// used predicates and components; surfacing it as an error rather
	/// than panicking lets an embedding host decide how to fail.
	#[error("invariant violated during structural mutation: {0}")]
	InvariantViolation(&'static str),
}

pub type GraphResult<T> = Result<T, GraphError>;

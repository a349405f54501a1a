//! Lifecycle hooks.
//!
//! The registry (and, through it, every network it owns) reports
//! structural events through a small capability interface rather than
//! requiring callers to subclass anything — no inheritance is involved
//! anywhere in this crate. Supply an implementation at registry
//! construction time; the default [`NoopObserver`] discards every event,
//! which is what you want if you only ever poll network state instead of
//! reacting to it.

use crate::component::Component;
use crate::network::Network;

/// Observes structural changes to a [`Registry`](crate::registry::Registry)
/// and the [`Network`]s it owns.
///
/// Every method has a default empty body, so implementors only override
/// the events they actually care about.
pub trait NetworkObserver<C: Component> {
	/// A brand-new network was created, either from an isolated placement
	/// or from a bulk [`recalculate_networks`](crate::registry::Registry::recalculate_networks).
	fn on_network_created(&mut self, _network: &Network<C>) {}

	/// A network was torn down, either because it became empty or because
	/// it was absorbed into another network during a bridge-merge.
	fn on_network_destroyed(&mut self, _network: &Network<C>) {}

	/// A block was added to `network` (after the resulting structural
	/// mutation has completed).
	fn on_block_added(&mut self, _network: &Network<C>) {}

	/// A block was removed from `network` (after the resulting structural
	/// mutation has completed).
	fn on_block_removed(&mut self, _network: &Network<C>) {}

	/// `network`'s graph (nodes and/or edges) changed shape. Fired in
	/// addition to, and after, the more specific `on_block_added` /
	/// `on_block_removed` hooks for the same mutation.
	fn on_graph_updated(&mut self, _network: &Network<C>) {}
}

/// An observer that discards every event. The default when a caller only
/// wants to poll network state rather than react to it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl<C: Component> NetworkObserver<C> for NoopObserver {}

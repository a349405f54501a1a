//! World-level placement routing.
//!
//! [`Registry`] is the only entry point a host needs: it owns every
//! [`Network`] in the world plus the `pos_to_network` index used to find
//! which network (if any) a given position belongs to, and turns raw
//! placement/removal events into the right sequence of network-level
//! structural mutations — creating a network, merging several together
//! across a bridging placement, or tearing one down once its last block
//! is gone.

use ahash::AHashMap;

use crate::component::Component;
use crate::error::GraphResult;
use crate::hooks::{NetworkObserver, NoopObserver};
use crate::id::IdCounter;
use crate::network::Network;
use crate::oracle::LatticeOracle;
use crate::position::{neighbors, Position};
use crate::id::NetworkId;

/// Owns every [`Network`] in the world and routes block placement and
/// removal events to the right one, creating, merging, and destroying
/// networks as connectivity changes.
///
/// Generic over the client's [`Component`] algebra, its
/// [`LatticeOracle`], and an optional [`NetworkObserver`] (defaulting to
/// [`NoopObserver`] for callers who only want to poll state).
pub struct Registry<C: Component, O: LatticeOracle, Ob: NetworkObserver<C> = NoopObserver> {
	pos_to_network: AHashMap<Position, NetworkId>,
	networks: AHashMap<NetworkId, Network<C>>,
	ids: IdCounter,
	oracle: O,
	observer: Ob,
}

impl<C: Component, O: LatticeOracle, Ob: NetworkObserver<C>> Registry<C, O, Ob> {
	/// Creates an empty registry with the given oracle and observer.
	pub fn new(oracle: O, observer: Ob) -> Self {
		Registry {
			pos_to_network: AHashMap::new(),
			networks: AHashMap::new(),
			ids: IdCounter::default(),
			oracle,
			observer,
		}
	}

	/// The network `p` currently belongs to, if any.
	pub fn network_at(&self, p: Position) -> Option<&Network<C>> {
		let id = self.pos_to_network.get(&p)?;
		self.networks.get(id)
	}

	/// The raw component stored at `p`, if `p` belongs to a network.
	pub fn component_at(&self, p: Position) -> Option<&C> {
		self.network_at(p)?.component_at(p)
	}

	/// All networks currently tracked by this registry.
	pub fn all_networks(&self) -> impl Iterator<Item = &Network<C>> {
		self.networks.values()
	}

	/// A network by id, looked up directly.
	pub fn network(&self, id: NetworkId) -> Option<&Network<C>> {
		self.networks.get(&id)
	}

	/// A shared reference to the observer, for callers that need to read
	/// accumulated state out of it between events.
	pub fn observer(&self) -> &Ob {
		&self.observer
	}

	/// A mutable reference to the observer.
	pub fn observer_mut(&mut self) -> &mut Ob {
		&mut self.observer
	}

	/// Places a block of component `c` at `p`, routing it into a new
	/// network, an existing neighboring one, or a bridge-merge of
	/// several, and returns the id of the resulting network.
	pub fn on_block_placed(&mut self, p: Position, c: C) -> GraphResult<NetworkId> {
		log::debug!("on_block_placed {p}");
		let mut found: Vec<NetworkId> = Vec::new();
		for q in neighbors(p) {
			if let Some(&nid) = self.pos_to_network.get(&q) {
				if !found.contains(&nid) {
					found.push(nid);
				}
			}
		}

		let result_id = match found.len() {
			0 => self.create_isolated(p, c)?,
			1 => self.extend_existing(found[0], p, c)?,
			_ => self.bridge_merge(&found, p, c)?,
		};

		Ok(result_id)
	}

	fn create_isolated(&mut self, p: Position, c: C) -> GraphResult<NetworkId> {
		let id = self.ids.next_network();
		let mut net = Network::new(id);
		net.add_block(p, c, &self.oracle)?;
		self.pos_to_network.insert(p, id);
		self.networks.insert(id, net);
		self.observer.on_network_created(self.networks.get(&id).unwrap());
		self.observer.on_block_added(self.networks.get(&id).unwrap());
		self.observer.on_graph_updated(self.networks.get(&id).unwrap());
		Ok(id)
	}

	fn extend_existing(&mut self, id: NetworkId, p: Position, c: C) -> GraphResult<NetworkId> {
		let net = self.networks.get_mut(&id).expect("pos_to_network points at a live network");
		net.add_block(p, c, &self.oracle)?;
		self.pos_to_network.insert(p, id);
		self.observer.on_block_added(self.networks.get(&id).unwrap());
		self.observer.on_graph_updated(self.networks.get(&id).unwrap());
		Ok(id)
	}

	/// Absorbs every network in `found` but the first into the first,
	/// firing `on_network_destroyed` for each absorbed network *before*
	/// the merged network's `rebuild()` runs — this ordering matches the
	/// preserved source behavior (see `DESIGN.md`), not the more obvious
	/// rebuild-then-notify order.
	fn bridge_merge(&mut self, found: &[NetworkId], p: Position, c: C) -> GraphResult<NetworkId> {
		let target_id = found[0];
		for &other_id in &found[1..] {
			let other = self
				.networks
				.remove(&other_id)
				.expect("pos_to_network points at a live network");
			for pos in other.positions() {
				self.pos_to_network.insert(pos, target_id);
			}
			self.networks.get_mut(&target_id).unwrap().absorb_raw(&other);
			self.observer.on_network_destroyed(&other);
		}

		{
			let target = self.networks.get_mut(&target_id).unwrap();
			target.insert_raw(p, c);
			target.rebuild(&self.oracle)?;
		}
		self.pos_to_network.insert(p, target_id);
		self.observer.on_block_added(self.networks.get(&target_id).unwrap());
		self.observer.on_graph_updated(self.networks.get(&target_id).unwrap());
		Ok(target_id)
	}

	/// Removes the block at `p`, if any, destroying its network if that
	/// was its last block.
	pub fn on_block_removed(&mut self, p: Position) -> GraphResult<()> {
		log::debug!("on_block_removed {p}");
		let Some(&id) = self.pos_to_network.get(&p) else {
			return Ok(());
		};
		self.pos_to_network.remove(&p);

		let net = self.networks.get_mut(&id).expect("pos_to_network points at a live network");
		net.remove_block(p, &self.oracle)?;

		if net.is_empty() {
			let net = self.networks.remove(&id).unwrap();
			self.observer.on_network_destroyed(&net);
		} else {
			self.observer.on_block_removed(self.networks.get(&id).unwrap());
			self.observer.on_graph_updated(self.networks.get(&id).unwrap());
		}
		Ok(())
	}

	/// Discards every tracked network and rebuilds the world from
	/// scratch via flood-fill connectivity over the positions already
	/// known to `pos_to_network`, re-deriving each position's component
	/// through `component_source`.
	///
	/// Intended for bulk recovery — e.g. after a world load where many
	/// blocks were placed without going through
	/// [`Registry::on_block_placed`] — not for routine per-block
	/// maintenance. Fires `on_network_created` for every resulting
	/// network; does not fire `on_network_destroyed` for the discarded
	/// ones, since nothing here implies any of them became empty.
	pub fn recalculate_networks(&mut self, component_source: impl Fn(Position) -> C) -> GraphResult<()> {
		log::info!("recalculate_networks: {} known positions", self.pos_to_network.len());
		let universe: ahash::AHashSet<Position> = self.pos_to_network.keys().copied().collect();
		self.networks.clear();
		self.pos_to_network.clear();

		let mut positions: Vec<Position> = universe.iter().copied().collect();
		positions.sort_unstable_by_key(|p| (p.x, p.y, p.z));

		let mut visited: ahash::AHashSet<Position> = ahash::AHashSet::new();
		for &start in &positions {
			if visited.contains(&start) {
				continue;
			}
			let mut stack = vec![start];
			let mut component_positions = Vec::new();
			visited.insert(start);
			while let Some(cur) = stack.pop() {
				component_positions.push(cur);
				for n in neighbors(cur) {
					if !visited.contains(&n) && universe.contains(&n) && self.oracle.are_connected(cur, n) {
						visited.insert(n);
						stack.push(n);
					}
				}
			}

			let id = self.ids.next_network();
			let mut net = Network::new(id);
			for &pos in &component_positions {
				net.insert_raw(pos, component_source(pos));
			}
			net.rebuild(&self.oracle)?;
			for &pos in &component_positions {
				self.pos_to_network.insert(pos, id);
			}
			self.networks.insert(id, net);
			self.observer.on_network_created(self.networks.get(&id).unwrap());
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::component::test_support::Capacity;
	use crate::oracle::test_support::TestOracle;

	fn registry() -> Registry<Capacity, TestOracle, NoopObserver> {
		Registry::new(TestOracle::default(), NoopObserver)
	}

	#[test]
	fn isolated_placement_creates_a_network() {
		let mut r = registry();
		let id = r.on_block_placed(Position::new(0, 0, 0), Capacity::from_length(1)).unwrap();
		assert_eq!(r.all_networks().count(), 1);
		assert_eq!(r.network_at(Position::new(0, 0, 0)).unwrap().id(), id);
	}

	#[test]
	fn adjacent_placement_extends_the_same_network() {
		let mut r = registry();
		r.on_block_placed(Position::new(0, 0, 0), Capacity::from_length(1)).unwrap();
		let id2 = r.on_block_placed(Position::new(1, 0, 0), Capacity::from_length(1)).unwrap();
		assert_eq!(r.all_networks().count(), 1);
		assert_eq!(r.network_at(Position::new(0, 0, 0)).unwrap().id(), id2);
	}

	#[test]
	fn bridge_merges_two_networks_into_one() {
		let mut r = registry();
		r.on_block_placed(Position::new(0, 0, 0), Capacity::from_length(1)).unwrap();
		r.on_block_placed(Position::new(2, 0, 0), Capacity::from_length(1)).unwrap();
		assert_eq!(r.all_networks().count(), 2);

		r.on_block_placed(Position::new(1, 0, 0), Capacity::from_length(1)).unwrap();
		assert_eq!(r.all_networks().count(), 1);
		let merged = r.network_at(Position::new(0, 0, 0)).unwrap();
		assert!(merged.contains(Position::new(2, 0, 0)));
	}

	#[test]
	fn removing_last_block_destroys_its_network() {
		let mut r = registry();
		r.on_block_placed(Position::new(0, 0, 0), Capacity::from_length(1)).unwrap();
		r.on_block_removed(Position::new(0, 0, 0)).unwrap();
		assert_eq!(r.all_networks().count(), 0);
		assert!(r.network_at(Position::new(0, 0, 0)).is_none());
	}

	#[test]
	fn disconnecting_removal_does_not_auto_split() {
		// The registry deliberately does not detect splits on its own
		// (see `DESIGN.md`): a disconnecting removal leaves one network
		// behind, now internally disconnected, until the caller runs
		// `recalculate_networks`.
		let mut r = registry();
		for i in 0..3 {
			r.on_block_placed(Position::new(i, 0, 0), Capacity::from_length(1)).unwrap();
		}
		r.on_block_removed(Position::new(1, 0, 0)).unwrap();
		assert_eq!(r.all_networks().count(), 1);
		assert_eq!(
			r.network_at(Position::new(0, 0, 0)).unwrap().id(),
			r.network_at(Position::new(2, 0, 0)).unwrap().id()
		);
	}

	#[test]
	fn recalculate_networks_splits_after_disconnecting_removal() {
		let mut r = registry();
		for i in 0..5 {
			r.on_block_placed(Position::new(i, 0, 0), Capacity::from_length(1)).unwrap();
		}
		r.on_block_removed(Position::new(2, 0, 0)).unwrap();
		assert_eq!(r.all_networks().count(), 1);

		r.recalculate_networks(|p| r_component_for(p)).unwrap();
		assert_eq!(r.all_networks().count(), 2);
		let left = r.network_at(Position::new(0, 0, 0)).unwrap();
		let right = r.network_at(Position::new(4, 0, 0)).unwrap();
		assert_ne!(left.id(), right.id());
		assert!(left.contains(Position::new(1, 0, 0)));
		assert!(right.contains(Position::new(3, 0, 0)));
	}

	fn r_component_for(_p: Position) -> Capacity {
		Capacity::from_length(1)
	}

	#[test]
	fn recalculate_networks_rebuilds_from_known_positions() {
		let mut r = registry();
		for i in 0..3 {
			r.on_block_placed(Position::new(i, 0, 0), Capacity::from_length(1)).unwrap();
		}
		r.on_block_placed(Position::new(10, 0, 0), Capacity::from_length(1)).unwrap();
		assert_eq!(r.all_networks().count(), 2);

		r.recalculate_networks(|_| Capacity::from_length(1)).unwrap();
		assert_eq!(r.all_networks().count(), 2);
		assert!(r.network_at(Position::new(1, 0, 0)).is_some());
		assert!(r.network_at(Position::new(10, 0, 0)).is_some());
	}
}

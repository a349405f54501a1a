//! # lattice-net
//!
//! An incremental, compressed graph engine over a 3D lattice of block
//! positions.
//!
//! Given a stream of "block placed at `p`" and "block removed at `p`"
//! events, [`Registry`] maintains one or more [`Network`]s — maximal
//! connected components of network-relevant blocks — each represented as
//! a graph of [`Node`]s and [`Edge`]s where linear pass-through runs are
//! collapsed into single multi-block edges. Per-block payloads
//! ("components", see [`Component`]) are carried as attributes on graph
//! elements and are partitioned, merged, and recombined incrementally so
//! that the sum of element attributes always equals the sum of
//! per-block contributions — the same invariant a full
//! [`Network::rebuild`] from scratch would produce.
//!
//! The engine is generic over:
//!
//! - the per-block payload algebra ([`Component`]), supplied by the
//!   embedding host;
//! - the lattice connectivity predicates ([`LatticeOracle`]), also
//!   host-supplied (which positions are always nodes, which merge into
//!   shared multi-block nodes, and — only during bulk recompute — which
//!   lattice-adjacent positions are actually connected at all);
//! - structural change notifications ([`NetworkObserver`]), defaulting
//!   to [`NoopObserver`] for callers that only poll state.
//!
//! What this crate is *not*: a physics/dynamics simulator over the
//! graph, a persistence format, a world-loading layer, or a source of
//! geometric predicates beyond integer lattice adjacency. Those are the
//! embedding host's concern; this crate only maintains the compressed
//! graph structure and its invariants.
//!
//! # Example
//!
//! ```
//! use lattice_net::component::test_support::Capacity;
//! use lattice_net::hooks::NoopObserver;
//! use lattice_net::oracle::test_support::TestOracle;
//! use lattice_net::position::Position;
//! use lattice_net::registry::Registry;
//!
//! let mut registry = Registry::new(TestOracle::default(), NoopObserver);
//!
//! for x in 0..5 {
//!     registry
//!         .on_block_placed(Position::new(x, 0, 0), Capacity::from_length(1))
//!         .unwrap();
//! }
//!
//! let network = registry.network_at(Position::new(0, 0, 0)).unwrap();
//! assert_eq!(network.nodes().count(), 2);
//! assert_eq!(network.edges().count(), 1);
//! ```

pub mod component;
pub mod error;
pub mod hooks;
pub mod id;
pub mod network;
pub mod oracle;
pub mod position;
pub mod registry;

pub use component::Component;
pub use error::{GraphError, GraphResult};
pub use hooks::{NetworkObserver, NoopObserver};
pub use id::{EdgeId, NetworkId, NodeId};
pub use network::{Edge, Network, Node};
pub use oracle::LatticeOracle;
pub use position::Position;
pub use registry::Registry;

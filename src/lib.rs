//! # neuroweave
//!
//! A spatially wired neural substrate with local, double-buffered learning.
//!
//! Sensors and neurons are placed on rings around one or more origins and wired by
//! local geometric rules (edge length and flow direction), so the resulting graph is
//! sparse, partially recurrent and has no layer order. Every tick computes forward
//! values, backward errors and weight updates from the previous instant only, then
//! commits them all at once.
//!
//! ## Quick Start
//!
//! ```
//! use neuroweave::prelude::*;
//!
//! let cfg = NetworkConfig::default().with_seed(7);
//! let mut network = build_network(&cfg);
//!
//! network.randomize_sensors();
//! network.tick(1.0 / 60.0);
//!
//! let diag = network.diagnostics();
//! assert!(diag.connection_count > 0);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): Enable serialization/deserialization of configs and snapshots
//! - `parallel`: Run the buffer and commit phases on rayon's thread pool
//!
//! ## Modules
//!
//! - [`activation`]: Activation functions and their derivatives
//! - [`spatial`]: Vector helpers used by the topology rules
//! - [`node`]: Sensors, neurons and the handles that name them
//! - [`connection`]: Weighted edges and the local learning rule
//! - [`network`]: The node arena and the update cycle driver
//! - [`topology`]: Procedural generation from spatial placement rules
//! - [`observer`]: Read-only snapshots and presentation smoothing

#[path = "core/activation.rs"]
pub mod activation;

#[path = "core/spatial.rs"]
pub mod spatial;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/error.rs"]
pub mod error;

#[path = "core/node.rs"]
pub mod node;

#[path = "core/connection.rs"]
pub mod connection;

#[path = "core/network.rs"]
pub mod network;

#[path = "core/topology.rs"]
pub mod topology;

#[path = "core/storage.rs"]
pub mod storage;

pub mod observer;

/// Prelude module for convenient imports.
///
/// ```
/// use neuroweave::prelude::*;
/// ```
pub mod prelude {
    pub use crate::activation::{Activation, ActivationScheme};
    pub use crate::connection::Connection;
    pub use crate::error::{NetworkError, TopologyWarning};
    pub use crate::network::{Diagnostics, ExecutionTier, Network, Phase, Refresh};
    pub use crate::node::{
        ConnectionId, Neuron, NeuronId, NeuronRole, NodeRef, Sensor, SensorId, SensorRole,
    };
    pub use crate::observer::{NetworkAdapter, NetworkSnapshot, Presenter};
    pub use crate::prng::Prng;
    pub use crate::spatial::Vec3;
    pub use crate::topology::{
        build_network, build_network_with, BuildReport, DirectionRule, Flow, NetworkConfig,
        SiteConfig,
    };
}

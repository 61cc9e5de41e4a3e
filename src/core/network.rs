//! The node arena and the update cycle driver.
//!
//! A [`Network`] owns every sensor, neuron and connection of one session and
//! advances them in two phases:
//!
//! 1. **buffer**: each neuron computes a working value and error, and each
//!    connection a working weight, from committed state only;
//! 2. **commit**: every working slot replaces its committed counterpart.
//!
//! Nothing reads working state except the commit of its own owner, so the
//! order in which entities are visited within a phase has no effect.

use std::io::{self, Read, Write};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::error::{NetworkError, Result};
use crate::node::{
    ConnectionId, Neuron, NeuronId, NeuronRole, NodeRef, NodeView, Sensor, SensorId, SensorRole,
};
use crate::prng::Prng;
use crate::spatial::Vec3;
use crate::storage;
use crate::topology::{BuildReport, NetworkConfig};
use tracing::debug;

/// Where the network is within a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    /// Committed state is current; external reads and mutations are valid.
    #[default]
    Idle,
    /// Working slots are filled and waiting for `commit`.
    Buffered,
}

/// Execution tier for the buffer and commit phases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExecutionTier {
    /// Single-threaded scalar execution (default, works everywhere).
    #[default]
    Scalar,
    /// Multi-threaded execution (requires `parallel` feature).
    Parallel,
}

/// Presentation hook run after each commit.
///
/// Implementations get read-only access; `delta` is wall-clock time since the
/// previous refresh and is the only place frame timing enters.
pub trait Refresh {
    fn refresh(&mut self, network: &Network, delta: f64);
}

/// Aggregate numbers for logging and dashboards.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Diagnostics {
    pub sensor_count: usize,
    pub neuron_count: usize,
    pub connection_count: usize,
    pub cycles: u64,
    pub avg_weight: f64,
    pub changed_connections: usize,
    pub changed_neurons: usize,
    /// Σ |source value - target| over connections ending at a sensor.
    pub output_error: f64,
    /// Neurons with no edges at all.
    pub isolated_neurons: usize,
    pub input_neurons: usize,
    pub output_neurons: usize,
    pub interior_neurons: usize,
}

#[derive(Debug, Clone)]
pub struct Network {
    cfg: NetworkConfig,

    sensors: Vec<Sensor>,
    neurons: Vec<Neuron>,
    connections: Vec<Connection>,

    rng: Prng,
    phase: Phase,
    tier: ExecutionTier,
    cycles: u64,

    report: BuildReport,
}

impl Network {
    /// Empty network. Randomness is seeded from `cfg.seed` (or 1).
    pub fn new(cfg: NetworkConfig) -> Self {
        let rng = Prng::new(cfg.seed.unwrap_or(1));
        Self::with_rng(cfg, rng)
    }

    /// Empty network drawing from an injected generator.
    pub fn with_rng(cfg: NetworkConfig, rng: Prng) -> Self {
        Self {
            cfg,
            sensors: Vec::new(),
            neurons: Vec::new(),
            connections: Vec::new(),
            rng,
            phase: Phase::Idle,
            tier: ExecutionTier::default(),
            cycles: 0,
            report: BuildReport::default(),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.cfg
    }

    pub(crate) fn rng_mut(&mut self) -> &mut Prng {
        &mut self.rng
    }

    pub(crate) fn set_report(&mut self, report: BuildReport) {
        self.report = report;
    }

    /// Degraded-topology conditions found when this network was generated.
    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Completed ticks.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn set_execution_tier(&mut self, tier: ExecutionTier) {
        self.tier = tier;
    }

    pub fn execution_tier(&self) -> ExecutionTier {
        self.tier
    }

    /// The tier that will actually run, after compile-time feature gates.
    pub fn effective_execution_tier(&self) -> ExecutionTier {
        match self.tier {
            ExecutionTier::Scalar => ExecutionTier::Scalar,
            ExecutionTier::Parallel => {
                #[cfg(feature = "parallel")]
                {
                    ExecutionTier::Parallel
                }
                #[cfg(not(feature = "parallel"))]
                {
                    ExecutionTier::Scalar
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Construction
    // ---------------------------------------------------------------------

    /// Add a sensor. The value is clamped to the configured sensor range.
    pub fn add_sensor(&mut self, role: SensorRole, position: Vec3, value: f64) -> SensorId {
        let id = SensorId(self.sensors.len());
        let mut sensor = Sensor::new(id, role, position, 0.0);
        sensor.set_value(value, self.cfg.sensor_min, self.cfg.sensor_max);
        self.sensors.push(sensor);
        id
    }

    pub fn add_neuron(&mut self, position: Vec3, bias: f64) -> NeuronId {
        let id = NeuronId(self.neurons.len());
        self.neurons.push(Neuron::new(id, position, bias));
        id
    }

    pub fn set_bias(&mut self, neuron: NeuronId, bias: f64) -> bool {
        match self.neurons.get_mut(neuron.0) {
            Some(n) => {
                n.set_bias(bias);
                true
            }
            None => false,
        }
    }

    /// Connect two existing nodes and register the edge with both endpoints.
    ///
    /// Sensor-touching edges get the configured neutral weight; the rest draw
    /// a uniform weight in [0,1). Returns `None` if either endpoint is missing.
    pub fn connect(&mut self, source: NodeRef, destination: NodeRef) -> Option<ConnectionId> {
        if !(self.contains(source) && self.contains(destination)) {
            return None;
        }
        let id = ConnectionId(self.connections.len());
        let conn = Connection::new(id, source, destination, self.cfg.neutral_weight, &mut self.rng);
        Some(self.push_connection(conn))
    }

    /// Connect with an explicit weight. For a sensor-touching edge the weight
    /// becomes its pinned neutral value. Returns `None` if either endpoint is
    /// missing.
    pub fn connect_with_weight(
        &mut self,
        source: NodeRef,
        destination: NodeRef,
        weight: f64,
    ) -> Option<ConnectionId> {
        if !(self.contains(source) && self.contains(destination)) {
            return None;
        }
        let id = ConnectionId(self.connections.len());
        Some(self.push_connection(Connection::with_weight(id, source, destination, weight)))
    }

    fn contains(&self, node: NodeRef) -> bool {
        NodeView::new(&self.sensors, &self.neurons).contains(node)
    }

    // Endpoints are checked by the caller.
    fn push_connection(&mut self, conn: Connection) -> ConnectionId {
        debug_assert_eq!(self.phase, Phase::Idle, "topology changed mid-tick");
        let id = conn.id();
        let scheme = self.cfg.activation;
        if let NodeRef::Neuron(n) = conn.source() {
            self.neurons[n.0].register_outgoing(id, conn.destination(), &scheme);
        }
        if let NodeRef::Neuron(n) = conn.destination() {
            self.neurons[n.0].register_incoming(id, conn.source(), &scheme);
        }
        self.connections.push(conn);
        id
    }

    /// True if an edge in either direction joins `neuron` and `other`.
    pub fn is_connected(&self, neuron: NeuronId, other: NodeRef) -> bool {
        self.neurons
            .get(neuron.0)
            .map(|n| n.is_connected_to(other))
            .unwrap_or(false)
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub fn neurons(&self) -> &[Neuron] {
        &self.neurons
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn sensor(&self, id: SensorId) -> Option<&Sensor> {
        self.sensors.get(id.0)
    }

    pub fn neuron(&self, id: NeuronId) -> Option<&Neuron> {
        self.neurons.get(id.0)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(id.0)
    }

    /// Committed value of any node.
    pub fn value(&self, node: NodeRef) -> Option<f64> {
        match node {
            NodeRef::Sensor(id) => self.sensor(id).map(Sensor::value),
            NodeRef::Neuron(id) => self.neuron(id).map(Neuron::value),
        }
    }

    /// Committed error of a node. Sensors carry none.
    pub fn error(&self, node: NodeRef) -> Option<f64> {
        match node {
            NodeRef::Sensor(_) => None,
            NodeRef::Neuron(id) => self.neuron(id).map(Neuron::error),
        }
    }

    pub fn sensor_ids(&self, role: SensorRole) -> impl Iterator<Item = SensorId> + '_ {
        self.sensors
            .iter()
            .filter(move |s| s.role() == role)
            .map(Sensor::id)
    }

    pub fn neuron_ids(&self, role: NeuronRole) -> impl Iterator<Item = NeuronId> + '_ {
        self.neurons
            .iter()
            .filter(move |n| n.role() == role)
            .map(Neuron::id)
    }

    /// Error the connection currently carries back to its source.
    pub fn error_contribution(&self, id: ConnectionId) -> Option<f64> {
        let nodes = NodeView::new(&self.sensors, &self.neurons);
        self.connection(id).map(|c| c.error_contribution(nodes))
    }

    // ---------------------------------------------------------------------
    // Between-tick mutation
    // ---------------------------------------------------------------------

    /// Overwrite a sensor value, clamped to the configured range.
    /// Returns false for an unknown sensor.
    pub fn inject_sensor_value(&mut self, id: SensorId, value: f64) -> bool {
        debug_assert_eq!(self.phase, Phase::Idle, "sensor injected mid-tick");
        let (min, max) = (self.cfg.sensor_min, self.cfg.sensor_max);
        match self.sensors.get_mut(id.0) {
            Some(s) => {
                s.set_value(value, min, max);
                true
            }
            None => false,
        }
    }

    /// Draw a fresh uniform value in the sensor range.
    pub fn randomize_sensor(&mut self, id: SensorId) -> bool {
        debug_assert_eq!(self.phase, Phase::Idle, "sensor randomized mid-tick");
        let (min, max) = (self.cfg.sensor_min, self.cfg.sensor_max);
        match self.sensors.get_mut(id.0) {
            Some(s) => {
                s.randomize(&mut self.rng, min, max);
                true
            }
            None => false,
        }
    }

    pub fn randomize_sensors(&mut self) {
        debug_assert_eq!(self.phase, Phase::Idle, "sensors randomized mid-tick");
        let (min, max) = (self.cfg.sensor_min, self.cfg.sensor_max);
        for s in &mut self.sensors {
            s.randomize(&mut self.rng, min, max);
        }
    }

    /// Randomize one sensor picked uniformly; the per-frame stimulus.
    pub fn randomize_random_sensor(&mut self) -> Option<SensorId> {
        if self.sensors.is_empty() {
            return None;
        }
        let id = SensorId(self.rng.gen_range_usize(0, self.sensors.len()));
        self.randomize_sensor(id);
        Some(id)
    }

    /// Re-draw a connection weight (sensor-touching edges return to neutral).
    pub fn reset_connection(&mut self, id: ConnectionId) -> bool {
        debug_assert_eq!(self.phase, Phase::Idle, "weight reset mid-tick");
        match self.connections.get_mut(id.0) {
            Some(c) => {
                c.reset_weight(&mut self.rng);
                true
            }
            None => false,
        }
    }

    pub fn reset_connections(&mut self) {
        debug_assert_eq!(self.phase, Phase::Idle, "weights reset mid-tick");
        for c in &mut self.connections {
            c.reset_weight(&mut self.rng);
        }
    }

    // ---------------------------------------------------------------------
    // Update cycle
    // ---------------------------------------------------------------------

    /// Phase 1: fill every working slot from committed state.
    pub fn buffer(&mut self) {
        debug_assert_eq!(self.phase, Phase::Idle, "buffer called twice without commit");
        match self.effective_execution_tier() {
            ExecutionTier::Scalar => self.buffer_scalar(),
            ExecutionTier::Parallel => {
                #[cfg(feature = "parallel")]
                self.buffer_parallel();
                #[cfg(not(feature = "parallel"))]
                self.buffer_scalar();
            }
        }
        self.phase = Phase::Buffered;
    }

    /// Phase 2: replace committed state with working state.
    pub fn commit(&mut self) {
        debug_assert_eq!(self.phase, Phase::Buffered, "commit without buffer");
        match self.effective_execution_tier() {
            ExecutionTier::Scalar => self.commit_scalar(),
            ExecutionTier::Parallel => {
                #[cfg(feature = "parallel")]
                self.commit_parallel();
                #[cfg(not(feature = "parallel"))]
                self.commit_scalar();
            }
        }
        self.phase = Phase::Idle;
        self.cycles += 1;
    }

    /// One buffer + commit. `delta` does not influence numeric state.
    pub fn tick(&mut self, delta: f64) {
        let _ = delta;
        self.buffer();
        self.commit();
    }

    /// Tick, then hand the committed state to a presentation hook.
    pub fn tick_and_refresh<R: Refresh + ?Sized>(&mut self, delta: f64, refresher: &mut R) {
        self.tick(delta);
        refresher.refresh(self, delta);
    }

    /// Run `n` ticks back to back.
    pub fn run_cycles(&mut self, n: usize) {
        for _ in 0..n {
            self.tick(0.0);
        }
    }

    fn buffer_scalar(&mut self) {
        let learning_rate = self.cfg.learning_rate;
        let nodes = NodeView::new(&self.sensors, &self.neurons);

        let staged: Vec<(Option<f64>, f64)> = self
            .neurons
            .iter()
            .map(|n| {
                (
                    n.buffer_forward(nodes, &self.connections),
                    n.buffer_backward(nodes, &self.connections),
                )
            })
            .collect();

        for c in &mut self.connections {
            c.buffer_weight(nodes, learning_rate);
        }

        for (n, (value, error)) in self.neurons.iter_mut().zip(staged) {
            n.stage(value, error);
        }
    }

    #[cfg(feature = "parallel")]
    fn buffer_parallel(&mut self) {
        let learning_rate = self.cfg.learning_rate;
        let nodes = NodeView::new(&self.sensors, &self.neurons);
        let connections = &self.connections;

        let staged: Vec<(Option<f64>, f64)> = self
            .neurons
            .par_iter()
            .map(|n| {
                (
                    n.buffer_forward(nodes, connections),
                    n.buffer_backward(nodes, connections),
                )
            })
            .collect();

        self.connections
            .par_iter_mut()
            .for_each(|c| c.buffer_weight(nodes, learning_rate));

        self.neurons
            .par_iter_mut()
            .zip(staged.into_par_iter())
            .for_each(|(n, (value, error))| n.stage(value, error));
    }

    fn commit_scalar(&mut self) {
        let neuron_threshold = self.cfg.neuron_changed_threshold;
        let weight_threshold = self.cfg.weight_changed_threshold;
        for n in &mut self.neurons {
            n.commit(neuron_threshold);
        }
        for c in &mut self.connections {
            c.commit(weight_threshold);
        }
    }

    #[cfg(feature = "parallel")]
    fn commit_parallel(&mut self) {
        let neuron_threshold = self.cfg.neuron_changed_threshold;
        let weight_threshold = self.cfg.weight_changed_threshold;
        self.neurons
            .par_iter_mut()
            .for_each(|n| n.commit(neuron_threshold));
        self.connections
            .par_iter_mut()
            .for_each(|c| c.commit(weight_threshold));
    }

    /// Buffer phase visiting entities in the given orders.
    #[cfg(test)]
    fn buffer_in_order(&mut self, neuron_order: &[usize], connection_order: &[usize]) {
        let learning_rate = self.cfg.learning_rate;
        let nodes = NodeView::new(&self.sensors, &self.neurons);

        let mut staged = vec![(None, 0.0); self.neurons.len()];
        for &i in neuron_order {
            let n = &self.neurons[i];
            staged[i] = (
                n.buffer_forward(nodes, &self.connections),
                n.buffer_backward(nodes, &self.connections),
            );
        }
        for &i in connection_order {
            self.connections[i].buffer_weight(nodes, learning_rate);
        }
        for &i in neuron_order {
            let (value, error) = staged[i];
            self.neurons[i].stage(value, error);
        }
        self.phase = Phase::Buffered;
    }

    // ---------------------------------------------------------------------
    // Diagnostics
    // ---------------------------------------------------------------------

    pub fn diagnostics(&self) -> Diagnostics {
        let nodes = NodeView::new(&self.sensors, &self.neurons);

        let weight_sum: f64 = self.connections.iter().map(Connection::weight).sum();
        let avg_weight = if self.connections.is_empty() {
            0.0
        } else {
            weight_sum / self.connections.len() as f64
        };

        let output_error = self
            .connections
            .iter()
            .filter(|c| c.destination().is_sensor())
            .map(|c| (nodes.value(c.source()) - nodes.value(c.destination())).abs())
            .sum();

        let count_role = |role: NeuronRole| self.neurons.iter().filter(|n| n.role() == role).count();

        Diagnostics {
            sensor_count: self.sensors.len(),
            neuron_count: self.neurons.len(),
            connection_count: self.connections.len(),
            cycles: self.cycles,
            avg_weight,
            changed_connections: self.connections.iter().filter(|c| c.changed()).count(),
            changed_neurons: self.neurons.iter().filter(|n| n.changed()).count(),
            output_error,
            isolated_neurons: count_role(NeuronRole::Unassigned),
            input_neurons: count_role(NeuronRole::Input),
            output_neurons: count_role(NeuronRole::Output),
            interior_neurons: count_role(NeuronRole::Interior),
        }
    }

    // ---------------------------------------------------------------------
    // Network images
    // ---------------------------------------------------------------------

    /// Serialize a versioned, chunked network image.
    ///
    /// Only committed state is written; an image taken between `buffer` and
    /// `commit` would drop the working slots.
    pub fn save_image_to<W: Write>(&self, w: &mut W) -> Result<()> {
        debug_assert_eq!(self.phase, Phase::Idle, "image saved mid-tick");
        w.write_all(storage::MAGIC)?;
        storage::write_u32_le(w, storage::VERSION_CURRENT)?;

        self.write_cfg_chunk(w)?;
        self.write_prng_chunk(w)?;
        self.write_stat_chunk(w)?;
        self.write_sensor_chunk(w)?;
        self.write_neuron_chunk(w)?;
        self.write_connection_chunk(w)?;
        Ok(())
    }

    /// Load a network image.
    ///
    /// Unknown chunks are skipped. Edge lists and roles are rebuilt by normal
    /// registration, so every endpoint is validated first.
    pub fn load_image_from<R: Read>(r: &mut R) -> Result<Self> {
        let magic = storage::read_exact::<8, _>(r)?;
        if &magic != storage::MAGIC {
            return Err(NetworkError::BadMagic);
        }

        let version = storage::read_u32_le(r)?;
        if version != storage::VERSION_CURRENT {
            return Err(NetworkError::UnsupportedVersion(version));
        }

        let mut cfg: Option<NetworkConfig> = None;
        let mut rng_state: Option<u64> = None;
        let mut cycles: Option<u64> = None;
        let mut sensors: Option<Vec<Sensor>> = None;
        let mut neurons: Option<Vec<Neuron>> = None;
        let mut connections: Option<Vec<Connection>> = None;

        loop {
            let (tag, len) = match storage::read_chunk_header(r) {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };

            let payload = storage::read_chunk_payload(r, len).map_err(|e| match e {
                NetworkError::Decompress => {
                    NetworkError::corrupt(storage::tag_name(&tag), "payload does not decompress")
                }
                other => other,
            })?;
            let mut cursor = io::Cursor::new(payload);
            match tag {
                storage::CHUNK_CFG => cfg = Some(NetworkConfig::read_payload(&mut cursor)?),
                storage::CHUNK_PRNG => rng_state = Some(storage::read_u64_le(&mut cursor)?),
                storage::CHUNK_STAT => cycles = Some(storage::read_u64_le(&mut cursor)?),
                storage::CHUNK_SENS => sensors = Some(Self::read_sensor_payload(&mut cursor)?),
                storage::CHUNK_NEUR => neurons = Some(Self::read_neuron_payload(&mut cursor)?),
                storage::CHUNK_CONN => {
                    connections = Some(Self::read_connection_payload(&mut cursor)?)
                }
                _ => debug!(
                    tag = %String::from_utf8_lossy(&tag),
                    len,
                    "skipping unknown chunk"
                ),
            }
        }

        let cfg = cfg.ok_or(NetworkError::MissingChunk("CFG0"))?;
        let sensors = sensors.ok_or(NetworkError::MissingChunk("SENS"))?;
        let neurons = neurons.ok_or(NetworkError::MissingChunk("NEUR"))?;
        let connections = connections.ok_or(NetworkError::MissingChunk("CONN"))?;
        let rng_state = rng_state.ok_or(NetworkError::MissingChunk("PRNG"))?;

        let mut network = Self::with_rng(cfg, Prng::from_state(rng_state));
        network.cycles = cycles.unwrap_or(0);
        network.sensors = sensors;
        network.neurons = neurons;

        for (i, conn) in connections.into_iter().enumerate() {
            for node in [conn.source(), conn.destination()] {
                if !network.contains(node) {
                    return Err(NetworkError::DanglingReference {
                        connection: i,
                        node,
                    });
                }
            }
            network.push_connection(conn);
        }
        Ok(network)
    }

    /// Exact serialized size in bytes for the current image.
    pub fn image_size_bytes(&self) -> Result<usize> {
        let mut cw = storage::CountingWriter::new();
        self.save_image_to(&mut cw)?;
        Ok(cw.written())
    }

    pub fn save_image_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.save_image_to(&mut buf)?;
        Ok(buf)
    }

    pub fn load_image_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = io::Cursor::new(bytes);
        Self::load_image_from(&mut cursor)
    }

    fn write_cfg_chunk<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut payload = Vec::new();
        self.cfg.write_payload(&mut payload)?;
        storage::write_chunk_lz4(w, storage::CHUNK_CFG, &payload)?;
        Ok(())
    }

    fn write_prng_chunk<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut payload: Vec<u8> = Vec::with_capacity(8);
        storage::write_u64_le(&mut payload, self.rng.state())?;
        storage::write_chunk_lz4(w, storage::CHUNK_PRNG, &payload)?;
        Ok(())
    }

    fn write_stat_chunk<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut payload: Vec<u8> = Vec::with_capacity(8);
        storage::write_u64_le(&mut payload, self.cycles)?;
        storage::write_chunk_lz4(w, storage::CHUNK_STAT, &payload)?;
        Ok(())
    }

    // Per sensor: role u8, value f64, position 3×f64.
    fn write_sensor_chunk<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut payload: Vec<u8> = Vec::with_capacity(4 + self.sensors.len() * 33);
        storage::write_len(&mut payload, self.sensors.len())?;
        for s in &self.sensors {
            let role = match s.role() {
                SensorRole::Input => 0,
                SensorRole::Output => 1,
            };
            storage::write_u8(&mut payload, role)?;
            storage::write_f64_le(&mut payload, s.value())?;
            write_vec3(&mut payload, s.position())?;
        }
        storage::write_chunk_lz4(w, storage::CHUNK_SENS, &payload)?;
        Ok(())
    }

    fn read_sensor_payload<R: Read>(r: &mut R) -> Result<Vec<Sensor>> {
        let n = storage::read_len(r)?;
        let mut sensors = Vec::with_capacity(n.min(1 << 16));
        for i in 0..n {
            let role = match storage::read_u8(r)? {
                0 => SensorRole::Input,
                1 => SensorRole::Output,
                k => return Err(NetworkError::corrupt("SENS", format!("unknown role {k}"))),
            };
            let value = storage::read_f64_le(r)?;
            let position = read_vec3(r)?;
            sensors.push(Sensor::new(SensorId(i), role, position, value));
        }
        Ok(sensors)
    }

    // Per neuron: position 3×f64, bias, value, error, changed u8.
    fn write_neuron_chunk<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut payload: Vec<u8> = Vec::with_capacity(4 + self.neurons.len() * 49);
        storage::write_len(&mut payload, self.neurons.len())?;
        for n in &self.neurons {
            write_vec3(&mut payload, n.position())?;
            storage::write_f64_le(&mut payload, n.bias())?;
            storage::write_f64_le(&mut payload, n.value())?;
            storage::write_f64_le(&mut payload, n.error())?;
            storage::write_u8(&mut payload, u8::from(n.changed()))?;
        }
        storage::write_chunk_lz4(w, storage::CHUNK_NEUR, &payload)?;
        Ok(())
    }

    fn read_neuron_payload<R: Read>(r: &mut R) -> Result<Vec<Neuron>> {
        let n = storage::read_len(r)?;
        let mut neurons = Vec::with_capacity(n.min(1 << 16));
        for i in 0..n {
            let position = read_vec3(r)?;
            let bias = storage::read_f64_le(r)?;
            let value = storage::read_f64_le(r)?;
            let error = storage::read_f64_le(r)?;
            let changed = storage::read_u8(r)? != 0;
            neurons.push(Neuron::restore(
                NeuronId(i),
                position,
                bias,
                value,
                error,
                changed,
            ));
        }
        Ok(neurons)
    }

    // Per connection: source ref, destination ref, weight, neutral weight, changed u8.
    fn write_connection_chunk<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut payload: Vec<u8> = Vec::with_capacity(4 + self.connections.len() * 27);
        storage::write_len(&mut payload, self.connections.len())?;
        for c in &self.connections {
            storage::write_node_ref(&mut payload, c.source())?;
            storage::write_node_ref(&mut payload, c.destination())?;
            storage::write_f64_le(&mut payload, c.weight())?;
            storage::write_f64_le(&mut payload, c.neutral_weight())?;
            storage::write_u8(&mut payload, u8::from(c.changed()))?;
        }
        storage::write_chunk_lz4(w, storage::CHUNK_CONN, &payload)?;
        Ok(())
    }

    fn read_connection_payload<R: Read>(r: &mut R) -> Result<Vec<Connection>> {
        let n = storage::read_len(r)?;
        let mut connections = Vec::with_capacity(n.min(1 << 16));
        for i in 0..n {
            let source = storage::read_node_ref(r, "CONN")?;
            let destination = storage::read_node_ref(r, "CONN")?;
            let weight = storage::read_f64_le(r)?;
            let neutral = storage::read_f64_le(r)?;
            let changed = storage::read_u8(r)? != 0;
            connections.push(Connection::restore(
                ConnectionId(i),
                source,
                destination,
                weight,
                neutral,
                changed,
            ));
        }
        Ok(connections)
    }
}

pub(crate) fn write_vec3<W: Write>(w: &mut W, v: Vec3) -> io::Result<()> {
    storage::write_f64_le(w, v.x)?;
    storage::write_f64_le(w, v.y)?;
    storage::write_f64_le(w, v.z)
}

pub(crate) fn read_vec3<R: Read>(r: &mut R) -> io::Result<Vec3> {
    Ok(Vec3::new(
        storage::read_f64_le(r)?,
        storage::read_f64_le(r)?,
        storage::read_f64_le(r)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::{Activation, ActivationScheme};
    use crate::topology::build_network;

    fn identity_cfg() -> NetworkConfig {
        NetworkConfig {
            activation: ActivationScheme::identity(),
            ..NetworkConfig::default()
        }
    }

    /// Two inputs feed one interior neuron, which feeds one output sensor.
    fn two_to_one() -> (Network, NeuronId, ConnectionId) {
        let mut net = Network::new(identity_cfg());
        let a = net.add_sensor(SensorRole::Input, Vec3::xy(-1.0, 1.0), 1.0);
        let b = net.add_sensor(SensorRole::Input, Vec3::xy(-1.0, -1.0), 1.0);
        let target = net.add_sensor(SensorRole::Output, Vec3::xy(1.0, 0.0), 0.25);
        let hidden = net.add_neuron(Vec3::ZERO, 0.0);
        net.connect_with_weight(a.into(), hidden.into(), 0.5).unwrap();
        net.connect_with_weight(b.into(), hidden.into(), 0.5).unwrap();
        let out = net.connect_with_weight(hidden.into(), target.into(), 1.0).unwrap();
        (net, hidden, out)
    }

    #[test]
    fn end_to_end_single_tick() {
        let (mut net, hidden, out) = two_to_one();
        assert_eq!(net.neuron(hidden).unwrap().activation(), Activation::None);

        net.tick(1.0 / 60.0);

        let v = net.value(hidden.into()).unwrap();
        assert!((v - 1.0).abs() < 1e-12);
        let err = net.error_contribution(out).unwrap();
        assert!((err - 1.0 * (1.0 - 0.25)).abs() < 1e-12);
        assert_eq!(net.cycles(), 1);
        assert_eq!(net.phase(), Phase::Idle);
    }

    #[test]
    fn buffer_does_not_touch_committed_state() {
        let (mut net, hidden, _) = two_to_one();
        net.buffer();
        assert_eq!(net.phase(), Phase::Buffered);
        assert_eq!(net.value(hidden.into()), Some(0.0));
        net.commit();
        assert_eq!(net.value(hidden.into()), Some(1.0));
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn commit_without_buffer_is_caught() {
        let (mut net, _, _) = two_to_one();
        net.commit();
    }

    #[test]
    fn connect_rejects_missing_endpoints() {
        let (mut net, hidden, _) = two_to_one();
        let before = net.connections().len();
        assert_eq!(net.connect(hidden.into(), NeuronId(42).into()), None);
        assert_eq!(net.connect(SensorId(42).into(), hidden.into()), None);
        assert_eq!(
            net.connect_with_weight(NeuronId(42).into(), SensorId(2).into(), 1.0),
            None
        );
        assert_eq!(net.connections().len(), before);
        assert_eq!(net.neuron(hidden).unwrap().incoming().len(), 2);

        let extra = net.add_neuron(Vec3::xy(0.0, 2.0), 0.0);
        assert_eq!(
            net.connect(hidden.into(), extra.into()),
            Some(ConnectionId(before))
        );
    }

    #[test]
    fn sensor_injection_clamps_and_rejects_unknown_ids() {
        let (mut net, _, _) = two_to_one();
        assert!(net.inject_sensor_value(SensorId(0), 7.0));
        assert_eq!(net.value(SensorId(0).into()), Some(1.0));
        assert!(net.inject_sensor_value(SensorId(0), -7.0));
        assert_eq!(net.value(SensorId(0).into()), Some(0.0));
        assert!(!net.inject_sensor_value(SensorId(99), 0.5));
        assert!(!net.reset_connection(ConnectionId(99)));
    }

    #[test]
    fn processing_order_does_not_change_results() {
        let cfg = NetworkConfig::default().with_seed(21);
        let mut a = build_network(&cfg);
        a.randomize_sensors();
        // Give the graph some non-trivial errors and values first.
        a.run_cycles(5);
        let mut b = a.clone();

        let n = a.neurons().len();
        let c = a.connections().len();
        let forward_n: Vec<usize> = (0..n).collect();
        let forward_c: Vec<usize> = (0..c).collect();
        let mut shuffled_n = forward_n.clone();
        let mut shuffled_c: Vec<usize> = forward_c.iter().rev().copied().collect();
        Prng::new(3).shuffle(&mut shuffled_n);
        Prng::new(4).shuffle(&mut shuffled_c);

        for _ in 0..3 {
            a.buffer_in_order(&forward_n, &forward_c);
            a.commit();
            b.buffer_in_order(&shuffled_n, &shuffled_c);
            b.commit();
        }

        for (x, y) in a.neurons().iter().zip(b.neurons()) {
            assert_eq!(x.value().to_bits(), y.value().to_bits());
            assert_eq!(x.error().to_bits(), y.error().to_bits());
        }
        for (x, y) in a.connections().iter().zip(b.connections()) {
            assert_eq!(x.weight().to_bits(), y.weight().to_bits());
            assert_eq!(x.changed(), y.changed());
        }
    }

    #[test]
    fn sensor_edges_stay_pinned() {
        let cfg = NetworkConfig::default().with_seed(5);
        let mut net = build_network(&cfg);
        for _ in 0..50 {
            net.randomize_random_sensor();
            net.tick(1.0 / 60.0);
        }
        let pinned: Vec<_> = net.connections().iter().filter(|c| c.has_sensor()).collect();
        assert!(!pinned.is_empty());
        for c in pinned {
            assert_eq!(c.weight(), cfg.neutral_weight);
        }
    }

    #[test]
    fn reset_connections_returns_sensor_edges_to_neutral() {
        let cfg = NetworkConfig::default().with_seed(6);
        let mut net = build_network(&cfg);
        let before: Vec<f64> = net.connections().iter().map(Connection::weight).collect();
        net.reset_connections();
        let mut moved = 0;
        for (c, w) in net.connections().iter().zip(before) {
            if c.has_sensor() {
                assert_eq!(c.weight(), 1.0);
            } else {
                assert!((0.0..1.0).contains(&c.weight()));
                if c.weight() != w {
                    moved += 1;
                }
            }
        }
        assert!(moved > 0);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn scalar_and_parallel_tiers_agree() {
        let cfg = NetworkConfig::default().with_seed(13);
        let mut scalar = build_network(&cfg);
        scalar.randomize_sensors();
        let mut parallel = scalar.clone();
        parallel.set_execution_tier(ExecutionTier::Parallel);
        assert_eq!(parallel.effective_execution_tier(), ExecutionTier::Parallel);
        assert_eq!(scalar.effective_execution_tier(), ExecutionTier::Scalar);

        for _ in 0..10 {
            scalar.tick(0.016);
            parallel.tick(0.016);
        }

        for (x, y) in scalar.neurons().iter().zip(parallel.neurons()) {
            assert_eq!(x.value().to_bits(), y.value().to_bits());
            assert_eq!(x.error().to_bits(), y.error().to_bits());
        }
        for (x, y) in scalar.connections().iter().zip(parallel.connections()) {
            assert_eq!(x.weight().to_bits(), y.weight().to_bits());
        }
    }

    #[test]
    fn delta_does_not_affect_numeric_state() {
        let cfg = NetworkConfig::default().with_seed(17);
        let mut a = build_network(&cfg);
        a.randomize_sensors();
        let mut b = a.clone();
        for i in 0..5 {
            a.tick(0.001);
            b.tick(10.0 * (i + 1) as f64);
        }
        for (x, y) in a.neurons().iter().zip(b.neurons()) {
            assert_eq!(x.value().to_bits(), y.value().to_bits());
        }
    }

    #[test]
    fn refresh_sees_committed_state() {
        struct Recorder(Vec<(u64, Phase)>);
        impl Refresh for Recorder {
            fn refresh(&mut self, network: &Network, _delta: f64) {
                self.0.push((network.cycles(), network.phase()));
            }
        }

        let (mut net, _, _) = two_to_one();
        let mut rec = Recorder(Vec::new());
        net.tick_and_refresh(0.1, &mut rec);
        net.tick_and_refresh(0.1, &mut rec);
        assert_eq!(rec.0, vec![(1, Phase::Idle), (2, Phase::Idle)]);
    }

    #[test]
    fn diagnostics_count_roles_and_output_error() {
        let (mut net, _, _) = two_to_one();
        net.add_neuron(Vec3::xy(5.0, 5.0), 0.0);
        net.tick(0.0);

        let d = net.diagnostics();
        assert_eq!(d.sensor_count, 3);
        assert_eq!(d.neuron_count, 2);
        assert_eq!(d.connection_count, 3);
        assert_eq!(d.cycles, 1);
        assert_eq!(d.input_neurons, 1);
        assert_eq!(d.isolated_neurons, 1);
        assert!((d.avg_weight - 2.0 / 3.0).abs() < 1e-12);
        assert!((d.output_error - 0.75).abs() < 1e-12);
    }

    #[test]
    fn image_round_trip_preserves_state() {
        let cfg = NetworkConfig::default().with_seed(29);
        let mut net = build_network(&cfg);
        net.randomize_sensors();
        net.run_cycles(4);

        let bytes = net.save_image_bytes().unwrap();
        assert_eq!(bytes.len(), net.image_size_bytes().unwrap());
        let loaded = Network::load_image_bytes(&bytes).unwrap();

        assert_eq!(loaded.config(), net.config());
        assert_eq!(loaded.cycles(), 4);
        assert_eq!(loaded.sensors().len(), net.sensors().len());
        for (x, y) in loaded.neurons().iter().zip(net.neurons()) {
            assert_eq!(x.position(), y.position());
            assert_eq!(x.value(), y.value());
            assert_eq!(x.error(), y.error());
            assert_eq!(x.role(), y.role());
            assert_eq!(x.activation(), y.activation());
            assert_eq!(x.incoming(), y.incoming());
            assert_eq!(x.outgoing(), y.outgoing());
        }
        for (x, y) in loaded.connections().iter().zip(net.connections()) {
            assert_eq!(x.source(), y.source());
            assert_eq!(x.destination(), y.destination());
            assert_eq!(x.weight(), y.weight());
        }

        // Same future: the generator state travels with the image.
        let mut a = net.clone();
        let mut b = loaded;
        for _ in 0..3 {
            assert_eq!(a.randomize_random_sensor(), b.randomize_random_sensor());
            a.tick(0.0);
            b.tick(0.0);
        }
        for (x, y) in a.connections().iter().zip(b.connections()) {
            assert_eq!(x.weight().to_bits(), y.weight().to_bits());
        }
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = Network::load_image_bytes(b"NOTANIMG\x01\x00\x00\x00").unwrap_err();
        assert!(matches!(err, NetworkError::BadMagic));
    }

    #[test]
    fn future_version_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(storage::MAGIC);
        bytes.extend_from_slice(&99u32.to_le_bytes());
        let err = Network::load_image_bytes(&bytes).unwrap_err();
        assert!(matches!(err, NetworkError::UnsupportedVersion(99)));
    }

    #[test]
    fn missing_chunks_are_reported() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(storage::MAGIC);
        bytes.extend_from_slice(&storage::VERSION_CURRENT.to_le_bytes());
        let err = Network::load_image_bytes(&bytes).unwrap_err();
        assert!(matches!(err, NetworkError::MissingChunk("CFG0")));
    }

    #[test]
    fn unknown_chunks_are_skipped() {
        let (net, _, _) = two_to_one();
        let mut bytes = net.save_image_bytes().unwrap();
        storage::write_chunk_lz4(&mut bytes, *b"XTRA", b"ignored payload").unwrap();
        let loaded = Network::load_image_bytes(&bytes).unwrap();
        assert_eq!(loaded.connections().len(), 3);
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let (mut net, hidden, _) = two_to_one();
        // Bypass registration to forge an edge to a neuron that does not exist.
        net.connections.push(Connection::with_weight(
            ConnectionId(3),
            hidden.into(),
            NeuronId(42).into(),
            0.5,
        ));
        let bytes = net.save_image_bytes().unwrap();
        let err = Network::load_image_bytes(&bytes).unwrap_err();
        match err {
            NetworkError::DanglingReference { connection, node } => {
                assert_eq!(connection, 3);
                assert_eq!(node, NodeRef::Neuron(NeuronId(42)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

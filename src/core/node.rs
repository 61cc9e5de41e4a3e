// Sensors, neurons and the handles that name them.
//
// Nodes never own each other. A neuron knows its edges only as `Incident`
// records (connection handle + the node on the other end), resolved through the
// owning `Network`.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::activation::{Activation, ActivationScheme};
use crate::connection::Connection;
use crate::prng::Prng;
use crate::spatial::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NeuronId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectionId(pub usize);

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl fmt::Display for NeuronId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Either endpoint of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NodeRef {
    Sensor(SensorId),
    Neuron(NeuronId),
}

impl NodeRef {
    #[inline]
    pub fn is_sensor(self) -> bool {
        matches!(self, NodeRef::Sensor(_))
    }

    #[inline]
    pub fn neuron(self) -> Option<NeuronId> {
        match self {
            NodeRef::Neuron(id) => Some(id),
            NodeRef::Sensor(_) => None,
        }
    }

    #[inline]
    pub fn sensor(self) -> Option<SensorId> {
        match self {
            NodeRef::Sensor(id) => Some(id),
            NodeRef::Neuron(_) => None,
        }
    }
}

impl From<SensorId> for NodeRef {
    fn from(id: SensorId) -> Self {
        NodeRef::Sensor(id)
    }
}

impl From<NeuronId> for NodeRef {
    fn from(id: NeuronId) -> Self {
        NodeRef::Neuron(id)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Sensor(id) => id.fmt(f),
            NodeRef::Neuron(id) => id.fmt(f),
        }
    }
}

/// Which side of the network a sensor sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SensorRole {
    /// Stimulus source, read by its outgoing connection.
    Input,
    /// Training target, written to by its incoming connection.
    Output,
}

#[derive(Debug, Clone)]
pub struct Sensor {
    id: SensorId,
    role: SensorRole,
    value: f64,
    position: Vec3,
}

impl Sensor {
    pub(crate) fn new(id: SensorId, role: SensorRole, position: Vec3, value: f64) -> Self {
        Self {
            id,
            role,
            value,
            position,
        }
    }

    pub fn id(&self) -> SensorId {
        self.id
    }

    pub fn role(&self) -> SensorRole {
        self.role
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub(crate) fn set_value(&mut self, value: f64, min: f64, max: f64) {
        // Not `clamp`: an inverted range must not panic.
        self.value = value.max(min).min(max);
    }

    pub(crate) fn randomize(&mut self, rng: &mut Prng, min: f64, max: f64) {
        self.value = rng.gen_range_f64(min, max);
    }
}

/// Role derived from the kinds of nodes a neuron's edges touch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NeuronRole {
    /// No edges yet.
    #[default]
    Unassigned,
    /// Fed directly by a sensor.
    Input,
    /// Feeds a sensor directly.
    Output,
    Interior,
}

/// One edge as seen from a neuron.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incident {
    pub connection: ConnectionId,
    /// The node on the other end of the edge.
    pub peer: NodeRef,
}

#[derive(Debug, Clone)]
pub struct Neuron {
    id: NeuronId,
    position: Vec3,
    bias: f64,

    value: f64,
    error: f64,
    changed: bool,

    // Phase-1 results. Only `commit` reads these.
    working_value: Option<f64>,
    working_error: f64,

    incoming: Vec<Incident>,
    outgoing: Vec<Incident>,

    role: NeuronRole,
    activation: Activation,
}

impl Neuron {
    pub(crate) fn new(id: NeuronId, position: Vec3, bias: f64) -> Self {
        Self {
            id,
            position,
            bias,
            value: 0.0,
            error: 0.0,
            changed: false,
            working_value: None,
            working_error: 0.0,
            incoming: Vec::new(),
            outgoing: Vec::new(),
            role: NeuronRole::Unassigned,
            activation: Activation::None,
        }
    }

    pub(crate) fn restore(
        id: NeuronId,
        position: Vec3,
        bias: f64,
        value: f64,
        error: f64,
        changed: bool,
    ) -> Self {
        let mut n = Self::new(id, position, bias);
        n.value = value;
        n.error = error;
        n.changed = changed;
        n
    }

    pub fn id(&self) -> NeuronId {
        self.id
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn error(&self) -> f64 {
        self.error
    }

    /// True when the last commit moved the value past the neuron change threshold.
    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn role(&self) -> NeuronRole {
        self.role
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn incoming(&self) -> &[Incident] {
        &self.incoming
    }

    pub fn outgoing(&self) -> &[Incident] {
        &self.outgoing
    }

    pub fn out_degree(&self) -> usize {
        self.outgoing.len()
    }

    pub(crate) fn set_bias(&mut self, bias: f64) {
        self.bias = bias;
    }

    pub(crate) fn register_incoming(
        &mut self,
        connection: ConnectionId,
        source: NodeRef,
        scheme: &ActivationScheme,
    ) {
        self.incoming.push(Incident {
            connection,
            peer: source,
        });
        self.reclassify(scheme);
    }

    pub(crate) fn register_outgoing(
        &mut self,
        connection: ConnectionId,
        destination: NodeRef,
        scheme: &ActivationScheme,
    ) {
        self.outgoing.push(Incident {
            connection,
            peer: destination,
        });
        self.reclassify(scheme);
    }

    /// Recompute role and activation from the current edge set.
    ///
    /// Edges are only ever added, so once a neuron leaves `Unassigned` it never
    /// returns there; a sensor-facing edge upgrades an interior neuron.
    fn reclassify(&mut self, scheme: &ActivationScheme) {
        self.role = if self.incoming.iter().any(|e| e.peer.is_sensor()) {
            NeuronRole::Input
        } else if self.outgoing.iter().any(|e| e.peer.is_sensor()) {
            NeuronRole::Output
        } else if !self.incoming.is_empty() || !self.outgoing.is_empty() {
            NeuronRole::Interior
        } else {
            NeuronRole::Unassigned
        };
        self.activation = scheme.for_role(self.role);
    }

    /// True if any edge, in either direction, joins this neuron to `other`.
    pub fn is_connected_to(&self, other: NodeRef) -> bool {
        self.incoming.iter().any(|e| e.peer == other) || self.outgoing.iter().any(|e| e.peer == other)
    }

    /// Activated aggregate input, or `None` when nothing feeds this neuron.
    pub fn buffer_forward(&self, nodes: NodeView<'_>, connections: &[Connection]) -> Option<f64> {
        if self.incoming.is_empty() {
            return None;
        }
        let aggregate = self.bias
            + self
                .incoming
                .iter()
                .map(|e| connections[e.connection.0].value_contribution(nodes))
                .sum::<f64>();
        Some(self.activation.value(aggregate))
    }

    /// Aggregate outgoing error scaled by the derivative at the committed value.
    pub fn buffer_backward(&self, nodes: NodeView<'_>, connections: &[Connection]) -> f64 {
        let aggregate = self
            .outgoing
            .iter()
            .map(|e| connections[e.connection.0].error_contribution(nodes))
            .sum::<f64>();
        aggregate * self.activation.derivative(self.value)
    }

    /// Store phase-1 results in this neuron's own working slot.
    pub(crate) fn stage(&mut self, value: Option<f64>, error: f64) {
        self.working_value = value;
        self.working_error = error;
    }

    pub(crate) fn commit(&mut self, changed_threshold: f64) {
        match self.working_value {
            Some(v) => {
                self.changed = (self.value - v).abs() >= changed_threshold;
                self.value = v;
            }
            None => self.changed = false,
        }
        self.error = self.working_error;
    }
}

/// Read-only view of committed node state.
///
/// Connections and neurons read their neighbors only through this view during
/// the buffer phase, so working slots are never visible to them.
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    sensors: &'a [Sensor],
    neurons: &'a [Neuron],
}

impl<'a> NodeView<'a> {
    pub fn new(sensors: &'a [Sensor], neurons: &'a [Neuron]) -> Self {
        Self { sensors, neurons }
    }

    #[inline]
    pub fn value(&self, node: NodeRef) -> f64 {
        match node {
            NodeRef::Sensor(id) => self.sensors[id.0].value,
            NodeRef::Neuron(id) => self.neurons[id.0].value,
        }
    }

    /// Committed error; sensors expose none.
    #[inline]
    pub fn error(&self, node: NodeRef) -> Option<f64> {
        match node {
            NodeRef::Sensor(_) => None,
            NodeRef::Neuron(id) => Some(self.neurons[id.0].error),
        }
    }

    pub fn contains(&self, node: NodeRef) -> bool {
        match node {
            NodeRef::Sensor(id) => id.0 < self.sensors.len(),
            NodeRef::Neuron(id) => id.0 < self.neurons.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> ActivationScheme {
        ActivationScheme::default()
    }

    #[test]
    fn fresh_neuron_is_unassigned() {
        let n = Neuron::new(NeuronId(0), Vec3::ZERO, 0.0);
        assert_eq!(n.role(), NeuronRole::Unassigned);
        assert_eq!(n.activation(), Activation::None);
    }

    #[test]
    fn sensor_fed_neuron_is_input() {
        let mut n = Neuron::new(NeuronId(0), Vec3::ZERO, 0.0);
        n.register_incoming(ConnectionId(0), SensorId(0).into(), &scheme());
        assert_eq!(n.role(), NeuronRole::Input);
        assert_eq!(n.activation(), Activation::Relu);

        // Interior edges added later keep the input role.
        n.register_outgoing(ConnectionId(1), NeuronId(1).into(), &scheme());
        assert_eq!(n.activation(), Activation::Relu);
    }

    #[test]
    fn interior_neuron_is_reclassified_by_sensor_edge() {
        let mut n = Neuron::new(NeuronId(0), Vec3::ZERO, 0.0);
        n.register_incoming(ConnectionId(0), NeuronId(3).into(), &scheme());
        assert_eq!(n.activation(), Activation::LeakyRelu);
        n.register_outgoing(ConnectionId(1), NeuronId(4).into(), &scheme());
        assert_eq!(n.activation(), Activation::LeakyRelu);
        n.register_outgoing(ConnectionId(2), SensorId(0).into(), &scheme());
        assert_eq!(n.role(), NeuronRole::Output);
        assert_eq!(n.activation(), Activation::Sigmoid);
    }

    #[test]
    fn connectedness_checks_both_directions() {
        let mut n = Neuron::new(NeuronId(0), Vec3::ZERO, 0.0);
        n.register_incoming(ConnectionId(0), NeuronId(1).into(), &scheme());
        n.register_outgoing(ConnectionId(1), NeuronId(2).into(), &scheme());
        assert!(n.is_connected_to(NeuronId(1).into()));
        assert!(n.is_connected_to(NeuronId(2).into()));
        assert!(!n.is_connected_to(NeuronId(3).into()));
    }

    #[test]
    fn commit_without_working_value_keeps_value() {
        let mut n = Neuron::restore(NeuronId(0), Vec3::ZERO, 0.3, 0.7, 0.0, false);
        n.stage(None, 0.25);
        n.commit(0.01);
        assert_eq!(n.value(), 0.7);
        assert_eq!(n.error(), 0.25);
        assert!(!n.changed());

        n.stage(Some(0.9), 0.0);
        n.commit(0.01);
        assert_eq!(n.value(), 0.9);
        assert!(n.changed());
    }

    #[test]
    fn sensor_values_are_clamped_to_range() {
        let mut s = Sensor::new(SensorId(0), SensorRole::Input, Vec3::ZERO, 0.0);
        s.set_value(3.0, 0.0, 1.0);
        assert_eq!(s.value(), 1.0);
        s.set_value(-3.0, 0.0, 1.0);
        assert_eq!(s.value(), 0.0);

        let mut rng = Prng::new(3);
        for _ in 0..100 {
            s.randomize(&mut rng, 0.25, 0.5);
            assert!((0.25..0.5).contains(&s.value()));
        }
    }
}

// Weighted directed edges: the only site of learning.

use crate::node::{ConnectionId, NodeRef, NodeView};
use crate::prng::Prng;

#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    source: NodeRef,
    destination: NodeRef,

    weight: f64,
    working_weight: f64,

    // Weight that sensor-touching edges are pinned to.
    neutral_weight: f64,

    has_sensor: bool,
    changed: bool,
}

impl Connection {
    /// Sensor-touching edges start at `neutral_weight`; all others draw from [0,1).
    pub(crate) fn new(
        id: ConnectionId,
        source: NodeRef,
        destination: NodeRef,
        neutral_weight: f64,
        rng: &mut Prng,
    ) -> Self {
        let has_sensor = source.is_sensor() || destination.is_sensor();
        let weight = if has_sensor {
            neutral_weight
        } else {
            rng.next_f64_01()
        };
        Self {
            id,
            source,
            destination,
            weight,
            working_weight: weight,
            neutral_weight,
            has_sensor,
            changed: false,
        }
    }

    /// Hand-authored edge. For a sensor-touching edge the given weight becomes
    /// its pinned value.
    pub(crate) fn with_weight(
        id: ConnectionId,
        source: NodeRef,
        destination: NodeRef,
        weight: f64,
    ) -> Self {
        let has_sensor = source.is_sensor() || destination.is_sensor();
        Self {
            id,
            source,
            destination,
            weight,
            working_weight: weight,
            neutral_weight: weight,
            has_sensor,
            changed: false,
        }
    }

    pub(crate) fn restore(
        id: ConnectionId,
        source: NodeRef,
        destination: NodeRef,
        weight: f64,
        neutral_weight: f64,
        changed: bool,
    ) -> Self {
        let mut c = Self::with_weight(id, source, destination, weight);
        c.neutral_weight = neutral_weight;
        c.changed = changed;
        c
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn source(&self) -> NodeRef {
        self.source
    }

    pub fn destination(&self) -> NodeRef {
        self.destination
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn neutral_weight(&self) -> f64 {
        self.neutral_weight
    }

    pub fn has_sensor(&self) -> bool {
        self.has_sensor
    }

    /// True when the last commit moved the weight by at least the change threshold.
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Amount this edge adds to its destination's aggregate input.
    #[inline]
    pub fn value_contribution(&self, nodes: NodeView<'_>) -> f64 {
        self.weight * nodes.value(self.source)
    }

    /// Error carried backwards to the source.
    ///
    /// A sensor destination holds the training target, so the error is the
    /// difference between the source value and that target.
    #[inline]
    pub fn error_contribution(&self, nodes: NodeView<'_>) -> f64 {
        match self.destination {
            NodeRef::Sensor(_) => {
                let target = nodes.value(self.destination);
                self.weight * (nodes.value(self.source) - target)
            }
            NodeRef::Neuron(_) => self.weight * nodes.error(self.destination).unwrap_or(0.0),
        }
    }

    /// Compute the working weight from committed state.
    ///
    /// A zero destination error leaves the working weight untouched.
    pub fn buffer_weight(&mut self, nodes: NodeView<'_>, learning_rate: f64) {
        if self.has_sensor {
            return;
        }
        let error = nodes.error(self.destination).unwrap_or(0.0);
        if error != 0.0 {
            self.working_weight =
                self.weight - error * nodes.value(self.source) * learning_rate;
        }
    }

    pub(crate) fn commit(&mut self, changed_threshold: f64) {
        self.changed = (self.weight - self.working_weight).abs() >= changed_threshold;
        self.weight = self.working_weight;
    }

    /// Fresh random weight, or the neutral weight for sensor-touching edges.
    pub(crate) fn reset_weight(&mut self, rng: &mut Prng) {
        self.weight = if self.has_sensor {
            self.neutral_weight
        } else {
            rng.next_f64_01()
        };
        // Keep the next commit from reverting the reset.
        self.working_weight = self.weight;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Neuron, NeuronId, Sensor, SensorId, SensorRole};
    use crate::spatial::Vec3;

    fn nodes_fixture() -> (Vec<Sensor>, Vec<Neuron>) {
        let sensors = vec![
            Sensor::new(SensorId(0), SensorRole::Input, Vec3::ZERO, 0.8),
            Sensor::new(SensorId(1), SensorRole::Output, Vec3::ZERO, 0.25),
        ];
        let neurons = vec![
            Neuron::restore(NeuronId(0), Vec3::ZERO, 0.0, 0.5, 0.0, false),
            Neuron::restore(NeuronId(1), Vec3::ZERO, 0.0, 0.0, 0.2, false),
        ];
        (sensors, neurons)
    }

    #[test]
    fn change_threshold_gates_changed_flag() {
        let mut c =
            Connection::with_weight(ConnectionId(0), NeuronId(0).into(), NeuronId(1).into(), 0.5);
        c.working_weight = 0.5005;
        c.commit(0.01);
        assert!(!c.changed());
        assert_eq!(c.weight(), 0.5005);

        let mut c =
            Connection::with_weight(ConnectionId(0), NeuronId(0).into(), NeuronId(1).into(), 0.5);
        c.working_weight = 0.52;
        c.commit(0.01);
        assert!(c.changed());
        assert_eq!(c.weight(), 0.52);
    }

    #[test]
    fn sensor_edges_start_neutral_and_others_random() {
        let mut rng = Prng::new(4);
        let c = Connection::new(
            ConnectionId(0),
            SensorId(0).into(),
            NeuronId(0).into(),
            1.0,
            &mut rng,
        );
        assert!(c.has_sensor());
        assert_eq!(c.weight(), 1.0);

        for i in 0..50 {
            let c = Connection::new(
                ConnectionId(i),
                NeuronId(0).into(),
                NeuronId(1).into(),
                1.0,
                &mut rng,
            );
            assert!(!c.has_sensor());
            assert!((0.0..1.0).contains(&c.weight()));
        }
    }

    #[test]
    fn contributions() {
        let (sensors, neurons) = nodes_fixture();
        let nodes = NodeView::new(&sensors, &neurons);

        let forward =
            Connection::with_weight(ConnectionId(0), SensorId(0).into(), NeuronId(0).into(), 2.0);
        assert!((forward.value_contribution(nodes) - 1.6).abs() < 1e-12);

        // Neuron destination: weight * destination error.
        let hidden =
            Connection::with_weight(ConnectionId(1), NeuronId(0).into(), NeuronId(1).into(), 0.5);
        assert!((hidden.error_contribution(nodes) - 0.1).abs() < 1e-12);

        // Sensor destination: weight * (source value - target).
        let output =
            Connection::with_weight(ConnectionId(2), NeuronId(0).into(), SensorId(1).into(), 1.0);
        assert!((output.error_contribution(nodes) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn buffer_weight_descends_destination_error() {
        let (sensors, neurons) = nodes_fixture();
        let nodes = NodeView::new(&sensors, &neurons);

        let mut c =
            Connection::with_weight(ConnectionId(0), NeuronId(0).into(), NeuronId(1).into(), 0.5);
        c.buffer_weight(nodes, 0.125);
        // 0.5 - 0.2 * 0.5 * 0.125
        assert!((c.working_weight - 0.4875).abs() < 1e-12);
        // Committed weight is untouched until commit.
        assert_eq!(c.weight(), 0.5);
        c.commit(0.01);
        assert!((c.weight() - 0.4875).abs() < 1e-12);
        assert!(c.changed());
    }

    #[test]
    fn zero_error_leaves_working_weight() {
        let (sensors, neurons) = nodes_fixture();
        let nodes = NodeView::new(&sensors, &neurons);

        // Destination n0 has zero error.
        let mut c =
            Connection::with_weight(ConnectionId(0), NeuronId(1).into(), NeuronId(0).into(), 0.3);
        c.buffer_weight(nodes, 0.125);
        c.commit(0.01);
        assert_eq!(c.weight(), 0.3);
        assert!(!c.changed());
    }

    #[test]
    fn sensor_edges_never_learn_and_reset_to_neutral() {
        let (sensors, neurons) = nodes_fixture();
        let nodes = NodeView::new(&sensors, &neurons);
        let mut rng = Prng::new(8);

        let mut c = Connection::new(
            ConnectionId(0),
            NeuronId(1).into(),
            SensorId(1).into(),
            1.0,
            &mut rng,
        );
        for _ in 0..10 {
            c.buffer_weight(nodes, 0.5);
            c.commit(0.01);
            assert_eq!(c.weight(), 1.0);
        }
        c.reset_weight(&mut rng);
        assert_eq!(c.weight(), 1.0);
    }

    #[test]
    fn reset_survives_next_commit() {
        let mut rng = Prng::new(12);
        let mut c =
            Connection::with_weight(ConnectionId(0), NeuronId(0).into(), NeuronId(1).into(), 5.0);
        c.reset_weight(&mut rng);
        let fresh = c.weight();
        assert!((0.0..1.0).contains(&fresh));
        c.commit(0.01);
        assert_eq!(c.weight(), fresh);
    }
}

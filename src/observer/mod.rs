use crate::network::{Diagnostics, Network, Refresh};
use crate::node::{NeuronRole, NodeRef, SensorRole};
use crate::spatial::Vec3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Longest frame a presenter will integrate over, in seconds.
pub const MAX_DELTA: f64 = 0.2;

/// Fraction of the remaining distance glow covers per 1/60 s frame.
pub const DEFAULT_EASING: f64 = 0.1;

const REFERENCE_FRAME: f64 = 1.0 / 60.0;

/// A read-only snapshot of the network's committed state.
///
/// Design intent:
/// - Observers cannot mutate or steer the network.
/// - Snapshotting is on-demand and allocates; the tick loop stays unchanged.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NetworkSnapshot {
    pub cycles: u64,
    pub diagnostics: Diagnostics,
    pub sensors: Vec<SensorSample>,
    pub neurons: Vec<NeuronSample>,
    pub connections: Vec<ConnectionSample>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorSample {
    pub id: usize,
    pub output: bool,
    pub value: f64,
    pub position: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NeuronSample {
    pub id: usize,
    pub role: NeuronRole,
    pub value: f64,
    pub error: f64,
    pub changed: bool,
    pub position: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectionSample {
    pub id: usize,
    pub source: NodeRef,
    pub destination: NodeRef,
    pub weight: f64,
    pub changed: bool,
}

pub struct NetworkAdapter<'a> {
    network: &'a Network,
}

impl<'a> NetworkAdapter<'a> {
    pub fn new(network: &'a Network) -> Self {
        Self { network }
    }

    /// Counts and aggregates only.
    pub fn summary(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            cycles: self.network.cycles(),
            diagnostics: self.network.diagnostics(),
            sensors: Vec::new(),
            neurons: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> NetworkSnapshot {
        let net = self.network;
        NetworkSnapshot {
            sensors: net
                .sensors()
                .iter()
                .map(|s| SensorSample {
                    id: s.id().0,
                    output: s.role() == SensorRole::Output,
                    value: s.value(),
                    position: s.position(),
                })
                .collect(),
            neurons: net
                .neurons()
                .iter()
                .map(|n| NeuronSample {
                    id: n.id().0,
                    role: n.role(),
                    value: n.value(),
                    error: n.error(),
                    changed: n.changed(),
                    position: n.position(),
                })
                .collect(),
            connections: net
                .connections()
                .iter()
                .map(|c| ConnectionSample {
                    id: c.id().0,
                    source: c.source(),
                    destination: c.destination(),
                    weight: c.weight(),
                    changed: c.changed(),
                })
                .collect(),
            ..self.summary()
        }
    }
}

/// Smoothed presentation state, refreshed once per committed tick.
///
/// Glow eases toward the node value clamped to [0,1]; an edge glows with its
/// source. Easing is frame-rate independent and `delta` is capped at
/// [`MAX_DELTA`] so a stalled frame does not snap everything to its target.
#[derive(Debug, Clone)]
pub struct Presenter {
    easing: f64,
    sensor_glow: Vec<f64>,
    neuron_glow: Vec<f64>,
    edge_glow: Vec<f64>,
    edge_thickness: Vec<f64>,
}

impl Default for Presenter {
    fn default() -> Self {
        Self::new(DEFAULT_EASING)
    }
}

impl Presenter {
    pub fn new(easing: f64) -> Self {
        Self {
            easing: easing.clamp(0.0, 1.0),
            sensor_glow: Vec::new(),
            neuron_glow: Vec::new(),
            edge_glow: Vec::new(),
            edge_thickness: Vec::new(),
        }
    }

    pub fn sensor_glow(&self) -> &[f64] {
        &self.sensor_glow
    }

    pub fn neuron_glow(&self) -> &[f64] {
        &self.neuron_glow
    }

    pub fn edge_glow(&self) -> &[f64] {
        &self.edge_glow
    }

    /// Edge radius, `max(0.1, weight) * 0.25`.
    pub fn edge_thickness(&self) -> &[f64] {
        &self.edge_thickness
    }

    /// Blend factor for a frame of `delta` seconds.
    pub fn blend(&self, delta: f64) -> f64 {
        let frames = delta.clamp(0.0, MAX_DELTA) / REFERENCE_FRAME;
        1.0 - (1.0 - self.easing).powf(frames)
    }
}

fn ease(glow: &mut f64, value: f64, k: f64) {
    *glow += (value.clamp(0.0, 1.0) - *glow) * k;
}

impl Refresh for Presenter {
    fn refresh(&mut self, network: &Network, delta: f64) {
        let k = self.blend(delta);

        self.sensor_glow.resize(network.sensors().len(), 0.0);
        self.neuron_glow.resize(network.neurons().len(), 0.0);
        self.edge_glow.resize(network.connections().len(), 0.0);
        self.edge_thickness.resize(network.connections().len(), 0.0);

        for (glow, s) in self.sensor_glow.iter_mut().zip(network.sensors()) {
            ease(glow, s.value(), k);
        }
        for (glow, n) in self.neuron_glow.iter_mut().zip(network.neurons()) {
            ease(glow, n.value(), k);
        }
        for ((glow, thickness), c) in self
            .edge_glow
            .iter_mut()
            .zip(self.edge_thickness.iter_mut())
            .zip(network.connections())
        {
            ease(glow, network.value(c.source()).unwrap_or(0.0), k);
            *thickness = c.weight().max(0.1) * 0.25;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationScheme;
    use crate::topology::{build_network, NetworkConfig};

    fn lit_network() -> Network {
        let mut net = Network::new(NetworkConfig {
            activation: ActivationScheme::identity(),
            ..NetworkConfig::default()
        });
        let s = net.add_sensor(SensorRole::Input, Vec3::ZERO, 1.0);
        let n = net.add_neuron(Vec3::xy(1.0, 0.0), 0.0);
        net.connect_with_weight(s.into(), n.into(), 1.0);
        net
    }

    #[test]
    fn glow_eases_toward_clamped_value() {
        let mut net = lit_network();
        let mut p = Presenter::default();
        net.tick_and_refresh(REFERENCE_FRAME, &mut p);
        assert!((p.sensor_glow()[0] - 0.1).abs() < 1e-12);
        assert!((p.neuron_glow()[0] - 0.1).abs() < 1e-12);
        assert!((p.edge_glow()[0] - 0.1).abs() < 1e-12);

        for _ in 0..500 {
            net.tick_and_refresh(REFERENCE_FRAME, &mut p);
        }
        assert!((p.neuron_glow()[0] - 1.0).abs() < 1e-9);
        assert!((p.edge_thickness()[0] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn long_frames_are_capped() {
        let p = Presenter::default();
        assert_eq!(p.blend(5.0), p.blend(MAX_DELTA));
        assert!(p.blend(MAX_DELTA) < 1.0);
        assert_eq!(p.blend(0.0), 0.0);
        assert_eq!(p.blend(-1.0), 0.0);
    }

    #[test]
    fn refresh_does_not_change_numeric_state() {
        let cfg = NetworkConfig::default().with_seed(3);
        let mut a = build_network(&cfg);
        a.randomize_sensors();
        let mut b = a.clone();
        let mut p = Presenter::default();
        for _ in 0..5 {
            a.tick_and_refresh(0.05, &mut p);
            b.tick(0.05);
        }
        assert_eq!(NetworkAdapter::new(&a).snapshot(), NetworkAdapter::new(&b).snapshot());
    }

    #[test]
    fn snapshot_mirrors_network() {
        let mut net = lit_network();
        net.tick(0.0);
        let snap = NetworkAdapter::new(&net).snapshot();
        assert_eq!(snap.cycles, 1);
        assert_eq!(snap.sensors.len(), 1);
        assert_eq!(snap.neurons[0].value, 1.0);
        assert_eq!(snap.connections[0].source, NodeRef::Sensor(crate::node::SensorId(0)));
        assert_eq!(snap.diagnostics.connection_count, 1);

        let summary = NetworkAdapter::new(&net).summary();
        assert!(summary.neurons.is_empty());
        assert_eq!(summary.diagnostics, snap.diagnostics);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn snapshot_serializes_to_json() {
        let net = lit_network();
        let json = serde_json::to_string(&NetworkAdapter::new(&net).snapshot()).unwrap();
        assert!(json.contains("\"cycles\":0"));
        assert!(json.contains("\"role\":\"Input\""));
    }
}

//! Procedural network generation from spatial placement rules.
//!
//! A network is grown from one or more [`SiteConfig`]s. Each site places an
//! input cluster and an output cluster (sensor + paired neuron per slot) on two
//! rings around its origin, fills the annulus between them with shell rings of
//! interior neurons, and then every neuron is wired to nearby neighbors that lie
//! roughly along the site's flow direction.
//!
//! Generation never fails. Conditions that leave the graph degraded are logged
//! and collected in a [`BuildReport`].

use std::f64::consts::TAU;
use std::io::{Read, Write};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::activation::{Activation, ActivationScheme};
use crate::error::{NetworkError, Result, TopologyWarning};
use crate::network::{read_vec3, write_vec3, Network};
use crate::node::{NeuronId, NodeRef, SensorRole};
use crate::prng::Prng;
use crate::spatial::{nearest, Vec3};
use crate::storage;

/// Which ring carries the inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Flow {
    /// Inputs on the outer ring, outputs on the inner ring.
    #[default]
    Inward,
    /// Inputs on the inner ring, outputs on the outer ring.
    Outward,
}

/// How shell neurons pick the direction they wire towards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DirectionRule {
    /// Along the site's flow, relative to its origin.
    #[default]
    OriginNormal,
    /// From the nearest input-cluster neuron towards the nearest output-cluster
    /// neuron, searching every site.
    NearestReferences,
}

/// One cluster pair around an origin plus the shells between its rings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SiteConfig {
    pub origin: Vec3,
    pub outer_radius: f64,
    pub inner_radius: f64,
    /// Radial distance between a cluster neuron and its sensor.
    pub sensor_offset: f64,
    pub inputs: usize,
    pub outputs: usize,
    pub shells: usize,
    /// Arc length between neighboring shell neurons.
    pub spacing: f64,
    /// Maximum random displacement of shell neurons along x and y.
    pub jitter: f64,
    pub flow: Flow,
    pub direction: DirectionRule,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            outer_radius: 30.0,
            inner_radius: 6.0,
            sensor_offset: 2.0,
            inputs: 24,
            outputs: 12,
            shells: 10,
            spacing: 1.0,
            jitter: 0.0,
            flow: Flow::Inward,
            direction: DirectionRule::OriginNormal,
        }
    }
}

impl SiteConfig {
    pub fn at(origin: Vec3) -> Self {
        Self {
            origin,
            ..Self::default()
        }
    }

    pub fn with_radii(mut self, inner: f64, outer: f64) -> Self {
        self.inner_radius = inner;
        self.outer_radius = outer;
        self
    }

    pub fn with_clusters(mut self, inputs: usize, outputs: usize) -> Self {
        self.inputs = inputs;
        self.outputs = outputs;
        self
    }

    pub fn with_shells(mut self, shells: usize, spacing: f64) -> Self {
        self.shells = shells;
        self.spacing = spacing;
        self
    }

    pub fn with_flow(mut self, flow: Flow) -> Self {
        self.flow = flow;
        self
    }

    pub fn with_direction(mut self, rule: DirectionRule) -> Self {
        self.direction = rule;
        self
    }

    // Radii of the input and output cluster neurons.
    fn cluster_radii(&self) -> (f64, f64) {
        match self.flow {
            Flow::Inward => (self.outer_radius, self.inner_radius),
            Flow::Outward => (self.inner_radius, self.outer_radius),
        }
    }

    // Sensors sit outside the outer ring and inside the inner ring.
    fn sensor_radius(&self, neuron_radius: f64) -> f64 {
        if neuron_radius >= self.outer_radius {
            neuron_radius + self.sensor_offset
        } else {
            neuron_radius - self.sensor_offset
        }
    }

    /// Unit direction of flow at `p`.
    pub fn origin_normal(&self, p: Vec3) -> Vec3 {
        match self.flow {
            Flow::Inward => p.direction_to(self.origin),
            Flow::Outward => self.origin.direction_to(p),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NetworkConfig {
    pub sensor_min: f64,
    pub sensor_max: f64,

    pub sites: Vec<SiteConfig>,

    pub connections_min: usize,
    /// Out-degree cap; 0 means unbounded.
    pub connections_max: usize,
    /// Probability of accepting a candidate on each scan.
    pub connection_chance: f64,
    pub connection_length_max: f64,
    /// Minimum dot product between the target direction and the direction to a
    /// candidate.
    pub connection_dot_min: f64,

    pub learning_rate: f64,
    pub weight_changed_threshold: f64,
    pub neuron_changed_threshold: f64,
    /// Weight sensor-touching connections are pinned to.
    pub neutral_weight: f64,

    pub activation: ActivationScheme,

    pub seed: Option<u64>,
}

impl Default for NetworkConfig {
    /// The single-ring layout: 24 inputs outside, 12 outputs inside, ten shells.
    fn default() -> Self {
        Self {
            sensor_min: 0.0,
            sensor_max: 1.0,
            sites: vec![SiteConfig::default()],
            connections_min: 2,
            connections_max: 0,
            connection_chance: 0.25,
            connection_length_max: 3.0,
            connection_dot_min: 0.1,
            learning_rate: 0.125,
            weight_changed_threshold: 0.01,
            neuron_changed_threshold: 0.01,
            neutral_weight: 1.0,
            activation: ActivationScheme::default(),
            seed: None,
        }
    }
}

impl NetworkConfig {
    /// Two smaller sites side by side whose shells wire from the nearest input
    /// cluster neuron towards the nearest output cluster neuron.
    pub fn twin_sites() -> Self {
        let site = |x: f64| {
            SiteConfig::at(Vec3::xy(x, 0.0))
                .with_radii(4.0, 14.0)
                .with_clusters(12, 6)
                .with_shells(5, 1.0)
                .with_direction(DirectionRule::NearestReferences)
        };
        Self {
            sites: vec![site(-16.0), site(16.0)],
            ..Self::default()
        }
    }

    /// Set the random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_sites(mut self, sites: Vec<SiteConfig>) -> Self {
        self.sites = sites;
        self
    }

    pub fn with_degree(mut self, min: usize, max: usize) -> Self {
        self.connections_min = min;
        self.connections_max = max;
        self
    }

    pub fn with_connection_chance(mut self, chance: f64) -> Self {
        self.connection_chance = chance;
        self
    }

    pub fn with_learning_rate(mut self, rate: f64) -> Self {
        self.learning_rate = rate;
        self
    }

    pub fn with_activation(mut self, scheme: ActivationScheme) -> Self {
        self.activation = scheme;
        self
    }

    /// Reject configurations that are malformed rather than merely sparse.
    ///
    /// Degenerate-but-valid settings (no shells, zero chance, unreachable
    /// minimum degree) pass and surface as [`TopologyWarning`]s instead.
    pub fn validate(&self) -> core::result::Result<(), &'static str> {
        if !(self.sensor_min <= self.sensor_max) {
            return Err("sensor_min must be <= sensor_max");
        }
        if self.connections_max > 0 && self.connections_max < self.connections_min {
            return Err("connections_max must be 0 or >= connections_min");
        }
        if !self.connection_length_max.is_finite() || self.connection_length_max < 0.0 {
            return Err("connection_length_max must be finite and >= 0");
        }
        if !self.learning_rate.is_finite() {
            return Err("learning_rate must be finite");
        }
        if !self.neutral_weight.is_finite() {
            return Err("neutral_weight must be finite");
        }
        for site in &self.sites {
            if !(site.inner_radius >= 0.0 && site.outer_radius >= 0.0) {
                return Err("site radii must be >= 0");
            }
            if !site.spacing.is_finite() || site.spacing < 0.0 {
                return Err("site spacing must be finite and >= 0");
            }
        }
        Ok(())
    }

    /// Load a JSON config file; missing fields take their defaults.
    #[cfg(feature = "serde")]
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub(crate) fn write_payload<W: Write>(&self, w: &mut W) -> Result<()> {
        storage::write_f64_le(w, self.sensor_min)?;
        storage::write_f64_le(w, self.sensor_max)?;
        storage::write_len(w, self.connections_min)?;
        storage::write_len(w, self.connections_max)?;
        storage::write_f64_le(w, self.connection_chance)?;
        storage::write_f64_le(w, self.connection_length_max)?;
        storage::write_f64_le(w, self.connection_dot_min)?;
        storage::write_f64_le(w, self.learning_rate)?;
        storage::write_f64_le(w, self.weight_changed_threshold)?;
        storage::write_f64_le(w, self.neuron_changed_threshold)?;
        storage::write_f64_le(w, self.neutral_weight)?;
        for tag in [
            self.activation.input,
            self.activation.output,
            self.activation.interior,
        ] {
            storage::write_u8(w, activation_code(tag))?;
        }
        storage::write_u8(w, u8::from(self.seed.is_some()))?;
        storage::write_u64_le(w, self.seed.unwrap_or(0))?;

        storage::write_len(w, self.sites.len())?;
        for site in &self.sites {
            write_vec3(w, site.origin)?;
            storage::write_f64_le(w, site.outer_radius)?;
            storage::write_f64_le(w, site.inner_radius)?;
            storage::write_f64_le(w, site.sensor_offset)?;
            storage::write_len(w, site.inputs)?;
            storage::write_len(w, site.outputs)?;
            storage::write_len(w, site.shells)?;
            storage::write_f64_le(w, site.spacing)?;
            storage::write_f64_le(w, site.jitter)?;
            storage::write_u8(
                w,
                match site.flow {
                    Flow::Inward => 0,
                    Flow::Outward => 1,
                },
            )?;
            storage::write_u8(
                w,
                match site.direction {
                    DirectionRule::OriginNormal => 0,
                    DirectionRule::NearestReferences => 1,
                },
            )?;
        }
        Ok(())
    }

    pub(crate) fn read_payload<R: Read>(r: &mut R) -> Result<Self> {
        let mut cfg = NetworkConfig {
            sensor_min: storage::read_f64_le(r)?,
            sensor_max: storage::read_f64_le(r)?,
            connections_min: storage::read_len(r)?,
            connections_max: storage::read_len(r)?,
            connection_chance: storage::read_f64_le(r)?,
            connection_length_max: storage::read_f64_le(r)?,
            connection_dot_min: storage::read_f64_le(r)?,
            learning_rate: storage::read_f64_le(r)?,
            weight_changed_threshold: storage::read_f64_le(r)?,
            neuron_changed_threshold: storage::read_f64_le(r)?,
            neutral_weight: storage::read_f64_le(r)?,
            activation: ActivationScheme {
                input: activation_from_code(storage::read_u8(r)?)?,
                output: activation_from_code(storage::read_u8(r)?)?,
                interior: activation_from_code(storage::read_u8(r)?)?,
            },
            sites: Vec::new(),
            seed: None,
        };
        let has_seed = storage::read_u8(r)? != 0;
        let seed = storage::read_u64_le(r)?;
        cfg.seed = has_seed.then_some(seed);

        let n = storage::read_len(r)?;
        for _ in 0..n {
            let origin = read_vec3(r)?;
            let outer_radius = storage::read_f64_le(r)?;
            let inner_radius = storage::read_f64_le(r)?;
            let sensor_offset = storage::read_f64_le(r)?;
            let inputs = storage::read_len(r)?;
            let outputs = storage::read_len(r)?;
            let shells = storage::read_len(r)?;
            let spacing = storage::read_f64_le(r)?;
            let jitter = storage::read_f64_le(r)?;
            let flow = match storage::read_u8(r)? {
                0 => Flow::Inward,
                1 => Flow::Outward,
                k => return Err(NetworkError::corrupt("CFG0", format!("unknown flow {k}"))),
            };
            let direction = match storage::read_u8(r)? {
                0 => DirectionRule::OriginNormal,
                1 => DirectionRule::NearestReferences,
                k => {
                    return Err(NetworkError::corrupt(
                        "CFG0",
                        format!("unknown direction rule {k}"),
                    ))
                }
            };
            cfg.sites.push(SiteConfig {
                origin,
                outer_radius,
                inner_radius,
                sensor_offset,
                inputs,
                outputs,
                shells,
                spacing,
                jitter,
                flow,
                direction,
            });
        }
        Ok(cfg)
    }
}

fn activation_code(tag: Activation) -> u8 {
    match tag {
        Activation::None => 0,
        Activation::Sigmoid => 1,
        Activation::Relu => 2,
        Activation::LeakyRelu => 3,
        Activation::Elu => 4,
    }
}

fn activation_from_code(code: u8) -> Result<Activation> {
    Activation::ALL
        .get(code as usize)
        .copied()
        .ok_or_else(|| NetworkError::corrupt("CFG0", format!("unknown activation {code}")))
}

/// Degraded-topology conditions found during generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    warnings: Vec<TopologyWarning>,
}

impl BuildReport {
    pub fn warnings(&self) -> &[TopologyWarning] {
        &self.warnings
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Neurons named by at least one warning, in ascending order.
    pub fn degraded_neurons(&self) -> Vec<NeuronId> {
        let mut ids: Vec<NeuronId> = self.warnings.iter().filter_map(|w| w.neuron()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn push(&mut self, warning: TopologyWarning) {
        self.warnings.push(warning);
    }
}

// Which part of a site placed a neuron.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    InputCluster,
    OutputCluster,
    Shell,
}

#[derive(Debug, Clone, Copy)]
struct Placed {
    site: usize,
    placement: Placement,
}

/// Generate a network, seeding its generator from `cfg.seed` (or 1).
pub fn build_network(cfg: &NetworkConfig) -> Network {
    build_network_with(cfg, Prng::new(cfg.seed.unwrap_or(1)))
}

/// Generate a network drawing every random choice from `rng`.
///
/// The network keeps the generator afterwards for sensor and weight
/// re-randomization.
pub fn build_network_with(cfg: &NetworkConfig, rng: Prng) -> Network {
    let mut net = Network::with_rng(cfg.clone(), rng);
    let mut report = BuildReport::default();

    let placed = place_sites(&mut net, cfg, &mut report);
    let directions = target_directions(&net, cfg, &placed, &mut report);

    if cfg.connection_chance > 0.0 {
        wire_neurons(&mut net, cfg, &directions, &mut report);
    } else {
        let w = TopologyWarning::NoConnectionChance(cfg.connection_chance);
        warn!("{w}");
        report.push(w);
    }

    let degraded = report.degraded_neurons().len();
    if degraded > 0 {
        warn!(
            degraded,
            neurons = net.neurons().len(),
            "topology degraded; see BuildReport"
        );
    }
    let diag = net.diagnostics();
    info!(
        sensors = diag.sensor_count,
        neurons = diag.neuron_count,
        connections = diag.connection_count,
        isolated = diag.isolated_neurons,
        "network built"
    );

    net.set_report(report);
    net
}

// Phase 1: clusters and shells for every site, in site order.
fn place_sites(net: &mut Network, cfg: &NetworkConfig, report: &mut BuildReport) -> Vec<Placed> {
    let mut placed = Vec::new();
    let initial = cfg.sensor_min.max(0.0).min(cfg.sensor_max);

    for (s, site) in cfg.sites.iter().enumerate() {
        let (input_radius, output_radius) = site.cluster_radii();

        // Input cluster: sensor -> neuron.
        for i in 0..site.inputs {
            let angle = TAU / site.inputs as f64 * i as f64;
            let sp = Vec3::on_circle(site.origin, site.sensor_radius(input_radius), angle);
            let np = Vec3::on_circle(site.origin, input_radius, angle);
            let sensor = net.add_sensor(SensorRole::Input, sp, initial);
            let neuron = net.add_neuron(np, 0.0);
            net.connect(sensor.into(), neuron.into());
            placed.push(Placed {
                site: s,
                placement: Placement::InputCluster,
            });
        }

        // Shells between the rings.
        let range = site.outer_radius - site.inner_radius;
        if site.shells > 0 && !(range > 0.0) {
            let w = TopologyWarning::EmptyAnnulus {
                site: s,
                inner: site.inner_radius,
                outer: site.outer_radius,
            };
            warn!("{w}");
            report.push(w);
        } else {
            let step = range / (site.shells + 1) as f64;
            for i in 0..site.shells {
                let radius = site.inner_radius + step * (i + 1) as f64;
                for mut p in ring(net.rng_mut(), site.origin, radius, site.spacing) {
                    if site.jitter > 0.0 {
                        let rng = net.rng_mut();
                        p.x += rng.next_signed() * site.jitter;
                        p.y += rng.next_signed() * site.jitter;
                    }
                    net.add_neuron(p, 0.0);
                    placed.push(Placed {
                        site: s,
                        placement: Placement::Shell,
                    });
                }
            }
        }

        // Output cluster: neuron -> sensor.
        for i in 0..site.outputs {
            let angle = TAU / site.outputs as f64 * i as f64;
            let sp = Vec3::on_circle(site.origin, site.sensor_radius(output_radius), angle);
            let np = Vec3::on_circle(site.origin, output_radius, angle);
            let sensor = net.add_sensor(SensorRole::Output, sp, initial);
            let neuron = net.add_neuron(np, 0.0);
            net.connect(neuron.into(), sensor.into());
            placed.push(Placed {
                site: s,
                placement: Placement::OutputCluster,
            });
        }
    }
    placed
}

/// Evenly spaced points on a circle, `floor(circumference / spacing)` of them,
/// starting at a random angle.
fn ring(rng: &mut Prng, origin: Vec3, radius: f64, spacing: f64) -> Vec<Vec3> {
    let steps = if spacing > 0.0 {
        (TAU * radius / spacing).floor()
    } else {
        0.0
    };
    if !(steps >= 1.0) {
        return Vec::new();
    }
    let steps = steps as usize;
    let offset = rng.next_f64_01() * TAU;
    let theta_step = TAU / steps as f64;
    (0..steps)
        .map(|i| Vec3::on_circle(origin, radius, offset + theta_step * i as f64))
        .collect()
}

// Phase 2: the direction each neuron wires towards. `None` marks a neuron that
// was rejected and will not be wired.
fn target_directions(
    net: &Network,
    cfg: &NetworkConfig,
    placed: &[Placed],
    report: &mut BuildReport,
) -> Vec<Option<Vec3>> {
    let positions_of = |kind: Placement| -> Vec<Vec3> {
        net.neurons()
            .iter()
            .zip(placed)
            .filter(|(_, p)| p.placement == kind)
            .map(|(n, _)| n.position())
            .collect()
    };
    let needs_references = placed.iter().any(|p| {
        p.placement == Placement::Shell
            && cfg.sites[p.site].direction == DirectionRule::NearestReferences
    });
    let (inputs, outputs) = if needs_references {
        (
            positions_of(Placement::InputCluster),
            positions_of(Placement::OutputCluster),
        )
    } else {
        (Vec::new(), Vec::new())
    };

    net.neurons()
        .iter()
        .zip(placed)
        .map(|(neuron, placed)| {
            let site = &cfg.sites[placed.site];
            let p = neuron.position();
            if placed.placement != Placement::Shell
                || site.direction == DirectionRule::OriginNormal
            {
                return Some(site.origin_normal(p));
            }

            let a = nearest(p, inputs.iter().copied()).map(|i| inputs[i]);
            let b = nearest(p, outputs.iter().copied()).map(|i| outputs[i]);
            match (a, b) {
                (Some(a), Some(b)) if (p - a).dot(b - p) > 0.0 => Some(a.direction_to(b)),
                _ => {
                    let w = TopologyWarning::NotBetweenReferences(neuron.id());
                    debug!("{w}");
                    report.push(w);
                    None
                }
            }
        })
        .collect()
}

// Phase 3: iterative probabilistic wiring, one neuron at a time in id order.
fn wire_neurons(
    net: &mut Network,
    cfg: &NetworkConfig,
    directions: &[Option<Vec3>],
    report: &mut BuildReport,
) {
    let max = cfg.connections_max;
    let at_max = |degree: usize| max > 0 && degree >= max;

    for (i, direction) in directions.iter().enumerate() {
        let Some(normal) = *direction else {
            continue;
        };
        let id = NeuronId(i);
        let p = net.neurons()[i].position();

        let mut candidates: Vec<NeuronId> = net
            .neurons()
            .iter()
            .filter(|n| {
                let q = n.position();
                n.id() != id
                    && p.distance_to(q) <= cfg.connection_length_max
                    && p.direction_to(q).dot(normal) >= cfg.connection_dot_min
                    && !net.is_connected(id, n.id().into())
            })
            .map(|n| n.id())
            .collect();

        if candidates.is_empty() {
            let w = TopologyWarning::NoCandidates(id);
            debug!("{w}");
            report.push(w);
            continue;
        }

        let mut degree = net.neurons()[i].out_degree();
        while degree < cfg.connections_min && !candidates.is_empty() && !at_max(degree) {
            for k in (0..candidates.len()).rev() {
                if !net.rng_mut().chance(cfg.connection_chance) {
                    continue;
                }
                let other = candidates.remove(k);
                if net.connect(NodeRef::Neuron(id), NodeRef::Neuron(other)).is_some() {
                    degree += 1;
                }
                if at_max(degree) {
                    break;
                }
            }
        }

        let reached = degree;
        if reached < cfg.connections_min {
            let w = TopologyWarning::BelowMinimumDegree {
                neuron: id,
                degree: reached,
                required: cfg.connections_min,
            };
            debug!("{w}");
            report.push(w);
        }
    }
}

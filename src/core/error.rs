//! Error and warning types.
//!
//! Numeric operations (activation, connection, neuron) are total and never fail.
//! `NetworkError` covers the fallible outer surfaces (network images, config
//! files). `TopologyWarning` records degraded-topology conditions found while
//! generating a network; generation always completes.

use std::io;

use crate::node::{NeuronId, NodeRef};

/// Result type alias using NetworkError
pub type Result<T> = std::result::Result<T, NetworkError>;

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("bad network image magic")]
    BadMagic,

    #[error("unsupported network image version {0}")]
    UnsupportedVersion(u32),

    #[error("network image is missing chunk {0}")]
    MissingChunk(&'static str),

    #[error("corrupt {chunk} chunk: {reason}")]
    Corrupt { chunk: &'static str, reason: String },

    #[error("connection {connection} references missing node {node}")]
    DanglingReference { connection: usize, node: NodeRef },

    #[error("lz4 decompression failed")]
    Decompress,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NetworkError {
    pub(crate) fn corrupt(chunk: &'static str, reason: impl Into<String>) -> Self {
        NetworkError::Corrupt {
            chunk,
            reason: reason.into(),
        }
    }
}

/// A recoverable degraded-topology condition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TopologyWarning {
    #[error("site {site}: annulus {inner}..{outer} leaves no room for shells")]
    EmptyAnnulus { site: usize, inner: f64, outer: f64 },

    #[error("connection probability {0} is not positive; neurons left unwired")]
    NoConnectionChance(f64),

    #[error("neuron {0} has no eligible neighbors")]
    NoCandidates(NeuronId),

    #[error("neuron {0} does not lie between its nearest input and output references")]
    NotBetweenReferences(NeuronId),

    #[error("neuron {neuron} reached out-degree {degree} of required {required}")]
    BelowMinimumDegree {
        neuron: NeuronId,
        degree: usize,
        required: usize,
    },
}

impl TopologyWarning {
    /// Neuron the warning refers to, if any.
    pub fn neuron(&self) -> Option<NeuronId> {
        match self {
            TopologyWarning::NoCandidates(n) | TopologyWarning::NotBetweenReferences(n) => Some(*n),
            TopologyWarning::BelowMinimumDegree { neuron, .. } => Some(*neuron),
            _ => None,
        }
    }
}

//! Error types for the prediction pipeline

use thiserror::Error;

use crate::types::{DriverId, TeamId, TrackId};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("track {0} is not in the track tables")]
    UnknownTrack(TrackId),

    #[error("driver {0} is not in the driver table")]
    UnknownDriver(DriverId),

    #[error("team {0} is not in the team table")]
    UnknownTeam(TeamId),

    #[error("label {label:?} was not seen when fitting the {field} encoder")]
    UnknownLabel { field: String, label: String },

    #[error("not enough data for {what}: {observed} observed, {required} required")]
    InsufficientData {
        what: String,
        observed: usize,
        required: usize,
    },

    #[error("feature length mismatch: got {got}, expected {expected}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("no fitted model for {0}")]
    ModelUnavailable(String),

    #[error("no strategy survived the {0} filter")]
    NoViableStrategy(String),

    #[error("model artifact could not be loaded: {0}")]
    ArtifactLoad(#[from] ArtifactLoadError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a persisted bundle is rejected. These never reach callers of
/// the predictors: the lifecycle manager turns every one into a retrain.
#[derive(Error, Debug)]
pub enum ArtifactLoadError {
    #[error("artifact {0} is missing")]
    Missing(String),

    #[error("artifact {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("artifact {path} is incompatible: {reason}")]
    Incompatible { path: String, reason: String },

    #[error("artifact {path} is internally inconsistent: {reason}")]
    Inconsistent { path: String, reason: String },
}

impl ArtifactLoadError {
    /// Short tag used in logs and in the retrain provenance.
    pub fn kind(&self) -> &'static str {
        match self {
            ArtifactLoadError::Missing(_) => "missing",
            ArtifactLoadError::Corrupt { .. } => "corrupt",
            ArtifactLoadError::Incompatible { .. } => "incompatible",
            ArtifactLoadError::Inconsistent { .. } => "inconsistent",
        }
    }
}

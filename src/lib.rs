//! Qualifying sector-time and race-strategy prediction for Formula 1.

pub mod baseline;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod ml;
pub mod model_store;
pub mod qualifying;
pub mod ranker;
pub mod strategy;
pub mod tables;
pub mod types;

pub use error::{ArtifactLoadError, Error, Result};
pub use features::Corpus;
pub use model_store::{ArtifactStore, LifecycleState, ModelLifecycle, Provenance};
pub use qualifying::{QualifyingPrediction, QualifyingPredictor};
pub use ranker::{rank_candidates, RaceCondition, StrategyLabel};
pub use strategy::{StrategyOutcome, StrategyPredictor, StrategyRequest};
pub use tables::StaticTables;
pub use types::*;

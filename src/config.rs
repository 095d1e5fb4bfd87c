use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::PathBuf};

use crate::ml::{ForestParams, MaxFeatures, ParamGrid};

/// Hyperparameters of the qualifying regressor.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct QualifyingConfig {
    pub base: ForestParams,
    pub telemetry: ForestParams,
    /// Channels with fewer observed rows get no auxiliary regressor.
    pub min_channel_rows: usize,
}

impl Default for QualifyingConfig {
    fn default() -> Self {
        Self {
            base: ForestParams {
                n_estimators: 200,
                max_depth: Some(12),
                min_samples_split: 2,
                max_features: MaxFeatures::Sqrt,
                bootstrap: true,
                seed: 42,
            },
            telemetry: ForestParams {
                n_estimators: 120,
                max_depth: Some(10),
                min_samples_split: 2,
                max_features: MaxFeatures::All,
                bootstrap: true,
                seed: 42,
            },
            min_channel_rows: 30,
        }
    }
}

/// Training setup of the dry and wet strategy classifiers.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    /// Labels seen fewer times than this are dropped before training.
    pub min_label_count: usize,
    pub test_fraction: f64,
    pub cv_folds: usize,
    pub grid: ParamGrid,
    /// Temperature range fed to the classifier at inference.
    pub default_temp_range: f64,
    pub seed: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_label_count: 5,
            test_fraction: 0.2,
            cv_folds: 3,
            grid: ParamGrid {
                n_estimators: vec![100, 300, 500],
                max_depth: vec![None],
                min_samples_split: vec![2, 5, 10],
                max_features: vec![MaxFeatures::All],
                bootstrap: vec![true, false],
            },
            default_temp_range: 8.0,
            seed: 42,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub qualifying: QualifyingConfig,
    pub strategy: StrategyConfig,
}

impl ModelConfig {
    pub fn load(path: &str) -> Result<Self> {
        let data = fs::read_to_string(path).with_context(|| format!("failed to read model config at {}", path))?;
        serde_json::from_str(&data).with_context(|| format!("invalid model config JSON in {}", path))
    }
}

/// Process settings, read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub model_dir: PathBuf,
    pub historical_path: PathBuf,
    pub current_path: PathBuf,
    pub strategy_path: PathBuf,
    pub tables_path: Option<PathBuf>,
    pub model_config_path: Option<String>,
    pub port: u16,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        fn required(key: &str) -> Result<PathBuf> {
            std::env::var(key)
                .map(PathBuf::from)
                .with_context(|| format!("{} not set", key))
        }
        Ok(Self {
            model_dir: std::env::var("MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("saved_models")),
            historical_path: required("HISTORICAL_PATH")?,
            current_path: required("CURRENT_PATH")?,
            strategy_path: required("STRATEGY_PATH")?,
            tables_path: std::env::var("TABLES_PATH").ok().map(PathBuf::from),
            model_config_path: std::env::var("MODEL_CONFIG_PATH").ok(),
            port: std::env::var("PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(8080),
        })
    }

    pub fn model_config(&self) -> Result<ModelConfig> {
        match &self.model_config_path {
            Some(p) => ModelConfig::load(p),
            None => Ok(ModelConfig::default()),
        }
    }
}

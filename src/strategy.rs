//! Race-strategy classification.
//!
//! Two independent classifiers, one per race condition, map the race
//! context to a probability over compound-sequence labels. Each is chosen
//! by cross-validated grid search on its own subset of the history.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::StrategyConfig;
use crate::error::{Error, Result};
use crate::ml::selection::{accuracy, rows};
use crate::ml::{grid_search, train_test_split, ClassWeight, ForestParams, LabelEncoder, ScaledClassifier};
use crate::model_store::{Artifact, ArtifactStore, ModelLifecycle, Provenance};
use crate::ranker::{rank_candidates, RaceCondition, StrategyLabel};
use crate::tables::StaticTables;
use crate::types::{OvertakingDifficulty, StrategyPrediction, StrategyRecord, TrackId, TrackType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyFeature {
    Track,
    StartPosition,
    AvgStintLength,
    TempRange,
    AirTemp,
    TrackTemp,
    IsWet,
    TrackSpeed,
    TrackTypeEncoded,
    OvertakingDifficultyEncoded,
    NumPitStops,
}

impl StrategyFeature {
    /// Column order of the training matrix.
    pub const ALL: [StrategyFeature; 11] = [
        StrategyFeature::Track,
        StrategyFeature::StartPosition,
        StrategyFeature::AvgStintLength,
        StrategyFeature::TempRange,
        StrategyFeature::AirTemp,
        StrategyFeature::TrackTemp,
        StrategyFeature::IsWet,
        StrategyFeature::TrackSpeed,
        StrategyFeature::TrackTypeEncoded,
        StrategyFeature::OvertakingDifficultyEncoded,
        StrategyFeature::NumPitStops,
    ];
}

/// Inputs of one strategy prediction, with track descriptors already
/// resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceContext {
    pub track: TrackId,
    pub start_position: u32,
    pub avg_stint_length: f64,
    pub temp_range: f64,
    pub air_temp: f64,
    pub track_temp: f64,
    pub is_wet: bool,
    pub track_speed: f64,
    pub track_type: TrackType,
    pub overtaking_difficulty: OvertakingDifficulty,
    pub num_pit_stops: u32,
}

impl From<&StrategyRecord> for RaceContext {
    fn from(r: &StrategyRecord) -> Self {
        Self {
            track: r.track,
            start_position: r.start_position,
            avg_stint_length: r.avg_stint_length,
            temp_range: r.temp_range,
            air_temp: r.air_temp,
            track_temp: r.track_temp,
            is_wet: r.is_wet,
            track_speed: r.track_speed,
            track_type: r.track_type,
            overtaking_difficulty: r.overtaking_difficulty,
            num_pit_stops: r.num_pit_stops,
        }
    }
}

/// Column layout shared by training and inference. Categorical columns
/// use the enums' fixed codes, so any descriptor can be encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    pub features: Vec<StrategyFeature>,
}

impl Default for FeatureEncoder {
    fn default() -> Self {
        Self {
            features: StrategyFeature::ALL.to_vec(),
        }
    }
}

impl FeatureEncoder {
    pub fn row(&self, ctx: &RaceContext) -> Vec<f64> {
        self.features
            .iter()
            .map(|f| match f {
                StrategyFeature::Track => ctx.track as f64,
                StrategyFeature::StartPosition => ctx.start_position as f64,
                StrategyFeature::AvgStintLength => ctx.avg_stint_length,
                StrategyFeature::TempRange => ctx.temp_range,
                StrategyFeature::AirTemp => ctx.air_temp,
                StrategyFeature::TrackTemp => ctx.track_temp,
                StrategyFeature::IsWet => f64::from(u8::from(ctx.is_wet)),
                StrategyFeature::TrackSpeed => ctx.track_speed,
                StrategyFeature::TrackTypeEncoded => f64::from(ctx.track_type.code()),
                StrategyFeature::OvertakingDifficultyEncoded => f64::from(ctx.overtaking_difficulty.code()),
                StrategyFeature::NumPitStops => ctx.num_pit_stops as f64,
            })
            .collect()
    }

    pub fn matrix(&self, contexts: &[RaceContext]) -> Result<Array2<f64>> {
        let mut flat = Vec::with_capacity(contexts.len() * self.features.len());
        for ctx in contexts {
            flat.extend(self.row(ctx));
        }
        Array2::from_shape_vec((contexts.len(), self.features.len()), flat).map_err(|e| Error::Config(e.to_string()))
    }

    fn is_consistent(&self) -> bool {
        self.features == StrategyFeature::ALL
    }
}

/// Classifier and encoders for one race condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionModel {
    pub encoder: FeatureEncoder,
    pub strategies: LabelEncoder<StrategyLabel>,
    pub classifier: ScaledClassifier,
    pub best_params: ForestParams,
    pub cv_accuracy: f64,
    pub holdout_accuracy: Option<f64>,
}

impl ConditionModel {
    /// Probability of every strategy the classifier was trained on.
    pub fn candidates(&self, ctx: &RaceContext) -> Result<Vec<(StrategyLabel, f64)>> {
        let x = self.encoder.matrix(std::slice::from_ref(ctx))?;
        let proba = self.classifier.predict_proba(x.view())?;
        self.classifier
            .classes()
            .iter()
            .zip(proba.row(0))
            .map(|(code, p)| Ok((self.strategies.inverse(*code)?.clone(), *p)))
            .collect()
    }

    fn is_consistent(&self) -> bool {
        self.encoder.is_consistent()
            && self.classifier.is_consistent()
            && self.classifier.scaler.n_features() == self.encoder.features.len()
            && self.classifier.classes().iter().all(|c| *c < self.strategies.len())
            && self.strategies.is_consistent()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyBundle {
    pub dry: Option<ConditionModel>,
    pub wet: Option<ConditionModel>,
}

impl StrategyBundle {
    pub fn model(&self, condition: RaceCondition) -> Option<&ConditionModel> {
        match condition {
            RaceCondition::Dry => self.dry.as_ref(),
            RaceCondition::Wet => self.wet.as_ref(),
        }
    }
}

impl Artifact for StrategyBundle {
    const KIND: &'static str = "strategy";
    const FORMAT_VERSION: u32 = 2;

    fn check(&self) -> std::result::Result<(), String> {
        if self.dry.is_none() && self.wet.is_none() {
            return Err("no condition model".into());
        }
        for (condition, model) in [(RaceCondition::Dry, &self.dry), (RaceCondition::Wet, &self.wet)] {
            if let Some(m) = model {
                if !m.is_consistent() {
                    return Err(format!("{condition} model is malformed"));
                }
            }
        }
        Ok(())
    }
}

/// Records whose label appears at least `min_count` times.
pub fn frequent_labels(records: &[StrategyRecord], min_count: usize) -> Vec<&StrategyRecord> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for r in records {
        *counts.entry(r.strategy.as_str()).or_default() += 1;
    }
    for (label, n) in &counts {
        if *n < min_count {
            tracing::warn!("dropping strategy {} ({} races, need {})", label, n, min_count);
        }
    }
    records
        .iter()
        .filter(|r| counts.get(r.strategy.as_str()).copied().unwrap_or(0) >= min_count)
        .collect()
}

fn train_condition(
    condition: RaceCondition,
    records: &[&StrategyRecord],
    config: &StrategyConfig,
) -> Result<Option<ConditionModel>> {
    let subset: Vec<&StrategyRecord> = records
        .iter()
        .copied()
        .filter(|r| RaceCondition::from_is_wet(r.is_wet) == condition)
        .filter(|r| condition.admits(&StrategyLabel::new(r.strategy.clone())))
        .collect();
    let required = 2 * config.cv_folds;
    if subset.len() < required {
        let skipped = Error::InsufficientData {
            what: format!("{condition} strategy rows"),
            observed: subset.len(),
            required,
        };
        tracing::warn!("skipping {} classifier: {}", condition, skipped);
        return Ok(None);
    }

    let labels: Vec<StrategyLabel> = subset.iter().map(|r| StrategyLabel::new(r.strategy.clone())).collect();
    let strategies = LabelEncoder::fit("strategy", &labels);
    let encoder = FeatureEncoder::default();
    let contexts: Vec<RaceContext> = subset.iter().map(|r| RaceContext::from(*r)).collect();
    let x = encoder.matrix(&contexts)?;
    let y: Vec<usize> = labels.iter().map(|l| strategies.transform(l)).collect::<Result<_>>()?;

    let split = train_test_split(subset.len(), config.test_fraction, config.seed);
    let y_train: Vec<usize> = split.train.iter().map(|&i| y[i]).collect();
    let search = match grid_search(
        rows(x.view(), &split.train).view(),
        &y_train,
        &config.grid,
        config.cv_folds,
        ClassWeight::Balanced,
        config.seed,
    ) {
        Ok(s) => s,
        Err(e @ Error::InsufficientData { .. }) => {
            tracing::warn!("skipping {} classifier: {}", condition, e);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let holdout_accuracy = if split.validation.is_empty() {
        None
    } else {
        let y_val: Vec<usize> = split.validation.iter().map(|&i| y[i]).collect();
        let pred = search.model.predict(rows(x.view(), &split.validation).view())?;
        Some(accuracy(&y_val, &pred))
    };
    tracing::info!(
        "{} classifier: {} rows, {} strategies, cv accuracy {:.3}, held-out accuracy {}, best {:?}",
        condition,
        subset.len(),
        strategies.len(),
        search.best_score,
        holdout_accuracy.map_or_else(|| "n/a".to_string(), |a| format!("{a:.3}")),
        search.best_params
    );

    Ok(Some(ConditionModel {
        encoder,
        strategies,
        classifier: search.model,
        best_params: search.best_params,
        cv_accuracy: search.best_score,
        holdout_accuracy,
    }))
}

/// Trains the dry and wet classifiers. A condition without enough rows is
/// left empty; having neither is an error.
pub fn train(records: &[StrategyRecord], config: &StrategyConfig) -> Result<StrategyBundle> {
    let kept = frequent_labels(records, config.min_label_count);
    tracing::info!("{} of {} strategy rows have a frequent label", kept.len(), records.len());

    let bundle = StrategyBundle {
        dry: train_condition(RaceCondition::Dry, &kept, config)?,
        wet: train_condition(RaceCondition::Wet, &kept, config)?,
    };
    if bundle.dry.is_none() && bundle.wet.is_none() {
        return Err(Error::InsufficientData {
            what: "strategy rows in any condition".into(),
            observed: kept.len(),
            required: 2 * config.cv_folds,
        });
    }
    Ok(bundle)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyRequest {
    pub track: TrackId,
    pub start_position: u32,
    pub is_wet: bool,
    pub air_temp: f64,
    pub track_temp: f64,
}

#[derive(Debug)]
pub struct StrategyOutcome {
    pub prediction: StrategyPrediction,
    pub provenance: Provenance,
}

pub struct StrategyPredictor {
    records: Arc<Vec<StrategyRecord>>,
    tables: Arc<StaticTables>,
    config: StrategyConfig,
    lifecycle: ModelLifecycle<StrategyBundle>,
}

impl StrategyPredictor {
    pub fn new(
        records: Arc<Vec<StrategyRecord>>,
        tables: Arc<StaticTables>,
        config: StrategyConfig,
        store: ArtifactStore,
    ) -> Self {
        Self {
            records,
            tables,
            config,
            lifecycle: ModelLifecycle::new(store),
        }
    }

    pub fn lifecycle(&self) -> &ModelLifecycle<StrategyBundle> {
        &self.lifecycle
    }

    pub fn warm(&self) -> Result<Provenance> {
        Ok(self.lifecycle.resolve(|| train(&self.records, &self.config))?.provenance)
    }

    /// Fills in track descriptors and pit-stop count; unmapped tracks get
    /// the defaults.
    pub fn context(&self, req: &StrategyRequest) -> RaceContext {
        if self.tables.track(req.track).is_err() {
            tracing::info!("track {} has no descriptors; using defaults", req.track);
        }
        let d = self.tables.descriptors_or_default(req.track);
        RaceContext {
            track: req.track,
            start_position: req.start_position,
            avg_stint_length: d.avg_stint_length,
            temp_range: self.config.default_temp_range,
            air_temp: req.air_temp,
            track_temp: req.track_temp,
            is_wet: req.is_wet,
            track_speed: d.track_speed,
            track_type: d.track_type,
            overtaking_difficulty: d.overtaking_difficulty,
            num_pit_stops: self.tables.max_pit_stops_or_default(req.track),
        }
    }

    pub fn predict(&self, req: &StrategyRequest) -> Result<StrategyOutcome> {
        let resolved = self.lifecycle.resolve(|| train(&self.records, &self.config))?;
        let condition = RaceCondition::from_is_wet(req.is_wet);
        let model = resolved
            .bundle
            .model(condition)
            .ok_or_else(|| Error::ModelUnavailable(format!("no {condition} strategy classifier")))?;

        let candidates = model.candidates(&self.context(req))?;
        let shortlist = rank_candidates(candidates, condition)
            .ok_or_else(|| Error::NoViableStrategy(format!("no {condition} strategy has a probability")))?;

        let num_stops = StrategyLabel::new(shortlist.best.strategy.clone()).pit_stops();
        Ok(StrategyOutcome {
            prediction: StrategyPrediction {
                best_strategy: shortlist.best.strategy,
                best_strategy_confidence: shortlist.best.probability,
                num_stops,
                alternative_strategies: shortlist.alternatives,
                prediction_timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            },
            provenance: resolved.provenance,
        })
    }
}

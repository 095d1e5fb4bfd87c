//! Qualifying sector-time prediction.
//!
//! A multi-output forest predicts the three baseline-relative sector deltas
//! from the driver/team/track identifiers and the team-year sector
//! averages. Auxiliary single-output forests predict the telemetry
//! channels from the same scaled features.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::baseline::to_absolute;
use crate::config::QualifyingConfig;
use crate::error::{Error, Result};
use crate::features::{Corpus, FeatureRow, TeamAverages, QUALIFYING_FEATURES};
use crate::ml::selection::rows;
use crate::ml::{walk_forward_splits, RandomForestRegressor, StandardScaler};
use crate::model_store::{Artifact, ArtifactStore, ModelLifecycle, Provenance};
use crate::tables::StaticTables;
use crate::types::{QualifyingRow, TelemetryChannel, TrackId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualifyingBundle {
    pub feature_names: Vec<String>,
    pub scaler: StandardScaler,
    pub base: RandomForestRegressor,
    pub telemetry: BTreeMap<TelemetryChannel, RandomForestRegressor>,
    /// Frozen with the models so inference sees the training-time features.
    pub team_averages: TeamAverages,
}

impl Artifact for QualifyingBundle {
    const KIND: &'static str = "qualifying";
    const FORMAT_VERSION: u32 = 1;

    fn check(&self) -> std::result::Result<(), String> {
        let n = QUALIFYING_FEATURES.len();
        if self.feature_names != QUALIFYING_FEATURES {
            return Err(format!("feature columns {:?}", self.feature_names));
        }
        if !self.scaler.is_consistent() || self.scaler.n_features() != n {
            return Err("scaler does not match the feature columns".into());
        }
        if self.base.n_outputs() != 3 || !self.base.is_consistent(n) {
            return Err("sector regressor is malformed".into());
        }
        for (channel, model) in &self.telemetry {
            if model.n_outputs() != 1 || !model.is_consistent(n) {
                return Err(format!("{channel} regressor is malformed"));
            }
        }
        if !self.team_averages.is_consistent() {
            return Err("team averages carry non-finite fallbacks".into());
        }
        Ok(())
    }
}

/// Validation error of one walk-forward split.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitScore {
    pub train_rows: usize,
    pub validation_rows: usize,
    pub rmse: [f64; 3],
}

fn rmse(pred: &Array2<f64>, truth: &Array2<f64>) -> [f64; 3] {
    let n = pred.nrows().max(1) as f64;
    let mut out = [0.0; 3];
    for (j, slot) in out.iter_mut().enumerate() {
        let sse: f64 = pred
            .column(j)
            .iter()
            .zip(truth.column(j))
            .map(|(p, t)| (p - t) * (p - t))
            .sum();
        *slot = (sse / n).sqrt();
    }
    out
}

/// Fits scaler and sector regressor on every expanding window in turn and
/// keeps only the last fit. Split scores are reported, never used to choose.
pub fn fit_walk_forward(
    corpus: &Corpus,
    config: &QualifyingConfig,
) -> Result<(StandardScaler, RandomForestRegressor, Vec<SplitScore>)> {
    let x = corpus.feature_matrix();
    let y = corpus.target_matrix();
    let splits = walk_forward_splits(&corpus.session_keys());

    let mut scores = Vec::with_capacity(splits.len());
    let mut last = None;
    for (i, split) in splits.iter().enumerate() {
        let x_tr = rows(x.view(), &split.train);
        let y_tr = rows(y.view(), &split.train);
        let scaler = StandardScaler::fit(x_tr.view())?;
        let base = RandomForestRegressor::fit(config.base, scaler.transform(x_tr.view())?.view(), y_tr.view())?;

        let x_vl = scaler.transform(rows(x.view(), &split.validation).view())?;
        let score = SplitScore {
            train_rows: split.train.len(),
            validation_rows: split.validation.len(),
            rmse: rmse(&base.predict(x_vl.view())?, &rows(y.view(), &split.validation)),
        };
        tracing::debug!(
            "split {}: train={} val={} rmse=[{:.3}, {:.3}, {:.3}]",
            i,
            score.train_rows,
            score.validation_rows,
            score.rmse[0],
            score.rmse[1],
            score.rmse[2]
        );
        scores.push(score);
        last = Some((scaler, base));
    }

    let (scaler, base) = match last {
        Some(fit) => fit,
        None => {
            tracing::info!("fewer than two sessions; fitting sector model on the whole corpus");
            let scaler = StandardScaler::fit(x.view())?;
            let base = RandomForestRegressor::fit(config.base, scaler.transform(x.view())?.view(), y.view())?;
            (scaler, base)
        }
    };
    Ok((scaler, base, scores))
}

pub fn train(corpus: &Corpus, config: &QualifyingConfig) -> Result<QualifyingBundle> {
    let (scaler, base, scores) = fit_walk_forward(corpus, config)?;
    tracing::info!("sector model fitted after {} walk-forward splits", scores.len());

    let xs = scaler.transform(corpus.feature_matrix().view())?;
    let mut telemetry = BTreeMap::new();
    for channel in TelemetryChannel::ALL {
        let observed: Vec<(usize, f64)> = corpus
            .records()
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.record.telemetry.get(&channel).map(|v| (i, *v)))
            .collect();
        if observed.len() < config.min_channel_rows {
            let skipped = Error::InsufficientData {
                what: channel.to_string(),
                observed: observed.len(),
                required: config.min_channel_rows,
            };
            tracing::warn!("skipping telemetry regressor: {}", skipped);
            continue;
        }
        let idx: Vec<usize> = observed.iter().map(|(i, _)| *i).collect();
        let y = Array2::from_shape_fn((observed.len(), 1), |(i, _)| observed[i].1);
        let model = RandomForestRegressor::fit(config.telemetry, xs.select(Axis(0), &idx).view(), y.view())?;
        telemetry.insert(channel, model);
    }
    tracing::info!("fitted {} of {} telemetry regressors", telemetry.len(), TelemetryChannel::ALL.len());

    Ok(QualifyingBundle {
        feature_names: QUALIFYING_FEATURES.iter().map(|s| s.to_string()).collect(),
        scaler,
        base,
        telemetry,
        team_averages: corpus.team_averages().clone(),
    })
}

#[derive(Debug)]
pub struct QualifyingPrediction {
    /// Ascending by `position`.
    pub rows: Vec<QualifyingRow>,
    pub provenance: Provenance,
}

pub struct QualifyingPredictor {
    corpus: Arc<Corpus>,
    tables: Arc<StaticTables>,
    config: QualifyingConfig,
    lifecycle: ModelLifecycle<QualifyingBundle>,
}

impl QualifyingPredictor {
    pub fn new(corpus: Arc<Corpus>, tables: Arc<StaticTables>, config: QualifyingConfig, store: ArtifactStore) -> Self {
        Self {
            corpus,
            tables,
            config,
            lifecycle: ModelLifecycle::new(store),
        }
    }

    pub fn lifecycle(&self) -> &ModelLifecycle<QualifyingBundle> {
        &self.lifecycle
    }

    /// Loads or trains the bundle without predicting.
    pub fn warm(&self) -> Result<Provenance> {
        Ok(self.lifecycle.resolve(|| train(&self.corpus, &self.config))?.provenance)
    }

    /// One feature row per active driver, in [`Corpus::active_drivers`] order.
    pub fn inference_rows(&self, bundle: &QualifyingBundle, track: TrackId) -> Vec<FeatureRow> {
        let year = self.corpus.current_year();
        self.corpus
            .active_drivers()
            .iter()
            .map(|latest| {
                let r = &latest.record;
                let [a1, a2, a3] = bundle.team_averages.features_for(r.year, r.team);
                [year as f64, r.driver as f64, r.team as f64, track as f64, a1, a2, a3]
            })
            .collect()
    }

    /// Ranked predicted qualifying order at `track`. An unknown track fails
    /// before any model is loaded or trained.
    pub fn predict(&self, track: TrackId) -> Result<QualifyingPrediction> {
        let baseline = self.tables.baseline(track)?;
        let resolved = self.lifecycle.resolve(|| train(&self.corpus, &self.config))?;
        let bundle = &resolved.bundle;

        let drivers = self.corpus.active_drivers();
        let feature_rows = self.inference_rows(bundle, track);
        let x = Array2::from_shape_fn((feature_rows.len(), QUALIFYING_FEATURES.len()), |(i, j)| feature_rows[i][j]);
        let xs = bundle.scaler.transform(x.view())?;
        let deltas = bundle.base.predict(xs.view())?;

        let mut channel_preds: BTreeMap<TelemetryChannel, Vec<f64>> = BTreeMap::new();
        for (channel, model) in &bundle.telemetry {
            channel_preds.insert(*channel, model.predict(xs.view())?.column(0).to_vec());
        }

        let mut out = Vec::with_capacity(drivers.len());
        for (i, latest) in drivers.iter().enumerate() {
            let r = &latest.record;
            let secs = to_absolute(baseline, [deltas[[i, 0]], deltas[[i, 1]], deltas[[i, 2]]]);

            let mut telemetry = BTreeMap::new();
            for channel in TelemetryChannel::ALL {
                let value = match channel_preds.get(&channel) {
                    Some(preds) => Some(preds[i]),
                    None => self.corpus.latest_telemetry(r.driver, channel),
                };
                if value.is_none() {
                    tracing::debug!("no {} value for driver {}", channel, r.driver);
                }
                telemetry.insert(channel, value);
            }

            out.push(QualifyingRow {
                position: 0,
                driver_name: self.tables.driver_name(r.driver)?.to_string(),
                team_name: self.tables.team_name(r.team)?.to_string(),
                sector1_time: secs.0[0],
                sector2_time: secs.0[1],
                sector3_time: secs.0[2],
                telemetry,
                lap_time: secs.lap_time(),
            });
        }

        rank_by_lap_time(&mut out);
        Ok(QualifyingPrediction {
            rows: out,
            provenance: resolved.provenance,
        })
    }
}

/// Stable sort by lap time and 1-based positions; equal lap times keep
/// their input order.
pub fn rank_by_lap_time(rows: &mut [QualifyingRow]) {
    rows.sort_by(|a, b| a.lap_time.total_cmp(&b.lap_time));
    for (i, row) in rows.iter_mut().enumerate() {
        row.position = i + 1;
    }
}

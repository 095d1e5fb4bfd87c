//! Train/validation splitting and cross-validated hyperparameter search.

use ndarray::{Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::forest::{ClassWeight, ForestParams};
use super::pipeline::ScaledClassifier;
use super::tree::MaxFeatures;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Expanding-window splits over chronologically sorted session keys:
/// split `i` trains on sessions `0..=i` and validates on session `i + 1`.
pub fn walk_forward_splits<K: Ord + Copy>(keys: &[K]) -> Vec<Split> {
    let mut sessions: Vec<K> = keys.to_vec();
    sessions.sort();
    sessions.dedup();

    (0..sessions.len().saturating_sub(1))
        .map(|i| {
            let cutoff = sessions[i];
            let next = sessions[i + 1];
            Split {
                train: (0..keys.len()).filter(|&r| keys[r] <= cutoff).collect(),
                validation: (0..keys.len()).filter(|&r| keys[r] == next).collect(),
            }
        })
        .collect()
}

/// Shuffled held-out split; the test side gets `ceil(n * test_fraction)` rows.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Split {
    let mut idx: Vec<usize> = (0..n).collect();
    idx.shuffle(&mut StdRng::seed_from_u64(seed));
    let n_test = ((n as f64) * test_fraction).ceil() as usize;
    let n_test = n_test.min(n.saturating_sub(1));
    let validation = idx.split_off(n - n_test);
    Split {
        train: idx,
        validation,
    }
}

/// Each class's rows are dealt round-robin across `k` folds so every fold
/// sees roughly the same class mix.
pub fn stratified_folds(y: &[usize], k: usize) -> Vec<Split> {
    let mut fold_of = vec![0usize; y.len()];
    let mut classes: Vec<usize> = y.to_vec();
    classes.sort_unstable();
    classes.dedup();

    let mut next = 0;
    for class in classes {
        for (row, _) in y.iter().enumerate().filter(|(_, c)| **c == class) {
            fold_of[row] = next % k;
            next += 1;
        }
    }

    (0..k)
        .map(|f| Split {
            train: (0..y.len()).filter(|&r| fold_of[r] != f).collect(),
            validation: (0..y.len()).filter(|&r| fold_of[r] == f).collect(),
        })
        .collect()
}

pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let hits = y_true.iter().zip(y_pred).filter(|(a, b)| a == b).count();
    hits as f64 / y_true.len() as f64
}

pub fn rows(x: ArrayView2<f64>, idx: &[usize]) -> Array2<f64> {
    x.select(Axis(0), idx)
}

fn pick<T: Copy>(v: &[T], idx: &[usize]) -> Vec<T> {
    idx.iter().map(|&i| v[i]).collect()
}

/// Candidate values per forest hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<Option<usize>>,
    pub min_samples_split: Vec<usize>,
    pub max_features: Vec<MaxFeatures>,
    pub bootstrap: Vec<bool>,
}

impl ParamGrid {
    /// Cartesian product, varying `bootstrap` fastest.
    pub fn candidates(&self, seed: u64) -> Vec<ForestParams> {
        let mut out = Vec::new();
        for &n_estimators in &self.n_estimators {
            for &max_depth in &self.max_depth {
                for &min_samples_split in &self.min_samples_split {
                    for &max_features in &self.max_features {
                        for &bootstrap in &self.bootstrap {
                            out.push(ForestParams {
                                n_estimators,
                                max_depth,
                                min_samples_split,
                                max_features,
                                bootstrap,
                                seed,
                            });
                        }
                    }
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct GridSearchResult {
    pub best_params: ForestParams,
    pub best_score: f64,
    /// Refit on every row passed to the search.
    pub model: ScaledClassifier,
}

/// Scores every grid candidate by mean stratified k-fold accuracy (scaler
/// refit inside each fold), then refits the best on all rows. Ties keep
/// the earlier candidate.
pub fn grid_search(
    x: ArrayView2<f64>,
    y: &[usize],
    grid: &ParamGrid,
    folds: usize,
    class_weight: ClassWeight,
    seed: u64,
) -> Result<GridSearchResult> {
    if folds < 2 || y.len() < folds {
        return Err(Error::InsufficientData {
            what: "cross-validation".into(),
            observed: y.len(),
            required: folds.max(2),
        });
    }
    let candidates = grid.candidates(seed);
    if candidates.is_empty() {
        return Err(Error::Config("empty hyperparameter grid".into()));
    }
    let splits = stratified_folds(y, folds);

    let scores: Vec<f64> = candidates
        .par_iter()
        .map(|params| -> Result<f64> {
            let mut total = 0.0;
            for split in &splits {
                let x_tr = rows(x, &split.train);
                let x_vl = rows(x, &split.validation);
                let model = ScaledClassifier::fit(*params, x_tr.view(), &pick(y, &split.train), class_weight)?;
                total += accuracy(&pick(y, &split.validation), &model.predict(x_vl.view())?);
            }
            let score = total / splits.len() as f64;
            debug!(?params, score, "grid candidate scored");
            Ok(score)
        })
        .collect::<Result<_>>()?;

    let mut best = 0;
    for (i, s) in scores.iter().enumerate() {
        if *s > scores[best] {
            best = i;
        }
    }
    let best_params = candidates[best];
    let model = ScaledClassifier::fit(best_params, x, y, class_weight)?;
    Ok(GridSearchResult {
        best_params,
        best_score: scores[best],
        model,
    })
}

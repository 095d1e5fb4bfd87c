//! Bagged random forests over [`Tree`].

use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::tree::{Gini, MaxFeatures, Objective, SquaredError, Tree, TreeParams};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub seed: u64,
}

impl ForestParams {
    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            max_features: self.max_features,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeight {
    Uniform,
    /// `n_samples / (n_classes * count(class))`
    Balanced,
}

/// Tree `i` is seeded with `seed + i`, so a fit is reproducible regardless
/// of how rayon schedules the trees.
fn grow_trees<O: Objective>(x: ArrayView2<f64>, objective: &O, params: &ForestParams) -> Vec<Tree> {
    let n = x.nrows();
    let tree_params = params.tree_params();
    (0..params.n_estimators)
        .into_par_iter()
        .map(|i| {
            let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(i as u64));
            let samples = if params.bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            Tree::grow(x, samples, objective, &tree_params, &mut rng)
        })
        .collect()
}

fn check_fit_input(what: &str, x: ArrayView2<f64>, n_targets: usize, params: &ForestParams) -> Result<()> {
    if x.nrows() == 0 {
        return Err(Error::InsufficientData {
            what: what.to_string(),
            observed: 0,
            required: 1,
        });
    }
    if n_targets != x.nrows() {
        return Err(Error::ShapeMismatch {
            expected: x.nrows(),
            got: n_targets,
        });
    }
    if params.n_estimators == 0 {
        return Err(Error::Config(format!("{what}: n_estimators must be positive")));
    }
    Ok(())
}

/// Multi-output regressor; the prediction is the mean of the tree leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    params: ForestParams,
    n_features: usize,
    n_outputs: usize,
    trees: Vec<Tree>,
}

impl RandomForestRegressor {
    pub fn fit(params: ForestParams, x: ArrayView2<f64>, y: ArrayView2<f64>) -> Result<Self> {
        check_fit_input("forest regressor", x, y.nrows(), &params)?;
        let trees = grow_trees(x, &SquaredError { y }, &params);
        Ok(Self {
            params,
            n_features: x.ncols(),
            n_outputs: y.ncols(),
            trees,
        })
    }

    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features {
            return Err(Error::ShapeMismatch {
                expected: self.n_features,
                got: x.ncols(),
            });
        }
        let mut out = Array2::zeros((x.nrows(), self.n_outputs));
        for (i, row) in x.rows().into_iter().enumerate() {
            for tree in &self.trees {
                for (j, v) in tree.predict(row).iter().enumerate() {
                    out[[i, j]] += v;
                }
            }
        }
        out.mapv_inplace(|v| v / self.trees.len() as f64);
        Ok(out)
    }

    pub(crate) fn is_consistent(&self, n_features: usize) -> bool {
        self.n_features == n_features
            && !self.trees.is_empty()
            && self.trees.iter().all(|t| t.is_consistent(self.n_features, self.n_outputs))
    }
}

/// Classifier over dense class codes. Columns of [`predict_proba`] follow
/// [`classes`], the sorted distinct codes seen at fit time.
///
/// [`predict_proba`]: RandomForestClassifier::predict_proba
/// [`classes`]: RandomForestClassifier::classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    params: ForestParams,
    n_features: usize,
    classes: Vec<usize>,
    trees: Vec<Tree>,
}

impl RandomForestClassifier {
    pub fn fit(params: ForestParams, x: ArrayView2<f64>, y: &[usize], class_weight: ClassWeight) -> Result<Self> {
        check_fit_input("forest classifier", x, y.len(), &params)?;

        let mut classes = y.to_vec();
        classes.sort_unstable();
        classes.dedup();
        let dense: Vec<usize> = y
            .iter()
            .map(|c| classes.binary_search(c).unwrap_or_default())
            .collect();

        let weights: Vec<f64> = match class_weight {
            ClassWeight::Uniform => vec![1.0; y.len()],
            ClassWeight::Balanced => {
                let mut counts = vec![0usize; classes.len()];
                for &c in &dense {
                    counts[c] += 1;
                }
                let n = y.len() as f64;
                let k = classes.len() as f64;
                dense.iter().map(|&c| n / (k * counts[c] as f64)).collect()
            }
        };

        let objective = Gini {
            y: &dense,
            weights: &weights,
            n_classes: classes.len(),
        };
        let trees = grow_trees(x, &objective, &params);
        Ok(Self {
            params,
            n_features: x.ncols(),
            classes,
            trees,
        })
    }

    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features {
            return Err(Error::ShapeMismatch {
                expected: self.n_features,
                got: x.ncols(),
            });
        }
        let mut out = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            for tree in &self.trees {
                for (j, p) in tree.predict(row).iter().enumerate() {
                    out[[i, j]] += p;
                }
            }
        }
        out.mapv_inplace(|p| p / self.trees.len() as f64);
        Ok(out)
    }

    /// Most probable class code per row; ties go to the lower code.
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| {
                let mut best = 0;
                for (j, p) in row.iter().enumerate() {
                    if *p > row[best] {
                        best = j;
                    }
                }
                self.classes[best]
            })
            .collect())
    }

    pub(crate) fn is_consistent(&self, n_features: usize) -> bool {
        self.n_features == n_features
            && !self.classes.is_empty()
            && !self.trees.is_empty()
            && self.trees.iter().all(|t| t.is_consistent(self.n_features, self.classes.len()))
    }
}

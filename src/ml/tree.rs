//! CART decision trees shared by the forest regressor and classifier.
//!
//! A tree is grown against an [`Objective`], which owns the targets and
//! knows how to accumulate per-node sufficient statistics, score a node's
//! impurity and turn the statistics of a terminal node into a leaf value.
//! Leaves hold a vector: per-output means for regression, class
//! probabilities for classification.

use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

const MIN_IMPURITY_DECREASE: f64 = 1e-12;

/// How many features each split considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    All,
    Sqrt,
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => ((n_features as f64).sqrt() as usize).max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub max_features: MaxFeatures,
}

pub(crate) trait Objective: Sync {
    /// Length of the statistics vector for one node.
    fn stats_len(&self) -> usize;
    /// Adds (`sign = 1.0`) or removes (`sign = -1.0`) one sample.
    fn accumulate(&self, sample: usize, stats: &mut [f64], sign: f64);
    /// Total (not per-sample) impurity of a node.
    fn impurity(&self, stats: &[f64]) -> f64;
    fn leaf(&self, stats: &[f64]) -> Vec<f64>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub(crate) fn grow<O: Objective>(
        x: ArrayView2<f64>,
        samples: Vec<usize>,
        objective: &O,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Tree {
        let mut builder = Builder {
            x,
            objective,
            params,
            rng,
            nodes: Vec::new(),
        };
        builder.build(samples, 0);
        Tree {
            nodes: builder.nodes,
        }
    }

    pub fn predict(&self, row: ArrayView1<f64>) -> &[f64] {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => at = if row[*feature] <= *threshold { *left } else { *right },
            }
        }
    }

    /// Checks child links, split features and leaf widths; used when a
    /// tree comes back from disk.
    pub(crate) fn is_consistent(&self, n_features: usize, leaf_len: usize) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(i, node)| match node {
                Node::Leaf { value } => value.len() == leaf_len,
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    *feature < n_features
                        && *left > i
                        && *right > i
                        && *left < self.nodes.len()
                        && *right < self.nodes.len()
                }
            })
    }
}

struct Builder<'a, 'r, O> {
    x: ArrayView2<'a, f64>,
    objective: &'r O,
    params: &'r TreeParams,
    rng: &'r mut StdRng,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl<O: Objective> Builder<'_, '_, O> {
    fn stats_of(&self, samples: &[usize]) -> Vec<f64> {
        let mut stats = vec![0.0; self.objective.stats_len()];
        for &s in samples {
            self.objective.accumulate(s, &mut stats, 1.0);
        }
        stats
    }

    fn build(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let stats = self.stats_of(&samples);
        let parent = self.objective.impurity(&stats);
        let at = self.nodes.len();

        let depth_reached = self.params.max_depth.is_some_and(|d| depth >= d);
        if depth_reached
            || samples.len() < self.params.min_samples_split.max(2)
            || parent <= MIN_IMPURITY_DECREASE
        {
            self.nodes.push(Node::Leaf {
                value: self.objective.leaf(&stats),
            });
            return at;
        }

        let best = match self.best_split(&samples, &stats) {
            Some(b) if b.impurity < parent - MIN_IMPURITY_DECREASE => b,
            _ => {
                self.nodes.push(Node::Leaf {
                    value: self.objective.leaf(&stats),
                });
                return at;
            }
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&s| self.x[[s, best.feature]] <= best.threshold);

        // placeholder, patched once both children exist
        self.nodes.push(Node::Leaf { value: Vec::new() });
        let l = self.build(left, depth + 1);
        let r = self.build(right, depth + 1);
        self.nodes[at] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: l,
            right: r,
        };
        at
    }

    fn best_split(&mut self, samples: &[usize], stats: &[f64]) -> Option<BestSplit> {
        let n_features = self.x.ncols();
        let k = self.params.max_features.resolve(n_features).min(n_features);
        let features = index::sample(&mut *self.rng, n_features, k);

        let mut order = samples.to_vec();
        let mut best: Option<BestSplit> = None;
        for feature in features.iter() {
            let col = self.x.column(feature);
            order.sort_by(|a, b| col[*a].total_cmp(&col[*b]));

            let mut left = vec![0.0; stats.len()];
            let mut right = stats.to_vec();
            for i in 0..order.len() - 1 {
                let s = order[i];
                self.objective.accumulate(s, &mut left, 1.0);
                self.objective.accumulate(s, &mut right, -1.0);

                let (v, next) = (col[s], col[order[i + 1]]);
                if next <= v {
                    continue;
                }
                let impurity = self.objective.impurity(&left) + self.objective.impurity(&right);
                if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    let mut threshold = v + (next - v) / 2.0;
                    if threshold >= next {
                        threshold = v;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        impurity,
                    });
                }
            }
        }
        best
    }
}

/// Multi-output squared error. Stats: `[n, sum_0..k, sum_sq_0..k]`.
pub(crate) struct SquaredError<'a> {
    pub y: ArrayView2<'a, f64>,
}

impl Objective for SquaredError<'_> {
    fn stats_len(&self) -> usize {
        1 + 2 * self.y.ncols()
    }

    fn accumulate(&self, sample: usize, stats: &mut [f64], sign: f64) {
        let k = self.y.ncols();
        stats[0] += sign;
        for j in 0..k {
            let v = self.y[[sample, j]];
            stats[1 + j] += sign * v;
            stats[1 + k + j] += sign * v * v;
        }
    }

    fn impurity(&self, stats: &[f64]) -> f64 {
        let n = stats[0];
        if n <= 0.0 {
            return 0.0;
        }
        let k = self.y.ncols();
        (0..k)
            .map(|j| (stats[1 + k + j] - stats[1 + j] * stats[1 + j] / n).max(0.0))
            .sum()
    }

    fn leaf(&self, stats: &[f64]) -> Vec<f64> {
        let n = stats[0].max(1.0);
        (0..self.y.ncols()).map(|j| stats[1 + j] / n).collect()
    }
}

/// Weighted Gini. `y` holds dense class indices; stats are per-class weights.
pub(crate) struct Gini<'a> {
    pub y: &'a [usize],
    pub weights: &'a [f64],
    pub n_classes: usize,
}

impl Objective for Gini<'_> {
    fn stats_len(&self) -> usize {
        self.n_classes
    }

    fn accumulate(&self, sample: usize, stats: &mut [f64], sign: f64) {
        stats[self.y[sample]] += sign * self.weights[sample];
    }

    fn impurity(&self, stats: &[f64]) -> f64 {
        let total: f64 = stats.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        (total - stats.iter().map(|c| c * c).sum::<f64>() / total).max(0.0)
    }

    fn leaf(&self, stats: &[f64]) -> Vec<f64> {
        let total: f64 = stats.iter().sum();
        if total <= 0.0 {
            return vec![1.0 / self.n_classes as f64; self.n_classes];
        }
        stats.iter().map(|c| c.max(0.0) / total).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use rand::SeedableRng;

    fn params(max_depth: Option<usize>) -> TreeParams {
        TreeParams {
            max_depth,
            min_samples_split: 2,
            max_features: MaxFeatures::All,
        }
    }

    #[test]
    fn test_regression_tree_fits_step() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = array![[0.0, 5.0], [0.0, 5.0], [0.0, 5.0], [1.0, -5.0], [1.0, -5.0], [1.0, -5.0]];
        let mut rng = StdRng::seed_from_u64(7);
        let tree = Tree::grow(x.view(), (0..6).collect(), &SquaredError { y: y.view() }, &params(None), &mut rng);

        assert_eq!(tree.predict(array![2.5].view()), &[0.0, 5.0]);
        assert_eq!(tree.predict(array![11.5].view()), &[1.0, -5.0]);
        // one split between 3 and 10
        assert_eq!(tree.nodes.len(), 3);
        assert!(tree.is_consistent(1, 2));
    }

    #[test]
    fn test_depth_limit_makes_single_leaf() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![[1.0], [2.0], [6.0]];
        let mut rng = StdRng::seed_from_u64(7);
        let tree = Tree::grow(x.view(), vec![0, 1, 2], &SquaredError { y: y.view() }, &params(Some(0)), &mut rng);
        assert_eq!(tree.predict(array![100.0].view()), &[3.0]);
    }

    #[test]
    fn test_gini_tree_separates_classes() {
        let x = Array2::from_shape_vec((4, 2), vec![0.0, 1.0, 0.0, 2.0, 5.0, 1.0, 5.0, 2.0]).unwrap();
        let y = [0usize, 0, 1, 1];
        let w = [1.0; 4];
        let obj = Gini { y: &y, weights: &w, n_classes: 2 };
        let mut rng = StdRng::seed_from_u64(1);
        let tree = Tree::grow(x.view(), (0..4).collect(), &obj, &params(None), &mut rng);

        assert_eq!(tree.predict(array![0.0, 1.5].view()), &[1.0, 0.0]);
        assert_eq!(tree.predict(array![5.0, 1.5].view()), &[0.0, 1.0]);
    }

    #[test]
    fn test_constant_features_give_leaf() {
        let x = array![[1.0], [1.0], [1.0]];
        let y = [0usize, 1, 1];
        let w = [1.0; 3];
        let obj = Gini { y: &y, weights: &w, n_classes: 2 };
        let mut rng = StdRng::seed_from_u64(1);
        let tree = Tree::grow(x.view(), vec![0, 1, 2], &obj, &params(None), &mut rng);
        let p = tree.predict(array![1.0].view());
        assert!((p[0] - 1.0 / 3.0).abs() < 1e-12);
        assert!((p[1] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_one_rng_across_short_lived_views() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut trees = Vec::new();
        for shift in [0.0, 10.0] {
            let x = array![[shift], [shift + 1.0]];
            let y = array![[0.0], [1.0]];
            trees.push(Tree::grow(x.view(), vec![0, 1], &SquaredError { y: y.view() }, &params(None), &mut rng));
        }
        assert_eq!(trees[0].predict(array![0.0].view()), &[0.0]);
        assert_eq!(trees[1].predict(array![11.0].view()), &[1.0]);
    }

    #[test]
    fn test_sqrt_features() {
        assert_eq!(MaxFeatures::Sqrt.resolve(7), 2);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
        assert_eq!(MaxFeatures::All.resolve(11), 11);
    }
}

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::forest::{ClassWeight, ForestParams, RandomForestClassifier};
use super::scaler::StandardScaler;
use crate::error::Result;

/// Scaler followed by a forest classifier, fitted and applied as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaledClassifier {
    pub scaler: StandardScaler,
    pub forest: RandomForestClassifier,
}

impl ScaledClassifier {
    pub fn fit(params: ForestParams, x: ArrayView2<f64>, y: &[usize], class_weight: ClassWeight) -> Result<Self> {
        let scaler = StandardScaler::fit(x)?;
        let xs = scaler.transform(x)?;
        let forest = RandomForestClassifier::fit(params, xs.view(), y, class_weight)?;
        Ok(Self { scaler, forest })
    }

    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.forest.predict_proba(self.scaler.transform(x)?.view())
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<usize>> {
        self.forest.predict(self.scaler.transform(x)?.view())
    }

    pub fn classes(&self) -> &[usize] {
        self.forest.classes()
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.scaler.is_consistent() && self.forest.is_consistent(self.scaler.n_features())
    }
}

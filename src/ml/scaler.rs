use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Per-column standardisation to zero mean and unit variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: ArrayView2<f64>) -> Result<Self> {
        let mean = x.mean_axis(Axis(0)).ok_or_else(|| Error::InsufficientData {
            what: "scaler fit".into(),
            observed: 0,
            required: 1,
        })?;
        let std = x.std_axis(Axis(0), 0.0);
        // constant columns pass through unscaled
        let scale = std
            .iter()
            .map(|s| if *s > f64::EPSILON { *s } else { 1.0 })
            .collect();
        Ok(Self {
            mean: mean.to_vec(),
            scale,
        })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(Error::ShapeMismatch {
                expected: self.n_features(),
                got: x.ncols(),
            });
        }
        let mut out = x.to_owned();
        for (j, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (m, s) = (self.mean[j], self.scale[j]);
            col.mapv_inplace(|v| (v - m) / s);
        }
        Ok(out)
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.mean.len() == self.scale.len()
            && self.scale.iter().all(|s| s.is_finite() && *s > 0.0)
            && self.mean.iter().all(|m| m.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_standardises_columns() {
        let x = array![[1.0, 10.0, 5.0], [3.0, 20.0, 5.0], [5.0, 30.0, 5.0]];
        let scaler = StandardScaler::fit(x.view()).unwrap();
        let z = scaler.transform(x.view()).unwrap();

        for j in 0..2 {
            let col = z.column(j);
            assert!(col.sum().abs() < 1e-12);
            let var = col.mapv(|v| v * v).sum() / 3.0;
            assert!((var - 1.0).abs() < 1e-12);
        }
        // constant column only gets centred
        assert!(z.column(2).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_rejects_wrong_width() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let scaler = StandardScaler::fit(x.view()).unwrap();
        let bad = array![[1.0, 2.0, 3.0]];
        assert!(matches!(
            scaler.transform(bad.view()),
            Err(Error::ShapeMismatch { expected: 2, got: 3 })
        ));
    }

    #[test]
    fn test_empty_fit_fails() {
        let x = Array2::<f64>::zeros((0, 3));
        assert!(StandardScaler::fit(x.view()).is_err());
    }
}

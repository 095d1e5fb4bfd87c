use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::error::{Error, Result};

/// Maps categorical values to dense codes `0..n` in sorted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder<T> {
    field: String,
    classes: Vec<T>,
}

impl<T: Ord + Clone + Debug> LabelEncoder<T> {
    pub fn fit<'a>(field: &str, values: impl IntoIterator<Item = &'a T>) -> Self
    where
        T: 'a,
    {
        let mut classes: Vec<T> = values.into_iter().cloned().collect();
        classes.sort();
        classes.dedup();
        Self {
            field: field.to_string(),
            classes,
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> &[T] {
        &self.classes
    }

    pub fn transform(&self, value: &T) -> Result<usize> {
        self.classes.binary_search(value).map_err(|_| Error::UnknownLabel {
            field: self.field.clone(),
            label: format!("{value:?}"),
        })
    }

    pub fn inverse(&self, code: usize) -> Result<&T> {
        self.classes.get(code).ok_or_else(|| Error::UnknownLabel {
            field: self.field.clone(),
            label: format!("code {code}"),
        })
    }

    /// Sorted and free of duplicates, as `fit` leaves it.
    pub(crate) fn is_consistent(&self) -> bool {
        self.classes.windows(2).all(|w| w[0] < w[1])
    }
}

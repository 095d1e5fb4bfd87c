//! Numeric building blocks for the predictors: scaling, label encoding,
//! CART trees, random forests and model selection.

pub mod encoder;
pub mod forest;
pub mod pipeline;
pub mod scaler;
pub mod selection;
pub mod tree;

pub use encoder::LabelEncoder;
pub use forest::{ClassWeight, ForestParams, RandomForestClassifier, RandomForestRegressor};
pub use pipeline::ScaledClassifier;
pub use scaler::StandardScaler;
pub use selection::{grid_search, train_test_split, walk_forward_splits, ParamGrid, Split};
pub use tree::MaxFeatures;

//! Feature engineering
//!
//! Pure stages over [`Table`](crate::data::Table): same-game context, leak-free rolling
//! averages, column selection and invertible scaling.

pub mod context;
pub mod pipeline;
pub mod rolling;
pub mod scaler;
pub mod selection;

pub use context::ContextAugmenter;
pub use pipeline::{FeaturePipeline, PipelineArtifacts};
pub use rolling::RollingFeatureGenerator;
pub use scaler::{SafeScaler, Standardization, ZScore};
pub use selection::{ColumnSelection, ColumnSelector};

//! Model training
//!
//! Training loop, weighted loss, and metrics tracking.

pub mod metrics;
pub mod trainer;

pub use metrics::{StatMetrics, TrainingHistory};
pub use trainer::{Trainer, WeightedMseLoss};

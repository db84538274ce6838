//! Prediction and inference
//!
//! Load a trained model with its pipeline artifacts and predict next-game statistics.

pub mod inference;

pub use inference::{format_prediction, PlayerPrediction, Predictor};

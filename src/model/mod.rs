//! Neural network architecture
//!
//! A stacked LSTM over player windows with a linear regression head.

pub mod lstm;

pub use lstm::{StatLstm, StatLstmConfig};

//! Stacked LSTM regressor for next-game player statistics
//!
//! Architecture: [batch, L, F] → LSTM → Dropout → LSTM ... → final hidden state → Linear → [batch, T]

use crate::{HockeyError, ModelConfig};
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, Lstm, LstmConfig};
use burn::record::{FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

#[derive(Debug, Clone)]
pub struct StatLstmConfig {
    /// Feature columns per time step
    pub input_dim: usize,
    /// Target columns predicted
    pub output_dim: usize,
    pub hidden_size: usize,
    /// Stacked LSTM layers (at least one)
    pub num_layers: usize,
    /// Applied between stacked layers
    pub dropout: f64,
}

impl StatLstmConfig {
    pub fn from_model_config(config: &ModelConfig, input_dim: usize, output_dim: usize) -> Self {
        StatLstmConfig {
            input_dim,
            output_dim,
            hidden_size: config.hidden_size,
            num_layers: config.num_layers,
            dropout: config.dropout,
        }
    }
}

#[derive(Module, Debug)]
pub struct StatLstm<B: Backend> {
    first: Lstm<B>,
    stacked: Vec<Lstm<B>>,
    dropout: Dropout,
    head: Linear<B>,
    hidden_size: usize,
}

impl<B: Backend> StatLstm<B> {
    pub fn new(device: &B::Device, config: &StatLstmConfig) -> Self {
        let first = LstmConfig::new(config.input_dim, config.hidden_size, true).init(device);
        let stacked = (1..config.num_layers.max(1))
            .map(|_| LstmConfig::new(config.hidden_size, config.hidden_size, true).init(device))
            .collect();

        StatLstm {
            first,
            stacked,
            dropout: DropoutConfig::new(config.dropout).init(),
            head: LinearConfig::new(config.hidden_size, config.output_dim).init(device),
            hidden_size: config.hidden_size,
        }
    }

    /// Windows [batch, seq_len, features] to scaled predictions [batch, targets]
    pub fn forward(&self, windows: Tensor<B, 3>) -> Tensor<B, 2> {
        let batch_size = windows.dims()[0];

        let (mut output, mut state) = self.first.forward(windows, None);
        for layer in &self.stacked {
            (output, state) = layer.forward(self.dropout.forward(output), None);
        }

        // Final hidden state of the last layer: [batch, hidden_size]
        let last = state.hidden.reshape([batch_size, self.hidden_size]);
        self.head.forward(last)
    }

    pub fn save(&self, path: &str) -> crate::Result<()>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let recorder = burn::record::NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        recorder
            .record(self.clone().into_record(), path.into())
            .map_err(|e| HockeyError::Model(format!("failed to save model to {}: {}", path, e)))
    }

    pub fn load(device: &B::Device, path: &str, config: &StatLstmConfig) -> crate::Result<Self>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let recorder = burn::record::NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let record = recorder
            .load(path.into(), device)
            .map_err(|e| HockeyError::Model(format!("failed to load model from {}: {}", path, e)))?;

        Ok(Self::new(device, config).load_record(record))
    }
}

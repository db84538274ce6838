//! NHL player stat prediction
//!
//! Turns a chronological log of per-player, per-game statistics into fixed-length
//! sequences for a recurrent regressor, and turns model output back into
//! human-readable next-game predictions.

pub mod data;
pub mod features;
pub mod model;
pub mod predict;
pub mod training;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Unique identifier for a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub i64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum HockeyError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error(
        "No valid target columns found. Candidates: {candidates:?}. Numeric columns: {numeric:?}. \
         Pass explicit target columns if needed"
    )]
    NoTargetColumns {
        candidates: Vec<String>,
        numeric: Vec<String>,
    },

    #[error(
        "No valid feature columns found after excluding targets and identifiers. \
         Targets selected: {targets:?}. Numeric columns: {numeric:?}"
    )]
    NoFeatureColumns {
        targets: Vec<String>,
        numeric: Vec<String>,
    },

    #[error("not enough games for player {player}: has {games}, need {required}")]
    InsufficientHistory {
        player: PlayerId,
        games: usize,
        required: usize,
    },

    #[error("Scaler was fit on {expected} columns but got {found}")]
    ScalerWidth { expected: usize, found: usize },

    #[error("Model not trained - run `hockey train` first")]
    NoModel,

    #[error("Model error: {0}")]
    Model(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HockeyError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub data: DataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Trailing games averaged by the rolling features
    pub rolling_window: usize,
    /// Rows per model input window
    pub sequence_length: usize,
    /// Explicit target candidates; empty means the canonical stat list
    pub target_columns: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            rolling_window: 5,
            sequence_length: 5,
            target_columns: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn explicit_targets(&self) -> Option<&[String]> {
        if self.target_columns.is_empty() {
            None
        } else {
            Some(&self.target_columns)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub hidden_size: usize,
    pub num_layers: usize,
    pub dropout: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            hidden_size: 64,
            num_layers: 2,
            dropout: 0.2,
        }
    }
}

/// Where tensors live during training and inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    #[default]
    Cpu,
    Gpu,
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeDevice::Cpu => write!(f, "cpu"),
            ComputeDevice::Gpu => write!(f, "gpu"),
        }
    }
}

impl std::str::FromStr for ComputeDevice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(ComputeDevice::Cpu),
            "gpu" => Ok(ComputeDevice::Gpu),
            _ => Err(format!("Unknown device: {}. Use cpu or gpu.", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Fraction of players held out for validation (0 disables the holdout)
    pub validation_fraction: f32,
    pub seed: u64,
    pub device: ComputeDevice,
    /// Per-target loss weights; unlisted targets weigh 1.0
    pub loss_weights: BTreeMap<String, f32>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        let loss_weights = [
            ("goals", 2.0),
            ("assists", 2.0),
            ("points", 2.0),
            ("shots", 1.5),
            ("hits", 1.5),
            ("blocked", 1.5),
        ]
        .into_iter()
        .map(|(name, weight)| (name.to_string(), weight))
        .collect();

        TrainingConfig {
            epochs: 20,
            batch_size: 64,
            learning_rate: 1e-3,
            validation_fraction: 0.0,
            seed: 42,
            device: ComputeDevice::Cpu,
            loss_weights,
        }
    }
}

impl TrainingConfig {
    /// Loss weight for each target column, in column order
    pub fn weights_for(&self, target_columns: &[String]) -> Vec<f32> {
        target_columns
            .iter()
            .map(|col| self.loss_weights.get(col).copied().unwrap_or(1.0))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub raw_path: String,
    pub processed_path: String,
    pub model_path: String,
    pub artifacts_path: String,
    pub player_mapping_path: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            raw_path: "data/raw/nhl_game_logs_20242025.csv".to_string(),
            processed_path: "data/processed/nhl_game_logs_processed_20242025.csv".to_string(),
            model_path: "models/lstm_model".to_string(),
            artifacts_path: "models/pipeline.json".to_string(),
            player_mapping_path: "player_id_mapping.json".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HockeyError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| HockeyError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| HockeyError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_toml_round_trip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();

        assert_eq!(parsed.pipeline.sequence_length, 5);
        assert_eq!(parsed.model.num_layers, 2);
        assert_eq!(parsed.training.device, ComputeDevice::Cpu);
        assert_eq!(parsed.training.loss_weights.get("goals"), Some(&2.0));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = toml::from_str("[training]\nepochs = 3\ndevice = \"gpu\"\n").unwrap();

        assert_eq!(parsed.training.epochs, 3);
        assert_eq!(parsed.training.device, ComputeDevice::Gpu);
        assert_eq!(parsed.training.batch_size, 64);
        assert_eq!(parsed.pipeline.rolling_window, 5);
        assert!(parsed.pipeline.explicit_targets().is_none());
    }

    #[test]
    fn test_loss_weights_default_to_one() {
        let training = TrainingConfig::default();
        let cols = vec!["goals".to_string(), "timeOnIce".to_string(), "shots".to_string()];

        assert_eq!(training.weights_for(&cols), vec![2.0, 1.0, 1.5]);
    }
}

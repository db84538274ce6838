//! Next-game predictions for individual players

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::path::Path;

use crate::data::{PlayerDirectory, SequenceWindower};
use crate::model::{StatLstm, StatLstmConfig};
use crate::{HockeyError, ModelConfig, PlayerId, Result};

/// De-scaled, non-negative predictions for one player, in target column order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerPrediction {
    pub player_id: PlayerId,
    #[serde(serialize_with = "ordered_map")]
    pub predictions: Vec<(String, f64)>,
}

fn ordered_map<S: Serializer>(entries: &[(String, f64)], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(entries.len()))?;
    for (name, value) in entries {
        map.serialize_entry(name, value)?;
    }
    map.end()
}

/// Predictor for next-game player statistics
pub struct Predictor<B: Backend> {
    model: StatLstm<B>,
    windows: SequenceWindower,
    device: B::Device,
}

impl<B: Backend> Predictor<B>
where
    B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
    B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
{
    pub fn new(model: StatLstm<B>, windows: SequenceWindower, device: B::Device) -> Self {
        Predictor {
            model,
            windows,
            device,
        }
    }

    /// Load a saved model sized for the columns `windows` was built with
    pub fn load(
        device: B::Device,
        model_path: &str,
        model_config: &ModelConfig,
        windows: SequenceWindower,
    ) -> Result<Self> {
        if !Path::new(&format!("{}.mpk", model_path)).exists() {
            return Err(HockeyError::NoModel);
        }
        let config = StatLstmConfig::from_model_config(
            model_config,
            windows.feature_columns().len(),
            windows.target_columns().len(),
        );
        let model = StatLstm::load(&device, model_path, &config)?;
        Ok(Self::new(model, windows, device))
    }

    pub fn windows(&self) -> &SequenceWindower {
        &self.windows
    }

    /// Predict from the player's last `L` games; fewer games is an error for this player only
    pub fn predict(&self, player: PlayerId) -> Result<PlayerPrediction> {
        let required = self.windows.sequence_length();
        let rows = self.windows.entity_rows(player).unwrap_or(0..0);
        if rows.len() < required {
            return Err(HockeyError::InsufficientHistory {
                player,
                games: rows.len(),
                required,
            });
        }

        let sample = self
            .windows
            .item(rows.end - 1)
            .ok_or_else(|| HockeyError::Model(format!("no window for player {}", player)))?;
        let feature_dim = self.windows.feature_columns().len();
        let flat: Vec<f32> = sample.window.into_iter().flatten().collect();
        let input = Tensor::<B, 1>::from_floats(flat.as_slice(), &self.device)
            .reshape([1, required, feature_dim]);

        let scaled: Vec<f64> = self
            .model
            .forward(input)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| HockeyError::Model(format!("tensor conversion failed: {:?}", e)))?
            .into_iter()
            .map(|v| v as f64)
            .collect();
        let real = self.windows.target_scaler().inverse_transform(&scaled)?;

        let predictions = self
            .windows
            .target_columns()
            .iter()
            .cloned()
            .zip(real.into_iter().map(clip_non_negative))
            .collect();

        Ok(PlayerPrediction {
            player_id: player,
            predictions,
        })
    }

    /// One result per requested player; a failure never affects the others
    pub fn predict_many(&self, players: &[PlayerId]) -> Vec<(PlayerId, Result<PlayerPrediction>)> {
        players.iter().map(|&p| (p, self.predict(p))).collect()
    }
}

fn clip_non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

/// Human-readable prediction block
pub fn format_prediction(prediction: &PlayerPrediction, players: &PlayerDirectory) -> String {
    let mut out = format!(
        "{} [{}]\n",
        players.display_name(prediction.player_id),
        prediction.player_id
    );
    let width = prediction
        .predictions
        .iter()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0);
    for (name, value) in &prediction.predictions {
        out.push_str(&format!("  {:<width$}  {:>7.3}\n", name, value, width = width));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::fixtures::{interleaved_rows, rolled_table};
    use crate::PipelineConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    /// Player 1 has four games, player 2 has five; windows of length five
    fn predictor() -> Predictor<TestBackend> {
        let mut rows = interleaved_rows(&[1, 2], 5);
        let last_of_one = rows.iter().rposition(|r| r.player_id == 1).unwrap();
        rows.remove(last_of_one);

        let windows = SequenceWindower::build(&rolled_table(&rows), &PipelineConfig::default()).unwrap();
        let device = Default::default();
        let config = StatLstmConfig::from_model_config(
            &ModelConfig::default(),
            windows.feature_columns().len(),
            windows.target_columns().len(),
        );
        Predictor::new(StatLstm::new(&device, &config), windows, device)
    }

    #[test]
    fn test_one_game_short_is_insufficient_history() {
        let err = predictor().predict(PlayerId(1)).unwrap_err();

        assert!(matches!(
            err,
            HockeyError::InsufficientHistory { games: 4, required: 5, .. }
        ));
        assert!(err.to_string().starts_with("not enough games for player 1"));
    }

    #[test]
    fn test_exactly_enough_games_predicts_non_negative() {
        let predictor = predictor();
        let prediction = predictor.predict(PlayerId(2)).unwrap();

        let columns: Vec<&String> = prediction.predictions.iter().map(|(c, _)| c).collect();
        let expected: Vec<&String> = predictor.windows().target_columns().iter().collect();
        assert_eq!(columns, expected);
        assert!(prediction.predictions.iter().all(|(_, v)| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn test_batch_failures_are_isolated() {
        let results = predictor().predict_many(&[PlayerId(1), PlayerId(2), PlayerId(99)]);

        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_err());
        assert!(results[1].1.is_ok());
        assert!(matches!(
            results[2].1,
            Err(HockeyError::InsufficientHistory { games: 0, .. })
        ));
    }

    #[test]
    fn test_json_keeps_target_order() {
        let prediction = PlayerPrediction {
            player_id: PlayerId(8478402),
            predictions: vec![("shots".to_string(), 3.5), ("goals".to_string(), 0.25)],
        };
        let json = serde_json::to_string(&prediction).unwrap();

        assert_eq!(
            json,
            r#"{"player_id":8478402,"predictions":{"shots":3.5,"goals":0.25}}"#
        );
    }

    #[test]
    fn test_format_prediction_uses_directory() {
        let players = PlayerDirectory::from_json(r#"{"7": {"fullName": "Test Skater", "team": "EDM"}}"#).unwrap();
        let prediction = PlayerPrediction {
            player_id: PlayerId(7),
            predictions: vec![("goals".to_string(), 0.5)],
        };
        let text = format_prediction(&prediction, &players);

        assert!(text.starts_with("Test Skater (EDM) [7]"));
        assert!(text.contains("goals    0.500"));
    }

    #[test]
    fn test_missing_model_file() {
        let predictor = predictor();
        let result = Predictor::<TestBackend>::load(
            Default::default(),
            "/nonexistent/hockey/model",
            &ModelConfig::default(),
            predictor.windows().clone(),
        );
        assert!(matches!(result, Err(HockeyError::NoModel)));
    }
}

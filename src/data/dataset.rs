//! Burn Dataset over fixed-length player windows
//!
//! The rolled table is sorted by (playerId, date) and scaled once. Each row ends one
//! window: up to `L` preceding rows of the same player, left-padded with zero rows.

use crate::data::table::{Table, PLAYER_ID};
use crate::features::scaler::{fill_missing, SafeScaler};
use crate::features::selection::ColumnSelector;
use crate::features::PipelineArtifacts;
use crate::{HockeyError, PipelineConfig, PlayerId, Result};
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

/// One window and the target of its final row
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSample {
    /// `L` rows of `F` scaled features, oldest first
    pub window: Vec<Vec<f32>>,
    /// Scaled target vector of the window's last row
    pub target: Vec<f32>,
    /// Player whose row ends the window
    pub player: PlayerId,
}

#[derive(Debug)]
struct WindowStore {
    features: Vec<Vec<f32>>,
    targets: Vec<Vec<f32>>,
    players: Vec<PlayerId>,
    /// First row index of each row's player
    entity_start: Vec<usize>,
    entity_rows: HashMap<PlayerId, Range<usize>>,
    artifacts: PipelineArtifacts,
}

/// Read-only after construction; cloning shares the underlying rows
#[derive(Debug, Clone)]
pub struct SequenceWindower {
    store: Arc<WindowStore>,
}

impl SequenceWindower {
    /// Select columns and fit both scalers on `table`
    pub fn build(table: &Table, config: &PipelineConfig) -> Result<Self> {
        check_sequence_length(config.sequence_length)?;
        let sorted = table.sorted_by_entity(PLAYER_ID)?;
        let selection = ColumnSelector::new(config.explicit_targets()).select(&sorted)?;

        let (feature_scaler, features) =
            SafeScaler::fit_transform(&filled_columns(&sorted, &selection.feature_columns)?);
        let (target_scaler, targets) =
            SafeScaler::fit_transform(&filled_columns(&sorted, &selection.target_columns)?);

        let artifacts = PipelineArtifacts {
            sequence_length: config.sequence_length,
            rolling_window: config.rolling_window,
            feature_columns: selection.feature_columns,
            target_columns: selection.target_columns,
            feature_scaler,
            target_scaler,
        };
        Self::from_scaled(&sorted, artifacts, &features, &targets)
    }

    /// Reuse persisted columns and scalers without refitting
    pub fn from_artifacts(table: &Table, artifacts: PipelineArtifacts) -> Result<Self> {
        check_sequence_length(artifacts.sequence_length)?;
        let sorted = table.sorted_by_entity(PLAYER_ID)?;
        let features = artifacts
            .feature_scaler
            .transform(&filled_columns(&sorted, &artifacts.feature_columns)?)?;
        let targets = artifacts
            .target_scaler
            .transform(&filled_columns(&sorted, &artifacts.target_columns)?)?;
        Self::from_scaled(&sorted, artifacts, &features, &targets)
    }

    fn from_scaled(
        sorted: &Table,
        artifacts: PipelineArtifacts,
        features: &[Vec<f64>],
        targets: &[Vec<f64>],
    ) -> Result<Self> {
        let rows = sorted.len();
        let players: Vec<PlayerId> = sorted
            .numeric(PLAYER_ID)?
            .iter()
            .map(|id| id.map(|v| PlayerId(v as i64)))
            .collect::<Option<_>>()
            .ok_or_else(|| HockeyError::Schema("playerId has missing values".to_string()))?;

        let mut entity_start = Vec::with_capacity(rows);
        let mut entity_rows: HashMap<PlayerId, Range<usize>> = HashMap::new();
        for (row, player) in players.iter().enumerate() {
            let range = entity_rows.entry(*player).or_insert(row..row);
            range.end = row + 1;
            entity_start.push(range.start);
        }

        let store = WindowStore {
            features: row_major(features, rows),
            targets: row_major(targets, rows),
            players,
            entity_start,
            entity_rows,
            artifacts,
        };
        log::info!(
            "Built {} windows of length {} for {} players ({} features, {} targets)",
            rows,
            store.artifacts.sequence_length,
            store.entity_rows.len(),
            store.artifacts.feature_columns.len(),
            store.artifacts.target_columns.len()
        );
        Ok(SequenceWindower {
            store: Arc::new(store),
        })
    }

    /// One window ends at each row
    pub fn len(&self) -> usize {
        self.store.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.features.is_empty()
    }

    pub fn sequence_length(&self) -> usize {
        self.store.artifacts.sequence_length
    }

    /// Row range `[start, end)` of the window ending at `index`, never crossing into another player
    pub fn window_bounds(&self, index: usize) -> Range<usize> {
        let earliest = (index + 1).saturating_sub(self.sequence_length());
        self.store.entity_start[index].max(earliest)..index + 1
    }

    pub fn item(&self, index: usize) -> Option<WindowSample> {
        if index >= self.len() {
            return None;
        }
        let bounds = self.window_bounds(index);
        let width = self.store.artifacts.feature_columns.len();
        let padding = self.sequence_length() - bounds.len();

        let mut window = vec![vec![0.0; width]; padding];
        window.extend(self.store.features[bounds].iter().cloned());

        Some(WindowSample {
            window,
            target: self.store.targets[index].clone(),
            player: self.store.players[index],
        })
    }

    /// Rows of `player`, in date order
    pub fn entity_rows(&self, player: PlayerId) -> Option<Range<usize>> {
        self.store.entity_rows.get(&player).cloned()
    }

    pub fn players(&self) -> Vec<PlayerId> {
        let mut players: Vec<PlayerId> = self.store.entity_rows.keys().copied().collect();
        players.sort();
        players
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.store.artifacts.feature_columns
    }

    pub fn target_columns(&self) -> &[String] {
        &self.store.artifacts.target_columns
    }

    pub fn feature_scaler(&self) -> &SafeScaler {
        &self.store.artifacts.feature_scaler
    }

    pub fn target_scaler(&self) -> &SafeScaler {
        &self.store.artifacts.target_scaler
    }

    pub fn artifacts(&self) -> &PipelineArtifacts {
        &self.store.artifacts
    }

    /// Every window
    pub fn all(&self) -> WindowSubset {
        WindowSubset {
            windower: self.clone(),
            indices: (0..self.len()).collect(),
        }
    }

    /// Split whole players into (train, validation); no player straddles both
    pub fn split_by_entity(&self, validation_fraction: f32, seed: u64) -> (WindowSubset, WindowSubset) {
        let mut players = self.players();
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        players.shuffle(&mut rng);

        let n_val = if validation_fraction > 0.0 && players.len() > 1 {
            ((players.len() as f32 * validation_fraction).round() as usize).clamp(1, players.len() - 1)
        } else {
            0
        };
        let (val_players, train_players) = players.split_at(n_val);

        let indices = |group: &[PlayerId]| -> Vec<usize> {
            let mut rows: Vec<usize> = group
                .iter()
                .filter_map(|p| self.entity_rows(*p))
                .flatten()
                .collect();
            rows.sort_unstable();
            rows
        };

        log::info!(
            "Split {} players into {} train / {} validation",
            players.len(),
            train_players.len(),
            val_players.len()
        );
        (
            WindowSubset {
                windower: self.clone(),
                indices: indices(train_players),
            },
            WindowSubset {
                windower: self.clone(),
                indices: indices(val_players),
            },
        )
    }
}

impl Dataset<WindowSample> for SequenceWindower {
    fn get(&self, index: usize) -> Option<WindowSample> {
        self.item(index)
    }

    fn len(&self) -> usize {
        self.store.features.len()
    }
}

/// A subset of windows selected by row index
#[derive(Debug, Clone)]
pub struct WindowSubset {
    windower: SequenceWindower,
    indices: Vec<usize>,
}

impl Dataset<WindowSample> for WindowSubset {
    fn get(&self, index: usize) -> Option<WindowSample> {
        self.indices.get(index).and_then(|&row| self.windower.item(row))
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}

fn check_sequence_length(length: usize) -> Result<()> {
    if length == 0 {
        return Err(HockeyError::Config("sequence length must be at least 1".to_string()));
    }
    Ok(())
}

fn filled_columns(table: &Table, names: &[String]) -> Result<Vec<Vec<f64>>> {
    names
        .iter()
        .map(|name| table.numeric(name).map(fill_missing))
        .collect()
}

fn row_major(columns: &[Vec<f64>], rows: usize) -> Vec<Vec<f32>> {
    (0..rows)
        .map(|row| columns.iter().map(|col| col[row] as f32).collect())
        .collect()
}

/// Batch of windows: features [batch, L, F], targets [batch, T]
#[derive(Debug, Clone)]
pub struct WindowBatch<B: Backend> {
    pub features: Tensor<B, 3>,
    pub targets: Tensor<B, 2>,
}

#[derive(Clone)]
pub struct WindowBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> WindowBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        WindowBatcher { device }
    }
}

impl<B: Backend> Batcher<B, WindowSample, WindowBatch<B>> for WindowBatcher<B> {
    fn batch(&self, items: Vec<WindowSample>, _device: &B::Device) -> WindowBatch<B> {
        let batch_size = items.len();
        let seq_len = items.first().map(|s| s.window.len()).unwrap_or(0);
        let feature_dim = items
            .first()
            .and_then(|s| s.window.first())
            .map(|r| r.len())
            .unwrap_or(0);
        let target_dim = items.first().map(|s| s.target.len()).unwrap_or(0);

        let mut feature_data = Vec::with_capacity(batch_size * seq_len * feature_dim);
        let mut target_data = Vec::with_capacity(batch_size * target_dim);
        for sample in &items {
            for row in &sample.window {
                feature_data.extend_from_slice(row);
            }
            target_data.extend_from_slice(&sample.target);
        }

        let features = Tensor::<B, 1>::from_floats(feature_data.as_slice(), &self.device)
            .reshape([batch_size, seq_len, feature_dim]);
        let targets = Tensor::<B, 1>::from_floats(target_data.as_slice(), &self.device)
            .reshape([batch_size, target_dim]);

        WindowBatch { features, targets }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::data::records::fixtures::row;
    use crate::data::{PlayerGameRow, RawRecordStore, Table};
    use crate::features::FeaturePipeline;
    use crate::PipelineConfig;

    /// `games` rows per player for each id, interleaved by date
    pub fn interleaved_rows(players: &[i64], games: u32) -> Vec<PlayerGameRow> {
        let mut rows = Vec::new();
        for day in 0..games {
            for (slot, &player) in players.iter().enumerate() {
                let goals = ((player as u32 + day * 7) % 4) as f64;
                let game_id = 100 + (day as i64) * 10 + slot as i64;
                let team = if slot % 2 == 0 { "EDM" } else { "CGY" };
                let opponent = if slot % 2 == 0 { "CGY" } else { "EDM" };
                rows.push(row(game_id, day * 2 + slot as u32 % 2, player, team, opponent, goals));
            }
        }
        rows
    }

    pub fn rolled_table(rows: &[PlayerGameRow]) -> Table {
        let raw = RawRecordStore::from_rows(rows).unwrap();
        FeaturePipeline::new(&PipelineConfig::default())
            .unwrap()
            .engineer(&raw)
            .unwrap()
    }
}

//! Feature engineering stages and the artifacts a trained model depends on

use crate::data::{RawRecordStore, Table};
use crate::features::context::ContextAugmenter;
use crate::features::rolling::RollingFeatureGenerator;
use crate::features::scaler::SafeScaler;
use crate::features::selection::ColumnSelection;
use crate::{PipelineConfig, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Raw records to the rolled table: augment, then roll
#[derive(Debug, Clone)]
pub struct FeaturePipeline {
    augmenter: ContextAugmenter,
    rolling: RollingFeatureGenerator,
}

impl FeaturePipeline {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(FeaturePipeline {
            augmenter: ContextAugmenter::default(),
            rolling: RollingFeatureGenerator::new(config.rolling_window)?,
        })
    }

    pub fn engineer(&self, raw: &RawRecordStore) -> Result<Table> {
        log::info!("Engineering features for {} rows", raw.len());
        let augmented = self.augmenter.augment(raw.table())?;
        let rolled = self.rolling.apply(&augmented)?;
        log::info!(
            "Feature engineering complete: {} rows, {} columns",
            rolled.len(),
            rolled.columns().len()
        );
        Ok(rolled)
    }
}

/// Everything inference must reuse verbatim from training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineArtifacts {
    pub sequence_length: usize,
    pub rolling_window: usize,
    pub feature_columns: Vec<String>,
    pub target_columns: Vec<String>,
    pub feature_scaler: SafeScaler,
    pub target_scaler: SafeScaler,
}

impl PipelineArtifacts {
    pub fn selection(&self) -> ColumnSelection {
        ColumnSelection {
            target_columns: self.target_columns.clone(),
            feature_columns: self.feature_columns.clone(),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::info!("Pipeline artifacts saved to {}", path.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::records::fixtures::row;
    use crate::data::ColumnOrigin;

    #[test]
    fn test_engineer_adds_context_and_rolling() {
        let raw = RawRecordStore::from_rows(&[
            row(1, 0, 10, "EDM", "CGY", 1.0),
            row(1, 0, 20, "CGY", "EDM", 2.0),
            row(2, 2, 10, "EDM", "CGY", 0.0),
            row(2, 2, 20, "CGY", "EDM", 3.0),
        ])
        .unwrap();
        let pipeline = FeaturePipeline::new(&PipelineConfig::default()).unwrap();
        let table = pipeline.engineer(&raw).unwrap();

        assert_eq!(table.len(), 4);
        for name in ["team_goals", "opp_goals", "goals_roll5", "team_goals_roll5", "opp_hits_roll5"] {
            assert!(table.has_column(name), "missing {}", name);
        }
        assert_eq!(table.column("goals").unwrap().origin, ColumnOrigin::Raw);
        assert_eq!(
            table.column("opp_goals").unwrap().origin,
            ColumnOrigin::OpponentAggregate
        );
    }

    #[test]
    fn test_artifacts_json_round_trip() {
        let artifacts = PipelineArtifacts {
            sequence_length: 5,
            rolling_window: 5,
            feature_columns: vec!["goals_roll5".to_string()],
            target_columns: vec!["goals".to_string()],
            feature_scaler: SafeScaler::fit(&[vec![0.0, 1.0]]),
            target_scaler: SafeScaler::fit(&[vec![1.0, 3.0]]),
        };
        let dir = std::env::temp_dir().join(format!("hockey-artifacts-{}", std::process::id()));
        let path = dir.join("pipeline.json");

        artifacts.save(&path).unwrap();
        let back = PipelineArtifacts::load(&path).unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(back, artifacts);
        assert_eq!(back.selection().target_columns, vec!["goals"]);
    }
}

//! Target and feature column selection

use crate::data::records::PLAYER_STATS;
use crate::data::table::{is_identifier, Column, Table};
use crate::{HockeyError, Result};
use serde::{Deserialize, Serialize};

/// Target and feature column lists, disjoint and fixed once chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSelection {
    pub target_columns: Vec<String>,
    pub feature_columns: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ColumnSelector {
    explicit_targets: Option<Vec<String>>,
}

impl ColumnSelector {
    pub fn new(explicit_targets: Option<&[String]>) -> Self {
        ColumnSelector {
            explicit_targets: explicit_targets.map(|t| t.to_vec()),
        }
    }

    /// Targets are chosen first; features come from what remains.
    pub fn select(&self, table: &Table) -> Result<ColumnSelection> {
        let numeric: Vec<&Column> = table.numeric_columns().collect();
        let numeric_names = || numeric.iter().map(|c| c.name.clone()).collect::<Vec<_>>();

        let candidates = self.target_candidates(&numeric);
        let target_columns: Vec<String> = candidates
            .iter()
            .filter(|name| {
                numeric
                    .iter()
                    .find(|c| &c.name == *name)
                    .is_some_and(|c| c.distinct_count() > 1)
            })
            .cloned()
            .collect();

        if target_columns.is_empty() {
            return Err(HockeyError::NoTargetColumns {
                candidates,
                numeric: numeric_names(),
            });
        }

        let feature_columns: Vec<String> = numeric
            .iter()
            .filter(|c| !target_columns.contains(&c.name))
            .filter(|c| !is_identifier(&c.name))
            .filter(|c| c.distinct_count() > 1)
            .map(|c| c.name.clone())
            .collect();

        if feature_columns.is_empty() {
            return Err(HockeyError::NoFeatureColumns {
                targets: target_columns,
                numeric: numeric_names(),
            });
        }

        log::info!(
            "Selected {} target columns and {} feature columns",
            target_columns.len(),
            feature_columns.len()
        );
        log::debug!("Targets: {:?}", target_columns);

        Ok(ColumnSelection {
            target_columns,
            feature_columns,
        })
    }

    fn target_candidates(&self, numeric: &[&Column]) -> Vec<String> {
        let present = |name: &str| numeric.iter().any(|c| c.name == name);

        if let Some(explicit) = &self.explicit_targets {
            let mut seen = Vec::new();
            for name in explicit {
                if present(name) && !seen.contains(name) {
                    seen.push(name.clone());
                }
            }
            return seen;
        }

        let canonical: Vec<String> = numeric
            .iter()
            .filter(|c| PLAYER_STATS.contains(&c.name.as_str()))
            .map(|c| c.name.clone())
            .collect();
        if !canonical.is_empty() {
            return canonical;
        }

        numeric
            .iter()
            .filter(|c| !c.origin.is_derived() && !is_identifier(&c.name))
            .map(|c| c.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::table::ColumnOrigin;

    fn table(csv: &str) -> Table {
        Table::from_reader(csv.as_bytes(), None).unwrap()
    }

    const CSV: &str = "gameId,date,playerId,season,goals,shots,faceoffPct,goals_roll5\n\
                       1,2024-10-01,7,20242025,1,3,0.5,\n\
                       2,2024-10-03,7,20242025,0,2,0.5,1\n\
                       3,2024-10-05,7,20242025,2,4,0.5,0.5\n";

    #[test]
    fn test_constant_column_excluded_from_both_sets() {
        let selection = ColumnSelector::default().select(&table(CSV)).unwrap();

        assert_eq!(selection.target_columns, vec!["goals", "shots"]);
        assert_eq!(selection.feature_columns, vec!["goals_roll5"]);
        assert!(!selection.feature_columns.contains(&"faceoffPct".to_string()));
    }

    #[test]
    fn test_sets_are_disjoint_and_exclude_identifiers() {
        let selection = ColumnSelector::default().select(&table(CSV)).unwrap();

        for col in &selection.feature_columns {
            assert!(!selection.target_columns.contains(col));
            assert!(!is_identifier(col));
        }
        assert!(selection.target_columns.iter().all(|c| !is_identifier(c)));
    }

    #[test]
    fn test_explicit_targets_keep_caller_order() {
        let explicit = vec!["shots".to_string(), "missing".to_string(), "goals".to_string()];
        let selection = ColumnSelector::new(Some(&explicit)).select(&table(CSV)).unwrap();

        assert_eq!(selection.target_columns, vec!["shots", "goals"]);
    }

    #[test]
    fn test_fallback_uses_provenance_not_names() {
        let base = table(
            "gameId,date,playerId,xg,team_xg\n\
             1,2024-10-01,7,0.3,1.1\n\
             2,2024-10-03,7,0.1,0.9\n",
        );
        let rolled = base
            .with_column(Column::numeric(
                "xg_avg",
                ColumnOrigin::Rolling { window: 5 },
                vec![Some(0.1), Some(0.3)],
            ))
            .unwrap();

        let selection = ColumnSelector::default().select(&rolled).unwrap();

        // team_xg was read without a sidecar, so it counts as raw
        assert_eq!(selection.target_columns, vec!["xg", "team_xg"]);
        assert_eq!(selection.feature_columns, vec!["xg_avg"]);
    }

    #[test]
    fn test_no_targets_reports_candidates() {
        let csv = "gameId,date,playerId,goals,shots_roll5\n\
                   1,2024-10-01,7,1,0.5\n\
                   2,2024-10-03,7,1,1.5\n";
        match ColumnSelector::default().select(&table(csv)) {
            Err(HockeyError::NoTargetColumns { candidates, numeric }) => {
                assert_eq!(candidates, vec!["goals"]);
                assert!(numeric.contains(&"shots_roll5".to_string()));
            }
            other => panic!("expected NoTargetColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_no_features_is_error() {
        let csv = "gameId,date,playerId,goals\n\
                   1,2024-10-01,7,1\n\
                   2,2024-10-03,7,0\n";
        assert!(matches!(
            ColumnSelector::default().select(&table(csv)),
            Err(HockeyError::NoFeatureColumns { .. })
        ));
    }
}

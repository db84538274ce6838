//! Same-game team and opponent context
//!
//! Joins every player row with the summed statistics of their own side and of the
//! opposing side for that game.

use crate::data::records::TEAM_STATS;
use crate::data::table::{Column, ColumnOrigin, EntityKey, Table, GAME_ID, OPPONENT, TEAM};
use crate::Result;
use std::collections::HashMap;

pub fn team_column(stat: &str) -> String {
    format!("team_{}", stat)
}

pub fn opponent_column(stat: &str) -> String {
    format!("opp_{}", stat)
}

/// Adds `team_<stat>` and `opp_<stat>` totals to every row
#[derive(Debug, Clone)]
pub struct ContextAugmenter {
    stats: Vec<String>,
}

impl Default for ContextAugmenter {
    fn default() -> Self {
        ContextAugmenter {
            stats: TEAM_STATS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ContextAugmenter {
    pub fn new(stats: Vec<String>) -> Self {
        ContextAugmenter { stats }
    }

    pub fn stats(&self) -> &[String] {
        &self.stats
    }

    /// Row count and order are preserved. Statistics absent from the input are skipped.
    pub fn augment(&self, table: &Table) -> Result<Table> {
        let games = table.entity_keys(GAME_ID)?;
        let teams = table.entity_keys(TEAM)?;
        let opponents = table.entity_keys(OPPONENT)?;

        let present: Vec<&String> = self
            .stats
            .iter()
            .filter(|s| table.numeric(s).is_ok())
            .collect();

        let mut team_columns = Vec::with_capacity(present.len());
        let mut opp_columns = Vec::with_capacity(present.len());

        for stat in present {
            let values = table.numeric(stat)?;

            // (game, side) -> total; opponent totals are keyed by the side they were scored against
            let mut by_team: HashMap<(&EntityKey, &EntityKey), f64> = HashMap::new();
            let mut by_opponent: HashMap<(&EntityKey, &EntityKey), f64> = HashMap::new();
            for row in 0..table.len() {
                let v = values[row].unwrap_or(0.0);
                *by_team.entry((&games[row], &teams[row])).or_insert(0.0) += v;
                *by_opponent.entry((&games[row], &opponents[row])).or_insert(0.0) += v;
            }

            let team_totals = (0..table.len())
                .map(|row| by_team.get(&(&games[row], &teams[row])).copied())
                .collect();
            let opp_totals = (0..table.len())
                .map(|row| by_opponent.get(&(&games[row], &teams[row])).copied())
                .collect();

            team_columns.push(Column::numeric(
                team_column(stat),
                ColumnOrigin::TeamAggregate,
                team_totals,
            ));
            opp_columns.push(Column::numeric(
                opponent_column(stat),
                ColumnOrigin::OpponentAggregate,
                opp_totals,
            ));
        }

        let added = team_columns.len();
        let mut out = table.clone();
        for column in team_columns.into_iter().chain(opp_columns) {
            out = out.with_column(column)?;
        }
        log::info!("Added team and opponent totals for {} statistics", added);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::records::fixtures::row;
    use crate::data::RawRecordStore;

    fn game_table() -> Table {
        RawRecordStore::from_rows(&[
            row(1, 0, 10, "EDM", "CGY", 1.0),
            row(1, 0, 11, "EDM", "CGY", 2.0),
            row(1, 0, 20, "CGY", "EDM", 4.0),
            row(2, 1, 10, "EDM", "VAN", 0.0),
        ])
        .unwrap()
        .table()
        .clone()
    }

    #[test]
    fn test_team_and_opponent_totals() {
        let out = ContextAugmenter::default().augment(&game_table()).unwrap();

        assert_eq!(out.len(), 4);
        assert_eq!(
            out.numeric("team_goals").unwrap(),
            &[Some(3.0), Some(3.0), Some(4.0), Some(0.0)]
        );
        assert_eq!(
            out.numeric("opp_goals").unwrap(),
            &[Some(4.0), Some(4.0), Some(3.0), None]
        );
        assert_eq!(
            out.column("opp_goals").unwrap().origin,
            ColumnOrigin::OpponentAggregate
        );
    }

    #[test]
    fn test_team_total_equals_side_sum() {
        let input = game_table();
        let out = ContextAugmenter::default().augment(&input).unwrap();
        let shots = input.numeric("shots").unwrap();
        let team_shots = out.numeric("team_shots").unwrap();

        let edm_game_1: f64 = [0, 1].iter().map(|&r| shots[r].unwrap()).sum();
        assert_eq!(team_shots[0], Some(edm_game_1));
        assert_eq!(team_shots[1], Some(edm_game_1));
    }

    #[test]
    fn test_absent_statistic_is_skipped() {
        let csv = "gameId,date,playerId,team,opponent,goals\n\
                   1,2024-10-01,7,EDM,CGY,1\n\
                   1,2024-10-01,8,CGY,EDM,2\n";
        let table = Table::from_reader(csv.as_bytes(), None).unwrap();
        let out = ContextAugmenter::default().augment(&table).unwrap();

        assert_eq!(out.numeric("opp_goals").unwrap(), &[Some(2.0), Some(1.0)]);
        assert!(!out.has_column("team_hits"));
    }
}

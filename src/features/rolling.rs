//! Leak-free rolling averages
//!
//! Every rolling value is the mean of the entity's previous `window` observations,
//! never including the current game. An entity's first game has no history, so
//! its rolling value is missing.

use crate::data::records::{PLAYER_STATS, TEAM_STATS};
use crate::data::table::{group_rows, Column, ColumnOrigin, Table, GAME_ID, PLAYER_ID, TEAM};
use crate::features::context::{opponent_column, team_column};
use crate::{HockeyError, Result};

pub fn rolling_column(base: &str, window: usize) -> String {
    format!("{}_roll{}", base, window)
}

/// Mean of the `window` values strictly before each position, skipping missing ones
pub fn shifted_rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let start = i.saturating_sub(window);
            let (sum, count) = values[start..i]
                .iter()
                .flatten()
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            if count == 0 {
                None
            } else {
                Some(sum / count as f64)
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct RollingFeatureGenerator {
    window: usize,
    player_stats: Vec<String>,
    team_stats: Vec<String>,
}

impl RollingFeatureGenerator {
    pub fn new(window: usize) -> Result<Self> {
        if window == 0 {
            return Err(HockeyError::Config("rolling window must be at least 1".to_string()));
        }
        Ok(RollingFeatureGenerator {
            window,
            player_stats: PLAYER_STATS.iter().map(|s| s.to_string()).collect(),
            team_stats: TEAM_STATS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Player rolling stats, then team and opponent rolling stats.
    ///
    /// The returned table is ordered by (team, date).
    pub fn apply(&self, table: &Table) -> Result<Table> {
        let by_player = table.sorted_by_entity(PLAYER_ID)?;
        let with_player = self.add_player_rolling(by_player)?;
        let by_team = with_player.sorted_by_entity(TEAM)?;
        self.add_team_rolling(by_team)
    }

    /// Expects rows sorted by (playerId, date)
    fn add_player_rolling(&self, mut table: Table) -> Result<Table> {
        let groups = group_rows(&table.entity_keys(PLAYER_ID)?);

        for stat in &self.player_stats {
            let name = rolling_column(stat, self.window);
            let values = match table.numeric(stat) {
                Ok(values) => {
                    let mut rolled = vec![None; table.len()];
                    for (_, rows) in &groups {
                        let series: Vec<Option<f64>> = rows.iter().map(|&r| values[r]).collect();
                        for (&row, value) in rows.iter().zip(shifted_rolling_mean(&series, self.window)) {
                            rolled[row] = value;
                        }
                    }
                    rolled
                }
                Err(_) => {
                    log::debug!("Statistic '{}' absent, {} defaults to 0", stat, name);
                    vec![Some(0.0); table.len()]
                }
            };
            table = table.with_column(Column::numeric(
                name,
                ColumnOrigin::Rolling { window: self.window },
                values,
            ))?;
        }

        log::info!(
            "Added player rolling averages over {} games for {} players",
            self.window,
            groups.len()
        );
        Ok(table)
    }

    /// Expects rows sorted by (team, date).
    ///
    /// Team and opponent totals repeat on every player row of a game, so the series is
    /// collapsed to one value per (team, game) before shifting. Opponent columns are
    /// grouped by the row's own team key, like the team columns.
    fn add_team_rolling(&self, mut table: Table) -> Result<Table> {
        let team_groups = group_rows(&table.entity_keys(TEAM)?);
        let games = table.entity_keys(GAME_ID)?;

        // For each team: its games in date order, each with the rows playing in it
        let team_games: Vec<Vec<Vec<usize>>> = team_groups
            .iter()
            .map(|(_, rows)| {
                let keys: Vec<_> = rows.iter().map(|&r| games[r].clone()).collect();
                group_rows(&keys)
                    .into_iter()
                    .map(|(_, positions)| positions.into_iter().map(|p| rows[p]).collect())
                    .collect()
            })
            .collect();

        let bases: Vec<String> = self
            .team_stats
            .iter()
            .map(|s| team_column(s))
            .chain(self.team_stats.iter().map(|s| opponent_column(s)))
            .collect();

        for base in bases {
            let name = rolling_column(&base, self.window);
            let values = match table.numeric(&base) {
                Ok(values) => {
                    let mut rolled = vec![None; table.len()];
                    for games in &team_games {
                        let series: Vec<Option<f64>> = games
                            .iter()
                            .map(|rows| rows.iter().find_map(|&r| values[r]))
                            .collect();
                        for (rows, value) in games.iter().zip(shifted_rolling_mean(&series, self.window)) {
                            for &row in rows {
                                rolled[row] = value;
                            }
                        }
                    }
                    rolled
                }
                Err(_) => {
                    log::debug!("Column '{}' absent, {} defaults to 0", base, name);
                    vec![Some(0.0); table.len()]
                }
            };
            table = table.with_column(Column::numeric(
                name,
                ColumnOrigin::Rolling { window: self.window },
                values,
            ))?;
        }

        log::info!(
            "Added team and opponent rolling averages for {} teams",
            team_groups.len()
        );
        Ok(table)
    }
}

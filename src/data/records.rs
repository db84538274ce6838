//! Raw per-player, per-game records
//!
//! The ingester that fetches schedules and boxscores is external; it only has to
//! produce a CSV with these columns. This module validates and loads that file.

use crate::data::table::{Column, ColumnOrigin, Table, DATE, GAME_ID, OPPONENT, PLAYER_ID, SEASON, TEAM};
use crate::{HockeyError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Counting and rate statistics recorded for every player in every game
pub const PLAYER_STATS: [&str; 10] = [
    "goals",
    "assists",
    "points",
    "shots",
    "ppGoals",
    "shGoals",
    "hits",
    "blocked",
    "faceoffPct",
    "timeOnIce",
];

/// Statistics summed into team and opponent totals
pub const TEAM_STATS: [&str; 8] = [
    "goals", "assists", "points", "shots", "ppGoals", "shGoals", "hits", "blocked",
];

/// One player's line in one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerGameRow {
    pub game_id: i64,
    pub date: NaiveDate,
    pub season: i64,
    pub game_type: i64,
    pub home_team: String,
    pub away_team: String,
    pub is_home: bool,
    pub player_id: i64,
    pub team: String,
    pub opponent: String,
    pub goals: f64,
    pub assists: f64,
    pub points: f64,
    pub shots: f64,
    pub pp_goals: f64,
    pub sh_goals: f64,
    pub hits: f64,
    pub blocked: f64,
    pub faceoff_pct: f64,
    /// Seconds
    pub time_on_ice: f64,
}

impl PlayerGameRow {
    fn stat(&self, name: &str) -> f64 {
        match name {
            "goals" => self.goals,
            "assists" => self.assists,
            "points" => self.points,
            "shots" => self.shots,
            "ppGoals" => self.pp_goals,
            "shGoals" => self.sh_goals,
            "hits" => self.hits,
            "blocked" => self.blocked,
            "faceoffPct" => self.faceoff_pct,
            "timeOnIce" => self.time_on_ice,
            _ => 0.0,
        }
    }
}

/// Validated, immutable table of raw game-log rows
#[derive(Debug, Clone)]
pub struct RawRecordStore {
    table: Table,
}

impl RawRecordStore {
    /// Load the ingester's CSV; statistic columns may be partially absent
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HockeyError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )));
        }
        let table = Table::read_csv(path)?;
        log::info!("Loaded {} raw rows from {}", table.len(), path.display());
        Self::from_table(table)
    }

    pub fn from_rows(rows: &[PlayerGameRow]) -> Result<Self> {
        let int = |values: Vec<i64>| -> Vec<Option<f64>> {
            values.into_iter().map(|v| Some(v as f64)).collect()
        };

        let mut columns = vec![
            Column::numeric(GAME_ID, ColumnOrigin::Raw, int(rows.iter().map(|r| r.game_id).collect())),
            Column::date(DATE, rows.iter().map(|r| r.date).collect()),
            Column::numeric(SEASON, ColumnOrigin::Raw, int(rows.iter().map(|r| r.season).collect())),
            Column::numeric("gameType", ColumnOrigin::Raw, int(rows.iter().map(|r| r.game_type).collect())),
            Column::text("homeTeam", rows.iter().map(|r| r.home_team.clone()).collect()),
            Column::text("awayTeam", rows.iter().map(|r| r.away_team.clone()).collect()),
            Column::flag("isHome", rows.iter().map(|r| Some(r.is_home)).collect()),
            Column::numeric(PLAYER_ID, ColumnOrigin::Raw, int(rows.iter().map(|r| r.player_id).collect())),
            Column::text(TEAM, rows.iter().map(|r| r.team.clone()).collect()),
            Column::text(OPPONENT, rows.iter().map(|r| r.opponent.clone()).collect()),
        ];
        for stat in PLAYER_STATS {
            columns.push(Column::numeric(
                stat,
                ColumnOrigin::Raw,
                rows.iter().map(|r| Some(r.stat(stat))).collect(),
            ));
        }
        Self::from_table(Table::from_columns(columns)?)
    }

    pub fn from_table(table: Table) -> Result<Self> {
        for required in [GAME_ID, PLAYER_ID] {
            table.numeric(required)?;
        }
        table.dates(DATE)?;
        for required in [TEAM, OPPONENT] {
            table.require(required)?;
        }
        if !PLAYER_STATS.iter().any(|s| table.numeric(s).is_ok()) {
            return Err(HockeyError::Schema(format!(
                "no numeric statistic columns found (expected any of {:?}, got {:?})",
                PLAYER_STATS,
                table.column_names()
            )));
        }
        Ok(RawRecordStore { table })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A skater line with every stat derived from `goals`
    pub fn row(game_id: i64, day: u32, player_id: i64, team: &str, opponent: &str, goals: f64) -> PlayerGameRow {
        PlayerGameRow {
            game_id,
            date: NaiveDate::from_ymd_opt(2024, 10, 1).unwrap() + chrono::Days::new(day as u64),
            season: 20242025,
            game_type: 2,
            home_team: team.to_string(),
            away_team: opponent.to_string(),
            is_home: true,
            player_id,
            team: team.to_string(),
            opponent: opponent.to_string(),
            goals,
            assists: (player_id % 3) as f64,
            points: goals + (player_id % 3) as f64,
            shots: goals * 2.0 + 1.0,
            pp_goals: 0.0,
            sh_goals: 0.0,
            hits: day as f64 % 4.0,
            blocked: (player_id + day as i64) as f64 % 3.0,
            faceoff_pct: 0.5,
            time_on_ice: 900.0 + 30.0 * day as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::row;
    use super::*;

    #[test]
    fn test_from_rows_builds_raw_columns() {
        let store = RawRecordStore::from_rows(&[
            row(1, 0, 10, "EDM", "CGY", 1.0),
            row(1, 0, 20, "CGY", "EDM", 0.0),
        ])
        .unwrap();

        assert_eq!(store.len(), 2);
        let table = store.table();
        assert_eq!(table.numeric("goals").unwrap(), &[Some(1.0), Some(0.0)]);
        assert!(table.columns().iter().all(|c| c.origin == ColumnOrigin::Raw));
        assert!(!table.column("isHome").unwrap().is_numeric());
    }

    #[test]
    fn test_missing_identifier_is_schema_error() {
        let csv = "gameId,date,team,opponent,goals\n1,2024-10-01,EDM,CGY,1\n";
        let table = Table::from_reader(csv.as_bytes(), None).unwrap();
        let err = RawRecordStore::from_table(table).unwrap_err();
        assert!(matches!(err, HockeyError::Schema(msg) if msg.contains("playerId")));
    }

    #[test]
    fn test_no_statistics_is_schema_error() {
        let csv = "gameId,date,playerId,team,opponent\n1,2024-10-01,7,EDM,CGY\n";
        let table = Table::from_reader(csv.as_bytes(), None).unwrap();
        assert!(matches!(
            RawRecordStore::from_table(table),
            Err(HockeyError::Schema(_))
        ));
    }

    #[test]
    fn test_partial_statistics_accepted() {
        let csv = "gameId,date,playerId,team,opponent,goals\n1,2024-10-01,7,EDM,CGY,1\n";
        let table = Table::from_reader(csv.as_bytes(), None).unwrap();
        assert!(RawRecordStore::from_table(table).is_ok());
    }

    #[test]
    fn test_typed_row_deserializes_from_ingester_csv() {
        let csv = "gameId,date,season,gameType,homeTeam,awayTeam,isHome,playerId,team,opponent,\
                   goals,assists,points,shots,ppGoals,shGoals,hits,blocked,faceoffPct,timeOnIce\n\
                   2024020001,2024-10-04,20242025,2,NJD,BUF,true,8478402,NJD,BUF,1,0,1,3,0,0,2,1,0.0,1085\n";
        let mut rdr = csv::Reader::from_reader(csv.as_bytes());
        let rows: Vec<PlayerGameRow> = rdr.deserialize().collect::<std::result::Result<_, _>>().unwrap();

        assert_eq!(rows[0].player_id, 8478402);
        assert!(rows[0].is_home);
        assert_eq!(rows[0].time_on_ice, 1085.0);
    }
}

//! Immutable columnar table for game-log data
//!
//! Every pipeline stage takes a `&Table` and returns a new `Table`. Columns carry a
//! provenance tag recorded when they are created, so later stages can ask whether a
//! column is raw, a team/opponent aggregate, or a rolling average without parsing names.

use crate::{HockeyError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const GAME_ID: &str = "gameId";
pub const PLAYER_ID: &str = "playerId";
pub const SEASON: &str = "season";
pub const DATE: &str = "date";
pub const TEAM: &str = "team";
pub const OPPONENT: &str = "opponent";

/// Identifier columns never used as features or targets
pub const IDENTIFIER_COLUMNS: [&str; 3] = [GAME_ID, PLAYER_ID, SEASON];

pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER_COLUMNS.contains(&name)
}

/// Where a column came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnOrigin {
    /// Present in the ingested game log
    Raw,
    /// Same-game total over the player's own team
    TeamAggregate,
    /// Same-game total over the opposing team
    OpponentAggregate,
    /// Shifted trailing mean over `window` prior games
    Rolling { window: usize },
}

impl ColumnOrigin {
    pub fn is_derived(&self) -> bool {
        !matches!(self, ColumnOrigin::Raw)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Numeric(Vec<Option<f64>>),
    Flag(Vec<Option<bool>>),
    Text(Vec<String>),
    Date(Vec<NaiveDate>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Numeric(v) => v.len(),
            ColumnValues::Flag(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
            ColumnValues::Date(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(&self, order: &[usize]) -> ColumnValues {
        match self {
            ColumnValues::Numeric(v) => ColumnValues::Numeric(order.iter().map(|&i| v[i]).collect()),
            ColumnValues::Flag(v) => ColumnValues::Flag(order.iter().map(|&i| v[i]).collect()),
            ColumnValues::Text(v) => ColumnValues::Text(order.iter().map(|&i| v[i].clone()).collect()),
            ColumnValues::Date(v) => ColumnValues::Date(order.iter().map(|&i| v[i]).collect()),
        }
    }

    fn cell(&self, row: usize) -> String {
        match self {
            ColumnValues::Numeric(v) => v[row].map(|x| x.to_string()).unwrap_or_default(),
            ColumnValues::Flag(v) => match v[row] {
                Some(true) => "True".to_string(),
                Some(false) => "False".to_string(),
                None => String::new(),
            },
            ColumnValues::Text(v) => v[row].clone(),
            ColumnValues::Date(v) => v[row].format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub origin: ColumnOrigin,
    pub values: ColumnValues,
}

impl Column {
    pub fn numeric(name: impl Into<String>, origin: ColumnOrigin, values: Vec<Option<f64>>) -> Self {
        Column {
            name: name.into(),
            origin,
            values: ColumnValues::Numeric(values),
        }
    }

    pub fn text(name: impl Into<String>, values: Vec<String>) -> Self {
        Column {
            name: name.into(),
            origin: ColumnOrigin::Raw,
            values: ColumnValues::Text(values),
        }
    }

    pub fn flag(name: impl Into<String>, values: Vec<Option<bool>>) -> Self {
        Column {
            name: name.into(),
            origin: ColumnOrigin::Raw,
            values: ColumnValues::Flag(values),
        }
    }

    pub fn date(name: impl Into<String>, values: Vec<NaiveDate>) -> Self {
        Column {
            name: name.into(),
            origin: ColumnOrigin::Raw,
            values: ColumnValues::Date(values),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.values, ColumnValues::Numeric(_))
    }

    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match &self.values {
            ColumnValues::Numeric(v) => Some(v),
            _ => None,
        }
    }

    /// Number of distinct non-missing values (numeric columns only)
    pub fn distinct_count(&self) -> usize {
        match &self.values {
            ColumnValues::Numeric(v) => v
                .iter()
                .flatten()
                .map(|x| if *x == 0.0 { 0u64 } else { x.to_bits() })
                .collect::<HashSet<_>>()
                .len(),
            _ => 0,
        }
    }
}

/// Key used to group rows by entity (player id or team abbreviation)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKey {
    Id(i64),
    Name(String),
}

/// Column provenance persisted next to a processed CSV
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<(String, ColumnOrigin)>,
}

impl TableSchema {
    pub fn sidecar_path(csv_path: &Path) -> PathBuf {
        let mut name = csv_path.as_os_str().to_os_string();
        name.push(".schema.json");
        PathBuf::from(name)
    }

    fn origin_of(&self, name: &str) -> ColumnOrigin {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, origin)| *origin)
            .unwrap_or(ColumnOrigin::Raw)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    /// Build a table, checking that all columns have equal length and unique names
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let rows = columns.first().map(|c| c.values.len()).unwrap_or(0);
        let mut seen = HashSet::new();
        for col in &columns {
            if col.values.len() != rows {
                return Err(HockeyError::Schema(format!(
                    "column '{}' has {} rows, expected {}",
                    col.name,
                    col.values.len(),
                    rows
                )));
            }
            if !seen.insert(col.name.as_str()) {
                return Err(HockeyError::Schema(format!("duplicate column '{}'", col.name)));
            }
        }
        Ok(Table { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name).ok_or_else(|| {
            HockeyError::Schema(format!(
                "required column '{}' is missing (available: {:?})",
                name,
                self.column_names()
            ))
        })
    }

    pub fn numeric(&self, name: &str) -> Result<&[Option<f64>]> {
        let col = self.require(name)?;
        col.as_numeric()
            .ok_or_else(|| HockeyError::Schema(format!("column '{}' is not numeric", name)))
    }

    pub fn dates(&self, name: &str) -> Result<&[NaiveDate]> {
        match &self.require(name)?.values {
            ColumnValues::Date(v) => Ok(v),
            _ => Err(HockeyError::Schema(format!("column '{}' is not a date column", name))),
        }
    }

    pub fn numeric_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_numeric())
    }

    /// Return a new table with `column` appended, replacing any column of the same name
    pub fn with_column(mut self, column: Column) -> Result<Self> {
        if !self.columns.is_empty() && column.values.len() != self.rows {
            return Err(HockeyError::Schema(format!(
                "column '{}' has {} rows, expected {}",
                column.name,
                column.values.len(),
                self.rows
            )));
        }
        if self.columns.is_empty() {
            self.rows = column.values.len();
        }
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(self)
    }

    /// Rows reordered by `order` (a permutation or selection of row indices)
    pub fn take(&self, order: &[usize]) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    origin: c.origin,
                    values: c.values.take(order),
                })
                .collect(),
            rows: order.len(),
        }
    }

    /// Grouping key of every row for an id or team column
    pub fn entity_keys(&self, name: &str) -> Result<Vec<EntityKey>> {
        match &self.require(name)?.values {
            ColumnValues::Numeric(v) => v
                .iter()
                .enumerate()
                .map(|(row, value)| match value {
                    Some(x) if x.fract() == 0.0 => Ok(EntityKey::Id(*x as i64)),
                    Some(x) => Err(HockeyError::Schema(format!(
                        "column '{}' row {} holds non-integer id {}",
                        name, row, x
                    ))),
                    None => Err(HockeyError::Schema(format!(
                        "column '{}' row {} is missing",
                        name, row
                    ))),
                })
                .collect(),
            ColumnValues::Text(v) => Ok(v.iter().map(|s| EntityKey::Name(s.clone())).collect()),
            _ => Err(HockeyError::Schema(format!(
                "column '{}' cannot be used as a grouping key",
                name
            ))),
        }
    }

    /// Stable sort by (entity key, date)
    pub fn sorted_by_entity(&self, key: &str) -> Result<Table> {
        let keys = self.entity_keys(key)?;
        let dates = self.dates(DATE)?;
        let mut order: Vec<usize> = (0..self.rows).collect();
        order.sort_by(|&a, &b| match keys[a].cmp(&keys[b]) {
            Ordering::Equal => dates[a].cmp(&dates[b]),
            other => other,
        });
        Ok(self.take(&order))
    }

    pub fn schema(&self) -> TableSchema {
        TableSchema {
            columns: self.columns.iter().map(|c| (c.name.clone(), c.origin)).collect(),
        }
    }

    /// Read a CSV file; a `.schema.json` sidecar, if present, restores column provenance
    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            HockeyError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to open {}: {}", path.display(), e),
            ))
        })?;
        let sidecar = TableSchema::sidecar_path(path);
        let schema = if sidecar.exists() {
            let text = std::fs::read_to_string(&sidecar)?;
            Some(serde_json::from_str::<TableSchema>(&text)?)
        } else {
            None
        };
        Self::from_reader(file, schema.as_ref())
    }

    pub fn from_reader<R: Read>(reader: R, schema: Option<&TableSchema>) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(false).from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for record in rdr.records() {
            let record = record?;
            for (idx, field) in record.iter().enumerate() {
                cells[idx].push(field.trim().to_string());
            }
        }

        let mut columns = Vec::with_capacity(headers.len());
        for (name, raw) in headers.into_iter().zip(cells) {
            let origin = schema.map(|s| s.origin_of(&name)).unwrap_or(ColumnOrigin::Raw);
            let values = infer_values(&name, raw)?;
            columns.push(Column { name, origin, values });
        }
        Self::from_columns(columns)
    }

    /// Write the table as CSV and its provenance sidecar
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(path)?;
        self.to_writer(file)?;
        let schema = serde_json::to_string_pretty(&self.schema())?;
        std::fs::write(TableSchema::sidecar_path(path), schema)?;
        Ok(())
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(self.columns.iter().map(|c| c.name.as_str()))?;
        for row in 0..self.rows {
            wtr.write_record(self.columns.iter().map(|c| c.values.cell(row)))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn is_missing(cell: &str) -> bool {
    matches!(
        cell,
        "" | "NA" | "N/A" | "NaN" | "nan" | "null" | "NULL" | "None"
    )
}

/// Non-finite numbers are stored as missing
fn parse_number(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_flag(cell: &str) -> Option<bool> {
    match cell {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

fn parse_date(cell: &str) -> Option<NaiveDate> {
    let day = cell.get(..10).unwrap_or(cell);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn infer_values(name: &str, raw: Vec<String>) -> Result<ColumnValues> {
    if name == DATE {
        return raw
            .iter()
            .enumerate()
            .map(|(row, cell)| {
                parse_date(cell).ok_or_else(|| {
                    HockeyError::Parse(format!("row {}: invalid date '{}'", row + 1, cell))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(ColumnValues::Date);
    }

    let present: Vec<&String> = raw.iter().filter(|c| !is_missing(c)).collect();

    if !present.is_empty() && present.iter().all(|c| parse_flag(c).is_some()) {
        return Ok(ColumnValues::Flag(raw.iter().map(|c| parse_flag(c)).collect()));
    }

    if present.iter().all(|c| c.parse::<f64>().is_ok()) {
        return Ok(ColumnValues::Numeric(raw.iter().map(|c| parse_number(c)).collect()));
    }

    Ok(ColumnValues::Text(raw))
}

/// Group row indices by key, preserving first-appearance order of keys and row order within groups
pub fn group_rows<K: Clone + Eq + std::hash::Hash>(keys: &[K]) -> Vec<(K, Vec<usize>)> {
    let mut slots: HashMap<&K, usize> = HashMap::new();
    let mut groups: Vec<(K, Vec<usize>)> = Vec::new();
    for (row, key) in keys.iter().enumerate() {
        match slots.get(key) {
            Some(&slot) => groups[slot].1.push(row),
            None => {
                slots.insert(key, groups.len());
                groups.push((key.clone(), vec![row]));
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "gameId,date,playerId,team,isHome,goals,faceoffPct\n\
        10,2024-10-08,1,EDM,True,1,0.5\n\
        11,2024-10-04T19:00:00,1,EDM,False,0,\n\
        10,2024-10-08,2,CGY,False,2,0.25\n";

    #[test]
    fn test_type_inference() {
        let table = Table::from_reader(CSV.as_bytes(), None).unwrap();

        assert_eq!(table.len(), 3);
        assert!(table.column("gameId").unwrap().is_numeric());
        assert!(matches!(table.column("team").unwrap().values, ColumnValues::Text(_)));
        assert!(matches!(table.column("isHome").unwrap().values, ColumnValues::Flag(_)));
        assert_eq!(
            table.dates(DATE).unwrap()[1],
            NaiveDate::from_ymd_opt(2024, 10, 4).unwrap()
        );
        assert_eq!(table.numeric("faceoffPct").unwrap(), &[Some(0.5), None, Some(0.25)]);
    }

    #[test]
    fn test_na_tokens_and_non_finite_cells_are_missing() {
        let csv = "date,goals,shots,isHome\n\
            2024-10-01,1,inf,True\n\
            2024-10-02,NaN,2,NA\n\
            2024-10-03,3,null,False\n";
        let table = Table::from_reader(csv.as_bytes(), None).unwrap();

        assert_eq!(table.numeric("goals").unwrap(), &[Some(1.0), None, Some(3.0)]);
        assert_eq!(table.numeric("shots").unwrap(), &[None, Some(2.0), None]);
        assert!(matches!(table.column("isHome").unwrap().values, ColumnValues::Flag(_)));
        assert_eq!(table.column("goals").unwrap().distinct_count(), 2);
    }

    #[test]
    fn test_bad_date_is_parse_error() {
        let csv = "date,goals\nyesterday,1\n";
        let err = Table::from_reader(csv.as_bytes(), None).unwrap_err();
        assert!(matches!(err, HockeyError::Parse(_)));
    }

    #[test]
    fn test_sort_by_entity_is_stable() {
        let table = Table::from_reader(CSV.as_bytes(), None).unwrap();
        let sorted = table.sorted_by_entity(PLAYER_ID).unwrap();

        assert_eq!(sorted.numeric(GAME_ID).unwrap(), &[Some(11.0), Some(10.0), Some(10.0)]);
        assert_eq!(sorted.numeric(PLAYER_ID).unwrap(), &[Some(1.0), Some(1.0), Some(2.0)]);
    }

    #[test]
    fn test_missing_key_is_schema_error() {
        let csv = "date,playerId\n2024-10-04,\n";
        let table = Table::from_reader(csv.as_bytes(), None).unwrap();
        assert!(matches!(
            table.sorted_by_entity(PLAYER_ID),
            Err(HockeyError::Schema(_))
        ));
    }

    #[test]
    fn test_with_column_replaces_by_name() {
        let table = Table::from_reader(CSV.as_bytes(), None).unwrap();
        let width = table.columns().len();
        let table = table
            .with_column(Column::numeric("goals", ColumnOrigin::Raw, vec![None; 3]))
            .unwrap();

        assert_eq!(table.columns().len(), width);
        assert_eq!(table.numeric("goals").unwrap(), &[None, None, None]);
        assert!(table
            .clone()
            .with_column(Column::numeric("short", ColumnOrigin::Raw, vec![None]))
            .is_err());
    }

    #[test]
    fn test_csv_write_round_trip_keeps_provenance() {
        let table = Table::from_reader(CSV.as_bytes(), None)
            .unwrap()
            .with_column(Column::numeric(
                "goals_roll5",
                ColumnOrigin::Rolling { window: 5 },
                vec![None, Some(1.0), Some(0.5)],
            ))
            .unwrap();

        let mut buf = Vec::new();
        table.to_writer(&mut buf).unwrap();
        let schema = table.schema();
        let back = Table::from_reader(buf.as_slice(), Some(&schema)).unwrap();

        assert_eq!(back.column("goals_roll5").unwrap().origin, ColumnOrigin::Rolling { window: 5 });
        assert_eq!(back.numeric("goals_roll5").unwrap(), table.numeric("goals_roll5").unwrap());
        assert_eq!(back.column("isHome").unwrap().values, table.column("isHome").unwrap().values);
    }

    #[test]
    fn test_group_rows_preserves_order() {
        let keys = vec!["b", "a", "b", "c", "a"];
        let groups = group_rows(&keys);

        assert_eq!(groups[0], ("b", vec![0, 2]));
        assert_eq!(groups[1], ("a", vec![1, 4]));
        assert_eq!(groups[2], ("c", vec![3]));
    }

    #[test]
    fn test_distinct_count_ignores_missing() {
        let col = Column::numeric("x", ColumnOrigin::Raw, vec![Some(1.0), None, Some(1.0), Some(-0.0), Some(0.0)]);
        assert_eq!(col.distinct_count(), 2);
    }
}

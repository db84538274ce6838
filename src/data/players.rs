//! Player identity mapping used for display only

use crate::{PlayerId, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum MappingEntry {
    Name(String),
    Detailed {
        #[serde(rename = "fullName", default)]
        full_name: String,
        #[serde(default)]
        team: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInfo {
    pub name: String,
    pub team: Option<String>,
}

/// Display names keyed by player id
#[derive(Debug, Clone, Default)]
pub struct PlayerDirectory {
    players: HashMap<PlayerId, PlayerInfo>,
}

impl PlayerDirectory {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse `{"<id>": "Name"}` or `{"<id>": {"fullName": "Name", "team": "EDM"}}`
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: HashMap<String, MappingEntry> = serde_json::from_str(text)?;
        let mut players = HashMap::with_capacity(raw.len());
        for (key, entry) in raw {
            let Ok(id) = key.trim().parse::<i64>() else {
                log::debug!("Skipping non-numeric player id '{}'", key);
                continue;
            };
            let info = match entry {
                MappingEntry::Name(name) => PlayerInfo { name, team: None },
                MappingEntry::Detailed { full_name, team } => PlayerInfo {
                    name: full_name,
                    team,
                },
            };
            if !info.name.is_empty() {
                players.insert(PlayerId(id), info);
            }
        }
        Ok(PlayerDirectory { players })
    }

    /// Name with team suffix when known, falling back to the numeric id
    pub fn display_name(&self, id: PlayerId) -> String {
        match self.players.get(&id) {
            Some(PlayerInfo { name, team: Some(team) }) => format!("{} ({})", name, team),
            Some(PlayerInfo { name, team: None }) => name.clone(),
            None => format!("Player {}", id),
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_both_mapping_shapes() {
        let dir = PlayerDirectory::from_json(
            r#"{
                "8478402": "Connor McDavid",
                "8477934": {"id": 8477934, "fullName": "Leon Draisaitl", "team": "EDM"},
                "8470000": {"fullName": "", "team": null},
                "abc": "ignored"
            }"#,
        )
        .unwrap();

        assert_eq!(dir.len(), 2);
        assert_eq!(dir.display_name(PlayerId(8478402)), "Connor McDavid");
        assert_eq!(dir.display_name(PlayerId(8477934)), "Leon Draisaitl (EDM)");
        assert_eq!(dir.display_name(PlayerId(1)), "Player 1");
    }
}

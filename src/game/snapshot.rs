//! 带版本号的存档格式。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::{GameState, IntegrityError};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot version {found} is not supported (expected {})", SNAPSHOT_VERSION)]
    UnsupportedVersion { found: u32 },
    #[error("snapshot fails the integrity check: {0}")]
    Integrity(IntegrityError),
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub version: u32,
    pub state: GameState,
}

impl GameState {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            state: self.clone(),
        }
    }

    pub fn hydrate(snapshot: Snapshot) -> Result<GameState, SnapshotError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: snapshot.version,
            });
        }
        snapshot
            .state
            .integrity_check()
            .map_err(SnapshotError::Integrity)?;
        Ok(snapshot.state)
    }
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::game::combat::Initiator;
    use crate::game::rules::RuleEngine;
    use crate::game::state::fixtures::Table;

    #[test]
    fn mid_combat_state_survives_json() {
        let mut table = Table::new();
        for column in 2..5 {
            let card = table.filler();
            table.put_active(column, card);
        }
        let orc = table.monster(4, 6, 2);
        let id = table.put_active(0, orc);
        table
            .state
            .engage_monster(id, Initiator::Monster)
            .expect("engage");
        table.state.temp_shield = 2;
        table.state.one_shots.unbreakable = true;
        table.state.hold_removal();

        let json = table.state.snapshot().to_json().expect("serialize");
        let restored =
            GameState::hydrate(Snapshot::from_json(&json).expect("parse")).expect("hydrate");
        assert_eq!(restored, table.state);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut snapshot = GameState::default().snapshot();
        snapshot.version = 99;
        assert!(matches!(
            GameState::hydrate(snapshot),
            Err(SnapshotError::UnsupportedVersion { found: 99 })
        ));
    }

    #[test]
    fn corrupted_registry_is_rejected() {
        let mut table = Table::new();
        let potion = table.potion(3);
        table.state.hand.push(potion.clone());
        table.state.backpack.push(potion);
        assert!(matches!(
            GameState::hydrate(table.state.snapshot()),
            Err(SnapshotError::Integrity(IntegrityError::DuplicateCardId { .. }))
        ));
    }

    #[test]
    fn fresh_game_round_trips() {
        let mut engine = RuleEngine::with_seed(9);
        let (state, _) = engine.new_game(&GameConfig::default());
        let json = state.snapshot().to_json().expect("serialize");
        let restored =
            GameState::hydrate(Snapshot::from_json(&json).expect("parse")).expect("hydrate");
        assert_eq!(restored, state);
    }
}

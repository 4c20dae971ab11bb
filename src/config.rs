use serde::{Deserialize, Serialize};

use crate::ledger::types::Chips;

pub const DEFAULT_MULTIPLIER: Chips = 5;
pub const DEFAULT_MIN_PLAYERS_TO_START: usize = 2;

/// Engine-wide knobs. Everything else about a game is fixed when it is created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Chips per currency unit used when a game is created without one.
    pub default_multiplier: Chips,
    pub min_players_to_start: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_multiplier: DEFAULT_MULTIPLIER,
            min_players_to_start: DEFAULT_MIN_PLAYERS_TO_START,
        }
    }
}

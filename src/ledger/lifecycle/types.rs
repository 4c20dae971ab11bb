use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ledger::storage::{StoredGame, StoredParticipant, StoredTransaction};
use crate::ledger::types::{Chips, Money, UserId};

/// Host-reported chip counts keyed by user, required for every participant
/// still seated when a game ends.
pub type FinalChips = BTreeMap<UserId, Chips>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostedGame {
    pub game: StoredGame,
    pub host: StoredParticipant,
}

/// Money result of a participant leaving or being paid out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticipantExit {
    pub participant: StoredParticipant,
    pub investment: Chips,
    pub net_chips: Chips,
    pub net_money: Money,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameClosed {
    pub game: StoredGame,
    pub payouts: Vec<ParticipantExit>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticipantView {
    pub participant: StoredParticipant,
    pub user_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionView {
    pub transaction: StoredTransaction,
    pub user_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameDetails {
    pub game: StoredGame,
    pub host_name: String,
    pub participants: Vec<ParticipantView>,
    pub transactions: Vec<TransactionView>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    pub game: StoredGame,
    pub host_name: String,
    pub participant_count: usize,
    pub active_count: usize,
}

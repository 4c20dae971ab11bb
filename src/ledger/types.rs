use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;
pub type GameId = Uuid;
pub type ParticipantId = Uuid;
pub type TransactionId = Uuid;
pub type SettlementId = Uuid;

/// Signed chip count. Negative values record an outstanding buy-in.
pub type Chips = i64;

/// Currency amount derived from chips at a game's multiplier.
pub type Money = f64;

/// Balances closer to zero than this are considered settled.
pub const SETTLEMENT_EPSILON: Money = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Pending,
    Active,
    Ended,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Pending => "pending",
            GameStatus::Active => "active",
            GameStatus::Ended => "ended",
        }
    }

    /// Status transitions only move forward: pending -> active -> ended.
    pub fn can_transition_to(&self, next: GameStatus) -> bool {
        matches!(
            (self, next),
            (GameStatus::Pending, GameStatus::Active) | (GameStatus::Active, GameStatus::Ended)
        )
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    BuyIn,
    Rebuy,
    Leave,
    Payout,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::BuyIn => "buy_in",
            TransactionKind::Rebuy => "rebuy",
            TransactionKind::Leave => "leave",
            TransactionKind::Payout => "payout",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use sea_orm::DbErr;

use super::types::{GameId, GameStatus, SettlementId, UserId};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("not authorized to {action}")]
    NotAuthorized { action: &'static str },
    #[error("cannot {action} game {game_id} while it is {status}")]
    InvalidState {
        game_id: GameId,
        status: GameStatus,
        action: &'static str,
    },
    #[error("user {user_id} already joined game {game_id}")]
    AlreadyJoined { game_id: GameId, user_id: UserId },
    #[error("{0} is not active")]
    NotActive(&'static str),
    #[error("need at least {required} active players to start, found {found}")]
    InsufficientPlayers { required: usize, found: usize },
    #[error("final chips not provided for users {users:?}")]
    MissingFinalChips { users: Vec<UserId> },
    #[error("settlement {0} already confirmed")]
    AlreadyConfirmed(SettlementId),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("ledger integrity violation: {0}")]
    Integrity(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::InvalidAmount(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

use sea_orm::entity::prelude::*;

use crate::ledger::types::{GameStatus as LedgerGameStatus, TransactionKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum GameStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "ended")]
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum TransactionType {
    #[sea_orm(string_value = "buy_in")]
    BuyIn,
    #[sea_orm(string_value = "rebuy")]
    Rebuy,
    #[sea_orm(string_value = "leave")]
    Leave,
    #[sea_orm(string_value = "payout")]
    Payout,
}

impl From<LedgerGameStatus> for GameStatus {
    fn from(status: LedgerGameStatus) -> Self {
        match status {
            LedgerGameStatus::Pending => GameStatus::Pending,
            LedgerGameStatus::Active => GameStatus::Active,
            LedgerGameStatus::Ended => GameStatus::Ended,
        }
    }
}

impl From<GameStatus> for LedgerGameStatus {
    fn from(status: GameStatus) -> Self {
        match status {
            GameStatus::Pending => LedgerGameStatus::Pending,
            GameStatus::Active => LedgerGameStatus::Active,
            GameStatus::Ended => LedgerGameStatus::Ended,
        }
    }
}

impl From<TransactionKind> for TransactionType {
    fn from(kind: TransactionKind) -> Self {
        match kind {
            TransactionKind::BuyIn => TransactionType::BuyIn,
            TransactionKind::Rebuy => TransactionType::Rebuy,
            TransactionKind::Leave => TransactionType::Leave,
            TransactionKind::Payout => TransactionType::Payout,
        }
    }
}

impl From<TransactionType> for TransactionKind {
    fn from(kind: TransactionType) -> Self {
        match kind {
            TransactionType::BuyIn => TransactionKind::BuyIn,
            TransactionType::Rebuy => TransactionKind::Rebuy,
            TransactionType::Leave => TransactionKind::Leave,
            TransactionType::Payout => TransactionKind::Payout,
        }
    }
}

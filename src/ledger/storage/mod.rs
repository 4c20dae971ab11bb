use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::error::LedgerError;
use crate::ledger::types::{
    Chips, GameId, GameStatus, Money, ParticipantId, SettlementId, TransactionId, TransactionKind,
    UserId,
};

/// Entry point of the ledger store: every engine operation opens exactly one
/// transaction and either commits or rolls it back.
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerStorageTxn + Send>, LedgerError>;
}

/// A serializable unit of work over users, games, participants, transactions
/// and settlements. Nothing written through it is visible to other
/// transactions before `commit`.
#[async_trait]
pub trait LedgerStorageTxn: Send {
    async fn load_user(&mut self, id: UserId) -> Result<Option<StoredUser>, LedgerError>;

    /// All users ordered by display name.
    async fn load_users(&mut self) -> Result<Vec<StoredUser>, LedgerError>;

    async fn insert_user(&mut self, user: NewUser) -> Result<StoredUser, LedgerError>;

    /// Adds `delta` to the user's running balance. Never overwrites it.
    async fn add_to_user_balance(&mut self, id: UserId, delta: Money) -> Result<(), LedgerError>;

    async fn insert_game(&mut self, game: NewGame) -> Result<StoredGame, LedgerError>;

    async fn load_game(&mut self, id: GameId) -> Result<Option<StoredGame>, LedgerError>;

    /// All games, newest first.
    async fn load_games(&mut self) -> Result<Vec<StoredGame>, LedgerError>;

    /// Persists `pot_chips` and `status`.
    async fn update_game(&mut self, game: &StoredGame) -> Result<(), LedgerError>;

    async fn insert_participant(
        &mut self,
        participant: NewParticipant,
    ) -> Result<StoredParticipant, LedgerError>;

    async fn load_participant(
        &mut self,
        game_id: GameId,
        user_id: UserId,
    ) -> Result<Option<StoredParticipant>, LedgerError>;

    /// Participants of a game in join order.
    async fn load_participants(
        &mut self,
        game_id: GameId,
    ) -> Result<Vec<StoredParticipant>, LedgerError>;

    /// Persists the mutable participant columns (chips, activity, net balance).
    async fn update_participant(
        &mut self,
        participant: &StoredParticipant,
    ) -> Result<(), LedgerError>;

    async fn insert_transaction(
        &mut self,
        transaction: NewTransaction,
    ) -> Result<StoredTransaction, LedgerError>;

    /// Transactions of a game in creation order.
    async fn load_transactions(
        &mut self,
        game_id: GameId,
    ) -> Result<Vec<StoredTransaction>, LedgerError>;

    async fn insert_settlement(
        &mut self,
        settlement: NewSettlement,
    ) -> Result<StoredSettlement, LedgerError>;

    async fn load_settlement(
        &mut self,
        id: SettlementId,
    ) -> Result<Option<StoredSettlement>, LedgerError>;

    /// Every settlement row, confirmed or not, in creation order.
    async fn load_settlements(&mut self) -> Result<Vec<StoredSettlement>, LedgerError>;

    async fn mark_settlement_confirmed(
        &mut self,
        id: SettlementId,
        confirmed_at: DateTime<Utc>,
    ) -> Result<(), LedgerError>;

    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;
    async fn rollback(self: Box<Self>);
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredUser {
    pub id: UserId,
    pub name: String,
    pub total_net_balance_money: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub id: UserId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredGame {
    pub id: GameId,
    pub host_id: UserId,
    pub chips_per_player: Chips,
    pub multiplier: Chips,
    pub pot_chips: Chips,
    pub status: GameStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewGame {
    pub host_id: UserId,
    pub chips_per_player: Chips,
    pub multiplier: Chips,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredParticipant {
    pub id: ParticipantId,
    pub game_id: GameId,
    pub user_id: UserId,
    pub initial_chips: Chips,
    pub total_rebuys_chips: Chips,
    pub final_chips: Option<Chips>,
    pub is_active: bool,
    pub net_balance_money: Option<Money>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewParticipant {
    pub game_id: GameId,
    pub user_id: UserId,
    pub initial_chips: Chips,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredTransaction {
    pub id: TransactionId,
    pub game_id: GameId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount_chips: Chips,
    pub amount_money: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewTransaction {
    pub game_id: GameId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount_chips: Chips,
    pub amount_money: Money,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredSettlement {
    pub id: SettlementId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub amount: Money,
    pub is_confirmed: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewSettlement {
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub amount: Money,
}

pub mod in_memory;
pub mod sea_orm;

pub use in_memory::InMemoryLedgerStorage;
pub use sea_orm::SeaOrmLedgerStorage;

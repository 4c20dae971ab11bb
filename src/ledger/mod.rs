pub mod accounting;
pub mod error;
pub mod lifecycle;
mod service;
pub mod settlement;
pub mod storage;
pub mod types;
pub mod typestate;

pub use error::LedgerError;
pub use lifecycle::{
    FinalChips, GameClosed, GameDetails, GameSummary, HostedGame, LifecycleService,
    ParticipantExit, ParticipantView, TransactionView,
};
pub use service::LedgerServiceFactory;
pub use settlement::{
    compute_settlements, reconcile, Balance, BalanceSheet, PendingSettlement, ReconcilePlan,
    SettlementRecord, SettlementService,
};
pub use storage::{
    InMemoryLedgerStorage, LedgerStorage, LedgerStorageTxn, SeaOrmLedgerStorage, StoredGame,
    StoredParticipant, StoredSettlement, StoredTransaction, StoredUser,
};
pub use types::{
    Chips, GameId, GameStatus, Money, ParticipantId, SettlementId, TransactionId,
    TransactionKind, UserId, SETTLEMENT_EPSILON,
};
pub use typestate::{DbRowStatus, MaybeSaved, NotSaved, Saved};

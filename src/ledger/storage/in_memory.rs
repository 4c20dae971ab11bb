use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::ledger::error::LedgerError;
use crate::ledger::types::{GameId, Money, SettlementId, UserId};

use super::{
    LedgerStorage, LedgerStorageTxn, NewGame, NewParticipant, NewSettlement, NewTransaction,
    NewUser, StoredGame, StoredParticipant, StoredSettlement, StoredTransaction, StoredUser,
};

const LOG_TARGET: &str = "chip_ledger::ledger::storage";

#[derive(Clone, Default)]
struct Inner {
    users: HashMap<UserId, StoredUser>,
    games: HashMap<GameId, StoredGame>,
    participants: Vec<StoredParticipant>,
    transactions: Vec<StoredTransaction>,
    settlements: Vec<StoredSettlement>,
}

#[derive(Default)]
struct FaultPlan {
    writes_before_failure: Option<usize>,
}

/// Process-local ledger store. Transactions are serialized: `begin` takes an
/// exclusive lock that is held until `commit` or `rollback`, and writes land
/// in a working copy that only replaces the shared state on commit.
pub struct InMemoryLedgerStorage {
    inner: Arc<AsyncMutex<Inner>>,
    faults: Arc<Mutex<FaultPlan>>,
}

impl InMemoryLedgerStorage {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AsyncMutex::new(Inner::default())),
            faults: Arc::new(Mutex::new(FaultPlan::default())),
        }
    }

    /// Let the next `writes` row writes succeed, then fail every write until
    /// `clear_faults` is called.
    pub fn fail_after_writes(&self, writes: usize) {
        self.faults.lock().writes_before_failure = Some(writes);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().writes_before_failure = None;
    }
}

impl Default for InMemoryLedgerStorage {
    fn default() -> Self {
        Self::new()
    }
}

pub struct InMemoryLedgerTxn {
    guard: OwnedMutexGuard<Inner>,
    working: Inner,
    faults: Arc<Mutex<FaultPlan>>,
}

#[async_trait]
impl LedgerStorage for InMemoryLedgerStorage {
    async fn begin(&self) -> Result<Box<dyn LedgerStorageTxn + Send>, LedgerError> {
        let guard = Arc::clone(&self.inner).lock_owned().await;
        // Each transaction copies the whole store, so begin costs grow with
        // history. Fine for tests and the demo; long-lived data belongs in
        // the Postgres store.
        let working = guard.clone();
        Ok(Box::new(InMemoryLedgerTxn {
            guard,
            working,
            faults: Arc::clone(&self.faults),
        }))
    }
}

impl InMemoryLedgerTxn {
    fn record_write(&self) -> Result<(), LedgerError> {
        let mut faults = self.faults.lock();
        match faults.writes_before_failure {
            Some(0) => {
                tracing::debug!(target: LOG_TARGET, "injected write failure");
                Err(LedgerError::storage("injected write failure"))
            }
            Some(remaining) => {
                faults.writes_before_failure = Some(remaining - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LedgerStorageTxn for InMemoryLedgerTxn {
    async fn load_user(&mut self, id: UserId) -> Result<Option<StoredUser>, LedgerError> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn load_users(&mut self) -> Result<Vec<StoredUser>, LedgerError> {
        let mut users: Vec<StoredUser> = self.working.users.values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<StoredUser, LedgerError> {
        self.record_write()?;
        if self.working.users.contains_key(&user.id) {
            return Err(LedgerError::validation(format!(
                "user {} already exists",
                user.id
            )));
        }
        let stored = StoredUser {
            id: user.id,
            name: user.name,
            total_net_balance_money: 0.0,
            created_at: Utc::now(),
        };
        self.working.users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn add_to_user_balance(&mut self, id: UserId, delta: Money) -> Result<(), LedgerError> {
        self.record_write()?;
        let user = self
            .working
            .users
            .get_mut(&id)
            .ok_or_else(|| LedgerError::integrity(format!("balance update for missing user {id}")))?;
        user.total_net_balance_money += delta;
        Ok(())
    }

    async fn insert_game(&mut self, game: NewGame) -> Result<StoredGame, LedgerError> {
        self.record_write()?;
        let stored = StoredGame {
            id: Uuid::new_v4(),
            host_id: game.host_id,
            chips_per_player: game.chips_per_player,
            multiplier: game.multiplier,
            pot_chips: 0,
            status: crate::ledger::types::GameStatus::Pending,
            created_at: Utc::now(),
        };
        self.working.games.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn load_game(&mut self, id: GameId) -> Result<Option<StoredGame>, LedgerError> {
        Ok(self.working.games.get(&id).cloned())
    }

    async fn load_games(&mut self) -> Result<Vec<StoredGame>, LedgerError> {
        let mut games: Vec<StoredGame> = self.working.games.values().cloned().collect();
        games.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(games)
    }

    async fn update_game(&mut self, game: &StoredGame) -> Result<(), LedgerError> {
        self.record_write()?;
        let stored = self
            .working
            .games
            .get_mut(&game.id)
            .ok_or_else(|| LedgerError::integrity(format!("update for missing game {}", game.id)))?;
        stored.pot_chips = game.pot_chips;
        stored.status = game.status;
        Ok(())
    }

    async fn insert_participant(
        &mut self,
        participant: NewParticipant,
    ) -> Result<StoredParticipant, LedgerError> {
        self.record_write()?;
        let stored = StoredParticipant {
            id: Uuid::new_v4(),
            game_id: participant.game_id,
            user_id: participant.user_id,
            initial_chips: participant.initial_chips,
            total_rebuys_chips: 0,
            final_chips: None,
            is_active: true,
            net_balance_money: None,
            created_at: Utc::now(),
        };
        self.working.participants.push(stored.clone());
        Ok(stored)
    }

    async fn load_participant(
        &mut self,
        game_id: GameId,
        user_id: UserId,
    ) -> Result<Option<StoredParticipant>, LedgerError> {
        Ok(self
            .working
            .participants
            .iter()
            .find(|p| p.game_id == game_id && p.user_id == user_id)
            .cloned())
    }

    async fn load_participants(
        &mut self,
        game_id: GameId,
    ) -> Result<Vec<StoredParticipant>, LedgerError> {
        Ok(self
            .working
            .participants
            .iter()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect())
    }

    async fn update_participant(
        &mut self,
        participant: &StoredParticipant,
    ) -> Result<(), LedgerError> {
        self.record_write()?;
        let stored = self
            .working
            .participants
            .iter_mut()
            .find(|p| p.id == participant.id)
            .ok_or_else(|| {
                LedgerError::integrity(format!(
                    "update for missing participant {}",
                    participant.id
                ))
            })?;
        stored.initial_chips = participant.initial_chips;
        stored.total_rebuys_chips = participant.total_rebuys_chips;
        stored.final_chips = participant.final_chips;
        stored.is_active = participant.is_active;
        stored.net_balance_money = participant.net_balance_money;
        Ok(())
    }

    async fn insert_transaction(
        &mut self,
        transaction: NewTransaction,
    ) -> Result<StoredTransaction, LedgerError> {
        self.record_write()?;
        let stored = StoredTransaction {
            id: Uuid::new_v4(),
            game_id: transaction.game_id,
            user_id: transaction.user_id,
            kind: transaction.kind,
            amount_chips: transaction.amount_chips,
            amount_money: transaction.amount_money,
            created_at: Utc::now(),
        };
        self.working.transactions.push(stored.clone());
        Ok(stored)
    }

    async fn load_transactions(
        &mut self,
        game_id: GameId,
    ) -> Result<Vec<StoredTransaction>, LedgerError> {
        Ok(self
            .working
            .transactions
            .iter()
            .filter(|t| t.game_id == game_id)
            .cloned()
            .collect())
    }

    async fn insert_settlement(
        &mut self,
        settlement: NewSettlement,
    ) -> Result<StoredSettlement, LedgerError> {
        self.record_write()?;
        let stored = StoredSettlement {
            id: Uuid::new_v4(),
            from_user_id: settlement.from_user_id,
            to_user_id: settlement.to_user_id,
            amount: settlement.amount,
            is_confirmed: false,
            confirmed_at: None,
            created_at: Utc::now(),
        };
        self.working.settlements.push(stored.clone());
        Ok(stored)
    }

    async fn load_settlement(
        &mut self,
        id: SettlementId,
    ) -> Result<Option<StoredSettlement>, LedgerError> {
        Ok(self.working.settlements.iter().find(|s| s.id == id).cloned())
    }

    async fn load_settlements(&mut self) -> Result<Vec<StoredSettlement>, LedgerError> {
        Ok(self.working.settlements.clone())
    }

    async fn mark_settlement_confirmed(
        &mut self,
        id: SettlementId,
        confirmed_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.record_write()?;
        let stored = self
            .working
            .settlements
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| LedgerError::integrity(format!("confirm for missing settlement {id}")))?;
        stored.is_confirmed = true;
        stored.confirmed_at = Some(confirmed_at);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let InMemoryLedgerTxn {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) {
        tracing::debug!(target: LOG_TARGET, "discarding in-memory transaction");
    }
}

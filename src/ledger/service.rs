use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tracing::{error, info, instrument};

use crate::config::LedgerConfig;

use super::error::LedgerError;
use super::lifecycle::validation::validate_ledger_config;
use super::storage::{
    InMemoryLedgerStorage, LedgerStorage, LedgerStorageTxn, NewUser, SeaOrmLedgerStorage,
    StoredGame, StoredUser,
};
use super::types::{GameId, UserId};

const LOG_TARGET: &str = "chip_ledger::ledger::service";
const FALLBACK_DISPLAY_NAME: &str = "User";

/// Ledger engine bound to one store. Game lifecycle operations live in
/// [`super::lifecycle::LifecycleService`], settlement operations in
/// [`super::settlement::SettlementService`].
#[derive(Clone)]
pub struct LedgerServiceFactory {
    pub(crate) storage: Arc<dyn LedgerStorage>,
    pub(crate) config: LedgerConfig,
}

impl LedgerServiceFactory {
    pub fn new(storage: Arc<dyn LedgerStorage>, config: LedgerConfig) -> Result<Self, LedgerError> {
        validate_ledger_config(&config)?;
        Ok(Self { storage, config })
    }

    pub fn from_sea_orm(
        connection: DatabaseConnection,
        config: LedgerConfig,
    ) -> Result<Self, LedgerError> {
        let storage = Arc::new(SeaOrmLedgerStorage::new(connection)) as Arc<dyn LedgerStorage>;
        Self::new(storage, config)
    }

    pub fn in_memory() -> Self {
        let storage = Arc::new(InMemoryLedgerStorage::new()) as Arc<dyn LedgerStorage>;
        Self {
            storage,
            config: LedgerConfig::default(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Register `user_id` if it has no ledger row yet. Existing users are
    /// returned untouched.
    #[instrument(skip_all, level = "info", target = LOG_TARGET, fields(user_id = %user_id))]
    pub async fn ensure_user(
        &self,
        user_id: UserId,
        email: &str,
        name: Option<&str>,
    ) -> Result<StoredUser, LedgerError> {
        let mut txn = self.storage.begin().await?;
        let result: Result<StoredUser, LedgerError> = async {
            if let Some(existing) = txn.load_user(user_id).await? {
                return Ok(existing);
            }
            let user = txn
                .insert_user(NewUser {
                    id: user_id,
                    name: display_name(email, name),
                })
                .await?;
            info!(target: LOG_TARGET, name = %user.name, "registered user");
            Ok(user)
        }
        .await;
        finish_txn(txn, result).await
    }

    pub async fn user(&self, user_id: UserId) -> Result<StoredUser, LedgerError> {
        let mut txn = self.storage.begin().await?;
        let result = load_user(txn.as_mut(), user_id).await;
        finish_txn(txn, result).await
    }
}

fn display_name(email: &str, name: Option<&str>) -> String {
    if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    email
        .split('@')
        .next()
        .map(str::trim)
        .filter(|local| !local.is_empty())
        .unwrap_or(FALLBACK_DISPLAY_NAME)
        .to_string()
}

/// Commit on success, roll back on failure.
pub(crate) async fn finish_txn<T>(
    txn: Box<dyn LedgerStorageTxn + Send>,
    result: Result<T, LedgerError>,
) -> Result<T, LedgerError> {
    match result {
        Ok(value) => {
            txn.commit().await.map_err(|err| {
                error!(target: LOG_TARGET, %err, "ledger commit failed");
                err
            })?;
            Ok(value)
        }
        Err(err) => {
            txn.rollback().await;
            if matches!(err, LedgerError::Integrity(_)) {
                error!(target: LOG_TARGET, %err, "rolled back after integrity violation");
            }
            Err(err)
        }
    }
}

pub(crate) async fn load_user(
    txn: &mut (dyn LedgerStorageTxn + Send),
    user_id: UserId,
) -> Result<StoredUser, LedgerError> {
    txn.load_user(user_id)
        .await?
        .ok_or(LedgerError::NotFound("user"))
}

pub(crate) async fn load_game(
    txn: &mut (dyn LedgerStorageTxn + Send),
    game_id: GameId,
) -> Result<StoredGame, LedgerError> {
    txn.load_game(game_id)
        .await?
        .ok_or(LedgerError::NotFound("game"))
}

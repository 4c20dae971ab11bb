use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    IsolationLevel, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait, Unchanged,
};
use uuid::Uuid;

use crate::db::entity::sea_orm_active_enums::{
    GameStatus as DbGameStatus, TransactionType as DbTransactionType,
};
use crate::db::entity::{game_participants, game_transactions, games, settlements, users};
use crate::ledger::error::LedgerError;
use crate::ledger::types::{GameId, Money, SettlementId, UserId};

use super::{
    LedgerStorage, LedgerStorageTxn, NewGame, NewParticipant, NewSettlement, NewTransaction,
    NewUser, StoredGame, StoredParticipant, StoredSettlement, StoredTransaction, StoredUser,
};

/// Postgres-backed ledger store. Every transaction runs at `SERIALIZABLE`
/// isolation and rows that are read before being written are locked.
pub struct SeaOrmLedgerStorage {
    connection: DatabaseConnection,
}

impl SeaOrmLedgerStorage {
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }
}

pub struct SeaOrmLedgerTxn {
    txn: DatabaseTransaction,
}

#[async_trait]
impl LedgerStorage for SeaOrmLedgerStorage {
    async fn begin(&self) -> Result<Box<dyn LedgerStorageTxn + Send>, LedgerError> {
        let txn = self
            .connection
            .begin_with_config(Some(IsolationLevel::Serializable), None)
            .await?;
        Ok(Box::new(SeaOrmLedgerTxn { txn }))
    }
}

#[async_trait]
impl LedgerStorageTxn for SeaOrmLedgerTxn {
    async fn load_user(&mut self, id: UserId) -> Result<Option<StoredUser>, LedgerError> {
        let record = users::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&self.txn)
            .await?;
        Ok(record.map(stored_user))
    }

    async fn load_users(&mut self) -> Result<Vec<StoredUser>, LedgerError> {
        let records = users::Entity::find()
            .order_by_asc(users::Column::Name)
            .order_by_asc(users::Column::Id)
            .all(&self.txn)
            .await?;
        Ok(records.into_iter().map(stored_user).collect())
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<StoredUser, LedgerError> {
        let model = users::ActiveModel {
            id: Set(user.id),
            name: Set(user.name),
            total_net_balance_money: Set(0.0),
            created_at: Set(Utc::now()),
        };
        let inserted = model.insert(&self.txn).await?;
        Ok(stored_user(inserted))
    }

    async fn add_to_user_balance(&mut self, id: UserId, delta: Money) -> Result<(), LedgerError> {
        let result = users::Entity::update_many()
            .col_expr(
                users::Column::TotalNetBalanceMoney,
                Expr::col(users::Column::TotalNetBalanceMoney).add(delta),
            )
            .filter(users::Column::Id.eq(id))
            .exec(&self.txn)
            .await?;
        if result.rows_affected != 1 {
            return Err(LedgerError::integrity(format!(
                "balance update for missing user {id}"
            )));
        }
        Ok(())
    }

    async fn insert_game(&mut self, game: NewGame) -> Result<StoredGame, LedgerError> {
        let model = games::ActiveModel {
            id: Set(Uuid::new_v4()),
            host_id: Set(game.host_id),
            chips_per_player: Set(game.chips_per_player),
            multiplier: Set(game.multiplier),
            pot_chips: Set(0),
            status: Set(DbGameStatus::Pending),
            created_at: Set(Utc::now()),
        };
        let inserted = model.insert(&self.txn).await?;
        Ok(stored_game(inserted))
    }

    async fn load_game(&mut self, id: GameId) -> Result<Option<StoredGame>, LedgerError> {
        let record = games::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&self.txn)
            .await?;
        Ok(record.map(stored_game))
    }

    async fn load_games(&mut self) -> Result<Vec<StoredGame>, LedgerError> {
        let records = games::Entity::find()
            .order_by_desc(games::Column::CreatedAt)
            .order_by_asc(games::Column::Id)
            .all(&self.txn)
            .await?;
        Ok(records.into_iter().map(stored_game).collect())
    }

    async fn update_game(&mut self, game: &StoredGame) -> Result<(), LedgerError> {
        let model = games::ActiveModel {
            id: Unchanged(game.id),
            pot_chips: Set(game.pot_chips),
            status: Set(DbGameStatus::from(game.status)),
            ..Default::default()
        };
        model
            .update(&self.txn)
            .await
            .map_err(|err| missing_row(err, "game", game.id))?;
        Ok(())
    }

    async fn insert_participant(
        &mut self,
        participant: NewParticipant,
    ) -> Result<StoredParticipant, LedgerError> {
        let model = game_participants::ActiveModel {
            id: Set(Uuid::new_v4()),
            game_id: Set(participant.game_id),
            user_id: Set(participant.user_id),
            initial_chips: Set(participant.initial_chips),
            total_rebuys_chips: Set(0),
            final_chips: Set(None),
            is_active: Set(true),
            net_balance_money: Set(None),
            created_at: Set(Utc::now()),
        };
        let inserted = model.insert(&self.txn).await?;
        Ok(stored_participant(inserted))
    }

    async fn load_participant(
        &mut self,
        game_id: GameId,
        user_id: UserId,
    ) -> Result<Option<StoredParticipant>, LedgerError> {
        let record = game_participants::Entity::find()
            .filter(game_participants::Column::GameId.eq(game_id))
            .filter(game_participants::Column::UserId.eq(user_id))
            .lock_exclusive()
            .one(&self.txn)
            .await?;
        Ok(record.map(stored_participant))
    }

    async fn load_participants(
        &mut self,
        game_id: GameId,
    ) -> Result<Vec<StoredParticipant>, LedgerError> {
        let records = game_participants::Entity::find()
            .filter(game_participants::Column::GameId.eq(game_id))
            .order_by_asc(game_participants::Column::CreatedAt)
            .order_by_asc(game_participants::Column::Id)
            .lock_exclusive()
            .all(&self.txn)
            .await?;
        Ok(records.into_iter().map(stored_participant).collect())
    }

    async fn update_participant(
        &mut self,
        participant: &StoredParticipant,
    ) -> Result<(), LedgerError> {
        let model = game_participants::ActiveModel {
            id: Unchanged(participant.id),
            initial_chips: Set(participant.initial_chips),
            total_rebuys_chips: Set(participant.total_rebuys_chips),
            final_chips: Set(participant.final_chips),
            is_active: Set(participant.is_active),
            net_balance_money: Set(participant.net_balance_money),
            ..Default::default()
        };
        model
            .update(&self.txn)
            .await
            .map_err(|err| missing_row(err, "participant", participant.id))?;
        Ok(())
    }

    async fn insert_transaction(
        &mut self,
        transaction: NewTransaction,
    ) -> Result<StoredTransaction, LedgerError> {
        let model = game_transactions::ActiveModel {
            id: Set(Uuid::new_v4()),
            game_id: Set(transaction.game_id),
            user_id: Set(transaction.user_id),
            kind: Set(DbTransactionType::from(transaction.kind)),
            amount_chips: Set(transaction.amount_chips),
            amount_money: Set(transaction.amount_money),
            created_at: Set(Utc::now()),
        };
        let inserted = model.insert(&self.txn).await?;
        Ok(stored_transaction(inserted))
    }

    async fn load_transactions(
        &mut self,
        game_id: GameId,
    ) -> Result<Vec<StoredTransaction>, LedgerError> {
        let records = game_transactions::Entity::find()
            .filter(game_transactions::Column::GameId.eq(game_id))
            .order_by_asc(game_transactions::Column::CreatedAt)
            .all(&self.txn)
            .await?;
        Ok(records.into_iter().map(stored_transaction).collect())
    }

    async fn insert_settlement(
        &mut self,
        settlement: NewSettlement,
    ) -> Result<StoredSettlement, LedgerError> {
        let model = settlements::ActiveModel {
            id: Set(Uuid::new_v4()),
            from_user_id: Set(settlement.from_user_id),
            to_user_id: Set(settlement.to_user_id),
            amount: Set(settlement.amount),
            is_confirmed: Set(false),
            confirmed_at: Set(None),
            created_at: Set(Utc::now()),
        };
        let inserted = model.insert(&self.txn).await?;
        Ok(stored_settlement(inserted))
    }

    async fn load_settlement(
        &mut self,
        id: SettlementId,
    ) -> Result<Option<StoredSettlement>, LedgerError> {
        let record = settlements::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&self.txn)
            .await?;
        Ok(record.map(stored_settlement))
    }

    async fn load_settlements(&mut self) -> Result<Vec<StoredSettlement>, LedgerError> {
        let records = settlements::Entity::find()
            .order_by_asc(settlements::Column::CreatedAt)
            .all(&self.txn)
            .await?;
        Ok(records.into_iter().map(stored_settlement).collect())
    }

    async fn mark_settlement_confirmed(
        &mut self,
        id: SettlementId,
        confirmed_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let model = settlements::ActiveModel {
            id: Unchanged(id),
            is_confirmed: Set(true),
            confirmed_at: Set(Some(confirmed_at)),
            ..Default::default()
        };
        model
            .update(&self.txn)
            .await
            .map_err(|err| missing_row(err, "settlement", id))?;
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), LedgerError> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) {
        let _ = self.txn.rollback().await;
    }
}

fn missing_row(err: DbErr, table: &str, id: Uuid) -> LedgerError {
    match err {
        DbErr::RecordNotUpdated => {
            LedgerError::integrity(format!("update for missing {table} {id}"))
        }
        other => LedgerError::Database(other),
    }
}

fn stored_user(model: users::Model) -> StoredUser {
    StoredUser {
        id: model.id,
        name: model.name,
        total_net_balance_money: model.total_net_balance_money,
        created_at: model.created_at,
    }
}

fn stored_game(model: games::Model) -> StoredGame {
    StoredGame {
        id: model.id,
        host_id: model.host_id,
        chips_per_player: model.chips_per_player,
        multiplier: model.multiplier,
        pot_chips: model.pot_chips,
        status: model.status.into(),
        created_at: model.created_at,
    }
}

fn stored_participant(model: game_participants::Model) -> StoredParticipant {
    StoredParticipant {
        id: model.id,
        game_id: model.game_id,
        user_id: model.user_id,
        initial_chips: model.initial_chips,
        total_rebuys_chips: model.total_rebuys_chips,
        final_chips: model.final_chips,
        is_active: model.is_active,
        net_balance_money: model.net_balance_money,
        created_at: model.created_at,
    }
}

fn stored_transaction(model: game_transactions::Model) -> StoredTransaction {
    StoredTransaction {
        id: model.id,
        game_id: model.game_id,
        user_id: model.user_id,
        kind: model.kind.into(),
        amount_chips: model.amount_chips,
        amount_money: model.amount_money,
        created_at: model.created_at,
    }
}

fn stored_settlement(model: settlements::Model) -> StoredSettlement {
    StoredSettlement {
        id: model.id,
        from_user_id: model.from_user_id,
        to_user_id: model.to_user_id,
        amount: model.amount,
        is_confirmed: model.is_confirmed,
        confirmed_at: model.confirmed_at,
        created_at: model.created_at,
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::time::Duration as StdDuration;

    use anyhow::Result;
    use sea_orm::{ConnectOptions, Database};

    use crate::config::LedgerConfig;
    use crate::db;
    use crate::ledger::lifecycle::{FinalChips, LifecycleService};
    use crate::ledger::storage::{LedgerStorage, LedgerStorageTxn, NewParticipant};
    use crate::ledger::types::GameStatus;
    use crate::ledger::{LedgerError, LedgerServiceFactory, StoredUser};

    async fn setup_ledger() -> Result<Option<LedgerServiceFactory>> {
        let Ok(url) = env::var("LEDGER_TEST_DATABASE_URL") else {
            eprintln!("skipping postgres ledger test: LEDGER_TEST_DATABASE_URL not set");
            return Ok(None);
        };

        let mut opt = ConnectOptions::new(url);
        opt.max_connections(5)
            .min_connections(1)
            .connect_timeout(StdDuration::from_secs(5))
            .sqlx_logging(false);

        let conn = match Database::connect(opt).await {
            Ok(conn) => conn,
            Err(err) => {
                eprintln!("skipping postgres ledger test: failed to connect ({err})");
                return Ok(None);
            }
        };
        db::ensure_schema(&conn).await?;
        Ok(Some(LedgerServiceFactory::from_sea_orm(
            conn,
            LedgerConfig::default(),
        )?))
    }

    async fn user(ledger: &LedgerServiceFactory, name: &str) -> Result<StoredUser> {
        let id = uuid::Uuid::new_v4();
        Ok(ledger
            .ensure_user(id, &format!("{id}@example.com"), Some(name))
            .await?)
    }

    #[tokio::test]
    async fn game_round_trips_through_postgres() -> Result<()> {
        let Some(ledger) = setup_ledger().await? else {
            return Ok(());
        };
        let host = user(&ledger, "Host").await?;
        let alice = user(&ledger, "Alice").await?;
        let bob = user(&ledger, "Bob").await?;

        let game = ledger.create_game(host.id, 1000, Some(5)).await?;
        ledger.join_game(game.id, alice.id).await?;
        ledger.join_game(game.id, bob.id).await?;
        ledger.start_game(game.id, host.id).await?;
        ledger.rebuy(game.id, alice.id, 500).await?;

        let finals = FinalChips::from([(alice.id, 2000), (bob.id, 800)]);
        let closed = ledger.end_game(game.id, host.id, &finals).await?;
        assert_eq!(closed.game.status, GameStatus::Ended);

        let details = ledger.game_details(game.id).await?;
        assert_eq!(details.game.pot_chips, 2500);
        assert_eq!(details.transactions.len(), 5);
        assert!((ledger.user(alice.id).await?.total_net_balance_money - 100.0).abs() < 1e-9);
        assert!((ledger.user(bob.id).await?.total_net_balance_money + 40.0).abs() < 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn failed_end_is_rolled_back_in_postgres() -> Result<()> {
        let Some(ledger) = setup_ledger().await? else {
            return Ok(());
        };
        let host = user(&ledger, "Host").await?;
        let alice = user(&ledger, "Alice").await?;
        let bob = user(&ledger, "Bob").await?;

        let hosted = ledger.host_game(host.id, 100, None).await?;
        ledger.enter_game(hosted.game.id, alice.id, None).await?;
        ledger.start_game(hosted.game.id, host.id).await?;
        ledger.enter_game(hosted.game.id, bob.id, Some(100)).await?;

        let partial = FinalChips::from([(host.id, 150), (alice.id, 50)]);
        let err = ledger
            .end_game(hosted.game.id, host.id, &partial)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::MissingFinalChips { .. }));

        let details = ledger.game_details(hosted.game.id).await?;
        assert_eq!(details.game.status, GameStatus::Active);
        assert!(details.participants.iter().all(|p| p.participant.is_active));
        assert_eq!(ledger.user(host.id).await?.total_net_balance_money, 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_seat_is_rejected_by_postgres() -> Result<()> {
        let Some(ledger) = setup_ledger().await? else {
            return Ok(());
        };
        let host = user(&ledger, "Host").await?;
        let hosted = ledger.host_game(host.id, 100, None).await?;

        let mut txn = ledger.storage.begin().await?;
        let err = txn
            .insert_participant(NewParticipant {
                game_id: hosted.game.id,
                user_id: host.id,
                initial_chips: 0,
            })
            .await
            .unwrap_err();
        txn.rollback().await;
        assert!(matches!(err, LedgerError::Database(_)));

        let details = ledger.game_details(hosted.game.id).await?;
        assert_eq!(details.participants.len(), 1);
        Ok(())
    }
}

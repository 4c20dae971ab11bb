use anyhow::Result;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::info;

pub mod entity;

use entity::{game_participants, game_transactions, games, settlements, users};

const LOG_TARGET: &str = "chip_ledger::db";

pub async fn connect_to(url: &str) -> Result<DatabaseConnection> {
    let conn = Database::connect(url).await?;
    info!(target: LOG_TARGET, "connected to ledger database");
    Ok(conn)
}

/// Create the ledger tables from the entity definitions if they are missing.
pub async fn ensure_schema(conn: &DatabaseConnection) -> Result<()> {
    create_table(conn, users::Entity).await?;
    create_table(conn, games::Entity).await?;
    create_table(conn, game_participants::Entity).await?;
    create_table(conn, game_transactions::Entity).await?;
    create_table(conn, settlements::Entity).await?;
    ensure_participant_seat_index(conn).await?;
    info!(target: LOG_TARGET, "ledger schema ready");
    Ok(())
}

async fn create_table<E>(conn: &DatabaseConnection, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let backend = conn.get_database_backend();
    let schema = Schema::new(backend);
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    conn.execute(backend.build(&statement)).await?;
    Ok(())
}

/// A user holds at most one seat per game.
async fn ensure_participant_seat_index(conn: &DatabaseConnection) -> Result<()> {
    let backend = conn.get_database_backend();
    let statement = Index::create()
        .name("game_participants_game_user_key")
        .table(game_participants::Entity)
        .col(game_participants::Column::GameId)
        .col(game_participants::Column::UserId)
        .unique()
        .if_not_exists()
        .to_owned();
    conn.execute(backend.build(&statement)).await?;
    Ok(())
}

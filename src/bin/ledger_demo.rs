use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use chip_ledger::db;
use chip_ledger::ledger::{
    FinalChips, LedgerServiceFactory, LifecycleService, SettlementService, StoredUser,
};
use chip_ledger::LedgerConfig;

const LOG_TARGET: &str = "bin::ledger_demo";

#[derive(Debug, Parser)]
#[command(name = "ledger_demo")]
#[command(about = "Play one home game through the ledger and print the balance sheet", long_about = None)]
struct Args {
    /// SeaORM-compatible Postgres URL. Runs against an in-memory store when unset.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Chips each seated player buys in with at start
    #[arg(long, default_value_t = 1000)]
    chips_per_player: i64,

    /// Chips per currency unit
    #[arg(long, default_value_t = 5)]
    multiplier: i64,

    /// Rebuy taken by the first player mid-game
    #[arg(long, default_value_t = 500)]
    rebuy: i64,

    /// Confirm every pending settlement after printing the sheet
    #[arg(long, default_value_t = false)]
    confirm: bool,

    /// Toggle structured (JSON) logs
    #[arg(long, env = "LEDGER_LOG_JSON", default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = Args::parse();
    init_tracing(args.json)?;
    let ledger = build_ledger(args.database_url.as_deref()).await?;
    run_game(&ledger, &args).await
}

fn load_dotenv() {
    let manifest_env = env!("CARGO_MANIFEST_DIR");
    let manifest_env_path = PathBuf::from(manifest_env).join(".env");
    dotenv::from_filename(manifest_env_path).ok();
    dotenv::dotenv().ok();
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::fmt().with_env_filter(filter).with_target(false);

    if json {
        builder.json().flatten_event(true).init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

async fn build_ledger(database_url: Option<&str>) -> Result<LedgerServiceFactory> {
    let Some(url) = database_url else {
        info!(target: LOG_TARGET, "DATABASE_URL not set; using in-memory store");
        return Ok(LedgerServiceFactory::in_memory());
    };
    let conn = db::connect_to(url)
        .await
        .context("failed to connect to ledger database")?;
    db::ensure_schema(&conn)
        .await
        .context("failed to prepare ledger schema")?;
    LedgerServiceFactory::from_sea_orm(conn, LedgerConfig::default())
        .context("invalid ledger config")
}

async fn register(ledger: &LedgerServiceFactory, name: &str) -> Result<StoredUser> {
    let email = format!("{}@example.com", name.to_lowercase());
    ledger
        .ensure_user(Uuid::new_v4(), &email, Some(name))
        .await
        .with_context(|| format!("failed to register {name}"))
}

async fn run_game(ledger: &LedgerServiceFactory, args: &Args) -> Result<()> {
    let host = register(ledger, "Host").await?;
    let alice = register(ledger, "Alice").await?;
    let bob = register(ledger, "Bob").await?;

    let hosted = ledger
        .host_game(host.id, args.chips_per_player, Some(args.multiplier))
        .await
        .context("failed to create game")?;
    let game_id = hosted.game.id;
    ledger.enter_game(game_id, alice.id, None).await?;
    ledger.enter_game(game_id, bob.id, None).await?;
    ledger
        .start_game(game_id, host.id)
        .await
        .context("failed to start game")?;
    ledger.rebuy(game_id, alice.id, args.rebuy).await?;

    // Alice takes Bob's stack and half the host's.
    let half = args.chips_per_player / 2;
    let finals = FinalChips::from([
        (host.id, args.chips_per_player - half),
        (alice.id, args.chips_per_player + args.rebuy + args.chips_per_player + half),
        (bob.id, 0),
    ]);
    let closed = ledger
        .end_game(game_id, host.id, &finals)
        .await
        .context("failed to end game")?;
    for payout in &closed.payouts {
        info!(
            target: LOG_TARGET,
            user_id = %payout.participant.user_id,
            net_chips = payout.net_chips,
            net_money = payout.net_money,
            "payout"
        );
    }

    let details = ledger.game_details(game_id).await?;
    println!("{}", serde_json::to_string_pretty(&details)?);

    let sheet = ledger.balance_sheet().await?;
    println!("{}", serde_json::to_string_pretty(&sheet)?);

    if args.confirm {
        for pending in &sheet.settlements {
            ledger
                .confirm_settlement(pending.id, pending.to_user_id)
                .await
                .with_context(|| format!("failed to confirm settlement {}", pending.id))?;
        }
        let settled = ledger.balance_sheet().await?;
        println!("{}", serde_json::to_string_pretty(&settled)?);
    }
    Ok(())
}

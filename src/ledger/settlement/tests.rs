use anyhow::Result;
use uuid::Uuid;

use super::service::SettlementService;
use crate::ledger::error::LedgerError;
use crate::ledger::lifecycle::{FinalChips, LifecycleService};
use crate::ledger::storage::{LedgerStorage, LedgerStorageTxn, StoredSettlement, StoredUser};
use crate::test_utils::{assert_money_eq, TestLedger};

struct Settled {
    t: TestLedger,
    alice: StoredUser,
    bob: StoredUser,
    carol: StoredUser,
}

/// Alice +220, Bob -100, Carol -120 after one conserving game.
async fn settled_game() -> Result<Settled> {
    let t = TestLedger::new();
    let host = t.user("Host").await?;
    let alice = t.user("Alice").await?;
    let bob = t.user("Bob").await?;
    let carol = t.user("Carol").await?;

    let game = t.ledger.create_game(host.id, 1000, Some(5)).await?;
    for user in [&alice, &bob, &carol] {
        t.ledger.join_game(game.id, user.id).await?;
    }
    t.ledger.start_game(game.id, host.id).await?;
    let finals = FinalChips::from([(alice.id, 2100), (bob.id, 500), (carol.id, 400)]);
    t.ledger.end_game(game.id, host.id, &finals).await?;
    Ok(Settled {
        t,
        alice,
        bob,
        carol,
    })
}

async fn stored_settlements(t: &TestLedger) -> Result<Vec<StoredSettlement>> {
    let mut txn = t.storage.begin().await?;
    let rows = txn.load_settlements().await?;
    txn.rollback().await;
    Ok(rows)
}

async fn balance_sum(t: &TestLedger) -> Result<f64> {
    let sheet = t.ledger.balance_sheet().await?;
    Ok(sheet.balances.iter().map(|b| b.amount).sum())
}

#[tokio::test]
async fn scenario_yields_single_transfer() -> Result<()> {
    let t = TestLedger::new();
    let host = t.user("Host").await?;
    let alice = t.user("Alice").await?;
    let bob = t.user("Bob").await?;
    let game = t.ledger.create_game(host.id, 1000, Some(5)).await?;
    t.ledger.join_game(game.id, alice.id).await?;
    t.ledger.join_game(game.id, bob.id).await?;
    t.ledger.start_game(game.id, host.id).await?;
    t.ledger.rebuy(game.id, alice.id, 500).await?;
    let finals = FinalChips::from([(alice.id, 2000), (bob.id, 800)]);
    t.ledger.end_game(game.id, host.id, &finals).await?;

    let sheet = t.ledger.balance_sheet().await?;
    let names: Vec<_> = sheet.balances.iter().map(|b| b.user_name.as_str()).collect();
    assert_eq!(names, vec!["Alice", "Bob", "Host"]);

    assert_eq!(sheet.settlements.len(), 1);
    let transfer = &sheet.settlements[0];
    assert_eq!(transfer.from_user_id, alice.id);
    assert_eq!(transfer.from_name, "Alice");
    assert_eq!(transfer.to_user_id, bob.id);
    assert_money_eq(transfer.amount, 40.0);
    Ok(())
}

#[tokio::test]
async fn reconciliation_is_idempotent() -> Result<()> {
    let s = settled_game().await?;
    let first = s.t.ledger.balance_sheet().await?;
    let second = s.t.ledger.balance_sheet().await?;
    assert_eq!(first.settlements.len(), 2);
    assert_eq!(first, second);
    assert_eq!(stored_settlements(&s.t).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn settlements_cover_every_debt() -> Result<()> {
    let s = settled_game().await?;
    let sheet = s.t.ledger.balance_sheet().await?;

    let paid_by_alice: f64 = sheet
        .settlements
        .iter()
        .filter(|p| p.from_user_id == s.alice.id)
        .map(|p| p.amount)
        .sum();
    assert_money_eq(paid_by_alice, 220.0);

    let to_carol = sheet
        .settlements
        .iter()
        .find(|p| p.to_user_id == s.carol.id)
        .expect("carol is owed");
    assert_money_eq(to_carol.amount, 120.0);
    assert_money_eq(balance_sum(&s.t).await?, 0.0);
    Ok(())
}

#[tokio::test]
async fn only_the_recipient_confirms() -> Result<()> {
    let s = settled_game().await?;
    let sheet = s.t.ledger.balance_sheet().await?;
    let to_bob = sheet
        .settlements
        .iter()
        .find(|p| p.to_user_id == s.bob.id)
        .expect("bob is owed")
        .clone();

    assert!(matches!(
        s.t.ledger.confirm_settlement(to_bob.id, s.alice.id).await,
        Err(LedgerError::NotAuthorized { .. })
    ));
    assert!(matches!(
        s.t.ledger.confirm_settlement(Uuid::new_v4(), s.bob.id).await,
        Err(LedgerError::NotFound("settlement"))
    ));
    Ok(())
}

#[tokio::test]
async fn confirm_is_one_shot() -> Result<()> {
    let s = settled_game().await?;
    let sheet = s.t.ledger.balance_sheet().await?;
    let to_carol = sheet
        .settlements
        .iter()
        .find(|p| p.to_user_id == s.carol.id)
        .expect("carol is owed")
        .clone();

    let confirmed = s
        .t
        .ledger
        .confirm_settlement(to_carol.id, s.carol.id)
        .await?;
    assert!(confirmed.is_confirmed);
    assert!(confirmed.confirmed_at.is_some());

    let alice_after = s.t.ledger.user(s.alice.id).await?.total_net_balance_money;
    let carol_after = s.t.ledger.user(s.carol.id).await?.total_net_balance_money;
    assert_money_eq(alice_after, 100.0);
    assert_money_eq(carol_after, 0.0);

    let err = s
        .t
        .ledger
        .confirm_settlement(to_carol.id, s.carol.id)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyConfirmed(id) if id == to_carol.id));
    assert_money_eq(
        s.t.ledger.user(s.alice.id).await?.total_net_balance_money,
        alice_after,
    );
    assert_money_eq(
        s.t.ledger.user(s.carol.id).await?.total_net_balance_money,
        carol_after,
    );
    assert_money_eq(balance_sum(&s.t).await?, 0.0);
    Ok(())
}

#[tokio::test]
async fn confirmed_rows_drop_out_and_pending_rows_are_reused() -> Result<()> {
    let s = settled_game().await?;
    let before = s.t.ledger.balance_sheet().await?;
    let to_carol = before
        .settlements
        .iter()
        .find(|p| p.to_user_id == s.carol.id)
        .expect("carol is owed")
        .clone();
    let to_bob = before
        .settlements
        .iter()
        .find(|p| p.to_user_id == s.bob.id)
        .expect("bob is owed")
        .clone();
    s.t.ledger
        .confirm_settlement(to_carol.id, s.carol.id)
        .await?;

    let after = s.t.ledger.balance_sheet().await?;
    assert_eq!(after.settlements.len(), 1);
    assert_eq!(after.settlements[0].id, to_bob.id);
    assert_eq!(stored_settlements(&s.t).await?.len(), 2);

    s.t.ledger.confirm_settlement(to_bob.id, s.bob.id).await?;
    let cleared = s.t.ledger.balance_sheet().await?;
    assert!(cleared.settlements.is_empty());
    assert!(cleared.balances.iter().all(|b| b.amount.abs() < 1e-9));
    Ok(())
}

async fn play_even_split(t: &TestLedger, host: &StoredUser, guest: &StoredUser) -> Result<()> {
    let hosted = t.ledger.host_game(host.id, 100, Some(1)).await?;
    let game_id = hosted.game.id;
    t.ledger.join_game(game_id, guest.id).await?;
    t.ledger.start_game(game_id, host.id).await?;
    let finals = FinalChips::from([(host.id, 110), (guest.id, 90)]);
    t.ledger.end_game(game_id, host.id, &finals).await?;
    Ok(())
}

#[tokio::test]
async fn repeat_game_debt_is_surfaced_after_confirm() -> Result<()> {
    let t = TestLedger::new();
    let host = t.user("Host").await?;
    let guest = t.user("Guest").await?;

    play_even_split(&t, &host, &guest).await?;
    let first = t.ledger.balance_sheet().await?;
    assert_eq!(first.settlements.len(), 1);
    let first_transfer = first.settlements[0].clone();
    assert_eq!(first_transfer.from_user_id, host.id);
    assert_eq!(first_transfer.to_user_id, guest.id);
    assert_money_eq(first_transfer.amount, 10.0);
    t.ledger
        .confirm_settlement(first_transfer.id, guest.id)
        .await?;

    play_even_split(&t, &host, &guest).await?;
    let second = t.ledger.balance_sheet().await?;
    assert_eq!(second.settlements.len(), 1);
    let second_transfer = second.settlements[0].clone();
    assert_ne!(second_transfer.id, first_transfer.id);
    assert_eq!(second_transfer.from_user_id, host.id);
    assert_money_eq(second_transfer.amount, 10.0);
    assert_eq!(stored_settlements(&t).await?.len(), 2);

    t.ledger
        .confirm_settlement(second_transfer.id, guest.id)
        .await?;
    assert_money_eq(t.ledger.user(host.id).await?.total_net_balance_money, 0.0);
    assert_money_eq(t.ledger.user(guest.id).await?.total_net_balance_money, 0.0);
    assert!(t.ledger.balance_sheet().await?.settlements.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_confirms_apply_once() -> Result<()> {
    let s = settled_game().await?;
    let sheet = s.t.ledger.balance_sheet().await?;
    let to_carol = sheet
        .settlements
        .iter()
        .find(|p| p.to_user_id == s.carol.id)
        .expect("carol is owed")
        .clone();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ledger = s.t.ledger.clone();
            let carol_id = s.carol.id;
            tokio::spawn(async move { ledger.confirm_settlement(to_carol.id, carol_id).await })
        })
        .collect();

    let mut confirmed = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await? {
            Ok(settlement) => {
                assert!(settlement.is_confirmed);
                confirmed += 1;
            }
            Err(LedgerError::AlreadyConfirmed(id)) if id == to_carol.id => rejected += 1,
            Err(err) => return Err(err.into()),
        }
    }
    assert_eq!(confirmed, 1);
    assert_eq!(rejected, 7);

    assert_money_eq(
        s.t.ledger.user(s.alice.id).await?.total_net_balance_money,
        100.0,
    );
    assert_money_eq(s.t.ledger.user(s.carol.id).await?.total_net_balance_money, 0.0);
    assert_money_eq(balance_sum(&s.t).await?, 0.0);
    Ok(())
}

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::ledger::accounting::{chips_to_money, exit_balance};
use crate::ledger::error::LedgerError;
use crate::ledger::service::{finish_txn, load_game, load_user, LedgerServiceFactory};
use crate::ledger::storage::{
    LedgerStorageTxn, NewGame, NewParticipant, NewTransaction, StoredGame, StoredParticipant,
};
use crate::ledger::types::{Chips, GameId, GameStatus, TransactionKind, UserId};

use super::types::{
    FinalChips, GameClosed, GameDetails, GameSummary, HostedGame, ParticipantExit,
    ParticipantView, TransactionView,
};
use super::validation::{
    advance_status, ensure_final_chips, ensure_host, ensure_min_players, ensure_non_negative_chips,
    ensure_participant_active, ensure_positive_chips, ensure_status,
};

const LOG_TARGET: &str = "chip_ledger::ledger::lifecycle";
const UNKNOWN_USER_NAME: &str = "Unknown";

/// Game state machine: `pending -> active -> ended`. Every call runs in a
/// single store transaction, so batch transitions (`start_game`, `end_game`)
/// either apply to every participant or to none.
#[async_trait]
pub trait LifecycleService: Send + Sync {
    /// Create a pending game with an empty pot. The host is not seated.
    async fn create_game(
        &self,
        host_id: UserId,
        chips_per_player: Chips,
        multiplier: Option<Chips>,
    ) -> Result<StoredGame, LedgerError>;

    /// Create a game and seat the host with a placeholder participant.
    async fn host_game(
        &self,
        host_id: UserId,
        chips_per_player: Chips,
        multiplier: Option<Chips>,
    ) -> Result<HostedGame, LedgerError>;

    async fn join_game(
        &self,
        game_id: GameId,
        user_id: UserId,
    ) -> Result<StoredParticipant, LedgerError>;

    async fn join_mid_game(
        &self,
        game_id: GameId,
        user_id: UserId,
        buy_in_chips: Chips,
    ) -> Result<StoredParticipant, LedgerError>;

    /// `join_game` for pending games, `join_mid_game` for active ones.
    async fn enter_game(
        &self,
        game_id: GameId,
        user_id: UserId,
        buy_in_chips: Option<Chips>,
    ) -> Result<StoredParticipant, LedgerError>;

    async fn start_game(&self, game_id: GameId, caller_id: UserId)
        -> Result<StoredGame, LedgerError>;

    async fn rebuy(
        &self,
        game_id: GameId,
        user_id: UserId,
        chip_amount: Chips,
    ) -> Result<StoredParticipant, LedgerError>;

    async fn leave_game(
        &self,
        game_id: GameId,
        user_id: UserId,
        current_chips: Chips,
    ) -> Result<ParticipantExit, LedgerError>;

    async fn end_game(
        &self,
        game_id: GameId,
        caller_id: UserId,
        final_chips: &FinalChips,
    ) -> Result<GameClosed, LedgerError>;

    async fn game_details(&self, game_id: GameId) -> Result<GameDetails, LedgerError>;

    async fn list_games(&self) -> Result<Vec<GameSummary>, LedgerError>;
}

#[async_trait]
impl LifecycleService for LedgerServiceFactory {
    #[instrument(skip_all, level = "info", target = LOG_TARGET, fields(host_id = %host_id))]
    async fn create_game(
        &self,
        host_id: UserId,
        chips_per_player: Chips,
        multiplier: Option<Chips>,
    ) -> Result<StoredGame, LedgerError> {
        let multiplier = multiplier.unwrap_or(self.config.default_multiplier);
        let mut txn = self.storage.begin().await?;
        let result = insert_game(txn.as_mut(), host_id, chips_per_player, multiplier).await;
        finish_txn(txn, result).await
    }

    #[instrument(skip_all, level = "info", target = LOG_TARGET, fields(host_id = %host_id))]
    async fn host_game(
        &self,
        host_id: UserId,
        chips_per_player: Chips,
        multiplier: Option<Chips>,
    ) -> Result<HostedGame, LedgerError> {
        let multiplier = multiplier.unwrap_or(self.config.default_multiplier);
        let mut txn = self.storage.begin().await?;
        let result: Result<HostedGame, LedgerError> = async {
            let game = insert_game(txn.as_mut(), host_id, chips_per_player, multiplier).await?;
            let host = seat_pending(txn.as_mut(), &game, host_id).await?;
            Ok(HostedGame { game, host })
        }
        .await;
        finish_txn(txn, result).await
    }

    #[instrument(skip_all, level = "info", target = LOG_TARGET, fields(game_id = %game_id, user_id = %user_id))]
    async fn join_game(
        &self,
        game_id: GameId,
        user_id: UserId,
    ) -> Result<StoredParticipant, LedgerError> {
        let mut txn = self.storage.begin().await?;
        let result: Result<StoredParticipant, LedgerError> = async {
            let game = load_game(txn.as_mut(), game_id).await?;
            ensure_status(&game, GameStatus::Pending, "join")?;
            seat_pending(txn.as_mut(), &game, user_id).await
        }
        .await;
        finish_txn(txn, result).await
    }

    #[instrument(skip_all, level = "info", target = LOG_TARGET, fields(game_id = %game_id, user_id = %user_id))]
    async fn join_mid_game(
        &self,
        game_id: GameId,
        user_id: UserId,
        buy_in_chips: Chips,
    ) -> Result<StoredParticipant, LedgerError> {
        ensure_positive_chips(buy_in_chips, "buy-in chips")?;
        let mut txn = self.storage.begin().await?;
        let result: Result<StoredParticipant, LedgerError> = async {
            let mut game = load_game(txn.as_mut(), game_id).await?;
            ensure_status(&game, GameStatus::Active, "join mid-game")?;
            seat_mid_game(txn.as_mut(), &mut game, user_id, buy_in_chips).await
        }
        .await;
        finish_txn(txn, result).await
    }

    #[instrument(skip_all, level = "info", target = LOG_TARGET, fields(game_id = %game_id, user_id = %user_id))]
    async fn enter_game(
        &self,
        game_id: GameId,
        user_id: UserId,
        buy_in_chips: Option<Chips>,
    ) -> Result<StoredParticipant, LedgerError> {
        let mut txn = self.storage.begin().await?;
        let result: Result<StoredParticipant, LedgerError> = async {
            let mut game = load_game(txn.as_mut(), game_id).await?;
            match game.status {
                GameStatus::Pending => seat_pending(txn.as_mut(), &game, user_id).await,
                GameStatus::Active => {
                    let buy_in = buy_in_chips.ok_or_else(|| {
                        LedgerError::invalid_amount("buy-in chips are required for active games")
                    })?;
                    ensure_positive_chips(buy_in, "buy-in chips")?;
                    seat_mid_game(txn.as_mut(), &mut game, user_id, buy_in).await
                }
                GameStatus::Ended => Err(LedgerError::InvalidState {
                    game_id,
                    status: game.status,
                    action: "join",
                }),
            }
        }
        .await;
        finish_txn(txn, result).await
    }

    #[instrument(skip_all, level = "info", target = LOG_TARGET, fields(game_id = %game_id, caller_id = %caller_id))]
    async fn start_game(
        &self,
        game_id: GameId,
        caller_id: UserId,
    ) -> Result<StoredGame, LedgerError> {
        let min_players = self.config.min_players_to_start;
        let mut txn = self.storage.begin().await?;
        let result: Result<StoredGame, LedgerError> = async {
            let mut game = load_game(txn.as_mut(), game_id).await?;
            ensure_host(&game, caller_id, "start game")?;
            ensure_status(&game, GameStatus::Pending, "start")?;

            let seated: Vec<StoredParticipant> = txn
                .load_participants(game_id)
                .await?
                .into_iter()
                .filter(|p| p.is_active)
                .collect();
            ensure_min_players(min_players, seated.len())?;

            let count = Chips::try_from(seated.len())
                .map_err(|_| LedgerError::invalid_amount("participant count overflows chips"))?;
            let pot = game
                .chips_per_player
                .checked_mul(count)
                .ok_or_else(|| LedgerError::invalid_amount("pot overflows chip range"))?;

            for mut participant in seated {
                participant.initial_chips = -game.chips_per_player;
                txn.update_participant(&participant).await?;
                record_transaction(
                    txn.as_mut(),
                    &game,
                    participant.user_id,
                    TransactionKind::BuyIn,
                    game.chips_per_player,
                )
                .await?;
            }

            game.pot_chips = pot;
            advance_status(&mut game, GameStatus::Active)?;
            txn.update_game(&game).await?;
            info!(target: LOG_TARGET, players = count, pot_chips = pot, "game started");
            Ok(game)
        }
        .await;
        finish_txn(txn, result).await
    }

    #[instrument(skip_all, level = "info", target = LOG_TARGET, fields(game_id = %game_id, user_id = %user_id))]
    async fn rebuy(
        &self,
        game_id: GameId,
        user_id: UserId,
        chip_amount: Chips,
    ) -> Result<StoredParticipant, LedgerError> {
        ensure_positive_chips(chip_amount, "rebuy amount")?;
        let mut txn = self.storage.begin().await?;
        let result: Result<StoredParticipant, LedgerError> = async {
            let mut game = load_game(txn.as_mut(), game_id).await?;
            let mut participant = load_participant(txn.as_mut(), game_id, user_id).await?;
            ensure_participant_active(&game, &participant)?;

            participant.total_rebuys_chips = participant
                .total_rebuys_chips
                .checked_add(chip_amount)
                .ok_or_else(|| LedgerError::invalid_amount("rebuys overflow chip range"))?;
            txn.update_participant(&participant).await?;

            add_to_pot(&mut game, chip_amount)?;
            txn.update_game(&game).await?;

            record_transaction(
                txn.as_mut(),
                &game,
                user_id,
                TransactionKind::Rebuy,
                chip_amount,
            )
            .await?;
            info!(
                target: LOG_TARGET,
                chip_amount,
                pot_chips = game.pot_chips,
                "rebuy recorded"
            );
            Ok(participant)
        }
        .await;
        finish_txn(txn, result).await
    }

    #[instrument(skip_all, level = "info", target = LOG_TARGET, fields(game_id = %game_id, user_id = %user_id))]
    async fn leave_game(
        &self,
        game_id: GameId,
        user_id: UserId,
        current_chips: Chips,
    ) -> Result<ParticipantExit, LedgerError> {
        ensure_non_negative_chips(current_chips, "current chips")?;
        let mut txn = self.storage.begin().await?;
        let result: Result<ParticipantExit, LedgerError> = async {
            let game = load_game(txn.as_mut(), game_id).await?;
            let participant = load_participant(txn.as_mut(), game_id, user_id).await?;
            ensure_participant_active(&game, &participant)?;

            // Chips stay in the pot until the game ends.
            let exit = settle_exit(
                txn.as_mut(),
                &game,
                participant,
                current_chips,
                TransactionKind::Leave,
            )
            .await?;
            info!(
                target: LOG_TARGET,
                net_chips = exit.net_chips,
                net_money = exit.net_money,
                "participant left"
            );
            Ok(exit)
        }
        .await;
        finish_txn(txn, result).await
    }

    #[instrument(skip_all, level = "info", target = LOG_TARGET, fields(game_id = %game_id, caller_id = %caller_id))]
    async fn end_game(
        &self,
        game_id: GameId,
        caller_id: UserId,
        final_chips: &FinalChips,
    ) -> Result<GameClosed, LedgerError> {
        let mut txn = self.storage.begin().await?;
        let result: Result<GameClosed, LedgerError> = async {
            let mut game = load_game(txn.as_mut(), game_id).await?;
            ensure_host(&game, caller_id, "end game")?;
            ensure_status(&game, GameStatus::Active, "end")?;

            let participants = txn.load_participants(game_id).await?;
            let (seated, departed): (Vec<_>, Vec<_>) =
                participants.into_iter().partition(|p| p.is_active);
            ensure_final_chips(&seated, final_chips)?;

            for user_id in final_chips.keys() {
                if !seated.iter().any(|p| p.user_id == *user_id) {
                    debug!(target: LOG_TARGET, %user_id, "ignoring final chips for unseated user");
                }
            }

            let mut payouts = Vec::with_capacity(seated.len());
            for participant in seated {
                let chips = final_chips
                    .get(&participant.user_id)
                    .copied()
                    .ok_or_else(|| LedgerError::MissingFinalChips {
                        users: vec![participant.user_id],
                    })?;
                let exit = settle_exit(
                    txn.as_mut(),
                    &game,
                    participant,
                    chips,
                    TransactionKind::Payout,
                )
                .await?;
                payouts.push(exit);
            }

            advance_status(&mut game, GameStatus::Ended)?;
            txn.update_game(&game).await?;

            let chips_out = departed
                .iter()
                .filter_map(|p| p.final_chips)
                .chain(payouts.iter().map(|exit| exit.participant.final_chips.unwrap_or(0)))
                .try_fold(0 as Chips, |total, chips| total.checked_add(chips));
            match chips_out {
                Some(chips_out) if chips_out == game.pot_chips => {}
                Some(chips_out) => warn!(
                    target: LOG_TARGET,
                    pot_chips = game.pot_chips,
                    chips_out,
                    "final chip counts do not match the pot"
                ),
                None => warn!(
                    target: LOG_TARGET,
                    pot_chips = game.pot_chips,
                    "final chip counts overflow the chip range"
                ),
            }
            info!(target: LOG_TARGET, payouts = payouts.len(), "game ended");
            Ok(GameClosed { game, payouts })
        }
        .await;
        finish_txn(txn, result).await
    }

    async fn game_details(&self, game_id: GameId) -> Result<GameDetails, LedgerError> {
        let mut txn = self.storage.begin().await?;
        let result: Result<GameDetails, LedgerError> = async {
            let game = load_game(txn.as_mut(), game_id).await?;
            let mut names = NameCache::default();
            let host_name = names.name_of(txn.as_mut(), game.host_id).await?;

            let mut participants = Vec::new();
            for participant in txn.load_participants(game_id).await? {
                let user_name = names.name_of(txn.as_mut(), participant.user_id).await?;
                participants.push(ParticipantView {
                    participant,
                    user_name,
                });
            }

            let mut transactions = Vec::new();
            for transaction in txn.load_transactions(game_id).await? {
                let user_name = names.name_of(txn.as_mut(), transaction.user_id).await?;
                transactions.push(TransactionView {
                    transaction,
                    user_name,
                });
            }

            Ok(GameDetails {
                game,
                host_name,
                participants,
                transactions,
            })
        }
        .await;
        finish_txn(txn, result).await
    }

    async fn list_games(&self) -> Result<Vec<GameSummary>, LedgerError> {
        let mut txn = self.storage.begin().await?;
        let result: Result<Vec<GameSummary>, LedgerError> = async {
            let mut names = NameCache::default();
            let mut summaries = Vec::new();
            for game in txn.load_games().await? {
                let participants = txn.load_participants(game.id).await?;
                let host_name = names.name_of(txn.as_mut(), game.host_id).await?;
                summaries.push(GameSummary {
                    host_name,
                    participant_count: participants.len(),
                    active_count: participants.iter().filter(|p| p.is_active).count(),
                    game,
                });
            }
            Ok(summaries)
        }
        .await;
        finish_txn(txn, result).await
    }
}

async fn insert_game(
    txn: &mut (dyn LedgerStorageTxn + Send),
    host_id: UserId,
    chips_per_player: Chips,
    multiplier: Chips,
) -> Result<StoredGame, LedgerError> {
    ensure_positive_chips(chips_per_player, "chips per player")?;
    ensure_positive_chips(multiplier, "multiplier")?;
    load_user(txn, host_id).await?;

    let game = txn
        .insert_game(NewGame {
            host_id,
            chips_per_player,
            multiplier,
        })
        .await?;
    info!(
        target: LOG_TARGET,
        game_id = %game.id,
        chips_per_player,
        multiplier,
        "game created"
    );
    Ok(game)
}

async fn load_participant(
    txn: &mut (dyn LedgerStorageTxn + Send),
    game_id: GameId,
    user_id: UserId,
) -> Result<StoredParticipant, LedgerError> {
    txn.load_participant(game_id, user_id)
        .await?
        .ok_or(LedgerError::NotFound("participant"))
}

async fn ensure_not_seated(
    txn: &mut (dyn LedgerStorageTxn + Send),
    game_id: GameId,
    user_id: UserId,
) -> Result<(), LedgerError> {
    if txn.load_participant(game_id, user_id).await?.is_some() {
        return Err(LedgerError::AlreadyJoined { game_id, user_id });
    }
    Ok(())
}

/// Seat a user before the game starts. The real buy-in is assigned by
/// `start_game`.
async fn seat_pending(
    txn: &mut (dyn LedgerStorageTxn + Send),
    game: &StoredGame,
    user_id: UserId,
) -> Result<StoredParticipant, LedgerError> {
    load_user(txn, user_id).await?;
    ensure_not_seated(txn, game.id, user_id).await?;
    let participant = txn
        .insert_participant(NewParticipant {
            game_id: game.id,
            user_id,
            initial_chips: 0,
        })
        .await?;
    info!(target: LOG_TARGET, game_id = %game.id, %user_id, "participant joined");
    Ok(participant)
}

async fn seat_mid_game(
    txn: &mut (dyn LedgerStorageTxn + Send),
    game: &mut StoredGame,
    user_id: UserId,
    buy_in_chips: Chips,
) -> Result<StoredParticipant, LedgerError> {
    load_user(txn, user_id).await?;
    ensure_not_seated(txn, game.id, user_id).await?;
    let participant = txn
        .insert_participant(NewParticipant {
            game_id: game.id,
            user_id,
            initial_chips: -buy_in_chips,
        })
        .await?;

    add_to_pot(game, buy_in_chips)?;
    txn.update_game(game).await?;
    record_transaction(txn, game, user_id, TransactionKind::BuyIn, buy_in_chips).await?;
    info!(
        target: LOG_TARGET,
        game_id = %game.id,
        %user_id,
        buy_in_chips,
        pot_chips = game.pot_chips,
        "participant joined mid-game"
    );
    Ok(participant)
}

/// Close out one participant: fix their final chips and net money, move the
/// money into the user's running balance and append the audit record.
async fn settle_exit(
    txn: &mut (dyn LedgerStorageTxn + Send),
    game: &StoredGame,
    mut participant: StoredParticipant,
    exit_chips: Chips,
    kind: TransactionKind,
) -> Result<ParticipantExit, LedgerError> {
    let balance = exit_balance(
        exit_chips,
        participant.initial_chips,
        participant.total_rebuys_chips,
        game.multiplier,
    );

    participant.final_chips = Some(exit_chips);
    participant.is_active = false;
    participant.net_balance_money = Some(balance.net_money);
    txn.update_participant(&participant).await?;
    txn.add_to_user_balance(participant.user_id, balance.net_money)
        .await?;
    record_transaction(txn, game, participant.user_id, kind, exit_chips).await?;

    Ok(ParticipantExit {
        participant,
        investment: balance.investment,
        net_chips: balance.net_chips,
        net_money: balance.net_money,
    })
}

async fn record_transaction(
    txn: &mut (dyn LedgerStorageTxn + Send),
    game: &StoredGame,
    user_id: UserId,
    kind: TransactionKind,
    amount_chips: Chips,
) -> Result<(), LedgerError> {
    txn.insert_transaction(NewTransaction {
        game_id: game.id,
        user_id,
        kind,
        amount_chips,
        amount_money: chips_to_money(amount_chips, game.multiplier),
    })
    .await?;
    Ok(())
}

fn add_to_pot(game: &mut StoredGame, chips: Chips) -> Result<(), LedgerError> {
    game.pot_chips = game
        .pot_chips
        .checked_add(chips)
        .ok_or_else(|| LedgerError::invalid_amount("pot overflows chip range"))?;
    Ok(())
}

#[derive(Default)]
struct NameCache {
    names: BTreeMap<UserId, String>,
}

impl NameCache {
    async fn name_of(
        &mut self,
        txn: &mut (dyn LedgerStorageTxn + Send),
        user_id: UserId,
    ) -> Result<String, LedgerError> {
        if let Some(name) = self.names.get(&user_id) {
            return Ok(name.clone());
        }
        let name = txn
            .load_user(user_id)
            .await?
            .map(|user| user.name)
            .unwrap_or_else(|| UNKNOWN_USER_NAME.to_string());
        self.names.insert(user_id, name.clone());
        Ok(name)
    }
}

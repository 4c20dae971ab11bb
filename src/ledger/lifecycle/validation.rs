use std::collections::BTreeMap;

use crate::config::LedgerConfig;
use crate::ledger::error::LedgerError;
use crate::ledger::storage::{StoredGame, StoredParticipant};
use crate::ledger::types::{Chips, GameStatus, UserId};

pub fn validate_ledger_config(cfg: &LedgerConfig) -> Result<(), LedgerError> {
    if cfg.default_multiplier < 1 {
        return Err(LedgerError::validation(
            "default_multiplier must be at least 1",
        ));
    }
    if cfg.min_players_to_start < 2 {
        return Err(LedgerError::validation(
            "min_players_to_start must be at least 2",
        ));
    }
    Ok(())
}

/// Buy-ins, rebuys and per-player chip allotments must be at least one chip.
pub fn ensure_positive_chips(amount: Chips, what: &str) -> Result<(), LedgerError> {
    if amount < 1 {
        return Err(LedgerError::invalid_amount(format!(
            "{what} must be at least 1, got {amount}"
        )));
    }
    Ok(())
}

/// Chip counts reported on exit may be zero but never negative.
pub fn ensure_non_negative_chips(amount: Chips, what: &str) -> Result<(), LedgerError> {
    if amount < 0 {
        return Err(LedgerError::invalid_amount(format!(
            "{what} cannot be negative, got {amount}"
        )));
    }
    Ok(())
}

pub fn ensure_host(
    game: &StoredGame,
    caller: UserId,
    action: &'static str,
) -> Result<(), LedgerError> {
    if game.host_id != caller {
        return Err(LedgerError::NotAuthorized { action });
    }
    Ok(())
}

pub fn ensure_status(
    game: &StoredGame,
    expected: GameStatus,
    action: &'static str,
) -> Result<(), LedgerError> {
    if game.status != expected {
        return Err(LedgerError::InvalidState {
            game_id: game.id,
            status: game.status,
            action,
        });
    }
    Ok(())
}

/// Rebuys and leaves need a running game and a seated participant.
pub fn ensure_participant_active(
    game: &StoredGame,
    participant: &StoredParticipant,
) -> Result<(), LedgerError> {
    if game.status != GameStatus::Active {
        return Err(LedgerError::NotActive("game"));
    }
    if !participant.is_active {
        return Err(LedgerError::NotActive("participant"));
    }
    Ok(())
}

/// Step `game` forward to `next`. Callers check the expected status first, so
/// a refused step means the stored row is corrupt.
pub fn advance_status(game: &mut StoredGame, next: GameStatus) -> Result<(), LedgerError> {
    if !game.status.can_transition_to(next) {
        return Err(LedgerError::integrity(format!(
            "game {} cannot move from {} to {next}",
            game.id, game.status
        )));
    }
    game.status = next;
    Ok(())
}

pub fn ensure_min_players(min_players: usize, active: usize) -> Result<(), LedgerError> {
    if active < min_players {
        return Err(LedgerError::InsufficientPlayers {
            required: min_players,
            found: active,
        });
    }
    Ok(())
}

/// Every active participant needs a non-negative final chip count.
pub fn ensure_final_chips(
    active: &[StoredParticipant],
    final_chips: &BTreeMap<UserId, Chips>,
) -> Result<(), LedgerError> {
    let mut missing: Vec<UserId> = active
        .iter()
        .filter(|p| !final_chips.contains_key(&p.user_id))
        .map(|p| p.user_id)
        .collect();
    if !missing.is_empty() {
        missing.sort();
        return Err(LedgerError::MissingFinalChips { users: missing });
    }
    for participant in active {
        if let Some(chips) = final_chips.get(&participant.user_id) {
            ensure_non_negative_chips(*chips, "final chips")?;
        }
    }
    Ok(())
}

use serde::{Deserialize, Serialize};

use crate::ledger::types::{Money, UserId, SETTLEMENT_EPSILON};
use crate::ledger::typestate::{DbRowStatus, NotSaved};

/// A user's signed running balance. Positive means the user owes the group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: UserId,
    pub user_name: String,
    pub amount: Money,
}

/// One transfer `from -> to`. `state` tracks whether a settlements row backs it.
#[derive(Clone, Debug, PartialEq)]
pub struct SettlementRecord<S>
where
    S: DbRowStatus,
{
    pub from_user_id: UserId,
    pub from_name: String,
    pub to_user_id: UserId,
    pub to_name: String,
    pub amount: Money,
    pub state: S,
}

impl<S: DbRowStatus> SettlementRecord<S> {
    pub fn with_state<T: DbRowStatus>(self, state: T) -> SettlementRecord<T> {
        SettlementRecord {
            from_user_id: self.from_user_id,
            from_name: self.from_name,
            to_user_id: self.to_user_id,
            to_name: self.to_name,
            amount: self.amount,
            state,
        }
    }
}

#[derive(Clone, Debug)]
struct Side {
    user_id: UserId,
    user_name: String,
    remaining: Money,
}

/// Greedy largest-pair-first debt minimization.
///
/// Balances within [`SETTLEMENT_EPSILON`] of zero are treated as settled.
/// Equal magnitudes are ordered by user id so the pairing is deterministic.
/// For `n` unsettled balances at most `n - 1` transfers are produced.
pub fn compute_settlements(balances: &[Balance]) -> Vec<SettlementRecord<NotSaved>> {
    let mut debtors = Vec::new();
    let mut creditors = Vec::new();
    for balance in balances {
        let side = |remaining| Side {
            user_id: balance.user_id,
            user_name: balance.user_name.clone(),
            remaining,
        };
        if balance.amount > SETTLEMENT_EPSILON {
            debtors.push(side(balance.amount));
        } else if balance.amount < -SETTLEMENT_EPSILON {
            creditors.push(side(-balance.amount));
        }
    }
    sort_largest_first(&mut debtors);
    sort_largest_first(&mut creditors);

    let mut settlements = Vec::new();
    let (mut d, mut c) = (0, 0);
    while d < debtors.len() && c < creditors.len() {
        let amount = debtors[d].remaining.min(creditors[c].remaining);
        settlements.push(SettlementRecord {
            from_user_id: debtors[d].user_id,
            from_name: debtors[d].user_name.clone(),
            to_user_id: creditors[c].user_id,
            to_name: creditors[c].user_name.clone(),
            amount,
            state: NotSaved,
        });

        debtors[d].remaining -= amount;
        creditors[c].remaining -= amount;
        if debtors[d].remaining < SETTLEMENT_EPSILON {
            d += 1;
        }
        if creditors[c].remaining < SETTLEMENT_EPSILON {
            c += 1;
        }
    }
    settlements
}

fn sort_largest_first(sides: &mut [Side]) {
    sides.sort_by(|a, b| {
        b.remaining
            .total_cmp(&a.remaining)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
}

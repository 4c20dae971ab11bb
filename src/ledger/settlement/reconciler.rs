use std::collections::HashSet;

use crate::ledger::storage::StoredSettlement;
use crate::ledger::types::{SettlementId, SETTLEMENT_EPSILON};
use crate::ledger::typestate::{DbRowStatus, MaybeSaved, NotSaved};

use super::calculator::SettlementRecord;

/// Outcome of matching freshly computed settlements against persisted rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Obligations still awaiting confirmation. `state.id` is `None` for
    /// pairs that have no row yet and must be inserted.
    pub pending: Vec<SettlementRecord<MaybeSaved<SettlementId>>>,
}

impl ReconcilePlan {
    pub fn inserts(&self) -> usize {
        self.pending.iter().filter(|s| s.state.id().is_none()).count()
    }
}

fn matches(computed: &SettlementRecord<NotSaved>, row: &StoredSettlement) -> bool {
    row.from_user_id == computed.from_user_id
        && row.to_user_id == computed.to_user_id
        && (row.amount - computed.amount).abs() < SETTLEMENT_EPSILON
}

/// Match each computed pair to at most one unconfirmed row.
///
/// Confirmed rows are history: their transfer is already in both balances, so
/// a pair computed afterwards is a new obligation and never matches one. A row
/// is never matched twice, so repeated identical pairs each get their own row.
pub fn reconcile(
    computed: Vec<SettlementRecord<NotSaved>>,
    existing: &[StoredSettlement],
) -> ReconcilePlan {
    let mut used: HashSet<SettlementId> = HashSet::new();
    let mut plan = ReconcilePlan::default();

    for settlement in computed {
        let row = existing.iter().find(|row| {
            !row.is_confirmed && !used.contains(&row.id) && matches(&settlement, row)
        });
        let id = row.map(|row| row.id);
        if let Some(id) = id {
            used.insert(id);
        }
        plan.pending.push(settlement.with_state(MaybeSaved { id }));
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::{Money, UserId};
    use chrono::Utc;
    use uuid::Uuid;

    fn computed(from: UserId, to: UserId, amount: Money) -> SettlementRecord<NotSaved> {
        SettlementRecord {
            from_user_id: from,
            from_name: "from".into(),
            to_user_id: to,
            to_name: "to".into(),
            amount,
            state: NotSaved,
        }
    }

    fn row(from: UserId, to: UserId, amount: Money, is_confirmed: bool) -> StoredSettlement {
        StoredSettlement {
            id: Uuid::new_v4(),
            from_user_id: from,
            to_user_id: to,
            amount,
            is_confirmed,
            confirmed_at: is_confirmed.then(Utc::now),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn unmatched_pairs_need_inserts() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let plan = reconcile(vec![computed(a, b, 40.0)], &[]);
        assert_eq!(plan.inserts(), 1);
    }

    #[test]
    fn pending_row_within_tolerance_is_reused() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let existing = row(a, b, 40.005, false);
        let plan = reconcile(vec![computed(a, b, 40.0)], &[existing.clone()]);
        assert_eq!(plan.inserts(), 0);
        assert_eq!(plan.pending[0].state.id, Some(existing.id));
    }

    #[test]
    fn direction_and_amount_must_both_match() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let rows = vec![row(b, a, 40.0, false), row(a, b, 40.02, false)];
        let plan = reconcile(vec![computed(a, b, 40.0)], &rows);
        assert_eq!(plan.inserts(), 1);
    }

    #[test]
    fn confirmed_rows_are_never_reused() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let confirmed = row(a, b, 40.0, true);
        let plan = reconcile(vec![computed(a, b, 40.0)], &[confirmed]);
        assert_eq!(plan.pending.len(), 1);
        assert_eq!(plan.inserts(), 1);
    }

    #[test]
    fn pending_row_is_picked_over_matching_confirmed_history() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let confirmed = row(a, b, 40.0, true);
        let pending = row(a, b, 40.0, false);
        let plan = reconcile(vec![computed(a, b, 40.0)], &[confirmed, pending.clone()]);
        assert_eq!(plan.pending.len(), 1);
        assert_eq!(plan.pending[0].state.id, Some(pending.id));
    }

    #[test]
    fn a_row_backs_at_most_one_computed_pair() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let existing = row(a, b, 10.0, false);
        let plan = reconcile(
            vec![computed(a, b, 10.0), computed(a, b, 10.0)],
            &[existing.clone()],
        );
        assert_eq!(plan.pending.len(), 2);
        assert_eq!(plan.pending[0].state.id, Some(existing.id));
        assert_eq!(plan.inserts(), 1);
    }
}

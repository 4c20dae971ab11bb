use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::ledger::error::LedgerError;
use crate::ledger::service::{finish_txn, LedgerServiceFactory};
use crate::ledger::storage::{LedgerStorageTxn, NewSettlement, StoredSettlement};
use crate::ledger::types::{Money, SettlementId, UserId};
use crate::ledger::typestate::{DbRowStatus, Saved};

use super::calculator::{compute_settlements, Balance, SettlementRecord};
use super::reconciler::reconcile;

const LOG_TARGET: &str = "chip_ledger::ledger::settlement";

/// An unconfirmed obligation backed by a settlements row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingSettlement {
    pub id: SettlementId,
    pub from_user_id: UserId,
    pub from_name: String,
    pub to_user_id: UserId,
    pub to_name: String,
    pub amount: Money,
}

impl From<SettlementRecord<Saved<SettlementId>>> for PendingSettlement {
    fn from(record: SettlementRecord<Saved<SettlementId>>) -> Self {
        Self {
            id: record.state.id(),
            from_user_id: record.from_user_id,
            from_name: record.from_name,
            to_user_id: record.to_user_id,
            to_name: record.to_name,
            amount: record.amount,
        }
    }
}

/// Every user's running balance (ordered by name) and the transfers that
/// would zero them out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub balances: Vec<Balance>,
    pub settlements: Vec<PendingSettlement>,
}

#[async_trait]
pub trait SettlementService: Send + Sync {
    /// Compute settlements from current balances and reconcile them with the
    /// persisted rows, inserting rows for new obligations.
    async fn balance_sheet(&self) -> Result<BalanceSheet, LedgerError>;

    /// Mark a settlement paid. Only the receiving user may confirm, and only
    /// once.
    async fn confirm_settlement(
        &self,
        settlement_id: SettlementId,
        caller_id: UserId,
    ) -> Result<StoredSettlement, LedgerError>;
}

#[async_trait]
impl SettlementService for LedgerServiceFactory {
    #[instrument(skip_all, level = "info", target = LOG_TARGET)]
    async fn balance_sheet(&self) -> Result<BalanceSheet, LedgerError> {
        let mut txn = self.storage.begin().await?;
        let result: Result<BalanceSheet, LedgerError> = async {
            let balances: Vec<Balance> = txn
                .load_users()
                .await?
                .into_iter()
                .map(|user| Balance {
                    user_id: user.id,
                    user_name: user.name,
                    amount: user.total_net_balance_money,
                })
                .collect();

            let computed = compute_settlements(&balances);
            let existing = txn.load_settlements().await?;
            let plan = reconcile(computed, &existing);
            let inserts = plan.inserts();
            debug!(
                target: LOG_TARGET,
                pending = plan.pending.len(),
                inserts,
                "reconciled settlements"
            );

            let mut settlements = Vec::with_capacity(plan.pending.len());
            for record in plan.pending {
                let id = match record.state.id() {
                    Some(id) => id,
                    None => {
                        txn.insert_settlement(NewSettlement {
                            from_user_id: record.from_user_id,
                            to_user_id: record.to_user_id,
                            amount: record.amount,
                        })
                        .await?
                        .id
                    }
                };
                settlements.push(PendingSettlement::from(record.with_state(Saved { id })));
            }

            if inserts > 0 {
                info!(target: LOG_TARGET, inserts, "recorded new pending settlements");
            }
            Ok(BalanceSheet {
                balances,
                settlements,
            })
        }
        .await;
        finish_txn(txn, result).await
    }

    #[instrument(
        skip_all,
        level = "info",
        target = LOG_TARGET,
        fields(settlement_id = %settlement_id, caller_id = %caller_id)
    )]
    async fn confirm_settlement(
        &self,
        settlement_id: SettlementId,
        caller_id: UserId,
    ) -> Result<StoredSettlement, LedgerError> {
        let mut txn = self.storage.begin().await?;
        let result: Result<StoredSettlement, LedgerError> = async {
            let mut settlement = txn
                .load_settlement(settlement_id)
                .await?
                .ok_or(LedgerError::NotFound("settlement"))?;
            if settlement.to_user_id != caller_id {
                return Err(LedgerError::NotAuthorized {
                    action: "confirm settlement",
                });
            }
            if settlement.is_confirmed {
                return Err(LedgerError::AlreadyConfirmed(settlement_id));
            }

            let confirmed_at = Utc::now();
            txn.mark_settlement_confirmed(settlement_id, confirmed_at)
                .await?;
            txn.add_to_user_balance(settlement.from_user_id, -settlement.amount)
                .await?;
            txn.add_to_user_balance(settlement.to_user_id, settlement.amount)
                .await?;

            settlement.is_confirmed = true;
            settlement.confirmed_at = Some(confirmed_at);
            info!(
                target: LOG_TARGET,
                from_user_id = %settlement.from_user_id,
                amount = settlement.amount,
                "settlement confirmed"
            );
            Ok(settlement)
        }
        .await;
        finish_txn(txn, result).await
    }
}

pub mod calculator;
pub mod reconciler;
pub mod service;
#[cfg(test)]
mod tests;

pub use calculator::{compute_settlements, Balance, SettlementRecord};
pub use reconciler::{reconcile, ReconcilePlan};
pub use service::{BalanceSheet, PendingSettlement, SettlementService};

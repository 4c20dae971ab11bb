pub mod config;
pub mod ledger;

pub mod db;

#[cfg(test)]
pub mod test_utils;

pub use config::LedgerConfig;

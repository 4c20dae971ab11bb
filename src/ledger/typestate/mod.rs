mod db_row_status;

pub use db_row_status::{DbRowStatus, MaybeSaved, NotSaved, Saved};

//! Persistence state carried by settlement records.
//!
//! A freshly computed settlement is `NotSaved`. The reconciler pairs it with
//! an unconfirmed row when one exists (`MaybeSaved`), and the balance sheet
//! only surfaces records that are backed by a row (`Saved`).

/// Row identity a record carries in its current state.
pub trait DbRowStatus {
    type DbId;

    fn id(&self) -> Self::DbId;
}

/// Computed in memory, no settlements row yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotSaved;

/// Backed by the settlements row `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Saved<Id> {
    pub id: Id,
}

/// Matched to a row when `id` is set, otherwise still to be inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaybeSaved<Id> {
    pub id: Option<Id>,
}

impl DbRowStatus for NotSaved {
    type DbId = ();

    fn id(&self) {}
}

impl<Id: Copy> DbRowStatus for Saved<Id> {
    type DbId = Id;

    fn id(&self) -> Id {
        self.id
    }
}

impl<Id: Copy> DbRowStatus for MaybeSaved<Id> {
    type DbId = Option<Id>;

    fn id(&self) -> Option<Id> {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::SettlementId;
    use uuid::Uuid;

    #[test]
    fn row_ids_follow_the_state() {
        let id: SettlementId = Uuid::new_v4();
        assert_eq!(Saved { id }.id(), id);
        assert_eq!(MaybeSaved { id: Some(id) }.id(), Some(id));
        assert_eq!(MaybeSaved::<SettlementId> { id: None }.id(), None);
        NotSaved.id();
    }
}

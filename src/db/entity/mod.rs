pub mod game_participants;
pub mod game_transactions;
pub mod games;
pub mod sea_orm_active_enums;
pub mod settlements;
pub mod users;

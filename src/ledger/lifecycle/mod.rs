pub mod service;
pub mod types;
pub mod validation;

pub use service::LifecycleService;
pub use types::*;

pub mod broadcast;
pub mod database;
pub mod user;

pub use broadcast::{BroadcastLog, BroadcastRecord};
pub use database::InMemoryStorage;
pub use user::{AuthenticatedUser, Session};

pub mod album;
pub mod catalog;
pub mod clock;
pub mod daily;
pub mod error;
pub mod events;
pub mod leaderboard;
pub mod ledger;
pub mod levels;
pub mod links;
pub mod rewards;
pub mod shop;
pub mod spin;
pub mod types;
pub mod weighted;
pub mod wheel;

pub use crate::catalog::{Catalog, CatalogError, CompiledCatalog, EconomyConfig};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::error::EngineError;
pub use crate::rewards::{EngineBuilder, Profile, RewardEngine};
pub use crate::types::{Balances, RewardBundle, RewardGrant, RewardKind, UserId};
pub use crate::weighted::{WeightError, WeightedTable};

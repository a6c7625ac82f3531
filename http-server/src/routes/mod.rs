pub mod admin;
pub mod daily;
pub mod events;
pub mod leaderboard;
pub mod links;
pub mod spin;
pub mod stickers;
pub mod store;
pub mod users;
pub mod wheel;

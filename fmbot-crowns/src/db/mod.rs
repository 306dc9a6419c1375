//! Database access layer for the crowns service

pub mod crowns;
pub mod filtered_users;
pub mod guilds;
pub mod plays;

pub use plays::SqlitePlayStore;

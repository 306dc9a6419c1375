//! HTTP API handlers for fmbot-crowns

pub mod crowns;
pub mod filtered_users;
pub mod health;
pub mod whoknows;

pub use crowns::crown_routes;
pub use filtered_users::filtered_user_routes;
pub use health::health_routes;
pub use whoknows::whoknows_routes;

//! Utility modules for fmbot-crowns

pub mod db_retry;

pub use db_retry::retry_on_lock;

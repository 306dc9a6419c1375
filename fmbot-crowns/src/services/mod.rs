//! Business logic services

pub mod abuse_filter;
pub mod crown_ledger;
pub mod crown_seeder;
pub mod lastfm_client;
pub mod leaderboard;
pub mod policy_filter;
pub mod whoknows;

pub use abuse_filter::AbuseFilter;
pub use crown_ledger::{CrownEvaluation, CrownLedger, CrownOutcome, IneligibleReason, NoChangeReason};
pub use crown_seeder::CrownSeeder;
pub use lastfm_client::LastfmClient;
pub use leaderboard::{GlobalLeaderboard, LeaderboardBuilder};
pub use whoknows::{WhoKnowsResult, WhoKnowsService};

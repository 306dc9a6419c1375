//! Runtime configuration for the crowns service
//!
//! Typed views over the `settings` table plus Last.fm API key resolution
//! (Database → ENV → TOML).

use crate::services::leaderboard::DEFAULT_LIST_LIMIT;
use fmbot_common::config::TomlConfig;
use fmbot_common::db::get_setting;
use fmbot_common::{Error, Result};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

pub const LASTFM_API_KEY_ENV: &str = "FMBOT_LASTFM_API_KEY";

/// Crown claim/theft settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrownSettings {
    /// Floor applied when the guild sets a lower (or no) threshold
    pub default_min_playcount: i64,
    /// Kill switch for the theft path while the provider is unreliable
    pub theft_disabled: bool,
}

impl Default for CrownSettings {
    fn default() -> Self {
        Self {
            default_min_playcount: 30,
            theft_disabled: false,
        }
    }
}

impl CrownSettings {
    pub async fn from_database(pool: &SqlitePool) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            default_min_playcount: setting_or(
                pool,
                "crown_default_min_playcount",
                defaults.default_min_playcount,
            )
            .await?,
            theft_disabled: setting_or(pool, "crown_theft_disabled", defaults.theft_disabled)
                .await?,
        })
    }
}

/// Leaderboard sizing and cache lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardSettings {
    pub cache_ttl: Duration,
    pub list_limit: usize,
}

impl Default for LeaderboardSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(25 * 60),
            list_limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl LeaderboardSettings {
    pub async fn from_database(pool: &SqlitePool) -> Result<Self> {
        let defaults = Self::default();
        let ttl_secs: u64 = setting_or(
            pool,
            "whoknows_cache_ttl_seconds",
            defaults.cache_ttl.as_secs(),
        )
        .await?;
        let list_limit: usize = setting_or(pool, "whoknows_list_limit", defaults.list_limit).await?;

        Ok(Self {
            cache_ttl: Duration::from_secs(ttl_secs),
            list_limit: list_limit.max(1),
        })
    }
}

/// Global abuse filter thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct AbuseFilterConfig {
    /// Start of the analysis window, in days before now
    pub lookback_days: i64,
    /// Most recent days left out of the window (imports may still be catching up)
    pub exclude_recent_days: i64,
    pub max_listening_hours: i64,
    pub max_plays_per_day: f64,
    pub scan_interval: Duration,
    /// How long a flag keeps a user off global leaderboards
    pub retention_days: i64,
}

impl Default for AbuseFilterConfig {
    fn default() -> Self {
        Self {
            lookback_days: 11,
            exclude_recent_days: 3,
            max_listening_hours: 144,
            max_plays_per_day: 600.0,
            scan_interval: Duration::from_secs(24 * 60 * 60),
            retention_days: 90,
        }
    }
}

impl AbuseFilterConfig {
    pub async fn from_database(pool: &SqlitePool) -> Result<Self> {
        let defaults = Self::default();
        let lookback_days = setting_or(pool, "abuse_lookback_days", defaults.lookback_days).await?;
        let exclude_recent_days =
            setting_or(pool, "abuse_exclude_recent_days", defaults.exclude_recent_days).await?;

        let config = Self {
            lookback_days,
            exclude_recent_days,
            max_listening_hours: setting_or(pool, "abuse_max_hours", defaults.max_listening_hours)
                .await?,
            max_plays_per_day: setting_or(
                pool,
                "abuse_max_plays_per_day",
                defaults.max_plays_per_day,
            )
            .await?,
            scan_interval: Duration::from_secs(
                setting_or(
                    pool,
                    "abuse_scan_interval_secs",
                    defaults.scan_interval.as_secs(),
                )
                .await?
                .max(60),
            ),
            retention_days: setting_or(
                pool,
                "global_filter_retention_days",
                defaults.retention_days,
            )
            .await?,
        };

        if config.window_days() <= 0 {
            warn!(
                lookback_days,
                exclude_recent_days, "Abuse window is empty, using defaults"
            );
            return Ok(defaults);
        }

        Ok(config)
    }

    /// Length of the analysis window in days
    pub fn window_days(&self) -> i64 {
        self.lookback_days - self.exclude_recent_days
    }
}

/// Read a setting, falling back to `default` when missing or unparseable
async fn setting_or<T>(pool: &SqlitePool, key: &str, default: T) -> Result<T>
where
    T: FromStr + std::fmt::Display,
{
    match get_setting(pool, key).await? {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => Ok(value),
            Err(_) => {
                warn!(key, value = %raw, default = %default, "Invalid setting value, using default");
                Ok(default)
            }
        },
        None => Ok(default),
    }
}

/// Resolve the Last.fm API key
///
/// Priority: Database → ENV → TOML
pub async fn resolve_lastfm_api_key(pool: &SqlitePool, toml_config: &TomlConfig) -> Result<String> {
    if let Some(key) = get_setting(pool, "lastfm_api_key").await? {
        if is_valid_key(&key) {
            info!("Last.fm API key loaded from database");
            return Ok(key);
        }
    }

    if let Ok(key) = std::env::var(LASTFM_API_KEY_ENV) {
        if is_valid_key(&key) {
            info!("Last.fm API key loaded from environment variable");
            return Ok(key);
        }
    }

    if let Some(key) = toml_config.lastfm_api_key.as_ref() {
        if is_valid_key(key) {
            info!("Last.fm API key loaded from TOML config");
            return Ok(key.clone());
        }
    }

    Err(Error::Config(format!(
        "Last.fm API key not configured. Set the 'lastfm_api_key' setting, \
         the {} environment variable, or lastfm_api_key in fmbot.toml",
        LASTFM_API_KEY_ENV
    )))
}

pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

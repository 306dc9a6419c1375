//! Last.fm API client
//!
//! Only the lookup crown verification needs: `artist.getInfo` with a
//! `username`, which reports that user's play count for the artist.

use crate::types::ArtistPlayCountVerifier;
use async_trait::async_trait;
use fmbot_common::{Error, Result};
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;

pub const LASTFM_BASE_URL: &str = "https://ws.audioscrobbler.com/2.0/";
const USER_AGENT: &str = concat!("fmbot-crowns/", env!("CARGO_PKG_VERSION"));

/// Last.fm allows 5 requests per second per key
const REQUESTS_PER_SECOND: NonZeroU32 = match NonZeroU32::new(5) {
    Some(n) => n,
    None => unreachable!(),
};

/// Last.fm error code for an unknown artist
const ERROR_INVALID_PARAMETERS: i64 = 6;

type DirectRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug, Deserialize)]
struct ArtistInfoResponse {
    artist: Option<ArtistInfo>,
    error: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArtistInfo {
    stats: Option<ArtistStats>,
}

#[derive(Debug, Deserialize)]
struct ArtistStats {
    /// Last.fm sends numbers as strings, but not consistently
    userplaycount: Option<serde_json::Value>,
}

pub struct LastfmClient {
    http_client: reqwest::Client,
    rate_limiter: DirectRateLimiter,
    api_key: String,
    base_url: String,
}

impl LastfmClient {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, LASTFM_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Provider(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: RateLimiter::direct(Quota::per_second(REQUESTS_PER_SECOND)),
            api_key,
            base_url,
        })
    }

    /// The user's play count for an artist, `None` when Last.fm has none
    pub async fn artist_user_play_count(
        &self,
        artist: &str,
        lastfm_user_name: &str,
    ) -> Result<Option<i64>> {
        self.rate_limiter.until_ready().await;

        tracing::debug!(artist, user = lastfm_user_name, "Querying Last.fm artist.getInfo");

        let response = self
            .http_client
            .get(&self.base_url)
            .query(&[
                ("method", "artist.getInfo"),
                ("artist", artist),
                ("username", lastfm_user_name),
                ("autocorrect", "1"),
                ("api_key", self.api_key.as_str()),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Last.fm request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Provider(format!("Last.fm response unreadable: {}", e)))?;

        // Error bodies carry the useful detail even on non-2xx statuses
        match parse_user_play_count(&body) {
            Err(e) if !status.is_success() => Err(Error::Provider(format!(
                "Last.fm returned {}: {}",
                status.as_u16(),
                e
            ))),
            other => other,
        }
    }
}

#[async_trait]
impl ArtistPlayCountVerifier for LastfmClient {
    async fn get_authoritative_artist_play_count(
        &self,
        artist: &str,
        lastfm_user_name: &str,
    ) -> Result<Option<i64>> {
        self.artist_user_play_count(artist, lastfm_user_name).await
    }
}

/// Extract `artist.stats.userplaycount` from an `artist.getInfo` body
pub fn parse_user_play_count(body: &str) -> Result<Option<i64>> {
    let parsed: ArtistInfoResponse = serde_json::from_str(body)
        .map_err(|e| Error::Provider(format!("Invalid Last.fm response: {}", e)))?;

    if let Some(code) = parsed.error {
        if code == ERROR_INVALID_PARAMETERS {
            return Ok(None);
        }
        return Err(Error::Provider(format!(
            "Last.fm error {}: {}",
            code,
            parsed.message.unwrap_or_default()
        )));
    }

    let value = parsed
        .artist
        .and_then(|a| a.stats)
        .and_then(|s| s.userplaycount);

    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

// src/fetchers/strava.rs

//! Activity-history client for the Strava v3 API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::errors::{EthosError, Result};

use super::{Activity, ActivityHistory, TokenGrant};

const PER_PAGE: usize = 200;
const MAX_PAGES: usize = 20;

#[derive(Debug, Clone)]
pub struct StravaClient {
    client: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    /// Unix seconds.
    expires_at: i64,
}

impl StravaClient {
    pub fn new(
        base_url: impl Into<String>,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Ethos")
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }
}

#[async_trait]
impl ActivityHistory for StravaClient {
    async fn activities(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Activity>> {
        let url = format!("{}/athlete/activities", self.base_url);
        let after = since.timestamp().to_string();
        let before = until.timestamp().to_string();
        let per_page = PER_PAGE.to_string();

        let mut all = Vec::new();
        for page in 1..=MAX_PAGES {
            let page_str = page.to_string();
            let response = self
                .client
                .get(&url)
                .bearer_auth(access_token)
                .query(&[
                    ("after", after.as_str()),
                    ("before", before.as_str()),
                    ("per_page", per_page.as_str()),
                    ("page", page_str.as_str()),
                ])
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(EthosError::provider(
                    "strava",
                    format!("listing activities returned {}", response.status()),
                ));
            }

            let batch: Vec<Activity> = response.json().await?;
            let fetched = batch.len();
            all.extend(batch);
            if fetched < PER_PAGE {
                break;
            }
        }

        debug!(count = all.len(), "fetched activities");
        Ok(all)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        let response = self
            .client
            .post(&self.token_url)
            .json(&json!({
                "client_id": self.client_id,
                "client_secret": self.client_secret,
                "grant_type": "refresh_token",
                "refresh_token": refresh_token,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EthosError::provider(
                "strava",
                format!("token refresh returned {}", response.status()),
            ));
        }

        let body: TokenResponse = response.json().await?;
        let expires_at = DateTime::from_timestamp(body.expires_at, 0).ok_or_else(|| {
            EthosError::provider("strava", format!("invalid expires_at {}", body.expires_at))
        })?;

        Ok(TokenGrant {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_at,
        })
    }
}

// src/fetchers/github.rs

//! Commit-history client for the GitHub REST API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::{EthosError, Result};

use super::{CommitEvent, CommitHistory};

const PER_PAGE: usize = 100;
/// Upper bound on commit pages fetched per repository.
const MAX_PAGES: usize = 10;

#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    default_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepoSummary {
    name: String,
    #[serde(default)]
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct CommitItem {
    sha: String,
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    author: CommitSignature,
}

#[derive(Debug, Deserialize)]
struct CommitSignature {
    date: DateTime<Utc>,
}

impl GitHubClient {
    /// `default_token` is used when the user has not connected their own.
    pub fn new(base_url: impl Into<String>, default_token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Ethos")
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_token,
        })
    }

    fn get(&self, url: &str, token: Option<&str>) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github.v3+json");
        if let Some(token) = token.or(self.default_token.as_deref()) {
            request = request.header("Authorization", format!("token {token}"));
        }
        request
    }

    async fn owned_repos(&self, username: &str, token: Option<&str>) -> Result<Vec<RepoSummary>> {
        let url = format!("{}/users/{}/repos", self.base_url, username);
        let response = self
            .get(&url, token)
            .query(&[("type", "owner"), ("sort", "updated"), ("per_page", "100")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EthosError::provider(
                "github",
                format!("listing repos for {username} returned {}", response.status()),
            ));
        }
        Ok(response.json().await?)
    }

    async fn repo_commits(
        &self,
        full_name: &str,
        author: &str,
        token: Option<&str>,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CommitEvent>> {
        let url = format!("{}/repos/{}/commits", self.base_url, full_name);
        let since = since.to_rfc3339_opts(SecondsFormat::Secs, true);
        let until = until.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut events = Vec::new();
        for page in 1..=MAX_PAGES {
            let page_str = page.to_string();
            let per_page = PER_PAGE.to_string();
            let response = self
                .get(&url, token)
                .query(&[
                    ("author", author),
                    ("since", since.as_str()),
                    ("until", until.as_str()),
                    ("per_page", per_page.as_str()),
                    ("page", page_str.as_str()),
                ])
                .send()
                .await?;

            // 404: private or deleted repo. 409: empty repository.
            if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::CONFLICT) {
                debug!(repo = %full_name, status = %response.status(), "repository has no readable commits");
                return Ok(events);
            }
            if !response.status().is_success() {
                return Err(EthosError::provider(
                    "github",
                    format!("listing commits for {full_name} returned {}", response.status()),
                ));
            }

            let items: Vec<CommitItem> = response.json().await?;
            let fetched = items.len();
            events.extend(items.into_iter().map(|item| CommitEvent {
                sha: item.sha,
                repo: full_name.to_string(),
                date: item.commit.author.date,
            }));

            if fetched < PER_PAGE {
                break;
            }
        }
        Ok(events)
    }
}

#[async_trait]
impl CommitHistory for GitHubClient {
    async fn commits_since(
        &self,
        username: &str,
        token: Option<&str>,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CommitEvent>> {
        let repos = self.owned_repos(username, token).await?;
        debug!(username, repos = repos.len(), "fetching commits across owned repos");

        let mut all = Vec::new();
        for repo in repos {
            let full_name = if repo.full_name.is_empty() {
                format!("{username}/{}", repo.name)
            } else {
                repo.full_name
            };

            match self.repo_commits(&full_name, username, token, since, until).await {
                Ok(mut commits) => all.append(&mut commits),
                Err(e) => {
                    warn!(repo = %full_name, error = %e, "skipping repository after commit fetch error");
                }
            }
        }

        all.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(all)
    }
}

//! GitHub REST client for the remote resources.

use crate::{
    constants::{
        GITHUB_API_URL, GITHUB_API_VERSION, HTTP_TIMEOUT_SECS, MAX_NOTIFICATION_PAGES, USER_AGENT,
    },
    models::{Identity, Issue, PullRequest, WorkflowRun},
};
use anyhow::Result;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION},
    Client, RequestBuilder, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const NOTIFICATIONS_PER_PAGE: usize = 50;

#[derive(Error, Debug)]
pub enum GitHubError {
    /// The token is missing, invalid or expired.
    #[error("GitHub rejected the token (401 Unauthorized).")]
    Unauthorized,
    /// The rate limit is exhausted.
    #[error("GitHub rate limit exceeded, try again later.")]
    RateLimited,
    /// Any other non-success response.
    #[error("GitHub API error ({status}): {message}")]
    Api { status: StatusCode, message: String },
    /// A [reqwest::Error] occurred.
    #[error("HTTP error: {}", .0)]
    Http(#[from] reqwest::Error),
}

/// A GitHub account login, as embedded in issues and pull requests.
#[derive(Debug, Deserialize)]
struct GhUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhPullRequest {
    number: u64,
    title: String,
    state: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    assignees: Vec<GhUser>,
    #[serde(default)]
    requested_reviewers: Vec<GhUser>,
}

impl From<GhPullRequest> for PullRequest {
    fn from(raw: GhPullRequest) -> Self {
        Self {
            number: raw.number,
            title: raw.title,
            state: raw.state,
            draft: raw.draft,
            assignees: raw.assignees.into_iter().map(|u| u.login).collect(),
            requested_reviewers: raw.requested_reviewers.into_iter().map(|u| u.login).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GhIssue {
    number: u64,
    title: String,
    state: String,
    #[serde(default)]
    assignees: Vec<GhUser>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl From<GhIssue> for Issue {
    fn from(raw: GhIssue) -> Self {
        Self {
            number: raw.number,
            title: raw.title,
            state: raw.state,
            assignees: raw.assignees.into_iter().map(|u| u.login).collect(),
            is_pull_request: raw.pull_request.is_some(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GhWorkflowRuns {
    workflow_runs: Vec<WorkflowRun>,
}

/// Client for the GitHub REST API, bound to one repository.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    base_url: String,
    /// `owner/repo` of the open repository. [None] when the repository has no GitHub remote, in
    /// which case the repository endpoints resolve to empty lists.
    repository: Option<(String, String)>,
}

impl GitHubClient {
    /// Creates a client authenticated with `token`.
    pub fn new(token: &str, repository: Option<(String, String)>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base_url: GITHUB_API_URL.to_string(),
            repository,
        })
    }

    fn repo_url(&self, path: &str) -> Option<String> {
        self.repository
            .as_ref()
            .map(|(owner, repo)| format!("{}/repos/{owner}/{repo}/{path}", self.base_url))
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, GitHubError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(GitHubError::Unauthorized);
        }
        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            let exhausted = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == "0");
            if exhausted || status == StatusCode::TOO_MANY_REQUESTS {
                return Err(GitHubError::RateLimited);
            }
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GitHubError::Api {
                status,
                message: error_message(&body),
            });
        }

        Ok(response.json().await?)
    }

    /// The authenticated user.
    pub async fn current_identity(&self) -> Result<Option<Identity>> {
        let user: GhUser = Self::send(self.http.get(format!("{}/user", self.base_url))).await?;
        Ok(Some(Identity { login: user.login }))
    }

    /// Counts unread notification threads, walking pages until a short one.
    pub async fn unread_notification_count(&self) -> Result<u32> {
        let mut total = 0;
        for page in 1..=MAX_NOTIFICATION_PAGES {
            let threads: Vec<serde_json::Value> = Self::send(
                self.http
                    .get(format!("{}/notifications", self.base_url))
                    .query(&[
                        ("all", "false".to_string()),
                        ("per_page", NOTIFICATIONS_PER_PAGE.to_string()),
                        ("page", page.to_string()),
                    ]),
            )
            .await?;

            total += threads.len() as u32;
            if threads.len() < NOTIFICATIONS_PER_PAGE {
                break;
            }
        }
        debug!(total, "counted unread notifications");
        Ok(total)
    }

    /// The most recent workflow runs of the repository.
    pub async fn workflow_runs(&self) -> Result<Vec<WorkflowRun>> {
        let Some(url) = self.repo_url("actions/runs") else {
            return Ok(Vec::new());
        };
        let runs: GhWorkflowRuns =
            Self::send(self.http.get(url).query(&[("per_page", "50")])).await?;
        Ok(runs.workflow_runs)
    }

    /// Open pull requests of the repository.
    pub async fn open_pull_requests(&self) -> Result<Vec<PullRequest>> {
        let Some(url) = self.repo_url("pulls") else {
            return Ok(Vec::new());
        };
        let pulls: Vec<GhPullRequest> = Self::send(
            self.http
                .get(url)
                .query(&[("state", "open"), ("per_page", "100")]),
        )
        .await?;
        Ok(pulls.into_iter().map(Into::into).collect())
    }

    /// Open issues of the repository. Pull requests listed by the endpoint are kept and flagged.
    pub async fn open_issues(&self) -> Result<Vec<Issue>> {
        let Some(url) = self.repo_url("issues") else {
            return Ok(Vec::new());
        };
        let issues: Vec<GhIssue> = Self::send(
            self.http
                .get(url)
                .query(&[("state", "open"), ("per_page", "100")]),
        )
        .await?;
        Ok(issues.into_iter().map(Into::into).collect())
    }
}

/// Extracts the `message` field of a GitHub error body, falling back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(ToOwned::to_owned))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Parses `owner` and `repo` out of a GitHub remote URL, in SSH or HTTPS form.
pub fn parse_owner_repo(url: &str) -> Option<(String, String)> {
    let rest = url
        .strip_prefix("git@github.com:")
        .or_else(|| url.strip_prefix("ssh://git@github.com/"))
        .or_else(|| url.strip_prefix("https://github.com/"))
        .or_else(|| url.strip_prefix("http://github.com/"))?;
    let rest = rest.trim_end_matches('/');
    let rest = rest.strip_suffix(".git").unwrap_or(rest);

    match rest.split('/').collect::<Vec<_>>().as_slice() {
        [owner, repo] if !owner.is_empty() && !repo.is_empty() => {
            Some((owner.to_string(), repo.to_string()))
        }
        _ => None,
    }
}

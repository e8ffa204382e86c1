//! Resource clients: the asynchronous data sources the coordinator polls.

use crate::{
    coordinator::{ResourceKind, ResourceValue},
    models::{Identity, Issue, PullRequest, SyncStatus, WorkflowRun},
};
use anyhow::{anyhow, Result};
use std::{future::Future, path::PathBuf};

mod git;
pub use git::{LocalClient, RepositoryExt};

mod github;
pub use github::{parse_owner_repo, GitHubClient, GitHubError};

/// The asynchronous endpoints the coordinator consumes. Each call may be slow and may fail; the
/// coordinator never calls a repository-bound endpoint without an open repository, nor an
/// account-bound endpoint without an identity.
pub trait ResourceClient: Send + Sync + 'static {
    /// Ahead/behind state of the checked out branch. [None] when there is no upstream.
    fn sync_status(&self) -> impl Future<Output = Result<Option<SyncStatus>>> + Send;

    /// Recent workflow runs of the repository.
    fn workflow_runs(&self) -> impl Future<Output = Result<Vec<WorkflowRun>>> + Send;

    /// The number of unread notification threads.
    fn unread_notification_count(&self) -> impl Future<Output = Result<u32>> + Send;

    /// Open pull requests of the repository.
    fn open_pull_requests(&self) -> impl Future<Output = Result<Vec<PullRequest>>> + Send;

    /// Open issues of the repository.
    fn open_issues(&self) -> impl Future<Output = Result<Vec<Issue>>> + Send;

    /// The authenticated user, if any.
    fn current_identity(&self) -> impl Future<Output = Result<Option<Identity>>> + Send;
}

/// Fetches the current value of `kind` from `client`.
pub async fn fetch_resource<C: ResourceClient>(client: &C, kind: ResourceKind) -> Result<ResourceValue> {
    Ok(match kind {
        ResourceKind::SyncStatus => ResourceValue::SyncStatus(client.sync_status().await?),
        ResourceKind::Notifications => {
            ResourceValue::UnreadNotifications(client.unread_notification_count().await?)
        }
        ResourceKind::WorkflowRuns => ResourceValue::WorkflowRuns(client.workflow_runs().await?),
        ResourceKind::PullRequests => {
            ResourceValue::PullRequests(client.open_pull_requests().await?)
        }
        ResourceKind::Issues => ResourceValue::Issues(client.open_issues().await?),
        ResourceKind::Identity => ResourceValue::Identity(client.current_identity().await?),
    })
}

/// The production client: local repository state from `git2`, everything else from the GitHub
/// REST API.
pub struct LiveClient {
    local: LocalClient,
    github: Option<GitHubClient>,
}

impl LiveClient {
    /// Creates a client for the repository at `repo_path`. Without a token, every GitHub endpoint
    /// fails; the coordinator never calls them in that case.
    pub fn new(repo_path: PathBuf, github: Option<GitHubClient>) -> Self {
        Self {
            local: LocalClient::new(repo_path),
            github,
        }
    }

    fn github(&self) -> Result<&GitHubClient> {
        self.github
            .as_ref()
            .ok_or_else(|| anyhow!("Not authenticated with GitHub."))
    }
}

impl ResourceClient for LiveClient {
    async fn sync_status(&self) -> Result<Option<SyncStatus>> {
        self.local.sync_status().await
    }

    async fn workflow_runs(&self) -> Result<Vec<WorkflowRun>> {
        self.github()?.workflow_runs().await
    }

    async fn unread_notification_count(&self) -> Result<u32> {
        self.github()?.unread_notification_count().await
    }

    async fn open_pull_requests(&self) -> Result<Vec<PullRequest>> {
        self.github()?.open_pull_requests().await
    }

    async fn open_issues(&self) -> Result<Vec<Issue>> {
        self.github()?.open_issues().await
    }

    async fn current_identity(&self) -> Result<Option<Identity>> {
        self.github()?.current_identity().await
    }
}

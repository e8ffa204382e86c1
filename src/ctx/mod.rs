//! The in-memory context of the `pulse` application.

use crate::{
    client::{parse_owner_repo, GitHubClient, LiveClient, LocalClient, RepositoryExt},
    config::PulseConfig,
    coordinator::{Coordinator, SessionContext},
    models::ChangeCounts,
};
use anyhow::Result;
use git2::Repository;
use std::{path::Path, sync::Arc};
use tracing::{debug, warn};

mod fmt;
pub use fmt::write_snapshot;

/// The name of the remote whose GitHub repository is polled.
const DEFAULT_REMOTE: &str = "origin";

/// The in-memory context of the `pulse` application.
pub struct PulseContext {
    /// The repository found at or above the working directory, if any.
    pub repository: Option<Repository>,
    /// The loaded configuration.
    pub config: PulseConfig,
    /// The coordinator polling the repository and the GitHub account.
    pub coordinator: Coordinator<LiveClient>,
    local: LocalClient,
}

impl PulseContext {
    /// Opens the context for `path`. A missing repository or token is not an error; the
    /// resources that depend on them are simply never fetched.
    pub fn open(path: &Path, config: PulseConfig) -> Result<Self> {
        let repository = match Repository::discover(path) {
            Ok(repository) => Some(repository),
            Err(e) => {
                debug!("no repository at {}: {}", path.display(), e.message());
                None
            }
        };

        let owner_repo = repository
            .as_ref()
            .and_then(|r| r.remote_url(DEFAULT_REMOTE).ok())
            .and_then(|url| parse_owner_repo(&url));
        if repository.is_some() && owner_repo.is_none() {
            debug!("no GitHub remote named `{DEFAULT_REMOTE}`");
        }

        let github = match config.token() {
            Some(token) => Some(GitHubClient::new(&token, owner_repo)?),
            None => {
                warn!("no GitHub token configured, remote resources are disabled");
                None
            }
        };

        let context = SessionContext {
            repository_open: repository.is_some(),
            authenticated: github.is_some(),
        };
        let client = Arc::new(LiveClient::new(path.to_path_buf(), github));
        let coordinator = Coordinator::new(client, config.polling, context)?;

        Ok(Self {
            repository,
            config,
            coordinator,
            local: LocalClient::new(path.to_path_buf()),
        })
    }

    /// Counts staged and unstaged files. Zero without a repository.
    pub async fn change_counts(&self) -> Result<ChangeCounts> {
        if self.repository.is_none() {
            return Ok(ChangeCounts::default());
        }
        self.local.change_counts().await
    }

    /// The name of the checked out branch, if `HEAD` points at one.
    pub fn branch_name(&self) -> Option<String> {
        let branch = self.repository.as_ref()?.current_branch().ok()?;
        let name = branch.name().ok()??;
        Some(name.to_owned())
    }

    /// Prints the current snapshot.
    pub async fn print_status(&self) -> Result<()> {
        let snapshot = self.coordinator.snapshot(self.change_counts().await?);
        let mut buf = String::new();
        write_snapshot(&mut buf, &snapshot, self.branch_name().as_deref())?;
        print!("{}", buf);
        Ok(())
    }
}

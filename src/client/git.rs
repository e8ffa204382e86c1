//! Local repository state, read with `git2`.

use crate::models::{ChangeCounts, SyncStatus};
use anyhow::{anyhow, Result};
use git2::{Branch, BranchType, Repository, StatusOptions};
use std::path::PathBuf;
use tracing::trace;

/// Extension trait for the [Repository] type to expose the local state `pulse` reports on.
pub trait RepositoryExt {
    /// Returns the checked out branch.
    ///
    /// ## Returns
    /// - `Result<Branch>` - The current branch, or an error if `HEAD` is detached or unborn.
    fn current_branch(&self) -> Result<Branch>;

    /// Computes the ahead/behind state of the checked out branch against its upstream.
    ///
    /// ## Returns
    /// - `Ok(Some(SyncStatus))` - The branch tracks an upstream.
    /// - `Ok(None)` - `HEAD` is detached, or the branch has no upstream.
    /// - `Err(_)` - If libgit2 fails while walking the graph.
    fn sync_status(&self) -> Result<Option<SyncStatus>>;

    /// Returns the URL of the remote named `name`.
    fn remote_url(&self, name: &str) -> Result<String>;
}

impl RepositoryExt for Repository {
    fn current_branch(&self) -> Result<Branch> {
        let head = self.head()?;
        let branch = self.find_branch(
            head.shorthand()
                .ok_or(anyhow!("HEAD ref does not have a name"))?,
            BranchType::Local,
        )?;
        Ok(branch)
    }

    fn sync_status(&self) -> Result<Option<SyncStatus>> {
        let Ok(head) = self.head() else {
            return Ok(None);
        };
        if !head.is_branch() {
            return Ok(None);
        }

        let local = self.current_branch()?;
        let Ok(upstream) = local.upstream() else {
            trace!("no upstream configured");
            return Ok(None);
        };

        let upstream_name = upstream
            .name()?
            .ok_or(anyhow!("Upstream branch name is not valid UTF-8"))?
            .to_owned();
        let local_ref = local
            .get()
            .name()
            .ok_or(anyhow!("Local branch name is not valid UTF-8"))?;
        let remote_name = self
            .branch_upstream_remote(local_ref)
            .ok()
            .and_then(|buf| buf.as_str().map(ToOwned::to_owned));

        let local_oid = head
            .target()
            .ok_or(anyhow!("Could not resolve the local branch head"))?;
        let upstream_oid = upstream
            .get()
            .target()
            .ok_or(anyhow!("Could not resolve the upstream branch head"))?;
        let (ahead, behind) = self.graph_ahead_behind(local_oid, upstream_oid)?;

        Ok(Some(SyncStatus {
            ahead: u32::try_from(ahead).unwrap_or(u32::MAX),
            behind: u32::try_from(behind).unwrap_or(u32::MAX),
            remote_name,
            upstream_branch: Some(upstream_name),
        }))
    }

    fn remote_url(&self, name: &str) -> Result<String> {
        let remote = self.find_remote(name)?;
        remote
            .url()
            .map(ToOwned::to_owned)
            .ok_or(anyhow!("Remote `{}` has no URL", name))
    }
}

/// Counts staged and unstaged files in the working tree. Untracked and conflicted files count as
/// unstaged.
pub fn change_counts(repository: &Repository) -> Result<ChangeCounts, git2::Error> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false)
        .include_unmodified(false);

    let mut counts = ChangeCounts::default();
    for entry in repository.statuses(Some(&mut opts))?.iter() {
        let status = entry.status();
        if status.is_conflicted() {
            counts.unstaged += 1;
            continue;
        }
        if status.is_index_new()
            || status.is_index_modified()
            || status.is_index_deleted()
            || status.is_index_renamed()
            || status.is_index_typechange()
        {
            counts.staged += 1;
        }
        if status.is_wt_new()
            || status.is_wt_modified()
            || status.is_wt_deleted()
            || status.is_wt_renamed()
            || status.is_wt_typechange()
        {
            counts.unstaged += 1;
        }
    }
    Ok(counts)
}

/// Reads local repository state off the async runtime.
pub struct LocalClient {
    path: PathBuf,
}

impl LocalClient {
    /// Creates a client for the repository containing `path`.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The ahead/behind state of the checked out branch.
    pub async fn sync_status(&self) -> Result<Option<SyncStatus>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Repository::discover(path)?.sync_status()).await?
    }

    /// Staged and unstaged file counts of the working tree.
    pub async fn change_counts(&self) -> Result<ChangeCounts> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<ChangeCounts> {
            Ok(change_counts(&Repository::discover(path)?)?)
        })
        .await?
    }
}

#[cfg(test)]
mod test {
    use super::{change_counts, LocalClient, RepositoryExt};
    use git2::{Repository, Signature};
    use std::path::Path;

    fn commit_all(repo: &Repository, message: &str) -> git2::Oid {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let signature = Signature::now("pulse", "pulse@example.com").unwrap();
        let parents = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect::<Vec<_>>();
        let parents = parents.iter().collect::<Vec<_>>();
        repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .unwrap()
    }

    fn write(root: &Path, name: &str, contents: &str) {
        std::fs::write(root.join(name), contents).unwrap();
    }

    #[test]
    fn counts_staged_and_unstaged_files() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        write(dir.path(), "a.txt", "a");
        write(dir.path(), "b.txt", "b");
        commit_all(&repo, "initial");

        // One staged modification, one unstaged modification, one untracked file.
        write(dir.path(), "a.txt", "a2");
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("a.txt")).unwrap();
        index.write().unwrap();
        write(dir.path(), "b.txt", "b2");
        write(dir.path(), "c.txt", "c");

        let counts = change_counts(&repo).unwrap();
        assert_eq!(counts.staged, 1);
        assert_eq!(counts.unstaged, 2);
    }

    #[tokio::test]
    async fn local_client_counts_off_the_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        write(dir.path(), "a.txt", "a");
        commit_all(&repo, "initial");
        write(dir.path(), "a.txt", "a2");
        write(dir.path(), "b.txt", "b");

        let client = LocalClient::new(dir.path().to_path_buf());
        let counts = client.change_counts().await.unwrap();
        assert_eq!(counts.staged, 0);
        assert_eq!(counts.unstaged, 2);
    }

    #[tokio::test]
    async fn local_client_outside_repository_fails() {
        let dir = tempfile::tempdir().unwrap();
        let client = LocalClient::new(dir.path().join("missing"));
        assert!(client.change_counts().await.is_err());
    }

    #[test]
    fn no_upstream_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        write(dir.path(), "a.txt", "a");
        commit_all(&repo, "initial");

        assert_eq!(repo.sync_status().unwrap(), None);
    }

    #[test]
    fn unborn_head_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        assert_eq!(repo.sync_status().unwrap(), None);
    }

    #[test]
    fn ahead_and_behind_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        write(dir.path(), "a.txt", "a");
        let base = commit_all(&repo, "base");
        let branch = repo.current_branch().unwrap();
        let branch_name = branch.name().unwrap().unwrap().to_owned();

        // Fake a remote-tracking ref two commits ahead of `base`.
        write(dir.path(), "b.txt", "b");
        commit_all(&repo, "remote 1");
        write(dir.path(), "c.txt", "c");
        let remote_tip = commit_all(&repo, "remote 2");
        repo.remote("origin", "https://github.com/owner/repo.git")
            .unwrap();
        repo.reference(
            &format!("refs/remotes/origin/{branch_name}"),
            remote_tip,
            true,
            "fake fetch",
        )
        .unwrap();

        // Rewind the local branch to `base` and add one local commit.
        let base_commit = repo.find_commit(base).unwrap();
        repo.reset(base_commit.as_object(), git2::ResetType::Hard, None)
            .unwrap();
        write(dir.path(), "d.txt", "d");
        commit_all(&repo, "local");

        let mut branch = repo.current_branch().unwrap();
        branch
            .set_upstream(Some(&format!("origin/{branch_name}")))
            .unwrap();

        let status = repo.sync_status().unwrap().unwrap();
        assert_eq!(status.ahead, 1);
        assert_eq!(status.behind, 2);
        assert_eq!(status.remote_name.as_deref(), Some("origin"));
        assert_eq!(
            status.upstream_branch,
            Some(format!("origin/{branch_name}"))
        );
        assert_eq!(
            repo.remote_url("origin").unwrap(),
            "https://github.com/owner/repo.git"
        );
    }

    #[test]
    fn remote_name_with_slash() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        write(dir.path(), "a.txt", "a");
        let tip = commit_all(&repo, "initial");
        let branch_name = repo
            .current_branch()
            .unwrap()
            .name()
            .unwrap()
            .unwrap()
            .to_owned();

        repo.remote("my/fork", "https://github.com/fork/repo.git")
            .unwrap();
        repo.reference(
            &format!("refs/remotes/my/fork/{branch_name}"),
            tip,
            true,
            "fake fetch",
        )
        .unwrap();
        repo.current_branch()
            .unwrap()
            .set_upstream(Some(&format!("my/fork/{branch_name}")))
            .unwrap();

        let status = repo.sync_status().unwrap().unwrap();
        assert_eq!(status.remote_name.as_deref(), Some("my/fork"));
        assert_eq!(
            status.upstream_branch,
            Some(format!("my/fork/{branch_name}"))
        );
        assert_eq!((status.ahead, status.behind), (0, 0));
    }
}

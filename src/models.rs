//! Data shared between the resource clients, the poll registry and the aggregator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Ahead/behind state of the checked out branch against its upstream.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Commits on the local branch that the upstream does not have.
    pub ahead: u32,
    /// Commits on the upstream that the local branch does not have.
    pub behind: u32,
    /// The remote the upstream lives on, e.g. `origin`.
    pub remote_name: Option<String>,
    /// The full upstream name, e.g. `origin/main`.
    pub upstream_branch: Option<String>,
}

/// Lifecycle of a workflow run, as reported by GitHub Actions.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    Waiting,
    Requested,
    Pending,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether the run has not finished yet.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Completed | Self::Unknown)
    }
}

/// Final result of a completed workflow run.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunConclusion {
    Success,
    Failure,
    Cancelled,
    Skipped,
    TimedOut,
    ActionRequired,
    Neutral,
    Stale,
    #[serde(other)]
    Unknown,
}

/// A single GitHub Actions workflow run.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    pub workflow_id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<RunStatus>,
    #[serde(default)]
    pub conclusion: Option<RunConclusion>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub html_url: String,
}

/// An open pull request, reduced to the fields the aggregator needs.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub draft: bool,
    /// Logins of the assignees.
    pub assignees: Vec<String>,
    /// Logins of the users whose review is requested.
    pub requested_reviewers: Vec<String>,
}

/// An open issue. The GitHub issues endpoint also lists pull requests, which
/// are flagged with `is_pull_request`.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub state: String,
    /// Logins of the assignees.
    pub assignees: Vec<String>,
    pub is_pull_request: bool,
}

/// The authenticated GitHub user.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub login: String,
}

impl Identity {
    /// Returns `true` if `login` names this identity. GitHub logins are case-insensitive.
    pub fn is(&self, login: &str) -> bool {
        self.login.eq_ignore_ascii_case(login)
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.login)
    }
}

/// Staged and unstaged file counts of the working tree.
#[derive(Default, Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct ChangeCounts {
    pub staged: u32,
    pub unstaged: u32,
}

/// Returns `true` for the `state` GitHub reports on open issues and pull requests.
pub(crate) fn is_open(state: &str) -> bool {
    state.eq_ignore_ascii_case("open")
}

#[cfg(test)]
mod test {
    use super::{RunConclusion, RunStatus, WorkflowRun};

    #[test]
    fn deserialize_workflow_run() {
        let run: WorkflowRun = serde_json::from_str(
            r#"{
                "id": 42,
                "workflow_id": 7,
                "name": "CI",
                "status": "completed",
                "conclusion": "startup_failure",
                "created_at": "2024-05-01T10:00:00Z",
                "html_url": "https://github.com/o/r/actions/runs/42",
                "head_sha": "abc"
            }"#,
        )
        .unwrap();

        assert_eq!(run.workflow_id, 7);
        assert_eq!(run.status, Some(RunStatus::Completed));
        assert_eq!(run.conclusion, Some(RunConclusion::Unknown));
    }

    #[test]
    fn in_progress_runs_are_active() {
        assert!(RunStatus::InProgress.is_active());
        assert!(RunStatus::Queued.is_active());
        assert!(!RunStatus::Completed.is_active());
    }
}

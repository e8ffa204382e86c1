//! Folds the latest value of every resource into one [NotificationCounts] snapshot.
//!
//! Everything in here is pure: the same [AggregateInputs] always produce the same output, and nothing
//! reaches back into the poll registry.

use crate::models::{
    is_open, ChangeCounts, Identity, Issue, PullRequest, RunConclusion, SyncStatus, WorkflowRun,
};
use itertools::Itertools;
use serde::Serialize;

/// Everything the aggregator reads. Resources that have not been fetched yet are passed as their
/// empty value.
#[derive(Default, Debug, Clone, Copy)]
pub struct AggregateInputs<'a> {
    pub sync_status: Option<&'a SyncStatus>,
    pub workflow_runs: &'a [WorkflowRun],
    pub unread_notifications: u32,
    pub pull_requests: &'a [PullRequest],
    pub issues: &'a [Issue],
    pub identity: Option<&'a Identity>,
    pub changes: ChangeCounts,
}

/// Badge counts for everything that needs the user's attention.
///
/// There are no setters: `remote_total` and `total` are only ever derived from the other fields in
/// [NotificationCounts::new].
#[derive(Default, Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
pub struct NotificationCounts {
    pub pull_available: u32,
    pub push_available: u32,
    pub staged_changes: u32,
    pub unstaged_changes: u32,
    pub total_changes: u32,
    pub unread_notifications: u32,
    pub pr_review_requests: u32,
    pub assigned_prs: u32,
    pub assigned_issues: u32,
    pub failed_ci_runs: u32,
    pub remote_total: u32,
    pub total: u32,
}

impl NotificationCounts {
    /// Assembles the counts from the primary fields, deriving the totals.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pull_available: u32,
        push_available: u32,
        staged_changes: u32,
        unstaged_changes: u32,
        unread_notifications: u32,
        pr_review_requests: u32,
        assigned_prs: u32,
        assigned_issues: u32,
        failed_ci_runs: u32,
    ) -> Self {
        let total_changes = staged_changes + unstaged_changes;
        let remote_total = unread_notifications
            + pr_review_requests
            + assigned_prs
            + assigned_issues
            + failed_ci_runs;
        Self {
            pull_available,
            push_available,
            staged_changes,
            unstaged_changes,
            total_changes,
            unread_notifications,
            pr_review_requests,
            assigned_prs,
            assigned_issues,
            failed_ci_runs,
            remote_total,
            total: pull_available + push_available + total_changes + remote_total,
        }
    }
}

/// Overall CI state over the latest run of every workflow.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
pub enum CiStatus {
    /// At least one workflow's latest run failed.
    Failure,
    /// Nothing failed, but at least one workflow's latest run has not finished.
    InProgress,
    /// Every workflow's latest run finished without failing.
    Success,
}

/// Computes the [NotificationCounts] for the given inputs.
pub fn aggregate(inputs: &AggregateInputs<'_>) -> NotificationCounts {
    let (pull_available, push_available) = inputs
        .sync_status
        .map(|s| (s.behind, s.ahead))
        .unwrap_or_default();

    let failed_ci_runs = latest_per_workflow(inputs.workflow_runs)
        .iter()
        .filter(|run| run.conclusion == Some(RunConclusion::Failure))
        .count() as u32;

    let (pr_review_requests, assigned_prs, assigned_issues) = match inputs.identity {
        Some(identity) => (
            count_where(inputs.pull_requests, |pr| {
                is_open(&pr.state) && pr.requested_reviewers.iter().any(|l| identity.is(l))
            }),
            count_where(inputs.pull_requests, |pr| {
                is_open(&pr.state) && pr.assignees.iter().any(|l| identity.is(l))
            }),
            count_where(inputs.issues, |issue| {
                !issue.is_pull_request
                    && is_open(&issue.state)
                    && issue.assignees.iter().any(|l| identity.is(l))
            }),
        ),
        None => (0, 0, 0),
    };

    NotificationCounts::new(
        pull_available,
        push_available,
        inputs.changes.staged,
        inputs.changes.unstaged,
        inputs.unread_notifications,
        pr_review_requests,
        assigned_prs,
        assigned_issues,
        failed_ci_runs,
    )
}

/// Collapses the runs to the most recent one per workflow id. Runs created at the same instant are
/// ordered by run id. The result is sorted by workflow id.
pub fn latest_per_workflow(runs: &[WorkflowRun]) -> Vec<&WorkflowRun> {
    runs.iter()
        .into_grouping_map_by(|run| run.workflow_id)
        .max_by_key(|_, run| (run.created_at, run.id))
        .into_iter()
        .sorted_by_key(|(workflow_id, _)| *workflow_id)
        .map(|(_, run)| run)
        .collect()
}

/// Summarizes the latest run of every workflow. [None] when there are no runs at all, which is
/// distinct from [CiStatus::Success].
pub fn ci_status(runs: &[WorkflowRun]) -> Option<CiStatus> {
    let latest = latest_per_workflow(runs);
    if latest.is_empty() {
        return None;
    }

    if latest
        .iter()
        .any(|run| run.conclusion == Some(RunConclusion::Failure))
    {
        Some(CiStatus::Failure)
    } else if latest
        .iter()
        .any(|run| run.status.is_some_and(|s| s.is_active()))
    {
        Some(CiStatus::InProgress)
    } else {
        Some(CiStatus::Success)
    }
}

fn count_where<T>(items: &[T], predicate: impl Fn(&T) -> bool) -> u32 {
    items.iter().filter(|item| predicate(item)).count() as u32
}

#[cfg(test)]
mod test {
    use super::{aggregate, ci_status, latest_per_workflow, AggregateInputs, CiStatus};
    use crate::models::{
        ChangeCounts, Identity, Issue, PullRequest, RunConclusion, RunStatus, SyncStatus,
        WorkflowRun,
    };
    use chrono::{TimeZone, Utc};

    fn run(id: u64, workflow_id: u64, minute: u32, conclusion: RunConclusion) -> WorkflowRun {
        WorkflowRun {
            id,
            workflow_id,
            name: None,
            status: Some(RunStatus::Completed),
            conclusion: Some(conclusion),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap(),
            html_url: String::new(),
        }
    }

    fn pr(number: u64, reviewers: &[&str], assignees: &[&str]) -> PullRequest {
        PullRequest {
            number,
            state: "open".to_string(),
            requested_reviewers: reviewers.iter().map(ToString::to_string).collect(),
            assignees: assignees.iter().map(ToString::to_string).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn latest_run_per_workflow_wins() {
        let runs = [
            run(1, 1, 0, RunConclusion::Failure),
            run(2, 1, 5, RunConclusion::Success),
        ];
        let counts = aggregate(&AggregateInputs {
            workflow_runs: &runs,
            ..Default::default()
        });

        assert_eq!(counts.failed_ci_runs, 0);
        assert_eq!(ci_status(&runs), Some(CiStatus::Success));
    }

    #[test]
    fn newer_failure_is_counted_once_per_workflow() {
        let runs = [
            run(1, 1, 0, RunConclusion::Success),
            run(2, 1, 5, RunConclusion::Failure),
            run(3, 2, 1, RunConclusion::Failure),
            run(4, 2, 0, RunConclusion::Failure),
        ];
        assert_eq!(
            aggregate(&AggregateInputs {
                workflow_runs: &runs,
                ..Default::default()
            })
            .failed_ci_runs,
            2
        );
    }

    #[test]
    fn equal_timestamps_break_ties_on_run_id() {
        let runs = [
            run(9, 1, 0, RunConclusion::Failure),
            run(3, 1, 0, RunConclusion::Success),
        ];
        let latest = latest_per_workflow(&runs);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, 9);
    }

    #[test]
    fn empty_runs_have_no_ci_status() {
        assert_eq!(ci_status(&[]), None);
        assert_eq!(aggregate(&AggregateInputs::default()).failed_ci_runs, 0);
    }

    #[test]
    fn unfinished_run_reports_in_progress() {
        let mut pending = run(2, 2, 3, RunConclusion::Success);
        pending.status = Some(RunStatus::InProgress);
        pending.conclusion = None;
        let runs = [run(1, 1, 0, RunConclusion::Success), pending];

        assert_eq!(ci_status(&runs), Some(CiStatus::InProgress));
    }

    #[test]
    fn aggregation_is_idempotent() {
        let sync = SyncStatus {
            ahead: 2,
            behind: 4,
            ..Default::default()
        };
        let runs = [run(1, 1, 0, RunConclusion::Failure)];
        let prs = [pr(1, &["alice"], &["alice"])];
        let alice = Identity {
            login: "alice".to_string(),
        };
        let inputs = AggregateInputs {
            sync_status: Some(&sync),
            workflow_runs: &runs,
            unread_notifications: 7,
            pull_requests: &prs,
            issues: &[],
            identity: Some(&alice),
            changes: ChangeCounts {
                staged: 1,
                unstaged: 1,
            },
        };

        let first = aggregate(&inputs);
        let second = aggregate(&inputs);
        assert_eq!(first, second);
        assert_eq!(
            first.remote_total,
            first.unread_notifications
                + first.pr_review_requests
                + first.assigned_prs
                + first.assigned_issues
                + first.failed_ci_runs
        );
        assert_eq!(
            first.total,
            first.pull_available + first.push_available + first.total_changes + first.remote_total
        );
        assert_eq!(first.total, 4 + 2 + 2 + 7 + 1 + 1 + 1);
    }

    #[test]
    fn absent_upstream_counts_zero() {
        let counts = aggregate(&AggregateInputs::default());
        assert_eq!(counts.pull_available, 0);
        assert_eq!(counts.push_available, 0);
    }

    #[test]
    fn local_changes_without_remote_activity() {
        let counts = aggregate(&AggregateInputs {
            changes: ChangeCounts {
                staged: 3,
                unstaged: 2,
            },
            ..Default::default()
        });

        assert_eq!(counts.pull_available, 0);
        assert_eq!(counts.push_available, 0);
        assert_eq!(counts.staged_changes, 3);
        assert_eq!(counts.unstaged_changes, 2);
        assert_eq!(counts.total_changes, 5);
        assert_eq!(counts.remote_total, 0);
        assert_eq!(counts.total, 5);
    }

    #[test]
    fn review_requests_and_failed_ci() {
        let prs = [
            pr(1, &["alice", "bob"], &[]),
            pr(2, &["Alice"], &[]),
            pr(3, &["bob"], &[]),
        ];
        let runs = [
            run(1, 1, 0, RunConclusion::Failure),
            run(2, 2, 0, RunConclusion::Success),
        ];
        let alice = Identity {
            login: "alice".to_string(),
        };
        let counts = aggregate(&AggregateInputs {
            workflow_runs: &runs,
            pull_requests: &prs,
            identity: Some(&alice),
            ..Default::default()
        });

        assert_eq!(counts.pr_review_requests, 2);
        assert_eq!(counts.failed_ci_runs, 1);
        assert_eq!(counts.remote_total, 3);
    }

    #[test]
    fn unknown_identity_zeroes_assignments() {
        let prs = [pr(1, &["alice"], &["alice"])];
        let issues = [Issue {
            number: 2,
            state: "open".to_string(),
            assignees: vec!["alice".to_string()],
            ..Default::default()
        }];
        let counts = aggregate(&AggregateInputs {
            pull_requests: &prs,
            issues: &issues,
            ..Default::default()
        });

        assert_eq!(counts.pr_review_requests, 0);
        assert_eq!(counts.assigned_prs, 0);
        assert_eq!(counts.assigned_issues, 0);
    }

    #[test]
    fn closed_items_and_pull_request_issues_are_skipped() {
        let mut closed = pr(1, &["alice"], &["alice"]);
        closed.state = "closed".to_string();
        let prs = [closed, pr(2, &[], &["alice"])];
        let issues = [
            Issue {
                number: 3,
                state: "open".to_string(),
                assignees: vec!["alice".to_string()],
                ..Default::default()
            },
            Issue {
                number: 2,
                state: "open".to_string(),
                assignees: vec!["alice".to_string()],
                is_pull_request: true,
                ..Default::default()
            },
        ];
        let alice = Identity {
            login: "alice".to_string(),
        };
        let counts = aggregate(&AggregateInputs {
            pull_requests: &prs,
            issues: &issues,
            identity: Some(&alice),
            ..Default::default()
        });

        assert_eq!(counts.pr_review_requests, 0);
        assert_eq!(counts.assigned_prs, 1);
        assert_eq!(counts.assigned_issues, 1);
    }
}

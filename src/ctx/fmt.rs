//! Contains the formatting logic for a [Snapshot].

use crate::{
    aggregate::CiStatus,
    constants::{ARROW_DOWN, ARROW_UP, EMPTY_CIRCLE, FILLED_CIRCLE},
    coordinator::Snapshot,
};
use nu_ansi_term::Color;
use std::fmt::{Result, Write};

/// Writes `snapshot` as a short status block. `branch` is the checked out branch, if any.
pub fn write_snapshot<W: Write>(w: &mut W, snapshot: &Snapshot, branch: Option<&str>) -> Result {
    let counts = &snapshot.counts;

    // Branch line, with the sync state against the upstream.
    let branch = branch.unwrap_or("(no branch)");
    match snapshot.sync_status.as_ref() {
        Some(status) => {
            let color = if snapshot.is_in_sync {
                Color::Green
            } else {
                Color::Yellow
            };
            writeln!(
                w,
                "{} {} {} {}",
                color.paint(format!("{FILLED_CIRCLE} {branch}")),
                Color::Green.paint(format!("{ARROW_UP}{}", status.ahead)),
                Color::Red.paint(format!("{ARROW_DOWN}{}", status.behind)),
                Color::DarkGray.paint(status.upstream_branch.as_deref().unwrap_or_default())
            )?;
        }
        None => writeln!(
            w,
            "{} {}",
            Color::White.paint(format!("{EMPTY_CIRCLE} {branch}")),
            Color::DarkGray.italic().paint("(no upstream)")
        )?,
    }

    writeln!(
        w,
        "  changes    {} staged, {} unstaged",
        counts.staged_changes, counts.unstaged_changes
    )?;

    if let Some(identity) = snapshot.identity.as_ref() {
        writeln!(w, "  account    {}", Color::Blue.paint(identity.to_string()))?;
    }

    let ci = match snapshot.latest_ci_status {
        Some(CiStatus::Failure) => Color::Red.bold().paint("failing"),
        Some(CiStatus::InProgress) => Color::Yellow.paint("running"),
        Some(CiStatus::Success) => Color::Green.paint("passing"),
        None => Color::DarkGray.paint("no runs"),
    };
    writeln!(w, "  ci         {ci}")?;

    if counts.remote_total > 0 {
        let mut items = Vec::new();
        for (count, label) in [
            (counts.unread_notifications, "unread"),
            (counts.pr_review_requests, "review requests"),
            (counts.assigned_prs, "assigned PRs"),
            (counts.assigned_issues, "assigned issues"),
            (counts.failed_ci_runs, "failed runs"),
        ] {
            if count > 0 {
                items.push(format!("{count} {label}"));
            }
        }
        writeln!(w, "  attention  {}", Color::Cyan.paint(items.join(", ")))?;
    }

    writeln!(w, "  total      {}", Color::White.bold().paint(counts.total.to_string()))
}

#[cfg(test)]
mod test {
    use super::write_snapshot;
    use crate::{
        aggregate::{CiStatus, NotificationCounts},
        coordinator::Snapshot,
        models::{Identity, SyncStatus},
    };

    fn render(snapshot: &Snapshot, branch: Option<&str>) -> String {
        let mut buf = String::new();
        write_snapshot(&mut buf, snapshot, branch).unwrap();
        buf
    }

    #[test]
    fn renders_tracked_branch() {
        let snapshot = Snapshot {
            sync_status: Some(SyncStatus {
                ahead: 1,
                behind: 2,
                remote_name: Some("origin".to_string()),
                upstream_branch: Some("origin/main".to_string()),
            }),
            counts: NotificationCounts::new(2, 1, 3, 2, 4, 1, 0, 0, 1),
            needs_pull: true,
            needs_push: true,
            is_in_sync: false,
            latest_ci_status: Some(CiStatus::Failure),
            identity: Some(Identity {
                login: "alice".to_string(),
            }),
        };

        let out = render(&snapshot, Some("main"));
        assert!(out.contains("● main"));
        assert!(out.contains("↑1"));
        assert!(out.contains("↓2"));
        assert!(out.contains("origin/main"));
        assert!(out.contains("3 staged, 2 unstaged"));
        assert!(out.contains("@alice"));
        assert!(out.contains("failing"));
        assert!(out.contains("4 unread, 1 review requests, 1 failed runs"));
    }

    #[test]
    fn renders_missing_upstream() {
        let snapshot = Snapshot {
            sync_status: None,
            counts: NotificationCounts::new(0, 0, 3, 2, 0, 0, 0, 0, 0),
            needs_pull: false,
            needs_push: false,
            is_in_sync: false,
            latest_ci_status: None,
            identity: None,
        };

        let out = render(&snapshot, None);
        assert!(out.contains("○ (no branch)"));
        assert!(out.contains("(no upstream)"));
        assert!(out.contains("no runs"));
        assert!(!out.contains("attention"));
        assert!(out.contains('5'));
    }
}

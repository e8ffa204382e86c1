//! The `pulse` configuration file.

use crate::{
    constants::{
        DEFAULT_GRACE_MS, DEFAULT_IDENTITY_MS, DEFAULT_NOTIFICATIONS_MS, DEFAULT_SYNC_STATUS_MS,
        DEFAULT_WORKFLOW_MS, PULSE_CFG_FILE_NAME,
    },
    coordinator::ResourceKind,
    errors::{PulseError, PulseResult},
};
use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

/// The persisted configuration for `pulse`.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// Personal access token used for the GitHub API. The `GITHUB_TOKEN` environment variable
    /// takes precedence.
    pub github_token: String,
    /// Polling cadence overrides.
    pub polling: PollingConfig,
}

impl PulseConfig {
    /// Loads the configuration from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> PulseResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|source| PulseError::InvalidConfig {
            path: path.display().to_string(),
            source,
        })
    }

    /// Writes the configuration to `path`.
    pub fn write(&self, path: &Path) -> PulseResult<()> {
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// The GitHub token to use, if any.
    pub fn token(&self) -> Option<String> {
        env::var("GITHUB_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| Some(self.github_token.clone()).filter(|t| !t.is_empty()))
    }
}

/// Polling cadence per resource kind, in milliseconds.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub sync_status_ms: u64,
    pub notifications_ms: u64,
    pub workflow_runs_ms: u64,
    pub pull_requests_ms: u64,
    pub issues_ms: u64,
    pub identity_ms: u64,
    /// How long the timer of a kind outlives its last subscriber. Zero defers the teardown by a
    /// single scheduler tick.
    pub unsubscribe_grace_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            sync_status_ms: DEFAULT_SYNC_STATUS_MS,
            notifications_ms: DEFAULT_NOTIFICATIONS_MS,
            workflow_runs_ms: DEFAULT_WORKFLOW_MS,
            pull_requests_ms: DEFAULT_WORKFLOW_MS,
            issues_ms: DEFAULT_WORKFLOW_MS,
            identity_ms: DEFAULT_IDENTITY_MS,
            unsubscribe_grace_ms: DEFAULT_GRACE_MS,
        }
    }
}

impl PollingConfig {
    /// The polling interval for `kind`. Never zero.
    pub fn interval(&self, kind: ResourceKind) -> Duration {
        let ms = match kind {
            ResourceKind::SyncStatus => self.sync_status_ms,
            ResourceKind::Notifications => self.notifications_ms,
            ResourceKind::WorkflowRuns => self.workflow_runs_ms,
            ResourceKind::PullRequests => self.pull_requests_ms,
            ResourceKind::Issues => self.issues_ms,
            ResourceKind::Identity => self.identity_ms,
        };
        Duration::from_millis(ms.max(1))
    }

    /// The teardown grace window.
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.unsubscribe_grace_ms)
    }

    /// Sets every polling interval to `ms`.
    pub fn with_all_intervals(self, ms: u64) -> Self {
        Self {
            sync_status_ms: ms,
            notifications_ms: ms,
            workflow_runs_ms: ms,
            pull_requests_ms: ms,
            issues_ms: ms,
            identity_ms: ms,
            ..self
        }
    }
}

/// Returns the path to the configuration file in the user's home directory.
pub fn cfg_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(PULSE_CFG_FILE_NAME))
}

#[cfg(test)]
mod test {
    use super::{PollingConfig, PulseConfig};
    use crate::coordinator::ResourceKind;
    use std::time::Duration;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: PulseConfig = toml::from_str(
            r#"
            github_token = "ghp_test"

            [polling]
            sync_status_ms = 5000
            "#,
        )
        .unwrap();

        assert_eq!(cfg.github_token, "ghp_test");
        assert_eq!(
            cfg.polling.interval(ResourceKind::SyncStatus),
            Duration::from_secs(5)
        );
        assert_eq!(
            cfg.polling.interval(ResourceKind::Notifications),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn zero_interval_is_clamped() {
        let polling = PollingConfig::default().with_all_intervals(0);
        assert_eq!(
            polling.interval(ResourceKind::Issues),
            Duration::from_millis(1)
        );
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = PulseConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg, PulseConfig::default());
    }

    #[test]
    fn written_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulse.toml");
        let cfg = PulseConfig {
            github_token: "ghp_abc".to_string(),
            polling: PollingConfig {
                unsubscribe_grace_ms: 0,
                ..Default::default()
            },
        };

        cfg.write(&path).unwrap();
        assert_eq!(PulseConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulse.toml");
        std::fs::write(&path, "github_token = [").unwrap();
        assert!(PulseConfig::load(&path).is_err());
    }
}

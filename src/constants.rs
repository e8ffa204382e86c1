//! Constants for the `pulse` application.

pub(crate) const PULSE_CFG_FILE_NAME: &str = ".pulse.toml";

pub(crate) const DEFAULT_SYNC_STATUS_MS: u64 = 30_000;
pub(crate) const DEFAULT_NOTIFICATIONS_MS: u64 = 60_000;
pub(crate) const DEFAULT_WORKFLOW_MS: u64 = 60_000;
pub(crate) const DEFAULT_IDENTITY_MS: u64 = 300_000;
pub(crate) const DEFAULT_GRACE_MS: u64 = 100;

pub(crate) const GITHUB_API_URL: &str = "https://api.github.com";
pub(crate) const GITHUB_API_VERSION: &str = "2022-11-28";
pub(crate) const USER_AGENT: &str = "pulse";
pub(crate) const HTTP_TIMEOUT_SECS: u64 = 20;
/// Upper bound on notification pages walked per poll.
pub(crate) const MAX_NOTIFICATION_PAGES: u32 = 10;

pub(crate) const FILLED_CIRCLE: char = '●';
pub(crate) const EMPTY_CIRCLE: char = '○';
pub(crate) const ARROW_DOWN: char = '↓';
pub(crate) const ARROW_UP: char = '↑';

//! The subcommands for the `pulse` application.

use clap::Subcommand;

mod status;
pub use status::StatusCmd;

mod watch;
pub use watch::WatchCmd;

mod config;
pub use config::ConfigCmd;

#[derive(Debug, Clone, Eq, PartialEq, Subcommand)]
pub enum Subcommands {
    /// Poll every resource once and print the current status.
    #[clap(alias = "s")]
    Status(StatusCmd),
    /// Keep polling and re-render the status whenever it changes.
    #[clap(alias = "w")]
    Watch(WatchCmd),
    /// Show the configuration, or initialize it when no token is set.
    #[clap(alias = "cfg")]
    Config(ConfigCmd),
}

//! `config` subcommand.

use crate::{config::PulseConfig, errors::PulseResult};
use clap::Args;
use nu_ansi_term::Color::Blue;
use std::path::Path;

/// CLI arguments for the `config` subcommand.
#[derive(Debug, Clone, Eq, PartialEq, Args)]
pub struct ConfigCmd {
    /// Prompt for a new GitHub token even if one is already set.
    #[arg(long)]
    pub reset: bool,
}

impl ConfigCmd {
    /// Run the `config` subcommand.
    pub fn run(self, path: &Path, mut config: PulseConfig) -> PulseResult<()> {
        if self.reset || config.github_token.is_empty() {
            let token = inquire::Password::new("GitHub personal access token:")
                .without_confirmation()
                .with_help_message("Needs the `repo` and `notifications` scopes.")
                .prompt()?;
            config.github_token = token.trim().to_string();
            config.write(path)?;

            println!(
                "Configuration successfully written to: {}",
                Blue.paint(path.display().to_string())
            );
            return Ok(());
        }

        let masked = PulseConfig {
            github_token: "********".to_string(),
            ..config
        };
        println!("{}", Blue.paint(path.display().to_string()));
        print!("{}", toml::to_string_pretty(&masked)?);
        Ok(())
    }
}

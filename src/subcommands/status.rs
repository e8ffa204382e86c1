//! `status` subcommand.

use crate::{
    client::LiveClient,
    coordinator::{Coordinator, ResourceKind},
    ctx::PulseContext,
};
use anyhow::Result;
use clap::Args;
use nu_ansi_term::Color;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::warn;

const DEFAULT_WAIT_MS: u64 = 5_000;
const SETTLE_CHECK: Duration = Duration::from_millis(50);

/// CLI arguments for the `status` subcommand.
#[derive(Debug, Clone, Eq, PartialEq, Args)]
pub struct StatusCmd {
    /// How long to wait for the first round of fetches, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_WAIT_MS)]
    pub wait_ms: u64,
    /// Print the snapshot as JSON.
    #[arg(long)]
    pub json: bool,
    /// Also print the poll state of every resource.
    #[arg(long)]
    pub verbose: bool,
}

impl Default for StatusCmd {
    fn default() -> Self {
        Self {
            wait_ms: DEFAULT_WAIT_MS,
            json: false,
            verbose: false,
        }
    }
}

impl StatusCmd {
    /// Run the `status` subcommand.
    pub async fn run(self, ctx: PulseContext) -> Result<()> {
        let coordinator = &ctx.coordinator;
        let _subscriptions = coordinator.subscribe_all();

        // Wait until every fetchable resource has either a value or an error.
        let mut changed = coordinator.changed();
        let deadline = Instant::now() + Duration::from_millis(self.wait_ms);
        while !settled(coordinator) {
            tokio::select! {
                _ = changed.changed() => {}
                _ = sleep(SETTLE_CHECK) => {}
                _ = sleep_until(deadline) => {
                    warn!("timed out waiting for the first fetches");
                    break;
                }
            }
        }

        if self.json {
            let snapshot = coordinator.snapshot(ctx.change_counts().await?);
            println!("{}", serde_json::to_string_pretty(&*snapshot)?);
        } else {
            ctx.print_status().await?;
        }

        for kind in ResourceKind::ALL {
            if let Some(err) = coordinator.registry().state(kind).last_error {
                eprintln!("{}", Color::Yellow.paint(format!("Could not fetch {kind}: {err}")));
            }
        }

        if self.verbose {
            print_poll_states(coordinator);
        }
        Ok(())
    }
}

fn settled(coordinator: &Coordinator<LiveClient>) -> bool {
    let context = coordinator.context();
    ResourceKind::ALL
        .into_iter()
        .filter(|kind| context.allows(*kind))
        .all(|kind| {
            let state = coordinator.registry().state(kind);
            !state.busy && (state.value.is_some() || state.last_error.is_some())
        })
}

fn print_poll_states(coordinator: &Coordinator<LiveClient>) {
    let context = coordinator.context();
    let registry = coordinator.registry();

    println!();
    for kind in ResourceKind::ALL {
        let state = registry.state(kind);
        let line = if !context.allows(kind) {
            Color::DarkGray.paint("disabled")
        } else if state.busy {
            Color::Yellow.paint("fetching")
        } else {
            match state.last_fetched_at {
                Some(at) => Color::Green.paint(format!("fetched {:.1?} ago", at.elapsed())),
                None => Color::Red.paint("never fetched"),
            }
        };
        println!(
            "{:<14} {} ({} subscribers, {} timer starts)",
            kind.to_string(),
            line,
            state.subscriber_count,
            registry.timer_starts(kind)
        );
    }
}

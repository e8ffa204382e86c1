//! `watch` subcommand.

use crate::{
    coordinator::{PollOutcome, Snapshot},
    ctx::{write_snapshot, PulseContext},
};
use anyhow::Result;
use clap::Args;
use nu_ansi_term::Color;
use std::{sync::Arc, time::Duration};
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, trace, warn};

/// CLI arguments for the `watch` subcommand.
#[derive(Debug, Clone, Eq, PartialEq, Args)]
pub struct WatchCmd {
    /// How often the working tree is recounted and the sync status refetched, in milliseconds.
    #[arg(long, default_value_t = 2_000)]
    pub refresh_ms: u64,
}

impl WatchCmd {
    /// Run the `watch` subcommand. Returns on Ctrl-C.
    pub async fn run(self, ctx: PulseContext) -> Result<()> {
        let coordinator = &ctx.coordinator;
        let subscriptions = coordinator.subscribe_all();
        let mut changed = coordinator.changed();

        let mut recount = time::interval(Duration::from_millis(self.refresh_ms.max(1)));
        recount.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let branch = ctx.branch_name();
        let mut last: Option<Arc<Snapshot>> = None;
        loop {
            let snapshot = coordinator.snapshot(ctx.change_counts().await?);
            if !last.as_ref().is_some_and(|l| Arc::ptr_eq(l, &snapshot)) {
                let mut buf = String::new();
                write_snapshot(&mut buf, &snapshot, branch.as_deref())?;
                println!(
                    "{}\n{}",
                    Color::DarkGray.paint(chrono::Local::now().format("%H:%M:%S").to_string()),
                    buf
                );
                last = Some(snapshot);
            }

            tokio::select! {
                _ = changed.changed() => {}
                _ = recount.tick() => match coordinator.refetch().await {
                    Ok(PollOutcome::Skipped(reason)) => trace!(?reason, "sync refetch skipped"),
                    Ok(_) => {}
                    Err(err) => warn!("{err}"),
                },
                _ = &mut ctrl_c => break,
            }
        }

        info!("stopping");
        drop(subscriptions);
        Ok(())
    }
}

//! Subscription lifecycle: maps acquire/release of a [Subscription] onto the lifetime of the shared
//! timer in the [PollRegistry].

use super::{
    registry::{FetchFn, PollRegistry},
    ResourceKind,
};
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, trace};

/// A live interest in one resource kind. The kind keeps being polled for as long as at least one
/// [Subscription] for it is alive.
///
/// Dropping the handle releases it. When the last subscriber for a kind goes away, the timer is
/// stopped only after the grace window has passed without anybody subscribing again, so a consumer
/// that releases and immediately re-acquires does not restart the timer.
#[must_use = "the resource stops being polled once the subscription is dropped"]
pub struct Subscription {
    registry: Arc<PollRegistry>,
    kind: ResourceKind,
    grace: Duration,
    released: bool,
}

impl Subscription {
    /// The kind this subscription keeps polled.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Releases the subscription now. Equivalent to dropping it.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }

        let Some(generation) = self.registry.detach(self.kind) else {
            return;
        };

        let registry = Arc::clone(&self.registry);
        let kind = self.kind;
        let grace = self.grace;
        trace!(%kind, ?grace, "last subscriber left, scheduling teardown");
        self.registry.runtime().spawn(async move {
            if grace.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(grace).await;
            }
            registry.stop_if_idle(kind, generation);
        });
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("released", &self.released)
            .finish()
    }
}

/// Registers a subscriber for `kind`. The first subscriber starts the timer, which fetches
/// immediately. A subscriber joining a running timer whose value is older than `interval` triggers
/// one extra fetch right away. Subscribing to an unavailable kind only records the subscriber; its
/// timer starts once the kind becomes available.
pub(crate) fn subscribe(
    registry: &Arc<PollRegistry>,
    kind: ResourceKind,
    interval: Duration,
    grace: Duration,
    fetch: FetchFn,
) -> Subscription {
    let attached = registry.attach(kind, interval);

    if !attached.timer_running {
        registry.ensure_timer(kind, interval, fetch);
    } else if attached.stale {
        debug!(%kind, "subscriber joined a stale resource, fetching now");
        if let Err(reason) = registry.start_fetch(kind, &fetch) {
            trace!(%kind, ?reason, "skipped stale fetch");
        }
    }

    Subscription {
        registry: Arc::clone(registry),
        kind,
        grace,
        released: false,
    }
}

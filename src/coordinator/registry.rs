//! The shared poll registry: one slot per [ResourceKind], holding the latest value, the busy flag and
//! the singleton timer for that kind.

use super::{ResourceKind, ResourceValue};
use anyhow::anyhow;
use futures::{future::BoxFuture, FutureExt};
use std::{
    collections::HashMap,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::{
    runtime::Handle,
    sync::watch,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info, trace, warn};

/// Produces a fresh fetch of one resource kind each time it is called.
pub type FetchFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<ResourceValue>> + Send + Sync>;

/// The polled state of a single resource kind.
#[derive(Debug, Clone)]
pub struct ResourceState<T> {
    /// The last successfully fetched value. [None] until the first success, or after a reset.
    pub value: Option<T>,
    /// Whether a fetch is in flight.
    pub busy: bool,
    /// When `value` was last replaced.
    pub last_fetched_at: Option<Instant>,
    /// The number of live [Subscription]s.
    ///
    /// [Subscription]: super::Subscription
    pub subscriber_count: usize,
    /// The most recent fetch failure, cleared by the next success.
    pub last_error: Option<String>,
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            value: None,
            busy: false,
            last_fetched_at: None,
            subscriber_count: 0,
            last_error: None,
        }
    }
}

impl<T> ResourceState<T> {
    /// Whether a joining subscriber should trigger an immediate fetch. A value that was never
    /// fetched is stale unless a fetch is already in flight.
    pub fn is_stale(&self, interval: Duration, now: Instant) -> bool {
        match self.last_fetched_at {
            Some(at) => now.saturating_duration_since(at) >= interval,
            None => !self.busy,
        }
    }
}

/// Why a poll did not reach the resource client.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SkipReason {
    /// A fetch for the same kind is still in flight.
    Busy,
    /// The repository or account the kind depends on is not available.
    Unavailable,
}

/// The result of one guarded poll.
#[derive(Debug)]
pub enum PollOutcome {
    /// The fetch succeeded and its value was recorded.
    Fetched,
    /// The fetch failed. The previous value was kept.
    Failed(anyhow::Error),
    /// No fetch was issued.
    Skipped(SkipReason),
    /// The context was cleared while the fetch was in flight, and its result was dropped.
    Discarded,
}

/// Per-kind bookkeeping beyond the public [ResourceState].
#[derive(Default)]
struct Slot {
    state: ResourceState<ResourceValue>,
    available: bool,
    /// Bumped whenever the context the kind depends on is cleared. Fetches started in an older
    /// epoch are not recorded.
    epoch: u64,
    timer: Option<JoinHandle<()>>,
    timer_starts: u64,
    /// Bumped on every attach and detach, so a deferred teardown can tell whether it is still
    /// the latest one.
    generation: u64,
    pending_teardown: Option<u64>,
}

impl Slot {
    fn timer_running(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }
}

/// Read-only view over the recorded values, handed out by [PollRegistry::read].
pub(crate) struct Values<'a>(&'a HashMap<ResourceKind, Slot>);

impl<'a> Values<'a> {
    pub(crate) fn get(&self, kind: ResourceKind) -> Option<&'a ResourceValue> {
        self.0.get(&kind).and_then(|slot| slot.state.value.as_ref())
    }
}

/// What [PollRegistry::attach] observed when a subscriber joined.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Attached {
    pub(crate) timer_running: bool,
    pub(crate) stale: bool,
}

/// Owner of every polled value. The aggregator and the facade only read from it.
pub struct PollRegistry {
    slots: Mutex<HashMap<ResourceKind, Slot>>,
    version: watch::Sender<u64>,
    runtime: Handle,
}

impl PollRegistry {
    /// Creates an empty registry that spawns its timers and fetches onto `runtime`.
    pub fn new(runtime: Handle) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            slots: Mutex::new(HashMap::new()),
            version,
            runtime,
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ResourceKind, Slot>> {
        // Slots stay consistent across a poisoning panic; every mutation is a field assignment.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    /// The current registry version. It changes whenever a recorded value changes.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// A receiver that is notified whenever a recorded value changes.
    pub fn changed(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// A copy of the current state of `kind`.
    pub fn state(&self, kind: ResourceKind) -> ResourceState<ResourceValue> {
        self.slots()
            .get(&kind)
            .map(|slot| slot.state.clone())
            .unwrap_or_default()
    }

    /// Runs `f` over the current values while holding the registry lock, and returns its result
    /// together with the version those values belong to.
    pub(crate) fn read<R>(&self, f: impl FnOnce(Values<'_>) -> R) -> (u64, R) {
        let slots = self.slots();
        let version = self.version();
        (version, f(Values(&slots)))
    }

    /// Whether a timer is currently running for `kind`.
    pub fn is_polling(&self, kind: ResourceKind) -> bool {
        self.slots().get(&kind).is_some_and(Slot::timer_running)
    }

    /// How many timers have ever been started for `kind`.
    pub fn timer_starts(&self, kind: ResourceKind) -> u64 {
        self.slots().get(&kind).map_or(0, |s| s.timer_starts)
    }

    /// Marks `kind` as fetchable or not. Making it unavailable stops its timer, clears its value
    /// and drops the result of any fetch already in flight.
    ///
    /// Returns `true` if the availability changed.
    pub fn set_available(&self, kind: ResourceKind, available: bool) -> bool {
        let mut slots = self.slots();
        let slot = slots.entry(kind).or_default();
        if slot.available == available {
            return false;
        }
        slot.available = available;

        if !available {
            let had_value = slot.state.value.is_some();
            slot.epoch += 1;
            slot.state.value = None;
            slot.state.last_fetched_at = None;
            slot.state.last_error = None;
            Self::stop_timer(slot, kind);
            debug!(%kind, "cleared resource");
            if had_value {
                self.bump_version();
            }
        }
        true
    }

    /// Starts the singleton timer for `kind` unless one is already running or the kind is
    /// unavailable. The first fetch is issued immediately; after that the timer polls every
    /// `interval`.
    ///
    /// Returns `true` if a timer was started.
    pub fn ensure_timer(self: &Arc<Self>, kind: ResourceKind, interval: Duration, fetch: FetchFn) -> bool {
        {
            let mut slots = self.slots();
            let slot = slots.entry(kind).or_default();
            if slot.timer_running() {
                return false;
            }
            if !slot.available {
                trace!(%kind, "unavailable, not starting a timer");
                return false;
            }

            let registry = Arc::downgrade(self);
            let timer_fetch = Arc::clone(&fetch);
            slot.timer = Some(self.runtime.spawn(async move {
                let mut ticker = time::interval_at(Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    let Some(registry) = registry.upgrade() else {
                        return;
                    };
                    if let Err(reason) = registry.start_fetch(kind, &timer_fetch) {
                        trace!(%kind, ?reason, "skipped tick");
                    }
                }
            }));
            slot.timer_starts += 1;
            info!(%kind, ?interval, "started poll timer");
        }

        if let Err(reason) = self.start_fetch(kind, &fetch) {
            trace!(%kind, ?reason, "skipped initial fetch");
        }
        true
    }

    /// Stops the timer for `kind`. A fetch already in flight still completes and is recorded.
    fn stop_timer(slot: &mut Slot, kind: ResourceKind) {
        if let Some(timer) = slot.timer.take() {
            timer.abort();
            info!(%kind, "stopped poll timer");
        }
    }

    /// Issues one fetch for `kind` unless another is in flight or the kind is unavailable. The fetch
    /// runs on its own task, so stopping the timer never cancels it.
    pub(crate) fn start_fetch(
        self: &Arc<Self>,
        kind: ResourceKind,
        fetch: &FetchFn,
    ) -> Result<JoinHandle<PollOutcome>, SkipReason> {
        let mut epoch = {
            let mut slots = self.slots();
            let slot = slots.entry(kind).or_default();
            if !slot.available {
                return Err(SkipReason::Unavailable);
            }
            if slot.state.busy {
                return Err(SkipReason::Busy);
            }
            slot.state.busy = true;
            slot.epoch
        };

        let registry = Arc::clone(self);
        let fetch = Arc::clone(fetch);
        Ok(self.runtime.spawn(async move {
            loop {
                debug!(%kind, "fetching");
                let result = AssertUnwindSafe(fetch())
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(anyhow!("fetch of {kind} panicked")));

                match registry.record_result(kind, epoch, result) {
                    Recorded::Outcome(outcome) => return outcome,
                    Recorded::Retry(next) => epoch = next,
                }
            }
        }))
    }

    /// Issues one fetch for `kind` and waits for its outcome.
    pub async fn poll(self: &Arc<Self>, kind: ResourceKind, fetch: &FetchFn) -> PollOutcome {
        match self.start_fetch(kind, fetch) {
            Ok(handle) => handle
                .await
                .unwrap_or_else(|e| PollOutcome::Failed(anyhow!("fetch of {kind} was cancelled: {e}"))),
            Err(reason) => PollOutcome::Skipped(reason),
        }
    }

    /// Records the result of a fetch started in `epoch`.
    ///
    /// A success replaces the value and stamps the fetch time. A failure keeps the previous value
    /// and is only logged.
    fn record_result(
        &self,
        kind: ResourceKind,
        epoch: u64,
        result: anyhow::Result<ResourceValue>,
    ) -> Recorded {
        let mut slots = self.slots();
        let slot = slots.entry(kind).or_default();

        if slot.epoch != epoch {
            // The context changed while this fetch was in flight. Fetch again for the new context
            // if anybody is still listening, keeping the busy flag held.
            if slot.available && slot.state.subscriber_count > 0 {
                debug!(%kind, "context changed during fetch, refetching");
                return Recorded::Retry(slot.epoch);
            }
            slot.state.busy = false;
            debug!(%kind, "dropped result from a cleared context");
            return Recorded::Outcome(PollOutcome::Discarded);
        }

        slot.state.busy = false;
        match result {
            Ok(value) => {
                slot.state.last_fetched_at = Some(Instant::now());
                slot.state.last_error = None;
                if slot.state.value.as_ref() != Some(&value) {
                    slot.state.value = Some(value);
                    self.bump_version();
                }
                Recorded::Outcome(PollOutcome::Fetched)
            }
            Err(err) => {
                warn!(%kind, "fetch failed, keeping previous value: {err:#}");
                slot.state.last_error = Some(format!("{err:#}"));
                Recorded::Outcome(PollOutcome::Failed(err))
            }
        }
    }

    /// Registers a subscriber for `kind` and cancels any pending teardown.
    pub(crate) fn attach(&self, kind: ResourceKind, interval: Duration) -> Attached {
        let mut slots = self.slots();
        let slot = slots.entry(kind).or_default();
        slot.state.subscriber_count += 1;
        slot.generation += 1;
        slot.pending_teardown = None;

        Attached {
            timer_running: slot.timer_running(),
            stale: slot.state.is_stale(interval, Instant::now()),
        }
    }

    /// Unregisters a subscriber. When the count reaches zero, returns the generation that the
    /// deferred teardown must still observe before it may stop the timer.
    pub(crate) fn detach(&self, kind: ResourceKind) -> Option<u64> {
        let mut slots = self.slots();
        let slot = slots.get_mut(&kind)?;
        slot.state.subscriber_count = slot.state.subscriber_count.saturating_sub(1);
        if slot.state.subscriber_count > 0 {
            return None;
        }

        slot.generation += 1;
        slot.pending_teardown = Some(slot.generation);
        Some(slot.generation)
    }

    /// Stops the timer for `kind` if nobody subscribed since the teardown for `generation` was
    /// scheduled.
    pub(crate) fn stop_if_idle(&self, kind: ResourceKind, generation: u64) -> bool {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(&kind) else {
            return false;
        };
        if slot.state.subscriber_count != 0 || slot.pending_teardown != Some(generation) {
            trace!(%kind, "teardown superseded by a new subscriber");
            return false;
        }

        slot.pending_teardown = None;
        Self::stop_timer(slot, kind);
        true
    }

    /// The handle timers and fetches are spawned on.
    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }
}

impl Drop for PollRegistry {
    fn drop(&mut self) {
        let slots = self.slots.get_mut().unwrap_or_else(|e| e.into_inner());
        for (kind, slot) in slots.iter_mut() {
            Self::stop_timer(slot, *kind);
        }
    }
}

enum Recorded {
    Outcome(PollOutcome),
    Retry(u64),
}

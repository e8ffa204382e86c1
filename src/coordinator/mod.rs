//! The polling coordinator: shares one poller per resource kind across any number of subscribers
//! and derives a single [Snapshot] from whatever the pollers last recorded.

use crate::{
    aggregate::{aggregate, ci_status, AggregateInputs, CiStatus, NotificationCounts},
    client::{fetch_resource, ResourceClient},
    config::PollingConfig,
    errors::{PulseError, PulseResult},
    models::{ChangeCounts, Identity, Issue, PullRequest, SyncStatus, WorkflowRun},
};
use futures::FutureExt;
use serde::Serialize;
use std::{
    fmt::Display,
    sync::{Arc, Mutex},
};
use tokio::{runtime::Handle, sync::watch};
use tracing::{debug, info};

mod registry;
pub use registry::{PollOutcome, PollRegistry, ResourceState, SkipReason};
use registry::FetchFn;

mod subscription;
pub use subscription::Subscription;

/// A category of polled data.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize)]
pub enum ResourceKind {
    SyncStatus,
    Notifications,
    WorkflowRuns,
    PullRequests,
    Issues,
    Identity,
}

impl ResourceKind {
    /// Every resource kind, in display order.
    pub const ALL: [ResourceKind; 6] = [
        Self::SyncStatus,
        Self::Notifications,
        Self::WorkflowRuns,
        Self::PullRequests,
        Self::Issues,
        Self::Identity,
    ];

    /// Whether fetching this kind needs an open repository.
    pub fn needs_repository(self) -> bool {
        matches!(
            self,
            Self::SyncStatus | Self::WorkflowRuns | Self::PullRequests | Self::Issues
        )
    }

    /// Whether fetching this kind needs an authenticated account.
    pub fn needs_identity(self) -> bool {
        !matches!(self, Self::SyncStatus)
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SyncStatus => "sync status",
            Self::Notifications => "notifications",
            Self::WorkflowRuns => "workflow runs",
            Self::PullRequests => "pull requests",
            Self::Issues => "issues",
            Self::Identity => "identity",
        };
        f.write_str(name)
    }
}

/// The payload recorded for one [ResourceKind].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ResourceValue {
    SyncStatus(Option<SyncStatus>),
    UnreadNotifications(u32),
    WorkflowRuns(Vec<WorkflowRun>),
    PullRequests(Vec<PullRequest>),
    Issues(Vec<Issue>),
    Identity(Option<Identity>),
}

/// Which outer context is currently available. Kinds whose context is missing are never fetched
/// and read as empty.
#[derive(Default, Debug, Clone, Copy, Eq, PartialEq)]
pub struct SessionContext {
    pub repository_open: bool,
    pub authenticated: bool,
}

impl SessionContext {
    /// Whether `kind` may be fetched in this context.
    pub fn allows(&self, kind: ResourceKind) -> bool {
        (!kind.needs_repository() || self.repository_open)
            && (!kind.needs_identity() || self.authenticated)
    }
}

/// The derived state every consumer reads.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Snapshot {
    pub sync_status: Option<SyncStatus>,
    pub counts: NotificationCounts,
    pub needs_pull: bool,
    pub needs_push: bool,
    pub is_in_sync: bool,
    pub latest_ci_status: Option<CiStatus>,
    pub identity: Option<Identity>,
}

/// Cached snapshot, valid for one registry version and one set of local counts.
struct CachedSnapshot {
    version: u64,
    changes: ChangeCounts,
    snapshot: Arc<Snapshot>,
}

/// The process-wide coordinator. Cheap to clone; clones share the same registry.
pub struct Coordinator<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for Coordinator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<C> {
    client: Arc<C>,
    registry: Arc<PollRegistry>,
    polling: PollingConfig,
    context: Mutex<SessionContext>,
    cache: Mutex<Option<CachedSnapshot>>,
}

impl<C: ResourceClient> Coordinator<C> {
    /// Creates a coordinator polling `client`. Must be called from within a tokio runtime, which is
    /// where the timers and fetches run.
    pub fn new(client: Arc<C>, polling: PollingConfig, context: SessionContext) -> PulseResult<Self> {
        let registry = Arc::new(PollRegistry::new(Handle::try_current()?));
        for kind in ResourceKind::ALL {
            registry.set_available(kind, context.allows(kind));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                registry,
                polling,
                context: Mutex::new(context),
                cache: Mutex::new(None),
            }),
        })
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<PollRegistry> {
        &self.inner.registry
    }

    fn fetcher(&self, kind: ResourceKind) -> FetchFn {
        let client = Arc::clone(&self.inner.client);
        Arc::new(move || {
            let client = Arc::clone(&client);
            async move { fetch_resource(client.as_ref(), kind).await }.boxed()
        })
    }

    /// Subscribes to `kind`, keeping it polled until the returned handle is dropped.
    pub fn subscribe(&self, kind: ResourceKind) -> Subscription {
        subscription::subscribe(
            &self.inner.registry,
            kind,
            self.inner.polling.interval(kind),
            self.inner.polling.grace(),
            self.fetcher(kind),
        )
    }

    /// Subscribes to every resource kind.
    pub fn subscribe_all(&self) -> Vec<Subscription> {
        ResourceKind::ALL
            .into_iter()
            .map(|kind| self.subscribe(kind))
            .collect()
    }

    /// Polls the sync status right away, outside the timer. Shares the busy guard with the timer:
    /// if a fetch is already in flight, nothing is issued.
    pub async fn refetch(&self) -> PulseResult<PollOutcome> {
        self.refresh(ResourceKind::SyncStatus).await
    }

    /// Polls `kind` right away, outside the timer. A failed fetch is returned as an error, while
    /// the previously recorded value stays in place.
    pub async fn refresh(&self, kind: ResourceKind) -> PulseResult<PollOutcome> {
        match self.inner.registry.poll(kind, &self.fetcher(kind)).await {
            PollOutcome::Failed(source) => Err(PulseError::Refresh { kind, source }),
            outcome => Ok(outcome),
        }
    }

    /// A receiver that changes whenever new data has been recorded.
    pub fn changed(&self) -> watch::Receiver<u64> {
        self.inner.registry.changed()
    }

    /// The current session context.
    pub fn context(&self) -> SessionContext {
        *self.inner.context.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A repository was opened.
    pub fn open_repository(&self) {
        self.update_context(|ctx| ctx.repository_open = true);
    }

    /// The repository was closed. Repository-bound resources reset to empty.
    pub fn close_repository(&self) {
        self.update_context(|ctx| ctx.repository_open = false);
    }

    /// The user authenticated.
    pub fn login(&self) {
        self.update_context(|ctx| ctx.authenticated = true);
    }

    /// The user logged out. Account-bound resources reset to empty.
    pub fn logout(&self) {
        self.update_context(|ctx| ctx.authenticated = false);
    }

    fn update_context(&self, f: impl FnOnce(&mut SessionContext)) {
        let context = {
            let mut context = self.inner.context.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut context);
            *context
        };
        info!(?context, "session context changed");

        let registry = &self.inner.registry;
        for kind in ResourceKind::ALL {
            let allowed = context.allows(kind);
            if !registry.set_available(kind, allowed) || !allowed {
                continue;
            }

            // Kinds that just became available start polling right away for current subscribers.
            if registry.state(kind).subscriber_count > 0 {
                debug!(%kind, "context available, fetching now");
                let fetch = self.fetcher(kind);
                let interval = self.inner.polling.interval(kind);
                if !registry.ensure_timer(kind, interval, Arc::clone(&fetch)) {
                    if let Err(reason) = registry.start_fetch(kind, &fetch) {
                        debug!(%kind, ?reason, "skipped fetch");
                    }
                }
            }
        }
    }

    /// Returns the current snapshot for the given local working tree counts.
    ///
    /// Repeated calls return the same [Arc] until new data is recorded or `changes` differ, so
    /// consumers can compare snapshots by pointer.
    pub fn snapshot(&self, changes: ChangeCounts) -> Arc<Snapshot> {
        let mut cache = self.inner.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = cache.as_ref() {
            if cached.version == self.inner.registry.version() && cached.changes == changes {
                return Arc::clone(&cached.snapshot);
            }
        }

        let (version, snapshot) = self.inner.registry.read(|values| {
            let sync_status = match values.get(ResourceKind::SyncStatus) {
                Some(ResourceValue::SyncStatus(status)) => status.as_ref(),
                _ => None,
            };
            let workflow_runs = match values.get(ResourceKind::WorkflowRuns) {
                Some(ResourceValue::WorkflowRuns(runs)) => runs.as_slice(),
                _ => &[],
            };
            let unread_notifications = match values.get(ResourceKind::Notifications) {
                Some(ResourceValue::UnreadNotifications(count)) => *count,
                _ => 0,
            };
            let pull_requests = match values.get(ResourceKind::PullRequests) {
                Some(ResourceValue::PullRequests(prs)) => prs.as_slice(),
                _ => &[],
            };
            let issues = match values.get(ResourceKind::Issues) {
                Some(ResourceValue::Issues(issues)) => issues.as_slice(),
                _ => &[],
            };
            let identity = match values.get(ResourceKind::Identity) {
                Some(ResourceValue::Identity(identity)) => identity.as_ref(),
                _ => None,
            };

            let counts = aggregate(&AggregateInputs {
                sync_status,
                workflow_runs,
                unread_notifications,
                pull_requests,
                issues,
                identity,
                changes,
            });

            Snapshot {
                sync_status: sync_status.cloned(),
                counts,
                needs_pull: counts.pull_available > 0,
                needs_push: counts.push_available > 0,
                is_in_sync: sync_status.is_some_and(|s| s.ahead == 0 && s.behind == 0),
                latest_ci_status: ci_status(workflow_runs),
                identity: identity.cloned(),
            }
        });

        let snapshot = Arc::new(snapshot);
        *cache = Some(CachedSnapshot {
            version,
            changes,
            snapshot: Arc::clone(&snapshot),
        });
        snapshot
    }
}

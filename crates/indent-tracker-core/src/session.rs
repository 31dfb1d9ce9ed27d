//! Per-client sync engine.
//!
//! A session subscribes the indent collection and both config documents,
//! drives each feed on its own task, and folds every delivered value into
//! one [`TrackerState`] held in a watch channel. Reads come from that
//! replica; writes go to the store and come back through the feeds.
//!
//! ```text
//!   store ──indents──▶ task ─┐
//!   store ──units────▶ task ─┼─▶ watch<TrackerState> ─▶ view / changes
//!   store ──appInfo──▶ task ─┘
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config_store::{AppInfoDocument, ConfigError, UnitsDocument};
use crate::lifecycle::{plan_transition, LifecycleEvent, TransitionError};
use crate::models::{AppInfo, Indent, IndentStatus, NewIndent, UnitConfig, ValidationError};
use crate::projection::{self, ViewQuery};
use crate::repository::{IndentRepository, RepositoryError};
use crate::store::{RemoteStore, StoreError, Subscription};

/// Session errors.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Indent {id} is {status}; only DONE indents can be announced")]
    NotReady { id: String, status: IndentStatus },

    #[error("{feed} feed failed: {reason}")]
    FeedFailed { feed: Feed, reason: String },

    #[error("Session closed")]
    Closed,
}

pub type TrackerResult<T> = Result<T, TrackerError>;

/// The three subscriptions a session keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feed {
    Indents,
    Units,
    AppInfo,
}

impl Feed {
    pub const ALL: [Feed; 3] = [Feed::Indents, Feed::Units, Feed::AppInfo];
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Feed::Indents => "indents",
            Feed::Units => "units",
            Feed::AppInfo => "appInfo",
        })
    }
}

/// Health of one feed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeedHealth {
    #[default]
    Connecting,
    Live,
    /// The subscription died; data from before the failure is kept.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedState {
    pub health: FeedHealth,
    /// At least one value has been delivered.
    pub loaded: bool,
}

/// Replica of everything the session watches.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerState {
    pub indents: Vec<Indent>,
    pub units: UnitConfig,
    pub app_info: AppInfo,
    pub feeds: BTreeMap<Feed, FeedState>,
}

impl Default for TrackerState {
    fn default() -> Self {
        Self {
            indents: Vec::new(),
            units: UnitConfig::default(),
            app_info: AppInfo::builtin(),
            feeds: Feed::ALL.iter().map(|f| (*f, FeedState::default())).collect(),
        }
    }
}

impl TrackerState {
    pub fn feed(&self, feed: Feed) -> FeedState {
        self.feeds.get(&feed).cloned().unwrap_or_default()
    }

    /// Every feed has delivered a value.
    pub fn is_ready(&self) -> bool {
        Feed::ALL.iter().all(|f| self.feed(*f).loaded)
    }

    /// First feed that failed before delivering anything.
    fn failed_before_ready(&self) -> Option<(Feed, String)> {
        Feed::ALL.iter().find_map(|f| match self.feed(*f) {
            FeedState {
                health: FeedHealth::Failed(reason),
                loaded: false,
            } => Some((*f, reason)),
            _ => None,
        })
    }

    pub fn find(&self, id: &str) -> Option<&Indent> {
        self.indents.iter().find(|i| i.id == id)
    }

    fn set_health(&mut self, feed: Feed, health: FeedHealth) {
        self.feeds.entry(feed).or_default().health = health;
    }
}

/// One client's synchronized view of the tracker.
///
/// Dropping the session aborts its feed tasks.
pub struct TrackerSession {
    repo: IndentRepository,
    units: UnitsDocument,
    app_info: AppInfoDocument,
    state: Arc<watch::Sender<TrackerState>>,
    tasks: Mutex<HashMap<Feed, JoinHandle<()>>>,
}

impl TrackerSession {
    /// Subscribe every feed. Must be called within a Tokio runtime.
    pub fn start(store: Arc<dyn RemoteStore>) -> Self {
        let (state, _) = watch::channel(TrackerState::default());
        let session = Self {
            repo: IndentRepository::new(Arc::clone(&store)),
            units: UnitsDocument::new(Arc::clone(&store)),
            app_info: AppInfoDocument::new(store),
            state: Arc::new(state),
            tasks: Mutex::new(HashMap::new()),
        };
        for feed in Feed::ALL {
            session.spawn_feed(feed);
        }
        session
    }

    /// Wait until every feed has delivered its first value.
    ///
    /// Fails if a feed dies before delivering anything.
    pub async fn ready(&self) -> TrackerResult<()> {
        let mut rx = self.state.subscribe();
        let outcome = rx
            .wait_for(|s| s.is_ready() || s.failed_before_ready().is_some())
            .await
            .map_err(|_| TrackerError::Closed)?
            .failed_before_ready();
        match outcome {
            Some((feed, reason)) => Err(TrackerError::FeedFailed { feed, reason }),
            None => Ok(()),
        }
    }

    /// Copy of the current replica.
    pub fn snapshot(&self) -> TrackerState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every replica change.
    pub fn changes(&self) -> watch::Receiver<TrackerState> {
        self.state.subscribe()
    }

    /// Filtered, sorted indents from the current replica.
    pub fn view(&self, query: &ViewQuery) -> Vec<Indent> {
        projection::project(&self.state.borrow().indents, query)
    }

    pub fn indent(&self, id: &str) -> Option<Indent> {
        self.state.borrow().find(id).cloned()
    }

    /// The indent a ready notification would announce; it must be DONE.
    pub fn ready_for_notification(&self, id: &str) -> TrackerResult<Indent> {
        let indent = self
            .indent(id)
            .ok_or_else(|| TransitionError::UnknownIndent(id.to_string()))?;
        if indent.status != IndentStatus::Done {
            return Err(TrackerError::NotReady {
                id: id.to_string(),
                status: indent.status,
            });
        }
        Ok(indent)
    }

    pub fn feed_health(&self, feed: Feed) -> FeedHealth {
        self.state.borrow().feed(feed).health
    }

    // =========================================================================
    // Indent writes
    // =========================================================================

    /// Validate and submit a new indent; returns its id.
    pub async fn add_indent(
        &self,
        unit: &str,
        ward: &str,
        staff: &str,
        category: &str,
    ) -> TrackerResult<String> {
        let indent = NewIndent::new(unit, ward, staff, category)?;
        indent.validate_against(&self.units())?;
        Ok(self.repo.add(indent, Utc::now()).await?)
    }

    pub async fn mark_ready(&self, id: &str) -> TrackerResult<()> {
        self.transition(id, LifecycleEvent::MarkReady).await
    }

    pub async fn confirm_pickup(&self, id: &str, collector: &str) -> TrackerResult<()> {
        self.transition(
            id,
            LifecycleEvent::ConfirmPickup {
                collector: collector.to_string(),
            },
        )
        .await
    }

    pub async fn annotate(&self, id: &str, note: &str) -> TrackerResult<()> {
        self.transition(
            id,
            LifecycleEvent::Annotate {
                note: note.to_string(),
            },
        )
        .await
    }

    /// Plan `event` from the latest known status and send the update.
    ///
    /// Rejected events write nothing. The replica may be stale; a concurrent
    /// writer's update to the same indent is overwritten field by field.
    async fn transition(&self, id: &str, event: LifecycleEvent) -> TrackerResult<()> {
        let status = self
            .indent(id)
            .map(|i| i.status)
            .ok_or_else(|| TransitionError::UnknownIndent(id.to_string()))?;
        let patch = plan_transition(status, &event, Utc::now()).inspect_err(|e| {
            tracing::debug!(%id, event = event.name(), error = %e, "transition rejected")
        })?;
        self.repo.apply_update(id, &patch).await?;
        tracing::debug!(%id, event = event.name(), "transition sent");
        Ok(())
    }

    pub async fn remove_indent(&self, id: &str) -> TrackerResult<()> {
        Ok(self.repo.remove(id).await?)
    }

    /// Delete every collected indent. Best effort; see
    /// [`IndentRepository::remove_many`].
    pub async fn clear_collected(&self) -> TrackerResult<usize> {
        let ids = projection::collected_ids(&self.state.borrow().indents);
        Ok(self.repo.remove_many(ids).await?)
    }

    /// Delete every indent in the replica.
    pub async fn clear_all(&self) -> TrackerResult<usize> {
        let ids: Vec<String> = self.state.borrow().indents.iter().map(|i| i.id.clone()).collect();
        Ok(self.repo.remove_many(ids).await?)
    }

    // =========================================================================
    // Config
    // =========================================================================

    pub fn units(&self) -> UnitConfig {
        self.state.borrow().units.clone()
    }

    /// Overwrite the unit map. Last write wins across clients.
    pub async fn save_units(&self, units: &UnitConfig) -> TrackerResult<()> {
        Ok(self.units.save(units).await?)
    }

    /// Add or replace one unit on top of the current map.
    pub async fn add_unit(&self, name: &str, categories_csv: &str) -> TrackerResult<()> {
        let next = self.units().with_unit(name, categories_csv)?;
        self.save_units(&next).await
    }

    pub async fn remove_unit(&self, name: &str) -> TrackerResult<()> {
        let next = self.units().without_unit(name)?;
        self.save_units(&next).await
    }

    pub fn app_info(&self) -> AppInfo {
        self.state.borrow().app_info.clone()
    }

    pub async fn save_app_name(&self, name: &str) -> TrackerResult<()> {
        let info = AppInfo::named(name)?;
        Ok(self.app_info.save(&info).await?)
    }

    /// Indent count per unit, the input of the workload summary.
    pub fn workload_by_unit(&self) -> BTreeMap<String, usize> {
        projection::workload_by_unit(&self.state.borrow().indents)
    }

    // =========================================================================
    // Feeds
    // =========================================================================

    /// Restart every failed feed; returns the feeds restarted.
    pub fn resubscribe(&self) -> Vec<Feed> {
        let failed: Vec<Feed> = Feed::ALL
            .into_iter()
            .filter(|f| matches!(self.feed_health(*f), FeedHealth::Failed(_)))
            .collect();
        for feed in &failed {
            tracing::info!(%feed, "resubscribing");
            self.spawn_feed(*feed);
        }
        failed
    }

    fn spawn_feed(&self, feed: Feed) {
        let state = Arc::clone(&self.state);
        state.send_modify(|s| s.set_health(feed, FeedHealth::Connecting));

        let handle = match feed {
            Feed::Indents => {
                let repo = self.repo.clone();
                tokio::spawn(run_feed(
                    feed,
                    state,
                    async move { repo.subscribe_all().await },
                    |s, indents| s.indents = indents,
                ))
            }
            Feed::Units => {
                let doc = self.units.clone();
                tokio::spawn(run_feed(
                    feed,
                    state,
                    async move { doc.subscribe().await },
                    |s, units| s.units = units,
                ))
            }
            Feed::AppInfo => {
                let doc = self.app_info.clone();
                tokio::spawn(run_feed(
                    feed,
                    state,
                    async move { doc.subscribe().await },
                    |s, info| s.app_info = info,
                ))
            }
        };

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = tasks.insert(feed, handle) {
            previous.abort();
        }
    }
}

impl Drop for TrackerSession {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }
}

/// Pump one subscription into the replica until it fails or ends.
async fn run_feed<T, E, F>(
    feed: Feed,
    state: Arc<watch::Sender<TrackerState>>,
    subscribe: F,
    apply: fn(&mut TrackerState, T),
) where
    F: Future<Output = Result<Subscription<T>, E>>,
    E: fmt::Display,
{
    let mut sub = match subscribe.await {
        Ok(sub) => sub,
        Err(e) => return mark_failed(&state, feed, e.to_string()),
    };

    while let Some(item) = sub.next().await {
        match item {
            Ok(value) => state.send_modify(|s| {
                apply(s, value);
                let entry = s.feeds.entry(feed).or_default();
                entry.health = FeedHealth::Live;
                entry.loaded = true;
            }),
            Err(e) => return mark_failed(&state, feed, e.to_string()),
        }
    }
    mark_failed(&state, feed, "feed ended".to_string());
}

fn mark_failed(state: &watch::Sender<TrackerState>, feed: Feed, reason: String) {
    tracing::error!(%feed, %reason, "feed failed");
    state.send_modify(|s| s.set_health(feed, FeedHealth::Failed(reason)));
}

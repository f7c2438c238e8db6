//! Session Continuity Manager.
//!
//! Snapshots groups and the active group id as a metadata-only [`SessionRecord`]
//! into both the primary and the durable store, restores it on startup, and
//! suppresses snapshots while a restore or cold start is in progress so a
//! transient empty state never overwrites a good backup.
//!
//! Tabs recreated as ghosts by a restore have no live counterpart yet, so they
//! are held as pending and folded back into every snapshot until the user
//! reopens them, their group is deleted, or the session is cleared.
//!
//! The two writes are independent best-effort copies. The durable copy is
//! consulted first when asking whether a session exists, since it outlives
//! clears of the primary store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::browser::UrlPolicy;
use crate::database::store::{get_typed, keys, set_typed, KeyValueStore};
use crate::managers::group_repository::GroupRepository;
use crate::types::browser::normalize_container;
use crate::types::errors::CoreError;
use crate::types::group::Group;
use crate::types::session::{
    RestoredSession, SessionGroup, SessionInfo, SessionRecord, SessionSource, SessionTab,
};

/// Why a save did or did not happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved {
        timestamp: i64,
        primary: bool,
        durable: bool,
    },
    SuppressedRestoring,
    SuppressedStartingUp,
}

/// Which suppression window a [`SuppressionGuard`] holds open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    Restoring,
    StartingUp,
}

/// Clears its suppression flag when dropped.
pub struct SuppressionGuard<'a> {
    manager: &'a SessionManager,
    kind: Suppression,
}

impl Drop for SuppressionGuard<'_> {
    fn drop(&mut self) {
        self.manager.flag(self.kind).store(false, Ordering::SeqCst);
        tracing::debug!(window = ?self.kind, "session suppression window closed");
    }
}

struct PeriodicSave {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
    interval: Duration,
}

pub struct SessionManager {
    primary: Arc<dyn KeyValueStore>,
    durable: Option<Arc<dyn KeyValueStore>>,
    url_policy: Arc<dyn UrlPolicy>,
    stale_after: Duration,
    restoring: AtomicBool,
    starting_up: AtomicBool,
    durable_warned: AtomicBool,
    pending_ghosts: Mutex<Vec<SessionTab>>,
    periodic: Mutex<Option<PeriodicSave>>,
}

impl SessionManager {
    /// `durable` is `None` when the host has no durable backend; sessions then
    /// live only in the primary store.
    pub fn new(
        primary: Arc<dyn KeyValueStore>,
        durable: Option<Arc<dyn KeyValueStore>>,
        url_policy: Arc<dyn UrlPolicy>,
        stale_after: Duration,
    ) -> Self {
        Self {
            primary,
            durable,
            url_policy,
            stale_after,
            restoring: AtomicBool::new(false),
            starting_up: AtomicBool::new(false),
            durable_warned: AtomicBool::new(false),
            pending_ghosts: Mutex::new(Vec::new()),
            periodic: Mutex::new(None),
        }
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }

    fn flag(&self, kind: Suppression) -> &AtomicBool {
        match kind {
            Suppression::Restoring => &self.restoring,
            Suppression::StartingUp => &self.starting_up,
        }
    }

    fn durable(&self) -> Option<&dyn KeyValueStore> {
        if self.durable.is_none() && !self.durable_warned.swap(true, Ordering::Relaxed) {
            let err = CoreError::StoreUnavailable("durable session store".to_string());
            tracing::warn!(error = %err, "falling back to primary store for sessions");
        }
        self.durable.as_deref()
    }

    // --- suppression windows ---

    pub fn is_restoring(&self) -> bool {
        self.restoring.load(Ordering::SeqCst)
    }

    pub fn is_starting_up(&self) -> bool {
        self.starting_up.load(Ordering::SeqCst)
    }

    /// Opens a suppression window that closes when the guard drops.
    pub fn suppress(&self, kind: Suppression) -> SuppressionGuard<'_> {
        self.flag(kind).store(true, Ordering::SeqCst);
        tracing::debug!(window = ?kind, "session suppression window opened");
        SuppressionGuard { manager: self, kind }
    }

    // --- pending ghosts ---

    /// Holds the ghost tabs of a restored session until they are reopened.
    /// Replaces whatever an earlier restore left pending.
    pub fn hold_ghosts(&self, groups: &[SessionGroup]) {
        let ghosts: Vec<SessionTab> = groups
            .iter()
            .flat_map(|g| {
                g.tabs.iter().map(move |t| SessionTab {
                    group_id: g.id.clone(),
                    ..t.clone()
                })
            })
            .filter(|t| !t.url.is_empty() && !self.url_policy.is_privileged(&t.url))
            .collect();
        tracing::debug!(ghosts = ghosts.len(), "holding restored ghost tabs");
        *self.ghosts() = ghosts;
    }

    pub fn pending_ghosts(&self) -> Vec<SessionTab> {
        self.ghosts().to_vec()
    }

    fn ghosts(&self) -> MutexGuard<'_, Vec<SessionTab>> {
        self.pending_ghosts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends pending ghosts to their groups. A ghost is settled, and dropped
    /// for good, once its group is gone or holds a live tab with its URL.
    fn merge_ghosts(&self, groups: &mut [SessionGroup]) {
        let mut pending = self.ghosts();
        if pending.is_empty() {
            return;
        }
        pending.retain(|ghost| {
            groups
                .iter()
                .find(|g| g.id == ghost.group_id)
                .is_some_and(|g| !g.tabs.iter().any(|t| t.url == ghost.url))
        });
        for ghost in pending.iter() {
            if let Some(group) = groups.iter_mut().find(|g| g.id == ghost.group_id) {
                group.tabs.push(ghost.clone());
            }
        }
    }

    // --- snapshot ---

    /// Projects groups into a session record: privileged URLs and live tab ids
    /// are dropped, metadata and group association kept. Pending ghosts are
    /// carried along with their groups.
    pub fn build_record(&self, groups: &[Group], active_group_id: Option<&str>, timestamp: i64) -> SessionRecord {
        let mut groups: Vec<SessionGroup> = groups
            .iter()
            .map(|group| SessionGroup {
                id: group.id.clone(),
                name: group.name.clone(),
                kind: group.kind,
                container_ref: group.container_ref.clone(),
                tabs: group
                    .tabs
                    .iter()
                    .filter(|t| !t.url.is_empty() && !self.url_policy.is_privileged(&t.url))
                    .map(|t| SessionTab {
                        title: t.title.clone(),
                        url: t.url.clone(),
                        favicon: t.favicon.clone(),
                        container_ref: normalize_container(t.container_ref.as_deref()).map(str::to_string),
                        group_id: group.id.clone(),
                    })
                    .collect(),
            })
            .collect();
        self.merge_ghosts(&mut groups);
        SessionRecord {
            timestamp,
            groups,
            active_group_id: active_group_id.map(str::to_string),
        }
    }

    /// Writes a snapshot to both stores unless a suppression window is open.
    pub async fn save_session(
        &self,
        groups: &[Group],
        active_group_id: Option<&str>,
    ) -> Result<SaveOutcome, CoreError> {
        if self.is_restoring() {
            tracing::debug!("session save skipped: restore in progress");
            return Ok(SaveOutcome::SuppressedRestoring);
        }
        if self.is_starting_up() {
            tracing::debug!("session save skipped: startup in progress");
            return Ok(SaveOutcome::SuppressedStartingUp);
        }

        let record = self.build_record(groups, active_group_id, Self::now());

        let primary = match set_typed(self.primary.as_ref(), keys::SESSION_BACKUP, &record).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(backend = self.primary.backend_name(), error = %e, "primary session write failed");
                false
            }
        };
        let durable = match self.durable() {
            Some(store) => match set_typed(store, keys::SESSION_BACKUP, &record).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(backend = store.backend_name(), error = %e, "durable session write failed");
                    false
                }
            },
            None => false,
        };

        if !primary && !durable {
            return Err(CoreError::StoreUnavailable("no session backend accepted the write".to_string()));
        }
        tracing::debug!(
            groups = record.groups.len(),
            tabs = record.tab_count(),
            primary,
            durable,
            "session saved"
        );
        Ok(SaveOutcome::Saved {
            timestamp: record.timestamp,
            primary,
            durable,
        })
    }

    /// Reads the primary copy, falling back to the durable one. Stale records
    /// are still returned, with a warning.
    pub async fn restore_session(&self) -> Result<Option<RestoredSession>, CoreError> {
        let mut record: Option<SessionRecord> = get_typed(self.primary.as_ref(), keys::SESSION_BACKUP).await?;
        if record.is_none() {
            if let Some(store) = self.durable() {
                record = get_typed(store, keys::SESSION_BACKUP).await?;
            }
        }
        let Some(record) = record else {
            return Ok(None);
        };

        let age_ms = (Self::now() - record.timestamp).max(0);
        let stale = age_ms as u128 > self.stale_after.as_millis();
        if stale {
            tracing::warn!(
                age_hours = age_ms / 3_600_000,
                "restoring a session older than the staleness threshold"
            );
        }
        Ok(Some(RestoredSession {
            groups: record.groups,
            active_group_id: record.active_group_id,
            timestamp: record.timestamp,
            age_ms,
            stale,
        }))
    }

    /// Deletes the session from both stores and forgets pending ghosts.
    pub async fn clear_session(&self) -> Result<(), CoreError> {
        self.ghosts().clear();
        self.primary.remove(keys::SESSION_BACKUP).await?;
        if let Some(store) = self.durable() {
            store.remove(keys::SESSION_BACKUP).await?;
        }
        tracing::info!("session cleared");
        Ok(())
    }

    /// Summary for display. The durable store answers first.
    pub async fn get_session_info(&self) -> SessionInfo {
        if let Some(store) = self.durable() {
            match get_typed::<SessionRecord>(store, keys::SESSION_BACKUP).await {
                Ok(Some(record)) => return SessionInfo::from_record(&record, SessionSource::Durable),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "durable session read failed"),
            }
        }
        match get_typed::<SessionRecord>(self.primary.as_ref(), keys::SESSION_BACKUP).await {
            Ok(Some(record)) => SessionInfo::from_record(&record, SessionSource::Primary),
            Ok(None) => SessionInfo::none(),
            Err(e) => {
                tracing::warn!(error = %e, "primary session read failed");
                SessionInfo::none()
            }
        }
    }

    /// Snapshots the repository's current state.
    pub async fn save_from(&self, repository: &GroupRepository) -> Result<SaveOutcome, CoreError> {
        let groups = repository.get_groups();
        let active = repository.get_active_group_id();
        self.save_session(&groups, active.as_deref()).await
    }

    // --- periodic save ---

    /// Starts snapshotting `repository` every `interval`. Replaces a running
    /// timer. A zero interval leaves the periodic save stopped.
    pub fn start_periodic_save(self: &Arc<Self>, repository: Arc<GroupRepository>, interval: Duration) {
        self.stop_periodic_save();
        if interval.is_zero() {
            tracing::warn!("periodic session save not started: interval is zero");
            return;
        }
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match manager.save_from(&repository).await {
                            Ok(SaveOutcome::Saved { .. }) => tracing::trace!("periodic session snapshot written"),
                            Ok(outcome) => tracing::debug!(?outcome, "periodic session snapshot skipped"),
                            Err(e) => tracing::warn!(error = %e, "periodic session snapshot failed"),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::debug!("periodic session save stopping");
                            break;
                        }
                    }
                }
            }
        });
        let mut periodic = self.periodic.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *periodic = Some(PeriodicSave {
            shutdown,
            handle,
            interval,
        });
    }

    pub fn stop_periodic_save(&self) {
        let taken = self
            .periodic
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(periodic) = taken {
            let _ = periodic.shutdown.send(true);
            periodic.handle.abort();
        }
    }

    pub fn is_periodic_save_running(&self) -> bool {
        self.periodic
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|p| !p.handle.is_finished())
            .unwrap_or(false)
    }

    pub fn periodic_save_interval(&self) -> Option<Duration> {
        self.periodic
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|p| p.interval)
    }
}

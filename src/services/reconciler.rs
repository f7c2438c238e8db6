//! Tab Event Reconciler.
//!
//! Folds browser tab lifecycle events into the [`GroupRepository`]. Handlers
//! never return errors: a failure is logged and the event dropped, so the
//! dispatch loop keeps running.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::UnboundedReceiver;

use crate::managers::group_repository::GroupRepository;
use crate::types::browser::{BrowserTab, TabChangeInfo, TabEvent, TabId};
use crate::types::errors::CoreError;

/// Tabs claimed by an explicit creation path that the passive `created`
/// handler must leave alone.
#[derive(Default)]
pub struct TabClaims {
    claimed: Mutex<HashSet<TabId>>,
}

impl TabClaims {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<TabId>> {
        self.claimed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn claim(&self, tab_id: TabId) {
        self.lock().insert(tab_id);
    }

    pub fn is_claimed(&self, tab_id: TabId) -> bool {
        self.lock().contains(&tab_id)
    }

    pub fn release(&self, tab_id: TabId) {
        self.lock().remove(&tab_id);
    }
}

/// What a `created` event led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatedOutcome {
    Assigned(String),
    AlreadyOwned,
    NoActiveGroup,
    Ineligible,
}

pub struct TabEventReconciler {
    repository: Arc<GroupRepository>,
    claims: Arc<TabClaims>,
}

impl TabEventReconciler {
    pub fn new(repository: Arc<GroupRepository>, claims: Arc<TabClaims>) -> Self {
        Self { repository, claims }
    }

    /// Consumes events until the channel closes.
    pub async fn run(self: Arc<Self>, mut events: UnboundedReceiver<TabEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        tracing::debug!("tab event channel closed");
    }

    /// Applies one event. Errors are logged and swallowed.
    pub async fn handle(&self, event: TabEvent) {
        let kind = event.kind();
        let tab_id = event.tab_id();
        let result = match event {
            TabEvent::Created(tab) => self.on_created(&tab).await.map(|_| ()),
            TabEvent::Removed { tab_id } => self.on_removed(tab_id).await,
            TabEvent::Updated { tab_id, change } => self.on_updated(tab_id, &change).await,
            TabEvent::Activated { tab_id, .. } => self.on_activated(tab_id).await,
        };
        if let Err(e) = result {
            tracing::warn!(event = kind, tab_id, error = %e, "tab event handler failed");
        }
    }

    /// Assigns a new tab to the active group when its container fits.
    pub async fn on_created(&self, tab: &BrowserTab) -> Result<CreatedOutcome, CoreError> {
        if tab.group_marker.is_some()
            || self.claims.is_claimed(tab.id)
            || self.repository.is_managed(tab.id)
        {
            tracing::debug!(tab_id = tab.id, "created tab already owned, skipping");
            return Ok(CreatedOutcome::AlreadyOwned);
        }
        let Some(active) = self.repository.get_active_group() else {
            return Ok(CreatedOutcome::NoActiveGroup);
        };
        if !active.accepts_container(tab.container()) {
            tracing::debug!(tab_id = tab.id, group_id = %active.id, "created tab left unmanaged");
            return Ok(CreatedOutcome::Ineligible);
        }
        // Re-checked under the write lock: an explicit creation path may have
        // assigned the tab while this handler waited.
        match self.repository.assign_if_unowned(tab, &active.id).await? {
            true => Ok(CreatedOutcome::Assigned(active.id)),
            false => Ok(CreatedOutcome::AlreadyOwned),
        }
    }

    pub async fn on_removed(&self, tab_id: TabId) -> Result<(), CoreError> {
        self.claims.release(tab_id);
        self.repository.remove_tab_everywhere(tab_id).await?;
        Ok(())
    }

    pub async fn on_updated(&self, tab_id: TabId, change: &TabChangeInfo) -> Result<(), CoreError> {
        if change.is_empty() {
            return Ok(());
        }
        self.repository.update_tab(tab_id, change).await?;
        Ok(())
    }

    pub async fn on_activated(&self, tab_id: TabId) -> Result<(), CoreError> {
        self.repository.set_active_tab(tab_id).await?;
        Ok(())
    }
}

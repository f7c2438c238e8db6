//! Visibility Controller.
//!
//! Shows the active group's tabs and hides every other hideable tab. Runs are
//! serialized: a second caller waits for the in-flight run to finish, because
//! each run reads the live tab list, may wait, then writes visibility.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::browser::{TabActivator, TabCreator, TabQuerier, TabVisibility, UrlPolicy};
use crate::managers::group_repository::GroupRepository;
use crate::services::reconciler::TabClaims;
use crate::types::browser::{BrowserTab, CreateTabOptions, TabId};
use crate::types::errors::{BrowserError, CoreError};
use crate::types::group::Group;

/// What a visibility pass did.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VisibilityOutcome {
    pub active_group_id: Option<String>,
    pub shown: Vec<TabId>,
    pub hidden: Vec<TabId>,
    /// Tab created because the active group had no live tabs.
    pub created: Option<TabId>,
    pub focused: Option<TabId>,
    /// Some hide/show batch failed; the pass still completed.
    pub partial_failure: bool,
}

/// Browser capabilities the controller uses.
pub struct VisibilityPorts {
    pub tabs: Arc<dyn TabQuerier>,
    pub creator: Arc<dyn TabCreator>,
    pub activator: Arc<dyn TabActivator>,
    pub visibility: Arc<dyn TabVisibility>,
}

pub struct VisibilityController {
    repository: Arc<GroupRepository>,
    ports: VisibilityPorts,
    url_policy: Arc<dyn UrlPolicy>,
    claims: Arc<TabClaims>,
    settle_delay: Duration,
    in_flight: tokio::sync::Mutex<()>,
    visibility_warned: AtomicBool,
}

impl VisibilityController {
    pub fn new(
        repository: Arc<GroupRepository>,
        ports: VisibilityPorts,
        url_policy: Arc<dyn UrlPolicy>,
        claims: Arc<TabClaims>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            repository,
            ports,
            url_policy,
            claims,
            settle_delay,
            in_flight: tokio::sync::Mutex::new(()),
            visibility_warned: AtomicBool::new(false),
        }
    }

    /// Makes the active group's live tabs the only visible managed tabs.
    ///
    /// No-op without an active group. An active group with no live tabs gets
    /// exactly one new tab, which becomes focused.
    pub async fn show_active_group_tabs(&self) -> Result<VisibilityOutcome, CoreError> {
        let _single_flight = self.in_flight.lock().await;

        let live = self.ports.tabs.query_all().await?;
        let Some(group) = self.repository.get_active_group() else {
            tracing::debug!("no active group, nothing to show");
            return Ok(VisibilityOutcome::default());
        };

        let live_ids: HashSet<TabId> = live.iter().map(|t| t.id).collect();
        let show: Vec<TabId> = group
            .tabs
            .iter()
            .map(|t| t.tab_id)
            .filter(|id| live_ids.contains(id))
            .collect();

        if show.is_empty() {
            if !group.tabs.is_empty() {
                // Only stale ids from an earlier browser session remain.
                self.repository.retain_live_tabs(&live_ids).await?;
            }
            return self.bootstrap_empty_group(&group).await;
        }

        let show_set: HashSet<TabId> = show.iter().copied().collect();
        let hide = self.hideable(&live, |id| !show_set.contains(&id));

        let mut outcome = VisibilityOutcome {
            active_group_id: Some(group.id.clone()),
            ..Default::default()
        };

        let first = show[0];
        let window = live.iter().find(|t| t.id == first).and_then(|t| t.window_id);
        match self.ports.activator.activate_tab(first).await {
            Ok(()) => outcome.focused = Some(first),
            Err(e) => tracing::warn!(tab_id = first, error = %e, "failed to activate tab"),
        }
        if let Some(window_id) = window {
            if let Err(e) = self.ports.activator.focus_window(window_id).await {
                tracing::warn!(window_id, error = %e, "failed to focus window");
            }
        }

        // Hide before show: a tab in both sets due to a stale computation ends visible.
        outcome.partial_failure |= !self.apply_hide(&hide).await;
        outcome.partial_failure |= !self.apply_show(&show).await;

        tracing::info!(
            group_id = %group.id,
            shown = show.len(),
            hidden = hide.len(),
            "applied group visibility"
        );
        outcome.shown = show;
        outcome.hidden = hide;
        Ok(outcome)
    }

    async fn bootstrap_empty_group(&self, group: &Group) -> Result<VisibilityOutcome, CoreError> {
        let options = CreateTabOptions {
            url: None,
            active: true,
            container_ref: if group.is_container() { group.container_ref.clone() } else { None },
            window_id: None,
            group_marker: Some(group.id.clone()),
        };
        let tab = self.ports.creator.create_tab(options).await?;
        self.claims.claim(tab.id);
        self.repository.assign_tab(tab.id, &group.id, Some(&tab)).await?;
        tracing::info!(group_id = %group.id, tab_id = tab.id, "created tab for empty group");

        if let Err(e) = self.ports.activator.activate_tab(tab.id).await {
            tracing::warn!(tab_id = tab.id, error = %e, "failed to activate new tab");
        }
        if let Some(window_id) = tab.window_id {
            if let Err(e) = self.ports.activator.focus_window(window_id).await {
                tracing::warn!(window_id, error = %e, "failed to focus window");
            }
        }

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let live = self.ports.tabs.query_all().await?;
        let hide = self.hideable(&live, |id| id != tab.id);
        let mut outcome = VisibilityOutcome {
            active_group_id: Some(group.id.clone()),
            created: Some(tab.id),
            focused: Some(tab.id),
            shown: vec![tab.id],
            ..Default::default()
        };
        outcome.partial_failure |= !self.apply_hide(&hide).await;
        outcome.partial_failure |= !self.apply_show(&[tab.id]).await;
        outcome.hidden = hide;
        Ok(outcome)
    }

    /// Hides tabs outside the active group, e.g. one just opened in a background group.
    /// Returns false when the batch failed.
    pub async fn hide_tabs(&self, ids: &[TabId]) -> bool {
        self.apply_hide(ids).await
    }

    pub async fn show_tabs(&self, ids: &[TabId]) -> bool {
        self.apply_show(ids).await
    }

    /// Live tab ids matching `keep` whose URL the host allows hiding.
    fn hideable(&self, live: &[BrowserTab], keep: impl Fn(TabId) -> bool) -> Vec<TabId> {
        live.iter()
            .filter(|t| keep(t.id) && !self.url_policy.is_privileged(&t.url))
            .map(|t| t.id)
            .collect()
    }

    async fn apply_hide(&self, ids: &[TabId]) -> bool {
        if ids.is_empty() {
            return true;
        }
        let result = self.ports.visibility.hide_tabs(ids).await;
        self.check_batch("hide", ids.len(), result)
    }

    async fn apply_show(&self, ids: &[TabId]) -> bool {
        if ids.is_empty() {
            return true;
        }
        let result = self.ports.visibility.show_tabs(ids).await;
        self.check_batch("show", ids.len(), result)
    }

    /// Logs a failed batch. A missing capability is logged once and is not a failure.
    fn check_batch(&self, op: &str, count: usize, result: Result<(), BrowserError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) if e.is_unsupported() => {
                if !self.visibility_warned.swap(true, Ordering::Relaxed) {
                    tracing::warn!(op, error = %e, "tab hide/show unavailable, visibility switching disabled");
                }
                true
            }
            Err(e) => {
                tracing::warn!(op, count, error = %e, "tab visibility batch failed");
                false
            }
        }
    }
}

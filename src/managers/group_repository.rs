//! Group Repository.
//!
//! Owns the in-memory list of groups and their tab memberships and is the single
//! source of truth for "which group owns which tab". Every mutation persists to
//! the primary store and schedules a "groups changed" notification.
//!
//! Mutations are serialized by an async write lock held across the persist, so
//! snapshots reach the store in the same order the mutations happened.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::database::store::{get_typed, keys, set_typed, KeyValueStore};
use crate::services::notifier::Notifier;
use crate::types::browser::{normalize_container, BrowserTab, Container, TabChangeInfo, TabId};
use crate::types::errors::CoreError;
use crate::types::group::{Group, GroupKind, GroupPatch, GroupSpec, ManagedTabRef, DEFAULT_GROUP_ID};
use crate::types::session::SessionGroup;

/// Result of [`GroupRepository::delete_group`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteOutcome {
    pub removed: bool,
    pub was_active: bool,
    /// Active group id after the deletion.
    pub active_group_id: Option<String>,
    /// Tabs that belonged to the deleted group and are now unmanaged.
    pub orphaned_tabs: Vec<TabId>,
}

/// Result of [`GroupRepository::sync_containers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerSync {
    pub created: usize,
    pub renamed: usize,
}

#[derive(Default)]
struct RepoState {
    groups: Vec<Group>,
    active_group_id: Option<String>,
    managed: HashSet<TabId>,
    loaded: bool,
}

struct Snapshot {
    groups: Vec<Group>,
    active_group_id: Option<String>,
    managed: Vec<TabId>,
}

impl RepoState {
    fn snapshot(&self) -> Snapshot {
        let mut managed: Vec<TabId> = self.managed.iter().copied().collect();
        managed.sort_unstable();
        Snapshot {
            groups: self.groups.clone(),
            active_group_id: self.active_group_id.clone(),
            managed,
        }
    }

    fn group_mut(&mut self, group_id: &str) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.id == group_id)
    }

    fn has_group(&self, group_id: &str) -> bool {
        self.groups.iter().any(|g| g.id == group_id)
    }

    /// Strips `tab_id` from whichever group holds it.
    fn take_tab(&mut self, tab_id: TabId, now: i64) -> Option<ManagedTabRef> {
        for group in self.groups.iter_mut() {
            if let Some(pos) = group.tabs.iter().position(|t| t.tab_id == tab_id) {
                group.last_modified_at = now;
                self.managed.remove(&tab_id);
                return Some(group.tabs.remove(pos));
            }
        }
        None
    }

    /// The single membership mutation: strips `tab_id` from any group holding
    /// it and appends it to `group_id`.
    fn assign(
        &mut self,
        tab_id: TabId,
        group_id: &str,
        snapshot: Option<&BrowserTab>,
        now: i64,
    ) -> Result<ManagedTabRef, CoreError> {
        if !self.has_group(group_id) {
            return Err(CoreError::NotFound(format!("group {}", group_id)));
        }
        let previous = self.take_tab(tab_id, now);
        let mut tab_ref = match (snapshot, previous) {
            (Some(tab), previous) => {
                let mut fresh = ManagedTabRef::from_browser_tab(tab, group_id);
                if let Some(prev) = previous {
                    fresh.active = fresh.active || prev.active;
                }
                fresh
            }
            (None, Some(prev)) => prev,
            (None, None) => ManagedTabRef::bare(tab_id, group_id),
        };
        tab_ref.group_id = group_id.to_string();

        let group = self
            .group_mut(group_id)
            .ok_or_else(|| CoreError::NotFound(format!("group {}", group_id)))?;
        group.tabs.push(tab_ref.clone());
        group.last_modified_at = now;
        self.managed.insert(tab_id);
        Ok(tab_ref)
    }

    /// Enforces exclusivity, back-references and a valid active id on freshly
    /// loaded data. Returns true when anything had to be repaired.
    fn normalize(&mut self, default_group_name: &str, now: i64) -> bool {
        let mut repaired = false;

        if self.groups.is_empty() {
            self.groups.push(default_group(default_group_name, now));
            repaired = true;
        }

        let mut seen = HashSet::new();
        for group in self.groups.iter_mut() {
            let before = group.tabs.len();
            group.tabs.retain(|t| seen.insert(t.tab_id));
            if group.tabs.len() != before {
                tracing::warn!(group_id = %group.id, dropped = before - group.tabs.len(), "dropped tabs already owned by another group");
                repaired = true;
            }
            for tab in group.tabs.iter_mut().filter(|t| t.group_id != group.id) {
                tab.group_id = group.id.clone();
                repaired = true;
            }
        }
        self.managed = seen;

        let active_valid = self
            .active_group_id
            .as_deref()
            .map(|id| self.has_group(id))
            .unwrap_or(false);
        if !active_valid {
            self.active_group_id = self.groups.first().map(|g| g.id.clone());
            repaired = true;
        }
        repaired
    }
}

fn default_group(name: &str, now: i64) -> Group {
    Group {
        id: DEFAULT_GROUP_ID.to_string(),
        name: name.to_string(),
        kind: GroupKind::Custom,
        container_ref: None,
        tabs: Vec::new(),
        visible: true,
        expanded: true,
        created_at: now,
        last_modified_at: now,
    }
}

/// Orders groups for display: container groups first (insertion order), then
/// the default custom group, then the other custom groups alphabetically.
pub fn order_groups(groups: Vec<Group>, default_group_name: &str) -> Vec<Group> {
    let is_default = |g: &Group| {
        g.kind == GroupKind::Custom
            && (g.id == DEFAULT_GROUP_ID || g.name.eq_ignore_ascii_case(default_group_name))
    };
    let (containers, customs): (Vec<Group>, Vec<Group>) =
        groups.into_iter().partition(|g| g.kind == GroupKind::Container);
    let (mut defaults, mut others): (Vec<Group>, Vec<Group>) = customs.into_iter().partition(is_default);
    defaults.sort_by_key(|g| g.id != DEFAULT_GROUP_ID);
    others.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
    containers.into_iter().chain(defaults).chain(others).collect()
}

pub struct GroupRepository {
    store: Arc<dyn KeyValueStore>,
    notifier: Notifier,
    default_group_name: String,
    state: Mutex<RepoState>,
    write_lock: tokio::sync::Mutex<()>,
}

impl GroupRepository {
    pub fn new(store: Arc<dyn KeyValueStore>, notifier: Notifier, default_group_name: &str) -> Self {
        Self {
            store,
            notifier,
            default_group_name: default_group_name.to_string(),
            state: Mutex::new(RepoState::default()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }

    fn lock(&self) -> MutexGuard<'_, RepoState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<(), CoreError> {
        let store = self.store.as_ref();
        set_typed(store, keys::GROUPS, &snapshot.groups).await?;
        set_typed(store, keys::ACTIVE_GROUP_ID, &snapshot.active_group_id).await?;
        set_typed(store, keys::MANAGED_TAB_IDS, &snapshot.managed).await?;
        Ok(())
    }

    /// Applies `f` to the state and, when it reports a change, persists and
    /// notifies before releasing the write lock.
    ///
    /// Refused until [`load_all`](Self::load_all) has read the store: persisting
    /// an unloaded state would overwrite the stored groups with an empty list.
    async fn mutate<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut RepoState, i64) -> Result<(T, bool), CoreError>,
    {
        let _write = self.write_lock.lock().await;
        let (out, snapshot) = {
            let mut state = self.lock();
            if !state.loaded {
                return Err(CoreError::NotLoaded);
            }
            let (out, changed) = f(&mut state, Self::now())?;
            (out, changed.then(|| state.snapshot()))
        };
        if let Some(snapshot) = snapshot {
            self.persist(&snapshot).await?;
            self.notifier.groups_changed();
        }
        Ok(out)
    }

    // --- loading ---

    /// Reads persisted groups and the active group id, replacing in-memory state.
    /// Synthesizes a default group when nothing is stored.
    pub async fn load_all(&self) -> Result<(), CoreError> {
        let _write = self.write_lock.lock().await;
        let groups: Vec<Group> = get_typed(self.store.as_ref(), keys::GROUPS)
            .await?
            .unwrap_or_default();
        let active: Option<String> = get_typed(self.store.as_ref(), keys::ACTIVE_GROUP_ID).await?;

        let snapshot = {
            let mut state = self.lock();
            *state = RepoState {
                groups,
                active_group_id: active,
                managed: HashSet::new(),
                loaded: true,
            };
            let repaired = state.normalize(&self.default_group_name, Self::now());
            tracing::info!(
                groups = state.groups.len(),
                managed_tabs = state.managed.len(),
                active_group_id = ?state.active_group_id,
                repaired,
                "group repository loaded"
            );
            repaired.then(|| state.snapshot())
        };
        if let Some(snapshot) = snapshot {
            self.persist(&snapshot).await?;
        }
        self.notifier.groups_changed();
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.lock().loaded
    }

    // --- reads ---

    pub fn get_groups(&self) -> Vec<Group> {
        self.lock().groups.clone()
    }

    /// Groups in display order.
    pub fn ordered_groups(&self) -> Vec<Group> {
        order_groups(self.get_groups(), &self.default_group_name)
    }

    pub fn get_group(&self, group_id: &str) -> Option<Group> {
        self.lock().groups.iter().find(|g| g.id == group_id).cloned()
    }

    pub fn get_active_group_id(&self) -> Option<String> {
        self.lock().active_group_id.clone()
    }

    pub fn get_active_group(&self) -> Option<Group> {
        let state = self.lock();
        let id = state.active_group_id.as_deref()?;
        state.groups.iter().find(|g| g.id == id).cloned()
    }

    pub fn find_tab(&self, tab_id: TabId) -> Option<ManagedTabRef> {
        self.lock()
            .groups
            .iter()
            .flat_map(|g| g.tabs.iter())
            .find(|t| t.tab_id == tab_id)
            .cloned()
    }

    /// O(1) membership check against the managed-tab index.
    pub fn is_managed(&self, tab_id: TabId) -> bool {
        self.lock().managed.contains(&tab_id)
    }

    pub fn managed_tab_ids(&self) -> HashSet<TabId> {
        self.lock().managed.clone()
    }

    pub fn default_group_name(&self) -> &str {
        &self.default_group_name
    }

    // --- group mutations ---

    /// Creates a group. Container groups are singletons per container: asking
    /// again for the same container returns the existing group.
    pub async fn create_group(&self, spec: GroupSpec) -> Result<Group, CoreError> {
        let name = spec.name.trim().to_string();
        self.mutate(move |state, now| {
            let (id, container_ref) = match spec.kind {
                GroupKind::Container => {
                    let container = normalize_container(spec.container_ref.as_deref())
                        .ok_or_else(|| {
                            CoreError::InvalidRequest("container group requires a containerRef".to_string())
                        })?
                        .to_string();
                    let id = Group::container_group_id(&container);
                    if let Some(existing) = state.groups.iter().find(|g| g.id == id) {
                        tracing::debug!(group_id = %id, "container group already exists");
                        return Ok((existing.clone(), false));
                    }
                    (id, Some(container))
                }
                GroupKind::Custom => {
                    if name.is_empty() {
                        return Err(CoreError::InvalidRequest("group name must not be empty".to_string()));
                    }
                    (Group::custom_group_id(now), None)
                }
            };
            let group = Group {
                id,
                name: if name.is_empty() { container_ref.clone().unwrap_or_default() } else { name },
                kind: spec.kind,
                container_ref,
                tabs: Vec::new(),
                visible: true,
                expanded: true,
                created_at: now,
                last_modified_at: now,
            };
            tracing::info!(group_id = %group.id, kind = ?group.kind, "group created");
            state.groups.push(group.clone());
            Ok((group, true))
        })
        .await
    }

    pub async fn update_group(&self, group_id: &str, patch: GroupPatch) -> Result<Group, CoreError> {
        self.mutate(|state, now| {
            let group = state
                .group_mut(group_id)
                .ok_or_else(|| CoreError::NotFound(format!("group {}", group_id)))?;
            patch.apply(group);
            group.last_modified_at = now;
            Ok((group.clone(), true))
        })
        .await
    }

    /// Removes a group. Unknown ids are a no-op. When the active group is
    /// deleted the first remaining group becomes active (or none).
    pub async fn delete_group(&self, group_id: &str) -> Result<DeleteOutcome, CoreError> {
        self.mutate(|state, _now| {
            let Some(pos) = state.groups.iter().position(|g| g.id == group_id) else {
                tracing::debug!(group_id, "delete of unknown group ignored");
                return Ok((
                    DeleteOutcome {
                        active_group_id: state.active_group_id.clone(),
                        ..Default::default()
                    },
                    false,
                ));
            };
            let group = state.groups.remove(pos);
            let orphaned_tabs = group.tab_ids();
            for id in &orphaned_tabs {
                state.managed.remove(id);
            }
            let was_active = state.active_group_id.as_deref() == Some(group_id);
            if was_active {
                state.active_group_id = state.groups.first().map(|g| g.id.clone());
            }
            tracing::info!(group_id, was_active, orphaned = orphaned_tabs.len(), "group deleted");
            Ok((
                DeleteOutcome {
                    removed: true,
                    was_active,
                    active_group_id: state.active_group_id.clone(),
                    orphaned_tabs,
                },
                true,
            ))
        })
        .await
    }

    /// Records the active group id. The caller triggers visibility.
    pub async fn set_active_group_id(&self, group_id: Option<&str>) -> Result<(), CoreError> {
        self.mutate(|state, _now| {
            if let Some(id) = group_id {
                if !state.has_group(id) {
                    return Err(CoreError::NotFound(format!("group {}", id)));
                }
            }
            state.active_group_id = group_id.map(str::to_string);
            Ok(((), true))
        })
        .await
    }

    // --- tab membership ---

    /// Moves `tab_id` into `group_id`, removing it from any other group first.
    ///
    /// This is the only path that adds a tab to a group. `snapshot` refreshes
    /// the stored metadata; without it the previous metadata is carried over.
    pub async fn assign_tab(
        &self,
        tab_id: TabId,
        group_id: &str,
        snapshot: Option<&BrowserTab>,
    ) -> Result<ManagedTabRef, CoreError> {
        self.mutate(|state, now| {
            let tab_ref = state.assign(tab_id, group_id, snapshot, now)?;
            tracing::debug!(tab_id, group_id, "tab assigned");
            Ok((tab_ref, true))
        })
        .await
    }

    /// Assigns a freshly observed tab unless some group already owns it.
    /// Returns whether the tab was assigned.
    pub async fn assign_if_unowned(&self, tab: &BrowserTab, group_id: &str) -> Result<bool, CoreError> {
        self.mutate(|state, now| {
            if state.managed.contains(&tab.id) {
                return Ok((false, false));
            }
            state.assign(tab.id, group_id, Some(tab), now)?;
            tracing::debug!(tab_id = tab.id, group_id, "new tab assigned to active group");
            Ok((true, true))
        })
        .await
    }

    /// Strips `tab_id` from whichever group holds it. Returns whether it was found.
    pub async fn remove_tab_everywhere(&self, tab_id: TabId) -> Result<bool, CoreError> {
        self.mutate(|state, now| {
            let found = state.take_tab(tab_id, now).is_some();
            Ok((found, found))
        })
        .await
    }

    /// Removes `tab_id` from `group_id` specifically.
    pub async fn remove_tab_from_group(&self, tab_id: TabId, group_id: &str) -> Result<(), CoreError> {
        self.mutate(|state, now| {
            let group = state
                .group_mut(group_id)
                .ok_or_else(|| CoreError::NotFound(format!("group {}", group_id)))?;
            let pos = group
                .tabs
                .iter()
                .position(|t| t.tab_id == tab_id)
                .ok_or_else(|| CoreError::NotFound(format!("tab {} in group {}", tab_id, group_id)))?;
            group.tabs.remove(pos);
            group.last_modified_at = now;
            state.managed.remove(&tab_id);
            Ok(((), true))
        })
        .await
    }

    /// Merges browser-reported changes into a managed tab. Unmanaged tabs are
    /// ignored; returns whether the tab was found.
    pub async fn update_tab(&self, tab_id: TabId, change: &TabChangeInfo) -> Result<bool, CoreError> {
        self.mutate(|state, now| {
            for group in state.groups.iter_mut() {
                let group_id = group.id.clone();
                if let Some(tab) = group.tabs.iter_mut().find(|t| t.tab_id == tab_id) {
                    if let Some(url) = &change.url {
                        tab.url = url.clone();
                    }
                    if let Some(title) = &change.title {
                        tab.title = title.clone();
                    }
                    if let Some(favicon) = &change.fav_icon_url {
                        tab.favicon = Some(favicon.clone());
                    }
                    tab.group_id = group_id;
                    group.last_modified_at = now;
                    return Ok((true, true));
                }
            }
            Ok((false, false))
        })
        .await
    }

    /// Re-derives the single active tab: clears `active` on every managed tab,
    /// then sets it on `tab_id` if managed. Always persists.
    pub async fn set_active_tab(&self, tab_id: TabId) -> Result<bool, CoreError> {
        self.mutate(|state, _now| {
            let mut found = false;
            for tab in state.groups.iter_mut().flat_map(|g| g.tabs.iter_mut()) {
                tab.active = tab.tab_id == tab_id;
                found |= tab.active;
            }
            Ok((found, true))
        })
        .await
    }

    /// Drops references to tabs that no longer exist in the browser.
    pub async fn retain_live_tabs(&self, live: &HashSet<TabId>) -> Result<Vec<TabId>, CoreError> {
        self.mutate(|state, now| {
            let mut dropped = Vec::new();
            for group in state.groups.iter_mut() {
                let before = group.tabs.len();
                group.tabs.retain(|t| {
                    let keep = live.contains(&t.tab_id);
                    if !keep {
                        dropped.push(t.tab_id);
                    }
                    keep
                });
                if group.tabs.len() != before {
                    group.last_modified_at = now;
                }
            }
            for id in &dropped {
                state.managed.remove(id);
            }
            if !dropped.is_empty() {
                tracing::info!(count = dropped.len(), "dropped stale tab references");
            }
            let changed = !dropped.is_empty();
            Ok((dropped, changed))
        })
        .await
    }

    // --- containers and restore ---

    /// Creates missing container groups and renames existing ones to match
    /// the container's current name.
    pub async fn sync_containers(&self, containers: &[Container]) -> Result<ContainerSync, CoreError> {
        self.mutate(|state, now| {
            let mut summary = ContainerSync::default();
            for container in containers {
                if normalize_container(Some(&container.id)).is_none() {
                    continue;
                }
                let id = Group::container_group_id(&container.id);
                match state.group_mut(&id) {
                    Some(group) => {
                        if group.name != container.name {
                            group.name = container.name.clone();
                            group.last_modified_at = now;
                            summary.renamed += 1;
                        }
                    }
                    None => {
                        state.groups.push(Group {
                            id,
                            name: container.name.clone(),
                            kind: GroupKind::Container,
                            container_ref: Some(container.id.clone()),
                            tabs: Vec::new(),
                            visible: true,
                            expanded: true,
                            created_at: now,
                            last_modified_at: now,
                        });
                        summary.created += 1;
                    }
                }
            }
            if state.active_group_id.is_none() {
                state.active_group_id = state.groups.first().map(|g| g.id.clone());
            }
            let changed = summary != ContainerSync::default();
            Ok((summary, changed))
        })
        .await
    }

    /// Recreates (empty) groups present in a restored session but missing here,
    /// and restores the active group id when that group exists.
    pub async fn apply_restored(
        &self,
        groups: &[SessionGroup],
        active_group_id: Option<&str>,
    ) -> Result<usize, CoreError> {
        self.mutate(|state, now| {
            let mut recreated = 0;
            for session_group in groups {
                if state.has_group(&session_group.id) {
                    continue;
                }
                state.groups.push(Group {
                    id: session_group.id.clone(),
                    name: session_group.name.clone(),
                    kind: session_group.kind,
                    container_ref: session_group.container_ref.clone(),
                    tabs: Vec::new(),
                    visible: true,
                    expanded: true,
                    created_at: now,
                    last_modified_at: now,
                });
                recreated += 1;
            }
            let mut changed = recreated > 0;
            if let Some(id) = active_group_id {
                if state.has_group(id) && state.active_group_id.as_deref() != Some(id) {
                    state.active_group_id = Some(id.to_string());
                    changed = true;
                }
            }
            Ok((recreated, changed))
        })
        .await
    }
}

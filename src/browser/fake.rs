//! In-memory browser used by tests and local tooling.
//!
//! Records every hide/show/create/activate call and can be configured to lack
//! optional capabilities or to refuse hiding particular tabs.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use super::{ContainerDirectory, TabActivator, TabCreator, TabQuerier, TabVisibility};
use crate::types::browser::{BrowserTab, Container, CreateTabOptions, TabEvent, TabId, WindowId};
use crate::types::errors::BrowserError;

const DEFAULT_WINDOW: WindowId = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    Create(TabId),
    Activate(TabId),
    FocusWindow(WindowId),
    Hide(Vec<TabId>),
    Show(Vec<TabId>),
}

struct FakeState {
    tabs: Vec<BrowserTab>,
    next_id: TabId,
    containers: Vec<Container>,
    supports_visibility: bool,
    supports_containers: bool,
    refuse_hide: HashSet<TabId>,
    calls: Vec<FakeCall>,
    events: Option<UnboundedSender<TabEvent>>,
}

pub struct FakeBrowser {
    state: Mutex<FakeState>,
}

impl Default for FakeBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                tabs: Vec::new(),
                next_id: 1,
                containers: Vec::new(),
                supports_visibility: true,
                supports_containers: true,
                refuse_hide: HashSet::new(),
                calls: Vec::new(),
                events: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Emits `created` events for tabs opened through [`TabCreator`].
    pub fn set_event_sink(&self, sink: UnboundedSender<TabEvent>) {
        self.lock().events = Some(sink);
    }

    pub fn set_supports_visibility(&self, supported: bool) {
        self.lock().supports_visibility = supported;
    }

    pub fn set_supports_containers(&self, supported: bool) {
        self.lock().supports_containers = supported;
    }

    /// Makes `hide_tabs` fail whenever the batch contains `tab_id`.
    pub fn refuse_hide(&self, tab_id: TabId) {
        self.lock().refuse_hide.insert(tab_id);
    }

    pub fn add_container(&self, id: &str, name: &str) {
        self.lock().containers.push(Container {
            id: id.to_string(),
            name: name.to_string(),
            color: None,
            icon: None,
        });
    }

    pub fn rename_container(&self, id: &str, name: &str) {
        if let Some(c) = self.lock().containers.iter_mut().find(|c| c.id == id) {
            c.name = name.to_string();
        }
    }

    /// Adds a tab without recording a create call or emitting an event.
    pub fn add_tab(&self, url: &str, container: Option<&str>) -> TabId {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.tabs.push(BrowserTab {
            id,
            window_id: Some(DEFAULT_WINDOW),
            url: url.to_string(),
            title: url.to_string(),
            container_ref: container.map(str::to_string),
            ..Default::default()
        });
        id
    }

    pub fn remove_tab(&self, tab_id: TabId) {
        self.lock().tabs.retain(|t| t.id != tab_id);
    }

    pub fn tab(&self, tab_id: TabId) -> Option<BrowserTab> {
        self.lock().tabs.iter().find(|t| t.id == tab_id).cloned()
    }

    pub fn tab_ids(&self) -> Vec<TabId> {
        self.lock().tabs.iter().map(|t| t.id).collect()
    }

    pub fn hidden_ids(&self) -> HashSet<TabId> {
        self.lock().tabs.iter().filter(|t| t.hidden).map(|t| t.id).collect()
    }

    pub fn visible_ids(&self) -> HashSet<TabId> {
        self.lock().tabs.iter().filter(|t| !t.hidden).map(|t| t.id).collect()
    }

    pub fn active_tab(&self) -> Option<TabId> {
        self.lock().tabs.iter().find(|t| t.active).map(|t| t.id)
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.lock().calls.clone()
    }

    pub fn created_ids(&self) -> Vec<TabId> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                FakeCall::Create(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

fn check_known(state: &FakeState, tab_ids: &[TabId]) -> Result<(), BrowserError> {
    match tab_ids.iter().find(|id| !state.tabs.iter().any(|t| t.id == **id)) {
        Some(missing) => Err(BrowserError::Call(format!("Invalid tab ID: {}", missing))),
        None => Ok(()),
    }
}

#[async_trait]
impl TabQuerier for FakeBrowser {
    async fn query_all(&self) -> Result<Vec<BrowserTab>, BrowserError> {
        Ok(self.lock().tabs.clone())
    }

    async fn get_tab(&self, tab_id: TabId) -> Result<BrowserTab, BrowserError> {
        self.tab(tab_id).ok_or(BrowserError::TabNotFound(tab_id))
    }
}

#[async_trait]
impl TabCreator for FakeBrowser {
    async fn create_tab(&self, options: CreateTabOptions) -> Result<BrowserTab, BrowserError> {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        let window_id = options.window_id.unwrap_or(DEFAULT_WINDOW);
        if options.active {
            for t in state.tabs.iter_mut().filter(|t| t.window_id == Some(window_id)) {
                t.active = false;
            }
        }
        let tab = BrowserTab {
            id,
            window_id: Some(window_id),
            url: options.url.clone().unwrap_or_else(|| "about:newtab".to_string()),
            title: "New Tab".to_string(),
            fav_icon_url: None,
            container_ref: options.container_ref.clone(),
            active: options.active,
            hidden: false,
            group_marker: options.group_marker.clone(),
        };
        state.tabs.push(tab.clone());
        state.calls.push(FakeCall::Create(id));
        if let Some(sink) = &state.events {
            let _ = sink.send(TabEvent::Created(tab.clone()));
        }
        Ok(tab)
    }
}

#[async_trait]
impl TabActivator for FakeBrowser {
    async fn activate_tab(&self, tab_id: TabId) -> Result<(), BrowserError> {
        let mut state = self.lock();
        let window = state
            .tabs
            .iter()
            .find(|t| t.id == tab_id)
            .map(|t| t.window_id)
            .ok_or(BrowserError::TabNotFound(tab_id))?;
        for t in state.tabs.iter_mut().filter(|t| t.window_id == window) {
            t.active = t.id == tab_id;
        }
        state.calls.push(FakeCall::Activate(tab_id));
        Ok(())
    }

    async fn focus_window(&self, window_id: WindowId) -> Result<(), BrowserError> {
        self.lock().calls.push(FakeCall::FocusWindow(window_id));
        Ok(())
    }
}

#[async_trait]
impl TabVisibility for FakeBrowser {
    async fn hide_tabs(&self, tab_ids: &[TabId]) -> Result<(), BrowserError> {
        let mut state = self.lock();
        if !state.supports_visibility {
            return Err(BrowserError::Unsupported("tabs.hide".to_string()));
        }
        check_known(&state, tab_ids)?;
        state.calls.push(FakeCall::Hide(tab_ids.to_vec()));
        let refused: Vec<TabId> = tab_ids
            .iter()
            .copied()
            .filter(|id| state.refuse_hide.contains(id))
            .collect();
        for t in state.tabs.iter_mut() {
            if tab_ids.contains(&t.id) && !refused.contains(&t.id) {
                t.hidden = true;
            }
        }
        if refused.is_empty() {
            Ok(())
        } else {
            Err(BrowserError::Call(format!("cannot hide tabs {:?}", refused)))
        }
    }

    async fn show_tabs(&self, tab_ids: &[TabId]) -> Result<(), BrowserError> {
        let mut state = self.lock();
        if !state.supports_visibility {
            return Err(BrowserError::Unsupported("tabs.show".to_string()));
        }
        check_known(&state, tab_ids)?;
        state.calls.push(FakeCall::Show(tab_ids.to_vec()));
        for t in state.tabs.iter_mut() {
            if tab_ids.contains(&t.id) {
                t.hidden = false;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerDirectory for FakeBrowser {
    async fn query_containers(&self) -> Result<Vec<Container>, BrowserError> {
        let state = self.lock();
        if !state.supports_containers {
            return Err(BrowserError::Unsupported("contextualIdentities".to_string()));
        }
        Ok(state.containers.clone())
    }
}

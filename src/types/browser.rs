use serde::{Deserialize, Serialize};

/// Live numeric tab id assigned by the browser. Not stable across restarts.
pub type TabId = i64;

/// Browser window id.
pub type WindowId = i64;

/// Cookie store id the host reports for tabs outside any container.
pub const DEFAULT_CONTAINER: &str = "firefox-default";

/// A tab as reported by the browser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BrowserTab {
    pub id: TabId,
    #[serde(default)]
    pub window_id: Option<WindowId>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub fav_icon_url: Option<String>,
    /// Container (cookie store) id; `None` or [`DEFAULT_CONTAINER`] means no container.
    #[serde(default)]
    pub container_ref: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub hidden: bool,
    /// Group id stamped on tabs this system created itself.
    #[serde(default)]
    pub group_marker: Option<String>,
}

impl BrowserTab {
    /// The tab's container, with the host's default store normalized to `None`.
    pub fn container(&self) -> Option<&str> {
        normalize_container(self.container_ref.as_deref())
    }
}

/// Maps the host's default cookie store id to `None`.
pub fn normalize_container(container: Option<&str>) -> Option<&str> {
    match container {
        None | Some("") | Some(DEFAULT_CONTAINER) => None,
        Some(other) => Some(other),
    }
}

/// A browser container (contextual identity).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Options for creating a tab.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateTabOptions {
    pub url: Option<String>,
    pub active: bool,
    pub container_ref: Option<String>,
    pub window_id: Option<WindowId>,
    pub group_marker: Option<String>,
}

/// Fields the browser reports as changed in an `updated` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TabChangeInfo {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub fav_icon_url: Option<String>,
}

impl TabChangeInfo {
    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.title.is_none() && self.fav_icon_url.is_none()
    }
}

/// Tab lifecycle events delivered by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum TabEvent {
    #[serde(rename = "tab.created")]
    Created(BrowserTab),
    #[serde(rename = "tab.removed", rename_all = "camelCase")]
    Removed { tab_id: TabId },
    #[serde(rename = "tab.updated", rename_all = "camelCase")]
    Updated {
        tab_id: TabId,
        #[serde(default)]
        change: TabChangeInfo,
    },
    #[serde(rename = "tab.activated", rename_all = "camelCase")]
    Activated {
        tab_id: TabId,
        #[serde(default)]
        window_id: Option<WindowId>,
    },
}

impl TabEvent {
    pub fn tab_id(&self) -> TabId {
        match self {
            TabEvent::Created(tab) => tab.id,
            TabEvent::Removed { tab_id }
            | TabEvent::Updated { tab_id, .. }
            | TabEvent::Activated { tab_id, .. } => *tab_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TabEvent::Created(_) => "created",
            TabEvent::Removed { .. } => "removed",
            TabEvent::Updated { .. } => "updated",
            TabEvent::Activated { .. } => "activated",
        }
    }
}

use serde::{Deserialize, Serialize};

use super::browser::{normalize_container, BrowserTab, TabId};

/// Id of the group synthesized when nothing has been persisted yet.
pub const DEFAULT_GROUP_ID: &str = "default";

/// Whether a group is bound to a browser container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Container,
    Custom,
}

/// The core's view of a browser tab: identity plus a metadata snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedTabRef {
    pub tab_id: TabId,
    pub group_id: String,
    #[serde(default)]
    pub container_ref: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub favicon: Option<String>,
}

impl ManagedTabRef {
    /// Builds a reference from a live tab, stamped with its owning group.
    pub fn from_browser_tab(tab: &BrowserTab, group_id: &str) -> Self {
        Self {
            tab_id: tab.id,
            group_id: group_id.to_string(),
            container_ref: tab.container().map(str::to_string),
            active: tab.active,
            url: tab.url.clone(),
            title: tab.title.clone(),
            favicon: tab.fav_icon_url.clone(),
        }
    }

    /// A reference with no metadata beyond identity.
    pub fn bare(tab_id: TabId, group_id: &str) -> Self {
        Self {
            tab_id,
            group_id: group_id.to_string(),
            container_ref: None,
            active: false,
            url: String::new(),
            title: String::new(),
            favicon: None,
        }
    }
}

/// A named bucket of tabs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    pub kind: GroupKind,
    #[serde(default)]
    pub container_ref: Option<String>,
    #[serde(default)]
    pub tabs: Vec<ManagedTabRef>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub expanded: bool,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub last_modified_at: i64,
}

fn default_true() -> bool {
    true
}

impl Group {
    /// Deterministic id for the group bound to `container_id`.
    pub fn container_group_id(container_id: &str) -> String {
        format!("container-{}", container_id)
    }

    /// Timestamp plus random suffix, e.g. `custom-1700000000000-3f2a9c1e`.
    pub fn custom_group_id(now_ms: i64) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("custom-{}-{}", now_ms, &suffix[..8])
    }

    pub fn contains_tab(&self, tab_id: TabId) -> bool {
        self.tabs.iter().any(|t| t.tab_id == tab_id)
    }

    pub fn tab_ids(&self) -> Vec<TabId> {
        self.tabs.iter().map(|t| t.tab_id).collect()
    }

    pub fn is_container(&self) -> bool {
        self.kind == GroupKind::Container
    }

    /// Whether a tab in `container` may be auto-assigned to this group.
    ///
    /// Container groups accept only their own container; custom groups accept
    /// only tabs in the default container.
    pub fn accepts_container(&self, container: Option<&str>) -> bool {
        let container = normalize_container(container);
        match self.kind {
            GroupKind::Container => {
                container.is_some() && container == normalize_container(self.container_ref.as_deref())
            }
            GroupKind::Custom => container.is_none(),
        }
    }
}

/// Request to create a group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: GroupKind,
    #[serde(default)]
    pub container_ref: Option<String>,
}

fn default_kind() -> GroupKind {
    GroupKind::Custom
}

impl GroupSpec {
    pub fn custom(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: GroupKind::Custom,
            container_ref: None,
        }
    }

    pub fn container(name: &str, container_id: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: GroupKind::Container,
            container_ref: Some(container_id.to_string()),
        }
    }
}

/// Partial update for a group's display fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GroupPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub visible: Option<bool>,
    #[serde(default)]
    pub expanded: Option<bool>,
}

impl GroupPatch {
    pub fn apply(&self, group: &mut Group) {
        if let Some(name) = &self.name {
            group.name = name.clone();
        }
        if let Some(visible) = self.visible {
            group.visible = visible;
        }
        if let Some(expanded) = self.expanded {
            group.expanded = expanded;
        }
    }
}

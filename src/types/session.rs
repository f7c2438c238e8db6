use serde::{Deserialize, Serialize};

use super::group::GroupKind;

/// Complete durable snapshot for save/restore.
///
/// Carries no live tab ids; those do not survive a browser restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub timestamp: i64,
    pub groups: Vec<SessionGroup>,
    pub active_group_id: Option<String>,
}

impl SessionRecord {
    pub fn tab_count(&self) -> usize {
        self.groups.iter().map(|g| g.tabs.len()).sum()
    }
}

/// A group as stored in a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionGroup {
    pub id: String,
    pub name: String,
    pub kind: GroupKind,
    #[serde(default)]
    pub container_ref: Option<String>,
    pub tabs: Vec<SessionTab>,
}

/// A ghost tab: metadata only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionTab {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub favicon: Option<String>,
    #[serde(default)]
    pub container_ref: Option<String>,
    pub group_id: String,
}

/// A session read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoredSession {
    pub groups: Vec<SessionGroup>,
    pub active_group_id: Option<String>,
    pub timestamp: i64,
    pub age_ms: i64,
    pub stale: bool,
}

/// Which backend answered a session query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionSource {
    Durable,
    Primary,
    None,
}

/// Session summary for UI display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub exists: bool,
    pub timestamp: Option<i64>,
    pub group_count: usize,
    pub tab_count: usize,
    pub source: SessionSource,
}

impl SessionInfo {
    pub fn none() -> Self {
        Self {
            exists: false,
            timestamp: None,
            group_count: 0,
            tab_count: 0,
            source: SessionSource::None,
        }
    }

    pub fn from_record(record: &SessionRecord, source: SessionSource) -> Self {
        Self {
            exists: true,
            timestamp: Some(record.timestamp),
            group_count: record.groups.len(),
            tab_count: record.tab_count(),
            source,
        }
    }
}

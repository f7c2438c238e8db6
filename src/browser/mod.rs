// Browser capability abstraction.
// Each component takes only the capabilities it calls, so hosts and test doubles
// can be substituted per concern.

use async_trait::async_trait;

use crate::types::browser::{BrowserTab, Container, CreateTabOptions, TabId, WindowId};
use crate::types::errors::BrowserError;

pub mod fake;
pub mod url_policy;

pub use fake::FakeBrowser;
pub use url_policy::{PrefixUrlPolicy, UrlPolicy};

/// Reads the live tab universe.
#[async_trait]
pub trait TabQuerier: Send + Sync {
    async fn query_all(&self) -> Result<Vec<BrowserTab>, BrowserError>;
    async fn get_tab(&self, tab_id: TabId) -> Result<BrowserTab, BrowserError>;
}

/// Opens new tabs.
#[async_trait]
pub trait TabCreator: Send + Sync {
    async fn create_tab(&self, options: CreateTabOptions) -> Result<BrowserTab, BrowserError>;
}

/// Moves focus between tabs and windows.
#[async_trait]
pub trait TabActivator: Send + Sync {
    async fn activate_tab(&self, tab_id: TabId) -> Result<(), BrowserError>;
    async fn focus_window(&self, window_id: WindowId) -> Result<(), BrowserError>;
}

/// Hides and shows tabs. Hosts without this capability return
/// [`BrowserError::Unsupported`].
#[async_trait]
pub trait TabVisibility: Send + Sync {
    async fn hide_tabs(&self, tab_ids: &[TabId]) -> Result<(), BrowserError>;
    async fn show_tabs(&self, tab_ids: &[TabId]) -> Result<(), BrowserError>;
}

/// Lists browser containers.
#[async_trait]
pub trait ContainerDirectory: Send + Sync {
    async fn query_containers(&self) -> Result<Vec<Container>, BrowserError>;
}

/// Every capability the core consumes, for hosts that provide them all.
pub trait Browser: TabQuerier + TabCreator + TabActivator + TabVisibility + ContainerDirectory {}

impl<T> Browser for T where T: TabQuerier + TabCreator + TabActivator + TabVisibility + ContainerDirectory {}

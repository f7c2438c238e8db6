//! App core for the tab-group system.
//!
//! Explicit context object constructed once at process start. It owns every
//! component, wires them to the browser's capabilities, and implements the
//! multi-component flows (switching groups, deleting the active group,
//! creating tabs in a group, startup and shutdown).

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::browser::{Browser, ContainerDirectory, PrefixUrlPolicy, TabCreator, TabQuerier, UrlPolicy};
use crate::database::sqlite_store::{DURABLE_NAMESPACE, PRIMARY_NAMESPACE};
use crate::database::{Database, KeyValueStore, SqliteStore};
use crate::managers::group_repository::{ContainerSync, DeleteOutcome, GroupRepository};
use crate::managers::session_manager::{SaveOutcome, SessionManager, Suppression};
use crate::services::config_loader::database_path;
use crate::services::notifier::Notifier;
use crate::services::reconciler::{TabClaims, TabEventReconciler};
use crate::services::visibility::{VisibilityController, VisibilityOutcome, VisibilityPorts};
use crate::types::browser::{CreateTabOptions, TabEvent, TabId};
use crate::types::config::CoreConfig;
use crate::types::errors::CoreError;
use crate::types::group::ManagedTabRef;
use crate::types::session::{RestoredSession, SessionInfo};

/// Central application struct holding all components.
pub struct App {
    pub config: CoreConfig,
    pub repository: Arc<GroupRepository>,
    pub reconciler: Arc<TabEventReconciler>,
    pub visibility: Arc<VisibilityController>,
    pub sessions: Arc<SessionManager>,
    pub notifier: Notifier,
    pub claims: Arc<TabClaims>,
    tabs: Arc<dyn TabQuerier>,
    creator: Arc<dyn TabCreator>,
    containers: Arc<dyn ContainerDirectory>,
    containers_warned: AtomicBool,
}

impl App {
    /// Wires all components over the given browser and stores.
    pub fn new<B>(
        config: CoreConfig,
        browser: Arc<B>,
        primary: Arc<dyn KeyValueStore>,
        durable: Option<Arc<dyn KeyValueStore>>,
    ) -> Self
    where
        B: Browser + 'static,
    {
        let notifier = Notifier::new(config.broadcast_debounce());
        let url_policy: Arc<dyn UrlPolicy> =
            Arc::new(PrefixUrlPolicy::new(config.privileged_url_prefixes.clone()));
        let claims = Arc::new(TabClaims::new());

        let repository = Arc::new(GroupRepository::new(
            primary.clone(),
            notifier.clone(),
            &config.default_group_name,
        ));
        let reconciler = Arc::new(TabEventReconciler::new(repository.clone(), claims.clone()));
        let visibility = Arc::new(VisibilityController::new(
            repository.clone(),
            VisibilityPorts {
                tabs: browser.clone(),
                creator: browser.clone(),
                activator: browser.clone(),
                visibility: browser.clone(),
            },
            url_policy.clone(),
            claims.clone(),
            config.settle_delay(),
        ));
        let sessions = Arc::new(SessionManager::new(
            primary,
            durable,
            url_policy,
            config.stale_session_after(),
        ));

        Self {
            config,
            repository,
            reconciler,
            visibility,
            sessions,
            notifier,
            claims,
            tabs: browser.clone(),
            creator: browser.clone(),
            containers: browser,
            containers_warned: AtomicBool::new(false),
        }
    }

    /// Opens the SQLite file under the configured data directory and uses it
    /// for both the primary and durable stores (separate namespaces).
    pub fn open<B>(config: CoreConfig, browser: Arc<B>) -> Result<Self, CoreError>
    where
        B: Browser + 'static,
    {
        let path = database_path(&config);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::StoreUnavailable(format!("{}: {}", parent.display(), e)))?;
        }
        let db = Arc::new(
            Database::open(&path).map_err(|e| CoreError::StoreUnavailable(format!("{}: {}", path.display(), e)))?,
        );
        tracing::info!(path = %path.display(), "opened tab-group database");
        let primary: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::new(db.clone(), PRIMARY_NAMESPACE));
        let durable: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::new(db, DURABLE_NAMESPACE));
        Ok(Self::new(config, browser, primary, Some(durable)))
    }

    /// Spawns the reconciler over a stream of tab events.
    pub fn spawn_event_loop(&self, events: UnboundedReceiver<TabEvent>) -> JoinHandle<()> {
        tokio::spawn(self.reconciler.clone().run(events))
    }

    // --- lifecycle ---

    /// Cold start: load groups, re-scan containers, drop tab ids that did not
    /// survive a restart, restore the session if nothing is managed, then apply
    /// visibility. Session snapshots stay suppressed until this completes.
    ///
    /// Returns the session restored on the way, so the host can offer its
    /// ghost tabs.
    pub async fn startup(&self) -> Result<Option<RestoredSession>, CoreError> {
        let mut restored_session = None;
        {
            let _starting = self.sessions.suppress(Suppression::StartingUp);

            self.repository.load_all().await?;

            match self.sync_containers().await {
                Ok(summary) => tracing::debug!(?summary, "containers synced"),
                Err(e) => tracing::warn!(error = %e, "container sync skipped"),
            }

            match self.tabs.query_all().await {
                Ok(live) => {
                    let live: HashSet<TabId> = live.iter().map(|t| t.id).collect();
                    self.repository.retain_live_tabs(&live).await?;
                }
                Err(e) => tracing::warn!(error = %e, "could not query tabs at startup"),
            }

            if self.repository.managed_tab_ids().is_empty() {
                match self.restore_session_into_groups().await {
                    Ok(Some(restored)) => {
                        tracing::info!(
                            groups = restored.groups.len(),
                            stale = restored.stale,
                            "session restored"
                        );
                        restored_session = Some(restored);
                    }
                    Ok(None) => tracing::debug!("no session to restore"),
                    Err(e) => tracing::warn!(error = %e, "session restore failed"),
                }
            }

            if let Err(e) = self.visibility.show_active_group_tabs().await {
                tracing::warn!(error = %e, "initial visibility pass failed");
            }
        }

        self.sessions
            .start_periodic_save(self.repository.clone(), self.config.session_save_interval());
        tracing::info!("startup complete");
        Ok(restored_session)
    }

    /// Suspend: stop the timer and write a final snapshot.
    pub async fn shutdown(&self) {
        self.sessions.stop_periodic_save();
        match self.sessions.save_from(&self.repository).await {
            Ok(outcome) => tracing::info!(?outcome, "final session snapshot"),
            Err(e) => tracing::warn!(error = %e, "final session snapshot failed"),
        }
    }

    // --- flows ---

    /// Makes `group_id` active and applies visibility.
    pub async fn set_active_group(&self, group_id: &str) -> Result<VisibilityOutcome, CoreError> {
        self.repository.set_active_group_id(Some(group_id)).await?;
        let outcome = self.visibility.show_active_group_tabs().await?;
        self.save_session_quietly().await;
        Ok(outcome)
    }

    /// Deletes a group. When it is the active group, another group is made
    /// active and shown first, so the deleted group's tabs are hidden before
    /// they become unmanaged.
    pub async fn delete_group(&self, group_id: &str) -> Result<DeleteOutcome, CoreError> {
        let was_active = self.repository.get_active_group_id().as_deref() == Some(group_id);
        if was_active && self.repository.get_group(group_id).is_some() {
            let next = self
                .repository
                .get_groups()
                .into_iter()
                .find(|g| g.id != group_id)
                .map(|g| g.id);
            self.repository.set_active_group_id(next.as_deref()).await?;
            if next.is_some() {
                if let Err(e) = self.visibility.show_active_group_tabs().await {
                    tracing::warn!(error = %e, "visibility switch before delete failed");
                }
            }
        }
        let mut outcome = self.repository.delete_group(group_id).await?;
        outcome.was_active = outcome.removed && was_active;
        self.save_session_quietly().await;
        Ok(outcome)
    }

    /// Opens a tab owned by `group_id`, in the group's container. Tabs opened
    /// in a background group are hidden immediately.
    ///
    /// The create request carries `group_marker`; a host that echoes it on the
    /// `created` event keeps the reconciler away from the tab. The claim below
    /// only covers events that arrive after `create_tab` returns, and the
    /// explicit assignment settles ownership either way.
    pub async fn create_tab_in_group(&self, group_id: &str, url: Option<String>) -> Result<ManagedTabRef, CoreError> {
        let group = self
            .repository
            .get_group(group_id)
            .ok_or_else(|| CoreError::NotFound(format!("group {}", group_id)))?;
        let is_active = self.repository.get_active_group_id().as_deref() == Some(group_id);
        let tab = self
            .creator
            .create_tab(CreateTabOptions {
                url,
                active: is_active,
                container_ref: if group.is_container() { group.container_ref.clone() } else { None },
                window_id: None,
                group_marker: Some(group.id.clone()),
            })
            .await?;
        self.claims.claim(tab.id);
        let tab_ref = self.repository.assign_tab(tab.id, &group.id, Some(&tab)).await?;
        if !is_active {
            self.visibility.hide_tabs(&[tab.id]).await;
        }
        Ok(tab_ref)
    }

    /// Moves a live tab into `group_id`, checking container compatibility.
    pub async fn assign_tab_to_group(&self, tab_id: TabId, group_id: &str) -> Result<ManagedTabRef, CoreError> {
        let group = self
            .repository
            .get_group(group_id)
            .ok_or_else(|| CoreError::NotFound(format!("group {}", group_id)))?;
        let tab = self.tabs.get_tab(tab_id).await?;
        if group.is_container() && !group.accepts_container(tab.container()) {
            return Err(CoreError::InvalidAssignment {
                tab_id,
                group_id: group_id.to_string(),
            });
        }
        let tab_ref = self.repository.assign_tab(tab_id, group_id, Some(&tab)).await?;
        if self.repository.get_active_group_id().as_deref() == Some(group_id) {
            self.visibility.show_tabs(&[tab_id]).await;
        } else {
            self.visibility.hide_tabs(&[tab_id]).await;
        }
        Ok(tab_ref)
    }

    pub async fn remove_tab_from_group(&self, tab_id: TabId, group_id: &str) -> Result<(), CoreError> {
        self.repository.remove_tab_from_group(tab_id, group_id).await
    }

    /// Re-scans containers into container groups. A host without containers
    /// is reported once at warn level.
    pub async fn sync_containers(&self) -> Result<ContainerSync, CoreError> {
        let containers = match self.containers.query_containers().await {
            Ok(containers) => containers,
            Err(e) => {
                let err = CoreError::from(e);
                if matches!(err, CoreError::BrowserApiUnavailable(_))
                    && !self.containers_warned.swap(true, Ordering::Relaxed)
                {
                    tracing::warn!(error = %err, "containers unavailable, container groups disabled");
                }
                return Err(err);
            }
        };
        self.repository.sync_containers(&containers).await
    }

    /// Reloads everything from the store, e.g. after an import replaced it.
    pub async fn reload_after_import(&self) -> Result<(), CoreError> {
        self.repository.load_all().await?;
        if let Err(e) = self.visibility.show_active_group_tabs().await {
            tracing::warn!(error = %e, "visibility pass after import failed");
        }
        Ok(())
    }

    // --- sessions ---

    /// Applies the stored session to the repository inside the restore window
    /// and holds its tabs as pending ghosts.
    pub async fn restore_session_into_groups(&self) -> Result<Option<RestoredSession>, CoreError> {
        let Some(restored) = self.sessions.restore_session().await? else {
            return Ok(None);
        };
        let _restoring = self.sessions.suppress(Suppression::Restoring);
        let recreated = self
            .repository
            .apply_restored(&restored.groups, restored.active_group_id.as_deref())
            .await?;
        tracing::debug!(recreated, "restored session groups applied");
        self.sessions.hold_ghosts(&restored.groups);
        Ok(Some(restored))
    }

    pub async fn save_session_now(&self) -> Result<SaveOutcome, CoreError> {
        self.sessions.save_from(&self.repository).await
    }

    pub async fn session_info(&self) -> SessionInfo {
        self.sessions.get_session_info().await
    }

    async fn save_session_quietly(&self) {
        if let Err(e) = self.save_session_now().await {
            tracing::warn!(error = %e, "session snapshot failed");
        }
    }
}

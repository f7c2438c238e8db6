//! Unit tests for the App context: startup/shutdown and the multi-component
//! command flows, run against `FakeBrowser` and in-memory stores.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc;

use tabgroups::app::App;
use tabgroups::browser::FakeBrowser;
use tabgroups::database::store::{get_typed, keys, set_typed};
use tabgroups::database::{KeyValueStore, MemoryStore};
use tabgroups::types::browser::TabEvent;
use tabgroups::types::config::CoreConfig;
use tabgroups::types::errors::CoreError;
use tabgroups::types::group::{GroupSpec, DEFAULT_GROUP_ID};
use tabgroups::types::session::{SessionGroup, SessionRecord};

struct Fixture {
    app: App,
    browser: Arc<FakeBrowser>,
    primary: Arc<MemoryStore>,
    durable: Arc<MemoryStore>,
}

fn setup() -> Fixture {
    let browser = Arc::new(FakeBrowser::new());
    let primary = Arc::new(MemoryStore::new());
    let durable = Arc::new(MemoryStore::new());
    let app = App::new(
        CoreConfig::immediate(),
        browser.clone(),
        primary.clone(),
        Some(durable.clone()),
    );
    Fixture { app, browser, primary, durable }
}

async fn backup(store: &MemoryStore) -> SessionRecord {
    get_typed::<SessionRecord>(store, keys::SESSION_BACKUP).await.unwrap().unwrap()
}

fn owners(app: &App, tab_id: i64) -> Vec<String> {
    app.repository
        .get_groups()
        .into_iter()
        .filter(|g| g.contains_tab(tab_id))
        .map(|g| g.id)
        .collect()
}

// ─── Startup & shutdown ───

#[tokio::test]
async fn test_startup_on_fresh_profile() {
    let f = setup();
    assert!(f.app.startup().await.unwrap().is_none());

    let groups = f.app.repository.get_groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].id, DEFAULT_GROUP_ID);
    // The empty default group gets its bootstrap tab.
    assert_eq!(f.browser.created_ids().len(), 1);
    assert_eq!(groups[0].tabs.len(), 1);

    // Nothing was snapshotted while starting up.
    assert!(!f.app.sessions.is_starting_up());
    assert!(f.durable.get(keys::SESSION_BACKUP).await.unwrap().is_none());
    assert!(f.app.sessions.is_periodic_save_running());
    f.app.shutdown().await;
}

#[tokio::test]
async fn test_startup_creates_container_groups() {
    let f = setup();
    f.browser.add_container("work", "Work");
    f.browser.add_container("home", "Home");
    f.app.startup().await.unwrap();

    let ids: Vec<String> = f.app.repository.ordered_groups().into_iter().map(|g| g.id).collect();
    assert_eq!(ids, vec!["container-work", "container-home", DEFAULT_GROUP_ID]);
    f.app.shutdown().await;
}

#[tokio::test]
async fn test_startup_without_container_support_continues() {
    let f = setup();
    f.browser.set_supports_containers(false);
    f.app.startup().await.unwrap();
    assert!(f.app.repository.is_loaded());

    let err = f.app.sync_containers().await.unwrap_err();
    assert!(matches!(err, CoreError::BrowserApiUnavailable(_)));
    f.app.shutdown().await;
}

#[tokio::test]
async fn test_startup_prunes_dead_tabs_and_restores_session() {
    let f = setup();
    let live = f.browser.add_tab("https://still-open.example", None);
    set_typed(
        f.primary.as_ref(),
        keys::GROUPS,
        &json!([{"id": "default", "name": "Default", "kind": "custom",
                 "tabs": [{"tabId": 500, "groupId": "default"}]}]),
    )
    .await
    .unwrap();
    let record = SessionRecord {
        timestamp: 1,
        groups: vec![SessionGroup {
            id: "custom-1-feedbeef".to_string(),
            name: "Reading".to_string(),
            kind: tabgroups::types::group::GroupKind::Custom,
            container_ref: None,
            tabs: Vec::new(),
        }],
        active_group_id: Some("custom-1-feedbeef".to_string()),
    };
    set_typed(f.durable.as_ref(), keys::SESSION_BACKUP, &record).await.unwrap();

    let restored = f.app.startup().await.unwrap().unwrap();
    assert_eq!(restored.groups.len(), 1);

    assert!(!f.app.repository.is_managed(500));
    assert!(f.app.repository.get_group("custom-1-feedbeef").is_some());
    assert_eq!(
        f.app.repository.get_active_group_id().as_deref(),
        Some("custom-1-feedbeef")
    );
    // The restored group was empty, so it got a fresh tab; the live unmanaged tab is hidden.
    assert_eq!(f.app.repository.get_active_group().unwrap().tabs.len(), 1);
    assert!(f.browser.hidden_ids().contains(&live));
    assert!(!f.app.sessions.is_restoring());
    f.app.shutdown().await;
}

#[tokio::test]
async fn test_restart_keeps_ghost_tabs_in_backup() {
    let f = setup();
    f.app.startup().await.unwrap();
    let a = f.browser.add_tab("https://a.example", None);
    let b = f.browser.add_tab("https://b.example", None);
    f.app.assign_tab_to_group(a, DEFAULT_GROUP_ID).await.unwrap();
    f.app.assign_tab_to_group(b, DEFAULT_GROUP_ID).await.unwrap();
    f.app.shutdown().await;
    assert_eq!(backup(&f.durable).await.tab_count(), 2);

    // Restart over the same stores in a browser where no tab survived.
    let browser = Arc::new(FakeBrowser::new());
    let app = App::new(
        CoreConfig::immediate(),
        browser.clone(),
        f.primary.clone(),
        Some(f.durable.clone()),
    );
    let restored = app.startup().await.unwrap().unwrap();
    assert_eq!(restored.groups[0].tabs.len(), 2);
    assert_eq!(app.sessions.pending_ghosts().len(), 2);

    // The first snapshot after startup still carries the ghosts.
    app.set_active_group(DEFAULT_GROUP_ID).await.unwrap();
    assert_eq!(backup(&f.durable).await.tab_count(), 2);
    assert_eq!(backup(&f.primary).await.tab_count(), 2);

    // Reopening a ghost replaces it in the backup instead of duplicating it.
    app.create_tab_in_group(DEFAULT_GROUP_ID, Some("https://a.example".to_string()))
        .await
        .unwrap();
    app.save_session_now().await.unwrap();
    let record = backup(&f.durable).await;
    assert_eq!(record.tab_count(), 2);
    assert_eq!(app.sessions.pending_ghosts().len(), 1);
    assert_eq!(app.sessions.pending_ghosts()[0].url, "https://b.example");
    app.shutdown().await;
}

#[tokio::test]
async fn test_tab_event_before_startup_keeps_stored_groups() {
    let f = setup();
    set_typed(
        f.primary.as_ref(),
        keys::GROUPS,
        &json!([{"id": "custom-9-00000000", "name": "Reading", "kind": "custom",
                 "tabs": [{"tabId": 7, "groupId": "custom-9-00000000"}]}]),
    )
    .await
    .unwrap();

    f.app
        .reconciler
        .handle(TabEvent::Activated { tab_id: 7, window_id: None })
        .await;

    let stored: serde_json::Value = get_typed(f.primary.as_ref(), keys::GROUPS).await.unwrap().unwrap();
    assert_eq!(stored.as_array().unwrap().len(), 1);
    assert_eq!(stored[0]["name"], "Reading");
}

#[tokio::test]
async fn test_shutdown_writes_final_snapshot() {
    let f = setup();
    f.app.startup().await.unwrap();
    f.app.shutdown().await;

    assert!(!f.app.sessions.is_periodic_save_running());
    let record: Option<SessionRecord> = get_typed(f.durable.as_ref(), keys::SESSION_BACKUP).await.unwrap();
    let record = record.unwrap();
    assert_eq!(record.active_group_id.as_deref(), Some(DEFAULT_GROUP_ID));
}

// ─── Group switching & deletion ───

#[tokio::test]
async fn test_switch_to_empty_group() {
    let f = setup();
    f.app.repository.load_all().await.unwrap();
    let a1 = f.browser.add_tab("https://a1.example", None);
    let a2 = f.browser.add_tab("https://a2.example", None);
    f.app.repository.assign_tab(a1, DEFAULT_GROUP_ID, None).await.unwrap();
    f.app.repository.assign_tab(a2, DEFAULT_GROUP_ID, None).await.unwrap();
    let b = f.app.repository.create_group(GroupSpec::custom("B")).await.unwrap();

    let outcome = f.app.set_active_group(&b.id).await.unwrap();

    let new_tab = outcome.created.unwrap();
    assert_eq!(f.browser.created_ids(), vec![new_tab]);
    assert_eq!(f.browser.hidden_ids(), HashSet::from([a1, a2]));
    assert!(f.browser.visible_ids().contains(&new_tab));
    assert_eq!(f.browser.active_tab(), Some(new_tab));
    assert_eq!(owners(&f.app, new_tab), vec![b.id.clone()]);
    // The switch is snapshotted.
    assert!(f.durable.get(keys::SESSION_BACKUP).await.unwrap().is_some());
}

#[tokio::test]
async fn test_set_active_unknown_group_fails() {
    let f = setup();
    f.app.repository.load_all().await.unwrap();
    let err = f.app.set_active_group("ghost").await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_only_active_group() {
    let f = setup();
    f.app.repository.load_all().await.unwrap();

    let outcome = f.app.delete_group(DEFAULT_GROUP_ID).await.unwrap();
    assert!(outcome.removed);
    assert!(outcome.was_active);
    assert_eq!(outcome.active_group_id, None);

    let after = f.app.visibility.show_active_group_tabs().await.unwrap();
    assert_eq!(after.active_group_id, None);
    assert!(f.browser.created_ids().is_empty());
}

#[tokio::test]
async fn test_delete_active_group_switches_first() {
    let f = setup();
    f.app.repository.load_all().await.unwrap();
    let doomed = f.app.repository.create_group(GroupSpec::custom("Doomed")).await.unwrap();
    let keep_tab = f.browser.add_tab("https://keep.example", None);
    let doomed_tab = f.browser.add_tab("https://doomed.example", None);
    f.app.repository.assign_tab(keep_tab, DEFAULT_GROUP_ID, None).await.unwrap();
    f.app.repository.assign_tab(doomed_tab, &doomed.id, None).await.unwrap();
    f.app.set_active_group(&doomed.id).await.unwrap();

    let outcome = f.app.delete_group(&doomed.id).await.unwrap();

    assert!(outcome.was_active);
    assert_eq!(outcome.active_group_id.as_deref(), Some(DEFAULT_GROUP_ID));
    assert_eq!(outcome.orphaned_tabs, vec![doomed_tab]);
    assert!(f.browser.hidden_ids().contains(&doomed_tab));
    assert!(f.browser.visible_ids().contains(&keep_tab));
    assert!(!f.app.repository.is_managed(doomed_tab));
}

#[tokio::test]
async fn test_delete_inactive_group_reports_not_active() {
    let f = setup();
    f.app.repository.load_all().await.unwrap();
    let other = f.app.repository.create_group(GroupSpec::custom("Other")).await.unwrap();
    let outcome = f.app.delete_group(&other.id).await.unwrap();
    assert!(outcome.removed);
    assert!(!outcome.was_active);
    assert_eq!(outcome.active_group_id.as_deref(), Some(DEFAULT_GROUP_ID));
}

// ─── Tab commands ───

#[tokio::test]
async fn test_create_tab_in_background_group_is_hidden() {
    let f = setup();
    f.app.repository.load_all().await.unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    f.browser.set_event_sink(tx);
    let events = f.app.spawn_event_loop(rx);
    let other = f.app.repository.create_group(GroupSpec::custom("Other")).await.unwrap();

    let tab_ref = f
        .app
        .create_tab_in_group(&other.id, Some("https://later.example".to_string()))
        .await
        .unwrap();

    // Let the created event reach the reconciler.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(owners(&f.app, tab_ref.tab_id), vec![other.id.clone()]);
    assert!(f.browser.hidden_ids().contains(&tab_ref.tab_id));
    assert_eq!(tab_ref.url, "https://later.example");
    assert!(f.app.claims.is_claimed(tab_ref.tab_id));
    events.abort();
}

#[tokio::test]
async fn test_create_tab_in_active_container_group() {
    let f = setup();
    f.app.repository.load_all().await.unwrap();
    let work = f.app.repository.create_group(GroupSpec::container("Work", "work")).await.unwrap();
    f.app.repository.set_active_group_id(Some(&work.id)).await.unwrap();

    let tab_ref = f.app.create_tab_in_group(&work.id, None).await.unwrap();

    let live = f.browser.tab(tab_ref.tab_id).unwrap();
    assert_eq!(live.container_ref.as_deref(), Some("work"));
    assert!(live.active);
    assert!(!live.hidden);
    assert_eq!(tab_ref.group_id, work.id);
}

#[tokio::test]
async fn test_create_tab_in_unknown_group_fails() {
    let f = setup();
    let err = f.app.create_tab_in_group("nope", None).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
    assert!(f.browser.created_ids().is_empty());
}

#[tokio::test]
async fn test_assign_tab_checks_container() {
    let f = setup();
    f.app.repository.load_all().await.unwrap();
    let work = f.app.repository.create_group(GroupSpec::container("Work", "work")).await.unwrap();
    let personal = f.browser.add_tab("https://personal.example", Some("home"));

    let err = f.app.assign_tab_to_group(personal, &work.id).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidAssignment { tab_id, .. } if tab_id == personal));
    assert!(!f.app.repository.is_managed(personal));

    let office = f.browser.add_tab("https://office.example", Some("work"));
    f.app.assign_tab_to_group(office, &work.id).await.unwrap();
    assert_eq!(owners(&f.app, office), vec![work.id.clone()]);
}

#[tokio::test]
async fn test_assign_tab_into_background_group_hides_it() {
    let f = setup();
    f.app.repository.load_all().await.unwrap();
    let other = f.app.repository.create_group(GroupSpec::custom("Other")).await.unwrap();
    let t = f.browser.add_tab("https://x.example", None);
    f.app.repository.assign_tab(t, DEFAULT_GROUP_ID, None).await.unwrap();

    f.app.assign_tab_to_group(t, &other.id).await.unwrap();
    assert_eq!(owners(&f.app, t), vec![other.id]);
    assert!(f.browser.hidden_ids().contains(&t));

    f.app.assign_tab_to_group(t, DEFAULT_GROUP_ID).await.unwrap();
    assert!(!f.browser.hidden_ids().contains(&t));
}

#[tokio::test]
async fn test_assign_unknown_tab_is_not_found() {
    let f = setup();
    f.app.repository.load_all().await.unwrap();
    let err = f.app.assign_tab_to_group(404, DEFAULT_GROUP_ID).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

// ─── Sessions & import ───

#[tokio::test]
async fn test_restore_without_session_is_none() {
    let f = setup();
    f.app.repository.load_all().await.unwrap();
    assert!(f.app.restore_session_into_groups().await.unwrap().is_none());
}

#[tokio::test]
async fn test_reload_after_import_picks_up_store_contents() {
    let f = setup();
    f.app.repository.load_all().await.unwrap();
    f.primary
        .set(
            keys::GROUPS,
            json!([
                {"id": "default", "name": "Default", "kind": "custom"},
                {"id": "custom-9-00000000", "name": "Imported", "kind": "custom"}
            ]),
        )
        .await
        .unwrap();
    f.primary.set(keys::ACTIVE_GROUP_ID, json!("custom-9-00000000")).await.unwrap();

    f.app.reload_after_import().await.unwrap();
    assert_eq!(f.app.repository.get_groups().len(), 2);
    assert_eq!(
        f.app.repository.get_active_group_id().as_deref(),
        Some("custom-9-00000000")
    );
}

#[tokio::test]
async fn test_open_uses_sqlite_under_data_dir() {
    let tmp = TempDir::new().unwrap();
    let config = CoreConfig {
        data_dir: Some(tmp.path().join("profile")),
        ..CoreConfig::immediate()
    };
    let browser = Arc::new(FakeBrowser::new());

    {
        let app = App::open(config.clone(), browser.clone()).unwrap();
        app.startup().await.unwrap();
        app.repository.create_group(GroupSpec::custom("Persisted")).await.unwrap();
        app.shutdown().await;
    }
    assert!(tmp.path().join("profile").join("tabgroups.db").exists());

    let app = App::open(config, browser).unwrap();
    app.repository.load_all().await.unwrap();
    assert!(app.repository.get_groups().iter().any(|g| g.name == "Persisted"));
    assert!(app.session_info().await.exists);
}

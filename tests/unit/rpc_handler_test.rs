//! Unit tests for the RPC handler: every command dispatched by `handle_method`.
//!
//! These tests exercise each method through the same code path used by the
//! real `tabgroups-rpc` binary, with `FakeBrowser` standing in for the host.

use std::sync::Arc;

use serde_json::{json, Value};

use tabgroups::app::App;
use tabgroups::browser::FakeBrowser;
use tabgroups::database::MemoryStore;
use tabgroups::managers::session_manager::Suppression;
use tabgroups::rpc_handler::handle_method;
use tabgroups::types::config::CoreConfig;

/// Create a loaded App over a fake browser and in-memory stores.
async fn setup() -> (App, Arc<FakeBrowser>) {
    let browser = Arc::new(FakeBrowser::new());
    let app = App::new(
        CoreConfig::immediate(),
        browser.clone(),
        Arc::new(MemoryStore::new()),
        Some(Arc::new(MemoryStore::new())),
    );
    app.repository.load_all().await.unwrap();
    (app, browser)
}

async fn call(app: &App, method: &str, params: Value) -> Value {
    handle_method(app, method, &params)
        .await
        .unwrap_or_else(|e| panic!("{} failed: {}", method, e))
}

// ─── Ping & unknown ───

#[tokio::test]
async fn test_ping() {
    let (app, _browser) = setup().await;
    let res = call(&app, "ping", json!({})).await;
    assert_eq!(res["pong"], true);
}

#[tokio::test]
async fn test_unknown_method_returns_error() {
    let (app, _browser) = setup().await;
    let res = handle_method(&app, "tabs.nonexistent", &json!({})).await;
    assert!(res.unwrap_err().contains("unknown method"));
}

// ─── Groups ───

#[tokio::test]
async fn test_create_and_list_groups() {
    let (app, _browser) = setup().await;
    let custom = call(&app, "createGroup", json!({"name": "Reading"})).await;
    assert_eq!(custom["kind"], "custom");
    assert_eq!(custom["name"], "Reading");

    let container = call(
        &app,
        "createGroup",
        json!({"name": "Work", "kind": "container", "containerRef": "work"}),
    )
    .await;
    assert_eq!(container["id"], "container-work");

    let groups = call(&app, "getGroups", json!({})).await;
    let names: Vec<&str> = groups
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Work", "Default", "Reading"]);
}

#[tokio::test]
async fn test_create_container_group_twice_is_idempotent() {
    let (app, _browser) = setup().await;
    let spec = json!({"kind": "container", "containerRef": "work", "name": "Work"});
    let first = call(&app, "createGroup", spec.clone()).await;
    let second = call(&app, "createGroup", spec).await;
    assert_eq!(first["id"], second["id"]);
    assert_eq!(call(&app, "getGroups", json!({})).await.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_create_group_rejects_bad_spec() {
    let (app, _browser) = setup().await;
    let res = handle_method(&app, "createGroup", &json!({"kind": "planet"})).await;
    assert!(res.unwrap_err().contains("invalid group spec"));
    let res = handle_method(&app, "createGroup", &json!({"name": ""})).await;
    assert!(res.unwrap_err().contains("Invalid request"));
}

#[tokio::test]
async fn test_update_group() {
    let (app, _browser) = setup().await;
    let res = call(
        &app,
        "updateGroup",
        json!({"groupId": "default", "patch": {"name": "Inbox", "expanded": false}}),
    )
    .await;
    assert_eq!(res["name"], "Inbox");
    assert_eq!(res["expanded"], false);

    let missing = handle_method(&app, "updateGroup", &json!({"groupId": "default"})).await;
    assert_eq!(missing.unwrap_err(), "missing patch");
    let unknown = handle_method(&app, "updateGroup", &json!({"groupId": "x", "patch": {}})).await;
    assert!(unknown.unwrap_err().contains("Not found"));
}

#[tokio::test]
async fn test_set_and_get_active_group() {
    let (app, browser) = setup().await;
    let group = call(&app, "createGroup", json!({"name": "Next"})).await;
    let id = group["id"].as_str().unwrap().to_string();

    let res = call(&app, "setActiveGroup", json!({"groupId": id})).await;
    assert_eq!(res["success"], true);
    assert_eq!(browser.created_ids().len(), 1);

    let active = call(&app, "getActiveGroup", json!({})).await;
    assert_eq!(active["activeGroupId"], id);
    assert_eq!(active["group"]["name"], "Next");
}

#[tokio::test]
async fn test_set_active_group_requires_id() {
    let (app, _browser) = setup().await;
    let res = handle_method(&app, "setActiveGroup", &json!({})).await;
    assert_eq!(res.unwrap_err(), "missing groupId");
}

#[tokio::test]
async fn test_delete_group() {
    let (app, _browser) = setup().await;
    let res = call(&app, "deleteGroup", json!({"groupId": "default"})).await;
    assert_eq!(res["success"], true);
    assert_eq!(res["removed"], true);
    assert_eq!(res["activeGroupId"], Value::Null);

    let again = call(&app, "deleteGroup", json!({"groupId": "default"})).await;
    assert_eq!(again["removed"], false);
}

// ─── Tabs ───

#[tokio::test]
async fn test_create_tab_in_group() {
    let (app, browser) = setup().await;
    let res = call(
        &app,
        "createTabInGroup",
        json!({"groupId": "default", "url": "https://docs.example"}),
    )
    .await;
    let tab_id = res["tabId"].as_i64().unwrap();
    assert_eq!(res["groupId"], "default");
    assert_eq!(browser.tab(tab_id).unwrap().url, "https://docs.example");
}

#[tokio::test]
async fn test_assign_and_remove_tab() {
    let (app, browser) = setup().await;
    let t = browser.add_tab("https://x.example", None);

    let res = call(&app, "assignTabToGroup", json!({"tabId": t, "groupId": "default"})).await;
    assert_eq!(res, json!({"success": true}));
    assert!(app.repository.is_managed(t));

    let res = call(&app, "removeTabFromGroup", json!({"tabId": t, "groupId": "default"})).await;
    assert_eq!(res, json!({"success": true}));
    assert!(!app.repository.is_managed(t));

    let again = handle_method(&app, "removeTabFromGroup", &json!({"tabId": t, "groupId": "default"})).await;
    assert!(again.unwrap_err().contains("Not found"));
}

#[tokio::test]
async fn test_assign_tab_container_mismatch() {
    let (app, browser) = setup().await;
    call(&app, "createGroup", json!({"kind": "container", "containerRef": "work", "name": "Work"})).await;
    let t = browser.add_tab("https://x.example", None);
    let res = handle_method(&app, "assignTabToGroup", &json!({"tabId": t, "groupId": "container-work"})).await;
    assert!(res.unwrap_err().contains("container mismatch"));
}

#[tokio::test]
async fn test_tab_commands_require_tab_id() {
    let (app, _browser) = setup().await;
    let res = handle_method(&app, "assignTabToGroup", &json!({"groupId": "default"})).await;
    assert_eq!(res.unwrap_err(), "missing tabId");
}

#[tokio::test]
async fn test_sync_containers() {
    let (app, browser) = setup().await;
    browser.add_container("work", "Work");
    let res = call(&app, "syncContainers", json!({})).await;
    assert_eq!(res, json!({"success": true, "created": 1, "renamed": 0}));

    browser.set_supports_containers(false);
    let res = handle_method(&app, "syncContainers", &json!({})).await;
    assert!(res.unwrap_err().contains("Browser API unavailable"));
}

// ─── Sessions ───

#[tokio::test]
async fn test_session_lifecycle() {
    let (app, _browser) = setup().await;

    let info = call(&app, "getSessionInfo", json!({})).await;
    assert_eq!(info["exists"], false);
    assert_eq!(info["source"], "none");

    let saved = call(&app, "saveSession", json!({})).await;
    assert_eq!(saved["success"], true);
    assert_eq!(saved["durable"], true);

    let info = call(&app, "getSessionInfo", json!({})).await;
    assert_eq!(info["exists"], true);
    assert_eq!(info["source"], "durable");
    assert_eq!(info["groupCount"], 1);

    let restored = call(&app, "restoreSession", json!({})).await;
    assert_eq!(restored["success"], true);
    assert_eq!(restored["activeGroupId"], "default");
    assert_eq!(restored["stale"], false);

    let cleared = call(&app, "clearSession", json!({})).await;
    assert_eq!(cleared["success"], true);
    let restored = call(&app, "restoreSession", json!({})).await;
    assert_eq!(restored["success"], false);
}

#[tokio::test]
async fn test_restored_ghosts_are_pending_until_cleared() {
    let (app, browser) = setup().await;
    let tab = browser.add_tab("https://read-later.example", None);
    call(&app, "assignTabToGroup", json!({"tabId": tab, "groupId": "default"})).await;
    call(&app, "saveSession", json!({})).await;

    let restored = call(&app, "restoreSession", json!({})).await;
    assert_eq!(restored["groups"][0]["tabs"][0]["url"], "https://read-later.example");
    let pending = call(&app, "getPendingGhosts", json!({})).await;
    assert_eq!(pending["ghosts"].as_array().unwrap().len(), 1);
    assert_eq!(pending["ghosts"][0]["groupId"], "default");

    call(&app, "clearSession", json!({})).await;
    let pending = call(&app, "getPendingGhosts", json!({})).await;
    assert_eq!(pending["ghosts"], json!([]));
}

#[tokio::test]
async fn test_save_session_reports_suppression() {
    let (app, _browser) = setup().await;
    let _starting = app.sessions.suppress(Suppression::StartingUp);
    let res = call(&app, "saveSession", json!({})).await;
    assert_eq!(res, json!({"success": false, "reason": "startingUp"}));
}

#[tokio::test]
async fn test_reload_after_import() {
    let (app, _browser) = setup().await;
    let res = call(&app, "reloadAfterImport", json!({})).await;
    assert_eq!(res, json!({"success": true}));
    assert_eq!(app.repository.get_groups().len(), 1);
}

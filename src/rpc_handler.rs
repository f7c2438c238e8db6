//! RPC method handler for the tab-group command surface.
//!
//! Extracted from `rpc_server.rs` so it can be unit-tested independently.
//! The `handle_method` function dispatches command calls to the repository,
//! visibility controller and session manager via the `App` struct.

use serde_json::{json, Value};

use crate::app::App;
use crate::managers::session_manager::SaveOutcome;
use crate::types::browser::TabId;
use crate::types::group::{GroupPatch, GroupSpec};
use crate::types::session::RestoredSession;

fn str_param<'a>(params: &'a Value, name: &str) -> Result<&'a str, String> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing {}", name))
}

fn tab_id_param(params: &Value) -> Result<TabId, String> {
    params
        .get("tabId")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| "missing tabId".to_string())
}

/// Wire form of a restored session, shared by `restoreSession` and the
/// `ready` event.
pub fn restored_session_json(session: &RestoredSession) -> Value {
    json!({
        "groups": session.groups,
        "activeGroupId": session.active_group_id,
        "timestamp": session.timestamp,
        "ageMs": session.age_ms,
        "stale": session.stale,
    })
}

/// Dispatch a command to the appropriate component.
///
/// Returns `Ok(Value)` on success or `Err(String)` with an error message.
pub async fn handle_method(app: &App, method: &str, params: &Value) -> Result<Value, String> {
    match method {
        "ping" => Ok(json!({"pong": true, "version": env!("CARGO_PKG_VERSION")})),

        // ─── Groups ───
        "getGroups" => {
            let groups = app.repository.ordered_groups();
            serde_json::to_value(groups).map_err(|e| e.to_string())
        }
        "getActiveGroup" => {
            let group = app.repository.get_active_group();
            Ok(json!({
                "activeGroupId": app.repository.get_active_group_id(),
                "group": group,
            }))
        }
        "setActiveGroup" => {
            let group_id = str_param(params, "groupId")?;
            let outcome = app.set_active_group(group_id).await.map_err(|e| e.to_string())?;
            Ok(json!({
                "success": true,
                "shown": outcome.shown.len(),
                "hidden": outcome.hidden.len(),
                "created": outcome.created,
                "partialFailure": outcome.partial_failure,
            }))
        }
        "createGroup" => {
            let spec: GroupSpec = serde_json::from_value(params.clone())
                .map_err(|e| format!("invalid group spec: {}", e))?;
            let group = app.repository.create_group(spec).await.map_err(|e| e.to_string())?;
            serde_json::to_value(group).map_err(|e| e.to_string())
        }
        "updateGroup" => {
            let group_id = str_param(params, "groupId")?;
            let patch: GroupPatch = match params.get("patch") {
                Some(patch) => serde_json::from_value(patch.clone()).map_err(|e| format!("invalid patch: {}", e))?,
                None => return Err("missing patch".to_string()),
            };
            let group = app
                .repository
                .update_group(group_id, patch)
                .await
                .map_err(|e| e.to_string())?;
            serde_json::to_value(group).map_err(|e| e.to_string())
        }
        "deleteGroup" => {
            let group_id = str_param(params, "groupId")?;
            let outcome = app.delete_group(group_id).await.map_err(|e| e.to_string())?;
            Ok(json!({
                "success": true,
                "removed": outcome.removed,
                "activeGroupId": outcome.active_group_id,
            }))
        }

        // ─── Tabs ───
        "createTabInGroup" => {
            let group_id = str_param(params, "groupId")?;
            let url = params.get("url").and_then(|v| v.as_str()).map(str::to_string);
            let tab_ref = app
                .create_tab_in_group(group_id, url)
                .await
                .map_err(|e| e.to_string())?;
            serde_json::to_value(tab_ref).map_err(|e| e.to_string())
        }
        "assignTabToGroup" => {
            let tab_id = tab_id_param(params)?;
            let group_id = str_param(params, "groupId")?;
            app.assign_tab_to_group(tab_id, group_id).await.map_err(|e| e.to_string())?;
            Ok(json!({"success": true}))
        }
        "removeTabFromGroup" => {
            let tab_id = tab_id_param(params)?;
            let group_id = str_param(params, "groupId")?;
            app.remove_tab_from_group(tab_id, group_id).await.map_err(|e| e.to_string())?;
            Ok(json!({"success": true}))
        }
        "syncContainers" => {
            let summary = app.sync_containers().await.map_err(|e| e.to_string())?;
            Ok(json!({"success": true, "created": summary.created, "renamed": summary.renamed}))
        }

        // ─── Sessions ───
        "getSessionInfo" => {
            let info = app.session_info().await;
            serde_json::to_value(info).map_err(|e| e.to_string())
        }
        "saveSession" => match app.save_session_now().await.map_err(|e| e.to_string())? {
            SaveOutcome::Saved { timestamp, primary, durable } => Ok(json!({
                "success": true,
                "timestamp": timestamp,
                "primary": primary,
                "durable": durable,
            })),
            SaveOutcome::SuppressedRestoring => Ok(json!({"success": false, "reason": "restoring"})),
            SaveOutcome::SuppressedStartingUp => Ok(json!({"success": false, "reason": "startingUp"})),
        },
        "restoreSession" => {
            let restored = app.restore_session_into_groups().await.map_err(|e| e.to_string())?;
            match restored {
                Some(session) => {
                    let mut body = restored_session_json(&session);
                    body["success"] = json!(true);
                    Ok(body)
                }
                None => Ok(json!({"success": false, "reason": "no session"})),
            }
        }
        "getPendingGhosts" => Ok(json!({"ghosts": app.sessions.pending_ghosts()})),
        "clearSession" => {
            app.sessions.clear_session().await.map_err(|e| e.to_string())?;
            Ok(json!({"success": true}))
        }
        "reloadAfterImport" => {
            app.reload_after_import().await.map_err(|e| e.to_string())?;
            Ok(json!({"success": true}))
        }

        _ => Err(format!("unknown method: {}", method)),
    }
}

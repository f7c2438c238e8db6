//! Tab-group RPC server: newline-delimited JSON over stdin/stdout.
//!
//! Host → core:
//!   {"id":1, "method":"setActiveGroup", "params":{"groupId":"..."}}
//!   {"event":"tab.created", "data":{...}}
//!   {"reply":7, "result":[...]} or {"reply":7, "error":"..."}
//! Core → host:
//!   {"id":1, "result":{...}} or {"id":1, "error":"..."}
//!   {"call":7, "method":"tabs.query", "params":{}}
//!   {"event":"groupsChanged"}
//!   {"event":"ready", "version":"...", "restored":{...} or null}
//!
//! `tabs.create` params carry `groupMarker` when the tab is opened for a
//! group; the host echoes it on the matching `tab.created` event.
//!
//! Logs go to stderr; stdout carries the protocol only.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::EnvFilter;

use tabgroups::app::App;
use tabgroups::bridge::{parse_inbound, Inbound, StdioBrowser};
use tabgroups::rpc_handler::{handle_method, restored_session_json};
use tabgroups::services::config_loader::{load_config, ENV_CONFIG_PATH};
use tabgroups::services::notifier::UiNotification;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config_path = std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from);
    let config = match load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            std::process::exit(2);
        }
    };

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = out_rx.recv().await {
            let mut line = message.to_string();
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    let browser = Arc::new(StdioBrowser::new(out_tx.clone()));
    let app = match App::open(config, browser.clone()) {
        Ok(app) => Arc::new(app),
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize tab-group core");
            std::process::exit(1);
        }
    };

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let event_loop = app.spawn_event_loop(event_rx);

    let mut notifications = app.notifier.subscribe();
    let notify_tx = out_tx.clone();
    tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(UiNotification::GroupsChanged) => {
                    if notify_tx.send(json!({"event": "groupsChanged"})).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "notification receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Startup calls into the browser, so it must run while stdin is being read.
    let startup_app = app.clone();
    let ready_tx = out_tx.clone();
    tokio::spawn(async move {
        match startup_app.startup().await {
            Ok(restored) => {
                let restored = restored.as_ref().map(restored_session_json).unwrap_or(Value::Null);
                let _ = ready_tx.send(json!({
                    "event": "ready",
                    "version": env!("CARGO_PKG_VERSION"),
                    "restored": restored,
                }));
            }
            Err(e) => tracing::error!(error = %e, "startup failed"),
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_inbound(&line) {
            Ok(Inbound::Reply { call, result }) => {
                browser.resolve(call, result);
            }
            Ok(Inbound::Event(event)) => {
                if event_tx.send(event).is_err() {
                    tracing::warn!("tab event loop stopped, dropping event");
                }
            }
            Ok(Inbound::Command { id, method, params }) => {
                let app = app.clone();
                let tx = out_tx.clone();
                tokio::spawn(async move {
                    let response = match handle_method(&app, &method, &params).await {
                        Ok(result) => json!({"id": id, "result": result}),
                        Err(error) => {
                            tracing::debug!(%method, %error, "command failed");
                            json!({"id": id, "error": error})
                        }
                    };
                    let _ = tx.send(response);
                });
            }
            Err(error) => {
                let _ = out_tx.send(json!({"id": null, "error": error}));
            }
        }
    }

    tracing::info!("host closed stdin, shutting down");
    drop(event_tx);
    let _ = event_loop.await;
    app.shutdown().await;
    // Other tasks still hold senders; give the writer a moment to drain.
    drop(out_tx);
    let _ = tokio::time::timeout(Duration::from_millis(500), writer).await;
}

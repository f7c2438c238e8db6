//! Stdio bridge to the browser host.
//!
//! The host and the core exchange newline-delimited JSON. Lines from the host
//! are commands, tab events, or replies to calls the core made; the core
//! writes command responses, browser calls and notifications. [`StdioBrowser`]
//! implements every browser capability by round-tripping a call through the
//! outbound channel and waiting for the matching reply.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

use crate::browser::{ContainerDirectory, TabActivator, TabCreator, TabQuerier, TabVisibility};
use crate::types::browser::{BrowserTab, Container, CreateTabOptions, TabEvent, TabId, WindowId};
use crate::types::errors::BrowserError;

/// How long a browser call waits for the host's reply.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// A parsed line from the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command { id: Value, method: String, params: Value },
    Event(TabEvent),
    Reply { call: u64, result: Result<Value, String> },
}

/// Classifies one line received from the host.
pub fn parse_inbound(line: &str) -> Result<Inbound, String> {
    let value: Value = serde_json::from_str(line).map_err(|e| format!("parse error: {}", e))?;

    if let Some(call) = value.get("reply") {
        let call = call.as_u64().ok_or("invalid reply id")?;
        let result = match value.get("error") {
            Some(err) if !err.is_null() => Err(err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string())),
            _ => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
        };
        return Ok(Inbound::Reply { call, result });
    }

    if value.get("event").is_some() {
        let event: TabEvent = serde_json::from_value(value).map_err(|e| format!("invalid event: {}", e))?;
        return Ok(Inbound::Event(event));
    }

    let method = value
        .get("method")
        .and_then(|v| v.as_str())
        .ok_or("missing method")?
        .to_string();
    Ok(Inbound::Command {
        id: value.get("id").cloned().unwrap_or(Value::Null),
        method,
        params: value.get("params").cloned().unwrap_or(json!({})),
    })
}

type PendingReply = oneshot::Sender<Result<Value, String>>;

/// Browser capabilities provided by the host process over stdio.
pub struct StdioBrowser {
    outbound: mpsc::UnboundedSender<Value>,
    pending: Mutex<HashMap<u64, PendingReply>>,
    next_call: AtomicU64,
    timeout: Duration,
}

impl StdioBrowser {
    /// `outbound` carries lines to the host; the caller owns the writer.
    pub fn new(outbound: mpsc::UnboundedSender<Value>) -> Self {
        Self::with_timeout(outbound, CALL_TIMEOUT)
    }

    pub fn with_timeout(outbound: mpsc::UnboundedSender<Value>, timeout: Duration) -> Self {
        Self {
            outbound,
            pending: Mutex::new(HashMap::new()),
            next_call: AtomicU64::new(1),
            timeout,
        }
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<u64, PendingReply>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Completes the call `call` with the host's reply. Returns false for an
    /// unknown or already completed call.
    pub fn resolve(&self, call: u64, result: Result<Value, String>) -> bool {
        let Some(waiter) = self.pending().remove(&call) else {
            tracing::debug!(call, "reply for unknown browser call");
            return false;
        };
        waiter.send(result).is_ok()
    }

    pub fn pending_calls(&self) -> usize {
        self.pending().len()
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, BrowserError> {
        let call = self.next_call.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending().insert(call, tx);

        if self
            .outbound
            .send(json!({"call": call, "method": method, "params": params}))
            .is_err()
        {
            self.pending().remove(&call);
            return Err(BrowserError::Call("host channel closed".to_string()));
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(classify_error(method, message)),
            Ok(Err(_)) => Err(BrowserError::Call(format!("{}: reply dropped", method))),
            Err(_) => {
                self.pending().remove(&call);
                tracing::warn!(method, call, "browser call timed out");
                Err(BrowserError::Call(format!("{}: timed out", method)))
            }
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(method: &str, value: Value) -> Result<T, BrowserError> {
        serde_json::from_value(value).map_err(|e| BrowserError::Call(format!("{}: bad reply: {}", method, e)))
    }
}

fn classify_error(method: &str, message: String) -> BrowserError {
    if message.to_ascii_lowercase().starts_with("unsupported") {
        BrowserError::Unsupported(format!("{}: {}", method, message))
    } else {
        BrowserError::Call(format!("{}: {}", method, message))
    }
}

#[async_trait]
impl TabQuerier for StdioBrowser {
    async fn query_all(&self) -> Result<Vec<BrowserTab>, BrowserError> {
        let value = self.call("tabs.query", json!({})).await?;
        Self::decode("tabs.query", value)
    }

    async fn get_tab(&self, tab_id: TabId) -> Result<BrowserTab, BrowserError> {
        match self.call("tabs.get", json!({"tabId": tab_id})).await {
            Ok(Value::Null) => Err(BrowserError::TabNotFound(tab_id)),
            Ok(value) => Self::decode("tabs.get", value),
            Err(BrowserError::Call(message)) if message.to_ascii_lowercase().contains("not found") => {
                Err(BrowserError::TabNotFound(tab_id))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TabCreator for StdioBrowser {
    async fn create_tab(&self, options: CreateTabOptions) -> Result<BrowserTab, BrowserError> {
        let params = serde_json::to_value(&options).map_err(|e| BrowserError::Call(e.to_string()))?;
        let value = self.call("tabs.create", params).await?;
        Self::decode("tabs.create", value)
    }
}

#[async_trait]
impl TabActivator for StdioBrowser {
    async fn activate_tab(&self, tab_id: TabId) -> Result<(), BrowserError> {
        self.call("tabs.update", json!({"tabId": tab_id, "active": true})).await?;
        Ok(())
    }

    async fn focus_window(&self, window_id: WindowId) -> Result<(), BrowserError> {
        self.call("windows.focus", json!({"windowId": window_id})).await?;
        Ok(())
    }
}

#[async_trait]
impl TabVisibility for StdioBrowser {
    async fn hide_tabs(&self, tab_ids: &[TabId]) -> Result<(), BrowserError> {
        self.call("tabs.hide", json!({"tabIds": tab_ids})).await?;
        Ok(())
    }

    async fn show_tabs(&self, tab_ids: &[TabId]) -> Result<(), BrowserError> {
        self.call("tabs.show", json!({"tabIds": tab_ids})).await?;
        Ok(())
    }
}

#[async_trait]
impl ContainerDirectory for StdioBrowser {
    async fn query_containers(&self) -> Result<Vec<Container>, BrowserError> {
        let value = self.call("containers.query", json!({})).await?;
        Self::decode("containers.query", value)
    }
}

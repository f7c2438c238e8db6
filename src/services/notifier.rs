//! "Groups changed" notifications for UI collaborators.
//!
//! Notifications are coalesced: any number of `groups_changed` calls inside the
//! debounce window produce one broadcast. Having no listener is not an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UiNotification {
    GroupsChanged,
}

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<UiNotification>,
    pending: Arc<AtomicBool>,
    debounce: Duration,
}

impl Notifier {
    pub fn new(debounce: Duration) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            tx,
            pending: Arc::new(AtomicBool::new(false)),
            debounce,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiNotification> {
        self.tx.subscribe()
    }

    /// Schedules a single coalesced "groups changed" broadcast.
    pub fn groups_changed(&self) {
        if self.debounce.is_zero() {
            self.send(UiNotification::GroupsChanged);
            return;
        }
        if self.pending.swap(true, Ordering::AcqRel) {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let notifier = self.clone();
                handle.spawn(async move {
                    tokio::time::sleep(notifier.debounce).await;
                    notifier.pending.store(false, Ordering::Release);
                    notifier.send(UiNotification::GroupsChanged);
                });
            }
            Err(_) => {
                self.pending.store(false, Ordering::Release);
                self.send(UiNotification::GroupsChanged);
            }
        }
    }

    fn send(&self, notification: UiNotification) {
        if self.tx.send(notification).is_err() {
            tracing::trace!(?notification, "no UI listener for notification");
        }
    }
}

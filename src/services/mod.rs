// Tab-group services
// Services act on managed state: event reconciliation, visibility, notifications, configuration.

pub mod config_loader;
pub mod notifier;
pub mod reconciler;
pub mod visibility;

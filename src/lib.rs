//! Tabgroups: organizes browser tabs into container-backed and custom groups
//! and keeps exactly one group's tabs visible at a time.
//!
//! This library crate exposes all modules for use by the binary and integration tests.

pub mod app;
pub mod bridge;
pub mod browser;
pub mod database;
pub mod managers;
pub mod rpc_handler;
pub mod services;
pub mod types;

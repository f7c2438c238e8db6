// Shared type definitions for the tab-group core.
// Each submodule defines types used across the application.

pub mod browser;
pub mod config;
pub mod errors;
pub mod group;
pub mod session;

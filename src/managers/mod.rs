// Tab-group state managers
// Managers own persisted state: group membership and session snapshots.

pub mod group_repository;
pub mod session_manager;

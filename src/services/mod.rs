//! services/mod.rs
//! Módulo que agrupa distintos "servicios" o "capas de negocio" de la app.

pub mod download_service;
pub mod fetch_service;
pub mod filter_service;
pub mod health_service;
pub mod ledger_service;
pub mod notification_service;
pub mod session_service;
pub mod supervisor_service;
pub mod watcher_service;

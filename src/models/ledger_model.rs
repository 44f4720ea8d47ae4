//! models/ledger_model.rs

use serde::Serialize;
use std::path::PathBuf;

/// Fila del ledger de descargas (tabla downloaded_records).
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: String,
    pub tenant: Option<String>,
    pub domain: Option<String>,
    pub caller: String,
    pub duration_seconds: i64,
    pub occurred_at: String,
    pub local_path: String,
    pub file_size_bytes: i64,
    /// Timestamp SQLite "YYYY-MM-DD HH:MM:SS" (UTC)
    pub downloaded_at: Option<String>,
}

/// Estadísticas agregadas del ledger (globales o por tenant).
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerStats {
    pub total_count: i64,
    pub count_last_24h: i64,
    pub total_bytes: i64,
}

impl LedgerStats {
    pub fn total_mb(&self) -> f64 {
        self.total_bytes as f64 / 1024.0 / 1024.0
    }
}

/// Resultado de una descarga exitosa.
#[derive(Debug, Clone)]
pub struct LocalArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
}

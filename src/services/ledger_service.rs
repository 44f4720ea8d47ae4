//! services/ledger_service.rs
//! Ledger durable de descargas: la frontera de idempotencia. Un id
//! presente aquí nunca se vuelve a descargar, ni siquiera tras un
//! restart. La clave es el id estable del proveedor.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};

use crate::errors::WatcherError;
use crate::models::call_record::CallRecord;
use crate::models::ledger_model::{LedgerEntry, LedgerStats};

#[derive(Clone, Debug)]
pub struct LedgerService {
    db_pool: Pool<Sqlite>,
}

impl LedgerService {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        LedgerService { db_pool }
    }

    /// Abre (o crea) la base SQLite. WAL para que escritores de distintos
    /// tenants no se serialicen entre sí.
    pub async fn connect(db_path: &Path) -> Result<Pool<Sqlite>, WatcherError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(pool)
    }

    /// Crea la tabla si no existe y aplica la migración de columnas
    /// opcionales (city_name, domain). Las filas viejas conservan NULL.
    pub async fn init_schema(&self) -> Result<(), WatcherError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS downloaded_records (
                id TEXT PRIMARY KEY,
                call_id TEXT,
                caller TEXT,
                duration_seconds INTEGER,
                date_time TEXT,
                downloaded_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                local_path TEXT,
                file_size INTEGER
            )
            "#,
        )
        .execute(&self.db_pool)
        .await?;

        let rows = sqlx::query("PRAGMA table_info(downloaded_records)")
            .fetch_all(&self.db_pool)
            .await?;
        let columns: Vec<String> = rows.iter().map(|r| r.get::<String, _>("name")).collect();

        if !columns.iter().any(|c| c == "city_name") {
            log::info!("Migración del ledger: agregando columna city_name");
            sqlx::query("ALTER TABLE downloaded_records ADD COLUMN city_name TEXT")
                .execute(&self.db_pool)
                .await?;
        }

        if !columns.iter().any(|c| c == "domain") {
            log::info!("Migración del ledger: agregando columna domain");
            sqlx::query("ALTER TABLE downloaded_records ADD COLUMN domain TEXT")
                .execute(&self.db_pool)
                .await?;
        }

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_city_domain \
             ON downloaded_records(city_name, domain)",
        )
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    /// Lookup O(1) por id estable.
    pub async fn is_downloaded(&self, id: &str) -> Result<bool, WatcherError> {
        let row = sqlx::query("SELECT id FROM downloaded_records WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(row.is_some())
    }

    /// Upsert idempotente: re-confirmar el mismo id sobreescribe los
    /// metadatos sin duplicar filas.
    pub async fn commit(
        &self,
        record: &CallRecord,
        tenant: &str,
        domain: &str,
        local_path: &str,
        file_size: i64,
    ) -> Result<(), WatcherError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO downloaded_records
            (id, call_id, caller, duration_seconds, date_time, local_path, file_size, city_name, domain)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&record.id)
        .bind(record.recording_reference.as_deref())
        .bind(&record.caller_number)
        .bind(record.duration_seconds)
        .bind(&record.occurred_at)
        .bind(local_path)
        .bind(file_size)
        .bind(tenant)
        .bind(domain)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    /// Estadísticas globales o por tenant.
    pub async fn stats(&self, tenant: Option<&str>) -> Result<LedgerStats, WatcherError> {
        let totals = match tenant {
            Some(city) => {
                sqlx::query(
                    "SELECT COUNT(*), COALESCE(SUM(file_size), 0) \
                     FROM downloaded_records WHERE city_name = ?1",
                )
                .bind(city)
                .fetch_one(&self.db_pool)
                .await?
            }
            None => {
                sqlx::query("SELECT COUNT(*), COALESCE(SUM(file_size), 0) FROM downloaded_records")
                    .fetch_one(&self.db_pool)
                    .await?
            }
        };

        let last_24h = match tenant {
            Some(city) => {
                sqlx::query(
                    "SELECT COUNT(*) FROM downloaded_records \
                     WHERE downloaded_at >= datetime('now', '-1 day') AND city_name = ?1",
                )
                .bind(city)
                .fetch_one(&self.db_pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT COUNT(*) FROM downloaded_records \
                     WHERE downloaded_at >= datetime('now', '-1 day')",
                )
                .fetch_one(&self.db_pool)
                .await?
            }
        };

        Ok(LedgerStats {
            total_count: totals.get::<i64, _>(0),
            count_last_24h: last_24h.get::<i64, _>(0),
            total_bytes: totals.get::<i64, _>(1),
        })
    }

    /// Fila completa de un id (para tests y diagnóstico).
    pub async fn entry(&self, id: &str) -> Result<Option<LedgerEntry>, WatcherError> {
        let row = sqlx::query(
            r#"
            SELECT id, call_id, caller, duration_seconds, date_time,
                   downloaded_at, local_path, file_size, city_name, domain
            FROM downloaded_records WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(row.map(|r| LedgerEntry {
            id: r.get("id"),
            tenant: r.get("city_name"),
            domain: r.get("domain"),
            caller: r.get::<Option<String>, _>("caller").unwrap_or_default(),
            duration_seconds: r.get::<Option<i64>, _>("duration_seconds").unwrap_or(0),
            occurred_at: r.get::<Option<String>, _>("date_time").unwrap_or_default(),
            local_path: r.get::<Option<String>, _>("local_path").unwrap_or_default(),
            file_size_bytes: r.get::<Option<i64>, _>("file_size").unwrap_or(0),
            downloaded_at: r.get("downloaded_at"),
        }))
    }

    /// Timestamp de la última descarga registrada (para el health check).
    pub async fn last_download_at(&self) -> Result<Option<String>, WatcherError> {
        let row = sqlx::query(
            "SELECT downloaded_at FROM downloaded_records \
             ORDER BY downloaded_at DESC LIMIT 1",
        )
        .fetch_optional(&self.db_pool)
        .await?;
        Ok(row.and_then(|r| r.get::<Option<String>, _>(0)))
    }
}

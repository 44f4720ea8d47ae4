//! services/watcher_service.rs
//! Ciclo de polling de un tenant: autenticar → consultar → filtrar →
//! descargar → reportar → dormir. Todo error por-ciclo se loguea y cuenta
//! como ciclo vacío; el loop nunca muere por un ciclo fallido. El flag de
//! shutdown se consulta en cada transición y durante el sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use sqlx::{Pool, Sqlite};

use crate::config::app_config::{AppConfig, TenantConfig};
use crate::errors::WatcherError;
use crate::models::call_record::CallRecord;
use crate::services::download_service::DownloadService;
use crate::services::fetch_service::{FetchService, QueryFilters};
use crate::services::filter_service::{self, DirectionFilter, FilterPolicy};
use crate::services::ledger_service::LedgerService;
use crate::services::session_service::SessionService;

/// Pausa corta entre descargas para no castigar al proveedor
const DOWNLOAD_PAUSE: Duration = Duration::from_secs(1);
/// Granularidad con la que el sleep observa el flag de shutdown
const SHUTDOWN_POLL: Duration = Duration::from_millis(500);

/// Estados del ciclo; SHUTTING_DOWN es alcanzable desde cualquiera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Authenticating,
    Fetching,
    Filtering,
    Downloading,
    Reporting,
    Sleeping,
    ShuttingDown,
}

pub struct WatcherService {
    tenant: TenantConfig,
    check_interval: Duration,
    lookback_hours: i64,
    policy: FilterPolicy,
    filters: QueryFilters,
    session: SessionService,
    fetcher: FetchService,
    ledger: LedgerService,
    downloader: DownloadService,
    shutdown: Arc<AtomicBool>,
    state: CycleState,
    // Estado de runtime del pipeline; se pierde en un crash y no importa:
    // la corrección vive en el ledger.
    cycle_count: u64,
    last_cycle_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

impl WatcherService {
    pub fn new(
        tenant: TenantConfig,
        config: &AppConfig,
        db_pool: Pool<Sqlite>,
        shutdown: Arc<AtomicBool>,
        hours_override: Option<i64>,
    ) -> Result<Self, WatcherError> {
        if !tenant.is_valid() {
            return Err(WatcherError::Config(format!(
                "Tenant {} con credenciales incompletas",
                tenant.name
            )));
        }

        // --hours anula la ventana del entorno para toda la vida del
        // watcher, en modo continuo igual que en pasada única
        let lookback_hours = hours_override.unwrap_or(config.lookback_hours);

        let session = SessionService::new(&tenant.login, &tenant.domain, &config.base_url)?;
        let downloader = DownloadService::new(config.provider, &config.download_dir)?;

        let policy = FilterPolicy {
            require_recording: true,
            min_duration_seconds: config.min_duration_seconds,
            direction: DirectionFilter::parse(&config.direction_filter),
        };

        let filters = QueryFilters {
            direction: config.direction_filter.clone(),
            duration_op: (config.min_duration_seconds > 0).then(|| ">=".to_string()),
            duration_hms: (config.min_duration_seconds > 0)
                .then(|| seconds_to_hms(config.min_duration_seconds)),
            records_per_page: config.records_per_page,
            ..QueryFilters::default()
        };

        log::info!(
            "[{}] Watcher inicializado: dominio {}, duración mínima {}s, dirección {:?}",
            tenant.name,
            tenant.domain,
            policy.min_duration_seconds,
            policy.direction
        );

        Ok(WatcherService {
            fetcher: FetchService::new(config.provider),
            ledger: LedgerService::new(db_pool),
            check_interval: Duration::from_secs(config.check_interval_secs),
            lookback_hours,
            tenant,
            policy,
            filters,
            session,
            downloader,
            shutdown,
            state: CycleState::Idle,
            cycle_count: 0,
            last_cycle_at: None,
            consecutive_failures: 0,
        })
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn lookback_hours(&self) -> i64 {
        self.lookback_hours
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Un ciclo completo. Devuelve la cantidad de archivos descargados;
    /// cualquier error recuperable deja el ciclo en cero y el loop sigue.
    pub async fn run_once(&mut self) -> u32 {
        self.cycle_count += 1;
        self.last_cycle_at = Some(Utc::now());
        log::info!(
            "🔍 [{}] Ciclo #{} iniciado",
            self.tenant.name,
            self.cycle_count
        );

        match self.execute_cycle().await {
            Ok(downloaded) => {
                self.consecutive_failures = 0;
                downloaded
            }
            Err(e) => {
                self.consecutive_failures += 1;
                log::error!(
                    "❌ [{}] Error en el ciclo (fallos consecutivos: {}): {}",
                    self.tenant.name,
                    self.consecutive_failures,
                    e
                );
                0
            }
        }
    }

    async fn execute_cycle(&mut self) -> Result<u32, WatcherError> {
        if self.enter(CycleState::Authenticating) {
            return Ok(0);
        }
        // Re-autenticación desde credenciales en cada ciclo; un fallo
        // cuenta como ciclo fallido y pasa directo a dormir.
        self.session.authenticate(&self.tenant.password).await?;

        if self.enter(CycleState::Fetching) {
            return Ok(0);
        }
        let window_end = Local::now().naive_local();
        let window_start = window_end - chrono::Duration::hours(self.lookback_hours);
        let records = self
            .fetcher
            .fetch(&mut self.session, window_start, window_end, &self.filters)
            .await?;

        if records.is_empty() {
            log::info!("[{}] Sin llamadas en la ventana", self.tenant.name);
            return Ok(0);
        }

        if self.enter(CycleState::Filtering) {
            return Ok(0);
        }
        let filtered = filter_service::apply(records, &self.policy);
        if filtered.is_empty() {
            log::info!(
                "[{}] Ninguna llamada cumple los criterios",
                self.tenant.name
            );
            return Ok(0);
        }

        if self.enter(CycleState::Downloading) {
            return Ok(0);
        }
        let downloaded = self.process_new_records(filtered).await?;

        self.enter(CycleState::Reporting);
        self.report(downloaded).await;

        Ok(downloaded)
    }

    /// Descarga secuencial con chequeo de ledger antes y commit inmediato
    /// después de cada registro: un crash pierde a lo sumo el registro en
    /// vuelo, nunca los ya completados.
    async fn process_new_records(&mut self, records: Vec<CallRecord>) -> Result<u32, WatcherError> {
        let mut downloaded = 0u32;

        for record in &records {
            if self.shutdown.load(Ordering::Relaxed) {
                self.state = CycleState::ShuttingDown;
                break;
            }

            if self.ledger.is_downloaded(&record.id).await? {
                log::debug!(
                    "[{}] Registro {} ya descargado, se omite",
                    self.tenant.name,
                    record.id
                );
                continue;
            }

            log::info!(
                "🎵 [{}] Nueva grabación: {} → {}, {}s, {}",
                self.tenant.name,
                record.caller_number,
                record.callee_number,
                record.duration_seconds,
                record.direction_title
            );

            match self.downloader.download(&mut self.session, record).await {
                Ok(Some(artifact)) => {
                    self.ledger
                        .commit(
                            record,
                            &self.tenant.name,
                            &self.tenant.domain,
                            &artifact.path.to_string_lossy(),
                            artifact.size_bytes as i64,
                        )
                        .await?;
                    downloaded += 1;
                    tokio::time::sleep(DOWNLOAD_PAUSE).await;
                }
                Ok(None) => {
                    // status no exitoso, ya logueado; el registro queda
                    // pendiente para el próximo ciclo
                }
                Err(e) => {
                    log::error!(
                        "❌ [{}] Error descargando {}: {}",
                        self.tenant.name,
                        record.id,
                        e
                    );
                }
            }
        }

        Ok(downloaded)
    }

    /// Loguea los totales del ciclo; nunca falla el ciclo.
    async fn report(&mut self, downloaded: u32) {
        match self.ledger.stats(Some(&self.tenant.name)).await {
            Ok(stats) => log::info!(
                "📊 [{}] Ciclo completado: {} descargados. Total en base: {} ({:.2} MB)",
                self.tenant.name,
                downloaded,
                stats.total_count,
                stats.total_mb()
            ),
            Err(e) => log::warn!(
                "[{}] No se pudieron leer estadísticas del ledger: {}",
                self.tenant.name,
                e
            ),
        }
    }

    /// Loop continuo hasta que el flag de shutdown se active.
    pub async fn run_continuous(&mut self) {
        log::info!(
            "🚀 [{}] Modo continuo, intervalo {}s",
            self.tenant.name,
            self.check_interval.as_secs()
        );

        while !self.shutdown.load(Ordering::Relaxed) {
            let downloaded = self.run_once().await;

            if downloaded > 0 {
                if let Ok(stats) = self.ledger.stats(Some(&self.tenant.name)).await {
                    log::info!(
                        "📈 [{}] Descargados en 24h: {}",
                        self.tenant.name,
                        stats.count_last_24h
                    );
                }
            }

            self.sleep_interval().await;
        }

        self.state = CycleState::ShuttingDown;
        self.session.logout();
        log::info!(
            "👋 [{}] Watcher terminado tras {} ciclo(s), último: {:?}",
            self.tenant.name,
            self.cycle_count,
            self.last_cycle_at
        );
    }

    /// Duerme el intervalo en tramos cortos para que el shutdown tenga
    /// latencia acotada, no igual al intervalo completo.
    async fn sleep_interval(&mut self) {
        if self.enter(CycleState::Sleeping) {
            return;
        }
        log::info!(
            "⏰ [{}] Esperando {}s hasta el próximo ciclo...",
            self.tenant.name,
            self.check_interval.as_secs()
        );

        let deadline = tokio::time::Instant::now() + self.check_interval;
        while tokio::time::Instant::now() < deadline {
            if self.shutdown.load(Ordering::Relaxed) {
                self.state = CycleState::ShuttingDown;
                return;
            }
            tokio::time::sleep(SHUTDOWN_POLL).await;
        }
    }

    /// Transición de estado; devuelve true si hay shutdown pendiente.
    fn enter(&mut self, state: CycleState) -> bool {
        if self.shutdown.load(Ordering::Relaxed) {
            self.state = CycleState::ShuttingDown;
            return true;
        }
        self.state = state;
        false
    }
}

fn seconds_to_hms(total: i64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

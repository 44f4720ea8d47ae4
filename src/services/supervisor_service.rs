//! services/supervisor_service.rs
//! Supervisión de los workers por tenant: arranque escalonado, monitoreo
//! periódico, restart de workers caídos con techo por hora y apagado
//! ordenado. Cada worker es una task de tokio con su propio pipeline;
//! comparten el pool de SQLite y el flag de shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sqlx::{Pool, Sqlite};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::app_config::{AppConfig, TenantConfig};
use crate::errors::WatcherError;
use crate::services::notification_service::NotificationService;
use crate::services::watcher_service::WatcherService;

/// Frecuencia del chequeo de workers caídos
const MONITOR_INTERVAL: Duration = Duration::from_secs(30);
/// Espera antes de relanzar un worker caído
const RESTART_DELAY: Duration = Duration::from_secs(10);
/// Tiempo de gracia del apagado antes de abortar tasks
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
/// Ventana del techo de restarts
pub(crate) const RESTART_WINDOW: Duration = Duration::from_secs(3600);

pub(crate) struct WorkerRecord {
    pub(crate) tenant: TenantConfig,
    /// None cuando el worker terminó y su handle ya fue consumido
    pub(crate) handle: Option<JoinHandle<()>>,
    pub(crate) restart_count: u32,
    pub(crate) window_start: Instant,
    /// true si superó el techo de restarts y quedó fuera de servicio
    pub(crate) suppressed: bool,
}

impl WorkerRecord {
    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Decide si un worker caído puede relanzarse. La ventana se resetea
    /// cuando pasó más de una hora desde su inicio; dentro de la ventana
    /// el conteo acumulado no puede superar el techo.
    pub(crate) fn allow_restart(&mut self, max_per_hour: u32) -> bool {
        if self.window_start.elapsed() >= RESTART_WINDOW {
            self.restart_count = 0;
            self.window_start = Instant::now();
        }
        self.restart_count < max_per_hour
    }
}

pub struct SupervisorService {
    config: AppConfig,
    db_pool: Pool<Sqlite>,
    shutdown: Arc<AtomicBool>,
    notifier: NotificationService,
    workers: HashMap<u32, WorkerRecord>,
    once: bool,
    hours_override: Option<i64>,
}

impl SupervisorService {
    pub fn new(
        config: AppConfig,
        db_pool: Pool<Sqlite>,
        shutdown: Arc<AtomicBool>,
        notifier: NotificationService,
    ) -> Self {
        SupervisorService {
            config,
            db_pool,
            shutdown,
            notifier,
            workers: HashMap::new(),
            once: false,
            hours_override: None,
        }
    }

    pub fn active_count(&self) -> usize {
        self.workers.values().filter(|w| w.is_running()).count()
    }

    /// Lanza un worker por tenant con pausa escalonada entre arranques
    /// (los proveedores limitan logins simultáneos). Sin pausa después
    /// del último.
    pub async fn start_all(
        &mut self,
        tenants: Vec<TenantConfig>,
        once: bool,
        hours_override: Option<i64>,
    ) -> Result<(), WatcherError> {
        self.once = once;
        self.hours_override = hours_override;
        let total = tenants.len();

        log::info!(
            "🚀 Arrancando {} worker(s), modo {}",
            total,
            if once { "única pasada" } else { "continuo" }
        );

        for (i, tenant) in tenants.into_iter().enumerate() {
            let city_id = tenant.city_id;
            let handle = self.spawn_worker(tenant.clone())?;
            self.workers.insert(
                city_id,
                WorkerRecord {
                    tenant,
                    handle: Some(handle),
                    restart_count: 0,
                    window_start: Instant::now(),
                    suppressed: false,
                },
            );

            if i + 1 < total {
                tokio::time::sleep(Duration::from_secs(self.config.stagger_delay_secs)).await;
            }
        }

        Ok(())
    }

    fn spawn_worker(&self, tenant: TenantConfig) -> Result<JoinHandle<()>, WatcherError> {
        let mut watcher = WatcherService::new(
            tenant.clone(),
            &self.config,
            self.db_pool.clone(),
            Arc::clone(&self.shutdown),
            self.hours_override,
        )?;

        let once = self.once;
        let name = tenant.name.clone();

        Ok(tokio::spawn(async move {
            if once {
                let downloaded = watcher.run_once().await;
                log::info!("[{}] Pasada única terminada: {} descargados", name, downloaded);
            } else {
                watcher.run_continuous().await;
            }
        }))
    }

    /// Loop de monitoreo: cada 30s revisa los workers terminados. En modo
    /// continuo un worker solo termina por shutdown, así que cualquier otro
    /// final cuenta como caída y se relanza bajo el techo por hora.
    pub async fn monitor(&mut self) {
        loop {
            tokio::time::sleep(MONITOR_INTERVAL).await;
            if self.shutdown.load(Ordering::Relaxed) {
                return;
            }
            self.check_workers().await;
        }
    }

    pub(crate) async fn check_workers(&mut self) {
        let finished: Vec<u32> = self
            .workers
            .iter()
            .filter(|(_, w)| !w.suppressed && w.handle.is_some() && !w.is_running())
            .map(|(id, _)| *id)
            .collect();

        for city_id in finished {
            let record = match self.workers.get_mut(&city_id) {
                Some(r) => r,
                None => continue,
            };

            let handle = match record.handle.take() {
                Some(h) => h,
                None => continue,
            };

            let crashed = match handle.await {
                Ok(()) => !self.once && !self.shutdown.load(Ordering::Relaxed),
                Err(e) => {
                    log::error!("💥 [{}] Worker terminó con panic: {}", record.tenant.name, e);
                    true
                }
            };

            if !crashed {
                // salida limpia en modo once: queda detenido
                continue;
            }

            if !record.allow_restart(self.config.max_restarts_per_hour) {
                log::error!(
                    "🚫 [{}] Techo de {} restarts/hora alcanzado, worker fuera de servicio",
                    record.tenant.name,
                    self.config.max_restarts_per_hour
                );
                record.suppressed = true;
                let name = record.tenant.name.clone();
                let detail = format!(
                    "techo de {} restarts/hora alcanzado",
                    self.config.max_restarts_per_hour
                );
                self.notifier.alert("worker_suppressed", &name, &detail).await;
                continue;
            }

            let tenant = record.tenant.clone();
            let attempt = record.restart_count + 1;
            log::warn!(
                "🔄 [{}] Relanzando worker en {}s (restart {} de {})",
                tenant.name,
                RESTART_DELAY.as_secs(),
                attempt,
                self.config.max_restarts_per_hour
            );
            self.notifier
                .alert("worker_crashed", &tenant.name, "worker caído, se relanza")
                .await;

            tokio::time::sleep(RESTART_DELAY).await;

            match self.spawn_worker(tenant) {
                Ok(handle) => {
                    if let Some(record) = self.workers.get_mut(&city_id) {
                        record.handle = Some(handle);
                        record.restart_count = attempt;
                    }
                }
                Err(e) => {
                    if let Some(record) = self.workers.get_mut(&city_id) {
                        if e.is_fatal() {
                            log::error!(
                                "❌ [{}] Configuración inválida, no se reintenta: {}",
                                record.tenant.name,
                                e
                            );
                        } else {
                            log::error!(
                                "❌ [{}] No se pudo relanzar el worker: {}",
                                record.tenant.name,
                                e
                            );
                        }
                        record.suppressed = true;
                    }
                }
            }
        }
    }

    /// Apagado ordenado: activa el flag, espera el tiempo de gracia y
    /// aborta lo que quede. Llamarlo de nuevo es un no-op.
    pub async fn stop_all(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        log::info!("🛑 Deteniendo todos los workers...");
        self.shutdown.store(true, Ordering::Relaxed);

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while Instant::now() < deadline {
            if self.workers.values().all(|w| !w.is_running()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        for (_, record) in self.workers.drain() {
            if let Some(handle) = record.handle {
                if !handle.is_finished() {
                    log::warn!(
                        "[{}] Worker no respondió al shutdown, abortando task",
                        record.tenant.name
                    );
                    handle.abort();
                }
                // un JoinError por abort o panic aquí ya no es accionable
                let _ = handle.await;
            }
        }

        log::info!("✅ Todos los workers detenidos");
    }

    /// Inserta un worker ya lanzado, con el contador de restarts elegido.
    #[cfg(test)]
    pub(crate) fn insert_worker(
        &mut self,
        tenant: TenantConfig,
        handle: JoinHandle<()>,
        restart_count: u32,
    ) {
        self.workers.insert(
            tenant.city_id,
            WorkerRecord {
                tenant,
                handle: Some(handle),
                restart_count,
                window_start: Instant::now(),
                suppressed: false,
            },
        );
    }

    #[cfg(test)]
    pub(crate) fn worker(&self, city_id: u32) -> Option<&WorkerRecord> {
        self.workers.get(&city_id)
    }

    /// Espera a que todos los workers terminen por sí mismos (modo once).
    pub async fn wait_all(&mut self) {
        for (_, record) in self.workers.drain() {
            if let Some(handle) = record.handle {
                if let Err(e) = handle.await {
                    log::error!("💥 [{}] Worker terminó con panic: {}", record.tenant.name, e);
                }
            }
        }
    }
}

//! tests/supervisor_tests.rs
//! Pruebas de la supervisión: detección de panics, techo de restarts
//! por hora y reset de la ventana.

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    use tempfile::TempDir;
    use tokio::time::Instant;

    use crate::config::app_config::{AppConfig, TenantConfig};
    use crate::models::call_record::ProviderKind;
    use crate::services::ledger_service::LedgerService;
    use crate::services::notification_service::NotificationService;
    use crate::services::supervisor_service::{
        SupervisorService, WorkerRecord, RESTART_WINDOW,
    };

    fn test_config(dir: &TempDir) -> AppConfig {
        AppConfig {
            provider: ProviderKind::CloudPbx,
            // puerto 9 (discard): los relanzamientos no deben depender de la red
            base_url: "http://127.0.0.1:9".to_string(),
            download_dir: dir.path().join("downloads"),
            database_path: dir.path().join("test.db"),
            check_interval_secs: 300,
            lookback_hours: 24,
            min_duration_seconds: 180,
            direction_filter: "any".to_string(),
            records_per_page: 100,
            stagger_delay_secs: 0,
            max_restarts_per_hour: 10,
        }
    }

    fn test_tenant() -> TenantConfig {
        TenantConfig {
            city_id: 1,
            name: "Пермь".to_string(),
            login: "perm_user".to_string(),
            password: "secreto".to_string(),
            domain: "perm.ru".to_string(),
        }
    }

    async fn make_supervisor(dir: &TempDir) -> SupervisorService {
        let config = test_config(dir);
        let pool = LedgerService::connect(&config.database_path).await.unwrap();
        SupervisorService::new(
            config,
            pool,
            Arc::new(AtomicBool::new(false)),
            NotificationService::from_env(),
        )
    }

    #[tokio::test]
    async fn panico_con_el_techo_alcanzado_suprime_al_worker() {
        let dir = TempDir::new().unwrap();
        let mut supervisor = make_supervisor(&dir).await;

        let handle = tokio::spawn(async { panic!("caída simulada") });
        // el contador arranca en el techo: un panic más no puede relanzar
        supervisor.insert_worker(test_tenant(), handle, 10);
        tokio::time::sleep(Duration::from_millis(100)).await;

        supervisor.check_workers().await;

        let record = supervisor.worker(1).unwrap();
        assert!(record.suppressed);
        assert!(record.handle.is_none());
        assert_eq!(supervisor.active_count(), 0);
    }

    #[tokio::test]
    async fn panico_bajo_el_techo_se_relanza() {
        let dir = TempDir::new().unwrap();
        // el pool hace I/O real: conectar con el reloj corriendo y pausar después
        let mut supervisor = make_supervisor(&dir).await;
        tokio::time::pause();

        let handle = tokio::spawn(async { panic!("caída simulada") });
        supervisor.insert_worker(test_tenant(), handle, 0);
        tokio::time::sleep(Duration::from_millis(100)).await;

        // la espera previa al relanzamiento corre en tiempo virtual
        supervisor.check_workers().await;

        let record = supervisor.worker(1).unwrap();
        assert!(!record.suppressed);
        assert_eq!(record.restart_count, 1);
        assert!(record.handle.is_some());

        supervisor.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn la_ventana_de_restarts_se_resetea_despues_de_una_hora() {
        let mut record = WorkerRecord {
            tenant: test_tenant(),
            handle: None,
            restart_count: 10,
            window_start: Instant::now(),
            suppressed: false,
        };

        assert!(!record.allow_restart(10));

        tokio::time::advance(RESTART_WINDOW).await;
        assert!(record.allow_restart(10));
        assert_eq!(record.restart_count, 0);
    }
}

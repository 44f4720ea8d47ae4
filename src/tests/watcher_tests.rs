//! tests/watcher_tests.rs
//! Pruebas del ciclo de polling: respuesta al flag de shutdown, ventana
//! de búsqueda, conteo de fallos y el ciclo completo contra un servidor
//! simulado.

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use httpmock::prelude::*;
    use tempfile::TempDir;

    use crate::config::app_config::{AppConfig, TenantConfig};
    use crate::models::call_record::ProviderKind;
    use crate::services::ledger_service::LedgerService;
    use crate::services::watcher_service::{CycleState, WatcherService};

    fn test_config(dir: &TempDir, base_url: &str) -> AppConfig {
        AppConfig {
            provider: ProviderKind::CloudPbx,
            base_url: base_url.to_string(),
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

    async fn make_watcher(
        config: &AppConfig,
        shutdown: Arc<AtomicBool>,
        hours: Option<i64>,
    ) -> (WatcherService, LedgerService) {
        let pool = LedgerService::connect(&config.database_path).await.unwrap();
        let ledger = LedgerService::new(pool.clone());
        ledger.init_schema().await.unwrap();
        let watcher =
            WatcherService::new(test_tenant(), config, pool, shutdown, hours).unwrap();
        (watcher, ledger)
    }

    #[tokio::test]
    async fn shutdown_previo_corta_el_ciclo_antes_de_autenticar() {
        let dir = TempDir::new().unwrap();
        // puerto 9 (discard): el ciclo no debe llegar a la red
        let config = test_config(&dir, "http://127.0.0.1:9");
        let shutdown = Arc::new(AtomicBool::new(true));
        let (mut watcher, _) = make_watcher(&config, shutdown, None).await;

        let downloaded = watcher.run_once().await;
        assert_eq!(downloaded, 0);
        assert_eq!(watcher.state(), CycleState::ShuttingDown);
        // un ciclo cortado por shutdown no cuenta como fallo
        assert_eq!(watcher.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn run_continuous_termina_con_el_flag_activo() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, "http://127.0.0.1:9");
        let shutdown = Arc::new(AtomicBool::new(false));
        let (mut watcher, _) = make_watcher(&config, Arc::clone(&shutdown), None).await;

        shutdown.store(true, Ordering::Relaxed);
        // con el flag activo el loop no arranca ningún ciclo
        watcher.run_continuous().await;
        assert_eq!(watcher.state(), CycleState::ShuttingDown);
    }

    #[tokio::test]
    async fn el_ciclo_crea_el_directorio_de_descargas() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, "http://127.0.0.1:9");
        let shutdown = Arc::new(AtomicBool::new(true));
        let _ = make_watcher(&config, shutdown, None).await;

        assert!(PathBuf::from(dir.path().join("downloads")).is_dir());
    }

    #[tokio::test]
    async fn hours_anula_la_ventana_en_cualquier_modo() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, "http://127.0.0.1:9");

        // la anulación vive en el watcher, no en un parámetro por ciclo:
        // run_once y run_continuous usan la misma ventana
        let (watcher, _) =
            make_watcher(&config, Arc::new(AtomicBool::new(true)), Some(2)).await;
        assert_eq!(watcher.lookback_hours(), 2);

        let (watcher, _) =
            make_watcher(&config, Arc::new(AtomicBool::new(true)), None).await;
        assert_eq!(watcher.lookback_hours(), 24);
    }

    #[tokio::test]
    async fn fallo_de_autenticacion_cuenta_como_ciclo_fallido() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, "http://127.0.0.1:9");
        let shutdown = Arc::new(AtomicBool::new(false));
        let (mut watcher, _) = make_watcher(&config, shutdown, None).await;

        assert_eq!(watcher.run_once().await, 0);
        assert_eq!(watcher.consecutive_failures(), 1);

        assert_eq!(watcher.run_once().await, 0);
        assert_eq!(watcher.consecutive_failures(), 2);
    }

    #[tokio::test]
    async fn ciclo_completo_descarga_y_el_segundo_no_repite() {
        let server = MockServer::start_async().await;

        server
            .mock_async(|when, then| {
                when.method(POST).path("/auth");
                then.status(200).json_body(serde_json::json!({
                    "token": "tok",
                    "refresh_token": "r1"
                }));
            })
            .await;

        let history_mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/domain/call_history");
                then.status(200).json_body(serde_json::json!({
                    "data": [{
                        "id": "call-1",
                        "dateTime": "2025-01-15 14:30:45+05:00",
                        "direction": { "image": "group", "title": "Входящий" },
                        "abonentA": { "peerInfo": { "caller": "", "callerNumber": "+79991234567" } },
                        "abonentB": { "peerInfo": { "caller": "", "callerNumber": "100" } },
                        "record": { "callId": "rec-1", "duration": 245 }
                    }]
                }));
            })
            .await;

        let download_mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/domain/call_history/rec-1/record");
                then.status(200).body("ID3audio");
            })
            .await;

        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, &server.base_url());
        let shutdown = Arc::new(AtomicBool::new(false));
        let (mut watcher, ledger) = make_watcher(&config, shutdown, None).await;

        // primer ciclo: autentica, consulta, filtra, descarga y confirma
        assert_eq!(watcher.run_once().await, 1);
        assert_eq!(watcher.consecutive_failures(), 0);

        let expected = dir
            .path()
            .join("downloads")
            .join("2025-01-15_14-30-45_79991234567_245sec.mp3");
        assert_eq!(std::fs::read(&expected).unwrap(), b"ID3audio");
        assert!(ledger.is_downloaded("call-1").await.unwrap());

        // segundo ciclo: el mismo registro ya está en el ledger, cero
        // descargas y cero requests al endpoint de audio
        assert_eq!(watcher.run_once().await, 0);
        assert_eq!(history_mock.hits_async().await, 2);
        assert_eq!(download_mock.hits_async().await, 1);

        let stats = ledger.stats(Some("Пермь")).await.unwrap();
        assert_eq!(stats.total_count, 1);
        assert_eq!(stats.total_bytes, 8);
    }
}

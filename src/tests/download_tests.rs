//! tests/download_tests.rs
//! Pruebas del nombre de archivo determinista y su fallback.

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use tempfile::TempDir;

    use crate::errors::WatcherError;
    use crate::models::call_record::{CallDirection, CallRecord, ProviderKind};
    use crate::services::download_service::{generate_filename, DownloadService};
    use crate::services::session_service::SessionService;

    fn make_record(occurred_at: &str, caller: &str, duration: i64) -> CallRecord {
        CallRecord {
            id: "rec-42".to_string(),
            occurred_at: occurred_at.to_string(),
            duration_seconds: duration,
            direction: CallDirection::Incoming,
            direction_title: "Входящий".to_string(),
            has_recording: true,
            recording_reference: Some("rec-42".to_string()),
            caller_number: caller.to_string(),
            callee_number: "100".to_string(),
            stranzit_file: None,
        }
    }

    #[test]
    fn nombre_legible_con_fecha_caller_y_duracion() {
        let record = make_record("2025-01-15 14:30:45", "+79991234567", 201);
        assert_eq!(
            generate_filename(&record),
            "2025-01-15_14-30-45_79991234567_201sec.mp3"
        );
    }

    #[test]
    fn descarta_offset_de_zona_horaria() {
        let record = make_record("2025-01-15 14:30:45+05:00", "+79991234567", 201);
        assert_eq!(
            generate_filename(&record),
            "2025-01-15_14-30-45_79991234567_201sec.mp3"
        );
    }

    #[test]
    fn caller_sin_mas_ni_espacios_y_truncado_a_15() {
        let record = make_record("2025-01-15 14:30:45", "+7 999 123 45 67 891 234", 60);
        let name = generate_filename(&record);
        // el caller limpio es "79991234567891234", truncado a 15
        assert_eq!(name, "2025-01-15_14-30-45_799912345678912_60sec.mp3");
    }

    #[test]
    fn fecha_ilegible_cae_al_fallback() {
        let record = make_record("/Date(corrupto)/", "+79991234567", 201);
        assert_eq!(generate_filename(&record), "call_rec-42.mp3");
    }

    #[test]
    fn fecha_vacia_cae_al_fallback() {
        let record = make_record("", "+79991234567", 201);
        assert_eq!(generate_filename(&record), "call_rec-42.mp3");
    }

    #[tokio::test]
    async fn fallo_de_escritura_es_error_de_descarga() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/auth");
                then.status(200)
                    .json_body(serde_json::json!({ "token": "tok" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/domain/call_history/rec-42/record");
                then.status(200).body("ID3audio");
            })
            .await;

        let dir = TempDir::new().unwrap();
        let downloads = dir.path().join("downloads");
        let service = DownloadService::new(ProviderKind::CloudPbx, &downloads).unwrap();

        // un directorio ocupa el nombre de destino: la escritura no puede abrir
        let record = make_record("2025-01-15 14:30:45", "+79991234567", 201);
        std::fs::create_dir_all(downloads.join(generate_filename(&record))).unwrap();

        let mut session =
            SessionService::new("usuario", "dominio.ru", &server.base_url()).unwrap();
        session.authenticate("secreto").await.unwrap();

        let err = service.download(&mut session, &record).await.unwrap_err();
        assert!(matches!(err, WatcherError::Download(_)));
    }
}

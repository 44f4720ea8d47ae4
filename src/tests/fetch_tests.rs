//! tests/fetch_tests.rs
//! Pruebas de decodificación de los dos formatos de proveedor.

#[cfg(test)]
mod tests {
    use crate::errors::WatcherError;
    use crate::models::call_record::CallDirection;
    use crate::services::fetch_service::{
        decode_cloudpbx_payload, decode_stranzit_html, resolve_direction,
        resolve_duration_operator,
    };

    const CLOUDPBX_BODY: &str = r#"{
        "data": [
            {
                "id": 101,
                "dateTime": "2025-01-15 14:30:45+05:00",
                "direction": { "image": "group", "title": "Входящий" },
                "abonentA": { "peerInfo": { "caller": "Cliente", "callerNumber": "+79991234567" } },
                "abonentB": { "peerInfo": { "caller": "Operador", "callerNumber": "100" } },
                "record": { "callId": "rec-101", "duration": 245 },
                "extLineNumber": "8800100200"
            },
            {
                "id": "102",
                "dateTime": "2025-01-15 15:00:00+05:00",
                "direction": { "image": "out", "title": "Исходящий" },
                "abonentA": { "peerInfo": { "caller": "", "callerNumber": "101" } },
                "abonentB": { "peerInfo": { "caller": "", "callerNumber": "+79990001122" } },
                "record": null,
                "extLineNumber": ""
            }
        ]
    }"#;

    #[test]
    fn cloudpbx_normaliza_ids_numericos_y_string() {
        let records = decode_cloudpbx_payload(CLOUDPBX_BODY).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.id, "101");
        assert_eq!(first.direction, CallDirection::Incoming);
        assert!(first.has_recording);
        assert_eq!(first.recording_reference.as_deref(), Some("rec-101"));
        assert_eq!(first.duration_seconds, 245);
        assert_eq!(first.caller_number, "+79991234567");
        assert_eq!(first.callee_number, "100");

        let second = &records[1];
        assert_eq!(second.id, "102");
        assert_eq!(second.direction, CallDirection::Outgoing);
        assert!(!second.has_recording);
        assert_eq!(second.recording_reference, None);
        assert_eq!(second.duration_seconds, 0);
    }

    #[test]
    fn cloudpbx_json_invalido_es_error_de_decode() {
        let result = decode_cloudpbx_payload("<html>mantenimiento</html>");
        assert!(matches!(result, Err(WatcherError::Decode(_))));
    }

    #[test]
    fn stranzit_extrae_el_json_del_input_y_desescapa() {
        let html = concat!(
            "<html><body><form>",
            r#"<input type="hidden" name="callRecords" value="[{&quot;Id&quot;:555,"#,
            r#"&quot;StartTime&quot;:&quot;/Date(1758446374000)/&quot;,"#,
            r#"&quot;CallDirection&quot;:&quot;Входящий&quot;,"#,
            r#"&quot;FileName&quot;:&quot;rec555.mp3&quot;,"#,
            r#"&quot;FullFileName&quot;:&quot;/records/rec555.mp3&quot;,"#,
            r#"&quot;CallParties&quot;:&quot;+79991234567, 100&quot;,"#,
            r#"&quot;Duration&quot;:{&quot;TotalSeconds&quot;:245.7},"#,
            r#"&quot;RecordCount&quot;:1,"#,
            r#"&quot;ServerIpAddress&quot;:&quot;10.0.0.1&quot;,"#,
            r#"&quot;RootFolder&quot;:&quot;records&quot;,"#,
            r#"&quot;ServiceName&quot;:&quot;pbx&quot;}]" />"#,
            "</form></body></html>",
        );

        let records = decode_stranzit_html(html).unwrap();
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.id, "555");
        assert_eq!(record.direction, CallDirection::Incoming);
        assert!(record.has_recording);
        assert_eq!(record.duration_seconds, 245);
        assert_eq!(record.caller_number, "+79991234567");

        let file = record.stranzit_file.as_ref().unwrap();
        assert_eq!(file.file_name, "rec555.mp3");
        assert_eq!(file.server_ip, "10.0.0.1");
        assert_eq!(file.record_count, 1);
    }

    #[test]
    fn stranzit_acepta_atributos_en_otro_orden() {
        let html = r#"<input value="[]" name="callRecords" type="hidden" />"#;
        let records = decode_stranzit_html(html).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn stranzit_sin_input_es_error_de_decode() {
        let result = decode_stranzit_html("<html><body>sin resultados</body></html>");
        assert!(matches!(result, Err(WatcherError::Decode(_))));
    }

    #[test]
    fn codigos_de_direccion_del_api() {
        assert_eq!(resolve_direction("any"), "0");
        assert_eq!(resolve_direction(""), "0");
        assert_eq!(resolve_direction("incoming"), "1");
        assert_eq!(resolve_direction("Входящий"), "1");
        assert_eq!(resolve_direction("out"), "2");
        assert_eq!(resolve_direction("raro"), "0");
    }

    #[test]
    fn codigos_de_operador_de_duracion() {
        assert_eq!(resolve_duration_operator(">="), "1");
        assert_eq!(resolve_duration_operator("lte"), "2");
        assert_eq!(resolve_duration_operator("=="), "3");
        assert_eq!(resolve_duration_operator(""), "0");
        assert_eq!(resolve_duration_operator("raro"), "0");
    }
}

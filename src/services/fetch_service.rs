//! services/fetch_service.rs
//! Consulta "llamadas en ventana" contra el proveedor autenticado.
//! CloudPBX responde JSON tipado; Stranzit devuelve HTML con el JSON
//! embebido en un input del form. Ambos normalizan a CallRecord y un
//! fallo de decodificación produce un ciclo vacío, nunca un abort.

use std::time::Duration;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::errors::WatcherError;
use crate::models::call_record::{
    CallRecord, CloudPbxHistoryResponse, ProviderKind, StranzitCall,
};
use crate::services::session_service::SessionService;

/// Timeout de las consultas de historial
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Parámetros de consulta que decide el caller (no política del fetcher).
#[derive(Debug, Clone)]
pub struct QueryFilters {
    pub phone: Option<String>,
    /// Texto crudo: any/incoming/outgoing (o sinónimos)
    pub direction: String,
    pub duration_op: Option<String>,
    /// Duración en HH:MM:SS para el predicado del proveedor
    pub duration_hms: Option<String>,
    pub records_per_page: u32,
    pub page: u32,
}

impl Default for QueryFilters {
    fn default() -> Self {
        QueryFilters {
            phone: None,
            direction: "any".to_string(),
            duration_op: None,
            duration_hms: None,
            records_per_page: 100,
            page: 1,
        }
    }
}

pub struct FetchService {
    provider: ProviderKind,
}

impl FetchService {
    pub fn new(provider: ProviderKind) -> Self {
        FetchService { provider }
    }

    /// Trae y normaliza las llamadas de la ventana. Errores de red o de
    /// payload se loguean y devuelven lista vacía para este ciclo.
    pub async fn fetch(
        &self,
        session: &mut SessionService,
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
        filters: &QueryFilters,
    ) -> Result<Vec<CallRecord>, WatcherError> {
        match self.provider {
            ProviderKind::CloudPbx => {
                self.fetch_cloudpbx(session, window_start, window_end, filters)
                    .await
            }
            ProviderKind::Stranzit => {
                self.fetch_stranzit(session, window_start, window_end, filters)
                    .await
            }
        }
    }

    async fn fetch_cloudpbx(
        &self,
        session: &mut SessionService,
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
        filters: &QueryFilters,
    ) -> Result<Vec<CallRecord>, WatcherError> {
        let query = vec![
            (
                "dateStart".to_string(),
                window_start.format("%Y-%m-%d %H:%M:%S").to_string(),
            ),
            (
                "dateEnd".to_string(),
                window_end.format("%Y-%m-%d %H:%M:%S").to_string(),
            ),
            ("offset".to_string(), "0".to_string()),
            ("count".to_string(), filters.records_per_page.to_string()),
        ];

        log::info!(
            "Consulta de historial: {} - {}",
            window_start.format("%Y-%m-%d %H:%M:%S"),
            window_end.format("%Y-%m-%d %H:%M:%S")
        );

        let response = session
            .authorized_get("/domain/call_history", &query, QUERY_TIMEOUT)
            .await?;

        if !response.status().is_success() {
            log::error!(
                "Error obteniendo historial: HTTP {}",
                response.status().as_u16()
            );
            return Ok(Vec::new());
        }

        let body = response.text().await?;
        match decode_cloudpbx_payload(&body) {
            Ok(records) => {
                log::info!("Recibidas {} llamadas", records.len());
                Ok(records)
            }
            Err(e) => {
                log::error!("Payload de CloudPBX ilegible: {}", e);
                Ok(Vec::new())
            }
        }
    }

    async fn fetch_stranzit(
        &self,
        session: &mut SessionService,
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
        filters: &QueryFilters,
    ) -> Result<Vec<CallRecord>, WatcherError> {
        let mut form = vec![
            (
                "StartDateTimeStr".to_string(),
                window_start.format("%d.%m.%Y %H:%M").to_string(),
            ),
            (
                "EndDateTimeStr".to_string(),
                window_end.format("%d.%m.%Y %H:%M").to_string(),
            ),
            (
                "PhoneNumberPart".to_string(),
                filters.phone.clone().unwrap_or_default(),
            ),
            (
                "CallDirection".to_string(),
                resolve_direction(&filters.direction).to_string(),
            ),
            ("RecordsPerPage".to_string(), filters.records_per_page.to_string()),
            ("PageNumber".to_string(), filters.page.to_string()),
            ("ShortCodesJson".to_string(), "{}".to_string()),
        ];

        // El predicado de duración solo viaja si el operador es válido
        let duration_code = filters
            .duration_op
            .as_deref()
            .map(resolve_duration_operator)
            .unwrap_or("0");
        if duration_code != "0" {
            form.push(("CallDurationExpression".to_string(), duration_code.to_string()));
            form.push((
                "CallDuration".to_string(),
                filters
                    .duration_hms
                    .clone()
                    .unwrap_or_else(|| "00:00:00".to_string()),
            ));
        } else {
            form.push(("CallDurationExpression".to_string(), "0".to_string()));
            form.push(("CallDuration".to_string(), "00:00:00".to_string()));
        }

        log::info!(
            "Consulta de historial: {} - {}, dirección {}",
            window_start.format("%d.%m.%Y %H:%M"),
            window_end.format("%d.%m.%Y %H:%M"),
            resolve_direction(&filters.direction)
        );

        let response = session
            .authorized_post_form("/CallRecords/IndexGet", &form, QUERY_TIMEOUT)
            .await?;

        if !response.status().is_success() {
            log::error!(
                "Error obteniendo historial: HTTP {}",
                response.status().as_u16()
            );
            return Ok(Vec::new());
        }

        let html = response.text().await?;
        match decode_stranzit_html(&html) {
            Ok(records) => {
                log::info!("Encontradas {} llamadas", records.len());
                Ok(records)
            }
            Err(e) => {
                log::error!("Payload de Stranzit ilegible: {}", e);
                Ok(Vec::new())
            }
        }
    }
}

/// Decodifica la respuesta JSON de CloudPBX ({"data": [...]}) y normaliza.
pub fn decode_cloudpbx_payload(body: &str) -> Result<Vec<CallRecord>, WatcherError> {
    let parsed: CloudPbxHistoryResponse = serde_json::from_str(body)
        .map_err(|e| WatcherError::Decode(format!("JSON inválido: {}", e)))?;
    Ok(parsed
        .data
        .into_iter()
        .map(CallRecord::from_cloudpbx)
        .collect())
}

/// Extrae el JSON del input `callRecords` dentro del HTML de Stranzit
/// y normaliza. El value viene con entidades HTML escapadas.
pub fn decode_stranzit_html(html: &str) -> Result<Vec<CallRecord>, WatcherError> {
    let patterns = [
        r#"<input[^>]*name="callRecords"[^>]*value="([^"]*)""#,
        r#"<input[^>]*value="([^"]*)"[^>]*name="callRecords""#,
    ];

    let mut raw_value = None;
    for pattern in patterns {
        let re = Regex::new(pattern).expect("regex estática inválida");
        if let Some(captures) = re.captures(html) {
            raw_value = Some(captures[1].to_string());
            break;
        }
    }

    let raw_value = raw_value.ok_or_else(|| {
        WatcherError::Decode("No se encontró el input callRecords en el HTML".to_string())
    })?;

    let json = unescape_html_entities(&raw_value);
    let calls: Vec<StranzitCall> = serde_json::from_str(&json)
        .map_err(|e| WatcherError::Decode(format!("JSON de callRecords inválido: {}", e)))?;

    Ok(calls.into_iter().map(CallRecord::from_stranzit).collect())
}

/// Mapea sinónimos de dirección al código del API (0=any, 1=in, 2=out).
pub fn resolve_direction(value: &str) -> &'static str {
    match value.trim().to_lowercase().as_str() {
        "any" | "all" | "любой" | "0" | "" => "0",
        "incoming" | "in" | "входящий" | "1" => "1",
        "outgoing" | "out" | "исходящий" | "2" => "2",
        other => {
            log::warn!("Dirección desconocida '{}', se usa 'any'", other);
            "0"
        }
    }
}

/// Mapea el operador de duración al código del API
/// (0=sin filtro, 1=">=", 2="<=", 3="==").
pub fn resolve_duration_operator(value: &str) -> &'static str {
    match value.trim().to_lowercase().as_str() {
        ">=" | "gte" | "⩾" | "1" => "1",
        "<=" | "lte" | "⩽" | "2" => "2",
        "==" | "=" | "eq" | "3" => "3",
        "0" | "" => "0",
        other => {
            log::warn!("Operador de duración desconocido '{}', filtro apagado", other);
            "0"
        }
    }
}

fn unescape_html_entities(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

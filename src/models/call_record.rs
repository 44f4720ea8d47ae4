//! models/call_record.rs
//! Registro normalizado de llamada y payloads crudos de cada proveedor.
//! Los dos proveedores entregan formas distintas (JSON camelCase vs JSON
//! PascalCase embebido en HTML); ambos normalizan al mismo CallRecord.

use chrono::{Local, TimeZone};
use serde::Deserialize;
use serde_json::Value;

/// Variante de proveedor, resuelta por configuración (no por inspección
/// del payload en runtime).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    CloudPbx,
    Stranzit,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::CloudPbx => "cloudpbx",
            ProviderKind::Stranzit => "stranzit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDirection {
    Incoming,
    Outgoing,
    Unknown,
}

/// Registro de llamada normalizado. Valor inmutable, producido una vez
/// por fetch a partir de un item crudo del proveedor.
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// Id estable asignado por el servidor (clave del ledger)
    pub id: String,
    /// Fecha/hora como texto "YYYY-MM-DD HH:MM:SS(+TZ)"
    pub occurred_at: String,
    pub duration_seconds: i64,
    pub direction: CallDirection,
    /// Título legible del proveedor ("Входящий", "group", ...)
    pub direction_title: String,
    pub has_recording: bool,
    /// Referencia para descargar el audio (callId o id según proveedor)
    pub recording_reference: Option<String>,
    pub caller_number: String,
    pub callee_number: String,
    /// Metadatos extra que Stranzit exige repetir al descargar
    pub stranzit_file: Option<StranzitFileInfo>,
}

/// Stranzit necesita estos campos como query params del download.
#[derive(Debug, Clone, Default)]
pub struct StranzitFileInfo {
    pub file_name: String,
    pub full_file_name: String,
    pub call_parties: String,
    pub service_name: String,
    pub server_ip: String,
    pub root_folder: String,
    pub record_count: i64,
}

// --------------------------------------------------------------------------------
// Payload crudo CloudPBX (JSON directo, camelCase)
// --------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CloudPbxHistoryResponse {
    #[serde(default)]
    pub data: Vec<CloudPbxCall>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudPbxCall {
    /// El id llega a veces como número y a veces como string
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub date_time: String,
    #[serde(default)]
    pub direction: CloudPbxDirection,
    #[serde(default)]
    pub abonent_a: CloudPbxAbonent,
    #[serde(default)]
    pub abonent_b: CloudPbxAbonent,
    pub record: Option<CloudPbxRecordInfo>,
    #[serde(default)]
    pub ext_line_number: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloudPbxDirection {
    /// 'group' / 'group_skip' = entrante, 'out' = saliente
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudPbxAbonent {
    #[serde(default)]
    pub peer_info: CloudPbxPeerInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudPbxPeerInfo {
    #[serde(default)]
    pub caller: String,
    #[serde(default)]
    pub caller_number: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudPbxRecordInfo {
    #[serde(default)]
    pub call_id: Value,
    #[serde(default)]
    pub duration: i64,
}

// --------------------------------------------------------------------------------
// Payload crudo Stranzit (JSON PascalCase dentro del HTML)
// --------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StranzitCall {
    #[serde(default)]
    pub id: Value,
    /// Formato .NET "/Date(1758446374000)/"
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub call_direction: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub full_file_name: String,
    #[serde(default)]
    pub call_parties: String,
    pub duration: Option<StranzitDuration>,
    #[serde(default)]
    pub record_count: i64,
    #[serde(default)]
    pub server_ip_address: String,
    #[serde(default)]
    pub root_folder: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StranzitDuration {
    #[serde(default)]
    pub total_seconds: f64,
}

// --------------------------------------------------------------------------------
// Normalización
// --------------------------------------------------------------------------------

impl CallRecord {
    pub fn from_cloudpbx(raw: CloudPbxCall) -> CallRecord {
        let id = value_to_string(&raw.id);

        let direction = match raw.direction.image.as_str() {
            "group" | "group_skip" => CallDirection::Incoming,
            "out" => CallDirection::Outgoing,
            _ => CallDirection::Unknown,
        };

        let (has_recording, recording_reference, duration_seconds) = match &raw.record {
            Some(rec) => {
                let call_id = value_to_string(&rec.call_id);
                let reference = if call_id.is_empty() { id.clone() } else { call_id };
                (true, Some(reference), rec.duration)
            }
            None => (false, None, 0),
        };

        CallRecord {
            id,
            occurred_at: raw.date_time,
            duration_seconds,
            direction,
            direction_title: raw.direction.title,
            has_recording,
            recording_reference,
            caller_number: non_empty_or(raw.abonent_a.peer_info.caller_number, "unknown"),
            callee_number: non_empty_or(raw.abonent_b.peer_info.caller_number, "unknown"),
            stranzit_file: None,
        }
    }

    pub fn from_stranzit(raw: StranzitCall) -> CallRecord {
        let id = value_to_string(&raw.id);

        let direction = normalize_stranzit_direction(&raw.call_direction);

        let caller = raw
            .call_parties
            .split(',')
            .next()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        let occurred_at = parse_dotnet_timestamp(&raw.start_time)
            .unwrap_or_else(|| raw.start_time.clone());

        let has_recording = !raw.file_name.is_empty();

        CallRecord {
            recording_reference: has_recording.then(|| id.clone()),
            id,
            occurred_at,
            duration_seconds: raw
                .duration
                .as_ref()
                .map(|d| d.total_seconds as i64)
                .unwrap_or(0),
            direction,
            direction_title: raw.call_direction.clone(),
            has_recording,
            caller_number: caller,
            callee_number: String::new(),
            stranzit_file: Some(StranzitFileInfo {
                file_name: raw.file_name,
                full_file_name: raw.full_file_name,
                call_parties: raw.call_parties,
                service_name: raw.service_name,
                server_ip: raw.server_ip_address,
                root_folder: raw.root_folder,
                record_count: raw.record_count,
            }),
        }
    }

    /// Duración en formato HH:MM:SS (Stranzit lo pide así en el download).
    pub fn duration_hms(&self) -> String {
        let h = self.duration_seconds / 3600;
        let m = (self.duration_seconds % 3600) / 60;
        let s = self.duration_seconds % 60;
        format!("{:02}:{:02}:{:02}", h, m, s)
    }
}

fn normalize_stranzit_direction(raw: &str) -> CallDirection {
    let lowered = raw.trim().to_lowercase();
    if lowered.contains("вход") || lowered == "incoming" || lowered == "1" {
        CallDirection::Incoming
    } else if lowered.contains("исход") || lowered == "outgoing" || lowered == "2" {
        CallDirection::Outgoing
    } else {
        CallDirection::Unknown
    }
}

/// "/Date(1758446374000)/" -> "2025-09-21 12:19:34" (hora local).
/// Devuelve None si el formato no es el esperado.
pub fn parse_dotnet_timestamp(raw: &str) -> Option<String> {
    let inner = raw.strip_prefix("/Date(")?.strip_suffix(")/")?;
    let millis: i64 = inner.parse().ok()?;
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

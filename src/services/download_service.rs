//! services/download_service.rs
//! Descarga el audio de un registro, genera el nombre de archivo
//! determinista y escribe el payload en el directorio configurado.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::errors::WatcherError;
use crate::models::call_record::{CallRecord, ProviderKind};
use crate::models::ledger_model::LocalArtifact;
use crate::services::session_service::SessionService;

/// Los audios pueden tardar más que una consulta normal
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

pub struct DownloadService {
    provider: ProviderKind,
    download_dir: PathBuf,
}

impl DownloadService {
    pub fn new(provider: ProviderKind, download_dir: &Path) -> Result<Self, WatcherError> {
        fs::create_dir_all(download_dir)?;
        Ok(DownloadService {
            provider,
            download_dir: download_dir.to_path_buf(),
        })
    }

    /// Descarga la grabación de un registro. Un status no exitoso devuelve
    /// None (se loguea el código); solo los fallos de red/IO son Err.
    pub async fn download(
        &self,
        session: &mut SessionService,
        record: &CallRecord,
    ) -> Result<Option<LocalArtifact>, WatcherError> {
        if !record.has_recording {
            log::warn!("El registro {} no tiene grabación", record.id);
            return Ok(None);
        }

        let response = match self.provider {
            ProviderKind::CloudPbx => {
                let reference = match &record.recording_reference {
                    Some(r) => r.clone(),
                    None => {
                        log::warn!("Sin referencia de grabación para {}", record.id);
                        return Ok(None);
                    }
                };
                session
                    .authorized_get(
                        &format!("/domain/call_history/{}/record", reference),
                        &[],
                        DOWNLOAD_TIMEOUT,
                    )
                    .await?
            }
            ProviderKind::Stranzit => {
                let query = stranzit_download_query(record);
                session
                    .authorized_get(
                        &format!("/CallRecords/DownloadRecord/{}", record.id),
                        &query,
                        DOWNLOAD_TIMEOUT,
                    )
                    .await?
            }
        };

        let status = response.status();
        if !status.is_success() {
            log::error!(
                "Error descargando {}: HTTP {}",
                record.id,
                status.as_u16()
            );
            return Ok(None);
        }

        let bytes = response.bytes().await?;
        let filename = generate_filename(record);
        let filepath = self.download_dir.join(&filename);

        write_recording(&filepath, &bytes).map_err(|e| {
            WatcherError::Download(format!("No se pudo escribir {}: {}", filepath.display(), e))
        })?;

        let size_bytes = bytes.len() as u64;
        log::info!(
            "Descargado: {} ({:.1} KB, {}s)",
            filename,
            size_bytes as f64 / 1024.0,
            record.duration_seconds
        );

        Ok(Some(LocalArtifact {
            path: filepath,
            size_bytes,
        }))
    }
}

/// El handle se libera al salir del scope por cualquier camino; si la
/// escritura falla a mitad, el parcial queda en disco.
fn write_recording(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Nombre determinista: {fecha}_{hora}_{caller sin '+' ni espacios, ≤15}_{dur}sec.mp3
/// Si algún campo no parsea, cae a call_{id}.mp3; ese fallback nunca falla.
pub fn generate_filename(record: &CallRecord) -> String {
    match readable_filename(record) {
        Some(name) => name,
        None => {
            log::warn!(
                "No se pudo generar nombre legible para {}, usando fallback",
                record.id
            );
            format!("call_{}.mp3", record.id)
        }
    }
}

fn readable_filename(record: &CallRecord) -> Option<String> {
    // "2025-10-21 18:50:52+05:00" -> parte antes del offset
    let dt_str = record.occurred_at.split('+').next()?.trim();
    let dt = NaiveDateTime::parse_from_str(dt_str, "%Y-%m-%d %H:%M:%S").ok()?;

    let caller: String = record
        .caller_number
        .replace('+', "")
        .replace(' ', "")
        .chars()
        .take(15)
        .collect();

    Some(format!(
        "{}_{}_{}sec.mp3",
        dt.format("%Y-%m-%d_%H-%M-%S"),
        caller,
        record.duration_seconds
    ))
}

/// Stranzit exige repetir los metadatos del registro como query params.
fn stranzit_download_query(record: &CallRecord) -> Vec<(String, String)> {
    let file = record.stranzit_file.clone().unwrap_or_default();
    vec![
        ("StartTime".to_string(), record.occurred_at.clone()),
        ("EndTime".to_string(), record.occurred_at.clone()),
        ("ServiceName".to_string(), file.service_name),
        ("CallDirection".to_string(), record.direction_title.clone()),
        ("FileName".to_string(), file.file_name),
        ("FullFileName".to_string(), file.full_file_name),
        ("CallParties".to_string(), file.call_parties),
        ("RecordCount".to_string(), file.record_count.to_string()),
        ("ServerIpAddress".to_string(), file.server_ip),
        ("RootFolder".to_string(), file.root_folder),
        ("Duration".to_string(), record.duration_hms()),
        ("ErrorNumber".to_string(), "0".to_string()),
    ]
}

//! services/health_service.rs
//! Diagnóstico bajo demanda (--health): base de datos, directorio de
//! descargas y login de cada tenant. El reporte sale como JSON por
//! stdout para que un cron o un monitor externo lo parsee.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::config::app_config::{AppConfig, TenantConfig};
use crate::services::ledger_service::LedgerService;
use crate::services::session_service::SessionService;

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct TenantAuthCheck {
    pub tenant: String,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub database: CheckResult,
    pub download_dir: CheckResult,
    pub provider_auth: Vec<TenantAuthCheck>,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// "ok" si todos los chequeos pasaron, "unhealthy" si alguno falló
    pub status: String,
    pub checks: HealthChecks,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.checks.database.ok
            && self.checks.download_dir.ok
            && self.checks.provider_auth.iter().all(|c| c.ok)
    }
}

/// Corre los tres chequeos y arma el reporte. Nunca falla: cada problema
/// queda adentro como un check en falso.
pub async fn run(
    config: &AppConfig,
    tenants: &[TenantConfig],
    ledger: &LedgerService,
) -> HealthReport {
    let database = check_database(ledger).await;
    let download_dir = check_download_dir(&config.download_dir);

    let mut provider_auth = Vec::with_capacity(tenants.len());
    for tenant in tenants {
        provider_auth.push(check_tenant_auth(config, tenant).await);
    }

    let mut report = HealthReport {
        status: String::new(),
        checks: HealthChecks {
            database,
            download_dir,
            provider_auth,
        },
    };
    report.status = if report.is_healthy() {
        "ok".to_string()
    } else {
        "unhealthy".to_string()
    };
    report
}

async fn check_database(ledger: &LedgerService) -> CheckResult {
    match ledger.stats(None).await {
        Ok(stats) => {
            let last = ledger
                .last_download_at()
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| "nunca".to_string());
            CheckResult {
                ok: true,
                detail: format!(
                    "{} registros ({:.2} MB), última descarga: {}",
                    stats.total_count,
                    stats.total_mb(),
                    last
                ),
            }
        }
        Err(e) => CheckResult {
            ok: false,
            detail: format!("Base de datos inaccesible: {}", e),
        },
    }
}

/// Prueba de escritura real: crear y borrar un archivo sonda. Un chequeo
/// de permisos en frío no detecta discos llenos ni montajes read-only.
fn check_download_dir(dir: &Path) -> CheckResult {
    let probe = dir.join(".health_probe");
    let outcome = fs::create_dir_all(dir)
        .and_then(|_| fs::write(&probe, b"probe"))
        .and_then(|_| fs::remove_file(&probe));

    match outcome {
        Ok(()) => CheckResult {
            ok: true,
            detail: format!("{} escribible", dir.display()),
        },
        Err(e) => CheckResult {
            ok: false,
            detail: format!("{} no escribible: {}", dir.display(), e),
        },
    }
}

async fn check_tenant_auth(config: &AppConfig, tenant: &TenantConfig) -> TenantAuthCheck {
    let mut session = match SessionService::new(&tenant.login, &tenant.domain, &config.base_url) {
        Ok(s) => s,
        Err(e) => {
            return TenantAuthCheck {
                tenant: tenant.name.clone(),
                ok: false,
                detail: format!("No se pudo crear la sesión: {}", e),
            }
        }
    };

    match session.authenticate(&tenant.password).await {
        Ok(()) => {
            let detail = format!("login OK contra {}", session.base_url());
            session.logout();
            TenantAuthCheck {
                tenant: tenant.name.clone(),
                ok: true,
                detail,
            }
        }
        Err(e) => TenantAuthCheck {
            tenant: tenant.name.clone(),
            ok: false,
            detail: format!("login falló: {}", e),
        },
    }
}

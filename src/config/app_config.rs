//! config/app_config.rs
//! Configuración global del watcher y carga de tenants desde variables
//! de entorno (CITY_N_*). El parseo de .env lo hace dotenv en main.

use std::env;
use std::path::PathBuf;

use crate::models::call_record::ProviderKind;

/// Sentinel que deja el .env de ejemplo; un tenant con este password
/// se considera sin configurar.
const PASSWORD_PLACEHOLDER: &str = "ЗАПОЛНИТЕ_ПАРОЛЬ";

/// Cantidad máxima de tenants soportada (CITY_1_* .. CITY_16_*)
pub const MAX_TENANTS: u32 = 16;

/// Configuración global compartida por todos los tenants.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderKind,
    pub base_url: String,
    pub download_dir: PathBuf,
    pub database_path: PathBuf,
    /// Segundos entre ciclos de polling
    pub check_interval_secs: u64,
    /// Ventana de búsqueda hacia atrás (horas)
    pub lookback_hours: i64,
    pub min_duration_seconds: i64,
    pub direction_filter: String,
    pub records_per_page: u32,
    /// Segundos de espera entre arranques de tenants (rate limiting del proveedor)
    pub stagger_delay_secs: u64,
    pub max_restarts_per_hour: u32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let provider = match env::var("PROVIDER").unwrap_or_default().to_lowercase().as_str() {
            "stranzit" => ProviderKind::Stranzit,
            _ => ProviderKind::CloudPbx,
        };

        let base_url = env::var("BASE_URL").unwrap_or_else(|_| match provider {
            ProviderKind::CloudPbx => "https://p2.cloudpbx.rt.ru/webapi".to_string(),
            ProviderKind::Stranzit => "https://lk.stranzit.ru".to_string(),
        });

        AppConfig {
            provider,
            base_url,
            download_dir: PathBuf::from(env_or("DOWNLOAD_DIR", "./downloads")),
            database_path: PathBuf::from(env_or("DATABASE_PATH", "./pbx_calls.db")),
            check_interval_secs: parse_env("CHECK_INTERVAL", 300),
            lookback_hours: parse_env("LOOKBACK_HOURS", 24),
            min_duration_seconds: parse_env("MIN_DURATION_SECONDS", 180),
            direction_filter: env_or("CALL_FILTER_DIRECTION", "any"),
            records_per_page: parse_env("CALL_FILTER_RECORDS_PER_PAGE", 100),
            stagger_delay_secs: parse_env("STAGGER_DELAY_SECONDS", 3),
            max_restarts_per_hour: parse_env("MAX_RESTARTS_PER_HOUR", 10),
        }
    }
}

/// Credenciales de un tenant (una cuenta/ciudad). Inmutables durante
/// la vida del proceso; el password solo se usa al autenticar.
#[derive(Debug, Clone)]
pub struct TenantConfig {
    pub city_id: u32,
    pub name: String,
    pub login: String,
    pub password: String,
    pub domain: String,
}

impl TenantConfig {
    /// Un tenant es aceptado solo con los cuatro campos presentes y
    /// password distinto del placeholder del .env de ejemplo.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
            && !self.login.is_empty()
            && !self.password.is_empty()
            && self.password != PASSWORD_PLACEHOLDER
            && !self.domain.is_empty()
    }
}

/// Carga los tenants desde CITY_N_{NAME,LOGIN,PASSWORD,DOMAIN}.
/// Los inválidos se loguean y se excluyen (no abortan el proceso).
pub fn load_tenants() -> Vec<TenantConfig> {
    let mut tenants = Vec::new();

    for city_id in 1..=MAX_TENANTS {
        let name = env::var(format!("CITY_{}_NAME", city_id)).unwrap_or_default();
        let login = env::var(format!("CITY_{}_LOGIN", city_id)).unwrap_or_default();
        let password = env::var(format!("CITY_{}_PASSWORD", city_id)).unwrap_or_default();
        let domain = env::var(format!("CITY_{}_DOMAIN", city_id)).unwrap_or_default();

        if name.is_empty() && login.is_empty() && password.is_empty() && domain.is_empty() {
            continue; // slot sin configurar
        }

        let tenant = TenantConfig {
            city_id,
            name: if name.is_empty() {
                format!("City-{}", city_id)
            } else {
                name
            },
            login,
            password,
            domain,
        };

        if tenant.is_valid() {
            tenants.push(tenant);
        } else {
            log::warn!(
                "Tenant {} ({}) descartado: credenciales incompletas o placeholder",
                city_id,
                tenant.name
            );
        }
    }

    tenants
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

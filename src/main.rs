use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;

use crate::config::app_config::{self, AppConfig, TenantConfig};
use crate::logger::init_logger;
use crate::services::health_service;
use crate::services::ledger_service::LedgerService;
use crate::services::notification_service::NotificationService;
use crate::services::supervisor_service::SupervisorService;

mod config;
mod errors;
mod logger;
mod models;
mod services;
#[cfg(test)]
mod tests;

/// Descarga automática de grabaciones de llamadas PBX para múltiples
/// tenants (uno por ciudad).
#[derive(Parser, Debug)]
#[command(name = "pbx_records_watcher", version)]
struct Args {
    /// Una sola pasada por tenant y salir
    #[arg(long)]
    once: bool,

    /// Ventana de búsqueda en horas (anula LOOKBACK_HOURS)
    #[arg(long)]
    hours: Option<i64>,

    /// Ids de tenant a procesar, separados por coma (ej: 1,3,5)
    #[arg(long)]
    cities: Option<String>,

    /// Muestra los tenants configurados y sale
    #[arg(long)]
    status: bool,

    /// Corre los chequeos de salud y sale
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() {
    dotenv().ok(); // Cargar .env al inicio
    init_logger();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        log::error!("Error fatal: {:?}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    if let Some(hours) = args.hours {
        anyhow::ensure!(hours > 0, "--hours debe ser positivo");
    }

    let config = AppConfig::from_env();
    let mut tenants = app_config::load_tenants();

    if let Some(cities) = &args.cities {
        let wanted = parse_city_ids(cities)?;
        tenants.retain(|t| wanted.contains(&t.city_id));
    }

    if tenants.is_empty() {
        eprintln!("No hay tenants configurados. Revise las variables CITY_N_* en el .env");
        std::process::exit(1);
    }

    if args.status {
        print_status(&config, &tenants);
        return Ok(());
    }

    let db_pool = LedgerService::connect(&config.database_path)
        .await
        .context("No se pudo abrir la base de datos")?;
    let ledger = LedgerService::new(db_pool.clone());
    ledger
        .init_schema()
        .await
        .context("No se pudo inicializar el esquema del ledger")?;

    if args.health {
        let report = health_service::run(&config, &tenants, &ledger).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        if !report.is_healthy() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let notifier = NotificationService::from_env();
    let mut supervisor =
        SupervisorService::new(config, db_pool, Arc::clone(&shutdown), notifier);

    supervisor.start_all(tenants, args.once, args.hours).await?;
    log::info!("✅ {} worker(s) activos", supervisor.active_count());

    if args.once {
        supervisor.wait_all().await;
        if let Ok(stats) = ledger.stats(None).await {
            log::info!(
                "Pasada única completada. Total acumulado: {} registros ({:.2} MB)",
                stats.total_count,
                stats.total_mb()
            );
        }
        return Ok(());
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("🛑 Ctrl+C recibido, iniciando apagado ordenado...");
        }
        _ = supervisor.monitor() => {}
    }

    supervisor.stop_all().await;
    Ok(())
}

/// Parsea "--cities 1,3,5" a ids de tenant.
fn parse_city_ids(value: &str) -> Result<Vec<u32>> {
    value
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<u32>()
                .with_context(|| format!("Id de ciudad inválido: '{}'", part.trim()))
        })
        .collect()
}

fn print_status(config: &AppConfig, tenants: &[TenantConfig]) {
    println!("Proveedor:        {}", config.provider.as_str());
    println!("BASE_URL:         {}", config.base_url);
    println!("Base de datos:    {}", config.database_path.display());
    println!("Descargas:        {}", config.download_dir.display());
    println!("Intervalo:        {}s", config.check_interval_secs);
    println!("Ventana:          {}h", config.lookback_hours);
    println!("Duración mínima:  {}s", config.min_duration_seconds);
    println!();
    println!("{:<4} {:<20} {:<20} {:<25}", "ID", "NOMBRE", "LOGIN", "DOMINIO");
    for tenant in tenants {
        println!(
            "{:<4} {:<20} {:<20} {:<25}",
            tenant.city_id, tenant.name, tenant.login, tenant.domain
        );
    }
    println!();
    println!("{} tenant(s) listos para arrancar", tenants.len());
}

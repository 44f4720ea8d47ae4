//! services/notification_service.rs
//! Alertas operativas del supervisor (worker caído, techo de restarts
//! alcanzado). Dos canales best-effort: webhook JSON y correo SMTP.
//! Un canal sin configurar se omite; un envío fallido solo se loguea,
//! nunca interrumpe la supervisión.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use reqwest::Client;

/// Una alerta no puede demorar el loop de monitoreo
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
struct SmtpConfig {
    server: String,
    user: String,
    pass: String,
    to: String,
}

#[derive(Clone)]
pub struct NotificationService {
    http_client: Client,
    webhook_url: Option<String>,
    smtp: Option<SmtpConfig>,
}

impl NotificationService {
    /// Lee la configuración de canales desde el entorno. Sin WEBHOOK_URL
    /// ni SMTP_SERVER el servicio queda mudo (válido en desarrollo).
    pub fn from_env() -> Self {
        let webhook_url = env::var("WEBHOOK_URL").ok().filter(|v| !v.is_empty());

        let smtp = match (
            env::var("SMTP_SERVER"),
            env::var("SMTP_USER"),
            env::var("SMTP_PASS"),
            env::var("ALERT_EMAIL"),
        ) {
            (Ok(server), Ok(user), Ok(pass), Ok(to))
                if !server.is_empty() && !user.is_empty() && !to.is_empty() =>
            {
                Some(SmtpConfig {
                    server,
                    user,
                    pass,
                    to,
                })
            }
            _ => None,
        };

        if webhook_url.is_none() && smtp.is_none() {
            log::info!("Alertas deshabilitadas: sin WEBHOOK_URL ni SMTP_SERVER");
        }

        NotificationService {
            http_client: Client::new(),
            webhook_url,
            smtp,
        }
    }

    /// Envía la alerta por todos los canales configurados.
    pub async fn alert(&self, event: &str, source: &str, detail: &str) {
        log::info!("🔔 Alerta '{}' de [{}]: {}", event, source, detail);

        if let Some(url) = &self.webhook_url {
            if let Err(e) = self.send_webhook(url, event, source, detail).await {
                log::warn!("No se pudo enviar la alerta por webhook: {:?}", e);
            }
        }

        if let Some(smtp) = &self.smtp {
            if let Err(e) = send_email(smtp, event, source, detail).await {
                log::warn!("No se pudo enviar la alerta por correo: {:?}", e);
            }
        }
    }

    async fn send_webhook(
        &self,
        url: &str,
        event: &str,
        source: &str,
        detail: &str,
    ) -> Result<()> {
        let payload = serde_json::json!({
            "event": event,
            "timestamp": Utc::now().to_rfc3339(),
            "source": source,
            "error": detail,
        });

        let response = self
            .http_client
            .post(url)
            .json(&payload)
            .timeout(WEBHOOK_TIMEOUT)
            .send()
            .await
            .context("Fallo el POST al webhook")?;

        if !response.status().is_success() {
            anyhow::bail!("Webhook respondió HTTP {}", response.status().as_u16());
        }

        Ok(())
    }
}

async fn send_email(smtp: &SmtpConfig, event: &str, source: &str, detail: &str) -> Result<()> {
    let from: Mailbox = smtp.user.parse().context("SMTP_USER inválido")?;
    let to: Mailbox = smtp.to.parse().context("ALERT_EMAIL inválido")?;

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(format!("[pbx-watcher] {}: {}", event, source))
        .header(ContentType::TEXT_PLAIN)
        .body(format!(
            "Evento: {}\nOrigen: {}\nDetalle: {}\nFecha: {}\n",
            event,
            source,
            detail,
            Utc::now().to_rfc3339()
        ))
        .context("No se pudo construir el mensaje")?;

    let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.server)
        .context("SMTP_SERVER inválido")?
        .credentials(Credentials::new(smtp.user.clone(), smtp.pass.clone()))
        .build();

    tokio::time::timeout(SMTP_TIMEOUT, mailer.send(message))
        .await
        .context("Timeout enviando el correo")?
        .context("El servidor SMTP rechazó el envío")?;

    Ok(())
}

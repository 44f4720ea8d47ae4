//! services/session_service.rs
//! Sesión autenticada contra el proveedor: login con form data, token JWT,
//! autodetección del servidor vía claim "iss" y renovación transparente
//! ante un 401. La política de reintentos está acotada: un reintento sin
//! renovar, una renovación, un reintento final.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::errors::WatcherError;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
/// Timeout por defecto para llamadas al proveedor
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// La renovación de token usa un timeout más corto
const REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Estado mutable de la sesión. Solo lo tocan authenticate/renew/logout.
#[derive(Debug, Default)]
pub struct Session {
    token: Option<String>,
    refresh_token: Option<String>,
    pub base_url: String,
    pub user_id: Option<String>,
    pub domain_id: Option<String>,
    pub authenticated: bool,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: Option<String>,
    refresh_token: Option<String>,
    #[serde(default)]
    user_id: Value,
    #[serde(default)]
    domain_id: Value,
}

pub struct SessionService {
    client: Client,
    login: String,
    domain: String,
    session: Session,
}

impl SessionService {
    pub fn new(login: &str, domain: &str, base_url: &str) -> Result<Self, WatcherError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(DEFAULT_TIMEOUT)
            .build()?;

        Ok(SessionService {
            client,
            login: login.to_string(),
            domain: domain.to_string(),
            session: Session {
                base_url: base_url.to_string(),
                ..Session::default()
            },
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.authenticated && self.session.token.is_some()
    }

    pub fn base_url(&self) -> &str {
        &self.session.base_url
    }

    /// Login con form data {username, password, domain}. El password no se
    /// guarda: vive solo en esta llamada.
    pub async fn authenticate(&mut self, password: &str) -> Result<(), WatcherError> {
        if self.login.is_empty() || password.is_empty() || self.domain.is_empty() {
            return Err(WatcherError::Auth(
                "login, password y domain son obligatorios".to_string(),
            ));
        }

        log::info!(
            "Autenticación de {}*** en dominio {}",
            mask(&self.login),
            self.domain
        );

        let response = self
            .client
            .post(format!("{}/auth", self.session.base_url))
            .form(&[
                ("username", self.login.as_str()),
                ("password", password),
                ("domain", self.domain.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            self.session.authenticated = false;
            return Err(WatcherError::Auth(format!(
                "HTTP {} en /auth",
                response.status().as_u16()
            )));
        }

        let data: AuthResponse = response
            .json()
            .await
            .map_err(|e| WatcherError::Decode(format!("Respuesta de /auth ilegible: {}", e)))?;

        let token = data
            .token
            .ok_or_else(|| WatcherError::Auth("Respuesta de /auth sin token".to_string()))?;

        // Autodetección del servidor correcto desde el claim "iss" del JWT.
        // Si el claim falta o el token está malformado seguimos con el default.
        match extract_issuer_from_token(&token) {
            Some(iss) if iss != self.session.base_url => {
                log::info!(
                    "Cambio de BASE_URL: {} -> {}",
                    self.session.base_url,
                    iss
                );
                self.session.base_url = iss;
            }
            Some(_) => {
                log::debug!("BASE_URL coincide con el issuer del token");
            }
            None => {
                log::warn!(
                    "No se pudo extraer 'iss' del token, seguimos con {}",
                    self.session.base_url
                );
            }
        }

        self.session.token = Some(token);
        self.session.refresh_token = data.refresh_token;
        self.session.user_id = value_as_string(&data.user_id);
        self.session.domain_id = value_as_string(&data.domain_id);
        self.session.authenticated = true;

        log::info!(
            "Autenticación exitosa. User ID: {:?}, Domain ID: {:?}",
            self.session.user_id,
            self.session.domain_id
        );

        Ok(())
    }

    /// Renueva el access token con el refresh token. Si no hay refresh token
    /// o el endpoint lo rechaza, el caller debe re-autenticar desde
    /// credenciales en el próximo ciclo.
    pub async fn renew(&mut self) -> Result<(), WatcherError> {
        let refresh = self
            .session
            .refresh_token
            .clone()
            .ok_or_else(|| WatcherError::Auth("Refresh token ausente".to_string()))?;

        let response = self
            .client
            .post(format!("{}/auth/refresh_token", self.session.base_url))
            .json(&serde_json::json!({ "refresh_token": refresh }))
            .timeout(REFRESH_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WatcherError::Auth(format!(
                "Renovación rechazada: HTTP {}",
                response.status().as_u16()
            )));
        }

        let data: AuthResponse = response
            .json()
            .await
            .map_err(|e| WatcherError::Decode(format!("Respuesta de refresh ilegible: {}", e)))?;

        match data.token {
            Some(token) => {
                self.session.token = Some(token);
                log::info!("Access token renovado");
                Ok(())
            }
            None => Err(WatcherError::Auth(
                "Respuesta de refresh sin token".to_string(),
            )),
        }
    }

    /// GET autenticado con la política 401: reintento idéntico, renovación,
    /// reintento final; si todo falla se devuelve la última respuesta para
    /// que el caller loguee y siga.
    pub async fn authorized_get(
        &mut self,
        path: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<reqwest::Response, WatcherError> {
        self.ensure_authenticated()?;
        let url = format!("{}{}", self.session.base_url, path);

        let first = self.send_get(&url, query, timeout).await?;
        if first.status() != StatusCode::UNAUTHORIZED {
            return Ok(first);
        }

        // Un 401 suelto puede ser transitorio: reintento sin tocar el token
        log::warn!("401 en {}, reintento sin renovar token...", path);
        let retry = self.send_get(&url, query, timeout).await?;
        if retry.status() != StatusCode::UNAUTHORIZED {
            return Ok(retry);
        }

        log::warn!("Reintento también 401, renovando token...");
        match self.renew().await {
            Ok(()) => Ok(self.send_get(&url, query, timeout).await?),
            Err(e) => {
                log::error!("No se pudo renovar el token: {}", e);
                Ok(retry)
            }
        }
    }

    /// POST form autenticado, misma política 401 que authorized_get.
    pub async fn authorized_post_form(
        &mut self,
        path: &str,
        form: &[(String, String)],
        timeout: Duration,
    ) -> Result<reqwest::Response, WatcherError> {
        self.ensure_authenticated()?;
        let url = format!("{}{}", self.session.base_url, path);

        let first = self.send_post_form(&url, form, timeout).await?;
        if first.status() != StatusCode::UNAUTHORIZED {
            return Ok(first);
        }

        log::warn!("401 en {}, reintento sin renovar token...", path);
        let retry = self.send_post_form(&url, form, timeout).await?;
        if retry.status() != StatusCode::UNAUTHORIZED {
            return Ok(retry);
        }

        log::warn!("Reintento también 401, renovando token...");
        match self.renew().await {
            Ok(()) => Ok(self.send_post_form(&url, form, timeout).await?),
            Err(e) => {
                log::error!("No se pudo renovar el token: {}", e);
                Ok(retry)
            }
        }
    }

    /// Cierra la sesión y limpia los tokens.
    pub fn logout(&mut self) {
        self.session.token = None;
        self.session.refresh_token = None;
        self.session.user_id = None;
        self.session.domain_id = None;
        self.session.authenticated = false;
        log::info!("Sesión cerrada, tokens limpiados");
    }

    fn ensure_authenticated(&self) -> Result<(), WatcherError> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(WatcherError::Auth(
                "Se requiere autenticación antes de consultar datos".to_string(),
            ))
        }
    }

    async fn send_get(
        &self,
        url: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<reqwest::Response, WatcherError> {
        let mut request = self.client.get(url).timeout(timeout);
        if let Some(token) = &self.session.token {
            request = request.bearer_auth(token);
        }
        if !query.is_empty() {
            request = request.query(query);
        }
        Ok(request.send().await?)
    }

    async fn send_post_form(
        &self,
        url: &str,
        form: &[(String, String)],
        timeout: Duration,
    ) -> Result<reqwest::Response, WatcherError> {
        let mut request = self.client.post(url).timeout(timeout).form(form);
        if let Some(token) = &self.session.token {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }
}

/// Extrae el claim "iss" del segundo segmento del JWT (base64url JSON,
/// restaurando el padding). Devuelve None ante cualquier malformación.
pub fn extract_issuer_from_token(token: &str) -> Option<String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() < 2 {
        return None;
    }

    let mut payload = parts[1].to_string();
    while payload.len() % 4 != 0 {
        payload.push('=');
    }

    let bytes = URL_SAFE.decode(payload.as_bytes()).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    claims
        .get("iss")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn mask(login: &str) -> String {
    login.chars().take(3).collect()
}

fn value_as_string(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

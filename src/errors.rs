//! errors.rs
//! Taxonomía de errores del watcher. Todos son recuperables salvo Config,
//! que excluye al tenant de la supervisión.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatcherError {
    /// Credenciales o configuración del tenant inválidas
    #[error("Error de configuración: {0}")]
    Config(String),

    /// Autenticación o renovación de token rechazada
    #[error("Error de autenticación: {0}")]
    Auth(String),

    /// Timeout, connection reset, etc.
    #[error("Error de red: {0}")]
    Network(#[from] reqwest::Error),

    /// Payload del proveedor con forma inesperada
    #[error("Error de decodificación: {0}")]
    Decode(String),

    /// Fallo al persistir una grabación en disco
    #[error("Error de descarga: {0}")]
    Download(String),

    /// Fallo en la base de datos del ledger
    #[error("Error de base de datos: {0}")]
    Ledger(#[from] sqlx::Error),

    #[error("Error de I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl WatcherError {
    /// Config es el único error fatal para el tenant; el resto se loguea
    /// y el ciclo continúa vacío.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WatcherError::Config(_))
    }
}

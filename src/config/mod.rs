//! config/mod.rs
//! Configuración global y de tenants (variables de entorno).

pub mod app_config;

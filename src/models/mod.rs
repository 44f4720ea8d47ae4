//! models/mod.rs
//! Módulo raíz para modelos/estructuras compartidas.

pub mod call_record;
pub mod ledger_model;

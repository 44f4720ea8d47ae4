//! services/filter_service.rs
//! Filtro de registros según la política del tenant. El orden de los
//! predicados es fijo (grabación, duración, dirección) para que los
//! conteos en logs sean deterministas.

use crate::models::call_record::{CallDirection, CallRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionFilter {
    Any,
    Incoming,
    Outgoing,
}

impl DirectionFilter {
    /// Acepta los mismos sinónimos que el API (any/in/out, ruso, códigos).
    pub fn parse(value: &str) -> DirectionFilter {
        match value.trim().to_lowercase().as_str() {
            "incoming" | "in" | "входящий" | "1" => DirectionFilter::Incoming,
            "outgoing" | "out" | "исходящий" | "2" => DirectionFilter::Outgoing,
            _ => DirectionFilter::Any,
        }
    }

    fn matches(&self, direction: CallDirection) -> bool {
        match self {
            DirectionFilter::Any => true,
            DirectionFilter::Incoming => direction == CallDirection::Incoming,
            DirectionFilter::Outgoing => direction == CallDirection::Outgoing,
        }
    }
}

/// Política de filtrado del tenant.
#[derive(Debug, Clone)]
pub struct FilterPolicy {
    pub require_recording: bool,
    pub min_duration_seconds: i64,
    pub direction: DirectionFilter,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        FilterPolicy {
            require_recording: true,
            min_duration_seconds: 0,
            direction: DirectionFilter::Any,
        }
    }
}

/// Aplica la política. Un registro pasa solo si pasa todos los predicados
/// habilitados; sin predicados, pasan todos los que tengan grabación.
pub fn apply(records: Vec<CallRecord>, policy: &FilterPolicy) -> Vec<CallRecord> {
    let total = records.len();

    let filtered: Vec<CallRecord> = records
        .into_iter()
        .filter(|r| !policy.require_recording || r.has_recording)
        .filter(|r| r.duration_seconds >= policy.min_duration_seconds)
        .filter(|r| policy.direction.matches(r.direction))
        .collect();

    log::info!(
        "Filtrado: {} de {} (duración ≥{}s, dirección {:?})",
        filtered.len(),
        total,
        policy.min_duration_seconds,
        policy.direction
    );

    filtered
}

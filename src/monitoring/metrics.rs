// DANS : src/monitoring/metrics.rs

use lazy_static::lazy_static;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGaugeVec, TextEncoder, register_int_counter,
    register_int_counter_vec, register_int_gauge_vec,
};
use tracing::warn;

lazy_static! {
    // --- Livraison ---
    pub static ref EVENTS_DELIVERED: IntCounterVec = register_int_counter_vec!(
        "pump_monitor_events_delivered_total",
        "Événements transmis au sink, par programme et type d'instruction",
        &["program", "kind"] // Labels: "pump", "claim_cashback", etc.
    ).unwrap();
    pub static ref DECODE_ERRORS: IntCounterVec = register_int_counter_vec!(
        "pump_monitor_decode_errors_total",
        "Instructions reconnues mais indécodables",
        &["program"]
    ).unwrap();
    pub static ref CALLBACK_ERRORS: IntCounterVec = register_int_counter_vec!(
        "pump_monitor_callback_errors_total",
        "Erreurs ou paniques du sink",
        &["program"]
    ).unwrap();

    // --- Santé des flux ---
    pub static ref RECONNECTS: IntCounterVec = register_int_counter_vec!(
        "pump_monitor_reconnects_total",
        "Tentatives de réabonnement de la stratégie push",
        &["program"]
    ).unwrap();
    pub static ref SUBSCRIPTION_DROPS: IntCounter = register_int_counter!(
        "pump_monitor_subscription_drops_total",
        "Notifications de logs perdues sur débordement de la file d'abonnement"
    ).unwrap();
    pub static ref CURSOR_SLOT: IntGaugeVec = register_int_gauge_vec!(
        "pump_monitor_cursor_slot",
        "Slot du curseur de polling",
        &["program"]
    ).unwrap();

    pub static ref RPC_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "pump_monitor_rpc_requests_total",
        "Compteur total des requêtes RPC, segmenté par méthode et statut",
        &["method", "status"] // Labels: "get_transaction", "success" / "failure"
    ).unwrap();
}

/// Rend toutes les métriques enregistrées au format texte Prometheus.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        warn!(error = %e, "[Monitoring] Encodage des métriques impossible.");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

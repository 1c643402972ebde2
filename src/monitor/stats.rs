// DANS : src/monitor/stats.rs

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use super::StrategyKind;
use crate::{decoders::unix_now, events::DomainEvent, monitoring::metrics};

/// Compteurs d'un `MonitorHandle`. Écrits par la tâche du moniteur, lus par n'importe qui.
#[derive(Debug)]
pub struct MonitorStats {
    program: String,
    strategy: StrategyKind,
    started_at: i64,
    events: AtomicU64,
    fee_claims: AtomicU64,
    cashback_claims: AtomicU64,
    launches: AtomicU64,
    decode_errors: AtomicU64,
    callback_errors: AtomicU64,
    rpc_errors: AtomicU64,
    reconnects: AtomicU64,
    last_slot: AtomicU64,
}

/// Instantané sérialisable des compteurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorSnapshot {
    pub program: String,
    pub strategy: StrategyKind,
    pub started_at: i64,
    pub uptime_secs: u64,
    pub events: u64,
    pub fee_claims: u64,
    pub cashback_claims: u64,
    pub launches: u64,
    pub decode_errors: u64,
    pub callback_errors: u64,
    pub rpc_errors: u64,
    pub reconnects: u64,
    pub last_slot: u64,
}

impl MonitorStats {
    pub fn new(program: &str, strategy: StrategyKind) -> Self {
        Self {
            program: program.to_string(),
            strategy,
            started_at: unix_now(),
            events: AtomicU64::new(0),
            fee_claims: AtomicU64::new(0),
            cashback_claims: AtomicU64::new(0),
            launches: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            callback_errors: AtomicU64::new(0),
            rpc_errors: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            last_slot: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_event(&self, event: &DomainEvent) {
        self.events.fetch_add(1, Ordering::Relaxed);
        match event {
            DomainEvent::FeeClaim(claim) if claim.is_cashback => {
                self.fee_claims.fetch_add(1, Ordering::Relaxed);
                self.cashback_claims.fetch_add(1, Ordering::Relaxed);
            }
            DomainEvent::FeeClaim(_) => {
                self.fee_claims.fetch_add(1, Ordering::Relaxed);
            }
            DomainEvent::TokenLaunch(_) => {
                self.launches.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.observe_slot(event.slot());
        metrics::EVENTS_DELIVERED
            .with_label_values(&[self.program.as_str(), event.kind().metric_name()])
            .inc();
    }

    pub(crate) fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
        metrics::DECODE_ERRORS.with_label_values(&[self.program.as_str()]).inc();
    }

    pub(crate) fn record_callback_error(&self) {
        self.callback_errors.fetch_add(1, Ordering::Relaxed);
        metrics::CALLBACK_ERRORS.with_label_values(&[self.program.as_str()]).inc();
    }

    pub(crate) fn record_rpc_error(&self) {
        self.rpc_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        metrics::RECONNECTS.with_label_values(&[self.program.as_str()]).inc();
    }

    pub(crate) fn observe_slot(&self, slot: u64) {
        self.last_slot.fetch_max(slot, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            program: self.program.clone(),
            strategy: self.strategy,
            started_at: self.started_at,
            uptime_secs: unix_now().saturating_sub(self.started_at).max(0) as u64,
            events: self.events.load(Ordering::Relaxed),
            fee_claims: self.fee_claims.load(Ordering::Relaxed),
            cashback_claims: self.cashback_claims.load(Ordering::Relaxed),
            launches: self.launches.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            callback_errors: self.callback_errors.load(Ordering::Relaxed),
            rpc_errors: self.rpc_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            last_slot: self.last_slot.load(Ordering::Relaxed),
        }
    }
}

// DANS : src/monitor/backoff.rs

use std::time::Duration;

/// Backoff exponentiel borné : `base`, `2·base`, ... plafonné à `cap`.
/// Le nombre de tentatives n'est pas limité ; `reset` après un succès.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    next: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        let cap = cap.max(base);
        Self {
            base,
            cap,
            next: base,
            attempt: 0,
        }
    }

    /// Délai à attendre avant la prochaine tentative.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next.clamp(self.base, self.cap);
        self.next = delay.saturating_mul(2).min(self.cap);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Numéro de la dernière tentative annoncée par `next_delay` (1, 2, ...).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.next = self.base;
        self.attempt = 0;
    }
}

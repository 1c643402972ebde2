// DANS : src/monitor/push.rs

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{IngestionStrategy, StrategyKind, backoff::Backoff, pipeline::Pipeline};
use crate::rpc::{LogNotification, LogSubscription};

/// Stratégie push : abonnement `logsSubscribe` sur l'adresse du programme.
///
/// À la perte du flux, réabonnement avec backoff exponentiel (sans limite de
/// tentatives). Les transactions passées pendant la coupure ne sont pas
/// rejouées ; le cache de signatures survit aux reconnexions.
pub(crate) struct PushStrategy {
    pipeline: Pipeline,
    subscription: Option<LogSubscription>,
    backoff: Backoff,
}

impl PushStrategy {
    pub fn new(pipeline: Pipeline, subscription: LogSubscription) -> Self {
        let backoff = Backoff::new(pipeline.settings.reconnect_base, pipeline.settings.reconnect_cap);
        Self {
            pipeline,
            subscription: Some(subscription),
            backoff,
        }
    }

    /// Consomme l'abonnement jusqu'à sa fin. `true` si l'arrêt vient de `cancel`.
    async fn consume(&mut self, mut subscription: LogSubscription, cancel: &CancellationToken) -> bool {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return true,
                next = subscription.next() => next,
            };
            let Some(notification) = next else {
                return false;
            };
            self.handle(notification, cancel).await;
            if cancel.is_cancelled() {
                return true;
            }
        }
    }

    async fn handle(&mut self, notification: LogNotification, cancel: &CancellationToken) {
        let program = self.pipeline.program_name().to_string();
        let signature = notification.signature;
        self.pipeline.stats.observe_slot(notification.slot);

        if notification.failed {
            debug!(program = %program, signature = %signature, "[Push] Transaction échouée ignorée.");
            return;
        }
        if self.pipeline.seen.seen(&signature) {
            debug!(program = %program, signature = %signature, "[Push] Doublon ignoré.");
            return;
        }
        if !self.pipeline.program.mentioned_in_logs(&notification.logs) {
            debug!(program = %program, signature = %signature, "[Push] Aucune instruction surveillée dans les logs.");
            return;
        }

        let settings = &self.pipeline.settings;
        let attempts = settings.missing_tx_retries.max(1);
        let missing_delay = settings.missing_tx_delay;
        let mut rpc_backoff = Backoff::new(settings.reconnect_base, settings.reconnect_cap);
        for attempt in 1..=attempts {
            let delay = match self.pipeline.fetch(&signature).await {
                Ok(Some(tx)) => {
                    self.pipeline.deliver_transaction(tx).await;
                    return;
                }
                // Pas encore indexée : délai court et fixe.
                Ok(None) => missing_delay,
                // Nœud en difficulté : les appels s'espacent.
                Err(_) => rpc_backoff.next_delay(),
            };
            if attempt < attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
        warn!(program = %program, signature = %signature, attempts, "[Push] Transaction introuvable, abandon.");
    }

    /// Réabonnement avec backoff. `None` si le moniteur est arrêté entre-temps.
    async fn reconnect(&mut self, cancel: &CancellationToken) -> Option<LogSubscription> {
        let program_id = self.pipeline.program.program_id;
        loop {
            let delay = self.backoff.next_delay();
            self.pipeline.stats.record_reconnect();
            warn!(
                program = %self.pipeline.program_name(),
                attempt = self.backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                "[Push] Abonnement perdu, reconnexion programmée."
            );
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => return None,
                result = self.pipeline.client.subscribe_logs(&program_id) => result,
            };
            match result {
                Ok(subscription) => {
                    info!(program = %self.pipeline.program_name(), attempt = self.backoff.attempt(), "[Push] Réabonné.");
                    self.backoff.reset();
                    return Some(subscription);
                }
                Err(e) => {
                    self.pipeline.stats.record_rpc_error();
                    warn!(program = %self.pipeline.program_name(), error = %e, "[Push] Échec du réabonnement.");
                }
            }
        }
    }
}

#[async_trait]
impl IngestionStrategy for PushStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Push
    }

    async fn run(&mut self, cancel: CancellationToken) {
        info!(program = %self.pipeline.program_name(), "[Push] Surveillance démarrée.");
        loop {
            let subscription = match self.subscription.take() {
                Some(subscription) => subscription,
                None => match self.reconnect(&cancel).await {
                    Some(subscription) => subscription,
                    None => break,
                },
            };
            if self.consume(subscription, &cancel).await {
                break;
            }
        }
        info!(program = %self.pipeline.program_name(), "[Push] Surveillance arrêtée.");
    }
}

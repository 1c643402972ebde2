// DANS : src/monitor/pipeline.rs

use solana_sdk::signature::Signature;
use std::sync::Arc;
use tracing::{error, warn};

use super::{MonitorSettings, delivery::dispatch, delivery::EventSink, stats::MonitorStats};
use crate::{
    decoders::{MonitoredProgram, decode_transaction},
    error::RpcError,
    filtering::SignatureCache,
    rpc::{LedgerClient, LedgerTransaction},
};

/// Chaîne commune aux deux stratégies : fetch → décodage → dédup → livraison.
/// Possédée par la tâche du moniteur ; le cache de signatures n'est jamais partagé.
pub(crate) struct Pipeline {
    pub client: Arc<dyn LedgerClient>,
    pub program: Arc<MonitoredProgram>,
    pub sink: Arc<dyn EventSink>,
    pub stats: Arc<MonitorStats>,
    pub settings: MonitorSettings,
    pub seen: SignatureCache,
}

impl Pipeline {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        program: Arc<MonitoredProgram>,
        sink: Arc<dyn EventSink>,
        stats: Arc<MonitorStats>,
        settings: MonitorSettings,
    ) -> Self {
        let seen = SignatureCache::new(settings.dedup_capacity);
        Self {
            client,
            program,
            sink,
            stats,
            settings,
            seen,
        }
    }

    pub fn program_name(&self) -> &str {
        &self.program.name
    }

    pub async fn fetch(&self, signature: &Signature) -> Result<Option<LedgerTransaction>, RpcError> {
        let result = self.client.get_transaction(signature).await;
        if let Err(e) = &result {
            self.stats.record_rpc_error();
            warn!(program = %self.program.name, signature = %signature, error = %e, "[Monitor] Échec de récupération de la transaction.");
        }
        result
    }

    /// Décode puis livre. Les erreurs de décodage sont journalisées et n'empêchent
    /// pas la livraison des instructions voisines. La signature n'est retenue
    /// qu'en cas de correspondance, avant le premier appel au sink.
    /// Renvoie le nombre d'événements livrés.
    pub async fn deliver_transaction(&mut self, tx: LedgerTransaction) -> usize {
        self.stats.observe_slot(tx.slot);
        let mut events = Vec::new();
        for result in decode_transaction(&self.program, &tx) {
            match result {
                Ok(event) => events.push(event),
                Err(e) => {
                    self.stats.record_decode_error();
                    warn!(program = %self.program.name, signature = %tx.signature, error = %e, "[Decoder] Instruction ignorée.");
                }
            }
        }
        if events.is_empty() {
            return 0;
        }
        if !self.seen.remember(tx.signature) {
            return 0;
        }

        let mut delivered = 0;
        for event in events {
            self.stats.record_event(&event);
            let ordinal = event.ordinal();
            match dispatch(self.sink.as_ref(), event).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    self.stats.record_callback_error();
                    error!(program = %self.program.name, signature = %tx.signature, ordinal, error = %e, "[Monitor] Le callback a échoué, on continue.");
                }
            }
        }
        delivered
    }
}

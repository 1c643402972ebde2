// DANS : src/monitor/poll.rs

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use solana_sdk::signature::Signature;
use std::{collections::HashMap, sync::Arc};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{IngestionStrategy, StrategyKind, pipeline::Pipeline};
use crate::{
    decoders::unix_now,
    error::RpcError,
    monitoring::metrics,
    rpc::{LedgerTransaction, SignatureInfo, SignatureOrder, SignatureQuery},
    state::{Cursor, CursorStore},
};

/// Pourquoi une signature n'est pas récupérée.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    Failed,
    Duplicate,
}

impl SkipReason {
    fn as_str(self) -> &'static str {
        match self {
            SkipReason::Failed => "transaction échouée",
            SkipReason::Duplicate => "doublon",
        }
    }
}

enum Outcome {
    Skipped(SkipReason),
    Fetched(Result<Option<LedgerTransaction>, RpcError>),
}

/// Stratégie poll : à chaque tick, les signatures postérieures au curseur sont
/// récupérées puis traitées de la plus ancienne à la plus récente.
///
/// Le curseur n'avance qu'une fois un élément entièrement traité (livré, ou
/// reconnu comme non pertinent) et toujours dans l'ordre de découverte, même
/// quand les transactions sont récupérées en parallèle.
pub(crate) struct PollStrategy {
    pipeline: Pipeline,
    cursor: Option<Cursor>,
    anchored: bool,
    view: Arc<ArcSwapOption<Cursor>>,
    store: Option<Arc<CursorStore>>,
    missing: HashMap<Signature, u32>,
    dirty: bool,
}

impl PollStrategy {
    /// `initial` : curseur persistant encore valide. Sans lui, le premier tick
    /// s'ancre sur la signature la plus récente sans rien rejouer.
    pub fn new(
        pipeline: Pipeline,
        initial: Option<Cursor>,
        view: Arc<ArcSwapOption<Cursor>>,
        store: Option<Arc<CursorStore>>,
    ) -> Self {
        view.store(initial.clone().map(Arc::new));
        Self {
            pipeline,
            anchored: initial.is_some(),
            cursor: initial,
            view,
            store,
            missing: HashMap::new(),
            dirty: false,
        }
    }

    async fn anchor(&mut self) -> Result<(), RpcError> {
        let query = SignatureQuery {
            before: None,
            until: None,
            limit: 1,
        };
        let newest = self
            .pipeline
            .client
            .get_signatures_for_address(&self.pipeline.program.program_id, &query)
            .await?;
        match newest.into_iter().max_by_key(|info| info.slot) {
            Some(info) => {
                info!(program = %self.pipeline.program_name(), signature = %info.signature, slot = info.slot, "[Poll] Curseur ancré sur la dernière signature.");
                self.advance(&info);
            }
            None => info!(program = %self.pipeline.program_name(), "[Poll] Aucun historique, départ à vide."),
        }
        self.anchored = true;
        Ok(())
    }

    /// Signatures postérieures au curseur, de la plus ancienne à la plus récente.
    async fn new_signatures(&self) -> Result<Vec<SignatureInfo>, RpcError> {
        let settings = &self.pipeline.settings;
        let order = self.pipeline.client.signature_order();
        let until = self.cursor.as_ref().map(|c| c.signature);

        let mut collected: Vec<SignatureInfo> = Vec::new();
        let mut before = None;
        let mut reached_cursor = false;
        for _ in 0..settings.max_signature_pages {
            let query = SignatureQuery {
                before,
                until,
                limit: settings.signature_page_limit,
            };
            let mut page = self
                .pipeline
                .client
                .get_signatures_for_address(&self.pipeline.program.program_id, &query)
                .await?;
            if order == SignatureOrder::OldestFirst {
                page.reverse();
            }
            let full = page.len() >= settings.signature_page_limit;
            before = page.last().map(|info| info.signature);
            collected.extend(page);
            if !full {
                reached_cursor = true;
                break;
            }
        }
        if !reached_cursor {
            warn!(
                program = %self.pipeline.program_name(),
                pages = settings.max_signature_pages,
                collected = collected.len(),
                "[Poll] Limite de pages atteinte, des signatures plus anciennes seront sautées."
            );
        }

        collected.reverse();
        Ok(collected)
    }

    async fn tick(&mut self, cancel: &CancellationToken) {
        if !self.anchored {
            if let Err(e) = self.anchor().await {
                self.pipeline.stats.record_rpc_error();
                warn!(program = %self.pipeline.program_name(), error = %e, "[Poll] Ancrage impossible, nouvel essai au prochain tick.");
            }
            return;
        }

        let signatures = match self.new_signatures().await {
            Ok(signatures) => signatures,
            Err(e) => {
                self.pipeline.stats.record_rpc_error();
                warn!(program = %self.pipeline.program_name(), error = %e, "[Poll] Échec de la liste des signatures, curseur inchangé.");
                return;
            }
        };
        if signatures.is_empty() {
            return;
        }
        debug!(program = %self.pipeline.program_name(), count = signatures.len(), "[Poll] Nouvelles signatures.");

        // Le tri (échouée / déjà vue) se fait avant de lancer les fetchs :
        // le flux ne doit pas emprunter le pipeline, qui est muté pendant la livraison.
        let planned: Vec<(SignatureInfo, Option<SkipReason>)> = signatures
            .into_iter()
            .map(|info| {
                let skip = if info.failed {
                    Some(SkipReason::Failed)
                } else if self.pipeline.seen.seen(&info.signature) {
                    Some(SkipReason::Duplicate)
                } else {
                    None
                };
                (info, skip)
            })
            .collect();

        let client = self.pipeline.client.clone();
        let mut outcomes = stream::iter(planned)
            .map(move |(info, skip)| {
                let client = client.clone();
                async move {
                    let outcome = match skip {
                        Some(reason) => Outcome::Skipped(reason),
                        None => Outcome::Fetched(client.get_transaction(&info.signature).await),
                    };
                    (info, outcome)
                }
            })
            .buffered(self.pipeline.settings.fetch_concurrency.max(1));

        while let Some((info, outcome)) = outcomes.next().await {
            match outcome {
                Outcome::Skipped(reason) => {
                    debug!(program = %self.pipeline.program_name(), signature = %info.signature, reason = reason.as_str(), "[Poll] Signature ignorée.");
                }
                Outcome::Fetched(Ok(Some(tx))) => {
                    self.missing.remove(&info.signature);
                    self.pipeline.deliver_transaction(tx).await;
                }
                Outcome::Fetched(Ok(None)) => {
                    let tries = self.missing.entry(info.signature).or_insert(0);
                    *tries += 1;
                    if *tries < self.pipeline.settings.missing_tx_retries {
                        debug!(program = %self.pipeline.program_name(), signature = %info.signature, tries = *tries, "[Poll] Transaction pas encore disponible, nouvel essai au prochain tick.");
                        break;
                    }
                    warn!(program = %self.pipeline.program_name(), signature = %info.signature, tries = *tries, "[Poll] Transaction introuvable, abandon.");
                    self.missing.remove(&info.signature);
                }
                Outcome::Fetched(Err(e)) => {
                    self.pipeline.stats.record_rpc_error();
                    warn!(program = %self.pipeline.program_name(), signature = %info.signature, error = %e, "[Poll] Échec du fetch, curseur inchangé.");
                    break;
                }
            }
            self.advance(&info);
            if cancel.is_cancelled() {
                break;
            }
        }
    }

    fn advance(&mut self, info: &SignatureInfo) {
        let cursor = Cursor {
            signature: info.signature,
            slot: info.slot,
            updated_at: unix_now(),
        };
        self.pipeline.stats.observe_slot(info.slot);
        metrics::CURSOR_SLOT
            .with_label_values(&[self.pipeline.program_name()])
            .set(info.slot as i64);
        self.view.store(Some(Arc::new(cursor.clone())));
        self.cursor = Some(cursor);
        self.dirty = true;
    }

    async fn persist(&mut self) {
        if !self.dirty {
            return;
        }
        let (Some(store), Some(cursor)) = (&self.store, &self.cursor) else {
            self.dirty = false;
            return;
        };
        match store.save(&self.pipeline.program.name, cursor).await {
            Ok(()) => self.dirty = false,
            Err(e) => warn!(program = %self.pipeline.program_name(), error = %e, "[Poll] Sauvegarde du curseur impossible."),
        }
    }
}

#[async_trait]
impl IngestionStrategy for PollStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Poll
    }

    async fn run(&mut self, cancel: CancellationToken) {
        info!(
            program = %self.pipeline.program_name(),
            interval_ms = self.pipeline.settings.poll_interval.as_millis() as u64,
            resumed = self.cursor.is_some(),
            "[Poll] Surveillance démarrée."
        );
        let mut ticker = interval(self.pipeline.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.tick(&cancel).await;
            self.persist().await;
            if cancel.is_cancelled() {
                break;
            }
        }

        self.persist().await;
        info!(program = %self.pipeline.program_name(), "[Poll] Surveillance arrêtée.");
    }
}

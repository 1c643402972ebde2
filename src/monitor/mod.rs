// DANS : src/monitor/mod.rs

//! Le moniteur d'événements on-chain : une tâche par programme surveillé,
//! alimentée soit par un abonnement aux logs (push), soit par un polling
//! des signatures (poll), et qui livre des `DomainEvent` dédupliqués à un sink.

use arc_swap::ArcSwapOption;
use std::{sync::Arc, time::Duration};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    decoders::{MonitoredProgram, unix_now},
    error::{MonitorError, RpcError},
    rpc::LedgerClient,
    state::{Cursor, CursorStore},
};

pub mod backoff;
pub mod delivery;
mod pipeline;
mod poll;
mod push;
pub mod stats;
pub mod strategy;

pub use delivery::{EventSink, FnSink};
pub use stats::{MonitorSnapshot, MonitorStats};
pub use strategy::{IngestionStrategy, StrategyKind};

use pipeline::Pipeline;
use poll::PollStrategy;
use push::PushStrategy;

/// Réglages figés pour toute la durée de vie d'un handle.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub dedup_capacity: usize,
    /// Nombre total de tentatives de la poignée de main initiale dans `start`.
    pub connect_retries: u32,
    pub connect_retry_delay: Duration,
    pub reconnect_base: Duration,
    pub reconnect_cap: Duration,
    pub signature_page_limit: usize,
    pub max_signature_pages: usize,
    pub fetch_concurrency: usize,
    pub cursor_max_age: Duration,
    /// Ticks (poll) ou tentatives (push) accordés à une transaction pas encore indexée.
    pub missing_tx_retries: u32,
    pub missing_tx_delay: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            dedup_capacity: 5_000,
            connect_retries: 5,
            connect_retry_delay: Duration::from_secs(1),
            reconnect_base: Duration::from_secs(1),
            reconnect_cap: Duration::from_secs(30),
            signature_page_limit: 50,
            max_signature_pages: 10,
            fetch_concurrency: 3,
            cursor_max_age: Duration::from_secs(3_600),
            missing_tx_retries: 3,
            missing_tx_delay: Duration::from_millis(1_500),
        }
    }
}

impl MonitorSettings {
    pub fn validate(&self) -> Result<(), MonitorError> {
        let zero = |name: &str| Err(MonitorError::Configuration(format!("`{name}` doit être strictement positif")));
        if self.poll_interval.is_zero() {
            return zero("poll_interval");
        }
        if self.dedup_capacity == 0 {
            return zero("dedup_capacity");
        }
        if self.connect_retries == 0 {
            return zero("connect_retries");
        }
        if self.reconnect_base.is_zero() {
            return zero("reconnect_base");
        }
        if self.reconnect_cap < self.reconnect_base {
            return Err(MonitorError::Configuration(
                "`reconnect_cap` doit être supérieur ou égal à `reconnect_base`".to_string(),
            ));
        }
        if self.signature_page_limit == 0 {
            return zero("signature_page_limit");
        }
        if self.max_signature_pages == 0 {
            return zero("max_signature_pages");
        }
        if self.fetch_concurrency == 0 {
            return zero("fetch_concurrency");
        }
        if self.missing_tx_retries == 0 {
            return zero("missing_tx_retries");
        }
        Ok(())
    }
}

/// Point d'entrée : démarre un handle par (programme, stratégie).
/// Plusieurs handles peuvent partager le même client.
pub struct ChainEventMonitor {
    client: Arc<dyn LedgerClient>,
    settings: MonitorSettings,
    cursors: Option<Arc<CursorStore>>,
}

impl ChainEventMonitor {
    pub fn new(client: Arc<dyn LedgerClient>, settings: MonitorSettings) -> Self {
        Self {
            client,
            settings,
            cursors: None,
        }
    }

    /// Active la reprise du polling depuis un curseur persistant.
    pub fn with_cursor_store(mut self, store: Arc<CursorStore>) -> Self {
        self.cursors = Some(store);
        self
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Valide le descripteur, établit la connexion initiale (budget borné) puis
    /// lance la boucle d'ingestion. Seules les erreurs de configuration et
    /// l'échec de la connexion initiale remontent ici.
    pub async fn start(
        &self,
        program: MonitoredProgram,
        strategy: StrategyKind,
        sink: Arc<dyn EventSink>,
    ) -> Result<MonitorHandle, MonitorError> {
        program.validate()?;
        self.settings.validate()?;

        let program = Arc::new(program);
        let stats = Arc::new(MonitorStats::new(&program.name, strategy));
        let view = Arc::new(ArcSwapOption::<Cursor>::empty());
        let pipeline = Pipeline::new(
            self.client.clone(),
            program.clone(),
            sink,
            stats.clone(),
            self.settings.clone(),
        );

        let mut ingestion: Box<dyn IngestionStrategy> = match strategy {
            StrategyKind::Push => {
                let subscription = self
                    .connect(&program.name, || self.client.subscribe_logs(&program.program_id))
                    .await?;
                Box::new(PushStrategy::new(pipeline, subscription))
            }
            StrategyKind::Poll => {
                self.connect(&program.name, || self.client.ping()).await?;
                let initial = self.load_cursor(&program.name).await;
                Box::new(PollStrategy::new(pipeline, initial, view.clone(), self.cursors.clone()))
            }
        };

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            ingestion.run(token).await;
        });

        info!(program = %program.name, strategy = %strategy, program_id = %program.program_id, "[Monitor] Moniteur démarré.");
        Ok(MonitorHandle {
            program: program.name.clone(),
            strategy,
            cancel,
            task: Mutex::new(Some(task)),
            stats,
            cursor: CursorView(view),
        })
    }

    async fn connect<T, F, Fut>(&self, program: &str, mut attempt_once: F) -> Result<T, MonitorError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, RpcError>>,
    {
        let attempts = self.settings.connect_retries;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match attempt_once().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => {
                    error!(program, attempts, error = %e, "[Monitor] Connexion initiale impossible, abandon.");
                    return Err(MonitorError::Connectivity { attempts, source: e });
                }
                Err(e) => {
                    warn!(program, attempt, attempts, error = %e, "[Monitor] Connexion initiale échouée, nouvelle tentative.");
                    tokio::time::sleep(self.settings.connect_retry_delay).await;
                }
            }
        }
    }

    async fn load_cursor(&self, program: &str) -> Option<Cursor> {
        let store = self.cursors.as_ref()?;
        let cursor = store.get(program).await?;
        if cursor.is_stale(self.settings.cursor_max_age.as_secs(), unix_now()) {
            warn!(program, signature = %cursor.signature, updated_at = cursor.updated_at, "[Monitor] Curseur persistant trop ancien, ignoré.");
            if let Err(e) = store.remove(program).await {
                warn!(program, error = %e, "[Monitor] Suppression du curseur périmé impossible.");
            }
            return None;
        }
        info!(program, signature = %cursor.signature, slot = cursor.slot, "[Monitor] Reprise depuis le curseur persistant.");
        Some(cursor)
    }
}

/// Lecture sans verrou du curseur courant d'un moniteur poll.
#[derive(Debug, Clone)]
pub struct CursorView(Arc<ArcSwapOption<Cursor>>);

impl CursorView {
    pub fn get(&self) -> Option<Cursor> {
        self.0.load_full().map(|cursor| cursor.as_ref().clone())
    }
}

/// Handle d'un moniteur en cours. `stop` est idempotent ; le drop sans `stop`
/// annule la tâche sans attendre sa fin.
pub struct MonitorHandle {
    program: String,
    strategy: StrategyKind,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<MonitorStats>,
    cursor: CursorView,
}

impl MonitorHandle {
    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    /// Demande l'arrêt puis attend la fin de l'élément en cours. Au retour,
    /// plus aucun appel au sink n'aura lieu, y compris pour un appel
    /// concurrent à `stop`.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let mut task = self.task.lock().await;
        let Some(handle) = task.take() else {
            return;
        };
        match handle.await {
            Ok(()) => info!(program = %self.program, strategy = %self.strategy, "[Monitor] Moniteur arrêté."),
            Err(e) if e.is_panic() => error!(program = %self.program, "[Monitor] La tâche du moniteur a paniqué."),
            Err(e) => warn!(program = %self.program, error = %e, "[Monitor] Tâche du moniteur interrompue."),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cursor(&self) -> Option<Cursor> {
        self.cursor.get()
    }

    pub fn cursor_view(&self) -> CursorView {
        self.cursor.clone()
    }

    pub fn stats(&self) -> MonitorSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

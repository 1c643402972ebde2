// DANS : src/bin/pump_monitor.rs

use anyhow::{Context, Result};
use async_trait::async_trait;
use pump_monitor::{
    config::Config,
    data_pipeline::MetadataFetcher,
    decoders::pump::{fee_claim_programs, pump_launches},
    events::DomainEvent,
    filtering::{EventContext, Owner, WatchFilter, WatchRegistry, WatchScope},
    monitor::{ChainEventMonitor, EventSink, MonitorHandle},
    monitoring::{logging::setup_logging, metrics},
    rpc::{LedgerClient, ResilientRpcClient},
    state::CursorStore,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

const STATUS_INTERVAL: Duration = Duration::from_secs(60);
/// Propriétaire de la watch "flux des lancements" créée par le démon lui-même.
const DAEMON_OWNER: &str = "api:daemon";

/// Route chaque événement livré vers les watches concernées.
/// La mise en forme et l'envoi des messages sont faits par les services en aval.
struct NotificationSink {
    registry: Arc<WatchRegistry>,
    metadata: Arc<MetadataFetcher>,
}

#[async_trait]
impl EventSink for NotificationSink {
    async fn on_event(&self, event: DomainEvent) -> anyhow::Result<()> {
        let mut context = EventContext::default();
        if let DomainEvent::TokenLaunch(launch) = &event {
            match self.metadata.fetch(&launch.metadata_uri).await {
                Ok(metadata) => context.github_urls = metadata.github_urls,
                Err(e) => debug!(mint = %launch.mint, error = %e, "[Daemon] Métadonnées indisponibles."),
            }
        }

        let watches = self.registry.matching(&event, &context).await;
        match &event {
            DomainEvent::FeeClaim(claim) => info!(
                signature = %claim.signature,
                claimant = %claim.claimant,
                amount_sol = claim.amount_sol(),
                kind = claim.label.as_str(),
                watches = watches.len(),
                "[Daemon] Réclamation de frais détectée."
            ),
            DomainEvent::TokenLaunch(launch) => info!(
                signature = %launch.signature,
                mint = %launch.mint,
                symbol = launch.symbol.as_str(),
                github = context.github_urls.len(),
                watches = watches.len(),
                "[Daemon] Nouveau token lancé."
            ),
        }
        for watch in watches {
            info!(watch = %watch.id, owner = %watch.owner, signature = %event.signature(), "[Daemon] Notification à envoyer.");
        }
        Ok(())
    }
}

async fn ensure_launch_feed(registry: &WatchRegistry, github_only: bool) -> Result<()> {
    let owner: Owner = DAEMON_OWNER.parse().map_err(anyhow::Error::msg)?;
    let has_feed = registry
        .list(&owner)
        .await
        .iter()
        .any(|w| w.is_feed() && w.scope == WatchScope::TokenLaunches);
    if !has_feed {
        let filter = WatchFilter {
            github_only,
            ..WatchFilter::default()
        };
        registry
            .create(owner, Vec::new(), WatchScope::TokenLaunches, filter, Some("Flux des lancements".to_string()))
            .await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    setup_logging(config.log_json);
    info!(rpc = %config.solana_rpc_url, strategy = %config.monitor_strategy, "[Daemon] Démarrage du moniteur Pump.");

    let client = ResilientRpcClient::new(
        config.solana_rpc_url.clone(),
        config.ws_url(),
        config.rpc_max_retries,
        config.rpc_retry_delay_ms,
    )
    .with_queue_capacity(config.subscription_queue_capacity);
    let client: Arc<dyn LedgerClient> = Arc::new(client);

    let registry = Arc::new(
        WatchRegistry::open(&config.watch_store_path)
            .await
            .context("Ouverture du registre des watches")?,
    );
    let cursors = Arc::new(
        CursorStore::open(&config.cursor_store_path)
            .await
            .context("Ouverture du stockage des curseurs")?,
    );
    let metadata = Arc::new(MetadataFetcher::new(config.metadata_timeout(), config.ipfs_gateway())?);

    let monitor = ChainEventMonitor::new(client, config.settings()).with_cursor_store(cursors);
    let sink: Arc<dyn EventSink> = Arc::new(NotificationSink {
        registry: registry.clone(),
        metadata,
    });

    let mut programs = Vec::new();
    if config.enable_claim_monitor {
        programs.extend(fee_claim_programs());
    }
    if config.enable_launch_monitor {
        ensure_launch_feed(&registry, config.github_only_filter).await?;
        programs.push(pump_launches());
    }
    if programs.is_empty() {
        warn!("[Daemon] Aucun moniteur activé (ENABLE_CLAIM_MONITOR / ENABLE_LAUNCH_MONITOR).");
        return Ok(());
    }

    let mut handles: Vec<MonitorHandle> = Vec::new();
    for program in programs {
        let name = program.name.clone();
        let handle = monitor
            .start(program, config.monitor_strategy, sink.clone())
            .await
            .with_context(|| format!("Démarrage du moniteur `{name}`"))?;
        handles.push(handle);
    }
    info!(monitors = handles.len(), watches = registry.active_count().await, "[Daemon] Moniteurs en route.");

    let mut status = tokio::time::interval(STATUS_INTERVAL);
    status.tick().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = status.tick() => {
                for handle in &handles {
                    let snapshot = handle.stats();
                    info!(
                        program = %snapshot.program,
                        strategy = %snapshot.strategy,
                        events = snapshot.events,
                        decode_errors = snapshot.decode_errors,
                        rpc_errors = snapshot.rpc_errors,
                        reconnects = snapshot.reconnects,
                        last_slot = snapshot.last_slot,
                        cursor = ?handle.cursor().map(|c| c.signature.to_string()),
                        "[Daemon] Statut."
                    );
                }
                debug!(metrics = %metrics::render(), "[Daemon] Métriques.");
            }
        }
    }

    info!("[Daemon] Arrêt demandé, fermeture des moniteurs...");
    for handle in &handles {
        handle.stop().await;
    }
    info!("[Daemon] Arrêt terminé.");
    Ok(())
}

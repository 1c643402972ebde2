// DANS : src/monitor/strategy.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Choix de déploiement : un RPC capable de WebSocket (push) ou HTTP seul (poll).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Push,
    Poll,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Push => f.write_str("push"),
            StrategyKind::Poll => f.write_str("poll"),
        }
    }
}

/// Une boucle d'ingestion. `run` rend la main quand `cancel` est déclenché ;
/// le jeton n'est consulté qu'entre deux unités de travail (une notification,
/// un tick), jamais au milieu d'une livraison.
#[async_trait]
pub trait IngestionStrategy: Send {
    fn kind(&self) -> StrategyKind;

    async fn run(&mut self, cancel: CancellationToken);
}

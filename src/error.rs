// DANS : src/error.rs

use thiserror::Error;

use crate::decoders::InstructionKind;

/// Erreurs remontées de façon synchrone par `ChainEventMonitor::start`.
/// Tout le reste est retenté ou journalisé en interne.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("configuration invalide : {0}")]
    Configuration(String),

    #[error("connexion initiale impossible après {attempts} tentative(s) : {source}")]
    Connectivity {
        attempts: u32,
        #[source]
        source: RpcError,
    },
}

/// Échec transitoire d'un appel au nœud RPC. Jamais fatal une fois le moniteur démarré.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("la requête `{method}` a échoué : {message}")]
    Request { method: &'static str, message: String },

    #[error("abonnement aux logs impossible : {0}")]
    Subscription(String),

    #[error("réponse RPC inexploitable : {0}")]
    InvalidResponse(String),
}

/// Échec de décodage d'une instruction (ou d'une ligne `Program data:`) reconnue
/// par son discriminateur. N'affecte pas les instructions voisines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{kind:?} : données tronquées ({len} octets, {needed} requis)")]
    Truncated {
        kind: InstructionKind,
        needed: usize,
        len: usize,
    },

    #[error("{kind:?} : compte absent à la position {position}")]
    MissingAccount { kind: InstructionKind, position: usize },

    #[error("{kind:?} : pas de solde pour le compte d'index {account_index}")]
    MissingBalance {
        kind: InstructionKind,
        account_index: usize,
    },

    #[error("{kind:?} : chaîne `{field}` illisible")]
    InvalidString {
        kind: InstructionKind,
        field: &'static str,
    },

    #[error("{kind:?} : données d'événement invalides ({reason})")]
    InvalidEventData {
        kind: InstructionKind,
        reason: String,
    },
}

/// Échec du callback consommateur. Journalisé, puis le moniteur continue.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("le callback a renvoyé une erreur : {0:#}")]
    Failed(anyhow::Error),

    #[error("le callback a paniqué : {0}")]
    Panicked(String),
}

/// Erreurs des stockages JSON (registre des watches, curseurs).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("E/S sur `{path}` : {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON invalide dans `{path}` : {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("adresse cible invalide : {0}")]
    InvalidTarget(String),

    #[error("watch `{0}` introuvable pour ce propriétaire")]
    UnknownWatch(String),
}

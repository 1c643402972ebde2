// DANS : src/filtering/watch_registry.rs

//! Registre durable de "qui surveille quoi".
//!
//! Le moniteur émet tous les événements ; ce registre sert à ses
//! consommateurs pour décider à qui un événement importe. Le document JSON
//! est indexé par propriétaire et réécrit atomiquement à chaque mutation.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    path::PathBuf,
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
    time::SystemTime,
};
use tokio::sync::RwLock;
use tracing::info;

use crate::{
    error::StoreError,
    events::{DomainEvent, as_string},
    state::{atomic_write_json, read_json_or_default},
};

/// Propriétaire d'une watch : un chat Telegram ou une clé d'API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Owner {
    Chat(i64),
    ApiKey(String),
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Chat(id) => write!(f, "chat:{id}"),
            Owner::ApiKey(key) => write!(f, "api:{key}"),
        }
    }
}

impl FromStr for Owner {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(id) = s.strip_prefix("chat:") {
            return id.parse().map(Owner::Chat).map_err(|e| format!("`{s}` : {e}"));
        }
        match s.strip_prefix("api:") {
            Some(key) if !key.is_empty() => Ok(Owner::ApiKey(key.to_string())),
            _ => Err(format!("propriétaire inconnu `{s}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchScope {
    #[default]
    All,
    FeeClaims,
    TokenLaunches,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchFilter {
    /// Réclamations uniquement : montant minimum.
    pub min_amount_lamports: Option<u64>,
    /// Lancements uniquement : les métadonnées doivent contenir un lien GitHub.
    pub github_only: bool,
    /// Si non vide, seuls ces mints passent.
    pub token_mints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEntry {
    pub id: String,
    #[serde(with = "as_string")]
    pub owner: Owner,
    /// Adresses base58 normalisées. Vide : la watch suit tout le flux.
    pub targets: Vec<String>,
    #[serde(default)]
    pub scope: WatchScope,
    #[serde(default)]
    pub filter: WatchFilter,
    pub label: Option<String>,
    /// Millisecondes unix.
    pub created_at: u64,
    pub active: bool,
}

/// Informations calculées par le consommateur avant la mise en correspondance
/// (liens GitHub trouvés dans les métadonnées d'un lancement, par exemple).
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    pub github_urls: Vec<String>,
}

impl WatchEntry {
    pub fn is_feed(&self) -> bool {
        self.targets.is_empty()
    }

    /// La watch est-elle concernée par cet événement ?
    pub fn matches(&self, event: &DomainEvent, addresses: &HashSet<String>, ctx: &EventContext) -> bool {
        if !self.active {
            return false;
        }
        let in_scope = match (self.scope, event) {
            (WatchScope::All, _) => true,
            (WatchScope::FeeClaims, DomainEvent::FeeClaim(_)) => true,
            (WatchScope::TokenLaunches, DomainEvent::TokenLaunch(_)) => true,
            _ => false,
        };
        if !in_scope {
            return false;
        }
        if !self.is_feed() && !self.targets.iter().any(|t| addresses.contains(t)) {
            return false;
        }

        match event {
            DomainEvent::FeeClaim(claim) => {
                if self
                    .filter
                    .min_amount_lamports
                    .is_some_and(|min| claim.amount_lamports < min)
                {
                    return false;
                }
                self.filter.token_mints.is_empty()
                    || claim
                        .token_mint
                        .is_some_and(|mint| self.filter.token_mints.contains(&mint.to_string()))
            }
            DomainEvent::TokenLaunch(launch) => {
                if self.filter.github_only && ctx.github_urls.is_empty() {
                    return false;
                }
                self.filter.token_mints.is_empty() || self.filter.token_mints.contains(&launch.mint.to_string())
            }
        }
    }
}

type Document = BTreeMap<String, Vec<WatchEntry>>;

pub struct WatchRegistry {
    path: PathBuf,
    watches: RwLock<Document>,
    next_id: AtomicU64,
}

impl WatchRegistry {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let watches: Document = read_json_or_default(&path).await?;
        let count: usize = watches.values().map(Vec::len).sum();
        info!(path = %path.display(), owners = watches.len(), count, "[Watches] Registre chargé.");
        Ok(Self {
            path,
            watches: RwLock::new(watches),
            next_id: AtomicU64::new(unix_millis()),
        })
    }

    /// Crée une watch. Les cibles et les mints doivent être des adresses valides.
    pub async fn create(
        &self,
        owner: Owner,
        targets: Vec<String>,
        scope: WatchScope,
        mut filter: WatchFilter,
        label: Option<String>,
    ) -> Result<WatchEntry, StoreError> {
        let targets = normalize_addresses(targets)?;
        filter.token_mints = normalize_addresses(filter.token_mints)?;

        let entry = WatchEntry {
            id: format!("w_{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1),
            owner: owner.clone(),
            targets,
            scope,
            filter,
            label: label.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
            created_at: unix_millis(),
            active: true,
        };

        let mut watches = self.watches.write().await;
        let mut next = watches.clone();
        next.entry(owner.to_string()).or_default().push(entry.clone());
        atomic_write_json(&self.path, &next).await?;
        *watches = next;
        info!(id = %entry.id, owner = %owner, targets = entry.targets.len(), "[Watches] Watch ajoutée.");
        Ok(entry)
    }

    /// Watches actives du propriétaire, dans l'ordre de création.
    pub async fn list(&self, owner: &Owner) -> Vec<WatchEntry> {
        self.watches
            .read()
            .await
            .get(&owner.to_string())
            .map(|entries| entries.iter().filter(|w| w.active).cloned().collect())
            .unwrap_or_default()
    }

    /// Supprime la watch `id` si elle appartient à `owner`.
    pub async fn delete(&self, owner: &Owner, id: &str) -> Result<WatchEntry, StoreError> {
        let key = owner.to_string();
        let mut watches = self.watches.write().await;
        // La copie n'est publiée qu'une fois écrite sur disque.
        let mut next = watches.clone();
        let entries = next
            .get_mut(&key)
            .ok_or_else(|| StoreError::UnknownWatch(id.to_string()))?;
        let position = entries
            .iter()
            .position(|w| w.id == id)
            .ok_or_else(|| StoreError::UnknownWatch(id.to_string()))?;
        let removed = entries.remove(position);
        if entries.is_empty() {
            next.remove(&key);
        }
        atomic_write_json(&self.path, &next).await?;
        *watches = next;
        info!(id, owner = %owner, "[Watches] Watch supprimée.");
        Ok(removed)
    }

    /// Supprime la première watch du propriétaire qui cible `address`.
    pub async fn delete_by_target(&self, owner: &Owner, address: &str) -> Result<WatchEntry, StoreError> {
        let wanted = normalize_address(address)?;
        let id = self
            .list(owner)
            .await
            .into_iter()
            .find(|w| w.targets.contains(&wanted))
            .map(|w| w.id)
            .ok_or_else(|| StoreError::UnknownWatch(wanted.clone()))?;
        self.delete(owner, &id).await
    }

    /// Watches actives concernées par l'événement, tous propriétaires confondus.
    pub async fn matching(&self, event: &DomainEvent, ctx: &EventContext) -> Vec<WatchEntry> {
        let addresses: HashSet<String> = event.addresses().iter().map(Pubkey::to_string).collect();
        self.watches
            .read()
            .await
            .values()
            .flatten()
            .filter(|w| w.matches(event, &addresses, ctx))
            .cloned()
            .collect()
    }

    pub async fn active_count(&self) -> usize {
        self.watches.read().await.values().flatten().filter(|w| w.active).count()
    }
}

fn normalize_address(raw: &str) -> Result<String, StoreError> {
    let trimmed = raw.trim();
    Pubkey::from_str(trimmed)
        .map(|key| key.to_string())
        .map_err(|_| StoreError::InvalidTarget(trimmed.to_string()))
}

fn normalize_addresses(raw: Vec<String>) -> Result<Vec<String>, StoreError> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for address in raw {
        let normalized = normalize_address(&address)?;
        if !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    Ok(out)
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

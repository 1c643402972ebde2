// DANS : src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

use crate::{
    error::MonitorError,
    monitor::{MonitorSettings, StrategyKind},
};

/// Configuration du démon, lue depuis l'environnement (et `.env` s'il existe).
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_rpc_url")]
    pub solana_rpc_url: String,
    /// Dérivée de l'URL RPC si absente.
    pub solana_ws_url: Option<String>,
    #[serde(default = "default_strategy")]
    pub monitor_strategy: StrategyKind,

    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    #[serde(default = "default_connect_retry_delay_ms")]
    pub connect_retry_delay_ms: u64,
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_cap_ms: u64,
    #[serde(default = "default_rpc_max_retries")]
    pub rpc_max_retries: u8,
    #[serde(default = "default_rpc_retry_delay_ms")]
    pub rpc_retry_delay_ms: u64,
    #[serde(default = "default_signature_page_limit")]
    pub signature_page_limit: usize,
    #[serde(default = "default_max_signature_pages")]
    pub max_signature_pages: usize,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_subscription_queue_capacity")]
    pub subscription_queue_capacity: usize,
    #[serde(default = "default_cursor_max_age_seconds")]
    pub cursor_max_age_seconds: u64,

    #[serde(default = "default_cursor_store_path")]
    pub cursor_store_path: PathBuf,
    #[serde(default = "default_watch_store_path")]
    pub watch_store_path: PathBuf,

    #[serde(default = "default_true")]
    pub enable_claim_monitor: bool,
    #[serde(default)]
    pub enable_launch_monitor: bool,
    #[serde(default)]
    pub github_only_filter: bool,

    #[serde(default = "default_metadata_timeout_ms")]
    pub metadata_timeout_ms: u64,
    #[serde(default = "default_ipfs_gateway")]
    pub ipfs_gateway: String,

    #[serde(default = "default_true")]
    pub log_json: bool,
}

fn default_rpc_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}
fn default_strategy() -> StrategyKind {
    StrategyKind::Push
}
fn default_poll_interval_seconds() -> u64 {
    15
}
fn default_dedup_capacity() -> usize {
    5_000
}
fn default_connect_retries() -> u32 {
    5
}
fn default_connect_retry_delay_ms() -> u64 {
    1_000
}
fn default_reconnect_base_ms() -> u64 {
    1_000
}
fn default_reconnect_cap_ms() -> u64 {
    30_000
}
fn default_rpc_max_retries() -> u8 {
    2
}
fn default_rpc_retry_delay_ms() -> u64 {
    2_000
}
fn default_signature_page_limit() -> usize {
    50
}
fn default_max_signature_pages() -> usize {
    10
}
fn default_fetch_concurrency() -> usize {
    3
}
fn default_subscription_queue_capacity() -> usize {
    200
}
fn default_cursor_max_age_seconds() -> u64 {
    3_600
}
fn default_cursor_store_path() -> PathBuf {
    PathBuf::from("data/cursors.json")
}
fn default_watch_store_path() -> PathBuf {
    PathBuf::from("data/watches.json")
}
fn default_metadata_timeout_ms() -> u64 {
    5_000
}
fn default_ipfs_gateway() -> String {
    "https://cf-ipfs.com/ipfs/".to_string()
}
fn default_true() -> bool {
    true
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>().context("Lecture de la configuration depuis l'environnement")?;
        config.validate().context("Configuration rejetée")?;
        Ok(config)
    }

    /// URL WebSocket explicite, sinon dérivée de l'URL HTTP (`http` → `ws`, `https` → `wss`).
    pub fn ws_url(&self) -> String {
        if let Some(url) = &self.solana_ws_url {
            return url.clone();
        }
        if let Some(rest) = self.solana_rpc_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.solana_rpc_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.solana_rpc_url.clone()
        }
    }

    /// Passerelle IPFS, toujours terminée par `/`.
    pub fn ipfs_gateway(&self) -> String {
        if self.ipfs_gateway.ends_with('/') {
            self.ipfs_gateway.clone()
        } else {
            format!("{}/", self.ipfs_gateway)
        }
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if !(self.solana_rpc_url.starts_with("http://") || self.solana_rpc_url.starts_with("https://")) {
            return Err(MonitorError::Configuration(format!(
                "SOLANA_RPC_URL doit être une URL http(s) : `{}`",
                self.solana_rpc_url
            )));
        }
        let ws = self.ws_url();
        if !(ws.starts_with("ws://") || ws.starts_with("wss://")) {
            return Err(MonitorError::Configuration(format!(
                "SOLANA_WS_URL doit être une URL ws(s) : `{ws}`"
            )));
        }
        if self.subscription_queue_capacity == 0 {
            return Err(MonitorError::Configuration(
                "SUBSCRIPTION_QUEUE_CAPACITY doit être strictement positif".to_string(),
            ));
        }
        if self.metadata_timeout_ms == 0 {
            return Err(MonitorError::Configuration(
                "METADATA_TIMEOUT_MS doit être strictement positif".to_string(),
            ));
        }
        self.settings().validate()
    }

    pub fn settings(&self) -> MonitorSettings {
        MonitorSettings {
            poll_interval: Duration::from_secs(self.poll_interval_seconds),
            dedup_capacity: self.dedup_capacity,
            connect_retries: self.connect_retries,
            connect_retry_delay: Duration::from_millis(self.connect_retry_delay_ms),
            reconnect_base: Duration::from_millis(self.reconnect_base_ms),
            reconnect_cap: Duration::from_millis(self.reconnect_cap_ms),
            signature_page_limit: self.signature_page_limit,
            max_signature_pages: self.max_signature_pages,
            fetch_concurrency: self.fetch_concurrency,
            cursor_max_age: Duration::from_secs(self.cursor_max_age_seconds),
            ..MonitorSettings::default()
        }
    }
}

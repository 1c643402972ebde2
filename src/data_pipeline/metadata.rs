// DANS : src/data_pipeline/metadata.rs

use anyhow::{Context, Result, anyhow};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::time::Duration;

lazy_static! {
    static ref GITHUB_URL: Regex =
        Regex::new(r#"(?i)https?://(www\.)?github\.com/[^\s"'<>)]+"#).unwrap();
}

/// Profondeur maximale explorée dans le document de métadonnées.
const MAX_SCAN_DEPTH: usize = 4;

/// Métadonnées d'un token lancé, telles que publiées à son `metadata_uri`.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenMetadata {
    pub uri: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub twitter: Option<String>,
    pub telegram: Option<String>,
    pub github_urls: Vec<String>,
    pub raw: Value,
}

impl TokenMetadata {
    pub fn from_json(uri: &str, raw: Value) -> Self {
        let field = |name: &str| raw.get(name).and_then(Value::as_str).map(str::to_string);
        Self {
            uri: uri.to_string(),
            description: field("description"),
            website: field("website"),
            twitter: field("twitter"),
            telegram: field("telegram"),
            github_urls: extract_github_urls(&raw),
            raw,
        }
    }

    pub fn has_github(&self) -> bool {
        !self.github_urls.is_empty()
    }
}

pub struct MetadataFetcher {
    client: reqwest::Client,
    ipfs_gateway: String,
}

impl MetadataFetcher {
    /// `ipfs_gateway` doit se terminer par `/` (garanti par `Config::ipfs_gateway`).
    pub fn new(timeout: Duration, ipfs_gateway: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Construction du client HTTP des métadonnées")?;
        Ok(Self {
            client,
            ipfs_gateway: ipfs_gateway.into(),
        })
    }

    /// Réécrit `ipfs://<cid>` vers la passerelle HTTP configurée.
    pub fn resolve(&self, uri: &str) -> String {
        match uri.strip_prefix("ipfs://") {
            Some(path) => format!("{}{}", self.ipfs_gateway, path.trim_start_matches("ipfs/")),
            None => uri.to_string(),
        }
    }

    pub async fn fetch(&self, uri: &str) -> Result<TokenMetadata> {
        let url = self.resolve(uri);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Erreur HTTP {} sur les métadonnées {}", response.status(), url));
        }

        let raw: Value = response
            .json()
            .await
            .with_context(|| format!("Métadonnées JSON illisibles à {url}"))?;
        Ok(TokenMetadata::from_json(uri, raw))
    }
}

/// Toutes les URLs GitHub présentes dans les chaînes du document, dédupliquées,
/// dans l'ordre de rencontre.
pub fn extract_github_urls(value: &Value) -> Vec<String> {
    let mut urls = Vec::new();
    scan(value, 0, &mut urls);
    urls
}

fn scan(value: &Value, depth: usize, urls: &mut Vec<String>) {
    if depth > MAX_SCAN_DEPTH {
        return;
    }
    match value {
        Value::String(text) => {
            for found in GITHUB_URL.find_iter(text) {
                let url = found.as_str().to_string();
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| scan(item, depth + 1, urls)),
        Value::Object(fields) => fields.values().for_each(|field| scan(field, depth + 1, urls)),
        _ => {}
    }
}

// DANS : src/state/cursor_store.rs

use serde::{Deserialize, Serialize};
use solana_sdk::signature::Signature;
use std::{collections::BTreeMap, path::PathBuf};
use tokio::sync::Mutex;
use tracing::info;

use super::{atomic_write_json, read_json_or_default};
use crate::{error::StoreError, events::as_string};

/// Position du polling : la signature la plus récente déjà traitée.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(with = "as_string")]
    pub signature: Signature,
    pub slot: u64,
    /// Secondes unix de la dernière avancée.
    pub updated_at: i64,
}

impl Cursor {
    pub fn is_stale(&self, max_age_secs: u64, now: i64) -> bool {
        now.saturating_sub(self.updated_at) > max_age_secs as i64
    }
}

/// Curseurs persistés, un par programme surveillé (clé : `MonitoredProgram::name`).
pub struct CursorStore {
    path: PathBuf,
    cursors: Mutex<BTreeMap<String, Cursor>>,
}

impl CursorStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let cursors: BTreeMap<String, Cursor> = read_json_or_default(&path).await?;
        info!(path = %path.display(), count = cursors.len(), "[Cursor] Curseurs chargés.");
        Ok(Self {
            path,
            cursors: Mutex::new(cursors),
        })
    }

    pub async fn get(&self, program: &str) -> Option<Cursor> {
        self.cursors.lock().await.get(program).cloned()
    }

    /// Enregistre et persiste. Sans écriture si le curseur n'a pas bougé.
    pub async fn save(&self, program: &str, cursor: &Cursor) -> Result<(), StoreError> {
        let mut cursors = self.cursors.lock().await;
        if cursors.get(program) == Some(cursor) {
            return Ok(());
        }
        cursors.insert(program.to_string(), cursor.clone());
        atomic_write_json(&self.path, &*cursors).await
    }

    pub async fn remove(&self, program: &str) -> Result<(), StoreError> {
        let mut cursors = self.cursors.lock().await;
        if cursors.remove(program).is_some() {
            atomic_write_json(&self.path, &*cursors).await?;
        }
        Ok(())
    }
}

// DANS : src/state/mod.rs

//! État durable du moniteur : curseurs de polling et écriture atomique des documents JSON.

use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::StoreError;

pub mod cursor_store;

pub use cursor_store::{Cursor, CursorStore};

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Écrit `value` dans un fichier temporaire puis le renomme sur `path` :
/// un crash en cours d'écriture laisse l'ancienne version intacte.
pub async fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let encoded = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        path: path.display().to_string(),
        source,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_error(parent))?;
    }

    let temp = temp_path(path);
    let mut file = tokio::fs::File::create(&temp).await.map_err(io_error(&temp))?;
    file.write_all(&encoded).await.map_err(io_error(&temp))?;
    // Sur disque avant le rename, sinon une coupure de courant peut laisser un document vide.
    file.sync_all().await.map_err(io_error(&temp))?;
    drop(file);
    tokio::fs::rename(&temp, path).await.map_err(io_error(path))?;
    Ok(())
}

/// Lit un document JSON ; un fichier absent donne la valeur par défaut.
pub async fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(source) => Err(StoreError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn write_then_read_creates_parent_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        let mut doc = BTreeMap::new();
        doc.insert("a".to_string(), 1u32);

        atomic_write_json(&path, &doc).await.unwrap();
        let back: BTreeMap<String, u32> = read_json_or_default(&path).await.unwrap();
        assert_eq!(back, doc);
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn rewrite_replaces_the_whole_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let big: BTreeMap<String, u32> = (0..50).map(|i| (format!("k{i}"), i)).collect();
        atomic_write_json(&path, &big).await.unwrap();

        let small: BTreeMap<String, u32> = BTreeMap::from([("seul".to_string(), 1)]);
        atomic_write_json(&path, &small).await.unwrap();

        let on_disk = tokio::fs::read(&path).await.unwrap();
        assert_eq!(serde_json::from_slice::<BTreeMap<String, u32>>(&on_disk).unwrap(), small);
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn missing_file_reads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let back: BTreeMap<String, u32> = read_json_or_default(&dir.path().join("absent.json")).await.unwrap();
        assert!(back.is_empty());
    }

    #[tokio::test]
    async fn corrupt_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();
        let result: Result<BTreeMap<String, u32>, _> = read_json_or_default(&path).await;
        assert!(matches!(result, Err(StoreError::Json { .. })));
    }
}

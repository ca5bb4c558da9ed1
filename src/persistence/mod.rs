//! Store of named snapshots keyed by (process id, optional tag). Two
//! implementations, mirroring the teacher's `Checkpointer` trait and its
//! `InMemoryCheckpointer`/SQLite pair: an in-memory map for tests, and a
//! filesystem-backed variant using a binary bundle encoding.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::savable::Bundle;

#[derive(Debug, Error, Diagnostic)]
pub enum PersisterError {
    #[error("no checkpoint found for pid {pid}{}", tag.as_ref().map(|t| format!(" tag `{t}`")).unwrap_or_default())]
    #[diagnostic(
        code(workloom::persistence::checkpoint_missing),
        help("Did you mean to call save_checkpoint before load_checkpoint?")
    )]
    CheckpointMissing { pid: Uuid, tag: Option<String> },

    #[error("persistence backend error: {message}")]
    #[diagnostic(code(workloom::persistence::backend))]
    Backend { message: String },

    #[error(transparent)]
    #[diagnostic(code(workloom::persistence::io))]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(workloom::persistence::codec))]
    Codec(#[from] serde_json::Error),
}

/// Key a checkpoint is stored under. An untagged checkpoint (`tag: None`)
/// is canonical; a process may have several tagged checkpoints besides it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CheckpointKey {
    pub pid: Uuid,
    pub tag: Option<String>,
}

impl CheckpointKey {
    pub fn new(pid: Uuid, tag: Option<String>) -> Self {
        Self { pid, tag }
    }
}

#[async_trait]
pub trait Persister: Send + Sync {
    async fn save_checkpoint(&self, pid: Uuid, tag: Option<&str>, bundle: Bundle) -> Result<(), PersisterError>;
    async fn load_checkpoint(&self, pid: Uuid, tag: Option<&str>) -> Result<Bundle, PersisterError>;
    async fn list_checkpoints(&self) -> Vec<CheckpointKey>;
    async fn list_process_checkpoints(&self, pid: Uuid) -> Vec<CheckpointKey>;
    async fn delete_checkpoint(&self, pid: Uuid, tag: Option<&str>) -> Result<(), PersisterError>;
    async fn delete_process_checkpoints(&self, pid: Uuid) -> Result<(), PersisterError>;
}

/// In-memory store, for tests and single-process hosts.
#[derive(Default)]
pub struct InMemoryPersister {
    checkpoints: RwLock<FxHashMap<CheckpointKey, Bundle>>,
}

impl InMemoryPersister {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persister for InMemoryPersister {
    #[instrument(skip(self, bundle))]
    async fn save_checkpoint(&self, pid: Uuid, tag: Option<&str>, bundle: Bundle) -> Result<(), PersisterError> {
        self.checkpoints
            .write()
            .insert(CheckpointKey::new(pid, tag.map(str::to_string)), bundle);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_checkpoint(&self, pid: Uuid, tag: Option<&str>) -> Result<Bundle, PersisterError> {
        self.checkpoints
            .read()
            .get(&CheckpointKey::new(pid, tag.map(str::to_string)))
            .cloned()
            .ok_or(PersisterError::CheckpointMissing {
                pid,
                tag: tag.map(str::to_string),
            })
    }

    async fn list_checkpoints(&self) -> Vec<CheckpointKey> {
        self.checkpoints.read().keys().cloned().collect()
    }

    async fn list_process_checkpoints(&self, pid: Uuid) -> Vec<CheckpointKey> {
        self.checkpoints
            .read()
            .keys()
            .filter(|k| k.pid == pid)
            .cloned()
            .collect()
    }

    async fn delete_checkpoint(&self, pid: Uuid, tag: Option<&str>) -> Result<(), PersisterError> {
        self.checkpoints
            .write()
            .remove(&CheckpointKey::new(pid, tag.map(str::to_string)));
        Ok(())
    }

    async fn delete_process_checkpoints(&self, pid: Uuid) -> Result<(), PersisterError> {
        self.checkpoints.write().retain(|k, _| k.pid != pid);
        Ok(())
    }
}

/// Filesystem-backed store: each checkpoint is a bundle encoded with
/// `serde_json` (a `Bundle` is arbitrary JSON-shaped data via `BundleValue`'s
/// scalars, which rules out a non-self-describing codec like `bincode` —
/// deserializing a `serde_json::Value` needs `deserialize_any`, which
/// `bincode`'s deserializer does not support) and named
/// `<pid>[.<tag>].bundle` under a host-chosen directory.
pub struct FilePersister {
    dir: PathBuf,
}

impl FilePersister {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, pid: Uuid, tag: Option<&str>) -> PathBuf {
        let file_name = match tag {
            Some(tag) => format!("{pid}.{tag}.bundle"),
            None => format!("{pid}.bundle"),
        };
        self.dir.join(file_name)
    }

    fn key_from_path(path: &Path) -> Option<CheckpointKey> {
        let stem = path.file_stem()?.to_str()?;
        let mut parts = stem.splitn(2, '.');
        let pid = Uuid::parse_str(parts.next()?).ok()?;
        let tag = parts.next().map(str::to_string);
        Some(CheckpointKey::new(pid, tag))
    }
}

#[async_trait]
impl Persister for FilePersister {
    #[instrument(skip(self, bundle))]
    async fn save_checkpoint(&self, pid: Uuid, tag: Option<&str>, bundle: Bundle) -> Result<(), PersisterError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(pid, tag);
        let bytes = serde_json::to_vec(&bundle).map_err(PersisterError::Codec)?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_checkpoint(&self, pid: Uuid, tag: Option<&str>) -> Result<Bundle, PersisterError> {
        let path = self.path_for(pid, tag);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| PersisterError::CheckpointMissing {
                pid,
                tag: tag.map(str::to_string),
            })?;
        serde_json::from_slice(&bytes).map_err(PersisterError::Codec)
    }

    async fn list_checkpoints(&self) -> Vec<CheckpointKey> {
        let mut out = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return out;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Some(key) = Self::key_from_path(&entry.path()) {
                out.push(key);
            }
        }
        out
    }

    async fn list_process_checkpoints(&self, pid: Uuid) -> Vec<CheckpointKey> {
        self.list_checkpoints()
            .await
            .into_iter()
            .filter(|k| k.pid == pid)
            .collect()
    }

    async fn delete_checkpoint(&self, pid: Uuid, tag: Option<&str>) -> Result<(), PersisterError> {
        let path = self.path_for(pid, tag);
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_process_checkpoints(&self, pid: Uuid) -> Result<(), PersisterError> {
        for key in self.list_process_checkpoints(pid).await {
            self.delete_checkpoint(pid, key.tag.as_deref()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::savable::Bundle;

    #[tokio::test]
    async fn in_memory_round_trips_a_checkpoint() {
        let persister = InMemoryPersister::new();
        let pid = Uuid::new_v4();
        let bundle = Bundle::new().with_class_name("workloom.process");
        persister.save_checkpoint(pid, None, bundle).await.unwrap();
        let loaded = persister.load_checkpoint(pid, None).await.unwrap();
        assert_eq!(loaded.meta().class_name.as_deref(), Some("workloom.process"));
    }

    #[tokio::test]
    async fn missing_checkpoint_is_an_error() {
        let persister = InMemoryPersister::new();
        let err = persister.load_checkpoint(Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(err, PersisterError::CheckpointMissing { .. }));
    }

    #[tokio::test]
    async fn file_persister_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let persister = FilePersister::new(dir.path());
        let pid = Uuid::new_v4();
        let mut bundle = Bundle::new().with_class_name("workloom.process");
        bundle.insert("_pid", serde_json::Value::String(pid.to_string()));
        persister.save_checkpoint(pid, Some("pre-wait"), bundle).await.unwrap();
        let loaded = persister.load_checkpoint(pid, Some("pre-wait")).await.unwrap();
        assert_eq!(loaded.meta().class_name.as_deref(), Some("workloom.process"));
        let keys = persister.list_process_checkpoints(pid).await;
        assert_eq!(keys.len(), 1);
        persister.delete_process_checkpoints(pid).await.unwrap();
        assert!(persister.list_process_checkpoints(pid).await.is_empty());
    }
}

//! Ambient configuration: runtime defaults, environment overrides via
//! `dotenvy`, and the tracing/miette initialization every binary built on
//! this crate should call once at startup.

use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::object_loader::{DefaultLoader, ObjectLoader};
use std::sync::Arc;

/// Which [`crate::persistence::Persister`] backend a host defaults to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersisterKind {
    InMemory,
    File,
}

/// Process-host-wide defaults: persistence backend, object loader, and a
/// session identifier threaded into log spans.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub session_id: String,
    pub persister: PersisterKind,
    pub checkpoint_dir: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            persister: PersisterKind::InMemory,
            checkpoint_dir: Self::resolve_checkpoint_dir(None),
        }
    }
}

impl RuntimeConfig {
    fn resolve_checkpoint_dir(provided: Option<String>) -> Option<String> {
        if provided.is_some() {
            return provided;
        }
        dotenvy::dotenv().ok();
        std::env::var("WORKLOOM_CHECKPOINT_DIR").ok()
    }

    pub fn new(session_id: Option<String>, persister: PersisterKind, checkpoint_dir: Option<String>) -> Self {
        Self {
            session_id: session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            persister,
            checkpoint_dir: Self::resolve_checkpoint_dir(checkpoint_dir),
        }
    }

    #[must_use]
    pub fn with_file_persister(mut self, dir: impl Into<String>) -> Self {
        self.persister = PersisterKind::File;
        self.checkpoint_dir = Some(dir.into());
        self
    }

    /// Builds the persister this configuration names. Panics only if a
    /// `File` persister is requested with no directory configured — a host
    /// construction error, not a runtime one.
    pub fn build_persister(&self) -> Arc<dyn crate::persistence::Persister> {
        match self.persister {
            PersisterKind::InMemory => Arc::new(crate::persistence::InMemoryPersister::new()),
            PersisterKind::File => {
                let dir = self
                    .checkpoint_dir
                    .clone()
                    .expect("File persister requires WORKLOOM_CHECKPOINT_DIR or an explicit directory");
                Arc::new(crate::persistence::FilePersister::new(dir))
            }
        }
    }

    pub fn build_object_loader(&self) -> Arc<dyn ObjectLoader> {
        Arc::new(DefaultLoader::new())
    }
}

/// Installs the process-wide `tracing` subscriber and the `miette` fancy
/// panic hook. Call once, near the start of `main`.
///
/// Mirrors the teacher's own example binaries: an `EnvFilter` read from
/// `RUST_LOG`, falling back to a quiet default, span open/close events so
/// instrumented async boundaries are visible, and `tracing-error` wired in
/// so `miette` reports can walk the active span trace.
pub fn init_tracing() {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error,workloom=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();

    miette::set_panic_hook();
    info!("workloom tracing initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_runtime_config_uses_in_memory_persister() {
        let config = RuntimeConfig::default();
        assert_eq!(config.persister, PersisterKind::InMemory);
    }

    #[test]
    fn with_file_persister_sets_checkpoint_dir() {
        let config = RuntimeConfig::default().with_file_persister("/tmp/workloom-checkpoints");
        assert_eq!(config.persister, PersisterKind::File);
        assert_eq!(config.checkpoint_dir.as_deref(), Some("/tmp/workloom-checkpoints"));
    }
}

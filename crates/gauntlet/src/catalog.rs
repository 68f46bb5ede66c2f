//! The arena catalogue: every arena's configuration, persisted as one
//! document.
//!
//! Loaded once at startup. After that the heartbeat hands a fresh copy to
//! [`CatalogWriter`] on every create or delete, and a background task
//! writes it out. Bursts of changes collapse into one write of the latest
//! copy.

use std::io;
use std::path::{Path, PathBuf};

use gauntlet_arena::ArenaConfig;
use gauntlet_protocol::{Codec, JsonCodec, ProtocolError};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::GauntletError;

/// The on-disk catalogue document.
///
/// ```json
/// { "arenas": [ { "key": "sky", "display_name": "Sky Islands", ... } ] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub arenas: Vec<ArenaConfig>,
}

impl CatalogFile {
    pub fn new(arenas: Vec<ArenaConfig>) -> Self {
        Self { arenas }
    }

    /// Rejects documents with blank or repeated keys.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidDocument`] naming the first bad key.
    pub fn check(&self) -> Result<(), ProtocolError> {
        let mut seen = std::collections::HashSet::new();
        for arena in &self.arenas {
            if arena.key.is_empty() {
                return Err(ProtocolError::InvalidDocument("arena with empty key".into()));
            }
            if !seen.insert(&arena.key) {
                return Err(ProtocolError::InvalidDocument(format!(
                    "arena {} listed twice",
                    arena.key
                )));
            }
        }
        Ok(())
    }
}

/// A catalogue stored as a JSON file.
#[derive(Debug, Clone)]
pub struct JsonCatalog {
    path: PathBuf,
    codec: JsonCodec,
}

impl JsonCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            codec: JsonCodec,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the catalogue. A missing file is an empty catalogue.
    ///
    /// # Errors
    /// I/O failures other than not-found, malformed JSON, or a document
    /// that fails [`CatalogFile::check`].
    pub async fn load(&self) -> Result<CatalogFile, GauntletError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no arena catalogue yet, starting empty");
                return Ok(CatalogFile::default());
            }
            Err(err) => return Err(err.into()),
        };
        let file: CatalogFile = self.codec.decode(&bytes)?;
        file.check()?;
        info!(path = %self.path.display(), arenas = file.arenas.len(), "arena catalogue loaded");
        Ok(file)
    }

    /// Writes the catalogue through a temporary file and a rename, so a
    /// crash mid-write leaves the previous version in place.
    ///
    /// # Errors
    /// Encoding or I/O failures.
    pub async fn save(&self, file: &CatalogFile) -> Result<(), GauntletError> {
        let bytes = self.codec.encode(file)?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), arenas = file.arenas.len(), "arena catalogue written");
        Ok(())
    }
}

/// Queues catalogue writes for the background task. Never blocks.
#[derive(Debug, Clone)]
pub struct CatalogWriter {
    tx: mpsc::UnboundedSender<CatalogFile>,
}

impl CatalogWriter {
    pub fn submit(&self, file: CatalogFile) {
        if self.tx.send(file).is_err() {
            error!("catalogue writer has stopped, change not persisted");
        }
    }
}

/// Spawns the task that writes submitted catalogues to `catalog`.
///
/// The task ends when every [`CatalogWriter`] is dropped, after writing
/// the last submitted copy.
pub fn spawn_catalog_writer(catalog: JsonCatalog) -> (CatalogWriter, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<CatalogFile>();
    let task = tokio::spawn(async move {
        while let Some(mut latest) = rx.recv().await {
            while let Ok(newer) = rx.try_recv() {
                latest = newer;
            }
            if let Err(err) = catalog.save(&latest).await {
                error!(path = %catalog.path().display(), error = %err, "could not write arena catalogue");
            }
        }
        debug!("catalogue writer stopped");
    });
    (CatalogWriter { tx }, task)
}

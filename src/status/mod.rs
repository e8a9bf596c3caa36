//! Process status snapshot and its persistence.
//!
//! # Responsibilities
//! - Hold a process-wide key/value snapshot facilities may update
//! - Load it once at init from `<root>/<status_dir>/<prefix>.json`
//! - Write it back wholesale on demand
//!
//! # Design Decisions
//! - A missing or unreadable file means "no prior state", never an error
//! - No partial writes or transactions: last write wins
//! - The status directory is created on first write

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;

/// Flat status map as stored on disk.
pub type StatusMap = BTreeMap<String, Value>;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("failed to write status `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode status `{path}`: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable storage for one process type's status.
#[derive(Debug, Clone)]
pub struct StatusStore {
    dir: PathBuf,
    prefix: String,
}

impl StatusStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.prefix))
    }

    /// Read the stored snapshot. `None` when nothing usable is on disk.
    pub fn read(&self) -> Option<StatusMap> {
        let path = self.path();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Status unreadable, starting empty");
                return None;
            }
        };

        match serde_json::from_reader::<_, Value>(BufReader::new(file)) {
            Ok(Value::Object(map)) => Some(map.into_iter().collect()),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Status corrupt, starting empty");
                None
            }
        }
    }

    /// Replace the stored snapshot with `map`.
    pub fn write(&self, map: &StatusMap) -> Result<(), StatusError> {
        let path = self.path();
        let io_err = |source| StatusError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let file = File::create(&path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, map).map_err(|source| StatusError::Encode {
            path: path.clone(),
            source,
        })?;
        writer.flush().map_err(io_err)?;

        tracing::debug!(path = %path.display(), entries = map.len(), "Status saved");
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// In-memory status shared between the orchestrator and facilities.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    inner: Arc<DashMap<String, Value>>,
}

impl StatusSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay `map` onto the current entries.
    pub fn extend(&self, map: StatusMap) {
        for (k, v) in map {
            self.inner.insert(k, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.get(key).map(|r| r.value().clone())
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.remove(key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Point-in-time copy, ordered by key.
    pub fn to_map(&self) -> StatusMap {
        self.inner
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }
}

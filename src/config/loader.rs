//! Configuration loading from disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::tree::{deep_merge, scope};
use crate::config::validation::{validate, Rules, ValidationReport};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config `{0}` not found")]
    Missing(PathBuf),

    #[error("{0}")]
    Validation(ValidationReport),
}

/// Accumulates the global configuration tree from JSON documents.
///
/// Documents are addressed by source id under `<root>/config/`:
/// - `<source>.json`: base document
/// - `<source>.<env>.json`: environment variant, replaces the base wholesale
/// - `<source>.json.example`: expected key set, enables validation
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
    env: String,
    tree: Value,
}

impl ConfigStore {
    /// Create an empty store reading from `<root>/config`.
    pub fn new(root: impl AsRef<Path>, env: impl Into<String>) -> Self {
        Self {
            dir: root.as_ref().join("config"),
            env: env.into(),
            tree: Value::Object(Map::new()),
        }
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    /// The merged configuration so far.
    pub fn tree(&self) -> &Value {
        &self.tree
    }

    /// Shareable read-only copy of the tree.
    pub fn snapshot(&self) -> Arc<Value> {
        Arc::new(self.tree.clone())
    }

    /// Load one source, validate it when an example exists, merge it.
    pub fn load(
        &mut self,
        source_id: &str,
        group: Option<&str>,
        rules: &Rules,
    ) -> Result<(), ConfigError> {
        let doc = self.read_source(source_id)?;
        let scoped = scope(doc, group);

        let example_path = self.dir.join(format!("{source_id}.json.example"));
        if let Some(example) = read_document(&example_path)? {
            let example = scope(example, group);
            let errors = validate(&example, &scoped, rules);
            if !errors.is_empty() {
                return Err(ConfigError::Validation(ValidationReport {
                    source: source_id.to_string(),
                    errors,
                }));
            }
            tracing::debug!(source = source_id, "Config matches example");
        }

        let incoming = match group {
            Some(group) => {
                let mut wrapper = Map::new();
                wrapper.insert(group.to_string(), scoped);
                Value::Object(wrapper)
            }
            None => scoped,
        };
        deep_merge(&mut self.tree, incoming);

        tracing::info!(source = source_id, group = ?group, env = %self.env, "Config loaded");
        Ok(())
    }

    /// Like [`ConfigStore::load`], but a failure is fatal for the process.
    ///
    /// Prints the report naming every offending key and exits with status 1.
    pub fn load_or_exit(&mut self, source_id: &str, group: Option<&str>, rules: &Rules) {
        if let Err(e) = self.load(source_id, group, rules) {
            report_fatal(&e);
            std::process::exit(1);
        }
    }

    fn read_source(&self, source_id: &str) -> Result<Value, ConfigError> {
        let env_path = self.dir.join(format!("{source_id}.{}.json", self.env));
        if let Some(doc) = read_document(&env_path)? {
            return Ok(doc);
        }

        let base_path = self.dir.join(format!("{source_id}.json"));
        read_document(&base_path)?.ok_or(ConfigError::Missing(base_path))
    }
}

/// Log and print a configuration failure.
pub fn report_fatal(err: &ConfigError) {
    if let ConfigError::Validation(report) = err {
        for e in &report.errors {
            tracing::error!(source = %report.source, path = e.path(), "{}", e);
        }
    } else {
        tracing::error!(error = %err, "Config load failed");
    }
    eprintln!("{}", err);
}

/// Read a JSON document. `Ok(None)` when the file does not exist.
///
/// A document whose top level is not an object counts as empty.
fn read_document(path: &Path) -> Result<Option<Value>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let doc: Value = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(Some(if doc.is_object() {
        doc
    } else {
        Value::Object(Map::new())
    }))
}

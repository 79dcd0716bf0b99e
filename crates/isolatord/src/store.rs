//! Persisted blacklist
//!
//! The file is a JSON array of lowercase MAC strings in insertion order. It
//! is read on every operation and rewritten in full on every mutation, via a
//! temporary sibling file and a rename so readers never observe a partial
//! write. An absent file is an empty blacklist.
//!
//! The store itself does no locking; `IsolationEngine` owns it behind a mutex.

use crate::error::{IsolatorError, Result};
use crate::types::MacAddress;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File-backed ordered set of isolated MAC addresses
#[derive(Debug, Clone)]
pub struct BlacklistStore {
    path: PathBuf,
}

impl BlacklistStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the blacklist
    pub fn load(&self) -> Result<Vec<MacAddress>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(IsolatorError::State(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            IsolatorError::State(format!("Corrupt blacklist {}: {}", self.path.display(), e))
        })
    }

    /// Replace the file contents with `entries`
    pub fn save(&self, entries: &[MacAddress]) -> Result<()> {
        let content = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");

        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(&tmp, content.as_bytes())?;
            fs::rename(&tmp, &self.path)
        };

        write().map_err(|e| {
            IsolatorError::State(format!("Failed to write {}: {}", self.path.display(), e))
        })?;

        debug!(path = %self.path.display(), count = entries.len(), "Blacklist saved");
        Ok(())
    }

    /// Append `mac` if absent; returns whether the file changed
    pub fn insert(&self, mac: MacAddress) -> Result<bool> {
        let mut entries = self.load()?;
        if entries.contains(&mac) {
            return Ok(false);
        }
        entries.push(mac);
        self.save(&entries)?;
        Ok(true)
    }

    /// Remove `mac` if present; returns whether the file changed
    pub fn remove(&self, mac: &MacAddress) -> Result<bool> {
        let mut entries = self.load()?;
        let before = entries.len();
        entries.retain(|entry| entry != mac);
        if entries.len() == before {
            return Ok(false);
        }
        self.save(&entries)?;
        Ok(true)
    }

    pub fn contains(&self, mac: &MacAddress) -> Result<bool> {
        Ok(self.load()?.contains(mac))
    }
}

//! Last-used paths, persisted between CLI runs as a small JSON object.
//!
//! Owned by the command-line front end only; the render pipeline never reads it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub const KEY_INPUT: &str = "input";
pub const KEY_AUDIO: &str = "audio";
pub const KEY_OUTPUT: &str = "output";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl Session {
    /// Load the session at `path`. A missing or unreadable file yields an empty session.
    pub fn load(path: &Path) -> Self {
        let values = match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<BTreeMap<String, String>>(&text) {
                Ok(values) => values,
                Err(e) => {
                    log::warn!("Ignoring corrupt session file {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                log::warn!("Could not read session file {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            values,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).filter(|v| !v.is_empty()).map(PathBuf::from)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn set_path(&mut self, key: &str, value: &Path) {
        self.set(key, value.to_string_lossy());
    }

    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    pub fn save(&self) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let json = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(&self.path, json)?;
        log::debug!("Saved session to {}", self.path.display());
        Ok(())
    }
}

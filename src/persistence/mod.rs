//! Key-value preferences storage
//!
//! Features:
//! - String and integer values with caller-supplied defaults
//! - In-memory store for tests and RL runs
//! - JSON file store with atomic writes (tmp → rename)
//! - Corrupt files are logged and treated as empty

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Stored value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    Int(i64),
    Str(String),
}

/// Persistent key-value store
pub trait Preferences: Send {
    fn get_string(&self, key: &str, default: &str) -> String;
    fn get_int(&self, key: &str, default: i64) -> i64;
    fn put_string(&mut self, key: &str, value: &str) -> Result<()>;
    fn put_int(&mut self, key: &str, value: i64) -> Result<()>;
}

fn lookup_string(values: &BTreeMap<String, PrefValue>, key: &str, default: &str) -> String {
    match values.get(key) {
        Some(PrefValue::Str(s)) => s.clone(),
        _ => default.to_string(),
    }
}

fn lookup_int(values: &BTreeMap<String, PrefValue>, key: &str, default: i64) -> i64 {
    match values.get(key) {
        Some(PrefValue::Int(i)) => *i,
        _ => default,
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryPreferences {
    values: BTreeMap<String, PrefValue>,
}

impl Preferences for MemoryPreferences {
    fn get_string(&self, key: &str, default: &str) -> String {
        lookup_string(&self.values, key, default)
    }

    fn get_int(&self, key: &str, default: i64) -> i64 {
        lookup_int(&self.values, key, default)
    }

    fn put_string(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), PrefValue::Str(value.to_string()));
        Ok(())
    }

    fn put_int(&mut self, key: &str, value: i64) -> Result<()> {
        self.values.insert(key.to_string(), PrefValue::Int(value));
        Ok(())
    }
}

/// Preferences kept in a JSON object on disk; every put rewrites the file
#[derive(Debug)]
pub struct JsonFilePreferences {
    path: PathBuf,
    values: BTreeMap<String, PrefValue>,
}

impl JsonFilePreferences {
    /// Open `path`, starting empty if it is missing or unreadable
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring corrupt preferences {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                log::warn!("Could not read preferences {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&self.values)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        log::debug!("Preferences written to {}", self.path.display());
        Ok(())
    }
}

impl Preferences for JsonFilePreferences {
    fn get_string(&self, key: &str, default: &str) -> String {
        lookup_string(&self.values, key, default)
    }

    fn get_int(&self, key: &str, default: i64) -> i64 {
        lookup_int(&self.values, key, default)
    }

    fn put_string(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), PrefValue::Str(value.to_string()));
        self.flush()
    }

    fn put_int(&mut self, key: &str, value: i64) -> Result<()> {
        self.values.insert(key.to_string(), PrefValue::Int(value));
        self.flush()
    }
}

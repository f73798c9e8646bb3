// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Flat-file item store
//!
//! All listed items live in a single JSON array on disk. Each operation reads
//! the whole file, changes it in memory and writes it back, holding one lock
//! for the entire cycle so concurrent requests cannot lose each other's
//! updates.

use chrono::Local;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::normalize::{coerce_recyclable, Fields};
use crate::{Result, ScannerError};

/// Format of the `listed_at` stamp
pub const LISTED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// JSON-file item store (thread-safe wrapper)
#[derive(Clone)]
pub struct ItemStore {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

/// Criteria for [`ItemStore::search`]; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    /// Case-insensitive substring of `product_name`
    pub query: Option<String>,
    pub toxicity_level: Option<String>,
    pub recyclable: Option<bool>,
}

impl ItemFilter {
    fn matches(&self, item: &Value) -> bool {
        if let Some(query) = self.query.as_deref().filter(|q| !q.is_empty()) {
            let name = item.get("product_name").and_then(Value::as_str).unwrap_or("");
            if !name.to_lowercase().contains(&query.to_lowercase()) {
                return false;
            }
        }

        if let Some(level) = self.toxicity_level.as_deref().filter(|l| !l.is_empty()) {
            let item_level = item.get("toxicity_level").and_then(Value::as_str).unwrap_or("");
            if !item_level.eq_ignore_ascii_case(level) {
                return false;
            }
        }

        if let Some(wanted) = self.recyclable {
            let actual = item.get("recyclable").map(coerce_recyclable).unwrap_or(false);
            if actual != wanted {
                return false;
            }
        }

        true
    }
}

impl ItemStore {
    /// Open the store, creating an empty array file if none exists
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, "[]")?;
            info!("Created item store: {:?}", path);
        }

        Ok(Self {
            path: Arc::new(path),
            lock: Arc::new(Mutex::new(())),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| ScannerError::Store("Item store lock poisoned".to_string()))
    }

    /// Read every stored item
    ///
    /// Never fails: unreadable files yield an empty list, and a corrupt file
    /// is reset to `[]`.
    pub fn load_all(&self) -> Vec<Value> {
        match self.lock_store() {
            Ok(_guard) => self.read_items(),
            Err(e) => {
                warn!("Error loading items: {}", e);
                Vec::new()
            }
        }
    }

    /// Stamp `id` and `listed_at` on a draft and append it
    pub fn insert(&self, draft: &Fields) -> Result<Fields> {
        let _guard = self.lock_store()?;
        let mut items = self.read_items();

        let now = Local::now();
        let mut item: Map<String, Value> = draft.clone();
        item.insert("id".to_string(), Value::from(now.timestamp_millis()));
        item.insert(
            "listed_at".to_string(),
            Value::String(now.format(LISTED_AT_FORMAT).to_string()),
        );
        if let Some(recyclable) = item.get("recyclable") {
            let coerced = coerce_recyclable(recyclable);
            item.insert("recyclable".to_string(), Value::Bool(coerced));
        }

        items.push(Value::Object(item.clone()));
        self.write_items(&items)
            .map_err(|e| ScannerError::Store(format!("Error saving item: {}", e)))?;

        debug!("Listed item {} ({} total)", item["id"], items.len());
        Ok(item)
    }

    /// Remove every item whose `id` equals `id`; returns whether any matched
    pub fn delete_by_id(&self, id: &Value) -> Result<bool> {
        let _guard = self.lock_store()?;
        let items = self.read_items();
        let original_count = items.len();

        let remaining: Vec<Value> = items
            .into_iter()
            .filter(|item| !item.get("id").is_some_and(|existing| ids_equal(existing, id)))
            .collect();

        if remaining.len() == original_count {
            return Ok(false);
        }

        self.write_items(&remaining)
            .map_err(|e| ScannerError::Store(format!("Error saving items after deletion: {}", e)))?;

        info!("Deleted item {} ({} remaining)", id, remaining.len());
        Ok(true)
    }

    /// Items matching `filter`, in stored order
    pub fn search(&self, filter: &ItemFilter) -> Vec<Value> {
        self.load_all()
            .into_iter()
            .filter(|item| filter.matches(item))
            .collect()
    }

    /// Number of stored items
    pub fn count(&self) -> usize {
        self.load_all().len()
    }

    // Callers must hold the store lock.
    fn read_items(&self) -> Vec<Value> {
        let content = match fs::read_to_string(self.path.as_path()) {
            Ok(content) => content,
            Err(e) => {
                warn!("Error loading items from {:?}: {}", self.path, e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                warn!("Item store {:?} does not hold an array, ignoring", self.path);
                Vec::new()
            }
            Err(e) => {
                warn!("Corrupted item store {:?}, resetting: {}", self.path, e);
                if let Err(e) = fs::write(self.path.as_path(), "[]") {
                    warn!("Failed to reset item store: {}", e);
                }
                Vec::new()
            }
        }
    }

    // Callers must hold the store lock.
    fn write_items(&self, items: &[Value]) -> Result<()> {
        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"  ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        items.serialize(&mut serializer)?;

        fs::write(self.path.as_path(), buffer)?;
        Ok(())
    }
}

/// JSON equality, except that integers and floats compare by value
fn ids_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

//! JSONL-based storage implementation with in-memory caching.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Serialize, de::DeserializeOwned};

use super::traits::{Filter, HasId, Storage};
use crate::error::{RefactorError, Result};

/// JSONL-based storage with in-memory caching.
///
/// Every mutation is written to disk before the call returns.
pub struct JsonlStorage {
    base_path: PathBuf,
    cache: RwLock<HashMap<String, Vec<serde_json::Value>>>,
}

impl std::fmt::Debug for JsonlStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlStorage")
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

fn lock_err<E: std::fmt::Display>(e: E) -> RefactorError {
    RefactorError::Storage(e.to_string())
}

fn record_id(record: &serde_json::Value) -> Option<&str> {
    record.get("id").and_then(|v| v.as_str())
}

impl JsonlStorage {
    /// Create a new JsonlStorage at the given path.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the file path for a collection.
    fn collection_path(&self, collection: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", collection))
    }

    /// Load a collection into cache if not already loaded.
    fn ensure_loaded(&self, collection: &str) -> Result<()> {
        {
            let cache = self.cache.read().map_err(lock_err)?;
            if cache.contains_key(collection) {
                return Ok(());
            }
        }

        let mut cache = self.cache.write().map_err(lock_err)?;
        if cache.contains_key(collection) {
            return Ok(());
        }

        let path = self.collection_path(collection);
        let records = if path.exists() {
            let file = File::open(&path)?;
            let reader = BufReader::new(file);
            let mut records = Vec::new();
            for line in reader.lines() {
                let line = line?;
                if !line.trim().is_empty() {
                    let record: serde_json::Value = serde_json::from_str(&line)?;
                    records.push(record);
                }
            }
            records
        } else {
            Vec::new()
        };

        cache.insert(collection.to_string(), records);
        Ok(())
    }

    /// Append a record to the JSONL file.
    fn append_to_file(&self, collection: &str, record: &serde_json::Value) -> Result<()> {
        let path = self.collection_path(collection);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        file.sync_data()?;
        Ok(())
    }

    /// Rewrite the entire collection file. Callers hold the cache write lock.
    fn write_collection(&self, collection: &str, records: &[serde_json::Value]) -> Result<()> {
        let path = self.collection_path(collection);
        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut file = File::create(&tmp)?;
            for record in records {
                writeln!(file, "{}", serde_json::to_string(record)?)?;
            }
            file.sync_data()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn replace(
        &self,
        collection: &str,
        id: &str,
        expected: &[Filter],
        conflicts: &[Filter],
        value: serde_json::Value,
    ) -> Result<bool> {
        self.ensure_loaded(collection)?;

        let mut cache = self.cache.write().map_err(lock_err)?;
        let records = cache
            .get_mut(collection)
            .ok_or_else(|| RefactorError::Storage(format!("Collection not loaded: {}", collection)))?;

        if !conflicts.is_empty()
            && records
                .iter()
                .any(|r| record_id(r) != Some(id) && conflicts.iter().all(|f| f.matches(r)))
        {
            return Ok(false);
        }

        let slot = records
            .iter_mut()
            .find(|r| record_id(r) == Some(id))
            .ok_or_else(|| RefactorError::Storage(format!("Record not found: {}/{}", collection, id)))?;

        if !expected.iter().all(|f| f.matches(slot)) {
            return Ok(false);
        }

        let previous = std::mem::replace(slot, value);
        if let Err(e) = self.write_collection(collection, records.as_slice()) {
            // Keep cache and disk in agreement
            if let Some(slot) = records.iter_mut().find(|r| record_id(r) == Some(id)) {
                *slot = previous;
            }
            return Err(e);
        }
        Ok(true)
    }
}

impl Storage for JsonlStorage {
    fn create<T: Serialize + DeserializeOwned + HasId>(&self, collection: &str, record: &T) -> Result<()> {
        self.ensure_loaded(collection)?;

        let value = serde_json::to_value(record)?;

        let mut cache = self.cache.write().map_err(lock_err)?;
        let records = cache
            .get_mut(collection)
            .ok_or_else(|| RefactorError::Storage(format!("Collection not loaded: {}", collection)))?;

        if records.iter().any(|r| record_id(r) == Some(record.id())) {
            return Err(RefactorError::Storage(format!(
                "Duplicate id in {}: {}",
                collection,
                record.id()
            )));
        }

        // Append to file first (source of truth)
        self.append_to_file(collection, &value)?;
        records.push(value);

        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(lock_err)?;
        let records = cache
            .get(collection)
            .ok_or_else(|| RefactorError::Storage(format!("Collection not loaded: {}", collection)))?;

        match records.iter().find(|r| record_id(r) == Some(id)) {
            Some(record) => Ok(Some(serde_json::from_value(record.clone())?)),
            None => Ok(None),
        }
    }

    fn update<T: Serialize + DeserializeOwned + HasId>(&self, collection: &str, id: &str, record: &T) -> Result<()> {
        let value = serde_json::to_value(record)?;
        self.replace(collection, id, &[], &[], value)?;
        Ok(())
    }

    fn update_if<T: Serialize + DeserializeOwned + HasId>(
        &self,
        collection: &str,
        id: &str,
        expected: &[Filter],
        record: &T,
    ) -> Result<bool> {
        let value = serde_json::to_value(record)?;
        self.replace(collection, id, expected, &[], value)
    }

    fn claim_if<T: Serialize + DeserializeOwned + HasId>(
        &self,
        collection: &str,
        id: &str,
        expected: &[Filter],
        conflicts: &[Filter],
        record: &T,
    ) -> Result<bool> {
        let value = serde_json::to_value(record)?;
        self.replace(collection, id, expected, conflicts, value)
    }

    fn query<T: DeserializeOwned>(&self, collection: &str, filters: &[Filter]) -> Result<Vec<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(lock_err)?;
        let records = cache
            .get(collection)
            .ok_or_else(|| RefactorError::Storage(format!("Collection not loaded: {}", collection)))?;

        let mut results = Vec::new();
        for record in records {
            if filters.iter().all(|f| f.matches(record)) {
                results.push(serde_json::from_value(record.clone())?);
            }
        }

        Ok(results)
    }

    fn list<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        self.query(collection, &[])
    }
}

//! Result Persistence
//!
//! Stores extraction results in a JSON file, one record per (url, category)
//! pair. Saving a result for a key that already exists overwrites the stored
//! data in place; the record keeps its id and creation time.
//!
//! The whole file is rewritten after every mutation.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::tasks::ExtractionResult;

/// A persisted result.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StoredResult {
    pub id: Uuid,
    #[serde(flatten)]
    pub result: ExtractionResult,
}

/// Upsert-by-key result store.
///
/// # Example
///
/// ```rust,no_run
/// use pagerunner::store::ResultStore;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = ResultStore::open("results.json")?;
///     for record in store.by_category("concert") {
///         println!("{} {:?}", record.result.url, record.result.data);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Default)]
pub struct ResultStore {
    path: Option<PathBuf>,
    records: Vec<StoredResult>,
}

impl ResultStore {
    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the store at `path`, loading existing records. A missing file
    /// is an empty store; it is created on the first mutation.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let records = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            Vec::new()
        };

        info!("Opened result store {} ({} records)", path.display(), records.len());
        Ok(Self {
            path: Some(path),
            records,
        })
    }

    /// File backing this store, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in insertion order.
    pub fn all(&self) -> &[StoredResult] {
        &self.records
    }

    /// Inserts `result`, or overwrites the record with the same
    /// (url, category). Returns the record id.
    pub fn save(&mut self, result: ExtractionResult) -> Result<Uuid, StoreError> {
        let id = self.upsert(result);
        self.persist()?;
        Ok(id)
    }

    /// Saves several results with a single write.
    pub fn save_all(
        &mut self,
        results: impl IntoIterator<Item = ExtractionResult>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let ids: Vec<Uuid> = results.into_iter().map(|r| self.upsert(r)).collect();
        if !ids.is_empty() {
            self.persist()?;
        }
        Ok(ids)
    }

    /// Looks up a record by id.
    pub fn get(&self, id: Uuid) -> Result<&StoredResult, StoreError> {
        self.records
            .iter()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))
    }

    /// Every record of one category.
    pub fn by_category(&self, category: &str) -> Vec<&StoredResult> {
        self.records
            .iter()
            .filter(|r| r.result.category == category)
            .collect()
    }

    /// Replaces the record with `record.id`.
    ///
    /// Keeps the stored creation time and bumps the update time. Fails with
    /// [`StoreError::DuplicateKey`] if the new (url, category) already
    /// belongs to another record.
    pub fn update(&mut self, mut record: StoredResult) -> Result<(), StoreError> {
        let index = self.index_of(record.id)?;

        let (url, category) = record.result.key();
        if let Some(other) = self
            .records
            .iter()
            .find(|r| r.id != record.id && r.result.key() == (url, category))
        {
            return Err(StoreError::DuplicateKey {
                url: url.to_string(),
                category: category.to_string(),
                existing: other.id,
            });
        }

        record.result.created_at = self.records[index].result.created_at;
        record.result.updated_at = Utc::now();
        self.records[index] = record;
        self.persist()
    }

    /// Removes a record and returns it.
    pub fn delete(&mut self, id: Uuid) -> Result<StoredResult, StoreError> {
        let index = self.index_of(id)?;
        let removed = self.records.remove(index);
        self.persist()?;
        Ok(removed)
    }

    fn index_of(&self, id: Uuid) -> Result<usize, StoreError> {
        self.records
            .iter()
            .position(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))
    }

    fn upsert(&mut self, result: ExtractionResult) -> Uuid {
        let existing = self
            .records
            .iter_mut()
            .find(|r| r.result.key() == result.key());

        match existing {
            Some(record) => {
                record.result.name = result.name;
                record.result.data = result.data;
                record.result.updated_at = Utc::now();
                debug!("Updated result {} for {}", record.id, record.result.url);
                record.id
            }
            None => {
                let id = Uuid::now_v7();
                debug!("Inserted result {} for {}", id, result.url);
                self.records.push(StoredResult { id, result });
                id
            }
        }
    }

    fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&self.records)?;
        fs::write(path, json)?;
        Ok(())
    }
}

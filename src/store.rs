//! Whole-collection record store over a key-value substrate.
//!
//! Each collection is one JSON array stored under the collection name. Every
//! mutation reads the full array, edits it and writes it back. There is no
//! locking or version check: two writers on one workspace race and the last
//! write wins. Callers must keep a single writer per workspace.

use crate::error::StoreError;
use crate::model::{Collection, Entity};
use crate::storage::KeyValueStorage;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub type Record = Map<String, Value>;

pub struct RecordStore<S> {
    storage: S,
}

fn decode_collection(name: &str, raw: &str) -> Result<Vec<Record>, StoreError> {
    let corrupted = |reason: String| StoreError::CorruptedStore {
        collection: name.to_string(),
        reason,
    };
    let value: Value = serde_json::from_str(raw).map_err(|e| corrupted(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(corrupted("expected a JSON array".to_string()));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(obj) => Ok(obj),
            _ => Err(corrupted(format!("element {} is not an object", i))),
        })
        .collect()
}

/// Check that `raw` is a well-formed collection blob; returns its record count.
pub fn validate_collection_blob(collection: Collection, raw: &str) -> Result<usize, StoreError> {
    decode_collection(collection.name(), raw).map(|r| r.len())
}

fn key_matches(record: &Record, key_field: &str, key_value: &str) -> bool {
    record.get(key_field).and_then(|v| v.as_str()) == Some(key_value)
}

impl<S: KeyValueStorage> RecordStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Strict read: absent collections are empty, malformed ones are errors.
    pub fn try_get_collection(&self, collection: Collection) -> Result<Vec<Record>, StoreError> {
        match self.storage.get_item(collection.name())? {
            Some(raw) => decode_collection(collection.name(), &raw),
            None => Ok(Vec::new()),
        }
    }

    /// Lenient read: any failure is logged and reads as an empty collection.
    pub fn get_collection(&self, collection: Collection) -> Vec<Record> {
        match self.try_get_collection(collection) {
            Ok(records) => records,
            Err(e) => {
                warn!(collection = collection.name(), error = %e, "treating collection as empty");
                Vec::new()
            }
        }
    }

    pub fn query<F>(&self, collection: Collection, predicate: F) -> Vec<Record>
    where
        F: Fn(&Record) -> bool,
    {
        self.get_collection(collection)
            .into_iter()
            .filter(|r| predicate(r))
            .collect()
    }

    pub fn find_by_key(
        &self,
        collection: Collection,
        key_field: &str,
        key_value: &str,
    ) -> Option<Record> {
        self.get_collection(collection)
            .into_iter()
            .find(|r| key_matches(r, key_field, key_value))
    }

    /// Replace the whole collection.
    pub fn persist(&mut self, collection: Collection, records: &[Record]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(records)?;
        self.storage.set_item(collection.name(), &raw)?;
        debug!(collection = collection.name(), count = records.len(), "collection persisted");
        Ok(())
    }

    /// Merge `patch` into the record whose `key_field` equals `key_value`, or
    /// append a new record built from `patch` when none matches.
    pub fn upsert_by_key(
        &mut self,
        collection: Collection,
        key_field: &str,
        key_value: &str,
        patch: Record,
    ) -> Result<Record, StoreError> {
        let mut records = self.try_get_collection(collection)?;
        let merged = match records
            .iter_mut()
            .find(|r| key_matches(r, key_field, key_value))
        {
            Some(existing) => {
                for (k, v) in patch {
                    existing.insert(k, v);
                }
                existing.insert(key_field.to_string(), Value::String(key_value.to_string()));
                existing.clone()
            }
            None => {
                let mut fresh = patch;
                fresh.insert(key_field.to_string(), Value::String(key_value.to_string()));
                records.push(fresh.clone());
                fresh
            }
        };
        self.persist(collection, &records)?;
        Ok(merged)
    }

    /// Like `upsert_by_key` but never appends; a missing target is `NotFound`.
    pub fn patch_by_key(
        &mut self,
        collection: Collection,
        key_field: &str,
        key_value: &str,
        patch: Record,
    ) -> Result<Record, StoreError> {
        let records = self.try_get_collection(collection)?;
        if !records.iter().any(|r| key_matches(r, key_field, key_value)) {
            return Err(StoreError::NotFound {
                collection: collection.name().to_string(),
                key_field: key_field.to_string(),
                key_value: key_value.to_string(),
            });
        }
        self.upsert_by_key(collection, key_field, key_value, patch)
    }

    /// Remove the first record whose `key_field` equals `key_value`.
    pub fn delete_by_key(
        &mut self,
        collection: Collection,
        key_field: &str,
        key_value: &str,
    ) -> Result<bool, StoreError> {
        let mut records = self.try_get_collection(collection)?;
        let Some(pos) = records
            .iter()
            .position(|r| key_matches(r, key_field, key_value))
        else {
            return Ok(false);
        };
        records.remove(pos);
        self.persist(collection, &records)?;
        Ok(true)
    }

    /// Drop a collection outright, including a malformed one.
    pub fn reset_collection(&mut self, collection: Collection) -> Result<bool, StoreError> {
        let removed = self.storage.remove_item(collection.name())?;
        if removed {
            warn!(collection = collection.name(), "collection reset");
        }
        Ok(removed)
    }

    /// Typed read. Records that do not decode as `T` are skipped.
    pub fn load<T: Entity>(&self) -> Vec<T> {
        let collection = T::COLLECTION;
        self.get_collection(collection)
            .into_iter()
            .filter_map(|r| match serde_json::from_value::<T>(Value::Object(r)) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(collection = collection.name(), error = %e, "skipping undecodable record");
                    None
                }
            })
            .collect()
    }

    pub fn find<T: Entity>(&self, key: &str) -> Option<T> {
        self.load::<T>().into_iter().find(|e| e.key() == key)
    }

    /// Strict typed lookup for mutation paths. A malformed collection, or a
    /// matching record that does not decode as `T`, is `CorruptedStore`.
    pub fn try_find<T: Entity>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let collection = T::COLLECTION;
        let key_field = collection.key_field();
        let Some(record) = self
            .try_get_collection(collection)?
            .into_iter()
            .find(|r| key_matches(r, key_field, key))
        else {
            return Ok(None);
        };
        serde_json::from_value(Value::Object(record))
            .map(Some)
            .map_err(|e| StoreError::CorruptedStore {
                collection: collection.name().to_string(),
                reason: format!("record {} = {}: {}", key_field, key, e),
            })
    }

    /// Write `entity` in place of the record with the same key, or append it.
    /// Unlike `upsert_by_key` this replaces the stored record wholesale so
    /// cleared optional fields do not linger.
    pub fn save<T: Entity>(&mut self, entity: &T) -> Result<(), StoreError> {
        let collection = T::COLLECTION;
        let key_field = collection.key_field();
        let Value::Object(encoded) = serde_json::to_value(entity)? else {
            return Err(StoreError::CorruptedStore {
                collection: collection.name().to_string(),
                reason: "entity did not encode as an object".to_string(),
            });
        };
        let mut records = self.try_get_collection(collection)?;
        match records
            .iter_mut()
            .find(|r| key_matches(r, key_field, entity.key()))
        {
            Some(slot) => *slot = encoded,
            None => records.push(encoded),
        }
        self.persist(collection, &records)
    }

    pub fn remove<T: Entity>(&mut self, key: &str) -> Result<bool, StoreError> {
        let collection = T::COLLECTION;
        self.delete_by_key(collection, collection.key_field(), key)
    }

    /// Read a standalone JSON value stored outside the collections.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.storage.get_item(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::CorruptedStore {
                collection: key.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn set_json<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.storage.set_item(key, &raw)
    }

    pub fn remove_item(&mut self, key: &str) -> Result<bool, StoreError> {
        self.storage.remove_item(key)
    }

    /// Raw blob for a collection, as stored. Used by backups.
    pub fn raw_collection(&self, collection: Collection) -> Result<Option<String>, StoreError> {
        self.storage.get_item(collection.name())
    }

    /// Store a raw blob for a collection after checking it decodes.
    pub fn restore_raw_collection(
        &mut self,
        collection: Collection,
        raw: &str,
    ) -> Result<usize, StoreError> {
        let count = validate_collection_blob(collection, raw)?;
        self.storage.set_item(collection.name(), raw)?;
        Ok(count)
    }
}

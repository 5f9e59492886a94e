//! The key/value persistence capability.

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::{collections::BTreeMap, fmt, fmt::Debug};

/// Result alias for [`DatastoreError`].
pub type DatastoreResult<T> = Result<T, DatastoreError>;

/// Errors returned by a [`Datastore`].
#[derive(Debug, thiserror::Error)]
pub enum DatastoreError {
    /// The backing store failed.
    #[error("datastore backend error: {0}")]
    Backend(String),
    /// A value could not be encoded or decoded.
    #[error("failed to encode or decode value at {key}: {source}")]
    Codec {
        /// Key of the value.
        key: Key,
        /// The codec error.
        #[source]
        source: serde_json::Error,
    },
}

/// A hierarchical datastore key, e.g. `/deals/storageask/f01000`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(String);

impl Key {
    /// Creates a key from a path, normalizing it to start with a single `/` and carry no
    /// trailing `/`.
    pub fn new(path: impl AsRef<str>) -> Self {
        let segments = path.as_ref().split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>();
        Self(format!("/{}", segments.join("/")))
    }

    /// Returns the key of the child `name` of this key.
    pub fn child(&self, name: impl fmt::Display) -> Self {
        if self.0 == "/" {
            Self::new(name.to_string())
        } else {
            Self::new(format!("{}/{}", self.0, name))
        }
    }

    /// Returns the last segment of the key.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// Returns `true` if `other` is a strict descendant of this key.
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        if self.0 == "/" {
            return other.0.len() > 1
        }
        other.0.len() > self.0.len() &&
            other.0.starts_with(&self.0) &&
            other.0.as_bytes()[self.0.len()] == b'/'
    }

    /// Returns the string form of the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.0)
    }
}

/// A namespaced key/value store.
///
/// Writes are individually durable (eventually); there is no multi-key transaction.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait Datastore: Debug + Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: &Key, value: Vec<u8>) -> DatastoreResult<()>;

    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &Key) -> DatastoreResult<Option<Vec<u8>>>;

    /// Returns all entries whose key is a descendant of `prefix`, ordered by key.
    fn query(&self, prefix: &Key) -> DatastoreResult<Vec<(Key, Vec<u8>)>>;
}

/// JSON helpers available on every [`Datastore`].
pub trait DatastoreExt: Datastore {
    /// Encodes `value` as JSON and stores it under `key`.
    fn put_json<T: Serialize>(&self, key: &Key, value: &T) -> DatastoreResult<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|source| DatastoreError::Codec { key: key.clone(), source })?;
        self.put(key, bytes)
    }

    /// Loads and decodes the JSON value stored under `key`.
    fn get_json<T: DeserializeOwned>(&self, key: &Key) -> DatastoreResult<Option<T>> {
        self.get(key)?
            .map(|bytes| {
                serde_json::from_slice(&bytes)
                    .map_err(|source| DatastoreError::Codec { key: key.clone(), source })
            })
            .transpose()
    }

    /// Loads and decodes every JSON value below `prefix`.
    ///
    /// Fails on the first entry that does not decode, see [`DatastoreExt::query_json_entries`]
    /// for a per entry result.
    fn query_json<T: DeserializeOwned>(&self, prefix: &Key) -> DatastoreResult<Vec<(Key, T)>> {
        self.query_json_entries(prefix)?
            .into_iter()
            .map(|(key, value)| value.map(|value| (key, value)))
            .collect()
    }

    /// Loads every value below `prefix` and decodes each one separately.
    fn query_json_entries<T: DeserializeOwned>(
        &self,
        prefix: &Key,
    ) -> DatastoreResult<Vec<(Key, DatastoreResult<T>)>> {
        Ok(self
            .query(prefix)?
            .into_iter()
            .map(|(key, bytes)| {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|source| DatastoreError::Codec { key: key.clone(), source });
                (key, value)
            })
            .collect())
    }
}

impl<T: Datastore + ?Sized> DatastoreExt for T {}

/// A [`Datastore`] kept in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    entries: RwLock<BTreeMap<Key, Vec<u8>>>,
}

impl MemoryDatastore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Datastore for MemoryDatastore {
    fn put(&self, key: &Key, value: Vec<u8>) -> DatastoreResult<()> {
        self.entries.write().insert(key.clone(), value);
        Ok(())
    }

    fn get(&self, key: &Key) -> DatastoreResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn query(&self, prefix: &Key) -> DatastoreResult<Vec<(Key, Vec<u8>)>> {
        Ok(self
            .entries
            .read()
            .range(prefix.clone()..)
            // siblings such as `/a-b` sort between `/a` and `/a/...`
            .take_while(|(key, _)| key.0.starts_with(&prefix.0))
            .filter(|(key, _)| prefix.is_ancestor_of(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

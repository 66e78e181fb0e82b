//! Simple in-memory implementation of [`MetaStore`].
//!
//! Useful for unit tests or ephemeral repositories where persistence is not
//! required. Writers on multiple threads share one store through `&self`.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{MetaStore, StoreError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().expect("poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetaStore for MemoryStore {
    type ListIter<'a> = std::vec::IntoIter<Result<String, StoreError>>;

    fn create(&self, path: &str, bytes: Bytes) -> Result<(), StoreError> {
        let mut objects = self.objects.lock().expect("poisoned");
        if objects.contains_key(path) {
            return Err(StoreError::AlreadyExists {
                path: path.to_string(),
            });
        }
        objects.insert(path.to_string(), bytes);
        Ok(())
    }

    fn overwrite(&self, path: &str, bytes: Bytes) -> Result<(), StoreError> {
        self.objects
            .lock()
            .expect("poisoned")
            .insert(path.to_string(), bytes);
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Bytes, StoreError> {
        self.objects
            .lock()
            .expect("poisoned")
            .get(path)
            .cloned()
            .ok_or(StoreError::NotFound {
                path: path.to_string(),
            })
    }

    fn list<'a>(&'a self, prefix: &str) -> Self::ListIter<'a> {
        self.objects
            .lock()
            .expect("poisoned")
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| Ok(k.clone()))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

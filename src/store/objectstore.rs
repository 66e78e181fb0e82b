//! Metadata store backed by an [`object_store`] compatible backend.
//!
//! All records are kept in an external service (e.g. S3, GCS, local
//! filesystem, memory) via the `object_store` crate. Create-once semantics
//! map onto `PutMode::Create`, which every supported backend implements as
//! an atomic conditional put.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::executor::{block_on, block_on_stream, BlockingStream};
use futures::{Stream, StreamExt};

use object_store::{self, parse_url, path::Path, ObjectStore, PutMode};
use url::Url;

use super::{MetaStore, StoreError};

/// Metadata and blob store addressed by a storage URL.
pub struct ObjectStoreMeta {
    store: Arc<dyn ObjectStore>,
    prefix: Path,
}

impl fmt::Debug for ObjectStoreMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreMeta")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl Clone for ObjectStoreMeta {
    fn clone(&self) -> Self {
        ObjectStoreMeta {
            store: self.store.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

pub struct BlockingIter<T> {
    inner: BlockingStream<Pin<Box<dyn Stream<Item = T> + Send>>>,
}

impl<T> BlockingIter<T> {
    fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        let boxed: Pin<Box<dyn Stream<Item = T> + Send>> = Box::pin(stream);
        Self {
            inner: block_on_stream(boxed),
        }
    }
}

impl<T> Iterator for BlockingIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl ObjectStoreMeta {
    /// Creates a store pointing at the backend described by `url`.
    pub fn with_url(url: &Url) -> Result<ObjectStoreMeta, object_store::Error> {
        let (store, path) = parse_url(url)?;
        Ok(ObjectStoreMeta {
            store: Arc::from(store),
            prefix: path,
        })
    }

    fn object_path(&self, key: &str) -> Path {
        self.prefix.parts().chain(Path::from(key).parts()).collect()
    }
}

impl MetaStore for ObjectStoreMeta {
    type ListIter<'a> = BlockingIter<Result<String, StoreError>>;

    fn create(&self, path: &str, bytes: Bytes) -> Result<(), StoreError> {
        let location = self.object_path(path);
        let result = block_on(async {
            self.store
                .put_opts(&location, bytes.into(), PutMode::Create.into())
                .await
        });
        match result {
            Ok(_) => Ok(()),
            Err(object_store::Error::AlreadyExists { .. }) => Err(StoreError::AlreadyExists {
                path: path.to_string(),
            }),
            Err(e) => Err(StoreError::Backend {
                op: "create",
                path: path.to_string(),
                source: e,
            }),
        }
    }

    fn overwrite(&self, path: &str, bytes: Bytes) -> Result<(), StoreError> {
        let location = self.object_path(path);
        block_on(async { self.store.put(&location, bytes.into()).await }).map_err(|e| {
            StoreError::Backend {
                op: "overwrite",
                path: path.to_string(),
                source: e,
            }
        })?;
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Bytes, StoreError> {
        let location = self.object_path(path);
        let result = block_on(async {
            let object = self.store.get(&location).await?;
            object.bytes().await
        });
        match result {
            Ok(bytes) => Ok(bytes),
            Err(object_store::Error::NotFound { .. }) => Err(StoreError::NotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(StoreError::Backend {
                op: "get",
                path: path.to_string(),
                source: e,
            }),
        }
    }

    fn list<'a>(&'a self, prefix: &str) -> Self::ListIter<'a> {
        let location = self.object_path(prefix);
        let root = self.prefix.as_ref().to_string();
        let requested = prefix.to_string();
        let stream = self.store.list(Some(&location)).map(move |r| match r {
            Ok(meta) => {
                let full = meta.location.as_ref();
                let key = if root.is_empty() {
                    full
                } else {
                    full.strip_prefix(root.as_str())
                        .map(|rest| rest.trim_start_matches('/'))
                        .unwrap_or(full)
                };
                Ok(key.to_string())
            }
            Err(e) => Err(StoreError::Backend {
                op: "list",
                path: requested.clone(),
                source: e,
            }),
        });
        BlockingIter::new(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::create_deduplicated;

    fn memory_store() -> ObjectStoreMeta {
        let url = Url::parse("memory:///").unwrap();
        ObjectStoreMeta::with_url(&url).unwrap()
    }

    #[test]
    fn create_is_exclusive() {
        let store = memory_store();
        store
            .create("repos/r/repo.yaml", Bytes::from_static(b"a"))
            .expect("create");
        match store.create("repos/r/repo.yaml", Bytes::from_static(b"b")) {
            Err(StoreError::AlreadyExists { path }) => assert_eq!(path, "repos/r/repo.yaml"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(store.get("repos/r/repo.yaml").unwrap(), Bytes::from_static(b"a"));
    }

    #[test]
    fn get_absent_is_not_found() {
        let store = memory_store();
        match store.get("nothing/here") {
            Err(StoreError::NotFound { .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn overwrite_replaces() {
        let store = memory_store();
        store.overwrite("labels/r/v1/label.yaml", Bytes::from_static(b"a")).unwrap();
        store.overwrite("labels/r/v1/label.yaml", Bytes::from_static(b"b")).unwrap();
        assert_eq!(
            store.get("labels/r/v1/label.yaml").unwrap(),
            Bytes::from_static(b"b")
        );
    }

    #[test]
    fn list_returns_protocol_relative_keys() {
        let store = memory_store();
        store.create("diamonds/r/d/x.yaml", Bytes::from_static(b"x")).unwrap();
        store.create("diamonds/r/d/y.yaml", Bytes::from_static(b"y")).unwrap();
        store.create("bundles/r/b/bundle.yaml", Bytes::from_static(b"z")).unwrap();

        let mut keys: Vec<String> = store
            .list("diamonds/r/")
            .collect::<Result<_, _>>()
            .expect("list");
        keys.sort();
        assert_eq!(keys, vec!["diamonds/r/d/x.yaml", "diamonds/r/d/y.yaml"]);
    }

    #[test]
    fn deduplicated_create_tolerates_existing() {
        let store = memory_store();
        create_deduplicated(&store, "blobs/abc", Bytes::from_static(b"payload")).unwrap();
        create_deduplicated(&store, "blobs/abc", Bytes::from_static(b"payload")).unwrap();
    }
}

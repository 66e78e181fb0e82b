//! Content-addressed dataset snapshots with coordinated concurrent uploads.
//!
//! `stockpile` versions large collections of files ("repos") as immutable,
//! content-addressed snapshots ("bundles") backed by a remote object store.
//! The design is inspired by Git, but where Git serializes writers through a
//! single index, this crate lets many independent producers upload the
//! content of one logical bundle concurrently, with no locks and no shared
//! state, and deterministically reconciles their contributions at commit
//! time.
//!
//! The coordination construct is the *diamond*: a bounded epoch opened on a
//! repo during which any number of *splits* (one per producer) upload files
//! and record their entry lists as generation-scoped index chunks. A single
//! commit collects the completed splits, resolves overlapping paths under a
//! configurable conflict mode, writes the merged file list as a bundle, and
//! atomically publishes the result. The only concurrency primitive required
//! of the store is a create-once (fail-if-exists) write per key, which makes
//! the crate usable against a wide range of storage services without
//! transactions.
//!
//! See [`repo`] for the operational entry points, [`store`] for the storage
//! contract and [`model`] for the persisted records.

pub mod fingerprint;
pub mod id;
pub mod model;
pub mod prelude;
pub mod repo;
pub mod store;

//! One producer's independent contribution to a diamond.
//!
//! A [`SplitWriter`] is a session: it registers (or resumes) its split
//! descriptor, uploads file content concurrently through a bounded worker
//! pool, flushes the accumulated entry list as generation-scoped index
//! chunks, and finally publishes its `split-done` record via create-once.
//! Writers never coordinate with each other; each one owns the storage
//! namespace keyed by its split id and generation id.
//!
//! Every writer session mints a fresh generation id, including sessions
//! that resume a split left in `Running` state by a crashed or retried
//! producer. Only the generation named by the final descriptor is read at
//! merge time, so partial chunks from earlier attempts are orphaned rather
//! than corrupting the commit.

use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use crossbeam_channel::bounded;
use tracing::{debug, info, warn};

use crate::fingerprint::Fingerprint;
use crate::id::ordid;
use crate::model::paths;
use crate::model::{Contributor, DiamondState, Entry, SplitDescriptor, SplitState};
use crate::repo::diamond::{self, DiamondError};
use crate::repo::finalize::ENTRIES_PER_FILE_LIST;
use crate::repo::{read_yaml, repo_exists, write_yaml_once, RepoError};
use crate::store::{create_deduplicated, MetaStore, StoreError};

/// Default width of the upload worker pool.
pub const DEFAULT_CONCURRENT_UPLOADS: usize = 8;

/// Configuration for a split writer session, validated before use.
#[derive(Debug, Clone)]
pub struct SplitConfig {
    /// Forces the split id instead of minting one; required when resuming.
    pub split_id: Option<String>,
    /// Requires the split descriptor to pre-exist (replay use case).
    pub must_exist: bool,
    /// Free-form tag carried into logs and the descriptor.
    pub tag: String,
    pub contributors: Vec<Contributor>,
    /// Width of the upload worker pool.
    pub concurrency: usize,
    /// Entries per index chunk file.
    pub entries_per_index: usize,
    /// Record unreadable sources as skipped instead of failing the upload.
    pub skip_missing: bool,
    /// Cooperative stop flag checked between file uploads.
    pub stop: Option<Arc<AtomicBool>>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        SplitConfig {
            split_id: None,
            must_exist: false,
            tag: String::new(),
            contributors: Vec::new(),
            concurrency: DEFAULT_CONCURRENT_UPLOADS,
            entries_per_index: ENTRIES_PER_FILE_LIST,
            skip_missing: false,
            stop: None,
        }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<(), SplitError> {
        if self.concurrency == 0 {
            return Err(SplitError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.entries_per_index == 0 {
            return Err(SplitError::InvalidConfig(
                "entries_per_index must be at least 1".to_string(),
            ));
        }
        if let Some(id) = &self.split_id {
            if id.is_empty() {
                return Err(SplitError::InvalidConfig(
                    "split_id must not be empty".to_string(),
                ));
            }
        } else if self.must_exist {
            return Err(SplitError::InvalidConfig(
                "must_exist requires a split_id".to_string(),
            ));
        }
        Ok(())
    }
}

/// A file to upload: the path it will carry inside the bundle, and where to
/// read it from.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub local: PathBuf,
}

/// A source that could not be read and was skipped under the skip-missing
/// policy.
#[derive(Debug)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// What a completed split session produced.
#[derive(Debug)]
pub struct SplitOutcome {
    pub descriptor: SplitDescriptor,
    pub uploaded: u64,
    pub skipped: Vec<SkippedFile>,
}

enum UploadOutcome {
    Uploaded(Entry),
    Skipped(SkippedFile),
}

/// Upload session for one split of a diamond.
pub struct SplitWriter<'s, S: MetaStore> {
    store: &'s S,
    repo: String,
    diamond_id: String,
    descriptor: SplitDescriptor,
    concurrency: usize,
    entries_per_index: usize,
    skip_missing: bool,
    stop: Option<Arc<AtomicBool>>,
    pending: Vec<Entry>,
    uploaded: u64,
    skipped: Vec<SkippedFile>,
    chunks_written: u64,
}

impl<'s, S: MetaStore> SplitWriter<'s, S> {
    /// Registers a new split on an initialized diamond, or resumes an
    /// existing one.
    ///
    /// A caller-supplied id colliding with an already completed split fails
    /// with [`SplitError::AlreadyDone`]. Colliding with a `Running` split
    /// resumes its descriptor; either way this session gets a fresh
    /// generation id, so chunks written by any earlier attempt are ignored
    /// by the eventual merge.
    pub fn create(
        store: &'s S,
        repo: &str,
        diamond_id: &str,
        cfg: SplitConfig,
    ) -> Result<Self, SplitError> {
        cfg.validate()?;
        repo_exists(store, repo)?;

        let diamond = diamond::load_descriptor(store, repo, diamond_id)
            .map_err(|e| SplitError::Diamond(Box::new(e)))?;
        if diamond.state != DiamondState::Initialized {
            return Err(SplitError::DiamondNotReady {
                diamond_id: diamond_id.to_string(),
                state: diamond.state,
            });
        }

        let mut descriptor = match &cfg.split_id {
            Some(split_id) => {
                if store.exists(&paths::split_done(repo, diamond_id, split_id))? {
                    return Err(SplitError::AlreadyDone {
                        split_id: split_id.clone(),
                    });
                }
                match read_yaml::<_, SplitDescriptor, SplitError>(
                    store,
                    &paths::split_running(repo, diamond_id, split_id),
                ) {
                    Ok(existing) => {
                        warn!(split_id = %split_id, "restarting a split in running state");
                        existing
                    }
                    Err(SplitError::Store(e)) if e.is_not_found() => {
                        if cfg.must_exist {
                            return Err(SplitError::MustExist {
                                split_id: split_id.clone(),
                            });
                        }
                        Self::register(store, repo, diamond_id, &cfg)?
                    }
                    Err(e) => return Err(e),
                }
            }
            None => Self::register(store, repo, diamond_id, &cfg)?,
        };

        // every writer session writes under its own fresh generation
        descriptor.generation_id = ordid();
        descriptor.entry_chunk_count = 0;
        descriptor.state = SplitState::Running;

        debug!(
            split_id = %descriptor.split_id,
            generation_id = %descriptor.generation_id,
            "split writer ready"
        );
        Ok(SplitWriter {
            store,
            repo: repo.to_string(),
            diamond_id: diamond_id.to_string(),
            descriptor,
            concurrency: cfg.concurrency,
            entries_per_index: cfg.entries_per_index,
            skip_missing: cfg.skip_missing,
            stop: cfg.stop,
            pending: Vec::new(),
            uploaded: 0,
            skipped: Vec::new(),
            chunks_written: 0,
        })
    }

    fn register(
        store: &S,
        repo: &str,
        diamond_id: &str,
        cfg: &SplitConfig,
    ) -> Result<SplitDescriptor, SplitError> {
        let descriptor = SplitDescriptor::new(
            cfg.split_id.clone(),
            cfg.contributors.clone(),
            cfg.tag.clone(),
        );
        let path = paths::split_running(repo, diamond_id, &descriptor.split_id);
        match write_yaml_once::<_, _, SplitError>(store, &path, &descriptor) {
            Ok(()) => Ok(descriptor),
            Err(SplitError::Store(e)) if e.is_already_exists() => Err(SplitError::Registration {
                split_id: descriptor.split_id.clone(),
                source: e,
            }),
            Err(e) => Err(e),
        }
    }

    pub fn descriptor(&self) -> &SplitDescriptor {
        &self.descriptor
    }

    pub fn split_id(&self) -> &str {
        &self.descriptor.split_id
    }

    pub fn generation_id(&self) -> &str {
        &self.descriptor.generation_id
    }

    /// Uploads a batch of source files through the worker pool.
    ///
    /// Content is fingerprinted and stored content-addressed; the entry list
    /// records files in enumeration order, not upload completion order.
    /// Unreadable sources are fatal unless the skip-missing policy is
    /// enabled, in which case they are recorded and reported by
    /// [`complete`](SplitWriter::complete). Accumulated entries are flushed
    /// as index chunks whenever a full chunk is available.
    pub fn upload<I>(&mut self, files: I) -> Result<(), SplitError>
    where
        I: IntoIterator<Item = SourceFile>,
        S: Sync,
    {
        let files: Vec<SourceFile> = files.into_iter().collect();
        if files.is_empty() {
            return Ok(());
        }

        let workers = self.concurrency.min(files.len());
        let aborted = AtomicBool::new(false);
        let mut slots: Vec<Option<UploadOutcome>> = Vec::new();
        slots.resize_with(files.len(), || None);
        let mut fatal: Option<SplitError> = None;

        thread::scope(|scope| {
            let (job_tx, job_rx) = bounded::<(usize, &SourceFile)>(files.len());
            let (res_tx, res_rx) =
                bounded::<(usize, Result<UploadOutcome, SplitError>)>(files.len());

            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let res_tx = res_tx.clone();
                let aborted = &aborted;
                let stop = self.stop.clone();
                let store = self.store;
                let skip_missing = self.skip_missing;
                scope.spawn(move || {
                    for (index, file) in job_rx.iter() {
                        if aborted.load(Ordering::Relaxed) || externally_stopped(&stop) {
                            aborted.store(true, Ordering::Relaxed);
                            let _ = res_tx.send((index, Err(SplitError::Interrupted)));
                            continue;
                        }
                        let result = upload_one(store, file, skip_missing);
                        if result.is_err() {
                            aborted.store(true, Ordering::Relaxed);
                        }
                        if res_tx.send((index, result)).is_err() {
                            return;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(res_tx);

            // capacity covers every job, so feeding cannot block on workers
            for (index, file) in files.iter().enumerate() {
                let _ = job_tx.send((index, file));
            }
            drop(job_tx);

            for (index, result) in res_rx.iter() {
                match result {
                    Ok(outcome) => slots[index] = Some(outcome),
                    Err(e) => {
                        if fatal.is_none() {
                            fatal = Some(e);
                        }
                    }
                }
            }
        });

        if let Some(e) = fatal {
            return Err(e);
        }

        for outcome in slots.into_iter().flatten() {
            match outcome {
                UploadOutcome::Uploaded(entry) => {
                    self.pending.push(entry);
                    self.uploaded += 1;
                }
                UploadOutcome::Skipped(skip) => {
                    warn!(path = %skip.path, reason = %skip.reason, "skipping source");
                    self.skipped.push(skip);
                }
            }
        }

        self.flush_full_chunks()
    }

    fn flush_full_chunks(&mut self) -> Result<(), SplitError> {
        while self.pending.len() >= self.entries_per_index {
            let chunk: Vec<Entry> = self.pending.drain(..self.entries_per_index).collect();
            self.write_chunk(&chunk)?;
        }
        Ok(())
    }

    fn write_chunk(&mut self, chunk: &[Entry]) -> Result<(), SplitError> {
        let path = paths::split_file_list(
            &self.repo,
            &self.diamond_id,
            &self.descriptor.split_id,
            &self.descriptor.generation_id,
            self.chunks_written,
        );
        write_yaml_once::<_, _, SplitError>(self.store, &path, &chunk)?;
        self.chunks_written += 1;
        debug!(
            split_id = %self.descriptor.split_id,
            index = self.chunks_written - 1,
            entries = chunk.len(),
            "index chunk written"
        );
        Ok(())
    }

    /// Flushes remaining entries and publishes the immutable `split-done`
    /// record, transitioning the split to `Done`.
    pub fn complete(mut self) -> Result<SplitOutcome, SplitError> {
        if !self.pending.is_empty() {
            let chunk: Vec<Entry> = std::mem::take(&mut self.pending);
            self.write_chunk(&chunk)?;
        }
        self.descriptor.entry_chunk_count = self.chunks_written;
        self.descriptor = self.descriptor.with_state(SplitState::Done);

        let path = paths::split_done(&self.repo, &self.diamond_id, &self.descriptor.split_id);
        match write_yaml_once::<_, _, SplitError>(self.store, &path, &self.descriptor) {
            Ok(()) => {}
            Err(SplitError::Store(e)) if e.is_already_exists() => {
                return Err(SplitError::AlreadyDone {
                    split_id: self.descriptor.split_id,
                })
            }
            Err(e) => return Err(e),
        }

        info!(
            split_id = %self.descriptor.split_id,
            generation_id = %self.descriptor.generation_id,
            entries = self.uploaded,
            skipped = self.skipped.len(),
            "split done"
        );
        Ok(SplitOutcome {
            descriptor: self.descriptor,
            uploaded: self.uploaded,
            skipped: self.skipped,
        })
    }
}

fn externally_stopped(stop: &Option<Arc<AtomicBool>>) -> bool {
    stop.as_ref()
        .map(|flag| flag.load(Ordering::Relaxed))
        .unwrap_or(false)
}

fn upload_one<S: MetaStore>(
    store: &S,
    file: &SourceFile,
    skip_missing: bool,
) -> Result<UploadOutcome, SplitError> {
    let bytes = match fs::read(&file.local) {
        Ok(bytes) => bytes,
        Err(e) if skip_missing => {
            return Ok(UploadOutcome::Skipped(SkippedFile {
                path: file.path.clone(),
                reason: e.to_string(),
            }))
        }
        Err(e) => {
            return Err(SplitError::Source {
                path: file.path.clone(),
                source: e,
            })
        }
    };
    let meta = match fs::metadata(&file.local) {
        Ok(meta) => meta,
        Err(e) if skip_missing => {
            return Ok(UploadOutcome::Skipped(SkippedFile {
                path: file.path.clone(),
                reason: e.to_string(),
            }))
        }
        Err(e) => {
            return Err(SplitError::Source {
                path: file.path.clone(),
                source: e,
            })
        }
    };

    let fingerprint = Fingerprint::digest(&bytes);
    create_deduplicated(store, &paths::blob(&fingerprint.to_hex()), Bytes::from(bytes))?;

    let mtime: DateTime<Utc> = meta
        .modified()
        .map(DateTime::from)
        .unwrap_or_else(|_| crate::model::timestamp());
    Ok(UploadOutcome::Uploaded(Entry {
        path: file.path.clone(),
        hash: fingerprint.to_hex(),
        mtime,
        mode: mode_bits(&meta),
    }))
}

#[cfg(unix)]
fn mode_bits(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_bits(_meta: &fs::Metadata) -> u32 {
    0o644
}

/// Errors from split sessions.
#[derive(Debug)]
pub enum SplitError {
    /// The split already has an immutable final record.
    AlreadyDone { split_id: String },
    /// `must_exist` was set but no descriptor was found.
    MustExist { split_id: String },
    /// Another producer registered the same split id concurrently.
    Registration {
        split_id: String,
        source: StoreError,
    },
    DiamondNotReady {
        diamond_id: String,
        state: DiamondState,
    },
    /// The session was asked to stop.
    Interrupted,
    /// A source file could not be read (and skip-missing was off).
    Source { path: String, source: io::Error },
    InvalidConfig(String),
    Repo(RepoError),
    Diamond(Box<DiamondError>),
    Store(StoreError),
    Codec(serde_yaml::Error),
}

impl fmt::Display for SplitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyDone { split_id } => {
                write!(f, "split {split_id} is already done")
            }
            Self::MustExist { split_id } => {
                write!(f, "split {split_id} was required to exist")
            }
            Self::Registration { split_id, source } => {
                write!(f, "cannot register split {split_id}: {source}")
            }
            Self::DiamondNotReady { diamond_id, state } => {
                write!(f, "diamond {diamond_id} is not ready: state is {state}")
            }
            Self::Interrupted => write!(f, "background processing interrupted"),
            Self::Source { path, source } => {
                write!(f, "cannot read source {path}: {source}")
            }
            Self::InvalidConfig(msg) => write!(f, "invalid split configuration: {msg}"),
            Self::Repo(e) => write!(f, "{e}"),
            Self::Diamond(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "split operation failed: {e}"),
            Self::Codec(e) => write!(f, "split descriptor encoding failed: {e}"),
        }
    }
}

impl Error for SplitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Registration { source, .. } => Some(source),
            Self::Source { source, .. } => Some(source),
            Self::Repo(e) => Some(e),
            Self::Diamond(e) => Some(e.as_ref()),
            Self::Store(e) => Some(e),
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RepoError> for SplitError {
    fn from(e: RepoError) -> Self {
        SplitError::Repo(e)
    }
}

impl From<StoreError> for SplitError {
    fn from(e: StoreError) -> Self {
        SplitError::Store(e)
    }
}

impl From<serde_yaml::Error> for SplitError {
    fn from(e: serde_yaml::Error) -> Self {
        SplitError::Codec(e)
    }
}

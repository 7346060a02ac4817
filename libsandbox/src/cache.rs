use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use log::{debug, warn};
use moka::sync::Cache;

use crate::config::SandboxConfig;
use crate::root::SandboxRoot;
use crate::source::{DiskSource, FileSource};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
}

/// Memoizing reader over a [`SandboxRoot`].
///
/// Keys are canonical paths that passed validation. Without a byte budget
/// nothing is ever evicted or invalidated: a file changed on disk keeps
/// being served from memory. Two threads missing on the same path at once
/// both read it and store identical bytes.
pub struct FileCache<S = DiskSource> {
    root: SandboxRoot,
    source: S,
    entries: Cache<PathBuf, Bytes>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FileCache<DiskSource> {
    pub fn new(config: &SandboxConfig) -> Self {
        Self::with_source(SandboxRoot::new(&config.root), config.max_bytes, DiskSource)
    }
}

impl<S: FileSource> FileCache<S> {
    pub fn with_source(root: SandboxRoot, max_bytes: Option<u64>, source: S) -> Self {
        let entries = match max_bytes {
            Some(max) => Cache::builder()
                .max_capacity(max)
                .weigher(|_path: &PathBuf, data: &Bytes| -> u32 {
                    data.len().try_into().unwrap_or(u32::MAX)
                })
                .build(),
            None => Cache::builder().build(),
        };
        FileCache {
            root,
            source,
            entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &SandboxRoot {
        &self.root
    }

    pub fn resolve(&self, requested: impl AsRef<Path>) -> Option<PathBuf> {
        self.root.resolve(requested)
    }

    /// Full contents of `requested` if it resolves to a regular file inside
    /// the root. Refused paths, missing files and read errors all give `None`;
    /// failures are not cached, so a later call retries the disk.
    pub fn read(&self, requested: impl AsRef<Path>) -> Option<Bytes> {
        let requested = requested.as_ref();
        let path = match self.root.try_resolve(requested) {
            Ok(path) => path,
            Err(e) => {
                debug!("refused {}: {e}", requested.display());
                return None;
            }
        };

        if let Some(data) = self.entries.get(&path) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(data);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        match self.source.read(&path) {
            Ok(data) => {
                let data = Bytes::from(data);
                debug!("cached {} ({} bytes)", path.display(), data.len());
                self.entries.insert(path, data.clone());
                Some(data)
            }
            Err(e) => {
                warn!("failed to read {}: {e}", path.display());
                None
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.entries.run_pending_tasks();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.entry_count(),
        }
    }
}

//! The search path of merged extension archives.

use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::error::ExtensionError;

static GLOBAL: Lazy<Arc<CodePath>> = Lazy::new(|| Arc::new(CodePath::new()));

/// Largest entry [`CodePath::locate`] reads into memory, in bytes.
///
/// Larger entries, declared or actual, are reported as unlinkable.
pub const MAX_ENTRY_SIZE: u64 = 64 * 1024 * 1024;

/// One archive merged into the code path.
#[derive(Debug, Clone)]
struct MergedArchive {
    location: PathBuf,
    entries: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Every location ever offered to `append`, merged or not.
    loaded: HashSet<PathBuf>,
    /// Successfully merged archives in merge order.
    archives: Vec<MergedArchive>,
    sealed: bool,
}

/// Ordered list of merged archives plus the set of locations already seen.
///
/// The set is append-only. A location that failed to merge stays in it and is
/// never retried by this code path.
#[derive(Debug, Default)]
pub struct CodePath {
    inner: Mutex<Inner>,
}

impl CodePath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide instance.
    pub fn global() -> Arc<CodePath> {
        GLOBAL.clone()
    }

    /// Merge the archive at `location`.
    ///
    /// Returns `Ok(false)` if the location was already in the loaded set.
    pub fn append(&self, location: &Path) -> Result<bool, ExtensionError> {
        let key = canonical(location);
        let mut inner = self.inner.lock();
        if !inner.loaded.insert(key.clone()) {
            debug!(archive = %key.display(), "already on the code path");
            return Ok(false);
        }
        if inner.sealed {
            return Err(ExtensionError::classpath(&key, "the code path is sealed"));
        }

        let entries = index_archive(&key).map_err(|e| ExtensionError::classpath(&key, e))?;
        info!(archive = %key.display(), entries = entries.len(), "Added archive to code path");
        inner.archives.push(MergedArchive {
            location: key,
            entries,
        });
        Ok(true)
    }

    /// Refuse every later merge.
    pub fn seal(&self) {
        self.inner.lock().sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.lock().sealed
    }

    /// Whether `location` was ever offered to [`CodePath::append`].
    pub fn is_loaded(&self, location: &Path) -> bool {
        self.inner.lock().loaded.contains(&canonical(location))
    }

    /// Merged archives in merge order.
    pub fn archives(&self) -> Vec<PathBuf> {
        self.inner
            .lock()
            .archives
            .iter()
            .map(|a| a.location.clone())
            .collect()
    }

    /// Member names of a merged archive, sorted.
    pub fn entries(&self, location: &Path) -> Option<Vec<String>> {
        let key = canonical(location);
        self.inner
            .lock()
            .archives
            .iter()
            .find(|a| a.location == key)
            .map(|a| a.entries.iter().cloned().collect())
    }

    pub fn contains_entry(&self, entry: &str) -> bool {
        self.inner
            .lock()
            .archives
            .iter()
            .any(|a| a.entries.contains(entry))
    }

    /// Read `entry` from the first merged archive that holds it.
    ///
    /// An entry over [`MAX_ENTRY_SIZE`] is a [`ExtensionError::Linkage`] error.
    pub fn locate(&self, entry: &str) -> Result<Option<(PathBuf, Vec<u8>)>, ExtensionError> {
        let location = {
            let inner = self.inner.lock();
            match inner.archives.iter().find(|a| a.entries.contains(entry)) {
                Some(archive) => archive.location.clone(),
                None => return Ok(None),
            }
        };

        let mut archive = ZipArchive::new(File::open(&location)?)?;
        let file = archive.by_name(entry)?;
        if file.size() > MAX_ENTRY_SIZE {
            return Err(oversized(entry, file.size()));
        }
        // The declared size is untrusted; never read past the limit.
        let mut bytes = Vec::new();
        file.take(MAX_ENTRY_SIZE + 1).read_to_end(&mut bytes)?;
        if bytes.len() as u64 > MAX_ENTRY_SIZE {
            return Err(oversized(entry, bytes.len() as u64));
        }
        Ok(Some((location, bytes)))
    }
}

fn canonical(location: &Path) -> PathBuf {
    location
        .canonicalize()
        .unwrap_or_else(|_| location.to_path_buf())
}

fn oversized(entry: &str, size: u64) -> ExtensionError {
    ExtensionError::linkage(
        entry,
        format!("entry is {size} bytes, the limit is {MAX_ENTRY_SIZE}"),
    )
}

fn index_archive(location: &Path) -> Result<BTreeSet<String>, ExtensionError> {
    let archive = ZipArchive::new(File::open(location)?)?;
    Ok(archive.file_names().map(str::to_string).collect())
}

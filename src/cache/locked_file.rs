//! Locked File Access Module
//!
//! Timeout-bounded locked opens of single entry files. Contention is handled
//! with a plain sleep-and-retry loop: there is no queue, so a waiter can be
//! overtaken by a later arrival.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::cache::LOCK_RETRY_INTERVAL;
use crate::error::{CacheError, Result};

// == Access Mode ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Shared lock on an existing file
    Read,
    /// Exclusive lock, creating the file if needed
    Write,
    /// Exclusive lock on an existing file, for in-place rewrites and removal
    Modify,
}

impl AccessMode {
    fn options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            AccessMode::Read => options.read(true),
            AccessMode::Write => options.read(true).write(true).create(true).truncate(false),
            AccessMode::Modify => options.read(true).write(true),
        };
        options
    }

    fn is_exclusive(self) -> bool {
        !matches!(self, AccessMode::Read)
    }
}

// == Locked File ==
/// An open entry file holding a shared or exclusive lock until dropped.
#[derive(Debug)]
pub struct LockedFile {
    file: File,
    path: PathBuf,
}

impl LockedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current length of the file in bytes.
    pub fn size(&self) -> Result<u64> {
        self.file
            .metadata()
            .map(|meta| meta.len())
            .map_err(|e| CacheError::io(&self.path, "stat", e))
    }

    /// Reads the whole file from the start.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.file
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.file.read_to_end(&mut bytes))
            .map_err(|e| CacheError::io(&self.path, "read", e))?;
        Ok(bytes)
    }

    /// Replaces the file contents with `bytes`.
    ///
    /// Only valid under an exclusive lock; readers never observe a mix of
    /// old and new bytes because they wait on the same lock.
    pub fn replace(&mut self, bytes: &[u8]) -> Result<()> {
        self.file
            .set_len(0)
            .and_then(|_| self.file.seek(SeekFrom::Start(0)))
            .and_then(|_| self.file.write_all(bytes))
            .and_then(|_| self.file.flush())
            .map_err(|e| CacheError::io(&self.path, "write", e))
    }

    /// Deletes the file, returning its size.
    pub fn unlink(self) -> Result<u64> {
        let size = self.size()?;
        let path = self.path.clone();

        // Windows refuses to delete a file with an open handle
        #[cfg(not(unix))]
        drop(self);

        match fs::remove_file(&path) {
            Ok(()) => Ok(size),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(CacheError::io(&path, "delete", e)),
        }
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

// == File Access ==
/// Opens entry files under a lock, retrying while another accessor holds it.
#[derive(Debug, Clone)]
pub struct FileAccess {
    /// Total lock wait allowed per open; zero waits indefinitely
    timeout: Duration,
    /// Pause between attempts
    backoff: Duration,
}

impl FileAccess {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            backoff: LOCK_RETRY_INTERVAL,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    // == Open ==
    /// Opens `path` in `mode` and takes the matching lock.
    ///
    /// Returns `Ok(None)` when a `Read` or `Modify` target does not exist,
    /// including when it was removed while this call waited for the lock.
    pub fn open(&self, path: &Path, mode: AccessMode) -> Result<Option<LockedFile>> {
        let started = Instant::now();

        loop {
            let file = match mode.options().open(path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::NotFound && mode != AccessMode::Write => {
                    return Ok(None);
                }
                Err(e) if is_contended(&e) => {
                    self.pause(path, started, e)?;
                    continue;
                }
                Err(e) => return Err(CacheError::io(path, "open", e)),
            };

            let locked = if mode.is_exclusive() {
                FileExt::try_lock_exclusive(&file)
            } else {
                FileExt::try_lock_shared(&file)
            };

            match locked {
                Ok(()) => {}
                Err(e) if is_contended(&e) => {
                    drop(file);
                    self.pause(path, started, e)?;
                    continue;
                }
                Err(e) => return Err(CacheError::io(path, "lock", e)),
            }

            // The path may have been unlinked or replaced while we waited
            if still_linked(&file, path).map_err(|e| CacheError::io(path, "stat", e))? {
                return Ok(Some(LockedFile {
                    file,
                    path: path.to_path_buf(),
                }));
            }

            debug!(path = %path.display(), "entry file replaced while locking");
            if mode != AccessMode::Write {
                return Ok(None);
            }
        }
    }

    /// Opens `path` for writing, creating it and its lock if needed.
    pub fn open_for_write(&self, path: &Path) -> Result<LockedFile> {
        self.open(path, AccessMode::Write)?.ok_or_else(|| {
            CacheError::io(
                path,
                "open",
                io::Error::new(io::ErrorKind::NotFound, "entry file vanished while locking"),
            )
        })
    }

    fn pause(&self, path: &Path, started: Instant, source: io::Error) -> Result<()> {
        let waited = started.elapsed();

        if !self.timeout.is_zero() && waited >= self.timeout {
            warn!(path = %path.display(), ?waited, "gave up waiting for entry lock");
            return Err(CacheError::AccessTimeout {
                path: path.to_path_buf(),
                waited,
                source,
            });
        }

        let pause = if self.timeout.is_zero() {
            self.backoff
        } else {
            self.backoff.min(self.timeout - waited)
        };
        thread::sleep(pause);
        Ok(())
    }
}

// == Helpers ==
/// True for errors meaning another handle currently holds the file.
fn is_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    let contended = fs2::lock_contended_error();
    if err.raw_os_error().is_some() && err.raw_os_error() == contended.raw_os_error() {
        return true;
    }

    // ERROR_SHARING_VIOLATION
    cfg!(windows) && err.raw_os_error() == Some(32)
}

#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn still_linked(_file: &File, path: &Path) -> io::Result<bool> {
    Ok(path.exists())
}

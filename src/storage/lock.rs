//! Advisory table locking.
//!
//! A write lock is the exclusive creation of `table.lock` inside the table
//! directory. A read lock is a per-holder marker file `table.rlock.<id>`;
//! it cannot be taken while a write lock exists, and a write lock cannot be
//! taken while read markers exist. Locks are advisory: callers acquire one
//! before mutating and release it afterwards.
//!
//! Every lock file holds the pid of its process. A claim is made first and
//! checked second: a reader creates its marker and then looks for a writer,
//! a writer creates `table.lock` and then looks for readers, and whoever
//! sees the other withdraws its claim. Files left by processes that are no
//! longer running are removed as stale.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::common::config::LOCK_FILE;
use crate::common::{Error, Result};

static NEXT_HOLDER: AtomicU64 = AtomicU64::new(1);

/// Kind of lock requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockType {
    Read,
    Write,
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockType::Read => write!(f, "read"),
            LockType::Write => write!(f, "write"),
        }
    }
}

/// Lock state of one table handle.
#[derive(Debug)]
pub struct TableLock {
    dir: PathBuf,
    holder: u64,
    held: Option<LockType>,
    retry_delay: Duration,
}

impl TableLock {
    pub fn new(dir: &Path, retry_delay: Duration) -> Self {
        Self {
            dir: dir.to_path_buf(),
            holder: NEXT_HOLDER.fetch_add(1, Ordering::Relaxed),
            held: None,
            retry_delay,
        }
    }

    /// Lock currently held by this handle.
    pub fn held(&self) -> Option<LockType> {
        self.held
    }

    /// True if this handle holds a lock at least as strong as `lock_type`.
    pub fn has_lock(&self, lock_type: LockType) -> bool {
        match (self.held, lock_type) {
            (Some(LockType::Write), _) => true,
            (Some(LockType::Read), LockType::Read) => true,
            _ => false,
        }
    }

    fn write_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    fn read_path(&self) -> PathBuf {
        self.dir
            .join(format!("table.rlock.{}-{}", std::process::id(), self.holder))
    }

    /// Acquire a lock, trying at most `attempts` times (0 counts as 1).
    ///
    /// Upgrading a read lock to a write lock releases the read marker first.
    ///
    /// # Errors
    /// `Error::LockFailure` when the lock is still taken after the last attempt.
    pub fn lock(&mut self, lock_type: LockType, attempts: u32) -> Result<()> {
        if self.has_lock(lock_type) {
            return Ok(());
        }
        let attempts = attempts.max(1);
        for attempt in 0..attempts {
            if self.try_lock(lock_type)? {
                debug!("{} lock acquired on {}", lock_type, self.dir.display());
                return Ok(());
            }
            if attempt + 1 < attempts {
                thread::sleep(self.retry_delay);
            }
        }
        warn!(
            "giving up on {} lock for {} after {} attempts",
            lock_type,
            self.dir.display(),
            attempts
        );
        Err(Error::LockFailure {
            path: self.dir.clone(),
            lock: lock_type.to_string(),
            attempts,
        })
    }

    fn try_lock(&mut self, lock_type: LockType) -> Result<bool> {
        match lock_type {
            LockType::Read => {
                let marker = self.read_path();
                let mut file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&marker)?;
                writeln!(file, "{}", std::process::id())?;
                drop(file);
                if self.writer_present()? {
                    remove_if_exists(&marker)?;
                    return Ok(false);
                }
                self.held = Some(LockType::Read);
                Ok(true)
            }
            LockType::Write => {
                if !self.create_write_file()? {
                    return Ok(false);
                }
                let own_read = self.read_path();
                if self.other_readers(&own_read)? {
                    remove_if_exists(&self.write_path())?;
                    return Ok(false);
                }
                if self.held == Some(LockType::Read) {
                    remove_if_exists(&own_read)?;
                }
                self.held = Some(LockType::Write);
                Ok(true)
            }
        }
    }

    /// Exclusively create `table.lock`, clearing it first when its holder
    /// is gone. False when a live writer has it.
    fn create_write_file(&self) -> Result<bool> {
        let path = self.write_path();
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    writeln!(file, "{}", std::process::id())?;
                    return Ok(true);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if holder_alive(&path) {
                        return Ok(false);
                    }
                    remove_stale(&path)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(false)
    }

    fn writer_present(&self) -> Result<bool> {
        let path = self.write_path();
        if !path.exists() {
            return Ok(false);
        }
        if holder_alive(&path) {
            return Ok(true);
        }
        remove_stale(&path)?;
        Ok(false)
    }

    fn other_readers(&self, own: &Path) -> Result<bool> {
        let mut found = false;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_marker = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("table.rlock."));
            if !is_marker || path == own {
                continue;
            }
            if holder_alive(&path) {
                found = true;
            } else {
                remove_stale(&path)?;
            }
        }
        Ok(found)
    }

    /// Release the lock held by this handle (no-op when none is held).
    pub fn unlock(&mut self) -> Result<()> {
        match self.held.take() {
            Some(LockType::Write) => remove_if_exists(&self.write_path())?,
            Some(LockType::Read) => remove_if_exists(&self.read_path())?,
            None => return Ok(()),
        }
        debug!("lock released on {}", self.dir.display());
        Ok(())
    }
}

impl Drop for TableLock {
    fn drop(&mut self) {
        if let Err(e) = self.unlock() {
            warn!("failed to release lock on {}: {}", self.dir.display(), e);
        }
    }
}

/// False only when the file names a pid that is known not to run. A file
/// whose pid is not written yet counts as alive.
fn holder_alive(path: &Path) -> bool {
    let pid = fs::read_to_string(path)
        .ok()
        .and_then(|text| text.trim().parse::<u32>().ok());
    match pid {
        Some(pid) => process_alive(pid),
        None => true,
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    pid == std::process::id() || Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

fn remove_stale(path: &Path) -> Result<()> {
    warn!("removing stale lock file {}", path.display());
    remove_if_exists(path)
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn quick(dir: &Path) -> TableLock {
        TableLock::new(dir, Duration::from_millis(1))
    }

    #[test]
    fn test_write_lock_excludes_second_writer() {
        let dir = tempdir().unwrap();
        let mut a = quick(dir.path());
        let mut b = quick(dir.path());

        a.lock(LockType::Write, 1).unwrap();
        let err = b.lock(LockType::Write, 3).unwrap_err();
        assert!(matches!(err, Error::LockFailure { attempts: 3, .. }));

        a.unlock().unwrap();
        b.lock(LockType::Write, 1).unwrap();
        assert!(b.has_lock(LockType::Read));
    }

    #[test]
    fn test_readers_share_but_block_writer() {
        let dir = tempdir().unwrap();
        let mut r1 = quick(dir.path());
        let mut r2 = quick(dir.path());
        let mut w = quick(dir.path());

        r1.lock(LockType::Read, 1).unwrap();
        r2.lock(LockType::Read, 1).unwrap();
        assert!(w.lock(LockType::Write, 2).is_err());

        r1.unlock().unwrap();
        r2.unlock().unwrap();
        w.lock(LockType::Write, 1).unwrap();
        assert!(r1.lock(LockType::Read, 1).is_err());
    }

    #[test]
    fn test_upgrade_read_to_write() {
        let dir = tempdir().unwrap();
        let mut lock = quick(dir.path());
        lock.lock(LockType::Read, 1).unwrap();
        lock.lock(LockType::Write, 1).unwrap();
        assert_eq!(lock.held(), Some(LockType::Write));
    }

    #[test]
    fn test_reader_backs_off_from_writer_claim() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(LOCK_FILE), format!("{}\n", std::process::id())).unwrap();
        let mut reader = quick(dir.path());
        assert!(reader.lock(LockType::Read, 2).is_err());
        assert!(!reader.read_path().exists());
    }

    #[test]
    fn test_writer_backs_off_from_reader_marker() {
        let dir = tempdir().unwrap();
        let mut reader = quick(dir.path());
        reader.lock(LockType::Read, 1).unwrap();
        let mut writer = quick(dir.path());
        assert!(writer.lock(LockType::Write, 2).is_err());
        assert!(!dir.path().join(LOCK_FILE).exists());
        reader.unlock().unwrap();
        writer.lock(LockType::Write, 1).unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_stale_locks_are_cleared() {
        let dir = tempdir().unwrap();
        // Above the kernel's pid limit, so never a running process.
        let dead = "4000000000\n";
        fs::write(dir.path().join(LOCK_FILE), dead).unwrap();
        let stale_marker = dir.path().join("table.rlock.4000000000-1");
        fs::write(&stale_marker, dead).unwrap();

        let mut reader = quick(dir.path());
        reader.lock(LockType::Read, 1).unwrap();
        assert!(!dir.path().join(LOCK_FILE).exists());
        reader.unlock().unwrap();

        let mut writer = quick(dir.path());
        writer.lock(LockType::Write, 1).unwrap();
        assert!(!stale_marker.exists());
    }

    #[test]
    fn test_concurrent_holders_never_overlap() {
        use parking_lot::Mutex;
        use std::sync::Arc;

        let dir = tempdir().unwrap();
        // (readers, writers) currently holding a lock.
        let state = Arc::new(Mutex::new((0u32, 0u32)));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let dir = dir.path().to_path_buf();
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    let mut lock = quick(&dir);
                    for i in 0..50 {
                        let lock_type = if (t + i) % 3 == 0 {
                            LockType::Write
                        } else {
                            LockType::Read
                        };
                        if lock.lock(lock_type, 1).is_err() {
                            continue;
                        }
                        {
                            let mut s = state.lock();
                            match lock_type {
                                LockType::Write => {
                                    assert_eq!(*s, (0, 0));
                                    s.1 += 1;
                                }
                                LockType::Read => {
                                    assert_eq!(s.1, 0);
                                    s.0 += 1;
                                }
                            }
                        }
                        thread::yield_now();
                        {
                            let mut s = state.lock();
                            match lock_type {
                                LockType::Write => s.1 -= 1,
                                LockType::Read => s.0 -= 1,
                            }
                        }
                        lock.unlock().unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_drop_releases() {
        let dir = tempdir().unwrap();
        {
            let mut lock = quick(dir.path());
            lock.lock(LockType::Write, 1).unwrap();
        }
        let mut other = quick(dir.path());
        other.lock(LockType::Write, 1).unwrap();
    }
}

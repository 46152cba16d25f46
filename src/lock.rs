//! Single-instance run locks
//!
//! Each operation takes a file lock named after it before touching the sheet
//! or launching a browser, so two scrapes cannot stack browser processes on
//! the same host. Acquisition never blocks: a held lock is reported to the
//! caller, which exits cleanly with an "already running" notice.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Held process-wide lock for one operation
///
/// On Unix the lock is an advisory `flock` on the lock file, released when
/// the value drops (including on crash, since the kernel drops it with the
/// process). Elsewhere the lock is the file's existence; a crash can leave it
/// behind, and it must then be removed by hand.
pub struct RunLock {
    path: PathBuf,
    file: std::fs::File,
}

impl RunLock {
    /// Try to take the lock for `command` inside `dir`.
    ///
    /// Returns `Ok(None)` when another instance already holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock directory or file cannot be created.
    pub fn try_acquire(dir: impl AsRef<Path>, command: &str) -> Result<Option<RunLock>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{command}.lock"));

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;

            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;

            // SAFETY: This is safe because:
            // 1. The fd comes from a File we own and keep alive for the
            //    lock's whole lifetime
            // 2. LOCK_NB makes the call non-blocking; it returns immediately
            // 3. The return value is checked, with EWOULDBLOCK mapped to
            //    "held elsewhere" and every other failure propagated
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if rc != 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::WouldBlock {
                    tracing::debug!(command, path = %path.display(), "Lock already held");
                    return Ok(None);
                }
                return Err(Error::Io(err));
            }

            let mut lock = RunLock { path, file };
            let _ = lock.file.set_len(0);
            let _ = writeln!(lock.file, "{}", std::process::id());
            Ok(Some(lock))
        }

        #[cfg(not(unix))]
        {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    let mut lock = RunLock { path, file };
                    let _ = writeln!(lock.file, "{}", std::process::id());
                    Ok(Some(lock))
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    tracing::debug!(command, path = %path.display(), "Lock already held");
                    Ok(None)
                }
                Err(err) => Err(Error::Io(err)),
            }
        }
    }

    /// Path of the underlying lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(not(unix))]
impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

//! Rotating on-disk crash report store.
//!
//! # Invariants
//! - At most [`MAX_CRASH_LOGS`] reports are kept; the oldest go first.
//! - File names sort in save order: `crash_<unix-millis>_<seq>.log`.
//! - The pending marker always names the most recent save until it is
//!   cleared explicitly or found to reference a missing file.

use log::{debug, error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const CRASH_LOG_DIR: &str = "crash_logs";
pub const MAX_CRASH_LOGS: usize = 50;
const CRASH_LOG_PREFIX: &str = "crash_";
const CRASH_LOG_SUFFIX: &str = ".log";
const PENDING_CRASH_FLAG: &str = "pending_crash.flag";

pub type CrashStoreResult<T> = Result<T, CrashStoreError>;

#[derive(Debug)]
pub struct CrashLogStore {
    dir: PathBuf,
    sequence: AtomicU64,
}

impl CrashLogStore {
    /// Opens (creating if needed) `<data_dir>/crash_logs`.
    pub fn open(data_dir: &Path) -> CrashStoreResult<Self> {
        let dir = data_dir.join(CRASH_LOG_DIR);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persists one formatted report and marks it pending.
    pub fn save(&self, report: &str) -> CrashStoreResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();

        let (name, mut file) = loop {
            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            let name = format!("{CRASH_LOG_PREFIX}{millis:013}_{seq:06}{CRASH_LOG_SUFFIX}");
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.dir.join(&name))
            {
                Ok(file) => break (name, file),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err.into()),
            }
        };
        file.write_all(report.as_bytes())?;
        file.flush()?;

        let path = self.dir.join(&name);
        info!(
            "event=crash_saved module=crash status=ok file={}",
            path.display()
        );
        self.set_pending(&name)?;
        self.trim()?;
        Ok(path)
    }

    /// Report files, newest first.
    pub fn list(&self) -> CrashStoreResult<Vec<PathBuf>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_crash_log_name(&name) && entry.file_type()?.is_file() {
                names.push(name);
            }
        }
        names.sort_unstable_by(|left, right| right.cmp(left));
        Ok(names.into_iter().map(|name| self.dir.join(name)).collect())
    }

    pub fn count(&self) -> CrashStoreResult<usize> {
        Ok(self.list()?.len())
    }

    /// Reads one report; `None` when it does not exist.
    pub fn read(&self, name: &str) -> CrashStoreResult<Option<String>> {
        let path = self.checked_path(name)?;
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Deletes one report. Returns whether a file was removed.
    pub fn delete(&self, name: &str) -> CrashStoreResult<bool> {
        let path = self.checked_path(name)?;
        match fs::remove_file(path) {
            Ok(()) => {
                info!("event=crash_deleted module=crash status=ok file={name}");
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Deletes every report and the pending marker. Returns the count removed.
    pub fn delete_all(&self) -> CrashStoreResult<usize> {
        let mut removed = 0;
        for path in self.list()? {
            if fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        self.clear_pending()?;
        info!("event=crash_cleared module=crash status=ok removed={removed}");
        Ok(removed)
    }

    /// Name stored in the pending marker, if any.
    pub fn pending_file_name(&self) -> Option<String> {
        let raw = fs::read_to_string(self.dir.join(PENDING_CRASH_FLAG)).ok()?;
        let name = raw.trim();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }

    /// Pending report path. Clears the marker when the file is gone.
    pub fn pending_file(&self) -> Option<PathBuf> {
        let name = self.pending_file_name()?;
        let path = self.dir.join(&name);
        if is_crash_log_name(&name) && path.is_file() {
            return Some(path);
        }
        if let Err(err) = self.clear_pending() {
            error!("event=crash_pending module=crash status=error error={err}");
        }
        None
    }

    pub fn has_pending(&self) -> bool {
        self.pending_file().is_some()
    }

    pub fn clear_pending(&self) -> CrashStoreResult<()> {
        match fs::remove_file(self.dir.join(PENDING_CRASH_FLAG)) {
            Ok(()) => {
                debug!("event=crash_pending module=crash status=ok action=cleared");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn set_pending(&self, name: &str) -> CrashStoreResult<()> {
        fs::write(self.dir.join(PENDING_CRASH_FLAG), name)?;
        Ok(())
    }

    fn trim(&self) -> CrashStoreResult<()> {
        let files = self.list()?;
        if files.len() <= MAX_CRASH_LOGS {
            return Ok(());
        }
        info!(
            "event=crash_trim module=crash status=ok count={} keep={}",
            files.len(),
            MAX_CRASH_LOGS
        );
        for path in &files[MAX_CRASH_LOGS..] {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn checked_path(&self, name: &str) -> CrashStoreResult<PathBuf> {
        if !is_crash_log_name(name) {
            return Err(CrashStoreError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(name))
    }
}

fn is_crash_log_name(name: &str) -> bool {
    name.starts_with(CRASH_LOG_PREFIX)
        && name.ends_with(CRASH_LOG_SUFFIX)
        && !name.contains(['/', '\\'])
}

#[derive(Debug)]
pub enum CrashStoreError {
    Io(io::Error),
    /// Name is not a crash report file name.
    InvalidName(String),
}

impl Display for CrashStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "crash store io failed: {err}"),
            Self::InvalidName(name) => write!(f, "not a crash report name: `{name}`"),
        }
    }
}

impl Error for CrashStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::InvalidName(_) => None,
        }
    }
}

impl From<io::Error> for CrashStoreError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

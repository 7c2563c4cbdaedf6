//! Host session info and the host-version-keyed cache.
//!
//! # Responsibility
//! - Record which host version this process runs against.
//! - Keep cached lookup artifacts only while the host version is unchanged.
//!
//! # Invariants
//! - `VersionCache::init` runs at most once per process start.
//! - A host version change (or an unreadable marker) empties the cache.

use crate::host::HostPackageInfo;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const VERSION_CACHE_DIR: &str = "cache";
const CACHE_META_FILE: &str = "cache_meta.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSessionInfo {
    pub version_name: String,
    pub version_code: i64,
    /// Host version recorded by the previous process start, if any.
    pub previous_version: Option<String>,
}

impl HostSessionInfo {
    pub fn version_changed(&self) -> bool {
        self.previous_version.as_deref() != Some(self.version_name.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    host_version: String,
    host_version_code: i64,
}

/// Key/value file cache invalidated on host version change.
#[derive(Debug, Clone)]
pub struct VersionCache {
    dir: PathBuf,
}

impl VersionCache {
    /// Opens `<data_dir>/cache` for the given host version.
    pub fn init(
        data_dir: &Path,
        package: &HostPackageInfo,
    ) -> Result<(Self, HostSessionInfo), SessionError> {
        let dir = data_dir.join(VERSION_CACHE_DIR);
        fs::create_dir_all(&dir)?;
        let cache = Self { dir };

        let previous = cache.read_meta();
        let session = HostSessionInfo {
            version_name: package.version_name.clone(),
            version_code: package.version_code,
            previous_version: previous.map(|meta| meta.host_version),
        };

        if session.version_changed() {
            let removed = cache.clear()?;
            info!(
                "event=cache_invalidated module=session status=ok previous={} current={} removed={}",
                session.previous_version.as_deref().unwrap_or("none"),
                session.version_name,
                removed
            );
            let meta = CacheMeta {
                host_version: session.version_name.clone(),
                host_version_code: session.version_code,
            };
            let encoded = serde_json::to_string(&meta)?;
            fs::write(cache.dir.join(CACHE_META_FILE), encoded)?;
        }
        Ok((cache, session))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let path = self.entry_path(key)?;
        match fs::read_to_string(path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn put(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let path = self.entry_path(key)?;
        fs::write(path, value)?;
        Ok(())
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, SessionError> {
        let valid = !key.is_empty()
            && key != CACHE_META_FILE
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(SessionError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }

    fn read_meta(&self) -> Option<CacheMeta> {
        let raw = fs::read_to_string(self.dir.join(CACHE_META_FILE)).ok()?;
        match serde_json::from_str(&raw) {
            Ok(meta) => Some(meta),
            Err(err) => {
                warn!("event=cache_meta module=session status=error error={err}");
                None
            }
        }
    }

    fn clear(&self) -> Result<usize, SessionError> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            removed += 1;
        }
        Ok(removed)
    }
}

#[derive(Debug)]
pub enum SessionError {
    Io(io::Error),
    Encode(serde_json::Error),
    InvalidKey(String),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "version cache io failed: {err}"),
            Self::Encode(err) => write!(f, "version cache metadata encode failed: {err}"),
            Self::InvalidKey(key) => write!(f, "invalid version cache key: `{key}`"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Encode(err) => Some(err),
            Self::InvalidKey(_) => None,
        }
    }
}

impl From<io::Error> for SessionError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encode(value)
    }
}

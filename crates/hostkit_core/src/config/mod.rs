//! Bootstrap configuration.
//!
//! # Responsibility
//! - Load optional settings from `<data_dir>/hostkit.json`.
//! - Provide the process-wide runtime key/value holder ([`RuntimeConfig`]).
//!
//! # Invariants
//! - A missing config file yields defaults; a malformed one is an error.
//! - Every field is optional in the file.

pub mod runtime;

pub use runtime::RuntimeConfig;

use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};

/// Config file name inside the module data directory.
pub const CONFIG_FILE_NAME: &str = "hostkit.json";

/// Whether dynamic payload loading is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
    /// Dynamic loading disabled; the statically linked module is used.
    Development,
    Production,
}

impl BuildMode {
    /// Mode implied by the compilation profile.
    pub fn current() -> Self {
        if cfg!(debug_assertions) {
            Self::Development
        } else {
            Self::Production
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl Default for BuildMode {
    fn default() -> Self {
        Self::current()
    }
}

/// Host type names the bootstrap hooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostTargets {
    /// Top-level startup object; its `attachBaseContext` starts the module.
    pub startup_object: String,
    /// Internal application delegate; its `onCreate` exposes the host app.
    pub application_delegate: String,
    /// Main screen hooked in the primary process.
    pub launcher_screen: String,
}

impl Default for HostTargets {
    fn default() -> Self {
        Self {
            startup_object: "host.app.BaseApplication".to_string(),
            application_delegate: "host.app.ApplicationLike".to_string(),
            launcher_screen: "host.ui.LauncherUI".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Host package name; used to derive the process role.
    pub host_package: String,
    pub log_level: String,
    /// Shared library exporting the `hostkit_native_*` symbols.
    pub native_library: Option<PathBuf>,
    /// Hex BLAKE3 digest the module file must match.
    pub expected_module_digest: Option<String>,
    pub build_mode: BuildMode,
    /// Host preference file holding session identifiers.
    /// Defaults to `<host_package>_preferences`.
    pub preferences_file: Option<String>,
    pub targets: HostTargets,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            host_package: String::new(),
            log_level: default_log_level().to_string(),
            native_library: None,
            expected_module_digest: None,
            build_mode: BuildMode::current(),
            preferences_file: None,
            targets: HostTargets::default(),
        }
    }
}

impl BootstrapConfig {
    /// Loads `<data_dir>/hostkit.json`, or defaults when it does not exist.
    pub fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join(CONFIG_FILE_NAME);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(ConfigError::Io { path, source: err }),
        };
        Self::from_json(&raw).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse { path, source },
            other => other,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::from(CONFIG_FILE_NAME),
            source,
        })
    }

    pub fn preferences_file(&self) -> String {
        match &self.preferences_file {
            Some(file) => file.clone(),
            None => format!("{}_preferences", self.host_package),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: io::Error },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse config `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
        }
    }
}

//! Host-side collaborator contracts.
//!
//! # Responsibility
//! - Describe what the host process offers to the bootstrap: lifecycle hook
//!   installation, the objects those hooks observe, and the loader service.
//! - Classify the current process into a [`ProcessRole`].
//!
//! # Invariants
//! - The process role is derived once per process and never changes.
//! - Hook callbacks run synchronously on the thread the host fires them on.

use crate::namespace::SymbolTable;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Integer code handed to payload entry points for the primary role.
pub const ROLE_CODE_PRIMARY: i32 = 1;
/// Integer code handed to payload entry points for secondary worker roles.
pub const ROLE_CODE_SECONDARY: i32 = 2;
/// Integer code for every other process.
pub const ROLE_CODE_OTHER: i32 = 0;

/// Responsibility held by the current host process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessRole {
    /// UI-bearing main process.
    Primary,
    /// `<package>:<suffix>` worker process.
    Secondary,
    Other,
}

impl ProcessRole {
    /// Classifies a process name against the host package name.
    ///
    /// - `<package>` -> `Primary`
    /// - `<package>:<anything>` -> `Secondary`
    /// - anything else -> `Other`
    pub fn from_process_name(process_name: &str, host_package: &str) -> Self {
        let name = process_name.trim();
        let package = host_package.trim();
        if package.is_empty() || name.is_empty() {
            return Self::Other;
        }
        if name == package {
            return Self::Primary;
        }
        match name.strip_prefix(package) {
            Some(rest) if rest.starts_with(':') && rest.len() > 1 => Self::Secondary,
            _ => Self::Other,
        }
    }

    /// Derives the role of the running process.
    pub fn detect(host_package: &str) -> Self {
        Self::from_process_name(&current_process_name(), host_package)
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Primary => ROLE_CODE_PRIMARY,
            Self::Secondary => ROLE_CODE_SECONDARY,
            Self::Other => ROLE_CODE_OTHER,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Other => "other",
        }
    }
}

/// Returns the current process name.
///
/// Reads the first NUL-separated field of `/proc/self/cmdline`, falling back
/// to the executable file name when procfs is unavailable.
pub fn current_process_name() -> String {
    if let Ok(raw) = std::fs::read("/proc/self/cmdline") {
        let first = raw.split(|byte| *byte == 0).next().unwrap_or_default();
        let name = String::from_utf8_lossy(first).trim().to_string();
        if !name.is_empty() {
            return name;
        }
    }
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_default()
}

/// Host method whose completion a hook observes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookTarget {
    /// Fully qualified host type name.
    pub type_name: String,
    pub method: String,
}

impl HookTarget {
    pub fn new(type_name: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            method: method.into(),
        }
    }
}

impl Display for HookTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.type_name, self.method)
    }
}

/// Package metadata the host reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPackageInfo {
    pub package_name: String,
    pub version_name: String,
    pub version_code: i64,
}

/// Opaque handle to the host's top-level application object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAppHandle {
    /// Host-defined identity of the application object.
    pub id: String,
}

/// The object a lifecycle hook fires on.
pub trait HostObject {
    /// Resolution context the host uses for its own code.
    fn namespace(&self) -> Arc<SymbolTable>;

    fn package_info(&self) -> Result<HostPackageInfo, HostError>;

    /// Top-level application object reachable from this object, if any.
    fn application(&self) -> Option<HostAppHandle>;

    /// Reads one string value from a host-owned preference file.
    fn preference(&self, file: &str, key: &str) -> Option<String>;
}

/// Callback invoked after a hooked host method returns.
pub type HookCallback = Arc<dyn Fn(&dyn HostObject) + Send + Sync>;

/// Lifecycle interception capability supplied by the hosting framework.
pub trait HostHooks: Send + Sync {
    /// Installs `callback` to run after `target` completes.
    fn hook_after(&self, target: &HookTarget, callback: HookCallback) -> Result<(), HookError>;
}

/// Services offered by the framework that loaded this module.
pub trait LoaderService: Send + Sync {
    fn entry_point_name(&self) -> String;
    fn entry_point_version(&self) -> String;
    fn main_module_path(&self) -> String;
    /// Answers framework-specific extension queries; `None` when unsupported.
    fn query_extension(&self, command: &str) -> Option<String>;
}

/// Hook installation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    /// Target type or method does not exist in the host.
    TargetNotFound(String),
    /// No hooking capability was supplied at entry.
    BridgeUnavailable,
    Rejected(String),
}

impl Display for HookError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TargetNotFound(target) => write!(f, "hook target not found: {target}"),
            Self::BridgeUnavailable => write!(f, "no hook bridge available"),
            Self::Rejected(message) => write!(f, "hook installation rejected: {message}"),
        }
    }
}

impl Error for HookError {}

/// Failure reported by a host object accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    Unavailable(String),
}

impl Display for HostError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(what) => write!(f, "host data unavailable: {what}"),
        }
    }
}

impl Error for HostError {}

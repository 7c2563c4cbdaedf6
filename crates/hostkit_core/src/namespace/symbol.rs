//! Symbol tables backing each resolution layer.

use crate::bootstrap::StartupPhaseFn;
use crate::extension::contract::{EntryPoint, HookFactoryDelegate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static SYMBOL_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:(?:::|\.)[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("valid symbol name regex")
});

/// Zero-argument constructor for a payload entry point.
pub type EntryPointCtor = fn() -> Box<dyn EntryPoint>;
/// Reads the singleton delegate instance exposed by a factory type.
pub type FactoryAccessor = fn() -> Option<Arc<dyn HookFactoryDelegate>>;

/// Which code source defined a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SymbolOrigin {
    /// Decoded from the extension payload.
    Payload,
    /// Statically linked into this module.
    Module,
    /// Supplied by the host process.
    Host,
}

impl SymbolOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Payload => "payload",
            Self::Module => "module",
            Self::Host => "host",
        }
    }
}

/// Kind tag of one symbol definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    EntryPoint,
    Factory,
    StartupPhase,
    Export,
}

impl Display for SymbolKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Self::EntryPoint => "entry_point",
            Self::Factory => "factory",
            Self::StartupPhase => "startup_phase",
            Self::Export => "export",
        };
        f.write_str(value)
    }
}

/// Typed definition bound to a symbol name.
#[derive(Clone, Copy)]
pub enum SymbolDef {
    EntryPoint(EntryPointCtor),
    Factory(FactoryAccessor),
    StartupPhase(StartupPhaseFn),
    /// Plain export with no loader-visible behavior.
    Export,
}

impl SymbolDef {
    pub fn kind(&self) -> SymbolKind {
        match self {
            Self::EntryPoint(_) => SymbolKind::EntryPoint,
            Self::Factory(_) => SymbolKind::Factory,
            Self::StartupPhase(_) => SymbolKind::StartupPhase,
            Self::Export => SymbolKind::Export,
        }
    }
}

impl Debug for SymbolDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymbolDef::{}", self.kind())
    }
}

/// Locally defined symbols of one resolution layer.
///
/// Names are kept sorted so iteration and diagnostics are deterministic.
/// Every [`SymbolTable::lookup`] is counted.
pub struct SymbolTable {
    origin: SymbolOrigin,
    label: String,
    entries: BTreeMap<String, SymbolDef>,
    lookups: AtomicUsize,
}

impl SymbolTable {
    pub fn new(origin: SymbolOrigin, label: impl Into<String>) -> Self {
        Self {
            origin,
            label: label.into(),
            entries: BTreeMap::new(),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Defines one symbol.
    ///
    /// # Errors
    /// - `InvalidName` when `name` is not a `::`/`.` separated identifier path.
    /// - `Duplicate` when `name` is already defined in this table.
    pub fn define(&mut self, name: &str, def: SymbolDef) -> Result<(), SymbolError> {
        if !is_valid_symbol_name(name) {
            return Err(SymbolError::InvalidName(name.to_string()));
        }
        if self.entries.contains_key(name) {
            return Err(SymbolError::Duplicate(name.to_string()));
        }
        self.entries.insert(name.to_string(), def);
        Ok(())
    }

    /// Builder form of [`SymbolTable::define`].
    pub fn with(mut self, name: &str, def: SymbolDef) -> Result<Self, SymbolError> {
        self.define(name, def)?;
        Ok(self)
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolDef> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.entries.get(name).copied()
    }

    /// Membership test that does not count as a lookup.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of [`SymbolTable::lookup`] calls served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn origin(&self) -> SymbolOrigin {
        self.origin
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Debug for SymbolTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolTable")
            .field("origin", &self.origin)
            .field("label", &self.label)
            .field("symbols", &self.entries.len())
            .finish()
    }
}

pub fn is_valid_symbol_name(name: &str) -> bool {
    SYMBOL_NAME_RE.is_match(name)
}

/// Symbol table definition errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    InvalidName(String),
    Duplicate(String),
}

impl Display for SymbolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "invalid symbol name: `{name}`"),
            Self::Duplicate(name) => write!(f, "symbol already defined: `{name}`"),
        }
    }
}

impl Error for SymbolError {}

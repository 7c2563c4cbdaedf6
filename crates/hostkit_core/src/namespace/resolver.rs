//! Layered symbol resolution.
//!
//! # Responsibility
//! - Answer "which code defines this name" for code running inside the
//!   extension, by consulting resolution layers in a fixed order.
//!
//! # Invariants
//! - Layers are an ordered list; the first layer defining a name wins.
//! - A resolver is immutable once built. Deriving a child produces a new
//!   resolver and leaves the parent untouched, so resolution always
//!   terminates.

use crate::namespace::symbol::{SymbolDef, SymbolOrigin, SymbolTable};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// One successful resolution.
#[derive(Debug, Clone, Copy)]
pub struct Resolved {
    pub origin: SymbolOrigin,
    pub def: SymbolDef,
}

/// Ordered list of symbol tables, highest priority first.
#[derive(Clone)]
pub struct LayeredResolver {
    layers: Vec<Arc<SymbolTable>>,
}

impl LayeredResolver {
    /// Resolver with a single layer and no parent.
    pub fn root(table: Arc<SymbolTable>) -> Self {
        Self {
            layers: vec![table],
        }
    }

    /// Resolver whose own layer is `table`, falling back to `parent`.
    pub fn child_of(parent: &LayeredResolver, table: Arc<SymbolTable>) -> Self {
        let mut layers = Vec::with_capacity(parent.layers.len() + 1);
        layers.push(table);
        layers.extend(parent.layers.iter().cloned());
        Self { layers }
    }

    pub fn resolve(&self, name: &str) -> Option<Resolved> {
        self.layers.iter().find_map(|layer| {
            layer.lookup(name).map(|def| Resolved {
                origin: layer.origin(),
                def,
            })
        })
    }

    /// Origins of every layer, highest priority first.
    pub fn origins(&self) -> Vec<SymbolOrigin> {
        self.layers.iter().map(|layer| layer.origin()).collect()
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}

impl Debug for LayeredResolver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.layers.iter().map(|layer| layer.label()))
            .finish()
    }
}

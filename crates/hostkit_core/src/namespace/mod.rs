//! Resolution contexts for code running inside the extension.
//!
//! Three contexts cooperate, highest priority first:
//! - payload-backed context: symbols decoded from the extension payload;
//! - priority context: symbols statically linked into this module;
//! - host-facing context: symbols the host process supplies.
//!
//! This keeps the payload from accidentally binding to a same-named host
//! symbol when the module ships its own definition.

pub mod resolver;
pub mod symbol;

pub use resolver::{LayeredResolver, Resolved};
pub use symbol::{
    is_valid_symbol_name, EntryPointCtor, FactoryAccessor, SymbolDef, SymbolError, SymbolKind,
    SymbolOrigin, SymbolTable,
};

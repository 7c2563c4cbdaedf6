//! Extension activation.
//!
//! # Responsibility
//! - Define the contracts activated code implements ([`contract`]).
//! - Link the payload and activate it, or the statically linked module
//!   ([`loader`], [`linker`], [`builtin`]).
//! - Expose the activated delegate to static code ([`bridge`]).

pub mod bridge;
pub mod builtin;
pub mod contract;
pub mod linker;
pub mod loader;

pub use bridge::DelegateBridge;
pub use contract::{
    ActivationError, EntryPoint, HookFactoryDelegate, ENTRY_POINT_SYMBOL, FACTORY_SYMBOL,
    STARTUP_PHASE_SYMBOL,
};
pub use linker::{DylibPayloadLinker, LinkError, PayloadDescriptor, PayloadLinker};
pub use loader::{
    ActivationOutcome, ActivationPath, ActivationReport, ExtensionLoader, FallbackReason,
    LoaderDeps, StepResult,
};

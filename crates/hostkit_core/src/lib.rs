//! Core of the hostkit module bootstrap.
//! Owns the trust gate, payload activation and the one-shot startup sequence.

pub mod bootstrap;
pub mod config;
pub mod crash;
pub mod extension;
pub mod host;
pub mod logging;
pub mod namespace;
pub mod native;
pub mod session;
pub mod trust;

pub use bootstrap::{
    bootstrap_state, current_context, entry, entry_with, BootstrapContext, BootstrapState,
    BootstrapViolation, Bootstrapper, EntryRequest, LaunchReport, Launcher, ModuleServices,
};
pub use config::{BootstrapConfig, BuildMode, ConfigError, RuntimeConfig};
pub use crash::{CrashLogStore, CrashReport, CrashStoreError};
pub use extension::{
    ActivationOutcome, ActivationPath, DelegateBridge, EntryPoint, ExtensionLoader,
    HookFactoryDelegate, LoaderDeps, StepResult,
};
pub use host::{HookTarget, HostHooks, HostObject, LoaderService, ProcessRole};
pub use logging::{default_log_level, init_logging, logging_status};
pub use namespace::{LayeredResolver, SymbolDef, SymbolOrigin, SymbolTable};
pub use native::{ExtensionPayload, NativeBackend, NativePayloadSource};
pub use trust::{DigestVerifier, SignatureVerifier, TrustGate};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

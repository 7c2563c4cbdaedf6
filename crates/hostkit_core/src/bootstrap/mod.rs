//! One-shot module bootstrap.
//!
//! # Responsibility
//! - Accept the host entry call exactly once per process.
//! - Run the startup phase when the host starts, then the orchestrator.
//!
//! # See also
//! - crate::extension::loader for what the orchestrator finally triggers.

pub mod context;
pub mod entry;
pub mod launcher;
pub mod state;

pub use context::{BootstrapContext, EntryRequest, ModuleServices, StartupInfo};
pub use entry::{
    bootstrap_state, current_context, entry, entry_with, Bootstrapper, StartupPhaseFn,
};
pub use launcher::{load_session_preferences, startup_agent, LaunchReport, Launcher};
pub use state::{BootstrapState, BootstrapStateMachine, BootstrapViolation};

//! Contracts between the loader and the code it activates.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Well-known name of the entry point type inside payload and module.
pub const ENTRY_POINT_SYMBOL: &str = "hostkit::hooks::HookItemLoader";
/// Well-known name of the factory type exposing the delegate singleton.
pub const FACTORY_SYMBOL: &str = "hostkit::hooks::factory::HookItemFactory";
/// Well-known name of the secondary startup phase.
pub const STARTUP_PHASE_SYMBOL: &str = "hostkit::startup::StartupAgent";

/// Payload entry point. Constructed with no arguments, invoked once.
pub trait EntryPoint: Send {
    /// Activates hook items appropriate for the given process role code.
    fn load_hook_items(&mut self, role_code: i32) -> Result<(), ActivationError>;
}

/// Capability object exposed by whichever code path activated.
///
/// Statically compiled code reaches it through
/// [`DelegateBridge`](crate::extension::bridge::DelegateBridge).
pub trait HookFactoryDelegate: Send + Sync {
    /// Stable identity of the factory, e.g. `payload` or `builtin`.
    fn factory_id(&self) -> &str;

    /// Names of the hook items this factory can produce.
    fn hook_item_names(&self) -> Vec<String>;
}

/// Failure raised by activated code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationError {
    HookItem { item: String, message: String },
    Failed(String),
}

impl Display for ActivationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HookItem { item, message } => write!(f, "hook item `{item}` failed: {message}"),
            Self::Failed(message) => write!(f, "activation failed: {message}"),
        }
    }
}

impl Error for ActivationError {}

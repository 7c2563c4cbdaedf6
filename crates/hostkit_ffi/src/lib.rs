//! C ABI surface of the hostkit module.

pub mod api;

pub use api::{
    hostkit_core_version, hostkit_entry, hostkit_hook_fired, hostkit_init_logging,
    HostkitEntryRequest, HostkitHostObject, HostkitHostServices,
};

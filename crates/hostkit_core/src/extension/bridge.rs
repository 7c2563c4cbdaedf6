//! Single-slot delegate registry.
//!
//! # Responsibility
//! - Hand the capability object supplied by the activated code (payload or
//!   fallback) to statically compiled code that predates it.
//!
//! # Invariants
//! - One slot; the latest registration wins and never errors.
//! - An empty slot is a normal state, not a failure.

use crate::extension::contract::HookFactoryDelegate;
use log::{info, warn};
use std::sync::{Arc, RwLock};

#[derive(Default)]
pub struct DelegateBridge {
    slot: RwLock<Option<Arc<dyn HookFactoryDelegate>>>,
}

impl DelegateBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `delegate`, replacing any earlier registration.
    pub fn register_delegate(&self, delegate: Arc<dyn HookFactoryDelegate>) {
        let factory_id = delegate.factory_id().to_string();
        let mut slot = match self.slot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = slot.replace(delegate) {
            warn!(
                "event=delegate_replaced module=bridge status=ok previous={} current={}",
                previous.factory_id(),
                factory_id
            );
        } else {
            info!(
                "event=delegate_registered module=bridge status=ok factory={}",
                factory_id
            );
        }
    }

    /// Returns the registered delegate, if any.
    pub fn delegate(&self) -> Option<Arc<dyn HookFactoryDelegate>> {
        match self.slot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.delegate().is_some()
    }
}

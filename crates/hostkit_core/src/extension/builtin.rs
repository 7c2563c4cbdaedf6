//! Statically linked fallback module.
//!
//! Exposes the same well-known symbols a payload does, so the loader can
//! activate it through the same steps when dynamic loading is unavailable.

use crate::bootstrap::{current_context, startup_agent};
use crate::crash::CrashLogStore;
use crate::extension::contract::{
    ActivationError, EntryPoint, HookFactoryDelegate, ENTRY_POINT_SYMBOL, FACTORY_SYMBOL,
    STARTUP_PHASE_SYMBOL,
};
use crate::host::{ROLE_CODE_OTHER, ROLE_CODE_PRIMARY, ROLE_CODE_SECONDARY};
use crate::logging::{attach_crash_store, crash_store};
use crate::namespace::{SymbolDef, SymbolError, SymbolOrigin, SymbolTable};
use log::{error, info, warn};
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Factory id reported by the statically linked delegate.
pub const BUILTIN_FACTORY_ID: &str = "builtin";

static BUILTIN_FACTORY: Lazy<Arc<BuiltinHookFactory>> =
    Lazy::new(|| Arc::new(BuiltinHookFactory));

/// One hook item shipped with the module.
struct BuiltinHookItem {
    name: &'static str,
    roles: &'static [i32],
    install: fn() -> Result<(), String>,
}

const BUILTIN_HOOK_ITEMS: &[BuiltinHookItem] = &[
    BuiltinHookItem {
        name: "crash_interceptor",
        roles: &[ROLE_CODE_PRIMARY, ROLE_CODE_SECONDARY, ROLE_CODE_OTHER],
        install: install_crash_interceptor,
    },
    BuiltinHookItem {
        name: "pending_crash_notice",
        roles: &[ROLE_CODE_PRIMARY],
        install: report_pending_crash,
    },
];

/// Symbol table of this module.
pub fn module_symbols() -> Result<SymbolTable, SymbolError> {
    SymbolTable::new(SymbolOrigin::Module, "module:builtin")
        .with(ENTRY_POINT_SYMBOL, SymbolDef::EntryPoint(new_entry_point))?
        .with(FACTORY_SYMBOL, SymbolDef::Factory(factory_instance))?
        .with(STARTUP_PHASE_SYMBOL, SymbolDef::StartupPhase(startup_agent))
}

fn new_entry_point() -> Box<dyn EntryPoint> {
    Box::new(BuiltinHookItemLoader)
}

fn factory_instance() -> Option<Arc<dyn HookFactoryDelegate>> {
    let factory: Arc<dyn HookFactoryDelegate> = BUILTIN_FACTORY.clone();
    Some(factory)
}

/// Installs every built-in hook item that applies to the role.
pub struct BuiltinHookItemLoader;

impl EntryPoint for BuiltinHookItemLoader {
    fn load_hook_items(&mut self, role_code: i32) -> Result<(), ActivationError> {
        let mut first_failure = None;
        for item in BUILTIN_HOOK_ITEMS
            .iter()
            .filter(|item| item.roles.contains(&role_code))
        {
            match (item.install)() {
                Ok(()) => info!(
                    "event=hook_item module=builtin status=ok item={} role={role_code}",
                    item.name
                ),
                Err(message) => {
                    error!(
                        "event=hook_item module=builtin status=error item={} error={message}",
                        item.name
                    );
                    first_failure.get_or_insert(ActivationError::HookItem {
                        item: item.name.to_string(),
                        message,
                    });
                }
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub struct BuiltinHookFactory;

impl HookFactoryDelegate for BuiltinHookFactory {
    fn factory_id(&self) -> &str {
        BUILTIN_FACTORY_ID
    }

    fn hook_item_names(&self) -> Vec<String> {
        BUILTIN_HOOK_ITEMS
            .iter()
            .map(|item| item.name.to_string())
            .collect()
    }
}

fn install_crash_interceptor() -> Result<(), String> {
    if crash_store().is_some() {
        return Ok(());
    }
    let Some(ctx) = current_context() else {
        warn!("event=hook_item module=builtin status=skip item=crash_interceptor reason=no_context");
        return Ok(());
    };
    let store = CrashLogStore::open(ctx.startup().data_dir()).map_err(|err| err.to_string())?;
    attach_crash_store(Arc::new(store));
    Ok(())
}

fn report_pending_crash() -> Result<(), String> {
    let Some(store) = crash_store() else {
        return Ok(());
    };
    if let Some(path) = store.pending_file() {
        warn!(
            "event=pending_crash module=builtin status=ok file={}",
            path.display()
        );
    }
    Ok(())
}

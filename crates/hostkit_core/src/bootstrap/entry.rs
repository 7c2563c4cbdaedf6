//! Host-to-module entry.
//!
//! # Responsibility
//! - Enforce the one-shot entry contract.
//! - Wire the bootstrap context and hook the host startup object.
//!
//! # Invariants
//! - A second process-wide entry call panics; bootstrap state is unchanged.
//! - Each hook installation is independent; a failure is logged only.
//! - The startup phase runs at most once, even if the host fires the
//!   startup callback again.

use crate::bootstrap::context::{BootstrapContext, EntryRequest, ModuleServices};
use crate::bootstrap::state::{BootstrapState, BootstrapStateMachine, BootstrapViolation};
use crate::config::BootstrapConfig;
use crate::extension::contract::STARTUP_PHASE_SYMBOL;
use crate::extension::loader::StepResult;
use crate::host::{HookCallback, HookTarget, HostObject};
use crate::logging::{contain_panic, describe_panic, init_logging};
use crate::namespace::{Resolved, SymbolDef};
use log::{error, info, warn};
use once_cell::sync::{Lazy, OnceCell};
use std::sync::Arc;

const LOG_DIR_NAME: &str = "logs";

static PROCESS_BOOTSTRAPPER: Lazy<Bootstrapper> = Lazy::new(Bootstrapper::with_logging);
static PROCESS_CONTEXT: OnceCell<Arc<BootstrapContext>> = OnceCell::new();

/// Signature of the startup phase resolved by name when the host starts.
pub type StartupPhaseFn = fn(&Arc<BootstrapContext>, &dyn HostObject) -> StepResult;

/// Process-wide entry with production collaborators.
///
/// # Panics
/// Panics when called more than once per process.
pub fn entry(request: EntryRequest) -> Arc<BootstrapContext> {
    entry_with(request, ModuleServices::production)
}

/// Process-wide entry with caller-chosen collaborators.
///
/// # Panics
/// Panics when called more than once per process.
pub fn entry_with<F>(request: EntryRequest, services: F) -> Arc<BootstrapContext>
where
    F: FnOnce(&BootstrapConfig, &EntryRequest) -> ModuleServices,
{
    match PROCESS_BOOTSTRAPPER.run(request, services) {
        Ok(ctx) => {
            let _ = PROCESS_CONTEXT.set(Arc::clone(&ctx));
            ctx
        }
        Err(violation) => panic!("hostkit entry called twice: {violation}"),
    }
}

/// Context created by the process-wide entry, if it has run.
pub fn current_context() -> Option<Arc<BootstrapContext>> {
    PROCESS_CONTEXT.get().cloned()
}

pub fn bootstrap_state() -> BootstrapState {
    PROCESS_BOOTSTRAPPER.state()
}

/// Runs the entry sequence against its own state machine.
pub struct Bootstrapper {
    state: Arc<BootstrapStateMachine>,
    init_logging: bool,
}

impl Bootstrapper {
    /// Bootstrapper that leaves logger setup to the caller.
    pub fn new() -> Self {
        Self {
            state: Arc::new(BootstrapStateMachine::new()),
            init_logging: false,
        }
    }

    /// Bootstrapper that initializes file logging under `<data_dir>/logs`.
    pub fn with_logging() -> Self {
        Self {
            init_logging: true,
            ..Self::new()
        }
    }

    pub fn state(&self) -> BootstrapState {
        self.state.state()
    }

    pub fn run<F>(
        &self,
        request: EntryRequest,
        services: F,
    ) -> Result<Arc<BootstrapContext>, BootstrapViolation>
    where
        F: FnOnce(&BootstrapConfig, &EntryRequest) -> ModuleServices,
    {
        if let Err(violation) = self.state.attach() {
            error!("event=bootstrap_entry module=bootstrap status=error error={violation}");
            return Err(violation);
        }

        let loaded = BootstrapConfig::load(&request.data_dir);
        let config = loaded.as_ref().cloned().unwrap_or_default();
        if self.init_logging {
            let log_dir = request.data_dir.join(LOG_DIR_NAME);
            if let Err(err) = init_logging(&config.log_level, &log_dir.to_string_lossy()) {
                warn!("event=logging_init module=bootstrap status=error error={err}");
            }
        }
        if let Err(err) = &loaded {
            error!("event=config_load module=bootstrap status=error error={err}");
        }

        info!(
            "event=bootstrap_entry module=bootstrap status=ok version={} build_mode={} loader={} loader_version={}",
            env!("CARGO_PKG_VERSION"),
            config.build_mode.as_str(),
            request.loader_service.entry_point_name(),
            request.loader_service.entry_point_version()
        );

        let services = services(&config, &request);
        let ctx = Arc::new(BootstrapContext::assemble(
            request,
            config,
            services,
            Arc::clone(&self.state),
        ));
        install_startup_hook(&ctx);
        Ok(ctx)
    }
}

impl Default for Bootstrapper {
    fn default() -> Self {
        Self::new()
    }
}

fn install_startup_hook(ctx: &Arc<BootstrapContext>) {
    let target = HookTarget::new(
        ctx.config().targets.startup_object.as_str(),
        "attachBaseContext",
    );
    let handle = Arc::clone(ctx);
    let callback: HookCallback = Arc::new(move |host: &dyn HostObject| {
        on_startup_attached(&handle, host);
    });
    ctx.install_hook(&target, callback);
}

fn on_startup_attached(ctx: &Arc<BootstrapContext>, host: &dyn HostObject) {
    if let Err(violation) = ctx.state().activate() {
        warn!("event=startup_phase module=bootstrap status=skip reason={violation}");
        return;
    }

    match run_startup_phase(ctx, host) {
        StepResult::Ok => info!("event=startup_phase module=bootstrap status=ok"),
        StepResult::Failed(message) => {
            error!("event=startup_phase module=bootstrap status=error error={message}")
        }
    }

    let target = HookTarget::new(
        ctx.config().targets.application_delegate.as_str(),
        "onCreate",
    );
    let handle = Arc::clone(ctx);
    let callback: HookCallback = Arc::new(move |host: &dyn HostObject| {
        capture_host_app(&handle, host);
    });
    ctx.install_hook(&target, callback);
}

fn run_startup_phase(ctx: &Arc<BootstrapContext>, host: &dyn HostObject) -> StepResult {
    let phase = match ctx.module_resolver().resolve(STARTUP_PHASE_SYMBOL) {
        Some(Resolved {
            def: SymbolDef::StartupPhase(phase),
            ..
        }) => phase,
        Some(resolved) => {
            return StepResult::Failed(format!(
                "`{STARTUP_PHASE_SYMBOL}` is {}, expected startup_phase",
                resolved.def.kind()
            ))
        }
        None => return StepResult::Failed(format!("`{STARTUP_PHASE_SYMBOL}` not found")),
    };
    match contain_panic(|| phase(ctx, host)) {
        Ok(result) => result,
        Err(panic) => StepResult::Failed(format!(
            "startup phase panicked: {}",
            describe_panic(panic.as_ref())
        )),
    }
}

fn capture_host_app(ctx: &BootstrapContext, host: &dyn HostObject) {
    match host.application() {
        Some(handle) => {
            let id = handle.id.clone();
            if ctx.startup().capture_host_app(handle) {
                info!("event=host_app module=bootstrap status=ok id={id}");
            }
        }
        None => warn!("event=host_app module=bootstrap status=skip reason=not_available"),
    }
}

//! Process-wide bootstrap context.
//!
//! # Responsibility
//! - Own every collaborator the startup sequence needs, wired once at entry.
//! - Carry the delegate bridge as an injected slot instead of a bare global.
//!
//! # Invariants
//! - The module resolver is built once at entry: module symbols first, then
//!   the caller-supplied host namespace. It is never mutated afterwards.
//! - The host application handle is captured at most once.

use crate::bootstrap::launcher::LaunchReport;
use crate::bootstrap::state::BootstrapStateMachine;
use crate::config::{BootstrapConfig, RuntimeConfig};
use crate::extension::bridge::DelegateBridge;
use crate::extension::builtin;
use crate::extension::linker::{DylibPayloadLinker, PayloadLinker};
use crate::extension::loader::StepResult;
use crate::host::{
    HookCallback, HookError, HookTarget, HostAppHandle, HostHooks, LoaderService, ProcessRole,
};
use crate::namespace::{LayeredResolver, SymbolOrigin, SymbolTable};
use crate::native::{DylibNativeBackend, NativePayloadSource};
use crate::trust::{DigestVerifier, SignatureVerifier, TrustGate};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Arguments of the host-to-module entry call.
pub struct EntryRequest {
    /// Path of this module's own file.
    pub module_path: PathBuf,
    /// Writable directory owned by this module.
    pub data_dir: PathBuf,
    pub loader_service: Arc<dyn LoaderService>,
    /// Resolution context the host wants module code to see.
    pub host_namespace: Arc<SymbolTable>,
    /// Hooking capability; `None` when the hosting framework offers none.
    pub hooks: Option<Arc<dyn HostHooks>>,
}

/// Replaceable collaborators. Production wiring comes from
/// [`ModuleServices::production`]; tests substitute fakes.
pub struct ModuleServices {
    pub native: Arc<NativePayloadSource>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub linker: Arc<dyn PayloadLinker>,
    pub module_symbols: Arc<SymbolTable>,
    /// Fixed role; detected from the process name when `None`.
    pub role: Option<ProcessRole>,
}

impl ModuleServices {
    pub fn production(config: &BootstrapConfig, request: &EntryRequest) -> Self {
        let native = match &config.native_library {
            Some(path) => open_native(&resolve_near_module(&request.module_path, path)),
            None => {
                info!("event=native_library module=bootstrap status=skip reason=not_configured");
                NativePayloadSource::unavailable()
            }
        };
        let module_symbols = builtin::module_symbols().unwrap_or_else(|err| {
            error!("event=module_symbols module=bootstrap status=error error={err}");
            SymbolTable::new(SymbolOrigin::Module, "module:empty")
        });

        Self {
            native: Arc::new(native),
            verifier: Arc::new(DigestVerifier::new(
                &request.module_path,
                config.expected_module_digest.clone(),
            )),
            linker: Arc::new(DylibPayloadLinker::new(&request.data_dir)),
            module_symbols: Arc::new(module_symbols),
            role: None,
        }
    }
}

fn resolve_near_module(module_path: &Path, library: &Path) -> PathBuf {
    if library.is_absolute() {
        return library.to_path_buf();
    }
    module_path
        .parent()
        .map(|dir| dir.join(library))
        .unwrap_or_else(|| library.to_path_buf())
}

fn open_native(path: &Path) -> NativePayloadSource {
    match DylibNativeBackend::open(path) {
        Ok(backend) => {
            let source = NativePayloadSource::new(Arc::new(backend));
            source.mark_library_loaded();
            source
        }
        Err(err) => {
            error!(
                "event=native_library module=bootstrap status=error path={} error={err}",
                path.display()
            );
            NativePayloadSource::unavailable()
        }
    }
}

/// Startup facts other collaborators may query later.
pub struct StartupInfo {
    module_path: PathBuf,
    data_dir: PathBuf,
    loader_service: Arc<dyn LoaderService>,
    host_app: OnceCell<HostAppHandle>,
}

impl StartupInfo {
    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn loader_service(&self) -> &Arc<dyn LoaderService> {
        &self.loader_service
    }

    pub fn host_app(&self) -> Option<&HostAppHandle> {
        self.host_app.get()
    }

    /// Stores the host application handle. Returns `false` if one was
    /// already captured; the first one stays.
    pub fn capture_host_app(&self, handle: HostAppHandle) -> bool {
        self.host_app.set(handle).is_ok()
    }

    /// Forwards a framework-specific query to the loader service.
    pub fn query_extension(&self, command: &str) -> Option<String> {
        self.loader_service.query_extension(command)
    }
}

pub struct BootstrapContext {
    config: BootstrapConfig,
    startup: StartupInfo,
    role: ProcessRole,
    trust: Arc<TrustGate>,
    linker: Arc<dyn PayloadLinker>,
    module_symbols: Arc<SymbolTable>,
    module_resolver: LayeredResolver,
    bridge: Arc<DelegateBridge>,
    runtime: Arc<RuntimeConfig>,
    hooks: Option<Arc<dyn HostHooks>>,
    state: Arc<BootstrapStateMachine>,
    launch: OnceCell<LaunchReport>,
}

impl BootstrapContext {
    pub(crate) fn assemble(
        request: EntryRequest,
        config: BootstrapConfig,
        services: ModuleServices,
        state: Arc<BootstrapStateMachine>,
    ) -> Self {
        let role = services
            .role
            .unwrap_or_else(|| ProcessRole::detect(&config.host_package));
        let module_resolver = LayeredResolver::child_of(
            &LayeredResolver::root(Arc::clone(&request.host_namespace)),
            Arc::clone(&services.module_symbols),
        );
        let runtime = RuntimeConfig::new();
        runtime.set_host_namespace(request.host_namespace);

        Self {
            startup: StartupInfo {
                module_path: request.module_path,
                data_dir: request.data_dir,
                loader_service: request.loader_service,
                host_app: OnceCell::new(),
            },
            role,
            trust: Arc::new(TrustGate::new(services.native, services.verifier)),
            linker: services.linker,
            module_symbols: services.module_symbols,
            module_resolver,
            bridge: Arc::new(DelegateBridge::new()),
            runtime: Arc::new(runtime),
            hooks: request.hooks,
            state,
            launch: OnceCell::new(),
            config,
        }
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    pub fn startup(&self) -> &StartupInfo {
        &self.startup
    }

    pub fn role(&self) -> ProcessRole {
        self.role
    }

    pub fn trust(&self) -> &Arc<TrustGate> {
        &self.trust
    }

    pub fn native(&self) -> &Arc<NativePayloadSource> {
        self.trust.native()
    }

    pub fn linker(&self) -> &Arc<dyn PayloadLinker> {
        &self.linker
    }

    pub fn module_symbols(&self) -> &Arc<SymbolTable> {
        &self.module_symbols
    }

    /// Resolver for code of this module: module symbols, then host namespace.
    pub fn module_resolver(&self) -> &LayeredResolver {
        &self.module_resolver
    }

    pub fn bridge(&self) -> &Arc<DelegateBridge> {
        &self.bridge
    }

    pub fn runtime(&self) -> &Arc<RuntimeConfig> {
        &self.runtime
    }

    pub fn state(&self) -> &Arc<BootstrapStateMachine> {
        &self.state
    }

    /// Report of the orchestrator run, once it has happened.
    pub fn launch_report(&self) -> Option<&LaunchReport> {
        self.launch.get()
    }

    pub(crate) fn record_launch(&self, report: LaunchReport) {
        if self.launch.set(report).is_err() {
            error!("event=launch_report module=bootstrap status=skip reason=already_recorded");
        }
    }

    /// Installs one host hook. Failures are logged and returned as a value.
    pub fn install_hook(&self, target: &HookTarget, callback: HookCallback) -> StepResult {
        let installed = match &self.hooks {
            Some(hooks) => hooks.hook_after(target, callback),
            None => Err(HookError::BridgeUnavailable),
        };
        match installed {
            Ok(()) => {
                info!("event=hook_install module=bootstrap status=ok target={target}");
                StepResult::Ok
            }
            Err(err) => {
                error!("event=hook_install module=bootstrap status=error target={target} error={err}");
                StepResult::Failed(err.to_string())
            }
        }
    }
}

//! Startup orchestrator.
//!
//! # Responsibility
//! - Cache host facts, gate on trust, install role-specific hooks and run
//!   the extension loader, in that order.
//!
//! # Invariants
//! - Runs once per process, from inside the startup phase.
//! - Untrusted: log `launcher_abort` and stop; the loader never runs.
//! - Launcher screen hooks are installed only in the primary process.

use crate::bootstrap::context::BootstrapContext;
use crate::config::runtime::{
    PREF_LAST_LOGIN_NICKNAME, PREF_LAST_LOGIN_UIN, PREF_LOGIN_ACCOUNT_ID, PREF_LOGIN_USER_NAME,
};
use crate::config::RuntimeConfig;
use crate::extension::loader::{ActivationOutcome, ExtensionLoader, LoaderDeps, StepResult};
use crate::host::{HookCallback, HookTarget, HostObject, ProcessRole};
use crate::native::NativeInit;
use crate::session::{HostSessionInfo, VersionCache};
use crate::trust::digest_file;
use log::{error, info};
use std::sync::Arc;

const DEFAULT_LAST_LOGIN_UIN: &str = "0";

/// Tagged result of every orchestrator stage.
#[derive(Debug, Clone)]
pub struct LaunchReport {
    pub role: ProcessRole,
    pub session: Option<HostSessionInfo>,
    pub version_cache: StepResult,
    pub native_init: NativeInit,
    pub trusted: bool,
    pub role_hooks: Vec<(HookTarget, StepResult)>,
    /// `None` when the run stopped before the loader.
    pub activation: Option<ActivationOutcome>,
}

pub struct Launcher {
    ctx: Arc<BootstrapContext>,
}

impl Launcher {
    pub fn new(ctx: Arc<BootstrapContext>) -> Self {
        Self { ctx }
    }

    pub fn run(&self, host: &dyn HostObject) -> LaunchReport {
        let ctx = &self.ctx;
        let role = ctx.role();
        info!(
            "event=launcher_run module=launcher status=start role={}",
            role.as_str()
        );

        let namespace = host.namespace();
        ctx.runtime().set_host_namespace(Arc::clone(&namespace));
        let (session, version_cache) = self.cache_host_version(host);

        let flag = digest_file(ctx.startup().module_path())
            .map(|digest| digest.to_hex().to_string())
            .unwrap_or_default();
        let native_init = ctx.native().initialize_native(&flag, ctx.trust());

        let mut report = LaunchReport {
            role,
            session,
            version_cache,
            native_init,
            trusted: false,
            role_hooks: Vec::new(),
            activation: None,
        };

        report.trusted = ctx.trust().is_trusted();
        if !report.trusted {
            error!("event=launcher_abort module=launcher status=error reason=untrusted");
            return report;
        }

        if role == ProcessRole::Primary {
            report.role_hooks = self.install_launcher_hooks();
        }

        let loader = ExtensionLoader::new(LoaderDeps {
            trust: Arc::clone(ctx.trust()),
            linker: Arc::clone(ctx.linker()),
            module_symbols: Arc::clone(ctx.module_symbols()),
            host_symbols: namespace,
            bridge: Arc::clone(ctx.bridge()),
            build_mode: ctx.config().build_mode,
        });
        let activation = loader.load(role);
        info!("event=launcher_run module=launcher status=done activation={activation:?}");
        report.activation = Some(activation);
        report
    }

    fn cache_host_version(&self, host: &dyn HostObject) -> (Option<HostSessionInfo>, StepResult) {
        let package = match host.package_info() {
            Ok(package) => package,
            Err(err) => {
                error!("event=host_version module=launcher status=error error={err}");
                return (None, StepResult::Failed(err.to_string()));
            }
        };
        let runtime = self.ctx.runtime();
        runtime.set_host_version_name(package.version_name.clone());
        runtime.set_host_version_code(package.version_code);

        match VersionCache::init(self.ctx.startup().data_dir(), &package) {
            Ok((_, session)) => {
                info!(
                    "event=host_version module=launcher status=ok version={} code={} changed={}",
                    session.version_name,
                    session.version_code,
                    session.version_changed()
                );
                (Some(session), StepResult::Ok)
            }
            Err(err) => {
                error!("event=version_cache module=launcher status=error error={err}");
                (None, StepResult::Failed(err.to_string()))
            }
        }
    }

    fn install_launcher_hooks(&self) -> Vec<(HookTarget, StepResult)> {
        let screen = &self.ctx.config().targets.launcher_screen;

        let resumed = HookTarget::new(screen.as_str(), "onResume");
        let runtime = Arc::clone(self.ctx.runtime());
        let on_resume: HookCallback = Arc::new(move |_host: &dyn HostObject| {
            runtime.set_launcher_resumed();
        });
        let resume_result = self.ctx.install_hook(&resumed, on_resume);

        let created = HookTarget::new(screen.as_str(), "onCreate");
        let runtime = Arc::clone(self.ctx.runtime());
        let file = self.ctx.config().preferences_file();
        let on_create: HookCallback = Arc::new(move |host: &dyn HostObject| {
            load_session_preferences(&runtime, &file, host);
        });
        let create_result = self.ctx.install_hook(&created, on_create);

        vec![(resumed, resume_result), (created, create_result)]
    }
}

/// Copies the host's session identifiers into the runtime config.
///
/// A missing key clears the stored value, so nothing from an earlier login
/// survives.
pub fn load_session_preferences(runtime: &RuntimeConfig, file: &str, host: &dyn HostObject) {
    let read = |key: &str, default: &str| {
        host.preference(file, key).unwrap_or_else(|| default.to_string())
    };
    runtime.set_login_account_id(read(PREF_LOGIN_ACCOUNT_ID, ""));
    runtime.set_last_login_nickname(read(PREF_LAST_LOGIN_NICKNAME, ""));
    runtime.set_login_user_name(read(PREF_LOGIN_USER_NAME, ""));
    runtime.set_last_login_uin(read(PREF_LAST_LOGIN_UIN, DEFAULT_LAST_LOGIN_UIN));
    info!("event=session_preferences module=launcher status=ok file={file}");
}

/// Startup phase registered in the module symbol table.
pub fn startup_agent(ctx: &Arc<BootstrapContext>, host: &dyn HostObject) -> StepResult {
    let report = Launcher::new(Arc::clone(ctx)).run(host);
    let result = if report.trusted {
        StepResult::Ok
    } else {
        StepResult::Failed("untrusted".to_string())
    };
    ctx.record_launch(report);
    result
}

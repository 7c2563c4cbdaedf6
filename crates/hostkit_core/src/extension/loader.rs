//! Extension activation pipeline.
//!
//! # Responsibility
//! - Gate on trust, fetch and link the payload, then run its entry point and
//!   register its delegate.
//! - Fall back to the statically linked module when the payload cannot be
//!   loaded at all.
//!
//! # Invariants
//! - Untrusted: zero symbol lookups, bridge untouched, no fallback.
//! - Any failure before the payload is linked routes to the fallback path.
//! - Once the payload is linked, entry point and factory failures are
//!   logged and recorded only; the fallback path is not tried.
//! - Entry point and factory steps are independent of each other.
//! - At most one activation attempt per loader.
//!
//! # See also
//! - crate::namespace for the resolution order used on the dynamic path.

use crate::config::BuildMode;
use crate::extension::bridge::DelegateBridge;
use crate::extension::contract::{ENTRY_POINT_SYMBOL, FACTORY_SYMBOL};
use crate::extension::linker::PayloadLinker;
use crate::host::ProcessRole;
use crate::logging::{contain_panic, describe_panic};
use crate::namespace::{LayeredResolver, Resolved, SymbolDef, SymbolKind, SymbolTable};
use crate::native::{NativeError, PayloadFetch};
use crate::trust::TrustGate;
use log::{error, info, warn};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Result of one activation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Ok,
    Failed(String),
}

impl StepResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Why the dynamic path was abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    DevelopmentBuild,
    PayloadAbsent,
    NativeFailure(NativeError),
    LinkFailed(String),
}

impl Display for FallbackReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DevelopmentBuild => write!(f, "development_build"),
            Self::PayloadAbsent => write!(f, "payload_absent"),
            Self::NativeFailure(err) => write!(f, "native_failure: {err}"),
            Self::LinkFailed(message) => write!(f, "link_failed: {message}"),
        }
    }
}

/// Which code source was activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationPath {
    Dynamic { payload_digest: String },
    Fallback(FallbackReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    pub id: Uuid,
    pub role: ProcessRole,
    pub path: ActivationPath,
    pub entry_point: StepResult,
    pub factory: StepResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// Trust gate refused; nothing ran.
    Untrusted,
    /// An earlier call already activated.
    AlreadyActivated,
    Attempted(ActivationReport),
}

/// Collaborators of [`ExtensionLoader`].
pub struct LoaderDeps {
    pub trust: Arc<TrustGate>,
    pub linker: Arc<dyn PayloadLinker>,
    /// Statically linked module symbols (priority context / fallback).
    pub module_symbols: Arc<SymbolTable>,
    /// Currently active host-facing context.
    pub host_symbols: Arc<SymbolTable>,
    pub bridge: Arc<DelegateBridge>,
    pub build_mode: BuildMode,
}

pub struct ExtensionLoader {
    deps: LoaderDeps,
    attempted: AtomicBool,
}

impl ExtensionLoader {
    pub fn new(deps: LoaderDeps) -> Self {
        Self {
            deps,
            attempted: AtomicBool::new(false),
        }
    }

    /// Runs the activation pipeline for `role`.
    pub fn load(&self, role: ProcessRole) -> ActivationOutcome {
        if !self.deps.trust.is_trusted() {
            error!("event=extension_load module=loader status=skip reason=untrusted");
            return ActivationOutcome::Untrusted;
        }
        if self.attempted.swap(true, Ordering::SeqCst) {
            warn!("event=extension_load module=loader status=skip reason=already_activated");
            return ActivationOutcome::AlreadyActivated;
        }

        let id = Uuid::new_v4();
        info!(
            "event=extension_load module=loader status=start activation={} role={}",
            id,
            role.as_str()
        );

        let report = match self.link_payload(id) {
            Ok((resolver, payload_digest)) => {
                let (entry_point, factory) = self.activate(id, &resolver, role);
                ActivationReport {
                    id,
                    role,
                    path: ActivationPath::Dynamic { payload_digest },
                    entry_point,
                    factory,
                }
            }
            Err(reason) => self.fallback(id, role, reason),
        };

        info!(
            "event=extension_load module=loader status=done activation={} entry_point={:?} factory={:?}",
            id, report.entry_point, report.factory
        );
        ActivationOutcome::Attempted(report)
    }

    /// Runs the fallback path directly against the module symbols.
    fn fallback(&self, id: Uuid, role: ProcessRole, reason: FallbackReason) -> ActivationReport {
        warn!(
            "event=fallback_load module=loader status=start activation={} reason={}",
            id, reason
        );
        let resolver = LayeredResolver::root(Arc::clone(&self.deps.module_symbols));
        let (entry_point, factory) = self.activate(id, &resolver, role);
        ActivationReport {
            id,
            role,
            path: ActivationPath::Fallback(reason),
            entry_point,
            factory,
        }
    }

    /// Steps 2-5: build mode, payload fetch, context construction, linking.
    fn link_payload(&self, id: Uuid) -> Result<(LayeredResolver, String), FallbackReason> {
        if self.deps.build_mode == BuildMode::Development {
            info!(
                "event=payload_fetch module=loader status=skip activation={id} reason=development_build"
            );
            return Err(FallbackReason::DevelopmentBuild);
        }

        let payload = match self.deps.trust.native().payload_bytes() {
            PayloadFetch::Available(payload) => payload,
            PayloadFetch::Absent => {
                error!(
                    "event=payload_fetch module=loader status=error activation={id} reason=empty"
                );
                return Err(FallbackReason::PayloadAbsent);
            }
            PayloadFetch::Failed(err) => {
                error!(
                    "event=payload_fetch module=loader status=error activation={id} error={err}"
                );
                return Err(FallbackReason::NativeFailure(err));
            }
        };

        let host = LayeredResolver::root(Arc::clone(&self.deps.host_symbols));
        let priority = LayeredResolver::child_of(&host, Arc::clone(&self.deps.module_symbols));
        let payload_table = self.deps.linker.link(&payload).map_err(|err| {
            error!("event=payload_link module=loader status=error activation={id} error={err}");
            FallbackReason::LinkFailed(err.to_string())
        })?;
        let resolver = LayeredResolver::child_of(&priority, Arc::new(payload_table));

        info!(
            "event=payload_link module=loader status=ok activation={} bytes={} layers={:?}",
            id,
            payload.len(),
            resolver
        );
        Ok((resolver, payload.digest_hex()))
    }

    /// Steps 6 and 7.
    fn activate(
        &self,
        id: Uuid,
        resolver: &LayeredResolver,
        role: ProcessRole,
    ) -> (StepResult, StepResult) {
        let entry_point = run_entry_point(resolver, role);
        match &entry_point {
            StepResult::Ok => info!("event=entry_point module=loader status=ok activation={id}"),
            StepResult::Failed(message) => error!(
                "event=entry_point module=loader status=error activation={id} error={message}"
            ),
        }

        let factory = self.register_factory(resolver);
        match &factory {
            StepResult::Ok => info!("event=factory module=loader status=ok activation={id}"),
            StepResult::Failed(message) => {
                error!("event=factory module=loader status=error activation={id} error={message}")
            }
        }
        (entry_point, factory)
    }

    fn register_factory(&self, resolver: &LayeredResolver) -> StepResult {
        let accessor = match resolver.resolve(FACTORY_SYMBOL) {
            Some(Resolved {
                def: SymbolDef::Factory(accessor),
                ..
            }) => accessor,
            other => {
                return StepResult::Failed(unexpected(FACTORY_SYMBOL, other, SymbolKind::Factory))
            }
        };
        match contain_panic(accessor) {
            Ok(Some(delegate)) => {
                self.deps.bridge.register_delegate(delegate);
                StepResult::Ok
            }
            Ok(None) => StepResult::Failed(format!("`{FACTORY_SYMBOL}` instance is empty")),
            Err(panic) => StepResult::Failed(format!(
                "`{FACTORY_SYMBOL}` instance access panicked: {}",
                describe_panic(panic.as_ref())
            )),
        }
    }
}

fn run_entry_point(resolver: &LayeredResolver, role: ProcessRole) -> StepResult {
    let ctor = match resolver.resolve(ENTRY_POINT_SYMBOL) {
        Some(Resolved {
            def: SymbolDef::EntryPoint(ctor),
            ..
        }) => ctor,
        other => {
            let message = unexpected(ENTRY_POINT_SYMBOL, other, SymbolKind::EntryPoint);
            return StepResult::Failed(message);
        }
    };
    let invoked = contain_panic(|| {
        let mut entry_point = ctor();
        entry_point.load_hook_items(role.code())
    });
    match invoked {
        Ok(Ok(())) => StepResult::Ok,
        Ok(Err(err)) => StepResult::Failed(err.to_string()),
        Err(panic) => StepResult::Failed(format!(
            "`{ENTRY_POINT_SYMBOL}` panicked: {}",
            describe_panic(panic.as_ref())
        )),
    }
}

fn unexpected(name: &str, resolved: Option<Resolved>, expected: SymbolKind) -> String {
    match resolved {
        None => format!("`{name}` not found"),
        Some(resolved) => format!(
            "`{name}` from {} is {}, expected {expected}",
            resolved.origin.as_str(),
            resolved.def.kind()
        ),
    }
}

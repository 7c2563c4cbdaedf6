#![allow(dead_code)]

use hostkit_core::bootstrap::{ModuleServices, StartupPhaseFn};
use hostkit_core::extension::linker::{LinkError, PayloadLinker};
use hostkit_core::extension::{
    ActivationError, EntryPoint, HookFactoryDelegate, ENTRY_POINT_SYMBOL, FACTORY_SYMBOL,
    STARTUP_PHASE_SYMBOL,
};
use hostkit_core::host::{
    HookCallback, HookError, HookTarget, HostAppHandle, HostError, HostHooks, HostObject,
    HostPackageInfo, LoaderService, ProcessRole,
};
use hostkit_core::namespace::{SymbolDef, SymbolOrigin, SymbolTable};
use hostkit_core::native::{ExtensionPayload, NativeBackend, NativeError, NativePayloadSource};
use hostkit_core::trust::{SignatureVerifier, TrustGate};
use hostkit_core::{bootstrap, EntryRequest};
use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const HOST_PACKAGE: &str = "com.example.host";

thread_local! {
    static ENTRY_CALLS: RefCell<Vec<(&'static str, i32)>> = const { RefCell::new(Vec::new()) };
}

/// Entry point invocations observed on the current test thread.
pub fn entry_calls() -> Vec<(&'static str, i32)> {
    ENTRY_CALLS.with(|calls| calls.borrow().clone())
}

struct RecordingEntry(&'static str);

impl EntryPoint for RecordingEntry {
    fn load_hook_items(&mut self, role_code: i32) -> Result<(), ActivationError> {
        ENTRY_CALLS.with(|calls| calls.borrow_mut().push((self.0, role_code)));
        Ok(())
    }
}

struct FailingEntry;

impl EntryPoint for FailingEntry {
    fn load_hook_items(&mut self, _role_code: i32) -> Result<(), ActivationError> {
        Err(ActivationError::Failed("hook item table corrupt".to_string()))
    }
}

struct PanickingEntry;

impl EntryPoint for PanickingEntry {
    fn load_hook_items(&mut self, _role_code: i32) -> Result<(), ActivationError> {
        panic!("payload entry point exploded");
    }
}

fn payload_entry() -> Box<dyn EntryPoint> {
    Box::new(RecordingEntry("payload"))
}

fn module_entry() -> Box<dyn EntryPoint> {
    Box::new(RecordingEntry("module"))
}

fn host_entry() -> Box<dyn EntryPoint> {
    Box::new(RecordingEntry("host"))
}

fn failing_entry() -> Box<dyn EntryPoint> {
    Box::new(FailingEntry)
}

fn panicking_entry() -> Box<dyn EntryPoint> {
    Box::new(PanickingEntry)
}

pub struct NamedFactory(pub &'static str);

impl HookFactoryDelegate for NamedFactory {
    fn factory_id(&self) -> &str {
        self.0
    }

    fn hook_item_names(&self) -> Vec<String> {
        vec![format!("{}_item", self.0)]
    }
}

static PAYLOAD_FACTORY: Lazy<Arc<NamedFactory>> = Lazy::new(|| Arc::new(NamedFactory("payload")));
static MODULE_FACTORY: Lazy<Arc<NamedFactory>> = Lazy::new(|| Arc::new(NamedFactory("module")));
static HOST_FACTORY: Lazy<Arc<NamedFactory>> = Lazy::new(|| Arc::new(NamedFactory("host")));

fn payload_factory() -> Option<Arc<dyn HookFactoryDelegate>> {
    let factory: Arc<dyn HookFactoryDelegate> = PAYLOAD_FACTORY.clone();
    Some(factory)
}

fn module_factory() -> Option<Arc<dyn HookFactoryDelegate>> {
    let factory: Arc<dyn HookFactoryDelegate> = MODULE_FACTORY.clone();
    Some(factory)
}

fn host_factory() -> Option<Arc<dyn HookFactoryDelegate>> {
    let factory: Arc<dyn HookFactoryDelegate> = HOST_FACTORY.clone();
    Some(factory)
}

fn empty_factory() -> Option<Arc<dyn HookFactoryDelegate>> {
    None
}

pub fn payload_table() -> SymbolTable {
    SymbolTable::new(SymbolOrigin::Payload, "payload:test")
        .with(ENTRY_POINT_SYMBOL, SymbolDef::EntryPoint(payload_entry))
        .and_then(|table| table.with(FACTORY_SYMBOL, SymbolDef::Factory(payload_factory)))
        .expect("payload table")
}

/// Payload whose entry point reports failure after linking.
pub fn failing_payload_table() -> SymbolTable {
    SymbolTable::new(SymbolOrigin::Payload, "payload:failing")
        .with(ENTRY_POINT_SYMBOL, SymbolDef::EntryPoint(failing_entry))
        .and_then(|table| table.with(FACTORY_SYMBOL, SymbolDef::Factory(payload_factory)))
        .expect("failing payload table")
}

pub fn panicking_payload_table() -> SymbolTable {
    SymbolTable::new(SymbolOrigin::Payload, "payload:panicking")
        .with(ENTRY_POINT_SYMBOL, SymbolDef::EntryPoint(panicking_entry))
        .and_then(|table| table.with(FACTORY_SYMBOL, SymbolDef::Factory(empty_factory)))
        .expect("panicking payload table")
}

/// Payload that only ships an entry point.
pub fn entry_only_payload_table() -> SymbolTable {
    SymbolTable::new(SymbolOrigin::Payload, "payload:entry-only")
        .with(ENTRY_POINT_SYMBOL, SymbolDef::EntryPoint(payload_entry))
        .expect("entry-only payload table")
}

pub fn module_table() -> SymbolTable {
    module_table_with_phase(bootstrap::startup_agent)
}

pub fn module_table_with_phase(phase: StartupPhaseFn) -> SymbolTable {
    SymbolTable::new(SymbolOrigin::Module, "module:test")
        .with(ENTRY_POINT_SYMBOL, SymbolDef::EntryPoint(module_entry))
        .and_then(|table| table.with(FACTORY_SYMBOL, SymbolDef::Factory(module_factory)))
        .and_then(|table| table.with(STARTUP_PHASE_SYMBOL, SymbolDef::StartupPhase(phase)))
        .expect("module table")
}

pub fn module_table_without_phase() -> SymbolTable {
    SymbolTable::new(SymbolOrigin::Module, "module:no-phase")
        .with(ENTRY_POINT_SYMBOL, SymbolDef::EntryPoint(module_entry))
        .and_then(|table| table.with(FACTORY_SYMBOL, SymbolDef::Factory(module_factory)))
        .expect("module table without phase")
}

/// Host table that also defines the well-known names, to catch collisions.
pub fn host_table() -> SymbolTable {
    SymbolTable::new(SymbolOrigin::Host, "host:test")
        .with(ENTRY_POINT_SYMBOL, SymbolDef::EntryPoint(host_entry))
        .and_then(|table| table.with(FACTORY_SYMBOL, SymbolDef::Factory(host_factory)))
        .and_then(|table| table.with("host.app.BaseApplication", SymbolDef::Export))
        .expect("host table")
}

pub struct FakeBackend {
    pub init_result: Result<bool, NativeError>,
    pub verify_result: Result<bool, NativeError>,
    pub payload: Result<Option<Vec<u8>>, NativeError>,
    pub init_calls: AtomicUsize,
    pub payload_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn with_payload(payload: Option<Vec<u8>>) -> Self {
        Self {
            init_result: Ok(true),
            verify_result: Ok(true),
            payload: Ok(payload),
            init_calls: AtomicUsize::new(0),
            payload_calls: AtomicUsize::new(0),
        }
    }
}

impl NativeBackend for FakeBackend {
    fn init(&self, _flag: &str) -> Result<bool, NativeError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.init_result.clone()
    }

    fn verify(&self) -> Result<bool, NativeError> {
        self.verify_result.clone()
    }

    fn payload(&self) -> Result<Option<Vec<u8>>, NativeError> {
        self.payload_calls.fetch_add(1, Ordering::SeqCst);
        self.payload.clone()
    }
}

pub struct FakeVerifier(pub bool);

impl SignatureVerifier for FakeVerifier {
    fn is_signature_valid(&self) -> bool {
        self.0
    }
}

/// Loaded native source over `backend`.
pub fn loaded_native(backend: FakeBackend) -> Arc<NativePayloadSource> {
    let native = Arc::new(NativePayloadSource::new(Arc::new(backend)));
    native.mark_library_loaded();
    native
}

/// Trust gate whose native handshake already ran.
pub fn gate(backend: FakeBackend, signature_valid: bool) -> Arc<TrustGate> {
    let native = loaded_native(backend);
    let gate = Arc::new(TrustGate::new(
        Arc::clone(&native),
        Arc::new(FakeVerifier(signature_valid)),
    ));
    native.initialize_native("test-flag", &gate);
    gate
}

pub struct FakeLinker {
    build: fn() -> SymbolTable,
    fail: bool,
    pub calls: AtomicUsize,
    pub linked_bytes: AtomicUsize,
}

impl FakeLinker {
    pub fn linking(build: fn() -> SymbolTable) -> Self {
        Self {
            build,
            fail: false,
            calls: AtomicUsize::new(0),
            linked_bytes: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::linking(payload_table)
        }
    }
}

impl PayloadLinker for FakeLinker {
    fn link(&self, payload: &ExtensionPayload) -> Result<SymbolTable, LinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.linked_bytes.store(payload.len(), Ordering::SeqCst);
        if self.fail {
            return Err(LinkError::MissingDescriptor("not a payload".to_string()));
        }
        Ok((self.build)())
    }
}

pub struct FakeHooks {
    installed: Mutex<Vec<(HookTarget, HookCallback)>>,
    rejected: Vec<HookTarget>,
}

impl FakeHooks {
    pub fn new() -> Self {
        Self::rejecting(Vec::new())
    }

    pub fn rejecting(rejected: Vec<HookTarget>) -> Self {
        Self {
            installed: Mutex::new(Vec::new()),
            rejected,
        }
    }

    pub fn targets(&self) -> Vec<HookTarget> {
        self.installed
            .lock()
            .expect("hooks lock")
            .iter()
            .map(|(target, _)| target.clone())
            .collect()
    }

    pub fn is_installed(&self, type_name: &str, method: &str) -> bool {
        self.targets().contains(&HookTarget::new(type_name, method))
    }

    /// Runs every callback installed on `type_name.method`. Returns how many ran.
    pub fn fire(&self, type_name: &str, method: &str, host: &dyn HostObject) -> usize {
        let target = HookTarget::new(type_name, method);
        let callbacks: Vec<HookCallback> = self
            .installed
            .lock()
            .expect("hooks lock")
            .iter()
            .filter(|(installed, _)| *installed == target)
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in &callbacks {
            callback(host);
        }
        callbacks.len()
    }
}

impl HostHooks for FakeHooks {
    fn hook_after(&self, target: &HookTarget, callback: HookCallback) -> Result<(), HookError> {
        if self.rejected.contains(target) {
            return Err(HookError::TargetNotFound(target.to_string()));
        }
        self.installed
            .lock()
            .expect("hooks lock")
            .push((target.clone(), callback));
        Ok(())
    }
}

pub struct FakeHost {
    pub namespace: Arc<SymbolTable>,
    pub package: Option<HostPackageInfo>,
    pub app: Option<HostAppHandle>,
    pub preferences: HashMap<(String, String), String>,
}

impl FakeHost {
    pub fn new(version: &str, code: i64) -> Self {
        Self {
            namespace: Arc::new(host_table()),
            package: Some(HostPackageInfo {
                package_name: HOST_PACKAGE.to_string(),
                version_name: version.to_string(),
                version_code: code,
            }),
            app: Some(HostAppHandle {
                id: "app@1".to_string(),
            }),
            preferences: HashMap::new(),
        }
    }

    pub fn with_preference(mut self, file: &str, key: &str, value: &str) -> Self {
        self.preferences
            .insert((file.to_string(), key.to_string()), value.to_string());
        self
    }
}

impl HostObject for FakeHost {
    fn namespace(&self) -> Arc<SymbolTable> {
        Arc::clone(&self.namespace)
    }

    fn package_info(&self) -> Result<HostPackageInfo, HostError> {
        self.package
            .clone()
            .ok_or_else(|| HostError::Unavailable("package info".to_string()))
    }

    fn application(&self) -> Option<HostAppHandle> {
        self.app.clone()
    }

    fn preference(&self, file: &str, key: &str) -> Option<String> {
        self.preferences
            .get(&(file.to_string(), key.to_string()))
            .cloned()
    }
}

pub struct FakeLoaderService;

impl LoaderService for FakeLoaderService {
    fn entry_point_name(&self) -> String {
        "test-loader".to_string()
    }

    fn entry_point_version(&self) -> String {
        "1.0".to_string()
    }

    fn main_module_path(&self) -> String {
        "/modules/hostkit.so".to_string()
    }

    fn query_extension(&self, command: &str) -> Option<String> {
        (command == "framework").then(|| "test-framework".to_string())
    }
}

pub fn entry_request(data_dir: &Path, hooks: Option<Arc<FakeHooks>>) -> EntryRequest {
    EntryRequest {
        module_path: data_dir.join("module.so"),
        data_dir: data_dir.to_path_buf(),
        loader_service: Arc::new(FakeLoaderService),
        host_namespace: Arc::new(host_table()),
        hooks: hooks.map(|hooks| hooks as Arc<dyn HostHooks>),
    }
}

/// Fake collaborators: a loaded native library that yields `payload`, a
/// signature check answering `signature_valid`, and `linker`.
pub fn services(
    payload: Option<Vec<u8>>,
    signature_valid: bool,
    linker: FakeLinker,
    module_symbols: SymbolTable,
    role: ProcessRole,
) -> ModuleServices {
    ModuleServices {
        native: loaded_native(FakeBackend::with_payload(payload)),
        verifier: Arc::new(FakeVerifier(signature_valid)),
        linker: Arc::new(linker),
        module_symbols: Arc::new(module_symbols),
        role: Some(role),
    }
}

/// Writes `hostkit.json` into `data_dir`.
pub fn write_config(data_dir: &Path, json: &str) {
    std::fs::write(data_dir.join("hostkit.json"), json).expect("write config");
}

pub const PRODUCTION_CONFIG: &str = r#"{ "host_package": "com.example.host", "build_mode": "production" }"#;

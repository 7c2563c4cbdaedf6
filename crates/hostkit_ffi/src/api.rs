//! C ABI for the hosting framework.
//!
//! # Responsibility
//! - Expose the one-shot module entry and the hook callback trampoline.
//! - Adapt host-provided function tables to the core host traits.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Status codes are stable: see the `STATUS_*` constants.
//! - Every string crossing the boundary is NUL-terminated UTF-8.
//!
//! # See also
//! - hostkit_core::bootstrap for the entry sequence itself.

use hostkit_core::bootstrap::{self, EntryRequest};
use hostkit_core::host::{
    HookCallback, HookError, HookTarget, HostAppHandle, HostError, HostHooks, HostObject,
    HostPackageInfo, LoaderService,
};
use hostkit_core::logging::{contain_panic, describe_panic};
use hostkit_core::namespace::{SymbolDef, SymbolOrigin, SymbolTable};
use hostkit_core::{core_version as core_version_inner, init_logging as init_logging_inner};
use log::{error, warn};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr, CString};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub const STATUS_OK: i32 = 0;
pub const STATUS_INVALID_ARGUMENT: i32 = 1;
/// Entry was called before in this process.
pub const STATUS_ALREADY_INITIALIZED: i32 = 2;
pub const STATUS_UNKNOWN_HOOK: i32 = 3;
pub const STATUS_PANICKED: i32 = 4;

const PREFERENCE_BUFFER_LEN: usize = 1024;

static CORE_VERSION: Lazy<CString> =
    Lazy::new(|| CString::new(core_version_inner()).unwrap_or_default());
static HOOK_CALLBACKS: Lazy<Mutex<HashMap<u64, HookCallback>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
static NEXT_HOOK_ID: AtomicU64 = AtomicU64::new(1);

/// Installs a hook on `type_name.method`. The host must later call
/// [`hostkit_hook_fired`] with `hook_id` each time the method returns.
/// Returns `false` when the target does not exist.
pub type HostHookAfterFn = unsafe extern "C" fn(
    context: *mut c_void,
    type_name: *const c_char,
    method: *const c_char,
    hook_id: u64,
) -> bool;

/// Copies one preference value into `out` (NUL-terminated).
/// Returns the value length, or a negative number when the key is missing.
pub type HostPreferenceFn = unsafe extern "C" fn(
    context: *mut c_void,
    file: *const c_char,
    key: *const c_char,
    out: *mut c_char,
    out_len: usize,
) -> isize;

/// Function table the hosting framework supplies at entry.
#[repr(C)]
pub struct HostkitHostServices {
    pub context: *mut c_void,
    /// `None` when the framework cannot hook host methods.
    pub hook_after: Option<HostHookAfterFn>,
    pub loader_name: *const c_char,
    pub loader_version: *const c_char,
    pub main_module_path: *const c_char,
}

/// Entry call arguments.
#[repr(C)]
pub struct HostkitEntryRequest {
    pub module_path: *const c_char,
    pub data_dir: *const c_char,
    /// Symbol names the host exposes to module code.
    pub host_symbols: *const *const c_char,
    pub host_symbol_count: usize,
    pub services: HostkitHostServices,
}

/// The host object a fired hook observed.
#[repr(C)]
pub struct HostkitHostObject {
    pub context: *mut c_void,
    pub package_name: *const c_char,
    pub version_name: *const c_char,
    pub version_code: i64,
    /// Nullable identity of the host application object.
    pub app_id: *const c_char,
    pub host_symbols: *const *const c_char,
    pub host_symbol_count: usize,
    pub preference: Option<HostPreferenceFn>,
}

/// Expose core crate version through FFI.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never panics; the returned pointer stays valid for the process lifetime.
#[no_mangle]
pub extern "C" fn hostkit_core_version() -> *const c_char {
    CORE_VERSION.as_ptr()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns `STATUS_OK` or `STATUS_INVALID_ARGUMENT`.
///
/// # Safety
/// Both pointers must be null or valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn hostkit_init_logging(
    level: *const c_char,
    log_dir: *const c_char,
) -> i32 {
    guard_status(|| {
        let (Some(level), Some(log_dir)) = (unsafe { read_str(level) }, unsafe { read_str(log_dir) })
        else {
            return STATUS_INVALID_ARGUMENT;
        };
        match init_logging_inner(&level, &log_dir) {
            Ok(()) => STATUS_OK,
            Err(err) => {
                warn!("event=ffi_init_logging module=ffi status=error error={err}");
                STATUS_INVALID_ARGUMENT
            }
        }
    })
}

/// Host-to-module entry. Must be called exactly once per process.
///
/// # FFI contract
/// - Sync call; installs the startup hook before returning.
/// - A second call returns `STATUS_ALREADY_INITIALIZED`; the core treats
///   it as a contract violation and logs it loudly.
/// - Any other failure inside the core returns `STATUS_PANICKED`.
/// - Never panics across the boundary.
///
/// # Safety
/// `request` must point to a valid [`HostkitEntryRequest`]. `services.context`
/// and `hook_after` must stay valid, and be callable from any thread, for the
/// process lifetime.
#[no_mangle]
pub unsafe extern "C" fn hostkit_entry(request: *const HostkitEntryRequest) -> i32 {
    guard_status(|| {
        let Some(request) = (unsafe { request.as_ref() }) else {
            return STATUS_INVALID_ARGUMENT;
        };
        let Some(entry) = (unsafe { entry_request(request) }) else {
            return STATUS_INVALID_ARGUMENT;
        };
        if bootstrap::bootstrap_state() != bootstrap::BootstrapState::Uninitialized {
            error!("event=ffi_entry module=ffi status=error reason=already_initialized");
            return STATUS_ALREADY_INITIALIZED;
        }
        bootstrap::entry(entry);
        STATUS_OK
    })
}

/// Trampoline the host calls after a hooked method returns.
///
/// # FFI contract
/// - Runs the module callback synchronously on the calling thread.
/// - Returns `STATUS_UNKNOWN_HOOK` for ids this module never issued.
///
/// # Safety
/// `object` must point to a valid [`HostkitHostObject`] for the duration of
/// the call.
#[no_mangle]
pub unsafe extern "C" fn hostkit_hook_fired(
    hook_id: u64,
    object: *const HostkitHostObject,
) -> i32 {
    guard_status(|| {
        let Some(object) = (unsafe { object.as_ref() }) else {
            return STATUS_INVALID_ARGUMENT;
        };
        let Some(callback) = lock_callbacks().get(&hook_id).cloned() else {
            warn!("event=ffi_hook_fired module=ffi status=error hook_id={hook_id} reason=unknown");
            return STATUS_UNKNOWN_HOOK;
        };
        callback(&FfiHostObject(object));
        STATUS_OK
    })
}

fn guard_status(op: impl FnOnce() -> i32) -> i32 {
    match contain_panic(op) {
        Ok(status) => status,
        Err(panic) => {
            error!(
                "event=ffi_panic module=ffi status=error payload={}",
                describe_panic(panic.as_ref())
            );
            STATUS_PANICKED
        }
    }
}

/// # Safety
/// `ptr` must be null or a valid NUL-terminated string.
unsafe fn read_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .ok()
        .map(str::to_owned)
}

/// # Safety
/// `names` must point to `count` valid string pointers, or be null.
unsafe fn host_table(names: *const *const c_char, count: usize) -> SymbolTable {
    let mut table = SymbolTable::new(SymbolOrigin::Host, "host");
    if names.is_null() {
        return table;
    }
    for index in 0..count {
        let Some(name) = (unsafe { read_str(*names.add(index)) }) else {
            continue;
        };
        if let Err(err) = table.define(&name, SymbolDef::Export) {
            warn!("event=ffi_host_symbol module=ffi status=skip error={err}");
        }
    }
    table
}

/// # Safety
/// See [`hostkit_entry`].
unsafe fn entry_request(request: &HostkitEntryRequest) -> Option<EntryRequest> {
    let module_path = unsafe { read_str(request.module_path) }?;
    let data_dir = unsafe { read_str(request.data_dir) }?;
    let services = &request.services;
    let loader = FfiLoaderService {
        name: unsafe { read_str(services.loader_name) }.unwrap_or_default(),
        version: unsafe { read_str(services.loader_version) }.unwrap_or_default(),
        main_module_path: unsafe { read_str(services.main_module_path) }.unwrap_or_default(),
    };
    let hooks = services.hook_after.map(|hook_after| {
        Arc::new(FfiHostHooks {
            context: HostContext(services.context),
            hook_after,
        }) as Arc<dyn HostHooks>
    });

    Some(EntryRequest {
        module_path: PathBuf::from(module_path),
        data_dir: PathBuf::from(data_dir),
        loader_service: Arc::new(loader),
        host_namespace: Arc::new(unsafe {
            host_table(request.host_symbols, request.host_symbol_count)
        }),
        hooks,
    })
}

/// Opaque host context pointer.
#[derive(Clone, Copy)]
struct HostContext(*mut c_void);

// SAFETY: `hostkit_entry` requires the host context and its functions to be
// usable from any thread for the process lifetime.
unsafe impl Send for HostContext {}
// SAFETY: as above.
unsafe impl Sync for HostContext {}

struct FfiHostHooks {
    context: HostContext,
    hook_after: HostHookAfterFn,
}

impl HostHooks for FfiHostHooks {
    fn hook_after(&self, target: &HookTarget, callback: HookCallback) -> Result<(), HookError> {
        let type_name = CString::new(target.type_name.as_str())
            .map_err(|_| HookError::Rejected("type name contains NUL".to_string()))?;
        let method = CString::new(target.method.as_str())
            .map_err(|_| HookError::Rejected("method contains NUL".to_string()))?;

        let hook_id = NEXT_HOOK_ID.fetch_add(1, Ordering::Relaxed);
        lock_callbacks().insert(hook_id, callback);
        // SAFETY: both strings outlive the call; the host contract covers
        // the context pointer.
        let installed = unsafe {
            (self.hook_after)(
                self.context.0,
                type_name.as_ptr(),
                method.as_ptr(),
                hook_id,
            )
        };
        if installed {
            Ok(())
        } else {
            lock_callbacks().remove(&hook_id);
            Err(HookError::TargetNotFound(target.to_string()))
        }
    }
}

fn lock_callbacks() -> std::sync::MutexGuard<'static, HashMap<u64, HookCallback>> {
    HOOK_CALLBACKS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct FfiLoaderService {
    name: String,
    version: String,
    main_module_path: String,
}

impl LoaderService for FfiLoaderService {
    fn entry_point_name(&self) -> String {
        self.name.clone()
    }

    fn entry_point_version(&self) -> String {
        self.version.clone()
    }

    fn main_module_path(&self) -> String {
        self.main_module_path.clone()
    }

    fn query_extension(&self, _command: &str) -> Option<String> {
        None
    }
}

struct FfiHostObject<'a>(&'a HostkitHostObject);

impl HostObject for FfiHostObject<'_> {
    fn namespace(&self) -> Arc<SymbolTable> {
        // SAFETY: `hostkit_hook_fired` requires a valid host object.
        Arc::new(unsafe { host_table(self.0.host_symbols, self.0.host_symbol_count) })
    }

    fn package_info(&self) -> Result<HostPackageInfo, HostError> {
        // SAFETY: as above.
        let package_name = unsafe { read_str(self.0.package_name) }
            .ok_or_else(|| HostError::Unavailable("package name".to_string()))?;
        let version_name = unsafe { read_str(self.0.version_name) }
            .ok_or_else(|| HostError::Unavailable("version name".to_string()))?;
        Ok(HostPackageInfo {
            package_name,
            version_name,
            version_code: self.0.version_code,
        })
    }

    fn application(&self) -> Option<HostAppHandle> {
        // SAFETY: as above.
        unsafe { read_str(self.0.app_id) }.map(|id| HostAppHandle { id })
    }

    fn preference(&self, file: &str, key: &str) -> Option<String> {
        let read = self.0.preference?;
        let file = CString::new(file).ok()?;
        let c_key = CString::new(key).ok()?;
        let mut buffer = vec![0 as c_char; PREFERENCE_BUFFER_LEN];
        // SAFETY: `buffer` is writable for its full length during the call.
        let len = unsafe {
            read(
                self.0.context,
                file.as_ptr(),
                c_key.as_ptr(),
                buffer.as_mut_ptr(),
                buffer.len(),
            )
        };
        preference_value(&mut buffer, len, key)
    }
}

/// Reads the value a host preference callback wrote into `buffer`.
///
/// A length that does not fit the buffer means the value was truncated.
fn preference_value(buffer: &mut [c_char], len: isize, key: &str) -> Option<String> {
    let len = usize::try_from(len).ok()?;
    if len >= buffer.len() {
        warn!(
            "event=ffi_preference module=ffi status=error key={key} reason=truncated len={len} capacity={}",
            buffer.len()
        );
        return None;
    }
    // The host may not terminate a value that fills the buffer.
    let last = buffer.len() - 1;
    buffer[last] = 0;
    // SAFETY: `buffer` now contains a NUL within bounds.
    unsafe { read_str(buffer.as_ptr()) }
}

#[cfg(test)]
mod tests {
    use super::{
        hostkit_core_version, hostkit_entry, hostkit_hook_fired, hostkit_init_logging,
        guard_status, preference_value, FfiHostObject, HostkitHostObject,
        STATUS_INVALID_ARGUMENT, STATUS_OK, STATUS_PANICKED, STATUS_UNKNOWN_HOOK,
    };
    use hostkit_core::host::HostObject;
    use std::ffi::{c_char, c_void, CStr, CString};
    use std::ptr;

    unsafe extern "C" fn fill_without_nul(
        _context: *mut c_void,
        _file: *const c_char,
        _key: *const c_char,
        out: *mut c_char,
        out_len: usize,
    ) -> isize {
        unsafe { ptr::write_bytes(out, b'a', out_len) };
        out_len as isize
    }

    unsafe extern "C" fn write_account(
        _context: *mut c_void,
        _file: *const c_char,
        _key: *const c_char,
        out: *mut c_char,
        _out_len: usize,
    ) -> isize {
        let value = b"acct_7\0";
        unsafe { ptr::copy_nonoverlapping(value.as_ptr().cast::<c_char>(), out, value.len()) };
        (value.len() - 1) as isize
    }

    fn host_object(preference: Option<super::HostPreferenceFn>) -> HostkitHostObject {
        HostkitHostObject {
            context: ptr::null_mut(),
            package_name: ptr::null(),
            version_name: ptr::null(),
            version_code: 0,
            app_id: ptr::null(),
            host_symbols: ptr::null(),
            host_symbol_count: 0,
            preference,
        }
    }

    #[test]
    fn version_is_not_empty() {
        let version = unsafe { CStr::from_ptr(hostkit_core_version()) };
        assert!(!version.to_string_lossy().is_empty());
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        let level = CString::new("info").expect("level");
        let log_dir = CString::new("").expect("log dir");
        let status = unsafe { hostkit_init_logging(level.as_ptr(), log_dir.as_ptr()) };
        assert_eq!(status, STATUS_INVALID_ARGUMENT);
    }

    #[test]
    fn init_logging_rejects_null_arguments() {
        let status = unsafe { hostkit_init_logging(ptr::null(), ptr::null()) };
        assert_eq!(status, STATUS_INVALID_ARGUMENT);
    }

    #[test]
    fn entry_rejects_null_request() {
        assert_eq!(unsafe { hostkit_entry(ptr::null()) }, STATUS_INVALID_ARGUMENT);
    }

    #[test]
    fn unknown_hook_id_is_reported() {
        let object = host_object(None);
        assert_eq!(
            unsafe { hostkit_hook_fired(u64::MAX, &object) },
            STATUS_UNKNOWN_HOOK
        );
    }

    #[test]
    fn preference_is_read_up_to_its_terminator() {
        let object = host_object(Some(write_account));
        let value = FfiHostObject(&object).preference("prefs", "login_account_id");
        assert_eq!(value.as_deref(), Some("acct_7"));
    }

    #[test]
    fn preference_filling_the_whole_buffer_is_treated_as_truncated() {
        let object = host_object(Some(fill_without_nul));
        assert_eq!(FfiHostObject(&object).preference("prefs", "long"), None);

        let mut buffer = vec![b'a' as c_char; 8];
        assert_eq!(preference_value(&mut buffer, 7, "short"), Some("aaaaaaa".to_string()));
        assert_eq!(preference_value(&mut buffer, -1, "missing"), None);
    }

    #[test]
    fn panics_inside_an_export_map_to_the_panicked_status() {
        assert_eq!(guard_status(|| STATUS_OK), STATUS_OK);
        assert_eq!(guard_status(|| panic!("entry failed")), STATUS_PANICKED);
    }
}

//! Native payload source boundary.
//!
//! # Responsibility
//! - Track the native library liveness flag and its one-time init handshake.
//! - Fetch the encoded extension payload from native code.
//!
//! # Invariants
//! - The liveness flag is set at most once per process.
//! - Native init is attempted only after liveness and a valid static
//!   signature check.
//! - Linkage errors, native-reported failures and native panics become
//!   negative outcomes. Nothing here unwinds into the caller.
//! - "No payload" and "native call failed" are reported as distinct values.

use crate::logging::{contain_panic, describe_panic};
use crate::trust::TrustGate;
use libloading::Library;
use log::{error, info, warn};
use std::error::Error;
use std::ffi::{c_char, CString};
use std::fmt::{Debug, Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const SYMBOL_INIT: &[u8] = b"hostkit_native_init\0";
const SYMBOL_VERIFY: &[u8] = b"hostkit_native_verify\0";
const SYMBOL_PAYLOAD: &[u8] = b"hostkit_native_payload\0";
const SYMBOL_PAYLOAD_FREE: &[u8] = b"hostkit_native_payload_free\0";

type NativeInitFn = unsafe extern "C" fn(*const c_char) -> bool;
type NativeVerifyFn = unsafe extern "C" fn() -> bool;
type NativePayloadFn = unsafe extern "C" fn(*mut usize) -> *mut u8;
type NativePayloadFreeFn = unsafe extern "C" fn(*mut u8, usize);

/// Immutable, non-empty extension payload bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct ExtensionPayload {
    bytes: Arc<[u8]>,
}

impl ExtensionPayload {
    /// Wraps `bytes`; returns `None` for an empty sequence.
    pub fn new(bytes: Vec<u8>) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        Some(Self {
            bytes: Arc::from(bytes),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex BLAKE3 digest of the payload bytes.
    pub fn digest_hex(&self) -> String {
        blake3::hash(&self.bytes).to_hex().to_string()
    }
}

impl Debug for ExtensionPayload {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionPayload")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Result of one payload fetch.
#[derive(Debug)]
pub enum PayloadFetch {
    Available(ExtensionPayload),
    /// Native code answered but has no payload (e.g. a development build).
    Absent,
    Failed(NativeError),
}

/// Result of the one-time native init handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeInit {
    Completed,
    /// Preconditions not met; native code was not called.
    Skipped(&'static str),
    Failed(NativeError),
}

/// Raw native entry points.
pub trait NativeBackend: Send + Sync {
    fn init(&self, flag: &str) -> Result<bool, NativeError>;
    fn verify(&self) -> Result<bool, NativeError>;
    /// Returns `Ok(None)` when native code has no payload to offer.
    fn payload(&self) -> Result<Option<Vec<u8>>, NativeError>;
}

/// Native library state plus payload access.
pub struct NativePayloadSource {
    backend: Arc<dyn NativeBackend>,
    library_loaded: AtomicBool,
    handshake_completed: AtomicBool,
}

impl NativePayloadSource {
    pub fn new(backend: Arc<dyn NativeBackend>) -> Self {
        Self {
            backend,
            library_loaded: AtomicBool::new(false),
            handshake_completed: AtomicBool::new(false),
        }
    }

    /// Source whose backend reports every call as a linkage failure.
    pub fn unavailable() -> Self {
        Self::new(Arc::new(UnavailableNativeBackend))
    }

    /// Sets the liveness flag. Returns `true` only for the call that set it.
    pub fn mark_library_loaded(&self) -> bool {
        let first = !self.library_loaded.swap(true, Ordering::SeqCst);
        if first {
            info!("event=native_library_loaded module=native status=ok");
        }
        first
    }

    pub fn is_library_loaded(&self) -> bool {
        self.library_loaded.load(Ordering::SeqCst)
    }

    pub fn handshake_completed(&self) -> bool {
        self.handshake_completed.load(Ordering::SeqCst)
    }

    /// Runs the native init handshake once.
    ///
    /// Repeated calls after a successful handshake return `Completed`
    /// without calling native code again.
    pub fn initialize_native(&self, flag: &str, gate: &TrustGate) -> NativeInit {
        if self.handshake_completed() {
            return NativeInit::Completed;
        }
        if !self.is_library_loaded() {
            error!("event=native_init module=native status=skip reason=library_not_loaded");
            return NativeInit::Skipped("library_not_loaded");
        }
        if !gate.signature_valid() {
            error!("event=native_init module=native status=skip reason=signature_invalid");
            return NativeInit::Skipped("signature_invalid");
        }

        match guarded(|| self.backend.init(flag)) {
            Ok(true) => {
                self.handshake_completed.store(true, Ordering::SeqCst);
                info!("event=native_init module=native status=ok");
                NativeInit::Completed
            }
            Ok(false) => {
                error!("event=native_init module=native status=error reason=rejected");
                NativeInit::Failed(NativeError::Rejected)
            }
            Err(err) => {
                error!("event=native_init module=native status=error error={err}");
                NativeInit::Failed(err)
            }
        }
    }

    /// Native-backed verification. Requires a completed handshake.
    pub fn verify(&self) -> Result<bool, NativeError> {
        if !self.handshake_completed() {
            return Err(NativeError::HandshakePending);
        }
        guarded(|| self.backend.verify())
    }

    pub fn payload_bytes(&self) -> PayloadFetch {
        if !self.is_library_loaded() {
            return PayloadFetch::Failed(NativeError::LibraryNotLoaded);
        }
        match guarded(|| self.backend.payload()) {
            Ok(Some(bytes)) => match ExtensionPayload::new(bytes) {
                Some(payload) => PayloadFetch::Available(payload),
                None => PayloadFetch::Absent,
            },
            Ok(None) => PayloadFetch::Absent,
            Err(err) => {
                warn!("event=payload_fetch module=native status=error error={err}");
                PayloadFetch::Failed(err)
            }
        }
    }
}

fn guarded<T>(op: impl FnOnce() -> Result<T, NativeError>) -> Result<T, NativeError> {
    match contain_panic(op) {
        Ok(result) => result,
        Err(payload) => Err(NativeError::Panicked(describe_panic(payload.as_ref()))),
    }
}

/// Backend used when no native library is configured.
struct UnavailableNativeBackend;

impl NativeBackend for UnavailableNativeBackend {
    fn init(&self, _flag: &str) -> Result<bool, NativeError> {
        Err(NativeError::Linkage("native library not configured".to_string()))
    }

    fn verify(&self) -> Result<bool, NativeError> {
        Err(NativeError::Linkage("native library not configured".to_string()))
    }

    fn payload(&self) -> Result<Option<Vec<u8>>, NativeError> {
        Err(NativeError::Linkage("native library not configured".to_string()))
    }
}

/// [`NativeBackend`] over a shared library exporting the `hostkit_native_*`
/// C symbols. Symbols are resolved on every call, so a missing export shows
/// up as a linkage error on the call that needs it.
pub struct DylibNativeBackend {
    path: PathBuf,
    library: Library,
}

impl DylibNativeBackend {
    pub fn open(path: &Path) -> Result<Self, NativeError> {
        // SAFETY: the native library is part of this module's own package;
        // its initializers are trusted to the same degree as this crate.
        let library = unsafe { Library::new(path) }
            .map_err(|err| NativeError::Linkage(format!("{}: {err}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn symbol<T: Copy>(&self, name: &[u8]) -> Result<T, NativeError> {
        // SAFETY: `T` matches the C signature documented for each
        // `hostkit_native_*` export.
        unsafe { self.library.get::<T>(name) }
            .map(|symbol| *symbol)
            .map_err(|err| NativeError::Linkage(err.to_string()))
    }
}

impl NativeBackend for DylibNativeBackend {
    fn init(&self, flag: &str) -> Result<bool, NativeError> {
        let init: NativeInitFn = self.symbol(SYMBOL_INIT)?;
        let flag = CString::new(flag)
            .map_err(|_| NativeError::InvalidArgument("flag contains NUL".to_string()))?;
        // SAFETY: `flag` outlives the call and is NUL-terminated.
        Ok(unsafe { init(flag.as_ptr()) })
    }

    fn verify(&self) -> Result<bool, NativeError> {
        let verify: NativeVerifyFn = self.symbol(SYMBOL_VERIFY)?;
        // SAFETY: no arguments; the export only reads native state.
        Ok(unsafe { verify() })
    }

    fn payload(&self) -> Result<Option<Vec<u8>>, NativeError> {
        let fetch: NativePayloadFn = self.symbol(SYMBOL_PAYLOAD)?;
        let free: NativePayloadFreeFn = self.symbol(SYMBOL_PAYLOAD_FREE)?;

        let mut len = 0usize;
        // SAFETY: `len` is a valid out-pointer for the duration of the call.
        let ptr = unsafe { fetch(&mut len) };
        if ptr.is_null() {
            return Ok(None);
        }
        let bytes = if len == 0 {
            Vec::new()
        } else {
            // SAFETY: native code guarantees `ptr` addresses `len` readable
            // bytes until it is released with the matching free export.
            unsafe { std::slice::from_raw_parts(ptr, len) }.to_vec()
        };
        // SAFETY: `ptr`/`len` came from the fetch export and are freed once.
        unsafe { free(ptr, len) };
        Ok(if bytes.is_empty() { None } else { Some(bytes) })
    }
}

/// Native boundary failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeError {
    LibraryNotLoaded,
    HandshakePending,
    /// Library or symbol could not be linked.
    Linkage(String),
    /// Native code returned a negative result.
    Rejected,
    InvalidArgument(String),
    Panicked(String),
}

impl Display for NativeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LibraryNotLoaded => write!(f, "native library not loaded"),
            Self::HandshakePending => write!(f, "native init handshake not completed"),
            Self::Linkage(message) => write!(f, "native linkage failed: {message}"),
            Self::Rejected => write!(f, "native code reported failure"),
            Self::InvalidArgument(message) => write!(f, "invalid native argument: {message}"),
            Self::Panicked(message) => write!(f, "native call panicked: {message}"),
        }
    }
}

impl Error for NativeError {}

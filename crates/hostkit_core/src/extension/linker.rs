//! Turns payload bytes into the payload-backed symbol table.

use crate::logging::{contain_panic, describe_panic};
use crate::namespace::{SymbolError, SymbolOrigin, SymbolTable};
use crate::native::ExtensionPayload;
use crate::trust::digest_file;
use libloading::Library;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Exported data symbol every payload library must define.
pub const PAYLOAD_DESCRIPTOR_SYMBOL: &[u8] = b"HOSTKIT_PAYLOAD_DESCRIPTOR\0";

/// Typed export table of a payload library.
///
/// A payload declares it as
/// `#[no_mangle] pub static HOSTKIT_PAYLOAD_DESCRIPTOR: PayloadDescriptor`.
#[repr(C)]
pub struct PayloadDescriptor {
    /// Defines every payload-local symbol in the given table.
    pub register: fn(&mut SymbolTable) -> Result<(), SymbolError>,
}

/// Builds the payload-backed context from payload bytes.
pub trait PayloadLinker: Send + Sync {
    fn link(&self, payload: &ExtensionPayload) -> Result<SymbolTable, LinkError>;
}

/// [`PayloadLinker`] that materializes the payload as a shared library under
/// `<data_dir>/payload/` and reads its [`PayloadDescriptor`].
///
/// A linked library is never unloaded: symbols handed out from it stay
/// reachable for the rest of the process.
#[derive(Debug, Clone)]
pub struct DylibPayloadLinker {
    payload_dir: PathBuf,
}

impl DylibPayloadLinker {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            payload_dir: data_dir.join("payload"),
        }
    }

    fn materialize(&self, payload: &ExtensionPayload) -> Result<PathBuf, LinkError> {
        fs::create_dir_all(&self.payload_dir)?;
        let digest = payload.digest_hex();
        let path = self
            .payload_dir
            .join(format!("{digest}.{}", std::env::consts::DLL_EXTENSION));

        // The cached file is only reused when its contents hash to the payload digest.
        let up_to_date = match digest_file(&path) {
            Ok(actual) => actual.to_hex().as_str() == digest,
            Err(err) if err.kind() == io::ErrorKind::NotFound => false,
            Err(err) => {
                warn!(
                    "event=payload_cache module=linker status=error path={} error={err}",
                    path.display()
                );
                false
            }
        };
        if !up_to_date {
            if path.exists() {
                warn!(
                    "event=payload_cache module=linker status=skip reason=digest_mismatch path={}",
                    path.display()
                );
            }
            let staging = path.with_extension("partial");
            fs::write(&staging, payload.as_bytes())?;
            fs::rename(&staging, &path)?;
        }
        Ok(path)
    }
}

impl PayloadLinker for DylibPayloadLinker {
    fn link(&self, payload: &ExtensionPayload) -> Result<SymbolTable, LinkError> {
        let path = self.materialize(payload)?;

        // SAFETY: the payload passed the trust gate before reaching the linker.
        let library = unsafe { Library::new(&path) }
            .map_err(|err| LinkError::Open(format!("{}: {err}", path.display())))?;
        // SAFETY: the descriptor export is a `PayloadDescriptor` static.
        let descriptor: *const PayloadDescriptor = unsafe {
            library
                .get::<*const PayloadDescriptor>(PAYLOAD_DESCRIPTOR_SYMBOL)
                .map(|symbol| *symbol)
                .map_err(|err| LinkError::MissingDescriptor(err.to_string()))?
        };
        if descriptor.is_null() {
            return Err(LinkError::MissingDescriptor("descriptor is null".to_string()));
        }
        // SAFETY: non-null and backed by a static inside `library`, which is
        // kept mapped below.
        let register = unsafe { (*descriptor).register };

        let digest = payload.digest_hex();
        let mut table =
            SymbolTable::new(SymbolOrigin::Payload, format!("payload:{}", &digest[..12]));
        contain_panic(|| register(&mut table))
            .map_err(|panic| LinkError::Panicked(describe_panic(panic.as_ref())))??;

        info!(
            "event=payload_linked module=linker status=ok symbols={} path={}",
            table.len(),
            path.display()
        );
        std::mem::forget(library);
        Ok(table)
    }
}

/// Payload linking failures. Each one routes activation to the fallback path.
#[derive(Debug)]
pub enum LinkError {
    Io(io::Error),
    Open(String),
    MissingDescriptor(String),
    Register(SymbolError),
    Panicked(String),
}

impl Display for LinkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "payload io failed: {err}"),
            Self::Open(message) => write!(f, "payload open failed: {message}"),
            Self::MissingDescriptor(message) => {
                write!(f, "payload descriptor unavailable: {message}")
            }
            Self::Register(err) => write!(f, "payload symbol registration failed: {err}"),
            Self::Panicked(message) => write!(f, "payload registration panicked: {message}"),
        }
    }
}

impl Error for LinkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Register(err) => Some(err),
            Self::Open(_) | Self::MissingDescriptor(_) | Self::Panicked(_) => None,
        }
    }
}

impl From<io::Error> for LinkError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<SymbolError> for LinkError {
    fn from(value: SymbolError) -> Self {
        Self::Register(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{DylibPayloadLinker, LinkError, PayloadLinker};
    use crate::native::ExtensionPayload;
    use std::fs;

    #[test]
    fn garbage_payload_fails_to_open_but_is_materialized_once() {
        let dir = tempfile::tempdir().expect("temp dir");
        let linker = DylibPayloadLinker::new(dir.path());
        let payload = ExtensionPayload::new(vec![0xAB; 500]).expect("payload");

        let err = linker.link(&payload).expect_err("garbage is not a library");
        assert!(matches!(err, LinkError::Open(_)));

        let files: Vec<_> = std::fs::read_dir(dir.path().join("payload"))
            .expect("payload dir exists")
            .collect();
        assert_eq!(files.len(), 1);

        linker.link(&payload).expect_err("still not a library");
        let files: Vec<_> = std::fs::read_dir(dir.path().join("payload"))
            .expect("payload dir exists")
            .collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn cached_file_with_foreign_contents_is_rewritten_before_opening() {
        let dir = tempfile::tempdir().expect("temp dir");
        let linker = DylibPayloadLinker::new(dir.path());
        let payload = ExtensionPayload::new(vec![0xAB; 500]).expect("payload");
        let cached = dir
            .path()
            .join("payload")
            .join(format!("{}.{}", payload.digest_hex(), std::env::consts::DLL_EXTENSION));
        fs::create_dir_all(cached.parent().expect("payload dir")).expect("create payload dir");
        fs::write(&cached, vec![0xCD; 500]).expect("seed tampered file");

        linker.link(&payload).expect_err("garbage is not a library");

        let on_disk = fs::read(&cached).expect("cached payload");
        assert_eq!(on_disk, payload.as_bytes());
    }
}

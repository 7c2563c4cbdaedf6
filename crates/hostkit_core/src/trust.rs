//! Trust gate.
//!
//! # Responsibility
//! - Decide whether the running module may proceed with effectful work.
//!
//! # Invariants
//! - Two independent checks must both pass: native verification (after the
//!   native init handshake) and the static signature layer.
//! - Every query recomputes the decision; nothing is cached, so a native
//!   layer that becomes ready later is picked up by the next call.
//! - A negative outcome is a value, never a panic or error.

use crate::native::{NativeError, NativePayloadSource};
use log::{debug, error, warn};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Static (non-native) signature check.
pub trait SignatureVerifier: Send + Sync {
    fn is_signature_valid(&self) -> bool;
}

/// Re-derives the BLAKE3 digest of the module file on every call and
/// compares it with the expected digest.
#[derive(Debug, Clone)]
pub struct DigestVerifier {
    module_path: PathBuf,
    expected_hex: Option<String>,
}

impl DigestVerifier {
    pub fn new(module_path: impl Into<PathBuf>, expected_hex: Option<String>) -> Self {
        Self {
            module_path: module_path.into(),
            expected_hex,
        }
    }
}

impl SignatureVerifier for DigestVerifier {
    fn is_signature_valid(&self) -> bool {
        let Some(expected_hex) = self.expected_hex.as_deref() else {
            warn!("event=signature_check module=trust status=error reason=no_expected_digest");
            return false;
        };
        let expected = match blake3::Hash::from_hex(expected_hex.trim()) {
            Ok(hash) => hash,
            Err(err) => {
                error!("event=signature_check module=trust status=error reason=bad_expected_digest error={err}");
                return false;
            }
        };
        match digest_file(&self.module_path) {
            // blake3::Hash equality is constant-time.
            Ok(actual) => actual == expected,
            Err(err) => {
                error!(
                    "event=signature_check module=trust status=error path={} error={err}",
                    self.module_path.display()
                );
                false
            }
        }
    }
}

/// BLAKE3 digest of a file's contents.
pub fn digest_file(path: &Path) -> std::io::Result<blake3::Hash> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize())
}

/// Outcome of the native half of the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeVerdict {
    Verified,
    Rejected,
    Unavailable(NativeError),
}

/// Full gate decision with its reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustDecision {
    pub native: NativeVerdict,
    pub signature_valid: bool,
}

impl TrustDecision {
    pub fn is_trusted(&self) -> bool {
        self.native == NativeVerdict::Verified && self.signature_valid
    }
}

pub struct TrustGate {
    native: Arc<NativePayloadSource>,
    verifier: Arc<dyn SignatureVerifier>,
}

impl TrustGate {
    pub fn new(native: Arc<NativePayloadSource>, verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self { native, verifier }
    }

    pub fn is_trusted(&self) -> bool {
        self.evaluate().is_trusted()
    }

    /// Runs both checks and reports each result.
    pub fn evaluate(&self) -> TrustDecision {
        let native = match self.native.verify() {
            Ok(true) => NativeVerdict::Verified,
            Ok(false) => NativeVerdict::Rejected,
            Err(err) => NativeVerdict::Unavailable(err),
        };
        let decision = TrustDecision {
            native,
            signature_valid: self.signature_valid(),
        };

        if decision.is_trusted() {
            debug!("event=trust_check module=trust status=ok");
        } else {
            error!(
                "event=trust_check module=trust status=error native={:?} signature_valid={}",
                decision.native, decision.signature_valid
            );
        }
        decision
    }

    /// Static signature layer alone.
    pub fn signature_valid(&self) -> bool {
        self.verifier.is_signature_valid()
    }

    pub fn native(&self) -> &Arc<NativePayloadSource> {
        &self.native
    }
}

#[cfg(test)]
mod tests {
    use super::{digest_file, DigestVerifier, SignatureVerifier};
    use std::io::Write;

    #[test]
    fn digest_verifier_matches_file_contents() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"module bytes").expect("write module");
        let expected = blake3::hash(b"module bytes").to_hex().to_string();

        let verifier = DigestVerifier::new(file.path(), Some(expected));
        assert!(verifier.is_signature_valid());
        assert_eq!(
            digest_file(file.path()).expect("digest"),
            blake3::hash(b"module bytes")
        );
    }

    #[test]
    fn digest_verifier_rejects_mismatch_missing_and_malformed() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"tampered").expect("write module");
        let expected = blake3::hash(b"original").to_hex().to_string();

        assert!(!DigestVerifier::new(file.path(), Some(expected.clone())).is_signature_valid());
        assert!(!DigestVerifier::new(file.path(), None).is_signature_valid());
        assert!(!DigestVerifier::new(file.path(), Some("zz".to_string())).is_signature_valid());
        assert!(
            !DigestVerifier::new("/nonexistent/hostkit/module", Some(expected))
                .is_signature_valid()
        );
    }
}

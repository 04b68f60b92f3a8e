//! Ed25519 signature verification over a file against an issuer public key
//! (spec §4.7 step 6, optional layer).
//!
//! Grounded in the same base64-signature-over-a-digest pattern used by
//! `examples/other_examples/.../casparian-src-cli-plugin.rs.rs`'s
//! `verify_bundle_signature`: a detached, base64-encoded 64-byte signature
//! file next to the signed artifact, checked against a 32-byte base64 issuer
//! key over a SHA-256 digest of the artifact bytes.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::SignatureError;

/// Verifies the detached signature at `signature_path` over `artifact_bytes`
/// against `issuer_public_key_b64`.
pub fn verify_detached(
    artifact_bytes: &[u8],
    signature_path: &Path,
    issuer_public_key_b64: &str,
) -> Result<(), SignatureError> {
    if !signature_path.exists() {
        return Err(SignatureError::Missing);
    }

    let sig_text =
        std::fs::read_to_string(signature_path).map_err(|_| SignatureError::Missing)?;
    verify_bytes(artifact_bytes, sig_text.trim(), issuer_public_key_b64)
}

/// Verifies a base64-encoded detached signature `signature_b64` over
/// `artifact_bytes` against `issuer_public_key_b64`.
pub fn verify_bytes(
    artifact_bytes: &[u8],
    signature_b64: &str,
    issuer_public_key_b64: &str,
) -> Result<(), SignatureError> {
    let sig_bytes = STANDARD
        .decode(signature_b64)
        .map_err(|_| SignatureError::InvalidEncoding)?;
    let sig_bytes: [u8; 64] = sig_bytes
        .as_slice()
        .try_into()
        .map_err(|_| SignatureError::WrongLength(sig_bytes.len()))?;
    let signature = Signature::from_bytes(&sig_bytes);

    let key_bytes = STANDARD
        .decode(issuer_public_key_b64)
        .map_err(|_| SignatureError::InvalidEncoding)?;
    let key_bytes: [u8; 32] = key_bytes
        .as_slice()
        .try_into()
        .map_err(|_| SignatureError::BadKeyLength(key_bytes.len()))?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| SignatureError::BadKey)?;

    let mut hasher = Sha256::new();
    hasher.update(artifact_bytes);
    let digest = hasher.finalize();

    verifying_key
        .verify_strict(digest.as_slice(), &signature)
        .map_err(|_| SignatureError::VerificationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand_core::OsRng;

    #[test]
    fn valid_signature_verifies() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let artifact = b"module bytes";
        let mut hasher = Sha256::new();
        hasher.update(artifact);
        let digest = hasher.finalize();
        let signature = signing_key.sign(digest.as_slice());

        let sig_b64 = STANDARD.encode(signature.to_bytes());
        let key_b64 = STANDARD.encode(signing_key.verifying_key().to_bytes());

        assert!(verify_bytes(artifact, &sig_b64, &key_b64).is_ok());
    }

    #[test]
    fn tampered_artifact_fails_verification() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let mut hasher = Sha256::new();
        hasher.update(b"original");
        let digest = hasher.finalize();
        let signature = signing_key.sign(digest.as_slice());

        let sig_b64 = STANDARD.encode(signature.to_bytes());
        let key_b64 = STANDARD.encode(signing_key.verifying_key().to_bytes());

        assert!(verify_bytes(b"tampered", &sig_b64, &key_b64).is_err());
    }

    #[test]
    fn missing_signature_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("module.sig");
        let err = verify_detached(b"bytes", &path, "").unwrap_err();
        assert!(matches!(err, SignatureError::Missing));
    }
}

// src/signing/mod.rs

//! Detached ECDSA signatures over canonical manifest bytes
//!
//! Signatures are ECDSA over NIST P-256 with a SHA-256 digest, encoded as
//! fixed-width r||s (IEEE-P1363, 64 bytes) and carried as base64. Verify
//! additionally accepts ASN.1 DER signatures produced by platforms whose
//! ECDSA default differs.

mod keys;

pub use keys::{
    generate_key_files, generate_signing_key, load_private_key, load_public_key,
    private_key_from_pem, private_key_to_pem, public_key_from_pem, public_key_to_pem,
    PRIVATE_KEY_FILE, PUBLIC_KEY_FILE,
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};

/// Sign `bytes`, returning the base64 of the fixed-width r||s signature.
pub fn sign(key: &SigningKey, bytes: &[u8]) -> String {
    let signature: Signature = key.sign(bytes);
    BASE64.encode(signature.to_bytes())
}

/// Verify a detached base64 signature over `bytes`.
///
/// Returns false on any shape mismatch (bad base64, wrong length, unparsable
/// DER) rather than erroring; a mangled signature is just an invalid one.
pub fn verify(key: &VerifyingKey, bytes: &[u8], signature_b64: &str) -> bool {
    let raw = match BASE64.decode(signature_b64.trim()) {
        Ok(raw) => raw,
        Err(_) => return false,
    };

    let signature = match Signature::from_slice(&raw) {
        Ok(sig) => sig,
        // Compatibility shim: accept ASN.1 DER on verify.
        Err(_) => match Signature::from_der(&raw) {
            Ok(sig) => sig,
            Err(_) => return false,
        },
    };

    key.verify(bytes, &signature).is_ok()
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Stream Key Derivation and Sealing
//!
//! Shared ECIES plumbing for both curve signers: HKDF-SHA256 expansion of
//! the raw ECDH secret into an AES-256-GCM key, and the nonce-prefixed AEAD
//! envelope. The HKDF info binds a fixed context label and both compressed
//! public keys (ordered bytewise, so either party derives the same key) and
//! the caller-provided salt feeds the extract step. Associated data is
//! empty.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

use super::{CryptoError, Curve};

/// Cipher half of the HKDF context label.
const CIPHER_LABEL: &str = "AES-256-GCM";

const NONCE_LEN: usize = 12;

/// Derive the symmetric stream key for a (local, peer) key pair.
///
/// `own` and `peer` must be compressed SEC1 points; the two are ordered
/// bytewise inside the info block so `derive(A, B) == derive(B, A)`.
pub fn derive_stream_key(
    shared_secret: &[u8; 32],
    salt: &[u8],
    curve: Curve,
    own: &[u8],
    peer: &[u8],
) -> Result<[u8; 32], CryptoError> {
    let (first, second) = if own <= peer { (own, peer) } else { (peer, own) };

    let mut info = format!("ECDH {} {}", curve.name(), CIPHER_LABEL).into_bytes();
    info.extend_from_slice(first);
    info.extend_from_slice(second);

    let salt = if salt.is_empty() { None } else { Some(salt) };
    let hkdf = Hkdf::<Sha256>::new(salt, shared_secret);
    let mut key = [0u8; 32];
    hkdf.expand(&info, &mut key)
        .map_err(|e| CryptoError::Cipher(format!("key derivation failed: {e}")))?;
    Ok(key)
}

/// Encrypt `payload` under a derived stream key. Output is `nonce || ct`.
pub fn seal(key: &[u8; 32], payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(key.into());
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), payload)
        .map_err(|e| CryptoError::Cipher(format!("encryption failed: {e}")))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Inverse of [`seal`].
pub fn open(key: &[u8; 32], blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < NONCE_LEN {
        return Err(CryptoError::Cipher(format!(
            "ciphertext truncated ({} bytes)",
            blob.len()
        )));
    }
    let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(key.into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| CryptoError::Cipher(format!("decryption failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWN: &[u8] = &[0x02; 33];
    const PEER: &[u8] = &[0x03; 33];

    #[test]
    fn derivation_is_order_independent() {
        let secret = [0x11u8; 32];
        let a = derive_stream_key(&secret, b"salt", Curve::Secp256r1, OWN, PEER).unwrap();
        let b = derive_stream_key(&secret, b"salt", Curve::Secp256r1, PEER, OWN).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn derivation_binds_curve_and_salt() {
        let secret = [0x11u8; 32];
        let base = derive_stream_key(&secret, b"salt", Curve::Secp256r1, OWN, PEER).unwrap();
        let other_curve =
            derive_stream_key(&secret, b"salt", Curve::Secp256k1, OWN, PEER).unwrap();
        let other_salt = derive_stream_key(&secret, b"pepper", Curve::Secp256r1, OWN, PEER).unwrap();
        assert_ne!(base, other_curve);
        assert_ne!(base, other_salt);
    }

    #[test]
    fn seal_open_round_trip_including_empty() {
        let key = [0x42u8; 32];
        for payload in [&b""[..], &b"x"[..], &[0u8; 1024][..]] {
            let sealed = seal(&key, payload).unwrap();
            assert_eq!(open(&key, &sealed).unwrap(), payload);
        }
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let key = [0x42u8; 32];
        let mut sealed = seal(&key, b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(open(&key, &sealed), Err(CryptoError::Cipher(_))));
    }
}

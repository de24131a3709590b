// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Signing Abstraction
//!
//! Uniform crypto contract over per-curve keys: raw ECDSA signatures,
//! recoverable-signature id computation, public-key compression and
//! ECDH-derived AEAD stream encryption. Key custody is behind the
//! [`keystore::KeyStore`] trait so an enclave-backed implementation and the
//! portable software fallback are interchangeable.
//!
//! Pre-hashing is the caller's job: `raw_sign` takes a 32-byte digest. The
//! chain protocols apply their own digest rules (Blake2b-256 for the
//! tz-style chain, SHA-256 for extrinsic payloads) before calling in.

pub mod ecies;
pub mod keystore;
pub mod recovery;
pub mod secp256k1;
pub mod secp256r1;

use blake2::digest::consts::{U20, U32};
use blake2::{Blake2b, Blake2b512, Digest};
use sha2::Sha256;

pub use keystore::KeyStore;
pub use secp256k1::Secp256k1Signer;
pub use secp256r1::Secp256r1Signer;

/// Supported signing curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Curve {
    Secp256r1,
    Secp256k1,
}

impl Curve {
    pub fn name(&self) -> &'static str {
        match self {
            Curve::Secp256r1 => "secp256r1",
            Curve::Secp256k1 => "secp256k1",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Key generation or access failed in the key store.
    #[error("key unavailable: {0}")]
    KeyUnavailable(String),

    /// No recovery id reconstructs the expected public key.
    #[error("recovery impossible: {0}")]
    RecoveryImpossible(String),

    /// A peer public key could not be parsed as a point on the curve.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// A malformed signature was handed to the recovery routine.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// AEAD sealing or opening failed (wrong key, truncated blob, tamper).
    #[error("cipher failure: {0}")]
    Cipher(String),
}

/// The uniform signing contract implemented per curve.
pub trait Signer: Send + Sync {
    fn curve(&self) -> Curve;

    /// SEC1 public key bytes, compressed (33B) or uncompressed (65B).
    fn public_key(&self, compressed: bool) -> Result<Vec<u8>, CryptoError>;

    /// Sign a 32-byte digest, returning the 64-byte `r || s` signature.
    fn raw_sign(&self, digest: &[u8; 32]) -> Result<[u8; 64], CryptoError>;

    /// ECDH + HKDF + AEAD encryption toward `peer_public_key`.
    /// Output is `nonce || ciphertext`.
    fn stream_encrypt(
        &self,
        peer_public_key: &[u8],
        salt: &[u8],
        payload: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Exact inverse of [`Signer::stream_encrypt`].
    fn stream_decrypt(
        &self,
        peer_public_key: &[u8],
        salt: &[u8],
        payload: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Resolve the recovery id for an `r || s` signature over `digest`
    /// against this signer's own public key.
    fn find_recovery_id(&self, signature: &[u8; 64], digest: &[u8; 32]) -> Result<u8, CryptoError>;
}

// =============================================================================
// Digest helpers shared by the chain protocols
// =============================================================================

pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn blake2b_160(data: &[u8]) -> [u8; 20] {
    let mut hasher = Blake2b::<U20>::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn blake2b_512(data: &[u8]) -> [u8; 64] {
    let mut hasher = Blake2b512::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

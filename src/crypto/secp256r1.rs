// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # secp256r1 Signer
//!
//! NIST P-256 implementation of the uniform signing contract. This is the
//! identity curve of the processor: the account-model chain and the
//! tz-style chain both address accounts through it.

use std::sync::Arc;

use p256::elliptic_curve::sec1::ToEncodedPoint;

use super::{ecies, recovery, CryptoError, Curve, KeyStore, Signer};

pub struct Secp256r1Signer {
    keystore: Arc<dyn KeyStore>,
}

impl Secp256r1Signer {
    pub fn new(keystore: Arc<dyn KeyStore>) -> Self {
        Self { keystore }
    }

    fn peer_compressed(&self, peer_public_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        compress_public_key(peer_public_key)
    }
}

/// Re-encode any valid SEC1 point as its 33-byte compressed form.
pub fn compress_public_key(public_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let point = p256::PublicKey::from_sec1_bytes(public_key)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    Ok(point.to_encoded_point(true).as_bytes().to_vec())
}

/// Re-encode any valid SEC1 point as its 65-byte uncompressed form.
pub fn decompress_public_key(public_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let point = p256::PublicKey::from_sec1_bytes(public_key)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    Ok(point.to_encoded_point(false).as_bytes().to_vec())
}

impl Signer for Secp256r1Signer {
    fn curve(&self) -> Curve {
        Curve::Secp256r1
    }

    fn public_key(&self, compressed: bool) -> Result<Vec<u8>, CryptoError> {
        let raw = self.keystore.public_key()?;
        if compressed {
            compress_public_key(&raw)
        } else {
            decompress_public_key(&raw)
        }
    }

    fn raw_sign(&self, digest: &[u8; 32]) -> Result<[u8; 64], CryptoError> {
        self.keystore.sign_digest(digest)
    }

    fn stream_encrypt(
        &self,
        peer_public_key: &[u8],
        salt: &[u8],
        payload: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let shared = self.keystore.derive_shared(peer_public_key)?;
        let own = self.public_key(true)?;
        let peer = self.peer_compressed(peer_public_key)?;
        let key = ecies::derive_stream_key(&shared, salt, Curve::Secp256r1, &own, &peer)?;
        ecies::seal(&key, payload)
    }

    fn stream_decrypt(
        &self,
        peer_public_key: &[u8],
        salt: &[u8],
        payload: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let shared = self.keystore.derive_shared(peer_public_key)?;
        let own = self.public_key(true)?;
        let peer = self.peer_compressed(peer_public_key)?;
        let key = ecies::derive_stream_key(&shared, salt, Curve::Secp256r1, &own, &peer)?;
        ecies::open(&key, payload)
    }

    fn find_recovery_id(&self, signature: &[u8; 64], digest: &[u8; 32]) -> Result<u8, CryptoError> {
        let public = self.public_key(true)?;
        recovery::find_recovery_id_p256(signature, &public, digest)
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Key Custody
//!
//! The [`KeyStore`] trait is the narrow waist between the signers and
//! whatever holds the private key. An enclave-backed implementation performs
//! every operation inside the enclave; the [`software`] fallback keeps the
//! scalar in process memory and seals it to the embedded store as
//! `publicKey(64B) || nonce(12B) || AEAD-ciphertext(scalar)` under a
//! key-wrapping key, so a restart recovers the same identity.
//!
//! Keys are created lazily on first use and never recreated once sealed.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;

use super::CryptoError;
use crate::storage::ProcessorStore;

/// Minimal private-key capability: sign a digest, expose the public key,
/// run ECDH. Raw key material never crosses this boundary.
pub trait KeyStore: Send + Sync {
    /// Uncompressed SEC1 public key (65 bytes, `0x04 || X || Y`).
    fn public_key(&self) -> Result<Vec<u8>, CryptoError>;

    /// Deterministic (RFC 6979) ECDSA over a 32-byte digest, low-S
    /// normalized, returned as `r || s`.
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<[u8; 64], CryptoError>;

    /// Raw ECDH shared secret (x-coordinate) with a peer public key.
    /// Symmetric: `A.derive_shared(B.pub) == B.derive_shared(A.pub)`.
    fn derive_shared(&self, peer_public_key: &[u8]) -> Result<[u8; 32], CryptoError>;
}

const SEALED_NONCE_LEN: usize = 12;
const SEALED_PUBLIC_LEN: usize = 64;

/// Seal a private scalar for persistence.
fn seal_scalar(
    public_uncompressed: &[u8],
    scalar: &[u8],
    wrap_key: &[u8; 32],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(wrap_key.into());
    let mut nonce = [0u8; SEALED_NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), scalar)
        .map_err(|e| CryptoError::Cipher(format!("sealing failed: {e}")))?;

    // Strip the 0x04 SEC1 tag so the stored public part is exactly 64 bytes.
    let mut blob = Vec::with_capacity(SEALED_PUBLIC_LEN + SEALED_NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&public_uncompressed[1..]);
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Recover `(public key without SEC1 tag, private scalar)` from a sealed blob.
fn unseal_scalar(blob: &[u8], wrap_key: &[u8; 32]) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    if blob.len() <= SEALED_PUBLIC_LEN + SEALED_NONCE_LEN {
        return Err(CryptoError::KeyUnavailable(format!(
            "sealed key blob truncated ({} bytes)",
            blob.len()
        )));
    }
    let public = blob[..SEALED_PUBLIC_LEN].to_vec();
    let nonce = &blob[SEALED_PUBLIC_LEN..SEALED_PUBLIC_LEN + SEALED_NONCE_LEN];
    let ciphertext = &blob[SEALED_PUBLIC_LEN + SEALED_NONCE_LEN..];

    let cipher = Aes256Gcm::new(wrap_key.into());
    let scalar = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| CryptoError::KeyUnavailable(format!("unsealing failed: {e}")))?;
    Ok((public, scalar))
}

pub mod software {
    //! Software-backed key stores, one per curve. Used when no enclave key
    //! store is available, and throughout the test suite.

    // Both curve crates re-export the same `signature` crate, so one import
    // of the prehash trait covers both impls.
    use k256::ecdsa::signature::hazmat::PrehashSigner;

    use super::*;

    pub struct SoftwareP256KeyStore {
        key: p256::ecdsa::SigningKey,
    }

    pub struct SoftwareK256KeyStore {
        key: k256::ecdsa::SigningKey,
    }

    impl SoftwareP256KeyStore {
        pub fn from_signing_key(key: p256::ecdsa::SigningKey) -> Self {
            Self { key }
        }

        /// Load the sealed secp256r1 key, or generate and seal a fresh one.
        pub fn load_or_generate(
            store: &ProcessorStore,
            wrap_key: &[u8; 32],
        ) -> Result<Self, CryptoError> {
            let curve = "secp256r1";
            if let Some(blob) = store
                .sealed_key(curve)
                .map_err(|e| CryptoError::KeyUnavailable(e.to_string()))?
            {
                let (_, scalar) = unseal_scalar(&blob, wrap_key)?;
                let key = p256::ecdsa::SigningKey::from_slice(&scalar)
                    .map_err(|e| CryptoError::KeyUnavailable(e.to_string()))?;
                return Ok(Self { key });
            }

            let key = p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
            let public = key.verifying_key().to_encoded_point(false);
            let blob = seal_scalar(public.as_bytes(), &key.to_bytes(), wrap_key)?;
            store
                .set_sealed_key(curve, &blob)
                .map_err(|e| CryptoError::KeyUnavailable(e.to_string()))?;
            Ok(Self { key })
        }
    }

    impl SoftwareK256KeyStore {
        pub fn from_signing_key(key: k256::ecdsa::SigningKey) -> Self {
            Self { key }
        }

        /// Load the sealed secp256k1 key, or generate and seal a fresh one.
        pub fn load_or_generate(
            store: &ProcessorStore,
            wrap_key: &[u8; 32],
        ) -> Result<Self, CryptoError> {
            let curve = "secp256k1";
            if let Some(blob) = store
                .sealed_key(curve)
                .map_err(|e| CryptoError::KeyUnavailable(e.to_string()))?
            {
                let (_, scalar) = unseal_scalar(&blob, wrap_key)?;
                let key = k256::ecdsa::SigningKey::from_slice(&scalar)
                    .map_err(|e| CryptoError::KeyUnavailable(e.to_string()))?;
                return Ok(Self { key });
            }

            let key = k256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
            let public = key.verifying_key().to_encoded_point(false);
            let blob = seal_scalar(public.as_bytes(), &key.to_bytes(), wrap_key)?;
            store
                .set_sealed_key(curve, &blob)
                .map_err(|e| CryptoError::KeyUnavailable(e.to_string()))?;
            Ok(Self { key })
        }
    }

    impl KeyStore for SoftwareP256KeyStore {
        fn public_key(&self) -> Result<Vec<u8>, CryptoError> {
            Ok(self
                .key
                .verifying_key()
                .to_encoded_point(false)
                .as_bytes()
                .to_vec())
        }

        fn sign_digest(&self, digest: &[u8; 32]) -> Result<[u8; 64], CryptoError> {
            let signature: p256::ecdsa::Signature = self
                .key
                .sign_prehash(digest)
                .map_err(|e| CryptoError::KeyUnavailable(e.to_string()))?;
            let signature = signature.normalize_s().unwrap_or(signature);
            let mut out = [0u8; 64];
            out.copy_from_slice(&signature.to_bytes());
            Ok(out)
        }

        fn derive_shared(&self, peer_public_key: &[u8]) -> Result<[u8; 32], CryptoError> {
            let peer = p256::PublicKey::from_sec1_bytes(peer_public_key)
                .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
            let shared =
                p256::ecdh::diffie_hellman(self.key.as_nonzero_scalar(), peer.as_affine());
            let mut out = [0u8; 32];
            out.copy_from_slice(shared.raw_secret_bytes());
            Ok(out)
        }
    }

    impl KeyStore for SoftwareK256KeyStore {
        fn public_key(&self) -> Result<Vec<u8>, CryptoError> {
            Ok(self
                .key
                .verifying_key()
                .to_encoded_point(false)
                .as_bytes()
                .to_vec())
        }

        fn sign_digest(&self, digest: &[u8; 32]) -> Result<[u8; 64], CryptoError> {
            let signature: k256::ecdsa::Signature = self
                .key
                .sign_prehash(digest)
                .map_err(|e| CryptoError::KeyUnavailable(e.to_string()))?;
            let signature = signature.normalize_s().unwrap_or(signature);
            let mut out = [0u8; 64];
            out.copy_from_slice(&signature.to_bytes());
            Ok(out)
        }

        fn derive_shared(&self, peer_public_key: &[u8]) -> Result<[u8; 32], CryptoError> {
            let peer = k256::PublicKey::from_sec1_bytes(peer_public_key)
                .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
            let shared =
                k256::ecdh::diffie_hellman(self.key.as_nonzero_scalar(), peer.as_affine());
            let mut out = [0u8; 32];
            out.copy_from_slice(shared.raw_secret_bytes());
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::software::*;
    use super::*;
    use crate::storage::ProcessorStore;

    #[test]
    fn seal_unseal_round_trip() {
        let wrap_key = [7u8; 32];
        let key = k256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
        let public = key.verifying_key().to_encoded_point(false);

        let blob = seal_scalar(public.as_bytes(), &key.to_bytes(), &wrap_key).unwrap();
        assert_eq!(&blob[..64], &public.as_bytes()[1..]);

        let (stored_public, scalar) = unseal_scalar(&blob, &wrap_key).unwrap();
        assert_eq!(stored_public, public.as_bytes()[1..].to_vec());
        assert_eq!(scalar, key.to_bytes().to_vec());
    }

    #[test]
    fn unseal_with_wrong_wrap_key_fails() {
        let key = k256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
        let public = key.verifying_key().to_encoded_point(false);
        let blob = seal_scalar(public.as_bytes(), &key.to_bytes(), &[1u8; 32]).unwrap();
        assert!(matches!(
            unseal_scalar(&blob, &[2u8; 32]),
            Err(CryptoError::KeyUnavailable(_))
        ));
    }

    #[test]
    fn generated_identity_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProcessorStore::open(&dir.path().join("state.redb")).unwrap();
        let wrap_key = [9u8; 32];

        let first = SoftwareP256KeyStore::load_or_generate(&store, &wrap_key).unwrap();
        let second = SoftwareP256KeyStore::load_or_generate(&store, &wrap_key).unwrap();
        assert_eq!(first.public_key().unwrap(), second.public_key().unwrap());
    }

    #[test]
    fn ecdh_is_symmetric() {
        let a = SoftwareK256KeyStore::from_signing_key(k256::ecdsa::SigningKey::random(
            &mut rand::rngs::OsRng,
        ));
        let b = SoftwareK256KeyStore::from_signing_key(k256::ecdsa::SigningKey::random(
            &mut rand::rngs::OsRng,
        ));
        let a_pub = a.public_key().unwrap();
        let b_pub = b.public_key().unwrap();
        assert_eq!(
            a.derive_shared(&b_pub).unwrap(),
            b.derive_shared(&a_pub).unwrap()
        );
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Recovery Id Resolution
//!
//! Given an `r || s` signature, the digest it signs and the expected public
//! key, find the recovery id in `0..=3` whose SEC1 point recovery yields
//! that key. The EVM variant appends the id as `v`; the extrinsic variant
//! appends it to its multi-signature encoding.

// Both curve crates re-export the same elliptic_curve crate.
use k256::elliptic_curve::sec1::ToEncodedPoint;

use super::CryptoError;

/// Resolve the recovery id on secp256k1.
pub fn find_recovery_id_k256(
    signature: &[u8; 64],
    expected_public_key: &[u8],
    digest: &[u8; 32],
) -> Result<u8, CryptoError> {
    let signature = k256::ecdsa::Signature::from_slice(signature)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let expected = k256::PublicKey::from_sec1_bytes(expected_public_key)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    let expected = expected.to_encoded_point(true);

    for id in 0u8..=3 {
        let Some(recovery_id) = k256::ecdsa::RecoveryId::from_byte(id) else {
            continue;
        };
        if let Ok(candidate) =
            k256::ecdsa::VerifyingKey::recover_from_prehash(digest, &signature, recovery_id)
        {
            if candidate.to_encoded_point(true) == expected {
                return Ok(id);
            }
        }
    }
    Err(CryptoError::RecoveryImpossible(
        "no recovery id reconstructs the expected secp256k1 key".into(),
    ))
}

/// Resolve the recovery id on secp256r1.
pub fn find_recovery_id_p256(
    signature: &[u8; 64],
    expected_public_key: &[u8],
    digest: &[u8; 32],
) -> Result<u8, CryptoError> {
    let signature = p256::ecdsa::Signature::from_slice(signature)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let expected = p256::PublicKey::from_sec1_bytes(expected_public_key)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    let expected = expected.to_encoded_point(true);

    for id in 0u8..=3 {
        let Some(recovery_id) = ecdsa::RecoveryId::from_byte(id) else {
            continue;
        };
        if let Ok(candidate) =
            p256::ecdsa::VerifyingKey::recover_from_prehash(digest, &signature, recovery_id)
        {
            if candidate.to_encoded_point(true) == expected {
                return Ok(id);
            }
        }
    }
    Err(CryptoError::RecoveryImpossible(
        "no recovery id reconstructs the expected secp256r1 key".into(),
    ))
}

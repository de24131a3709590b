// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Extrinsic Codec
//!
//! SCALE building blocks for the account-model chain: compact integers,
//! mortal eras, SS58 address rendering and the version-4 signed-extrinsic
//! layout. The runtime accepts secp256r1 signatures as their own
//! `MultiSignature` variant; the signing payload is the call followed by the
//! era, nonce, tip, runtime versions and the genesis/checkpoint hashes.

use crate::crypto::{blake2b_256, blake2b_512, sha256};
use crate::protocol::{ExecutionOutcome, JobIdentifier};

/// Generic substrate-network SS58 prefix.
const SS58_PREFIX: u8 = 42;
const SS58_CHECKSUM_CONTEXT: &[u8] = b"SS58PRE";

/// Format version 4, signed bit set.
const EXTRINSIC_VERSION: u8 = 0x84;
/// `MultiAddress::Id` discriminant.
const ADDRESS_ID_TAG: u8 = 0x00;
/// Runtime `MultiSignature` discriminant for secp256r1 signatures.
const SIGNATURE_P256_TAG: u8 = 0x03;

/// Mortality period in blocks; must stay a power of two.
const ERA_PERIOD: u64 = 64;

pub const HEARTBEAT_CALL_INDEX: [u8; 2] = [0x29, 0x03];
pub const REPORT_CALL_INDEX: [u8; 2] = [0x2b, 0x04];

/// Per-submission signing context fetched from the network.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub era: [u8; 2],
    pub nonce: u64,
    pub tip: u64,
    pub spec_version: u32,
    pub transaction_version: u32,
    pub genesis_hash: [u8; 32],
    pub block_hash: [u8; 32],
}

// =============================================================================
// SCALE primitives
// =============================================================================

/// SCALE compact integer encoding.
pub fn compact(value: u64) -> Vec<u8> {
    if value < 1 << 6 {
        vec![(value as u8) << 2]
    } else if value < 1 << 14 {
        (((value as u16) << 2) | 0b01).to_le_bytes().to_vec()
    } else if value < 1 << 30 {
        (((value as u32) << 2) | 0b10).to_le_bytes().to_vec()
    } else {
        let bytes = value.to_le_bytes();
        let significant = 8 - value.leading_zeros() as usize / 8;
        let mut out = vec![0b11 | (((significant - 4) as u8) << 2)];
        out.extend_from_slice(&bytes[..significant]);
        out
    }
}

/// Length-prefixed byte sequence (`Vec<u8>` in SCALE terms).
pub fn compact_bytes(data: &[u8]) -> Vec<u8> {
    let mut out = compact(data.len() as u64);
    out.extend_from_slice(data);
    out
}

/// Two-byte mortal era anchored at `block_number`, period 64.
pub fn mortal_era(block_number: u64) -> [u8; 2] {
    let phase = block_number % ERA_PERIOD;
    let encoded = (ERA_PERIOD.trailing_zeros() as u16 - 1) | ((phase as u16) << 4);
    encoded.to_le_bytes()
}

/// SS58 rendering of a 32-byte account id under the generic prefix.
pub fn ss58_encode(account_id: &[u8; 32]) -> String {
    let mut data = Vec::with_capacity(1 + account_id.len());
    data.push(SS58_PREFIX);
    data.extend_from_slice(account_id);

    let mut preimage = SS58_CHECKSUM_CONTEXT.to_vec();
    preimage.extend_from_slice(&data);
    let checksum = blake2b_512(&preimage);

    data.extend_from_slice(&checksum[..2]);
    bs58::encode(data).into_string()
}

// =============================================================================
// Calls
// =============================================================================

pub fn fulfill_call(call_index: [u8; 2], script: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut out = call_index.to_vec();
    out.extend_from_slice(&compact_bytes(script));
    out.extend_from_slice(&compact_bytes(payload));
    out
}

pub fn report_call(job: &JobIdentifier, last: bool, outcome: &ExecutionOutcome) -> Vec<u8> {
    let mut out = REPORT_CALL_INDEX.to_vec();
    out.extend_from_slice(&job.requester);
    out.extend_from_slice(&compact_bytes(&job.script));
    out.push(last as u8);
    match outcome {
        ExecutionOutcome::Success(bytes) => {
            out.push(0);
            out.extend_from_slice(&compact_bytes(bytes));
        }
        ExecutionOutcome::Failure(bytes) => {
            out.push(1);
            out.extend_from_slice(&compact_bytes(bytes));
        }
    }
    out
}

pub fn heartbeat_call() -> Vec<u8> {
    HEARTBEAT_CALL_INDEX.to_vec()
}

// =============================================================================
// Signing payload and extrinsic assembly
// =============================================================================

/// Bytes covered by the extrinsic signature.
pub fn signing_payload(call: &[u8], context: &OperationContext) -> Vec<u8> {
    let mut out = call.to_vec();
    out.extend_from_slice(&context.era);
    out.extend_from_slice(&compact(context.nonce));
    out.extend_from_slice(&compact(context.tip));
    out.extend_from_slice(&context.spec_version.to_le_bytes());
    out.extend_from_slice(&context.transaction_version.to_le_bytes());
    out.extend_from_slice(&context.genesis_hash);
    out.extend_from_slice(&context.block_hash);
    out
}

/// Digest handed to the secp256r1 signer. Payloads longer than 256 bytes
/// are Blake2b-compressed first, as the runtime does before verification.
pub fn signing_digest(payload: &[u8]) -> [u8; 32] {
    if payload.len() > 256 {
        sha256(&blake2b_256(payload))
    } else {
        sha256(payload)
    }
}

/// Length-prefixed signed extrinsic ready for submission.
pub fn extrinsic(
    call: &[u8],
    context: &OperationContext,
    account_id: &[u8; 32],
    signature: &[u8; 65],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(104 + call.len());
    body.push(EXTRINSIC_VERSION);
    body.push(ADDRESS_ID_TAG);
    body.extend_from_slice(account_id);
    body.push(SIGNATURE_P256_TAG);
    body.extend_from_slice(signature);
    body.extend_from_slice(&context.era);
    body.extend_from_slice(&compact(context.nonce));
    body.extend_from_slice(&compact(context.tip));
    body.extend_from_slice(call);

    let mut out = compact(body.len() as u64);
    out.extend_from_slice(&body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_single_byte_mode() {
        assert_eq!(hex::encode(compact(0)), "00");
        assert_eq!(hex::encode(compact(1)), "04");
        assert_eq!(hex::encode(compact(42)), "a8");
        assert_eq!(hex::encode(compact(63)), "fc");
    }

    #[test]
    fn compact_two_and_four_byte_modes() {
        assert_eq!(hex::encode(compact(64)), "0101");
        assert_eq!(hex::encode(compact(16383)), "fdff");
        assert_eq!(hex::encode(compact(16384)), "02000100");
        assert_eq!(hex::encode(compact((1 << 30) - 1)), "feffffff");
    }

    #[test]
    fn compact_big_integer_mode() {
        assert_eq!(hex::encode(compact(1 << 30)), "0300000040");
        assert_eq!(hex::encode(compact(u64::MAX)), "13ffffffffffffffff");
    }

    #[test]
    fn compact_bytes_prefixes_the_length() {
        assert_eq!(hex::encode(compact_bytes(&[0xAA, 0xBB])), "08aabb");
        assert_eq!(hex::encode(compact_bytes(&[])), "00");
    }

    #[test]
    fn mortal_era_encodes_period_and_phase() {
        assert_eq!(mortal_era(0), [0x05, 0x00]);
        // period 64, phase 42
        assert_eq!(mortal_era(42), [0xa5, 0x02]);
        assert_eq!(mortal_era(64), [0x05, 0x00]);
        assert_eq!(mortal_era(100), [0x45, 0x02]);
    }

    #[test]
    fn ss58_encodes_the_well_known_dev_account() {
        let account: [u8; 32] =
            hex::decode("d43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d")
                .unwrap()
                .try_into()
                .unwrap();
        assert_eq!(
            ss58_encode(&account),
            "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY"
        );
    }

    #[test]
    fn fulfill_call_concatenates_script_and_payload() {
        let call = fulfill_call([0x3c, 0x00], &[0x01, 0x02], &[0xFF]);
        assert_eq!(hex::encode(call), "3c0008010204ff");
    }

    #[test]
    fn report_call_encodes_job_last_flag_and_outcome() {
        let job = JobIdentifier {
            requester: [0x11; 32],
            script: vec![0xAB],
        };
        let call = report_call(&job, true, &ExecutionOutcome::Success(vec![0xCD]));
        let mut expected = vec![0x2b, 0x04];
        expected.extend_from_slice(&[0x11; 32]);
        expected.extend_from_slice(&[0x04, 0xAB]); // script
        expected.push(0x01); // last
        expected.extend_from_slice(&[0x00, 0x04, 0xCD]); // Success(bytes)
        assert_eq!(call, expected);

        let failed = report_call(&job, false, &ExecutionOutcome::Failure(vec![]));
        assert_eq!(&failed[36..], &[0x00, 0x01, 0x00]);
    }

    #[test]
    fn signing_payload_layout_is_stable() {
        let context = OperationContext {
            era: [0xa5, 0x02],
            nonce: 7,
            tip: 0,
            spec_version: 17,
            transaction_version: 2,
            genesis_hash: [0xAA; 32],
            block_hash: [0xBB; 32],
        };
        let payload = signing_payload(&[0x29, 0x03], &context);
        assert_eq!(payload.len(), 2 + 2 + 1 + 1 + 4 + 4 + 32 + 32);
        assert_eq!(&payload[..2], &[0x29, 0x03]);
        assert_eq!(&payload[2..4], &[0xa5, 0x02]);
        assert_eq!(payload[4], 0x1c); // compact(7)
        assert_eq!(payload[5], 0x00); // compact(0)
        assert_eq!(&payload[6..10], &17u32.to_le_bytes());
        assert_eq!(&payload[10..14], &2u32.to_le_bytes());
    }

    #[test]
    fn long_payloads_are_hash_compressed_before_signing() {
        let short = vec![0x01; 256];
        let long = vec![0x01; 257];
        assert_eq!(signing_digest(&short), sha256(&short));
        assert_eq!(signing_digest(&long), sha256(&blake2b_256(&long)));
    }

    #[test]
    fn extrinsic_wraps_the_signed_body_with_its_length() {
        let context = OperationContext {
            era: [0x05, 0x00],
            nonce: 0,
            tip: 0,
            spec_version: 1,
            transaction_version: 1,
            genesis_hash: [0u8; 32],
            block_hash: [0u8; 32],
        };
        let call = heartbeat_call();
        let encoded = extrinsic(&call, &context, &[0x22; 32], &[0x33; 65]);

        // body = version + (tag + account) + (tag + sig) + era + nonce + tip + call
        let body_len = 1 + 33 + 66 + 2 + 1 + 1 + 2;
        assert_eq!(encoded.len(), compact(body_len as u64).len() + body_len);
        let body = &encoded[2..];
        assert_eq!(body[0], 0x84);
        assert_eq!(body[1], 0x00);
        assert_eq!(&body[2..34], &[0x22; 32]);
        assert_eq!(body[34], 0x03);
        assert_eq!(&body[body.len() - 2..], &[0x29, 0x03]);
    }
}

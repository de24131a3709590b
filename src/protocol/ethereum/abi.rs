// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Contract Call Encoding
//!
//! Just enough ABI to call `fulfill(bytes)`: a method selector and the
//! standard dynamic-`bytes` argument layout (offset slot, length slot,
//! right-padded data). Additional argument types are out of scope.

use alloy::primitives::keccak256;

const SLOT_LENGTH: usize = 32;

/// First 4 bytes of the keccak256 hash of the method signature.
pub fn selector(method_signature: &str) -> [u8; 4] {
    let hash = keccak256(method_signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

fn int_slot(value: usize, out: &mut Vec<u8>) {
    let mut slot = [0u8; SLOT_LENGTH];
    slot[SLOT_LENGTH - 8..].copy_from_slice(&(value as u64).to_be_bytes());
    out.extend_from_slice(&slot);
}

/// Encode a dynamic `bytes` argument.
///
/// `offset` is the combined length of all preceding head slots; the data
/// itself lands one slot past it.
pub fn encode_bytes_argument(offset: usize, buffer: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    int_slot(offset + SLOT_LENGTH, &mut out);
    int_slot(buffer.len(), &mut out);
    out.extend_from_slice(buffer);
    // right-pad the tail to a slot boundary
    let remainder = buffer.len() % SLOT_LENGTH;
    if remainder != 0 || buffer.is_empty() {
        out.resize(out.len() + SLOT_LENGTH - remainder, 0);
    }
    out
}

/// Full calldata for a single-`bytes` contract call.
pub fn call_data(method_signature: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = selector(method_signature).to_vec();
    out.extend_from_slice(&encode_bytes_argument(0, payload));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fulfill_selector_is_stable() {
        assert_eq!(hex::encode(selector("fulfill(bytes)")), "144f725e");
    }

    #[test]
    fn encodes_single_byte_argument() {
        assert_eq!(
            hex::encode(encode_bytes_argument(0, &[0xff])),
            "0000000000000000000000000000000000000000000000000000000000000020\
             0000000000000000000000000000000000000000000000000000000000000001\
             ff00000000000000000000000000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn encodes_exact_slot_without_extra_padding() {
        let data = [0xabu8; 32];
        let encoded = encode_bytes_argument(0, &data);
        assert_eq!(encoded.len(), 3 * SLOT_LENGTH);
        assert_eq!(&encoded[64..], &data);
    }

    #[test]
    fn empty_bytes_still_occupy_a_data_slot() {
        let encoded = encode_bytes_argument(0, &[]);
        assert_eq!(encoded.len(), 3 * SLOT_LENGTH);
        assert!(encoded[64..].iter().all(|b| *b == 0));
    }

    #[test]
    fn call_data_prepends_the_selector() {
        let data = call_data("fulfill(bytes)", &[0x01, 0x02]);
        assert_eq!(&data[..4], &[0x14, 0x4f, 0x72, 0x5e]);
        assert_eq!(data.len(), 4 + 3 * SLOT_LENGTH);
    }
}

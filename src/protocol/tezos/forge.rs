// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Operation Forging
//!
//! Binary serialization of tz-style operation groups: base58check address
//! and key material codecs, unsigned zarith naturals, and the fixed layout
//! of reveal and transaction contents. The forged bytes are what gets
//! watermarked, hashed and signed.

use super::micheline::Micheline;
use crate::error::ProcessorError;

// base58check payload prefixes
const PREFIX_BLOCK_HASH: [u8; 2] = [1, 52];
const PREFIX_TZ1: [u8; 3] = [6, 161, 159];
const PREFIX_TZ2: [u8; 3] = [6, 161, 161];
const PREFIX_TZ3: [u8; 3] = [6, 161, 164];
const PREFIX_KT1: [u8; 3] = [2, 90, 121];
const PREFIX_P2PK: [u8; 4] = [3, 178, 139, 127];
const PREFIX_P2SIG: [u8; 4] = [54, 240, 44, 52];

// content tags
const TAG_REVEAL: u8 = 0x6b;
const TAG_TRANSACTION: u8 = 0x6c;

/// Watermark prepended to forged bytes before hashing for signature.
pub const OPERATION_WATERMARK: u8 = 0x03;

/// Bootstrap reveal defaults.
pub const REVEAL_FEE: u64 = 3590;
pub const REVEAL_GAS_LIMIT: u64 = 1000;
pub const REVEAL_STORAGE_LIMIT: u64 = 1000;

pub fn base58check_encode(prefix: &[u8], payload: &[u8]) -> String {
    let mut data = prefix.to_vec();
    data.extend_from_slice(payload);
    bs58::encode(data).with_check().into_string()
}

pub fn base58check_decode(encoded: &str, prefix: &[u8]) -> Result<Vec<u8>, ProcessorError> {
    let decoded = bs58::decode(encoded)
        .with_check(None)
        .into_vec()
        .map_err(|e| ProcessorError::Encoding(format!("base58check decode failed: {e}")))?;
    if !decoded.starts_with(prefix) {
        return Err(ProcessorError::Encoding(format!(
            "unexpected base58 prefix on {encoded}"
        )));
    }
    Ok(decoded[prefix.len()..].to_vec())
}

/// tz3 address of a compressed secp256r1 public key.
pub fn address_from_public_key(compressed_public_key: &[u8]) -> String {
    let hash = crate::crypto::blake2b_160(compressed_public_key);
    base58check_encode(&PREFIX_TZ3, &hash)
}

/// Decode a `p2pk` base58 public key into its 33 compressed bytes.
pub fn public_key_from_b58(encoded: &str) -> Result<Vec<u8>, ProcessorError> {
    base58check_decode(encoded, &PREFIX_P2PK)
}

/// Render a raw 64-byte signature in its curve-tagged base58 form.
pub fn signature_to_b58(signature: &[u8; 64]) -> String {
    base58check_encode(&PREFIX_P2SIG, signature)
}

/// Decode the branch block hash into its 32 raw bytes.
pub fn branch_bytes(branch: &str) -> Result<[u8; 32], ProcessorError> {
    let raw = base58check_decode(branch, &PREFIX_BLOCK_HASH)?;
    raw.try_into()
        .map_err(|_| ProcessorError::Encoding("branch hash is not 32 bytes".into()))
}

/// `tag || 20-byte hash` of an implicit account (tz1/tz2/tz3).
fn implicit_address_bytes(address: &str) -> Result<[u8; 21], ProcessorError> {
    let (tag, prefix): (u8, &[u8]) = if address.starts_with("tz1") {
        (0, &PREFIX_TZ1)
    } else if address.starts_with("tz2") {
        (1, &PREFIX_TZ2)
    } else if address.starts_with("tz3") {
        (2, &PREFIX_TZ3)
    } else {
        return Err(ProcessorError::Encoding(format!(
            "not an implicit account: {address}"
        )));
    };
    let hash = base58check_decode(address, prefix)?;
    if hash.len() != 20 {
        return Err(ProcessorError::Encoding("account hash is not 20 bytes".into()));
    }
    let mut out = [0u8; 21];
    out[0] = tag;
    out[1..].copy_from_slice(&hash);
    Ok(out)
}

/// 22-byte destination encoding: implicit accounts as `00 || tagged hash`,
/// originated contracts as `01 || hash || 00`.
fn contract_address_bytes(address: &str) -> Result<[u8; 22], ProcessorError> {
    let mut out = [0u8; 22];
    if address.starts_with("KT1") {
        let hash = base58check_decode(address, &PREFIX_KT1)?;
        if hash.len() != 20 {
            return Err(ProcessorError::Encoding("contract hash is not 20 bytes".into()));
        }
        out[0] = 0x01;
        out[1..21].copy_from_slice(&hash);
        out[21] = 0x00;
    } else {
        out[0] = 0x00;
        out[1..].copy_from_slice(&implicit_address_bytes(address)?);
    }
    Ok(out)
}

/// Unsigned zarith natural, 7 bits per byte, little-endian groups.
fn zarith_nat(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn encode_entrypoint(entrypoint: &str, out: &mut Vec<u8>) -> Result<(), ProcessorError> {
    match entrypoint {
        "default" => out.push(0x00),
        "root" => out.push(0x01),
        "do" => out.push(0x02),
        "set_delegate" => out.push(0x03),
        "remove_delegate" => out.push(0x04),
        named => {
            let bytes = named.as_bytes();
            if bytes.len() > u8::MAX as usize {
                return Err(ProcessorError::Encoding("entrypoint name too long".into()));
            }
            out.push(0xff);
            out.push(bytes.len() as u8);
            out.extend_from_slice(bytes);
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct TransactionContent {
    pub source: String,
    pub fee: u64,
    pub counter: u64,
    pub gas_limit: u64,
    pub storage_limit: u64,
    pub amount: u64,
    pub destination: String,
    pub entrypoint: String,
    pub value: Micheline,
}

#[derive(Debug, Clone)]
pub struct RevealContent {
    pub source: String,
    pub fee: u64,
    pub counter: u64,
    pub gas_limit: u64,
    pub storage_limit: u64,
    /// Compressed secp256r1 public key.
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum OperationContent {
    Reveal(RevealContent),
    Transaction(TransactionContent),
}

fn forge_common_prefix(
    tag: u8,
    source: &str,
    fee: u64,
    counter: u64,
    gas_limit: u64,
    storage_limit: u64,
    out: &mut Vec<u8>,
) -> Result<(), ProcessorError> {
    out.push(tag);
    out.extend_from_slice(&implicit_address_bytes(source)?);
    zarith_nat(fee, out);
    zarith_nat(counter, out);
    zarith_nat(gas_limit, out);
    zarith_nat(storage_limit, out);
    Ok(())
}

fn forge_content(content: &OperationContent, out: &mut Vec<u8>) -> Result<(), ProcessorError> {
    match content {
        OperationContent::Reveal(reveal) => {
            forge_common_prefix(
                TAG_REVEAL,
                &reveal.source,
                reveal.fee,
                reveal.counter,
                reveal.gas_limit,
                reveal.storage_limit,
                out,
            )?;
            if reveal.public_key.len() != 33 {
                return Err(ProcessorError::Encoding(
                    "reveal expects a 33-byte compressed key".into(),
                ));
            }
            // tag 2: secp256r1 public key
            out.push(0x02);
            out.extend_from_slice(&reveal.public_key);
        }
        OperationContent::Transaction(tx) => {
            forge_common_prefix(
                TAG_TRANSACTION,
                &tx.source,
                tx.fee,
                tx.counter,
                tx.gas_limit,
                tx.storage_limit,
                out,
            )?;
            zarith_nat(tx.amount, out);
            out.extend_from_slice(&contract_address_bytes(&tx.destination)?);
            // parameters presence flag
            out.push(0xff);
            encode_entrypoint(&tx.entrypoint, out)?;
            let value = tx.value.encode();
            out.extend_from_slice(&(value.len() as u32).to_be_bytes());
            out.extend_from_slice(&value);
        }
    }
    Ok(())
}

/// Forge a full operation group: branch followed by each content in order.
pub fn forge_operation_group(
    branch: &str,
    contents: &[OperationContent],
) -> Result<Vec<u8>, ProcessorError> {
    let mut out = Vec::new();
    out.extend_from_slice(&branch_bytes(branch)?);
    for content in contents {
        forge_content(content, &mut out)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBLIC_KEY_B58: &str = "p2pk67U3tiwZBEb7cv7YcuY5v286VJSBXESVV4FVJqS2mFejtYv86Br";

    #[test]
    fn address_derivation_matches_known_account() {
        let public_key = public_key_from_b58(PUBLIC_KEY_B58).unwrap();
        assert_eq!(public_key.len(), 33);
        assert_eq!(
            address_from_public_key(&public_key),
            "tz3bqWfPDPCHaQspeNj2RA3Xtt1jewJfxmts"
        );
    }

    #[test]
    fn base58check_round_trips() {
        let payload = [0x42u8; 20];
        let encoded = base58check_encode(&[6, 161, 164], &payload);
        assert_eq!(
            base58check_decode(&encoded, &[6, 161, 164]).unwrap(),
            payload
        );
    }

    #[test]
    fn wrong_prefix_is_rejected() {
        assert!(base58check_decode("tz3bqWfPDPCHaQspeNj2RA3Xtt1jewJfxmts", &[1, 52]).is_err());
    }

    #[test]
    fn zarith_nat_vectors() {
        let mut out = Vec::new();
        zarith_nat(0, &mut out);
        assert_eq!(hex::encode(&out), "00");

        out.clear();
        zarith_nat(2355, &mut out);
        assert_eq!(hex::encode(&out), "b312");

        out.clear();
        zarith_nat(20503891, &mut out);
        assert_eq!(hex::encode(&out), "d3bae309");
    }

    #[test]
    fn forges_the_reference_transaction() {
        let public_key = public_key_from_b58(PUBLIC_KEY_B58).unwrap();
        let source = address_from_public_key(&public_key);

        let forged = forge_operation_group(
            "BMHBtAaUv59LipV1czwZ5iQkxEktPJDE7A9sYXPkPeRzbBasNY8",
            &[OperationContent::Transaction(TransactionContent {
                source,
                fee: 2355,
                counter: 20503891,
                gas_limit: 19856,
                storage_limit: 2535,
                amount: 0,
                destination: "KT1Mgy95DVzqVBNYhsW93cyHuB57Q94UFhrh".into(),
                entrypoint: "makeOven".into(),
                value: Micheline::Seq(vec![]),
            })],
        )
        .unwrap();

        assert_eq!(
            hex::encode(forged),
            "ce69c5713dac3537254e7be59759cf59c15abd530d10501ccf9028a5786314cf\
             6c02aa1c86fc255fd6caf272eeed63821f3c5d78140cb312d3bae309909b01e7\
             1300018fc5caed1547213e2227eedae324337031afe37700ffff086d616b654f\
             76656e000000050200000000"
        );
    }

    #[test]
    fn forges_a_reveal_before_the_first_transaction() {
        let public_key = public_key_from_b58(PUBLIC_KEY_B58).unwrap();
        let source = address_from_public_key(&public_key);

        let forged = forge_operation_group(
            "BMHBtAaUv59LipV1czwZ5iQkxEktPJDE7A9sYXPkPeRzbBasNY8",
            &[OperationContent::Reveal(RevealContent {
                source,
                fee: REVEAL_FEE,
                counter: 1,
                gas_limit: REVEAL_GAS_LIMIT,
                storage_limit: REVEAL_STORAGE_LIMIT,
                public_key: public_key.clone(),
            })],
        )
        .unwrap();

        // branch(32) || tag || source(21) || fee || counter || gas || storage
        // || key tag || key(33)
        let hex = hex::encode(&forged);
        assert!(hex.starts_with(
            "ce69c5713dac3537254e7be59759cf59c15abd530d10501ccf9028a5786314cf6b02aa1c"
        ));
        assert!(hex.ends_with(&hex::encode(&public_key)));
        assert_eq!(forged.len(), 32 + 1 + 21 + 2 + 1 + 2 + 2 + 1 + 33);
    }
}

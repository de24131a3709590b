// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Micheline Expressions
//!
//! Minimal Micheline value model with the fixed binary encoding used for
//! transaction parameters and `PACK`-style payload packing. Only the node
//! kinds the fulfillment path produces are modeled.

/// Data-level primitives by their fixed opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prim {
    False,
    Elt,
    Left,
    None_,
    Pair,
    Right,
    Some_,
    True,
    Unit,
}

impl Prim {
    fn opcode(self) -> u8 {
        match self {
            Prim::False => 0x03,
            Prim::Elt => 0x04,
            Prim::Left => 0x05,
            Prim::None_ => 0x06,
            Prim::Pair => 0x07,
            Prim::Right => 0x08,
            Prim::Some_ => 0x09,
            Prim::True => 0x0a,
            Prim::Unit => 0x0b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Micheline {
    Int(i128),
    String(String),
    Bytes(Vec<u8>),
    Prim { prim: Prim, args: Vec<Micheline> },
    Seq(Vec<Micheline>),
}

impl Micheline {
    pub fn unit() -> Self {
        Micheline::Prim {
            prim: Prim::Unit,
            args: Vec::new(),
        }
    }

    pub fn pair(left: Micheline, right: Micheline) -> Self {
        Micheline::Prim {
            prim: Prim::Pair,
            args: vec![left, right],
        }
    }

    /// Raw binary encoding without the pack prefix.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    /// `PACK`-compatible serialization: `0x05 || encode`.
    pub fn pack(&self) -> Vec<u8> {
        let mut out = vec![0x05];
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Micheline::Int(value) => {
                out.push(0x00);
                zarith_signed(*value, out);
            }
            Micheline::String(value) => {
                out.push(0x01);
                out.extend_from_slice(&(value.len() as u32).to_be_bytes());
                out.extend_from_slice(value.as_bytes());
            }
            Micheline::Bytes(value) => {
                out.push(0x0a);
                out.extend_from_slice(&(value.len() as u32).to_be_bytes());
                out.extend_from_slice(value);
            }
            Micheline::Seq(items) => {
                let mut body = Vec::new();
                for item in items {
                    item.encode_into(&mut body);
                }
                out.push(0x02);
                out.extend_from_slice(&(body.len() as u32).to_be_bytes());
                out.extend_from_slice(&body);
            }
            Micheline::Prim { prim, args } => {
                // Tag selects the argument arity; annotations are never
                // produced on the fulfillment path.
                let tag = match args.len() {
                    0 => 0x03,
                    1 => 0x05,
                    2 => 0x07,
                    _ => 0x09,
                };
                out.push(tag);
                out.push(prim.opcode());
                if tag == 0x09 {
                    let mut body = Vec::new();
                    for arg in args {
                        arg.encode_into(&mut body);
                    }
                    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
                    out.extend_from_slice(&body);
                    // empty annotation block
                    out.extend_from_slice(&0u32.to_be_bytes());
                } else {
                    for arg in args {
                        arg.encode_into(out);
                    }
                }
            }
        }
    }
}

/// Signed zarith: 6 payload bits plus sign in the first byte, 7 in each
/// continuation byte, little-endian groups, high bit marks continuation.
fn zarith_signed(value: i128, out: &mut Vec<u8>) {
    let negative = value < 0;
    let mut magnitude = value.unsigned_abs();

    let mut byte = (magnitude & 0x3f) as u8;
    if negative {
        byte |= 0x40;
    }
    magnitude >>= 6;

    while magnitude > 0 {
        out.push(byte | 0x80);
        byte = (magnitude & 0x7f) as u8;
        magnitude >>= 7;
    }
    out.push(byte);
}

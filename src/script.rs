//! Script byte containers, opcode parsing and the human-readable text form
//!
//! Human-readable scripts are whitespace-separated tokens. A token is
//! either an opcode name (`OP_DUP`) or a `0x`-prefixed hex literal, which
//! is pushed with the smallest push opcode that fits it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ChainParamsError, Result};
use crate::opcode_table::OpcodeTable;
use crate::opcodes::*;
use crate::types::ByteString;

/// One parsed script operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOp {
    /// Byte offset of the opcode within the script
    pub offset: usize,
    /// Byte offset just past the operation (opcode plus any pushed data)
    pub end: usize,
    pub opcode: u8,
    /// Pushed bytes for `OP_0`, direct pushes and `OP_PUSHDATA1/2/4`
    pub data: Option<ByteString>,
}

impl ScriptOp {
    pub fn is_push(&self) -> bool {
        is_push(self.opcode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Script(ByteString);

impl Script {
    pub fn new() -> Self {
        Script(Vec::new())
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Script(bytes.to_vec())
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        Ok(Script(hex::decode(hex_str.trim())?))
    }

    pub fn to_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> ByteString {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Split the script into operations; a push running past the end fails
    pub fn ops(&self) -> Result<Vec<ScriptOp>> {
        let bytes = &self.0;
        let mut ops = Vec::new();
        let mut pos = 0;

        while pos < bytes.len() {
            let offset = pos;
            let opcode = bytes[pos];
            pos += 1;

            let push_len = match opcode {
                OP_0 => Some(0),
                0x01..=0x4b => Some(opcode as usize),
                OP_PUSHDATA1 => Some(read_push_len(bytes, &mut pos, 1)?),
                OP_PUSHDATA2 => Some(read_push_len(bytes, &mut pos, 2)?),
                OP_PUSHDATA4 => Some(read_push_len(bytes, &mut pos, 4)?),
                _ => None,
            };

            let data = match push_len {
                Some(n) => {
                    if pos + n > bytes.len() {
                        return Err(ChainParamsError::TruncatedInput {
                            needed: n,
                            remaining: bytes.len() - pos,
                        });
                    }
                    let data = bytes[pos..pos + n].to_vec();
                    pos += n;
                    Some(data)
                }
                None => None,
            };

            ops.push(ScriptOp { offset, end: pos, opcode, data });
        }

        Ok(ops)
    }

    /// Append a data push using the smallest push opcode that fits
    pub fn push_data(&mut self, data: &[u8]) {
        self.0.extend_from_slice(&encode_push(data));
    }

    pub fn push_opcode(&mut self, opcode: u8) {
        self.0.push(opcode);
    }

    /// Remove every operation whose raw encoding equals `pattern`
    pub fn find_and_delete(&self, pattern: &[u8]) -> Result<Script> {
        if pattern.is_empty() {
            return Ok(self.clone());
        }
        let mut out = Vec::with_capacity(self.0.len());
        for op in self.ops()? {
            let raw = &self.0[op.offset..op.end];
            if raw != pattern {
                out.extend_from_slice(raw);
            }
        }
        Ok(Script(out))
    }

    /// Remove every occurrence of a non-push opcode
    pub fn without_opcode(&self, opcode: u8) -> Result<Script> {
        self.find_and_delete(&[opcode])
    }

    /// Parse human-readable text, resolving names with `table`
    pub fn from_human(text: &str, table: &OpcodeTable) -> Result<Self> {
        let mut script = Script::new();
        for token in text.split_whitespace() {
            if let Some(hex_part) = token.strip_prefix("0x") {
                let data = hex::decode(hex_part).map_err(|e| {
                    ChainParamsError::ScriptParse(format!("invalid push literal '{}': {}", token, e))
                })?;
                script.push_data(&data);
            } else if let Some(value) = table.value_of(token) {
                script.push_opcode(value);
            } else if let Some(value) = parse_unknown_token(token) {
                script.push_opcode(value);
            } else {
                return Err(ChainParamsError::ScriptParse(format!(
                    "unrecognized token '{}'",
                    token
                )));
            }
        }
        Ok(script)
    }

    /// Render as human-readable text, naming opcodes with `table`
    pub fn to_human(&self, table: &OpcodeTable) -> Result<String> {
        let tokens: Vec<String> = self
            .ops()?
            .iter()
            .map(|op| human_token(op, table))
            .collect();
        Ok(tokens.join(" "))
    }

    /// Whether the script is exactly `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
    pub fn is_p2pkh(&self) -> bool {
        let b = &self.0;
        b.len() == 25
            && b[0] == OP_DUP
            && b[1] == OP_HASH160
            && b[2] == 0x14
            && b[23] == OP_EQUALVERIFY
            && b[24] == OP_CHECKSIG
    }

    /// Whether the script is exactly `OP_HASH160 <20 bytes> OP_EQUAL`
    pub fn is_p2sh(&self) -> bool {
        let b = &self.0;
        b.len() == 23 && b[0] == OP_HASH160 && b[1] == 0x14 && b[22] == OP_EQUAL
    }
}

impl From<ByteString> for Script {
    fn from(bytes: ByteString) -> Self {
        Script(bytes)
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

fn read_push_len(bytes: &[u8], pos: &mut usize, width: usize) -> Result<usize> {
    if *pos + width > bytes.len() {
        return Err(ChainParamsError::TruncatedInput {
            needed: width,
            remaining: bytes.len() - *pos,
        });
    }
    let mut len = 0usize;
    for (i, b) in bytes[*pos..*pos + width].iter().enumerate() {
        len |= (*b as usize) << (8 * i);
    }
    *pos += width;
    Ok(len)
}

fn parse_unknown_token(token: &str) -> Option<u8> {
    let hex_part = token.strip_prefix("OP_UNKNOWN_")?;
    u8::from_str_radix(hex_part, 16).ok()
}

fn human_token(op: &ScriptOp, table: &OpcodeTable) -> String {
    match &op.data {
        Some(data) if !data.is_empty() => format!("0x{}", hex::encode(data)),
        _ => table
            .text_name(op.opcode)
            .map(str::to_string)
            .unwrap_or_else(|| format!("OP_UNKNOWN_{:02x}", op.opcode)),
    }
}

/// Raw encoding of a minimal data push
pub fn encode_push(data: &[u8]) -> Vec<u8> {
    let len = data.len();
    let mut out = Vec::with_capacity(len + 5);
    if len == 0 {
        out.push(OP_0);
    } else if len <= 0x4b {
        out.push(len as u8);
    } else if len <= 0xff {
        out.push(OP_PUSHDATA1);
        out.push(len as u8);
    } else if len <= 0xffff {
        out.push(OP_PUSHDATA2);
        out.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        out.push(OP_PUSHDATA4);
        out.extend_from_slice(&(len as u32).to_le_bytes());
    }
    out.extend_from_slice(data);
    out
}

/// Decode a script number of at most `max_len` bytes
pub fn decode_num(bytes: &[u8], max_len: usize) -> Result<i64> {
    if bytes.len() > max_len {
        return Err(ChainParamsError::ScriptExecution(format!(
            "numeric operand of {} bytes exceeds {} bytes",
            bytes.len(),
            max_len
        )));
    }
    if bytes.is_empty() {
        return Ok(0);
    }

    let mut result: i64 = 0;
    for (i, b) in bytes.iter().enumerate() {
        result |= (*b as i64) << (8 * i);
    }

    // sign bit lives in the last byte
    let last = bytes[bytes.len() - 1];
    if last & 0x80 != 0 {
        let mask = !(0x80i64 << (8 * (bytes.len() - 1)));
        Ok(-(result & mask))
    } else {
        Ok(result)
    }
}

/// Minimal script number encoding
pub fn encode_num(value: i64) -> ByteString {
    if value == 0 {
        return Vec::new();
    }

    let negative = value < 0;
    let mut abs = value.unsigned_abs();
    let mut out = Vec::new();
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }

    let last = out.len() - 1;
    if out[last] & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        out[last] |= 0x80;
    }
    out
}

/// Script truthiness: any non-zero byte, except a lone negative zero
pub fn cast_to_bool(bytes: &[u8]) -> bool {
    for (i, b) in bytes.iter().enumerate() {
        if *b != 0 {
            return !(i == bytes.len() - 1 && *b == 0x80);
        }
    }
    false
}

//! Schema-driven binary codec
//!
//! Fields are read and written in schema order. Integers are fixed width,
//! byte blobs are either fixed length or varint-prefixed, and lists are a
//! varint count followed by their elements. The codec adds no padding,
//! alignment or checksum of its own.

use std::sync::Arc;

use crate::entity::Entity;
use crate::error::{ChainParamsError, Result};
use crate::schema::{Encoding, Endianness, FieldSpec, Schema, SchemaKind};
use crate::transaction::Transaction;
use crate::types::*;

/// Cursor over an in-memory byte buffer
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Take exactly `n` bytes
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(ChainParamsError::TruncatedInput {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.read_bytes(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_i64_le(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.read_bytes(8)?);
        Ok(i64::from_le_bytes(buf))
    }

    /// Read a Bitcoin CompactSize integer
    pub fn read_varint(&mut self) -> Result<u64> {
        let prefix = self.read_u8()?;
        let value = match prefix {
            0xfd => {
                let mut buf = [0u8; 2];
                buf.copy_from_slice(self.read_bytes(2)?);
                u16::from_le_bytes(buf) as u64
            }
            0xfe => self.read_u32_le()? as u64,
            0xff => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(self.read_bytes(8)?);
                u64::from_le_bytes(buf)
            }
            n => n as u64,
        };
        Ok(value)
    }

    /// Read a varint length followed by that many bytes
    pub fn read_var_bytes(&mut self) -> Result<ByteString> {
        let len = self.read_length()?;
        Ok(self.read_bytes(len)?.to_vec())
    }

    /// Read a varint used as a length or element count.
    ///
    /// Every element occupies at least one byte, so a count larger than
    /// the remaining input can only be a truncated stream.
    fn read_length(&mut self) -> Result<usize> {
        let n = self.read_varint()?;
        if n > self.remaining() as u64 {
            return Err(ChainParamsError::TruncatedInput {
                needed: usize::try_from(n).unwrap_or(usize::MAX),
                remaining: self.remaining(),
            });
        }
        Ok(n as usize)
    }
}

/// Growable output buffer
#[derive(Debug, Clone, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u32_le(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64_le(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_varint(&mut self, value: u64) {
        self.buf.extend_from_slice(&encode_varint(value));
    }

    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.write_bytes(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Encode a number as a Bitcoin varint
pub fn encode_varint(value: u64) -> Vec<u8> {
    if value < 0xfd {
        vec![value as u8]
    } else if value <= 0xffff {
        let mut result = vec![0xfd];
        result.extend_from_slice(&(value as u16).to_le_bytes());
        result
    } else if value <= 0xffffffff {
        let mut result = vec![0xfe];
        result.extend_from_slice(&(value as u32).to_le_bytes());
        result
    } else {
        let mut result = vec![0xff];
        result.extend_from_slice(&value.to_le_bytes());
        result
    }
}

fn check_width(field: &str, width: u8) -> Result<usize> {
    if width == 0 || width > 8 {
        return Err(ChainParamsError::UnsupportedEncoding(format!(
            "field {} declares a {}-byte integer",
            field, width
        )));
    }
    Ok(width as usize)
}

/// Decode a fixed-width integer
pub fn read_int(
    reader: &mut ByteReader<'_>,
    field: &str,
    endianness: Endianness,
    signed: bool,
    width: u8,
) -> Result<i64> {
    let w = check_width(field, width)?;
    let bytes = reader.read_bytes(w)?;

    let mut raw = 0u64;
    match endianness {
        Endianness::Little => {
            for (i, b) in bytes.iter().enumerate() {
                raw |= (*b as u64) << (8 * i);
            }
        }
        Endianness::Big => {
            for b in bytes {
                raw = (raw << 8) | *b as u64;
            }
        }
    }

    let bits = 8 * w as u32;
    if signed {
        // sign-extend from the declared width
        let shift = 64 - bits;
        Ok(((raw << shift) as i64) >> shift)
    } else if raw > i64::MAX as u64 {
        Err(ChainParamsError::IntegerOverflow {
            field: field.to_string(),
            value: raw as i128,
            width,
        })
    } else {
        Ok(raw as i64)
    }
}

/// Encode a fixed-width integer, failing if `value` does not fit
pub fn write_int(
    writer: &mut ByteWriter,
    field: &str,
    value: i64,
    endianness: Endianness,
    signed: bool,
    width: u8,
) -> Result<()> {
    let w = check_width(field, width)?;
    let bits = 8 * w as u32;
    let (min, max): (i128, i128) = if signed {
        (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
    } else {
        (0, (1i128 << bits) - 1)
    };
    if (value as i128) < min || (value as i128) > max {
        return Err(ChainParamsError::IntegerOverflow {
            field: field.to_string(),
            value: value as i128,
            width,
        });
    }

    let raw = value as u64;
    match endianness {
        Endianness::Little => writer.write_bytes(&raw.to_le_bytes()[..w]),
        Endianness::Big => writer.write_bytes(&raw.to_be_bytes()[8 - w..]),
    }
    Ok(())
}

pub fn read_input(reader: &mut ByteReader<'_>) -> Result<TransactionInput> {
    let mut hash = [0u8; 32];
    hash.copy_from_slice(reader.read_bytes(32)?);
    let index = reader.read_u32_le()?;
    let script_sig = reader.read_var_bytes()?;
    let sequence = reader.read_u32_le()?;
    Ok(TransactionInput {
        prevout: OutPoint { hash, index },
        script_sig,
        sequence,
    })
}

pub fn write_input(writer: &mut ByteWriter, input: &TransactionInput) {
    writer.write_bytes(&input.prevout.hash);
    writer.write_u32_le(input.prevout.index);
    writer.write_var_bytes(&input.script_sig);
    writer.write_u32_le(input.sequence);
}

pub fn read_output(reader: &mut ByteReader<'_>) -> Result<TransactionOutput> {
    let value = reader.read_i64_le()?;
    let script_pubkey = reader.read_var_bytes()?;
    Ok(TransactionOutput { value, script_pubkey })
}

pub fn write_output(writer: &mut ByteWriter, output: &TransactionOutput) {
    writer.write_i64_le(output.value);
    writer.write_var_bytes(&output.script_pubkey);
}

/// Read one field according to its spec
pub fn read_field(
    reader: &mut ByteReader<'_>,
    field: &FieldSpec,
    nested_tx_schema: &Arc<Schema>,
) -> Result<Value> {
    let value = match field.encoding {
        Encoding::FixedInt { endianness, signed, width } => {
            Value::Int(read_int(reader, &field.name, endianness, signed, width)?)
        }
        Encoding::Bytes => match field.byte_length {
            Some(n) => Value::Bytes(reader.read_bytes(n)?.to_vec()),
            None => Value::Bytes(reader.read_var_bytes()?),
        },
        Encoding::Inputs => {
            let count = reader.read_length()?;
            let mut inputs = Vec::with_capacity(count);
            for _ in 0..count {
                inputs.push(read_input(reader)?);
            }
            Value::Inputs(inputs)
        }
        Encoding::Outputs => {
            let count = reader.read_length()?;
            let mut outputs = Vec::with_capacity(count);
            for _ in 0..count {
                outputs.push(read_output(reader)?);
            }
            Value::Outputs(outputs)
        }
        Encoding::Transactions => {
            let count = reader.read_length()?;
            let mut txs = Vec::with_capacity(count);
            for _ in 0..count {
                let entity = deserialize_fields(
                    SchemaKind::Transaction,
                    nested_tx_schema,
                    reader,
                    nested_tx_schema,
                )?;
                txs.push(Transaction::from_entity(entity));
            }
            Value::Transactions(txs)
        }
    };
    Ok(value)
}

/// Write one field according to its spec
pub fn write_field(writer: &mut ByteWriter, field: &FieldSpec, value: &Value) -> Result<()> {
    match (field.encoding, value) {
        (Encoding::FixedInt { endianness, signed, width }, Value::Int(v)) => {
            write_int(writer, &field.name, *v, endianness, signed, width)?;
        }
        (Encoding::Bytes, Value::Bytes(bytes)) => match field.byte_length {
            Some(n) => {
                if bytes.len() != n {
                    return Err(ChainParamsError::FixedLengthMismatch {
                        field: field.name.clone(),
                        expected: n,
                        actual: bytes.len(),
                    });
                }
                writer.write_bytes(bytes);
            }
            None => writer.write_var_bytes(bytes),
        },
        (Encoding::Inputs, Value::Inputs(inputs)) => {
            writer.write_varint(inputs.len() as u64);
            for input in inputs {
                write_input(writer, input);
            }
        }
        (Encoding::Outputs, Value::Outputs(outputs)) => {
            writer.write_varint(outputs.len() as u64);
            for output in outputs {
                write_output(writer, output);
            }
        }
        (Encoding::Transactions, Value::Transactions(txs)) => {
            writer.write_varint(txs.len() as u64);
            for tx in txs {
                serialize_fields(tx.entity(), writer)?;
            }
        }
        _ => {
            return Err(ChainParamsError::FieldTypeMismatch {
                field: field.name.clone(),
                expected: field.encoding.describe(),
            })
        }
    }
    Ok(())
}

/// Deserialize an entity of `kind` laid out by `schema`.
///
/// Nested transactions (block bodies) are read with `nested_tx_schema`.
/// On any error nothing is returned.
pub fn deserialize_fields(
    kind: SchemaKind,
    schema: &Arc<Schema>,
    reader: &mut ByteReader<'_>,
    nested_tx_schema: &Arc<Schema>,
) -> Result<Entity> {
    let mut entity = Entity::new(kind, Arc::clone(schema));
    for field in schema.fields() {
        let value = read_field(reader, field, nested_tx_schema)?;
        entity.set(&field.name, value)?;
    }
    Ok(entity)
}

/// Serialize an entity in its own captured schema order
pub fn serialize_fields(entity: &Entity, writer: &mut ByteWriter) -> Result<()> {
    for field in entity.schema().fields() {
        let value = entity
            .get(&field.name)
            .ok_or_else(|| ChainParamsError::UnknownField(field.name.clone()))?;
        write_field(writer, field, value)?;
    }
    Ok(())
}

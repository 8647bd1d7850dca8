//! Field schemas describing how entities are laid out on the wire
//!
//! A schema is an ordered list of [`FieldSpec`]s. The order is the wire
//! order, and field names are unique within one schema.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ChainParamsError, Result};
use crate::types::Value;

/// Which structure a schema describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SchemaKind {
    Transaction,
    BlockHeader,
    BlockBody,
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaKind::Transaction => write!(f, "transaction"),
            SchemaKind::BlockHeader => write!(f, "block header"),
            SchemaKind::BlockBody => write!(f, "block body"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endianness {
    Little,
    Big,
}

/// Wire encoding of a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    /// Integer of exactly `width` bytes
    FixedInt { endianness: Endianness, signed: bool, width: u8 },
    /// Byte blob: fixed length if the field has a `byte_length`, otherwise varint-prefixed
    Bytes,
    /// Varint count followed by transaction inputs
    Inputs,
    /// Varint count followed by transaction outputs
    Outputs,
    /// Varint count followed by transactions (block bodies)
    Transactions,
}

impl Encoding {
    /// Parse a struct-style format string (`<i`, `>H`, `bytes`, `inputs`, ...)
    pub fn parse(format: &str) -> Result<Self> {
        match format {
            "bytes" => return Ok(Encoding::Bytes),
            "inputs" => return Ok(Encoding::Inputs),
            "outputs" => return Ok(Encoding::Outputs),
            "vectortx" | "transactions" => return Ok(Encoding::Transactions),
            _ => {}
        }

        let (endianness, code) = match format.as_bytes() {
            [b'<', code] | [b'=', code] | [code] => (Endianness::Little, *code),
            [b'>', code] | [b'!', code] => (Endianness::Big, *code),
            _ => {
                return Err(ChainParamsError::UnsupportedEncoding(format!(
                    "format '{}'",
                    format
                )))
            }
        };

        let width = match code.to_ascii_lowercase() {
            b'b' => 1,
            b'h' => 2,
            b'i' | b'l' => 4,
            b'q' => 8,
            _ => {
                return Err(ChainParamsError::UnsupportedEncoding(format!(
                    "format '{}'",
                    format
                )))
            }
        };

        Ok(Encoding::FixedInt {
            endianness,
            signed: code.is_ascii_lowercase(),
            width,
        })
    }

    /// Value used when a field declares no default of its own
    pub fn empty_value(&self, byte_length: Option<usize>) -> Value {
        match self {
            Encoding::FixedInt { .. } => Value::Int(0),
            Encoding::Bytes => Value::Bytes(vec![0u8; byte_length.unwrap_or(0)]),
            Encoding::Inputs => Value::Inputs(Vec::new()),
            Encoding::Outputs => Value::Outputs(Vec::new()),
            Encoding::Transactions => Value::Transactions(Vec::new()),
        }
    }

    /// Whether `value` is the variant this encoding reads and writes
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Encoding::FixedInt { .. }, Value::Int(_))
                | (Encoding::Bytes, Value::Bytes(_))
                | (Encoding::Inputs, Value::Inputs(_))
                | (Encoding::Outputs, Value::Outputs(_))
                | (Encoding::Transactions, Value::Transactions(_))
        )
    }

    pub fn describe(&self) -> String {
        match self {
            Encoding::FixedInt { endianness, signed, width } => format!(
                "{}-byte {} {} integer",
                width,
                if *signed { "signed" } else { "unsigned" },
                match endianness {
                    Endianness::Little => "little-endian",
                    Endianness::Big => "big-endian",
                }
            ),
            Encoding::Bytes => "bytes".to_string(),
            Encoding::Inputs => "inputs".to_string(),
            Encoding::Outputs => "outputs".to_string(),
            Encoding::Transactions => "transactions".to_string(),
        }
    }
}

/// One field of a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub encoding: Encoding,
    pub byte_length: Option<usize>,
    pub default: Value,
}

impl FieldSpec {
    /// Create a field, checking that `default` fits `encoding`
    pub fn new(
        name: impl Into<String>,
        encoding: Encoding,
        byte_length: Option<usize>,
        default: Option<Value>,
    ) -> Result<Self> {
        let name = name.into();
        let default = default.unwrap_or_else(|| encoding.empty_value(byte_length));
        if !encoding.accepts(&default) {
            return Err(ChainParamsError::FieldTypeMismatch {
                field: name,
                expected: encoding.describe(),
            });
        }
        if let (Value::Bytes(bytes), Some(expected)) = (&default, byte_length) {
            if bytes.len() != expected {
                return Err(ChainParamsError::FixedLengthMismatch {
                    field: name,
                    expected,
                    actual: bytes.len(),
                });
            }
        }
        Ok(FieldSpec { name, encoding, byte_length, default })
    }

    /// Create a field from a struct-style format string
    pub fn from_format(
        name: impl Into<String>,
        format: &str,
        num_bytes: Option<usize>,
        default: Option<Value>,
    ) -> Result<Self> {
        let encoding = Encoding::parse(format)?;
        if let (Encoding::FixedInt { width, .. }, Some(n)) = (encoding, num_bytes) {
            if n != width as usize {
                return Err(ChainParamsError::UnsupportedEncoding(format!(
                    "format '{}' reads {} bytes, field declares {}",
                    format, width, n
                )));
            }
        }
        let byte_length = match encoding {
            Encoding::Bytes => num_bytes,
            _ => None,
        };
        Self::new(name, encoding, byte_length, default)
    }

    pub(crate) fn int(name: &str, signed: bool, width: u8, default: i64) -> Self {
        FieldSpec {
            name: name.to_string(),
            encoding: Encoding::FixedInt { endianness: Endianness::Little, signed, width },
            byte_length: None,
            default: Value::Int(default),
        }
    }

    pub(crate) fn hash(name: &str) -> Self {
        FieldSpec {
            name: name.to_string(),
            encoding: Encoding::Bytes,
            byte_length: Some(32),
            default: Value::Bytes(vec![0u8; 32]),
        }
    }

    pub(crate) fn of(name: &str, encoding: Encoding) -> Self {
        FieldSpec {
            name: name.to_string(),
            encoding,
            byte_length: None,
            default: encoding.empty_value(None),
        }
    }

    /// Minimum number of bytes this field occupies on the wire
    pub fn min_length(&self) -> usize {
        match (self.encoding, self.byte_length) {
            (Encoding::FixedInt { width, .. }, _) => width as usize,
            (Encoding::Bytes, Some(n)) => n,
            // varint prefix of zero
            _ => 1,
        }
    }
}

/// Ordered field layout of one structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    /// Build a schema, rejecting duplicate field names
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(ChainParamsError::InvalidSchema(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
        }
        Ok(Schema { fields })
    }

    pub(crate) fn unchecked(fields: Vec<FieldSpec>) -> Self {
        Schema { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// First field with the given encoding
    pub fn field_with(&self, encoding: Encoding) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.encoding == encoding)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Smallest possible serialized size under this schema
    pub fn min_length(&self) -> usize {
        self.fields.iter().map(FieldSpec::min_length).sum()
    }
}

/// Bitcoin transaction layout
pub fn bitcoin_tx_schema() -> Schema {
    Schema::unchecked(vec![
        FieldSpec::int("nVersion", true, 4, 1),
        FieldSpec::of("vin", Encoding::Inputs),
        FieldSpec::of("vout", Encoding::Outputs),
        FieldSpec::int("nLockTime", false, 4, 0),
    ])
}

/// 80-byte Bitcoin block header layout
pub fn bitcoin_header_schema() -> Schema {
    Schema::unchecked(vec![
        FieldSpec::int("nVersion", true, 4, 1),
        FieldSpec::hash("hashPrevBlock"),
        FieldSpec::hash("hashMerkleRoot"),
        FieldSpec::int("nTime", false, 4, 0),
        FieldSpec::int("nBits", false, 4, 0),
        FieldSpec::int("nNonce", false, 4, 0),
    ])
}

/// Bitcoin block layout, excluding the header
pub fn bitcoin_block_schema() -> Schema {
    Schema::unchecked(vec![FieldSpec::of("vtx", Encoding::Transactions)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_struct_formats() {
        assert_eq!(
            Encoding::parse("<i").unwrap(),
            Encoding::FixedInt { endianness: Endianness::Little, signed: true, width: 4 }
        );
        assert_eq!(
            Encoding::parse(">H").unwrap(),
            Encoding::FixedInt { endianness: Endianness::Big, signed: false, width: 2 }
        );
        assert_eq!(
            Encoding::parse("<Q").unwrap(),
            Encoding::FixedInt { endianness: Endianness::Little, signed: false, width: 8 }
        );
        assert_eq!(Encoding::parse("vectortx").unwrap(), Encoding::Transactions);
    }

    #[test]
    fn test_parse_unknown_format() {
        assert!(matches!(
            Encoding::parse("<f"),
            Err(ChainParamsError::UnsupportedEncoding(_))
        ));
        assert!(matches!(
            Encoding::parse("varstr"),
            Err(ChainParamsError::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn test_format_width_mismatch() {
        let result = FieldSpec::from_format("nTime", "<I", Some(8), None);
        assert!(matches!(result, Err(ChainParamsError::UnsupportedEncoding(_))));
    }

    #[test]
    fn test_default_must_fit_encoding() {
        let result = FieldSpec::from_format("nTime", "<I", Some(4), Some(Value::Bytes(vec![])));
        assert!(matches!(result, Err(ChainParamsError::FieldTypeMismatch { .. })));
    }

    #[test]
    fn test_duplicate_field_names_rejected() {
        let fields = vec![FieldSpec::int("nVersion", true, 4, 1), FieldSpec::int("nVersion", true, 4, 2)];
        assert!(matches!(Schema::new(fields), Err(ChainParamsError::InvalidSchema(_))));
    }

    #[test]
    fn test_bitcoin_min_lengths() {
        assert_eq!(bitcoin_tx_schema().min_length(), 10);
        assert_eq!(bitcoin_header_schema().min_length(), 80);
    }

    #[test]
    fn test_bytes_default_must_match_fixed_length() {
        let result = FieldSpec::from_format("hashX", "bytes", Some(32), Some(Value::Bytes(vec![1, 2])));
        assert!(matches!(
            result,
            Err(ChainParamsError::FixedLengthMismatch { expected: 32, actual: 2, .. })
        ));
        let exact = FieldSpec::from_format("hashX", "bytes", Some(2), Some(Value::Bytes(vec![1, 2])));
        assert!(exact.is_ok());
    }

    #[test]
    fn test_bytes_default_uses_fixed_length() {
        let field = FieldSpec::from_format("hashPrevBlock", "bytes", Some(32), None).unwrap();
        assert_eq!(field.default, Value::Bytes(vec![0u8; 32]));
    }
}

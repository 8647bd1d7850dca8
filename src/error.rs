//! Error types for the codec, registry and script evaluator

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainParamsError {
    #[error("Unknown chainparams preset: {0}")]
    UnknownPreset(String),

    #[error("Truncated input: needed {needed} bytes, {remaining} remaining")]
    TruncatedInput { needed: usize, remaining: usize },

    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Integer overflow: {value} does not fit field {field} ({width} bytes)")]
    IntegerOverflow { field: String, value: i128, width: u8 },

    #[error("Unknown opcode: 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("Stack underflow: {opcode} needs {needed} items, stack has {available}")]
    StackUnderflow { opcode: String, needed: usize, available: usize },

    #[error("Script execution failed: {0}")]
    ScriptExecution(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Field {field} expects {expected}")]
    FieldTypeMismatch { field: String, expected: String },

    #[error("Field {field} is fixed at {expected} bytes, value has {actual}")]
    FixedLengthMismatch { field: String, expected: usize, actual: usize },

    #[error("Trailing data: {0} bytes left after decoding")]
    TrailingData(usize),

    #[error("Script parse error: {0}")]
    ScriptParse(String),

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Unknown opcode handler: {0}")]
    UnknownHandler(String),

    #[error("Invalid preset definition: {0}")]
    PresetDefinition(String),

    #[error("Template error: {0}")]
    Template(String),
}

impl From<hex::FromHexError> for ChainParamsError {
    fn from(err: hex::FromHexError) -> Self {
        ChainParamsError::InvalidHex(err.to_string())
    }
}

impl From<serde_json::Error> for ChainParamsError {
    fn from(err: serde_json::Error) -> Self {
        ChainParamsError::PresetDefinition(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChainParamsError>;

//! Core types shared by the codec, entities and script evaluator

use serde::{Deserialize, Serialize};

use crate::transaction::Transaction;

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// Previous output reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

impl OutPoint {
    /// The null outpoint referenced by coinbase inputs
    pub fn null() -> Self {
        OutPoint { hash: [0u8; 32], index: 0xffffffff }
    }

    pub fn is_null(&self) -> bool {
        self.hash == [0u8; 32] && self.index == 0xffffffff
    }
}

/// Transaction input. Fixed shape on every chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prevout: OutPoint,
    pub script_sig: ByteString,
    pub sequence: u32,
}

/// Transaction output. Fixed shape on every chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: i64,
    pub script_pubkey: ByteString,
}

/// A schema field's value.
///
/// Which variant a field holds is decided by its [`crate::schema::Encoding`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bytes(ByteString),
    Inputs(Vec<TransactionInput>),
    Outputs(Vec<TransactionOutput>),
    Transactions(Vec<Transaction>),
}

impl Value {
    /// Variant name used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Bytes(_) => "bytes",
            Value::Inputs(_) => "inputs",
            Value::Outputs(_) => "outputs",
            Value::Transactions(_) => "transactions",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_inputs(&self) -> Option<&[TransactionInput]> {
        match self {
            Value::Inputs(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_outputs(&self) -> Option<&[TransactionOutput]> {
        match self {
            Value::Outputs(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_transactions(&self) -> Option<&[Transaction]> {
        match self {
            Value::Transactions(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<ByteString> for Value {
    fn from(v: ByteString) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<TransactionInput>> for Value {
    fn from(v: Vec<TransactionInput>) -> Self {
        Value::Inputs(v)
    }
}

impl From<Vec<TransactionOutput>> for Value {
    fn from(v: Vec<TransactionOutput>) -> Self {
        Value::Outputs(v)
    }
}

impl From<Vec<Transaction>> for Value {
    fn from(v: Vec<Transaction>) -> Self {
        Value::Transactions(v)
    }
}

//! Schema-driven transactions and legacy signature hashing

use std::sync::Arc;

use bitcoin_hashes::{sha256d, Hash as BitcoinHash};

use crate::codec::{deserialize_fields, serialize_fields, ByteReader, ByteWriter};
use crate::constants::*;
use crate::entity::{migrate, Entity};
use crate::error::{ChainParamsError, Result};
use crate::opcodes::OP_CODESEPARATOR;
use crate::schema::{Encoding, Schema, SchemaKind};
use crate::script::Script;
use crate::types::*;

/// Cryptocurrency transaction whose layout is given by a captured schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    entity: Entity,
}

impl Transaction {
    /// Transaction with every field at its schema default
    pub fn new(schema: Arc<Schema>) -> Self {
        Transaction { entity: Entity::new(SchemaKind::Transaction, schema) }
    }

    /// Transaction with the given field values, defaults for the rest
    pub fn with_values<I, K>(schema: Arc<Schema>, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        Ok(Transaction {
            entity: Entity::with_values(SchemaKind::Transaction, schema, values)?,
        })
    }

    pub(crate) fn from_entity(entity: Entity) -> Self {
        Transaction { entity }
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.entity.schema()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entity.get(name)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.entity.get_int(name)
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.entity.set(name, value.into())
    }

    fn field_name(&self, encoding: Encoding) -> Option<String> {
        self.schema().field_with(encoding).map(|f| f.name.clone())
    }

    pub fn inputs(&self) -> &[TransactionInput] {
        self.field_name(Encoding::Inputs)
            .and_then(|name| self.entity.get(&name))
            .and_then(Value::as_inputs)
            .unwrap_or(&[])
    }

    pub fn outputs(&self) -> &[TransactionOutput] {
        self.field_name(Encoding::Outputs)
            .and_then(|name| self.entity.get(&name))
            .and_then(Value::as_outputs)
            .unwrap_or(&[])
    }

    pub fn set_inputs(&mut self, inputs: Vec<TransactionInput>) -> Result<()> {
        let name = self
            .field_name(Encoding::Inputs)
            .ok_or_else(|| ChainParamsError::UnknownField("inputs".to_string()))?;
        self.entity.set(&name, Value::Inputs(inputs))
    }

    pub fn set_outputs(&mut self, outputs: Vec<TransactionOutput>) -> Result<()> {
        let name = self
            .field_name(Encoding::Outputs)
            .ok_or_else(|| ChainParamsError::UnknownField("outputs".to_string()))?;
        self.entity.set(&name, Value::Outputs(outputs))
    }

    pub fn version(&self) -> Option<i64> {
        self.get_int("nVersion")
    }

    pub fn lock_time(&self) -> Option<i64> {
        self.get_int("nLockTime")
    }

    /// Rebind to another schema, keeping values of fields shared by name
    pub fn with_schema(&self, schema: Arc<Schema>) -> Self {
        Transaction { entity: self.entity.with_schema(schema) }
    }

    /// Consuming form of [`Transaction::with_schema`]
    pub fn migrate(self, schema: Arc<Schema>) -> Self {
        Transaction { entity: migrate(self.entity, schema) }
    }

    /// Read one transaction from `reader` using `schema`
    pub fn deserialize_from(reader: &mut ByteReader<'_>, schema: &Arc<Schema>) -> Result<Self> {
        let entity = deserialize_fields(SchemaKind::Transaction, schema, reader, schema)?;
        Ok(Transaction { entity })
    }

    /// Decode a complete buffer; leftover bytes are an error
    pub fn from_bytes(bytes: &[u8], schema: &Arc<Schema>) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let tx = Self::deserialize_from(&mut reader, schema)?;
        if !reader.is_empty() {
            return Err(ChainParamsError::TrailingData(reader.remaining()));
        }
        Ok(tx)
    }

    pub fn from_hex(hex_str: &str, schema: &Arc<Schema>) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim())?;
        Self::from_bytes(&bytes, schema)
    }

    pub fn serialize_into(&self, writer: &mut ByteWriter) -> Result<()> {
        serialize_fields(&self.entity, writer)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::new();
        self.serialize_into(&mut writer)?;
        Ok(writer.into_bytes())
    }

    pub fn to_hex(&self) -> Result<String> {
        Ok(hex::encode(self.to_bytes()?))
    }

    /// Double SHA-256 of the serialized transaction, in internal byte order
    pub fn txid(&self) -> Result<Hash> {
        Ok(sha256d::Hash::hash(&self.to_bytes()?).into_inner())
    }

    /// Transaction id as conventionally displayed (byte-reversed hex)
    pub fn txid_hex(&self) -> Result<String> {
        let mut id = self.txid()?;
        id.reverse();
        Ok(hex::encode(id))
    }

    pub fn is_coinbase(&self) -> bool {
        let inputs = self.inputs();
        inputs.len() == 1 && inputs[0].prevout.is_null()
    }
}

/// Legacy (pre-segwit) signature hash of `tx` for `input_index`.
///
/// The modified copy is serialized with the transaction's own schema, so
/// chain-specific fields are part of the signed data.
pub fn signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    hash_type: u32,
) -> Result<Hash> {
    // The historical SIGHASH_SINGLE bug: signing an input with no matching output
    let mut one = [0u8; 32];
    one[0] = 1;

    let inputs = tx.inputs();
    if input_index >= inputs.len() {
        return Err(ChainParamsError::ScriptExecution(format!(
            "input index {} out of range for {} inputs",
            input_index,
            inputs.len()
        )));
    }

    let base_type = hash_type & 0x1f;
    if base_type == SIGHASH_SINGLE && input_index >= tx.outputs().len() {
        return Ok(one);
    }

    let script_code = Script::from_bytes(script_code).without_opcode(OP_CODESEPARATOR)?;

    let mut new_inputs: Vec<TransactionInput> = inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let mut input = input.clone();
            if i == input_index {
                input.script_sig = script_code.to_bytes().to_vec();
            } else {
                input.script_sig.clear();
                if base_type == SIGHASH_NONE || base_type == SIGHASH_SINGLE {
                    input.sequence = 0;
                }
            }
            input
        })
        .collect();

    let mut new_outputs = tx.outputs().to_vec();
    if base_type == SIGHASH_NONE {
        new_outputs.clear();
    } else if base_type == SIGHASH_SINGLE {
        new_outputs.truncate(input_index + 1);
        for output in new_outputs.iter_mut().take(input_index) {
            output.value = -1;
            output.script_pubkey.clear();
        }
    }

    if hash_type & SIGHASH_ANYONECANPAY != 0 {
        new_inputs = vec![new_inputs.swap_remove(input_index)];
    }

    let mut copy = tx.clone();
    copy.set_inputs(new_inputs)?;
    copy.set_outputs(new_outputs)?;

    let mut writer = ByteWriter::new();
    copy.serialize_into(&mut writer)?;
    writer.write_u32_le(hash_type);
    Ok(sha256d::Hash::hash(&writer.into_bytes()).into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::bitcoin_tx_schema;

    fn bitcoin() -> Arc<Schema> {
        Arc::new(bitcoin_tx_schema())
    }

    fn sample_tx() -> Transaction {
        let mut tx = Transaction::new(bitcoin());
        tx.set_inputs(vec![
            TransactionInput {
                prevout: OutPoint { hash: [1u8; 32], index: 0 },
                script_sig: vec![0x51],
                sequence: SEQUENCE_FINAL,
            },
            TransactionInput {
                prevout: OutPoint { hash: [2u8; 32], index: 1 },
                script_sig: vec![0x52],
                sequence: SEQUENCE_FINAL,
            },
        ])
        .unwrap();
        tx.set_outputs(vec![TransactionOutput { value: 5000, script_pubkey: vec![0x51] }])
            .unwrap();
        tx
    }

    #[test]
    fn test_empty_bitcoin_transaction_bytes() {
        let tx = Transaction::new(bitcoin());
        assert_eq!(tx.to_hex().unwrap(), "01000000000000000000");
    }

    #[test]
    fn test_from_hex_rejects_trailing_data() {
        let result = Transaction::from_hex("0100000000000000000000", &bitcoin());
        assert_eq!(result, Err(ChainParamsError::TrailingData(1)));
    }

    #[test]
    fn test_from_hex_rejects_bad_hex() {
        assert!(matches!(
            Transaction::from_hex("0g", &bitcoin()),
            Err(ChainParamsError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_is_coinbase() {
        let mut tx = Transaction::new(bitcoin());
        tx.set_inputs(vec![TransactionInput {
            prevout: OutPoint::null(),
            script_sig: vec![],
            sequence: SEQUENCE_FINAL,
        }])
        .unwrap();
        assert!(tx.is_coinbase());
        assert!(!sample_tx().is_coinbase());
    }

    #[test]
    fn test_txid_display_is_reversed() {
        let tx = sample_tx();
        let mut internal = tx.txid().unwrap();
        internal.reverse();
        assert_eq!(tx.txid_hex().unwrap(), hex::encode(internal));
    }

    #[test]
    fn test_signature_hash_depends_on_type() {
        let tx = sample_tx();
        let all = signature_hash(&tx, 0, &[0x51], SIGHASH_ALL).unwrap();
        let none = signature_hash(&tx, 0, &[0x51], SIGHASH_NONE).unwrap();
        let acp = signature_hash(&tx, 0, &[0x51], SIGHASH_ALL | SIGHASH_ANYONECANPAY).unwrap();
        assert_ne!(all, none);
        assert_ne!(all, acp);
    }

    #[test]
    fn test_signature_hash_single_without_output() {
        let tx = sample_tx();
        let hash = signature_hash(&tx, 1, &[0x51], SIGHASH_SINGLE).unwrap();
        let mut one = [0u8; 32];
        one[0] = 1;
        assert_eq!(hash, one);
    }

    #[test]
    fn test_signature_hash_index_out_of_range() {
        let tx = sample_tx();
        assert!(signature_hash(&tx, 5, &[], SIGHASH_ALL).is_err());
    }

    #[test]
    fn test_signature_hash_ignores_other_input_scripts() {
        let tx = sample_tx();
        let mut altered = tx.clone();
        let mut inputs = altered.inputs().to_vec();
        inputs[1].script_sig = vec![0x00, 0x00];
        altered.set_inputs(inputs).unwrap();
        assert_eq!(
            signature_hash(&tx, 0, &[0x51], SIGHASH_ALL).unwrap(),
            signature_hash(&altered, 0, &[0x51], SIGHASH_ALL).unwrap()
        );
    }
}

//! Schema-driven block headers and blocks

use std::sync::Arc;

use bitcoin_hashes::{sha256d, Hash as BitcoinHash};

use crate::chainparams::ActiveParams;
use crate::codec::{deserialize_fields, serialize_fields, ByteReader, ByteWriter};
use crate::entity::Entity;
use crate::error::{ChainParamsError, Result};
use crate::schema::{Encoding, Schema, SchemaKind};
use crate::transaction::Transaction;
use crate::types::*;

/// Block header whose layout is given by a captured schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    entity: Entity,
}

impl BlockHeader {
    pub fn new(schema: Arc<Schema>) -> Self {
        BlockHeader { entity: Entity::new(SchemaKind::BlockHeader, schema) }
    }

    pub fn with_values<I, K>(schema: Arc<Schema>, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        Ok(BlockHeader {
            entity: Entity::with_values(SchemaKind::BlockHeader, schema, values)?,
        })
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

    pub fn with_schema(&self, schema: Arc<Schema>) -> Self {
        BlockHeader { entity: self.entity.with_schema(schema) }
    }

    pub fn deserialize_from(reader: &mut ByteReader<'_>, schema: &Arc<Schema>) -> Result<Self> {
        // headers never nest transactions; the schema doubles as the nested one
        let entity = deserialize_fields(SchemaKind::BlockHeader, schema, reader, schema)?;
        Ok(BlockHeader { entity })
    }

    pub fn from_bytes(bytes: &[u8], schema: &Arc<Schema>) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let header = Self::deserialize_from(&mut reader, schema)?;
        if !reader.is_empty() {
            return Err(ChainParamsError::TrailingData(reader.remaining()));
        }
        Ok(header)
    }

    pub fn from_hex(hex_str: &str, schema: &Arc<Schema>) -> Result<Self> {
        Self::from_bytes(&hex::decode(hex_str.trim())?, schema)
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

    /// Double SHA-256 of the serialized header, in internal byte order
    pub fn hash(&self) -> Result<Hash> {
        Ok(sha256d::Hash::hash(&self.to_bytes()?).into_inner())
    }

    pub fn hash_hex(&self) -> Result<String> {
        let mut hash = self.hash()?;
        hash.reverse();
        Ok(hex::encode(hash))
    }
}

/// Block: header followed by a schema-driven body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    header: BlockHeader,
    body: Entity,
}

impl Block {
    /// Empty block laid out by the given snapshot's header and body schemas
    pub fn new(params: &ActiveParams) -> Self {
        Block {
            header: BlockHeader::new(params.header_schema()),
            body: Entity::new(SchemaKind::BlockBody, params.body_schema()),
        }
    }

    pub fn from_parts(header: BlockHeader, body_schema: Arc<Schema>) -> Self {
        Block { header, body: Entity::new(SchemaKind::BlockBody, body_schema) }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut BlockHeader {
        &mut self.header
    }

    pub fn body(&self) -> &Entity {
        &self.body
    }

    pub fn body_schema(&self) -> &Arc<Schema> {
        self.body.schema()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.body.set(name, value.into())
    }

    fn transactions_field(&self) -> Option<String> {
        self.body_schema()
            .field_with(Encoding::Transactions)
            .map(|f| f.name.clone())
    }

    pub fn transactions(&self) -> &[Transaction] {
        self.transactions_field()
            .and_then(|name| self.body.get(&name))
            .and_then(Value::as_transactions)
            .unwrap_or(&[])
    }

    pub fn set_transactions(&mut self, txs: Vec<Transaction>) -> Result<()> {
        let name = self
            .transactions_field()
            .ok_or_else(|| ChainParamsError::UnknownField("transactions".to_string()))?;
        self.body.set(&name, Value::Transactions(txs))
    }

    /// Rebind header, body and nested transactions to the snapshot's schemas
    pub fn with_params(&self, params: &ActiveParams) -> Self {
        let mut body = self.body.with_schema(params.body_schema());
        body.rebind_transactions(&params.tx_schema());
        Block { header: self.header.with_schema(params.header_schema()), body }
    }

    /// Read a block: header fields, then body fields, nested transactions
    /// with the snapshot's transaction schema
    pub fn deserialize_from(reader: &mut ByteReader<'_>, params: &ActiveParams) -> Result<Self> {
        let header = BlockHeader::deserialize_from(reader, &params.header_schema())?;
        let body = deserialize_fields(
            SchemaKind::BlockBody,
            &params.body_schema(),
            reader,
            &params.tx_schema(),
        )?;
        Ok(Block { header, body })
    }

    pub fn from_bytes(bytes: &[u8], params: &ActiveParams) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let block = Self::deserialize_from(&mut reader, params)?;
        if !reader.is_empty() {
            return Err(ChainParamsError::TrailingData(reader.remaining()));
        }
        Ok(block)
    }

    pub fn from_hex(hex_str: &str, params: &ActiveParams) -> Result<Self> {
        Self::from_bytes(&hex::decode(hex_str.trim())?, params)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::new();
        self.header.serialize_into(&mut writer)?;
        serialize_fields(&self.body, &mut writer)?;
        Ok(writer.into_bytes())
    }

    pub fn to_hex(&self) -> Result<String> {
        Ok(hex::encode(self.to_bytes()?))
    }

    pub fn hash(&self) -> Result<Hash> {
        self.header.hash()
    }
}

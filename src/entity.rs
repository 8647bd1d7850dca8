//! Schema-bound field maps
//!
//! An [`Entity`] is the shared representation behind transactions, block
//! headers and block bodies: the schema it was built with plus one value
//! per field name. The field set is fixed by the captured schema; values
//! can change.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ChainParamsError, Result};
use crate::schema::{Schema, SchemaKind};
use crate::types::Value;

#[derive(Debug, Clone)]
pub struct Entity {
    kind: SchemaKind,
    schema: Arc<Schema>,
    values: BTreeMap<String, Value>,
}

impl Entity {
    /// New entity with every field set to its schema default
    pub fn new(kind: SchemaKind, schema: Arc<Schema>) -> Self {
        let values = schema
            .fields()
            .iter()
            .map(|f| (f.name.clone(), f.default.clone()))
            .collect();
        Entity { kind, schema, values }
    }

    /// New entity with the given values, defaults for the rest
    pub fn with_values<I, K>(kind: SchemaKind, schema: Arc<Schema>, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut entity = Self::new(kind, schema);
        for (name, value) in values {
            entity.set(name.as_ref(), value)?;
        }
        Ok(entity)
    }

    pub fn kind(&self) -> SchemaKind {
        self.kind
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Value of a field in this entity's schema
    pub fn get(&self, name: &str) -> Option<&Value> {
        if !self.schema.contains(name) {
            return None;
        }
        self.values.get(name)
    }

    /// Replace a field's value; fails for names outside the schema or wrong variants
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let field = self
            .schema
            .field(name)
            .ok_or_else(|| ChainParamsError::UnknownField(name.to_string()))?;
        if !field.encoding.accepts(&value) {
            return Err(ChainParamsError::FieldTypeMismatch {
                field: name.to_string(),
                expected: field.encoding.describe(),
            });
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    pub fn get_bytes(&self, name: &str) -> Option<&[u8]> {
        self.get(name).and_then(Value::as_bytes)
    }

    /// Field names and values in wire order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .fields()
            .iter()
            .filter_map(move |f| self.values.get(&f.name).map(|v| (f.name.as_str(), v)))
    }

    /// Rebind to another schema. See [`migrate`].
    pub fn with_schema(&self, schema: Arc<Schema>) -> Self {
        migrate(self.clone(), schema)
    }

    /// Rebind nested transactions to `tx_schema`, keeping their values
    pub(crate) fn rebind_transactions(&mut self, tx_schema: &Arc<Schema>) {
        for value in self.values.values_mut() {
            if let Value::Transactions(txs) = value {
                for tx in txs.iter_mut() {
                    *tx = tx.with_schema(Arc::clone(tx_schema));
                }
            }
        }
    }

    /// Value used for content comparison: own value, else a schema default
    fn effective<'a>(&'a self, name: &str, other: &'a Schema) -> Option<&'a Value> {
        self.get(name)
            .or_else(|| self.schema.field(name).map(|f| &f.default))
            .or_else(|| other.field(name).map(|f| &f.default))
    }
}

/// Rebind `entity` to `schema`.
///
/// Fields shared by name keep their values, fields new to `schema` take
/// its declared defaults. Values for fields `schema` lacks stay dormant in
/// the map: they are neither serialized nor compared, but come back if the
/// entity is migrated to a schema that has them again.
pub fn migrate(entity: Entity, schema: Arc<Schema>) -> Entity {
    let Entity { kind, mut values, .. } = entity;
    for field in schema.fields() {
        let keep = values
            .get(&field.name)
            .map(|v| field.encoding.accepts(v))
            .unwrap_or(false);
        if !keep {
            values.insert(field.name.clone(), field.default.clone());
        }
    }
    Entity { kind, schema, values }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        if self.kind != other.kind {
            return false;
        }
        let names = self.schema.names().chain(other.schema.names());
        for name in names {
            if self.effective(name, &other.schema) != other.effective(name, &self.schema) {
                return false;
            }
        }
        true
    }
}

impl Eq for Entity {}

//! Chain parameters: presets and the schema registry
//!
//! A [`SchemaContext`] holds the active transaction, block header and block
//! body schemas plus the active opcode table. Entities and evaluators never
//! read it directly; they take an [`ActiveParams`] snapshot, so switching
//! presets afterwards leaves them untouched.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use anyhow::Context;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ChainParamsError, Result};
use crate::opcode_table::{clams_checklocktimeverify, named_handler, OpcodeEntry, OpcodeTable};
use crate::opcodes::OP_NOP1;
use crate::schema::*;
use crate::types::Value;

pub const BITCOIN: &str = "Bitcoin";
pub const CLAMS: &str = "Clams";
pub const FREICOIN: &str = "Freicoin";
pub const PEERCOIN: &str = "Peercoin";

/// Named bundle of schemas and opcode overrides for one chain
#[derive(Debug, Clone)]
pub struct Preset {
    pub name: String,
    pub tx_schema: Arc<Schema>,
    pub block_header_schema: Arc<Schema>,
    pub block_body_schema: Arc<Schema>,
    pub opcode_overrides: Vec<OpcodeEntry>,
}

impl Preset {
    /// Preset with the given transaction layout and Bitcoin's block layout
    pub fn new(name: impl Into<String>, tx_schema: Schema) -> Self {
        Preset {
            name: name.into(),
            tx_schema: Arc::new(tx_schema),
            block_header_schema: Arc::new(bitcoin_header_schema()),
            block_body_schema: Arc::new(bitcoin_block_schema()),
            opcode_overrides: Vec::new(),
        }
    }

    pub fn with_header_schema(mut self, schema: Schema) -> Self {
        self.block_header_schema = Arc::new(schema);
        self
    }

    pub fn with_body_schema(mut self, schema: Schema) -> Self {
        self.block_body_schema = Arc::new(schema);
        self
    }

    pub fn with_override(mut self, entry: OpcodeEntry) -> Self {
        self.opcode_overrides.push(entry);
        self
    }

    pub fn schema(&self, kind: SchemaKind) -> &Arc<Schema> {
        match kind {
            SchemaKind::Transaction => &self.tx_schema,
            SchemaKind::BlockHeader => &self.block_header_schema,
            SchemaKind::BlockBody => &self.block_body_schema,
        }
    }
}

pub fn bitcoin() -> Preset {
    Preset::new(BITCOIN, bitcoin_tx_schema())
}

/// Clams: timestamped transactions carrying "speech" bytes, signed blocks,
/// and `OP_NOP1` repurposed as a lock time check
pub fn clams() -> Preset {
    let tx = Schema::unchecked(vec![
        FieldSpec::int("nVersion", true, 4, 1),
        FieldSpec::int("Timestamp", true, 4, 0),
        FieldSpec::of("vin", Encoding::Inputs),
        FieldSpec::of("vout", Encoding::Outputs),
        FieldSpec::int("nLockTime", false, 4, 0),
        FieldSpec::of("ClamSpeech", Encoding::Bytes),
    ]);
    let body = Schema::unchecked(vec![
        FieldSpec::of("vtx", Encoding::Transactions),
        FieldSpec::of("blockSig", Encoding::Bytes),
    ]);
    Preset::new(CLAMS, tx)
        .with_body_schema(body)
        .with_override(OpcodeEntry::new(
            OP_NOP1,
            "OP_CHECKLOCKTIMEVERIFY",
            clams_checklocktimeverify,
        ))
}

/// Freicoin: Bitcoin transactions followed by a reference height
pub fn freicoin() -> Preset {
    let mut fields = bitcoin_tx_schema().fields().to_vec();
    fields.push(FieldSpec::int("RefHeight", true, 4, 0));
    Preset::new(FREICOIN, Schema::unchecked(fields))
}

/// Peercoin: timestamped transactions
pub fn peercoin() -> Preset {
    let tx = Schema::unchecked(vec![
        FieldSpec::int("nVersion", true, 4, 1),
        FieldSpec::int("Timestamp", true, 4, 0),
        FieldSpec::of("vin", Encoding::Inputs),
        FieldSpec::of("vout", Encoding::Outputs),
        FieldSpec::int("nLockTime", false, 4, 0),
    ]);
    Preset::new(PEERCOIN, tx)
}

pub fn builtin_presets() -> Vec<Preset> {
    vec![bitcoin(), clams(), freicoin(), peercoin()]
}

/// Immutable view of the registry at one moment
#[derive(Debug, Clone)]
pub struct ActiveParams {
    preset_name: Option<String>,
    tx: Arc<Schema>,
    header: Arc<Schema>,
    body: Arc<Schema>,
    opcodes: Arc<OpcodeTable>,
}

impl ActiveParams {
    pub fn preset_name(&self) -> Option<&str> {
        self.preset_name.as_deref()
    }

    pub fn tx_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.tx)
    }

    pub fn header_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.header)
    }

    pub fn body_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.body)
    }

    pub fn schema(&self, kind: SchemaKind) -> Arc<Schema> {
        match kind {
            SchemaKind::Transaction => self.tx_schema(),
            SchemaKind::BlockHeader => self.header_schema(),
            SchemaKind::BlockBody => self.body_schema(),
        }
    }

    pub fn opcode_table(&self) -> &OpcodeTable {
        &self.opcodes
    }
}

/// Registry of presets and the currently active schemas and opcode table
#[derive(Debug, Clone)]
pub struct SchemaContext {
    presets: BTreeMap<String, Arc<Preset>>,
    active_preset: Option<String>,
    tx: Arc<Schema>,
    header: Arc<Schema>,
    body: Arc<Schema>,
    overrides: Vec<OpcodeEntry>,
    opcodes: Arc<OpcodeTable>,
}

impl SchemaContext {
    /// Registry with the built-in presets, Bitcoin active
    pub fn new() -> Self {
        let presets: BTreeMap<String, Arc<Preset>> = builtin_presets()
            .into_iter()
            .map(|p| (p.name.clone(), Arc::new(p)))
            .collect();
        let bitcoin = bitcoin();
        let mut ctx = SchemaContext {
            presets,
            active_preset: None,
            tx: Arc::clone(&bitcoin.tx_schema),
            header: Arc::clone(&bitcoin.block_header_schema),
            body: Arc::clone(&bitcoin.block_body_schema),
            overrides: Vec::new(),
            opcodes: OpcodeTable::base(),
        };
        ctx.activate(&bitcoin);
        ctx
    }

    pub fn get_schema(&self, kind: SchemaKind) -> Arc<Schema> {
        match kind {
            SchemaKind::Transaction => Arc::clone(&self.tx),
            SchemaKind::BlockHeader => Arc::clone(&self.header),
            SchemaKind::BlockBody => Arc::clone(&self.body),
        }
    }

    /// Replace one schema. Only entities created afterwards see it, and
    /// the layout no longer matches a named preset.
    pub fn set_schema(&mut self, kind: SchemaKind, schema: Schema) {
        debug!("Setting custom {} schema with {} fields", kind, schema.len());
        let schema = Arc::new(schema);
        match kind {
            SchemaKind::Transaction => self.tx = schema,
            SchemaKind::BlockHeader => self.header = schema,
            SchemaKind::BlockBody => self.body = schema,
        }
        self.active_preset = None;
    }

    /// Activate a registered preset: all three schemas and its overrides
    pub fn apply_preset(&mut self, name: &str) -> Result<()> {
        let preset = self
            .presets
            .get(name)
            .cloned()
            .ok_or_else(|| ChainParamsError::UnknownPreset(name.to_string()))?;
        self.activate(&preset);
        Ok(())
    }

    fn activate(&mut self, preset: &Preset) {
        debug!(
            "Applying preset {} ({} tx fields, {} opcode overrides)",
            preset.name,
            preset.tx_schema.len(),
            preset.opcode_overrides.len()
        );
        self.tx = Arc::clone(&preset.tx_schema);
        self.header = Arc::clone(&preset.block_header_schema);
        self.body = Arc::clone(&preset.block_body_schema);
        self.install_overrides(preset.opcode_overrides.clone());
        self.active_preset = Some(preset.name.clone());
    }

    fn install_overrides(&mut self, overrides: Vec<OpcodeEntry>) {
        self.opcodes = if overrides.is_empty() {
            OpcodeTable::base()
        } else {
            Arc::new(OpcodeTable::with_overrides(&overrides))
        };
        self.overrides = overrides;
    }

    /// Add or replace a preset definition. Returns the replaced one.
    pub fn register_preset(&mut self, preset: Preset) -> Option<Arc<Preset>> {
        let name = preset.name.clone();
        let previous = self.presets.insert(name.clone(), Arc::new(preset));
        if previous.is_some() {
            warn!("Preset {} redefined", name);
        } else {
            debug!("Registered preset {}", name);
        }
        previous
    }

    /// Parse a JSON preset definition and register it. Returns its name.
    pub fn register_preset_json(&mut self, json: &str) -> Result<String> {
        let preset = PresetDefinition::from_json(json)?.into_preset()?;
        let name = preset.name.clone();
        self.register_preset(preset);
        Ok(name)
    }

    /// Load a JSON preset definition from disk and register it
    pub fn load_preset_file(&mut self, path: impl AsRef<Path>) -> anyhow::Result<String> {
        let path = path.as_ref();
        let preset = PresetDefinition::from_path(path)?
            .into_preset()
            .with_context(|| format!("invalid preset definition in {}", path.display()))?;
        let name = preset.name.clone();
        self.register_preset(preset);
        Ok(name)
    }

    pub fn preset(&self, name: &str) -> Option<Arc<Preset>> {
        self.presets.get(name).cloned()
    }

    /// Registered preset names, sorted
    pub fn list_presets(&self) -> Vec<String> {
        self.presets.keys().cloned().collect()
    }

    pub fn active_preset(&self) -> Option<&str> {
        self.active_preset.as_deref()
    }

    pub fn opcode_overrides(&self) -> &[OpcodeEntry] {
        &self.overrides
    }

    /// Rebuild the active opcode table from the base table plus `entries`
    pub fn set_opcode_overrides(&mut self, entries: Vec<OpcodeEntry>) {
        debug!("Setting {} opcode overrides", entries.len());
        self.install_overrides(entries);
    }

    pub fn opcode_table(&self) -> Arc<OpcodeTable> {
        Arc::clone(&self.opcodes)
    }

    pub fn snapshot(&self) -> Arc<ActiveParams> {
        Arc::new(ActiveParams {
            preset_name: self.active_preset.clone(),
            tx: Arc::clone(&self.tx),
            header: Arc::clone(&self.header),
            body: Arc::clone(&self.body),
            opcodes: Arc::clone(&self.opcodes),
        })
    }
}

impl Default for SchemaContext {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------
// JSON preset definitions
// ----------------------------------------------------------------------

/// One field: struct-style format plus optional byte count and default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub format: String,
    #[serde(default)]
    pub num_bytes: Option<usize>,
    /// Integer, hex string for bytes, or null for the encoding's empty value
    #[serde(default)]
    pub default: serde_json::Value,
}

impl FieldDefinition {
    fn to_field(&self) -> Result<FieldSpec> {
        let default = match &self.default {
            serde_json::Value::Null => None,
            serde_json::Value::Number(n) => Some(Value::Int(n.as_i64().ok_or_else(|| {
                ChainParamsError::PresetDefinition(format!(
                    "default for '{}' is not a 64-bit integer",
                    self.name
                ))
            })?)),
            serde_json::Value::String(s) => Some(Value::Bytes(hex::decode(s)?)),
            serde_json::Value::Array(items) if items.is_empty() => None,
            other => {
                return Err(ChainParamsError::PresetDefinition(format!(
                    "unsupported default {} for '{}'",
                    other, self.name
                )))
            }
        };
        FieldSpec::from_format(self.name.as_str(), &self.format, self.num_bytes, default)
    }
}

/// Opcode override naming a handler from the handler library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideDefinition {
    pub value: u8,
    pub name: String,
    pub handler: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetDefinition {
    pub name: String,
    pub tx_fields: Vec<FieldDefinition>,
    /// Bitcoin's 80-byte header when absent
    #[serde(default)]
    pub block_header_fields: Option<Vec<FieldDefinition>>,
    /// Bitcoin's block body when absent
    #[serde(default)]
    pub block_fields: Option<Vec<FieldDefinition>>,
    #[serde(default)]
    pub opcode_overrides: Vec<OverrideDefinition>,
}

fn build_schema(fields: &[FieldDefinition]) -> Result<Schema> {
    let specs = fields
        .iter()
        .map(FieldDefinition::to_field)
        .collect::<Result<Vec<_>>>()?;
    Schema::new(specs)
}

impl PresetDefinition {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read preset definition {}", path.display()))?;
        let definition = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse preset definition {}", path.display()))?;
        Ok(definition)
    }

    pub fn into_preset(self) -> Result<Preset> {
        let mut preset = Preset::new(self.name.clone(), build_schema(&self.tx_fields)?);
        if let Some(fields) = &self.block_header_fields {
            preset = preset.with_header_schema(build_schema(fields)?);
        }
        if let Some(fields) = &self.block_fields {
            preset = preset.with_body_schema(build_schema(fields)?);
        }
        for def in &self.opcode_overrides {
            let handler = named_handler(&def.handler)
                .ok_or_else(|| ChainParamsError::UnknownHandler(def.handler.clone()))?;
            preset = preset.with_override(OpcodeEntry {
                value: def.value,
                name: def.name.clone(),
                handler,
            });
        }
        Ok(preset)
    }
}

// ----------------------------------------------------------------------
// Process-wide default context
// ----------------------------------------------------------------------

static GLOBAL_CONTEXT: Lazy<RwLock<SchemaContext>> = Lazy::new(|| RwLock::new(SchemaContext::new()));

/// Snapshot of the process-wide default context
pub fn global() -> Arc<ActiveParams> {
    let ctx = GLOBAL_CONTEXT.read().unwrap_or_else(|e| e.into_inner());
    ctx.snapshot()
}

/// Mutate the process-wide default context
pub fn with_global<R>(f: impl FnOnce(&mut SchemaContext) -> R) -> R {
    let mut ctx = GLOBAL_CONTEXT.write().unwrap_or_else(|e| e.into_inner());
    f(&mut ctx)
}

/// Activate a preset in the process-wide default context
pub fn set_to_preset(name: &str) -> Result<()> {
    with_global(|ctx| ctx.apply_preset(name))
}

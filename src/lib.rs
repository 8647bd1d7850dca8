//! # Chainparams VM
//!
//! Schema-driven codec for cryptocurrency transactions and blocks, plus a
//! step-through script evaluator whose opcode table follows the active chain.
//!
//! ## Architecture
//!
//! The crate is layered leaf-first:
//! - Schemas (ordered field layouts) and the binary codec that walks them
//! - Entities (transactions, block headers, blocks) that capture a schema
//! - The opcode table (base behaviors plus per-chain overrides) and the evaluator
//! - Chain presets and the registry that switches between them
//!
//! ## Design Principles
//!
//! 1. **Captured schemas**: an entity keeps the layout it was created with;
//!    switching presets later never changes how it serializes
//! 2. **Snapshots, not globals**: entities and evaluators take an
//!    [`ActiveParams`] snapshot instead of reading shared state
//! 3. **Explained execution**: every evaluator step yields the resulting
//!    stack and a log line describing what happened
//!
//! ## Usage
//!
//! ```rust
//! use chainparams_vm::chainparams::SchemaContext;
//! use chainparams_vm::transaction::Transaction;
//!
//! let mut ctx = SchemaContext::new();
//! ctx.apply_preset("Peercoin").unwrap();
//! let params = ctx.snapshot();
//!
//! let tx = Transaction::from_hex("0100000000000000000000000000", &params.tx_schema()).unwrap();
//! assert_eq!(tx.get_int("Timestamp"), Some(0));
//! assert_eq!(tx.to_hex().unwrap(), "0100000000000000000000000000");
//! ```

pub mod error;
pub mod constants;
pub mod types;
pub mod schema;
pub mod codec;
pub mod entity;
pub mod transaction;
pub mod block;
pub mod opcodes;
pub mod script;
pub mod opcode_table;
pub mod interpreter;
pub mod chainparams;
pub mod templates;

// Re-export commonly used types
pub use types::*;
pub use error::{ChainParamsError, Result};
pub use schema::{Encoding, Endianness, FieldSpec, Schema, SchemaKind};
pub use entity::{migrate, Entity};
pub use transaction::Transaction;
pub use block::{Block, BlockHeader};
pub use script::Script;
pub use opcode_table::{OpcodeEntry, OpcodeTable, StackOperation};
pub use interpreter::{verify_script, EvaluationState, Evaluator, Outcome, Step};
pub use chainparams::{ActiveParams, Preset, SchemaContext};

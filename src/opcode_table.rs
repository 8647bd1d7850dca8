//! Opcode dispatch tables
//!
//! The base table maps every standard opcode value to a handler. Presets
//! layer overrides on top of it when they are activated; the base table
//! itself is built once and shared, so switching presets always starts
//! again from the standard behavior.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use ripemd::Ripemd160;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::constants::*;
use crate::error::{ChainParamsError, Result};
use crate::interpreter::EvaluationState;
use crate::opcodes::*;
use crate::script::{cast_to_bool, decode_num, encode_num, encode_push, Script, ScriptOp};
use crate::transaction::signature_hash;
use crate::types::ByteString;

/// Everything a handler can see while executing one opcode
pub struct OpContext<'a> {
    pub state: &'a mut EvaluationState,
    pub op: &'a ScriptOp,
    /// Name the active table gives this opcode
    pub name: &'a str,
    /// Script currently executing, for signature hashing
    pub script: &'a Script,
}

impl<'a> OpContext<'a> {
    /// Fail unless at least `n` items are on the stack
    pub fn require(&self, n: usize) -> Result<()> {
        if self.state.stack.len() < n {
            return Err(ChainParamsError::StackUnderflow {
                opcode: self.name.to_string(),
                needed: n,
                available: self.state.stack.len(),
            });
        }
        Ok(())
    }

    pub fn pop(&mut self) -> Result<ByteString> {
        self.require(1)?;
        self.state.stack.pop().ok_or_else(|| ChainParamsError::StackUnderflow {
            opcode: self.name.to_string(),
            needed: 1,
            available: 0,
        })
    }

    pub fn pop_num(&mut self) -> Result<i64> {
        let item = self.pop()?;
        decode_num(&item, SCRIPT_NUM_SIZE)
    }

    /// Item `depth` places below the top (0 is the top)
    pub fn peek(&self, depth: usize) -> Result<&ByteString> {
        self.require(depth + 1)?;
        Ok(&self.state.stack[self.state.stack.len() - 1 - depth])
    }

    pub fn push(&mut self, item: ByteString) {
        self.state.stack.push(item);
    }

    pub fn push_num(&mut self, n: i64) {
        self.state.stack.push(encode_num(n));
    }

    pub fn push_bool(&mut self, b: bool) {
        self.state.stack.push(if b { vec![1] } else { vec![] });
    }

    /// Execution failure attributed to this opcode
    pub fn fail(&self, reason: impl fmt::Display) -> ChainParamsError {
        ChainParamsError::ScriptExecution(format!("{}: {}", self.name, reason))
    }
}

/// Handler executing one opcode: mutates the state and returns a log line
pub type StackOperation = Arc<dyn Fn(&mut OpContext<'_>) -> Result<String> + Send + Sync>;

#[derive(Clone)]
pub struct OpcodeEntry {
    pub value: u8,
    pub name: String,
    pub handler: StackOperation,
}

impl OpcodeEntry {
    pub fn new<F>(value: u8, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut OpContext<'_>) -> Result<String> + Send + Sync + 'static,
    {
        OpcodeEntry { value, name: name.into(), handler: Arc::new(handler) }
    }

    fn from_fn(value: u8, name: &str, handler: fn(&mut OpContext<'_>) -> Result<String>) -> Self {
        OpcodeEntry { value, name: name.to_string(), handler: Arc::new(handler) }
    }
}

impl fmt::Debug for OpcodeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpcodeEntry")
            .field("value", &format_args!("0x{:02x}", self.value))
            .field("name", &self.name)
            .finish()
    }
}

/// Opcode value → entry, plus a name index for parsing human-readable scripts
#[derive(Clone)]
pub struct OpcodeTable {
    entries: Vec<Option<OpcodeEntry>>,
    names: HashMap<String, u8>,
    overridden: Vec<u8>,
}

static BASE_TABLE: Lazy<Arc<OpcodeTable>> = Lazy::new(|| Arc::new(OpcodeTable::build_base()));

impl OpcodeTable {
    /// Shared table of standard behaviors
    pub fn base() -> Arc<OpcodeTable> {
        Arc::clone(&BASE_TABLE)
    }

    /// Base table with `overrides` replacing entries by value
    pub fn with_overrides(overrides: &[OpcodeEntry]) -> OpcodeTable {
        if overrides.is_empty() {
            return OpcodeTable::clone(&BASE_TABLE);
        }
        let mut table = OpcodeTable::clone(&BASE_TABLE);
        for entry in overrides {
            table.entries[entry.value as usize] = Some(entry.clone());
            if !table.overridden.contains(&entry.value) {
                table.overridden.push(entry.value);
            }
        }
        table.rebuild_names();
        table
    }

    fn build_base() -> OpcodeTable {
        let mut entries: Vec<Option<OpcodeEntry>> = vec![None; 256];
        for value in 0..=0xffu8 {
            entries[value as usize] = base_entry(value);
        }
        let mut table = OpcodeTable { entries, names: HashMap::new(), overridden: Vec::new() };
        table.rebuild_names();
        table
    }

    fn rebuild_names(&mut self) {
        let mut names = HashMap::new();
        // overridden names win over base names that collide with them
        let (overridden, plain): (Vec<&OpcodeEntry>, Vec<&OpcodeEntry>) = self
            .entries
            .iter()
            .flatten()
            .partition(|e| self.overridden.contains(&e.value));
        for entry in plain.into_iter().chain(overridden) {
            // pushes need their data, so a bare name cannot stand for them
            if (0x01..=OP_PUSHDATA4).contains(&entry.value) {
                continue;
            }
            names.insert(entry.name.clone(), entry.value);
        }
        for (alias, value) in [("OP_FALSE", OP_0), ("OP_TRUE", OP_1), ("OP_NOP2", OP_NOP2)] {
            names.entry(alias.to_string()).or_insert(value);
        }
        self.names = names;
    }

    pub fn get(&self, value: u8) -> Option<&OpcodeEntry> {
        self.entries[value as usize].as_ref()
    }

    pub fn name_of(&self, value: u8) -> Option<&str> {
        self.get(value).map(|e| e.name.as_str())
    }

    pub fn value_of(&self, name: &str) -> Option<u8> {
        self.names.get(name).copied()
    }

    /// Name that parses back to `value` in this table.
    ///
    /// Usually the entry's own name. When an override has taken that name
    /// (Clams renames `0xb0` to `OP_CHECKLOCKTIMEVERIFY`), the base entry is
    /// rendered under an alias instead, or `None` when it has none.
    pub fn text_name(&self, value: u8) -> Option<&str> {
        let name = self.name_of(value)?;
        if self.value_of(name) == Some(value) {
            return Some(name);
        }
        self.names
            .iter()
            .filter(|(_, v)| **v == value)
            .map(|(alias, _)| alias.as_str())
            .min()
    }

    /// Values whose entries come from overrides rather than the base table
    pub fn overridden(&self) -> &[u8] {
        &self.overridden
    }

    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for OpcodeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpcodeTable")
            .field("entries", &self.len())
            .field("overridden", &self.overridden)
            .finish()
    }
}

fn base_entry(value: u8) -> Option<OpcodeEntry> {
    let handler: fn(&mut OpContext<'_>) -> Result<String> = match value {
        0x00..=OP_PUSHDATA4 => op_push_data,
        OP_1NEGATE | 0x51..=OP_16 => op_push_number,
        OP_RESERVED | OP_VER | OP_VERIF | OP_VERNOTIF | OP_RESERVED1 | OP_RESERVED2 => op_reserved,
        OP_NOP => op_nop,
        OP_IF => op_if,
        OP_NOTIF => op_notif,
        OP_ELSE => op_else,
        OP_ENDIF => op_endif,
        OP_VERIFY => op_verify,
        OP_RETURN => op_return,
        OP_TOALTSTACK => op_toaltstack,
        OP_FROMALTSTACK => op_fromaltstack,
        OP_2DROP => op_2drop,
        OP_2DUP => op_2dup,
        OP_3DUP => op_3dup,
        OP_2OVER => op_2over,
        OP_2ROT => op_2rot,
        OP_2SWAP => op_2swap,
        OP_IFDUP => op_ifdup,
        OP_DEPTH => op_depth,
        OP_DROP => op_drop,
        OP_DUP => op_dup,
        OP_NIP => op_nip,
        OP_OVER => op_over,
        OP_PICK => op_pick,
        OP_ROLL => op_roll,
        OP_ROT => op_rot,
        OP_SWAP => op_swap,
        OP_TUCK => op_tuck,
        OP_SIZE => op_size,
        OP_EQUAL => op_equal,
        OP_EQUALVERIFY => op_equalverify,
        OP_1ADD => op_1add,
        OP_1SUB => op_1sub,
        OP_NEGATE => op_negate,
        OP_ABS => op_abs,
        OP_NOT => op_not,
        OP_0NOTEQUAL => op_0notequal,
        OP_ADD => op_add,
        OP_SUB => op_sub,
        OP_BOOLAND => op_booland,
        OP_BOOLOR => op_boolor,
        OP_NUMEQUAL => op_numequal,
        OP_NUMEQUALVERIFY => op_numequalverify,
        OP_NUMNOTEQUAL => op_numnotequal,
        OP_LESSTHAN => op_lessthan,
        OP_GREATERTHAN => op_greaterthan,
        OP_LESSTHANOREQUAL => op_lessthanorequal,
        OP_GREATERTHANOREQUAL => op_greaterthanorequal,
        OP_MIN => op_min,
        OP_MAX => op_max,
        OP_WITHIN => op_within,
        OP_RIPEMD160 => op_ripemd160,
        OP_SHA1 => op_sha1,
        OP_SHA256 => op_sha256,
        OP_HASH160 => op_hash160,
        OP_HASH256 => op_hash256,
        OP_CODESEPARATOR => op_codeseparator,
        OP_CHECKSIG => op_checksig,
        OP_CHECKSIGVERIFY => op_checksigverify,
        OP_CHECKMULTISIG => op_checkmultisig,
        OP_CHECKMULTISIGVERIFY => op_checkmultisigverify,
        OP_CHECKLOCKTIMEVERIFY => op_checklocktimeverify,
        OP_NOP1 | OP_NOP3..=OP_NOP10 => op_upgradable_nop,
        v if is_disabled(v) => op_disabled,
        _ => return None,
    };

    let name = match standard_name(value) {
        Some(name) => name.to_string(),
        None => format!("OP_PUSHBYTES_{}", value),
    };
    Some(OpcodeEntry::from_fn(value, &name, handler))
}

/// Look up a handler by name for preset definitions.
///
/// Accepts any standard opcode name (its base handler) plus the named
/// chain-specific handlers.
pub fn named_handler(name: &str) -> Option<StackOperation> {
    let special: Option<fn(&mut OpContext<'_>) -> Result<String>> = match name {
        "nop" => Some(op_nop),
        "disabled" => Some(op_disabled),
        "checklocktimeverify" => Some(op_checklocktimeverify),
        "clams_checklocktimeverify" => Some(clams_checklocktimeverify),
        _ => None,
    };
    if let Some(handler) = special {
        return Some(Arc::new(handler));
    }
    let table = OpcodeTable::base();
    let value = table.value_of(name)?;
    table.get(value).map(|e| Arc::clone(&e.handler))
}

fn hex_item(item: &[u8]) -> String {
    if item.is_empty() {
        "(empty)".to_string()
    } else {
        format!("0x{}", hex::encode(item))
    }
}

// ----------------------------------------------------------------------
// Pushes and flow control
// ----------------------------------------------------------------------

fn op_push_data(ctx: &mut OpContext<'_>) -> Result<String> {
    let data = ctx.op.data.clone().unwrap_or_default();
    let log = format!("Pushed {} onto the stack", hex_item(&data));
    ctx.push(data);
    Ok(log)
}

fn op_push_number(ctx: &mut OpContext<'_>) -> Result<String> {
    let n = if ctx.op.opcode == OP_1NEGATE {
        -1
    } else {
        ctx.op.opcode as i64 - (OP_1 as i64 - 1)
    };
    ctx.push_num(n);
    Ok(format!("Pushed the number {} onto the stack", n))
}

fn op_nop(ctx: &mut OpContext<'_>) -> Result<String> {
    Ok(format!("{}: no operation", ctx.name))
}

fn op_upgradable_nop(ctx: &mut OpContext<'_>) -> Result<String> {
    if ctx.state.flags & VERIFY_DISCOURAGE_UPGRADABLE_NOPS != 0 {
        return Err(ctx.fail("upgradable NOP is discouraged"));
    }
    Ok(format!("{}: no operation", ctx.name))
}

fn op_reserved(ctx: &mut OpContext<'_>) -> Result<String> {
    Err(ctx.fail("reserved opcode"))
}

fn op_disabled(ctx: &mut OpContext<'_>) -> Result<String> {
    Err(ctx.fail("disabled opcode"))
}

fn conditional(ctx: &mut OpContext<'_>, negate: bool) -> Result<String> {
    if !ctx.state.is_executing() {
        ctx.state.cond_stack.push(false);
        return Ok(format!("{}: inside an unexecuted branch, skipping its body", ctx.name));
    }
    let item = ctx.pop()?;
    let taken = cast_to_bool(&item) != negate;
    ctx.state.cond_stack.push(taken);
    Ok(format!(
        "{}: popped {}, {} the following branch",
        ctx.name,
        hex_item(&item),
        if taken { "executing" } else { "skipping" }
    ))
}

fn op_if(ctx: &mut OpContext<'_>) -> Result<String> {
    conditional(ctx, false)
}

fn op_notif(ctx: &mut OpContext<'_>) -> Result<String> {
    conditional(ctx, true)
}

fn op_else(ctx: &mut OpContext<'_>) -> Result<String> {
    let cond = ctx
        .state
        .cond_stack
        .last_mut()
        .ok_or_else(|| ChainParamsError::ScriptExecution("OP_ELSE without OP_IF".to_string()))?;
    *cond = !*cond;
    let now = *cond;
    Ok(format!(
        "{}: {} the alternative branch",
        ctx.name,
        if now && ctx.state.is_executing() { "executing" } else { "skipping" }
    ))
}

fn op_endif(ctx: &mut OpContext<'_>) -> Result<String> {
    if ctx.state.cond_stack.pop().is_none() {
        return Err(ctx.fail("OP_ENDIF without OP_IF"));
    }
    Ok(format!("{}: closed conditional block", ctx.name))
}

fn op_verify(ctx: &mut OpContext<'_>) -> Result<String> {
    // a false item stays on the stack
    if !cast_to_bool(ctx.peek(0)?) {
        return Err(ctx.fail(format!("top item {} is false", hex_item(ctx.peek(0)?))));
    }
    let item = ctx.pop()?;
    Ok(format!("{}: popped {}, verification passed", ctx.name, hex_item(&item)))
}

fn op_return(ctx: &mut OpContext<'_>) -> Result<String> {
    Err(ctx.fail("script marked unspendable"))
}

// ----------------------------------------------------------------------
// Stack operations
// ----------------------------------------------------------------------

fn op_toaltstack(ctx: &mut OpContext<'_>) -> Result<String> {
    let item = ctx.pop()?;
    let log = format!("Moved {} to the alt stack", hex_item(&item));
    ctx.state.alt_stack.push(item);
    Ok(log)
}

fn op_fromaltstack(ctx: &mut OpContext<'_>) -> Result<String> {
    let item = ctx.state.alt_stack.pop().ok_or_else(|| ChainParamsError::StackUnderflow {
        opcode: ctx.name.to_string(),
        needed: 1,
        available: 0,
    })?;
    let log = format!("Moved {} from the alt stack", hex_item(&item));
    ctx.push(item);
    Ok(log)
}

fn op_2drop(ctx: &mut OpContext<'_>) -> Result<String> {
    ctx.require(2)?;
    ctx.pop()?;
    ctx.pop()?;
    Ok("Dropped the top two stack items".to_string())
}

fn op_2dup(ctx: &mut OpContext<'_>) -> Result<String> {
    let top = ctx.peek(0)?.clone();
    let second = ctx.peek(1)?.clone();
    ctx.push(second);
    ctx.push(top);
    Ok("Duplicated the top two stack items".to_string())
}

fn op_3dup(ctx: &mut OpContext<'_>) -> Result<String> {
    let top = ctx.peek(0)?.clone();
    let second = ctx.peek(1)?.clone();
    let third = ctx.peek(2)?.clone();
    ctx.push(third);
    ctx.push(second);
    ctx.push(top);
    Ok("Duplicated the top three stack items".to_string())
}

fn op_2over(ctx: &mut OpContext<'_>) -> Result<String> {
    let fourth = ctx.peek(3)?.clone();
    let third = ctx.peek(2)?.clone();
    ctx.push(fourth);
    ctx.push(third);
    Ok("Copied the second pair of items to the top".to_string())
}

fn op_2rot(ctx: &mut OpContext<'_>) -> Result<String> {
    ctx.require(6)?;
    let len = ctx.state.stack.len();
    let sixth = ctx.state.stack.remove(len - 6);
    let fifth = ctx.state.stack.remove(len - 6);
    ctx.push(sixth);
    ctx.push(fifth);
    Ok("Moved the third pair of items to the top".to_string())
}

fn op_2swap(ctx: &mut OpContext<'_>) -> Result<String> {
    ctx.require(4)?;
    let len = ctx.state.stack.len();
    ctx.state.stack.swap(len - 4, len - 2);
    ctx.state.stack.swap(len - 3, len - 1);
    Ok("Swapped the top two pairs of items".to_string())
}

fn op_ifdup(ctx: &mut OpContext<'_>) -> Result<String> {
    let top = ctx.peek(0)?.clone();
    if cast_to_bool(&top) {
        let log = format!("Duplicated {} because it is true", hex_item(&top));
        ctx.push(top);
        Ok(log)
    } else {
        Ok(format!("Did not duplicate {} because it is false", hex_item(&top)))
    }
}

fn op_depth(ctx: &mut OpContext<'_>) -> Result<String> {
    let depth = ctx.state.stack.len() as i64;
    ctx.push_num(depth);
    Ok(format!("Pushed the stack depth {}", depth))
}

fn op_drop(ctx: &mut OpContext<'_>) -> Result<String> {
    let item = ctx.pop()?;
    Ok(format!("Dropped {}", hex_item(&item)))
}

fn op_dup(ctx: &mut OpContext<'_>) -> Result<String> {
    let top = ctx.peek(0)?.clone();
    let log = format!("Duplicated {}", hex_item(&top));
    ctx.push(top);
    Ok(log)
}

fn op_nip(ctx: &mut OpContext<'_>) -> Result<String> {
    ctx.require(2)?;
    let len = ctx.state.stack.len();
    let removed = ctx.state.stack.remove(len - 2);
    Ok(format!("Removed the second item {}", hex_item(&removed)))
}

fn op_over(ctx: &mut OpContext<'_>) -> Result<String> {
    let second = ctx.peek(1)?.clone();
    let log = format!("Copied the second item {} to the top", hex_item(&second));
    ctx.push(second);
    Ok(log)
}

fn stack_index(ctx: &mut OpContext<'_>) -> Result<usize> {
    let n = ctx.pop_num()?;
    if n < 0 || n as usize >= ctx.state.stack.len() {
        return Err(ctx.fail(format!(
            "index {} out of range for stack of {} items",
            n,
            ctx.state.stack.len()
        )));
    }
    Ok(n as usize)
}

fn op_pick(ctx: &mut OpContext<'_>) -> Result<String> {
    let n = stack_index(ctx)?;
    let item = ctx.peek(n)?.clone();
    let log = format!("Copied item {} ({}) to the top", n, hex_item(&item));
    ctx.push(item);
    Ok(log)
}

fn op_roll(ctx: &mut OpContext<'_>) -> Result<String> {
    let n = stack_index(ctx)?;
    let len = ctx.state.stack.len();
    let item = ctx.state.stack.remove(len - 1 - n);
    let log = format!("Moved item {} ({}) to the top", n, hex_item(&item));
    ctx.push(item);
    Ok(log)
}

fn op_rot(ctx: &mut OpContext<'_>) -> Result<String> {
    ctx.require(3)?;
    let len = ctx.state.stack.len();
    let third = ctx.state.stack.remove(len - 3);
    ctx.push(third);
    Ok("Rotated the top three items".to_string())
}

fn op_swap(ctx: &mut OpContext<'_>) -> Result<String> {
    ctx.require(2)?;
    let len = ctx.state.stack.len();
    ctx.state.stack.swap(len - 1, len - 2);
    Ok("Swapped the top two items".to_string())
}

fn op_tuck(ctx: &mut OpContext<'_>) -> Result<String> {
    ctx.require(2)?;
    let top = ctx.peek(0)?.clone();
    let len = ctx.state.stack.len();
    let log = format!("Copied {} below the second item", hex_item(&top));
    ctx.state.stack.insert(len - 2, top);
    Ok(log)
}

fn op_size(ctx: &mut OpContext<'_>) -> Result<String> {
    let size = ctx.peek(0)?.len() as i64;
    ctx.push_num(size);
    Ok(format!("Pushed the size of the top item: {}", size))
}

// ----------------------------------------------------------------------
// Equality and arithmetic
// ----------------------------------------------------------------------

fn compare_top(ctx: &mut OpContext<'_>) -> Result<(bool, ByteString, ByteString)> {
    ctx.require(2)?;
    let a = ctx.pop()?;
    let b = ctx.pop()?;
    Ok((a == b, a, b))
}

fn op_equal(ctx: &mut OpContext<'_>) -> Result<String> {
    let (equal, a, b) = compare_top(ctx)?;
    ctx.push_bool(equal);
    Ok(format!(
        "{} {} {}",
        hex_item(&b),
        if equal { "equals" } else { "does not equal" },
        hex_item(&a)
    ))
}

fn op_equalverify(ctx: &mut OpContext<'_>) -> Result<String> {
    let (equal, a, b) = compare_top(ctx)?;
    if !equal {
        return Err(ctx.fail(format!("{} does not equal {}", hex_item(&b), hex_item(&a))));
    }
    Ok(format!("Verified {} equals {}", hex_item(&b), hex_item(&a)))
}

fn unary_num(ctx: &mut OpContext<'_>, f: fn(i64) -> i64) -> Result<String> {
    let a = ctx.pop_num()?;
    let result = f(a);
    ctx.push_num(result);
    Ok(format!("{}: {} -> {}", ctx.name, a, result))
}

fn binary_num(ctx: &mut OpContext<'_>, f: fn(i64, i64) -> i64) -> Result<String> {
    ctx.require(2)?;
    let b = ctx.pop_num()?;
    let a = ctx.pop_num()?;
    let result = f(a, b);
    ctx.push_num(result);
    Ok(format!("{}: {}, {} -> {}", ctx.name, a, b, result))
}

fn flag(b: bool) -> i64 {
    b as i64
}

fn op_1add(ctx: &mut OpContext<'_>) -> Result<String> {
    unary_num(ctx, |a| a + 1)
}

fn op_1sub(ctx: &mut OpContext<'_>) -> Result<String> {
    unary_num(ctx, |a| a - 1)
}

fn op_negate(ctx: &mut OpContext<'_>) -> Result<String> {
    unary_num(ctx, |a| -a)
}

fn op_abs(ctx: &mut OpContext<'_>) -> Result<String> {
    unary_num(ctx, i64::abs)
}

fn op_not(ctx: &mut OpContext<'_>) -> Result<String> {
    unary_num(ctx, |a| flag(a == 0))
}

fn op_0notequal(ctx: &mut OpContext<'_>) -> Result<String> {
    unary_num(ctx, |a| flag(a != 0))
}

fn op_add(ctx: &mut OpContext<'_>) -> Result<String> {
    binary_num(ctx, |a, b| a + b)
}

fn op_sub(ctx: &mut OpContext<'_>) -> Result<String> {
    binary_num(ctx, |a, b| a - b)
}

fn op_booland(ctx: &mut OpContext<'_>) -> Result<String> {
    binary_num(ctx, |a, b| flag(a != 0 && b != 0))
}

fn op_boolor(ctx: &mut OpContext<'_>) -> Result<String> {
    binary_num(ctx, |a, b| flag(a != 0 || b != 0))
}

fn op_numequal(ctx: &mut OpContext<'_>) -> Result<String> {
    binary_num(ctx, |a, b| flag(a == b))
}

fn op_numequalverify(ctx: &mut OpContext<'_>) -> Result<String> {
    ctx.require(2)?;
    let b = ctx.pop_num()?;
    let a = ctx.pop_num()?;
    if a != b {
        return Err(ctx.fail(format!("{} is not numerically equal to {}", a, b)));
    }
    Ok(format!("Verified {} equals {}", a, b))
}

fn op_numnotequal(ctx: &mut OpContext<'_>) -> Result<String> {
    binary_num(ctx, |a, b| flag(a != b))
}

fn op_lessthan(ctx: &mut OpContext<'_>) -> Result<String> {
    binary_num(ctx, |a, b| flag(a < b))
}

fn op_greaterthan(ctx: &mut OpContext<'_>) -> Result<String> {
    binary_num(ctx, |a, b| flag(a > b))
}

fn op_lessthanorequal(ctx: &mut OpContext<'_>) -> Result<String> {
    binary_num(ctx, |a, b| flag(a <= b))
}

fn op_greaterthanorequal(ctx: &mut OpContext<'_>) -> Result<String> {
    binary_num(ctx, |a, b| flag(a >= b))
}

fn op_min(ctx: &mut OpContext<'_>) -> Result<String> {
    binary_num(ctx, i64::min)
}

fn op_max(ctx: &mut OpContext<'_>) -> Result<String> {
    binary_num(ctx, i64::max)
}

fn op_within(ctx: &mut OpContext<'_>) -> Result<String> {
    ctx.require(3)?;
    let max = ctx.pop_num()?;
    let min = ctx.pop_num()?;
    let x = ctx.pop_num()?;
    let within = min <= x && x < max;
    ctx.push_bool(within);
    Ok(format!(
        "{} is {}within [{}, {})",
        x,
        if within { "" } else { "not " },
        min,
        max
    ))
}

// ----------------------------------------------------------------------
// Crypto
// ----------------------------------------------------------------------

fn hash_top(ctx: &mut OpContext<'_>, f: fn(&[u8]) -> ByteString) -> Result<String> {
    let item = ctx.pop()?;
    let digest = f(&item);
    let log = format!("{}: {} -> {}", ctx.name, hex_item(&item), hex_item(&digest));
    ctx.push(digest);
    Ok(log)
}

pub fn hash160(data: &[u8]) -> ByteString {
    Ripemd160::digest(Sha256::digest(data)).to_vec()
}

fn op_ripemd160(ctx: &mut OpContext<'_>) -> Result<String> {
    hash_top(ctx, |d| Ripemd160::digest(d).to_vec())
}

fn op_sha1(ctx: &mut OpContext<'_>) -> Result<String> {
    hash_top(ctx, |d| Sha1::digest(d).to_vec())
}

fn op_sha256(ctx: &mut OpContext<'_>) -> Result<String> {
    hash_top(ctx, |d| Sha256::digest(d).to_vec())
}

fn op_hash160(ctx: &mut OpContext<'_>) -> Result<String> {
    hash_top(ctx, hash160)
}

fn op_hash256(ctx: &mut OpContext<'_>) -> Result<String> {
    hash_top(ctx, |d| Sha256::digest(Sha256::digest(d)).to_vec())
}

fn op_codeseparator(ctx: &mut OpContext<'_>) -> Result<String> {
    ctx.state.last_code_separator = ctx.op.end;
    Ok(format!(
        "{}: signatures now cover the script from byte {}",
        ctx.name, ctx.op.end
    ))
}

/// Script code for signature hashing: from the last code separator on,
/// with the given signatures removed
fn script_code(ctx: &OpContext<'_>, sigs: &[ByteString]) -> Result<Script> {
    let bytes = ctx.script.to_bytes();
    let start = ctx.state.last_code_separator.min(bytes.len());
    let mut code = Script::from_bytes(&bytes[start..]);
    for sig in sigs {
        code = code.find_and_delete(&encode_push(sig))?;
    }
    Ok(code)
}

/// Verify one signature (DER plus hash-type byte) against a public key
fn check_signature(ctx: &OpContext<'_>, sig: &[u8], pubkey: &[u8], code: &Script) -> Result<bool> {
    let (hash_type, der) = match sig.split_last() {
        Some((hash_type, der)) => (*hash_type as u32, der),
        None => return Ok(false),
    };
    let tx = ctx
        .state
        .tx
        .as_ref()
        .ok_or_else(|| ctx.fail("signature checks need a transaction context"))?;
    let sighash = signature_hash(tx, ctx.state.input_index, code.to_bytes(), hash_type)?;
    Ok(verify_signature(&sighash, der, pubkey))
}

/// Verify an ECDSA signature using secp256k1
fn verify_signature(sighash: &[u8; 32], der: &[u8], pubkey_bytes: &[u8]) -> bool {
    let secp = Secp256k1::verification_only();

    // Parse public key
    let pubkey = match PublicKey::from_slice(pubkey_bytes) {
        Ok(pk) => pk,
        Err(_) => return false,
    };

    // Parse signature (lax DER, as historical signatures require)
    let mut signature = match Signature::from_der_lax(der) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    signature.normalize_s();

    let message = match Message::from_digest_slice(sighash) {
        Ok(m) => m,
        Err(_) => return false,
    };

    secp.verify_ecdsa(&message, &signature, &pubkey).is_ok()
}

fn checksig(ctx: &mut OpContext<'_>) -> Result<bool> {
    ctx.require(2)?;
    let pubkey = ctx.pop()?;
    let sig = ctx.pop()?;
    let code = script_code(ctx, std::slice::from_ref(&sig))?;
    check_signature(ctx, &sig, &pubkey, &code)
}

fn op_checksig(ctx: &mut OpContext<'_>) -> Result<String> {
    let valid = checksig(ctx)?;
    ctx.push_bool(valid);
    Ok(format!(
        "{}: signature is {}",
        ctx.name,
        if valid { "valid" } else { "invalid" }
    ))
}

fn op_checksigverify(ctx: &mut OpContext<'_>) -> Result<String> {
    if !checksig(ctx)? {
        return Err(ctx.fail("invalid signature"));
    }
    Ok(format!("{}: signature is valid", ctx.name))
}

fn count_operand(ctx: &mut OpContext<'_>, what: &str, max: usize) -> Result<usize> {
    let n = ctx.pop_num()?;
    if n < 0 || n as usize > max {
        return Err(ctx.fail(format!("{} count {} out of range", what, n)));
    }
    Ok(n as usize)
}

fn checkmultisig(ctx: &mut OpContext<'_>) -> Result<(bool, usize, usize)> {
    let n_keys = count_operand(ctx, "public key", MAX_PUBKEYS_PER_MULTISIG)?;
    ctx.state.op_count += n_keys;
    if ctx.state.op_count > MAX_SCRIPT_OPS {
        return Err(ctx.fail("operation limit exceeded"));
    }
    ctx.require(n_keys)?;
    let mut pubkeys = Vec::with_capacity(n_keys);
    for _ in 0..n_keys {
        pubkeys.push(ctx.pop()?);
    }

    let n_sigs = count_operand(ctx, "signature", n_keys)?;
    ctx.require(n_sigs)?;
    let mut sigs = Vec::with_capacity(n_sigs);
    for _ in 0..n_sigs {
        sigs.push(ctx.pop()?);
    }

    // consensus quirk: one extra item is consumed
    ctx.pop()?;

    let code = script_code(ctx, &sigs)?;
    let mut key_iter = pubkeys.iter();
    let mut matched = 0;
    for sig in &sigs {
        let mut found = false;
        for pubkey in key_iter.by_ref() {
            if check_signature(ctx, sig, pubkey, &code)? {
                found = true;
                break;
            }
        }
        if !found {
            break;
        }
        matched += 1;
    }
    Ok((matched == n_sigs, n_sigs, n_keys))
}

fn op_checkmultisig(ctx: &mut OpContext<'_>) -> Result<String> {
    let (valid, m, n) = checkmultisig(ctx)?;
    ctx.push_bool(valid);
    Ok(format!(
        "{}: {}-of-{} signatures {}",
        ctx.name,
        m,
        n,
        if valid { "valid" } else { "invalid" }
    ))
}

fn op_checkmultisigverify(ctx: &mut OpContext<'_>) -> Result<String> {
    let (valid, m, n) = checkmultisig(ctx)?;
    if !valid {
        return Err(ctx.fail(format!("{}-of-{} signatures invalid", m, n)));
    }
    Ok(format!("{}: {}-of-{} signatures valid", ctx.name, m, n))
}

// ----------------------------------------------------------------------
// Lock time
// ----------------------------------------------------------------------

/// Shared BIP65 check: the top item must be a lock time the spending
/// transaction has already reached. The item stays on the stack.
fn verify_lock_time(ctx: &mut OpContext<'_>) -> Result<String> {
    let lock = decode_num(ctx.peek(0)?, LOCKTIME_NUM_SIZE)?;
    if lock < 0 {
        return Err(ctx.fail(format!("negative lock time {}", lock)));
    }

    let tx = ctx
        .state
        .tx
        .as_ref()
        .ok_or_else(|| ctx.fail("lock time checks need a transaction context"))?;
    let tx_lock = tx.lock_time().unwrap_or(0);

    let same_kind = (tx_lock < LOCKTIME_THRESHOLD) == (lock < LOCKTIME_THRESHOLD);
    if !same_kind {
        return Err(ctx.fail(format!(
            "lock time {} and transaction lock time {} are of different kinds",
            lock, tx_lock
        )));
    }
    if lock > tx_lock {
        return Err(ctx.fail(format!(
            "lock time {} not reached by transaction lock time {}",
            lock, tx_lock
        )));
    }

    let sequence = tx
        .inputs()
        .get(ctx.state.input_index)
        .map(|input| input.sequence)
        .ok_or_else(|| ctx.fail(format!("no input at index {}", ctx.state.input_index)))?;
    if sequence == SEQUENCE_FINAL {
        return Err(ctx.fail("input sequence is final, lock time is not enforced"));
    }

    Ok(format!(
        "{}: lock time {} satisfied by transaction lock time {}",
        ctx.name, lock, tx_lock
    ))
}

/// BIP65 at 0xb1; without the verification flag the value is still OP_NOP2
fn op_checklocktimeverify(ctx: &mut OpContext<'_>) -> Result<String> {
    if ctx.state.flags & VERIFY_CHECKLOCKTIMEVERIFY == 0 {
        return op_upgradable_nop(ctx);
    }
    verify_lock_time(ctx)
}

/// Clams repurposes OP_NOP1 as an unconditional lock time check
pub fn clams_checklocktimeverify(ctx: &mut OpContext<'_>) -> Result<String> {
    verify_lock_time(ctx)
}

//! Script evaluation
//!
//! The evaluator runs a script one operation at a time against an
//! [`EvaluationState`]:
//! 1. Parse the script into operations; a malformed push fails the run
//! 2. For each operation:
//!    - Count non-push opcodes against the operation limit
//!    - Inside an unexecuted branch, only conditionals are dispatched
//!    - Otherwise dispatch through the active opcode table
//!    - Check the combined stack size
//! 3. Succeed when every operation ran and all conditionals are closed
//!
//! A failure is stored in the state and stops the run; the stack stays as
//! it was when the failing operation gave up.

use std::sync::Arc;

use tracing::trace;

use crate::chainparams::ActiveParams;
use crate::constants::*;
use crate::error::{ChainParamsError, Result};
use crate::opcode_table::{OpContext, OpcodeTable};
use crate::opcodes::*;
use crate::script::{cast_to_bool, Script, ScriptOp};
use crate::transaction::Transaction;
use crate::types::ByteString;

#[derive(Debug, Clone, Default)]
pub struct EvaluationState {
    pub stack: Vec<ByteString>,
    pub alt_stack: Vec<ByteString>,
    /// One entry per open `OP_IF`/`OP_NOTIF`: whether its branch runs
    pub cond_stack: Vec<bool>,
    pub flags: u32,
    pub input_index: usize,
    /// Spending transaction, needed by signature and lock time checks
    pub tx: Option<Transaction>,
    pub op_count: usize,
    /// Offset just past the last executed `OP_CODESEPARATOR`
    pub last_code_separator: usize,
    pub error: Option<ChainParamsError>,
}

impl EvaluationState {
    pub fn new(tx: Option<Transaction>, input_index: usize, flags: u32) -> Self {
        EvaluationState { tx, input_index, flags, ..Default::default() }
    }

    /// Whether every enclosing conditional branch is taken
    pub fn is_executing(&self) -> bool {
        self.cond_stack.iter().all(|taken| *taken)
    }
}

fn is_conditional(opcode: u8) -> bool {
    matches!(opcode, OP_IF | OP_NOTIF | OP_ELSE | OP_ENDIF)
}

/// Execute one operation, returning its log line.
///
/// `script` is the script the operation belongs to; signature checks hash
/// the part of it after the last code separator.
pub fn execute_opcode(
    state: &mut EvaluationState,
    op: &ScriptOp,
    table: &OpcodeTable,
    script: &Script,
) -> Result<String> {
    if op.opcode > OP_16 {
        state.op_count += 1;
        if state.op_count > MAX_SCRIPT_OPS {
            return Err(ChainParamsError::ScriptExecution(format!(
                "operation limit of {} exceeded",
                MAX_SCRIPT_OPS
            )));
        }
    }

    let overridden = table.overridden().contains(&op.opcode);
    if is_disabled(op.opcode) && !overridden {
        // disabled opcodes fail even inside unexecuted branches
        let name = table.name_of(op.opcode).unwrap_or("disabled opcode");
        return Err(ChainParamsError::ScriptExecution(format!("{}: disabled opcode", name)));
    }

    if let Some(data) = &op.data {
        if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(ChainParamsError::ScriptExecution(format!(
                "push of {} bytes exceeds {} bytes",
                data.len(),
                MAX_SCRIPT_ELEMENT_SIZE
            )));
        }
    }

    if !state.is_executing() && !is_conditional(op.opcode) {
        let name = table
            .name_of(op.opcode)
            .map(str::to_string)
            .unwrap_or_else(|| format!("OP_UNKNOWN_{:02x}", op.opcode));
        return Ok(format!("Skipped {} (unexecuted branch)", name));
    }

    let entry = table
        .get(op.opcode)
        .ok_or(ChainParamsError::UnknownOpcode(op.opcode))?;

    let mut ctx = OpContext { state: &mut *state, op, name: &entry.name, script };
    let log = (entry.handler)(&mut ctx)?;

    let depth = state.stack.len() + state.alt_stack.len();
    if depth > MAX_STACK_SIZE {
        return Err(ChainParamsError::ScriptExecution(format!(
            "stack size {} exceeds {}",
            depth, MAX_STACK_SIZE
        )));
    }
    Ok(log)
}

/// Record of one executed operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Position of the operation within the script
    pub index: usize,
    pub opcode: u8,
    pub name: String,
    /// Stack after the operation
    pub stack: Vec<ByteString>,
    /// Handler log line, or the failure message
    pub log: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Running,
    Success,
    Failed(ChainParamsError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Single-step script evaluator
pub struct Evaluator {
    script: Script,
    ops: Vec<ScriptOp>,
    params: Arc<ActiveParams>,
    state: EvaluationState,
    steps: Vec<Step>,
    position: usize,
    outcome: Outcome,
}

impl Evaluator {
    pub fn new(
        script: Script,
        params: Arc<ActiveParams>,
        tx: Option<&Transaction>,
        input_index: usize,
        flags: u32,
    ) -> Self {
        Self::with_state(script, params, EvaluationState::new(tx.cloned(), input_index, flags))
    }

    /// Continue from an existing state, e.g. the stack a scriptSig left behind.
    /// Only the main stack carries over; the alt stack starts empty.
    pub fn with_state(script: Script, params: Arc<ActiveParams>, mut state: EvaluationState) -> Self {
        state.alt_stack.clear();
        state.cond_stack.clear();
        state.op_count = 0;
        state.last_code_separator = 0;
        state.error = None;

        let parsed = if script.len() > MAX_SCRIPT_SIZE {
            Err(ChainParamsError::ScriptExecution(format!(
                "script of {} bytes exceeds {} bytes",
                script.len(),
                MAX_SCRIPT_SIZE
            )))
        } else {
            script.ops()
        };

        let (ops, outcome) = match parsed {
            Ok(ops) => (ops, Outcome::Running),
            Err(e) => {
                state.error = Some(e.clone());
                (Vec::new(), Outcome::Failed(e))
            }
        };

        Evaluator { script, ops, params, state, steps: Vec::new(), position: 0, outcome }
    }

    /// Execute the next operation. Returns `None` once the run has ended.
    pub fn step(&mut self) -> Option<&Step> {
        if self.outcome != Outcome::Running {
            return None;
        }

        let op = match self.ops.get(self.position) {
            Some(op) => op.clone(),
            None => {
                self.finish();
                return None;
            }
        };

        let table = self.params.opcode_table();
        let name = table
            .name_of(op.opcode)
            .map(str::to_string)
            .unwrap_or_else(|| format!("OP_UNKNOWN_{:02x}", op.opcode));

        let result = execute_opcode(&mut self.state, &op, table, &self.script);
        let log = match result {
            Ok(log) => log,
            Err(e) => {
                let log = e.to_string();
                self.state.error = Some(e.clone());
                self.outcome = Outcome::Failed(e);
                log
            }
        };
        trace!(index = self.position, opcode = op.opcode, name = %name, "{}", log);

        self.steps.push(Step {
            index: self.position,
            opcode: op.opcode,
            name,
            stack: self.state.stack.clone(),
            log,
        });
        self.position += 1;
        self.steps.last()
    }

    fn finish(&mut self) {
        if !self.state.cond_stack.is_empty() {
            let e = ChainParamsError::ScriptExecution("unbalanced conditional".to_string());
            self.state.error = Some(e.clone());
            self.outcome = Outcome::Failed(e);
        } else {
            self.outcome = Outcome::Success;
        }
    }

    /// Step until the run ends
    pub fn run(&mut self) -> &Outcome {
        while self.step().is_some() {}
        &self.outcome
    }

    pub fn state(&self) -> &EvaluationState {
        &self.state
    }

    pub fn into_state(self) -> EvaluationState {
        self.state
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn is_finished(&self) -> bool {
        self.outcome != Outcome::Running
    }
}

/// Run `script_sig`, then `script_pubkey` on the resulting stack.
///
/// Returns `Ok(true)` when both scripts complete and the top of the final
/// stack is true; a failing script is returned as its error.
pub fn verify_script(
    script_sig: &Script,
    script_pubkey: &Script,
    params: Arc<ActiveParams>,
    tx: Option<&Transaction>,
    input_index: usize,
    flags: u32,
) -> Result<bool> {
    // Execute scriptSig
    let mut sig_eval = Evaluator::new(script_sig.clone(), Arc::clone(&params), tx, input_index, flags);
    if let Outcome::Failed(e) = sig_eval.run() {
        return Err(e.clone());
    }

    // Execute scriptPubkey
    let mut pubkey_eval = Evaluator::with_state(script_pubkey.clone(), params, sig_eval.into_state());
    if let Outcome::Failed(e) = pubkey_eval.run() {
        return Err(e.clone());
    }

    // Final validation
    Ok(pubkey_eval
        .state()
        .stack
        .last()
        .map(|top| cast_to_bool(top))
        .unwrap_or(false))
}

//! Script evaluation limits and verification flags

/// Maximum script length
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum size of a single pushed stack element
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum combined size of main and alt stacks during script execution
pub const MAX_STACK_SIZE: usize = 1000;

/// Maximum number of non-push operations in a script
pub const MAX_SCRIPT_OPS: usize = 201;

/// Maximum number of public keys in OP_CHECKMULTISIG
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// Default byte length for numeric stack operands
pub const SCRIPT_NUM_SIZE: usize = 4;

/// Byte length accepted for lock time operands (BIP65)
pub const LOCKTIME_NUM_SIZE: usize = 5;

/// Lock time threshold: lock times below this are block heights
pub const LOCKTIME_THRESHOLD: i64 = 500_000_000;

/// Sequence number for final input
pub const SEQUENCE_FINAL: u32 = 0xffffffff;

/// No verification flags
pub const VERIFY_NONE: u32 = 0;

/// Treat 0xb1 as OP_CHECKLOCKTIMEVERIFY instead of OP_NOP2
pub const VERIFY_CHECKLOCKTIMEVERIFY: u32 = 1 << 0;

/// Fail on upgradable NOPs instead of ignoring them
pub const VERIFY_DISCOURAGE_UPGRADABLE_NOPS: u32 = 1 << 1;

/// Signature hash types
pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_NONE: u32 = 0x02;
pub const SIGHASH_SINGLE: u32 = 0x03;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

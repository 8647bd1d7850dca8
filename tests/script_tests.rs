//! Script evaluation under different presets

use std::sync::Arc;

use chainparams_vm::chainparams::{SchemaContext, BITCOIN, CLAMS, FREICOIN, PEERCOIN};
use chainparams_vm::constants::*;
use chainparams_vm::opcode_table::hash160;
use chainparams_vm::opcodes::*;
use chainparams_vm::templates::{known_templates, recognize};
use chainparams_vm::transaction::signature_hash;
use chainparams_vm::*;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

fn params(preset: &str) -> Arc<ActiveParams> {
    let mut ctx = SchemaContext::new();
    ctx.apply_preset(preset).unwrap();
    ctx.snapshot()
}

/// Spending transaction with one non-final input and the given lock time
fn spending_tx(params: &ActiveParams, lock_time: i64) -> Transaction {
    let mut tx = Transaction::new(params.tx_schema());
    tx.set("nLockTime", lock_time).unwrap();
    tx.set_inputs(vec![TransactionInput {
        prevout: OutPoint { hash: [7u8; 32], index: 0 },
        script_sig: vec![],
        sequence: 0,
    }])
    .unwrap();
    tx.set_outputs(vec![TransactionOutput { value: 1000, script_pubkey: vec![OP_1] }])
        .unwrap();
    tx
}

/// 100 OP_NOP1 (0xb0)
const LOCK_SCRIPT: [u8; 3] = [0x01, 0x64, OP_NOP1];

#[test]
fn test_clams_override_runs_lock_time_check() {
    let params = params(CLAMS);
    let tx = spending_tx(&params, 200);
    let mut eval = Evaluator::new(Script::from_bytes(&LOCK_SCRIPT), params, Some(&tx), 0, VERIFY_NONE);

    assert!(eval.run().is_success());
    let step = &eval.steps()[1];
    assert_eq!(step.name, "OP_CHECKLOCKTIMEVERIFY");
    assert_eq!(
        step.log,
        "OP_CHECKLOCKTIMEVERIFY: lock time 100 satisfied by transaction lock time 200"
    );
}

#[test]
fn test_clams_override_rejects_unreached_lock_time() {
    let params = params(CLAMS);
    let tx = spending_tx(&params, 50);
    let mut eval = Evaluator::new(Script::from_bytes(&LOCK_SCRIPT), params, Some(&tx), 0, VERIFY_NONE);
    assert!(matches!(eval.run(), Outcome::Failed(ChainParamsError::ScriptExecution(_))));
    // the lock time stays on the stack for inspection
    assert_eq!(eval.state().stack, vec![vec![0x64]]);
}

#[test]
fn test_bitcoin_restores_base_behavior() {
    let mut ctx = SchemaContext::new();
    ctx.apply_preset(CLAMS).unwrap();
    let clams = ctx.snapshot();
    ctx.apply_preset(BITCOIN).unwrap();
    let bitcoin = ctx.snapshot();

    let tx = spending_tx(&bitcoin, 50);
    let mut eval = Evaluator::new(Script::from_bytes(&LOCK_SCRIPT), bitcoin, Some(&tx), 0, VERIFY_NONE);
    assert!(eval.run().is_success());
    assert_eq!(eval.steps()[1].name, "OP_NOP1");
    assert_eq!(eval.steps()[1].log, "OP_NOP1: no operation");

    // the earlier Clams snapshot keeps its override
    assert_eq!(clams.opcode_table().name_of(OP_NOP1), Some("OP_CHECKLOCKTIMEVERIFY"));
}

#[test]
fn test_bip65_only_with_flag() {
    let params = params(BITCOIN);
    let tx = spending_tx(&params, 50);
    let script = Script::from_bytes(&[0x01, 0x64, OP_CHECKLOCKTIMEVERIFY]);

    let mut lax = Evaluator::new(script.clone(), Arc::clone(&params), Some(&tx), 0, VERIFY_NONE);
    assert!(lax.run().is_success());

    let mut strict =
        Evaluator::new(script, params, Some(&tx), 0, VERIFY_CHECKLOCKTIMEVERIFY);
    assert!(!strict.run().is_success());
}

#[test]
fn test_human_text_follows_active_table() {
    let clams = params(CLAMS);
    let bitcoin = params(BITCOIN);
    let script = Script::from_bytes(&LOCK_SCRIPT);
    assert_eq!(
        script.to_human(clams.opcode_table()).unwrap(),
        "0x64 OP_CHECKLOCKTIMEVERIFY"
    );
    assert_eq!(script.to_human(bitcoin.opcode_table()).unwrap(), "0x64 OP_NOP1");

    let parsed = Script::from_human("0x64 OP_CHECKLOCKTIMEVERIFY", clams.opcode_table()).unwrap();
    assert_eq!(parsed, script);
}

#[test]
fn test_human_text_roundtrips_under_every_preset() {
    for preset in [BITCOIN, CLAMS, FREICOIN, PEERCOIN] {
        let params = params(preset);
        let table = params.opcode_table();
        for value in std::iter::once(OP_0).chain(OP_1NEGATE..=0xb9) {
            let script = Script::from_bytes(&[value]);
            let text = script.to_human(table).unwrap();
            let back = Script::from_human(&text, table).unwrap();
            assert_eq!(back, script, "{} renders 0x{:02x} as '{}'", preset, value, text);
        }

        let mut pushes = Script::new();
        pushes.push_data(&[0xab; 3]);
        pushes.push_data(&[0xcd; 80]);
        pushes.push_opcode(OP_CHECKLOCKTIMEVERIFY);
        let text = pushes.to_human(table).unwrap();
        assert_eq!(Script::from_human(&text, table).unwrap(), pushes, "{}", preset);
    }
}

#[test]
fn test_clams_renders_base_lock_time_opcode_as_nop2() {
    let clams = params(CLAMS);
    let script = Script::from_bytes(&[0x01, 0x64, OP_CHECKLOCKTIMEVERIFY]);
    let text = script.to_human(clams.opcode_table()).unwrap();
    assert_eq!(text, "0x64 OP_NOP2");
    assert_eq!(Script::from_human(&text, clams.opcode_table()).unwrap(), script);
}

#[test]
fn test_p2pkh_recognized_with_recipient() {
    let params = params(BITCOIN);
    let table = params.opcode_table();
    let text = "OP_DUP OP_HASH160 0xAABBCCDDEEFF00112233445566778899AABBCCDD OP_EQUALVERIFY OP_CHECKSIG";
    let script = Script::from_human(text, table).unwrap();
    assert!(script.is_p2pkh());

    let found = recognize(&script, &known_templates(), table).unwrap();
    assert_eq!(found.template.name, "Pay-To-Public-Key-Hash Output");
    assert_eq!(found.recipient(), Some("0xaabbccddeeff00112233445566778899aabbccdd"));
}

#[test]
fn test_step_by_step_log() {
    let params = params(BITCOIN);
    let script = Script::from_human("OP_2 OP_3 OP_ADD", params.opcode_table()).unwrap();
    let mut eval = Evaluator::new(script, params, None, 0, VERIFY_NONE);

    let mut stacks = Vec::new();
    while let Some(step) = eval.step() {
        stacks.push(step.stack.clone());
    }
    assert_eq!(stacks, vec![vec![vec![2]], vec![vec![2], vec![3]], vec![vec![5]]]);
    assert_eq!(eval.steps()[2].log, "OP_ADD: 2, 3 -> 5");
    assert_eq!(eval.outcome(), &Outcome::Success);
}

#[test]
fn test_p2pkh_spend_verifies() {
    let params = params(BITCOIN);
    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(&[0x11; 32]).unwrap();
    let pubkey = PublicKey::from_secret_key(&secp, &secret).serialize();

    let mut script_pubkey = Script::new();
    script_pubkey.push_opcode(OP_DUP);
    script_pubkey.push_opcode(OP_HASH160);
    script_pubkey.push_data(&hash160(&pubkey));
    script_pubkey.push_opcode(OP_EQUALVERIFY);
    script_pubkey.push_opcode(OP_CHECKSIG);

    let tx = spending_tx(&params, 0);
    let sighash = signature_hash(&tx, 0, script_pubkey.to_bytes(), SIGHASH_ALL).unwrap();
    let message = Message::from_digest_slice(&sighash).unwrap();
    let mut sig = secp.sign_ecdsa(&message, &secret).serialize_der().to_vec();
    sig.push(SIGHASH_ALL as u8);

    let mut script_sig = Script::new();
    script_sig.push_data(&sig);
    script_sig.push_data(&pubkey);

    assert!(verify_script(&script_sig, &script_pubkey, Arc::clone(&params), Some(&tx), 0, VERIFY_NONE).unwrap());

    // a signature over a different transaction does not verify
    let other = spending_tx(&params, 1);
    assert!(!verify_script(&script_sig, &script_pubkey, params, Some(&other), 0, VERIFY_NONE).unwrap());
}

#[test]
fn test_multisig_one_of_two() {
    let params = params(BITCOIN);
    let secp = Secp256k1::new();
    let first = SecretKey::from_slice(&[0x21; 32]).unwrap();
    let second = SecretKey::from_slice(&[0x22; 32]).unwrap();
    let pk1 = PublicKey::from_secret_key(&secp, &first).serialize();
    let pk2 = PublicKey::from_secret_key(&secp, &second).serialize();

    let mut script_pubkey = Script::new();
    script_pubkey.push_opcode(OP_1);
    script_pubkey.push_data(&pk1);
    script_pubkey.push_data(&pk2);
    script_pubkey.push_opcode(OP_2);
    script_pubkey.push_opcode(OP_CHECKMULTISIG);

    let tx = spending_tx(&params, 0);
    let sighash = signature_hash(&tx, 0, script_pubkey.to_bytes(), SIGHASH_ALL).unwrap();
    let message = Message::from_digest_slice(&sighash).unwrap();
    let mut sig = secp.sign_ecdsa(&message, &second).serialize_der().to_vec();
    sig.push(SIGHASH_ALL as u8);

    let mut script_sig = Script::new();
    script_sig.push_opcode(OP_0);
    script_sig.push_data(&sig);

    assert!(verify_script(&script_sig, &script_pubkey, params, Some(&tx), 0, VERIFY_NONE).unwrap());
}

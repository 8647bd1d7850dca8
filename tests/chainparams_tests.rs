//! Registry behavior: preset switching, schema capture, migration

use std::sync::Arc;

use anyhow::Result;
use chainparams_vm::chainparams::{self, SchemaContext, BITCOIN, CLAMS, FREICOIN, PEERCOIN};
use chainparams_vm::schema::SchemaKind;
use chainparams_vm::*;

#[test]
fn test_entities_keep_their_schema_across_presets() -> Result<()> {
    let mut ctx = SchemaContext::new();
    let before = Transaction::new(ctx.snapshot().tx_schema());
    let before_hex = before.to_hex()?;

    ctx.apply_preset(CLAMS)?;
    let after = Transaction::new(ctx.snapshot().tx_schema());

    // the old instance still uses the Bitcoin layout
    assert_eq!(before.to_hex()?, before_hex);
    assert!(!before.schema().contains("ClamSpeech"));
    assert!(after.schema().contains("ClamSpeech"));
    assert_eq!(after.to_bytes()?.len(), 15);
    Ok(())
}

#[test]
fn test_apply_preset_sets_all_three_schemas() -> Result<()> {
    let mut ctx = SchemaContext::new();
    ctx.apply_preset(CLAMS)?;
    assert!(ctx.get_schema(SchemaKind::Transaction).contains("Timestamp"));
    assert!(ctx.get_schema(SchemaKind::BlockBody).contains("blockSig"));
    assert_eq!(ctx.get_schema(SchemaKind::BlockHeader).min_length(), 80);

    ctx.apply_preset(BITCOIN)?;
    assert!(!ctx.get_schema(SchemaKind::Transaction).contains("Timestamp"));
    assert!(!ctx.get_schema(SchemaKind::BlockBody).contains("blockSig"));
    Ok(())
}

#[test]
fn test_with_schema_keeps_shared_values() -> Result<()> {
    let ctx = SchemaContext::new();
    let bitcoin = ctx.preset(BITCOIN).unwrap();
    let peercoin = ctx.preset(PEERCOIN).unwrap();

    let mut tx = Transaction::new(Arc::clone(&bitcoin.tx_schema));
    tx.set("nVersion", 2i64)?;
    tx.set("nLockTime", 600_000i64)?;
    tx.set_outputs(vec![TransactionOutput { value: 42, script_pubkey: vec![0x51] }])?;

    let moved = tx.with_schema(Arc::clone(&peercoin.tx_schema));
    assert_eq!(moved.get_int("nVersion"), Some(2));
    assert_eq!(moved.get_int("nLockTime"), Some(600_000));
    assert_eq!(moved.get_int("Timestamp"), Some(0));
    assert_eq!(moved.outputs(), tx.outputs());
    assert_eq!(moved, tx);
    Ok(())
}

#[test]
fn test_migration_keeps_dormant_values() -> Result<()> {
    let ctx = SchemaContext::new();
    let bitcoin = ctx.preset(BITCOIN).unwrap();
    let freicoin = ctx.preset(FREICOIN).unwrap();

    let mut tx = Transaction::new(Arc::clone(&freicoin.tx_schema));
    tx.set("RefHeight", 1234i64)?;

    let as_bitcoin = tx.clone().migrate(Arc::clone(&bitcoin.tx_schema));
    assert_eq!(as_bitcoin.get("RefHeight"), None);
    assert_eq!(as_bitcoin.to_bytes()?.len(), 10);

    let back = as_bitcoin.migrate(Arc::clone(&freicoin.tx_schema));
    assert_eq!(back.get_int("RefHeight"), Some(1234));
    assert_eq!(back, tx);
    Ok(())
}

#[test]
fn test_block_with_params_rebinds_header_and_body() -> Result<()> {
    let mut ctx = SchemaContext::new();
    let bitcoin = ctx.snapshot();
    let mut block = Block::new(&bitcoin);
    block.header_mut().set("nNonce", 7i64)?;
    let mut tx = Transaction::new(bitcoin.tx_schema());
    tx.set("nLockTime", 99i64)?;
    block.set_transactions(vec![tx])?;

    ctx.apply_preset(CLAMS)?;
    let clams = ctx.snapshot();
    let rebound = block.with_params(&clams);
    assert_eq!(rebound.header().get_int("nNonce"), Some(7));
    assert_eq!(rebound.get("blockSig"), Some(&Value::Bytes(vec![])));
    assert_eq!(block.get("blockSig"), None);

    // nested transactions follow the new layout too
    let nested = &rebound.transactions()[0];
    assert!(nested.schema().contains("ClamSpeech"));
    assert_eq!(nested.get_int("nLockTime"), Some(99));
    assert!(!block.transactions()[0].schema().contains("ClamSpeech"));

    let decoded = Block::from_bytes(&rebound.to_bytes()?, &clams)?;
    assert_eq!(decoded, rebound);
    assert_eq!(decoded.transactions()[0].get_int("nLockTime"), Some(99));
    Ok(())
}

#[test]
fn test_unknown_preset_is_reported() {
    let mut ctx = SchemaContext::new();
    assert_eq!(
        ctx.apply_preset("Namecoin"),
        Err(ChainParamsError::UnknownPreset("Namecoin".to_string()))
    );
    assert_eq!(ctx.active_preset(), Some(BITCOIN));
}

#[test]
fn test_snapshot_is_unaffected_by_later_switches() -> Result<()> {
    let mut ctx = SchemaContext::new();
    let snapshot = ctx.snapshot();
    ctx.apply_preset(FREICOIN)?;
    assert_eq!(snapshot.preset_name(), Some(BITCOIN));
    assert!(!snapshot.tx_schema().contains("RefHeight"));
    assert_eq!(ctx.snapshot().preset_name(), Some(FREICOIN));
    Ok(())
}

#[test]
fn test_global_context() -> Result<()> {
    // the only test touching the process-wide context
    chainparams::set_to_preset(PEERCOIN)?;
    assert_eq!(chainparams::global().preset_name(), Some(PEERCOIN));
    assert!(chainparams::set_to_preset("Nope").is_err());
    assert_eq!(chainparams::global().preset_name(), Some(PEERCOIN));

    let names = chainparams::with_global(|ctx| ctx.list_presets());
    assert_eq!(names, vec!["Bitcoin", "Clams", "Freicoin", "Peercoin"]);
    chainparams::set_to_preset(BITCOIN)?;
    Ok(())
}

const EXAMPLE_PRESET: &str = r#"{
    "name": "Examplecoin",
    "tx_fields": [
        {"name": "nVersion", "format": "<i", "num_bytes": 4, "default": 1},
        {"name": "nTime", "format": "<I", "num_bytes": 4, "default": 0},
        {"name": "vin", "format": "inputs"},
        {"name": "vout", "format": "outputs"},
        {"name": "nLockTime", "format": "<I", "num_bytes": 4, "default": 0}
    ],
    "block_fields": [
        {"name": "vtx", "format": "vectortx"},
        {"name": "signature", "format": "bytes"}
    ],
    "opcode_overrides": [
        {"value": 176, "name": "OP_CHECKLOCKTIMEVERIFY", "handler": "clams_checklocktimeverify"}
    ]
}"#;

#[test]
fn test_json_preset_definition() -> Result<()> {
    let mut ctx = SchemaContext::new();
    let name = ctx.register_preset_json(EXAMPLE_PRESET)?;
    assert_eq!(name, "Examplecoin");
    ctx.apply_preset(&name)?;

    let params = ctx.snapshot();
    let tx = Transaction::new(params.tx_schema());
    assert_eq!(tx.to_hex()?, "0100000000000000000000000000");
    assert!(params.body_schema().contains("signature"));
    assert_eq!(params.opcode_table().name_of(0xb0), Some("OP_CHECKLOCKTIMEVERIFY"));
    Ok(())
}

#[test]
fn test_preset_file() -> Result<()> {
    let path = std::env::temp_dir().join(format!("chainparams-vm-preset-{}.json", std::process::id()));
    std::fs::write(&path, EXAMPLE_PRESET)?;

    let mut ctx = SchemaContext::new();
    let loaded = ctx.load_preset_file(&path);
    std::fs::remove_file(&path)?;
    assert_eq!(loaded?, "Examplecoin");
    assert!(ctx.list_presets().contains(&"Examplecoin".to_string()));

    let missing = ctx.load_preset_file(path.with_extension("missing"));
    assert!(missing.is_err());
    Ok(())
}

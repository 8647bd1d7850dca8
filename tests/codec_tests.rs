//! Wire format tests across the built-in presets

use std::sync::Arc;

use chainparams_vm::chainparams::{SchemaContext, BITCOIN, CLAMS, FREICOIN, PEERCOIN};
use chainparams_vm::schema::{FieldSpec, Schema, SchemaKind};
use chainparams_vm::*;
use proptest::prelude::*;

const PRESETS: [&str; 4] = [BITCOIN, CLAMS, FREICOIN, PEERCOIN];

fn params(preset: &str) -> Arc<ActiveParams> {
    let mut ctx = SchemaContext::new();
    ctx.apply_preset(preset).unwrap();
    ctx.snapshot()
}

#[test]
fn test_empty_bitcoin_transaction() {
    let params = params(BITCOIN);
    let tx = Transaction::from_hex("01000000000000000000", &params.tx_schema()).unwrap();

    assert_eq!(tx.get_int("nVersion"), Some(1));
    assert_eq!(tx.get("vin"), Some(&Value::Inputs(vec![])));
    assert_eq!(tx.get("vout"), Some(&Value::Outputs(vec![])));
    assert_eq!(tx.get_int("nLockTime"), Some(0));
    assert_eq!(tx.to_hex().unwrap(), "01000000000000000000");
}

#[test]
fn test_real_bitcoin_transaction() {
    // First bitcoin transfer (block 170)
    let hex = "0100000001c997a5e56e104102fa209c6a852dd90660a20b2d9c352423edce25857fcd3704000000004847304402204e45e16932b8af514961a1d3a1a25fdf3f4f7732e9d624c6c61548ab5fb8cd410220181522ec8eca07de4860a4acdd12909d831cc56cbbac4622082221a8768d1d0901ffffffff0200ca9a3b00000000434104ae1a62fe09c5f51b13905f07f06b99a2f7159b2225f374cd378d71302fa28414e7aab37397f554a7df5f142c21c1b7303b8a0626f1baded5c72a704f7e6cd84cac00286bee0000000043410411db93e1dcdb8a016b49840f8c53bc1eb68a382e97b1482ecad7b148a6909a5cb2e0eaddfb84ccf9744464f82e160bfa9b8b64f9d4c03f999b8643f656b412a3ac00000000";
    let params = params(BITCOIN);
    let tx = Transaction::from_hex(hex, &params.tx_schema()).unwrap();

    assert_eq!(tx.inputs().len(), 1);
    assert_eq!(tx.outputs().len(), 2);
    assert_eq!(tx.outputs()[0].value, 1_000_000_000);
    assert_eq!(tx.outputs()[1].value, 4_000_000_000);
    assert_eq!(tx.inputs()[0].sequence, 0xffff_ffff);
    assert_eq!(
        tx.txid_hex().unwrap(),
        "f4184fc596403b9d638783cf57adfe4c75c605f6356fbc91338530e9831e9e16"
    );
    assert_eq!(tx.to_hex().unwrap(), hex);
}

#[test]
fn test_truncated_input_for_every_preset() {
    for preset in PRESETS {
        let params = params(preset);
        let schema = params.tx_schema();
        let full = Transaction::new(Arc::clone(&schema)).to_bytes().unwrap();
        assert_eq!(full.len(), schema.min_length(), "{}", preset);

        for cut in 0..full.len() {
            let result = Transaction::from_bytes(&full[..cut], &schema);
            assert!(
                matches!(result, Err(ChainParamsError::TruncatedInput { .. })),
                "{} cut at {}: {:?}",
                preset,
                cut,
                result
            );
        }
    }
}

#[test]
fn test_input_count_larger_than_buffer() {
    let params = params(BITCOIN);
    // version, then a claimed 0xfd00ff inputs with nothing behind them
    let bytes = [1, 0, 0, 0, 0xfd, 0x00, 0xff];
    assert!(matches!(
        Transaction::from_bytes(&bytes, &params.tx_schema()),
        Err(ChainParamsError::TruncatedInput { .. })
    ));
}

#[test]
fn test_preset_transaction_sizes() {
    let sizes: Vec<usize> = PRESETS
        .iter()
        .map(|p| Transaction::new(params(p).tx_schema()).to_bytes().unwrap().len())
        .collect();
    // Clams adds a timestamp and an empty speech blob
    assert_eq!(sizes, vec![10, 15, 14, 14]);
}

#[test]
fn test_clams_block_roundtrip() {
    let params = params(CLAMS);
    let mut tx = Transaction::new(params.tx_schema());
    tx.set("Timestamp", 1_400_000_000i64).unwrap();
    tx.set("ClamSpeech", b"hello".to_vec()).unwrap();

    let mut block = Block::new(&params);
    block.header_mut().set("nTime", 1_400_000_001i64).unwrap();
    block.set_transactions(vec![tx.clone()]).unwrap();
    block.set("blockSig", vec![0x30, 0x01, 0x02]).unwrap();

    let bytes = block.to_bytes().unwrap();
    let decoded = Block::from_bytes(&bytes, &params).unwrap();
    assert_eq!(decoded, block);
    assert_eq!(decoded.transactions()[0], tx);
    assert_eq!(decoded.get("blockSig"), Some(&Value::Bytes(vec![0x30, 0x01, 0x02])));
    assert_eq!(decoded.to_bytes().unwrap(), bytes);
}

#[test]
fn test_integer_overflow_on_encode() {
    let params = params(BITCOIN);
    let mut tx = Transaction::new(params.tx_schema());
    tx.set("nLockTime", -1i64).unwrap();
    assert!(matches!(
        tx.to_bytes(),
        Err(ChainParamsError::IntegerOverflow { width: 4, .. })
    ));

    tx.set("nLockTime", 1i64 << 32).unwrap();
    assert!(matches!(tx.to_bytes(), Err(ChainParamsError::IntegerOverflow { .. })));
}

#[test]
fn test_unsigned_64_bit_above_i64_max() {
    let schema = Arc::new(
        Schema::new(vec![FieldSpec::from_format("nAmount", "<Q", Some(8), None).unwrap()]).unwrap(),
    );
    let too_big = [0xff; 8];
    assert!(matches!(
        Transaction::from_bytes(&too_big, &schema),
        Err(ChainParamsError::IntegerOverflow { .. })
    ));

    let max = i64::MAX.to_le_bytes();
    let tx = Transaction::from_bytes(&max, &schema).unwrap();
    assert_eq!(tx.get_int("nAmount"), Some(i64::MAX));
}

#[test]
fn test_big_endian_and_narrow_fields() {
    let schema = Arc::new(
        Schema::new(vec![
            FieldSpec::from_format("magic", ">I", Some(4), None).unwrap(),
            FieldSpec::from_format("flags", "<H", Some(2), None).unwrap(),
            FieldSpec::from_format("delta", "<b", Some(1), None).unwrap(),
        ])
        .unwrap(),
    );
    let tx = Transaction::from_hex("f9beb4d90100ff", &schema).unwrap();
    assert_eq!(tx.get_int("magic"), Some(0xf9beb4d9));
    assert_eq!(tx.get_int("flags"), Some(1));
    assert_eq!(tx.get_int("delta"), Some(-1));
    assert_eq!(tx.to_hex().unwrap(), "f9beb4d90100ff");
}

#[test]
fn test_custom_schema_via_context() {
    let mut ctx = SchemaContext::new();
    let mut fields = ctx.get_schema(SchemaKind::Transaction).fields().to_vec();
    fields.push(FieldSpec::from_format("Memo", "bytes", None, None).unwrap());
    ctx.set_schema(SchemaKind::Transaction, Schema::new(fields).unwrap());

    let params = ctx.snapshot();
    let mut tx = Transaction::new(params.tx_schema());
    tx.set("Memo", vec![0xaa]).unwrap();
    assert_eq!(tx.to_hex().unwrap(), "0100000000000000000001aa");
}

fn arb_input() -> impl Strategy<Value = TransactionInput> {
    (
        any::<[u8; 32]>(),
        any::<u32>(),
        prop::collection::vec(any::<u8>(), 0..80),
        any::<u32>(),
    )
        .prop_map(|(hash, index, script_sig, sequence)| TransactionInput {
            prevout: OutPoint { hash, index },
            script_sig,
            sequence,
        })
}

fn arb_output() -> impl Strategy<Value = TransactionOutput> {
    (any::<i64>(), prop::collection::vec(any::<u8>(), 0..80))
        .prop_map(|(value, script_pubkey)| TransactionOutput { value, script_pubkey })
}

proptest! {
    #[test]
    fn prop_transaction_roundtrip(
        preset in 0usize..4,
        version in any::<i32>(),
        timestamp in any::<i32>(),
        ref_height in any::<i32>(),
        lock_time in any::<u32>(),
        speech in prop::collection::vec(any::<u8>(), 0..300),
        inputs in prop::collection::vec(arb_input(), 0..4),
        outputs in prop::collection::vec(arb_output(), 0..4),
    ) {
        let params = params(PRESETS[preset]);
        let schema = params.tx_schema();
        let mut tx = Transaction::new(Arc::clone(&schema));
        tx.set("nVersion", version as i64).unwrap();
        tx.set("nLockTime", lock_time as i64).unwrap();
        tx.set_inputs(inputs).unwrap();
        tx.set_outputs(outputs).unwrap();
        if schema.contains("Timestamp") {
            tx.set("Timestamp", timestamp as i64).unwrap();
        }
        if schema.contains("RefHeight") {
            tx.set("RefHeight", ref_height as i64).unwrap();
        }
        if schema.contains("ClamSpeech") {
            tx.set("ClamSpeech", speech).unwrap();
        }

        let bytes = tx.to_bytes().unwrap();
        let decoded = Transaction::from_bytes(&bytes, &schema).unwrap();
        prop_assert_eq!(&decoded, &tx);
        prop_assert_eq!(decoded.to_bytes().unwrap(), bytes);
    }
}

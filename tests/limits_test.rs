use proptest::prelude::*;
use tars_codec::{
    decode_generic, decode_trace, encode_generic, probe_struct, CodecError, DecodeOptions,
    EncodeOptions, FieldDescriptor, FieldKind, IntWidth, Limits, SchemaRegistry, StructDescriptor,
    StructMap, TarsValue,
};

fn struct_of(fields: Vec<(u8, TarsValue)>) -> TarsValue {
    TarsValue::Struct(fields.into_iter().collect::<StructMap>())
}

// =============================================================================
// Depth limits
// =============================================================================

#[test]
fn test_struct_depth_bomb_is_rejected() {
    let bytes = vec![0x0A; 1_000_000];
    let err = decode_generic(&bytes, &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::DepthExceeded { limit: 100, .. }));
}

#[test]
fn test_list_depth_bomb_is_rejected() {
    // Each level: a list of length 1 whose element is the next list.
    let mut bytes = Vec::new();
    for _ in 0..200 {
        bytes.extend([0x09, 0x00, 0x01]);
    }
    bytes.push(0x0C);
    let err = decode_generic(&bytes, &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::DepthExceeded { .. }));
}

#[test]
fn test_skip_path_enforces_depth_limit_too() {
    // Unknown deeply-nested field must not blow the stack while being
    // skipped.
    let registry = SchemaRegistry::new();
    let id = registry
        .register(
            StructDescriptor::new("Tiny")
                .field(FieldDescriptor::new("v", 0, FieldKind::Int(IntWidth::W64))),
        )
        .unwrap();

    let mut bytes = encode_generic(
        &struct_of(vec![(0, TarsValue::Int(1))]),
        &EncodeOptions::default(),
    )
    .unwrap()
    .to_vec();
    // Unknown tag 5 carrying a struct tower.
    bytes.push(0x5A);
    bytes.extend(std::iter::repeat(0x0A).take(500));

    let err = registry.decode(&bytes, id, &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::DepthExceeded { .. }));
}

#[test]
fn test_encode_depth_limit_guards_recursive_values() {
    // A thousand-deep list value against a ten-deep limit.
    let mut value = TarsValue::List(vec![TarsValue::Int(1)]);
    for _ in 0..1000 {
        value = TarsValue::List(vec![value]);
    }
    let options = EncodeOptions {
        limits: Limits::with_max_depth(10),
        ..EncodeOptions::default()
    };
    let err = encode_generic(&struct_of(vec![(0, value)]), &options).unwrap_err();
    assert!(matches!(err, CodecError::DepthExceeded { limit: 10, .. }));
}

// =============================================================================
// Declared-length safety
// =============================================================================

#[test]
fn test_huge_declared_string_is_rejected_before_allocation() {
    // String4 claiming ~4 GiB.
    let data = [0x07, 0xFF, 0xFF, 0xFF, 0xFF];
    let err = decode_generic(&data, &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::LimitExceeded { .. }));
}

#[test]
fn test_string_longer_than_remaining_buffer_is_truncated_error() {
    let data = [0x06, 0x10, b'a', b'b'];
    let err = decode_generic(&data, &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::Truncated { .. }));
}

#[test]
fn test_huge_declared_list_is_rejected() {
    // List claiming i32::MAX elements.
    let data = [0x09, 0x02, 0x7F, 0xFF, 0xFF, 0xFF];
    let err = decode_generic(&data, &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::LimitExceeded { .. }));
}

#[test]
fn test_list_longer_than_remaining_buffer_is_truncated_error() {
    // 1000 declared elements, 2 bytes of payload.
    let data = [0x09, 0x01, 0x03, 0xE8, 0x0C, 0x0C];
    let err = decode_generic(&data, &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::Truncated { .. }));
}

#[test]
fn test_negative_container_length_is_rejected() {
    // List with length -1 (Int1 0xFF).
    let data = [0x09, 0x00, 0xFF];
    let err = decode_generic(&data, &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::Validation { .. }));
}

#[test]
fn test_map_pair_count_is_bounded_by_remaining_bytes() {
    let data = [0x08, 0x01, 0x40, 0x00, 0x0C, 0x1C];
    let err = decode_generic(&data, &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::Truncated { .. }));
}

#[test]
fn test_simple_list_length_is_checked() {
    // SimpleList claiming 100 bytes with 2 present.
    let data = [0x0D, 0x00, 0x00, 0x64, 0x01, 0x02];
    let err = decode_generic(&data, &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::Truncated { .. }));
}

#[test]
fn test_custom_container_limit_applies() {
    let bytes = encode_generic(
        &struct_of(vec![(
            0,
            TarsValue::List((0..50i64).map(TarsValue::Int).collect()),
        )]),
        &EncodeOptions::default(),
    )
    .unwrap();

    let options = DecodeOptions {
        limits: Limits {
            max_container_len: 10,
            ..Limits::default()
        },
        ..DecodeOptions::default()
    };
    let err = decode_generic(&bytes, &options).unwrap_err();
    assert!(matches!(
        err,
        CodecError::LimitExceeded {
            declared: 50,
            limit: 10,
            ..
        }
    ));
}

// =============================================================================
// Truncation mid-value
// =============================================================================

#[test]
fn test_truncated_scalars_error_cleanly() {
    for data in [
        &[0x01, 0x00][..],       // Int2 with one payload byte
        &[0x02, 0x00, 0x00][..], // Int4 with three
        &[0x03][..],             // Int8 with none
        &[0x05, 0x00][..],       // Double with one
        &[0xF0][..],             // two-byte head cut short
    ] {
        let err = decode_generic(data, &DecodeOptions::default()).unwrap_err();
        assert!(
            matches!(err, CodecError::Truncated { .. }),
            "expected Truncated for {data:?}, got {err:?}"
        );
    }
}

// =============================================================================
// Random input robustness
// =============================================================================

proptest! {
    #[test]
    fn test_decode_generic_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode_generic(&data, &DecodeOptions::default());
    }

    #[test]
    fn test_probe_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = probe_struct(&data, &Limits::default());
    }

    #[test]
    fn test_trace_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode_trace(&data, None, &Limits::default());
    }

    #[test]
    fn test_round_trip_random_int_structs(values in proptest::collection::btree_map(any::<u8>(), any::<i64>(), 0..16)) {
        let map: StructMap = values
            .into_iter()
            .map(|(tag, v)| (tag, TarsValue::Int(v)))
            .collect();
        let value = TarsValue::Struct(map);
        let bytes = encode_generic(&value, &EncodeOptions::default()).unwrap();
        let back = decode_generic(&bytes, &DecodeOptions::default()).unwrap();
        prop_assert_eq!(back, value);
    }
}

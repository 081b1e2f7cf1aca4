use std::collections::BTreeSet;
use std::sync::Arc;

use tars_codec::{
    decode_generic, encode_generic, CodecError, DecodeOptions, EncodeOptions, FieldConstraints,
    FieldDescriptor, FieldKind, IntWidth, SchemaError, SchemaRef, SchemaRegistry, StructDescriptor,
    StructMap, TarsValue,
};

fn user_schema() -> StructDescriptor {
    StructDescriptor::new("User")
        .field(FieldDescriptor::new("uid", 0, FieldKind::Int(IntWidth::W64)))
        .field(FieldDescriptor::new("name", 1, FieldKind::Str))
}

fn encode_tags(fields: Vec<(u8, TarsValue)>) -> Vec<u8> {
    let map: StructMap = fields.into_iter().collect();
    encode_generic(&TarsValue::Struct(map), &EncodeOptions::default())
        .unwrap()
        .to_vec()
}

// =============================================================================
// Registration
// =============================================================================

#[test]
fn test_register_and_round_trip_basic_struct() {
    let registry = SchemaRegistry::new();
    let user = registry.register(user_schema()).unwrap();

    let mut record = registry.new_record(user).unwrap();
    record.set("uid", 42i64).unwrap();
    record.set("name", "Bob").unwrap();

    let bytes = registry.encode(&record, &EncodeOptions::default()).unwrap();
    let decoded = registry
        .decode(&bytes, user, &DecodeOptions::default())
        .unwrap();
    assert_eq!(decoded, record);
    assert_eq!(decoded.get("uid").and_then(|v| v.as_int()), Some(42));
    assert_eq!(decoded.get_tag(1).and_then(|v| v.as_str()), Some("Bob"));
    assert_eq!(decoded.schema_name(), "User");
}

#[test]
fn test_duplicate_tag_is_a_registration_error() {
    let registry = SchemaRegistry::new();
    let err = registry
        .register(
            StructDescriptor::new("Broken")
                .field(FieldDescriptor::new("a", 3, FieldKind::Str))
                .field(FieldDescriptor::new("b", 3, FieldKind::Str)),
        )
        .unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateTag { tag: 3, .. }));
}

#[test]
fn test_duplicate_field_name_is_a_registration_error() {
    let registry = SchemaRegistry::new();
    let err = registry
        .register(
            StructDescriptor::new("Broken")
                .field(FieldDescriptor::new("a", 0, FieldKind::Str))
                .field(FieldDescriptor::new("a", 1, FieldKind::Str)),
        )
        .unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateName { .. }));
}

#[test]
fn test_tag_256_is_out_of_range() {
    let registry = SchemaRegistry::new();
    let err = registry
        .register(
            StructDescriptor::new("Broken")
                .field(FieldDescriptor::new("a", 256, FieldKind::Str)),
        )
        .unwrap_err();
    assert!(matches!(err, SchemaError::TagOutOfRange { tag: 256, .. }));
}

#[test]
fn test_invalid_pattern_is_a_registration_error() {
    let registry = SchemaRegistry::new();
    let err = registry
        .register(
            StructDescriptor::new("Broken").field(
                FieldDescriptor::new("a", 0, FieldKind::Str).with_constraints(
                    FieldConstraints {
                        pattern: Some("[unclosed".into()),
                        ..FieldConstraints::default()
                    },
                ),
            ),
        )
        .unwrap_err();
    assert!(matches!(err, SchemaError::InvalidPattern { .. }));
}

#[test]
fn test_declared_but_undefined_schema_fails_on_use() {
    let registry = SchemaRegistry::new();
    let pending = registry.declare("Pending");
    let err = registry.new_record(pending).unwrap_err();
    assert!(matches!(err, SchemaError::Undefined { .. }));
}

#[test]
fn test_define_twice_is_rejected() {
    let registry = SchemaRegistry::new();
    let id = registry.register(user_schema()).unwrap();
    let err = registry.define(id, user_schema()).unwrap_err();
    assert!(matches!(err, SchemaError::AlreadyDefined { .. }));
}

// =============================================================================
// Defaults and required fields
// =============================================================================

#[test]
fn test_unset_slot_with_default_materialises_the_default() {
    let registry = SchemaRegistry::new();
    let id = registry
        .register(
            StructDescriptor::new("WithDefault")
                .field(FieldDescriptor::new("uid", 0, FieldKind::Int(IntWidth::W64)))
                .field(
                    FieldDescriptor::new("name", 1, FieldKind::Str)
                        .with_default(TarsValue::Str("anonymous".into())),
                ),
        )
        .unwrap();

    // Wire carries only tag 0.
    let bytes = encode_tags(vec![(0, TarsValue::Int(7))]);
    let decoded = registry.decode(&bytes, id, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get("uid").and_then(|v| v.as_int()), Some(7));
    assert_eq!(
        decoded.get("name").and_then(|v| v.as_str()),
        Some("anonymous")
    );
}

#[test]
fn test_containers_default_to_empty() {
    let registry = SchemaRegistry::new();
    let id = registry
        .register(
            StructDescriptor::new("WithContainers")
                .field(FieldDescriptor::new(
                    "items",
                    0,
                    FieldKind::List(Box::new(FieldKind::Int(IntWidth::W32))),
                ))
                .field(FieldDescriptor::new(
                    "attrs",
                    1,
                    FieldKind::Map(Box::new(FieldKind::Str), Box::new(FieldKind::Str)),
                )),
        )
        .unwrap();

    let decoded = registry.decode(&[], id, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get("items"), Some(&TarsValue::List(vec![])));
    assert_eq!(decoded.get("attrs"), Some(&TarsValue::Map(vec![])));
}

#[test]
fn test_missing_required_field_is_an_error() {
    let registry = SchemaRegistry::new();
    let id = registry.register(user_schema()).unwrap();

    let bytes = encode_tags(vec![(0, TarsValue::Int(7))]);
    let err = registry
        .decode(&bytes, id, &DecodeOptions::default())
        .unwrap_err();
    match err {
        CodecError::MissingRequired { field, tag, .. } => {
            assert_eq!(field, "name");
            assert_eq!(tag, 1);
        }
        other => panic!("expected MissingRequired, got {other:?}"),
    }
}

#[test]
fn test_encode_of_unset_required_field_is_an_error() {
    let registry = SchemaRegistry::new();
    let id = registry.register(user_schema()).unwrap();
    let record = registry.new_record(id).unwrap();
    let err = registry.encode(&record, &EncodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::MissingRequired { .. }));
}

#[test]
fn test_omit_defaults_skips_default_valued_fields() {
    let registry = SchemaRegistry::new();
    let id = registry
        .register(
            StructDescriptor::new("Sparse")
                .field(
                    FieldDescriptor::new("kind", 0, FieldKind::Int(IntWidth::W32))
                        .with_default(TarsValue::Int(0)),
                )
                .field(
                    FieldDescriptor::new("label", 1, FieldKind::Str)
                        .with_default(TarsValue::Str(String::new())),
                )
                .omit_defaults(true),
        )
        .unwrap();

    let mut record = registry.new_record(id).unwrap();
    record.set("kind", 0i64).unwrap();
    record.set("label", "").unwrap();
    let bytes = registry.encode(&record, &EncodeOptions::default()).unwrap();
    assert!(bytes.is_empty());

    // Defaults come back on decode.
    let decoded = registry.decode(&bytes, id, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get("kind").and_then(|v| v.as_int()), Some(0));
    assert_eq!(decoded.get("label").and_then(|v| v.as_str()), Some(""));

    // Non-default values are still written.
    record.set("label", "set").unwrap();
    let bytes = registry.encode(&record, &EncodeOptions::default()).unwrap();
    assert_eq!(bytes.as_ref(), [0x16, 0x03, b's', b'e', b't']);
}

// =============================================================================
// Schema evolution
// =============================================================================

#[test]
fn test_unknown_tags_are_skipped_by_default() {
    let registry = SchemaRegistry::new();
    let new_schema = registry
        .register(
            StructDescriptor::new("UserV2")
                .field(FieldDescriptor::new("uid", 0, FieldKind::Int(IntWidth::W64)))
                .field(FieldDescriptor::new("name", 1, FieldKind::Str))
                .field(FieldDescriptor::new(
                    "tags",
                    2,
                    FieldKind::List(Box::new(FieldKind::Str)),
                )),
        )
        .unwrap();
    let old_schema = registry
        .register(
            StructDescriptor::new("UserV1")
                .field(FieldDescriptor::new("uid", 0, FieldKind::Int(IntWidth::W64))),
        )
        .unwrap();

    let mut record = registry.new_record(new_schema).unwrap();
    record.set("uid", 1i64).unwrap();
    record.set("name", "Alice").unwrap();
    record
        .set("tags", TarsValue::List(vec![TarsValue::Str("a".into())]))
        .unwrap();
    let bytes = registry.encode(&record, &EncodeOptions::default()).unwrap();

    let decoded = registry
        .decode(&bytes, old_schema, &DecodeOptions::default())
        .unwrap();
    assert_eq!(decoded.get("uid").and_then(|v| v.as_int()), Some(1));
}

#[test]
fn test_forbid_unknown_rejects_extra_tags() {
    let registry = SchemaRegistry::new();
    let strict = registry
        .register(
            StructDescriptor::new("Strict")
                .field(FieldDescriptor::new("uid", 0, FieldKind::Int(IntWidth::W64)))
                .forbid_unknown(true),
        )
        .unwrap();

    let bytes = encode_tags(vec![(0, TarsValue::Int(1)), (9, TarsValue::Str("x".into()))]);
    let err = registry.decode(&bytes, strict, &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::UnknownTag { tag: 9, .. }));
}

#[test]
fn test_fields_decode_in_any_wire_order() {
    let registry = SchemaRegistry::new();
    let id = registry.register(user_schema()).unwrap();

    // Tag 1 before tag 0 on the wire.
    let mut out = Vec::new();
    out.extend(encode_tags(vec![(1, TarsValue::Str("Eve".into()))]));
    out.extend(encode_tags(vec![(0, TarsValue::Int(5))]));

    let decoded = registry.decode(&out, id, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get("uid").and_then(|v| v.as_int()), Some(5));
    assert_eq!(decoded.get("name").and_then(|v| v.as_str()), Some("Eve"));
}

#[test]
fn test_repeated_tag_is_rejected() {
    let registry = SchemaRegistry::new();
    let id = registry
        .register(
            StructDescriptor::new("One")
                .field(FieldDescriptor::new("v", 0, FieldKind::Int(IntWidth::W64))),
        )
        .unwrap();

    let mut bytes = encode_tags(vec![(0, TarsValue::Int(1))]);
    bytes.extend(encode_tags(vec![(0, TarsValue::Int(2))]));
    let err = registry.decode(&bytes, id, &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::DuplicateTag { tag: 0, .. }));
}

// =============================================================================
// Narrowing and mismatches
// =============================================================================

#[test]
fn test_integer_narrowing_rejects_out_of_range() {
    let registry = SchemaRegistry::new();
    let id = registry
        .register(
            StructDescriptor::new("Narrow")
                .field(FieldDescriptor::new("b", 0, FieldKind::Int(IntWidth::W8))),
        )
        .unwrap();

    let ok = encode_tags(vec![(0, TarsValue::Int(127))]);
    let decoded = registry.decode(&ok, id, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get("b").and_then(|v| v.as_int()), Some(127));

    let too_big = encode_tags(vec![(0, TarsValue::Int(300))]);
    let err = registry.decode(&too_big, id, &DecodeOptions::default()).unwrap_err();
    match err {
        CodecError::OutOfRange { value, target, .. } => {
            assert_eq!(value, 300);
            assert_eq!(target, "int8");
        }
        other => panic!("expected OutOfRange, got {other:?}"),
    }
}

#[test]
fn test_encode_side_narrowing_rejects_out_of_range() {
    let registry = SchemaRegistry::new();
    let id = registry
        .register(
            StructDescriptor::new("Narrow")
                .field(FieldDescriptor::new("b", 0, FieldKind::Int(IntWidth::W16))),
        )
        .unwrap();
    let mut record = registry.new_record(id).unwrap();
    record.set("b", 70000i64).unwrap();
    let err = registry.encode(&record, &EncodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::OutOfRange { .. }));
}

#[test]
fn test_bool_accepts_any_integer() {
    let registry = SchemaRegistry::new();
    let id = registry
        .register(
            StructDescriptor::new("Flags")
                .field(FieldDescriptor::new("on", 0, FieldKind::Bool)),
        )
        .unwrap();

    let bytes = encode_tags(vec![(0, TarsValue::Int(17))]);
    let decoded = registry.decode(&bytes, id, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get("on"), Some(&TarsValue::Bool(true)));

    let bytes = encode_tags(vec![(0, TarsValue::Int(0))]);
    let decoded = registry.decode(&bytes, id, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get("on"), Some(&TarsValue::Bool(false)));
}

#[test]
fn test_wire_kind_mismatch_is_reported_with_path() {
    let registry = SchemaRegistry::new();
    let id = registry.register(user_schema()).unwrap();

    // Tag 0 carries a string, but the schema wants an integer.
    let bytes = encode_tags(vec![(0, TarsValue::Str("oops".into()))]);
    let err = registry.decode(&bytes, id, &DecodeOptions::default()).unwrap_err();
    match err {
        CodecError::TypeMismatch { path, expected, .. } => {
            assert_eq!(path, "<root>.uid");
            assert_eq!(expected, "int64");
        }
        other => panic!("expected TypeMismatch, got {other:?}"),
    }
}

// =============================================================================
// Constraints
// =============================================================================

#[test]
fn test_numeric_constraints() {
    let registry = SchemaRegistry::new();
    let id = registry
        .register(
            StructDescriptor::new("Aged").field(
                FieldDescriptor::new("age", 0, FieldKind::Int(IntWidth::W32)).with_constraints(
                    FieldConstraints {
                        ge: Some(0.0),
                        lt: Some(150.0),
                        ..FieldConstraints::default()
                    },
                ),
            ),
        )
        .unwrap();

    let ok = encode_tags(vec![(0, TarsValue::Int(30))]);
    assert!(registry.decode(&ok, id, &DecodeOptions::default()).is_ok());

    let zero = encode_tags(vec![(0, TarsValue::Int(0))]);
    assert!(registry.decode(&zero, id, &DecodeOptions::default()).is_ok());

    let negative = encode_tags(vec![(0, TarsValue::Int(-1))]);
    let err = registry.decode(&negative, id, &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::Validation { .. }));

    let huge = encode_tags(vec![(0, TarsValue::Int(150))]);
    let err = registry.decode(&huge, id, &DecodeOptions::default()).unwrap_err();
    match err {
        CodecError::Validation { path, .. } => assert_eq!(path, "<root>.age"),
        other => panic!("expected Validation, got {other:?}"),
    }
}

#[test]
fn test_length_constraints_count_characters_for_strings() {
    let registry = SchemaRegistry::new();
    let id = registry
        .register(
            StructDescriptor::new("Named").field(
                FieldDescriptor::new("name", 0, FieldKind::Str).with_constraints(
                    FieldConstraints {
                        min_len: Some(2),
                        max_len: Some(4),
                        ..FieldConstraints::default()
                    },
                ),
            ),
        )
        .unwrap();

    // Four CJK characters are twelve UTF-8 bytes but length 4.
    let ok = encode_tags(vec![(0, TarsValue::Str("四个汉字".into()))]);
    assert!(registry.decode(&ok, id, &DecodeOptions::default()).is_ok());

    let short = encode_tags(vec![(0, TarsValue::Str("x".into()))]);
    assert!(registry.decode(&short, id, &DecodeOptions::default()).is_err());

    let long = encode_tags(vec![(0, TarsValue::Str("abcde".into()))]);
    assert!(registry.decode(&long, id, &DecodeOptions::default()).is_err());
}

#[test]
fn test_pattern_constraint() {
    let registry = SchemaRegistry::new();
    let id = registry
        .register(
            StructDescriptor::new("Mail").field(
                FieldDescriptor::new("addr", 0, FieldKind::Str).with_constraints(
                    FieldConstraints {
                        pattern: Some(r"^[a-z]+@[a-z]+\.[a-z]+$".into()),
                        ..FieldConstraints::default()
                    },
                ),
            ),
        )
        .unwrap();

    let ok = encode_tags(vec![(0, TarsValue::Str("a@b.com".into()))]);
    assert!(registry.decode(&ok, id, &DecodeOptions::default()).is_ok());

    let bad = encode_tags(vec![(0, TarsValue::Str("not-an-address".into()))]);
    let err = registry.decode(&bad, id, &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::Validation { .. }));
}

// =============================================================================
// Enums, unions, tuples, sets, optionals
// =============================================================================

#[test]
fn test_enum_membership() {
    let registry = SchemaRegistry::new();
    let allowed: BTreeSet<i64> = [0, 1, 2].into_iter().collect();
    let id = registry
        .register(
            StructDescriptor::new("State")
                .field(FieldDescriptor::new(
                    "state",
                    0,
                    FieldKind::Enum(IntWidth::W32, allowed),
                )),
        )
        .unwrap();

    let ok = encode_tags(vec![(0, TarsValue::Int(2))]);
    let decoded = registry.decode(&ok, id, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get("state").and_then(|v| v.as_int()), Some(2));

    let bad = encode_tags(vec![(0, TarsValue::Int(5))]);
    let err = registry.decode(&bad, id, &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::Validation { .. }));
}

#[test]
fn test_union_decodes_by_ordered_trial() {
    let registry = SchemaRegistry::new();
    let id = registry
        .register(
            StructDescriptor::new("Either").field(FieldDescriptor::new(
                "v",
                0,
                FieldKind::Union(vec![FieldKind::Int(IntWidth::W64), FieldKind::Str]),
            )),
        )
        .unwrap();

    let as_int = encode_tags(vec![(0, TarsValue::Int(9))]);
    let decoded = registry.decode(&as_int, id, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get("v"), Some(&TarsValue::Int(9)));

    let as_str = encode_tags(vec![(0, TarsValue::Str("nine".into()))]);
    let decoded = registry.decode(&as_str, id, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get("v"), Some(&TarsValue::Str("nine".into())));

    let as_list = encode_tags(vec![(0, TarsValue::List(vec![]))]);
    let err = registry.decode(&as_list, id, &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::TypeMismatch { .. }));
}

#[test]
fn test_union_encodes_first_matching_variant() {
    let registry = SchemaRegistry::new();
    let id = registry
        .register(
            StructDescriptor::new("Either").field(FieldDescriptor::new(
                "v",
                0,
                FieldKind::Union(vec![FieldKind::Int(IntWidth::W64), FieldKind::Str]),
            )),
        )
        .unwrap();

    let mut record = registry.new_record(id).unwrap();
    record.set("v", "hello").unwrap();
    let bytes = registry.encode(&record, &EncodeOptions::default()).unwrap();
    assert_eq!(bytes.as_ref(), [0x06, 0x05, b'h', b'e', b'l', b'l', b'o']);
}

#[test]
fn test_tuple_round_trip_and_arity_check() {
    let registry = SchemaRegistry::new();
    let id = registry
        .register(
            StructDescriptor::new("Pair").field(FieldDescriptor::new(
                "pair",
                0,
                FieldKind::Tuple(vec![FieldKind::Int(IntWidth::W64), FieldKind::Str]),
            )),
        )
        .unwrap();

    let mut record = registry.new_record(id).unwrap();
    record
        .set(
            "pair",
            TarsValue::List(vec![TarsValue::Int(1), TarsValue::Str("one".into())]),
        )
        .unwrap();
    let bytes = registry.encode(&record, &EncodeOptions::default()).unwrap();
    let decoded = registry.decode(&bytes, id, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded, record);

    // Wrong arity on the wire.
    let wrong = encode_tags(vec![(0, TarsValue::List(vec![TarsValue::Int(1)]))]);
    let err = registry.decode(&wrong, id, &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::Validation { .. }));
}

#[test]
fn test_set_uses_list_wire_form() {
    let registry = SchemaRegistry::new();
    let id = registry
        .register(
            StructDescriptor::new("Tags").field(FieldDescriptor::new(
                "tags",
                0,
                FieldKind::Set(Box::new(FieldKind::Int(IntWidth::W32))),
            )),
        )
        .unwrap();

    let mut record = registry.new_record(id).unwrap();
    record
        .set(
            "tags",
            TarsValue::List(vec![TarsValue::Int(3), TarsValue::Int(5)]),
        )
        .unwrap();
    let bytes = registry.encode(&record, &EncodeOptions::default()).unwrap();
    assert_eq!(bytes[0], 0x09);
    let decoded = registry.decode(&bytes, id, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded, record);
}

#[test]
fn test_optional_field_absent_and_present() {
    let registry = SchemaRegistry::new();
    let id = registry
        .register(
            StructDescriptor::new("MaybeNamed")
                .field(FieldDescriptor::new("uid", 0, FieldKind::Int(IntWidth::W64)))
                .field(FieldDescriptor::new(
                    "nick",
                    1,
                    FieldKind::Optional(Box::new(FieldKind::Str)),
                )),
        )
        .unwrap();

    let mut record = registry.new_record(id).unwrap();
    record.set("uid", 1i64).unwrap();
    let bytes = registry.encode(&record, &EncodeOptions::default()).unwrap();
    assert_eq!(bytes.as_ref(), [0x00, 0x01]);

    let decoded = registry.decode(&bytes, id, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get("nick"), None);

    record.set("nick", "Al").unwrap();
    let bytes = registry.encode(&record, &EncodeOptions::default()).unwrap();
    let decoded = registry.decode(&bytes, id, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get("nick").and_then(|v| v.as_str()), Some("Al"));
}

// =============================================================================
// Nested and recursive structs
// =============================================================================

#[test]
fn test_nested_struct_round_trip_with_child_defaults() {
    let registry = SchemaRegistry::new();
    let address = registry
        .register(
            StructDescriptor::new("Address")
                .field(FieldDescriptor::new("city", 0, FieldKind::Str))
                .field(
                    FieldDescriptor::new("zip", 1, FieldKind::Str)
                        .with_default(TarsValue::Str("00000".into())),
                ),
        )
        .unwrap();
    let person = registry
        .register(
            StructDescriptor::new("Person")
                .field(FieldDescriptor::new("name", 0, FieldKind::Str))
                .field(FieldDescriptor::new(
                    "home",
                    1,
                    FieldKind::Struct(SchemaRef::Id(address)),
                )),
        )
        .unwrap();

    let mut home = StructMap::new();
    home.insert(0, TarsValue::Str("Shenzhen".into()));

    let mut record = registry.new_record(person).unwrap();
    record.set("name", "Wen").unwrap();
    record.set("home", TarsValue::Struct(home)).unwrap();

    let bytes = registry.encode(&record, &EncodeOptions::default()).unwrap();
    let decoded = registry.decode(&bytes, person, &DecodeOptions::default()).unwrap();

    let home = decoded.get("home").and_then(|v| v.as_struct()).unwrap();
    assert_eq!(home.get(&0), Some(&TarsValue::Str("Shenzhen".into())));
    // The child schema's default was applied inside the nested value.
    assert_eq!(home.get(&1), Some(&TarsValue::Str("00000".into())));
}

#[test]
fn test_nested_struct_value_with_unknown_tag_cannot_encode() {
    let registry = SchemaRegistry::new();
    let inner = registry
        .register(
            StructDescriptor::new("Inner")
                .field(FieldDescriptor::new("v", 0, FieldKind::Int(IntWidth::W64))),
        )
        .unwrap();
    let outer = registry
        .register(
            StructDescriptor::new("Outer").field(FieldDescriptor::new(
                "inner",
                0,
                FieldKind::Struct(SchemaRef::Id(inner)),
            )),
        )
        .unwrap();

    let mut stray = StructMap::new();
    stray.insert(0, TarsValue::Int(1));
    stray.insert(9, TarsValue::Int(2));

    let mut record = registry.new_record(outer).unwrap();
    record.set("inner", TarsValue::Struct(stray)).unwrap();
    let err = registry.encode(&record, &EncodeOptions::default()).unwrap_err();
    assert!(matches!(err, CodecError::UnknownTag { tag: 9, .. }));
}

#[test]
fn test_self_referential_schema_round_trips_a_chain() {
    let registry = SchemaRegistry::new();
    let node = registry
        .register(
            StructDescriptor::new("Node")
                .field(FieldDescriptor::new("value", 0, FieldKind::Int(IntWidth::W64)))
                .field(FieldDescriptor::new(
                    "next",
                    1,
                    FieldKind::Optional(Box::new(FieldKind::Struct(SchemaRef::Named(
                        "Node".into(),
                    )))),
                )),
        )
        .unwrap();

    // value 3 -> value 2 -> value 1
    let mut tail = StructMap::new();
    tail.insert(0, TarsValue::Int(1));
    let mut mid = StructMap::new();
    mid.insert(0, TarsValue::Int(2));
    mid.insert(1, TarsValue::Struct(tail));

    let mut record = registry.new_record(node).unwrap();
    record.set("value", 3i64).unwrap();
    record.set("next", TarsValue::Struct(mid)).unwrap();

    let bytes = registry.encode(&record, &EncodeOptions::default()).unwrap();
    let decoded = registry.decode(&bytes, node, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded, record);

    let mid = decoded.get("next").and_then(|v| v.as_struct()).unwrap();
    let tail = mid.get(&1).and_then(|v| v.as_struct()).unwrap();
    assert_eq!(tail.get(&0), Some(&TarsValue::Int(1)));
}

#[test]
fn test_mutually_recursive_schemas_resolve_by_name() {
    let registry = SchemaRegistry::new();
    let tree = registry
        .register(
            StructDescriptor::new("Tree")
                .field(FieldDescriptor::new("label", 0, FieldKind::Str))
                .field(FieldDescriptor::new(
                    "children",
                    1,
                    FieldKind::List(Box::new(FieldKind::Struct(SchemaRef::Named(
                        "Forest".into(),
                    )))),
                )),
        )
        .unwrap();
    registry
        .register(
            StructDescriptor::new("Forest").field(FieldDescriptor::new(
                "root",
                0,
                FieldKind::Optional(Box::new(FieldKind::Struct(SchemaRef::Named("Tree".into())))),
            )),
        )
        .unwrap();

    let mut leaf = StructMap::new();
    leaf.insert(0, TarsValue::Str("leaf".into()));
    leaf.insert(1, TarsValue::List(vec![]));
    let mut forest = StructMap::new();
    forest.insert(0, TarsValue::Struct(leaf));

    let mut record = registry.new_record(tree).unwrap();
    record.set("label", "root").unwrap();
    record
        .set("children", TarsValue::List(vec![TarsValue::Struct(forest)]))
        .unwrap();

    let bytes = registry.encode(&record, &EncodeOptions::default()).unwrap();
    let decoded = registry.decode(&bytes, tree, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded, record);
}

// =============================================================================
// Bytes compatibility and Any fields
// =============================================================================

#[test]
fn test_bytes_kind_accepts_string_wire_payloads() {
    let registry = SchemaRegistry::new();
    let id = registry
        .register(
            StructDescriptor::new("Blob")
                .field(FieldDescriptor::new("data", 0, FieldKind::Bytes)),
        )
        .unwrap();

    let bytes = encode_tags(vec![(0, TarsValue::Str("hi".into()))]);
    let decoded = registry.decode(&bytes, id, &DecodeOptions::default()).unwrap();
    assert_eq!(
        decoded.get("data"),
        Some(&TarsValue::Bytes(bytes::Bytes::from_static(b"hi")))
    );
}

#[test]
fn test_list_of_int8_accepts_simple_list_wire() {
    let registry = SchemaRegistry::new();
    let id = registry
        .register(
            StructDescriptor::new("Raw").field(FieldDescriptor::new(
                "data",
                0,
                FieldKind::List(Box::new(FieldKind::Int(IntWidth::W8))),
            )),
        )
        .unwrap();

    let bytes = encode_tags(vec![(0, TarsValue::bytes(vec![1u8, 2, 0xFF]))]);
    let decoded = registry.decode(&bytes, id, &DecodeOptions::default()).unwrap();
    assert_eq!(
        decoded.get("data"),
        Some(&TarsValue::List(vec![
            TarsValue::Int(1),
            TarsValue::Int(2),
            TarsValue::Int(-1),
        ]))
    );
}

#[test]
fn test_any_field_preserves_struct_vs_map_distinction() {
    let registry = SchemaRegistry::new();
    let id = registry
        .register(
            StructDescriptor::new("Holder")
                .field(FieldDescriptor::new("payload", 0, FieldKind::Any)),
        )
        .unwrap();

    let mut inner = StructMap::new();
    inner.insert(3, TarsValue::Int(9));

    let mut record = registry.new_record(id).unwrap();
    record.set("payload", TarsValue::Struct(inner.clone())).unwrap();
    let bytes = registry.encode(&record, &EncodeOptions::default()).unwrap();
    assert_eq!(bytes[0] & 0x0F, 10); // StructBegin frame
    let decoded = registry.decode(&bytes, id, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get("payload"), Some(&TarsValue::Struct(inner)));

    let pairs = vec![(TarsValue::Int(3), TarsValue::Int(9))];
    record.set("payload", TarsValue::Map(pairs.clone())).unwrap();
    let bytes = registry.encode(&record, &EncodeOptions::default()).unwrap();
    assert_eq!(bytes[0] & 0x0F, 8); // Map frame
    let decoded = registry.decode(&bytes, id, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get("payload"), Some(&TarsValue::Map(pairs)));
}

// =============================================================================
// Options and concurrency
// =============================================================================

#[test]
fn test_little_endian_schema_round_trip() {
    let registry = SchemaRegistry::new();
    let id = registry.register(user_schema()).unwrap();

    let mut record = registry.new_record(id).unwrap();
    record.set("uid", 0x1234i64).unwrap();
    record.set("name", "LE").unwrap();

    let options = EncodeOptions {
        endian: tars_codec::Endian::Little,
        ..EncodeOptions::default()
    };
    let bytes = registry.encode(&record, &options).unwrap();
    // Int2 payload is byte-swapped relative to the default order.
    assert_eq!(&bytes[..3], [0x01, 0x34, 0x12]);

    let decode_options = DecodeOptions {
        endian: tars_codec::Endian::Little,
        ..DecodeOptions::default()
    };
    let decoded = registry.decode(&bytes, id, &decode_options).unwrap();
    assert_eq!(decoded, record);
}

#[test]
fn test_registry_is_shareable_across_threads() {
    let registry = Arc::new(SchemaRegistry::new());
    let id = registry.register(user_schema()).unwrap();

    let mut record = registry.new_record(id).unwrap();
    record.set("uid", 7i64).unwrap();
    record.set("name", "threaded").unwrap();
    let bytes = registry.encode(&record, &EncodeOptions::default()).unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let registry = Arc::clone(&registry);
        let bytes = bytes.clone();
        handles.push(std::thread::spawn(move || {
            let decoded = registry
                .decode(&bytes, id, &DecodeOptions::default())
                .unwrap();
            assert_eq!(decoded.get("uid").and_then(|v| v.as_int()), Some(7));
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_record_rejects_unknown_field_names() {
    let registry = SchemaRegistry::new();
    let id = registry.register(user_schema()).unwrap();
    let mut record = registry.new_record(id).unwrap();
    let err = record.set("nonexistent", 1i64).unwrap_err();
    assert!(matches!(
        err,
        CodecError::Schema(SchemaError::UnknownField { .. })
    ));
}

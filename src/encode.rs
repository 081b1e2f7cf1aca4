//! Schema-driven encoding: `Record` → wire bytes.

use bytes::Bytes;
use tracing::trace;

use crate::decode::{key_repr, Record};
use crate::error::{CodecError, FieldPath, Result};
use crate::generic;
use crate::schema::{
    struct_schema, CompiledField, CompiledSchema, FieldKind, IntWidth, SchemaRegistry,
};
use crate::value::{StructMap, TarsValue};
use crate::wire::Endianness;
use crate::writer::Writer;
use crate::EncodeOptions;

/// Encode a record as a bare field sequence (the top-level convention:
/// no enclosing `StructBegin`/`StructEnd`).
pub(crate) fn encode_record<E: Endianness>(
    registry: &SchemaRegistry,
    record: &Record,
    options: &EncodeOptions,
) -> Result<Bytes> {
    let schema = record.schema();
    trace!(schema = schema.name(), "encoding struct");

    let mut writer = Writer::<E>::new(options.limits);
    let mut path = FieldPath::root();
    for (slot, field) in schema.fields.iter().enumerate() {
        encode_slot(
            &mut writer,
            registry,
            schema,
            field,
            record.values()[slot].as_ref(),
            &mut path,
        )?;
    }
    Ok(writer.into_bytes())
}

/// Emit one slot, honouring optionals, defaults and `omit_defaults`.
fn encode_slot<E: Endianness>(
    writer: &mut Writer<E>,
    registry: &SchemaRegistry,
    schema: &CompiledSchema,
    field: &CompiledField,
    value: Option<&TarsValue>,
    path: &mut FieldPath,
) -> Result<()> {
    let value = match value {
        Some(value) => {
            if schema.omit_defaults && field.default.as_ref() == Some(value) {
                return Ok(());
            }
            value
        }
        None => {
            if field.optional {
                return Ok(());
            }
            match &field.default {
                Some(_) if schema.omit_defaults => return Ok(()),
                Some(default) => default,
                None => {
                    return Err(CodecError::MissingRequired {
                        path: path.render(),
                        field: field.name.clone(),
                        tag: field.tag,
                    })
                }
            }
        }
    };

    path.push_field(&field.name);
    let result = encode_field(writer, registry, field.tag, &field.kind, value, path);
    path.pop();
    result
}

fn mismatch(kind: &FieldKind, value: &TarsValue, path: &FieldPath) -> CodecError {
    CodecError::TypeMismatch {
        path: path.render(),
        expected: kind.display_name(),
        found: value.type_name().to_owned(),
    }
}

/// Emit one value under `tag` according to its declared kind.
fn encode_field<E: Endianness>(
    writer: &mut Writer<E>,
    registry: &SchemaRegistry,
    tag: u8,
    kind: &FieldKind,
    value: &TarsValue,
    path: &mut FieldPath,
) -> Result<()> {
    match kind {
        FieldKind::Bool => match value {
            TarsValue::Bool(v) => {
                writer.write_bool(tag, *v);
                Ok(())
            }
            other => Err(mismatch(kind, other, path)),
        },
        FieldKind::Int(width) => match value {
            TarsValue::Int(v) => {
                narrow(*v, *width, path)?;
                writer.write_int(tag, *v);
                Ok(())
            }
            other => Err(mismatch(kind, other, path)),
        },
        FieldKind::Enum(width, allowed) => match value {
            TarsValue::Int(v) => {
                narrow(*v, *width, path)?;
                if !allowed.contains(v) {
                    return Err(CodecError::Validation {
                        path: path.render(),
                        reason: format!("{v} is not an allowed enum value"),
                    });
                }
                writer.write_int(tag, *v);
                Ok(())
            }
            other => Err(mismatch(kind, other, path)),
        },
        FieldKind::Float => match value {
            TarsValue::Float(v) => {
                writer.write_float(tag, *v);
                Ok(())
            }
            other => Err(mismatch(kind, other, path)),
        },
        FieldKind::Double => match value {
            TarsValue::Double(v) => {
                writer.write_double(tag, *v);
                Ok(())
            }
            TarsValue::Float(v) => {
                writer.write_double(tag, f64::from(*v));
                Ok(())
            }
            other => Err(mismatch(kind, other, path)),
        },
        FieldKind::Str => match value {
            TarsValue::Str(v) => writer.write_string(tag, v).map_err(|e| e.at(path)),
            other => Err(mismatch(kind, other, path)),
        },
        FieldKind::Bytes => match value {
            TarsValue::Bytes(v) => {
                writer.write_bytes(tag, v);
                Ok(())
            }
            other => Err(mismatch(kind, other, path)),
        },
        FieldKind::List(inner) | FieldKind::Set(inner) => match value {
            TarsValue::List(items) => {
                encode_sequence(writer, registry, tag, inner, items, path)
            }
            other => Err(mismatch(kind, other, path)),
        },
        FieldKind::Tuple(kinds) => match value {
            TarsValue::List(items) => {
                if items.len() != kinds.len() {
                    return Err(CodecError::Validation {
                        path: path.render(),
                        reason: format!(
                            "expected {}-tuple, value carries {} elements",
                            kinds.len(),
                            items.len()
                        ),
                    });
                }
                writer
                    .write_list(tag, items.len(), |writer| {
                        for (index, (element_kind, item)) in
                            kinds.iter().zip(items.iter()).enumerate()
                        {
                            path.push_index(index);
                            let result =
                                encode_field(writer, registry, 0, element_kind, item, path);
                            path.pop();
                            result?;
                        }
                        Ok(())
                    })
                    .map_err(|e| e.at(path))
            }
            other => Err(mismatch(kind, other, path)),
        },
        FieldKind::Map(key_kind, value_kind) => match value {
            TarsValue::Map(pairs) => writer
                .write_map(tag, pairs.len(), |writer| {
                    for (key, item) in pairs {
                        path.push_key(key_repr(key));
                        let result = encode_field(writer, registry, 0, key_kind, key, path)
                            .and_then(|()| {
                                encode_field(writer, registry, 1, value_kind, item, path)
                            });
                        path.pop();
                        result?;
                    }
                    Ok(())
                })
                .map_err(|e| e.at(path)),
            other => Err(mismatch(kind, other, path)),
        },
        FieldKind::Struct(reference) => match value {
            TarsValue::Struct(map) => {
                let child = struct_schema(registry, reference).map_err(CodecError::from)?;
                writer
                    .write_struct(tag, |writer| {
                        encode_struct_map(writer, registry, &child, map, path)
                    })
                    .map_err(|e| e.at(path))
            }
            other => Err(mismatch(kind, other, path)),
        },
        FieldKind::Optional(inner) => encode_field(writer, registry, tag, inner, value, path),
        FieldKind::Union(variants) => {
            let variant = variants
                .iter()
                .find(|v| value_matches_kind(value, v))
                .ok_or_else(|| mismatch(kind, value, path))?;
            encode_field(writer, registry, tag, variant, value, path)
        }
        FieldKind::Any => generic::encode_value(writer, tag, value, path),
    }
}

fn encode_sequence<E: Endianness>(
    writer: &mut Writer<E>,
    registry: &SchemaRegistry,
    tag: u8,
    element_kind: &FieldKind,
    items: &[TarsValue],
    path: &mut FieldPath,
) -> Result<()> {
    writer
        .write_list(tag, items.len(), |writer| {
            for (index, item) in items.iter().enumerate() {
                path.push_index(index);
                let result = encode_field(writer, registry, 0, element_kind, item, path);
                path.pop();
                result?;
            }
            Ok(())
        })
        .map_err(|e| e.at(path))
}

/// Emit a nested struct value (a tag-keyed map) against its child schema.
fn encode_struct_map<E: Endianness>(
    writer: &mut Writer<E>,
    registry: &SchemaRegistry,
    schema: &CompiledSchema,
    map: &StructMap,
    path: &mut FieldPath,
) -> Result<()> {
    // Keys the child schema does not route cannot be encoded faithfully.
    for tag in map.keys() {
        if schema.slot_of_tag(*tag).is_none() {
            return Err(CodecError::UnknownTag {
                path: path.render(),
                tag: *tag,
            });
        }
    }

    for field in &schema.fields {
        encode_slot(writer, registry, schema, field, map.get(&field.tag), path)?;
    }
    Ok(())
}

fn narrow(value: i64, width: IntWidth, path: &FieldPath) -> Result<()> {
    if width.holds(value) {
        Ok(())
    } else {
        Err(CodecError::OutOfRange {
            path: path.render(),
            value,
            target: width.target_name(),
        })
    }
}

/// Whether a runtime value is acceptable for a declared kind; drives
/// union variant selection on encode.
pub(crate) fn value_matches_kind(value: &TarsValue, kind: &FieldKind) -> bool {
    match kind {
        FieldKind::Bool => matches!(value, TarsValue::Bool(_)),
        FieldKind::Int(width) => matches!(value, TarsValue::Int(v) if width.holds(*v)),
        FieldKind::Enum(width, allowed) => {
            matches!(value, TarsValue::Int(v) if width.holds(*v) && allowed.contains(v))
        }
        FieldKind::Float => matches!(value, TarsValue::Float(_)),
        FieldKind::Double => matches!(value, TarsValue::Double(_) | TarsValue::Float(_)),
        FieldKind::Str => matches!(value, TarsValue::Str(_)),
        FieldKind::Bytes => matches!(value, TarsValue::Bytes(_)),
        FieldKind::List(_) | FieldKind::Set(_) => matches!(value, TarsValue::List(_)),
        FieldKind::Tuple(kinds) => {
            matches!(value, TarsValue::List(items) if items.len() == kinds.len())
        }
        FieldKind::Map(_, _) => matches!(value, TarsValue::Map(_)),
        FieldKind::Struct(_) => matches!(value, TarsValue::Struct(_)),
        FieldKind::Optional(inner) => value_matches_kind(value, inner),
        FieldKind::Union(variants) => variants.iter().any(|v| value_matches_kind(value, v)),
        FieldKind::Any => true,
    }
}

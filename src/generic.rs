//! Schemaless encoding and decoding over [`TarsValue`].
//!
//! Only the wire type codes drive this codec: no defaults, no constraints,
//! no field names. Integers stay in their promoted 64-bit form, and the
//! struct-vs-map distinction is preserved exactly as the wire carries it.

use bytes::Bytes;
use tracing::debug;

use crate::error::{CodecError, FieldPath, Result};
use crate::reader::Reader;
use crate::value::{StructMap, TarsValue};
use crate::wire::{Endianness, WireType};
use crate::writer::Writer;
use crate::Limits;

/// How the schemaless decoder treats `SimpleList` byte payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BytesMode {
    /// Keep every payload as `Bytes`. The only mode that round-trips
    /// byte-for-byte.
    #[default]
    Raw,
    /// Upgrade payloads that are printable UTF-8 to `Str`.
    Text,
    /// Like `Text`, but payloads that parse completely as an embedded
    /// struct are decoded in place.
    Auto,
}

/// Encode a value at the top level.
///
/// A `Struct` becomes a bare field sequence with its keys as tags; any
/// other value is written as a single field at tag 0.
pub(crate) fn encode_root<E: Endianness>(
    writer: &mut Writer<E>,
    value: &TarsValue,
    path: &mut FieldPath,
) -> Result<()> {
    match value {
        TarsValue::Struct(map) => {
            for (tag, field) in map {
                path.push_tag(*tag);
                let result = encode_value(writer, *tag, field, path);
                path.pop();
                result?;
            }
            Ok(())
        }
        other => encode_value(writer, 0, other, path),
    }
}

/// Encode one value under `tag`, dispatching on the runtime variant.
pub(crate) fn encode_value<E: Endianness>(
    writer: &mut Writer<E>,
    tag: u8,
    value: &TarsValue,
    path: &mut FieldPath,
) -> Result<()> {
    match value {
        TarsValue::Bool(v) => {
            writer.write_bool(tag, *v);
            Ok(())
        }
        TarsValue::Int(v) => {
            writer.write_int(tag, *v);
            Ok(())
        }
        TarsValue::Float(v) => {
            writer.write_float(tag, *v);
            Ok(())
        }
        TarsValue::Double(v) => {
            writer.write_double(tag, *v);
            Ok(())
        }
        TarsValue::Str(v) => writer.write_string(tag, v).map_err(|e| e.at(path)),
        TarsValue::Bytes(v) => {
            writer.write_bytes(tag, v);
            Ok(())
        }
        TarsValue::List(items) => writer
            .write_list(tag, items.len(), |writer| {
                for (index, item) in items.iter().enumerate() {
                    path.push_index(index);
                    let result = encode_value(writer, 0, item, path);
                    path.pop();
                    result?;
                }
                Ok(())
            })
            .map_err(|e| e.at(path)),
        TarsValue::Map(pairs) => writer
            .write_map(tag, pairs.len(), |writer| {
                for (key, item) in pairs {
                    path.push_key(crate::decode::key_repr(key));
                    let result = encode_value(writer, 0, key, path)
                        .and_then(|()| encode_value(writer, 1, item, path));
                    path.pop();
                    result?;
                }
                Ok(())
            })
            .map_err(|e| e.at(path)),
        TarsValue::Struct(map) => writer
            .write_struct(tag, |writer| {
                for (field_tag, field) in map {
                    path.push_tag(*field_tag);
                    let result = encode_value(writer, *field_tag, field, path);
                    path.pop();
                    result?;
                }
                Ok(())
            })
            .map_err(|e| e.at(path)),
    }
}

/// Decode a top-level bare field sequence into a tag-keyed map.
///
/// A `StructEnd` head terminates the sequence early; repeated tags are a
/// format error.
pub(crate) fn decode_root<E: Endianness>(
    reader: &mut Reader<E>,
    path: &mut FieldPath,
) -> Result<StructMap> {
    let mut map = StructMap::new();
    while !reader.is_end() {
        let (tag, wire_type) = reader.read_head().map_err(|e| e.at(path))?;
        if wire_type == WireType::StructEnd {
            break;
        }
        if map.contains_key(&tag) {
            return Err(CodecError::DuplicateTag {
                path: path.render(),
                tag,
            });
        }
        path.push_tag(tag);
        let value = decode_value(reader, wire_type, path);
        path.pop();
        map.insert(tag, value?);
    }
    Ok(map)
}

/// Decode one value of the observed wire type into a [`TarsValue`].
pub(crate) fn decode_value<E: Endianness>(
    reader: &mut Reader<E>,
    wire_type: WireType,
    path: &mut FieldPath,
) -> Result<TarsValue> {
    match wire_type {
        WireType::ZeroTag
        | WireType::Int1
        | WireType::Int2
        | WireType::Int4
        | WireType::Int8 => {
            let value = reader.read_int(wire_type).map_err(|e| e.at(path))?;
            Ok(TarsValue::Int(value))
        }
        WireType::Float => {
            let value = reader.read_float(wire_type).map_err(|e| e.at(path))?;
            Ok(TarsValue::Float(value))
        }
        WireType::Double => {
            let value = reader.read_double(wire_type).map_err(|e| e.at(path))?;
            Ok(TarsValue::Double(value))
        }
        WireType::String1 | WireType::String4 => {
            let raw = reader.read_string_bytes(wire_type).map_err(|e| e.at(path))?;
            match std::str::from_utf8(raw) {
                Ok(text) => Ok(TarsValue::Str(text.to_owned())),
                Err(_) => Ok(TarsValue::Bytes(Bytes::copy_from_slice(raw))),
            }
        }
        WireType::SimpleList => {
            let raw = reader.read_simple_list().map_err(|e| e.at(path))?;
            Ok(TarsValue::Bytes(Bytes::copy_from_slice(raw)))
        }
        WireType::List => {
            let len = reader.read_list_len().map_err(|e| e.at(path))?;
            reader.descend().map_err(|e| e.at(path))?;
            let result = decode_list_items(reader, len, path);
            reader.ascend();
            result
        }
        WireType::Map => {
            let len = reader.read_map_len().map_err(|e| e.at(path))?;
            reader.descend().map_err(|e| e.at(path))?;
            let result = decode_map_pairs(reader, len, path);
            reader.ascend();
            result
        }
        WireType::StructBegin => {
            let mut map = StructMap::new();
            reader.read_struct_body(|reader, tag, field_type| {
                if map.contains_key(&tag) {
                    return Err(CodecError::DuplicateTag {
                        path: path.render(),
                        tag,
                    });
                }
                path.push_tag(tag);
                let value = decode_value(reader, field_type, path);
                path.pop();
                map.insert(tag, value?);
                Ok(())
            })?;
            Ok(TarsValue::Struct(map))
        }
        WireType::StructEnd => Err(CodecError::Validation {
            path: path.render(),
            reason: "StructEnd cannot appear as a value".to_owned(),
        }),
    }
}

fn decode_list_items<E: Endianness>(
    reader: &mut Reader<E>,
    len: usize,
    path: &mut FieldPath,
) -> Result<TarsValue> {
    let mut items = Vec::with_capacity(len);
    for index in 0..len {
        let (_, element_type) = reader.read_head().map_err(|e| e.at(path))?;
        path.push_index(index);
        let item = decode_value(reader, element_type, path);
        path.pop();
        items.push(item?);
    }
    Ok(TarsValue::List(items))
}

fn decode_map_pairs<E: Endianness>(
    reader: &mut Reader<E>,
    len: usize,
    path: &mut FieldPath,
) -> Result<TarsValue> {
    let mut pairs = Vec::with_capacity(len);
    for index in 0..len {
        let (key_tag, key_type) = reader.read_head().map_err(|e| e.at(path))?;
        if key_tag != 0 {
            return Err(CodecError::Validation {
                path: path.render(),
                reason: format!("map key must carry tag 0, got {key_tag}"),
            });
        }
        path.push_index(index);
        let key = decode_value(reader, key_type, path);
        path.pop();
        let key = key?;

        let (value_tag, value_type) = reader.read_head().map_err(|e| e.at(path))?;
        if value_tag != 1 {
            return Err(CodecError::Validation {
                path: path.render(),
                reason: format!("map value must carry tag 1, got {value_tag}"),
            });
        }
        path.push_key(crate::decode::key_repr(&key));
        let value = decode_value(reader, value_type, path);
        path.pop();
        pairs.push((key, value?));
    }
    Ok(TarsValue::Map(pairs))
}

/// Post-process a decoded tree according to the selected [`BytesMode`].
///
/// Nested byte-payload probes are charged against the same depth budget
/// the reader uses, so bytes-in-bytes towers cannot recurse unboundedly.
pub(crate) fn apply_bytes_mode<E: Endianness>(
    value: TarsValue,
    mode: BytesMode,
    limits: &Limits,
) -> TarsValue {
    if mode == BytesMode::Raw {
        return value;
    }
    rewrite_bytes::<E>(value, mode, limits, 0)
}

fn rewrite_bytes<E: Endianness>(
    value: TarsValue,
    mode: BytesMode,
    limits: &Limits,
    depth: usize,
) -> TarsValue {
    match value {
        TarsValue::Bytes(raw) => {
            if raw.is_empty() {
                return TarsValue::Str(String::new());
            }
            if is_safe_text(&raw) {
                match String::from_utf8(raw.to_vec()) {
                    Ok(text) => return TarsValue::Str(text),
                    Err(_) => return TarsValue::Bytes(raw),
                }
            }
            if mode == BytesMode::Auto && depth < limits.max_depth {
                if let Some(nested) = crate::trace::probe_value::<E>(&raw, limits) {
                    debug!(len = raw.len(), "decoded embedded struct inside byte payload");
                    return rewrite_bytes::<E>(nested, mode, limits, depth + 1);
                }
            }
            TarsValue::Bytes(raw)
        }
        TarsValue::List(items) => TarsValue::List(
            items
                .into_iter()
                .map(|item| rewrite_bytes::<E>(item, mode, limits, depth))
                .collect(),
        ),
        TarsValue::Map(pairs) => TarsValue::Map(
            pairs
                .into_iter()
                .map(|(key, item)| {
                    (
                        rewrite_bytes::<E>(key, mode, limits, depth),
                        rewrite_bytes::<E>(item, mode, limits, depth),
                    )
                })
                .collect(),
        ),
        TarsValue::Struct(map) => TarsValue::Struct(
            map.into_iter()
                .map(|(tag, item)| (tag, rewrite_bytes::<E>(item, mode, limits, depth)))
                .collect(),
        ),
        scalar => scalar,
    }
}

/// Human-readable text check: printable UTF-8 with only `\t`, `\n`, `\r`
/// allowed from the control range.
pub(crate) fn is_safe_text(data: &[u8]) -> bool {
    for &b in data {
        if b < 32 {
            if b != 9 && b != 10 && b != 13 {
                return false;
            }
        } else if b == 127 {
            return false;
        }
    }
    std::str::from_utf8(data).is_ok()
}

//! Structure probing and diagnostic tracing.
//!
//! The prober answers one question: does this byte slice decode *exactly*
//! as a struct, consuming every byte? It fails fast on the first head,
//! then walks the structure without allocating, and only then pays for a
//! full decode. The tracer walks the same structure but records every
//! field it sees into a tree, keeps going on unknown tags, and captures
//! errors on the offending node instead of failing the call.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::FieldPath;
use crate::generic;
use crate::reader::Reader;
use crate::schema::{struct_schema, CompiledSchema, FieldKind, SchemaId, SchemaRegistry};
use crate::value::TarsValue;
use crate::wire::{Endianness, WireType};
use crate::Limits;

/// One node of a decode trace: the head that introduced the field, its
/// scalar value (containers carry `len` and children instead), optional
/// schema annotations, and the error that stopped the walk here, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceNode {
    pub tag: u8,
    /// Wire type name (`"Int1"`, `"StructBegin"`, ...); the synthetic
    /// root uses `"Root"`.
    pub wire_type: String,
    /// Scalar payloads; strings decode to `Str` when they are UTF-8 and
    /// `Bytes` otherwise.
    pub value: Option<TarsValue>,
    /// Declared element/pair/byte count for containers.
    pub len: Option<usize>,
    pub children: Vec<TraceNode>,
    /// Field name, when a schema routes this tag.
    pub name: Option<String>,
    /// Declared kind, when a schema routes this tag.
    pub type_name: Option<String>,
    /// Structural path, e.g. `<root>.user[2].name`.
    pub path: String,
    /// Set when decoding failed at this node; the walk stops there.
    pub error: Option<String>,
}

impl TraceNode {
    fn new(tag: u8, wire_type: &str, path: String) -> Self {
        Self {
            tag,
            wire_type: wire_type.to_owned(),
            value: None,
            len: None,
            children: Vec::new(),
            name: None,
            type_name: None,
            path,
            error: None,
        }
    }

    /// Depth-first iterator over this node and all descendants.
    pub fn walk(&self) -> Vec<&TraceNode> {
        let mut nodes = vec![self];
        let mut index = 0;
        while index < nodes.len() {
            let node = nodes[index];
            nodes.extend(node.children.iter());
            index += 1;
        }
        nodes
    }

    /// First error recorded anywhere in the tree.
    pub fn first_error(&self) -> Option<&str> {
        self.walk().into_iter().find_map(|n| n.error.as_deref())
    }
}

/// Walk the buffer head-by-head without allocating; true iff the whole
/// buffer is one well-formed field sequence.
pub(crate) fn scans_as_struct<E: Endianness>(data: &[u8], limits: &Limits) -> bool {
    let mut reader = Reader::<E>::new(data, *limits);
    while !reader.is_end() {
        let Ok((_, wire_type)) = reader.read_head() else {
            return false;
        };
        if wire_type == WireType::StructEnd {
            break;
        }
        if reader.skip_field(wire_type).is_err() {
            return false;
        }
    }
    reader.is_end()
}

/// Attempt a complete struct decode of `data`.
///
/// `None` on empty input, an impossible first head, any decode error,
/// leftover bytes, or an empty result. Limits are enforced during both
/// the scan and the decode, so hostile input cannot force a large
/// allocation.
pub(crate) fn probe_value<E: Endianness>(data: &[u8], limits: &Limits) -> Option<TarsValue> {
    if data.is_empty() || data[0] & 0x0F > 13 {
        return None;
    }
    if !scans_as_struct::<E>(data, limits) {
        return None;
    }
    let mut reader = Reader::<E>::new(data, *limits);
    let mut path = FieldPath::root();
    let map = generic::decode_root(&mut reader, &mut path).ok()?;
    if !reader.is_end() || map.is_empty() {
        return None;
    }
    Some(TarsValue::Struct(map))
}

/// Build a trace tree for `data`, annotating fields from `schema` when
/// one is supplied.
pub(crate) fn trace_bytes<E: Endianness>(
    data: &[u8],
    schema: Option<(&SchemaRegistry, SchemaId)>,
    limits: &Limits,
) -> TraceNode {
    let compiled = schema.and_then(|(registry, id)| registry.get(id).ok());
    let registry = schema.map(|(registry, _)| registry);

    let mut root = TraceNode::new(0, "Root", FieldPath::ROOT.to_owned());
    root.type_name = compiled.as_ref().map(|s| s.name().to_owned());

    let mut reader = Reader::<E>::new(data, *limits);
    let _ = trace_fields(&mut reader, &mut root, compiled.as_ref(), registry, false);
    root
}

/// Walk a field sequence, appending one child per field to `parent`.
///
/// `framed` bodies must end with `StructEnd`; the top level may simply
/// run out of buffer. `Err` means the walk halted on a recorded error.
fn trace_fields<E: Endianness>(
    reader: &mut Reader<E>,
    parent: &mut TraceNode,
    schema: Option<&Arc<CompiledSchema>>,
    registry: Option<&SchemaRegistry>,
    framed: bool,
) -> Result<(), ()> {
    loop {
        if reader.is_end() {
            if framed {
                parent.error = Some("struct not terminated before end of buffer".to_owned());
                return Err(());
            }
            return Ok(());
        }
        let (tag, wire_type) = match reader.read_head() {
            Ok(head) => head,
            Err(err) => {
                parent.error = Some(err.to_string());
                return Err(());
            }
        };
        if wire_type == WireType::StructEnd {
            return Ok(());
        }

        let mut kind_hint = None;
        let mut name = None;
        let mut type_name = None;
        if let Some(schema) = schema {
            if let Some(slot) = schema.slot_of_tag(tag) {
                let field = schema.field(slot);
                name = Some(field.name.clone());
                type_name = Some(field.kind.display_name());
                kind_hint = Some(&field.kind);
            }
        }

        let path = match &name {
            Some(name) => format!("{}.{name}", parent.path),
            None => format!("{}.<tag:{tag}>", parent.path),
        };
        let mut node = TraceNode::new(tag, &format!("{wire_type:?}"), path);
        node.name = name;
        node.type_name = type_name;

        let outcome = trace_value(reader, &mut node, wire_type, kind_hint, registry);
        parent.children.push(node);
        outcome?;
    }
}

/// Strip `Optional` wrappers so container hints line up with the wire.
fn peel(kind: &FieldKind) -> &FieldKind {
    match kind {
        FieldKind::Optional(inner) => peel(inner),
        other => other,
    }
}

fn record_err(node: &mut TraceNode, err: impl ToString) -> Result<(), ()> {
    node.error = Some(err.to_string());
    Err(())
}

fn trace_value<E: Endianness>(
    reader: &mut Reader<E>,
    node: &mut TraceNode,
    wire_type: WireType,
    hint: Option<&FieldKind>,
    registry: Option<&SchemaRegistry>,
) -> Result<(), ()> {
    let hint = hint.map(peel);
    match wire_type {
        WireType::ZeroTag
        | WireType::Int1
        | WireType::Int2
        | WireType::Int4
        | WireType::Int8 => match reader.read_int(wire_type) {
            Ok(value) => {
                node.value = Some(TarsValue::Int(value));
                Ok(())
            }
            Err(err) => record_err(node, err),
        },
        WireType::Float => match reader.read_float(wire_type) {
            Ok(value) => {
                node.value = Some(TarsValue::Float(value));
                Ok(())
            }
            Err(err) => record_err(node, err),
        },
        WireType::Double => match reader.read_double(wire_type) {
            Ok(value) => {
                node.value = Some(TarsValue::Double(value));
                Ok(())
            }
            Err(err) => record_err(node, err),
        },
        WireType::String1 | WireType::String4 => match reader.read_string_bytes(wire_type) {
            Ok(raw) => {
                node.len = Some(raw.len());
                node.value = Some(match std::str::from_utf8(raw) {
                    Ok(text) => TarsValue::Str(text.to_owned()),
                    Err(_) => TarsValue::Bytes(Bytes::copy_from_slice(raw)),
                });
                Ok(())
            }
            Err(err) => record_err(node, err),
        },
        WireType::SimpleList => match reader.read_simple_list() {
            Ok(raw) => {
                node.len = Some(raw.len());
                node.value = Some(TarsValue::Bytes(Bytes::copy_from_slice(raw)));
                Ok(())
            }
            Err(err) => record_err(node, err),
        },
        WireType::StructBegin => {
            let child_schema = match (hint, registry) {
                (Some(FieldKind::Struct(reference)), Some(registry)) => {
                    struct_schema(registry, reference).ok()
                }
                _ => None,
            };
            if let Err(err) = reader.descend() {
                return record_err(node, err);
            }
            let outcome = trace_fields(reader, node, child_schema.as_ref(), registry, true);
            reader.ascend();
            outcome
        }
        WireType::List => {
            let len = match reader.read_list_len() {
                Ok(len) => len,
                Err(err) => return record_err(node, err),
            };
            node.len = Some(len);
            let element_hint = match hint {
                Some(FieldKind::List(inner)) | Some(FieldKind::Set(inner)) => {
                    Some(inner.as_ref())
                }
                _ => None,
            };
            if let Err(err) = reader.descend() {
                return record_err(node, err);
            }
            let outcome = trace_list(reader, node, len, element_hint, registry);
            reader.ascend();
            outcome
        }
        WireType::Map => {
            let len = match reader.read_map_len() {
                Ok(len) => len,
                Err(err) => return record_err(node, err),
            };
            node.len = Some(len);
            let (key_hint, value_hint) = match hint {
                Some(FieldKind::Map(key, value)) => (Some(key.as_ref()), Some(value.as_ref())),
                _ => (None, None),
            };
            if let Err(err) = reader.descend() {
                return record_err(node, err);
            }
            let outcome = trace_map(reader, node, len, key_hint, value_hint, registry);
            reader.ascend();
            outcome
        }
        WireType::StructEnd => record_err(node, "StructEnd cannot appear as a value"),
    }
}

fn trace_list<E: Endianness>(
    reader: &mut Reader<E>,
    parent: &mut TraceNode,
    len: usize,
    element_hint: Option<&FieldKind>,
    registry: Option<&SchemaRegistry>,
) -> Result<(), ()> {
    for index in 0..len {
        let (tag, element_type) = match reader.read_head() {
            Ok(head) => head,
            Err(err) => {
                parent.error = Some(err.to_string());
                return Err(());
            }
        };
        let mut child = TraceNode::new(
            tag,
            &format!("{element_type:?}"),
            format!("{}[{index}]", parent.path),
        );
        child.type_name = element_hint.map(|k| k.display_name());
        let outcome = trace_value(reader, &mut child, element_type, element_hint, registry);
        parent.children.push(child);
        outcome?;
    }
    Ok(())
}

fn trace_map<E: Endianness>(
    reader: &mut Reader<E>,
    parent: &mut TraceNode,
    len: usize,
    key_hint: Option<&FieldKind>,
    value_hint: Option<&FieldKind>,
    registry: Option<&SchemaRegistry>,
) -> Result<(), ()> {
    for index in 0..len {
        for (role, hint) in [("key", key_hint), ("value", value_hint)] {
            let (tag, entry_type) = match reader.read_head() {
                Ok(head) => head,
                Err(err) => {
                    parent.error = Some(err.to_string());
                    return Err(());
                }
            };
            let mut child = TraceNode::new(
                tag,
                &format!("{entry_type:?}"),
                format!("{}[{index}].{role}", parent.path),
            );
            child.name = Some(role.to_owned());
            child.type_name = hint.map(|k| k.display_name());
            let outcome = trace_value(reader, &mut child, entry_type, hint, registry);
            parent.children.push(child);
            outcome?;
        }
    }
    Ok(())
}

//! Schema-driven decoding: slot filling, narrowing, constraints, defaults.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{CodecError, FieldPath, Result, SchemaError};
use crate::generic;
use crate::reader::Reader;
use crate::schema::{
    struct_schema, CompiledConstraints, CompiledSchema, FieldKind, IntWidth, SchemaId,
    SchemaRegistry, SlotMask,
};
use crate::value::{StructMap, TarsValue};
use crate::wire::{Endianness, WireType};
use crate::DecodeOptions;

/// A decoded (or to-be-encoded) struct value: one slot per schema field.
///
/// Slots are addressable by position, field name or tag. An unset slot on
/// the encode side falls back to the field's default; on the decode side
/// every slot is either set, defaulted or reported as missing before the
/// record reaches the caller.
#[derive(Clone)]
pub struct Record {
    schema: Arc<CompiledSchema>,
    values: Vec<Option<TarsValue>>,
}

impl Record {
    pub(crate) fn new(schema: Arc<CompiledSchema>) -> Self {
        let values = vec![None; schema.field_count()];
        Self { schema, values }
    }

    pub fn schema_id(&self) -> SchemaId {
        self.schema.id()
    }

    pub fn schema_name(&self) -> &str {
        self.schema.name()
    }

    pub(crate) fn schema(&self) -> &Arc<CompiledSchema> {
        &self.schema
    }

    pub(crate) fn values(&self) -> &[Option<TarsValue>] {
        &self.values
    }

    /// Value of the field called `name`, if set.
    pub fn get(&self, name: &str) -> Option<&TarsValue> {
        let slot = self.schema.slot_of(name)?;
        self.values[slot].as_ref()
    }

    /// Value of the field at `tag`, if set.
    pub fn get_tag(&self, tag: u8) -> Option<&TarsValue> {
        let slot = self.schema.slot_of_tag(tag)?;
        self.values[slot].as_ref()
    }

    /// Value at slot index `slot`, if set.
    pub fn get_slot(&self, slot: usize) -> Option<&TarsValue> {
        self.values.get(slot)?.as_ref()
    }

    /// Set the field called `name`.
    pub fn set(&mut self, name: &str, value: impl Into<TarsValue>) -> Result<()> {
        let slot = self
            .schema
            .slot_of(name)
            .ok_or_else(|| SchemaError::UnknownField {
                schema: self.schema.name().to_owned(),
                name: name.to_owned(),
            })?;
        self.values[slot] = Some(value.into());
        Ok(())
    }

    /// Set the field at `tag`.
    pub fn set_tag(&mut self, tag: u8, value: impl Into<TarsValue>) -> Result<()> {
        let slot = self
            .schema
            .slot_of_tag(tag)
            .ok_or_else(|| SchemaError::UnknownField {
                schema: self.schema.name().to_owned(),
                name: format!("<tag:{tag}>"),
            })?;
        self.values[slot] = Some(value.into());
        Ok(())
    }

    /// Clear a field so it falls back to its default on encode.
    pub fn unset(&mut self, name: &str) -> Result<()> {
        let slot = self
            .schema
            .slot_of(name)
            .ok_or_else(|| SchemaError::UnknownField {
                schema: self.schema.name().to_owned(),
                name: name.to_owned(),
            })?;
        self.values[slot] = None;
        Ok(())
    }

    /// Iterate `(field name, value)` over the set slots in tag order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &TarsValue)> {
        self.schema
            .fields
            .iter()
            .zip(self.values.iter())
            .filter_map(|(field, value)| value.as_ref().map(|v| (field.name.as_str(), v)))
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_struct(self.schema.name());
        for (name, value) in self.fields() {
            map.field(name, value);
        }
        map.finish()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.schema.id() == other.schema.id() && self.values == other.values
    }
}

/// Decode a top-level struct: a bare field sequence with no enclosing
/// `StructBegin`/`StructEnd` frame.
pub(crate) fn decode_record<E: Endianness>(
    registry: &SchemaRegistry,
    data: &[u8],
    id: SchemaId,
    options: &DecodeOptions,
) -> Result<Record> {
    let schema = registry.get(id)?;
    debug!(schema = schema.name(), len = data.len(), "decoding struct");

    let mut reader = Reader::<E>::new(data, options.limits);
    let mut path = FieldPath::root();
    let mut slots = SlotState::new(&schema);

    while !reader.is_end() {
        let (tag, wire_type) = reader.read_head().map_err(|e| e.at(&path))?;
        if wire_type == WireType::StructEnd {
            break;
        }
        slots.route(
            &mut reader, registry, &schema, tag, wire_type, &mut path, options,
        )?;
    }

    let values = slots.finish(&schema, &path)?;
    Ok(Record {
        schema,
        values,
    })
}

/// Per-struct decode state: the slot array plus the seen mask that makes
/// repeated tags detectable.
struct SlotState {
    values: Vec<Option<TarsValue>>,
    seen: SlotMask,
}

impl SlotState {
    fn new(schema: &CompiledSchema) -> Self {
        Self {
            values: vec![None; schema.field_count()],
            seen: SlotMask::default(),
        }
    }

    /// Route one `(tag, type)` pair: decode into its slot, or skip it.
    #[allow(clippy::too_many_arguments)]
    fn route<E: Endianness>(
        &mut self,
        reader: &mut Reader<E>,
        registry: &SchemaRegistry,
        schema: &CompiledSchema,
        tag: u8,
        wire_type: WireType,
        path: &mut FieldPath,
        options: &DecodeOptions,
    ) -> Result<()> {
        let Some(slot) = schema.slot_of_tag(tag) else {
            if schema.forbid_unknown {
                return Err(CodecError::UnknownTag {
                    path: path.render(),
                    tag,
                });
            }
            debug!(schema = schema.name(), tag, ?wire_type, "skipping unknown tag");
            return reader.skip_field(wire_type).map_err(|e| e.at(path));
        };

        if self.seen.get(slot) {
            return Err(CodecError::DuplicateTag {
                path: path.render(),
                tag,
            });
        }
        self.seen.set(slot);

        let field = schema.field(slot);
        path.push_field(&field.name);
        let result = decode_field(reader, registry, &field.kind, wire_type, path, options)
            .and_then(|value| {
                if let Some(constraints) = &field.constraints {
                    apply_constraints(&value, constraints, path)?;
                }
                Ok(value)
            });
        path.pop();

        trace!(schema = schema.name(), field = %field.name, tag, "field decoded");
        self.values[slot] = Some(result?);
        Ok(())
    }

    /// Apply defaults to unset slots and reject missing required fields.
    fn finish(
        self,
        schema: &CompiledSchema,
        path: &FieldPath,
    ) -> Result<Vec<Option<TarsValue>>> {
        let mut values = self.values;
        for (slot, value) in values.iter_mut().enumerate() {
            if value.is_some() {
                continue;
            }
            let field = schema.field(slot);
            if let Some(default) = &field.default {
                *value = Some(default.clone());
            } else if schema.required_mask.get(slot) {
                return Err(CodecError::MissingRequired {
                    path: path.render(),
                    field: field.name.clone(),
                    tag: field.tag,
                });
            }
            // Optional fields stay absent.
        }
        Ok(values)
    }
}

/// Decode a nested struct body (after its `StructBegin` head) into a
/// tag-keyed map, applying the child schema's defaults and constraints.
fn decode_struct_to_map<E: Endianness>(
    reader: &mut Reader<E>,
    registry: &SchemaRegistry,
    schema: &CompiledSchema,
    path: &mut FieldPath,
    options: &DecodeOptions,
) -> Result<StructMap> {
    let mut slots = SlotState::new(schema);
    reader.read_struct_body(|reader, tag, wire_type| {
        slots.route(reader, registry, schema, tag, wire_type, path, options)
    })?;

    let values = slots.finish(schema, path)?;
    let mut map = StructMap::new();
    for (slot, value) in values.into_iter().enumerate() {
        if let Some(value) = value {
            map.insert(schema.field(slot).tag, value);
        }
    }
    Ok(map)
}

/// Whether a declared kind can consume the observed wire type.
pub(crate) fn kind_accepts(kind: &FieldKind, wire_type: WireType) -> bool {
    match kind {
        FieldKind::Bool | FieldKind::Int(_) | FieldKind::Enum(_, _) => wire_type.is_integer(),
        FieldKind::Float => matches!(wire_type, WireType::Float | WireType::ZeroTag),
        FieldKind::Double => matches!(
            wire_type,
            WireType::Double | WireType::Float | WireType::ZeroTag
        ),
        FieldKind::Str => matches!(wire_type, WireType::String1 | WireType::String4),
        FieldKind::Bytes => matches!(
            wire_type,
            WireType::SimpleList | WireType::String1 | WireType::String4
        ),
        FieldKind::List(inner) => {
            wire_type == WireType::List
                || (wire_type == WireType::SimpleList
                    && matches!(**inner, FieldKind::Int(IntWidth::W8)))
        }
        FieldKind::Set(_) | FieldKind::Tuple(_) => wire_type == WireType::List,
        FieldKind::Map(_, _) => wire_type == WireType::Map,
        FieldKind::Struct(_) => wire_type == WireType::StructBegin,
        FieldKind::Optional(inner) => kind_accepts(inner, wire_type),
        FieldKind::Union(variants) => variants.iter().any(|v| kind_accepts(v, wire_type)),
        FieldKind::Any => wire_type != WireType::StructEnd,
    }
}

fn mismatch(kind: &FieldKind, wire_type: WireType, path: &FieldPath) -> CodecError {
    CodecError::TypeMismatch {
        path: path.render(),
        expected: kind.display_name(),
        found: format!("wire type {wire_type:?}"),
    }
}

/// Decode one field's payload according to its declared kind.
fn decode_field<E: Endianness>(
    reader: &mut Reader<E>,
    registry: &SchemaRegistry,
    kind: &FieldKind,
    wire_type: WireType,
    path: &mut FieldPath,
    options: &DecodeOptions,
) -> Result<TarsValue> {
    if !kind_accepts(kind, wire_type) {
        // The payload still has to be consumed predictably on the happy
        // path, so reject before touching the cursor.
        return Err(mismatch(kind, wire_type, path));
    }

    match kind {
        FieldKind::Bool => {
            let raw = reader.read_int(wire_type).map_err(|e| e.at(path))?;
            Ok(TarsValue::Bool(raw != 0))
        }
        FieldKind::Int(width) => {
            let raw = reader.read_int(wire_type).map_err(|e| e.at(path))?;
            narrow(raw, *width, path)?;
            Ok(TarsValue::Int(raw))
        }
        FieldKind::Enum(width, allowed) => {
            let raw = reader.read_int(wire_type).map_err(|e| e.at(path))?;
            narrow(raw, *width, path)?;
            if !allowed.contains(&raw) {
                return Err(CodecError::Validation {
                    path: path.render(),
                    reason: format!("{raw} is not an allowed enum value"),
                });
            }
            Ok(TarsValue::Int(raw))
        }
        FieldKind::Float => {
            let value = reader.read_float(wire_type).map_err(|e| e.at(path))?;
            Ok(TarsValue::Float(value))
        }
        FieldKind::Double => {
            let value = reader.read_double(wire_type).map_err(|e| e.at(path))?;
            Ok(TarsValue::Double(value))
        }
        FieldKind::Str => {
            let raw = reader.read_string_bytes(wire_type).map_err(|e| e.at(path))?;
            match std::str::from_utf8(raw) {
                Ok(text) => Ok(TarsValue::Str(text.to_owned())),
                Err(_) => Err(CodecError::Validation {
                    path: path.render(),
                    reason: "string payload is not valid UTF-8".to_owned(),
                }),
            }
        }
        FieldKind::Bytes => {
            let raw = match wire_type {
                WireType::SimpleList => reader.read_simple_list().map_err(|e| e.at(path))?,
                _ => reader.read_string_bytes(wire_type).map_err(|e| e.at(path))?,
            };
            Ok(TarsValue::Bytes(Bytes::copy_from_slice(raw)))
        }
        FieldKind::List(inner) => {
            if wire_type == WireType::SimpleList {
                // Byte-array fast path standing in for list<int8>.
                let raw = reader.read_simple_list().map_err(|e| e.at(path))?;
                let items = raw
                    .iter()
                    .map(|b| TarsValue::Int(*b as i8 as i64))
                    .collect();
                return Ok(TarsValue::List(items));
            }
            decode_sequence(reader, registry, inner, path, options)
        }
        FieldKind::Set(inner) => decode_sequence(reader, registry, inner, path, options),
        FieldKind::Tuple(kinds) => {
            let len = reader.read_list_len().map_err(|e| e.at(path))?;
            if len != kinds.len() {
                return Err(CodecError::Validation {
                    path: path.render(),
                    reason: format!("expected {}-tuple, wire carries {len} elements", kinds.len()),
                });
            }
            reader.descend().map_err(|e| e.at(path))?;
            let mut items = Vec::with_capacity(kinds.len());
            let mut result = Ok(());
            for (index, element_kind) in kinds.iter().enumerate() {
                path.push_index(index);
                let item = decode_element(reader, registry, element_kind, path, options);
                path.pop();
                match item {
                    Ok(item) => items.push(item),
                    Err(err) => {
                        result = Err(err);
                        break;
                    }
                }
            }
            reader.ascend();
            result?;
            Ok(TarsValue::List(items))
        }
        FieldKind::Map(key_kind, value_kind) => {
            let len = reader.read_map_len().map_err(|e| e.at(path))?;
            reader.descend().map_err(|e| e.at(path))?;
            let result = decode_map_pairs(reader, registry, key_kind, value_kind, len, path, options);
            reader.ascend();
            result
        }
        FieldKind::Struct(reference) => {
            let child = struct_schema(registry, reference).map_err(CodecError::from)?;
            let map = decode_struct_to_map(reader, registry, &child, path, options)
                .map_err(|e| e.at(path))?;
            Ok(TarsValue::Struct(map))
        }
        FieldKind::Optional(inner) => {
            decode_field(reader, registry, inner, wire_type, path, options)
        }
        FieldKind::Union(variants) => {
            let variant = variants
                .iter()
                .find(|v| kind_accepts(v, wire_type))
                .ok_or_else(|| mismatch(kind, wire_type, path))?;
            decode_field(reader, registry, variant, wire_type, path, options)
        }
        FieldKind::Any => {
            let value = generic::decode_value(reader, wire_type, path)?;
            let limits = *reader.limits();
            Ok(generic::apply_bytes_mode::<E>(
                value,
                options.bytes_mode,
                &limits,
            ))
        }
    }
}

/// Decode a wire `List` into a homogeneous sequence.
fn decode_sequence<E: Endianness>(
    reader: &mut Reader<E>,
    registry: &SchemaRegistry,
    element_kind: &FieldKind,
    path: &mut FieldPath,
    options: &DecodeOptions,
) -> Result<TarsValue> {
    let len = reader.read_list_len().map_err(|e| e.at(path))?;
    reader.descend().map_err(|e| e.at(path))?;
    let mut items = Vec::with_capacity(len);
    let mut result = Ok(());
    for index in 0..len {
        path.push_index(index);
        let item = decode_element(reader, registry, element_kind, path, options);
        path.pop();
        match item {
            Ok(item) => items.push(item),
            Err(err) => {
                result = Err(err);
                break;
            }
        }
    }
    reader.ascend();
    result?;
    Ok(TarsValue::List(items))
}

/// Read one element head and decode its payload against `kind`.
fn decode_element<E: Endianness>(
    reader: &mut Reader<E>,
    registry: &SchemaRegistry,
    kind: &FieldKind,
    path: &mut FieldPath,
    options: &DecodeOptions,
) -> Result<TarsValue> {
    let (_, wire_type) = reader.read_head().map_err(|e| e.at(path))?;
    decode_field(reader, registry, kind, wire_type, path, options)
}

fn decode_map_pairs<E: Endianness>(
    reader: &mut Reader<E>,
    registry: &SchemaRegistry,
    key_kind: &FieldKind,
    value_kind: &FieldKind,
    len: usize,
    path: &mut FieldPath,
    options: &DecodeOptions,
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
        let key = decode_field(reader, registry, key_kind, key_type, path, options);
        path.pop();
        let key = key?;

        let (value_tag, value_type) = reader.read_head().map_err(|e| e.at(path))?;
        if value_tag != 1 {
            return Err(CodecError::Validation {
                path: path.render(),
                reason: format!("map value must carry tag 1, got {value_tag}"),
            });
        }
        path.push_key(key_repr(&key));
        let value = decode_field(reader, registry, value_kind, value_type, path, options);
        path.pop();
        pairs.push((key, value?));
    }
    Ok(TarsValue::Map(pairs))
}

/// Short key rendering for error paths.
pub(crate) fn key_repr(key: &TarsValue) -> String {
    match key {
        TarsValue::Int(v) => v.to_string(),
        TarsValue::Str(v) => format!("\"{v}\""),
        TarsValue::Bool(v) => v.to_string(),
        other => other.type_name().to_owned(),
    }
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

/// Evaluate a field's compiled constraints against its decoded value.
fn apply_constraints(
    value: &TarsValue,
    constraints: &CompiledConstraints,
    path: &FieldPath,
) -> Result<()> {
    use std::cmp::Ordering;

    let fail = |reason: String| CodecError::Validation {
        path: path.render(),
        reason,
    };

    let has_numeric = constraints.gt.is_some()
        || constraints.ge.is_some()
        || constraints.lt.is_some()
        || constraints.le.is_some();
    if has_numeric {
        let numeric = match value {
            TarsValue::Int(v) => *v as f64,
            TarsValue::Float(v) => f64::from(*v),
            TarsValue::Double(v) => *v,
            other => {
                return Err(fail(format!(
                    "numeric constraint on non-numeric {}",
                    other.type_name()
                )))
            }
        };
        if let Some(gt) = constraints.gt {
            if numeric.partial_cmp(&gt) != Some(Ordering::Greater) {
                return Err(fail(format!("must be > {gt}, got {numeric}")));
            }
        }
        if let Some(ge) = constraints.ge {
            if !matches!(
                numeric.partial_cmp(&ge),
                Some(Ordering::Greater | Ordering::Equal)
            ) {
                return Err(fail(format!("must be >= {ge}, got {numeric}")));
            }
        }
        if let Some(lt) = constraints.lt {
            if numeric.partial_cmp(&lt) != Some(Ordering::Less) {
                return Err(fail(format!("must be < {lt}, got {numeric}")));
            }
        }
        if let Some(le) = constraints.le {
            if !matches!(
                numeric.partial_cmp(&le),
                Some(Ordering::Less | Ordering::Equal)
            ) {
                return Err(fail(format!("must be <= {le}, got {numeric}")));
            }
        }
    }

    if constraints.min_len.is_some() || constraints.max_len.is_some() {
        let len = match value {
            TarsValue::Str(v) => v.chars().count(),
            TarsValue::Bytes(v) => v.len(),
            TarsValue::List(v) => v.len(),
            TarsValue::Map(v) => v.len(),
            TarsValue::Struct(v) => v.len(),
            other => {
                return Err(fail(format!(
                    "length constraint on unsized {}",
                    other.type_name()
                )))
            }
        };
        if let Some(min_len) = constraints.min_len {
            if len < min_len {
                return Err(fail(format!("length must be >= {min_len}, got {len}")));
            }
        }
        if let Some(max_len) = constraints.max_len {
            if len > max_len {
                return Err(fail(format!("length must be <= {max_len}, got {len}")));
            }
        }
    }

    if let Some(pattern) = &constraints.pattern {
        match value {
            TarsValue::Str(v) => {
                if !pattern.is_match(v) {
                    return Err(fail(format!("does not match pattern {}", pattern.as_str())));
                }
            }
            other => {
                return Err(fail(format!(
                    "pattern constraint on non-string {}",
                    other.type_name()
                )))
            }
        }
    }

    Ok(())
}

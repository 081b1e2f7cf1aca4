//! Field descriptors, the schema compiler and the schema registry.
//!
//! A façade describes each struct type once as a [`StructDescriptor`];
//! registration compiles it into an immutable [`CompiledSchema`] holding a
//! 256-entry tag routing table, required/default bit masks and
//! pre-compiled constraint matchers. Compiled schemas are shared behind
//! `Arc` and never mutated, so concurrent encodes and decodes need no
//! synchronisation beyond the registry's read lock.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use byteorder::{BigEndian, LittleEndian};
use parking_lot::RwLock;
use regex::Regex;

use crate::decode::{decode_record, Record};
use crate::encode::encode_record;
use crate::error::{CodecError, SchemaError};
use crate::value::TarsValue;
use crate::wire::Endian;
use crate::{DecodeOptions, EncodeOptions};

/// Width of a fixed-size integer field kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    /// Whether `value` fits the signed range of this width.
    pub fn holds(self, value: i64) -> bool {
        match self {
            Self::W8 => i8::try_from(value).is_ok(),
            Self::W16 => i16::try_from(value).is_ok(),
            Self::W32 => i32::try_from(value).is_ok(),
            Self::W64 => true,
        }
    }

    pub(crate) fn target_name(self) -> &'static str {
        match self {
            Self::W8 => "int8",
            Self::W16 => "int16",
            Self::W32 => "int32",
            Self::W64 => "int64",
        }
    }
}

/// Reference to another struct schema from within a field kind.
///
/// Names may be forward references: they are resolved (or auto-declared)
/// at registration time, and must be defined before the first encode or
/// decode touches them. Storing ids instead of owning pointers is what
/// lets self-referential and mutually recursive types exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaRef {
    Id(SchemaId),
    Named(String),
}

/// The closed set of field kinds the engine can encode and decode.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Bool,
    Int(IntWidth),
    Float,
    Double,
    Str,
    Bytes,
    List(Box<FieldKind>),
    Set(Box<FieldKind>),
    Tuple(Vec<FieldKind>),
    Map(Box<FieldKind>, Box<FieldKind>),
    Struct(SchemaRef),
    Optional(Box<FieldKind>),
    /// An integer with a fixed set of admissible values.
    Enum(IntWidth, BTreeSet<i64>),
    /// Ordered variant list; decoding tries variants in declaration order
    /// against the observed wire type and the first compatible one wins.
    Union(Vec<FieldKind>),
    /// Schemaless escape hatch: the value round-trips as a [`TarsValue`].
    Any,
}

impl FieldKind {
    pub(crate) fn display_name(&self) -> String {
        match self {
            Self::Bool => "bool".to_owned(),
            Self::Int(width) => width.target_name().to_owned(),
            Self::Float => "float".to_owned(),
            Self::Double => "double".to_owned(),
            Self::Str => "string".to_owned(),
            Self::Bytes => "bytes".to_owned(),
            Self::List(inner) => format!("list<{}>", inner.display_name()),
            Self::Set(inner) => format!("set<{}>", inner.display_name()),
            Self::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(|k| k.display_name()).collect();
                format!("tuple<{}>", inner.join(", "))
            }
            Self::Map(key, value) => {
                format!("map<{}, {}>", key.display_name(), value.display_name())
            }
            Self::Struct(SchemaRef::Named(name)) => format!("struct {name}"),
            Self::Struct(SchemaRef::Id(id)) => format!("struct #{}", id.0),
            Self::Optional(inner) => format!("optional<{}>", inner.display_name()),
            Self::Enum(width, _) => format!("enum<{}>", width.target_name()),
            Self::Union(items) => {
                let inner: Vec<String> = items.iter().map(|k| k.display_name()).collect();
                format!("union<{}>", inner.join(" | "))
            }
            Self::Any => "any".to_owned(),
        }
    }
}

/// Decode-time constraints attached to a field.
///
/// Numeric bounds compare the decoded value as `f64`; length bounds apply
/// to strings (in characters), byte arrays, lists and maps; `pattern` is
/// compiled once at registration and evaluated as an unanchored search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldConstraints {
    pub gt: Option<f64>,
    pub lt: Option<f64>,
    pub ge: Option<f64>,
    pub le: Option<f64>,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub pattern: Option<String>,
}

impl FieldConstraints {
    fn is_empty(&self) -> bool {
        self.gt.is_none()
            && self.lt.is_none()
            && self.ge.is_none()
            && self.le.is_none()
            && self.min_len.is_none()
            && self.max_len.is_none()
            && self.pattern.is_none()
    }
}

/// Constraints with the pattern pre-compiled.
#[derive(Debug, Clone)]
pub(crate) struct CompiledConstraints {
    pub(crate) gt: Option<f64>,
    pub(crate) lt: Option<f64>,
    pub(crate) ge: Option<f64>,
    pub(crate) le: Option<f64>,
    pub(crate) min_len: Option<usize>,
    pub(crate) max_len: Option<usize>,
    pub(crate) pattern: Option<Regex>,
}

/// One field of a struct descriptor, as supplied by the façade.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    /// Declared as `u16` so an out-of-range tag is reported as a
    /// registration error instead of being silently truncated.
    pub tag: u16,
    pub kind: FieldKind,
    pub default: Option<TarsValue>,
    pub constraints: Option<FieldConstraints>,
    /// The façade intercepts these fields around the engine; the engine
    /// itself never calls user code.
    pub has_custom_serializer: bool,
    pub has_custom_deserializer: bool,
}

impl FieldDescriptor {
    /// A plain field with no default and no constraints.
    pub fn new(name: impl Into<String>, tag: u16, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            tag,
            kind,
            default: None,
            constraints: None,
            has_custom_serializer: false,
            has_custom_deserializer: false,
        }
    }

    pub fn with_default(mut self, default: TarsValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_constraints(mut self, constraints: FieldConstraints) -> Self {
        if !constraints.is_empty() {
            self.constraints = Some(constraints);
        }
        self
    }
}

/// A struct type as supplied by the façade.
#[derive(Debug, Clone)]
pub struct StructDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    /// Skip encoding fields whose value equals their compiled default.
    pub omit_defaults: bool,
    /// Raise `UnknownTag` on unrecognised tags instead of skipping them.
    pub forbid_unknown: bool,
}

impl StructDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            omit_defaults: false,
            forbid_unknown: false,
        }
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn omit_defaults(mut self, on: bool) -> Self {
        self.omit_defaults = on;
        self
    }

    pub fn forbid_unknown(mut self, on: bool) -> Self {
        self.forbid_unknown = on;
        self
    }
}

/// Handle to a registered schema. Indexes into the registry, so cyclic
/// references stay cheap and ownership-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaId(pub(crate) u32);

impl SchemaId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// 256-slot bit set tracking which slots are required / defaulted / seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SlotMask([u64; 4]);

impl SlotMask {
    #[inline]
    pub(crate) fn set(&mut self, slot: usize) {
        self.0[slot / 64] |= 1 << (slot % 64);
    }

    #[inline]
    pub(crate) fn get(&self, slot: usize) -> bool {
        self.0[slot / 64] & (1 << (slot % 64)) != 0
    }
}

/// One compiled field: descriptor data with refs resolved, constraints
/// compiled and the effective default materialised.
#[derive(Debug, Clone)]
pub(crate) struct CompiledField {
    pub(crate) name: String,
    pub(crate) tag: u8,
    pub(crate) kind: FieldKind,
    pub(crate) default: Option<TarsValue>,
    pub(crate) constraints: Option<CompiledConstraints>,
    pub(crate) optional: bool,
    pub(crate) required: bool,
    #[allow(dead_code)]
    pub(crate) has_custom_serializer: bool,
    #[allow(dead_code)]
    pub(crate) has_custom_deserializer: bool,
}

/// The immutable compiled form of one struct type.
pub struct CompiledSchema {
    pub(crate) id: SchemaId,
    pub(crate) name: String,
    /// Sorted ascending by tag; the slot index is the position here.
    pub(crate) fields: Vec<CompiledField>,
    /// O(1) decode routing: tag → slot.
    pub(crate) tag_lookup: [Option<u16>; 256],
    pub(crate) required_mask: SlotMask,
    #[allow(dead_code)]
    pub(crate) default_mask: SlotMask,
    pub(crate) omit_defaults: bool,
    pub(crate) forbid_unknown: bool,
}

impl CompiledSchema {
    pub fn id(&self) -> SchemaId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Slot index for a field name, if the schema has it.
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Slot index for a tag, if the schema routes it.
    pub fn slot_of_tag(&self, tag: u8) -> Option<usize> {
        self.tag_lookup[tag as usize].map(|slot| slot as usize)
    }

    pub(crate) fn field(&self, slot: usize) -> &CompiledField {
        &self.fields[slot]
    }
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("fields", &self.fields.len())
            .field("omit_defaults", &self.omit_defaults)
            .field("forbid_unknown", &self.forbid_unknown)
            .finish()
    }
}

#[derive(Default)]
struct RegistryInner {
    slots: Vec<Option<Arc<CompiledSchema>>>,
    names: HashMap<String, SchemaId>,
}

/// Process-level store of compiled schemas.
///
/// Registration takes the write lock briefly; every encode/decode only
/// takes the read lock, so readers never block readers. Cloned `Arc`s of
/// compiled schemas outlive the lock.
#[derive(Default)]
pub struct SchemaRegistry {
    inner: RwLock<RegistryInner>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an id for `name` without defining it yet.
    ///
    /// Idempotent: declaring an already-known name returns its existing
    /// id. This is how self-referential and mutually recursive types are
    /// described before all of their parts exist.
    pub fn declare(&self, name: &str) -> SchemaId {
        let mut inner = self.inner.write();
        if let Some(id) = inner.names.get(name) {
            return *id;
        }
        let id = SchemaId(inner.slots.len() as u32);
        inner.slots.push(None);
        inner.names.insert(name.to_owned(), id);
        id
    }

    /// Compile and store a descriptor, returning its id.
    ///
    /// Equivalent to `declare` followed by [`define`](Self::define).
    pub fn register(&self, descriptor: StructDescriptor) -> Result<SchemaId, SchemaError> {
        let id = self.declare(&descriptor.name);
        self.define(id, descriptor)?;
        Ok(id)
    }

    /// Fill a previously declared slot with its compiled schema.
    pub fn define(&self, id: SchemaId, descriptor: StructDescriptor) -> Result<(), SchemaError> {
        let compiled = self.compile(id, descriptor)?;
        let mut inner = self.inner.write();
        let slot = inner
            .slots
            .get_mut(id.0 as usize)
            .ok_or(SchemaError::UnknownId { id: id.0 })?;
        if slot.is_some() {
            return Err(SchemaError::AlreadyDefined {
                name: compiled.name,
            });
        }
        *slot = Some(Arc::new(compiled));
        Ok(())
    }

    /// Look up the id registered for `name`.
    pub fn schema_id(&self, name: &str) -> Option<SchemaId> {
        self.inner.read().names.get(name).copied()
    }

    /// Fetch a defined schema; declared-but-undefined slots are an error.
    pub fn get(&self, id: SchemaId) -> Result<Arc<CompiledSchema>, SchemaError> {
        let inner = self.inner.read();
        let slot = inner
            .slots
            .get(id.0 as usize)
            .ok_or(SchemaError::UnknownId { id: id.0 })?;
        slot.clone().ok_or_else(|| {
            let name = inner
                .names
                .iter()
                .find(|(_, v)| **v == id)
                .map(|(k, _)| k.clone())
                .unwrap_or_else(|| format!("#{}", id.0));
            SchemaError::Undefined { name }
        })
    }

    /// A fresh record with every slot unset, ready for field assignment.
    pub fn new_record(&self, id: SchemaId) -> Result<Record, SchemaError> {
        Ok(Record::new(self.get(id)?))
    }

    /// Encode `record` against its schema.
    ///
    /// The top-level struct is emitted as a bare field sequence; nested
    /// struct fields are framed with `StructBegin`/`StructEnd`.
    pub fn encode(&self, record: &Record, options: &EncodeOptions) -> Result<Bytes, CodecError> {
        match options.endian {
            Endian::Big => encode_record::<BigEndian>(self, record, options),
            Endian::Little => encode_record::<LittleEndian>(self, record, options),
        }
    }

    /// Decode `data` against the schema registered under `id`.
    pub fn decode(
        &self,
        data: &[u8],
        id: SchemaId,
        options: &DecodeOptions,
    ) -> Result<Record, CodecError> {
        match options.endian {
            Endian::Big => decode_record::<BigEndian>(self, data, id, options),
            Endian::Little => decode_record::<LittleEndian>(self, data, id, options),
        }
    }

    /// Compile a descriptor into its immutable runtime form.
    ///
    /// Validates tag range and uniqueness, resolves (or forward-declares)
    /// named struct references, compiles patterns and derives the
    /// effective default of every slot.
    fn compile(
        &self,
        id: SchemaId,
        descriptor: StructDescriptor,
    ) -> Result<CompiledSchema, SchemaError> {
        let StructDescriptor {
            name: schema_name,
            fields,
            omit_defaults,
            forbid_unknown,
        } = descriptor;

        let mut compiled: Vec<CompiledField> = Vec::with_capacity(fields.len());
        let mut tags_seen: HashMap<u8, String> = HashMap::new();
        let mut names_seen: HashMap<String, ()> = HashMap::new();

        for field in fields {
            if field.tag > u8::MAX as u16 {
                return Err(SchemaError::TagOutOfRange {
                    schema: schema_name,
                    field: field.name,
                    tag: field.tag,
                });
            }
            let tag = field.tag as u8;
            if let Some(first) = tags_seen.get(&tag) {
                return Err(SchemaError::DuplicateTag {
                    schema: schema_name,
                    tag: field.tag,
                    first: first.clone(),
                    second: field.name,
                });
            }
            tags_seen.insert(tag, field.name.clone());
            if names_seen.insert(field.name.clone(), ()).is_some() {
                return Err(SchemaError::DuplicateName {
                    schema: schema_name,
                    name: field.name,
                });
            }

            let kind = self.resolve_kind(field.kind);
            let constraints = match field.constraints {
                Some(c) => Some(compile_constraints(c, &field.name)?),
                None => None,
            };
            let optional = matches!(kind, FieldKind::Optional(_));
            let default = field.default.or_else(|| implicit_default(&kind));
            let required = !optional && default.is_none();

            compiled.push(CompiledField {
                name: field.name,
                tag,
                kind,
                default,
                constraints,
                optional,
                required,
                has_custom_serializer: field.has_custom_serializer,
                has_custom_deserializer: field.has_custom_deserializer,
            });
        }

        compiled.sort_by_key(|f| f.tag);

        let mut tag_lookup = [None; 256];
        let mut required_mask = SlotMask::default();
        let mut default_mask = SlotMask::default();
        for (slot, field) in compiled.iter().enumerate() {
            tag_lookup[field.tag as usize] = Some(slot as u16);
            if field.required {
                required_mask.set(slot);
            }
            if field.default.is_some() || field.optional {
                default_mask.set(slot);
            }
        }

        Ok(CompiledSchema {
            id,
            name: schema_name,
            fields: compiled,
            tag_lookup,
            required_mask,
            default_mask,
            omit_defaults,
            forbid_unknown,
        })
    }

    /// Rewrite every named struct reference in a kind tree to an id,
    /// declaring forward references as needed.
    fn resolve_kind(&self, kind: FieldKind) -> FieldKind {
        match kind {
            FieldKind::Struct(SchemaRef::Named(name)) => {
                FieldKind::Struct(SchemaRef::Id(self.declare(&name)))
            }
            FieldKind::List(inner) => FieldKind::List(Box::new(self.resolve_kind(*inner))),
            FieldKind::Set(inner) => FieldKind::Set(Box::new(self.resolve_kind(*inner))),
            FieldKind::Optional(inner) => {
                FieldKind::Optional(Box::new(self.resolve_kind(*inner)))
            }
            FieldKind::Tuple(items) => {
                FieldKind::Tuple(items.into_iter().map(|k| self.resolve_kind(k)).collect())
            }
            FieldKind::Map(key, value) => FieldKind::Map(
                Box::new(self.resolve_kind(*key)),
                Box::new(self.resolve_kind(*value)),
            ),
            FieldKind::Union(items) => {
                FieldKind::Union(items.into_iter().map(|k| self.resolve_kind(k)).collect())
            }
            other => other,
        }
    }
}

/// Resolve a kind's schema reference, which `resolve_kind` has already
/// rewritten to an id.
pub(crate) fn struct_schema(
    registry: &SchemaRegistry,
    reference: &SchemaRef,
) -> Result<Arc<CompiledSchema>, SchemaError> {
    match reference {
        SchemaRef::Id(id) => registry.get(*id),
        SchemaRef::Named(name) => {
            let id = registry
                .schema_id(name)
                .ok_or_else(|| SchemaError::Undefined { name: name.clone() })?;
            registry.get(id)
        }
    }
}

fn compile_constraints(
    constraints: FieldConstraints,
    field: &str,
) -> Result<CompiledConstraints, SchemaError> {
    let pattern = match constraints.pattern.as_deref() {
        Some(raw) => Some(Regex::new(raw).map_err(|e| SchemaError::InvalidPattern {
            field: field.to_owned(),
            reason: e.to_string(),
        })?),
        None => None,
    };
    Ok(CompiledConstraints {
        gt: constraints.gt,
        lt: constraints.lt,
        ge: constraints.ge,
        le: constraints.le,
        min_len: constraints.min_len,
        max_len: constraints.max_len,
        pattern,
    })
}

/// The default a slot falls back to when the field carries none of its
/// own: optionals default to absent, containers to empty.
fn implicit_default(kind: &FieldKind) -> Option<TarsValue> {
    match kind {
        FieldKind::List(_) | FieldKind::Set(_) => Some(TarsValue::List(Vec::new())),
        FieldKind::Map(_, _) => Some(TarsValue::Map(Vec::new())),
        _ => None,
    }
}

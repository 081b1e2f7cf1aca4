//! # tars-codec
//!
//! A schema-driven codec engine for Tencent's Tars/JCE binary
//! serialization protocol: the self-describing Tag–Type–Value format used
//! for cross-service RPC payloads.
//!
//! - Compact reader/writer for the JCE wire format: 15 type codes,
//!   variable-width heads, integer auto-compaction, the `ZeroTag`
//!   optimization and the `SimpleList` byte-array fast path
//! - A schema compiler that turns declarative field descriptors (tags,
//!   kinds, defaults, constraints) into immutable compiled schemas with
//!   O(1) tag routing
//! - Tolerant, order-independent decoding: unknown and out-of-order tags
//!   are handled for forward/backward schema evolution
//! - Bounded recursion depth and container limits, checked before any
//!   allocation sized by attacker-controlled lengths
//! - A schemaless sibling mode that round-trips tag→value maps, a
//!   structure prober, and a diagnostic trace decoder
//!
//! ## Example
//!
//! ```rust
//! use tars_codec::{
//!     DecodeOptions, EncodeOptions, FieldDescriptor, FieldKind, IntWidth, SchemaRegistry,
//!     StructDescriptor,
//! };
//!
//! let registry = SchemaRegistry::new();
//! let user = registry
//!     .register(
//!         StructDescriptor::new("User")
//!             .field(FieldDescriptor::new("uid", 0, FieldKind::Int(IntWidth::W64)))
//!             .field(FieldDescriptor::new("name", 1, FieldKind::Str)),
//!     )
//!     .unwrap();
//!
//! let mut record = registry.new_record(user).unwrap();
//! record.set("uid", 123i64).unwrap();
//! record.set("name", "Alice").unwrap();
//!
//! let bytes = registry.encode(&record, &EncodeOptions::default()).unwrap();
//! let decoded = registry
//!     .decode(&bytes, user, &DecodeOptions::default())
//!     .unwrap();
//! assert_eq!(decoded.get("uid").and_then(|v| v.as_int()), Some(123));
//! assert_eq!(decoded.get("name").and_then(|v| v.as_str()), Some("Alice"));
//! ```
//!
//! ## Schemaless mode
//!
//! ```rust
//! use tars_codec::{decode_generic, encode_generic, DecodeOptions, EncodeOptions, TarsValue};
//!
//! let mut map = tars_codec::StructMap::new();
//! map.insert(0, TarsValue::Int(42));
//! map.insert(1, TarsValue::Str("ping".into()));
//!
//! let bytes = encode_generic(&TarsValue::Struct(map.clone()), &EncodeOptions::default()).unwrap();
//! let back = decode_generic(&bytes, &DecodeOptions::default()).unwrap();
//! assert_eq!(back, TarsValue::Struct(map));
//! ```
//!
//! The wire format itself is untyped at the zero point: `false`, `0` and
//! `0.0` all encode as a head-only `ZeroTag`, and the schemaless decoder
//! returns `Int(0)` for any of them. Decoding against a schema restores
//! the declared kind.

pub mod decode;
pub mod error;
pub mod generic;
pub mod reader;
pub mod schema;
pub mod trace;
pub mod value;
pub mod wire;
pub mod writer;

mod encode;

use byteorder::{BigEndian, LittleEndian};
use bytes::Bytes;

use crate::error::FieldPath;
use crate::reader::Reader;
use crate::wire::Endianness;
use crate::writer::Writer;

pub use crate::decode::Record;
pub use crate::error::{CodecError, Result, SchemaError};
pub use crate::generic::BytesMode;
pub use crate::schema::{
    CompiledSchema, FieldConstraints, FieldDescriptor, FieldKind, IntWidth, SchemaId, SchemaRef,
    SchemaRegistry, StructDescriptor,
};
pub use crate::trace::TraceNode;
pub use crate::value::{StructMap, TarsValue};
pub use crate::wire::{Endian, WireType};

/// Per-call resource guards.
///
/// Every declared container/string/bytes length is checked against these
/// (and against the remaining buffer) before any allocation proportional
/// to it; recursive descent is bounded by `max_depth` on both encode and
/// decode. Exceeding a limit is an error, never an abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum nesting of structs, lists and maps. Default 100.
    pub max_depth: usize,
    /// Maximum declared element/pair count for a single container.
    pub max_container_len: usize,
    /// Maximum declared byte length of a string payload.
    pub max_string_len: usize,
    /// Maximum declared byte length of a `SimpleList` payload.
    pub max_bytes_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: 100,
            max_container_len: 10_000_000,
            max_string_len: 100 * 1024 * 1024,
            max_bytes_len: 100 * 1024 * 1024,
        }
    }
}

impl Limits {
    /// A depth-only override, keeping the default size limits.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }
}

/// Options for encode calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeOptions {
    /// Byte order for multi-byte numerics; big-endian is the protocol
    /// default.
    pub endian: Endian,
    pub limits: Limits,
}

/// Options for decode calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    /// Byte order for multi-byte numerics; big-endian is the protocol
    /// default.
    pub endian: Endian,
    pub limits: Limits,
    /// How the schemaless decoder treats byte payloads; see [`BytesMode`].
    pub bytes_mode: BytesMode,
}

/// Encode a [`TarsValue`] without a schema.
///
/// A `Struct` value becomes a bare top-level field sequence with its keys
/// as tags (the Tars convention); any other value is written as a single
/// field at tag 0.
pub fn encode_generic(value: &TarsValue, options: &EncodeOptions) -> Result<Bytes> {
    fn run<E: Endianness>(value: &TarsValue, options: &EncodeOptions) -> Result<Bytes> {
        let mut writer = Writer::<E>::new(options.limits);
        let mut path = FieldPath::root();
        generic::encode_root(&mut writer, value, &mut path)?;
        Ok(writer.into_bytes())
    }
    match options.endian {
        Endian::Big => run::<BigEndian>(value, options),
        Endian::Little => run::<LittleEndian>(value, options),
    }
}

/// Decode bytes without a schema into a tag-keyed [`TarsValue::Struct`].
///
/// Integer payloads stay in their promoted 64-bit form; no defaults or
/// constraints apply. `options.bytes_mode` controls whether byte payloads
/// are upgraded to text or probed for embedded structs.
pub fn decode_generic(data: &[u8], options: &DecodeOptions) -> Result<TarsValue> {
    fn run<E: Endianness>(data: &[u8], options: &DecodeOptions) -> Result<TarsValue> {
        let mut reader = Reader::<E>::new(data, options.limits);
        let mut path = FieldPath::root();
        let map = generic::decode_root(&mut reader, &mut path)?;
        Ok(generic::apply_bytes_mode::<E>(
            TarsValue::Struct(map),
            options.bytes_mode,
            &options.limits,
        ))
    }
    match options.endian {
        Endian::Big => run::<BigEndian>(data, options),
        Endian::Little => run::<LittleEndian>(data, options),
    }
}

/// Does `data` decode *exactly* as a struct, consuming every byte?
///
/// Runs an allocation-free structural scan first, then a full schemaless
/// decode; any error, leftover bytes, or an empty result yields `None`.
/// Limits are honoured throughout, so hostile input cannot exhaust
/// resources.
pub fn probe_struct(data: &[u8], limits: &Limits) -> Option<TarsValue> {
    trace::probe_value::<BigEndian>(data, limits)
}

/// Decode `data` into a diagnostic [`TraceNode`] tree.
///
/// Walks the structure like the decoders but records every
/// `(tag, type, value)` it sees, without applying constraints and without
/// failing on unknown tags. With a schema, nodes are annotated with field
/// names and declared kinds. Partially invalid payloads yield a tree whose
/// offending node carries the error.
pub fn decode_trace(
    data: &[u8],
    schema: Option<(&SchemaRegistry, SchemaId)>,
    limits: &Limits,
) -> TraceNode {
    trace::trace_bytes::<BigEndian>(data, schema, limits)
}

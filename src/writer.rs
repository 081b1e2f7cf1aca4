//! Append-only writer producing JCE-encoded bytes.

use std::marker::PhantomData;

use byteorder::BigEndian;
use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CodecError, FieldPath, Result};
use crate::wire::{Endianness, WireType};
use crate::Limits;

/// Growable buffer with tagged, size-adaptive writes.
///
/// Integers are compacted to the smallest wire form that holds them (with
/// exact zero collapsing to a head-only `ZeroTag`), strings switch from
/// `String1` to `String4` at 256 bytes, and byte arrays always use the
/// `SimpleList` fast path. Container writes charge the same depth budget
/// the reader enforces on decode.
pub struct Writer<E: Endianness = BigEndian> {
    buf: BytesMut,
    depth: usize,
    limits: Limits,
    _endian: PhantomData<E>,
}

impl<E: Endianness> Writer<E> {
    pub fn new(limits: Limits) -> Self {
        Self {
            buf: BytesMut::with_capacity(128),
            depth: 0,
            limits,
            _endian: PhantomData,
        }
    }

    /// Freeze the accumulated output.
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Write a field head (1 byte for tags below 15, 2 bytes otherwise).
    #[inline]
    pub fn write_head(&mut self, tag: u8, wire_type: WireType) {
        let mut head = [0u8; 2];
        let len = crate::wire::encode_head(tag, wire_type, &mut head);
        self.buf.put_slice(&head[..len]);
    }

    #[inline]
    fn put_i16(&mut self, value: i16) {
        let mut raw = [0u8; 2];
        E::write_i16(&mut raw, value);
        self.buf.put_slice(&raw);
    }

    #[inline]
    fn put_i32(&mut self, value: i32) {
        let mut raw = [0u8; 4];
        E::write_i32(&mut raw, value);
        self.buf.put_slice(&raw);
    }

    #[inline]
    fn put_i64(&mut self, value: i64) {
        let mut raw = [0u8; 8];
        E::write_i64(&mut raw, value);
        self.buf.put_slice(&raw);
    }

    #[inline]
    fn put_u32(&mut self, value: u32) {
        let mut raw = [0u8; 4];
        E::write_u32(&mut raw, value);
        self.buf.put_slice(&raw);
    }

    /// Write an integer using the smallest wire form that holds it.
    pub fn write_int(&mut self, tag: u8, value: i64) {
        if value == 0 {
            self.write_head(tag, WireType::ZeroTag);
        } else if (i8::MIN as i64..=i8::MAX as i64).contains(&value) {
            self.write_head(tag, WireType::Int1);
            self.buf.put_u8(value as u8);
        } else if (i16::MIN as i64..=i16::MAX as i64).contains(&value) {
            self.write_head(tag, WireType::Int2);
            self.put_i16(value as i16);
        } else if (i32::MIN as i64..=i32::MAX as i64).contains(&value) {
            self.write_head(tag, WireType::Int4);
            self.put_i32(value as i32);
        } else {
            self.write_head(tag, WireType::Int8);
            self.put_i64(value);
        }
    }

    /// Write a single-precision float.
    ///
    /// Exactly `+0.0` (bit pattern all zeros) collapses to `ZeroTag`;
    /// `-0.0` keeps its payload so the sign bit survives a round-trip.
    pub fn write_float(&mut self, tag: u8, value: f32) {
        if value.to_bits() == 0 {
            self.write_head(tag, WireType::ZeroTag);
            return;
        }
        self.write_head(tag, WireType::Float);
        let mut raw = [0u8; 4];
        E::write_f32(&mut raw, value);
        self.buf.put_slice(&raw);
    }

    /// Write a double-precision float; same zero convention as
    /// [`write_float`](Self::write_float).
    pub fn write_double(&mut self, tag: u8, value: f64) {
        if value.to_bits() == 0 {
            self.write_head(tag, WireType::ZeroTag);
            return;
        }
        self.write_head(tag, WireType::Double);
        let mut raw = [0u8; 8];
        E::write_f64(&mut raw, value);
        self.buf.put_slice(&raw);
    }

    /// Write a bool: `ZeroTag` for false, `Int1` carrying 1 for true.
    pub fn write_bool(&mut self, tag: u8, value: bool) {
        self.write_int(tag, i64::from(value));
    }

    /// Write a string, choosing `String1` below 256 bytes and `String4`
    /// above.
    pub fn write_string(&mut self, tag: u8, value: &str) -> Result<()> {
        let raw = value.as_bytes();
        if raw.len() <= u8::MAX as usize {
            self.write_head(tag, WireType::String1);
            self.buf.put_u8(raw.len() as u8);
        } else if raw.len() <= u32::MAX as usize {
            self.write_head(tag, WireType::String4);
            self.put_u32(raw.len() as u32);
        } else {
            return Err(CodecError::LimitExceeded {
                path: FieldPath::ROOT.to_owned(),
                declared: raw.len(),
                limit: u32::MAX as usize,
            });
        }
        self.buf.put_slice(raw);
        Ok(())
    }

    /// Write a byte array as a `SimpleList`: outer head, inner
    /// `(tag 0, Int1)` marker, compacted length, raw payload.
    pub fn write_bytes(&mut self, tag: u8, value: &[u8]) {
        self.write_head(tag, WireType::SimpleList);
        self.write_head(0, WireType::Int1);
        self.write_int(0, value.len() as i64);
        self.buf.put_slice(value);
    }

    /// Write a `List` frame: head, compacted count at tag 0, then `write`
    /// emits each element at tag 0.
    pub fn write_list(
        &mut self,
        tag: u8,
        len: usize,
        write: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        self.write_head(tag, WireType::List);
        self.write_int(0, len as i64);
        self.descend()?;
        let result = write(self);
        self.ascend();
        result
    }

    /// Write a `Map` frame: head, compacted pair count at tag 0, then
    /// `write` emits each key at tag 0 and each value at tag 1, in the
    /// caller's iteration order.
    pub fn write_map(
        &mut self,
        tag: u8,
        len: usize,
        write: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        self.write_head(tag, WireType::Map);
        self.write_int(0, len as i64);
        self.descend()?;
        let result = write(self);
        self.ascend();
        result
    }

    /// Write a nested struct frame: `StructBegin`, the fields emitted by
    /// `write`, then a `StructEnd` at tag 0.
    pub fn write_struct(
        &mut self,
        tag: u8,
        write: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        self.write_head(tag, WireType::StructBegin);
        self.descend()?;
        let result = write(self);
        self.ascend();
        result?;
        self.write_head(0, WireType::StructEnd);
        Ok(())
    }

    #[inline]
    fn descend(&mut self) -> Result<()> {
        if self.depth >= self.limits.max_depth {
            return Err(CodecError::DepthExceeded {
                path: FieldPath::ROOT.to_owned(),
                limit: self.limits.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    #[inline]
    fn ascend(&mut self) {
        self.depth -= 1;
    }
}

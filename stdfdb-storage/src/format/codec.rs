//! Primitive STDF field codec.
//!
//! `FieldReader` walks a record body at a fixed byte order. STDF lets a
//! writer drop any number of trailing fields, so the reader distinguishes
//! required fields (`u1()`, `cn()`, ...) from optional ones read through
//! [`FieldReader::opt`], which yields `None` once the body is exhausted.
//! After the first failed read the reader is poisoned: every later optional
//! field is `None` as well, so a half-read value never shifts the fields
//! behind it.
//!
//! `FieldWriter` mirrors this: the first `None` written through
//! [`FieldWriter::opt`] stops the writer and every later field is dropped.

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use serde::{Deserialize, Serialize};

use stdfdb_core::error::{Error, Result};
use stdfdb_core::types::ByteOrder;

/// One element of a `Vn` (generic data) field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GenericValue {
    Pad,
    U1(u8),
    U2(u16),
    U4(u32),
    I1(i8),
    I2(i16),
    I4(i32),
    R4(f32),
    R8(f64),
    Cn(String),
    Bn(Vec<u8>),
    Dn(BitField),
    N1(u8),
}

impl GenericValue {
    pub fn type_code(&self) -> u8 {
        match self {
            GenericValue::Pad => 0,
            GenericValue::U1(_) => 1,
            GenericValue::U2(_) => 2,
            GenericValue::U4(_) => 3,
            GenericValue::I1(_) => 4,
            GenericValue::I2(_) => 5,
            GenericValue::I4(_) => 6,
            GenericValue::R4(_) => 7,
            GenericValue::R8(_) => 8,
            GenericValue::Cn(_) => 10,
            GenericValue::Bn(_) => 11,
            GenericValue::Dn(_) => 12,
            GenericValue::N1(_) => 13,
        }
    }
}

impl std::fmt::Display for GenericValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenericValue::Pad => Ok(()),
            GenericValue::U1(v) | GenericValue::N1(v) => write!(f, "{}", v),
            GenericValue::U2(v) => write!(f, "{}", v),
            GenericValue::U4(v) => write!(f, "{}", v),
            GenericValue::I1(v) => write!(f, "{}", v),
            GenericValue::I2(v) => write!(f, "{}", v),
            GenericValue::I4(v) => write!(f, "{}", v),
            GenericValue::R4(v) => write!(f, "{}", v),
            GenericValue::R8(v) => write!(f, "{}", v),
            GenericValue::Cn(s) => f.write_str(s),
            GenericValue::Bn(b) => write!(f, "{:02X?}", b),
            GenericValue::Dn(d) => write!(f, "{}", d),
        }
    }
}

/// `Dn` field: a bit count and the bytes holding those bits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitField {
    pub bit_len: u16,
    pub bytes: Vec<u8>,
}

impl BitField {
    pub fn from_bits(bits: &[bool]) -> Self {
        let mut bytes = vec![0u8; bits.len().div_ceil(8)];
        for (i, bit) in bits.iter().enumerate() {
            if *bit {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        Self { bit_len: bits.len() as u16, bytes }
    }

    pub fn is_set(&self, bit: usize) -> bool {
        bit < self.bit_len as usize && self.bytes.get(bit / 8).is_some_and(|b| b & (1 << (bit % 8)) != 0)
    }
}

impl std::fmt::Display for BitField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for bit in 0..self.bit_len as usize {
            f.write_str(if self.is_set(bit) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Reader over one record body
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
    order: ByteOrder,
    poisoned: bool,
    last_present: bool,
}

macro_rules! read_fixed {
    ($name:ident, $ty:ty, $size:expr, $method:ident) => {
        pub fn $name(&mut self) -> Result<$ty> {
            let bytes = self.take($size)?;
            Ok(match self.order {
                ByteOrder::LittleEndian => LittleEndian::$method(bytes),
                ByteOrder::BigEndian => BigEndian::$method(bytes),
            })
        }
    };
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8], order: ByteOrder) -> Self {
        Self { buf, pos: 0, order, poisoned: false, last_present: true }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// True once the body is consumed or a read has failed
    pub fn is_exhausted(&self) -> bool {
        self.poisoned || self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.poisoned || self.remaining() < n {
            let remaining = if self.poisoned { 0 } else { self.remaining() };
            self.poisoned = true;
            return Err(Error::TruncatedRecord {
                at: self.pos as u64,
                needed: n,
                remaining,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// Read an optional trailing field
    pub fn opt<T>(&mut self, read: impl FnOnce(&mut Self) -> Result<T>) -> Option<T> {
        let value = if self.is_exhausted() { None } else { read(self).ok() };
        self.last_present = value.is_some();
        value
    }

    /// Read an optional count-prefixed array.
    ///
    /// A zero-length array occupies no bytes, so at the end of the body it is
    /// present exactly when the field before it was.
    pub fn opt_array<T>(
        &mut self,
        count: Option<usize>,
        read: impl FnOnce(&mut Self, usize) -> Result<Vec<T>>,
    ) -> Option<Vec<T>> {
        if count == Some(0) && self.last_present && !self.poisoned {
            return Some(Vec::new());
        }
        self.opt(|r| read(r, count.unwrap_or(0)))
    }

    pub fn u1(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn i1(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    /// B1: one byte of flag bits
    pub fn b1(&mut self) -> Result<u8> {
        self.u1()
    }

    /// C1: one ASCII character
    pub fn c1(&mut self) -> Result<char> {
        Ok(self.take(1)?[0] as char)
    }

    read_fixed!(u2, u16, 2, read_u16);
    read_fixed!(u4, u32, 4, read_u32);
    read_fixed!(u8, u64, 8, read_u64);
    read_fixed!(i2, i16, 2, read_i16);
    read_fixed!(i4, i32, 4, read_i32);
    read_fixed!(i8, i64, 8, read_i64);
    read_fixed!(r4, f32, 4, read_f32);
    read_fixed!(r8, f64, 8, read_f64);

    /// Cn: length byte followed by that many characters
    pub fn cn(&mut self) -> Result<String> {
        let len = self.u1()? as usize;
        if len == 0 {
            return Ok(String::new());
        }
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Skip a Cn without allocating
    pub fn skip_cn(&mut self) -> Result<()> {
        let len = self.u1()? as usize;
        self.skip(len)
    }

    /// Bn: length byte followed by that many bytes
    pub fn bn(&mut self) -> Result<Vec<u8>> {
        let len = self.u1()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// Dn: u2 bit count followed by ceil(bits / 8) bytes
    pub fn dn(&mut self) -> Result<BitField> {
        let bit_len = self.u2()?;
        let bytes = self.take((bit_len as usize).div_ceil(8))?.to_vec();
        Ok(BitField { bit_len, bytes })
    }

    pub fn skip_dn(&mut self) -> Result<()> {
        let bit_len = self.u2()? as usize;
        self.skip(bit_len.div_ceil(8))
    }

    /// kxN1: `count` nibbles packed two per byte, low nibble first
    pub fn nibbles(&mut self, count: usize) -> Result<Vec<u8>> {
        let bytes = self.take(count.div_ceil(2))?;
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            let byte = bytes[i / 2];
            out.push(if i % 2 == 0 { byte & 0x0F } else { byte >> 4 });
        }
        Ok(out)
    }

    /// kxTYPE: `count` elements read with `read`
    pub fn array<T>(&mut self, count: usize, mut read: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            out.push(read(self)?);
        }
        Ok(out)
    }

    /// kxCn
    pub fn cn_array(&mut self, count: usize) -> Result<Vec<String>> {
        self.array(count, Self::cn)
    }

    /// One Vn element: type code byte then the value
    pub fn vn(&mut self) -> Result<GenericValue> {
        let code = self.u1()?;
        Ok(match code {
            0 => GenericValue::Pad,
            1 => GenericValue::U1(self.u1()?),
            2 => GenericValue::U2(self.u2()?),
            3 => GenericValue::U4(self.u4()?),
            4 => GenericValue::I1(self.i1()?),
            5 => GenericValue::I2(self.i2()?),
            6 => GenericValue::I4(self.i4()?),
            7 => GenericValue::R4(self.r4()?),
            8 => GenericValue::R8(self.r8()?),
            10 => GenericValue::Cn(self.cn()?),
            11 => GenericValue::Bn(self.bn()?),
            12 => GenericValue::Dn(self.dn()?),
            13 => GenericValue::N1(self.u1()? & 0x0F),
            other => {
                self.poisoned = true;
                return Err(Error::Decode {
                    message: format!("Invalid generic data type code {} at byte {}", other, self.pos - 1),
                });
            }
        })
    }
}

/// Writer producing one record body
pub struct FieldWriter {
    buf: Vec<u8>,
    order: ByteOrder,
    stopped: bool,
}

macro_rules! write_fixed {
    ($name:ident, $ty:ty, $size:expr, $method:ident) => {
        pub fn $name(&mut self, value: $ty) {
            if self.stopped {
                return;
            }
            let mut bytes = [0u8; $size];
            match self.order {
                ByteOrder::LittleEndian => LittleEndian::$method(&mut bytes, value),
                ByteOrder::BigEndian => BigEndian::$method(&mut bytes, value),
            }
            self.buf.extend_from_slice(&bytes);
        }
    };
}

impl FieldWriter {
    pub fn new(order: ByteOrder) -> Self {
        Self { buf: Vec::new(), order, stopped: false }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Write an optional field; `None` ends the record
    pub fn opt<T>(&mut self, value: &Option<T>, write: impl FnOnce(&mut Self, &T)) {
        match value {
            Some(v) if !self.stopped => write(self, v),
            _ => self.stopped = true,
        }
    }

    fn put(&mut self, bytes: &[u8]) {
        if !self.stopped {
            self.buf.extend_from_slice(bytes);
        }
    }

    pub fn u1(&mut self, value: u8) {
        self.put(&[value]);
    }

    pub fn i1(&mut self, value: i8) {
        self.put(&[value as u8]);
    }

    pub fn b1(&mut self, value: u8) {
        self.u1(value);
    }

    pub fn c1(&mut self, value: char) {
        self.put(&[value as u8]);
    }

    write_fixed!(u2, u16, 2, write_u16);
    write_fixed!(u4, u32, 4, write_u32);
    write_fixed!(u8, u64, 8, write_u64);
    write_fixed!(i2, i16, 2, write_i16);
    write_fixed!(i4, i32, 4, write_i32);
    write_fixed!(i8, i64, 8, write_i64);
    write_fixed!(r4, f32, 4, write_f32);
    write_fixed!(r8, f64, 8, write_f64);

    /// Cn, truncated to 255 bytes
    pub fn cn(&mut self, value: &str) {
        let bytes = value.as_bytes();
        let len = bytes.len().min(255);
        self.u1(len as u8);
        self.put(&bytes[..len]);
    }

    pub fn bn(&mut self, value: &[u8]) {
        let len = value.len().min(255);
        self.u1(len as u8);
        self.put(&value[..len]);
    }

    pub fn dn(&mut self, value: &BitField) {
        self.u2(value.bit_len);
        let len = (value.bit_len as usize).div_ceil(8);
        let mut bytes = value.bytes.clone();
        bytes.resize(len, 0);
        self.put(&bytes);
    }

    pub fn nibbles(&mut self, values: &[u8]) {
        for pair in values.chunks(2) {
            let low = pair[0] & 0x0F;
            let high = pair.get(1).map(|v| (v & 0x0F) << 4).unwrap_or(0);
            self.u1(low | high);
        }
    }

    pub fn vn(&mut self, value: &GenericValue) {
        self.u1(value.type_code());
        match value {
            GenericValue::Pad => {}
            GenericValue::U1(v) | GenericValue::N1(v) => self.u1(*v),
            GenericValue::U2(v) => self.u2(*v),
            GenericValue::U4(v) => self.u4(*v),
            GenericValue::I1(v) => self.i1(*v),
            GenericValue::I2(v) => self.i2(*v),
            GenericValue::I4(v) => self.i4(*v),
            GenericValue::R4(v) => self.r4(*v),
            GenericValue::R8(v) => self.r8(*v),
            GenericValue::Cn(s) => self.cn(s),
            GenericValue::Bn(b) => self.bn(b),
            GenericValue::Dn(d) => self.dn(d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_both_orders() {
        let bytes = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(FieldReader::new(&bytes, ByteOrder::LittleEndian).u4().unwrap(), 0x0403_0201);
        assert_eq!(FieldReader::new(&bytes, ByteOrder::BigEndian).u4().unwrap(), 0x0102_0304);
        assert_eq!(FieldReader::new(&bytes, ByteOrder::BigEndian).u2().unwrap(), 0x0102);
    }

    #[test]
    fn test_cn_zero_length_is_empty() {
        let bytes = [0u8, 3, b'a', b'b', b'c'];
        let mut reader = FieldReader::new(&bytes, ByteOrder::LittleEndian);
        assert_eq!(reader.cn().unwrap(), "");
        assert_eq!(reader.cn().unwrap(), "abc");
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_truncated_read_poisons_reader() {
        // Cn declares 5 bytes but only 2 follow
        let bytes = [5u8, b'a', b'b'];
        let mut reader = FieldReader::new(&bytes, ByteOrder::LittleEndian);
        let err = reader.cn().unwrap_err();
        assert!(matches!(err, Error::TruncatedRecord { needed: 5, remaining: 2, .. }));
        assert!(reader.is_exhausted());
        assert_eq!(reader.opt(FieldReader::u1), None);
    }

    #[test]
    fn test_dn_rounds_bits_up() {
        let bytes = [9u8, 0, 0xFF, 0x01, 0xAA];
        let mut reader = FieldReader::new(&bytes, ByteOrder::LittleEndian);
        let field = reader.dn().unwrap();
        assert_eq!(field.bit_len, 9);
        assert_eq!(field.bytes, vec![0xFF, 0x01]);
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn test_nibbles_low_first() {
        let bytes = [0x21, 0x03];
        let mut reader = FieldReader::new(&bytes, ByteOrder::LittleEndian);
        assert_eq!(reader.nibbles(3).unwrap(), vec![1, 2, 3]);

        let mut writer = FieldWriter::new(ByteOrder::LittleEndian);
        writer.nibbles(&[1, 2, 3]);
        assert_eq!(writer.into_bytes(), bytes.to_vec());
    }

    #[test]
    fn test_empty_array_at_body_end() {
        // Count of zero is the last byte of the body
        let bytes = [0u8, 0];
        let mut reader = FieldReader::new(&bytes, ByteOrder::LittleEndian);
        let count = reader.opt(FieldReader::u2).map(usize::from);
        assert_eq!(count, Some(0));
        assert_eq!(reader.opt_array(count, FieldReader::nibbles), Some(vec![]));
        assert_eq!(reader.opt_array(count, |r, n| r.array(n, FieldReader::u2)), Some(vec![]));
        assert_eq!(reader.opt(FieldReader::cn), None);
        assert_eq!(reader.opt_array(count, FieldReader::nibbles), None);
        assert_eq!(reader.opt_array(None, FieldReader::nibbles), None);
    }

    #[test]
    fn test_vn_rejects_unknown_code() {
        let bytes = [9u8, 0, 0];
        let mut reader = FieldReader::new(&bytes, ByteOrder::LittleEndian);
        assert!(matches!(reader.vn(), Err(Error::Decode { .. })));
    }

    #[test]
    fn test_writer_stops_after_none() {
        let mut writer = FieldWriter::new(ByteOrder::BigEndian);
        writer.u2(7);
        writer.opt(&None::<u8>, |w, v| w.u1(*v));
        writer.opt(&Some(3u8), |w, v| w.u1(*v));
        writer.cn("ignored");
        assert_eq!(writer.into_bytes(), vec![0, 7]);
    }
}

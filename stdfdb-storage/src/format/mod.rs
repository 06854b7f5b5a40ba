//! # STDF v4 Binary Format
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬───────────────────────────┐
//! │ REC_LEN  │ REC_TYP  │ REC_SUB  │ body (REC_LEN bytes)      │
//! │   U2     │   U1     │   U1     │ fields per record schema  │
//! └──────────┴──────────┴──────────┴───────────────────────────┘
//! ```
//!
//! REC_LEN is written in the file's byte order, which is fixed by the
//! CPU_TYPE field of the leading FAR record.

pub mod codec;
pub mod order;
pub mod records;
pub mod schema;

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

use stdfdb_core::types::ByteOrder;

pub use codec::{BitField, FieldReader, FieldWriter, GenericValue};
pub use order::detect_byte_order;
pub use records::{Record, StdfRecord, TestHeader};
pub use schema::{decode_generic, FieldValue, RecordKind};

/// Four-byte record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub length: u16,
    pub typ: u8,
    pub sub: u8,
}

impl RecordHeader {
    pub const SIZE: usize = 4;

    pub fn parse(bytes: &[u8; 4], order: ByteOrder) -> Self {
        let length = match order {
            ByteOrder::LittleEndian => LittleEndian::read_u16(&bytes[..2]),
            ByteOrder::BigEndian => BigEndian::read_u16(&bytes[..2]),
        };
        Self { length, typ: bytes[2], sub: bytes[3] }
    }

    pub fn to_bytes(&self, order: ByteOrder) -> [u8; 4] {
        let mut out = [0u8; 4];
        match order {
            ByteOrder::LittleEndian => LittleEndian::write_u16(&mut out[..2], self.length),
            ByteOrder::BigEndian => BigEndian::write_u16(&mut out[..2], self.length),
        }
        out[2] = self.typ;
        out[3] = self.sub;
        out
    }

    pub fn kind(&self) -> Option<RecordKind> {
        RecordKind::from_code(self.typ, self.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_byte_order() {
        let header = RecordHeader { length: 0x0102, typ: 15, sub: 10 };
        assert_eq!(header.to_bytes(ByteOrder::LittleEndian), [0x02, 0x01, 15, 10]);
        assert_eq!(header.to_bytes(ByteOrder::BigEndian), [0x01, 0x02, 15, 10]);
        let parsed = RecordHeader::parse(&[0x01, 0x02, 15, 10], ByteOrder::BigEndian);
        assert_eq!(parsed, header);
        assert_eq!(parsed.kind(), Some(RecordKind::Ptr));
    }
}

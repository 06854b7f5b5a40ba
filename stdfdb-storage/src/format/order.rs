use std::io::Read;

use stdfdb_core::error::{Error, Result};
use stdfdb_core::types::ByteOrder;

/// Determine the byte order of a stream from its leading FAR record.
///
/// Consumes the first five bytes (header + CPU_TYPE). The record type and
/// subtype bytes do not depend on byte order, so they are checked first.
pub fn detect_byte_order<R: Read + ?Sized>(reader: &mut R) -> Result<ByteOrder> {
    let mut buf = [0u8; 5];
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    if filled < buf.len() {
        return Err(Error::format(format!(
            "Stream too short for an STDF file: {} bytes",
            filled
        )));
    }

    let (typ, sub) = (buf[2], buf[3]);
    if (typ, sub) != (0, 10) {
        return Err(Error::format(format!(
            "First record is ({}, {}), expected FAR (0, 10); not an STDF v4 file",
            typ, sub
        )));
    }

    Ok(ByteOrder::from_cpu_type(buf[4]))
}

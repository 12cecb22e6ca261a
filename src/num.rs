//! Little-endian integer helpers shared by every codec reader/writer.
//!
//! Fixed width regardless of host endianness, matching the reference
//! crate's own use of `scroll`'s context-driven primitives for fixed-layout
//! fields.

use scroll::{Gread, Pwrite, LE};

use crate::error::Result;

pub fn read_u16(bytes: &[u8], offset: &mut usize) -> Result<u16> {
    Ok(bytes.gread_with::<u16>(offset, LE)?)
}

pub fn write_u16(buf: &mut Vec<u8>, value: u16) {
    let mut tmp = [0u8; 2];
    tmp.pwrite_with(value, 0, LE).expect("fixed-size buffer");
    buf.extend_from_slice(&tmp);
}

pub fn read_u24(bytes: &[u8], offset: &mut usize) -> Result<u32> {
    let start = *offset;
    if start + 3 > bytes.len() {
        return Err(scroll::Error::BadInput {
            size: bytes.len(),
            msg: "short read of a 24-bit field",
        }
        .into());
    }
    let value = bytes[start] as u32 | (bytes[start + 1] as u32) << 8 | (bytes[start + 2] as u32) << 16;
    *offset = start + 3;
    Ok(value)
}

pub fn write_u24(buf: &mut Vec<u8>, value: u32) {
    buf.push((value & 0xFF) as u8);
    buf.push(((value >> 8) & 0xFF) as u8);
    buf.push(((value >> 16) & 0xFF) as u8);
}

pub fn read_u32(bytes: &[u8], offset: &mut usize) -> Result<u32> {
    Ok(bytes.gread_with::<u32>(offset, LE)?)
}

pub fn write_u32(buf: &mut Vec<u8>, value: u32) {
    let mut tmp = [0u8; 4];
    tmp.pwrite_with(value, 0, LE).expect("fixed-size buffer");
    buf.extend_from_slice(&tmp);
}

/// Reads a width-dependent address/length/count field: 16 bits when `wide`
/// is false, 32 bits when true. Used for the header's nine fields and for
/// `read_count`/external/exported-symbol indices alike.
pub fn read_wide(bytes: &[u8], offset: &mut usize, wide: bool) -> Result<u32> {
    if wide {
        read_u32(bytes, offset)
    } else {
        Ok(read_u16(bytes, offset)? as u32)
    }
}

pub fn write_wide(buf: &mut Vec<u8>, value: u32, wide: bool) {
    if wide {
        write_u32(buf, value);
    } else {
        write_u16(buf, value as u16);
    }
}

/// Parses a C-style integer literal: `0x`/`0X` hex, a lone `0` or leading
/// zero for octal, otherwise decimal. Used for CLI address flags and the
/// relocator's imports-file values.
pub fn parse_c_uint(text: &str) -> Result<u32> {
    let text = text.trim();
    let (body, radix) = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        (hex, 16)
    } else if text.len() > 1 && text.starts_with('0') {
        (&text[1..], 8)
    } else {
        (text, 10)
    };
    u32::from_str_radix(body, radix).map_err(|_| {
        crate::error::Error::Malformed(format!("invalid integer literal: {text:?}"))
    })
}

/// Parses a run of hex digit pairs, tolerating interior whitespace (so
/// `"4c 00 00"` and `"4c0000"` both parse to the same three bytes).
pub fn parse_hex_bytes(text: &str) -> Result<Vec<u8>> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(crate::error::Error::Malformed(format!(
            "hex byte string {text:?} has an odd number of digits"
        )));
    }
    let mut bytes = Vec::with_capacity(digits.len() / 2);
    let chars: Vec<char> = digits.chars().collect();
    for pair in chars.chunks(2) {
        let byte_str: String = pair.iter().collect();
        let byte = u8::from_str_radix(&byte_str, 16).map_err(|_| {
            crate::error::Error::Malformed(format!("invalid hex byte {byte_str:?} in {text:?}"))
        })?;
        bytes.push(byte);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_u16() {
        let mut buf = Vec::new();
        write_u16(&mut buf, 0xBEEF);
        let mut offset = 0;
        assert_eq!(read_u16(&buf, &mut offset).unwrap(), 0xBEEF);
        assert_eq!(offset, 2);
    }

    #[test]
    fn roundtrip_u24() {
        let mut buf = Vec::new();
        write_u24(&mut buf, 0x00FE_DCBA & 0x00FF_FFFF);
        let mut offset = 0;
        assert_eq!(read_u24(&buf, &mut offset).unwrap(), 0x00FE_DCBA & 0x00FF_FFFF);
        assert_eq!(offset, 3);
    }

    #[test]
    fn roundtrip_u32() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 0xDEAD_BEEF);
        let mut offset = 0;
        assert_eq!(read_u32(&buf, &mut offset).unwrap(), 0xDEAD_BEEF);
        assert_eq!(offset, 4);
    }

    #[test]
    fn wide_selects_width() {
        let mut buf = Vec::new();
        write_wide(&mut buf, 0x1234, false);
        assert_eq!(buf.len(), 2);
        let mut buf32 = Vec::new();
        write_wide(&mut buf32, 0x1234_5678, true);
        assert_eq!(buf32.len(), 4);
    }

    #[test]
    fn c_uint_accepts_hex_octal_and_decimal() {
        assert_eq!(parse_c_uint("0x1234").unwrap(), 0x1234);
        assert_eq!(parse_c_uint("010").unwrap(), 8);
        assert_eq!(parse_c_uint("42").unwrap(), 42);
        assert!(parse_c_uint("not a number").is_err());
    }

    #[test]
    fn hex_bytes_tolerates_whitespace() {
        assert_eq!(parse_hex_bytes("4c 00 00").unwrap(), vec![0x4c, 0x00, 0x00]);
        assert_eq!(parse_hex_bytes("deadbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(parse_hex_bytes("abc").is_err());
    }
}

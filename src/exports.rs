//! The exported-symbol table: a width-prefixed count followed by
//! (name, segment id, value) records.

use log::warn;

use crate::error::Result;
use crate::header::Header;
use crate::num;
use crate::strz;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedSymbol {
    pub name: String,
    pub seg_id: u8,
    pub value: u32,
}

pub fn read_exports(bytes: &[u8], offset: &mut usize, header: &Header) -> Result<Vec<ExportedSymbol>> {
    let count = num::read_wide(bytes, offset, header.is_wide())?;
    let mut exports = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (name, truncated) = strz::read_string(bytes, offset, strz::MAX_NAME_LEN)?;
        if truncated {
            warn!("exported symbol name truncated at {} bytes", strz::MAX_NAME_LEN);
        }
        if *offset >= bytes.len() {
            return Err(crate::error::Error::from(scroll::Error::BadInput {
                size: bytes.len(),
                msg: "truncated exported symbol segment id",
            }));
        }
        let seg_id = bytes[*offset];
        *offset += 1;
        let value = num::read_wide(bytes, offset, header.is_wide())?;
        exports.push(ExportedSymbol { name, seg_id, value });
    }
    Ok(exports)
}

pub fn write_exports(buf: &mut Vec<u8>, exports: &[ExportedSymbol], header: &Header) {
    num::write_wide(buf, exports.len() as u32, header.is_wide());
    for export in exports {
        write_exported_symbol(buf, &export.name, export.seg_id, export.value, header);
    }
}

pub fn write_exported_symbol(buf: &mut Vec<u8>, name: &str, seg_id: u8, value: u32, header: &Header) {
    strz::write_string(buf, name);
    buf.push(seg_id);
    num::write_wide(buf, value, header.is_wide());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id;

    fn header() -> Header {
        Header {
            mode: 0,
            tbase: 0,
            tlen: 0,
            dbase: 0,
            dlen: 0,
            bbase: 0,
            blen: 0,
            zbase: 0,
            zlen: 0,
            stack: 0,
        }
    }

    #[test]
    fn roundtrip_exports() {
        let h = header();
        let exports = vec![ExportedSymbol {
            name: "main".to_string(),
            seg_id: id::SEGID_TEXT,
            value: 0x0800,
        }];
        let mut buf = Vec::new();
        write_exports(&mut buf, &exports, &h);
        let mut offset = 0;
        assert_eq!(read_exports(&buf, &mut offset, &h).unwrap(), exports);
        assert_eq!(offset, buf.len());
    }
}

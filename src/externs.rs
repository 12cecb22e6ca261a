//! The external-reference table: a width-prefixed count followed by that
//! many NUL-terminated names, indexed by `undef` relocations.

use log::warn;

use crate::error::Result;
use crate::header::Header;
use crate::num;
use crate::strz;

pub fn read_externs(bytes: &[u8], offset: &mut usize, header: &Header) -> Result<Vec<String>> {
    let count = num::read_wide(bytes, offset, header.is_wide())?;
    let mut names = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (name, truncated) = strz::read_string(bytes, offset, strz::MAX_NAME_LEN)?;
        if truncated {
            warn!("external reference name truncated at {} bytes", strz::MAX_NAME_LEN);
        }
        names.push(name);
    }
    Ok(names)
}

pub fn write_externs(buf: &mut Vec<u8>, names: &[String], header: &Header) {
    num::write_wide(buf, names.len() as u32, header.is_wide());
    for name in names {
        strz::write_string(buf, name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id;

    fn header(wide: bool) -> Header {
        Header {
            mode: if wide { id::MODE_32BIT } else { 0 },
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
    fn roundtrip_externs() {
        let h = header(false);
        let names = vec!["__IMAG_REGS".to_string(), "printf".to_string()];
        let mut buf = Vec::new();
        write_externs(&mut buf, &names, &h);
        let mut offset = 0;
        assert_eq!(read_externs(&buf, &mut offset, &h).unwrap(), names);
        assert_eq!(offset, buf.len());
    }

    #[test]
    fn wide_count_promotes_to_32bit_index_space() {
        let h = header(true);
        let names: Vec<String> = (0..3).map(|i| format!("sym{i}")).collect();
        let mut buf = Vec::new();
        write_externs(&mut buf, &names, &h);
        assert_eq!(&buf[0..4], &3u32.to_le_bytes());
    }
}

//! A complete `.o65` image: header, options, segment bytes, tables, and
//! an optional chained successor image.

use log::debug;

use crate::error::{Error, Result};
use crate::exports::{self, ExportedSymbol};
use crate::externs;
use crate::header::{self, Header};
use crate::id;
use crate::option::HeaderOption;
use crate::reloc::{self, RelocRecord};
use crate::num;

/// Chained images are physically smaller than their container (each one
/// starts further into the file than the last), so unbounded recursion
/// isn't possible from well-formed input; this still caps how many we'll
/// follow so a corrupt mode bit can't turn a small file into a large walk.
const MAX_CHAIN_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub header: Header,
    pub options: Vec<HeaderOption>,
    pub text: Vec<u8>,
    pub data: Vec<u8>,
    pub externs: Vec<String>,
    pub text_relocs: Vec<RelocRecord>,
    pub data_relocs: Vec<RelocRecord>,
    pub exports: Vec<ExportedSymbol>,
    pub next: Option<Box<Image>>,
}

pub fn read_image(bytes: &[u8], offset: &mut usize) -> Result<Image> {
    read_image_depth(bytes, offset, 0)
}

fn read_image_depth(bytes: &[u8], offset: &mut usize, depth: usize) -> Result<Image> {
    let header = header::read_header(bytes, offset)?;
    debug!(
        "read o65 image: mode={:#06x} tlen={:#x} dlen={:#x} blen={:#x} zlen={:#x}",
        header.mode, header.tlen, header.dlen, header.blen, header.zlen
    );

    let options = crate::option::read_options(bytes, offset)?;

    let text = read_segment(bytes, offset, header.tlen)?;
    let data = read_segment(bytes, offset, header.dlen)?;

    let externs = externs::read_externs(bytes, offset, &header)?;
    let text_relocs = reloc::read_stream(bytes, offset, &header)?;
    let data_relocs = reloc::read_stream(bytes, offset, &header)?;
    let exports = exports::read_exports(bytes, offset, &header)?;

    let next = if header.is_chained() {
        if depth + 1 >= MAX_CHAIN_DEPTH {
            return Err(Error::Malformed("chained image nesting too deep".to_string()));
        }
        Some(Box::new(read_image_depth(bytes, offset, depth + 1)?))
    } else {
        None
    };

    Ok(Image {
        header,
        options,
        text,
        data,
        externs,
        text_relocs,
        data_relocs,
        exports,
        next,
    })
}

/// Reads exactly `size` bytes into a freshly owned buffer.
fn read_segment(bytes: &[u8], offset: &mut usize, size: u32) -> Result<Vec<u8>> {
    let size = size as usize;
    if *offset + size > bytes.len() {
        return Err(Error::from(scroll::Error::BadInput {
            size: bytes.len(),
            msg: "truncated segment data",
        }));
    }
    let segment = bytes[*offset..*offset + size].to_vec();
    *offset += size;
    Ok(segment)
}

pub fn write_image(buf: &mut Vec<u8>, image: &mut Image) -> Result<()> {
    if image.next.is_some() {
        image.header.mode |= id::MODE_CHAIN;
    } else {
        image.header.mode &= !id::MODE_CHAIN;
    }
    header::write_header(buf, &mut image.header);

    crate::option::write_options(buf, &image.options)?;

    buf.extend_from_slice(&image.text);
    buf.extend_from_slice(&image.data);

    externs::write_externs(buf, &image.externs, &image.header);
    reloc::write_stream(buf, &image.text_relocs, &image.header);
    reloc::write_stream(buf, &image.data_relocs, &image.header);
    exports::write_exports(buf, &image.exports, &image.header);

    if let Some(next) = image.next.as_mut() {
        write_image(buf, next)?;
    }

    Ok(())
}

/// Reads a width-dependent count using the header's 32-bit-width flag,
/// exposed for callers (such as the relocator) that need to read ad hoc
/// counts outside the externs/exports tables.
pub fn read_count(bytes: &[u8], offset: &mut usize, header: &Header) -> Result<u32> {
    num::read_wide(bytes, offset, header.is_wide())
}

pub fn write_count(buf: &mut Vec<u8>, count: u32, header: &Header) {
    num::write_wide(buf, count, header.is_wide());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_header() -> Header {
        Header {
            mode: id::MODE_CPU_6502,
            tbase: 0x0800,
            tlen: 4,
            dbase: 0x0804,
            dlen: 2,
            bbase: 0x0806,
            blen: 0,
            zbase: 0,
            zlen: 0,
            stack: 0,
        }
    }

    fn sample_image() -> Image {
        Image {
            header: base_header(),
            options: vec![HeaderOption::string(id::OPT_AUTHOR, "jane")],
            text: vec![0xA9, 0x00, 0x60, 0xEA],
            data: vec![0x01, 0x02],
            externs: vec!["printf".to_string()],
            text_relocs: Vec::new(),
            data_relocs: Vec::new(),
            exports: vec![ExportedSymbol {
                name: "main".to_string(),
                seg_id: id::SEGID_TEXT,
                value: 0x0800,
            }],
            next: None,
        }
    }

    #[test]
    fn roundtrip_full_image() {
        let mut image = sample_image();
        let mut buf = Vec::new();
        write_image(&mut buf, &mut image).unwrap();

        let mut offset = 0;
        let read_back = read_image(&buf, &mut offset).unwrap();
        assert_eq!(offset, buf.len());
        assert_eq!(read_back.text, image.text);
        assert_eq!(read_back.data, image.data);
        assert_eq!(read_back.externs, image.externs);
        assert_eq!(read_back.exports, image.exports);
        assert!(read_back.next.is_none());
    }

    #[test]
    fn chained_image_roundtrips() {
        let mut second = sample_image();
        second.header.tbase = 0x2000;
        let mut first = sample_image();
        first.next = Some(Box::new(second));

        let mut buf = Vec::new();
        write_image(&mut buf, &mut first).unwrap();
        assert_ne!(first.header.mode & id::MODE_CHAIN, 0);

        let mut offset = 0;
        let read_back = read_image(&buf, &mut offset).unwrap();
        assert!(read_back.next.is_some());
        assert_eq!(read_back.next.unwrap().header.tbase, 0x2000);
        assert_eq!(offset, buf.len());
    }
}

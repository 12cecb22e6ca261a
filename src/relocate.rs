//! Resolves a `.o65` image's relocations against caller-supplied segment
//! addresses and an imports table, producing flat binary bytes ready to be
//! written to a program image at those addresses.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::header::Header;
use crate::id;
use crate::image::Image;
use crate::num;
use crate::reloc::{RelocKind, RelocRecord};

/// Caller-supplied overrides for where each segment lands in memory.
/// A `None` field falls back to the layout rule for that segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelocateOptions {
    pub text_addr: Option<u32>,
    pub data_addr: Option<u32>,
    pub bss_addr: Option<u32>,
    pub zp_addr: Option<u32>,
}

/// The relocated segment bytes, ready to be written out.
///
/// `data` already includes the zeroed `.bss` tail when the image's
/// `bsszero` mode bit is set; otherwise `.bss` is not represented in the
/// output at all, matching the format's "loader clears it" contract.
#[derive(Debug, Clone)]
pub struct RelocatedImage {
    pub text_addr: u32,
    pub text: Vec<u8>,
    pub data_addr: u32,
    pub data: Vec<u8>,
}

fn align_up(value: u32, align: u32) -> u32 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

fn check_aligned(name: &str, addr: u32, align: u32) -> Result<()> {
    if align > 1 && addr % align != 0 {
        Err(Error::Malformed(format!(
            "{name} address {addr:#x} is not a multiple of the segment alignment {align}"
        )))
    } else {
        Ok(())
    }
}

/// Parses an imports file: one `name value` pair per line, `#` starts a
/// comment that runs to end of line, blank lines are ignored. Values accept
/// C-style `0x`/octal/decimal literals.
pub fn parse_imports(text: &str) -> Result<HashMap<String, u32>> {
    let mut imports = HashMap::new();
    for (lineno, raw_line) in text.lines().enumerate() {
        let line = match raw_line.find('#') {
            Some(idx) => &raw_line[..idx],
            None => raw_line,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let name = parts.next().ok_or_else(|| {
            Error::Malformed(format!("imports file line {}: missing symbol name", lineno + 1))
        })?;
        let value = parts.next().ok_or_else(|| {
            Error::Malformed(format!("imports file line {}: missing value for {name}", lineno + 1))
        })?;
        if parts.next().is_some() {
            return Err(Error::Malformed(format!(
                "imports file line {}: too many fields",
                lineno + 1
            )));
        }
        imports.insert(name.to_string(), num::parse_c_uint(value)?);
    }
    Ok(imports)
}

fn patch_site(buf: &mut [u8], pos: usize, size: usize) -> Result<&mut [u8]> {
    if pos + size > buf.len() {
        return Err(Error::Malformed(format!(
            "relocation at offset {pos:#x} falls outside its {} byte segment",
            buf.len()
        )));
    }
    Ok(&mut buf[pos..pos + size])
}

fn apply_patch(
    buf: &mut [u8],
    pos: usize,
    kind: RelocKind,
    delta: i64,
    high_lo: Option<u8>,
    seg_lo16: Option<u16>,
) -> Result<()> {
    match kind {
        RelocKind::Low => {
            let site = patch_site(buf, pos, 1)?;
            site[0] = (site[0] as i64 + delta) as u8;
        }
        RelocKind::Word => {
            let site = patch_site(buf, pos, 2)?;
            let value = site[0] as u16 | (site[1] as u16) << 8;
            let new = (value as i64 + delta) as u16;
            site[0] = (new & 0xFF) as u8;
            site[1] = (new >> 8) as u8;
        }
        RelocKind::High => {
            let site = patch_site(buf, pos, 1)?;
            let low = high_lo.unwrap_or(0) as u32;
            let value = ((site[0] as u32) << 8) | low;
            let new = (value as i64 + delta) as u32;
            site[0] = ((new >> 8) & 0xFF) as u8;
        }
        RelocKind::SegAdr => {
            let site = patch_site(buf, pos, 3)?;
            let value = site[0] as u32 | (site[1] as u32) << 8 | (site[2] as u32) << 16;
            let new = (value as i64 + delta) as u32 & 0x00FF_FFFF;
            site[0] = (new & 0xFF) as u8;
            site[1] = ((new >> 8) & 0xFF) as u8;
            site[2] = ((new >> 16) & 0xFF) as u8;
        }
        RelocKind::Seg => {
            let site = patch_site(buf, pos, 1)?;
            let lo16 = seg_lo16.unwrap_or(0) as u32;
            let value = ((site[0] as u32) << 16) | lo16;
            let new = (value as i64 + delta) as u32;
            site[0] = ((new >> 16) & 0xFF) as u8;
        }
    }
    Ok(())
}

/// Walks a decoded relocation stream, replaying the same cursor-advance
/// rule the codec uses, patching each entry into `buf` (indexed from
/// `old_base`, the address the stream was originally encoded against).
fn apply_stream(
    records: &[RelocRecord],
    buf: &mut [u8],
    old_base: u32,
    resolved_externs: &[u32],
    delta_for: impl Fn(u8) -> Result<i64>,
) -> Result<()> {
    let mut cursor: i64 = old_base as i64 - 1;
    for record in records {
        match record {
            RelocRecord::Skip => cursor += 254,
            RelocRecord::Entry {
                offset,
                kind,
                seg_id,
                undefid,
                high_lo,
                seg_lo16,
            } => {
                cursor += *offset as i64;
                let addr = cursor as u32;
                let pos = (addr - old_base) as usize;

                let delta = if *seg_id == id::SEGID_UNDEF {
                    let idx = undefid.expect("undef entry carries an undefid") as usize;
                    match resolved_externs.get(idx) {
                        Some(&value) => value as i64,
                        None => {
                            return Err(Error::Malformed(format!(
                                "external index {idx} is out of range"
                            )))
                        }
                    }
                } else {
                    delta_for(*seg_id)?
                };

                apply_patch(buf, pos, *kind, delta, *high_lo, *seg_lo16)?;
            }
        }
    }
    Ok(())
}

/// Resolves every external against `imports`, returning the resolved
/// values in external-table order and the names that had no entry.
fn resolve_externs(externs: &[String], imports: &HashMap<String, u32>) -> (Vec<u32>, Vec<String>) {
    let mut resolved = Vec::with_capacity(externs.len());
    let mut missing = Vec::new();
    for name in externs {
        match imports.get(name) {
            Some(&value) => resolved.push(value),
            None => {
                missing.push(name.clone());
                resolved.push(0);
            }
        }
    }
    (resolved, missing)
}

fn segment_delta(header: &Header, new: &Layout) -> impl Fn(u8) -> Result<i64> + '_ {
    move |seg_id: u8| match seg_id {
        id::SEGID_TEXT => Ok(new.text_base as i64 - header.tbase as i64),
        id::SEGID_DATA => Ok(new.data_base as i64 - header.dbase as i64),
        id::SEGID_BSS => Ok(new.bss_base as i64 - header.bbase as i64),
        id::SEGID_ZEROPAGE => Ok(new.zp_base as i64 - header.zbase as i64),
        other => Err(Error::Malformed(format!(
            "{} is not a valid relocation source segment",
            id::segment_name(other)
        ))),
    }
}

struct Layout {
    text_base: u32,
    data_base: u32,
    bss_base: u32,
    zp_base: u32,
}

/// Lays out the image's segments at concrete addresses and patches every
/// relocation, resolving externals against `imports`.
///
/// Returns [`Error::UnresolvedExternals`] naming every import that had no
/// matching entry; relocations referencing those externals are still
/// patched (with a placeholder of zero) so the caller sees one complete
/// error listing everything that's missing rather than the first one hit.
pub fn relocate(
    image: &Image,
    options: &RelocateOptions,
    imports: &HashMap<String, u32>,
) -> Result<RelocatedImage> {
    let header = &image.header;
    if header.is_object() {
        return Err(Error::Malformed(
            "cannot relocate a .o65 object file, only a linked executable".to_string(),
        ));
    }

    let align = header.alignment();
    for (name, addr) in [
        ("text", options.text_addr),
        ("data", options.data_addr),
        ("bss", options.bss_addr),
        ("zeropage", options.zp_addr),
    ] {
        if let Some(addr) = addr {
            check_aligned(name, addr, align)?;
        }
    }

    if options.text_addr.is_none() && header.tbase == 0 {
        return Err(Error::Malformed("text load address cannot be zero".to_string()));
    }
    let text_base = options.text_addr.unwrap_or(header.tbase);
    check_aligned("text", text_base, align)?;

    let aligned_text_len = align_up(header.tlen, align);
    let aligned_data_len = align_up(header.dlen, align);
    let aligned_bss_len = align_up(header.blen, align);

    let data_base = options.data_addr.unwrap_or(text_base.wrapping_add(aligned_text_len));

    let bsszero = header.is_bsszero();
    let bss_base = if bsszero {
        data_base.wrapping_add(aligned_data_len)
    } else {
        options.bss_addr.unwrap_or(data_base.wrapping_add(aligned_data_len))
    };
    let zp_base = options.zp_addr.unwrap_or(header.zbase);

    let new = Layout {
        text_base,
        data_base,
        bss_base,
        zp_base,
    };

    let mut text_buf = vec![0u8; aligned_text_len as usize];
    text_buf[..image.text.len()].copy_from_slice(&image.text);

    let data_total_len = if bsszero {
        aligned_data_len as usize + aligned_bss_len as usize
    } else {
        aligned_data_len as usize
    };
    let mut data_buf = vec![0u8; data_total_len];
    data_buf[..image.data.len()].copy_from_slice(&image.data);

    let (resolved, mut missing) = resolve_externs(&image.externs, imports);

    let delta_for = segment_delta(header, &new);
    apply_stream(&image.text_relocs, &mut text_buf, header.tbase, &resolved, &delta_for)?;
    apply_stream(&image.data_relocs, &mut data_buf, header.dbase, &resolved, &delta_for)?;

    if !missing.is_empty() {
        missing.sort();
        missing.dedup();
        return Err(Error::UnresolvedExternals(missing));
    }

    Ok(RelocatedImage {
        text_addr: text_base,
        text: text_buf,
        data_addr: data_base,
        data: data_buf,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exports::ExportedSymbol;
    use crate::reloc::CursorBuilder;

    fn base_header(mode_extra: u16) -> Header {
        Header {
            mode: id::MODE_CPU_6502 | mode_extra,
            tbase: 0x0800,
            tlen: 4,
            dbase: 0x0804,
            dlen: 2,
            bbase: 0x0806,
            blen: 4,
            zbase: 0x0010,
            zlen: 2,
            stack: 0,
        }
    }

    fn image_with(mode_extra: u16) -> Image {
        Image {
            header: base_header(mode_extra),
            options: Vec::new(),
            text: vec![0xA9, 0x00, 0x4C, 0x00],
            data: vec![0x34, 0x12],
            externs: vec!["putc".to_string()],
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
    fn relocating_an_object_file_is_rejected() {
        let mut image = image_with(0);
        image.header.mode |= id::MODE_OBJ;
        let err = relocate(&image, &RelocateOptions::default(), &HashMap::new());
        assert!(matches!(err, Err(Error::Malformed(_))));
    }

    #[test]
    fn zero_tbase_without_override_is_rejected() {
        let mut image = image_with(0);
        image.header.tbase = 0;
        let err = relocate(&image, &RelocateOptions::default(), &HashMap::new());
        assert!(matches!(err, Err(Error::Malformed(_))));
    }

    #[test]
    fn zero_tbase_with_explicit_override_is_accepted() {
        let mut image = image_with(0);
        image.header.tbase = 0;
        let options = RelocateOptions {
            text_addr: Some(0x8000),
            ..Default::default()
        };
        let out = relocate(&image, &options, &HashMap::new()).unwrap();
        assert_eq!(out.text_addr, 0x8000);
    }

    #[test]
    fn default_layout_follows_original_addresses() {
        let image = image_with(0);
        let out = relocate(&image, &RelocateOptions::default(), &HashMap::new()).unwrap();
        assert_eq!(out.text_addr, 0x0800);
        assert_eq!(out.data_addr, 0x0804);
        assert_eq!(out.data.len(), 2);
    }

    #[test]
    fn bsszero_appends_zeroed_bss_to_data() {
        let image = image_with(id::MODE_BSSZERO);
        let out = relocate(&image, &RelocateOptions::default(), &HashMap::new()).unwrap();
        assert_eq!(out.data.len(), 2 + 4);
        assert_eq!(&out.data[2..], &[0, 0, 0, 0]);
    }

    #[test]
    fn non_bsszero_does_not_extend_data() {
        let image = image_with(0);
        let out = relocate(&image, &RelocateOptions::default(), &HashMap::new()).unwrap();
        assert_eq!(out.data.len(), 2);
    }

    #[test]
    fn word_relocation_is_rebased_by_segment_delta() {
        let mut image = image_with(0);
        let mut builder = CursorBuilder::new(image.header.tbase);
        builder.push(
            &mut image.text_relocs,
            image.header.tbase + 2,
            RelocKind::Word,
            id::SEGID_TEXT,
            None,
            None,
            None,
        );

        let options = RelocateOptions {
            text_addr: Some(0x2000),
            ..Default::default()
        };
        let out = relocate(&image, &options, &HashMap::new()).unwrap();
        let patched = out.text[2] as u16 | (out.text[3] as u16) << 8;
        assert_eq!(patched, 0x0800u16.wrapping_add(0x2000 - 0x0800));
    }

    #[test]
    fn undef_relocation_resolves_from_imports() {
        let mut image = image_with(0);
        let mut builder = CursorBuilder::new(image.header.tbase);
        builder.push(
            &mut image.text_relocs,
            image.header.tbase + 2,
            RelocKind::Word,
            id::SEGID_UNDEF,
            Some(0),
            None,
            None,
        );

        let mut imports = HashMap::new();
        imports.insert("putc".to_string(), 0xFFD2);
        let out = relocate(&image, &RelocateOptions::default(), &imports).unwrap();
        let patched = out.text[2] as u16 | (out.text[3] as u16) << 8;
        assert_eq!(patched, 0xFFD2);
    }

    #[test]
    fn missing_import_is_reported() {
        let mut image = image_with(0);
        let mut builder = CursorBuilder::new(image.header.tbase);
        builder.push(
            &mut image.text_relocs,
            image.header.tbase + 2,
            RelocKind::Word,
            id::SEGID_UNDEF,
            Some(0),
            None,
            None,
        );
        let err = relocate(&image, &RelocateOptions::default(), &HashMap::new());
        match err {
            Err(Error::UnresolvedExternals(names)) => assert_eq!(names, vec!["putc".to_string()]),
            other => panic!("expected UnresolvedExternals, got {other:?}"),
        }
    }

    #[test]
    fn unaligned_override_address_is_rejected() {
        let image = {
            let mut img = image_with(0);
            img.header.mode = (img.header.mode & !id::MODE_ALIGN) | id::MODE_ALIGN_4;
            img
        };
        let options = RelocateOptions {
            data_addr: Some(0x0801),
            ..Default::default()
        };
        let err = relocate(&image, &options, &HashMap::new());
        assert!(matches!(err, Err(Error::Malformed(_))));
    }

    #[test]
    fn imports_file_parses_comments_and_values() {
        let text = "# comment line\nputc 0xFFD2\n\ngetc 65490 # trailing comment\n";
        let imports = parse_imports(text).unwrap();
        assert_eq!(imports.get("putc"), Some(&0xFFD2));
        assert_eq!(imports.get("getc"), Some(&65490));
    }

    #[test]
    fn imports_file_rejects_malformed_lines() {
        assert!(parse_imports("putc\n").is_err());
        assert!(parse_imports("putc 1 2\n").is_err());
    }
}

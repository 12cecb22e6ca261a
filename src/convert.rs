//! Converts a statically-linked ELF executable targeting the MOS
//! 6502-family into a `.o65` image.

use std::collections::HashMap;

use goblin::elf::Elf;
use log::{debug, warn};

use crate::elf_mos;
use crate::error::{Error, Result};
use crate::exports::ExportedSymbol;
use crate::header::Header;
use crate::id;
use crate::image::Image;
use crate::option::HeaderOption;
use crate::reloc::{CursorBuilder, RelocKind, RelocRecord};

/// Name of the synthetic external that stands in for the 32-byte
/// imaginary-register block a hosted loader provides.
pub const IMAG_REGS_NAME: &str = "__IMAG_REGS";

#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    pub author: Option<String>,
    pub linker: Option<String>,
    pub os_info: Option<Vec<u8>>,
    pub created: bool,
    pub hosted: bool,
    pub force_bsszero: bool,
    pub stack: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddrSeg {
    Text,
    Data,
    Bss,
    Zeropage,
    Other,
}

struct Layout {
    text_base: u32,
    text_len: u32,
    data_base: u32,
    data_len: u32,
    bss_base: u32,
    bss_len: u32,
    zp_base: u32,
    zp_len: u32,
}

impl Layout {
    fn classify(&self, addr: u32) -> AddrSeg {
        if addr >= self.text_base && addr < self.text_base.wrapping_add(self.text_len) {
            AddrSeg::Text
        } else if addr >= self.data_base && addr < self.data_base.wrapping_add(self.data_len) {
            AddrSeg::Data
        } else if addr >= self.bss_base && addr < self.bss_base.wrapping_add(self.bss_len) {
            AddrSeg::Bss
        } else if addr >= self.zp_base && addr < self.zp_base.wrapping_add(self.zp_len) {
            AddrSeg::Zeropage
        } else {
            AddrSeg::Other
        }
    }
}

fn is_zeropage_section(sh_flags: u64, name: &str) -> bool {
    sh_flags & elf_mos::SHF_MOS_ZEROPAGE != 0 || name == ".zp" || name.starts_with(".zp.")
}

/// Maps the ELF flag word to a `.o65` CPU enum, following the priority
/// order in which the original converter checks each flag bit.
fn cpu_mode_from_flags(flags: u32) -> u16 {
    if flags & elf_mos::EM_MOS_W65816 != 0 {
        id::MODE_CPU_EMUL
    } else if flags & elf_mos::EM_MOS_65CE02 != 0 {
        id::MODE_CPU_65CE02
    } else if flags & (elf_mos::EM_MOS_R65C02 | elf_mos::EM_MOS_W65C02) != 0 {
        id::MODE_CPU_65SC02
    } else if flags & elf_mos::EM_MOS_65C02 != 0 {
        id::MODE_CPU_65C02
    } else if flags & elf_mos::EM_MOS_6502X != 0 {
        id::MODE_CPU_UNDOC
    } else {
        id::MODE_CPU_6502
    }
}

/// Clamps a raw alignment to the nearest value `.o65` can express, and
/// reports whether that clamp requires the paged mode bit.
fn align_to_mode(max_align: u64) -> (bool, u16) {
    if max_align <= 1 {
        (false, id::MODE_ALIGN_1)
    } else if max_align <= 2 {
        (false, id::MODE_ALIGN_2)
    } else if max_align <= 4 {
        (false, id::MODE_ALIGN_4)
    } else {
        (true, id::MODE_ALIGN_256)
    }
}

struct SortedReloc {
    offset: u64,
    addend: i64,
    sym: usize,
    kind: u32,
}

fn collect_relocs(elf: &Elf) -> Vec<SortedReloc> {
    let mut relocs = Vec::new();
    for (_, section) in elf.shdr_relocs.iter() {
        for reloc in section.iter() {
            relocs.push(SortedReloc {
                offset: reloc.r_offset,
                addend: reloc.r_addend.unwrap_or(0),
                sym: reloc.r_sym,
                kind: reloc.r_type,
            });
        }
    }
    relocs.sort_by_key(|r| r.offset);
    relocs
}

fn reloc_kind_and_trailer(elf_type: u32, addr: u32) -> Result<(RelocKind, Option<u8>, Option<u16>)> {
    match elf_type {
        elf_mos::R_MOS_ADDR8 | elf_mos::R_MOS_ADDR16_LO | elf_mos::R_MOS_ADDR24_SEGMENT_LO => {
            Ok((RelocKind::Low, None, None))
        }
        elf_mos::R_MOS_ADDR16 | elf_mos::R_MOS_ADDR24_SEGMENT => Ok((RelocKind::Word, None, None)),
        elf_mos::R_MOS_ADDR16_HI | elf_mos::R_MOS_ADDR24_SEGMENT_HI => {
            Ok((RelocKind::High, Some((addr & 0xFF) as u8), None))
        }
        elf_mos::R_MOS_ADDR24 => Ok((RelocKind::SegAdr, None, None)),
        elf_mos::R_MOS_ADDR24_BANK => Ok((RelocKind::Seg, None, Some((addr & 0xFFFF) as u16))),
        other => Err(Error::Malformed(format!(
            "relocation type {other} has no .o65 equivalent"
        ))),
    }
}

/// Converts an ELF executable's bytes into a `.o65` image ready to be
/// written with [`crate::image::write_image`].
pub fn convert(elf_bytes: &[u8], options: &ConvertOptions) -> Result<Image> {
    let elf = Elf::parse(elf_bytes)?;

    if elf.header.e_type != goblin::elf::header::ET_EXEC {
        return Err(Error::Malformed("input is not an ET_EXEC ELF executable".to_string()));
    }
    if elf.header.e_machine != elf_mos::EM_MOS {
        return Err(Error::Malformed(format!(
            "input targets ELF machine {}, not the MOS 6502 family",
            elf.header.e_machine
        )));
    }

    let cpu_mode = cpu_mode_from_flags(elf.header.e_flags);

    let loadable: Vec<_> = elf
        .program_headers
        .iter()
        .filter(|ph| ph.p_type == goblin::elf::program_header::PT_LOAD)
        .collect();

    let max_align = loadable.iter().map(|ph| ph.p_align).max().unwrap_or(1);
    let (paged, align_bits) = align_to_mode(max_align);

    let mut buffer = Vec::new();
    let mut text_base: Option<u32> = None;
    let mut prev_end: u64 = 0;
    for ph in &loadable {
        if text_base.is_none() {
            text_base = Some(ph.p_vaddr as u32);
            prev_end = ph.p_vaddr;
        }
        if ph.p_vaddr < prev_end {
            break;
        }
        if ph.p_vaddr > prev_end {
            return Err(Error::Malformed(format!(
                "PT_LOAD segment at {:#x} is not contiguous with the previous one (expected {:#x})",
                ph.p_vaddr, prev_end
            )));
        }
        let start = ph.p_offset as usize;
        let end = start + ph.p_filesz as usize;
        if end > elf_bytes.len() {
            return Err(Error::Malformed("PT_LOAD segment extends past end of file".to_string()));
        }
        buffer.extend_from_slice(&elf_bytes[start..end]);
        prev_end = ph.p_vaddr + ph.p_filesz;
    }
    let text_base = text_base.ok_or_else(|| Error::Malformed("no PT_LOAD segments found".to_string()))?;

    let mut data_base = text_base.wrapping_add(buffer.len() as u32);
    let mut text_len = buffer.len() as u32;
    for sh in &elf.section_headers {
        if sh.sh_type != goblin::elf::section_header::SHT_PROGBITS {
            continue;
        }
        let wanted = goblin::elf::section_header::SHF_WRITE | goblin::elf::section_header::SHF_ALLOC;
        if sh.sh_flags != wanted as u64 {
            continue;
        }
        let addr = sh.sh_addr as u32;
        if addr >= text_base && addr < text_base.wrapping_add(buffer.len() as u32) {
            data_base = addr;
            text_len = addr - text_base;
            break;
        }
    }
    let data_len = buffer.len() as u32 - text_len;

    let mut bss_len: u32 = 0;
    let mut zp_len: u32 = 0;
    let mut zp_base: Option<u32> = None;
    for sh in &elf.section_headers {
        let name = elf.shdr_strtab.get_at(sh.sh_name).unwrap_or("");
        let in_zp = is_zeropage_section(sh.sh_flags, name);
        if in_zp {
            zp_len += sh.sh_size as u32;
            let addr = sh.sh_addr as u32;
            zp_base = Some(match zp_base {
                Some(base) => base.min(addr),
                None => addr,
            });
        } else if sh.sh_type == goblin::elf::section_header::SHT_NOBITS {
            bss_len += sh.sh_size as u32;
        }
    }
    let bss_base = data_base.wrapping_add(data_len);
    let zp_base = zp_base.unwrap_or(0);

    let layout = Layout {
        text_base,
        text_len,
        data_base,
        data_len,
        bss_base,
        bss_len,
        zp_base,
        zp_len,
    };

    debug!(
        "converted layout: text={:#x}+{:#x} data={:#x}+{:#x} bss={:#x}+{:#x} zp={:#x}+{:#x}",
        text_base, text_len, data_base, data_len, bss_base, bss_len, zp_base, zp_len
    );

    // Synthetic key used to dedupe every hosted-mode imaginary-register
    // reference onto the same external index; it can't collide with a
    // real ELF string-table offset.
    const IMAG_REGS_KEY: usize = usize::MAX;

    let mut externs: Vec<String> = Vec::new();
    let mut extern_index: HashMap<usize, u32> = HashMap::new();
    if options.hosted {
        externs.push(IMAG_REGS_NAME.to_string());
        extern_index.insert(IMAG_REGS_KEY, 0);
    }

    let mut force_wide = false;

    let mut assign_extern = |name_offset: usize, name: String| -> u32 {
        if let Some(&idx) = extern_index.get(&name_offset) {
            return idx;
        }
        let idx = externs.len() as u32;
        externs.push(name);
        extern_index.insert(name_offset, idx);
        if idx > 0xFFFF {
            force_wide = true;
        }
        idx
    };

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum CurSeg {
        Text,
        Data,
    }

    let relocs = collect_relocs(&elf);

    let mut cur_seg = CurSeg::Text;
    let mut text_builder = CursorBuilder::new(text_base);
    let mut data_builder: Option<CursorBuilder> = None;
    let mut text_relocs: Vec<RelocRecord> = Vec::new();
    let mut data_relocs: Vec<RelocRecord> = Vec::new();

    for r in &relocs {
        let a = r.offset as u32;
        let addr_seg = layout.classify(a);
        match (cur_seg, addr_seg) {
            (CurSeg::Text, AddrSeg::Text) => {}
            (CurSeg::Text, AddrSeg::Data) => {
                cur_seg = CurSeg::Data;
                data_builder = Some(CursorBuilder::new(data_base));
            }
            (CurSeg::Data, AddrSeg::Data) => {}
            (CurSeg::Data, AddrSeg::Text) => {
                return Err(Error::Malformed(
                    "ELF relocations were not sorted into non-decreasing address order".to_string(),
                ));
            }
            _ => {
                warn!("relocation at {a:#x} falls outside .text/.data; skipping");
                continue;
            }
        }

        let builder = match cur_seg {
            CurSeg::Text => &mut text_builder,
            CurSeg::Data => data_builder.as_mut().expect("entered data segment"),
        };
        if (a as i64) <= builder.cursor() {
            warn!("duplicate relocation at {a:#x}; skipping");
            continue;
        }

        let sym = elf
            .syms
            .get(r.sym)
            .ok_or_else(|| Error::Malformed(format!("relocation references unknown symbol {}", r.sym)))?;

        let (seg_id, undefid, target_addr) = if sym.st_shndx == elf_mos::SHN_ABS {
            continue;
        } else if sym.st_shndx == elf_mos::SHN_UNDEF {
            let name = elf.strtab.get_at(sym.st_name).unwrap_or("").to_string();
            let idx = assign_extern(sym.st_name, name);
            let value = (sym.st_value as i64 + r.addend) as u32;
            (id::SEGID_UNDEF, Some(idx), value)
        } else {
            let value = (sym.st_value as i64 + r.addend) as u32;
            let target_seg = layout.classify(value);
            if options.hosted && target_seg == AddrSeg::Zeropage && value < 32 {
                let idx = assign_extern(IMAG_REGS_KEY, IMAG_REGS_NAME.to_string());
                (id::SEGID_UNDEF, Some(idx), value)
            } else {
                let seg_id = match target_seg {
                    AddrSeg::Text => id::SEGID_TEXT,
                    AddrSeg::Data => id::SEGID_DATA,
                    AddrSeg::Bss => id::SEGID_BSS,
                    AddrSeg::Zeropage => id::SEGID_ZEROPAGE,
                    AddrSeg::Other => {
                        return Err(Error::Malformed(format!(
                            "relocation target {value:#x} is outside every known segment"
                        )));
                    }
                };
                (seg_id, None, value)
            }
        };

        let (kind, high_lo, seg_lo16) = reloc_kind_and_trailer(r.kind, target_addr)?;

        builder.push(
            match cur_seg {
                CurSeg::Text => &mut text_relocs,
                CurSeg::Data => &mut data_relocs,
            },
            a,
            kind,
            seg_id,
            undefid,
            high_lo,
            seg_lo16,
        );
    }

    if force_wide {
        debug!("external index exceeds 16 bits; forcing 32-bit width");
    }

    let entry = elf.header.e_entry as u32;

    let mut header_options = Vec::new();
    if let Some(os_info) = &options.os_info {
        header_options.push(HeaderOption::new(id::OPT_OS, os_info.clone()));
    }
    if let Some(linker) = &options.linker {
        header_options.push(HeaderOption::string(id::OPT_PROGRAM, linker));
    }
    if let Some(author) = &options.author {
        header_options.push(HeaderOption::string(id::OPT_AUTHOR, author));
    }
    if options.created {
        let now = crate::timestamp::now_rfc_like();
        header_options.push(HeaderOption::string(id::OPT_CREATED, &now));
    }
    header_options.push(crate::option::elf_machine_option(elf.header.e_machine, elf.header.e_flags));

    let mut mode = cpu_mode | align_bits;
    if paged {
        mode |= id::MODE_PAGED;
    }
    if force_wide {
        mode |= id::MODE_32BIT;
    }
    if options.force_bsszero {
        mode |= id::MODE_BSSZERO;
    }

    let (final_zbase, final_zlen) = if options.hosted {
        (zp_base.saturating_sub(32), zp_len.saturating_sub(32))
    } else {
        (zp_base, zp_len)
    };

    let header = Header {
        mode,
        tbase: text_base,
        tlen: text_len,
        dbase: data_base,
        dlen: data_len,
        bbase: bss_base,
        blen: bss_len,
        zbase: final_zbase,
        zlen: final_zlen,
        stack: options.stack,
    };

    Ok(Image {
        header,
        options: header_options,
        text: buffer[..text_len as usize].to_vec(),
        data: buffer[text_len as usize..].to_vec(),
        externs,
        text_relocs,
        data_relocs,
        exports: vec![ExportedSymbol {
            name: "main".to_string(),
            seg_id: id::SEGID_TEXT,
            value: entry,
        }],
        next: None,
    })
}

//! End-to-end exercise of the codec and relocator together: build an image
//! in memory, encode it, decode it back, then relocate it to a new address
//! and confirm the patched bytes match hand-computed expectations.

use std::collections::HashMap;

use o65::exports::ExportedSymbol;
use o65::header::Header;
use o65::id;
use o65::image::{read_image, write_image, Image};
use o65::reloc::{CursorBuilder, RelocKind};
use o65::relocate::{relocate, RelocateOptions};

fn sample_header() -> Header {
    Header {
        mode: id::MODE_CPU_65C02,
        tbase: 0x0800,
        tlen: 6,
        dbase: 0x0806,
        dlen: 2,
        bbase: 0x0808,
        blen: 8,
        zbase: 0x0020,
        zlen: 4,
        stack: 0,
    }
}

#[test]
fn object_roundtrips_through_codec_and_relocates() {
    let header = sample_header();

    // text: LDA #$00 ; JMP $0806 (word reloc pointing at .data)
    let mut text = vec![0xA9, 0x00, 0x4C, 0x00, 0x00, 0xEA];
    // one absolute word relocation at offset 2 targeting .data's base.
    let mut text_relocs = Vec::new();
    let mut builder = CursorBuilder::new(header.tbase);
    builder.push(
        &mut text_relocs,
        header.tbase + 2,
        RelocKind::Word,
        id::SEGID_DATA,
        None,
        None,
        None,
    );
    text[2] = (header.dbase & 0xFF) as u8;
    text[3] = (header.dbase >> 8) as u8;

    let mut image = Image {
        header,
        options: Vec::new(),
        text,
        data: vec![0x01, 0x02],
        externs: vec!["getchar".to_string()],
        text_relocs,
        data_relocs: Vec::new(),
        exports: vec![ExportedSymbol {
            name: "main".to_string(),
            seg_id: id::SEGID_TEXT,
            value: 0x0800,
        }],
        next: None,
    };

    let mut buf = Vec::new();
    write_image(&mut buf, &mut image).expect("encode");

    let mut offset = 0;
    let decoded = read_image(&buf, &mut offset).expect("decode");
    assert_eq!(offset, buf.len());
    assert_eq!(decoded.text, image.text);
    assert_eq!(decoded.exports, image.exports);
    assert_eq!(decoded.externs, vec!["getchar".to_string()]);

    let options = RelocateOptions {
        text_addr: Some(0x3000),
        ..Default::default()
    };
    let relocated = relocate(&decoded, &options, &HashMap::new()).expect("relocate");

    assert_eq!(relocated.text_addr, 0x3000);
    // data follows text immediately by default: 0x3000 + aligned(tlen).
    let align = decoded.header.alignment();
    let aligned_tlen = decoded.header.tlen.div_ceil(align) * align;
    assert_eq!(relocated.data_addr, 0x3000 + aligned_tlen);

    // The JMP target was originally 0x0806; it must now point at the new
    // .data base, since the word relocation's source segment is .data.
    let patched = relocated.text[2] as u16 | (relocated.text[3] as u16) << 8;
    assert_eq!(patched, relocated.data_addr as u16);
}

#[test]
fn bsszero_mode_extends_data_output_with_zeroed_bss() {
    let mut header = sample_header();
    header.mode |= id::MODE_BSSZERO;

    let mut image = Image {
        header,
        options: Vec::new(),
        text: vec![0xEA; 6],
        data: vec![0xAA, 0xBB],
        externs: Vec::new(),
        text_relocs: Vec::new(),
        data_relocs: Vec::new(),
        exports: Vec::new(),
        next: None,
    };

    let mut buf = Vec::new();
    write_image(&mut buf, &mut image).expect("encode");
    let mut offset = 0;
    let decoded = read_image(&buf, &mut offset).expect("decode");

    let relocated = relocate(&decoded, &RelocateOptions::default(), &HashMap::new()).expect("relocate");
    assert_eq!(relocated.data[..2], [0xAA, 0xBB]);
    assert!(relocated.data[2..].iter().all(|&b| b == 0));
    assert_eq!(relocated.data.len(), 2 + decoded.header.blen as usize);
}

#[test]
fn object_files_are_rejected_by_the_relocator() {
    let mut header = sample_header();
    header.mode |= id::MODE_OBJ;
    let image = Image {
        header,
        options: Vec::new(),
        text: vec![0xEA; 6],
        data: vec![0x01, 0x02],
        externs: Vec::new(),
        text_relocs: Vec::new(),
        data_relocs: Vec::new(),
        exports: Vec::new(),
        next: None,
    };
    assert!(relocate(&image, &RelocateOptions::default(), &HashMap::new()).is_err());
}

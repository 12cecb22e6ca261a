//! The `.o65` header option chain: a length-prefixed, type-tagged list of
//! variable-length payloads terminated by a zero-length record.

use log::warn;

use crate::error::{Error, Result};
use crate::id;

/// A single decoded header option. `length` is the on-disk framing length
/// (payload length + 2), kept around so a writer can be handed the option
/// straight back without recomputing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderOption {
    pub option_type: u8,
    pub data: Vec<u8>,
}

impl HeaderOption {
    pub fn new(option_type: u8, data: Vec<u8>) -> Self {
        HeaderOption { option_type, data }
    }

    pub fn string(option_type: u8, value: &str) -> Self {
        HeaderOption::new(option_type, value.as_bytes().to_vec())
    }
}

/// Reads the null-terminated option chain starting at `*offset`.
///
/// Each zero-length record ends the list; a length-1 record is a
/// structural violation.
pub fn read_options(bytes: &[u8], offset: &mut usize) -> Result<Vec<HeaderOption>> {
    let mut options = Vec::new();
    loop {
        if *offset >= bytes.len() {
            return Err(Error::from(scroll::Error::BadInput {
                size: bytes.len(),
                msg: "truncated option list",
            }));
        }
        let len = bytes[*offset] as usize;
        *offset += 1;
        if len == 0 {
            break;
        }
        if len == 1 {
            return Err(Error::Malformed("option with length 1".to_string()));
        }
        if *offset + (len - 1) > bytes.len() {
            return Err(Error::from(scroll::Error::BadInput {
                size: bytes.len(),
                msg: "truncated option payload",
            }));
        }
        let option_type = bytes[*offset];
        *offset += 1;
        let payload_len = len - 2;
        let data = bytes[*offset..*offset + payload_len].to_vec();
        *offset += payload_len;
        options.push(HeaderOption::new(option_type, data));
    }
    Ok(options)
}

/// Writes the option chain followed by its zero-length terminator.
pub fn write_options(buf: &mut Vec<u8>, options: &[HeaderOption]) -> Result<()> {
    for option in options {
        write_option(buf, option)?;
    }
    write_terminator(buf);
    Ok(())
}

fn write_option(buf: &mut Vec<u8>, option: &HeaderOption) -> Result<()> {
    let total_len = option.data.len() + 2;
    if total_len > id::MAX_OPT_SIZE {
        return Err(Error::Malformed(format!(
            "option payload too large: {} bytes",
            option.data.len()
        )));
    }
    buf.push(total_len as u8);
    buf.push(option.option_type);
    buf.extend_from_slice(&option.data);
    Ok(())
}

fn write_terminator(buf: &mut Vec<u8>) {
    buf.push(0);
}

/// Builds the ELF-machine option payload: a 16-bit ELF machine number
/// followed by a 32-bit ELF flag word, both little-endian.
pub fn elf_machine_option(machine: u16, flags: u32) -> HeaderOption {
    let mut data = Vec::with_capacity(6);
    crate::num::write_u16(&mut data, machine);
    crate::num::write_u32(&mut data, flags);
    HeaderOption::new(id::OPT_ELF_MACHINE, data)
}

/// Decodes an ELF-machine option payload back into `(machine, flags)`.
pub fn parse_elf_machine_option(option: &HeaderOption) -> Result<(u16, u32)> {
    if option.option_type != id::OPT_ELF_MACHINE {
        return Err(Error::Malformed("not an ELF-machine option".to_string()));
    }
    if option.data.len() != 6 {
        warn!("ELF-machine option has unexpected payload length {}", option.data.len());
        return Err(Error::Malformed("ELF-machine option payload must be 6 bytes".to_string()));
    }
    let mut offset = 0;
    let machine = crate::num::read_u16(&option.data, &mut offset)?;
    let flags = crate::num::read_u32(&option.data, &mut offset)?;
    Ok((machine, flags))
}

//! A bit-exact codec, ELF converter, and relocator for the `.o65`
//! relocatable object/executable format used by 6502-family targets.
//!
//! See <http://www.6502.org/users/andre/o65/fileformat.html> for the
//! format this crate implements.

pub mod error;
pub mod id;
pub mod elf_mos;
pub mod num;
pub mod strz;
pub mod timestamp;

pub mod header;
pub mod option;
pub mod reloc;
pub mod externs;
pub mod exports;
pub mod image;

pub mod convert;
pub mod relocate;

pub use error::{Error, Result};
pub use header::Header;
pub use image::Image;

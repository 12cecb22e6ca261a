//! ELF machine/flag/relocation constants for the MOS 6502-family target,
//! as defined by the llvm-mos ELF specification.

/// ELF machine number assigned to 6502-family targets.
pub const EM_MOS: u16 = 6502;

pub const EM_MOS_6502: u32 = 0x0000_0001;
pub const EM_MOS_6502_BCD: u32 = 0x0000_0002;
pub const EM_MOS_6502X: u32 = 0x0000_0004;
pub const EM_MOS_65C02: u32 = 0x0000_0008;
pub const EM_MOS_R65C02: u32 = 0x0000_0010;
pub const EM_MOS_W65C02: u32 = 0x0000_0020;
pub const EM_MOS_W65816: u32 = 0x0000_0100;
pub const EM_MOS_65EL02: u32 = 0x0000_0200;
pub const EM_MOS_65CE02: u32 = 0x0000_0400;
pub const EM_MOS_HUC6280: u32 = 0x0000_0800;
pub const EM_MOS_65DTV02: u32 = 0x0000_1000;
pub const EM_MOS_4510: u32 = 0x0000_2000;
pub const EM_MOS_45GS02: u32 = 0x0000_4000;
pub const EM_MOS_SPC700: u32 = 0x0002_0000;

/// Section flag marking a section as living in the zeropage.
pub const SHF_MOS_ZEROPAGE: u64 = 0x1000_0000;

pub const R_MOS_NONE: u32 = 0;
pub const R_MOS_IMM8: u32 = 1;
pub const R_MOS_ADDR8: u32 = 2;
pub const R_MOS_ADDR16: u32 = 3;
pub const R_MOS_ADDR16_LO: u32 = 4;
pub const R_MOS_ADDR16_HI: u32 = 5;
pub const R_MOS_PCREL_8: u32 = 6;
pub const R_MOS_ADDR24: u32 = 7;
pub const R_MOS_ADDR24_BANK: u32 = 8;
pub const R_MOS_ADDR24_SEGMENT: u32 = 9;
pub const R_MOS_ADDR24_SEGMENT_LO: u32 = 10;
pub const R_MOS_ADDR24_SEGMENT_HI: u32 = 11;
pub const R_MOS_PCREL_16: u32 = 12;
pub const R_MOS_FK_DATA_4: u32 = 13;
pub const R_MOS_FK_DATA_8: u32 = 14;
pub const R_MOS_ADDR_ASCIZ: u32 = 15;
pub const R_MOS_IMM16: u32 = 16;
pub const R_MOS_ADDR13: u32 = 17;

/// The special section index meaning "undefined", per the generic ELF spec.
pub const SHN_UNDEF: usize = 0;
/// The special section index meaning "absolute value, not relative to any
/// section", per the generic ELF spec.
pub const SHN_ABS: usize = 0xfff1;

pub mod elf;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ElfError;

pub use elf::ElfHeader;

pub const MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
pub const IDENT_LEN: usize = 16;

pub const EI_CLASS: usize = 4;
pub const EI_DATA: usize = 5;
pub const EI_VERSION: usize = 6;
pub const EI_OSABI: usize = 7;
pub const EI_ABIVERSION: usize = 8;

pub trait Header: fmt::Debug + Send + Sync {
    /// Returns the virtual address of the entry point.
    fn entry_point(&self) -> u64;

    /// Returns the machine architecture identifier.
    fn machine(&self) -> u16;

    /// Returns a short human-readable name, e.g. "elf64-little".
    fn format_name(&self) -> &'static str;
}

/// File class from `e_ident[EI_CLASS]`. Decides the width of address-sized fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Class {
    Elf32,
    Elf64,
}

impl Class {
    pub fn from_ident(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Class::Elf32),
            2 => Some(Class::Elf64),
            _ => None,
        }
    }

    pub fn ident(self) -> u8 {
        match self {
            Class::Elf32 => 1,
            Class::Elf64 => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Class::Elf32 => "ELF32",
            Class::Elf64 => "ELF64",
        }
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Class {
    type Err = ElfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ELF32" => Ok(Class::Elf32),
            "ELF64" => Ok(Class::Elf64),
            _ => Err(ElfError::validation(format!(
                "invalid class: {s} (expected ELF32 or ELF64)"
            ))),
        }
    }
}

/// Data encoding from `e_ident[EI_DATA]`. Decides the byte order of every multi-byte field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Encoding {
    Little,
    Big,
}

impl Encoding {
    pub fn from_ident(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Encoding::Little),
            2 => Some(Encoding::Big),
            _ => None,
        }
    }

    pub fn ident(self) -> u8 {
        match self {
            Encoding::Little => 1,
            Encoding::Big => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Encoding::Little => "Little Endian",
            Encoding::Big => "Big Endian",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Encoding {
    type Err = ElfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Little Endian" => Ok(Encoding::Little),
            "Big Endian" => Ok(Encoding::Big),
            _ => Err(ElfError::validation(format!(
                "invalid data encoding: {s} (expected \"Little Endian\" or \"Big Endian\")"
            ))),
        }
    }
}

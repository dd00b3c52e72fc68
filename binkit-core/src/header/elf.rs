use crate::error::Result;
use crate::header::{
    Class, Encoding, Header, EI_ABIVERSION, EI_CLASS, EI_DATA, EI_OSABI, EI_VERSION, IDENT_LEN,
    MAGIC,
};
use crate::width::Width;
use byteorder::{ByteOrder, ReadBytesExt, WriteBytesExt};
use goblin::elf::header::{EM_X86_64, ET_EXEC, ET_REL};
use serde::Serialize;
use std::io;

/// The ELF file header, decoded for either class.
///
/// Address-sized fields (`e_entry`, `e_phoff`, `e_shoff`) are widened to
/// `u64`; `class` and `encoding` record how they were laid out on disk.
///
/// Reference: [ELF Specification v1.2](https://refspecs.linuxfoundation.org/elf/elf.pdf)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ElfHeader {
    pub class: Class,
    pub encoding: Encoding,

    /// `e_ident[EI_VERSION]`, normally `EV_CURRENT` (1).
    pub ident_version: u8,

    /// `e_ident[EI_OSABI]`.
    pub os_abi: u8,

    pub abi_version: u8,

    /// Object file type.
    ///
    /// Common values:
    /// - `ET_NONE` (0): No file type
    /// - `ET_REL` (1): Relocatable file
    /// - `ET_EXEC` (2): Executable file
    /// - `ET_DYN` (3): Shared object
    /// - `ET_CORE` (4): Core dump
    pub e_type: u16,

    /// Target architecture, e.g. `EM_X86_64` (62) or `EM_AARCH64` (183).
    pub e_machine: u16,

    pub e_version: u32,

    /// Virtual address of the program entry point.
    pub e_entry: u64,

    /// File offset of the program header table.
    pub e_phoff: u64,

    /// File offset of the section header table.
    pub e_shoff: u64,

    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,

    /// Index of the section header string table.
    pub e_shstrndx: u16,
}

impl ElfHeader {
    /// A header with no tables yet; the writer fills in offsets and counts.
    pub fn new(class: Class, encoding: Encoding, e_type: u16, e_machine: u16) -> Self {
        Self {
            class,
            encoding,
            ident_version: 1,
            os_abi: 0,
            abi_version: 0,
            e_type,
            e_machine,
            e_version: 1,
            e_entry: 0,
            e_phoff: 0,
            e_shoff: 0,
            e_flags: 0,
            e_ehsize: 0,
            e_phentsize: 0,
            e_phnum: 0,
            e_shentsize: 0,
            e_shnum: 0,
            e_shstrndx: 0,
        }
    }

    /// The header the linker stamps on its output.
    pub fn x86_64_executable() -> Self {
        Self::new(Class::Elf64, Encoding::Little, ET_EXEC, EM_X86_64)
    }

    /// The header the assembler stamps on its output.
    pub fn x86_64_relocatable() -> Self {
        Self::new(Class::Elf64, Encoding::Little, ET_REL, EM_X86_64)
    }

    /// Decodes the fields that follow `e_ident`. The caller has already
    /// validated the magic, class and encoding bytes of `ident`.
    pub fn from_reader<W: Width, B: ByteOrder, R: io::Read>(
        ident: &[u8; IDENT_LEN],
        encoding: Encoding,
        cur: &mut R,
    ) -> io::Result<ElfHeader> {
        Ok(ElfHeader {
            class: W::CLASS,
            encoding,
            ident_version: ident[EI_VERSION],
            os_abi: ident[EI_OSABI],
            abi_version: ident[EI_ABIVERSION],
            e_type: cur.read_u16::<B>()?,
            e_machine: cur.read_u16::<B>()?,
            e_version: cur.read_u32::<B>()?,
            e_entry: W::read_addr::<B, R>(cur)?,
            e_phoff: W::read_addr::<B, R>(cur)?,
            e_shoff: W::read_addr::<B, R>(cur)?,
            e_flags: cur.read_u32::<B>()?,
            e_ehsize: cur.read_u16::<B>()?,
            e_phentsize: cur.read_u16::<B>()?,
            e_phnum: cur.read_u16::<B>()?,
            e_shentsize: cur.read_u16::<B>()?,
            e_shnum: cur.read_u16::<B>()?,
            e_shstrndx: cur.read_u16::<B>()?,
        })
    }

    pub fn ident(&self) -> [u8; IDENT_LEN] {
        let mut ident = [0u8; IDENT_LEN];
        ident[..4].copy_from_slice(&MAGIC);
        ident[EI_CLASS] = self.class.ident();
        ident[EI_DATA] = self.encoding.ident();
        ident[EI_VERSION] = self.ident_version;
        ident[EI_OSABI] = self.os_abi;
        ident[EI_ABIVERSION] = self.abi_version;
        ident
    }

    /// Encodes the full header. `W` must match `self.class`.
    pub fn write_to<W: Width, B: ByteOrder>(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&self.ident());
        out.write_u16::<B>(self.e_type)?;
        out.write_u16::<B>(self.e_machine)?;
        out.write_u32::<B>(self.e_version)?;
        W::write_addr::<B>(out, self.e_entry, "entry point")?;
        W::write_addr::<B>(out, self.e_phoff, "program header offset")?;
        W::write_addr::<B>(out, self.e_shoff, "section header offset")?;
        out.write_u32::<B>(self.e_flags)?;
        out.write_u16::<B>(self.e_ehsize)?;
        out.write_u16::<B>(self.e_phentsize)?;
        out.write_u16::<B>(self.e_phnum)?;
        out.write_u16::<B>(self.e_shentsize)?;
        out.write_u16::<B>(self.e_shnum)?;
        out.write_u16::<B>(self.e_shstrndx)?;
        Ok(())
    }
}

impl Header for ElfHeader {
    fn entry_point(&self) -> u64 {
        self.e_entry
    }

    fn machine(&self) -> u16 {
        self.e_machine
    }

    fn format_name(&self) -> &'static str {
        match (self.class, self.encoding) {
            (Class::Elf32, Encoding::Little) => "elf32-little",
            (Class::Elf32, Encoding::Big) => "elf32-big",
            (Class::Elf64, Encoding::Little) => "elf64-little",
            (Class::Elf64, Encoding::Big) => "elf64-big",
        }
    }}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::width::{Elf32, Elf64};
    use byteorder::{BigEndian, LittleEndian};
    use std::io::Cursor;

    fn sample(class: Class, encoding: Encoding) -> ElfHeader {
        let mut h = ElfHeader::new(class, encoding, ET_EXEC, EM_X86_64);
        h.e_entry = 0x401000;
        h.e_shoff = 0x2000;
        h.e_shnum = 7;
        h.e_shstrndx = 6;
        h
    }

    #[test]
    fn header_sizes() {
        let mut out = Vec::new();
        sample(Class::Elf64, Encoding::Little)
            .write_to::<Elf64, LittleEndian>(&mut out)
            .unwrap();
        assert_eq!(out.len(), 64);

        let mut out = Vec::new();
        sample(Class::Elf32, Encoding::Big)
            .write_to::<Elf32, BigEndian>(&mut out)
            .unwrap();
        assert_eq!(out.len(), 52);
    }

    #[test]
    fn decode_after_ident() {
        let h = sample(Class::Elf32, Encoding::Big);
        let mut out = Vec::new();
        h.write_to::<Elf32, BigEndian>(&mut out).unwrap();

        let mut ident = [0u8; IDENT_LEN];
        ident.copy_from_slice(&out[..IDENT_LEN]);
        let mut cur = Cursor::new(&out[IDENT_LEN..]);
        let back = ElfHeader::from_reader::<Elf32, BigEndian, _>(&ident, Encoding::Big, &mut cur)
            .unwrap();
        assert_eq!(back, h);
        assert_eq!(back.format_name(), "elf32-big");
        assert_eq!(back.entry_point(), 0x401000);
    }
}

//! Class-dependent record layouts.
//!
//! The class byte is inspected once; from then on the parser and writer are
//! instantiated for one `Width` and one `byteorder::ByteOrder`, so no field
//! decode ever re-checks which layout it is in.

use std::io::{self, Read};

use byteorder::{ByteOrder, ReadBytesExt, WriteBytesExt};

use crate::error::{ElfError, Result};
use crate::header::Class;
use crate::sections::Segment;

/// A symbol record as stored on disk, name still an offset into its string table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSymbol {
    pub name: u32,
    pub value: u64,
    pub size: u64,
    pub info: u8,
    pub other: u8,
    pub shndx: u16,
}

/// A section header as stored on disk, name still an offset into `.shstrtab`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSection {
    pub name: u32,
    pub sh_type: u32,
    pub flags: u64,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
    pub link: u32,
    pub info: u32,
    pub addralign: u64,
    pub entsize: u64,
}

pub trait Width {
    const CLASS: Class;
    const EHDR_SIZE: u16;
    const PHDR_SIZE: u16;
    const SHDR_SIZE: u16;
    const SYM_SIZE: u64;

    fn read_addr<B: ByteOrder, R: Read>(r: &mut R) -> io::Result<u64>;

    /// Fails with `Validation` when `value` does not fit the field.
    fn write_addr<B: ByteOrder>(out: &mut Vec<u8>, value: u64, what: &str) -> Result<()>;

    fn read_symbol<B: ByteOrder, R: Read>(r: &mut R) -> io::Result<RawSymbol>;
    fn write_symbol<B: ByteOrder>(out: &mut Vec<u8>, sym: &RawSymbol) -> Result<()>;

    fn read_segment<B: ByteOrder, R: Read>(r: &mut R) -> io::Result<Segment>;
    fn write_segment<B: ByteOrder>(out: &mut Vec<u8>, seg: &Segment) -> Result<()>;
}

pub struct Elf32;
pub struct Elf64;

impl Width for Elf32 {
    const CLASS: Class = Class::Elf32;
    const EHDR_SIZE: u16 = 52;
    const PHDR_SIZE: u16 = 32;
    const SHDR_SIZE: u16 = 40;
    const SYM_SIZE: u64 = 16;

    fn read_addr<B: ByteOrder, R: Read>(r: &mut R) -> io::Result<u64> {
        r.read_u32::<B>().map(u64::from)
    }

    fn write_addr<B: ByteOrder>(out: &mut Vec<u8>, value: u64, what: &str) -> Result<()> {
        let narrow = u32::try_from(value).map_err(|_| {
            ElfError::validation(format!("{what} {value:#x} does not fit in a 32-bit field"))
        })?;
        out.write_u32::<B>(narrow)?;
        Ok(())
    }

    fn read_symbol<B: ByteOrder, R: Read>(r: &mut R) -> io::Result<RawSymbol> {
        Ok(RawSymbol {
            name: r.read_u32::<B>()?,
            value: r.read_u32::<B>()?.into(),
            size: r.read_u32::<B>()?.into(),
            info: r.read_u8()?,
            other: r.read_u8()?,
            shndx: r.read_u16::<B>()?,
        })
    }

    fn write_symbol<B: ByteOrder>(out: &mut Vec<u8>, sym: &RawSymbol) -> Result<()> {
        out.write_u32::<B>(sym.name)?;
        Self::write_addr::<B>(out, sym.value, "symbol value")?;
        Self::write_addr::<B>(out, sym.size, "symbol size")?;
        out.write_u8(sym.info)?;
        out.write_u8(sym.other)?;
        out.write_u16::<B>(sym.shndx)?;
        Ok(())
    }

    fn read_segment<B: ByteOrder, R: Read>(r: &mut R) -> io::Result<Segment> {
        let p_type = r.read_u32::<B>()?;
        let offset = r.read_u32::<B>()?.into();
        let vaddr = r.read_u32::<B>()?.into();
        let paddr = r.read_u32::<B>()?.into();
        let filesz = r.read_u32::<B>()?.into();
        let memsz = r.read_u32::<B>()?.into();
        let flags = r.read_u32::<B>()?;
        let align = r.read_u32::<B>()?.into();
        Ok(Segment {
            p_type,
            flags,
            offset,
            vaddr,
            paddr,
            filesz,
            memsz,
            align,
        })
    }

    fn write_segment<B: ByteOrder>(out: &mut Vec<u8>, seg: &Segment) -> Result<()> {
        out.write_u32::<B>(seg.p_type)?;
        Self::write_addr::<B>(out, seg.offset, "segment offset")?;
        Self::write_addr::<B>(out, seg.vaddr, "segment vaddr")?;
        Self::write_addr::<B>(out, seg.paddr, "segment paddr")?;
        Self::write_addr::<B>(out, seg.filesz, "segment filesz")?;
        Self::write_addr::<B>(out, seg.memsz, "segment memsz")?;
        out.write_u32::<B>(seg.flags)?;
        Self::write_addr::<B>(out, seg.align, "segment align")?;
        Ok(())
    }
}

impl Width for Elf64 {
    const CLASS: Class = Class::Elf64;
    const EHDR_SIZE: u16 = 64;
    const PHDR_SIZE: u16 = 56;
    const SHDR_SIZE: u16 = 64;
    const SYM_SIZE: u64 = 24;

    fn read_addr<B: ByteOrder, R: Read>(r: &mut R) -> io::Result<u64> {
        r.read_u64::<B>()
    }

    fn write_addr<B: ByteOrder>(out: &mut Vec<u8>, value: u64, _what: &str) -> Result<()> {
        out.write_u64::<B>(value)?;
        Ok(())
    }

    fn read_symbol<B: ByteOrder, R: Read>(r: &mut R) -> io::Result<RawSymbol> {
        Ok(RawSymbol {
            name: r.read_u32::<B>()?,
            info: r.read_u8()?,
            other: r.read_u8()?,
            shndx: r.read_u16::<B>()?,
            value: r.read_u64::<B>()?,
            size: r.read_u64::<B>()?,
        })
    }

    fn write_symbol<B: ByteOrder>(out: &mut Vec<u8>, sym: &RawSymbol) -> Result<()> {
        out.write_u32::<B>(sym.name)?;
        out.write_u8(sym.info)?;
        out.write_u8(sym.other)?;
        out.write_u16::<B>(sym.shndx)?;
        out.write_u64::<B>(sym.value)?;
        out.write_u64::<B>(sym.size)?;
        Ok(())
    }

    fn read_segment<B: ByteOrder, R: Read>(r: &mut R) -> io::Result<Segment> {
        let p_type = r.read_u32::<B>()?;
        let flags = r.read_u32::<B>()?;
        Ok(Segment {
            p_type,
            flags,
            offset: r.read_u64::<B>()?,
            vaddr: r.read_u64::<B>()?,
            paddr: r.read_u64::<B>()?,
            filesz: r.read_u64::<B>()?,
            memsz: r.read_u64::<B>()?,
            align: r.read_u64::<B>()?,
        })
    }

    fn write_segment<B: ByteOrder>(out: &mut Vec<u8>, seg: &Segment) -> Result<()> {
        out.write_u32::<B>(seg.p_type)?;
        out.write_u32::<B>(seg.flags)?;
        out.write_u64::<B>(seg.offset)?;
        out.write_u64::<B>(seg.vaddr)?;
        out.write_u64::<B>(seg.paddr)?;
        out.write_u64::<B>(seg.filesz)?;
        out.write_u64::<B>(seg.memsz)?;
        out.write_u64::<B>(seg.align)?;
        Ok(())
    }
}

/// Section headers share one field order across classes; only the address-sized fields widen.
pub fn read_section_header<W: Width, B: ByteOrder, R: Read>(r: &mut R) -> io::Result<RawSection> {
    Ok(RawSection {
        name: r.read_u32::<B>()?,
        sh_type: r.read_u32::<B>()?,
        flags: W::read_addr::<B, R>(r)?,
        addr: W::read_addr::<B, R>(r)?,
        offset: W::read_addr::<B, R>(r)?,
        size: W::read_addr::<B, R>(r)?,
        link: r.read_u32::<B>()?,
        info: r.read_u32::<B>()?,
        addralign: W::read_addr::<B, R>(r)?,
        entsize: W::read_addr::<B, R>(r)?,
    })
}

pub fn write_section_header<W: Width, B: ByteOrder>(out: &mut Vec<u8>, sh: &RawSection) -> Result<()> {
    out.write_u32::<B>(sh.name)?;
    out.write_u32::<B>(sh.sh_type)?;
    W::write_addr::<B>(out, sh.flags, "section flags")?;
    W::write_addr::<B>(out, sh.addr, "section address")?;
    W::write_addr::<B>(out, sh.offset, "section offset")?;
    W::write_addr::<B>(out, sh.size, "section size")?;
    out.write_u32::<B>(sh.link)?;
    out.write_u32::<B>(sh.info)?;
    W::write_addr::<B>(out, sh.addralign, "section alignment")?;
    W::write_addr::<B>(out, sh.entsize, "section entry size")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, LittleEndian};
    use std::io::Cursor;

    #[test]
    fn record_sizes_match_layouts() {
        let sym = RawSymbol {
            name: 1,
            value: 2,
            size: 3,
            info: 4,
            other: 5,
            shndx: 6,
        };
        let mut out = Vec::new();
        Elf32::write_symbol::<LittleEndian>(&mut out, &sym).unwrap();
        assert_eq!(out.len() as u64, Elf32::SYM_SIZE);

        let mut out = Vec::new();
        Elf64::write_symbol::<BigEndian>(&mut out, &sym).unwrap();
        assert_eq!(out.len() as u64, Elf64::SYM_SIZE);

        let mut out = Vec::new();
        write_section_header::<Elf32, BigEndian>(&mut out, &RawSection::default()).unwrap();
        assert_eq!(out.len(), Elf32::SHDR_SIZE as usize);

        let mut out = Vec::new();
        Elf64::write_segment::<LittleEndian>(&mut out, &Segment::default()).unwrap();
        assert_eq!(out.len(), Elf64::PHDR_SIZE as usize);
    }

    #[test]
    fn symbol_field_order_differs_by_width() {
        let sym = RawSymbol {
            name: 7,
            value: 0x1000,
            size: 0x20,
            info: 0x12,
            other: 0,
            shndx: 1,
        };
        let mut out32 = Vec::new();
        Elf32::write_symbol::<LittleEndian>(&mut out32, &sym).unwrap();
        // ELF32: name, value, size, info
        assert_eq!(out32[12], 0x12);

        let mut out64 = Vec::new();
        Elf64::write_symbol::<LittleEndian>(&mut out64, &sym).unwrap();
        // ELF64: name, info, other, shndx, value, size
        assert_eq!(out64[4], 0x12);

        let back = Elf64::read_symbol::<LittleEndian, _>(&mut Cursor::new(&out64)).unwrap();
        assert_eq!(back, sym);
    }

    #[test]
    fn narrow_write_rejects_wide_values() {
        let mut out = Vec::new();
        let err = Elf32::write_addr::<LittleEndian>(&mut out, 1 << 40, "entry").unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }
}

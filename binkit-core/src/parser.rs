//! Decoding of untrusted ELF input into a [`Binary`].
//!
//! Every size or count taken from the input is checked against [`Limits`]
//! and then against the source length before anything is allocated for it.

use std::io::{Cursor, Read, Seek, SeekFrom};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use goblin::elf::section_header::SHT_SYMTAB;

use crate::binary::Binary;
use crate::error::{short_read, ElfError, Result};
use crate::header::{Class, ElfHeader, Encoding, EI_CLASS, EI_DATA, IDENT_LEN, MAGIC};
use crate::limits::{self, Limits};
use crate::sections::{Section, StringTable};
use crate::symbols::Symbol;
use crate::width::{self, Elf32, Elf64, RawSection, Width};

/// A seekable input of known length.
struct Source<'a, R> {
    inner: &'a mut R,
    len: u64,
    limits: Limits,
}

impl<'a, R: Read + Seek> Source<'a, R> {
    fn new(inner: &'a mut R, limits: Limits) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, len, limits })
    }

    /// `[offset, offset + size)` must lie inside the input.
    fn check_range(&self, what: &'static str, offset: u64, size: u64) -> Result<()> {
        let end = offset
            .checked_add(size)
            .ok_or_else(|| ElfError::format(format!("{what} at offset {offset:#x} overflows")))?;
        if end > self.len {
            return Err(ElfError::Truncated {
                what,
                offset,
                needed: size,
                available: self.len.saturating_sub(offset),
            });
        }
        Ok(())
    }

    /// Reads a whole table after checking the ceiling and the input length.
    fn read_table(&mut self, what: &'static str, offset: u64, size: u64) -> Result<Vec<u8>> {
        limits::check(what, size, self.limits.max_table_bytes)?;
        self.check_range(what, offset, size)?;
        self.inner.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; size as usize];
        self.inner
            .read_exact(&mut buf)
            .map_err(short_read(what, offset, size, self.len))?;
        Ok(buf)
    }
}

pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Binary> {
    parse_with_limits(reader, Limits::default())
}

pub fn parse_with_limits<R: Read + Seek>(reader: &mut R, limits: Limits) -> Result<Binary> {
    let mut src = Source::new(reader, limits)?;

    let magic = src.read_table("ELF magic", 0, MAGIC.len() as u64)?;
    if magic != MAGIC {
        return Err(ElfError::format(format!(
            "bad ELF magic {:02x} {:02x} {:02x} {:02x}",
            magic[0], magic[1], magic[2], magic[3]
        )));
    }

    let mut ident = [0u8; IDENT_LEN];
    ident.copy_from_slice(&src.read_table("ELF identification", 0, IDENT_LEN as u64)?);

    let class = Class::from_ident(ident[EI_CLASS])
        .ok_or_else(|| ElfError::format(format!("invalid ELF class: {}", ident[EI_CLASS])))?;
    let encoding = Encoding::from_ident(ident[EI_DATA])
        .ok_or_else(|| ElfError::format(format!("invalid data encoding: {}", ident[EI_DATA])))?;
    log::debug!("ELF class {class}, {encoding}");

    match (class, encoding) {
        (Class::Elf32, Encoding::Little) => parse_body::<Elf32, LittleEndian, R>(&mut src, &ident, encoding),
        (Class::Elf32, Encoding::Big) => parse_body::<Elf32, BigEndian, R>(&mut src, &ident, encoding),
        (Class::Elf64, Encoding::Little) => parse_body::<Elf64, LittleEndian, R>(&mut src, &ident, encoding),
        (Class::Elf64, Encoding::Big) => parse_body::<Elf64, BigEndian, R>(&mut src, &ident, encoding),
    }
}

fn parse_body<W: Width, B: ByteOrder, R: Read + Seek>(
    src: &mut Source<'_, R>,
    ident: &[u8; IDENT_LEN],
    encoding: Encoding,
) -> Result<Binary> {
    let ehdr_size = u64::from(W::EHDR_SIZE);
    let raw = src.read_table("ELF header", 0, ehdr_size)?;
    let header = ElfHeader::from_reader::<W, B, _>(ident, encoding, &mut Cursor::new(&raw[IDENT_LEN..]))
        .map_err(short_read("ELF header", 0, ehdr_size, src.len))?;

    let raw_sections = read_section_headers::<W, B, R>(src, &header)?;
    let segments = read_segments::<W, B, R>(src, &header)?;

    let mut sections = Vec::with_capacity(raw_sections.len());
    let mut total_data = 0u64;
    for raw in &raw_sections {
        let mut section = Section {
            name: String::new(),
            sh_type: raw.sh_type,
            flags: raw.flags,
            addr: raw.addr,
            offset: raw.offset,
            size: raw.size,
            link: raw.link,
            info: raw.info,
            addralign: raw.addralign,
            entsize: raw.entsize,
            data: Vec::new(),
        };
        if section.has_file_data() && raw.size > 0 {
            total_data = total_data.saturating_add(raw.size);
            limits::check("total section data", total_data, src.limits.max_table_bytes)?;
            section.data = src.read_table("section data", raw.offset, raw.size)?;
        }
        sections.push(section);
    }

    for (i, s) in sections.iter().enumerate() {
        if s.link as usize >= sections.len() {
            return Err(ElfError::format(format!(
                "section {i} links to missing section {}",
                s.link
            )));
        }
    }

    let mut bin = Binary {
        path: String::new(),
        header,
        sections,
        segments,
        symbols: Vec::new(),
    };

    resolve_section_names(&mut bin, &raw_sections)?;
    bin.symbols = read_symbols::<W, B>(&bin, src.limits)?;

    log::debug!(
        "parsed {} sections, {} segments, {} symbols",
        bin.sections.len(),
        bin.segments.len(),
        bin.symbols.len()
    );
    Ok(bin)
}

fn read_section_headers<W: Width, B: ByteOrder, R: Read + Seek>(
    src: &mut Source<'_, R>,
    header: &ElfHeader,
) -> Result<Vec<RawSection>> {
    if header.e_shoff == 0 || header.e_shnum == 0 {
        log::debug!("no section header table");
        return Ok(Vec::new());
    }
    let count = u64::from(header.e_shnum);
    limits::check("section count", count, src.limits.max_sections)?;
    if header.e_shentsize != W::SHDR_SIZE {
        return Err(ElfError::format(format!(
            "section header entry size {} (expected {})",
            header.e_shentsize,
            W::SHDR_SIZE
        )));
    }

    let size = count * u64::from(W::SHDR_SIZE);
    let table = src.read_table("section header table", header.e_shoff, size)?;
    let mut cur = Cursor::new(table);
    (0..count)
        .map(|_| {
            width::read_section_header::<W, B, _>(&mut cur)
                .map_err(short_read("section header table", header.e_shoff, size, src.len))
        })
        .collect()
}

fn read_segments<W: Width, B: ByteOrder, R: Read + Seek>(
    src: &mut Source<'_, R>,
    header: &ElfHeader,
) -> Result<Vec<crate::sections::Segment>> {
    if header.e_phoff == 0 || header.e_phnum == 0 {
        return Ok(Vec::new());
    }
    let count = u64::from(header.e_phnum);
    limits::check("program header count", count, src.limits.max_segments)?;
    if header.e_phentsize != W::PHDR_SIZE {
        return Err(ElfError::format(format!(
            "program header entry size {} (expected {})",
            header.e_phentsize,
            W::PHDR_SIZE
        )));
    }

    let size = count * u64::from(W::PHDR_SIZE);
    let table = src.read_table("program header table", header.e_phoff, size)?;
    let mut cur = Cursor::new(table);
    (0..count)
        .map(|_| {
            W::read_segment::<B, _>(&mut cur)
                .map_err(short_read("program header table", header.e_phoff, size, src.len))
        })
        .collect()
}

fn resolve_section_names(bin: &mut Binary, raw: &[RawSection]) -> Result<()> {
    let index = usize::from(bin.header.e_shstrndx);
    if index == 0 || bin.sections.is_empty() {
        log::debug!("no section name string table");
        return Ok(());
    }
    let names = StringTable::new(bin.section(index)?.data.clone());
    for (section, raw) in bin.sections.iter_mut().zip(raw) {
        section.name = names.get(raw.name)?.into_owned();
    }
    Ok(())
}

fn read_symbols<W: Width, B: ByteOrder>(bin: &Binary, limits: Limits) -> Result<Vec<Symbol>> {
    let Some(symtab) = bin.sections.iter().find(|s| s.sh_type == SHT_SYMTAB) else {
        log::debug!("no symbol table");
        return Ok(Vec::new());
    };

    let size = symtab.data.len() as u64;
    if size % W::SYM_SIZE != 0 {
        return Err(ElfError::format(format!(
            "symbol table size {size} is not a multiple of {}",
            W::SYM_SIZE
        )));
    }
    let count = size / W::SYM_SIZE;
    limits::check("symbol count", count, limits.max_symbols)?;

    let names = match symtab.link {
        0 => None,
        link => Some(StringTable::new(bin.section(link as usize)?.data.clone())),
    };

    let mut cur = Cursor::new(symtab.data.as_slice());
    let mut symbols = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let raw = W::read_symbol::<B, _>(&mut cur)
            .map_err(short_read("symbol table", symtab.offset, size, size))?;
        let name = match &names {
            Some(table) => table.get(raw.name)?.into_owned(),
            None => String::new(),
        };
        symbols.push(Symbol {
            name,
            value: raw.value,
            size: raw.size,
            info: raw.info,
            other: raw.other,
            shndx: raw.shndx,
        });
    }
    Ok(symbols)
}

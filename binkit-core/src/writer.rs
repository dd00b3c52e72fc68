//! Re-encoding of a [`Binary`] into a self-consistent ELF image.
//!
//! The layout is rebuilt as header, program headers, section payloads and
//! section header table. When the file has program headers, allocated
//! sections stay where the segments expect them.
//!
//! `.symtab`, `.strtab` and `.shstrtab` are generated from the model, so
//! tools only ever edit `Binary::symbols` and `Binary::sections`.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use goblin::elf::section_header::{SHT_NULL, SHT_STRTAB, SHT_SYMTAB};

use crate::binary::Binary;
use crate::error::{ElfError, Result};
use crate::header::{Class, Encoding};
use crate::sections::{Section, StringTableBuilder};
use crate::symbols::Symbol;
use crate::width::{self, Elf32, Elf64, RawSection, RawSymbol, Width};

/// Largest alignment honored when placing payloads in the file.
const MAX_FILE_ALIGN: u64 = 4096;

impl Binary {
    /// Serializes in the binary's own class and byte order.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match (self.header.class, self.header.encoding) {
            (Class::Elf32, Encoding::Little) => write_image::<Elf32, LittleEndian>(self),
            (Class::Elf32, Encoding::Big) => write_image::<Elf32, BigEndian>(self),
            (Class::Elf64, Encoding::Little) => write_image::<Elf64, LittleEndian>(self),
            (Class::Elf64, Encoding::Big) => write_image::<Elf64, BigEndian>(self),
        }
    }
}

/// Tables the writer regenerates instead of copying.
pub(crate) fn is_generated(s: &Section) -> bool {
    s.sh_type == SHT_SYMTAB
        || (s.sh_type == SHT_STRTAB && (s.name == ".strtab" || s.name == ".shstrtab"))
}

fn align_up(value: u64, align: u64) -> Result<u64> {
    let align = if align.is_power_of_two() { align.min(MAX_FILE_ALIGN) } else { 1 };
    value
        .checked_add(align - 1)
        .map(|v| v & !(align - 1))
        .ok_or_else(|| ElfError::validation(format!("file offset {value:#x} overflows")))
}

/// Sections whose file offset is tied to a segment.
fn is_pinned(s: &Section) -> bool {
    s.is_alloc() && s.offset != 0
}

/// First free offset after the header, the program headers, every pinned
/// section and every segment, or `None` when there are no segments or those
/// regions would overlap in this class (for example ELF32 widened to ELF64).
fn pinned_image_end<W: Width>(bin: &Binary) -> Option<u64> {
    if bin.segments.is_empty() {
        return None;
    }
    let phoff = bin.header.e_phoff;
    let phsize = bin.segments.len() as u64 * u64::from(W::PHDR_SIZE);
    let mut ranges = vec![(0, u64::from(W::EHDR_SIZE)), (phoff, phoff.checked_add(phsize)?)];
    for s in bin.sections.iter().filter(|s| is_pinned(s) && s.has_file_data() && !s.data.is_empty()) {
        ranges.push((s.offset, s.offset.checked_add(s.data.len() as u64)?));
    }
    ranges.sort_unstable();
    if ranges.windows(2).any(|w| w[1].0 < w[0].1) {
        return None;
    }
    bin.segments
        .iter()
        .map(|p| p.offset.saturating_add(p.filesz))
        .chain(ranges.iter().map(|r| r.1))
        .max()
}

/// Copies `bytes` to `at` inside the already sized image.
fn place(out: &mut [u8], what: &str, at: u64, bytes: &[u8]) -> Result<()> {
    let slot = usize::try_from(at)
        .ok()
        .and_then(|start| out.get_mut(start..start.checked_add(bytes.len())?))
        .ok_or_else(|| ElfError::validation(format!("{what} at offset {at:#x} falls outside the image")))?;
    slot.copy_from_slice(bytes);
    Ok(())
}

fn write_image<W: Width, B: ByteOrder>(src: &Binary) -> Result<Vec<u8>> {
    let mut bin = src.clone();

    // Remember which sections pointed at the old symbol table so they can be
    // re-pointed at the regenerated one.
    let links_symtab: Vec<bool> = bin
        .sections
        .iter()
        .map(|s| {
            s.link != 0
                && bin
                    .sections
                    .get(s.link as usize)
                    .is_some_and(|t| t.sh_type == SHT_SYMTAB)
        })
        .collect();
    let map = bin.retain_sections(|s| !is_generated(s));
    let mut symtab_users = vec![false; bin.sections.len()];
    for (old, new) in map.iter().enumerate() {
        if let Some(new) = new {
            symtab_users[*new] = links_symtab[old];
        }
    }
    if bin.sections.first().map_or(true, |s| s.sh_type != SHT_NULL) {
        bin.insert_section(0, Section::null());
        symtab_users.insert(0, false);
    }

    let symbols: Vec<&Symbol> = {
        let live = bin.symbols.iter().filter(|s| !s.is_null());
        let (locals, rest): (Vec<&Symbol>, Vec<&Symbol>) = live.partition(|s| s.is_local());
        locals.into_iter().chain(rest).collect()
    };
    let first_nonlocal = 1 + symbols.iter().take_while(|s| s.is_local()).count();

    if !symbols.is_empty() {
        let symtab_index = bin.sections.len();
        let mut names = StringTableBuilder::new();
        let mut data = Vec::with_capacity((symbols.len() + 1) * W::SYM_SIZE as usize);
        W::write_symbol::<B>(&mut data, &RawSymbol::default())?;
        for sym in &symbols {
            let raw = RawSymbol {
                name: names.add(&sym.name),
                value: sym.value,
                size: sym.size,
                info: sym.info,
                other: sym.other,
                shndx: sym.shndx,
            };
            W::write_symbol::<B>(&mut data, &raw)?;
        }

        let mut symtab = Section::new(".symtab", SHT_SYMTAB, 0, data);
        symtab.link = (symtab_index + 1) as u32;
        symtab.info = first_nonlocal as u32;
        symtab.addralign = if W::CLASS == Class::Elf64 { 8 } else { 4 };
        symtab.entsize = W::SYM_SIZE;
        bin.sections.push(symtab);
        bin.sections.push(Section::new(".strtab", SHT_STRTAB, 0, names.finish()));

        for (s, uses) in bin.sections.iter_mut().zip(&symtab_users) {
            if *uses {
                s.link = symtab_index as u32;
            }
        }
    }

    let shstrndx = bin.sections.len();
    let mut shnames = StringTableBuilder::new();
    let mut name_offsets: Vec<u32> = bin.sections.iter().map(|s| shnames.add(&s.name)).collect();
    name_offsets.push(shnames.add(".shstrtab"));
    bin.sections.push(Section::new(".shstrtab", SHT_STRTAB, 0, shnames.finish()));

    let shnum = u16::try_from(bin.sections.len())
        .ok()
        .filter(|&n| n < 0xff00)
        .ok_or_else(|| ElfError::validation(format!("{} sections do not fit the header", bin.sections.len())))?;
    let phnum = u16::try_from(bin.segments.len())
        .map_err(|_| ElfError::validation(format!("{} program headers do not fit the header", bin.segments.len())))?;

    // Layout. With program headers, allocated sections keep their offsets so
    // every segment still maps the same bytes; the rest goes after the image.
    let ehsize = u64::from(W::EHDR_SIZE);
    let pinned = pinned_image_end::<W>(&bin);
    if pinned.is_none() && phnum > 0 {
        log::warn!("allocated sections no longer fit their segments; laying the file out afresh");
    }
    let phoff = match pinned {
        Some(_) => bin.header.e_phoff,
        None if phnum > 0 => ehsize,
        None => 0,
    };
    let mut offset = pinned.unwrap_or(ehsize + u64::from(phnum) * u64::from(W::PHDR_SIZE));
    let mut raws = Vec::with_capacity(bin.sections.len());
    for (s, &name) in bin.sections.iter_mut().zip(&name_offsets) {
        if s.sh_type == SHT_NULL {
            s.offset = 0;
        } else if pinned.is_some() && is_pinned(s) {
            if s.has_file_data() {
                s.size = s.data.len() as u64;
            }
        } else if s.has_file_data() {
            offset = align_up(offset, s.addralign)?;
            s.offset = offset;
            s.size = s.data.len() as u64;
            offset += s.size;
        } else {
            s.offset = offset;
        }
        raws.push(RawSection {
            name,
            sh_type: s.sh_type,
            flags: s.flags,
            addr: s.addr,
            offset: s.offset,
            size: s.size,
            link: s.link,
            info: s.info,
            addralign: s.addralign,
            entsize: s.entsize,
        });
    }
    let shoff = align_up(offset, if W::CLASS == Class::Elf64 { 8 } else { 4 })?;

    let mut header = bin.header;
    header.class = W::CLASS;
    header.e_ehsize = W::EHDR_SIZE;
    header.e_phoff = phoff;
    header.e_phentsize = if phnum > 0 { W::PHDR_SIZE } else { 0 };
    header.e_phnum = phnum;
    header.e_shoff = shoff;
    header.e_shentsize = W::SHDR_SIZE;
    header.e_shnum = shnum;
    header.e_shstrndx = shstrndx as u16;

    let mut out = Vec::with_capacity(shoff as usize + raws.len() * usize::from(W::SHDR_SIZE));
    header.write_to::<W, B>(&mut out)?;
    out.resize(shoff as usize, 0);
    if phnum > 0 {
        let mut table = Vec::with_capacity(usize::from(phnum) * usize::from(W::PHDR_SIZE));
        for seg in &bin.segments {
            W::write_segment::<B>(&mut table, seg)?;
        }
        place(&mut out, "program header table", phoff, &table)?;
    }
    for s in &bin.sections {
        if s.has_file_data() {
            place(&mut out, "section data", s.offset, &s.data)?;
        }
    }
    for raw in &raws {
        width::write_section_header::<W, B>(&mut out, raw)?;
    }

    log::debug!(
        "serialized {} sections, {} symbols into {} bytes",
        raws.len(),
        symbols.len(),
        out.len()
    );
    Ok(out)
}

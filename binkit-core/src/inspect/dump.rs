//! `readelf` and `objdump` style dumps.

use std::io::{self, Write};

use goblin::elf::section_header::{SHN_ABS, SHN_COMMON, SHT_NULL};
use goblin::elf::sym::{STV_DEFAULT, STV_HIDDEN, STV_INTERNAL};
use serde::Serialize;

use crate::binary::Binary;
use crate::header::{ElfHeader, Header};
use crate::labels;
use crate::sections::{Section, Segment};
use crate::symbols::Symbol;

/// One `readelf` view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Header,
    Sections,
    Symbols,
    Segments,
    All,
}

pub fn write_view<W: Write>(bin: &Binary, view: View, out: &mut W) -> io::Result<()> {
    match view {
        View::Header => write_file_header(bin, out),
        View::Sections => write_section_headers(bin, out),
        View::Symbols => write_symbols(bin, out),
        View::Segments => write_program_headers(bin, out),
        View::All => {
            write_file_header(bin, out)?;
            writeln!(out)?;
            write_section_headers(bin, out)?;
            writeln!(out)?;
            write_symbols(bin, out)?;
            writeln!(out)?;
            write_program_headers(bin, out)
        }
    }
}

pub fn write_file_header<W: Write>(bin: &Binary, out: &mut W) -> io::Result<()> {
    let h = &bin.header;
    write!(out, "ELF Header:\n  Magic:  ")?;
    for b in h.ident() {
        write!(out, " {b:02x}")?;
    }
    writeln!(out)?;
    writeln!(out, "  Class:                             {}", h.class)?;
    writeln!(out, "  Data:                              {}", h.encoding)?;
    writeln!(out, "  Version:                           {} (current)", h.ident_version)?;
    writeln!(out, "  OS/ABI:                            {}", labels::os_abi_name(h.os_abi))?;
    writeln!(out, "  ABI Version:                       {}", h.abi_version)?;
    writeln!(out, "  Type:                              {}", labels::elf_type_name(h.e_type))?;
    writeln!(out, "  Machine:                           {}", labels::machine_name(h.e_machine))?;
    writeln!(out, "  Version:                           {:#x}", h.e_version)?;
    writeln!(out, "  Entry point address:               {:#x}", h.e_entry)?;
    writeln!(out, "  Start of program headers:          {} (bytes into file)", h.e_phoff)?;
    writeln!(out, "  Start of section headers:          {} (bytes into file)", h.e_shoff)?;
    writeln!(out, "  Flags:                             {:#x}", h.e_flags)?;
    writeln!(out, "  Size of this header:               {} (bytes)", h.e_ehsize)?;
    writeln!(out, "  Size of program headers:           {} (bytes)", h.e_phentsize)?;
    writeln!(out, "  Number of program headers:         {}", h.e_phnum)?;
    writeln!(out, "  Size of section headers:           {} (bytes)", h.e_shentsize)?;
    writeln!(out, "  Number of section headers:         {}", h.e_shnum)?;
    writeln!(out, "  Section header string table index: {}", h.e_shstrndx)
}

fn truncate(name: &str, max: usize) -> &str {
    match name.char_indices().nth(max) {
        Some((at, _)) => &name[..at],
        None => name,
    }
}

pub fn write_section_headers<W: Write>(bin: &Binary, out: &mut W) -> io::Result<()> {
    writeln!(
        out,
        "There are {} section headers, starting at offset {:#x}:\n",
        bin.sections.len(),
        bin.header.e_shoff
    )?;
    writeln!(out, "Section Headers:")?;
    writeln!(
        out,
        "  [Nr] Name              Type            Address          Off    Size   ES Flg Lk Inf Al"
    )?;
    for (i, s) in bin.sections.iter().enumerate() {
        writeln!(
            out,
            "  [{i:2}] {:<17} {:<15} {:016x} {:06x} {:06x} {:02x} {:>3} {:2} {:3} {:2}",
            truncate(&s.name, 17),
            labels::section_type_name(s.sh_type),
            s.addr,
            s.offset,
            s.size,
            s.entsize,
            labels::section_flags(s.flags),
            s.link,
            s.info,
            s.addralign
        )?;
    }
    Ok(())
}

pub fn write_symbols<W: Write>(bin: &Binary, out: &mut W) -> io::Result<()> {
    if bin.symbols.is_empty() {
        return writeln!(out, "No symbol table found");
    }
    writeln!(out, "Symbol table '.symtab' contains {} entries:", bin.symbols.len())?;
    writeln!(out, "   Num:    Value          Size Type    Bind   Vis      Ndx Name")?;
    for (i, sym) in bin.symbols.iter().enumerate() {
        let ndx = match u32::from(sym.shndx) {
            0 => "UND".to_string(),
            SHN_ABS => "ABS".to_string(),
            SHN_COMMON => "COM".to_string(),
            n => n.to_string(),
        };
        writeln!(
            out,
            "{i:6}: {:016x} {:5} {:<7} {:<6} {:<7} {ndx:>3} {}",
            sym.value,
            sym.size,
            short_label(&sym.type_name(), "STT_"),
            short_label(&sym.binding_name(), "STB_"),
            visibility(sym.other),
            sym.name
        )?;
    }
    Ok(())
}

/// The `STV_*` name held in the low two bits of `st_other`.
fn visibility(other: u8) -> &'static str {
    match other & 0x3 {
        STV_DEFAULT => "DEFAULT",
        STV_INTERNAL => "INTERNAL",
        STV_HIDDEN => "HIDDEN",
        _ => "PROTECTED",
    }
}

fn short_label(label: &str, prefix: &str) -> String {
    label.strip_prefix(prefix).unwrap_or(label).to_string()
}

pub fn write_program_headers<W: Write>(bin: &Binary, out: &mut W) -> io::Result<()> {
    let h = &bin.header;
    writeln!(out, "Elf file type is {}", labels::elf_type_name(h.e_type))?;
    writeln!(out, "Entry point {:#x}", h.e_entry)?;
    writeln!(
        out,
        "There are {} program headers, starting at offset {}\n",
        bin.segments.len(),
        h.e_phoff
    )?;
    if bin.segments.is_empty() {
        return writeln!(out, "No program headers found");
    }
    writeln!(out, "Program Headers:")?;
    writeln!(out, "  Type           Offset             VirtAddr           PhysAddr")?;
    writeln!(out, "                 FileSiz            MemSiz              Flags  Align")?;
    for seg in &bin.segments {
        writeln!(
            out,
            "  {:<14} 0x{:016x} 0x{:016x} 0x{:016x}",
            labels::segment_type_name(seg.p_type),
            seg.offset,
            seg.vaddr,
            seg.paddr
        )?;
        writeln!(
            out,
            "                 0x{:016x} 0x{:016x} {}     {:#x}",
            seg.filesz,
            seg.memsz,
            labels::segment_flags(seg.flags),
            seg.align
        )?;
    }
    Ok(())
}

/// `objdump -x` style summary: format line, header, section list and symbols.
pub fn write_objdump<W: Write>(bin: &Binary, filename: &str, out: &mut W) -> io::Result<()> {
    let h = &bin.header;
    writeln!(out, "{filename}:     file format {}", h.format_name())?;
    writeln!(out, "architecture: {}", labels::machine_name(h.machine()))?;
    writeln!(out, "start address: {:#018x}\n", h.entry_point())?;

    writeln!(out, "Sections:")?;
    writeln!(out, "Idx Name          Size      Address")?;
    for (i, s) in bin.sections.iter().enumerate().filter(|(_, s)| s.sh_type != SHT_NULL) {
        writeln!(out, "{i:3} {:<13} {:08x}  {:016x}", truncate(&s.name, 13), s.size, s.addr)?;
    }
    writeln!(out)?;

    if bin.symbols.is_empty() {
        return writeln!(out, "SYMBOL TABLE:\nno symbols");
    }
    writeln!(out, "SYMBOL TABLE:")?;
    for sym in bin.named_symbols() {
        let section = match u32::from(sym.shndx) {
            0 => "*UND*",
            SHN_COMMON => "*COM*",
            _ if !sym.in_regular_section() => "*ABS*",
            n => bin.sections.get(n as usize).map_or("*ABS*", |s| s.name.as_str()),
        };
        writeln!(
            out,
            "{:016x} {}{} {section}\t{:016x} {}",
            sym.value,
            binding_flag(sym),
            type_flag(sym),
            sym.size,
            sym.name
        )?;
    }
    Ok(())
}

fn binding_flag(sym: &Symbol) -> char {
    if sym.is_global() {
        'g'
    } else if sym.is_weak() {
        'w'
    } else if sym.is_local() {
        'l'
    } else {
        ' '
    }
}

fn type_flag(sym: &Symbol) -> char {
    use goblin::elf::sym::{STT_FILE, STT_FUNC, STT_OBJECT, STT_SECTION};
    match sym.sym_type() {
        STT_FUNC => 'F',
        STT_OBJECT => 'O',
        STT_FILE => 'f',
        STT_SECTION => 'd',
        _ => ' ',
    }
}

/// Serializable snapshot of a [`Binary`] for `readelf --json`.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub file: &'a str,
    pub format: &'static str,
    pub machine: String,
    pub os_abi: String,
    pub elf_type: String,
    pub header: &'a ElfHeader,
    pub sections: &'a [Section],
    pub segments: &'a [Segment],
    pub symbols: &'a [Symbol],
}

impl<'a> Report<'a> {
    pub fn new(bin: &'a Binary, file: &'a str) -> Self {
        let h = &bin.header;
        Self {
            file,
            format: h.format_name(),
            machine: labels::machine_name(h.e_machine).into_owned(),
            os_abi: labels::os_abi_name(h.os_abi).into_owned(),
            elf_type: labels::elf_type_name(h.e_type).into_owned(),
            header: h,
            sections: &bin.sections,
            segments: &bin.segments,
            symbols: &bin.symbols,
        }
    }
}

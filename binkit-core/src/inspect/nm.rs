use std::io::{self, Write};

use goblin::elf::sym::{STT_FILE, STT_FUNC, STT_NOTYPE, STT_OBJECT, STT_SECTION};

use super::{address_width, demangle};
use crate::binary::Binary;
use crate::symbols::Symbol;

/// The one-letter class `nm` prints for a symbol. Untyped symbols take
/// their class from the section they are defined in.
pub fn symbol_char(bin: &Binary, sym: &Symbol) -> char {
    let c = if sym.is_undefined() {
        'U'
    } else {
        match sym.sym_type() {
            STT_FUNC => 'T',
            STT_OBJECT => 'D',
            STT_SECTION => 'S',
            STT_FILE => 'A',
            STT_NOTYPE if sym.in_regular_section() => match bin.sections.get(usize::from(sym.shndx)) {
                Some(section) if section.is_executable() => 'T',
                Some(_) => 'D',
                None => '?',
            },
            _ => '?',
        }
    };
    if sym.is_weak() {
        if c == 'U' { 'w' } else { c.to_ascii_lowercase() }
    } else if sym.is_local() {
        c.to_ascii_lowercase()
    } else {
        c
    }
}

/// Named symbols in ascending value order; ties keep table order.
pub fn sorted_symbols(bin: &Binary) -> Vec<&Symbol> {
    let mut symbols: Vec<&Symbol> = bin.named_symbols().collect();
    symbols.sort_by_key(|s| s.value);
    symbols
}

/// Writes the listing; `demangled` runs C++ names through [`demangle::demangle`].
pub fn write_symbols<W: Write>(bin: &Binary, demangled: bool, out: &mut W) -> io::Result<()> {
    let width = address_width(bin.class());
    for sym in sorted_symbols(bin) {
        let c = symbol_char(bin, sym);
        let name = if demangled {
            demangle::demangle(&sym.name)
        } else {
            sym.name.as_str().into()
        };
        if sym.is_undefined() && sym.value == 0 {
            writeln!(out, "{:width$} {c} {name}", "")?;
        } else {
            writeln!(out, "{:0width$x} {c} {name}", sym.value)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{Class, ElfHeader};
    use crate::sections::Section;
    use goblin::elf::section_header::{SHN_ABS, SHT_PROGBITS};
    use goblin::elf::sym::{STB_GLOBAL, STB_LOCAL, STB_WEAK};

    fn render(bin: &Binary, demangled: bool) -> String {
        let mut out = Vec::new();
        write_symbols(bin, demangled, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn listing(bin: &Binary) -> String {
        render(bin, false)
    }

    #[test]
    fn sorted_by_value() {
        let mut bin = Binary::new(ElfHeader::x86_64_relocatable());
        bin.symbols.push(Symbol::new("", 0, 0, 0, 0));
        bin.symbols.push(Symbol::new("fifty", 50, STT_FUNC, STB_GLOBAL, 1));
        bin.symbols.push(Symbol::new("ten", 10, STT_FUNC, STB_GLOBAL, 1));
        bin.symbols.push(Symbol::new("thirty", 30, STT_OBJECT, STB_GLOBAL, 1));
        assert_eq!(
            listing(&bin),
            "000000000000000a T ten\n\
             000000000000001e D thirty\n\
             0000000000000032 T fifty\n"
        );
    }

    #[test]
    fn classes_and_blank_addresses() {
        let mut bin = Binary::new(ElfHeader::x86_64_relocatable());
        bin.header.class = Class::Elf32;
        bin.symbols.push(Symbol::new("puts", 0, STT_NOTYPE, STB_GLOBAL, 0));
        bin.symbols.push(Symbol::new("maybe", 0, STT_NOTYPE, STB_WEAK, 0));
        bin.symbols.push(Symbol::new("helper", 4, STT_FUNC, STB_LOCAL, 1));
        bin.symbols.push(Symbol::new("tbl", 8, STT_OBJECT, STB_WEAK, 2));
        assert_eq!(
            listing(&bin),
            "         U puts\n         w maybe\n00000004 t helper\n00000008 d tbl\n"
        );
    }

    #[test]
    fn untyped_symbols_follow_their_section() {
        let mut bin = Binary::new(ElfHeader::x86_64_relocatable());
        bin.sections.push(Section::new(".text", SHT_PROGBITS, 6, vec![0xc3; 16]));
        bin.sections.push(Section::new(".data", SHT_PROGBITS, 3, vec![0; 16]));
        bin.symbols.push(Symbol::new("_start", 0, STT_NOTYPE, STB_GLOBAL, 1));
        bin.symbols.push(Symbol::new("loop", 4, STT_NOTYPE, STB_LOCAL, 1));
        bin.symbols.push(Symbol::new("table", 8, STT_NOTYPE, STB_GLOBAL, 2));
        bin.symbols.push(Symbol::new("magic", 12, STT_NOTYPE, STB_GLOBAL, SHN_ABS as u16));
        assert_eq!(
            listing(&bin),
            "0000000000000000 T _start
             0000000000000004 t loop
             0000000000000008 D table
             000000000000000c ? magic
"
        );
    }

    #[test]
    fn demangles_on_request() {
        let mut bin = Binary::new(ElfHeader::x86_64_relocatable());
        bin.symbols.push(Symbol::new("_ZN5Class6methodEv", 16, STT_FUNC, STB_GLOBAL, 1));
        bin.symbols.push(Symbol::new("main", 32, STT_FUNC, STB_GLOBAL, 1));
        assert_eq!(
            render(&bin, false),
            "0000000000000010 T _ZN5Class6methodEv\n0000000000000020 T main\n"
        );
        assert_eq!(render(&bin, true), "0000000000000010 T Class::method()\n0000000000000020 T main\n");
    }
}

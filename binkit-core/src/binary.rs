use crate::error::{ElfError, Result};
use crate::header::{Class, ElfHeader, Encoding};
use crate::limits::Limits;
use crate::parser;
use crate::sections::{Section, Segment};
use crate::symbols::Symbol;
use goblin::elf::section_header::{SHF_INFO_LINK, SHT_REL, SHT_RELA};
use std::io::{BufReader, Read, Seek};
use std::path::Path;

/// One decoded ELF file.
///
/// The parser builds it once and never touches it again; tools that change
/// a file clone it, edit the copy and serialize with [`Binary::to_bytes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binary {
    pub path: String,
    pub header: ElfHeader,
    /// Every section header in file order, index 0 included.
    pub sections: Vec<Section>,
    pub segments: Vec<Segment>,
    /// Every record of the symbol table, index 0 included.
    pub symbols: Vec<Symbol>,
}

impl Binary {
    /// An empty file with only the null section.
    pub fn new(header: ElfHeader) -> Self {
        Self {
            path: String::new(),
            header,
            sections: vec![Section::null()],
            segments: Vec::new(),
            symbols: Vec::new(),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(&path)?;
        let mut reader = BufReader::new(file);
        let mut bin = Self::parse(&mut reader)?;
        bin.path = path.as_ref().display().to_string();
        Ok(bin)
    }

    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        parser::parse_with_limits(reader, Limits::default())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::parse(&mut std::io::Cursor::new(bytes))
    }

    pub fn class(&self) -> Class {
        self.header.class
    }

    pub fn encoding(&self) -> Encoding {
        self.header.encoding
    }

    /// The section at `index`, or a format error naming the bad index.
    pub fn section(&self, index: usize) -> Result<&Section> {
        self.sections.get(index).ok_or_else(|| {
            ElfError::format(format!(
                "section index {index} out of range ({} sections)",
                self.sections.len()
            ))
        })
    }

    pub fn section_by_name(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Symbols with a non-empty name.
    pub fn named_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(|s| !s.name.is_empty())
    }

    pub fn is_stripped(&self) -> bool {
        self.symbols.iter().all(Symbol::is_null)
    }

    /// Keeps the sections for which `keep` returns true and renumbers every
    /// section index held elsewhere in the model. Symbols defined in a removed
    /// section are dropped; links to a removed section become 0.
    ///
    /// Returns the old-to-new index map.
    pub fn retain_sections<F: FnMut(&Section) -> bool>(&mut self, mut keep: F) -> Vec<Option<usize>> {
        let mut map = Vec::with_capacity(self.sections.len());
        let mut next = 0;
        for s in &self.sections {
            if keep(s) {
                map.push(Some(next));
                next += 1;
            } else {
                map.push(None);
            }
        }
        let mut index = 0;
        self.sections.retain(|_| {
            let kept = map[index].is_some();
            index += 1;
            kept
        });
        self.remap_indices(&map);
        map
    }

    /// Inserts `section` at `at`, shifting everything after it.
    pub fn insert_section(&mut self, at: usize, section: Section) {
        let map: Vec<Option<usize>> = (0..self.sections.len())
            .map(|i| Some(if i < at { i } else { i + 1 }))
            .collect();
        self.sections.insert(at, section);
        self.remap_indices(&map);
    }

    fn remap_indices(&mut self, map: &[Option<usize>]) {
        let lookup = |old: u32| map.get(old as usize).copied().flatten();

        self.symbols.retain_mut(|sym| {
            if !sym.in_regular_section() {
                return true;
            }
            match lookup(u32::from(sym.shndx)) {
                Some(new) => {
                    sym.shndx = new as u16;
                    true
                }
                None => false,
            }
        });

        for s in &mut self.sections {
            if s.link != 0 {
                s.link = lookup(s.link).map_or(0, |n| n as u32);
            }
            let info_is_index =
                s.sh_type == SHT_REL || s.sh_type == SHT_RELA || s.flags & u64::from(SHF_INFO_LINK) != 0;
            if info_is_index && s.info != 0 {
                s.info = lookup(s.info).map_or(0, |n| n as u32);
            }
        }

        if self.header.e_shstrndx != 0 {
            self.header.e_shstrndx = lookup(u32::from(self.header.e_shstrndx)).map_or(0, |n| n as u16);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goblin::elf::section_header::{SHT_PROGBITS, SHT_STRTAB, SHT_SYMTAB};
    use goblin::elf::sym::{STB_GLOBAL, STT_FUNC, STT_OBJECT};

    fn sample() -> Binary {
        let mut bin = Binary::new(ElfHeader::x86_64_relocatable());
        bin.sections.push(Section::new(".text", SHT_PROGBITS, 6, vec![0x90; 4]));
        bin.sections.push(Section::new(".debug_info", SHT_PROGBITS, 0, vec![1, 2]));
        bin.sections.push(Section::new(".data", SHT_PROGBITS, 3, vec![7; 8]));
        let mut rela = Section::new(".rela.data", SHT_RELA, 0, vec![]);
        rela.link = 5;
        rela.info = 3;
        bin.sections.push(rela);
        bin.sections.push(Section::new(".symtab", SHT_SYMTAB, 0, vec![]));
        bin.sections.push(Section::new(".strtab", SHT_STRTAB, 0, vec![]));
        bin.symbols.push(Symbol::new("f", 0, STT_FUNC, STB_GLOBAL, 1));
        bin.symbols.push(Symbol::new("dbg", 0, STT_OBJECT, STB_GLOBAL, 2));
        bin.symbols.push(Symbol::new("d", 4, STT_OBJECT, STB_GLOBAL, 3));
        bin.symbols.push(Symbol::new("ext", 0, 0, STB_GLOBAL, 0));
        bin
    }

    #[test]
    fn retain_renumbers_symbols_and_links() {
        let mut bin = sample();
        let map = bin.retain_sections(|s| !s.is_debug());
        assert_eq!(map[2], None);
        assert_eq!(map[3], Some(2));

        let names: Vec<_> = bin.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["f", "d", "ext"]);
        assert_eq!(bin.symbols[1].shndx, 2);
        assert_eq!(bin.symbols[2].shndx, 0);

        let rela = bin.section_by_name(".rela.data").unwrap();
        assert_eq!(rela.info, 2);
        assert_eq!(rela.link, 4);
    }

    #[test]
    fn insert_shifts_indices() {
        let mut bin = sample();
        bin.insert_section(1, Section::new(".init", SHT_PROGBITS, 6, vec![0xc3]));
        assert_eq!(bin.symbols[0].shndx, 2);
        assert_eq!(bin.section_by_name(".rela.data").unwrap().info, 4);
    }

    #[test]
    fn checked_section_access() {
        let bin = sample();
        assert_eq!(bin.section(1).unwrap().name, ".text");
        assert_eq!(bin.section(99).unwrap_err().kind(), "FormatError");
    }
}

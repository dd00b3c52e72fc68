//! A toy static linker.
//!
//! Sections with the same name are concatenated in first-appearance order and
//! symbols are resolved by name: a defined symbol replaces an undefined
//! placeholder, otherwise the first definition wins. There is no relocation
//! processing, no weak precedence and no common-symbol merging.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use goblin::elf::section_header::{SHN_LORESERVE, SHT_NULL};
use goblin::elf::sym::{STT_FILE, STT_SECTION};

use crate::binary::Binary;
use crate::error::ElfError;
use crate::header::ElfHeader;
use crate::limits;
use crate::output;
use crate::sections::Section;
use crate::symbols::Symbol;
use crate::writer::is_generated;

/// Most input files accepted by one link.
pub const MAX_INPUTS: u64 = 1000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkOptions {
    /// Fail on a second definition of a symbol instead of keeping the first.
    pub reject_duplicates: bool,
}

struct Resolved {
    symbol: Symbol,
    origin: usize,
}

/// Links already-parsed inputs into one ELF64 x86_64 executable model.
pub fn link(inputs: &[Binary], opts: LinkOptions) -> anyhow::Result<Binary> {
    if inputs.is_empty() {
        bail!("no input files");
    }
    limits::check("link inputs", inputs.len() as u64, MAX_INPUTS)?;

    let mut out = Binary::new(ElfHeader::x86_64_executable());
    let mut by_name: HashMap<String, usize> = HashMap::new();

    // placement[input][section] = (merged index, byte offset inside it)
    let mut placement: Vec<Vec<Option<(usize, u64)>>> = Vec::with_capacity(inputs.len());
    for bin in inputs {
        let mut here = Vec::with_capacity(bin.sections.len());
        for s in &bin.sections {
            if s.sh_type == SHT_NULL || is_generated(s) {
                here.push(None);
                continue;
            }
            let index = *by_name.entry(s.name.clone()).or_insert_with(|| {
                out.sections.push(Section {
                    data: Vec::new(),
                    size: 0,
                    offset: 0,
                    link: 0,
                    info: 0,
                    ..s.clone()
                });
                out.sections.len() - 1
            });
            let merged = &mut out.sections[index];
            let offset = merged.size;
            if s.has_file_data() {
                merged.data.extend_from_slice(&s.data);
                merged.size = merged.data.len() as u64;
            } else {
                merged.size = merged.size.saturating_add(s.size);
            }
            merged.flags |= s.flags;
            merged.addralign = merged.addralign.max(s.addralign);
            here.push(Some((index, offset)));
        }
        placement.push(here);
    }
    if out.sections.len() as u64 > u64::from(SHN_LORESERVE) {
        return Err(ElfError::validation(format!(
            "{} merged sections do not fit below the reserved index range",
            out.sections.len() - 1
        ))
        .into());
    }

    let mut resolved: Vec<Resolved> = Vec::new();
    let mut symbol_index: HashMap<String, usize> = HashMap::new();
    for (i, bin) in inputs.iter().enumerate() {
        for sym in bin.named_symbols() {
            if matches!(sym.sym_type(), STT_SECTION | STT_FILE) {
                continue;
            }
            let mut sym = sym.clone();
            if sym.in_regular_section() {
                match placement[i].get(usize::from(sym.shndx)).copied().flatten() {
                    Some((index, offset)) => {
                        sym.shndx = u16::try_from(index)
                            .map_err(|_| ElfError::validation(format!("section index {index} of `{}`", sym.name)))?;
                        sym.value = sym.value.wrapping_add(offset);
                    }
                    None => sym.shndx = 0,
                }
            }

            match symbol_index.get(&sym.name).copied() {
                None => {
                    symbol_index.insert(sym.name.clone(), resolved.len());
                    resolved.push(Resolved { symbol: sym, origin: i });
                }
                Some(at) => {
                    let existing = &mut resolved[at];
                    if !existing.symbol.is_defined() && sym.is_defined() {
                        *existing = Resolved { symbol: sym, origin: i };
                    } else if existing.symbol.is_defined() && sym.is_defined() {
                        let first = &inputs[existing.origin].path;
                        if opts.reject_duplicates {
                            bail!(
                                "duplicate definition of `{}` in {} (first defined in {first})",
                                sym.name,
                                bin.path
                            );
                        }
                        log::warn!(
                            "duplicate definition of `{}` in {}; keeping the one from {first}",
                            sym.name,
                            bin.path
                        );
                    }
                }
            }
        }
    }
    out.symbols = resolved.into_iter().map(|r| r.symbol).collect();
    out.header.e_entry = inputs.iter().map(|b| b.header.e_entry).find(|&e| e != 0).unwrap_or(0);

    log::info!(
        "linked {} inputs: {} sections, {} symbols",
        inputs.len(),
        out.sections.len() - 1,
        out.symbols.len()
    );
    Ok(out)
}

/// Parses every input, links them and writes `dest` as an executable. Nothing
/// is written unless every input parsed.
pub fn link_files(paths: &[PathBuf], dest: &Path, opts: LinkOptions) -> anyhow::Result<Binary> {
    limits::check("link inputs", paths.len() as u64, MAX_INPUTS)?;
    let inputs = paths
        .iter()
        .map(|p| Binary::open(p).with_context(|| format!("{}: cannot parse", p.display())))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let linked = link(&inputs, opts)?;
    let bytes = linked.to_bytes()?;
    output::write_atomic(dest, &bytes).with_context(|| format!("{}: cannot write", dest.display()))?;
    output::set_mode(dest, 0o755)?;
    Ok(linked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ElfError;
    use goblin::elf::section_header::SHT_PROGBITS;
    use goblin::elf::sym::{STB_GLOBAL, STT_FUNC, STT_NOTYPE};

    fn object(path: &str, text: Vec<u8>, symbols: Vec<Symbol>) -> Binary {
        let mut bin = Binary::new(ElfHeader::x86_64_relocatable());
        bin.path = path.to_string();
        bin.sections.push(Section::new(".text", SHT_PROGBITS, 6, text));
        bin.symbols = symbols;
        bin
    }

    #[test]
    fn defined_beats_undefined() {
        let a = object("a.o", vec![0x90; 4], vec![Symbol::new("foo", 0, STT_FUNC, STB_GLOBAL, 1)]);
        let b = object("b.o", vec![0xc3; 2], vec![Symbol::new("foo", 0, STT_NOTYPE, STB_GLOBAL, 0)]);
        for inputs in [[a.clone(), b.clone()], [b, a]] {
            let out = link(&inputs, LinkOptions::default()).unwrap();
            let foos: Vec<_> = out.symbols.iter().filter(|s| s.name == "foo").collect();
            assert_eq!(foos.len(), 1);
            assert_eq!(foos[0].sym_type(), STT_FUNC);
        }
    }

    #[test]
    fn sections_concatenate_in_input_order() {
        let a = object("a.o", vec![1; 10], vec![Symbol::new("f", 2, STT_FUNC, STB_GLOBAL, 1)]);
        let b = object("b.o", vec![2; 20], vec![Symbol::new("g", 3, STT_FUNC, STB_GLOBAL, 1)]);
        let out = link(&[a, b], LinkOptions::default()).unwrap();

        let text = out.section_by_name(".text").unwrap();
        assert_eq!(text.size, 30);
        let mut expected = vec![1; 10];
        expected.extend(vec![2; 20]);
        assert_eq!(text.data, expected);

        let g = out.symbols.iter().find(|s| s.name == "g").unwrap();
        assert_eq!(g.value, 13);
        assert_eq!(out.sections[usize::from(g.shndx)].name, ".text");
    }

    #[test]
    fn duplicates_warn_or_fail() {
        let a = object("a.o", vec![0; 4], vec![Symbol::new("dup", 0, STT_FUNC, STB_GLOBAL, 1)]);
        let b = object("b.o", vec![0; 4], vec![Symbol::new("dup", 1, STT_FUNC, STB_GLOBAL, 1)]);
        let out = link(&[a.clone(), b.clone()], LinkOptions::default()).unwrap();
        assert_eq!(out.symbols.iter().find(|s| s.name == "dup").unwrap().value, 0);

        let strict = LinkOptions { reject_duplicates: true };
        let err = link(&[a, b], strict).unwrap_err();
        assert!(err.to_string().contains("b.o"));
    }

    #[test]
    fn entry_and_header() {
        let mut a = object("a.o", vec![0; 4], vec![]);
        let mut b = object("b.o", vec![0; 4], vec![]);
        b.header.e_entry = 0x401000;
        a.header.e_entry = 0;
        let out = link(&[a, b], LinkOptions::default()).unwrap();
        assert_eq!(out.header, ElfHeader { e_entry: 0x401000, ..ElfHeader::x86_64_executable() });
        assert!(link(&[], LinkOptions::default()).is_err());
    }

    #[test]
    fn merged_indices_stay_below_reserved_range() {
        let mut wide = object("wide.o", vec![0xc3], vec![]);
        for i in 1..SHN_LORESERVE {
            wide.sections.push(Section::new(format!(".s{i}"), SHT_PROGBITS, 2, Vec::new()));
        }
        wide.symbols.push(Symbol::new("last", 0, STT_FUNC, STB_GLOBAL, (wide.sections.len() - 1) as u16));

        let err = link(&[wide.clone()], LinkOptions::default()).unwrap_err();
        assert_eq!(err.downcast_ref::<ElfError>().map(ElfError::kind), Some("ValidationError"));

        wide.sections.pop();
        wide.symbols.clear();
        let out = link(&[wide], LinkOptions::default()).unwrap();
        assert_eq!(out.sections.len() as u32, SHN_LORESERVE);
    }

    #[test]
    fn bad_input_aborts_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.o");
        let bad = dir.path().join("bad.o");
        std::fs::write(&good, object("", vec![0xc3], vec![]).to_bytes().unwrap()).unwrap();
        std::fs::write(&bad, b"\x7fELF\x07").unwrap();
        let dest = dir.path().join("a.out");

        let err = link_files(&[good.clone(), bad], &dest, LinkOptions::default()).unwrap_err();
        assert!(format!("{err:#}").contains("bad.o"));
        assert!(err.downcast_ref::<ElfError>().is_some());
        assert!(!dest.exists());

        let out = link_files(&[good], &dest, LinkOptions::default()).unwrap();
        assert_eq!(Binary::open(&dest).unwrap().sections.len(), out.sections.len() + 1);
    }
}

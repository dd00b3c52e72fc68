//! Hostile size and count fields fail with typed errors before anything is
//! allocated for them.

use std::io::Cursor;

use binkit_core::parser::parse_with_limits;
use binkit_core::{Binary, ElfError, ElfHeader, Limits, Section, Symbol};
use byteorder::{ByteOrder, LittleEndian};
use goblin::elf::section_header::SHT_PROGBITS;
use goblin::elf::sym::{STB_GLOBAL, STT_FUNC};
use proptest::prelude::*;

const SHDR: usize = 64;
const SH_SIZE: usize = 32;
const E_SHOFF: usize = 0x28;
const E_SHNUM: usize = 0x3c;
const E_SHSTRNDX: usize = 0x3e;

fn sample() -> Vec<u8> {
    let mut bin = Binary::new(ElfHeader::x86_64_relocatable());
    bin.sections.push(Section::new(".text", SHT_PROGBITS, 6, vec![0x90; 32]));
    bin.symbols.push(Symbol::new("main", 0, STT_FUNC, STB_GLOBAL, 1));
    bin.to_bytes().unwrap()
}

/// Offset of the `sh_size` field of section `index`.
fn size_field(bytes: &[u8], index: usize) -> usize {
    LittleEndian::read_u64(&bytes[E_SHOFF..]) as usize + index * SHDR + SH_SIZE
}

fn kind(bytes: &[u8]) -> &'static str {
    Binary::from_bytes(bytes).unwrap_err().kind()
}

#[test]
fn oversized_string_table_is_refused() {
    let mut bytes = sample();
    let shstrndx = LittleEndian::read_u16(&bytes[E_SHSTRNDX..]) as usize;
    let at = size_field(&bytes, shstrndx);
    LittleEndian::write_u64(&mut bytes[at..], 200 * 1024 * 1024);
    assert_eq!(kind(&bytes), "LimitExceededError");
}

#[test]
fn section_count_above_ceiling() {
    let mut bytes = sample();
    LittleEndian::write_u16(&mut bytes[E_SHNUM..], 20_000);
    match Binary::from_bytes(&bytes).unwrap_err() {
        ElfError::LimitExceeded { declared, limit, .. } => {
            assert_eq!(declared, 20_000);
            assert_eq!(limit, 10_000);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn overridden_limits() {
    let bytes = sample();
    let tight = Limits {
        max_symbols: 1,
        ..Limits::default()
    };
    let err = parse_with_limits(&mut Cursor::new(&bytes), tight).unwrap_err();
    assert_eq!(err.kind(), "LimitExceededError");
    assert!(parse_with_limits(&mut Cursor::new(&bytes), Limits::default()).is_ok());
}

#[test]
fn structural_failures() {
    assert_eq!(kind(b"\x7fELG\x02\x01\x01"), "FormatError");
    assert_eq!(kind(b"\x7fEL"), "TruncatedError");

    let mut bytes = sample();
    bytes[4] = 3;
    assert_eq!(kind(&bytes), "FormatError");

    let mut bytes = sample();
    bytes[5] = 0;
    assert_eq!(kind(&bytes), "FormatError");

    let mut bytes = sample();
    LittleEndian::write_u16(&mut bytes[E_SHSTRNDX..], 99);
    assert_eq!(kind(&bytes), "FormatError");
}

#[test]
fn non_utf8_names_still_parse() {
    let mut bytes = sample();
    let at = bytes.windows(5).position(|w| w == b"main\0").unwrap();
    bytes[at + 1] = 0xff;
    bytes[at + 2] = 0xfe;

    let bin = Binary::from_bytes(&bytes).unwrap();
    let names: Vec<_> = bin.named_symbols().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["m\u{fffd}\u{fffd}n"]);
    assert_eq!(bin.section_by_name(".text").unwrap().data, [0x90; 32]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Any cut of a valid file fails cleanly instead of panicking.
    #[test]
    fn truncation_never_panics(cut in 0usize..400) {
        let bytes = sample();
        let cut = cut.min(bytes.len() - 1);
        let err = Binary::from_bytes(&bytes[..cut]).unwrap_err();
        prop_assert!(matches!(err.kind(), "TruncatedError" | "FormatError"), "{}", err);
    }

    /// Any declared section size above the per-table ceiling is refused.
    #[test]
    fn any_oversized_section(extra in 1u64..u32::MAX as u64) {
        let mut bytes = sample();
        let at = size_field(&bytes, 1);
        LittleEndian::write_u64(&mut bytes[at..], binkit_core::limits::MAX_TABLE_BYTES + extra);
        prop_assert_eq!(kind(&bytes), "LimitExceededError");
    }
}

//! Closed code-to-name tables. Unknown codes render as `<CATEGORY>_UNKNOWN(code)`.

use std::borrow::Cow;

use goblin::elf::header::{
    EM_386, EM_AARCH64, EM_ARM, EM_MIPS, EM_NONE, EM_PPC, EM_SPARC, EM_X86_64, ET_CORE, ET_DYN,
    ET_EXEC, ET_NONE, ET_REL,
};
use goblin::elf::program_header::{PF_R, PF_W, PF_X, PT_DYNAMIC, PT_INTERP, PT_LOAD, PT_NOTE, PT_NULL, PT_PHDR};
use goblin::elf::section_header::{
    SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE, SHT_DYNAMIC, SHT_DYNSYM, SHT_HASH, SHT_NOBITS, SHT_NOTE,
    SHT_NULL, SHT_PROGBITS, SHT_REL, SHT_RELA, SHT_SHLIB, SHT_STRTAB, SHT_SYMTAB,
};
use goblin::elf::sym::{
    STB_GLOBAL, STB_LOCAL, STB_WEAK, STT_COMMON, STT_FILE, STT_FUNC, STT_NOTYPE, STT_OBJECT,
    STT_SECTION, STT_TLS,
};

pub const ELFOSABI_NONE: u8 = 0x00;
pub const ELFOSABI_HPUX: u8 = 0x01;
pub const ELFOSABI_NETBSD: u8 = 0x02;
pub const ELFOSABI_LINUX: u8 = 0x03;
pub const ELFOSABI_SOLARIS: u8 = 0x06;
pub const ELFOSABI_AIX: u8 = 0x07;
pub const ELFOSABI_IRIX: u8 = 0x08;
pub const ELFOSABI_FREEBSD: u8 = 0x09;
pub const ELFOSABI_OPENBSD: u8 = 0x0c;

static ELF_TYPES: &[(u16, &str)] = &[
    (ET_NONE, "ET_NONE"),
    (ET_REL, "ET_REL"),
    (ET_EXEC, "ET_EXEC"),
    (ET_DYN, "ET_DYN"),
    (ET_CORE, "ET_CORE"),
];

static MACHINES: &[(u16, &str)] = &[
    (EM_NONE, "EM_NONE"),
    (EM_SPARC, "EM_SPARC"),
    (EM_386, "EM_386"),
    (EM_MIPS, "EM_MIPS"),
    (EM_PPC, "EM_PPC"),
    (EM_ARM, "EM_ARM"),
    (EM_X86_64, "EM_X86_64"),
    (EM_AARCH64, "EM_AARCH64"),
];

static OS_ABIS: &[(u8, &str)] = &[
    (ELFOSABI_NONE, "ELFOSABI_NONE"),
    (ELFOSABI_HPUX, "ELFOSABI_HPUX"),
    (ELFOSABI_NETBSD, "ELFOSABI_NETBSD"),
    (ELFOSABI_LINUX, "ELFOSABI_LINUX"),
    (ELFOSABI_SOLARIS, "ELFOSABI_SOLARIS"),
    (ELFOSABI_AIX, "ELFOSABI_AIX"),
    (ELFOSABI_IRIX, "ELFOSABI_IRIX"),
    (ELFOSABI_FREEBSD, "ELFOSABI_FREEBSD"),
    (ELFOSABI_OPENBSD, "ELFOSABI_OPENBSD"),
];

/// OS/ABI values `elfedit --output-osabi` accepts.
static EDITABLE_OS_ABIS: &[u8] = &[
    ELFOSABI_NONE,
    ELFOSABI_LINUX,
    ELFOSABI_FREEBSD,
    ELFOSABI_NETBSD,
    ELFOSABI_OPENBSD,
    ELFOSABI_SOLARIS,
];

static SYMBOL_TYPES: &[(u8, &str)] = &[
    (STT_NOTYPE, "STT_NOTYPE"),
    (STT_OBJECT, "STT_OBJECT"),
    (STT_FUNC, "STT_FUNC"),
    (STT_SECTION, "STT_SECTION"),
    (STT_FILE, "STT_FILE"),
    (STT_COMMON, "STT_COMMON"),
    (STT_TLS, "STT_TLS"),
];

static BINDINGS: &[(u8, &str)] = &[
    (STB_LOCAL, "STB_LOCAL"),
    (STB_GLOBAL, "STB_GLOBAL"),
    (STB_WEAK, "STB_WEAK"),
];

static SECTION_TYPES: &[(u32, &str)] = &[
    (SHT_NULL, "NULL"),
    (SHT_PROGBITS, "PROGBITS"),
    (SHT_SYMTAB, "SYMTAB"),
    (SHT_STRTAB, "STRTAB"),
    (SHT_RELA, "RELA"),
    (SHT_HASH, "HASH"),
    (SHT_DYNAMIC, "DYNAMIC"),
    (SHT_NOTE, "NOTE"),
    (SHT_NOBITS, "NOBITS"),
    (SHT_REL, "REL"),
    (SHT_SHLIB, "SHLIB"),
    (SHT_DYNSYM, "DYNSYM"),
];

static SEGMENT_TYPES: &[(u32, &str)] = &[
    (PT_NULL, "NULL"),
    (PT_LOAD, "LOAD"),
    (PT_DYNAMIC, "DYNAMIC"),
    (PT_INTERP, "INTERP"),
    (PT_NOTE, "NOTE"),
    (PT_PHDR, "PHDR"),
];

fn lookup<K: PartialEq + Copy>(table: &'static [(K, &'static str)], code: K) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == code).map(|(_, name)| *name)
}

fn reverse<K: Copy>(table: &'static [(K, &'static str)], name: &str) -> Option<K> {
    table.iter().find(|(_, n)| *n == name).map(|(k, _)| *k)
}

pub fn elf_type_name(code: u16) -> Cow<'static, str> {
    lookup(ELF_TYPES, code).map_or_else(|| format!("ET_UNKNOWN({code})").into(), Cow::Borrowed)
}

pub fn machine_name(code: u16) -> Cow<'static, str> {
    lookup(MACHINES, code).map_or_else(|| format!("EM_UNKNOWN(0x{code:02x})").into(), Cow::Borrowed)
}

pub fn os_abi_name(code: u8) -> Cow<'static, str> {
    lookup(OS_ABIS, code)
        .map_or_else(|| format!("ELFOSABI_UNKNOWN(0x{code:02x})").into(), Cow::Borrowed)
}

pub fn symbol_type_name(code: u8) -> Cow<'static, str> {
    lookup(SYMBOL_TYPES, code).map_or_else(|| format!("STT_UNKNOWN({code})").into(), Cow::Borrowed)
}

pub fn binding_name(code: u8) -> Cow<'static, str> {
    lookup(BINDINGS, code).map_or_else(|| format!("STB_UNKNOWN({code})").into(), Cow::Borrowed)
}

pub fn section_type_name(code: u32) -> Cow<'static, str> {
    lookup(SECTION_TYPES, code).map_or_else(|| format!("UNKNOWN({code})").into(), Cow::Borrowed)
}

pub fn segment_type_name(code: u32) -> Cow<'static, str> {
    lookup(SEGMENT_TYPES, code).map_or_else(|| format!("UNKNOWN({code})").into(), Cow::Borrowed)
}

/// `W`, `A`, `X` for write/alloc/exec; blank when none are set.
pub fn section_flags(flags: u64) -> String {
    let mut out = String::new();
    if flags & u64::from(SHF_WRITE) != 0 {
        out.push('W');
    }
    if flags & u64::from(SHF_ALLOC) != 0 {
        out.push('A');
    }
    if flags & u64::from(SHF_EXECINSTR) != 0 {
        out.push('X');
    }
    out
}

/// Three fixed columns: `R`, `W`, `E`, blank where unset.
pub fn segment_flags(flags: u32) -> String {
    [(PF_R, 'R'), (PF_W, 'W'), (PF_X, 'E')]
        .iter()
        .map(|&(bit, c)| if flags & bit != 0 { c } else { ' ' })
        .collect()
}

pub fn elf_type_from_name(name: &str) -> Option<u16> {
    reverse(ELF_TYPES, name)
}

/// Reverse lookup restricted to the OS/ABIs that may be written by `elfedit`.
pub fn editable_os_abi_from_name(name: &str) -> Option<u8> {
    reverse(OS_ABIS, name).filter(|code| EDITABLE_OS_ABIS.contains(code))
}

pub fn editable_os_abi_names() -> impl Iterator<Item = &'static str> {
    EDITABLE_OS_ABIS.iter().filter_map(|&code| lookup(OS_ABIS, code))
}

pub fn elf_type_names() -> impl Iterator<Item = &'static str> {
    ELF_TYPES.iter().map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes() {
        assert_eq!(elf_type_name(2), "ET_EXEC");
        assert_eq!(machine_name(0x3e), "EM_X86_64");
        assert_eq!(os_abi_name(3), "ELFOSABI_LINUX");
        assert_eq!(symbol_type_name(2), "STT_FUNC");
        assert_eq!(binding_name(2), "STB_WEAK");
        assert_eq!(section_type_name(8), "NOBITS");
        assert_eq!(segment_type_name(1), "LOAD");
    }

    #[test]
    fn unknown_codes_fall_back() {
        assert_eq!(elf_type_name(0x77), "ET_UNKNOWN(119)");
        assert_eq!(machine_name(0x99), "EM_UNKNOWN(0x99)");
        assert_eq!(os_abi_name(0x40), "ELFOSABI_UNKNOWN(0x40)");
        assert_eq!(symbol_type_name(9), "STT_UNKNOWN(9)");
        assert_eq!(binding_name(5), "STB_UNKNOWN(5)");
        assert_eq!(section_type_name(0x6fff_fff6), "UNKNOWN(1879048182)");
    }

    #[test]
    fn flag_strings() {
        assert_eq!(section_flags(0x6), "AX");
        assert_eq!(section_flags(0x3), "WA");
        assert_eq!(section_flags(0), "");
        assert_eq!(segment_flags(0x5), "R E");
        assert_eq!(segment_flags(0x6), "RW ");
    }

    #[test]
    fn reverse_lookups_respect_whitelist() {
        assert_eq!(elf_type_from_name("ET_DYN"), Some(3));
        assert_eq!(elf_type_from_name("ET_BOGUS"), None);
        assert_eq!(editable_os_abi_from_name("ELFOSABI_FREEBSD"), Some(9));
        // Known but not editable.
        assert_eq!(editable_os_abi_from_name("ELFOSABI_AIX"), None);
        assert_eq!(editable_os_abi_names().count(), 6);
    }
}

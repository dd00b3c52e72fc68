use goblin::elf::section_header::{SHN_LORESERVE, SHN_UNDEF};
use goblin::elf::sym::{STB_GLOBAL, STB_LOCAL, STB_WEAK, STT_NOTYPE};
use serde::Serialize;

use crate::labels;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub name: String,
    pub value: u64,
    pub size: u64,
    /// Type in the low nibble, binding in the high nibble.
    pub info: u8,
    pub other: u8,
    pub shndx: u16,
}

impl Symbol {
    pub fn new(name: impl Into<String>, value: u64, sym_type: u8, binding: u8, shndx: u16) -> Self {
        Self {
            name: name.into(),
            value,
            size: 0,
            info: make_info(binding, sym_type),
            other: 0,
            shndx,
        }
    }

    pub fn sym_type(&self) -> u8 {
        self.info & 0x0f
    }

    pub fn binding(&self) -> u8 {
        self.info >> 4
    }

    pub fn type_name(&self) -> std::borrow::Cow<'static, str> {
        labels::symbol_type_name(self.sym_type())
    }

    pub fn binding_name(&self) -> std::borrow::Cow<'static, str> {
        labels::binding_name(self.binding())
    }

    pub fn is_undefined(&self) -> bool {
        u32::from(self.shndx) == SHN_UNDEF
    }

    /// Defined in a real section rather than `SHN_ABS`, `SHN_COMMON` and friends.
    pub fn in_regular_section(&self) -> bool {
        !self.is_undefined() && u32::from(self.shndx) < SHN_LORESERVE
    }

    pub fn is_local(&self) -> bool {
        self.binding() == STB_LOCAL
    }

    pub fn is_global(&self) -> bool {
        self.binding() == STB_GLOBAL
    }

    pub fn is_weak(&self) -> bool {
        self.binding() == STB_WEAK
    }

    /// Has a type other than `STT_NOTYPE` and lives in some section.
    pub fn is_defined(&self) -> bool {
        !self.is_undefined() && self.sym_type() != STT_NOTYPE
    }

    /// The all-zero entry reserved at symbol index 0.
    pub fn is_null(&self) -> bool {
        self.name.is_empty()
            && self.value == 0
            && self.size == 0
            && self.info == 0
            && self.other == 0
            && self.shndx == 0
    }
}

pub fn make_info(binding: u8, sym_type: u8) -> u8 {
    (binding << 4) | (sym_type & 0x0f)
}

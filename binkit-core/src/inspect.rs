//! Read-only text reports over a parsed [`Binary`](crate::Binary).

pub mod addr2line;
pub mod demangle;
pub mod dump;
pub mod nm;
pub mod size;
pub mod strings;

use crate::header::Class;

/// Hex digits used for an address column.
pub(crate) fn address_width(class: Class) -> usize {
    match class {
        Class::Elf32 => 8,
        Class::Elf64 => 16,
    }
}

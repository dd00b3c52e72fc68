//! Tools that produce a modified copy of an ELF file.
//!
//! Each works on a clone of the parsed [`Binary`](crate::Binary) and only
//! touches the filesystem once the new image has been fully serialized.

pub mod elfedit;
pub mod objcopy;
pub mod strip;

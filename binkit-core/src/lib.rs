pub mod archive;
pub mod asm;
pub mod binary;
pub mod error;
pub mod header;
pub mod inspect;
pub mod labels;
pub mod limits;
pub mod link;
pub mod output;
pub mod parser;
pub mod sections;
pub mod symbols;
pub mod transform;
mod width;
mod writer;

pub use archive::{Archive, ArchiveMember, IndexEntry};
pub use binary::*;
pub use error::{ElfError, Result};
pub use header::{Class, ElfHeader, Encoding, Header};
pub use limits::Limits;
pub use link::LinkOptions;
pub use sections::*;
pub use symbols::Symbol;
pub use transform::objcopy::CopyOptions;

use crate::error::{ElfError, Result};

pub const MAX_TABLE_BYTES: u64 = 100 * 1024 * 1024;
pub const MAX_SYMBOLS: u64 = 100_000;
pub const MAX_SECTIONS: u64 = 10_000;
pub const MAX_SEGMENTS: u64 = 10_000;
pub const MAX_ARCHIVE_MEMBERS: u64 = 10_000;
pub const MAX_INDEX_NAME: u64 = 4096;

/// Ceilings applied to every size or count read from untrusted input.
///
/// `Limits::default()` holds the values every tool uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Bytes in any one table, section payload or archive member.
    pub max_table_bytes: u64,
    pub max_symbols: u64,
    pub max_sections: u64,
    pub max_segments: u64,
    pub max_archive_members: u64,
    /// Bytes in one symbol-index name.
    pub max_index_name: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_table_bytes: MAX_TABLE_BYTES,
            max_symbols: MAX_SYMBOLS,
            max_sections: MAX_SECTIONS,
            max_segments: MAX_SEGMENTS,
            max_archive_members: MAX_ARCHIVE_MEMBERS,
            max_index_name: MAX_INDEX_NAME,
        }
    }
}

/// Fails with `LimitExceeded` when `declared` is above `limit`.
pub fn check(what: &'static str, declared: u64, limit: u64) -> Result<()> {
    if declared > limit {
        return Err(ElfError::LimitExceeded {
            what,
            declared,
            limit,
        });
    }
    Ok(())
}

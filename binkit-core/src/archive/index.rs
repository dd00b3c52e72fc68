//! System V / GNU symbol index (the `/` member).
//!
//! ```text
//! u32 BE  count
//! u32 BE  header offset of the defining member, `count` times
//! name\0  `count` times
//! ```

use anyhow::Context;
use byteorder::{BigEndian, ByteOrder};
use goblin::elf::sym::{STT_FILE, STT_SECTION};

use super::{Archive, ArchiveMember, ARCHIVE_MAGIC, INDEX_NAME};
use crate::binary::Binary;
use crate::error::{ElfError, Result};
use crate::limits::{self, Limits};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub symbol: String,
    pub member: String,
}

impl Archive {
    /// Decodes the `/` member, resolving each offset to a member name.
    /// An archive without an index yields an empty list.
    pub fn symbol_index(&self) -> Result<Vec<IndexEntry>> {
        let Some(index) = self.get(INDEX_NAME) else {
            return Ok(Vec::new());
        };
        let limits = Limits::default();
        let data = &index.data;
        if data.len() < 4 {
            return Err(ElfError::Truncated {
                what: "symbol index",
                offset: 0,
                needed: 4,
                available: data.len() as u64,
            });
        }
        let count = u64::from(BigEndian::read_u32(&data[0..4]));
        limits::check("symbol index entries", count, limits.max_symbols)?;
        let names_start = 4 + 4 * count as usize;
        if data.len() < names_start {
            return Err(ElfError::Truncated {
                what: "symbol index offsets",
                offset: 4,
                needed: 4 * count,
                available: data.len() as u64 - 4,
            });
        }

        let offsets = self.member_offsets();
        let mut names = data[names_start..].split(|&b| b == 0);
        let mut entries = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let at = 4 + 4 * i;
            let offset = u64::from(BigEndian::read_u32(&data[at..at + 4]));
            let member = offsets
                .iter()
                .position(|&o| o == offset)
                .map(|m| self.members[m].name.clone())
                .ok_or_else(|| ElfError::format(format!("symbol index points at {offset:#x}, not a member")))?;
            let name = names
                .next()
                .ok_or_else(|| ElfError::format("symbol index has fewer names than entries"))?;
            limits::check("symbol index name", name.len() as u64, limits.max_index_name)?;
            let symbol = std::str::from_utf8(name)
                .map_err(|_| ElfError::format("symbol index name is not valid UTF-8"))?
                .to_string();
            entries.push(IndexEntry { symbol, member });
        }
        Ok(entries)
    }

    /// Replaces any existing index with a fresh `/` member placed first.
    ///
    /// Every ELF member is parsed; its named, defined, non-local symbols are
    /// indexed. A member that looks like ELF but does not parse aborts the
    /// rebuild. Returns the number of entries.
    pub fn rebuild_index(&mut self) -> anyhow::Result<usize> {
        let limits = Limits::default();
        self.members.retain(|m| !m.is_index());

        let mut found: Vec<(String, usize)> = Vec::new();
        for (i, member) in self.members.iter().enumerate() {
            if !member.is_elf() {
                continue;
            }
            let bin = Binary::from_bytes(&member.data)
                .with_context(|| format!("{}: cannot index member", member.name))?;
            for sym in bin.named_symbols() {
                if sym.is_undefined() || sym.is_local() || matches!(sym.sym_type(), STT_SECTION | STT_FILE) {
                    continue;
                }
                limits::check("symbol index name", sym.name.len() as u64, limits.max_index_name)?;
                found.push((sym.name.clone(), i));
            }
        }
        limits::check("symbol index entries", found.len() as u64, limits.max_symbols)?;

        let size = 4 + found.iter().map(|(name, _)| 4 + name.len() + 1).sum::<usize>();
        let index_len = (60 + size + size % 2) as u64;
        let mut offsets = Vec::with_capacity(self.members.len());
        let mut at = ARCHIVE_MAGIC.len() as u64 + index_len;
        for m in &self.members {
            offsets.push(at);
            at += m.disk_len();
        }

        let mut data = Vec::with_capacity(size);
        data.extend_from_slice(&offset_bytes(found.len() as u64)?);
        for (_, member) in &found {
            data.extend_from_slice(&offset_bytes(offsets[*member])?);
        }
        for (name, _) in &found {
            data.extend_from_slice(name.as_bytes());
            data.push(0);
        }

        let mut index = ArchiveMember::new(INDEX_NAME, data);
        index.mode = 0;
        self.members.insert(0, index);
        log::info!("indexed {} symbols from {} members", found.len(), self.members.len() - 1);
        Ok(found.len())
    }
}

fn offset_bytes(value: u64) -> Result<[u8; 4]> {
    let value = u32::try_from(value)
        .map_err(|_| ElfError::validation(format!("archive offset {value:#x} exceeds the 32-bit index")))?;
    let mut buf = [0u8; 4];
    BigEndian::write_u32(&mut buf, value);
    Ok(buf)
}

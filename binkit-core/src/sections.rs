use std::borrow::Cow;

use goblin::elf::section_header::{SHF_ALLOC, SHF_EXECINSTR, SHT_NOBITS, SHT_NULL};
use serde::Serialize;

use crate::error::{ElfError, Result};

/// Name prefixes of sections that carry debugging or bookkeeping data only.
pub const DEBUG_PREFIXES: [&str; 4] = [".debug", ".zdebug", ".comment", ".note"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub name: String,
    pub sh_type: u32,
    pub flags: u64,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
    pub link: u32,
    pub info: u32,
    pub addralign: u64,
    pub entsize: u64,
    /// File contents. Empty for `SHT_NOBITS` and `SHT_NULL`.
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl Section {
    /// A section carrying `data`, with `size` taken from it.
    pub fn new(name: impl Into<String>, sh_type: u32, flags: u64, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            sh_type,
            flags,
            addr: 0,
            offset: 0,
            size: data.len() as u64,
            link: 0,
            info: 0,
            addralign: 1,
            entsize: 0,
            data,
        }
    }

    /// The reserved entry at section index 0.
    pub fn null() -> Self {
        Self {
            addralign: 0,
            ..Self::new("", SHT_NULL, 0, Vec::new())
        }
    }

    /// Whether the section occupies bytes in the file.
    pub fn has_file_data(&self) -> bool {
        self.sh_type != SHT_NOBITS && self.sh_type != SHT_NULL
    }

    pub fn is_debug(&self) -> bool {
        DEBUG_PREFIXES.iter().any(|p| self.name.starts_with(p))
    }

    /// Whether `addr` falls inside `[addr, addr + size)`.
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.addr && addr < self.addr.saturating_add(self.size)
    }

    pub fn is_alloc(&self) -> bool {
        self.flags & u64::from(SHF_ALLOC) != 0
    }

    pub fn is_executable(&self) -> bool {
        self.flags & u64::from(SHF_EXECINSTR) != 0
    }
}

/// A program header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Segment {
    pub p_type: u32,
    pub flags: u32,
    pub offset: u64,
    pub vaddr: u64,
    pub paddr: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub align: u64,
}

/// A blob of zero-terminated strings addressed by byte offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringTable {
    data: Vec<u8>,
}

impl StringTable {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The string starting at `offset`, up to the next zero byte or the end
    /// of the table. An offset at or past the end is a format error, except
    /// offset 0 of an empty table, which is the empty string. Bytes that are
    /// not UTF-8 decode as U+FFFD.
    pub fn get(&self, offset: u32) -> Result<Cow<'_, str>> {
        let start = offset as usize;
        if start == 0 && self.data.is_empty() {
            return Ok(Cow::Borrowed(""));
        }
        let rest = self.data.get(start..).filter(|r| !r.is_empty()).ok_or_else(|| {
            ElfError::format(format!(
                "string offset {offset} outside table of {} bytes",
                self.data.len()
            ))
        })?;
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let text = String::from_utf8_lossy(&rest[..end]);
        if let Cow::Owned(_) = text {
            log::debug!("string at offset {offset} is not valid UTF-8");
        }
        Ok(text)
    }
}

/// Builds a string table, deduplicating identical names.
#[derive(Debug)]
pub struct StringTableBuilder {
    data: Vec<u8>,
    seen: std::collections::HashMap<String, u32>,
}

impl Default for StringTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StringTableBuilder {
    pub fn new() -> Self {
        Self {
            data: vec![0],
            seen: std::collections::HashMap::new(),
        }
    }

    /// Offset of `name`, adding it if needed. The empty name is offset 0.
    pub fn add(&mut self, name: &str) -> u32 {
        if name.is_empty() {
            return 0;
        }
        if let Some(&off) = self.seen.get(name) {
            return off;
        }
        let off = self.data.len() as u32;
        self.data.extend_from_slice(name.as_bytes());
        self.data.push(0);
        self.seen.insert(name.to_string(), off);
        off
    }

    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}

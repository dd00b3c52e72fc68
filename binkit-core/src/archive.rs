//! The Unix `ar` container.
//!
//! ```text
//! "!<arch>\n"
//! { 60-byte header | payload | "\n" if payload size is odd }*
//! ```
//!
//! Header fields are space-padded ASCII: name (16), mtime (12), uid (6),
//! gid (6), octal mode (8), size (10), then the terminator "`\n".
//!
//! Names longer than the field live in the GNU `//` member; their header
//! name is `/N`, the byte offset of a `name/\n` entry in that table.

pub mod index;
pub mod ops;

use std::io::{self, Read, Write};
use std::path::Path;

use crate::error::{short_read, ElfError, Result};
use crate::header::MAGIC;
use crate::limits::{self, Limits};

pub use index::IndexEntry;

pub const ARCHIVE_MAGIC: &[u8; 8] = b"!<arch>\n";
pub const MEMBER_HEADER_LEN: usize = 60;
const TERMINATOR: &[u8; 2] = b"`\n";

/// Name of the System V / GNU symbol index member.
pub const INDEX_NAME: &str = "/";
/// Name of the BSD symbol index member; replaced by `/` on rebuild.
pub const BSD_INDEX_NAME: &str = "__.SYMDEF";
/// Name of the GNU long-name table; carried through untouched on rewrite.
pub const LONG_NAMES: &str = "//";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    pub name: String,
    pub mtime: u64,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub data: Vec<u8>,
    /// Name stored in the header when it differs from `name`, such as `/14`
    /// for a name held in the long-name table.
    pub header_name: Option<String>,
}

impl ArchiveMember {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mtime: 0,
            uid: 0,
            gid: 0,
            mode: 0o644,
            data,
            header_name: None,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_elf(&self) -> bool {
        self.data.starts_with(&MAGIC)
    }

    pub fn is_index(&self) -> bool {
        self.name == INDEX_NAME || self.name == BSD_INDEX_NAME
    }

    /// Bytes the member occupies on disk, header and pad included.
    pub fn disk_len(&self) -> u64 {
        MEMBER_HEADER_LEN as u64 + self.size() + self.size() % 2
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    pub members: Vec<ArchiveMember>,
}

impl Archive {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::read(io::BufReader::new(file))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read(bytes)
    }

    pub fn read<R: Read>(reader: R) -> Result<Self> {
        Self::read_with_limits(reader, Limits::default())
    }

    pub fn read_with_limits<R: Read>(mut reader: R, limits: Limits) -> Result<Self> {
        let mut magic = [0u8; 8];
        reader
            .read_exact(&mut magic)
            .map_err(short_read("archive magic", 0, 8, 0))?;
        if &magic != ARCHIVE_MAGIC {
            return Err(ElfError::format("invalid archive magic"));
        }

        let mut members = Vec::new();
        let mut offset = ARCHIVE_MAGIC.len() as u64;
        while let Some(raw) = read_member_header(&mut reader, offset)? {
            limits::check("archive member count", members.len() as u64 + 1, limits.max_archive_members)?;
            let mut member = decode_header(&raw, offset)?;
            let size = parse_number(&raw[48..58], 10, "size", offset)?
                .ok_or_else(|| ElfError::format(format!("member header at {offset:#x} has no size")))?;
            limits::check("archive member size", size, limits.max_table_bytes)?;
            offset += MEMBER_HEADER_LEN as u64;

            let mut data = Vec::new();
            (&mut reader).take(size).read_to_end(&mut data)?;
            if (data.len() as u64) < size {
                return Err(ElfError::Truncated {
                    what: "archive member",
                    offset,
                    needed: size,
                    available: data.len() as u64,
                });
            }
            offset += size;
            if size % 2 == 1 {
                let mut pad = [0u8; 1];
                reader
                    .read_exact(&mut pad)
                    .map_err(short_read("archive padding", offset, 1, offset))?;
                offset += 1;
            }

            member.data = data;
            log::debug!("archive member {} ({} bytes)", member.name, size);
            members.push(member);
        }
        resolve_long_names(&mut members)?;
        Ok(Self { members })
    }

    pub fn write<W: Write>(&self, mut out: W) -> Result<()> {
        out.write_all(ARCHIVE_MAGIC)?;
        for member in &self.members {
            out.write_all(&encode_header(member)?)?;
            out.write_all(&member.data)?;
            if member.size() % 2 == 1 {
                out.write_all(b"\n")?;
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write(&mut out)?;
        Ok(out)
    }

    pub fn get(&self, name: &str) -> Option<&ArchiveMember> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Replaces the member with the same name in place, or appends. A
    /// replaced member keeps its long-name table entry.
    pub fn insert(&mut self, member: ArchiveMember) {
        match self.members.iter_mut().find(|m| m.name == member.name) {
            Some(slot) => {
                let header_name = slot.header_name.take();
                *slot = ArchiveMember {
                    header_name: member.header_name.or(header_name),
                    ..member
                };
            }
            None => self.members.push(member),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<ArchiveMember> {
        let pos = self.members.iter().position(|m| m.name == name)?;
        Some(self.members.remove(pos))
    }

    pub fn has_index(&self) -> bool {
        self.members.iter().any(ArchiveMember::is_index)
    }

    /// Members other than symbol indexes.
    pub fn files(&self) -> impl Iterator<Item = &ArchiveMember> {
        self.members.iter().filter(|m| !m.is_index() && m.name != LONG_NAMES)
    }

    /// File offset of each member's header, in member order.
    pub fn member_offsets(&self) -> Vec<u64> {
        let mut offset = ARCHIVE_MAGIC.len() as u64;
        self.members
            .iter()
            .map(|m| {
                let here = offset;
                offset += m.disk_len();
                here
            })
            .collect()
    }
}

/// Replaces `/N` header names with their entries in the `//` member.
fn resolve_long_names(members: &mut [ArchiveMember]) -> Result<()> {
    let Some(table) = members.iter().find(|m| m.name == LONG_NAMES).map(|m| m.data.clone()) else {
        return Ok(());
    };
    for member in members.iter_mut() {
        let Some(digits) = member.name.strip_prefix('/') else {
            continue;
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let start: usize = digits
            .parse()
            .map_err(|_| ElfError::format(format!("long name offset {digits} out of range")))?;
        let rest = table.get(start..).filter(|r| !r.is_empty()).ok_or_else(|| {
            ElfError::format(format!(
                "long name offset {start} outside table of {} bytes",
                table.len()
            ))
        })?;
        let end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
        let entry = &rest[..end];
        let entry = entry.strip_suffix(b"/").unwrap_or(entry);
        let long = std::str::from_utf8(entry)
            .map_err(|_| ElfError::format(format!("long name at offset {start} is not valid UTF-8")))?;
        if long.is_empty() {
            return Err(ElfError::format(format!("long name at offset {start} is empty")));
        }
        log::debug!("member /{start} is {long}");
        member.header_name = Some(std::mem::replace(&mut member.name, long.to_string()));
    }
    Ok(())
}

/// Reads one header; `None` on a clean end of input.
fn read_member_header<R: Read>(reader: &mut R, offset: u64) -> Result<Option<[u8; MEMBER_HEADER_LEN]>> {
    let mut raw = [0u8; MEMBER_HEADER_LEN];
    let mut filled = 0;
    while filled < raw.len() {
        match reader.read(&mut raw[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    match filled {
        0 => Ok(None),
        MEMBER_HEADER_LEN => Ok(Some(raw)),
        n => Err(ElfError::Truncated {
            what: "archive member header",
            offset,
            needed: MEMBER_HEADER_LEN as u64,
            available: n as u64,
        }),
    }
}

fn decode_header(raw: &[u8; MEMBER_HEADER_LEN], offset: u64) -> Result<ArchiveMember> {
    if &raw[58..60] != TERMINATOR {
        return Err(ElfError::format(format!(
            "member header at {offset:#x} has a bad terminator"
        )));
    }
    let name = std::str::from_utf8(&raw[0..16])
        .map_err(|_| ElfError::format(format!("member name at {offset:#x} is not valid UTF-8")))?
        .trim_end_matches(' ');
    let name = match name {
        INDEX_NAME | LONG_NAMES => name,
        _ => name.strip_suffix('/').unwrap_or(name),
    };
    if name.is_empty() {
        return Err(ElfError::format(format!("member header at {offset:#x} has an empty name")));
    }

    let field = |range: std::ops::Range<usize>, radix, what| -> Result<u64> {
        Ok(parse_number(&raw[range], radix, what, offset)?.unwrap_or(0))
    };
    let narrow = |value: u64, what: &str| {
        u32::try_from(value).map_err(|_| ElfError::format(format!("member {what} {value} out of range")))
    };

    Ok(ArchiveMember {
        name: name.to_string(),
        mtime: field(16..28, 10, "mtime")?,
        uid: narrow(field(28..34, 10, "uid")?, "uid")?,
        gid: narrow(field(34..40, 10, "gid")?, "gid")?,
        mode: narrow(field(40..48, 8, "mode")?, "mode")?,
        data: Vec::new(),
        header_name: None,
    })
}

/// A space-padded number; `None` when the field is blank.
fn parse_number(field: &[u8], radix: u32, what: &str, offset: u64) -> Result<Option<u64>> {
    let text = std::str::from_utf8(field)
        .map_err(|_| ElfError::format(format!("member {what} at {offset:#x} is not ASCII")))?
        .trim_matches(' ');
    if text.is_empty() {
        return Ok(None);
    }
    if text.starts_with('-') {
        return Err(ElfError::format(format!("member {what} at {offset:#x} is negative: {text}")));
    }
    u64::from_str_radix(text, radix)
        .map(Some)
        .map_err(|_| ElfError::format(format!("member {what} at {offset:#x} is not a number: {text:?}")))
}

fn encode_header(member: &ArchiveMember) -> Result<[u8; MEMBER_HEADER_LEN]> {
    let name = match (member.name.as_str(), &member.header_name) {
        (_, Some(raw)) => raw.clone(),
        (INDEX_NAME | LONG_NAMES, None) => member.name.clone(),
        (other, None) => format!("{other}/"),
    };
    let mut raw = [b' '; MEMBER_HEADER_LEN];
    put_field(&mut raw[0..16], &name, "member name")?;
    put_field(&mut raw[16..28], &member.mtime.to_string(), "mtime")?;
    put_field(&mut raw[28..34], &member.uid.to_string(), "uid")?;
    put_field(&mut raw[34..40], &member.gid.to_string(), "gid")?;
    put_field(&mut raw[40..48], &format!("{:o}", member.mode), "mode")?;
    put_field(&mut raw[48..58], &member.size().to_string(), "size")?;
    raw[58..60].copy_from_slice(TERMINATOR);
    Ok(raw)
}

fn put_field(slot: &mut [u8], value: &str, what: &str) -> Result<()> {
    if value.len() > slot.len() {
        return Err(ElfError::validation(format!(
            "{what} {value:?} does not fit in {} bytes",
            slot.len()
        )));
    }
    slot[..value.len()].copy_from_slice(value.as_bytes());
    Ok(())
}

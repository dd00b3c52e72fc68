//! Single-field header edits.

use std::path::{Path, PathBuf};

use anyhow::Context;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::binary::Binary;
use crate::error::{ElfError, Result};
use crate::header::{Class, Encoding, EI_OSABI, IDENT_LEN};
use crate::labels;
use crate::limits::MAX_TABLE_BYTES;
use crate::output;

/// Byte offset of `e_type`, the same for both classes.
const E_TYPE_OFFSET: usize = IDENT_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Class,
    Data,
    OsAbi,
    Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    Class(Class),
    Data(Encoding),
    OsAbi(u8),
    Type(u16),
}

impl Edit {
    /// Checks `value` against the whitelist for `field`.
    pub fn parse(field: Field, value: &str) -> Result<Self> {
        let invalid = |what: &str, allowed: Vec<&str>| {
            ElfError::validation(format!("invalid {what}: {value} (expected one of {})", allowed.join(", ")))
        };
        match field {
            Field::Class => value.parse().map(Edit::Class),
            Field::Data => value.parse().map(Edit::Data),
            Field::OsAbi => labels::editable_os_abi_from_name(value)
                .map(Edit::OsAbi)
                .ok_or_else(|| invalid("OS/ABI", labels::editable_os_abi_names().collect())),
            Field::Type => labels::elf_type_from_name(value)
                .map(Edit::Type)
                .ok_or_else(|| invalid("type", labels::elf_type_names().collect())),
        }
    }
}

/// Produces the edited image. OS/ABI and type are patched into a copy of
/// `original`; class and encoding changes go through the serializer.
pub fn apply_edit(original: &[u8], bin: &Binary, edit: Edit) -> Result<Vec<u8>> {
    match edit {
        Edit::OsAbi(code) => {
            let mut bytes = original.to_vec();
            bytes[EI_OSABI] = code;
            Ok(bytes)
        }
        Edit::Type(code) => {
            let mut bytes = original.to_vec();
            let slot = &mut bytes[E_TYPE_OFFSET..E_TYPE_OFFSET + 2];
            match bin.encoding() {
                Encoding::Little => LittleEndian::write_u16(slot, code),
                Encoding::Big => BigEndian::write_u16(slot, code),
            }
            Ok(bytes)
        }
        Edit::Class(class) => {
            let mut edited = bin.clone();
            edited.header.class = class;
            edited.to_bytes()
        }
        Edit::Data(encoding) => {
            let mut edited = bin.clone();
            edited.header.encoding = encoding;
            edited.to_bytes()
        }
    }
}

/// Applies `edit` to `path` after saving `<path>.bak`. Returns the backup path.
pub fn edit_file(path: &Path, edit: Edit) -> anyhow::Result<PathBuf> {
    let original = output::read_limited(path, MAX_TABLE_BYTES)
        .with_context(|| format!("{}: cannot read", path.display()))?;
    let bin = Binary::from_bytes(&original).with_context(|| format!("{}: cannot parse", path.display()))?;
    let edited = apply_edit(&original, &bin, edit)?;

    let backup = output::backup(path).with_context(|| format!("{}: cannot create backup", path.display()))?;
    output::write_atomic(path, &edited).with_context(|| format!("{}: cannot write", path.display()))?;
    log::info!("edited {} ({:?})", path.display(), edit);
    Ok(backup)
}

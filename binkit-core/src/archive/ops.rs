//! File-level `ar` and `ranlib` operations.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{bail, Context};

use super::{Archive, ArchiveMember};
use crate::limits::MAX_TABLE_BYTES;
use crate::output;

/// A member name that is safe to create inside the extraction directory.
pub fn is_safe_member_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 255
        && name != "."
        && !name.contains("..")
        && !name.contains(['/', '\\', '\0'])
}

fn open_or_empty(path: &Path) -> anyhow::Result<Archive> {
    if !path.exists() {
        log::info!("creating {}", path.display());
        return Ok(Archive::default());
    }
    Archive::open(path).with_context(|| format!("{}: cannot read archive", path.display()))
}

fn save(path: &Path, archive: &mut Archive, had_index: bool, update_index: bool) -> anyhow::Result<()> {
    if had_index || update_index {
        archive.rebuild_index()?;
    }
    let bytes = archive.to_bytes()?;
    output::write_atomic(path, &bytes).with_context(|| format!("{}: cannot write archive", path.display()))
}

/// `ar r`: adds `inputs` under their base names with mode 0644 and owner 0,
/// replacing same-named members where they stand.
pub fn replace(archive_path: &Path, inputs: &[PathBuf], update_index: bool) -> anyhow::Result<()> {
    let mut archive = open_or_empty(archive_path)?;
    let had_index = archive.has_index();

    for input in inputs {
        let name = input
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("{}: not a usable member name", input.display()))?;
        let data = output::read_limited(input, MAX_TABLE_BYTES)
            .with_context(|| format!("{}: cannot read", input.display()))?;
        let mtime = fs::metadata(input)?
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs());
        log::debug!("adding {name} ({} bytes)", data.len());
        archive.insert(ArchiveMember {
            mtime,
            ..ArchiveMember::new(name, data)
        });
    }
    save(archive_path, &mut archive, had_index, update_index)
}

/// `ar d`: removes the named members. Returns how many were removed.
pub fn delete(archive_path: &Path, names: &[String], update_index: bool) -> anyhow::Result<usize> {
    let mut archive = Archive::open(archive_path)
        .with_context(|| format!("{}: cannot read archive", archive_path.display()))?;
    let had_index = archive.has_index();

    let mut removed = 0;
    for name in names {
        if archive.remove(name).is_some() {
            removed += 1;
        } else {
            log::warn!("no entry {name} in archive");
        }
    }
    save(archive_path, &mut archive, had_index, update_index)?;
    Ok(removed)
}

/// `ar x`: writes members into `dest`. With no names every file member is
/// extracted. Returns the names written.
pub fn extract(archive_path: &Path, names: &[String], dest: &Path) -> anyhow::Result<Vec<String>> {
    let archive = Archive::open(archive_path)
        .with_context(|| format!("{}: cannot read archive", archive_path.display()))?;

    let wanted: Vec<&ArchiveMember> = if names.is_empty() {
        archive.files().collect()
    } else {
        let mut picked = Vec::with_capacity(names.len());
        for name in names {
            match archive.get(name) {
                Some(m) => picked.push(m),
                None => bail!("no entry {name} in archive"),
            }
        }
        picked
    };

    let mut written = Vec::with_capacity(wanted.len());
    for member in wanted {
        if !is_safe_member_name(&member.name) {
            bail!("refusing to extract unsafe member name {:?}", member.name);
        }
        let target = dest.join(&member.name);
        fs::write(&target, &member.data).with_context(|| format!("{}: cannot write", target.display()))?;
        if member.mode & 0o777 != 0 {
            output::set_mode(&target, member.mode & 0o777)?;
        }
        log::debug!("extracted {}", member.name);
        written.push(member.name.clone());
    }
    Ok(written)
}

/// `ranlib`: rebuilds the symbol index in place. Returns the entry count.
pub fn ranlib(archive_path: &Path) -> anyhow::Result<usize> {
    let mut archive = Archive::open(archive_path)
        .with_context(|| format!("{}: cannot read archive", archive_path.display()))?;
    let count = archive.rebuild_index()?;
    let bytes = archive.to_bytes()?;
    output::write_atomic(archive_path, &bytes)
        .with_context(|| format!("{}: cannot write archive", archive_path.display()))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsafe_names() {
        assert!(is_safe_member_name("foo.o"));
        for bad in ["", ".", "..", "../etc/passwd", "a/b", "a\\b", "x..y"] {
            assert!(!is_safe_member_name(bad), "{bad:?}");
        }
    }

    #[test]
    fn replace_list_extract_delete() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib.a");
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, b"first").unwrap();
        fs::write(&b, b"second!").unwrap();

        replace(&lib, &[a.clone(), b.clone()], false).unwrap();
        fs::write(&a, b"replaced").unwrap();
        replace(&lib, &[a.clone()], false).unwrap();

        let archive = Archive::open(&lib).unwrap();
        let names: Vec<_> = archive.files().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
        assert_eq!(archive.members[0].data, b"replaced");
        assert!(!archive.has_index());

        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        assert_eq!(extract(&lib, &[], &out).unwrap(), ["a.txt", "b.txt"]);
        assert_eq!(fs::read(out.join("b.txt")).unwrap(), b"second!");
        assert!(extract(&lib, &["missing".to_string()], &out).is_err());

        assert_eq!(delete(&lib, &["a.txt".to_string(), "nope".to_string()], false).unwrap(), 1);
        assert_eq!(Archive::open(&lib).unwrap().members.len(), 1);
    }

    #[test]
    fn long_names_extract_and_survive_replace() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib.a");
        let long = "a_very_long_member_name.o";
        let mut archive = Archive::default();
        archive.insert(ArchiveMember::new(crate::archive::LONG_NAMES, format!("{long}/\n").into_bytes()));
        archive.insert(ArchiveMember {
            header_name: Some("/0".to_string()),
            ..ArchiveMember::new(long, b"old".to_vec())
        });
        fs::write(&lib, archive.to_bytes().unwrap()).unwrap();

        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        assert_eq!(extract(&lib, &[], &out).unwrap(), [long]);
        assert_eq!(fs::read(out.join(long)).unwrap(), b"old");

        let input = out.join(long);
        fs::write(&input, b"new!").unwrap();
        replace(&lib, &[input], false).unwrap();
        let archive = Archive::open(&lib).unwrap();
        assert_eq!(archive.get(long).unwrap().data, b"new!");
        assert_eq!(archive.files().count(), 1);
    }

    #[test]
    fn ranlib_adds_index() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib.a");
        let a = dir.path().join("notes");
        fs::write(&a, b"text").unwrap();
        replace(&lib, &[a], true).unwrap();
        assert!(Archive::open(&lib).unwrap().has_index());
        assert_eq!(ranlib(&lib).unwrap(), 0);
    }
}

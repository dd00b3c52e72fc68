//! Whole-file reads with a size ceiling, and replacement writes that never
//! leave a half-written file behind.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::Result;
use crate::limits;

/// Reads `path` completely, refusing files larger than `limit` bytes.
pub fn read_limited(path: &Path, limit: u64) -> Result<Vec<u8>> {
    let file = fs::File::open(path)?;
    let len = file.metadata()?.len();
    limits::check("input file size", len, limit)?;
    let mut data = Vec::with_capacity(len as usize);
    file.take(limit + 1).read_to_end(&mut data)?;
    limits::check("input file size", data.len() as u64, limit)?;
    Ok(data)
}

/// Replaces `path` with `bytes` through a temporary file in the same
/// directory. The permissions of an existing `path` are carried over.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), meta.permissions())?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    log::info!("wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Copies `path` to `<path>.bak` and returns the backup location.
pub fn backup(path: &Path) -> io::Result<PathBuf> {
    let bak = backup_path(path);
    fs::copy(path, &bak)?;
    log::info!("backed up {} to {}", path.display(), bak.display());
    Ok(bak)
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        fs::write(&path, b"old").unwrap();
        write_atomic(&path, b"new contents").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new contents");
        // Only the target remains; the temp file was renamed over it.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn backup_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.o");
        fs::write(&path, b"original").unwrap();
        let bak = backup(&path).unwrap();
        assert_eq!(bak, dir.path().join("a.o.bak"));
        assert_eq!(fs::read(bak).unwrap(), b"original");
    }

    #[test]
    fn read_limited_refuses_large_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big");
        fs::write(&path, vec![0u8; 32]).unwrap();
        assert_eq!(read_limited(&path, 64).unwrap().len(), 32);
        assert_eq!(read_limited(&path, 16).unwrap_err().kind(), "LimitExceededError");
    }
}

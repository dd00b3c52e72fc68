use std::path::Path;

use anyhow::Context;

use crate::binary::Binary;
use crate::output;

/// Drops every symbol and every debug or bookkeeping section.
pub fn strip(bin: &Binary) -> Binary {
    let mut out = bin.clone();
    out.symbols.clear();
    out.retain_sections(|s| !s.is_debug());
    out
}

/// Strips `path` in place. The file is left untouched unless the stripped
/// image was produced in full.
pub fn strip_file(path: &Path) -> anyhow::Result<()> {
    let bin = Binary::open(path).with_context(|| format!("{}: cannot parse", path.display()))?;
    let bytes = strip(&bin).to_bytes()?;
    output::write_atomic(path, &bytes).with_context(|| format!("{}: cannot write", path.display()))?;
    log::info!("stripped {}", path.display());
    Ok(())
}

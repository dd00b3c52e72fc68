use std::path::Path;

use anyhow::Context;

use super::strip::strip;
use crate::binary::Binary;
use crate::output;

/// Edits applied by [`apply`], always in field order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CopyOptions {
    pub strip_all: bool,
    pub strip_debug: bool,
    pub strip_symbols: Vec<String>,
    pub keep_symbols: Vec<String>,
    pub remove_sections: Vec<String>,
}

impl CopyOptions {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub fn apply(bin: &Binary, opts: &CopyOptions) -> Binary {
    let mut out = if opts.strip_all { strip(bin) } else { bin.clone() };
    if opts.strip_debug {
        out.retain_sections(|s| !s.is_debug());
    }
    if !opts.strip_symbols.is_empty() {
        out.symbols.retain(|s| !opts.strip_symbols.contains(&s.name));
    }
    if !opts.keep_symbols.is_empty() {
        out.symbols.retain(|s| opts.keep_symbols.contains(&s.name));
    }
    if !opts.remove_sections.is_empty() {
        out.retain_sections(|s| !opts.remove_sections.contains(&s.name));
    }
    out
}

/// Copies `input` to `dest`, applying `opts` on the way.
pub fn copy_file(input: &Path, dest: &Path, opts: &CopyOptions) -> anyhow::Result<()> {
    let bin = Binary::open(input).with_context(|| format!("{}: cannot parse", input.display()))?;
    let bytes = apply(&bin, opts).to_bytes()?;
    output::write_atomic(dest, &bytes).with_context(|| format!("{}: cannot write", dest.display()))
}

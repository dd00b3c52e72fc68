//! Printable-run extraction from arbitrary files.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

use anyhow::Context;

use crate::error::{ElfError, Result};
use crate::limits::{self, MAX_TABLE_BYTES};

pub const DEFAULT_MIN_LEN: usize = 4;
pub const MAX_MIN_LEN: usize = 100;
/// Longest run held in memory. Longer runs are printed in pieces of this size.
pub const MAX_RUN: usize = 10_000;

pub fn parse_min_len(text: &str) -> Result<usize> {
    match text.parse::<usize>() {
        Ok(n) if (1..=MAX_MIN_LEN).contains(&n) => Ok(n),
        _ => Err(ElfError::validation(format!(
            "minimum string length must be 1..={MAX_MIN_LEN}, got {text:?}"
        ))),
    }
}

fn is_printable(b: u8) -> bool {
    (32..=126).contains(&b)
}

/// Writes every run of at least `min_len` printable ASCII bytes, one per line.
pub fn write_strings<R: Read, W: Write>(input: R, min_len: usize, out: &mut W) -> io::Result<()> {
    let mut reader = BufReader::new(input);
    let mut run = Vec::new();
    loop {
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            break;
        }
        for &b in chunk {
            if is_printable(b) {
                run.push(b);
                if run.len() == MAX_RUN {
                    flush(&mut run, min_len, out)?;
                }
            } else {
                flush(&mut run, min_len, out)?;
            }
        }
        let consumed = chunk.len();
        reader.consume(consumed);
    }
    flush(&mut run, min_len, out)
}

/// Runs [`write_strings`] over the file at `path`, refusing files larger
/// than the per-table ceiling.
pub fn write_file_strings<W: Write>(path: &Path, min_len: usize, out: &mut W) -> anyhow::Result<()> {
    let file = File::open(path).with_context(|| format!("{}: cannot open", path.display()))?;
    let len = file.metadata()?.len();
    limits::check("input file", len, MAX_TABLE_BYTES).with_context(|| path.display().to_string())?;
    write_strings(file.take(MAX_TABLE_BYTES), min_len, out)
        .with_context(|| format!("{}: cannot read", path.display()))
}

fn flush<W: Write>(run: &mut Vec<u8>, min_len: usize, out: &mut W) -> io::Result<()> {
    if run.len() >= min_len {
        out.write_all(run)?;
        out.write_all(b"\n")?;
    }
    run.clear();
    Ok(())
}

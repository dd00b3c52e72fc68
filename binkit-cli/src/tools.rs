//! One runner per subcommand. Each returns `Ok(false)` when some of its files
//! failed and were already reported, so the caller only sets the exit code.

use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use binkit_core::archive::ops;
use binkit_core::inspect::dump::{self, Report, View};
use binkit_core::inspect::{addr2line, demangle, nm, size, strings};
use binkit_core::transform::elfedit::{self, Edit, Field};
use binkit_core::transform::strip;
use binkit_core::{asm, link, Archive, ArchiveMember, Binary, CopyOptions, LinkOptions};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::{report, ElfeditArgs, FieldArgs, ObjcopyArgs, ReadelfArgs, Tool};

fn open(path: &Path) -> Result<Binary> {
    Binary::open(path).with_context(|| format!("{}: cannot parse", path.display()))
}

fn stdout() -> BufWriter<io::StdoutLock<'static>> {
    BufWriter::new(io::stdout().lock())
}

pub fn run(tool: Tool) -> Result<bool> {
    let name = tool.name();
    match tool {
        Tool::Nm { demangle, file } => {
            let bin = open(&file)?;
            let mut out = stdout();
            nm::write_symbols(&bin, demangle, &mut out)?;
            out.flush()?;
        }
        Tool::Cxxfilt { names } => cxxfilt(&names)?,
        Tool::Objdump { file } => {
            let bin = open(&file)?;
            let mut out = stdout();
            dump::write_objdump(&bin, &file.display().to_string(), &mut out)?;
            out.flush()?;
        }
        Tool::Readelf(args) => readelf(args)?,
        Tool::Size { files } => return size(name, &files),
        Tool::Addr2line { exe, addresses } => {
            let bin = open(&exe)?;
            let mut out = stdout();
            addr2line::write_resolutions(&bin, &addresses, &mut out)?;
            out.flush()?;
        }
        Tool::Strings { min_len, files } => return for_each_file(name, &files, |path| strings_file(path, min_len)),
        Tool::Strip { files } => return for_each_file(name, &files, strip::strip_file),
        Tool::Objcopy(args) => objcopy(args)?,
        Tool::Elfedit(args) => elfedit(args)?,
        Tool::Ld {
            output,
            no_allow_duplicates,
            inputs,
        } => {
            let opts = LinkOptions {
                reject_duplicates: no_allow_duplicates,
            };
            link::link_files(&inputs, &output, opts)?;
        }
        Tool::As { output, input } => {
            asm::assemble_file(&input, &output)?;
        }
        Tool::Ar {
            operation,
            archive,
            files,
        } => ar(&operation, &archive, &files)?,
        Tool::Ranlib { archives } => {
            return for_each_file(name, &archives, |path| {
                let entries = ops::ranlib(path)?;
                log::info!("{}: {entries} index entries", path.display());
                Ok(())
            })
        }
    }
    Ok(true)
}

/// Runs `action` on every path, reporting failures as they happen and
/// carrying on with the rest.
fn for_each_file<F>(tool: &str, paths: &[PathBuf], mut action: F) -> Result<bool>
where
    F: FnMut(&Path) -> Result<()>,
{
    let mut ok = true;
    for path in paths {
        if let Err(err) = action(path) {
            report(tool, &err);
            ok = false;
        }
    }
    Ok(ok)
}

fn size(tool: &str, files: &[PathBuf]) -> Result<bool> {
    let mut out = stdout();
    let mut header_written = false;
    let ok = for_each_file(tool, files, |path| {
        let bin = open(path)?;
        if !header_written {
            writeln!(out, "{}", size::HEADER)?;
            header_written = true;
        }
        size::SizeReport::of(&bin).write_row(&path.display().to_string(), &mut out)?;
        Ok(())
    })?;
    out.flush()?;
    Ok(ok)
}

/// Demangles each argument, or each line of stdin when there are none.
fn cxxfilt(names: &[String]) -> Result<()> {
    let mut out = stdout();
    if names.is_empty() {
        for line in io::stdin().lock().lines() {
            writeln!(out, "{}", demangle::demangle(line?.trim_end()))?;
        }
    } else {
        for name in names {
            writeln!(out, "{}", demangle::demangle(name))?;
        }
    }
    out.flush()?;
    Ok(())
}

fn strings_file(path: &Path, min_len: usize) -> Result<()> {
    let mut out = stdout();
    strings::write_file_strings(path, min_len, &mut out)?;
    out.flush()?;
    Ok(())
}

fn readelf(args: ReadelfArgs) -> Result<()> {
    let bin = open(&args.file)?;
    let mut out = stdout();
    if args.json {
        let file = args.file.display().to_string();
        serde_json::to_writer_pretty(&mut out, &Report::new(&bin, &file))?;
        writeln!(out)?;
        out.flush()?;
        return Ok(());
    }

    let selected: Vec<View> = [
        (args.file_header, View::Header),
        (args.section_headers, View::Sections),
        (args.symbols, View::Symbols),
        (args.program_headers, View::Segments),
    ]
    .into_iter()
    .filter_map(|(on, view)| on.then_some(view))
    .collect();

    if args.all || selected.is_empty() {
        dump::write_view(&bin, View::All, &mut out)?;
    } else {
        for (i, view) in selected.into_iter().enumerate() {
            if i > 0 {
                writeln!(out)?;
            }
            dump::write_view(&bin, view, &mut out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn objcopy(args: ObjcopyArgs) -> Result<()> {
    let opts = CopyOptions {
        strip_all: args.strip_all,
        strip_debug: args.strip_debug,
        strip_symbols: args.strip_symbols,
        keep_symbols: args.keep_symbols,
        remove_sections: args.remove_sections,
    };
    if opts.is_empty() {
        log::debug!("no edits requested, copying {} as is", args.input.display());
    }
    binkit_core::transform::objcopy::copy_file(&args.input, &args.output, &opts)
}

impl FieldArgs {
    fn edit(self) -> Result<Edit> {
        let (field, value) = match self {
            FieldArgs { class: Some(v), .. } => (Field::Class, v),
            FieldArgs { data: Some(v), .. } => (Field::Data, v),
            FieldArgs { os_abi: Some(v), .. } => (Field::OsAbi, v),
            FieldArgs { elf_type: Some(v), .. } => (Field::Type, v),
            _ => bail!("one of --output-class, --output-data, --output-osabi or --output-type is required"),
        };
        Ok(Edit::parse(field, &value)?)
    }
}

fn elfedit(args: ElfeditArgs) -> Result<()> {
    let edit = args.field.edit()?;
    let backup = elfedit::edit_file(&args.file, edit)?;
    log::info!("original saved as {}", backup.display());
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArAction {
    Replace,
    List,
    Extract,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ArOperation {
    action: ArAction,
    verbose: bool,
    update_index: bool,
}

impl ArOperation {
    /// `rvs`, `-t`, `xv` and so on. `c` is accepted and ignored.
    fn parse(text: &str) -> Result<Self> {
        let letters = text.strip_prefix('-').unwrap_or(text);
        let mut chars = letters.chars();
        let action = match chars.next() {
            Some('r') => ArAction::Replace,
            Some('t') => ArAction::List,
            Some('x') => ArAction::Extract,
            Some('d') => ArAction::Delete,
            Some(other) => bail!("invalid operation '{other}' (expected one of r, t, x, d)"),
            None => bail!("no operation specified"),
        };
        let mut op = ArOperation {
            action,
            verbose: false,
            update_index: false,
        };
        for m in chars {
            match m {
                'v' => op.verbose = true,
                's' => op.update_index = true,
                'c' => {}
                other => bail!("invalid modifier '{other}'"),
            }
        }
        Ok(op)
    }
}

#[derive(Tabled)]
struct MemberRow {
    #[tabled(rename = "mode")]
    mode: String,
    #[tabled(rename = "uid/gid")]
    owner: String,
    #[tabled(rename = "size")]
    size: u64,
    #[tabled(rename = "mtime")]
    mtime: u64,
    #[tabled(rename = "name")]
    name: String,
}

fn mode_string(mode: u32) -> String {
    let mut s = String::with_capacity(9);
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        s.push(if bits & 4 != 0 { 'r' } else { '-' });
        s.push(if bits & 2 != 0 { 'w' } else { '-' });
        s.push(if bits & 1 != 0 { 'x' } else { '-' });
    }
    s
}

impl From<&ArchiveMember> for MemberRow {
    fn from(m: &ArchiveMember) -> Self {
        Self {
            mode: mode_string(m.mode),
            owner: format!("{}/{}", m.uid, m.gid),
            size: m.size(),
            mtime: m.mtime,
            name: m.name.clone(),
        }
    }
}

fn member_names(files: &[PathBuf]) -> Vec<String> {
    files.iter().map(|f| f.to_string_lossy().into_owned()).collect()
}

fn ar(operation: &str, archive_path: &Path, files: &[PathBuf]) -> Result<()> {
    let op = ArOperation::parse(operation)?;
    let mut out = stdout();
    match op.action {
        ArAction::Replace => {
            if files.is_empty() && !op.update_index {
                bail!("no files to add to {}", archive_path.display());
            }
            ops::replace(archive_path, files, op.update_index)?;
            if op.verbose {
                for f in files {
                    let name = f.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
                    writeln!(out, "r - {name}")?;
                }
            }
        }
        ArAction::List => {
            let archive = Archive::open(archive_path)
                .with_context(|| format!("{}: cannot read archive", archive_path.display()))?;
            if op.verbose {
                let rows: Vec<MemberRow> = archive.files().map(MemberRow::from).collect();
                let mut table = Table::new(rows);
                table.with(Style::blank());
                writeln!(out, "{table}")?;
            } else {
                for m in archive.files() {
                    writeln!(out, "{}", m.name)?;
                }
            }
        }
        ArAction::Extract => {
            let written = ops::extract(archive_path, &member_names(files), Path::new("."))?;
            if op.verbose {
                for name in written {
                    writeln!(out, "x - {name}")?;
                }
            }
        }
        ArAction::Delete => {
            let names = member_names(files);
            let removed = ops::delete(archive_path, &names, op.update_index)?;
            if op.verbose {
                writeln!(out, "d - {removed} of {} members removed", names.len())?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ar_operations() {
        let op = ArOperation::parse("rvs").unwrap();
        assert_eq!(op.action, ArAction::Replace);
        assert!(op.verbose && op.update_index);

        let op = ArOperation::parse("-t").unwrap();
        assert_eq!(op.action, ArAction::List);
        assert!(!op.verbose);

        assert_eq!(ArOperation::parse("xv").unwrap().action, ArAction::Extract);
        assert_eq!(ArOperation::parse("d").unwrap().action, ArAction::Delete);
        assert_eq!(ArOperation::parse("rcs").unwrap().action, ArAction::Replace);
    }

    #[test]
    fn bad_ar_operations() {
        assert!(ArOperation::parse("").is_err());
        assert!(ArOperation::parse("q").is_err());
        assert!(ArOperation::parse("tz").is_err());
    }

    #[test]
    fn permission_strings() {
        assert_eq!(mode_string(0o644), "rw-r--r--");
        assert_eq!(mode_string(0o755), "rwxr-xr-x");
        assert_eq!(mode_string(0), "---------");
    }

    #[test]
    fn field_args_pick_the_given_field() {
        let args = FieldArgs {
            class: None,
            data: None,
            os_abi: None,
            elf_type: Some("ET_DYN".into()),
        };
        assert_eq!(args.edit().unwrap(), Edit::Type(3));

        let args = FieldArgs {
            class: Some("ELF16".into()),
            data: None,
            os_abi: None,
            elf_type: None,
        };
        let err = args.edit().unwrap_err();
        assert_eq!(
            err.downcast_ref::<binkit_core::ElfError>().map(|e| e.kind()),
            Some("ValidationError")
        );
    }

    #[test]
    fn multi_file_tools_keep_going() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.o");
        std::fs::write(&good, binkit_core::asm::assemble("ret\n").unwrap().to_bytes().unwrap()).unwrap();
        let missing = dir.path().join("missing.o");

        let mut seen = Vec::new();
        let ok = for_each_file("strip", &[missing, good.clone()], |p| {
            seen.push(p.to_path_buf());
            strip::strip_file(p)
        })
        .unwrap();
        assert!(!ok);
        assert_eq!(seen.len(), 2);
        assert!(Binary::open(&good).unwrap().is_stripped());
    }
}

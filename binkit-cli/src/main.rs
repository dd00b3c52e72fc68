use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use binkit_core::inspect::{addr2line, strings};
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;

mod tools;

/// Minimal ELF toolkit
#[derive(Parser)]
#[command(name = "binkit", about = "Inspect, edit, link and archive ELF objects", version)]
struct Cli {
    #[command(subcommand)]
    tool: Tool,
}

#[derive(Subcommand)]
enum Tool {
    /// List symbols sorted by address
    Nm {
        /// Demangle C++ symbol names
        #[arg(short = 'C', long = "demangle")]
        demangle: bool,
        file: PathBuf,
    },
    /// Demangle C++ symbol names
    #[command(name = "c++filt")]
    Cxxfilt {
        names: Vec<String>,
    },
    /// Show headers, sections and symbols in objdump layout
    Objdump {
        file: PathBuf,
    },
    /// Display ELF header fields and tables
    #[command(disable_help_flag = true)]
    Readelf(ReadelfArgs),
    /// Report text, data and bss sizes
    Size {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Map addresses to the sections that contain them
    Addr2line {
        #[arg(short = 'e', long = "exe", default_value = "a.out")]
        exe: PathBuf,
        #[arg(required = true, value_parser = addr2line::parse_address)]
        addresses: Vec<u64>,
    },
    /// Print runs of printable characters
    Strings {
        #[arg(short = 'n', long = "bytes", default_value_t = strings::DEFAULT_MIN_LEN, value_parser = strings::parse_min_len)]
        min_len: usize,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Remove symbols and debug sections in place
    Strip {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Copy an object, optionally dropping symbols or sections
    Objcopy(ObjcopyArgs),
    /// Change one ELF header field
    Elfedit(ElfeditArgs),
    /// Link objects into an executable
    Ld {
        #[arg(short = 'o', default_value = "a.out")]
        output: PathBuf,
        /// Fail on a symbol defined more than once
        #[arg(long = "no-allow-duplicates")]
        no_allow_duplicates: bool,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Assemble a source file into a relocatable object
    As {
        #[arg(short = 'o', default_value = "a.out")]
        output: PathBuf,
        input: PathBuf,
    },
    /// Create, modify and extract from archives
    Ar {
        /// Operation letter (r, t, x, d) followed by modifiers (v, s)
        #[arg(allow_hyphen_values = true)]
        operation: String,
        archive: PathBuf,
        files: Vec<PathBuf>,
    },
    /// Rebuild the symbol index of archives
    Ranlib {
        #[arg(required = true)]
        archives: Vec<PathBuf>,
    },
}

#[derive(Args)]
struct ReadelfArgs {
    /// Display the ELF file header
    #[arg(short = 'h', long = "file-header")]
    file_header: bool,
    /// Display the section headers
    #[arg(short = 'S', long = "section-headers")]
    section_headers: bool,
    /// Display the symbol table
    #[arg(short = 's', long = "syms")]
    symbols: bool,
    /// Display the program headers
    #[arg(short = 'l', long = "program-headers")]
    program_headers: bool,
    /// Equivalent to -h -S -s -l
    #[arg(short = 'a', long = "all")]
    all: bool,
    /// Emit the whole model as JSON
    #[arg(long)]
    json: bool,
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
    file: PathBuf,
}

#[derive(Args)]
struct ObjcopyArgs {
    #[arg(short = 'S', long = "strip-all")]
    strip_all: bool,
    #[arg(short = 'g', long = "strip-debug")]
    strip_debug: bool,
    #[arg(short = 'N', long = "strip-symbol", value_name = "SYMBOL")]
    strip_symbols: Vec<String>,
    #[arg(short = 'K', long = "keep-symbol", value_name = "SYMBOL")]
    keep_symbols: Vec<String>,
    #[arg(short = 'R', long = "remove-section", value_name = "SECTION")]
    remove_sections: Vec<String>,
    input: PathBuf,
    output: PathBuf,
}

#[derive(Args)]
#[group(id = "field", required = true, multiple = false)]
struct FieldArgs {
    /// ELF32 or ELF64
    #[arg(long = "output-class", value_name = "CLASS")]
    class: Option<String>,
    /// "Little Endian" or "Big Endian"
    #[arg(long = "output-data", value_name = "DATA")]
    data: Option<String>,
    /// ELFOSABI_* name
    #[arg(long = "output-osabi", value_name = "OSABI")]
    os_abi: Option<String>,
    /// ET_* name
    #[arg(long = "output-type", value_name = "TYPE")]
    elf_type: Option<String>,
}

#[derive(Args)]
struct ElfeditArgs {
    #[command(flatten)]
    field: FieldArgs,
    file: PathBuf,
}

impl Tool {
    fn name(&self) -> &'static str {
        match self {
            Tool::Nm { .. } => "nm",
            Tool::Cxxfilt { .. } => "c++filt",
            Tool::Objdump { .. } => "objdump",
            Tool::Readelf(_) => "readelf",
            Tool::Size { .. } => "size",
            Tool::Addr2line { .. } => "addr2line",
            Tool::Strings { .. } => "strings",
            Tool::Strip { .. } => "strip",
            Tool::Objcopy(_) => "objcopy",
            Tool::Elfedit(_) => "elfedit",
            Tool::Ld { .. } => "ld",
            Tool::As { .. } => "as",
            Tool::Ar { .. } => "ar",
            Tool::Ranlib { .. } => "ranlib",
        }
    }
}

const TOOL_NAMES: [&str; 14] = [
    "nm", "c++filt", "objdump", "readelf", "size", "addr2line", "strings", "strip", "objcopy", "elfedit", "ld", "as",
    "ar", "ranlib",
];

/// When invoked through a symlink named after a tool, inserts that tool as
/// the subcommand.
fn dispatch_args(args: Vec<OsString>) -> Vec<OsString> {
    let invoked = args
        .first()
        .and_then(|a| Path::new(a).file_name())
        .and_then(|n| n.to_str())
        .filter(|n| TOOL_NAMES.contains(n))
        .map(str::to_string);
    match invoked {
        Some(tool) => {
            let mut rewritten = vec![OsString::from("binkit"), OsString::from(tool)];
            rewritten.extend(args.into_iter().skip(1));
            rewritten
        }
        None => args,
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse_from(dispatch_args(std::env::args_os().collect()));
    let name = cli.tool.name();

    match tools::run(cli.tool) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            report(name, &err);
            ExitCode::FAILURE
        }
    }
}

pub(crate) fn report(tool: &str, err: &anyhow::Error) {
    eprintln!("{}: {err:#}", tool.red().bold());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn symlink_names_become_subcommands() {
        assert_eq!(dispatch_args(os(&["/usr/local/bin/nm", "a.o"])), os(&["binkit", "nm", "a.o"]));
        assert_eq!(dispatch_args(os(&["binkit", "size", "a.o"])), os(&["binkit", "size", "a.o"]));
        assert_eq!(dispatch_args(os(&["./mystery", "a.o"])), os(&["./mystery", "a.o"]));
    }

    #[test]
    fn every_tool_name_parses() {
        let tools = Cli::command();
        let names: Vec<_> = tools.get_subcommands().map(|c| c.get_name().to_string()).collect();
        for name in TOOL_NAMES {
            assert!(names.iter().any(|n| n == name), "{name}");
        }
    }

    #[test]
    fn readelf_short_h_is_the_header_view() {
        let cli = Cli::try_parse_from(["binkit", "readelf", "-h", "a.o"]).unwrap();
        match cli.tool {
            Tool::Readelf(args) => {
                assert!(args.file_header);
                assert!(!args.json);
            }
            _ => panic!("expected readelf"),
        }
    }

    #[test]
    fn elfedit_takes_exactly_one_field() {
        assert!(Cli::try_parse_from(["binkit", "elfedit", "a.o"]).is_err());
        assert!(
            Cli::try_parse_from(["binkit", "elfedit", "--output-class", "ELF32", "--output-type", "ET_EXEC", "a.o"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["binkit", "elfedit", "--output-osabi", "ELFOSABI_LINUX", "a.o"]).is_ok());
    }

    #[test]
    fn strings_rejects_out_of_range_lengths() {
        assert!(Cli::try_parse_from(["binkit", "strings", "-n", "0", "f"]).is_err());
        assert!(Cli::try_parse_from(["binkit", "strings", "-n", "101", "f"]).is_err());
        assert!(Cli::try_parse_from(["binkit", "strings", "-n", "8", "f"]).is_ok());
    }

    #[test]
    fn addresses_accept_optional_prefix() {
        let cli = Cli::try_parse_from(["binkit", "addr2line", "-e", "prog", "0x401000", "10"]).unwrap();
        match cli.tool {
            Tool::Addr2line { addresses, .. } => assert_eq!(addresses, [0x401000, 0x10]),
            _ => panic!("expected addr2line"),
        }
        assert!(Cli::try_parse_from(["binkit", "addr2line", "-e", "prog", "0xzz"]).is_err());
    }

    #[test]
    fn demangling_entry_points() {
        let cli = Cli::try_parse_from(["binkit", "nm", "-C", "a.o"]).unwrap();
        assert!(matches!(cli.tool, Tool::Nm { demangle: true, .. }));
        let cli = Cli::try_parse_from(dispatch_args(os(&["/usr/bin/c++filt", "_Z4testv"]))).unwrap();
        match cli.tool {
            Tool::Cxxfilt { names } => assert_eq!(names, ["_Z4testv"]),
            _ => panic!("expected c++filt"),
        }
    }
}

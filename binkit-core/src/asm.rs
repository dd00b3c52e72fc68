//! A toy assembler for a line-oriented dialect:
//!
//! ```text
//! # comment
//! start:  nop
//! done:
//!         ret
//! ```
//!
//! Each opcode maps to a fixed byte sequence; operands are accepted and
//! ignored. Unknown opcodes assemble to a single `nop`.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use goblin::elf::section_header::{SHF_ALLOC, SHF_EXECINSTR, SHT_PROGBITS};
use goblin::elf::sym::{STB_LOCAL, STT_FUNC};

use crate::binary::Binary;
use crate::error::{ElfError, Result};
use crate::header::ElfHeader;
use crate::output;
use crate::sections::Section;
use crate::symbols::Symbol;

/// Largest source file accepted.
pub const MAX_SOURCE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LINE_LEN: usize = 10_000;

/// Byte emitted for opcodes missing from [`OPCODES`].
pub const DEFAULT_OPCODE: u8 = 0x90;
const DEFAULT_ENCODING: &[u8] = &[DEFAULT_OPCODE];

static OPCODES: &[(&str, &[u8])] = &[
    ("nop", &[0x90]),
    ("ret", &[0xc3]),
    ("hlt", &[0xf4]),
    ("int3", &[0xcc]),
    ("leave", &[0xc9]),
    ("cld", &[0xfc]),
    ("std", &[0xfd]),
    ("syscall", &[0x0f, 0x05]),
    ("ud2", &[0x0f, 0x0b]),
];

/// Machine code for `opcode`, case-insensitive.
pub fn encode(opcode: &str) -> &'static [u8] {
    OPCODES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(opcode))
        .map_or(DEFAULT_ENCODING, |&(_, bytes)| bytes)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Labels bound to this instruction's address.
    pub labels: Vec<String>,
    pub opcode: String,
    pub operands: Vec<String>,
    /// 1-based source line.
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    /// Labels after the last instruction; they mark the end of `.text`.
    pub trailing_labels: Vec<String>,
}

fn is_label(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '_' | '.' | '$'))
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'))
}

pub fn parse_source(source: &str) -> Result<Program> {
    let mut program = Program::default();
    let mut pending: Vec<String> = Vec::new();
    let mut seen = HashSet::new();

    for (n, raw) in source.lines().enumerate() {
        let line_no = n + 1;
        if raw.len() > MAX_LINE_LEN {
            return Err(ElfError::validation(format!("line {line_no} is longer than {MAX_LINE_LEN} bytes")));
        }
        let mut line = raw.split(['#', ';']).next().unwrap_or("").trim();

        while let Some((head, rest)) = line.split_once(':') {
            let head = head.trim();
            if !is_label(head) {
                break;
            }
            if !seen.insert(head.to_string()) {
                return Err(ElfError::validation(format!("line {line_no}: duplicate label `{head}`")));
            }
            pending.push(head.to_string());
            line = rest.trim();
        }

        let mut fields = line.split_whitespace();
        let Some(opcode) = fields.next() else {
            continue;
        };
        let operands = fields
            .collect::<Vec<_>>()
            .join(" ")
            .split(',')
            .map(|op| op.trim().to_string())
            .filter(|op| !op.is_empty())
            .collect();
        program.instructions.push(Instruction {
            labels: std::mem::take(&mut pending),
            opcode: opcode.to_string(),
            operands,
            line: line_no,
        });
    }
    program.trailing_labels = pending;
    Ok(program)
}

/// Assembles `source` into an ELF64 little-endian x86_64 relocatable model.
pub fn assemble(source: &str) -> Result<Binary> {
    let program = parse_source(source)?;

    let mut code = Vec::new();
    let mut symbols = vec![Symbol::new("", 0, 0, 0, 0)];
    for inst in &program.instructions {
        for label in &inst.labels {
            symbols.push(Symbol::new(label.as_str(), code.len() as u64, STT_FUNC, STB_LOCAL, 1));
        }
        let bytes = encode(&inst.opcode);
        if bytes == DEFAULT_ENCODING && !inst.opcode.eq_ignore_ascii_case("nop") {
            log::debug!("line {}: unknown opcode `{}`, emitting nop", inst.line, inst.opcode);
        }
        code.extend_from_slice(bytes);
    }
    for label in &program.trailing_labels {
        symbols.push(Symbol::new(label.as_str(), code.len() as u64, STT_FUNC, STB_LOCAL, 1));
    }

    let mut bin = Binary::new(ElfHeader::x86_64_relocatable());
    let mut text = Section::new(".text", SHT_PROGBITS, u64::from(SHF_ALLOC | SHF_EXECINSTR), code);
    text.addralign = 16;
    bin.sections.push(text);
    bin.symbols = symbols;
    Ok(bin)
}

/// Assembles `input` and writes the object to `dest`.
pub fn assemble_file(input: &Path, dest: &Path) -> anyhow::Result<Binary> {
    let bytes = output::read_limited(input, MAX_SOURCE_BYTES)
        .with_context(|| format!("{}: cannot read", input.display()))?;
    let source = String::from_utf8(bytes).with_context(|| format!("{}: not UTF-8 text", input.display()))?;
    let bin = assemble(&source).with_context(|| input.display().to_string())?;
    output::write_atomic(dest, &bin.to_bytes()?).with_context(|| format!("{}: cannot write", dest.display()))?;
    log::info!("assembled {} ({} bytes of code)", input.display(), bin.sections[1].size);
    Ok(bin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_table() {
        assert_eq!(encode("ret"), [0xc3]);
        assert_eq!(encode("RET"), [0xc3]);
        assert_eq!(encode("syscall"), [0x0f, 0x05]);
        assert_eq!(encode("movq"), [DEFAULT_OPCODE]);
    }

    #[test]
    fn labels_carry_byte_offsets() {
        let src = "\
# entry
start:  nop
        syscall          ; two bytes
loop:   mov %rax, %rbx
done:
        ret
end:
";
        let bin = assemble(src).unwrap();
        assert_eq!(bin.sections[1].data, [0x90, 0x0f, 0x05, 0x90, 0xc3]);

        let labels: Vec<_> = bin.named_symbols().map(|s| (s.name.as_str(), s.value)).collect();
        assert_eq!(labels, [("start", 0), ("loop", 3), ("done", 4), ("end", 5)]);
        assert!(bin.named_symbols().all(|s| s.is_local() && s.sym_type() == STT_FUNC && s.shndx == 1));
    }

    #[test]
    fn operands_and_stacked_labels() {
        let program = parse_source("a: b: mov %rax, 8(%rsp)\n").unwrap();
        let inst = &program.instructions[0];
        assert_eq!(inst.labels, ["a", "b"]);
        assert_eq!(inst.operands, ["%rax", "8(%rsp)"]);
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let err = parse_source("x: nop\nx: ret\n").unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn output_parses_back() {
        let bin = assemble("f: ret\n").unwrap();
        let back = Binary::from_bytes(&bin.to_bytes().unwrap()).unwrap();
        assert_eq!(back.header.e_type, goblin::elf::header::ET_REL);
        assert_eq!(back.section_by_name(".text").unwrap().data, [0xc3]);
        assert_eq!(back.named_symbols().next().unwrap().name, "f");
    }

    #[test]
    fn oversized_source_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("big.s");
        std::fs::write(&input, vec![b'\n'; MAX_SOURCE_BYTES as usize + 1]).unwrap();
        let err = assemble_file(&input, &dir.path().join("big.o")).unwrap_err();
        assert_eq!(err.downcast_ref::<ElfError>().unwrap().kind(), "LimitExceededError");
    }
}

use std::io::{self, Write};

use goblin::elf::section_header::SHT_NULL;

use crate::binary::Binary;
use crate::error::{ElfError, Result};
use crate::sections::Section;

/// Parses a hex address with an optional `0x`/`0X` prefix.
pub fn parse_address(text: &str) -> Result<u64> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.is_empty() || digits.len() > 16 {
        return Err(ElfError::validation(format!("invalid address {text:?}")));
    }
    u64::from_str_radix(digits, 16).map_err(|_| ElfError::validation(format!("invalid address {text:?}")))
}

/// The first section whose address range contains `addr`.
pub fn resolve(bin: &Binary, addr: u64) -> Option<&Section> {
    bin.sections
        .iter()
        .filter(|s| s.sh_type != SHT_NULL)
        .find(|s| s.contains(addr))
}

pub fn write_resolutions<W: Write>(bin: &Binary, addrs: &[u64], out: &mut W) -> io::Result<()> {
    for &addr in addrs {
        match resolve(bin, addr) {
            Some(section) => writeln!(out, "{}", section.name)?,
            None => writeln!(out, "unknown")?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::ElfHeader;
    use goblin::elf::section_header::SHT_PROGBITS;

    #[test]
    fn addresses() {
        assert_eq!(parse_address("0x401000").unwrap(), 0x401000);
        assert_eq!(parse_address("DEADbeef").unwrap(), 0xdead_beef);
        for bad in ["", "0x", "xyz", "12345678901234567"] {
            assert_eq!(parse_address(bad).unwrap_err().kind(), "ValidationError", "{bad}");
        }
    }

    #[test]
    fn resolves_half_open_ranges() {
        let mut bin = Binary::new(ElfHeader::x86_64_executable());
        let mut text = Section::new(".text", SHT_PROGBITS, 6, vec![0; 0x10]);
        text.addr = 0x1000;
        bin.sections.push(text);
        let mut data = Section::new(".data", SHT_PROGBITS, 3, vec![0; 8]);
        data.addr = 0x1010;
        bin.sections.push(data);

        let mut out = Vec::new();
        write_resolutions(&bin, &[0x1000, 0x100f, 0x1010, 0x1018, 0], &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), ".text\n.text\n.data\nunknown\nunknown\n");
    }
}

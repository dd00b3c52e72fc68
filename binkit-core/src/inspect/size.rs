use std::io::{self, Write};

use serde::Serialize;

use crate::binary::Binary;

pub const HEADER: &str = "   text    data     bss     dec     hex filename";

const TEXT: [&str; 3] = [".text", ".init", ".fini"];
const DATA: [&str; 3] = [".data", ".rodata", ".sdata"];
const BSS: [&str; 2] = [".bss", ".sbss"];

/// Section sizes bucketed by exact section name.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeReport {
    pub text: u64,
    pub data: u64,
    pub bss: u64,
}

impl SizeReport {
    pub fn of(bin: &Binary) -> Self {
        let mut report = Self::default();
        for s in &bin.sections {
            let name = s.name.as_str();
            let bucket = if TEXT.contains(&name) {
                &mut report.text
            } else if DATA.contains(&name) {
                &mut report.data
            } else if BSS.contains(&name) {
                &mut report.bss
            } else {
                continue;
            };
            *bucket = bucket.saturating_add(s.size);
        }
        report
    }

    pub fn total(&self) -> u64 {
        self.text.saturating_add(self.data).saturating_add(self.bss)
    }

    pub fn write_row<W: Write>(&self, filename: &str, out: &mut W) -> io::Result<()> {
        let total = self.total();
        writeln!(
            out,
            "{:7} {:7} {:7} {:7} {:7x} {filename}",
            self.text, self.data, self.bss, total, total
        )
    }
}

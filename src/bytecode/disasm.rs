use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::bytecode::reader::{CodeReader, DecodeError};
use crate::bytecode::unit::CompilationUnit;

#[derive(Debug)]
pub enum DisasmError {
    Decode(DecodeError),
    Io(io::Error),
}

impl From<DecodeError> for DisasmError {
    fn from(err: DecodeError) -> Self {
        DisasmError::Decode(err)
    }
}

impl From<io::Error> for DisasmError {
    fn from(err: io::Error) -> Self {
        DisasmError::Io(err)
    }
}

impl std::fmt::Display for DisasmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisasmError::Decode(err) => write!(f, "{}", err),
            DisasmError::Io(err) => write!(f, "write failed: {}", err),
        }
    }
}

impl std::error::Error for DisasmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DisasmError::Decode(err) => Some(err),
            DisasmError::Io(err) => Some(err),
        }
    }
}

/// Renders a compilation unit as a human-readable listing.
///
/// Walks the byte stream front to back, printing one line per instruction
/// with its offset, and a banner wherever a function entry point falls.
/// Decoding the whole stream this way doubles as a sanity check: the walk
/// fails if any instruction is truncated or unknown.
pub fn disassemble<W: Write>(unit: &CompilationUnit, out: &mut W) -> Result<(), DisasmError> {
    // Entry offset -> function names, in stream order. Names are collected
    // per offset so aliased entries still all get a banner.
    let mut entries: BTreeMap<u32, Vec<&str>> = BTreeMap::new();
    for (name, function) in &unit.functions {
        entries
            .entry(function.entry_point)
            .or_default()
            .push(name.as_str());
    }
    for names in entries.values_mut() {
        names.sort_unstable();
    }

    let mut reader = CodeReader::new(unit);
    while !reader.is_at_end() {
        let offset = reader.offset() as u32;
        if let Some(names) = entries.get(&offset) {
            for name in names {
                let locals = unit.functions[*name].local_count;
                writeln!(out, "{}: ; {} local(s)", name, locals)?;
            }
        }

        let instruction = reader.fetch_instruction()?;
        writeln!(out, "  {:04x}  {}", offset, instruction)?;
    }

    Ok(())
}

/// [`disassemble`] into an owned string, for tests and `--disasm` output.
pub fn disassemble_to_string(unit: &CompilationUnit) -> Result<String, DisasmError> {
    let mut buf = Vec::new();
    disassemble(unit, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

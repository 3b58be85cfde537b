use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A compiled program: one continuous byte stream plus a function table.
///
/// Produced append-only by the compiler and immutable afterwards. Consumers
/// are the execution environment (which sizes call frames from
/// [`Function::local_count`] and enters at [`Function::entry_point`]) and the
/// disassembler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilationUnit {
    /// Emitted bytecode, all functions concatenated.
    pub code: Vec<u8>,

    /// Function name -> entry offset and frame size.
    pub functions: HashMap<String, Function>,
}

impl CompilationUnit {
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            functions: HashMap::new(),
        }
    }
}

/// One entry in the function table.
///
/// `entry_point` is an absolute byte offset into [`CompilationUnit::code`];
/// `local_count` is the peak number of simultaneously live locals (parameters
/// included), i.e. the slot count a call frame must reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub entry_point: u32,
    pub local_count: u16,
}

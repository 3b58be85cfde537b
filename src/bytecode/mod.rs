pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod op;
pub mod reader;
pub mod scope;
pub mod unit;
pub mod writer;

pub use compile::Compiler;
pub use compile_error::CompileError;
pub use disasm::{disassemble, disassemble_to_string, DisasmError};
pub use op::{Instruction, Opcode};
pub use reader::{CodeReader, DecodeError};
pub use scope::Scope;
pub use unit::{CompilationUnit, Function};
pub use writer::{CodeWriter, Label};

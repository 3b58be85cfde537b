use crate::bytecode::op::{Instruction, Opcode};
use crate::bytecode::unit::CompilationUnit;

/// A decode failure: the stream ended mid-operand, carried an opcode byte
/// outside the instruction set, or held a malformed string.
///
/// Any of these means the stream is corrupt or foreign, so fetches fail
/// rather than guessing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    UnexpectedEnd {
        offset: usize,
        wanted: usize,
        available: usize,
    },
    UnknownOpcode {
        offset: usize,
        byte: u8,
    },
    InvalidString {
        offset: usize,
    },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::UnexpectedEnd {
                offset,
                wanted,
                available,
            } => write!(
                f,
                "decode error at {:04x}: wanted {} byte(s), {} available",
                offset, wanted, available
            ),
            DecodeError::UnknownOpcode { offset, byte } => {
                write!(f, "decode error at {:04x}: unknown opcode 0x{:02x}", offset, byte)
            }
            DecodeError::InvalidString { offset } => {
                write!(f, "decode error at {:04x}: string is not valid UTF-8", offset)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Sequential decoder over a compilation unit's byte stream.
///
/// Mirrors `CodeWriter` exactly: every `fetch_*` consumes precisely the
/// bytes its emit counterpart produced. The reader knows nothing about
/// labels; by the time bytes land in the stream every reference is already
/// a literal address.
pub struct CodeReader<'a> {
    unit: &'a CompilationUnit,
    offset: usize,
}

impl<'a> CodeReader<'a> {
    pub fn new(unit: &'a CompilationUnit) -> Self {
        Self { unit, offset: 0 }
    }

    /// A reader positioned at an arbitrary offset, e.g. a function entry.
    pub fn at(unit: &'a CompilationUnit, offset: u32) -> Self {
        Self {
            unit,
            offset: offset as usize,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_at_end(&self) -> bool {
        self.offset >= self.unit.code.len()
    }

    /// The fetch primitive: consumes exactly `len` bytes or fails.
    pub fn fetch_buffer(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let available = self.unit.code.len().saturating_sub(self.offset);
        if available < len {
            return Err(DecodeError::UnexpectedEnd {
                offset: self.offset,
                wanted: len,
                available,
            });
        }
        let bytes = &self.unit.code[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    pub fn fetch_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.fetch_buffer(1)?[0])
    }

    pub fn fetch_u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.fetch_buffer(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn fetch_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.fetch_buffer(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn fetch_number(&mut self) -> Result<f64, DecodeError> {
        let bytes = self.fetch_buffer(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(raw))
    }

    pub fn fetch_string(&mut self) -> Result<String, DecodeError> {
        let start = self.offset;
        let len = self.fetch_u32()? as usize;
        let bytes = self.fetch_buffer(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidString { offset: start })
    }

    /// Decodes the next instruction: opcode tag plus its immediates.
    pub fn fetch_instruction(&mut self) -> Result<Instruction, DecodeError> {
        let at = self.offset;
        let byte = self.fetch_u8()?;
        let opcode = Opcode::from_u8(byte).ok_or(DecodeError::UnknownOpcode { offset: at, byte })?;

        let instruction = match opcode {
            Opcode::Nop => Instruction::Nop,
            Opcode::PushNum => Instruction::PushNum {
                value: self.fetch_number()?,
            },
            Opcode::PushStr => Instruction::PushStr {
                value: self.fetch_string()?,
            },
            Opcode::PushTrue => Instruction::PushTrue,
            Opcode::PushFalse => Instruction::PushFalse,
            Opcode::PushVoid => Instruction::PushVoid,
            Opcode::LoadLocal => Instruction::LoadLocal {
                slot: self.fetch_u16()?,
            },
            Opcode::StoreLocal => Instruction::StoreLocal {
                slot: self.fetch_u16()?,
            },
            Opcode::Add => Instruction::Add,
            Opcode::Sub => Instruction::Sub,
            Opcode::Mul => Instruction::Mul,
            Opcode::Div => Instruction::Div,
            Opcode::Mod => Instruction::Mod,
            Opcode::Negate => Instruction::Negate,
            Opcode::Not => Instruction::Not,
            Opcode::And => Instruction::And,
            Opcode::Or => Instruction::Or,
            Opcode::CmpEq => Instruction::CmpEq,
            Opcode::CmpNe => Instruction::CmpNe,
            Opcode::CmpLt => Instruction::CmpLt,
            Opcode::CmpGt => Instruction::CmpGt,
            Opcode::CmpLe => Instruction::CmpLe,
            Opcode::CmpGe => Instruction::CmpGe,
            Opcode::Jump => Instruction::Jump {
                target: self.fetch_u32()?,
            },
            Opcode::JumpFalse => Instruction::JumpFalse {
                target: self.fetch_u32()?,
            },
            Opcode::Call => {
                let name = self.fetch_string()?;
                let argc = self.fetch_u8()?;
                Instruction::Call { name, argc }
            }
            Opcode::Pop => Instruction::Pop,
            Opcode::Ret => Instruction::Ret,
            Opcode::RetVal => Instruction::RetVal,
        };

        Ok(instruction)
    }
}

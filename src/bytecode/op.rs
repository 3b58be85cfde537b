use std::fmt;

// =============================================================================
// OPCODE - fixed-width instruction tags
// =============================================================================

/// One-byte instruction tag.
///
/// The numeric values are the wire encoding; [`Opcode::from_u8`] is the only
/// way back from a raw byte, and it rejects anything outside the opcode space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,

    // literals
    PushNum,
    PushStr,
    PushTrue,
    PushFalse,
    PushVoid,

    // locals
    LoadLocal,
    StoreLocal,

    // arithmetic / logic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Negate,
    Not,
    And,
    Or,

    // comparison
    CmpEq,
    CmpNe,
    CmpLt,
    CmpGt,
    CmpLe,
    CmpGe,

    // control flow (absolute u32 target addresses)
    Jump,
    JumpFalse,

    // calls / stack discipline
    Call,
    Pop,
    Ret,
    RetVal,
}

impl Opcode {
    pub fn from_u8(byte: u8) -> Option<Opcode> {
        let op = match byte {
            0 => Opcode::Nop,
            1 => Opcode::PushNum,
            2 => Opcode::PushStr,
            3 => Opcode::PushTrue,
            4 => Opcode::PushFalse,
            5 => Opcode::PushVoid,
            6 => Opcode::LoadLocal,
            7 => Opcode::StoreLocal,
            8 => Opcode::Add,
            9 => Opcode::Sub,
            10 => Opcode::Mul,
            11 => Opcode::Div,
            12 => Opcode::Mod,
            13 => Opcode::Negate,
            14 => Opcode::Not,
            15 => Opcode::And,
            16 => Opcode::Or,
            17 => Opcode::CmpEq,
            18 => Opcode::CmpNe,
            19 => Opcode::CmpLt,
            20 => Opcode::CmpGt,
            21 => Opcode::CmpLe,
            22 => Opcode::CmpGe,
            23 => Opcode::Jump,
            24 => Opcode::JumpFalse,
            25 => Opcode::Call,
            26 => Opcode::Pop,
            27 => Opcode::Ret,
            28 => Opcode::RetVal,
            _ => return None,
        };
        Some(op)
    }
}

// =============================================================================
// INSTRUCTION - decoded form, one variant per opcode
// =============================================================================

/// A fully decoded instruction: the opcode plus its immediate operands.
///
/// Keeping this enum closed means the writer's encode match and the reader's
/// decode match are both exhaustive, so an opcode cannot gain an operand on
/// one side without the compiler flagging the other.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Nop,
    PushNum { value: f64 },
    PushStr { value: String },
    PushTrue,
    PushFalse,
    PushVoid,
    LoadLocal { slot: u16 },
    StoreLocal { slot: u16 },
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Negate,
    Not,
    And,
    Or,
    CmpEq,
    CmpNe,
    CmpLt,
    CmpGt,
    CmpLe,
    CmpGe,
    Jump { target: u32 },
    JumpFalse { target: u32 },
    Call { name: String, argc: u8 },
    Pop,
    Ret,
    RetVal,
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Nop => Opcode::Nop,
            Instruction::PushNum { .. } => Opcode::PushNum,
            Instruction::PushStr { .. } => Opcode::PushStr,
            Instruction::PushTrue => Opcode::PushTrue,
            Instruction::PushFalse => Opcode::PushFalse,
            Instruction::PushVoid => Opcode::PushVoid,
            Instruction::LoadLocal { .. } => Opcode::LoadLocal,
            Instruction::StoreLocal { .. } => Opcode::StoreLocal,
            Instruction::Add => Opcode::Add,
            Instruction::Sub => Opcode::Sub,
            Instruction::Mul => Opcode::Mul,
            Instruction::Div => Opcode::Div,
            Instruction::Mod => Opcode::Mod,
            Instruction::Negate => Opcode::Negate,
            Instruction::Not => Opcode::Not,
            Instruction::And => Opcode::And,
            Instruction::Or => Opcode::Or,
            Instruction::CmpEq => Opcode::CmpEq,
            Instruction::CmpNe => Opcode::CmpNe,
            Instruction::CmpLt => Opcode::CmpLt,
            Instruction::CmpGt => Opcode::CmpGt,
            Instruction::CmpLe => Opcode::CmpLe,
            Instruction::CmpGe => Opcode::CmpGe,
            Instruction::Jump { .. } => Opcode::Jump,
            Instruction::JumpFalse { .. } => Opcode::JumpFalse,
            Instruction::Call { .. } => Opcode::Call,
            Instruction::Pop => Opcode::Pop,
            Instruction::Ret => Opcode::Ret,
            Instruction::RetVal => Opcode::RetVal,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Nop => write!(f, "Nop"),
            Instruction::PushNum { value } => write!(f, "PushNum {}", value),
            Instruction::PushStr { value } => write!(f, "PushStr {:?}", value),
            Instruction::PushTrue => write!(f, "PushTrue"),
            Instruction::PushFalse => write!(f, "PushFalse"),
            Instruction::PushVoid => write!(f, "PushVoid"),
            Instruction::LoadLocal { slot } => write!(f, "LoadLocal {}", slot),
            Instruction::StoreLocal { slot } => write!(f, "StoreLocal {}", slot),
            Instruction::Add => write!(f, "Add"),
            Instruction::Sub => write!(f, "Sub"),
            Instruction::Mul => write!(f, "Mul"),
            Instruction::Div => write!(f, "Div"),
            Instruction::Mod => write!(f, "Mod"),
            Instruction::Negate => write!(f, "Negate"),
            Instruction::Not => write!(f, "Not"),
            Instruction::And => write!(f, "And"),
            Instruction::Or => write!(f, "Or"),
            Instruction::CmpEq => write!(f, "CmpEq"),
            Instruction::CmpNe => write!(f, "CmpNe"),
            Instruction::CmpLt => write!(f, "CmpLt"),
            Instruction::CmpGt => write!(f, "CmpGt"),
            Instruction::CmpLe => write!(f, "CmpLe"),
            Instruction::CmpGe => write!(f, "CmpGe"),
            Instruction::Jump { target } => write!(f, "Jump {:04x}", target),
            Instruction::JumpFalse { target } => write!(f, "JumpFalse {:04x}", target),
            Instruction::Call { name, argc } => write!(f, "Call {:?} {}", name, argc),
            Instruction::Pop => write!(f, "Pop"),
            Instruction::Ret => write!(f, "Ret"),
            Instruction::RetVal => write!(f, "RetVal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_round_trip() {
        for byte in 0..=28u8 {
            let op = Opcode::from_u8(byte).unwrap();
            assert_eq!(op as u8, byte);
        }
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        assert_eq!(Opcode::from_u8(29), None);
        assert_eq!(Opcode::from_u8(0xff), None);
    }

    #[test]
    fn test_display_instructions() {
        assert_eq!(
            Instruction::Jump { target: 0x12 }.to_string(),
            "Jump 0012"
        );
        assert_eq!(
            Instruction::Call {
                name: "fib".to_string(),
                argc: 1
            }
            .to_string(),
            "Call \"fib\" 1"
        );
        assert_eq!(
            Instruction::LoadLocal { slot: 3 }.to_string(),
            "LoadLocal 3"
        );
        assert_eq!(
            Instruction::PushStr {
                value: "hi".to_string()
            }
            .to_string(),
            "PushStr \"hi\""
        );
    }

    #[test]
    fn test_instruction_opcode_mapping() {
        assert_eq!(Instruction::Nop.opcode(), Opcode::Nop);
        assert_eq!(
            Instruction::JumpFalse { target: 0 }.opcode(),
            Opcode::JumpFalse
        );
        assert_eq!(Instruction::RetVal.opcode(), Opcode::RetVal);
    }
}

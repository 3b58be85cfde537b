use std::collections::BTreeMap;

use crate::bytecode::op::{Instruction, Opcode};
use crate::bytecode::unit::CompilationUnit;

/// An opaque identifier for a code address that may not be known yet.
///
/// A label is a name, not an address: it only means something to the
/// `CodeWriter` that created it. References may be emitted before the label
/// is defined; the writer patches them once [`CodeWriter::define_label`]
/// pins the label to an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Label(u32);

/// Sequential appender to a compilation unit's byte stream.
///
/// All typed emit operations funnel through [`emit`](Self::emit), which is
/// strictly append-only. The single sanctioned backward write is the label
/// patch step in [`define_label`](Self::define_label), which overwrites
/// previously reserved placeholder addresses.
///
/// Label misuse (defining a label twice, finishing with references to a
/// label that was never defined) is a bug in the caller, not an input
/// error; those contracts are checked with `debug_assert!`.
pub struct CodeWriter<'a> {
    target: &'a mut CompilationUnit,
    next_label: u32,
    labels: BTreeMap<Label, u32>,
    /// Placeholder addresses still waiting for their label to resolve:
    /// (label, byte offset of the 4-byte placeholder).
    patches: Vec<(Label, u32)>,
}

impl<'a> CodeWriter<'a> {
    pub fn new(target: &'a mut CompilationUnit) -> Self {
        Self {
            target,
            next_label: 0,
            labels: BTreeMap::new(),
            patches: Vec::new(),
        }
    }

    /// Current write offset, i.e. the address of the next emitted byte.
    pub fn offset(&self) -> u32 {
        self.target.code.len() as u32
    }

    /// Consumes the writer, asserting that every emitted label reference
    /// has been resolved.
    pub fn finish(self) {
        debug_assert!(
            self.patches.is_empty(),
            "finished with {} unresolved label reference(s)",
            self.patches.len()
        );
    }

    // ── labels ─────────────────────────────────────────────────────────

    /// Allocates a fresh, still-undefined label.
    pub fn create_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Pins `label` to the current write offset and patches every
    /// placeholder that was emitted for it so far.
    pub fn define_label(&mut self, label: Label) {
        debug_assert!(
            !self.labels.contains_key(&label),
            "label {:?} defined twice",
            label
        );
        let address = self.offset();
        self.labels.insert(label, address);

        let code = &mut self.target.code;
        self.patches.retain(|&(pending, at)| {
            if pending == label {
                let at = at as usize;
                code[at..at + 4].copy_from_slice(&address.to_le_bytes());
                false
            } else {
                true
            }
        });
    }

    /// Allocates a label already pinned to the current offset ("label here").
    pub fn create_and_define_label(&mut self) -> Label {
        let label = self.create_label();
        self.define_label(label);
        label
    }

    /// Emits a label reference as a fixed-width absolute address.
    ///
    /// If the label is already defined the resolved address is written
    /// directly; otherwise a zero placeholder is written and recorded for
    /// patching.
    pub fn emit_label(&mut self, label: Label) {
        match self.labels.get(&label) {
            Some(&address) => self.emit_u32(address),
            None => {
                let at = self.offset();
                self.patches.push((label, at));
                self.emit_u32(0);
            }
        }
    }

    /// Number of emitted references still waiting for their label.
    pub fn pending_patches(&self) -> usize {
        self.patches.len()
    }

    // ── typed emit operations ──────────────────────────────────────────

    /// The append primitive every typed emit funnels through.
    pub fn emit(&mut self, bytes: &[u8]) {
        self.target.code.extend_from_slice(bytes);
    }

    pub fn emit_u8(&mut self, value: u8) {
        self.emit(&[value]);
    }

    pub fn emit_u16(&mut self, value: u16) {
        self.emit(&value.to_le_bytes());
    }

    pub fn emit_u32(&mut self, value: u32) {
        self.emit(&value.to_le_bytes());
    }

    /// 8-byte little-endian IEEE 754 layout, matching `fetch_number`.
    pub fn emit_number(&mut self, value: f64) {
        self.emit(&value.to_le_bytes());
    }

    /// 32-bit length prefix followed by the raw bytes, no terminator.
    pub fn emit_string(&mut self, value: &str) {
        self.emit_u32(value.len() as u32);
        self.emit(value.as_bytes());
    }

    pub fn emit_opcode(&mut self, opcode: Opcode) {
        self.emit_u8(opcode as u8);
    }

    /// Encodes one instruction: opcode tag plus its immediates.
    pub fn emit_instruction(&mut self, instruction: &Instruction) {
        self.emit_opcode(instruction.opcode());
        match instruction {
            Instruction::PushNum { value } => self.emit_number(*value),
            Instruction::PushStr { value } => self.emit_string(value),
            Instruction::LoadLocal { slot } | Instruction::StoreLocal { slot } => {
                self.emit_u16(*slot)
            }
            Instruction::Jump { target } | Instruction::JumpFalse { target } => {
                self.emit_u32(*target)
            }
            Instruction::Call { name, argc } => {
                self.emit_string(name);
                self.emit_u8(*argc);
            }
            Instruction::Nop
            | Instruction::PushTrue
            | Instruction::PushFalse
            | Instruction::PushVoid
            | Instruction::Add
            | Instruction::Sub
            | Instruction::Mul
            | Instruction::Div
            | Instruction::Mod
            | Instruction::Negate
            | Instruction::Not
            | Instruction::And
            | Instruction::Or
            | Instruction::CmpEq
            | Instruction::CmpNe
            | Instruction::CmpLt
            | Instruction::CmpGt
            | Instruction::CmpLe
            | Instruction::CmpGe
            | Instruction::Pop
            | Instruction::Ret
            | Instruction::RetVal => {}
        }
    }

    // ── branch helpers ─────────────────────────────────────────────────

    /// `Jump <label>` — unconditional branch to a possibly forward label.
    pub fn jump(&mut self, target: Label) {
        self.emit_opcode(Opcode::Jump);
        self.emit_label(target);
    }

    /// `JumpFalse <label>` — pop a value, branch when it is false.
    pub fn jump_false(&mut self, target: Label) {
        self.emit_opcode(Opcode::JumpFalse);
        self.emit_label(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::reader::CodeReader;

    fn fetch_u32_at(unit: &CompilationUnit, offset: usize) -> u32 {
        u32::from_le_bytes(unit.code[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn test_forward_reference_patched() {
        let mut unit = CompilationUnit::new();
        let mut writer = CodeWriter::new(&mut unit);

        let label = writer.create_label();
        writer.emit_label(label); // placeholder at 0
        writer.emit_u8(0xAA);
        writer.emit_label(label); // placeholder at 5
        assert_eq!(writer.pending_patches(), 2);

        writer.emit_u8(0xBB);
        writer.define_label(label); // resolves to offset 10
        assert_eq!(writer.pending_patches(), 0);
        writer.emit_label(label); // already resolved, written directly
        writer.finish();

        assert_eq!(fetch_u32_at(&unit, 0), 10);
        assert_eq!(fetch_u32_at(&unit, 5), 10);
        assert_eq!(fetch_u32_at(&unit, 10), 10);
    }

    #[test]
    fn test_backward_reference_written_directly() {
        let mut unit = CompilationUnit::new();
        let mut writer = CodeWriter::new(&mut unit);

        writer.emit_u8(0x01);
        let label = writer.create_and_define_label();
        writer.emit_u8(0x02);
        writer.emit_label(label);
        assert_eq!(writer.pending_patches(), 0);
        writer.finish();

        assert_eq!(fetch_u32_at(&unit, 2), 1);
    }

    #[test]
    fn test_independent_labels_patch_independently() {
        let mut unit = CompilationUnit::new();
        let mut writer = CodeWriter::new(&mut unit);

        let a = writer.create_label();
        let b = writer.create_label();
        writer.emit_label(a); // at 0
        writer.emit_label(b); // at 4

        writer.define_label(a); // offset 8
        assert_eq!(writer.pending_patches(), 1);
        writer.emit_u8(0xFF);
        writer.define_label(b); // offset 9
        writer.finish();

        assert_eq!(fetch_u32_at(&unit, 0), 8);
        assert_eq!(fetch_u32_at(&unit, 4), 9);
    }

    #[test]
    fn test_labels_are_ordered() {
        let mut unit = CompilationUnit::new();
        let mut writer = CodeWriter::new(&mut unit);
        let a = writer.create_label();
        let b = writer.create_label();
        assert!(a < b);
        assert_ne!(a, b);
    }

    #[test]
    #[should_panic(expected = "defined twice")]
    #[cfg(debug_assertions)]
    fn test_double_define_panics() {
        let mut unit = CompilationUnit::new();
        let mut writer = CodeWriter::new(&mut unit);
        let label = writer.create_label();
        writer.define_label(label);
        writer.define_label(label);
    }

    #[test]
    #[should_panic(expected = "unresolved label")]
    #[cfg(debug_assertions)]
    fn test_finish_with_pending_patch_panics() {
        let mut unit = CompilationUnit::new();
        let mut writer = CodeWriter::new(&mut unit);
        let label = writer.create_label();
        writer.emit_label(label);
        writer.finish();
    }

    #[test]
    fn test_patch_round_trip_through_reader() {
        // References emitted both before and after definition must decode to
        // the exact offset at which the label was defined.
        let mut unit = CompilationUnit::new();
        let mut writer = CodeWriter::new(&mut unit);

        let label = writer.create_label();
        writer.emit_label(label);
        writer.emit_label(label);
        writer.define_label(label);
        let defined_at = writer.offset();
        writer.emit_label(label);
        writer.finish();

        let mut reader = CodeReader::new(&unit);
        assert_eq!(reader.fetch_u32().unwrap(), defined_at);
        assert_eq!(reader.fetch_u32().unwrap(), defined_at);
        assert_eq!(reader.fetch_u32().unwrap(), defined_at);
        assert!(reader.is_at_end());
    }

    #[test]
    fn test_string_encoding_layout() {
        let mut unit = CompilationUnit::new();
        let mut writer = CodeWriter::new(&mut unit);
        writer.emit_string("hi");
        writer.finish();

        assert_eq!(unit.code, vec![2, 0, 0, 0, b'h', b'i']);
    }

    #[test]
    fn test_emit_advances_offset() {
        let mut unit = CompilationUnit::new();
        let mut writer = CodeWriter::new(&mut unit);
        assert_eq!(writer.offset(), 0);
        writer.emit_u8(1);
        assert_eq!(writer.offset(), 1);
        writer.emit_u16(1);
        assert_eq!(writer.offset(), 3);
        writer.emit_u32(1);
        assert_eq!(writer.offset(), 7);
        writer.emit_number(1.0);
        assert_eq!(writer.offset(), 15);
        writer.finish();
    }
}

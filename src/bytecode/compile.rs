use std::collections::HashMap;

use log::debug;

use crate::ast::{BinaryOp, Expression, FunctionDecl, Program, Statement, UnaryOp};
use crate::bytecode::compile_error::CompileError;
use crate::bytecode::op::Instruction;
use crate::bytecode::scope::Scope;
use crate::bytecode::unit::{CompilationUnit, Function};
use crate::bytecode::writer::CodeWriter;

/// Lowers a parsed program into a [`CompilationUnit`].
///
/// All functions share one continuous byte stream, so entry points are
/// absolute offsets. Each function gets its own [`Scope`]; the shared
/// [`CodeWriter`] carries labels and patches across the whole unit.
pub struct Compiler;

impl Compiler {
    pub fn new() -> Self {
        Compiler
    }

    pub fn compile(self, program: &Program) -> Result<CompilationUnit, CompileError> {
        let mut unit = CompilationUnit::new();
        let mut functions: HashMap<String, Function> = HashMap::new();

        let mut writer = CodeWriter::new(&mut unit);
        for decl in &program.functions {
            if functions.contains_key(&decl.name) {
                return Err(CompileError::duplicate_function(&decl.name, &decl.span));
            }

            let function = FunctionCompiler::new(&mut writer).compile(decl)?;
            debug!(
                "compiled function '{}': entry {:04x}, {} local(s)",
                decl.name, function.entry_point, function.local_count
            );
            functions.insert(decl.name.clone(), function);
        }
        writer.finish();

        unit.functions = functions;
        Ok(unit)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-function state: the shared writer plus this function's scope.
struct FunctionCompiler<'w, 'u> {
    writer: &'w mut CodeWriter<'u>,
    scope: Scope,
}

impl<'w, 'u> FunctionCompiler<'w, 'u> {
    fn new(writer: &'w mut CodeWriter<'u>) -> Self {
        Self {
            writer,
            scope: Scope::new(),
        }
    }

    fn compile(mut self, decl: &FunctionDecl) -> Result<Function, CompileError> {
        // Parameter slots come first so the caller's calling convention can
        // rely on them: parameter i lives in slot i.
        for param in &decl.params {
            self.scope.declare(param);
        }

        let entry_point = self.writer.offset();
        self.writer.create_and_define_label();

        self.compile_block(&decl.body)?;

        // Implicit void return for fall-through control flow.
        self.writer.emit_instruction(&Instruction::Ret);

        Ok(Function {
            entry_point,
            local_count: self.scope.max_locals(),
        })
    }

    fn compile_block(&mut self, body: &[Statement]) -> Result<(), CompileError> {
        self.scope.enter();
        for statement in body {
            self.compile_statement(statement)?;
        }
        self.scope.leave();
        Ok(())
    }

    fn compile_statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match statement {
            Statement::Var { name, init } => {
                match init {
                    Some(expr) => self.compile_expression(expr)?,
                    None => self.writer.emit_instruction(&Instruction::PushVoid),
                }
                let slot = self.scope.declare(name);
                self.writer.emit_instruction(&Instruction::StoreLocal { slot });
            }

            Statement::Assign { name, value, span } => {
                let slot = self
                    .scope
                    .get(name)
                    .ok_or_else(|| CompileError::undefined_variable(name, span))?;
                self.compile_expression(value)?;
                self.writer.emit_instruction(&Instruction::StoreLocal { slot });
            }

            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                self.compile_expression(condition)?;
                let else_label = self.writer.create_label();
                self.writer.jump_false(else_label);

                self.compile_block(then_body)?;

                if else_body.is_empty() {
                    self.writer.define_label(else_label);
                } else {
                    let end_label = self.writer.create_label();
                    self.writer.jump(end_label);
                    self.writer.define_label(else_label);
                    self.compile_block(else_body)?;
                    self.writer.define_label(end_label);
                }
            }

            Statement::While { condition, body } => {
                let top = self.writer.create_and_define_label();
                self.compile_expression(condition)?;
                let exit = self.writer.create_label();
                self.writer.jump_false(exit);

                self.compile_block(body)?;
                self.writer.jump(top);
                self.writer.define_label(exit);
            }

            Statement::Return { value } => match value {
                Some(expr) => {
                    self.compile_expression(expr)?;
                    self.writer.emit_instruction(&Instruction::RetVal);
                }
                None => self.writer.emit_instruction(&Instruction::Ret),
            },

            Statement::Expr { expr } => {
                self.compile_expression(expr)?;
                self.writer.emit_instruction(&Instruction::Pop);
            }

            Statement::Block { body } => {
                self.compile_block(body)?;
            }
        }

        Ok(())
    }

    fn compile_expression(&mut self, expression: &Expression) -> Result<(), CompileError> {
        match expression {
            Expression::Number(value) => {
                self.writer
                    .emit_instruction(&Instruction::PushNum { value: *value });
            }

            Expression::String(value) => {
                self.writer.emit_instruction(&Instruction::PushStr {
                    value: value.clone(),
                });
            }

            Expression::Bool(true) => self.writer.emit_instruction(&Instruction::PushTrue),
            Expression::Bool(false) => self.writer.emit_instruction(&Instruction::PushFalse),

            Expression::Variable { name, span } => {
                let slot = self
                    .scope
                    .get(name)
                    .ok_or_else(|| CompileError::undefined_variable(name, span))?;
                self.writer.emit_instruction(&Instruction::LoadLocal { slot });
            }

            Expression::Unary { op, operand } => {
                self.compile_expression(operand)?;
                let instruction = match op {
                    UnaryOp::Negate => Instruction::Negate,
                    UnaryOp::Not => Instruction::Not,
                };
                self.writer.emit_instruction(&instruction);
            }

            Expression::Binary { op, lhs, rhs } => {
                self.compile_expression(lhs)?;
                self.compile_expression(rhs)?;
                let instruction = match op {
                    BinaryOp::Add => Instruction::Add,
                    BinaryOp::Sub => Instruction::Sub,
                    BinaryOp::Mul => Instruction::Mul,
                    BinaryOp::Div => Instruction::Div,
                    BinaryOp::Mod => Instruction::Mod,
                    BinaryOp::Eq => Instruction::CmpEq,
                    BinaryOp::Ne => Instruction::CmpNe,
                    BinaryOp::Lt => Instruction::CmpLt,
                    BinaryOp::Gt => Instruction::CmpGt,
                    BinaryOp::Le => Instruction::CmpLe,
                    BinaryOp::Ge => Instruction::CmpGe,
                    BinaryOp::And => Instruction::And,
                    BinaryOp::Or => Instruction::Or,
                };
                self.writer.emit_instruction(&instruction);
            }

            Expression::Call { name, args, span } => {
                let argc = u8::try_from(args.len())
                    .map_err(|_| CompileError::too_many_arguments(name, args.len(), span))?;
                for arg in args {
                    self.compile_expression(arg)?;
                }
                self.writer.emit_instruction(&Instruction::Call {
                    name: name.clone(),
                    argc,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::reader::CodeReader;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn compile_source(source: &str) -> CompilationUnit {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        Compiler::new().compile(&program).unwrap()
    }

    fn compile_source_err(source: &str) -> CompileError {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        Compiler::new().compile(&program).unwrap_err()
    }

    /// Decodes the whole stream into (offset, instruction) pairs.
    fn decode_all(unit: &CompilationUnit) -> Vec<(u32, Instruction)> {
        let mut reader = CodeReader::new(unit);
        let mut decoded = Vec::new();
        while !reader.is_at_end() {
            let offset = reader.offset() as u32;
            decoded.push((offset, reader.fetch_instruction().unwrap()));
        }
        decoded
    }

    #[test]
    fn test_two_locals_in_one_scope() {
        let unit = compile_source("function f() { var a = 1; var b = 2; }");

        let f = unit.functions["f"];
        assert_eq!(f.entry_point, 0);
        assert_eq!(f.local_count, 2);

        let stores: Vec<_> = decode_all(&unit)
            .into_iter()
            .filter_map(|(_, i)| match i {
                Instruction::StoreLocal { slot } => Some(slot),
                _ => None,
            })
            .collect();
        assert_eq!(stores, vec![0, 1]);
    }

    #[test]
    fn test_if_else_scenario() {
        let unit =
            compile_source("function f(x) { if (x) { return 1; } else { return 2; } }");

        let f = unit.functions["f"];
        assert_eq!(f.entry_point, 0);
        assert_eq!(f.local_count, 1);

        let decoded = decode_all(&unit);

        // Exactly one conditional branch.
        let branches: Vec<_> = decoded
            .iter()
            .filter_map(|(_, i)| match i {
                Instruction::JumpFalse { target } => Some(*target),
                _ => None,
            })
            .collect();
        assert_eq!(branches.len(), 1);

        // Its patched target is the first instruction of the else branch:
        // the instruction right after the then-branch's unconditional jump.
        let jump_index = decoded
            .iter()
            .position(|(_, i)| matches!(i, Instruction::Jump { .. }))
            .unwrap();
        let else_offset = decoded[jump_index + 1].0;
        assert_eq!(branches[0], else_offset);
        assert!(matches!(
            decoded[jump_index + 1].1,
            Instruction::PushNum { value } if value == 2.0
        ));
    }

    #[test]
    fn test_while_jumps_both_directions() {
        let unit = compile_source("function f() { while (true) { f(); } }");
        let decoded = decode_all(&unit);

        let entry = unit.functions["f"].entry_point;

        // Backward jump returns to the condition at the function entry.
        let back_target = decoded
            .iter()
            .find_map(|(_, i)| match i {
                Instruction::Jump { target } => Some(*target),
                _ => None,
            })
            .unwrap();
        assert_eq!(back_target, entry);

        // Forward branch exits to the implicit Ret after the loop.
        let exit_target = decoded
            .iter()
            .find_map(|(_, i)| match i {
                Instruction::JumpFalse { target } => Some(*target),
                _ => None,
            })
            .unwrap();
        let (ret_offset, ret) = decoded.last().unwrap();
        assert!(matches!(ret, Instruction::Ret));
        assert_eq!(exit_target, *ret_offset);
    }

    #[test]
    fn test_sibling_blocks_reuse_slots() {
        let unit = compile_source("function f() { { var a = 1; } { var b = 2; } }");

        assert_eq!(unit.functions["f"].local_count, 1);

        let stores: Vec<_> = decode_all(&unit)
            .into_iter()
            .filter_map(|(_, i)| match i {
                Instruction::StoreLocal { slot } => Some(slot),
                _ => None,
            })
            .collect();
        assert_eq!(stores, vec![0, 0]);
    }

    #[test]
    fn test_parameter_shadowed_by_local() {
        let unit = compile_source("function f(x) { var x = 2; return x; }");

        // Parameter in slot 0, shadowing local in slot 1.
        assert_eq!(unit.functions["f"].local_count, 2);

        let decoded = decode_all(&unit);
        assert!(decoded
            .iter()
            .any(|(_, i)| matches!(i, Instruction::StoreLocal { slot: 1 })));
        assert!(decoded
            .iter()
            .any(|(_, i)| matches!(i, Instruction::LoadLocal { slot: 1 })));
    }

    #[test]
    fn test_multiple_functions_share_one_stream() {
        let unit = compile_source(
            "function one() { return 1; } function two() { return 2; }",
        );

        let one = unit.functions["one"];
        let two = unit.functions["two"];
        assert_eq!(one.entry_point, 0);
        assert!(two.entry_point > one.entry_point);

        // The second entry point falls on an instruction boundary.
        let decoded = decode_all(&unit);
        assert!(decoded.iter().any(|(offset, _)| *offset == two.entry_point));
    }

    #[test]
    fn test_expression_statement_pops_result() {
        let unit = compile_source("function f() { 1 + 2; }");
        let decoded: Vec<_> = decode_all(&unit).into_iter().map(|(_, i)| i).collect();

        assert_eq!(
            decoded,
            vec![
                Instruction::PushNum { value: 1.0 },
                Instruction::PushNum { value: 2.0 },
                Instruction::Add,
                Instruction::Pop,
                Instruction::Ret,
            ]
        );
    }

    #[test]
    fn test_call_arguments_in_order() {
        let unit = compile_source(
            "function g(a, b) { return a - b; } function f() { return g(1, 2); }",
        );
        let decoded: Vec<_> = decode_all(&unit).into_iter().map(|(_, i)| i).collect();

        let call_index = decoded
            .iter()
            .position(|i| matches!(i, Instruction::Call { .. }))
            .unwrap();
        assert_eq!(
            decoded[call_index],
            Instruction::Call {
                name: "g".to_string(),
                argc: 2
            }
        );
        assert_eq!(
            decoded[call_index - 2],
            Instruction::PushNum { value: 1.0 }
        );
        assert_eq!(
            decoded[call_index - 1],
            Instruction::PushNum { value: 2.0 }
        );
    }

    #[test]
    fn test_var_without_initializer_pushes_void() {
        let unit = compile_source("function f() { var x; }");
        let decoded: Vec<_> = decode_all(&unit).into_iter().map(|(_, i)| i).collect();
        assert_eq!(decoded[0], Instruction::PushVoid);
        assert_eq!(decoded[1], Instruction::StoreLocal { slot: 0 });
    }

    #[test]
    fn test_undefined_variable_reported() {
        let err = compile_source_err("function f() { return missing; }");
        assert!(matches!(
            err,
            CompileError::UndefinedVariable { ref name, .. } if name == "missing"
        ));
    }

    #[test]
    fn test_undefined_assignment_target_reported() {
        let err = compile_source_err("function f() { missing = 1; }");
        assert!(matches!(err, CompileError::UndefinedVariable { .. }));
    }

    #[test]
    fn test_local_not_visible_after_block() {
        let err = compile_source_err("function f() { { var a = 1; } return a; }");
        assert!(matches!(
            err,
            CompileError::UndefinedVariable { ref name, .. } if name == "a"
        ));
    }

    #[test]
    fn test_duplicate_function_reported() {
        let err = compile_source_err("function f() { } function f() { }");
        assert!(matches!(
            err,
            CompileError::DuplicateFunction { ref name, .. } if name == "f"
        ));
    }

    #[test]
    fn test_unary_and_logic_lowering() {
        let unit = compile_source("function f(x) { return not x and -x; }");
        let decoded: Vec<_> = decode_all(&unit).into_iter().map(|(_, i)| i).collect();
        assert!(decoded.contains(&Instruction::Not));
        assert!(decoded.contains(&Instruction::Negate));
        assert!(decoded.contains(&Instruction::And));
    }
}

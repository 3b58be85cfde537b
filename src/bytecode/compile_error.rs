use crate::lexer::Span;

/// Semantic errors detected while lowering the AST to bytecode.
///
/// These are expected, user-facing outcomes (the source program is wrong),
/// distinct from assembler contract violations, which indicate compiler bugs
/// and are checked with `debug_assert!` in the writer.
#[derive(Debug, Clone)]
pub enum CompileError {
    /// A variable reference that no active scope declares
    UndefinedVariable {
        name: String,
        line: usize,
        col: usize,
    },
    /// Two functions with the same name
    DuplicateFunction {
        name: String,
        line: usize,
        col: usize,
    },
    /// A call with more arguments than the instruction encoding can carry
    TooManyArguments {
        name: String,
        count: usize,
        line: usize,
        col: usize,
    },
}

impl CompileError {
    pub fn undefined_variable(name: &str, span: &Span) -> Self {
        CompileError::UndefinedVariable {
            name: name.to_string(),
            line: span.line,
            col: span.col,
        }
    }

    pub fn duplicate_function(name: &str, span: &Span) -> Self {
        CompileError::DuplicateFunction {
            name: name.to_string(),
            line: span.line,
            col: span.col,
        }
    }

    pub fn too_many_arguments(name: &str, count: usize, span: &Span) -> Self {
        CompileError::TooManyArguments {
            name: name.to_string(),
            count,
            line: span.line,
            col: span.col,
        }
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::UndefinedVariable { name, line, col } => {
                write!(f, "{}:{}: undefined variable '{}'", line, col, name)
            }
            CompileError::DuplicateFunction { name, line, col } => {
                write!(f, "{}:{}: duplicate function '{}'", line, col, name)
            }
            CompileError::TooManyArguments {
                name,
                count,
                line,
                col,
            } => {
                write!(
                    f,
                    "{}:{}: call to '{}' has {} arguments, at most {} are supported",
                    line,
                    col,
                    name,
                    count,
                    u8::MAX
                )
            }
        }
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span { line: 3, col: 7 }
    }

    #[test]
    fn test_undefined_variable_display() {
        let err = CompileError::undefined_variable("speed", &span());
        let msg = err.to_string();
        assert!(msg.contains("3:7"));
        assert!(msg.contains("undefined variable"));
        assert!(msg.contains("speed"));
    }

    #[test]
    fn test_duplicate_function_display() {
        let err = CompileError::duplicate_function("main", &span());
        let msg = err.to_string();
        assert!(msg.contains("duplicate function"));
        assert!(msg.contains("main"));
    }

    #[test]
    fn test_too_many_arguments_display() {
        let err = CompileError::too_many_arguments("f", 300, &span());
        let msg = err.to_string();
        assert!(msg.contains("300"));
        assert!(msg.contains("255"));
    }

    #[test]
    fn test_error_implements_std_error() {
        let err = CompileError::undefined_variable("x", &span());
        let _: &dyn std::error::Error = &err;
    }
}

use crate::lexer::Span;

/// A parsed program: a flat sequence of function declarations.
#[derive(Debug, Clone)]
pub struct Program {
    pub functions: Vec<FunctionDecl>,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Statement {
    /// `var name;` or `var name = init;`
    Var {
        name: String,
        init: Option<Expression>,
    },
    /// `name = value;`
    Assign {
        name: String,
        value: Expression,
        span: Span,
    },
    If {
        condition: Expression,
        then_body: Vec<Statement>,
        else_body: Vec<Statement>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    Return {
        value: Option<Expression>,
    },
    /// Expression evaluated for its side effect; result is discarded.
    Expr { expr: Expression },
    /// A bare `{ ... }` block opening a nested scope.
    Block { body: Vec<Statement> },
}

#[derive(Debug, Clone)]
pub enum Expression {
    Number(f64),
    String(String),
    Bool(bool),
    Variable {
        name: String,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Call {
        name: String,
        args: Vec<Expression>,
        span: Span,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

use crate::ast::{BinaryOp, Expression, FunctionDecl, Program, Statement, UnaryOp};
use crate::lexer::{Span, Spanned};
use crate::parser_error::ParserError;
use crate::token::Token;

/// Recursive-descent parser for Cinder.
///
/// The parser consumes a stream of lexed `Spanned` tokens and produces a
/// `Program`: a flat list of `function` declarations, each with a statement
/// body.
///
/// Notes:
/// - Comments are filtered out in `Parser::new`.
/// - Binary expressions are parsed with one method per precedence level,
///   lowest (`or`) to highest (unary), all left-associative.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Span of the most recently consumed token.
    ///
    /// Used to provide stable source locations for errors that occur after
    /// advancing past the last token or at end-of-file.
    last_span: Option<Span>,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        let tokens: Vec<Spanned> = tokens
            .into_iter()
            .filter(|t| !matches!(t.token, Token::Comment(_)))
            .collect();
        Parser {
            tokens,
            pos: 0,
            last_span: None,
        }
    }

    fn current(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Spanned> {
        let token = self.tokens.get(self.pos);
        if let Some(s) = token {
            self.last_span = Some(s.span.clone());
        }
        self.pos += 1;
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|s| &s.token)
    }

    /// Constructs a `ParserError` at the most relevant location.
    fn error(&self, message: &str) -> ParserError {
        if let Some(spanned) = self.current() {
            ParserError {
                message: message.to_string(),
                line: spanned.span.line,
                col: spanned.span.col,
            }
        } else if let Some(span) = &self.last_span {
            ParserError {
                message: message.to_string(),
                line: span.line,
                col: span.col,
            }
        } else {
            ParserError {
                message: message.to_string(),
                line: 1,
                col: 1,
            }
        }
    }

    fn span(&self) -> Span {
        self.current()
            .map(|s| s.span.clone())
            .or_else(|| self.last_span.clone())
            .unwrap_or(Span { line: 1, col: 1 })
    }

    fn expect(&mut self, expected: &Token, context: &str) -> Result<(), ParserError> {
        match self.peek() {
            Some(token) if token == expected => {
                self.advance();
                Ok(())
            }
            Some(token) => {
                let message = format!("expected '{}' {}, found '{}'", expected, context, token);
                Err(self.error(&message))
            }
            None => Err(self.error(&format!("expected '{}' {}", expected, context))),
        }
    }

    fn expect_ident(&mut self, context: &str) -> Result<String, ParserError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            Some(token) => {
                let message = format!("expected identifier {}, found '{}'", context, token);
                Err(self.error(&message))
            }
            None => Err(self.error(&format!("expected identifier {}", context))),
        }
    }

    /// Parses a complete Cinder program: zero or more function declarations.
    pub fn parse(&mut self) -> Result<Program, ParserError> {
        let mut functions = Vec::new();

        while let Some(spanned) = self.current() {
            match spanned.token {
                Token::Eof => break,
                Token::Function => functions.push(self.parse_function()?),
                _ => {
                    return Err(self.error("expected 'function' at top level"));
                }
            }
        }

        Ok(Program { functions })
    }

    fn parse_function(&mut self) -> Result<FunctionDecl, ParserError> {
        self.expect(&Token::Function, "to start a declaration")?;

        let span = self.span();
        let name = self.expect_ident("after 'function'")?;

        self.expect(&Token::LParen, "after function name")?;
        let mut params = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                params.push(self.expect_ident("in parameter list")?);
                if self.peek() == Some(&Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RParen, "after parameter list")?;

        let body = self.parse_block()?;

        Ok(FunctionDecl {
            name,
            params,
            body,
            span,
        })
    }

    fn parse_block(&mut self) -> Result<Vec<Statement>, ParserError> {
        self.expect(&Token::LBrace, "to open a block")?;

        let mut statements = Vec::new();
        loop {
            match self.peek() {
                Some(Token::RBrace) => {
                    self.advance();
                    return Ok(statements);
                }
                Some(Token::Eof) | None => {
                    return Err(self.error("unexpected end of input inside block"));
                }
                _ => statements.push(self.parse_statement()?),
            }
        }
    }

    fn parse_statement(&mut self) -> Result<Statement, ParserError> {
        match self.peek() {
            Some(Token::Var) => self.parse_var(),
            Some(Token::If) => self.parse_if(),
            Some(Token::While) => self.parse_while(),
            Some(Token::Return) => self.parse_return(),
            Some(Token::LBrace) => {
                let body = self.parse_block()?;
                Ok(Statement::Block { body })
            }
            Some(Token::Ident(_)) if self.peek_next() == Some(&Token::Assign) => {
                let span = self.span();
                let name = self.expect_ident("in assignment")?;
                self.advance(); // '='
                let value = self.parse_expression()?;
                self.expect(&Token::Semicolon, "after assignment")?;
                Ok(Statement::Assign { name, value, span })
            }
            _ => {
                let expr = self.parse_expression()?;
                self.expect(&Token::Semicolon, "after expression")?;
                Ok(Statement::Expr { expr })
            }
        }
    }

    fn parse_var(&mut self) -> Result<Statement, ParserError> {
        self.advance(); // 'var'
        let name = self.expect_ident("after 'var'")?;

        let init = if self.peek() == Some(&Token::Assign) {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };

        self.expect(&Token::Semicolon, "after variable declaration")?;
        Ok(Statement::Var { name, init })
    }

    fn parse_if(&mut self) -> Result<Statement, ParserError> {
        self.advance(); // 'if'
        self.expect(&Token::LParen, "after 'if'")?;
        let condition = self.parse_expression()?;
        self.expect(&Token::RParen, "after condition")?;

        let then_body = self.parse_block()?;

        let else_body = if self.peek() == Some(&Token::Else) {
            self.advance();
            if self.peek() == Some(&Token::If) {
                // `else if` chains become a nested If statement
                vec![self.parse_if()?]
            } else {
                self.parse_block()?
            }
        } else {
            Vec::new()
        };

        Ok(Statement::If {
            condition,
            then_body,
            else_body,
        })
    }

    fn parse_while(&mut self) -> Result<Statement, ParserError> {
        self.advance(); // 'while'
        self.expect(&Token::LParen, "after 'while'")?;
        let condition = self.parse_expression()?;
        self.expect(&Token::RParen, "after condition")?;
        let body = self.parse_block()?;
        Ok(Statement::While { condition, body })
    }

    fn parse_return(&mut self) -> Result<Statement, ParserError> {
        self.advance(); // 'return'

        let value = if self.peek() == Some(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };

        self.expect(&Token::Semicolon, "after 'return'")?;
        Ok(Statement::Return { value })
    }

    // ── expressions, lowest precedence first ──────────────────────────

    pub fn parse_expression(&mut self) -> Result<Expression, ParserError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expression, ParserError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expression::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expression, ParserError> {
        let mut lhs = self.parse_equality()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expression::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expression, ParserError> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::Ne,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = Expression::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_comparison(&mut self) -> Result<Expression, ParserError> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::LtEq) => BinaryOp::Le,
                Some(Token::GtEq) => BinaryOp::Ge,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = Expression::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_term(&mut self) -> Result<Expression, ParserError> {
        let mut lhs = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_factor()?;
            lhs = Expression::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_factor(&mut self) -> Result<Expression, ParserError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expression::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expression, ParserError> {
        let op = match self.peek() {
            Some(Token::Minus) => Some(UnaryOp::Negate),
            Some(Token::Not) => Some(UnaryOp::Not),
            _ => None,
        };

        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expression::Unary {
                op,
                operand: Box::new(operand),
            });
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression, ParserError> {
        let span = self.span();
        match self.peek().cloned() {
            Some(Token::Number(n)) => {
                self.advance();
                Ok(Expression::Number(n))
            }
            Some(Token::String(s)) => {
                self.advance();
                Ok(Expression::String(s))
            }
            Some(Token::True) => {
                self.advance();
                Ok(Expression::Bool(true))
            }
            Some(Token::False) => {
                self.advance();
                Ok(Expression::Bool(false))
            }
            Some(Token::LParen) => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&Token::RParen, "to close a grouping")?;
                Ok(expr)
            }
            Some(Token::Ident(name)) => {
                self.advance();
                if self.peek() == Some(&Token::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.parse_expression()?);
                            if self.peek() == Some(&Token::Comma) {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RParen, "after call arguments")?;
                    Ok(Expression::Call { name, args, span })
                } else {
                    Ok(Expression::Variable { name, span })
                }
            }
            Some(token) => Err(self.error(&format!("unexpected token '{}' in expression", token))),
            None => Err(self.error("unexpected end of input in expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> Program {
        let tokens = Lexer::new(source).tokenize().unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    fn parse_err(source: &str) -> ParserError {
        let tokens = Lexer::new(source).tokenize().unwrap();
        Parser::new(tokens).parse().unwrap_err()
    }

    #[test]
    fn test_empty_program() {
        let program = parse("");
        assert!(program.functions.is_empty());
    }

    #[test]
    fn test_function_with_params() {
        let program = parse("function add(a, b) { return a + b; }");
        assert_eq!(program.functions.len(), 1);
        let f = &program.functions[0];
        assert_eq!(f.name, "add");
        assert_eq!(f.params, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(f.body.len(), 1);
        assert!(matches!(f.body[0], Statement::Return { value: Some(_) }));
    }

    #[test]
    fn test_precedence() {
        let program = parse("function f() { return 1 + 2 * 3; }");
        let Statement::Return { value: Some(expr) } = &program.functions[0].body[0] else {
            panic!("expected return");
        };
        // `+` at the root, `*` nested on the right
        let Expression::Binary { op, rhs, .. } = expr else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            **rhs,
            Expression::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_else_if_chain() {
        let program = parse(
            "function f(x) { if (x < 1) { return 1; } else if (x < 2) { return 2; } else { return 3; } }",
        );
        let Statement::If { else_body, .. } = &program.functions[0].body[0] else {
            panic!("expected if");
        };
        assert_eq!(else_body.len(), 1);
        assert!(matches!(else_body[0], Statement::If { .. }));
    }

    #[test]
    fn test_assignment_vs_expression() {
        let program = parse("function f(x) { x = 1; f(x); }");
        let body = &program.functions[0].body;
        assert!(matches!(body[0], Statement::Assign { .. }));
        assert!(matches!(body[1], Statement::Expr { .. }));
    }

    #[test]
    fn test_var_without_initializer() {
        let program = parse("function f() { var x; }");
        assert!(matches!(
            program.functions[0].body[0],
            Statement::Var { init: None, .. }
        ));
    }

    #[test]
    fn test_missing_semicolon() {
        let err = parse_err("function f() { return 1 }");
        assert!(err.message.contains(";"));
    }

    #[test]
    fn test_top_level_statement_rejected() {
        let err = parse_err("var x = 1;");
        assert!(err.message.contains("function"));
    }

    #[test]
    fn test_unexpected_eof_in_block() {
        let err = parse_err("function f() { return 1;");
        assert!(err.message.contains("end of input"));
    }
}

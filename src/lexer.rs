use crate::token::Token;

#[derive(Debug, Clone)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

#[derive(Debug)]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

impl std::fmt::Display for LexerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.message)
    }
}

impl std::error::Error for LexerError {}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    fn error(&self, message: impl Into<String>) -> LexerError {
        LexerError {
            message: message.into(),
            line: self.line,
            col: self.col,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_comment(&mut self) -> Token {
        // Caller has seen "//"; consume both slashes and the rest of the line.
        self.advance();
        self.advance();
        let mut comment = String::new();
        while let Some(ch) = self.current() {
            if ch == '\n' {
                break;
            }
            comment.push(ch);
            self.advance();
        }
        Token::Comment(comment.trim().to_string())
    }

    fn read_string(&mut self) -> Result<Token, LexerError> {
        let start_line = self.line;
        let start_col = self.col;
        self.advance();

        let mut string = String::new();
        loop {
            match self.current() {
                Some('"') => {
                    self.advance();
                    return Ok(Token::String(string));
                }
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        Some('n') => string.push('\n'),
                        Some('t') => string.push('\t'),
                        Some('r') => string.push('\r'),
                        Some('\\') => string.push('\\'),
                        Some('"') => string.push('"'),
                        Some(ch) => {
                            return Err(self.error(format!("unknown escape sequence: \\{}", ch)));
                        }
                        None => {
                            return Err(self.error("unexpected EOF in escape sequence"));
                        }
                    }
                    self.advance();
                }
                Some(ch) => {
                    string.push(ch);
                    self.advance();
                }
                None => {
                    return Err(LexerError {
                        message: "unterminated string literal".to_string(),
                        line: start_line,
                        col: start_col,
                    });
                }
            }
        }
    }

    fn read_number(&mut self) -> Result<Token, LexerError> {
        let start_line = self.line;
        let start_col = self.col;

        let mut digits = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        // Fractional part: only if a digit follows the dot
        if self.current() == Some('.') && self.peek().is_some_and(|c| c.is_ascii_digit()) {
            digits.push('.');
            self.advance();
            while let Some(ch) = self.current() {
                if ch.is_ascii_digit() {
                    digits.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }
        }

        digits.parse::<f64>().map(Token::Number).map_err(|_| LexerError {
            message: format!("invalid number literal: {}", digits),
            line: start_line,
            col: start_col,
        })
    }

    fn read_word(&mut self) -> Token {
        let mut word = String::new();
        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' {
                word.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match word.as_str() {
            "function" => Token::Function,
            "var" => Token::Var,
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "return" => Token::Return,
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "true" => Token::True,
            "false" => Token::False,
            _ => Token::Ident(word),
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();

            let span = self.span();
            let token = match self.current() {
                None => {
                    tokens.push(Spanned {
                        token: Token::Eof,
                        span,
                    });
                    return Ok(tokens);
                }
                Some('/') if self.peek() == Some('/') => self.read_comment(),
                Some('"') => self.read_string()?,
                Some(ch) if ch.is_ascii_digit() => self.read_number()?,
                Some(ch) if ch.is_alphabetic() || ch == '_' => self.read_word(),
                Some(ch) => {
                    let token = match ch {
                        '+' => Token::Plus,
                        '-' => Token::Minus,
                        '*' => Token::Star,
                        '/' => Token::Slash,
                        '%' => Token::Percent,
                        '(' => Token::LParen,
                        ')' => Token::RParen,
                        '{' => Token::LBrace,
                        '}' => Token::RBrace,
                        ',' => Token::Comma,
                        ';' => Token::Semicolon,
                        '=' => {
                            if self.peek() == Some('=') {
                                self.advance();
                                Token::EqEq
                            } else {
                                Token::Assign
                            }
                        }
                        '!' => {
                            if self.peek() == Some('=') {
                                self.advance();
                                Token::NotEq
                            } else {
                                return Err(self.error("unexpected character: !"));
                            }
                        }
                        '<' => {
                            if self.peek() == Some('=') {
                                self.advance();
                                Token::LtEq
                            } else {
                                Token::Lt
                            }
                        }
                        '>' => {
                            if self.peek() == Some('=') {
                                self.advance();
                                Token::GtEq
                            } else {
                                Token::Gt
                            }
                        }
                        other => {
                            return Err(self.error(format!("unexpected character: {}", other)));
                        }
                    };
                    self.advance();
                    token
                }
            };

            tokens.push(Spanned { token, span });
        }
    }
}

//! Lexer/Scanner for Marmot source code.

use crate::error::LexerError;
use crate::lexer::token::Token;

/// The lexer transforms source code into a stream of tokens.
pub struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
        }
    }

    /// Scan all tokens from the source.
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.scan_token()?;
            let is_eof = token == Token::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    /// Scan the next token.
    fn scan_token(&mut self) -> Result<Token, LexerError> {
        self.skip_whitespace();

        let Some(c) = self.advance() else {
            return Ok(Token::Eof);
        };

        match c {
            '(' => Ok(Token::LeftParen),
            ')' => Ok(Token::RightParen),
            '{' => Ok(Token::LeftBrace),
            '}' => Ok(Token::RightBrace),
            '[' => Ok(Token::LeftBracket),
            ']' => Ok(Token::RightBracket),
            ',' => Ok(Token::Comma),
            ';' => Ok(Token::Semicolon),
            ':' => Ok(Token::Colon),
            '+' => Ok(Token::Plus),
            '-' => Ok(Token::Minus),
            '*' => Ok(Token::Star),
            '/' => Ok(Token::Slash),
            '<' => Ok(Token::Less),
            '>' => Ok(Token::Greater),
            '=' => {
                if self.match_char('=') {
                    Ok(Token::EqualEqual)
                } else {
                    Ok(Token::Assign)
                }
            }
            '!' => {
                if self.match_char('=') {
                    Ok(Token::BangEqual)
                } else {
                    Ok(Token::Bang)
                }
            }
            '"' => self.scan_string(),
            c if c.is_ascii_digit() => self.scan_number(c),
            c if is_identifier_start(c) => Ok(self.scan_identifier(c)),
            c => Err(LexerError::UnexpectedChar(c)),
        }
    }

    fn scan_string(&mut self) -> Result<Token, LexerError> {
        let mut value = String::new();

        loop {
            match self.advance() {
                Some('"') => return Ok(Token::StringLiteral(value)),
                Some(c) => value.push(c),
                None => return Err(LexerError::UnterminatedString),
            }
        }
    }

    fn scan_number(&mut self, first: char) -> Result<Token, LexerError> {
        let mut literal = String::from(first);

        while let Some(&c) = self.chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            literal.push(c);
            self.advance();
        }

        literal
            .parse::<i64>()
            .map(Token::IntLiteral)
            .map_err(|_| LexerError::InvalidInteger(literal))
    }

    fn scan_identifier(&mut self, first: char) -> Token {
        let mut ident = String::from(first);

        while let Some(&c) = self.chars.peek() {
            if !is_identifier_continue(c) {
                break;
            }
            ident.push(c);
            self.advance();
        }

        Token::keyword(&ident).unwrap_or(Token::Identifier(ident))
    }

    fn skip_whitespace(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn advance(&mut self) -> Option<char> {
        self.chars.next()
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.advance();
            true
        } else {
            false
        }
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

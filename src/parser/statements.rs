//! Statement parsing: let, return, blocks, expression statements.

use crate::ast::{BlockStatement, Expr, Stmt};
use crate::lexer::Token;
use crate::parser::core::{ParseResult, Parser};
use crate::parser::precedence::Precedence;

impl Parser {
    pub(crate) fn parse_statement(&mut self) -> ParseResult<Stmt> {
        match self.peek() {
            Token::Let => self.parse_let_statement(),
            Token::Return => self.parse_return_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_let_statement(&mut self) -> ParseResult<Stmt> {
        self.advance(); // let
        let name = self.expect_identifier()?;
        self.expect(&Token::Assign)?;

        let mut value = self.parse_expression(Precedence::Lowest)?;

        // A function literal bound to a name remembers it so the compiler
        // can resolve recursive self-references.
        if let Expr::Function(ref mut func) = value {
            func.name = name.clone();
        }

        self.match_token(&Token::Semicolon);
        Ok(Stmt::Let { name, value })
    }

    fn parse_return_statement(&mut self) -> ParseResult<Stmt> {
        self.advance(); // return
        let value = self.parse_expression(Precedence::Lowest)?;
        self.match_token(&Token::Semicolon);
        Ok(Stmt::Return(value))
    }

    fn parse_expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.parse_expression(Precedence::Lowest)?;
        self.match_token(&Token::Semicolon);
        Ok(Stmt::Expression(expr))
    }

    pub(crate) fn parse_block_statement(&mut self) -> ParseResult<BlockStatement> {
        let mut statements = Vec::new();

        while !self.check(&Token::RightBrace) && !self.is_at_end() {
            statements.push(self.parse_statement()?);
        }

        self.expect(&Token::RightBrace)?;
        Ok(BlockStatement::new(statements))
    }
}

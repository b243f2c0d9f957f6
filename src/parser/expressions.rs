//! Expression parsing using Pratt precedence.

use crate::ast::{Expr, FunctionLiteral, InfixOp, PrefixOp};
use crate::error::ParserError;
use crate::lexer::Token;
use crate::parser::core::{ParseResult, Parser};
use crate::parser::precedence::{get_precedence, Precedence};

impl Parser {
    pub(crate) fn parse_expression(&mut self, precedence: Precedence) -> ParseResult<Expr> {
        let mut left = self.parse_prefix()?;

        while precedence < get_precedence(self.peek()) {
            left = self.parse_infix(left)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> ParseResult<Expr> {
        if self.is_at_end() {
            return Err(ParserError::UnexpectedEof);
        }

        match self.advance() {
            Token::IntLiteral(value) => Ok(Expr::IntegerLiteral(value)),
            Token::StringLiteral(value) => Ok(Expr::StringLiteral(value)),
            Token::True => Ok(Expr::Boolean(true)),
            Token::False => Ok(Expr::Boolean(false)),
            Token::Identifier(name) => Ok(Expr::Identifier(name)),
            Token::Bang => self.parse_prefix_operator(PrefixOp::Bang),
            Token::Minus => self.parse_prefix_operator(PrefixOp::Minus),
            Token::LeftParen => {
                let expr = self.parse_expression(Precedence::Lowest)?;
                self.expect(&Token::RightParen)?;
                Ok(expr)
            }
            Token::If => self.parse_if_expression(),
            Token::Fn => self.parse_function_literal(),
            Token::LeftBracket => {
                let elements = self.parse_expression_list(&Token::RightBracket)?;
                Ok(Expr::Array(elements))
            }
            Token::LeftBrace => self.parse_hash_literal(),
            other => Err(ParserError::NoPrefixRule(other.to_string())),
        }
    }

    fn parse_infix(&mut self, left: Expr) -> ParseResult<Expr> {
        match self.advance() {
            Token::Plus => self.parse_infix_operator(InfixOp::Add, left),
            Token::Minus => self.parse_infix_operator(InfixOp::Sub, left),
            Token::Star => self.parse_infix_operator(InfixOp::Mul, left),
            Token::Slash => self.parse_infix_operator(InfixOp::Div, left),
            Token::Less => self.parse_infix_operator(InfixOp::Less, left),
            Token::Greater => self.parse_infix_operator(InfixOp::Greater, left),
            Token::EqualEqual => self.parse_infix_operator(InfixOp::Equal, left),
            Token::BangEqual => self.parse_infix_operator(InfixOp::NotEqual, left),
            Token::LeftParen => {
                let arguments = self.parse_expression_list(&Token::RightParen)?;
                Ok(Expr::Call {
                    function: Box::new(left),
                    arguments,
                })
            }
            Token::LeftBracket => {
                let index = self.parse_expression(Precedence::Lowest)?;
                self.expect(&Token::RightBracket)?;
                Ok(Expr::Index {
                    left: Box::new(left),
                    index: Box::new(index),
                })
            }
            other => Err(ParserError::unexpected_token(
                "infix operator",
                other.to_string(),
            )),
        }
    }

    fn parse_prefix_operator(&mut self, operator: PrefixOp) -> ParseResult<Expr> {
        let right = self.parse_expression(Precedence::Unary)?;
        Ok(Expr::Prefix {
            operator,
            right: Box::new(right),
        })
    }

    fn parse_infix_operator(&mut self, operator: InfixOp, left: Expr) -> ParseResult<Expr> {
        let precedence = match operator {
            InfixOp::Equal | InfixOp::NotEqual => Precedence::Equality,
            InfixOp::Less | InfixOp::Greater => Precedence::Comparison,
            InfixOp::Add | InfixOp::Sub => Precedence::Term,
            InfixOp::Mul | InfixOp::Div => Precedence::Factor,
        };
        let right = self.parse_expression(precedence)?;
        Ok(Expr::Infix {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_if_expression(&mut self) -> ParseResult<Expr> {
        self.expect(&Token::LeftParen)?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect(&Token::RightParen)?;

        self.expect(&Token::LeftBrace)?;
        let consequence = self.parse_block_statement()?;

        let alternative = if self.match_token(&Token::Else) {
            self.expect(&Token::LeftBrace)?;
            Some(self.parse_block_statement()?)
        } else {
            None
        };

        Ok(Expr::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    fn parse_function_literal(&mut self) -> ParseResult<Expr> {
        self.expect(&Token::LeftParen)?;

        let mut parameters = Vec::new();
        if !self.check(&Token::RightParen) {
            parameters.push(self.expect_identifier()?);
            while self.match_token(&Token::Comma) {
                parameters.push(self.expect_identifier()?);
            }
        }
        self.expect(&Token::RightParen)?;

        self.expect(&Token::LeftBrace)?;
        let body = self.parse_block_statement()?;

        Ok(Expr::Function(FunctionLiteral {
            name: String::new(),
            parameters,
            body,
        }))
    }

    fn parse_hash_literal(&mut self) -> ParseResult<Expr> {
        let mut pairs = Vec::new();

        if !self.check(&Token::RightBrace) {
            loop {
                let key = self.parse_expression(Precedence::Lowest)?;
                self.expect(&Token::Colon)?;
                let value = self.parse_expression(Precedence::Lowest)?;
                pairs.push((key, value));

                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }

        self.expect(&Token::RightBrace)?;
        Ok(Expr::Hash(pairs))
    }

    fn parse_expression_list(&mut self, end: &Token) -> ParseResult<Vec<Expr>> {
        let mut items = Vec::new();

        if !self.check(end) {
            items.push(self.parse_expression(Precedence::Lowest)?);
            while self.match_token(&Token::Comma) {
                items.push(self.parse_expression(Precedence::Lowest)?);
            }
        }

        self.expect(end)?;
        Ok(items)
    }
}

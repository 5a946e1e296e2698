//! Pratt parser for PHP
//!
//! Implements statement parsing and expression parsing with operator
//! precedence matching PHP 8.
//! Reference: php-src/Zend/zend_language_parser.y

use crate::ast::*;
use php_rs_lexer::{Lexer, Span, Token};
use thiserror::Error;

/// Parse error
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("syntax error, unexpected {found}, expecting {expected}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },
    #[error("syntax error, unexpected end of file")]
    UnexpectedEof { span: Span },
    #[error("{message}")]
    InvalidLiteral { message: String, span: Span },
}

impl ParseError {
    /// Line the error was detected on.
    pub fn line(&self) -> usize {
        match self {
            ParseError::UnexpectedToken { span, .. }
            | ParseError::UnexpectedEof { span }
            | ParseError::InvalidLiteral { span, .. } => span.line,
        }
    }
}

// Binding powers, lowest first
const PREC_ASSIGN: u8 = 4;
const PREC_TERNARY: u8 = 5;
const PREC_COALESCE: u8 = 6;
const PREC_NOT: u8 = 18;
const PREC_PREFIX: u8 = 20;

/// Parser for PHP source code
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    source: &'a str,
    current_token: Token,
    current_span: Span,
    peeked: Option<(Token, Span)>,
}

impl<'a> Parser<'a> {
    /// Create a parser for a file (text before `<?php` is inline HTML)
    pub fn new(source: &'a str) -> Self {
        Self::with_lexer(Lexer::new(source))
    }

    /// Create a parser for code that is already inside `<?php`
    pub fn new_scripting(source: &'a str) -> Self {
        Self::with_lexer(Lexer::new_scripting(source))
    }

    fn with_lexer(mut lexer: Lexer<'a>) -> Self {
        let source = lexer.source();
        let eof = Span::new(source.len(), source.len(), 1, 1);
        let (current_token, current_span) = lexer.next_token().unwrap_or((Token::End, eof));
        Self {
            lexer,
            source,
            current_token,
            current_span,
            peeked: None,
        }
    }

    fn eof_span(&self) -> Span {
        let end = self.source.len();
        Span::new(end, end, self.current_span.line, self.current_span.column)
    }

    /// Advance to the next token
    fn advance(&mut self) {
        let (token, span) = match self.peeked.take() {
            Some(next) => next,
            None => {
                let eof = self.eof_span();
                self.lexer.next_token().unwrap_or((Token::End, eof))
            }
        };
        self.current_token = token;
        self.current_span = span;
    }

    /// Peek at the next token without consuming it
    fn peek(&mut self) -> Token {
        if let Some((token, _)) = self.peeked {
            return token;
        }
        let eof = self.eof_span();
        let next = self.lexer.next_token().unwrap_or((Token::End, eof));
        self.peeked = Some(next);
        next.0
    }

    fn text(&self) -> &'a str {
        self.current_span.extract(self.source)
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        if self.current_token == Token::End {
            return ParseError::UnexpectedEof {
                span: self.current_span,
            };
        }
        let text = self.text();
        let found = match self.current_token {
            Token::Variable => format!("variable \"{}\"", text),
            Token::String => format!("identifier \"{}\"", text),
            Token::LNumber => format!("integer \"{}\"", text),
            Token::DNumber => format!("floating-point number \"{}\"", text),
            Token::ConstantEncapsedString | Token::EncapsedAndWhitespace => {
                format!("string content {}", text)
            }
            Token::BadCharacter => format!("character \"{}\"", text),
            _ => format!("token \"{}\"", text),
        };
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found,
            span: self.current_span,
        }
    }

    /// Check if current token matches expected token
    fn expect(&mut self, expected: Token) -> Result<Span, ParseError> {
        if self.current_token == expected {
            let span = self.current_span;
            self.advance();
            Ok(span)
        } else {
            Err(self.unexpected(&format!("\"{}\"", token_text(expected))))
        }
    }

    /// `;`, or a `?>` which implies one
    fn end_statement(&mut self) -> Result<(), ParseError> {
        match self.current_token {
            Token::Semicolon | Token::CloseTag => {
                self.advance();
                Ok(())
            }
            Token::End => Ok(()),
            _ => Err(self.unexpected("\";\"")),
        }
    }

    /// Parse a whole compilation unit
    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let statements = self.parse_statements_until(Token::End)?;
        Ok(Program { statements })
    }

    fn parse_statements_until(&mut self, end: Token) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();
        while self.current_token != end {
            match self.current_token {
                Token::OpenTag | Token::CloseTag => self.advance(),
                Token::End => return Err(self.unexpected(&format!("\"{}\"", token_text(end)))),
                _ => statements.push(self.parse_statement()?),
            }
        }
        Ok(statements)
    }

    fn parse_block(&mut self) -> Result<Vec<Statement>, ParseError> {
        self.expect(Token::LBrace)?;
        let statements = self.parse_statements_until(Token::RBrace)?;
        self.expect(Token::RBrace)?;
        Ok(statements)
    }

    /// Parse a statement
    pub fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let span = self.current_span;
        let token = self.current_token;
        match token {
            Token::LBrace => {
                let statements = self.parse_block()?;
                Ok(Statement::Block { statements, span })
            }
            Token::Semicolon => {
                self.advance();
                Ok(Statement::Block {
                    statements: Vec::new(),
                    span,
                })
            }
            Token::InlineHtml => {
                let content = self.text().to_string();
                self.advance();
                Ok(Statement::InlineHtml { content, span })
            }
            Token::OpenTagWithEcho => {
                self.advance();
                let exprs = self.parse_expression_list()?;
                self.end_statement()?;
                Ok(Statement::Echo { exprs, span })
            }
            Token::Echo => {
                self.advance();
                let exprs = self.parse_expression_list()?;
                self.end_statement()?;
                Ok(Statement::Echo { exprs, span })
            }
            Token::If => self.parse_if_statement(),
            Token::While => self.parse_while_statement(),
            Token::For => self.parse_for_statement(),
            Token::Foreach => self.parse_foreach_statement(),
            Token::Break | Token::Continue => {
                let is_break = token == Token::Break;
                self.advance();
                let depth = if self.current_token == Token::LNumber {
                    let depth = self.text().parse::<usize>().unwrap_or(1).max(1);
                    self.advance();
                    depth
                } else {
                    1
                };
                self.end_statement()?;
                Ok(if is_break {
                    Statement::Break { depth, span }
                } else {
                    Statement::Continue { depth, span }
                })
            }
            Token::Return => {
                self.advance();
                let value = match self.current_token {
                    Token::Semicolon | Token::CloseTag | Token::End => None,
                    _ => Some(Box::new(self.parse_expression(0)?)),
                };
                self.end_statement()?;
                Ok(Statement::Return { value, span })
            }
            Token::Try => self.parse_try_statement(),
            Token::Throw => {
                self.advance();
                let exception = Box::new(self.parse_expression(0)?);
                self.end_statement()?;
                Ok(Statement::Throw { exception, span })
            }
            Token::Global => {
                self.advance();
                let mut vars = Vec::new();
                loop {
                    if self.current_token != Token::Variable {
                        return Err(self.unexpected("variable"));
                    }
                    vars.push(self.text()[1..].to_string());
                    self.advance();
                    if self.current_token != Token::Comma {
                        break;
                    }
                    self.advance();
                }
                self.end_statement()?;
                Ok(Statement::Global { vars, span })
            }
            Token::Unset => {
                self.advance();
                self.expect(Token::LParen)?;
                let vars = self.parse_arguments_until(Token::RParen)?;
                self.end_statement()?;
                Ok(Statement::Unset { vars, span })
            }
            Token::Function if self.peek() == Token::String => self.parse_function_statement(),
            _ => {
                let expr = self.parse_expression(0)?;
                self.end_statement()?;
                Ok(Statement::Expression { expr, span })
            }
        }
    }

    fn parse_expression_list(&mut self) -> Result<Vec<Expression>, ParseError> {
        let mut exprs = vec![self.parse_expression(0)?];
        while self.current_token == Token::Comma {
            self.advance();
            exprs.push(self.parse_expression(0)?);
        }
        Ok(exprs)
    }

    fn parse_condition(&mut self) -> Result<Box<Expression>, ParseError> {
        self.expect(Token::LParen)?;
        let condition = self.parse_expression(0)?;
        self.expect(Token::RParen)?;
        Ok(Box::new(condition))
    }

    /// Parse if/elseif/else statement
    fn parse_if_statement(&mut self) -> Result<Statement, ParseError> {
        let span = self.expect(Token::If)?;
        let condition = self.parse_condition()?;
        let then_branch = Box::new(self.parse_statement()?);

        let mut elseif_branches = Vec::new();
        while self.current_token == Token::Elseif {
            self.advance();
            let condition = self.parse_condition()?;
            let body = self.parse_statement()?;
            elseif_branches.push((*condition, body));
        }

        // `else if` nests a second If in the else branch
        let else_branch = if self.current_token == Token::Else {
            self.advance();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };

        Ok(Statement::If {
            condition,
            then_branch,
            elseif_branches,
            else_branch,
            span,
        })
    }

    fn parse_while_statement(&mut self) -> Result<Statement, ParseError> {
        let span = self.expect(Token::While)?;
        let condition = self.parse_condition()?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::While {
            condition,
            body,
            span,
        })
    }

    fn parse_for_statement(&mut self) -> Result<Statement, ParseError> {
        let span = self.expect(Token::For)?;
        self.expect(Token::LParen)?;
        let init = self.parse_for_clause(Token::Semicolon)?;
        let condition = self.parse_for_clause(Token::Semicolon)?;
        let increment = self.parse_for_clause(Token::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::For {
            init,
            condition,
            increment,
            body,
            span,
        })
    }

    fn parse_for_clause(&mut self, terminator: Token) -> Result<Vec<Expression>, ParseError> {
        let exprs = if self.current_token == terminator {
            Vec::new()
        } else {
            self.parse_expression_list()?
        };
        self.expect(terminator)?;
        Ok(exprs)
    }

    fn parse_foreach_statement(&mut self) -> Result<Statement, ParseError> {
        let span = self.expect(Token::Foreach)?;
        self.expect(Token::LParen)?;
        let iterable = Box::new(self.parse_expression(0)?);
        self.expect(Token::As)?;

        let first = self.parse_expression(0)?;
        let (key, value) = if self.current_token == Token::DoubleArrow {
            self.advance();
            let value = self.parse_expression(0)?;
            (Some(Box::new(first)), Box::new(value))
        } else {
            (None, Box::new(first))
        };
        self.expect(Token::RParen)?;

        let body = Box::new(self.parse_statement()?);
        Ok(Statement::Foreach {
            iterable,
            key,
            value,
            body,
            span,
        })
    }

    fn parse_try_statement(&mut self) -> Result<Statement, ParseError> {
        let span = self.expect(Token::Try)?;
        let body = self.parse_block()?;

        let mut catches = Vec::new();
        while self.current_token == Token::Catch {
            let catch_span = self.current_span;
            self.advance();
            self.expect(Token::LParen)?;

            let mut types = vec![self.parse_class_name()?];
            while self.current_token == Token::Bar {
                self.advance();
                types.push(self.parse_class_name()?);
            }

            let var = if self.current_token == Token::Variable {
                let name = self.text()[1..].to_string();
                self.advance();
                Some(name)
            } else {
                None
            };
            self.expect(Token::RParen)?;

            let body = self.parse_block()?;
            catches.push(CatchClause {
                types,
                var,
                body,
                span: catch_span,
            });
        }

        let finally = if self.current_token == Token::Finally {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };

        if catches.is_empty() && finally.is_none() {
            return Err(self.unexpected("\"catch\" or \"finally\""));
        }

        Ok(Statement::Try {
            body,
            catches,
            finally,
            span,
        })
    }

    /// Class name with any leading namespace separator removed
    fn parse_class_name(&mut self) -> Result<String, ParseError> {
        if self.current_token != Token::String {
            return Err(self.unexpected("class name"));
        }
        let name = self.text().trim_start_matches('\\').to_string();
        self.advance();
        Ok(name)
    }

    fn parse_function_statement(&mut self) -> Result<Statement, ParseError> {
        let span = self.expect(Token::Function)?;
        let name = self.text().to_string();
        self.expect(Token::String)?;
        let params = self.parse_parameter_list()?;
        self.skip_return_type();
        let body = self.parse_block()?;
        Ok(Statement::Function {
            name,
            params,
            body,
            span,
        })
    }

    /// `( [type] $name [= default], ... )`
    fn parse_parameter_list(&mut self) -> Result<Vec<Parameter>, ParseError> {
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        while self.current_token != Token::RParen {
            self.skip_type();
            if self.current_token != Token::Variable {
                return Err(self.unexpected("variable"));
            }
            let span = self.current_span;
            let name = self.text()[1..].to_string();
            self.advance();

            let default = if self.current_token == Token::Assign {
                self.advance();
                Some(self.parse_expression(0)?)
            } else {
                None
            };
            params.push(Parameter {
                name,
                default,
                span,
            });

            if self.current_token != Token::Comma {
                break;
            }
            self.advance();
        }
        self.expect(Token::RParen)?;
        Ok(params)
    }

    /// Type declarations are accepted and ignored
    fn skip_type(&mut self) {
        while matches!(
            self.current_token,
            Token::String | Token::Array | Token::Question | Token::Bar
        ) {
            self.advance();
        }
    }

    fn skip_return_type(&mut self) {
        if self.current_token == Token::Colon {
            self.advance();
            self.skip_type();
        }
    }

    /// Comma separated expressions up to `end`, trailing comma allowed
    fn parse_arguments_until(&mut self, end: Token) -> Result<Vec<Expression>, ParseError> {
        let mut args = Vec::new();
        while self.current_token != end {
            args.push(self.parse_expression(0)?);
            if self.current_token != Token::Comma {
                break;
            }
            self.advance();
        }
        self.expect(end)?;
        Ok(args)
    }

    /// Parse an expression with given minimum precedence (Pratt parsing)
    pub fn parse_expression(&mut self, min_precedence: u8) -> Result<Expression, ParseError> {
        let mut left = self.parse_prefix()?;

        loop {
            let precedence = Self::infix_precedence(self.current_token);
            if precedence == 0 || precedence < min_precedence {
                break;
            }
            left = self.parse_infix(left, precedence)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expression, ParseError> {
        let token = self.current_token;
        let span = self.current_span;

        match token {
            Token::LNumber => {
                let text = self.text();
                self.advance();
                Ok(parse_int_literal(text, span))
            }
            Token::DNumber => {
                let text = self.text().replace('_', "");
                self.advance();
                let value = text.parse::<f64>().map_err(|_| ParseError::InvalidLiteral {
                    message: format!("Invalid numeric literal \"{}\"", text),
                    span,
                })?;
                Ok(Expression::FloatLiteral { value, span })
            }
            Token::ConstantEncapsedString => {
                let raw = self.text();
                self.advance();
                let inner = &raw[1..raw.len() - 1];
                let value = if raw.starts_with('\'') {
                    unescape_single(inner)
                } else {
                    unescape_double(inner)
                };
                Ok(Expression::StringLiteral { value, span })
            }
            Token::EncapsedAndWhitespace => {
                let raw = self.text();
                self.advance();
                parse_interpolated(&raw[1..raw.len() - 1], span)
            }
            Token::Variable => {
                let name = self.text()[1..].to_string();
                self.advance();
                Ok(Expression::Variable { name, span })
            }
            Token::String => {
                let name = self.text().trim_start_matches('\\');
                self.advance();
                Ok(match name.to_ascii_lowercase().as_str() {
                    "true" => Expression::BoolLiteral { value: true, span },
                    "false" => Expression::BoolLiteral { value: false, span },
                    "null" => Expression::Null { span },
                    _ => Expression::Name {
                        name: name.to_string(),
                        span,
                    },
                })
            }
            Token::Line => {
                self.advance();
                Ok(Expression::IntLiteral {
                    value: span.line as i64,
                    span,
                })
            }

            // Parenthesized expression
            Token::LParen => {
                self.advance();
                let expr = self.parse_expression(0)?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }

            Token::LBracket => {
                self.advance();
                let elements = self.parse_array_elements(Token::RBracket)?;
                Ok(Expression::ArrayLiteral { elements, span })
            }
            Token::Array => {
                self.advance();
                self.expect(Token::LParen)?;
                let elements = self.parse_array_elements(Token::RParen)?;
                Ok(Expression::ArrayLiteral { elements, span })
            }

            // Unary operators
            Token::Plus | Token::Minus | Token::Tilde | Token::At | Token::Bang => {
                self.advance();
                let (op, precedence) = match token {
                    Token::Plus => (UnaryOperator::Plus, PREC_PREFIX),
                    Token::Minus => (UnaryOperator::Minus, PREC_PREFIX),
                    Token::Tilde => (UnaryOperator::BitwiseNot, PREC_PREFIX),
                    Token::At => (UnaryOperator::ErrorSuppress, PREC_PREFIX),
                    _ => (UnaryOperator::Not, PREC_NOT),
                };
                let operand = self.parse_expression(precedence)?;
                Ok(Expression::UnaryOp {
                    op,
                    operand: Box::new(operand),
                    span,
                })
            }

            // Pre-increment/decrement
            Token::Inc | Token::Dec => {
                self.advance();
                let var = Box::new(self.parse_expression(PREC_PREFIX)?);
                Ok(if token == Token::Inc {
                    Expression::PreIncrement { var, span }
                } else {
                    Expression::PreDecrement { var, span }
                })
            }

            // Cast expressions
            Token::IntCast
            | Token::DoubleCast
            | Token::StringCast
            | Token::BoolCast
            | Token::ArrayCast => {
                self.advance();
                let cast_type = match token {
                    Token::IntCast => CastType::Int,
                    Token::DoubleCast => CastType::Float,
                    Token::StringCast => CastType::String,
                    Token::BoolCast => CastType::Bool,
                    _ => CastType::Array,
                };
                let expr = self.parse_expression(PREC_PREFIX)?;
                Ok(Expression::Cast {
                    cast_type,
                    expr: Box::new(expr),
                    span,
                })
            }

            Token::New => {
                self.advance();
                let class = self.parse_class_name()?;
                let args = if self.current_token == Token::LParen {
                    self.advance();
                    self.parse_arguments_until(Token::RParen)?
                } else {
                    Vec::new()
                };
                Ok(Expression::New { class, args, span })
            }

            Token::Function => self.parse_closure_expression(),
            Token::Fn => self.parse_arrow_function_expression(),

            Token::Isset => {
                self.advance();
                self.expect(Token::LParen)?;
                let vars = self.parse_arguments_until(Token::RParen)?;
                if vars.is_empty() {
                    return Err(self.unexpected("variable"));
                }
                Ok(Expression::Isset { vars, span })
            }
            Token::Empty => {
                self.advance();
                self.expect(Token::LParen)?;
                let var = self.parse_expression(0)?;
                self.expect(Token::RParen)?;
                Ok(Expression::Empty {
                    var: Box::new(var),
                    span,
                })
            }
            Token::Print => {
                self.advance();
                let expr = self.parse_expression(PREC_ASSIGN)?;
                Ok(Expression::Print {
                    expr: Box::new(expr),
                    span,
                })
            }
            Token::Exit => {
                self.advance();
                let expr = if self.current_token == Token::LParen {
                    self.advance();
                    let expr = if self.current_token == Token::RParen {
                        None
                    } else {
                        Some(Box::new(self.parse_expression(0)?))
                    };
                    self.expect(Token::RParen)?;
                    expr
                } else {
                    None
                };
                Ok(Expression::Exit { expr, span })
            }

            _ => Err(self.unexpected("expression")),
        }
    }

    /// `[k => v, v, ...]` up to `end`
    fn parse_array_elements(&mut self, end: Token) -> Result<Vec<ArrayElement>, ParseError> {
        let mut elements = Vec::new();
        while self.current_token != end {
            let first = self.parse_expression(0)?;
            let element = if self.current_token == Token::DoubleArrow {
                self.advance();
                ArrayElement {
                    key: Some(first),
                    value: self.parse_expression(0)?,
                }
            } else {
                ArrayElement {
                    key: None,
                    value: first,
                }
            };
            elements.push(element);

            if self.current_token != Token::Comma {
                break;
            }
            self.advance();
        }
        self.expect(end)?;
        Ok(elements)
    }

    /// `function (params) [use ($a, $b)] { body }`
    fn parse_closure_expression(&mut self) -> Result<Expression, ParseError> {
        let span = self.expect(Token::Function)?;
        let params = self.parse_parameter_list()?;

        let mut uses = Vec::new();
        if self.current_token == Token::Use {
            self.advance();
            self.expect(Token::LParen)?;
            while self.current_token == Token::Variable {
                uses.push(self.text()[1..].to_string());
                self.advance();
                if self.current_token != Token::Comma {
                    break;
                }
                self.advance();
            }
            self.expect(Token::RParen)?;
        }

        self.skip_return_type();
        let body = self.parse_block()?;
        Ok(Expression::Closure {
            params,
            uses,
            body,
            span,
        })
    }

    /// `fn (params) => expr`
    fn parse_arrow_function_expression(&mut self) -> Result<Expression, ParseError> {
        let span = self.expect(Token::Fn)?;
        let params = self.parse_parameter_list()?;
        self.skip_return_type();
        self.expect(Token::DoubleArrow)?;
        let body = self.parse_expression(PREC_ASSIGN)?;
        Ok(Expression::ArrowFunction {
            params,
            body: Box::new(body),
            span,
        })
    }

    /// Member name after `->`; keywords are valid member names
    fn parse_member_name(&mut self) -> Result<String, ParseError> {
        let text = self.text();
        let is_name = text
            .chars()
            .next()
            .is_some_and(|ch| ch.is_alphabetic() || ch == '_')
            && text.chars().all(|ch| ch.is_alphanumeric() || ch == '_');
        if !is_name {
            return Err(self.unexpected("identifier"));
        }
        self.advance();
        Ok(text.to_string())
    }

    fn parse_infix(&mut self, left: Expression, precedence: u8) -> Result<Expression, ParseError> {
        let token = self.current_token;
        let span = left.span();

        match token {
            // Assignment (right-associative)
            Token::Assign => {
                ensure_assignable(&left)?;
                self.advance();
                let right = self.parse_expression(precedence)?;
                Ok(Expression::Assign {
                    lhs: Box::new(left),
                    rhs: Box::new(right),
                    span,
                })
            }

            // Compound assignment operators (right-associative)
            Token::PlusEqual
            | Token::MinusEqual
            | Token::MulEqual
            | Token::DivEqual
            | Token::ModEqual
            | Token::ConcatEqual
            | Token::CoalesceEqual => {
                ensure_assignable(&left)?;
                self.advance();
                let op = match token {
                    Token::PlusEqual => BinaryOperator::Add,
                    Token::MinusEqual => BinaryOperator::Sub,
                    Token::MulEqual => BinaryOperator::Mul,
                    Token::DivEqual => BinaryOperator::Div,
                    Token::ModEqual => BinaryOperator::Mod,
                    Token::ConcatEqual => BinaryOperator::Concat,
                    _ => BinaryOperator::Coalesce,
                };
                let right = self.parse_expression(precedence)?;
                Ok(Expression::AssignOp {
                    op,
                    lhs: Box::new(left),
                    rhs: Box::new(right),
                    span,
                })
            }

            Token::Question => {
                self.advance();
                let then_expr = if self.current_token == Token::Colon {
                    None
                } else {
                    Some(Box::new(self.parse_expression(0)?))
                };
                self.expect(Token::Colon)?;
                let else_expr = self.parse_expression(PREC_TERNARY + 1)?;
                Ok(Expression::Ternary {
                    condition: Box::new(left),
                    then_expr,
                    else_expr: Box::new(else_expr),
                    span,
                })
            }

            // Null coalesce (right-associative)
            Token::Coalesce => {
                self.advance();
                let right = self.parse_expression(PREC_COALESCE)?;
                Ok(Expression::Coalesce {
                    lhs: Box::new(left),
                    rhs: Box::new(right),
                    span,
                })
            }

            // Power operator (right-associative)
            Token::Pow => {
                self.advance();
                let right = self.parse_expression(precedence)?;
                Ok(Expression::BinaryOp {
                    op: BinaryOperator::Pow,
                    lhs: Box::new(left),
                    rhs: Box::new(right),
                    span,
                })
            }

            Token::Instanceof => {
                self.advance();
                let class = self.parse_class_name()?;
                Ok(Expression::Instanceof {
                    expr: Box::new(left),
                    class,
                    span,
                })
            }

            Token::Inc => {
                self.advance();
                Ok(Expression::PostIncrement {
                    var: Box::new(left),
                    span,
                })
            }
            Token::Dec => {
                self.advance();
                Ok(Expression::PostDecrement {
                    var: Box::new(left),
                    span,
                })
            }

            Token::ObjectOperator | Token::NullsafeObjectOperator => {
                self.advance();
                let nullsafe = token == Token::NullsafeObjectOperator;
                let name = self.parse_member_name()?;
                if self.current_token == Token::LParen {
                    self.advance();
                    let args = self.parse_arguments_until(Token::RParen)?;
                    Ok(Expression::MethodCall {
                        object: Box::new(left),
                        method: name,
                        args,
                        nullsafe,
                        span,
                    })
                } else {
                    Ok(Expression::PropertyAccess {
                        object: Box::new(left),
                        property: name,
                        nullsafe,
                        span,
                    })
                }
            }

            Token::LBracket => {
                self.advance();
                let index = if self.current_token == Token::RBracket {
                    None
                } else {
                    Some(Box::new(self.parse_expression(0)?))
                };
                self.expect(Token::RBracket)?;
                Ok(Expression::ArrayAccess {
                    array: Box::new(left),
                    index,
                    span,
                })
            }

            Token::LParen => {
                self.advance();
                let args = self.parse_arguments_until(Token::RParen)?;
                Ok(Expression::FunctionCall {
                    name: Box::new(left),
                    args,
                    span,
                })
            }

            // Binary operators (left-associative)
            _ => {
                let op = Self::token_to_binary_op(token).ok_or_else(|| self.unexpected("operator"))?;
                self.advance();
                let right = self.parse_expression(precedence + 1)?;
                Ok(Expression::BinaryOp {
                    op,
                    lhs: Box::new(left),
                    rhs: Box::new(right),
                    span,
                })
            }
        }
    }

    fn infix_precedence(token: Token) -> u8 {
        match token {
            Token::LogicalOr => 1,
            Token::LogicalXor => 2,
            Token::LogicalAnd => 3,
            Token::Assign
            | Token::PlusEqual
            | Token::MinusEqual
            | Token::MulEqual
            | Token::DivEqual
            | Token::ModEqual
            | Token::ConcatEqual
            | Token::CoalesceEqual => PREC_ASSIGN,
            Token::Question => PREC_TERNARY,
            Token::Coalesce => PREC_COALESCE,
            Token::BooleanOr => 7,
            Token::BooleanAnd => 8,
            Token::Bar => 9,
            Token::Caret => 10,
            Token::Ampersand => 11,
            Token::IsEqual
            | Token::IsNotEqual
            | Token::IsIdentical
            | Token::IsNotIdentical
            | Token::Spaceship => 12,
            Token::Less | Token::IsSmallerOrEqual | Token::Greater | Token::IsGreaterOrEqual => 13,
            // PHP 8: "." binds looser than "+" and "-"
            Token::Dot => 14,
            Token::Plus | Token::Minus => 16,
            Token::Star | Token::Slash | Token::Percent => 17,
            Token::Instanceof => 19,
            Token::Pow => 21,
            Token::Inc
            | Token::Dec
            | Token::ObjectOperator
            | Token::NullsafeObjectOperator
            | Token::LBracket
            | Token::LParen => 22,
            _ => 0,
        }
    }

    /// Convert token to binary operator
    fn token_to_binary_op(token: Token) -> Option<BinaryOperator> {
        let op = match token {
            Token::Plus => BinaryOperator::Add,
            Token::Minus => BinaryOperator::Sub,
            Token::Star => BinaryOperator::Mul,
            Token::Slash => BinaryOperator::Div,
            Token::Percent => BinaryOperator::Mod,
            Token::Dot => BinaryOperator::Concat,
            Token::IsEqual => BinaryOperator::Equal,
            Token::IsNotEqual => BinaryOperator::NotEqual,
            Token::IsIdentical => BinaryOperator::Identical,
            Token::IsNotIdentical => BinaryOperator::NotIdentical,
            Token::Less => BinaryOperator::Less,
            Token::IsSmallerOrEqual => BinaryOperator::LessEqual,
            Token::Greater => BinaryOperator::Greater,
            Token::IsGreaterOrEqual => BinaryOperator::GreaterEqual,
            Token::Spaceship => BinaryOperator::Spaceship,
            Token::BooleanAnd => BinaryOperator::And,
            Token::BooleanOr => BinaryOperator::Or,
            Token::LogicalAnd => BinaryOperator::LogicalAnd,
            Token::LogicalOr => BinaryOperator::LogicalOr,
            Token::LogicalXor => BinaryOperator::LogicalXor,
            Token::Ampersand => BinaryOperator::BitwiseAnd,
            Token::Bar => BinaryOperator::BitwiseOr,
            Token::Caret => BinaryOperator::BitwiseXor,
            _ => return None,
        };
        Some(op)
    }
}

/// Parse a file (inline HTML until `<?php`)
pub fn parse_program(source: &str) -> Result<Program, ParseError> {
    Parser::new(source).parse_program()
}

/// Parse code that starts inside PHP tags, as `eval()` does
pub fn parse_script(source: &str) -> Result<Program, ParseError> {
    Parser::new_scripting(source).parse_program()
}

fn ensure_assignable(expr: &Expression) -> Result<(), ParseError> {
    match expr {
        Expression::Variable { .. }
        | Expression::ArrayAccess { .. }
        | Expression::PropertyAccess { .. } => Ok(()),
        other => Err(ParseError::InvalidLiteral {
            message: "syntax error, cannot assign to this expression".to_string(),
            span: other.span(),
        }),
    }
}

fn token_text(token: Token) -> &'static str {
    match token {
        Token::Semicolon => ";",
        Token::Comma => ",",
        Token::LParen => "(",
        Token::RParen => ")",
        Token::LBrace => "{",
        Token::RBrace => "}",
        Token::LBracket => "[",
        Token::RBracket => "]",
        Token::Colon => ":",
        Token::DoubleArrow => "=>",
        Token::As => "as",
        Token::If => "if",
        Token::While => "while",
        Token::For => "for",
        Token::Foreach => "foreach",
        Token::Try => "try",
        Token::Function => "function",
        Token::Fn => "fn",
        Token::String => "identifier",
        Token::End => "end of file",
        _ => "token",
    }
}

/// Integer literal text to an IntLiteral, or a FloatLiteral on overflow
fn parse_int_literal(text: &str, span: Span) -> Expression {
    let digits = text.replace('_', "");
    let (radix, body) = match digits.get(..2) {
        Some("0x") | Some("0X") => (16, &digits[2..]),
        Some("0b") | Some("0B") => (2, &digits[2..]),
        Some("0o") | Some("0O") => (8, &digits[2..]),
        _ if digits.len() > 1 && digits.starts_with('0') => (8, &digits[1..]),
        _ => (10, digits.as_str()),
    };
    match i64::from_str_radix(body, radix) {
        Ok(value) => Expression::IntLiteral { value, span },
        Err(_) => {
            let value = u128::from_str_radix(body, radix)
                .map(|v| v as f64)
                .unwrap_or(f64::INFINITY);
            Expression::FloatLiteral { value, span }
        }
    }
}

/// Single-quoted strings only know `\'` and `\\`
fn unescape_single(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(&next) = chars.peek() {
                if next == '\'' || next == '\\' {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(ch);
    }
    out
}

fn unescape_double(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            push_escape(&mut chars, &mut out);
        } else {
            out.push(ch);
        }
    }
    out
}

/// Resolve one double-quoted escape; the backslash is already consumed
fn push_escape(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, out: &mut String) {
    let Some(&next) = chars.peek() else {
        out.push('\\');
        return;
    };
    let simple = match next {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        'v' => Some('\x0B'),
        'e' => Some('\x1B'),
        'f' => Some('\x0C'),
        '\\' => Some('\\'),
        '$' => Some('$'),
        '"' => Some('"'),
        _ => None,
    };
    if let Some(ch) = simple {
        chars.next();
        out.push(ch);
        return;
    }

    match next {
        '0'..='7' => {
            let mut value = 0u32;
            for _ in 0..3 {
                match chars.peek().and_then(|c| c.to_digit(8)) {
                    Some(d) => {
                        value = value * 8 + d;
                        chars.next();
                    }
                    None => break,
                }
            }
            out.push(char::from((value & 0xFF) as u8));
        }
        'x' => {
            chars.next();
            let mut value = 0u32;
            let mut count = 0;
            while count < 2 {
                match chars.peek().and_then(|c| c.to_digit(16)) {
                    Some(d) => {
                        value = value * 16 + d;
                        chars.next();
                        count += 1;
                    }
                    None => break,
                }
            }
            if count == 0 {
                out.push_str("\\x");
            } else {
                out.push(char::from(value as u8));
            }
        }
        'u' => {
            chars.next();
            if chars.peek() != Some(&'{') {
                out.push_str("\\u");
                return;
            }
            chars.next();
            let hex: String = chars.by_ref().take_while(|&c| c != '}').collect();
            match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                Some(ch) => out.push(ch),
                None => {
                    out.push_str("\\u{");
                    out.push_str(&hex);
                    out.push('}');
                }
            }
        }
        _ => out.push('\\'),
    }
}

fn is_name_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || !ch.is_ascii()
}

fn is_name_char(ch: char) -> bool {
    is_name_start(ch) || ch.is_ascii_digit()
}

/// Split the body of a double-quoted string into literal text and
/// interpolated expressions: `$name`, `$name[key]`, `$name->prop` and
/// `{$expr}`.
fn parse_interpolated(raw: &str, span: Span) -> Result<Expression, ParseError> {
    let chars: Vec<char> = raw.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    let flush = |literal: &mut String, parts: &mut Vec<StringPart>| {
        if !literal.is_empty() {
            parts.push(StringPart::Literal(std::mem::take(literal)));
        }
    };

    while i < chars.len() {
        let ch = chars[i];
        if ch == '\\' {
            let rest: String = chars[i + 1..].iter().collect();
            let mut iter = rest.chars().peekable();
            push_escape(&mut iter, &mut literal);
            let consumed = rest.chars().count() - iter.count();
            i += 1 + consumed;
            continue;
        }

        if ch == '{' && chars.get(i + 1) == Some(&'$') {
            let mut depth = 0;
            let mut end = None;
            for (j, &c) in chars.iter().enumerate().skip(i) {
                match c {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            end = Some(j);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            let Some(end) = end else {
                return Err(ParseError::InvalidLiteral {
                    message: "syntax error, unterminated \"{$\" in string".to_string(),
                    span,
                });
            };
            let inner: String = chars[i + 1..end].iter().collect();
            let mut parser = Parser::new_scripting(&inner);
            let expr = parser.parse_expression(0)?;
            if parser.current_token != Token::End {
                return Err(parser.unexpected("\"}\""));
            }
            flush(&mut literal, &mut parts);
            parts.push(StringPart::Expr(expr));
            i = end + 1;
            continue;
        }

        if ch == '$' && chars.get(i + 1).is_some_and(|&c| is_name_start(c)) {
            let mut j = i + 1;
            while j < chars.len() && is_name_char(chars[j]) {
                j += 1;
            }
            let name: String = chars[i + 1..j].iter().collect();
            let mut expr = Expression::Variable { name, span };

            if chars.get(j) == Some(&'[') {
                if let Some(close) = chars[j..].iter().position(|&c| c == ']') {
                    let key: String = chars[j + 1..j + close].iter().collect();
                    let index = interpolated_key(&key, span);
                    expr = Expression::ArrayAccess {
                        array: Box::new(expr),
                        index: Some(Box::new(index)),
                        span,
                    };
                    j += close + 1;
                }
            } else if chars.get(j) == Some(&'-')
                && chars.get(j + 1) == Some(&'>')
                && chars.get(j + 2).is_some_and(|&c| is_name_start(c))
            {
                let mut k = j + 2;
                while k < chars.len() && is_name_char(chars[k]) {
                    k += 1;
                }
                let property: String = chars[j + 2..k].iter().collect();
                expr = Expression::PropertyAccess {
                    object: Box::new(expr),
                    property,
                    nullsafe: false,
                    span,
                };
                j = k;
            }

            flush(&mut literal, &mut parts);
            parts.push(StringPart::Expr(expr));
            i = j;
            continue;
        }

        literal.push(ch);
        i += 1;
    }
    flush(&mut literal, &mut parts);

    if parts.iter().all(|part| matches!(part, StringPart::Literal(_))) {
        let value = parts
            .into_iter()
            .map(|part| match part {
                StringPart::Literal(text) => text,
                StringPart::Expr(_) => String::new(),
            })
            .collect();
        return Ok(Expression::StringLiteral { value, span });
    }
    Ok(Expression::Interpolated { parts, span })
}

/// Key inside `"$arr[key]"`: a variable, an integer, or a bare string
fn interpolated_key(key: &str, span: Span) -> Expression {
    if let Some(name) = key.strip_prefix('$') {
        return Expression::Variable {
            name: name.to_string(),
            span,
        };
    }
    if let Ok(value) = key.parse::<i64>() {
        return Expression::IntLiteral { value, span };
    }
    Expression::StringLiteral {
        value: key.trim_matches('\'').to_string(),
        span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_expr(source: &str) -> Expression {
        let mut parser = Parser::new_scripting(source);
        parser.parse_expression(0).unwrap()
    }

    fn statements(source: &str) -> Vec<Statement> {
        parse_program(source).unwrap().statements
    }

    #[test]
    fn test_parser_creation() {
        let mut parser = Parser::new("<?php 42");
        assert_eq!(parser.current_token, Token::OpenTag);
        parser.advance();
        assert_eq!(parser.current_token, Token::LNumber);
    }

    #[test]
    fn test_int_and_float_literals() {
        assert!(matches!(
            parse_expr("42"),
            Expression::IntLiteral { value: 42, .. }
        ));
        assert!(matches!(
            parse_expr("0x1F"),
            Expression::IntLiteral { value: 31, .. }
        ));
        match parse_expr("3.14159") {
            Expression::FloatLiteral { value, .. } => assert_eq!(value, 3.14159),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            parse_expr("9223372036854775808"),
            Expression::FloatLiteral { .. }
        ));
    }

    #[test]
    fn test_arithmetic_precedence() {
        // 1 + 2 * 3 => Add(1, Mul(2, 3))
        match parse_expr("1 + 2 * 3") {
            Expression::BinaryOp { op, rhs, .. } => {
                assert_eq!(op, BinaryOperator::Add);
                assert!(matches!(
                    *rhs,
                    Expression::BinaryOp {
                        op: BinaryOperator::Mul,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_concat_binds_looser_than_addition() {
        match parse_expr("'a' . 1 + 2") {
            Expression::BinaryOp { op, rhs, .. } => {
                assert_eq!(op, BinaryOperator::Concat);
                assert!(matches!(
                    *rhs,
                    Expression::BinaryOp {
                        op: BinaryOperator::Add,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_assignment_right_associativity() {
        match parse_expr("$a = $b = 3") {
            Expression::Assign { lhs, rhs, .. } => {
                assert!(matches!(*lhs, Expression::Variable { ref name, .. } if name == "a"));
                assert!(matches!(*rhs, Expression::Assign { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_assign_to_literal_is_rejected() {
        let mut parser = Parser::new_scripting("1 = 2");
        assert!(parser.parse_expression(0).is_err());
    }

    #[test]
    fn test_null_coalesce_right_associativity() {
        match parse_expr("$a ?? $b ?? $c") {
            Expression::Coalesce { rhs, .. } => {
                assert!(matches!(*rhs, Expression::Coalesce { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_ternary_and_shorthand() {
        assert!(matches!(
            parse_expr("isset($w->Var) ? 1 : 0"),
            Expression::Ternary {
                then_expr: Some(_),
                ..
            }
        ));
        assert!(matches!(
            parse_expr("$a ?: 'x'"),
            Expression::Ternary {
                then_expr: None,
                ..
            }
        ));
    }

    #[test]
    fn test_unary_minus_vs_pow() {
        // -2 ** 2 => Minus(Pow(2, 2))
        match parse_expr("-2 ** 2") {
            Expression::UnaryOp { op, operand, .. } => {
                assert_eq!(op, UnaryOperator::Minus);
                assert!(matches!(
                    *operand,
                    Expression::BinaryOp {
                        op: BinaryOperator::Pow,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_not_binds_looser_than_instanceof() {
        match parse_expr("!$e instanceof Exception") {
            Expression::UnaryOp { op, operand, .. } => {
                assert_eq!(op, UnaryOperator::Not);
                assert!(matches!(*operand, Expression::Instanceof { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_method_and_property_chain() {
        match parse_expr("$w->Hello('World')") {
            Expression::MethodCall { method, args, .. } => {
                assert_eq!(method, "Hello");
                assert_eq!(args.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            parse_expr("$w->Var"),
            Expression::PropertyAccess { ref property, .. } if property == "Var"
        ));
        // Keywords are legal member names
        assert!(matches!(
            parse_expr("$w->list"),
            Expression::PropertyAccess { .. }
        ));
    }

    #[test]
    fn test_new_with_and_without_args() {
        assert!(matches!(
            parse_expr("new TestReceiver('hello')"),
            Expression::New { ref class, ref args, .. } if class == "TestReceiver" && args.len() == 1
        ));
        assert!(matches!(
            parse_expr("new \\stdClass"),
            Expression::New { ref class, ref args, .. } if class == "stdClass" && args.is_empty()
        ));
    }

    #[test]
    fn test_array_literals() {
        match parse_expr("['a' => 1, 2, [3]]") {
            Expression::ArrayLiteral { elements, .. } => {
                assert_eq!(elements.len(), 3);
                assert!(elements[0].key.is_some());
                assert!(elements[1].key.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            parse_expr("array(1, 2,)"),
            Expression::ArrayLiteral { ref elements, .. } if elements.len() == 2
        ));
    }

    #[test]
    fn test_immediately_invoked_closure() {
        match parse_expr("(function() use ($x) { return $x; })()") {
            Expression::FunctionCall { name, args, .. } => {
                assert!(args.is_empty());
                assert!(matches!(*name, Expression::Closure { ref uses, .. } if uses == &["x".to_string()]));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            parse_expr(r"'it\'s \n'"),
            Expression::StringLiteral {
                value: "it's \\n".to_string(),
                span: Span::new(0, 10, 1, 1)
            }
        );
        match parse_expr(r#""tab\there\x41""#) {
            Expression::StringLiteral { value, .. } => assert_eq!(value, "tab\thereA"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_interpolation_parts() {
        match parse_expr(r#""Hello $name, {$w->Var} and $arr[0]!""#) {
            Expression::Interpolated { parts, .. } => {
                assert_eq!(parts.len(), 7);
                assert_eq!(parts[0], StringPart::Literal("Hello ".to_string()));
                assert!(matches!(parts[1], StringPart::Expr(Expression::Variable { .. })));
                assert!(matches!(
                    parts[3],
                    StringPart::Expr(Expression::PropertyAccess { .. })
                ));
                assert!(matches!(
                    parts[5],
                    StringPart::Expr(Expression::ArrayAccess { .. })
                ));
                assert_eq!(parts[6], StringPart::Literal("!".to_string()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_inline_html_and_echo_tag() {
        let stmts = statements("<p><?= $x ?></p>");
        assert_eq!(stmts.len(), 3);
        assert!(matches!(stmts[0], Statement::InlineHtml { ref content, .. } if content == "<p>"));
        assert!(matches!(stmts[1], Statement::Echo { .. }));
        assert!(matches!(stmts[2], Statement::InlineHtml { .. }));
    }

    #[test]
    fn test_if_elseif_else_statement() {
        let stmts = parse_script("if ($a) { echo 1; } elseif ($b) echo 2; else { echo 3; }")
            .unwrap()
            .statements;
        match &stmts[0] {
            Statement::If {
                elseif_branches,
                else_branch,
                ..
            } => {
                assert_eq!(elseif_branches.len(), 1);
                assert!(else_branch.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_loops() {
        let stmts = parse_script(
            "for ($i = 0; $i < 3; $i++) {} foreach ($xs as $k => $v) {} while (false) break 2;",
        )
        .unwrap()
        .statements;
        assert!(matches!(stmts[0], Statement::For { ref init, .. } if init.len() == 1));
        assert!(matches!(stmts[1], Statement::Foreach { key: Some(_), .. }));
        match &stmts[2] {
            Statement::While { body, .. } => {
                assert!(matches!(**body, Statement::Break { depth: 2, .. }))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_try_catch_finally() {
        let stmts =
            parse_script("try { f(); } catch (TypeError | \\Exception $e) { } finally { }")
                .unwrap()
                .statements;
        match &stmts[0] {
            Statement::Try {
                catches, finally, ..
            } => {
                assert_eq!(catches[0].types, vec!["TypeError", "Exception"]);
                assert_eq!(catches[0].var.as_deref(), Some("e"));
                assert!(finally.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_function_declaration_with_types() {
        let stmts = parse_script("function add(int $a, ?int $b = 2): int { return $a + $b; }")
            .unwrap()
            .statements;
        match &stmts[0] {
            Statement::Function { name, params, .. } => {
                assert_eq!(name, "add");
                assert_eq!(params.len(), 2);
                assert!(params[1].default.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_semicolon_reports_line() {
        let err = parse_script("echo 1;\necho 2\necho 3;").unwrap_err();
        assert_eq!(err.line(), 3);
        assert!(err.to_string().starts_with("syntax error, unexpected token \"echo\""));
    }

    #[test]
    fn test_unexpected_eof() {
        let err = parse_script("if ($a) {").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof { .. }));
    }
}

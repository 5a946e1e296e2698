//! PHP parser
//!
//! Turns the token stream from `php-rs-lexer` into an AST.
//! Equivalent to php-src/Zend/zend_language_parser.y

mod ast;
mod parser;

pub use ast::*;
pub use parser::{parse_program, parse_script, ParseError, Parser};
pub use php_rs_lexer::Span;

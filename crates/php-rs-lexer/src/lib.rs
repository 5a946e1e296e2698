//! PHP lexer/tokenizer
//!
//! Lexical scanner for the PHP subset understood by the embedded runtime,
//! modelled on php-src/Zend/zend_language_scanner.l

mod lexer;
mod span;
mod token;

pub use lexer::Lexer;
pub use span::Span;
pub use token::Token;

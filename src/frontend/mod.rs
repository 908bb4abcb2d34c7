//! Source text to syntax tree: tokens, lexer, parser.

pub mod lexer;
pub mod parser;
pub mod parser_error;
pub mod token;
pub mod token_dumper;

/// A parsing error with source location.
///
/// `line` and `col` are 1-based positions taken from the offending token.
/// The message already names the position, so `Display` only adds the stage
/// prefix.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Syntax error: {message}")]
pub struct ParserError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

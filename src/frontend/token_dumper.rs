use crate::frontend::token::{Token, TokenKind};

/// Prints a lexed token stream, one token per line, for `--tokens`.
pub struct TokenDumper {
    pub color: bool,
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self { color: true }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn dump(&self, tokens: &[Token]) {
        for token in tokens {
            println!("{}", self.render(token));
        }
    }

    /// Formats one token as `[LL:CC] KIND(value)`.
    pub fn render(&self, token: &Token) -> String {
        let (colr, reset) = if self.color {
            (Self::color(token.kind), Self::RESET)
        } else {
            ("", "")
        };
        format!(
            "[{:02}:{:02}] {}{}{}",
            token.span.line, token.span.col, colr, token, reset
        )
    }

    fn color(kind: TokenKind) -> &'static str {
        match kind {
            TokenKind::Eof => Self::DIM,
            TokenKind::String => Self::GRN,
            TokenKind::Number => Self::YEL,
            TokenKind::Identifier => Self::CYN,
            k if k.is_keyword() => Self::MAG,
            _ => "",
        }
    }
}

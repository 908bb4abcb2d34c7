use crate::frontend::token::{Span, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Lexical error: {message}")]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

impl LexerError {
    fn at(span: Span, message: impl Into<String>) -> Self {
        LexerError {
            message: message.into(),
            line: span.line,
            col: span.col,
        }
    }
}

/// Single-pass scanner with one character of lookahead.
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
        let ch = self.current()?;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        Some(ch)
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    /// Skips whitespace and `//` comments up to the next token.
    fn skip_trivia(&mut self) {
        while let Some(ch) = self.current() {
            if matches!(ch, ' ' | '\t' | '\r' | '\n') {
                self.advance();
            } else if ch == '/' && self.peek() == Some('/') {
                while let Some(c) = self.current() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self, span: Span) -> Result<Token, LexerError> {
        self.advance();

        let mut string = String::new();
        loop {
            match self.current() {
                Some('"') => {
                    self.advance();
                    return Ok(Token::new(TokenKind::String, string, span));
                }
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        Some('n') => string.push('\n'),
                        Some('t') => string.push('\t'),
                        Some('\\') => string.push('\\'),
                        Some('"') => string.push('"'),
                        Some(ch) => {
                            let at = self.span();
                            return Err(LexerError::at(
                                at,
                                format!(
                                    "Unknown escape sequence '\\{}' at line {}, column {}",
                                    ch, at.line, at.col
                                ),
                            ));
                        }
                        None => break,
                    }
                    self.advance();
                }
                Some(ch) => {
                    string.push(ch);
                    self.advance();
                }
                None => break,
            }
        }

        Err(LexerError::at(
            span,
            format!("Unterminated string literal at line {}", span.line),
        ))
    }

    fn read_number(&mut self, span: Span) -> Token {
        let mut digits = String::new();
        while let Some(ch) = self.current() {
            if !ch.is_ascii_digit() {
                break;
            }
            digits.push(ch);
            self.advance();
        }
        Token::new(TokenKind::Number, digits, span)
    }

    fn read_identifier(&mut self, span: Span) -> Token {
        let mut ident = String::new();
        while let Some(ch) = self.current() {
            if !(ch.is_ascii_alphanumeric() || ch == '_') {
                break;
            }
            ident.push(ch);
            self.advance();
        }
        let kind = TokenKind::keyword_or_ident(&ident);
        Token::new(kind, ident, span)
    }

    fn read_operator(&mut self, span: Span) -> Result<Token, LexerError> {
        let Some(ch) = self.advance() else {
            return Ok(Token::new(TokenKind::Eof, "", span));
        };
        let next = self.current();

        let single =
            |kind: TokenKind| -> Result<Token, LexerError> { Ok(Token::new(kind, ch.to_string(), span)) };

        match (ch, next) {
            ('=', Some('=')) | ('!', Some('=')) | ('<', Some('=')) | ('>', Some('=')) => {
                self.advance();
                let kind = match ch {
                    '=' => TokenKind::Eq,
                    '!' => TokenKind::NotEq,
                    '<' => TokenKind::LtEq,
                    _ => TokenKind::GtEq,
                };
                Ok(Token::new(kind, format!("{}=", ch), span))
            }
            ('&', Some('&')) => {
                self.advance();
                Ok(Token::new(TokenKind::AndAnd, "&&", span))
            }
            ('|', Some('|')) => {
                self.advance();
                Ok(Token::new(TokenKind::OrOr, "||", span))
            }
            ('&', _) | ('|', _) => {
                let (doubled, meaning) = if ch == '&' { ("&&", "AND") } else { ("||", "OR") };
                Err(LexerError::at(
                    span,
                    format!(
                        "Unexpected character '{}' at line {}, column {}. Use '{}' for logical {}.",
                        ch, span.line, span.col, doubled, meaning
                    ),
                ))
            }
            ('=', _) => single(TokenKind::Assign),
            ('!', _) => single(TokenKind::Bang),
            ('<', _) => single(TokenKind::Lt),
            ('>', _) => single(TokenKind::Gt),
            ('+', _) => single(TokenKind::Plus),
            ('-', _) => single(TokenKind::Minus),
            ('*', _) => single(TokenKind::Star),
            ('/', _) => single(TokenKind::Slash),
            ('%', _) => single(TokenKind::Percent),
            ('(', _) => single(TokenKind::LParen),
            (')', _) => single(TokenKind::RParen),
            ('{', _) => single(TokenKind::LBrace),
            ('}', _) => single(TokenKind::RBrace),
            ('[', _) => single(TokenKind::LBracket),
            (']', _) => single(TokenKind::RBracket),
            (';', _) => single(TokenKind::Semicolon),
            (',', _) => single(TokenKind::Comma),
            _ => Err(LexerError::at(
                span,
                format!(
                    "Illegal character '{}' at line {}, column {}",
                    ch, span.line, span.col
                ),
            )),
        }
    }

    /// Tokenizes the whole source. The result always ends with an `EOF` token.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_trivia();
            let span = self.span();

            let token = match self.current() {
                None => {
                    tokens.push(Token::new(TokenKind::Eof, "", span));
                    break;
                }
                Some('"') => self.read_string(span)?,
                Some(ch) if ch.is_ascii_digit() => self.read_number(span),
                Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => self.read_identifier(span),
                Some(_) => self.read_operator(span)?,
            };
            tokens.push(token);
        }

        log::trace!("lexed {} tokens", tokens.len());
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn lex_err(source: &str) -> LexerError {
        Lexer::new(source).tokenize().unwrap_err()
    }

    #[test]
    fn test_let_statement() {
        let tokens = Lexer::new("let x = 42;").tokenize().unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::KwLet,
                TokenKind::Identifier,
                TokenKind::Assign,
                TokenKind::Number,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[1].lexeme, "x");
        assert_eq!(tokens[3].lexeme, "42");
    }

    #[test]
    fn test_empty_input_is_just_eof() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
        assert_eq!(kinds("   \n\t  "), vec![TokenKind::Eof]);
        assert_eq!(kinds("// only a comment"), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_all_keywords() {
        assert_eq!(
            kinds("let fn if else while for break continue return print"),
            vec![
                TokenKind::KwLet,
                TokenKind::KwFn,
                TokenKind::KwIf,
                TokenKind::KwElse,
                TokenKind::KwWhile,
                TokenKind::KwFor,
                TokenKind::KwBreak,
                TokenKind::KwContinue,
                TokenKind::KwReturn,
                TokenKind::KwPrint,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keyword_vs_ident() {
        let tokens = Lexer::new("letter iff _for fn_1").tokenize().unwrap();
        assert!(tokens[..4].iter().all(|t| t.kind == TokenKind::Identifier));
        assert_eq!(tokens[3].lexeme, "fn_1");
    }

    #[test]
    fn test_greedy_two_char_operators() {
        assert_eq!(
            kinds("== = != ! <= < >= > && ||"),
            vec![
                TokenKind::Eq,
                TokenKind::Assign,
                TokenKind::NotEq,
                TokenKind::Bang,
                TokenKind::LtEq,
                TokenKind::Lt,
                TokenKind::GtEq,
                TokenKind::Gt,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_arithmetic_and_delimiters() {
        assert_eq!(
            kinds("+-*/%(){}[];,"),
            vec![
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::Semicolon,
                TokenKind::Comma,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_negative_number_is_minus_then_number() {
        let tokens = Lexer::new("-5").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Minus);
        assert_eq!(tokens[1].kind, TokenKind::Number);
        assert_eq!(tokens[1].lexeme, "5");
    }

    #[test]
    fn test_comment_is_skipped() {
        assert_eq!(
            kinds("x // trailing comment\ny"),
            vec![TokenKind::Identifier, TokenKind::Identifier, TokenKind::Eof]
        );
    }

    #[test]
    fn test_division_is_not_a_comment() {
        assert_eq!(
            kinds("a / b"),
            vec![
                TokenKind::Identifier,
                TokenKind::Slash,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_string_literal() {
        let tokens = Lexer::new(r#"print("hello world");"#).tokenize().unwrap();
        assert_eq!(tokens[2].kind, TokenKind::String);
        assert_eq!(tokens[2].lexeme, "hello world");
    }

    #[test]
    fn test_string_escapes() {
        let tokens = Lexer::new(r#""a\nb\t\"q\"\\""#).tokenize().unwrap();
        assert_eq!(tokens[0].lexeme, "a\nb\t\"q\"\\");
    }

    #[test]
    fn test_spans_are_one_based() {
        let tokens = Lexer::new("let x\n  = 1;").tokenize().unwrap();
        assert_eq!(tokens[0].span, Span { line: 1, col: 1 });
        assert_eq!(tokens[1].span, Span { line: 1, col: 5 });
        assert_eq!(tokens[2].span, Span { line: 2, col: 3 });
        assert_eq!(tokens[3].span, Span { line: 2, col: 5 });
        assert_eq!(tokens[4].span, Span { line: 2, col: 6 });
    }

    #[test]
    fn test_eof_span_after_last_char() {
        let tokens = Lexer::new("ab").tokenize().unwrap();
        assert_eq!(tokens.last().unwrap().span, Span { line: 1, col: 3 });
    }

    #[test]
    fn test_unterminated_string_error() {
        let err = lex_err("let s = \"abc");
        assert!(err.message.contains("Unterminated string"));
        assert_eq!((err.line, err.col), (1, 9));
    }

    #[test]
    fn test_single_ampersand_is_error() {
        let err = lex_err("a & b");
        assert!(err.message.contains("'&'"));
        assert!(err.message.contains("&&"));
        assert_eq!((err.line, err.col), (1, 3));
    }

    #[test]
    fn test_single_pipe_is_error() {
        let err = lex_err("a | b");
        assert!(err.message.contains("'|'"));
    }

    #[test]
    fn test_illegal_character_error() {
        let err = lex_err("let x = 1;\nlet y = @;");
        assert!(err.message.contains("Illegal character '@'"));
        assert_eq!((err.line, err.col), (2, 9));
        assert!(err.to_string().starts_with("Lexical error:"));
    }

    #[test]
    fn test_unknown_escape_error() {
        let err = lex_err(r#""\q""#);
        assert!(err.message.contains("escape"));
    }
}

use crate::frontend::parser_error::ParserError;
use crate::frontend::token::{Token, TokenKind};
use crate::lang::ast::{BinaryOp, Expr, FunctionDecl, Item, Program, Stmt, UnaryOp};

/// Recursive-descent parser.
///
/// Consumes the lexer's token list (which always ends in `EOF`) and produces
/// a [`Program`]. Expressions are parsed with one function per precedence
/// level, each a left-associative loop around the next-higher level:
///
/// `or < and < equality < relational < additive < multiplicative < unary < postfix < primary`
///
/// On the first malformed construct the whole parse fails; no partial tree
/// is returned.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let span = tokens
                .last()
                .map(|t| t.span)
                .unwrap_or(crate::frontend::token::Span { line: 1, col: 1 });
            tokens.push(Token::new(TokenKind::Eof, "", span));
        }
        Parser { tokens, pos: 0 }
    }

    /// Returns the current token. Past the end this is the trailing `EOF`.
    fn current(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    /// Kind of the token `offset` positions ahead of the current one.
    fn peek(&self, offset: usize) -> TokenKind {
        let last = self.tokens.len() - 1;
        self.tokens[(self.pos + offset).min(last)].kind
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    /// Consumes the current token if it has the given kind.
    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParserError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.expected(what))
        }
    }

    /// Builds an "Expected X but found Y" error at the current token.
    fn expected(&self, what: &str) -> ParserError {
        let token = self.current();
        self.error(&format!("Expected {} but found {}", what, token.describe()))
    }

    fn error(&self, message: &str) -> ParserError {
        let span = self.current().span;
        ParserError {
            message: format!("{} at line {}, column {}", message, span.line, span.col),
            line: span.line,
            col: span.col,
        }
    }

    /// Parses a whole source unit: function declarations and statements in
    /// any order.
    pub fn parse_program(&mut self) -> Result<Program, ParserError> {
        let mut items = Vec::new();

        while !self.check(TokenKind::Eof) {
            if self.check(TokenKind::KwFn) {
                items.push(Item::Function(self.parse_function()?));
            } else {
                items.push(Item::Stmt(self.parse_statement()?));
            }
        }

        log::debug!("parsed {} top-level items", items.len());
        Ok(Program { items })
    }

    fn parse_function(&mut self) -> Result<FunctionDecl, ParserError> {
        self.expect(TokenKind::KwFn, "'fn'")?;
        let name = self.expect(TokenKind::Identifier, "function name")?.lexeme;
        self.expect(TokenKind::LParen, "'(' after function name")?;

        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                params.push(self.expect(TokenKind::Identifier, "parameter name")?.lexeme);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' after parameters")?;

        let body = self.parse_block()?;
        Ok(FunctionDecl { name, params, body })
    }

    /// `{ stmt* }`
    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParserError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut body = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            body.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(body)
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParserError> {
        match self.current().kind {
            TokenKind::KwLet => self.parse_let(),
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwWhile => self.parse_while(),
            TokenKind::KwFor => self.parse_for(),
            TokenKind::KwBreak => {
                self.advance();
                self.expect(TokenKind::Semicolon, "';' after 'break'")?;
                Ok(Stmt::Break)
            }
            TokenKind::KwContinue => {
                self.advance();
                self.expect(TokenKind::Semicolon, "';' after 'continue'")?;
                Ok(Stmt::Continue)
            }
            TokenKind::KwReturn => self.parse_return(),
            TokenKind::KwPrint => self.parse_print(),
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::KwElse => Err(self.error("'else' branches are not supported")),
            TokenKind::KwFn => Err(self.error("Functions may only be declared at top level")),
            _ => self.parse_expression_statement(),
        }
    }

    /// `let name = expr;`
    fn parse_let(&mut self) -> Result<Stmt, ParserError> {
        self.expect(TokenKind::KwLet, "'let'")?;
        let name = self.expect(TokenKind::Identifier, "variable name")?.lexeme;
        self.expect(TokenKind::Assign, "'=' after variable name")?;
        let value = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "';' after variable declaration")?;
        Ok(Stmt::Assign { name, value })
    }

    /// Expression statement, `name = expr;` or `target[index] = expr;`.
    ///
    /// The left-hand side is parsed as an ordinary expression first; only
    /// when `=` follows is its shape checked as an assignment target.
    fn parse_expression_statement(&mut self) -> Result<Stmt, ParserError> {
        let target = self.parse_expression()?;

        if self.check(TokenKind::Assign) {
            let at = self.error("Invalid assignment target");
            self.advance();
            let value = self.parse_expression()?;
            self.expect(TokenKind::Semicolon, "';' after assignment")?;

            return match target {
                Expr::Ident(name) => Ok(Stmt::Assign { name, value }),
                Expr::Index { array, index } => Ok(Stmt::ArrayAssign {
                    array: *array,
                    index: *index,
                    value,
                }),
                _ => Err(at),
            };
        }

        self.expect(TokenKind::Semicolon, "';' after expression")?;
        Ok(Stmt::Expr(target))
    }

    fn parse_if(&mut self) -> Result<Stmt, ParserError> {
        self.expect(TokenKind::KwIf, "'if'")?;
        self.expect(TokenKind::LParen, "'(' after 'if'")?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')' after if condition")?;
        let body = self.parse_block()?;
        Ok(Stmt::If { cond, body })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParserError> {
        self.expect(TokenKind::KwWhile, "'while'")?;
        self.expect(TokenKind::LParen, "'(' after 'while'")?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')' after while condition")?;
        let body = self.parse_block()?;
        Ok(Stmt::While { cond, body })
    }

    /// `for (init; cond; step) { body }` with every clause optional.
    fn parse_for(&mut self) -> Result<Stmt, ParserError> {
        self.expect(TokenKind::KwFor, "'for'")?;
        self.expect(TokenKind::LParen, "'(' after 'for'")?;

        let init = if self.eat(TokenKind::Semicolon) {
            None
        } else if self.check(TokenKind::KwLet) {
            Some(Box::new(self.parse_let()?))
        } else {
            let init = self.parse_simple_statement()?;
            self.expect(TokenKind::Semicolon, "';' after for initializer")?;
            Some(Box::new(init))
        };

        let cond = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon, "';' after for condition")?;

        let step = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.parse_simple_statement()?))
        };
        self.expect(TokenKind::RParen, "')' after for clauses")?;

        let body = self.parse_block()?;
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    /// `name = expr` or a bare expression, without the terminating `;`.
    fn parse_simple_statement(&mut self) -> Result<Stmt, ParserError> {
        if self.check(TokenKind::Identifier) && self.peek(1) == TokenKind::Assign {
            let name = self.advance().lexeme;
            self.expect(TokenKind::Assign, "'='")?;
            let value = self.parse_expression()?;
            Ok(Stmt::Assign { name, value })
        } else {
            Ok(Stmt::Expr(self.parse_expression()?))
        }
    }

    fn parse_return(&mut self) -> Result<Stmt, ParserError> {
        self.expect(TokenKind::KwReturn, "'return'")?;
        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon, "';' after return statement")?;
        Ok(Stmt::Return(value))
    }

    fn parse_print(&mut self) -> Result<Stmt, ParserError> {
        self.expect(TokenKind::KwPrint, "'print'")?;
        self.expect(TokenKind::LParen, "'(' after 'print'")?;
        let value = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')' after print argument")?;
        self.expect(TokenKind::Semicolon, "';' after print statement")?;
        Ok(Stmt::Print(value))
    }

    pub fn parse_expression(&mut self) -> Result<Expr, ParserError> {
        self.parse_or()
    }

    /// One left-associative precedence level: `next (op next)*`.
    fn parse_binary_level(
        &mut self,
        ops: &[(TokenKind, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, ParserError>,
    ) -> Result<Expr, ParserError> {
        let mut left = next(self)?;
        'outer: loop {
            for &(kind, op) in ops {
                if self.eat(kind) {
                    let right = next(self)?;
                    left = Expr::binary(op, left, right);
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ParserError> {
        self.parse_binary_level(&[(TokenKind::OrOr, BinaryOp::Or)], Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr, ParserError> {
        self.parse_binary_level(&[(TokenKind::AndAnd, BinaryOp::And)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParserError> {
        self.parse_binary_level(
            &[(TokenKind::Eq, BinaryOp::Eq), (TokenKind::NotEq, BinaryOp::NotEq)],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Result<Expr, ParserError> {
        self.parse_binary_level(
            &[
                (TokenKind::Lt, BinaryOp::Lt),
                (TokenKind::LtEq, BinaryOp::LtEq),
                (TokenKind::Gt, BinaryOp::Gt),
                (TokenKind::GtEq, BinaryOp::GtEq),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, ParserError> {
        self.parse_binary_level(
            &[(TokenKind::Plus, BinaryOp::Add), (TokenKind::Minus, BinaryOp::Sub)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParserError> {
        self.parse_binary_level(
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Mod),
            ],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr, ParserError> {
        if self.eat(TokenKind::Minus) {
            return Ok(Expr::unary(UnaryOp::Neg, self.parse_unary()?));
        }
        if self.eat(TokenKind::Bang) {
            return Ok(Expr::unary(UnaryOp::Not, self.parse_unary()?));
        }
        self.parse_postfix()
    }

    /// Primary expression followed by any number of `[index]` suffixes.
    fn parse_postfix(&mut self) -> Result<Expr, ParserError> {
        let mut expr = self.parse_primary()?;
        while self.eat(TokenKind::LBracket) {
            let index = self.parse_expression()?;
            self.expect(TokenKind::RBracket, "']' after index")?;
            expr = Expr::index(expr, index);
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParserError> {
        match self.current().kind {
            TokenKind::Number => {
                let value = self.current().lexeme.parse::<i32>().map_err(|_| {
                    self.error(&format!(
                        "Integer literal '{}' is out of range",
                        self.current().lexeme
                    ))
                })?;
                self.advance();
                Ok(Expr::Number(value))
            }
            TokenKind::String => Ok(Expr::Str(self.advance().lexeme)),
            TokenKind::Identifier => {
                let name = self.advance().lexeme;
                if !self.eat(TokenKind::LParen) {
                    return Ok(Expr::Ident(name));
                }
                let mut args = Vec::new();
                if !self.check(TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expression()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen, "')' after arguments")?;
                Ok(Expr::Call { callee: name, args })
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if !self.check(TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expression()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket, "']' after array elements")?;
                Ok(Expr::Array(items))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')' after expression")?;
                Ok(expr)
            }
            _ => Err(self.expected("expression")),
        }
    }
}

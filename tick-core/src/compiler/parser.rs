//! Predictive recursive-descent parser over the token vector.
//!
//! A single forward cursor with one-token lookahead. Token consumption
//! is strict: every `expect` names the construct it wanted, and the
//! first error aborts the parse.

use super::ast::*;
use super::error::{ParseError, ParseErrorKind, ParseResult};
use super::token::{Token, TokenKind};
use tracing::trace;

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    pub fn parse(mut self) -> ParseResult<Program> {
        let mut program = Program::default();

        while !self.check(TokenKind::Eof) {
            match self.peek().kind {
                TokenKind::Import | TokenKind::From => {
                    program.imports.push(self.parse_import_decl()?)
                }
                TokenKind::Var | TokenKind::Const => {
                    program.globals.push(self.parse_var_decl()?)
                }
                TokenKind::Event => program.events.push(self.parse_event_decl()?),
                TokenKind::Signal => program.signals.push(self.parse_signal_decl()?),
                TokenKind::At => program.processes.push(self.parse_process_decl()?),
                TokenKind::Class => program.classes.push(self.parse_class_decl()?),
                TokenKind::Func => program.functions.push(self.parse_function_decl()?),
                TokenKind::Error => {
                    let tok = self.peek().clone();
                    let coordinate = tok.coordinate();
                    return Err(ParseError::at(
                        ParseErrorKind::Lex(tok.lexeme),
                        coordinate,
                    ));
                }
                _ => {
                    let tok = self.peek();
                    return Err(ParseError::at(
                        ParseErrorKind::UnexpectedTopLevel {
                            found: tok.to_string(),
                        },
                        tok.coordinate(),
                    ));
                }
            }
        }

        trace!(
            target: "tick::parser",
            functions = program.functions.len(),
            processes = program.processes.len(),
            "parsed program"
        );
        Ok(program)
    }

    // ==================== declarations ====================

    fn parse_import_decl(&mut self) -> ParseResult<ImportDecl> {
        if self.matches(TokenKind::From) {
            let module = self.expect_identifier("module name")?;
            self.expect(TokenKind::Import, "'import'")?;

            if self.matches(TokenKind::Star) {
                self.expect(TokenKind::Semicolon, "';' after import")?;
                return Ok(ImportDecl {
                    module,
                    names: Vec::new(),
                    import_all: true,
                });
            }

            let mut names = vec![self.expect_identifier("imported name")?];
            while self.matches(TokenKind::Comma) {
                names.push(self.expect_identifier("imported name")?);
            }
            self.expect(TokenKind::Semicolon, "';' after import")?;
            Ok(ImportDecl {
                module,
                names,
                import_all: false,
            })
        } else {
            self.expect(TokenKind::Import, "'import'")?;
            let module = self.expect_identifier("module name")?;
            self.expect(TokenKind::Semicolon, "';' after import")?;
            Ok(ImportDecl {
                module,
                names: Vec::new(),
                import_all: true,
            })
        }
    }

    fn parse_event_decl(&mut self) -> ParseResult<EventDecl> {
        self.expect(TokenKind::Event, "'event'")?;
        let name = self.expect_identifier("event name")?;
        self.expect(TokenKind::Semicolon, "';' after event declaration")?;
        Ok(EventDecl { name })
    }

    fn parse_signal_decl(&mut self) -> ParseResult<SignalDecl> {
        self.expect(TokenKind::Signal, "'signal'")?;
        let name = self.expect_identifier("signal name")?;

        let arity = if self.matches(TokenKind::LBracket) {
            let size_tok = self.expect(TokenKind::Integer, "array size")?;
            let size = size_tok.lexeme.parse::<u32>().map_err(|_| {
                ParseError::at(
                    ParseErrorKind::InvalidNumber(size_tok.lexeme.clone()),
                    size_tok.coordinate(),
                )
            })?;
            self.expect(TokenKind::RBracket, "']'")?;
            Some(size)
        } else {
            None
        };

        self.expect(TokenKind::Colon, "':' before signal type")?;
        let element_type = self.parse_type()?;
        self.expect(TokenKind::Semicolon, "';' after signal declaration")?;
        Ok(SignalDecl {
            name,
            element_type,
            arity,
        })
    }

    fn parse_process_decl(&mut self) -> ParseResult<ProcessDecl> {
        self.expect(TokenKind::At, "'@'")?;
        let event_name = self.expect_identifier("event name")?;
        self.expect(TokenKind::Process, "'process'")?;
        let name = self.expect_identifier("process name")?;
        let body = self.parse_block()?;
        Ok(ProcessDecl {
            event_name,
            name,
            body,
        })
    }

    fn parse_class_decl(&mut self) -> ParseResult<ClassDecl> {
        self.expect(TokenKind::Class, "'class'")?;
        let name = self.expect_identifier("class name")?;
        self.expect(TokenKind::LBrace, "'{' after class name")?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();

        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            if self.check(TokenKind::Var) {
                self.advance();
                let field_name = self.expect_identifier("field name")?;
                self.expect(TokenKind::Colon, "':' after field name")?;
                let type_name = self.parse_type()?;
                let initializer = if self.matches(TokenKind::Assign) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                self.expect(TokenKind::Semicolon, "';' after field declaration")?;
                fields.push(VarDecl {
                    name: field_name,
                    type_name,
                    initializer,
                    is_const: false,
                });
            } else if self.check(TokenKind::Func) {
                methods.push(self.parse_function_decl()?);
            } else {
                let tok = self.peek();
                return Err(ParseError::at(
                    ParseErrorKind::UnexpectedToken {
                        found: tok.to_string(),
                        expected: "'var' or 'func' in class body".into(),
                    },
                    tok.coordinate(),
                ));
            }
        }

        self.expect(TokenKind::RBrace, "'}' after class body")?;
        Ok(ClassDecl {
            name,
            fields,
            methods,
        })
    }

    fn parse_function_decl(&mut self) -> ParseResult<FunctionDecl> {
        self.expect(TokenKind::Func, "'func'")?;
        let name = self.expect_identifier("function name")?;
        self.expect(TokenKind::LParen, "'(' after function name")?;

        let mut parameters = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let param_name = self.expect_identifier("parameter name")?;
                self.expect(TokenKind::Colon, "':' after parameter name")?;
                let type_name = self.parse_type()?;
                parameters.push(Parameter {
                    name: param_name,
                    type_name,
                });
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::RParen, "')' after parameters")?;
        self.expect(TokenKind::Colon, "':' before return type")?;
        let return_type = self.parse_type()?;
        let body = self.parse_block()?;

        Ok(FunctionDecl {
            name,
            return_type,
            parameters,
            body,
        })
    }

    fn parse_var_decl(&mut self) -> ParseResult<VarDecl> {
        let is_const = self.check(TokenKind::Const);
        self.advance(); // var | const

        let name_tok = self.expect(TokenKind::Identifier, "variable name")?;
        let name = name_tok.lexeme.clone();
        let coord = name_tok.coordinate();

        self.expect(TokenKind::Colon, "':' after variable name")?;
        let type_name = self.parse_type()?;

        let initializer = if self.matches(TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        if is_const && initializer.is_none() {
            return Err(ParseError::at(
                ParseErrorKind::ConstWithoutInitializer(name),
                coord,
            ));
        }

        self.expect(TokenKind::Semicolon, "';' after variable declaration")?;
        Ok(VarDecl {
            name,
            type_name,
            initializer,
            is_const,
        })
    }

    /// Primitive name, class identifier, optional `[]` suffix.
    fn parse_type(&mut self) -> ParseResult<String> {
        let tok = self.peek().clone();
        let mut name = match tok.kind {
            TokenKind::IntType
            | TokenKind::BoolType
            | TokenKind::FloatType
            | TokenKind::DoubleType
            | TokenKind::StringType
            | TokenKind::Identifier => {
                self.advance();
                tok.lexeme
            }
            _ => {
                return Err(ParseError::at(
                    ParseErrorKind::UnexpectedToken {
                        found: tok.to_string(),
                        expected: "type".into(),
                    },
                    tok.coordinate(),
                ))
            }
        };

        if self.check(TokenKind::LBracket) && self.peek_next_is(TokenKind::RBracket) {
            self.advance();
            self.advance();
            name.push_str("[]");
        }

        Ok(name)
    }

    // ==================== statements ====================

    fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            statements.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(statements)
    }

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        match self.peek().kind {
            TokenKind::Var | TokenKind::Const => {
                let decl = self.parse_var_decl()?;
                Ok(Box::new(StmtKind::VarDecl(decl)))
            }
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::While => self.parse_while_stmt(),
            TokenKind::For => self.parse_for_stmt(),
            TokenKind::Return => self.parse_return_stmt(),
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon, "';' after break")?;
                Ok(Box::new(StmtKind::Break))
            }
            TokenKind::LBrace => {
                let body = self.parse_block()?;
                Ok(Box::new(StmtKind::Block(body)))
            }
            _ => {
                let expr = self.parse_expression()?;
                self.expect(TokenKind::Semicolon, "';' after expression")?;
                Ok(Box::new(StmtKind::Expr(expr)))
            }
        }
    }

    fn parse_if_stmt(&mut self) -> ParseResult<Stmt> {
        self.expect(TokenKind::If, "'if'")?;
        self.expect(TokenKind::LParen, "'(' after 'if'")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')' after condition")?;

        let then_branch = self.parse_branch()?;
        let else_branch = if self.matches(TokenKind::Else) {
            Some(self.parse_branch()?)
        } else {
            None
        };

        Ok(Box::new(StmtKind::If {
            condition,
            then_branch,
            else_branch,
        }))
    }

    /// An if/else arm: either a braced block or a single statement.
    fn parse_branch(&mut self) -> ParseResult<Vec<Stmt>> {
        if self.check(TokenKind::LBrace) {
            self.parse_block()
        } else if self.check(TokenKind::If) {
            // else-if chains nest as a single-statement branch
            Ok(vec![self.parse_if_stmt()?])
        } else {
            Ok(vec![self.parse_statement()?])
        }
    }

    fn parse_while_stmt(&mut self) -> ParseResult<Stmt> {
        self.expect(TokenKind::While, "'while'")?;
        self.expect(TokenKind::LParen, "'(' after 'while'")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')' after condition")?;
        let body = self.parse_branch()?;
        Ok(Box::new(StmtKind::While { condition, body }))
    }

    fn parse_for_stmt(&mut self) -> ParseResult<Stmt> {
        self.expect(TokenKind::For, "'for'")?;
        self.expect(TokenKind::LParen, "'(' after 'for'")?;

        let initializer = if self.matches(TokenKind::Semicolon) {
            None
        } else if self.check(TokenKind::Var) {
            let decl = self.parse_var_decl()?;
            Some(Box::new(StmtKind::VarDecl(decl)))
        } else {
            let expr = self.parse_expression()?;
            self.expect(TokenKind::Semicolon, "';' after for initializer")?;
            Some(Box::new(StmtKind::Expr(expr)))
        };

        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon, "';' after for condition")?;

        let step = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::RParen, "')' after for clauses")?;

        let body = self.parse_branch()?;
        Ok(Box::new(StmtKind::For {
            initializer,
            condition,
            step,
            body,
        }))
    }

    fn parse_return_stmt(&mut self) -> ParseResult<Stmt> {
        self.expect(TokenKind::Return, "'return'")?;
        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon, "';' after return statement")?;
        Ok(Box::new(StmtKind::Return(value)))
    }

    // ==================== expressions ====================

    fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.parse_logical_or()?;

        let compound = match self.peek().kind {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinaryOp::Add),
            TokenKind::MinusAssign => Some(BinaryOp::Sub),
            TokenKind::StarAssign => Some(BinaryOp::Mul),
            TokenKind::SlashAssign => Some(BinaryOp::Div),
            TokenKind::PercentAssign => Some(BinaryOp::Mod),
            _ => return Ok(expr),
        };

        let op_tok = self.advance().clone();
        if !expr.is_assignable() {
            return Err(ParseError::at(
                ParseErrorKind::InvalidAssignmentTarget,
                op_tok.coordinate(),
            ));
        }

        // Right-associative.
        let value = self.parse_assignment()?;
        Ok(match compound {
            None => Box::new(ExprKind::Assign {
                target: expr,
                value,
            }),
            Some(op) => Box::new(ExprKind::CompoundAssign {
                target: expr,
                op,
                value,
            }),
        })
    }

    fn parse_logical_or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_logical_and()?;
        while self.matches(TokenKind::OrOr) {
            let right = self.parse_logical_and()?;
            expr = Box::new(ExprKind::Binary {
                left: expr,
                op: BinaryOp::Or,
                right,
            });
        }
        Ok(expr)
    }

    fn parse_logical_and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_equality()?;
        while self.matches(TokenKind::AndAnd) {
            let right = self.parse_equality()?;
            expr = Box::new(ExprKind::Binary {
                left: expr,
                op: BinaryOp::And,
                right,
            });
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_comparison()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::Ne => BinaryOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            expr = Box::new(ExprKind::Binary {
                left: expr,
                op,
                right,
            });
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Ge => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            expr = Box::new(ExprKind::Binary {
                left: expr,
                op,
                right,
            });
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            expr = Box::new(ExprKind::Binary {
                left: expr,
                op,
                right,
            });
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            expr = Box::new(ExprKind::Binary {
                left: expr,
                op,
                right,
            });
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Increment => Some(UnaryOp::Increment),
            TokenKind::Decrement => Some(UnaryOp::Decrement),
            _ => None,
        };

        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Box::new(ExprKind::Unary { op, operand }));
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.matches(TokenKind::LParen) {
                let mut arguments = Vec::new();
                if !self.check(TokenKind::RParen) {
                    loop {
                        arguments.push(self.parse_expression()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen, "')' after arguments")?;
                expr = Box::new(ExprKind::Call {
                    callee: expr,
                    arguments,
                });
            } else if self.matches(TokenKind::Dot) {
                let member = self.expect_identifier("member name after '.'")?;
                expr = Box::new(ExprKind::Member {
                    object: expr,
                    member,
                });
            } else if self.matches(TokenKind::LBracket) {
                let index = self.parse_expression()?;
                self.expect(TokenKind::RBracket, "']' after index")?;
                expr = Box::new(ExprKind::Index {
                    object: expr,
                    index,
                });
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Integer => {
                self.advance();
                let value = tok.lexeme.parse::<i32>().map_err(|_| {
                    ParseError::at(
                        ParseErrorKind::InvalidNumber(tok.lexeme.clone()),
                        tok.coordinate(),
                    )
                })?;
                Ok(Box::new(ExprKind::IntLiteral(value)))
            }
            TokenKind::FloatLit => {
                self.advance();
                let value = tok.lexeme.parse::<f32>().map_err(|_| {
                    ParseError::at(
                        ParseErrorKind::InvalidNumber(tok.lexeme.clone()),
                        tok.coordinate(),
                    )
                })?;
                Ok(Box::new(ExprKind::FloatLiteral(value)))
            }
            TokenKind::DoubleLit => {
                self.advance();
                let value = tok.lexeme.parse::<f64>().map_err(|_| {
                    ParseError::at(
                        ParseErrorKind::InvalidNumber(tok.lexeme.clone()),
                        tok.coordinate(),
                    )
                })?;
                Ok(Box::new(ExprKind::DoubleLiteral(value)))
            }
            TokenKind::Str => {
                self.advance();
                Ok(Box::new(ExprKind::StringLiteral(tok.lexeme)))
            }
            TokenKind::True => {
                self.advance();
                Ok(Box::new(ExprKind::BoolLiteral(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Box::new(ExprKind::BoolLiteral(false)))
            }
            TokenKind::This => {
                self.advance();
                Ok(Box::new(ExprKind::This))
            }
            TokenKind::New => {
                self.advance();
                let class_name = self.expect_identifier("class name after 'new'")?;
                self.expect(TokenKind::LParen, "'(' after class name")?;
                let mut arguments = Vec::new();
                if !self.check(TokenKind::RParen) {
                    loop {
                        arguments.push(self.parse_expression()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen, "')' after constructor arguments")?;
                Ok(Box::new(ExprKind::New {
                    class_name,
                    arguments,
                }))
            }
            TokenKind::Identifier => {
                self.advance();
                Ok(Box::new(ExprKind::Identifier(tok.lexeme)))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(TokenKind::RBracket) {
                    loop {
                        elements.push(self.parse_expression()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket, "']' after array literal")?;
                Ok(Box::new(ExprKind::ArrayLiteral(elements)))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')' after expression")?;
                Ok(expr)
            }
            TokenKind::Error => {
                let coordinate = tok.coordinate();
                Err(ParseError::at(ParseErrorKind::Lex(tok.lexeme), coordinate))
            }
            _ => Err(ParseError::at(
                ParseErrorKind::UnexpectedToken {
                    found: tok.to_string(),
                    expected: "expression".into(),
                },
                tok.coordinate(),
            )),
        }
    }

    // ==================== cursor helpers ====================

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn peek_next_is(&self, kind: TokenKind) -> bool {
        self.tokens
            .get(self.current + 1)
            .map(|t| t.kind == kind)
            .unwrap_or(false)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> &Token {
        let tok = &self.tokens[self.current];
        if tok.kind != TokenKind::Eof {
            self.current += 1;
        }
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance().clone())
        } else {
            let tok = self.peek();
            let err = if tok.kind == TokenKind::Eof {
                ParseError::at_eof(ParseErrorKind::UnexpectedToken {
                    found: tok.to_string(),
                    expected: what.into(),
                })
            } else {
                ParseError::at(
                    ParseErrorKind::UnexpectedToken {
                        found: tok.to_string(),
                        expected: what.into(),
                    },
                    tok.coordinate(),
                )
            };
            Err(err)
        }
    }

    fn expect_identifier(&mut self, what: &str) -> ParseResult<String> {
        Ok(self.expect(TokenKind::Identifier, what)?.lexeme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Lexer;

    fn parse_source(src: &str) -> ParseResult<Program> {
        Parser::new(Lexer::new(src).tokenize()).parse()
    }

    #[test]
    fn test_parse_empty_program() {
        let program = parse_source("").unwrap();
        assert!(program.functions.is_empty());
    }

    #[test]
    fn test_parse_function_decl() {
        let program = parse_source("func main(): int { return 0; }").unwrap();
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.functions[0].name, "main");
        assert_eq!(program.functions[0].return_type, "int");
    }

    #[test]
    fn test_parse_function_with_parameters() {
        let program = parse_source("func add(a: int, b: int): int { return a + b; }").unwrap();
        let func = &program.functions[0];
        assert_eq!(func.parameters.len(), 2);
        assert_eq!(func.parameters[0].name, "a");
        assert_eq!(func.parameters[1].type_name, "int");
    }

    #[test]
    fn test_parse_event_and_signal() {
        let program = parse_source("event tick; signal s: int;").unwrap();
        assert_eq!(program.events[0].name, "tick");
        assert_eq!(program.signals[0].name, "s");
        assert_eq!(program.signals[0].element_type, "int");
        assert_eq!(program.signals[0].arity, None);
    }

    #[test]
    fn test_parse_signal_with_arity() {
        let program = parse_source("signal r[4]: int;").unwrap();
        assert_eq!(program.signals[0].arity, Some(4));
    }

    #[test]
    fn test_parse_process_decl() {
        let program = parse_source("@tick process worker { s.emit(1); }").unwrap();
        assert_eq!(program.processes.len(), 1);
        assert_eq!(program.processes[0].event_name, "tick");
        assert_eq!(program.processes[0].name, "worker");
    }

    #[test]
    fn test_parse_class_decl() {
        let program = parse_source(
            "class Counter { var count: int; func get(): int { return count; } }",
        )
        .unwrap();
        let class = &program.classes[0];
        assert_eq!(class.name, "Counter");
        assert_eq!(class.fields.len(), 1);
        assert_eq!(class.methods.len(), 1);
    }

    #[test]
    fn test_parse_class_field_initializer() {
        let program = parse_source("class P { var x: int = 3; }").unwrap();
        assert!(program.classes[0].fields[0].initializer.is_some());
    }

    #[test]
    fn test_parse_global_var_and_const() {
        let program = parse_source("var x: int = 1; const y: int = 2;").unwrap();
        assert_eq!(program.globals.len(), 2);
        assert!(!program.globals[0].is_const);
        assert!(program.globals[1].is_const);
    }

    #[test]
    fn test_const_without_initializer_rejected() {
        let result = parse_source("const x: int;");
        assert!(matches!(
            result.unwrap_err().kind,
            ParseErrorKind::ConstWithoutInitializer(_)
        ));
    }

    #[test]
    fn test_parse_imports() {
        let program = parse_source("import util; from math import add, sub; from m import *;")
            .unwrap();
        assert_eq!(program.imports.len(), 3);
        assert!(program.imports[0].import_all);
        assert_eq!(program.imports[1].names, vec!["add", "sub"]);
        assert!(program.imports[2].import_all);
    }

    #[test]
    fn test_parse_precedence_shape() {
        let program = parse_source("func f(): int { return 1 + 2 * 3; }").unwrap();
        let body = &program.functions[0].body;
        let StmtKind::Return(Some(expr)) = body[0].as_ref() else {
            panic!("expected return");
        };
        // `+` at the root with `*` on the right.
        let ExprKind::Binary { op, right, .. } = expr.as_ref() else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            right.as_ref(),
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_assignment_right_assoc() {
        let program = parse_source("func f(): int { a = b = 1; return 0; }").unwrap();
        let StmtKind::Expr(expr) = program.functions[0].body[0].as_ref() else {
            panic!("expected expression statement");
        };
        let ExprKind::Assign { value, .. } = expr.as_ref() else {
            panic!("expected assignment");
        };
        assert!(matches!(value.as_ref(), ExprKind::Assign { .. }));
    }

    #[test]
    fn test_invalid_assignment_target() {
        let result = parse_source("func f(): int { 1 = 2; return 0; }");
        assert!(matches!(
            result.unwrap_err().kind,
            ParseErrorKind::InvalidAssignmentTarget
        ));
    }

    #[test]
    fn test_parse_compound_assignment() {
        let program = parse_source("func f(): int { a += 2; return a; }").unwrap();
        let StmtKind::Expr(expr) = program.functions[0].body[0].as_ref() else {
            panic!("expected expression statement");
        };
        assert!(matches!(
            expr.as_ref(),
            ExprKind::CompoundAssign {
                op: BinaryOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_if_else_chain() {
        let src = "func f(): int { if (a) { return 1; } else if (b) { return 2; } else { return 3; } }";
        assert!(parse_source(src).is_ok());
    }

    #[test]
    fn test_parse_while_and_break() {
        let src = "func f(): int { while (true) { break; } return 0; }";
        assert!(parse_source(src).is_ok());
    }

    #[test]
    fn test_parse_for_loop() {
        let src = "func f(): int { for (var i: int = 0; i < 10; i = i + 1) { } return 0; }";
        let program = parse_source(src).unwrap();
        let StmtKind::For {
            initializer,
            condition,
            step,
            ..
        } = program.functions[0].body[0].as_ref()
        else {
            panic!("expected for");
        };
        assert!(initializer.is_some());
        assert!(condition.is_some());
        assert!(step.is_some());
    }

    #[test]
    fn test_parse_for_loop_empty_clauses() {
        let src = "func f(): int { for (;;) { break; } return 0; }";
        assert!(parse_source(src).is_ok());
    }

    #[test]
    fn test_parse_new_expression() {
        let src = "func f(): int { var c: Counter = new Counter(1, 2); return 0; }";
        assert!(parse_source(src).is_ok());
    }

    #[test]
    fn test_parse_member_call_chain() {
        let src = "func f(): int { return obj.inner.get(); }";
        assert!(parse_source(src).is_ok());
    }

    #[test]
    fn test_parse_index_expression() {
        let src = "func f(): int { var a: int[] = [1, 2, 3]; return a[1]; }";
        assert!(parse_source(src).is_ok());
    }

    #[test]
    fn test_parse_array_type_suffix() {
        let program =
            parse_source("func f(): int { var a: int[] = [1]; return 0; }").unwrap();
        let StmtKind::VarDecl(decl) = program.functions[0].body[0].as_ref() else {
            panic!("expected var decl");
        };
        assert_eq!(decl.type_name, "int[]");
    }

    #[test]
    fn test_parse_prefix_increment() {
        let src = "func f(): int { ++a; return a; }";
        assert!(parse_source(src).is_ok());
    }

    #[test]
    fn test_parse_error_top_level() {
        let result = parse_source("return 1;");
        assert!(matches!(
            result.unwrap_err().kind,
            ParseErrorKind::UnexpectedTopLevel { .. }
        ));
    }

    #[test]
    fn test_parse_error_missing_semicolon() {
        assert!(parse_source("func f(): int { return 1 }").is_err());
    }

    #[test]
    fn test_parse_error_from_lex_error_token() {
        let result = parse_source("func f(): int { return \"oops; }");
        assert!(matches!(result.unwrap_err().kind, ParseErrorKind::Lex(_)));
    }

    #[test]
    fn test_parse_signal_magic_calls() {
        let src = "func main(): int { s.emit(99); return s.recv(); }";
        assert!(parse_source(src).is_ok());
    }
}

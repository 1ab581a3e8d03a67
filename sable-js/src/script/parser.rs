//! Parser.
//!
//! Recursive descent over the token stream with precedence climbing for
//! binary operators. Semicolons are inserted at line breaks, before `}` and
//! at the end of input.

use std::sync::Arc;

use hashbrown::HashSet;

use crate::builtins::regexp::compile_pattern;
use crate::coerce::number_to_string;
use crate::error::{Result, VmError};

use super::ast::*;
use super::lexer::Lexer;
use super::token::{Span, Token, TokenKind};

/// Declarations collected while parsing one function body.
#[derive(Default)]
struct FunctionContext {
    var_names: Vec<String>,
    uses_arguments: bool,
    is_arrow: bool,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    functions: Vec<FunctionContext>,
    /// Inside a `for (...;` head, where `in` ends the expression.
    no_in: bool,
    /// Nesting of the node being parsed, bounded by [`MAX_NESTING`].
    depth: usize,
    /// Positions of `(` tokens whose matching `)` is followed by `=>`.
    arrow_heads: HashSet<usize>,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self> {
        let tokens = Lexer::new(source).tokenize()?;
        let arrow_heads = arrow_heads(&tokens);
        Ok(Parser {
            tokens,
            pos: 0,
            functions: vec![FunctionContext::default()],
            no_in: false,
            depth: 0,
            arrow_heads,
        })
    }

    /// Parse the whole source as a script.
    pub fn parse_script(&mut self) -> Result<Program> {
        let start = self.current_span();
        let mut body = Vec::new();
        while !self.is_eof() {
            body.push(self.parse_statement()?);
        }
        let context = self.functions.pop().unwrap_or_default();
        Ok(Program {
            body,
            var_names: context.var_names,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        self.enter()?;
        let result = self.parse_statement_inner();
        self.depth -= 1;
        result
    }

    fn parse_statement_inner(&mut self) -> Result<Statement> {
        match &self.current().kind {
            TokenKind::Semicolon => {
                let span = self.current_span();
                self.advance();
                Ok(Statement::Empty(span))
            }
            TokenKind::LeftBrace => Ok(Statement::Block(self.parse_block()?)),
            TokenKind::Var | TokenKind::Let | TokenKind::Const => {
                let decl = self.parse_variable_declaration()?;
                self.consume_semicolon()?;
                Ok(Statement::Variable(decl))
            }
            TokenKind::If => self.parse_if_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::Do => self.parse_do_while_statement(),
            TokenKind::Switch => self.parse_switch_statement(),
            TokenKind::Break => Ok(Statement::Break(self.parse_jump()?)),
            TokenKind::Continue => Ok(Statement::Continue(self.parse_jump()?)),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Throw => self.parse_throw_statement(),
            TokenKind::Try => self.parse_try_statement(),
            TokenKind::Debugger => {
                let span = self.current_span();
                self.advance();
                self.consume_semicolon()?;
                Ok(Statement::Debugger(span))
            }
            TokenKind::Function => {
                let function = self.parse_function(true)?;
                self.declare_var(function.name());
                Ok(Statement::Function(function))
            }
            TokenKind::Identifier(_) if self.peek_is(&TokenKind::Colon) => {
                self.parse_labeled_statement()
            }
            TokenKind::Class
            | TokenKind::Import
            | TokenKind::Export
            | TokenKind::With
            | TokenKind::Enum => Err(self.unsupported()),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_block(&mut self) -> Result<BlockStmt> {
        let start = self.current_span();
        self.expect(&TokenKind::LeftBrace)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_eof() {
            body.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(BlockStmt {
            body,
            span: start.merge(self.prev_span()),
        })
    }

    /// `var`/`let`/`const` declarators, without the terminating semicolon.
    fn parse_variable_declaration(&mut self) -> Result<VariableDecl> {
        let start = self.current_span();
        let kind = match self.current().kind {
            TokenKind::Var => VariableKind::Var,
            TokenKind::Let => VariableKind::Let,
            _ => VariableKind::Const,
        };
        self.advance();

        let mut declarations = Vec::new();
        loop {
            let id = self.parse_binding_identifier()?;
            if kind == VariableKind::Var {
                self.declare_var(&id.name);
            }
            let init = if self.eat(&TokenKind::Assign) {
                Some(self.parse_assignment_expression()?)
            } else {
                None
            };
            if kind == VariableKind::Const && init.is_none() && !self.check(&TokenKind::In) {
                return Err(self.error_here("Missing initializer in const declaration"));
            }
            declarations.push(VariableDeclarator {
                span: id.span.merge(self.prev_span()),
                id,
                init,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        Ok(VariableDecl {
            kind,
            declarations,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_if_statement(&mut self) -> Result<Statement> {
        let start = self.current_span();
        self.advance();
        self.expect(&TokenKind::LeftParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RightParen)?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Statement::If(IfStmt {
            test,
            consequent,
            alternate,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_for_statement(&mut self) -> Result<Statement> {
        let start = self.current_span();
        self.advance();
        self.expect(&TokenKind::LeftParen)?;

        let saved = std::mem::replace(&mut self.no_in, true);
        let init = match self.current().kind {
            TokenKind::Semicolon => None,
            TokenKind::Var | TokenKind::Let | TokenKind::Const => {
                Some(ForInit::Variable(self.parse_variable_declaration()?))
            }
            _ => Some(ForInit::Expression(self.parse_expression()?)),
        };
        self.no_in = saved;

        if self.eat(&TokenKind::In) {
            let left = match init {
                Some(ForInit::Variable(mut decl))
                    if decl.declarations.len() == 1 && decl.declarations[0].init.is_none() =>
                {
                    let declarator = decl.declarations.remove(0);
                    ForInLeft::Declaration(decl.kind, declarator.id)
                }
                Some(ForInit::Expression(target)) if target.is_assignment_target() => {
                    ForInLeft::Target(target)
                }
                _ => return Err(self.error_here("Invalid left-hand side in for-in loop")),
            };
            let right = self.parse_expression()?;
            self.expect(&TokenKind::RightParen)?;
            let body = Box::new(self.parse_statement()?);
            return Ok(Statement::ForIn(ForInStmt {
                left,
                right,
                body,
                span: start.merge(self.prev_span()),
            }));
        }

        if matches!(&self.current().kind, TokenKind::Identifier(name) if name == "of") {
            return Err(self.unsupported());
        }

        self.expect(&TokenKind::Semicolon)?;
        let test = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;
        let update = if self.check(&TokenKind::RightParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::RightParen)?;
        let body = Box::new(self.parse_statement()?);

        Ok(Statement::For(ForStmt {
            init,
            test,
            update,
            body,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_while_statement(&mut self) -> Result<Statement> {
        let start = self.current_span();
        self.advance();
        self.expect(&TokenKind::LeftParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RightParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::While(WhileStmt {
            test,
            body,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_do_while_statement(&mut self) -> Result<Statement> {
        let start = self.current_span();
        self.advance();
        let body = Box::new(self.parse_statement()?);
        self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LeftParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RightParen)?;
        // The semicolon after `do ... while (x)` is always optional.
        self.eat(&TokenKind::Semicolon);
        Ok(Statement::DoWhile(DoWhileStmt {
            body,
            test,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_switch_statement(&mut self) -> Result<Statement> {
        let start = self.current_span();
        self.advance();
        self.expect(&TokenKind::LeftParen)?;
        let discriminant = self.parse_expression()?;
        self.expect(&TokenKind::RightParen)?;
        self.expect(&TokenKind::LeftBrace)?;

        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.check(&TokenKind::RightBrace) && !self.is_eof() {
            let case_start = self.current_span();
            let test = if self.eat(&TokenKind::Case) {
                Some(self.parse_expression()?)
            } else if self.check(&TokenKind::Default) {
                if seen_default {
                    return Err(self.error_here("More than one default clause in switch statement"));
                }
                seen_default = true;
                self.advance();
                None
            } else {
                return Err(self.unexpected());
            };
            self.expect(&TokenKind::Colon)?;
            let mut consequent = Vec::new();
            while !matches!(
                self.current().kind,
                TokenKind::Case | TokenKind::Default | TokenKind::RightBrace | TokenKind::Eof
            ) {
                consequent.push(self.parse_statement()?);
            }
            cases.push(SwitchCase {
                test,
                consequent,
                span: case_start.merge(self.prev_span()),
            });
        }
        self.expect(&TokenKind::RightBrace)?;

        Ok(Statement::Switch(SwitchStmt {
            discriminant,
            cases,
            span: start.merge(self.prev_span()),
        }))
    }

    /// `break` / `continue` with an optional label on the same line.
    fn parse_jump(&mut self) -> Result<JumpStmt> {
        let start = self.current_span();
        self.advance();
        let label = match &self.current().kind {
            TokenKind::Identifier(name) if !self.current().newline_before => {
                let name = name.clone();
                self.advance();
                Some(name)
            }
            _ => None,
        };
        self.consume_semicolon()?;
        Ok(JumpStmt {
            label,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_return_statement(&mut self) -> Result<Statement> {
        let start = self.current_span();
        if self.functions.len() < 2 {
            return Err(self.error_here("Illegal return statement"));
        }
        self.advance();
        let argument = if self.at_statement_end() {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_semicolon()?;
        Ok(Statement::Return(ReturnStmt {
            argument,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_throw_statement(&mut self) -> Result<Statement> {
        let start = self.current_span();
        self.advance();
        if self.current().newline_before {
            return Err(self.error_here("Illegal newline after throw"));
        }
        let argument = self.parse_expression()?;
        self.consume_semicolon()?;
        Ok(Statement::Throw(ThrowStmt {
            argument,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_try_statement(&mut self) -> Result<Statement> {
        let start = self.current_span();
        self.advance();
        let block = self.parse_block()?;

        let handler = if self.check(&TokenKind::Catch) {
            let catch_start = self.current_span();
            self.advance();
            let param = if self.eat(&TokenKind::LeftParen) {
                let param = self.parse_binding_identifier()?;
                self.expect(&TokenKind::RightParen)?;
                Some(param)
            } else {
                None
            };
            let body = self.parse_block()?;
            Some(CatchClause {
                param,
                body,
                span: catch_start.merge(self.prev_span()),
            })
        } else {
            None
        };

        let finalizer = if self.eat(&TokenKind::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };

        if handler.is_none() && finalizer.is_none() {
            return Err(self.error_here("Missing catch or finally after try"));
        }

        Ok(Statement::Try(TryStmt {
            block,
            handler,
            finalizer,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_labeled_statement(&mut self) -> Result<Statement> {
        let start = self.current_span();
        let label = self.parse_identifier()?.name;
        self.expect(&TokenKind::Colon)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::Labeled(LabeledStmt {
            label,
            body,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_expression_statement(&mut self) -> Result<Statement> {
        let start = self.current_span();
        let expression = self.parse_expression()?;
        self.consume_semicolon()?;
        Ok(Statement::Expression(ExpressionStmt {
            expression,
            span: start.merge(self.prev_span()),
        }))
    }

    /// `function [name](params) { body }`. Declarations require the name.
    fn parse_function(&mut self, is_declaration: bool) -> Result<Arc<FunctionNode>> {
        let start = self.current_span();
        self.expect(&TokenKind::Function)?;
        if self.check(&TokenKind::Star) {
            return Err(self.unsupported());
        }
        let id = if let TokenKind::Identifier(_) = self.current().kind {
            Some(self.parse_identifier()?)
        } else if is_declaration {
            return Err(self.error_here("Function statements require a function name"));
        } else {
            None
        };

        self.expect(&TokenKind::LeftParen)?;
        let params = self.parse_params()?;
        self.functions.push(FunctionContext::default());
        let body = self.parse_function_body();
        let context = self.functions.pop().unwrap_or_default();
        let body = body?;

        Ok(Arc::new(FunctionNode {
            id,
            params,
            body,
            is_arrow: false,
            var_names: context.var_names,
            uses_arguments: context.uses_arguments,
            span: start.merge(self.prev_span()),
        }))
    }

    /// Parameter list after `(`, consuming the closing `)`.
    fn parse_params(&mut self) -> Result<Vec<Identifier>> {
        let mut params = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            params.push(self.parse_binding_identifier()?);
            if matches!(self.current().kind, TokenKind::Assign) {
                return Err(self.unsupported());
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(params)
    }

    fn parse_function_body(&mut self) -> Result<Vec<Statement>> {
        let saved = std::mem::replace(&mut self.no_in, false);
        let block = self.parse_block();
        self.no_in = saved;
        Ok(block?.body)
    }

    /// Arrow function starting at its parameters.
    fn parse_arrow_function(&mut self) -> Result<Expression> {
        let start = self.current_span();
        let params = if self.eat(&TokenKind::LeftParen) {
            self.parse_params()?
        } else {
            vec![self.parse_binding_identifier()?]
        };
        if self.current().newline_before {
            return Err(self.unexpected());
        }
        self.expect(&TokenKind::Arrow)?;

        self.functions.push(FunctionContext {
            is_arrow: true,
            ..FunctionContext::default()
        });
        let body = if self.check(&TokenKind::LeftBrace) {
            self.parse_function_body()
        } else {
            self.parse_assignment_expression().map(|expression| {
                let span = expression.span();
                vec![Statement::Return(ReturnStmt {
                    argument: Some(expression),
                    span,
                })]
            })
        };
        let context = self.functions.pop().unwrap_or_default();
        let body = body?;

        Ok(Expression::Function(Arc::new(FunctionNode {
            id: None,
            params,
            body,
            is_arrow: true,
            var_names: context.var_names,
            uses_arguments: false,
            span: start.merge(self.prev_span()),
        })))
    }

    pub fn parse_expression(&mut self) -> Result<Expression> {
        let start = self.current_span();
        let first = self.parse_assignment_expression()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut expressions = vec![first];
        while self.eat(&TokenKind::Comma) {
            expressions.push(self.parse_assignment_expression()?);
        }
        Ok(Expression::Sequence(SequenceExpr {
            expressions,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_assignment_expression(&mut self) -> Result<Expression> {
        self.enter()?;
        let result = self.parse_assignment_inner();
        self.depth -= 1;
        result
    }

    fn parse_assignment_inner(&mut self) -> Result<Expression> {
        if self.is_arrow_ahead() {
            return self.parse_arrow_function();
        }

        let start = self.current_span();
        let target = self.parse_conditional_expression()?;

        let Some(operator) = assignment_operator(&self.current().kind) else {
            return Ok(target);
        };
        if !target.is_assignment_target() {
            return Err(self.error_here("Invalid left-hand side in assignment"));
        }
        self.advance();
        let value = self.parse_assignment_expression()?;

        Ok(Expression::Assignment(AssignmentExpr {
            operator,
            target: Box::new(target),
            value: Box::new(value),
            span: start.merge(self.prev_span()),
        }))
    }

    /// `x =>` or a parenthesised list followed by `=>`.
    fn is_arrow_ahead(&self) -> bool {
        match self.current().kind {
            TokenKind::Identifier(_) => self.peek_is(&TokenKind::Arrow),
            TokenKind::LeftParen => self.arrow_heads.contains(&self.pos),
            _ => false,
        }
    }

    fn parse_conditional_expression(&mut self) -> Result<Expression> {
        let start = self.current_span();
        let test = self.parse_binary_expression(0)?;
        if !self.eat(&TokenKind::Question) {
            return Ok(test);
        }
        let saved = std::mem::replace(&mut self.no_in, false);
        let consequent = self.parse_assignment_expression();
        self.no_in = saved;
        let consequent = consequent?;
        self.expect(&TokenKind::Colon)?;
        let alternate = self.parse_assignment_expression()?;
        Ok(Expression::Conditional(ConditionalExpr {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
            span: start.merge(self.prev_span()),
        }))
    }

    /// Precedence climbing. `**` is right-associative.
    ///
    /// Every fold nests the expression built so far one level deeper, so
    /// each one counts against the nesting limit until the chain ends.
    fn parse_binary_expression(&mut self, min_prec: u8) -> Result<Expression> {
        let mark = self.depth;
        let result = self.parse_binary_chain(min_prec);
        self.depth = mark;
        result
    }

    fn parse_binary_chain(&mut self, min_prec: u8) -> Result<Expression> {
        let start = self.current_span();
        let mut left = self.parse_unary_expression()?;

        loop {
            let kind = &self.current().kind;
            if self.no_in && *kind == TokenKind::In {
                break;
            }
            let Some((operator, prec)) = binary_operator(kind) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.advance();
            self.enter()?;
            let next_prec = if operator == Operator::Binary(BinaryOp::Exp) {
                prec
            } else {
                prec + 1
            };
            let right = Box::new(self.parse_binary_expression(next_prec)?);
            let span = start.merge(self.prev_span());
            let left_box = Box::new(left);

            left = match operator {
                Operator::Logical(operator) => Expression::Logical(LogicalExpr {
                    operator,
                    left: left_box,
                    right,
                    span,
                }),
                Operator::Binary(operator) => Expression::Binary(BinaryExpr {
                    operator,
                    left: left_box,
                    right,
                    span,
                }),
            };
        }

        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> Result<Expression> {
        let start = self.current_span();
        let operator = match self.current().kind {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Minus => UnaryOp::Minus,
            TokenKind::Typeof => UnaryOp::Typeof,
            TokenKind::Void => UnaryOp::Void,
            TokenKind::Delete => UnaryOp::Delete,
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let operator = if self.check(&TokenKind::PlusPlus) {
                    UpdateOp::Increment
                } else {
                    UpdateOp::Decrement
                };
                self.advance();
                let argument = self.parse_nested_unary()?;
                if !argument.is_assignment_target() {
                    return Err(self.error_here("Invalid left-hand side expression in prefix operation"));
                }
                return Ok(Expression::Update(UpdateExpr {
                    operator,
                    argument: Box::new(argument),
                    prefix: true,
                    span: start.merge(self.prev_span()),
                }));
            }
            _ => return self.parse_update_expression(),
        };
        self.advance();
        let argument = self.parse_nested_unary()?;
        Ok(Expression::Unary(UnaryExpr {
            operator,
            argument: Box::new(argument),
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_nested_unary(&mut self) -> Result<Expression> {
        self.enter()?;
        let result = self.parse_unary_expression();
        self.depth -= 1;
        result
    }

    /// Postfix `++`/`--` must sit on the same line as their operand.
    fn parse_update_expression(&mut self) -> Result<Expression> {
        let start = self.current_span();
        let argument = self.parse_left_hand_side_expression()?;
        let operator = match self.current().kind {
            TokenKind::PlusPlus if !self.current().newline_before => UpdateOp::Increment,
            TokenKind::MinusMinus if !self.current().newline_before => UpdateOp::Decrement,
            _ => return Ok(argument),
        };
        if !argument.is_assignment_target() {
            return Err(self.error_here("Invalid left-hand side expression in postfix operation"));
        }
        self.advance();
        Ok(Expression::Update(UpdateExpr {
            operator,
            argument: Box::new(argument),
            prefix: false,
            span: start.merge(self.prev_span()),
        }))
    }

    /// Member and call suffixes count against the nesting limit like
    /// binary folds.
    fn parse_left_hand_side_expression(&mut self) -> Result<Expression> {
        let mark = self.depth;
        let result = self.parse_call_chain();
        self.depth = mark;
        result
    }

    fn parse_call_chain(&mut self) -> Result<Expression> {
        let start = self.current_span();
        let mut expr = if self.check(&TokenKind::New) {
            self.parse_new_expression()?
        } else {
            self.parse_primary_expression()?
        };

        loop {
            if matches!(
                self.current().kind,
                TokenKind::Dot | TokenKind::LeftBracket | TokenKind::LeftParen
            ) {
                self.enter()?;
            }
            expr = match self.current().kind {
                TokenKind::Dot | TokenKind::LeftBracket => self.parse_member_suffix(expr, start)?,
                TokenKind::LeftParen => {
                    self.advance();
                    let arguments = self.parse_arguments()?;
                    Expression::Call(CallExpr {
                        callee: Box::new(expr),
                        arguments,
                        span: start.merge(self.prev_span()),
                    })
                }
                _ => break,
            };
        }

        Ok(expr)
    }

    /// `new` callee: a member expression, then optional arguments.
    fn parse_new_expression(&mut self) -> Result<Expression> {
        let start = self.current_span();
        let mark = self.depth;
        self.advance();
        self.enter()?;
        let callee = if self.check(&TokenKind::New) {
            self.parse_new_expression()
        } else {
            self.parse_primary_expression()
        };
        let mut callee = callee?;
        while matches!(self.current().kind, TokenKind::Dot | TokenKind::LeftBracket) {
            self.enter()?;
            callee = self.parse_member_suffix(callee, start)?;
        }
        let arguments = if self.eat(&TokenKind::LeftParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        self.depth = mark;
        Ok(Expression::New(NewExpr {
            callee: Box::new(callee),
            arguments,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_member_suffix(&mut self, object: Expression, start: Span) -> Result<Expression> {
        let property = if self.eat(&TokenKind::Dot) {
            match self.current().kind.property_name() {
                Some(name) => {
                    self.advance();
                    PropertyName::Named(name)
                }
                None => return Err(self.unexpected()),
            }
        } else {
            self.expect(&TokenKind::LeftBracket)?;
            let saved = std::mem::replace(&mut self.no_in, false);
            let property = self.parse_expression();
            self.no_in = saved;
            let property = property?;
            self.expect(&TokenKind::RightBracket)?;
            PropertyName::Computed(Box::new(property))
        };
        Ok(Expression::Member(MemberExpr {
            object: Box::new(object),
            property,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_primary_expression(&mut self) -> Result<Expression> {
        let start = self.current_span();
        let token = self.current().clone();

        let expr = match token.kind {
            TokenKind::This => Expression::This(start),
            TokenKind::Identifier(_) => {
                let id = self.parse_identifier()?;
                if id.name == "arguments" {
                    self.mark_arguments();
                }
                return Ok(Expression::Identifier(id));
            }
            TokenKind::Number(n) => Expression::Literal(Literal::Number(n), start),
            TokenKind::String(s) => Expression::Literal(Literal::String(s), start),
            TokenKind::True => Expression::Literal(Literal::Boolean(true), start),
            TokenKind::False => Expression::Literal(Literal::Boolean(false), start),
            TokenKind::Null => Expression::Literal(Literal::Null, start),
            TokenKind::RegExp { pattern, flags } => {
                if let Err(message) = compile_pattern(&pattern, &flags) {
                    return Err(self.error_here(message));
                }
                Expression::RegExp(RegExpLiteral {
                    pattern,
                    flags,
                    span: start,
                })
            }
            TokenKind::LeftParen => {
                self.advance();
                self.enter()?;
                let saved = std::mem::replace(&mut self.no_in, false);
                let expr = self.parse_expression();
                self.no_in = saved;
                self.depth -= 1;
                let expr = expr?;
                self.expect(&TokenKind::RightParen)?;
                return Ok(expr);
            }
            TokenKind::LeftBracket => return self.parse_array_expression(),
            TokenKind::LeftBrace => return self.parse_object_expression(),
            TokenKind::Function => return Ok(Expression::Function(self.parse_function(false)?)),
            TokenKind::Class | TokenKind::Super | TokenKind::Import | TokenKind::Yield => {
                return Err(self.unsupported())
            }
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(expr)
    }

    fn parse_array_expression(&mut self) -> Result<Expression> {
        let start = self.current_span();
        self.expect(&TokenKind::LeftBracket)?;
        self.enter()?;
        let saved = std::mem::replace(&mut self.no_in, false);
        let result = self.parse_array_elements();
        self.no_in = saved;
        self.depth -= 1;
        let elements = result?;
        Ok(Expression::Array(ArrayExpr {
            elements,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_array_elements(&mut self) -> Result<Vec<Option<Expression>>> {
        let mut elements = Vec::new();
        loop {
            match self.current().kind {
                TokenKind::RightBracket => {
                    self.advance();
                    return Ok(elements);
                }
                TokenKind::Comma => {
                    self.advance();
                    elements.push(None);
                }
                TokenKind::Ellipsis => return Err(self.unsupported()),
                _ => {
                    elements.push(Some(self.parse_assignment_expression()?));
                    if !self.eat(&TokenKind::Comma) {
                        self.expect(&TokenKind::RightBracket)?;
                        return Ok(elements);
                    }
                }
            }
        }
    }

    fn parse_object_expression(&mut self) -> Result<Expression> {
        let start = self.current_span();
        self.expect(&TokenKind::LeftBrace)?;
        self.enter()?;
        let saved = std::mem::replace(&mut self.no_in, false);
        let result = self.parse_object_properties();
        self.no_in = saved;
        self.depth -= 1;
        let properties = result?;
        Ok(Expression::Object(ObjectExpr {
            properties,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_object_properties(&mut self) -> Result<Vec<ObjectProperty>> {
        let mut properties = Vec::new();
        while !self.eat(&TokenKind::RightBrace) {
            properties.push(self.parse_object_property()?);
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RightBrace)?;
                break;
            }
        }
        Ok(properties)
    }

    fn parse_object_property(&mut self) -> Result<ObjectProperty> {
        let start = self.current_span();
        if self.check(&TokenKind::Ellipsis) {
            return Err(self.unsupported());
        }
        if let TokenKind::Identifier(name) = &self.current().kind {
            let accessor = (name == "get" || name == "set")
                && !matches!(
                    self.peek_kind(),
                    TokenKind::Colon
                        | TokenKind::LeftParen
                        | TokenKind::Comma
                        | TokenKind::RightBrace
                );
            if accessor {
                return Err(self.error_here("Getters and setters are not supported"));
            }
        }

        let shorthand = match &self.current().kind {
            TokenKind::Identifier(name)
                if matches!(self.peek_kind(), TokenKind::Comma | TokenKind::RightBrace) =>
            {
                Some(name.clone())
            }
            _ => None,
        };
        if let Some(name) = shorthand {
            let id = self.parse_identifier()?;
            if name == "arguments" {
                self.mark_arguments();
            }
            return Ok(ObjectProperty {
                key: PropertyName::Named(name),
                value: Expression::Identifier(id),
                span: start,
            });
        }

        let key = self.parse_property_name()?;
        let value = if self.check(&TokenKind::LeftParen) {
            // Method shorthand `name(params) { body }`.
            self.advance();
            let params = self.parse_params()?;
            self.functions.push(FunctionContext::default());
            let body = self.parse_function_body();
            let context = self.functions.pop().unwrap_or_default();
            let id = match &key {
                PropertyName::Named(name) => Some(Identifier {
                    name: name.clone(),
                    span: start,
                }),
                PropertyName::Computed(_) => None,
            };
            Expression::Function(Arc::new(FunctionNode {
                id,
                params,
                body: body?,
                is_arrow: false,
                var_names: context.var_names,
                uses_arguments: context.uses_arguments,
                span: start.merge(self.prev_span()),
            }))
        } else {
            self.expect(&TokenKind::Colon)?;
            self.parse_assignment_expression()?
        };

        Ok(ObjectProperty {
            key,
            value,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_property_name(&mut self) -> Result<PropertyName> {
        let name = match &self.current().kind {
            TokenKind::String(s) => s.clone(),
            TokenKind::Number(n) => number_to_string(*n),
            TokenKind::LeftBracket => {
                self.advance();
                let expr = self.parse_assignment_expression()?;
                self.expect(&TokenKind::RightBracket)?;
                return Ok(PropertyName::Computed(Box::new(expr)));
            }
            other => match other.property_name() {
                Some(name) => name,
                None => return Err(self.unexpected()),
            },
        };
        self.advance();
        Ok(PropertyName::Named(name))
    }

    /// Call arguments after `(`, consuming the closing `)`.
    fn parse_arguments(&mut self) -> Result<Vec<Expression>> {
        let saved = std::mem::replace(&mut self.no_in, false);
        let result = self.parse_argument_list();
        self.no_in = saved;
        result
    }

    fn parse_argument_list(&mut self) -> Result<Vec<Expression>> {
        let mut arguments = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            if self.check(&TokenKind::Ellipsis) {
                return Err(self.unsupported());
            }
            arguments.push(self.parse_assignment_expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(arguments)
    }

    fn parse_identifier(&mut self) -> Result<Identifier> {
        if let TokenKind::Identifier(name) = &self.current().kind {
            let span = self.current_span();
            let name = name.clone();
            self.advance();
            Ok(Identifier { name, span })
        } else {
            Err(self.unexpected())
        }
    }

    /// An identifier that is about to be bound. `eval` and `arguments` are
    /// accepted as in sloppy-mode scripts.
    fn parse_binding_identifier(&mut self) -> Result<Identifier> {
        match self.current().kind {
            TokenKind::LeftBrace | TokenKind::LeftBracket | TokenKind::Ellipsis => {
                Err(self.unsupported())
            }
            _ => self.parse_identifier(),
        }
    }

    fn declare_var(&mut self, name: &str) {
        if let Some(context) = self.functions.last_mut() {
            if !context.var_names.iter().any(|n| n == name) {
                context.var_names.push(name.to_string());
            }
        }
    }

    /// Record an `arguments` reference on the nearest non-arrow function.
    fn mark_arguments(&mut self) {
        if let Some(context) = self.functions.iter_mut().rev().find(|c| !c.is_arrow) {
            context.uses_arguments = true;
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            self.depth -= 1;
            return Err(self.error_here("Maximum nesting depth exceeded"));
        }
        Ok(())
    }

    // Helper methods

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_span(&self) -> Span {
        self.current().span
    }

    fn prev_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            Span::default()
        }
    }

    fn peek_kind(&self) -> &TokenKind {
        let index = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn is_eof(&self) -> bool {
        self.current().is_eof()
    }

    fn advance(&mut self) {
        if !self.is_eof() {
            self.pos += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(kind)
    }

    fn peek_is(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Semicolon | TokenKind::RightBrace | TokenKind::Eof
        ) || self.current().newline_before
    }

    /// Explicit `;`, or an inserted one before `}`, a line break or the end.
    fn consume_semicolon(&mut self) -> Result<()> {
        if self.eat(&TokenKind::Semicolon) || self.at_statement_end() {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn error_here(&self, message: impl Into<String>) -> VmError {
        let span = self.current_span();
        VmError::compile(message, span.line, span.column)
    }

    fn unexpected(&self) -> VmError {
        match &self.current().kind {
            TokenKind::Eof => self.error_here("Unexpected end of input"),
            TokenKind::String(_) => self.error_here("Unexpected string"),
            TokenKind::Number(_) => self.error_here("Unexpected number"),
            TokenKind::Identifier(name) => self.error_here(format!("Unexpected identifier '{}'", name)),
            other => self.error_here(format!("Unexpected token '{}'", other)),
        }
    }

    fn unsupported(&self) -> VmError {
        self.error_here(format!("Unsupported syntax '{}'", self.current().kind))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

fn binary_operator(kind: &TokenKind) -> Option<(Operator, u8)> {
    use Operator::{Binary, Logical};
    Some(match kind {
        TokenKind::QuestionQuestion => (Logical(LogicalOp::Nullish), 3),
        TokenKind::PipePipe => (Logical(LogicalOp::Or), 4),
        TokenKind::AmpersandAmpersand => (Logical(LogicalOp::And), 5),
        TokenKind::Pipe => (Binary(BinaryOp::BitOr), 6),
        TokenKind::Caret => (Binary(BinaryOp::BitXor), 7),
        TokenKind::Ampersand => (Binary(BinaryOp::BitAnd), 8),
        TokenKind::Equal => (Binary(BinaryOp::Equal), 9),
        TokenKind::NotEqual => (Binary(BinaryOp::NotEqual), 9),
        TokenKind::StrictEqual => (Binary(BinaryOp::StrictEqual), 9),
        TokenKind::StrictNotEqual => (Binary(BinaryOp::StrictNotEqual), 9),
        TokenKind::LessThan => (Binary(BinaryOp::LessThan), 10),
        TokenKind::LessEqual => (Binary(BinaryOp::LessEqual), 10),
        TokenKind::GreaterThan => (Binary(BinaryOp::GreaterThan), 10),
        TokenKind::GreaterEqual => (Binary(BinaryOp::GreaterEqual), 10),
        TokenKind::In => (Binary(BinaryOp::In), 10),
        TokenKind::Instanceof => (Binary(BinaryOp::Instanceof), 10),
        TokenKind::LeftShift => (Binary(BinaryOp::LeftShift), 11),
        TokenKind::RightShift => (Binary(BinaryOp::RightShift), 11),
        TokenKind::UnsignedRightShift => (Binary(BinaryOp::UnsignedRightShift), 11),
        TokenKind::Plus => (Binary(BinaryOp::Add), 12),
        TokenKind::Minus => (Binary(BinaryOp::Sub), 12),
        TokenKind::Star => (Binary(BinaryOp::Mul), 13),
        TokenKind::Slash => (Binary(BinaryOp::Div), 13),
        TokenKind::Percent => (Binary(BinaryOp::Mod), 13),
        TokenKind::StarStar => (Binary(BinaryOp::Exp), 14),
        _ => return None,
    })
}

fn assignment_operator(kind: &TokenKind) -> Option<AssignmentOp> {
    use AssignmentOp::{Compound, Logical};
    Some(match kind {
        TokenKind::Assign => AssignmentOp::Assign,
        TokenKind::PlusAssign => Compound(BinaryOp::Add),
        TokenKind::MinusAssign => Compound(BinaryOp::Sub),
        TokenKind::StarAssign => Compound(BinaryOp::Mul),
        TokenKind::SlashAssign => Compound(BinaryOp::Div),
        TokenKind::PercentAssign => Compound(BinaryOp::Mod),
        TokenKind::StarStarAssign => Compound(BinaryOp::Exp),
        TokenKind::LeftShiftAssign => Compound(BinaryOp::LeftShift),
        TokenKind::RightShiftAssign => Compound(BinaryOp::RightShift),
        TokenKind::UnsignedRightShiftAssign => Compound(BinaryOp::UnsignedRightShift),
        TokenKind::AmpersandAssign => Compound(BinaryOp::BitAnd),
        TokenKind::PipeAssign => Compound(BinaryOp::BitOr),
        TokenKind::CaretAssign => Compound(BinaryOp::BitXor),
        TokenKind::AmpersandAmpersandAssign => Logical(LogicalOp::And),
        TokenKind::PipePipeAssign => Logical(LogicalOp::Or),
        TokenKind::QuestionQuestionAssign => Logical(LogicalOp::Nullish),
        _ => return None,
    })
}

/// Pair every `(` with its `)` in one pass and keep the ones that open an
/// arrow parameter list.
fn arrow_heads(tokens: &[Token]) -> HashSet<usize> {
    let mut open = Vec::new();
    let mut heads = HashSet::new();
    for (index, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LeftParen => open.push(index),
            TokenKind::RightParen => {
                let Some(start) = open.pop() else {
                    continue;
                };
                if tokens.get(index + 1).is_some_and(|t| t.kind == TokenKind::Arrow) {
                    heads.insert(start);
                }
            }
            _ => {}
        }
    }
    heads
}

/// Parse source text into a program.
pub fn parse(source: &str) -> Result<Program> {
    Parser::new(source)?.parse_script()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_expression(source: &str) -> Expression {
        match parse(source).unwrap().body.into_iter().next() {
            Some(Statement::Expression(stmt)) => stmt.expression,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn precedence_and_associativity() {
        match first_expression("1 + 2 * 3") {
            Expression::Binary(b) => {
                assert_eq!(b.operator, BinaryOp::Add);
                assert!(matches!(*b.right, Expression::Binary(ref r) if r.operator == BinaryOp::Mul));
            }
            other => panic!("unexpected {:?}", other),
        }
        match first_expression("2 ** 3 ** 2") {
            Expression::Binary(b) => {
                assert!(matches!(*b.left, Expression::Literal(Literal::Number(n), _) if n == 2.0));
                assert!(matches!(*b.right, Expression::Binary(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn semicolons_are_inserted_at_line_breaks() {
        let program = parse("var a = 1\nvar b = a\n++b\nfunction f() { return\n1 }").unwrap();
        assert_eq!(program.body.len(), 4);
        assert_eq!(program.var_names, vec!["a", "b", "f"]);
        let Statement::Function(f) = &program.body[3] else {
            panic!("expected function");
        };
        assert!(matches!(&f.body[0], Statement::Return(r) if r.argument.is_none()));
    }

    #[test]
    fn new_takes_member_callee() {
        match first_expression("new String.prototype.charCodeAt") {
            Expression::New(n) => {
                assert!(n.arguments.is_empty());
                assert!(matches!(*n.callee, Expression::Member(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(first_expression("new Date().getTime()"), Expression::Call(_)));
    }

    #[test]
    fn arrows_and_arguments_tracking() {
        let program = parse("function f() { return () => arguments.length; }").unwrap();
        let Statement::Function(f) = &program.body[0] else {
            panic!("expected function");
        };
        assert!(f.uses_arguments);
        assert!(matches!(first_expression("(a, b) => a + b"), Expression::Function(f) if f.is_arrow && f.params.len() == 2));
    }

    #[test]
    fn keywords_are_property_names() {
        match first_expression("({ default: 1, new: 2 }).new") {
            Expression::Member(m) => assert!(matches!(m.property, PropertyName::Named(ref n) if n == "new")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn for_in_head_does_not_swallow_in() {
        let program = parse("for (var k in o) {}").unwrap();
        assert!(matches!(program.body[0], Statement::ForIn(_)));
        assert_eq!(program.var_names, vec!["k"]);
    }

    #[test]
    fn syntax_errors_report_position() {
        match parse("var x = ;") {
            Err(VmError::Compile { message, line, column }) => {
                assert_eq!(message, "Unexpected token ';'");
                assert_eq!((line, column), (1, 9));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse("return 1").is_err());
        assert!(parse("class A {}").is_err());
        assert!(parse("f(...xs)").is_err());
        assert!(parse("/(?<=a)b/").is_err());
        assert!(parse("1 = 2").is_err());
    }

    fn nesting_error(source: &str) -> bool {
        matches!(
            parse(source),
            Err(VmError::Compile { ref message, .. }) if message == "Maximum nesting depth exceeded"
        )
    }

    #[test]
    fn deep_nesting_is_rejected() {
        assert!(nesting_error(&format!("{}1{}", "(".repeat(500), ")".repeat(500))));
        assert!(nesting_error(&format!("{}1{}", "[".repeat(500), "]".repeat(500))));
        assert!(nesting_error(&format!("{}1{}", "({a:".repeat(500), "})".repeat(500))));
        assert!(nesting_error(&format!("1{}", "+1".repeat(5000))));
        assert!(nesting_error(&format!("a{}", ".b".repeat(5000))));
        assert!(nesting_error(&format!("f{}", "()".repeat(5000))));
        assert!(nesting_error(&format!("2{}", "**2".repeat(5000))));
        assert!(nesting_error(&format!("{}{}", "{".repeat(500), "}".repeat(500))));
    }

    #[test]
    fn moderate_nesting_is_accepted() {
        assert!(parse(&format!("{}1{}", "(".repeat(20), ")".repeat(20))).is_ok());
        assert!(parse(&format!("{}1{}", "[".repeat(20), "]".repeat(20))).is_ok());
        assert!(parse(&format!("1{}", "+1".repeat(40))).is_ok());
        assert!(parse(&format!("a{}", ".b".repeat(40))).is_ok());
    }

    #[test]
    fn arrow_heads_pair_parentheses() {
        let tokens = Lexer::new("(a, (b)) => (c)").tokenize().unwrap();
        let heads = arrow_heads(&tokens);
        assert_eq!(heads.len(), 1);
        assert!(heads.contains(&0));
        assert!(matches!(first_expression("((a)) + (b)"), Expression::Binary(_)));
    }
}

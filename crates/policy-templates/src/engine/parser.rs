//! Template parser
//!
//! Parses the token stream into AST nodes. Variables are resolved at parse
//! time against the enclosing scopes and function names against the
//! registry, so misspellings surface as parse errors with a line number.

use super::builtins;
use super::lexer::{Token, TokenKind};
use super::types::*;
use crate::error::{TemplateError, TemplateResult};
use crate::functions::FunctionRegistry;

/// How a node list ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    Eof,
    End,
    Else,
    ElseIf,
}

/// Template parser
pub(super) struct TemplateParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    functions: &'a FunctionRegistry,
    vars: Vec<String>,
}

impl<'a> TemplateParser<'a> {
    pub(super) fn new(tokens: Vec<Token>, functions: &'a FunctionRegistry) -> Self {
        Self {
            tokens,
            pos: 0,
            functions,
            vars: vec!["$".to_string()],
        }
    }

    /// Parse the whole token stream into a node list
    pub(super) fn parse(mut self) -> TemplateResult<Vec<Node>> {
        let (nodes, terminator) = self.parse_list()?;
        match terminator {
            Terminator::Eof => Ok(nodes),
            Terminator::End => Err(self.error("unexpected {{end}}")),
            Terminator::Else | Terminator::ElseIf => Err(self.error("unexpected {{else}}")),
        }
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Line of the current token, or of the last one at end of input
    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::parse(self.line(), message)
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(TokenKind::Ident(name)) if name == keyword)
    }

    fn expect_right_delim(&mut self, context: &str) -> TemplateResult<()> {
        match self.next() {
            Some(Token {
                kind: TokenKind::RightDelim,
                ..
            }) => Ok(()),
            Some(token) => Err(TemplateError::parse(
                token.line,
                format!("unexpected {} in {}", describe(&token.kind), context),
            )),
            None => Err(self.error(format!("unclosed {}", context))),
        }
    }

    fn parse_list(&mut self) -> TemplateResult<(Vec<Node>, Terminator)> {
        let mut nodes = Vec::new();

        while let Some(token) = self.next() {
            match token.kind {
                TokenKind::Text(text) => nodes.push(Node::Text(text)),
                TokenKind::LeftDelim => {
                    if self.is_keyword("end") {
                        self.pos += 1;
                        self.expect_right_delim("end")?;
                        return Ok((nodes, Terminator::End));
                    }
                    if self.is_keyword("else") {
                        self.pos += 1;
                        if self.is_keyword("if") {
                            self.pos += 1;
                            return Ok((nodes, Terminator::ElseIf));
                        }
                        self.expect_right_delim("else")?;
                        return Ok((nodes, Terminator::Else));
                    }
                    if self.is_keyword("if") {
                        self.pos += 1;
                        nodes.push(self.parse_if(token.line)?);
                    } else if self.is_keyword("with") {
                        self.pos += 1;
                        nodes.push(self.parse_with(token.line)?);
                    } else if self.is_keyword("range") {
                        self.pos += 1;
                        nodes.push(self.parse_range(token.line)?);
                    } else {
                        let pipeline = self.parse_pipeline("command", false)?;
                        self.expect_right_delim("command")?;
                        nodes.push(Node::Action {
                            line: token.line,
                            pipeline,
                        });
                    }
                }
                other => {
                    return Err(TemplateError::parse(
                        token.line,
                        format!("unexpected {}", describe(&other)),
                    ));
                }
            }
        }

        Ok((nodes, Terminator::Eof))
    }

    /// Parse a block body, restoring the variable scope afterwards
    fn parse_body(&mut self, context: &str) -> TemplateResult<(Vec<Node>, Terminator)> {
        let scope = self.vars.len();
        let result = self.parse_list();
        self.vars.truncate(scope);
        let (nodes, terminator) = result?;
        if terminator == Terminator::Eof {
            return Err(self.error(format!("unexpected EOF in {}", context)));
        }
        Ok((nodes, terminator))
    }

    fn parse_if(&mut self, line: usize) -> TemplateResult<Node> {
        let scope = self.vars.len();
        let mut branches = Vec::new();
        let mut otherwise = None;

        loop {
            let condition = self.parse_pipeline("if", false)?;
            self.expect_right_delim("if")?;
            let (body, terminator) = self.parse_body("if")?;
            branches.push((condition, body));

            match terminator {
                Terminator::End => break,
                Terminator::ElseIf => continue,
                Terminator::Else => {
                    let (body, terminator) = self.parse_body("else")?;
                    if terminator != Terminator::End {
                        return Err(self.error("expected end; found else"));
                    }
                    otherwise = Some(body);
                    break;
                }
                Terminator::Eof => return Err(self.error("unexpected EOF in if")),
            }
        }

        self.vars.truncate(scope);
        Ok(Node::If {
            line,
            branches,
            otherwise,
        })
    }

    /// Parse the shared `pipeline }} body [else body] end` tail of with/range
    fn parse_block(
        &mut self,
        context: &str,
        range: bool,
    ) -> TemplateResult<(Pipeline, Vec<Node>, Option<Vec<Node>>)> {
        let scope = self.vars.len();
        let pipeline = self.parse_pipeline(context, range)?;
        self.expect_right_delim(context)?;

        let (body, terminator) = self.parse_body(context)?;
        let otherwise = match terminator {
            Terminator::End => None,
            Terminator::Else => {
                let (body, terminator) = self.parse_body("else")?;
                if terminator != Terminator::End {
                    return Err(self.error("expected end; found else"));
                }
                Some(body)
            }
            _ => return Err(self.error(format!("else if is not allowed in {}", context))),
        };

        self.vars.truncate(scope);
        Ok((pipeline, body, otherwise))
    }

    fn parse_with(&mut self, line: usize) -> TemplateResult<Node> {
        let (pipeline, body, otherwise) = self.parse_block("with", false)?;
        Ok(Node::With {
            line,
            pipeline,
            body,
            otherwise,
        })
    }

    fn parse_range(&mut self, line: usize) -> TemplateResult<Node> {
        let (pipeline, body, otherwise) = self.parse_block("range", true)?;
        Ok(Node::Range {
            line,
            pipeline,
            body,
            otherwise,
        })
    }

    /// Parse `[decl :=] command | command ...` up to `}}` or `)`
    fn parse_pipeline(&mut self, context: &str, allow_pair: bool) -> TemplateResult<Pipeline> {
        let mut pipeline = Pipeline::default();
        self.parse_declaration(&mut pipeline, context, allow_pair)?;

        loop {
            match self.peek() {
                Some(TokenKind::RightDelim) | Some(TokenKind::RightParen) | None => break,
                _ => {}
            }
            let command = self.parse_command()?;
            pipeline.commands.push(command);

            if matches!(self.peek(), Some(TokenKind::Pipe)) {
                self.pos += 1;
                if matches!(
                    self.peek(),
                    Some(TokenKind::RightDelim) | Some(TokenKind::RightParen) | None
                ) {
                    return Err(self.error("missing command after |"));
                }
            } else {
                break;
            }
        }

        if pipeline.commands.is_empty() {
            return Err(self.error(format!("missing value for {}", context)));
        }
        Ok(pipeline)
    }

    fn parse_declaration(
        &mut self,
        pipeline: &mut Pipeline,
        context: &str,
        allow_pair: bool,
    ) -> TemplateResult<()> {
        let first = match self.peek() {
            Some(TokenKind::Variable(name)) => name.clone(),
            _ => return Ok(()),
        };

        match self.peek_at(1) {
            Some(TokenKind::Declare) | Some(TokenKind::Assign) => {
                let is_assign = matches!(self.peek_at(1), Some(TokenKind::Assign));
                self.pos += 2;
                if is_assign && !self.vars.contains(&first) {
                    return Err(self.error(format!("undefined variable \"{}\"", first)));
                }
                pipeline.is_assign = is_assign;
                pipeline.decl.push(first);
            }
            Some(TokenKind::Comma) => {
                let second = match (self.peek_at(2), self.peek_at(3)) {
                    (Some(TokenKind::Variable(name)), Some(TokenKind::Declare))
                    | (Some(TokenKind::Variable(name)), Some(TokenKind::Assign)) => name.clone(),
                    _ => return Err(self.error(format!("too many declarations in {}", context))),
                };
                if !allow_pair {
                    return Err(self.error(format!("too many declarations in {}", context)));
                }
                pipeline.is_assign = matches!(self.peek_at(3), Some(TokenKind::Assign));
                self.pos += 4;
                pipeline.decl.push(first);
                pipeline.decl.push(second);
            }
            _ => return Ok(()),
        }

        if !pipeline.is_assign {
            self.vars.extend(pipeline.decl.iter().cloned());
        }
        Ok(())
    }

    fn parse_command(&mut self) -> TemplateResult<Command> {
        let mut args = Vec::new();

        loop {
            match self.peek() {
                Some(TokenKind::Pipe)
                | Some(TokenKind::RightDelim)
                | Some(TokenKind::RightParen)
                | None => break,
                _ => {}
            }
            if !args.is_empty() && !self.tokens[self.pos].spaced {
                let token = &self.tokens[self.pos];
                return Err(TemplateError::parse(
                    token.line,
                    format!("missing space before {}", describe(&token.kind)),
                ));
            }
            args.push(self.parse_operand()?);
        }

        if args.is_empty() {
            return Err(self.error("empty command"));
        }
        Ok(Command { args })
    }

    fn parse_operand(&mut self) -> TemplateResult<Operand> {
        let Some(token) = self.next() else {
            return Err(self.error("unexpected EOF"));
        };

        let operand = match token.kind {
            TokenKind::String(s) => Operand::Literal(Value::String(s)),
            TokenKind::Int(i) => Operand::Literal(Value::Int(i)),
            TokenKind::Float(f) => Operand::Literal(Value::Float(f)),
            TokenKind::Bool(b) => Operand::Literal(Value::Bool(b)),
            TokenKind::Nil => Operand::Literal(Value::Nil),
            TokenKind::Dot => Operand::Dot,
            TokenKind::Field(name) => {
                let mut chain = vec![name];
                chain.extend(self.parse_field_chain());
                Operand::Field(chain)
            }
            TokenKind::Variable(name) => {
                if !self.vars.contains(&name) {
                    return Err(TemplateError::parse(
                        token.line,
                        format!("undefined variable \"{}\"", name),
                    ));
                }
                Operand::Variable(name, self.parse_field_chain())
            }
            TokenKind::Ident(name) => {
                if !self.functions.contains(&name) && !builtins::is_builtin(&name) {
                    return Err(TemplateError::parse(
                        token.line,
                        format!("function \"{}\" not defined", name),
                    ));
                }
                Operand::Function(name)
            }
            TokenKind::LeftParen => {
                let inner = self.parse_pipeline("parenthesized pipeline", false)?;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::RightParen,
                        ..
                    }) => {}
                    _ => return Err(self.error("unclosed left paren")),
                }
                Operand::Pipeline(Box::new(inner), self.parse_field_chain())
            }
            other => {
                return Err(TemplateError::parse(
                    token.line,
                    format!("unexpected {} in operand", describe(&other)),
                ));
            }
        };

        Ok(operand)
    }

    /// Field names directly attached to the previous operand (`$x.A.B`)
    fn parse_field_chain(&mut self) -> Vec<String> {
        let mut chain = Vec::new();
        while let Some(Token {
            kind: TokenKind::Field(name),
            spaced: false,
            ..
        }) = self.tokens.get(self.pos)
        {
            chain.push(name.clone());
            self.pos += 1;
        }
        chain
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Text(_) => "text".to_string(),
        TokenKind::LeftDelim => "left delimiter".to_string(),
        TokenKind::RightDelim => "right delimiter".to_string(),
        TokenKind::String(_) => "quoted string".to_string(),
        TokenKind::Int(_) | TokenKind::Float(_) => "number".to_string(),
        TokenKind::Bool(_) => "bool".to_string(),
        TokenKind::Nil => "nil".to_string(),
        TokenKind::Dot => "<.>".to_string(),
        TokenKind::Field(name) => format!("<.{}>", name),
        TokenKind::Variable(name) => format!("<{}>", name),
        TokenKind::Ident(name) => format!("<{}>", name),
        TokenKind::Pipe => "<|>".to_string(),
        TokenKind::LeftParen => "<(>".to_string(),
        TokenKind::RightParen => "<)>".to_string(),
        TokenKind::Comma => "<,>".to_string(),
        TokenKind::Declare => "<:=>".to_string(),
        TokenKind::Assign => "<=>".to_string(),
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod parser_tests;

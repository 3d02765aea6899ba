use crate::ast::*;
use crate::error::{LexError, ParseError};
use crate::lexer::{Lexer, Token, TokenType};
use miette::NamedSource;
use std::sync::Arc;

/// How deeply values, types and expressions may nest. Every later stage
/// walks these trees recursively.
pub const MAX_NESTING: usize = 128;

/// A recursive descent parser for TDL documents. Expressions inside `where`
/// clauses, guards and pattern targets are parsed by binding power.
#[derive(Debug)]
pub struct Parser<'a> {
    source: Arc<NamedSource<String>>,
    tokens: Vec<Token>,
    position: usize,
    source_text: &'a str,
    /// Open parentheses/brackets inside the current expression. Line breaks
    /// are insignificant while it is non-zero.
    group_depth: usize,
    /// Current nesting of values, types and expressions.
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source_text: &'a str) -> Result<Self, LexError> {
        Self::new_with_name(source_text, "source.tdl")
    }

    pub fn new_with_name(source_text: &'a str, name: impl AsRef<str>) -> Result<Self, LexError> {
        let source = Arc::new(NamedSource::new(name, source_text.to_string()));
        let tokens = Lexer::with_source(source_text, Arc::clone(&source)).lex()?;

        Ok(Self {
            source,
            tokens,
            position: 0,
            source_text,
            group_depth: 0,
            depth: 0,
        })
    }

    /// The named source shared by every diagnostic produced for this document.
    pub fn source(&self) -> Arc<NamedSource<String>> {
        Arc::clone(&self.source)
    }

    // === Main Parsing Methods ===

    /// Document ::= { NEWLINE | Item } EOF
    pub fn parse_document(&mut self) -> Result<Document, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_newlines();
            if self.check(TokenType::Eof) {
                break;
            }
            items.push(self.parse_item()?);
            self.end_line()?;
        }
        log::debug!("parsed {} top-level items", items.len());
        Ok(Document { items })
    }

    /// Item ::= TypeDecl | PatternRule | Binding | DataExpr
    fn parse_item(&mut self) -> Result<Item, ParseError> {
        match &self.current_token().ttype {
            TokenType::Type => self.parse_type_decl().map(Item::Type),
            TokenType::String(_) if self.peek_is(TokenType::FatArrow) => {
                self.parse_pattern_rule().map(Item::Pattern)
            }
            TokenType::Identifier(_) if self.peek_is(TokenType::Define) => {
                self.parse_binding().map(Item::Binding)
            }
            // `name: type := value`, as opposed to a `name:` block
            TokenType::Identifier(_)
                if self.peek_is(TokenType::Colon) && !self.peek_next_is(TokenType::Newline) =>
            {
                self.parse_binding().map(Item::Binding)
            }
            TokenType::Indent => self.err_unexpected("a declaration or value"),
            _ => self.parse_data().map(Item::Value),
        }
    }

    // === Type Declarations ===

    /// TypeDecl ::= "type" IDENT { IDENT } "=" CtorList { WhereClause }
    fn parse_type_decl(&mut self) -> Result<TypeDecl, ParseError> {
        let start = self.current_token().pos_start;
        self.expect(TokenType::Type)?;
        let name = self.expect_ident("a type name")?;
        let mut params = Vec::new();
        while let TokenType::Identifier(param) = &self.current_token().ttype {
            params.push(param.clone());
            self.advance();
        }
        self.expect(TokenType::Equals)?;

        let mut wheres = Vec::new();
        let ctors = if self.check(TokenType::Newline) && self.peek_is(TokenType::Indent) {
            self.advance();
            self.advance();
            CtorList::Lines(self.parse_ctor_lines(&mut wheres)?)
        } else {
            let ctors = self.parse_ctor_alternatives(&mut wheres)?;
            CtorList::Piped(ctors)
        };

        // Trailing clauses may start on the lines after the declaration.
        loop {
            if self.check(TokenType::Where) {
                wheres.push(self.parse_where_clause(true)?);
            } else if self.check(TokenType::Newline) && self.peek_is(TokenType::Where) {
                self.advance();
            } else {
                break;
            }
        }

        Ok(TypeDecl {
            name,
            params,
            ctors,
            wheres,
            pos_start: start,
            pos_end: self.last_end(),
        })
    }

    /// CtorLines ::= INDENT { ( Ctor { "|" Ctor } | WhereClause ) NEWLINE } DEDENT
    fn parse_ctor_lines(
        &mut self,
        wheres: &mut Vec<WhereClause>,
    ) -> Result<Vec<CtorDecl>, ParseError> {
        let mut ctors = Vec::new();
        loop {
            if self.match_token(TokenType::Dedent) || self.check(TokenType::Eof) {
                break;
            }
            if self.check(TokenType::Where) {
                wheres.push(self.parse_where_clause(true)?);
            } else {
                ctors.extend(self.parse_ctor_alternatives(wheres)?);
            }
            self.end_line()?;
        }
        if ctors.is_empty() {
            return self.err_unexpected("a constructor");
        }
        Ok(ctors)
    }

    /// Alternatives ::= [ "|" ] Ctor { "|" Ctor }
    ///
    /// A scope written after the last constructor's inline `where` turns that
    /// clause into a type-level one.
    fn parse_ctor_alternatives(
        &mut self,
        wheres: &mut Vec<WhereClause>,
    ) -> Result<Vec<CtorDecl>, ParseError> {
        self.match_token(TokenType::Pipe);
        let mut ctors = vec![self.parse_ctor()?];
        while self.match_token(TokenType::Pipe) {
            self.skip_newlines_in_group();
            ctors.push(self.parse_ctor()?);
        }

        if self.check(TokenType::For) || self.check(TokenType::Except) {
            let clause = ctors.last_mut().and_then(|c| c.inline_where.take());
            let Some(mut clause) = clause else {
                return self.err_unexpected("a constructor or end of line");
            };
            clause.scope = self.parse_scope()?;
            clause.pos_end = self.last_end();
            wheres.push(clause);
        }
        Ok(ctors)
    }

    /// Ctor ::= IDENT "{" [ Field { SEP Field } ] "}" [ "where" Expr { "," Expr } ]
    fn parse_ctor(&mut self) -> Result<CtorDecl, ParseError> {
        let start = self.current_token().pos_start;
        let name = self.expect_ident("a constructor name")?;
        self.expect(TokenType::LBrace)?;
        let mut fields = Vec::new();
        self.skip_newlines();
        while !self.check(TokenType::RBrace) {
            fields.push(self.parse_field()?);
            if !self.eat_separator() && !self.check(TokenType::RBrace) {
                return self.err_unexpected("`,` or `}`");
            }
        }
        self.expect(TokenType::RBrace)?;
        let fields_end = self.last_end();

        let inline_where = if self.check(TokenType::Where) {
            Some(self.parse_where_clause(false)?)
        } else {
            None
        };

        Ok(CtorDecl {
            name,
            fields,
            inline_where,
            pos_start: start,
            pos_end: fields_end,
        })
    }

    /// Field ::= [ IDENT ":" ] TypeExpr
    fn parse_field(&mut self) -> Result<FieldDecl, ParseError> {
        let start = self.current_token().pos_start;
        let name = match &self.current_token().ttype {
            TokenType::Identifier(name) if self.peek_is(TokenType::Colon) => {
                let name = name.clone();
                self.advance();
                self.advance();
                Some(name)
            }
            _ => None,
        };
        let ty = self.parse_type_expr()?;
        Ok(FieldDecl {
            name,
            ty,
            pos_start: start,
            pos_end: self.last_end(),
        })
    }

    /// TypeExpr ::= "optional" TypeExpr | "list" TypeExpr | IDENT { TypeAtom } | "(" TypeExpr ")"
    pub fn parse_type_expr(&mut self) -> Result<TypeExpr, ParseError> {
        self.nested(Self::parse_type_expr_inner)
    }

    fn parse_type_expr_inner(&mut self) -> Result<TypeExpr, ParseError> {
        let start = self.current_token().pos_start;
        let kind = match self.current_token().ttype.clone() {
            TokenType::Optional => {
                self.advance();
                TypeExprKind::Optional(Box::new(self.parse_type_expr()?))
            }
            TokenType::List => {
                self.advance();
                TypeExprKind::List(Box::new(self.parse_type_expr()?))
            }
            TokenType::LParen => return self.parse_grouped_type(),
            TokenType::Identifier(name) => {
                self.advance();
                let mut args = Vec::new();
                loop {
                    match &self.current_token().ttype {
                        TokenType::Identifier(arg) => {
                            let token = self.current_token().clone();
                            args.push(TypeExpr {
                                kind: TypeExprKind::Named {
                                    name: arg.clone(),
                                    args: Vec::new(),
                                },
                                pos_start: token.pos_start,
                                pos_end: token.pos_end,
                            });
                            self.advance();
                        }
                        TokenType::LParen => args.push(self.parse_grouped_type()?),
                        _ => break,
                    }
                }
                TypeExprKind::Named { name, args }
            }
            _ => return self.err_unexpected("a type"),
        };
        Ok(TypeExpr {
            kind,
            pos_start: start,
            pos_end: self.last_end(),
        })
    }

    fn parse_grouped_type(&mut self) -> Result<TypeExpr, ParseError> {
        self.expect(TokenType::LParen)?;
        self.skip_newlines();
        let inner = self.parse_type_expr()?;
        self.skip_newlines();
        self.expect(TokenType::RParen)?;
        Ok(inner)
    }

    /// WhereClause ::= "where" ( Expr { "," Expr } | NEWLINE INDENT { Expr NEWLINE } DEDENT ) [ Scope ]
    fn parse_where_clause(&mut self, allow_scope: bool) -> Result<WhereClause, ParseError> {
        let start = self.current_token().pos_start;
        self.expect(TokenType::Where)?;
        let mut exprs = Vec::new();

        if self.check(TokenType::Newline) && self.peek_is(TokenType::Indent) {
            self.advance();
            self.advance();
            loop {
                exprs.push(self.parse_expr()?);
                self.match_token(TokenType::Comma);
                self.end_line()?;
                if self.match_token(TokenType::Dedent) || self.check(TokenType::Eof) {
                    break;
                }
            }
        } else {
            exprs.push(self.parse_expr()?);
            while self.match_token(TokenType::Comma) {
                exprs.push(self.parse_expr()?);
            }
        }

        let scope = if allow_scope {
            if self.check(TokenType::Newline)
                && (self.peek_is(TokenType::For) || self.peek_is(TokenType::Except))
            {
                self.advance();
            }
            self.parse_scope()?
        } else {
            Scope::All
        };

        Ok(WhereClause {
            exprs,
            scope,
            pos_start: start,
            pos_end: self.last_end(),
        })
    }

    /// Scope ::= [ ( "for" | "except" ) NameList ]
    fn parse_scope(&mut self) -> Result<Scope, ParseError> {
        if self.match_token(TokenType::For) {
            Ok(Scope::Only(self.parse_name_list()?))
        } else if self.match_token(TokenType::Except) {
            Ok(Scope::Except(self.parse_name_list()?))
        } else {
            Ok(Scope::All)
        }
    }

    /// NameList ::= "{" IDENT { SEP IDENT } "}" | IDENT { "," IDENT }
    fn parse_name_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut names = Vec::new();
        if self.match_token(TokenType::LBrace) {
            self.skip_newlines();
            while !self.check(TokenType::RBrace) {
                names.push(self.expect_ident("a constructor name")?);
                if !self.eat_separator() && !self.check(TokenType::RBrace) {
                    return self.err_unexpected("`,` or `}`");
                }
            }
            self.expect(TokenType::RBrace)?;
        } else {
            names.push(self.expect_ident("a constructor name")?);
            while self.match_token(TokenType::Comma) {
                names.push(self.expect_ident("a constructor name")?);
            }
        }
        Ok(names)
    }

    // === Pattern Rules & Bindings ===

    /// PatternRule ::= STRING "=>" CallExpr [ "where" Expr { "," Expr } ]
    fn parse_pattern_rule(&mut self) -> Result<PatternRule, ParseError> {
        let token = self.current_token().clone();
        let TokenType::String(template) = token.ttype else {
            return self.err_unexpected("a pattern template");
        };
        self.advance();
        self.expect(TokenType::FatArrow)?;

        let target_token = self.current_token().clone();
        let target = self.parse_expr()?;
        if !matches!(target.kind, ExprKind::Call { .. }) {
            return Err(ParseError::UnexpectedToken {
                expected: "a constructor call".to_string(),
                found: target_token.ttype.to_string(),
                src: (*self.source).clone(),
                span: target.span(),
            });
        }

        let mut guard = Vec::new();
        if self.match_token(TokenType::Where) {
            guard.push(self.parse_expr()?);
            while self.match_token(TokenType::Comma) {
                guard.push(self.parse_expr()?);
            }
        }

        Ok(PatternRule {
            template,
            target,
            guard,
            pos_start: token.pos_start,
            pos_end: self.last_end(),
        })
    }

    /// Binding ::= IDENT [ ":" TypeExpr ] ":=" DataExpr
    fn parse_binding(&mut self) -> Result<Binding, ParseError> {
        let start = self.current_token().pos_start;
        let name = self.expect_ident("a binding name")?;
        let ty = if self.match_token(TokenType::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        self.expect(TokenType::Define)?;
        let value = self.parse_data()?;
        Ok(Binding {
            name,
            ty,
            value,
            pos_start: start,
            pos_end: self.last_end(),
        })
    }

    // === Data Expressions ===

    /// DataExpr ::= Call | Anonymous | List | Literal | Reference | Block
    pub fn parse_data(&mut self) -> Result<DataExpr, ParseError> {
        self.nested(Self::parse_data_inner)
    }

    fn parse_data_inner(&mut self) -> Result<DataExpr, ParseError> {
        let token = self.current_token().clone();
        let kind = match token.ttype {
            TokenType::String(s) => {
                self.advance();
                DataKind::Str(s.text)
            }
            TokenType::Int(n) => {
                self.advance();
                DataKind::Int(n)
            }
            TokenType::Float(n) => {
                self.advance();
                DataKind::Float(n)
            }
            TokenType::True => {
                self.advance();
                DataKind::Bool(true)
            }
            TokenType::False => {
                self.advance();
                DataKind::Bool(false)
            }
            TokenType::Null => {
                self.advance();
                DataKind::Null
            }
            TokenType::LBracket => self.parse_data_list()?,
            TokenType::LBrace => DataKind::Anonymous(self.parse_braced_entries()?),
            TokenType::Bang => self.parse_reference()?,
            TokenType::Identifier(ctor) => {
                if self.peek_is(TokenType::LParen) {
                    self.advance();
                    let args = self.parse_data_args()?;
                    DataKind::Call { ctor, args }
                } else if self.peek_is(TokenType::Colon) && self.peek_next_is(TokenType::Newline) {
                    self.advance();
                    self.advance();
                    self.advance();
                    self.parse_ctor_block(ctor)?
                } else {
                    self.advance();
                    DataKind::Call {
                        ctor,
                        args: Vec::new(),
                    }
                }
            }
            _ => return self.err_unexpected("a value"),
        };
        Ok(DataExpr {
            kind,
            pos_start: token.pos_start,
            pos_end: self.last_end(),
        })
    }

    /// List ::= "[" [ DataExpr { SEP DataExpr } [ SEP ] ] "]"
    fn parse_data_list(&mut self) -> Result<DataKind, ParseError> {
        self.expect(TokenType::LBracket)?;
        let mut items = Vec::new();
        self.skip_newlines();
        while !self.check(TokenType::RBracket) {
            items.push(self.parse_data()?);
            if !self.eat_separator() && !self.check(TokenType::RBracket) {
                return self.err_unexpected("`,` or `]`");
            }
        }
        self.expect(TokenType::RBracket)?;
        Ok(DataKind::List(items))
    }

    /// Anonymous ::= "{" [ Entry { SEP Entry } [ SEP ] ] "}"
    fn parse_braced_entries(&mut self) -> Result<Vec<Entry>, ParseError> {
        self.expect(TokenType::LBrace)?;
        let mut entries = Vec::new();
        self.skip_newlines();
        while !self.check(TokenType::RBrace) {
            let start = self.current_token().pos_start;
            let key = self.parse_key()?;
            self.expect(TokenType::Colon)?;
            let value = self.parse_data()?;
            entries.push(Entry {
                key,
                value,
                pos_start: start,
                pos_end: self.last_end(),
            });
            if !self.eat_separator() && !self.check(TokenType::RBrace) {
                return self.err_unexpected("`,` or `}`");
            }
        }
        self.expect(TokenType::RBrace)?;
        Ok(entries)
    }

    /// Args ::= "(" [ Arg { SEP Arg } [ SEP ] ] ")"
    /// Arg ::= [ IDENT ":" ] DataExpr
    fn parse_data_args(&mut self) -> Result<Vec<DataArg>, ParseError> {
        self.expect(TokenType::LParen)?;
        let mut args = Vec::new();
        self.skip_newlines();
        while !self.check(TokenType::RParen) {
            let name = match &self.current_token().ttype {
                TokenType::Identifier(name) if self.peek_is(TokenType::Colon) => {
                    let name = name.clone();
                    self.advance();
                    self.advance();
                    Some(name)
                }
                _ => None,
            };
            let value = self.parse_data()?;
            args.push(DataArg { name, value });
            if !self.eat_separator() && !self.check(TokenType::RParen) {
                return self.err_unexpected("`,` or `)`");
            }
        }
        self.expect(TokenType::RParen)?;
        Ok(args)
    }

    /// Reference ::= "!" IDENT { "." IDENT }
    fn parse_reference(&mut self) -> Result<DataKind, ParseError> {
        self.expect(TokenType::Bang)?;
        let name = self.expect_ident("a binding name")?;
        let mut path = Vec::new();
        while self.match_token(TokenType::Dot) {
            path.push(self.expect_ident("a field name")?);
        }
        Ok(DataKind::Reference { name, path })
    }

    /// Block ::= IDENT ":" NEWLINE INDENT ( EntryLines | DashItems ) DEDENT
    ///
    /// Called with the header already consumed.
    fn parse_ctor_block(&mut self, ctor: String) -> Result<DataKind, ParseError> {
        self.expect(TokenType::Indent)?;
        if self.check(TokenType::Minus) {
            let items = self.parse_dash_items()?;
            Ok(DataKind::ListBlock { ctor, items })
        } else {
            let entries = self.parse_entry_lines()?;
            Ok(DataKind::CtorBlock { ctor, entries })
        }
    }

    /// EntryLines ::= { BlockEntry NEWLINE } DEDENT
    fn parse_entry_lines(&mut self) -> Result<Vec<Entry>, ParseError> {
        let mut entries = Vec::new();
        while !self.match_token(TokenType::Dedent) {
            if self.check(TokenType::Eof) {
                break;
            }
            entries.push(self.parse_block_entry()?);
            self.end_line()?;
        }
        Ok(entries)
    }

    /// BlockEntry ::= Key ":" ( DataExpr | NEWLINE INDENT ( EntryLines | DashItems ) )
    fn parse_block_entry(&mut self) -> Result<Entry, ParseError> {
        let start = self.current_token().pos_start;
        let key = self.parse_key()?;
        self.expect(TokenType::Colon)?;

        let value = if self.check(TokenType::Newline) {
            self.nested(|parser| {
                let block_start = parser.current_token().pos_start;
                parser.advance();
                parser.expect(TokenType::Indent)?;
                let kind = if parser.check(TokenType::Minus) {
                    DataKind::DashList(parser.parse_dash_items()?)
                } else {
                    DataKind::FieldBlock(parser.parse_entry_lines()?)
                };
                Ok(DataExpr {
                    kind,
                    pos_start: block_start,
                    pos_end: parser.last_end(),
                })
            })?
        } else {
            self.parse_data()?
        };

        Ok(Entry {
            key,
            value,
            pos_start: start,
            pos_end: self.last_end(),
        })
    }

    /// DashItems ::= { "-" ( BlockEntry [ INDENT EntryLines ] | DataExpr ) NEWLINE } DEDENT
    fn parse_dash_items(&mut self) -> Result<Vec<DataExpr>, ParseError> {
        let mut items = Vec::new();
        while !self.match_token(TokenType::Dedent) {
            if self.check(TokenType::Eof) {
                break;
            }
            let start = self.current_token().pos_start;
            self.expect(TokenType::Minus)?;

            let is_record = matches!(
                self.current_token().ttype,
                TokenType::Identifier(_) | TokenType::String(_)
            ) && self.peek_is(TokenType::Colon);

            if is_record {
                let mut entries = vec![self.parse_block_entry()?];
                self.end_line()?;
                if self.match_token(TokenType::Indent) {
                    entries.extend(self.parse_entry_lines()?);
                }
                items.push(DataExpr {
                    kind: DataKind::DashRecord(entries),
                    pos_start: start,
                    pos_end: self.last_end(),
                });
            } else {
                items.push(self.parse_data()?);
                self.end_line()?;
            }
        }
        Ok(items)
    }

    /// Key ::= IDENT | STRING
    fn parse_key(&mut self) -> Result<String, ParseError> {
        match &self.current_token().ttype {
            TokenType::Identifier(s) => {
                let key = s.clone();
                self.advance();
                Ok(key)
            }
            TokenType::String(s) => {
                let key = s.text.clone();
                self.advance();
                Ok(key)
            }
            _ => self.err_unexpected("an identifier or string for a key"),
        }
    }

    // === Expressions ===

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_expr_bp(0)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let outer = self.depth;
        let result = self.parse_expr_chain(min_bp);
        self.depth = outer;
        result
    }

    /// Operators fold to the left without recursing, so each one taken here
    /// counts as a level of nesting in the tree being built.
    fn parse_expr_chain(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        self.enter()?;
        self.skip_newlines_in_group();
        let mut lhs = self.parse_prefix()?;

        loop {
            if self.check(TokenType::Dot) {
                if POSTFIX_BP < min_bp {
                    break;
                }
                self.enter()?;
                self.advance();
                let name = self.expect_ident("a field name")?;
                lhs = Expr {
                    pos_start: lhs.pos_start,
                    pos_end: self.last_end(),
                    kind: ExprKind::Field {
                        base: Box::new(lhs),
                        name,
                    },
                };
                continue;
            }

            let Some(op) = binary_op(&self.current_token().ttype) else {
                break;
            };
            let (l_bp, r_bp) = infix_binding_power(op);
            if l_bp < min_bp {
                break;
            }
            self.enter()?;
            self.advance();
            let rhs = self.parse_expr_bp(r_bp)?;
            lhs = Expr {
                pos_start: lhs.pos_start,
                pos_end: rhs.pos_end,
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            };
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        let token = self.current_token().clone();
        let kind = match token.ttype {
            TokenType::Int(n) => {
                self.advance();
                ExprKind::Int(n)
            }
            TokenType::Float(n) => {
                self.advance();
                ExprKind::Float(n)
            }
            TokenType::String(s) => {
                self.advance();
                ExprKind::Str(s.text)
            }
            TokenType::True => {
                self.advance();
                ExprKind::Bool(true)
            }
            TokenType::False => {
                self.advance();
                ExprKind::Bool(false)
            }
            TokenType::Null => {
                self.advance();
                ExprKind::Null
            }
            TokenType::Identifier(name) => {
                self.advance();
                if self.check(TokenType::LParen) {
                    let args = self.parse_call_args()?;
                    ExprKind::Call { name, args }
                } else {
                    ExprKind::Ident(name)
                }
            }
            TokenType::LParen => {
                self.advance();
                self.group_depth += 1;
                let inner = self.parse_expr_bp(0)?;
                self.skip_newlines_in_group();
                self.expect(TokenType::RParen)?;
                self.group_depth -= 1;
                return Ok(inner);
            }
            TokenType::LBracket => {
                self.advance();
                self.group_depth += 1;
                let mut items = Vec::new();
                self.skip_newlines();
                while !self.check(TokenType::RBracket) {
                    items.push(self.parse_expr_bp(0)?);
                    if !self.eat_separator() && !self.check(TokenType::RBracket) {
                        return self.err_unexpected("`,` or `]`");
                    }
                }
                self.expect(TokenType::RBracket)?;
                self.group_depth -= 1;
                ExprKind::List(items)
            }
            TokenType::Not => {
                self.advance();
                let operand = self.parse_expr_bp(NOT_BP)?;
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(operand),
                }
            }
            TokenType::Minus => {
                self.advance();
                let operand = self.parse_expr_bp(NEG_BP)?;
                ExprKind::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(operand),
                }
            }
            _ => return self.err_unexpected("an expression"),
        };
        Ok(Expr {
            kind,
            pos_start: token.pos_start,
            pos_end: self.last_end(),
        })
    }

    /// CallArgs ::= "(" [ [ IDENT ":" ] Expr { SEP [ IDENT ":" ] Expr } [ SEP ] ] ")"
    fn parse_call_args(&mut self) -> Result<Vec<Arg>, ParseError> {
        self.expect(TokenType::LParen)?;
        self.group_depth += 1;
        let mut args = Vec::new();
        self.skip_newlines();
        while !self.check(TokenType::RParen) {
            let name = match &self.current_token().ttype {
                TokenType::Identifier(name) if self.peek_is(TokenType::Colon) => {
                    let name = name.clone();
                    self.advance();
                    self.advance();
                    Some(name)
                }
                _ => None,
            };
            let value = self.parse_expr_bp(0)?;
            args.push(Arg { name, value });
            if !self.eat_separator() && !self.check(TokenType::RParen) {
                return self.err_unexpected("`,` or `)`");
            }
        }
        self.expect(TokenType::RParen)?;
        self.group_depth -= 1;
        Ok(args)
    }

    // === Tokenizer Helper Methods ===

    fn current_token(&self) -> &Token {
        // The lexer always terminates the stream with EOF and `advance` never moves past it.
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn last_end(&self) -> usize {
        self.position
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |t| t.pos_end)
    }

    fn previous_is(&self, ttype: &TokenType) -> bool {
        self.position
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .is_some_and(|t| std::mem::discriminant(&t.ttype) == std::mem::discriminant(ttype))
    }

    fn advance(&mut self) {
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
    }

    fn expect(&mut self, expected: TokenType) -> Result<(), ParseError> {
        if self.check(expected.clone()) {
            self.advance();
            Ok(())
        } else {
            self.err_unexpected(&expected.to_string())
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        if let TokenType::Identifier(name) = &self.current_token().ttype {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            self.err_unexpected(what)
        }
    }

    fn match_token(&mut self, ttype: TokenType) -> bool {
        if self.check(ttype) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, ttype: TokenType) -> bool {
        std::mem::discriminant(&self.current_token().ttype) == std::mem::discriminant(&ttype)
    }

    fn peek_is(&self, ttype: TokenType) -> bool {
        if let Some(token) = self.tokens.get(self.position + 1) {
            std::mem::discriminant(&token.ttype) == std::mem::discriminant(&ttype)
        } else {
            false
        }
    }

    fn peek_next_is(&self, ttype: TokenType) -> bool {
        if let Some(token) = self.tokens.get(self.position + 2) {
            std::mem::discriminant(&token.ttype) == std::mem::discriminant(&ttype)
        } else {
            false
        }
    }

    fn skip_newlines(&mut self) {
        while self.match_token(TokenType::Newline) {}
    }

    fn skip_newlines_in_group(&mut self) {
        if self.group_depth > 0 {
            self.skip_newlines();
        }
    }

    /// Consumes one separator inside brackets: a comma and/or line breaks.
    fn eat_separator(&mut self) -> bool {
        let mut seen = false;
        while self.match_token(TokenType::Newline) {
            seen = true;
        }
        if self.match_token(TokenType::Comma) {
            seen = true;
            self.skip_newlines();
        }
        seen
    }

    /// A line ends with NEWLINE, or right after an indented block closed.
    fn end_line(&mut self) -> Result<(), ParseError> {
        if self.match_token(TokenType::Newline)
            || self.previous_is(&TokenType::Dedent)
            || self.check(TokenType::Dedent)
            || self.check(TokenType::Eof)
        {
            Ok(())
        } else {
            self.err_unexpected("end of line")
        }
    }

    /// Runs `parse` one nesting level deeper.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let outer = self.depth;
        self.enter()?;
        let result = parse(self);
        self.depth = outer;
        result
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ParseError::TooDeep {
                limit: MAX_NESTING,
                src: (*self.source).clone(),
                span: self.current_token().span(),
            });
        }
        Ok(())
    }

    fn err_unexpected<T>(&self, expected: &str) -> Result<T, ParseError> {
        let token = self.current_token();
        if token.ttype == TokenType::Eof {
            let pos = self.source_text.len();
            return Err(ParseError::UnexpectedEof {
                expected: expected.to_string(),
                src: (*self.source).clone(),
                span: (pos, 0).into(),
            });
        }
        Err(ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: token.ttype.to_string(),
            src: (*self.source).clone(),
            span: token.span(),
        })
    }
}

const NOT_BP: u8 = 5;
const NEG_BP: u8 = 13;
const POSTFIX_BP: u8 = 15;

fn binary_op(ttype: &TokenType) -> Option<BinaryOp> {
    let op = match ttype {
        TokenType::Or => BinaryOp::Or,
        TokenType::And => BinaryOp::And,
        TokenType::EqEq => BinaryOp::Eq,
        TokenType::NotEq => BinaryOp::Ne,
        TokenType::Lt => BinaryOp::Lt,
        TokenType::LtEq => BinaryOp::Le,
        TokenType::Gt => BinaryOp::Gt,
        TokenType::GtEq => BinaryOp::Ge,
        TokenType::Plus => BinaryOp::Add,
        TokenType::Minus => BinaryOp::Sub,
        TokenType::Star => BinaryOp::Mul,
        TokenType::Slash => BinaryOp::Div,
        TokenType::Percent => BinaryOp::Rem,
        _ => return None,
    };
    Some(op)
}

fn infix_binding_power(op: BinaryOp) -> (u8, u8) {
    match op {
        BinaryOp::Or => (1, 2),
        BinaryOp::And => (3, 4),
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            (7, 8)
        }
        BinaryOp::Add | BinaryOp::Sub => (9, 10),
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => (11, 12),
    }
}

use crate::lexer::{StrLit, TemplatePart};
use miette::SourceSpan;
use std::fmt::{self, Display, Formatter, Write};

/// A parsed source file: type declarations, pattern rules, bindings and
/// anonymous top-level values, in source order.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Document {
    pub items: Vec<Item>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Item {
    Type(TypeDecl),
    Pattern(PatternRule),
    Binding(Binding),
    Value(DataExpr),
}

// --- Type declarations ---

#[derive(Debug, PartialEq, Clone)]
pub struct TypeDecl {
    pub name: String,
    pub params: Vec<String>,
    pub ctors: CtorList,
    /// Clauses written after the constructors (or among them, in block form).
    pub wheres: Vec<WhereClause>,
    pub pos_start: usize,
    pub pos_end: usize,
}

/// The two notations for a constructor list. Desugaring rewrites `Piped`
/// into `Lines`.
#[derive(Debug, PartialEq, Clone)]
pub enum CtorList {
    Piped(Vec<CtorDecl>),
    Lines(Vec<CtorDecl>),
}

impl CtorList {
    pub fn ctors(&self) -> &[CtorDecl] {
        match self {
            CtorList::Piped(c) | CtorList::Lines(c) => c,
        }
    }

    pub fn ctors_mut(&mut self) -> &mut Vec<CtorDecl> {
        match self {
            CtorList::Piped(c) | CtorList::Lines(c) => c,
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct CtorDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    /// A `where` written directly after this constructor's fields.
    pub inline_where: Option<WhereClause>,
    pub pos_start: usize,
    pub pos_end: usize,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FieldDecl {
    pub name: Option<String>,
    pub ty: TypeExpr,
    pub pos_start: usize,
    pub pos_end: usize,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub pos_start: usize,
    pub pos_end: usize,
}

#[derive(Debug, PartialEq, Clone)]
pub enum TypeExprKind {
    /// A primitive, a declared type (possibly applied to arguments) or a type parameter.
    Named { name: String, args: Vec<TypeExpr> },
    Optional(Box<TypeExpr>),
    List(Box<TypeExpr>),
}

#[derive(Debug, PartialEq, Clone)]
pub struct WhereClause {
    /// One or more conditions, implicitly `and`-joined.
    pub exprs: Vec<Expr>,
    pub scope: Scope,
    pub pos_start: usize,
    pub pos_end: usize,
}

/// Which constructors of a type a constraint applies to.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Scope {
    All,
    Only(Vec<String>),
    Except(Vec<String>),
}

impl Scope {
    pub fn applies_to(&self, ctor: &str) -> bool {
        match self {
            Scope::All => true,
            Scope::Only(names) => names.iter().any(|n| n == ctor),
            Scope::Except(names) => !names.iter().any(|n| n == ctor),
        }
    }

    pub fn names(&self) -> &[String] {
        match self {
            Scope::All => &[],
            Scope::Only(names) | Scope::Except(names) => names,
        }
    }
}

// --- Pattern rules ---

#[derive(Debug, PartialEq, Clone)]
pub struct PatternRule {
    pub template: StrLit,
    /// Always an [`ExprKind::Call`] naming a constructor.
    pub target: Expr,
    pub guard: Vec<Expr>,
    pub pos_start: usize,
    pub pos_end: usize,
}

// --- Bindings and data ---

#[derive(Debug, PartialEq, Clone)]
pub struct Binding {
    pub name: String,
    /// `name: type := value`
    pub ty: Option<TypeExpr>,
    pub value: DataExpr,
    pub pos_start: usize,
    pub pos_end: usize,
}

#[derive(Debug, PartialEq, Clone)]
pub struct DataExpr {
    pub kind: DataKind,
    pub pos_start: usize,
    pub pos_end: usize,
}

#[derive(Debug, PartialEq, Clone)]
pub enum DataKind {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    List(Vec<DataExpr>),
    /// `ctor(a, field: b)`, or a bare constructor name.
    Call { ctor: String, args: Vec<DataArg> },
    /// `{field: value, ...}`, the constructor is inferred from context.
    Anonymous(Vec<Entry>),
    /// `!name.field...`
    Reference { name: String, path: Vec<String> },

    // == Sugar, removed by desugaring ==
    /// `ctor:` followed by indented `field: value` lines.
    CtorBlock { ctor: String, entries: Vec<Entry> },
    /// `ctor:` followed by indented `- value` lines.
    ListBlock { ctor: String, items: Vec<DataExpr> },
    /// A nested `field:` followed by indented `field: value` lines.
    FieldBlock(Vec<Entry>),
    /// A nested `field:` followed by indented `- value` lines.
    DashList(Vec<DataExpr>),
    /// A `- field: value` item together with its indented sibling fields.
    DashRecord(Vec<Entry>),
}

impl DataKind {
    pub fn is_sugar(&self) -> bool {
        matches!(
            self,
            DataKind::CtorBlock { .. }
                | DataKind::ListBlock { .. }
                | DataKind::FieldBlock(_)
                | DataKind::DashList(_)
                | DataKind::DashRecord(_)
        )
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct DataArg {
    pub name: Option<String>,
    pub value: DataExpr,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Entry {
    pub key: String,
    pub value: DataExpr,
    pub pos_start: usize,
    pub pos_end: usize,
}

// --- Expressions (constraints, guards, pattern targets) ---

#[derive(Debug, PartialEq, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos_start: usize,
    pub pos_end: usize,
}

#[derive(Debug, PartialEq, Clone)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Ident(String),
    List(Vec<Expr>),
    Field { base: Box<Expr>, name: String },
    Call { name: String, args: Vec<Arg> },
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

#[derive(Debug, PartialEq, Clone)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }

    /// Printing precedence, mirrors the parser's binding powers.
    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 6,
        }
    }
}

const PREC_NOT: u8 = 3;
const PREC_NEG: u8 = 7;
const PREC_ATOM: u8 = 8;

impl Expr {
    fn precedence(&self) -> u8 {
        match &self.kind {
            ExprKind::Binary { op, .. } => op.precedence(),
            ExprKind::Unary { op: UnaryOp::Not, .. } => PREC_NOT,
            ExprKind::Unary { op: UnaryOp::Neg, .. } => PREC_NEG,
            // A negative literal would lex differently after an operator if it
            // were used as a field base, keep it grouped.
            ExprKind::Int(n) if *n < 0 => PREC_NEG,
            ExprKind::Float(n) if n.is_sign_negative() => PREC_NEG,
            _ => PREC_ATOM,
        }
    }

    /// Every identifier the expression reads, in order of appearance.
    pub fn free_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match &self.kind {
            ExprKind::Ident(name) => out.push(name),
            ExprKind::List(items) => items.iter().for_each(|e| e.collect_names(out)),
            ExprKind::Field { base, .. } => base.collect_names(out),
            ExprKind::Call { args, .. } => args.iter().for_each(|a| a.value.collect_names(out)),
            ExprKind::Unary { expr, .. } => expr.collect_names(out),
            ExprKind::Binary { lhs, rhs, .. } => {
                lhs.collect_names(out);
                rhs.collect_names(out);
            }
            _ => {}
        }
    }
}

macro_rules! impl_span {
    ($($node:ty),* $(,)?) => {
        $(
            impl $node {
                pub fn span(&self) -> SourceSpan {
                    (self.pos_start, self.pos_end.saturating_sub(self.pos_start)).into()
                }
            }
        )*
    };
}

impl_span!(
    TypeDecl,
    CtorDecl,
    FieldDecl,
    TypeExpr,
    WhereClause,
    PatternRule,
    Binding,
    DataExpr,
    Entry,
    Expr,
);

impl Document {
    /// True when no sugar node is left anywhere in the document.
    pub fn is_canonical(&self) -> bool {
        self.items.iter().all(|item| match item {
            Item::Type(decl) => {
                matches!(decl.ctors, CtorList::Lines(_))
                    && decl.ctors.ctors().iter().all(|c| c.inline_where.is_none())
            }
            Item::Pattern(_) => true,
            Item::Binding(b) => b.value.is_canonical(),
            Item::Value(v) => v.is_canonical(),
        })
    }
}

impl DataExpr {
    pub fn is_canonical(&self) -> bool {
        match &self.kind {
            DataKind::List(items) => items.iter().all(DataExpr::is_canonical),
            DataKind::Call { args, .. } => args.iter().all(|a| a.value.is_canonical()),
            DataKind::Anonymous(entries) => entries.iter().all(|e| e.value.is_canonical()),
            kind => !kind.is_sugar(),
        }
    }
}

// --- Printing ---
//
// Documents print in the canonical notation: sugar nodes are written as the
// forms they desugar to, so printing then parsing always yields canonical input.

const INDENT: &str = "    ";

pub(crate) fn is_plain_ident(name: &str) -> bool {
    const KEYWORDS: &[&str] = &[
        "type", "where", "for", "except", "optional", "list", "and", "or", "not", "true", "false",
        "null",
    ];
    let mut chars = name.chars();
    let starts_well = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_well
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !KEYWORDS.contains(&name)
}

pub(crate) fn write_escaped(f: &mut impl Write, text: &str) -> fmt::Result {
    for c in text.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            '{' => f.write_str("\\{")?,
            '}' => f.write_str("\\}")?,
            c => f.write_char(c)?,
        }
    }
    Ok(())
}

fn write_string(f: &mut Formatter<'_>, text: &str) -> fmt::Result {
    f.write_char('"')?;
    write_escaped(f, text)?;
    f.write_char('"')
}

fn write_template(f: &mut Formatter<'_>, template: &StrLit) -> fmt::Result {
    f.write_char('"')?;
    for part in &template.parts {
        match part {
            TemplatePart::Literal(text) => write_escaped(f, text)?,
            TemplatePart::Placeholder(name) => write!(f, "{{{name}}}")?,
            TemplatePart::StrayBrace(c) => f.write_char(*c)?,
        }
    }
    f.write_char('"')
}

fn write_key(f: &mut Formatter<'_>, key: &str) -> fmt::Result {
    if is_plain_ident(key) {
        f.write_str(key)
    } else {
        write_string(f, key)
    }
}

fn write_float(f: &mut Formatter<'_>, n: f64) -> fmt::Result {
    write!(f, "{n:?}")
}

fn write_joined<T: Display>(f: &mut Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl Display for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            writeln!(f, "{item}")?;
        }
        Ok(())
    }
}

impl Display for Item {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Item::Type(decl) => decl.fmt(f),
            Item::Pattern(rule) => rule.fmt(f),
            Item::Binding(binding) => binding.fmt(f),
            Item::Value(value) => value.fmt(f),
        }
    }
}

impl Display for TypeDecl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "type {}", self.name)?;
        for param in &self.params {
            write!(f, " {param}")?;
        }
        f.write_str(" =")?;
        match &self.ctors {
            CtorList::Piped(ctors) => {
                for (i, ctor) in ctors.iter().enumerate() {
                    f.write_str(if i == 0 { " " } else { " | " })?;
                    write!(f, "{ctor}")?;
                }
                for clause in &self.wheres {
                    write!(f, "\n{clause}")?;
                }
            }
            CtorList::Lines(ctors) => {
                for ctor in ctors {
                    write!(f, "\n{INDENT}{ctor}")?;
                }
                for clause in &self.wheres {
                    write!(f, "\n{INDENT}{clause}")?;
                }
            }
        }
        Ok(())
    }
}

impl Display for CtorDecl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.name)?;
        write_joined(f, &self.fields)?;
        f.write_char('}')?;
        if let Some(clause) = &self.inline_where {
            f.write_str(" where ")?;
            write_joined(f, &clause.exprs)?;
        }
        Ok(())
    }
}

impl Display for FieldDecl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{name}: ")?;
        }
        self.ty.fmt(f)
    }
}

impl TypeExpr {
    fn is_atomic(&self) -> bool {
        matches!(&self.kind, TypeExprKind::Named { args, .. } if args.is_empty())
    }
}

impl Display for TypeExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeExprKind::Named { name, args } => {
                f.write_str(name)?;
                for arg in args {
                    if arg.is_atomic() {
                        write!(f, " {arg}")?;
                    } else {
                        write!(f, " ({arg})")?;
                    }
                }
                Ok(())
            }
            TypeExprKind::Optional(inner) => write!(f, "optional {inner}"),
            TypeExprKind::List(inner) => write!(f, "list {inner}"),
        }
    }
}

impl Display for WhereClause {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("where ")?;
        write_joined(f, &self.exprs)?;
        match &self.scope {
            Scope::All => Ok(()),
            Scope::Only(names) => write!(f, " for {{{}}}", names.join(", ")),
            Scope::Except(names) => write!(f, " except {{{}}}", names.join(", ")),
        }
    }
}

impl Display for PatternRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_template(f, &self.template)?;
        write!(f, " => {}", self.target)?;
        if !self.guard.is_empty() {
            f.write_str(" where ")?;
            write_joined(f, &self.guard)?;
        }
        Ok(())
    }
}

impl Display for Binding {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(ty) = &self.ty {
            write!(f, ": {ty}")?;
        }
        write!(f, " := {}", self.value)
    }
}

fn write_entries(f: &mut Formatter<'_>, entries: &[Entry]) -> fmt::Result {
    f.write_char('{')?;
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_key(f, &entry.key)?;
        write!(f, ": {}", entry.value)?;
    }
    f.write_char('}')
}

impl Display for DataExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DataKind::Str(s) => write_string(f, s),
            DataKind::Int(n) => write!(f, "{n}"),
            DataKind::Float(n) => write_float(f, *n),
            DataKind::Bool(b) => write!(f, "{b}"),
            DataKind::Null => f.write_str("null"),
            DataKind::List(items) | DataKind::DashList(items) => {
                f.write_char('[')?;
                write_joined(f, items)?;
                f.write_char(']')
            }
            DataKind::Call { ctor, args } => {
                write!(f, "{ctor}(")?;
                write_joined(f, args)?;
                f.write_char(')')
            }
            DataKind::Anonymous(entries)
            | DataKind::FieldBlock(entries)
            | DataKind::DashRecord(entries) => write_entries(f, entries),
            DataKind::Reference { name, path } => {
                write!(f, "!{name}")?;
                for field in path {
                    write!(f, ".{field}")?;
                }
                Ok(())
            }
            DataKind::CtorBlock { ctor, entries } => {
                write!(f, "{ctor}(")?;
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", entry.key, entry.value)?;
                }
                f.write_char(')')
            }
            DataKind::ListBlock { ctor, items } => {
                write!(f, "{ctor}([")?;
                write_joined(f, items)?;
                f.write_str("])")
            }
        }
    }
}

impl Display for DataArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{name}: ")?;
        }
        self.value.fmt(f)
    }
}

impl Expr {
    fn fmt_operand(&self, f: &mut Formatter<'_>, min_precedence: u8) -> fmt::Result {
        if self.precedence() < min_precedence {
            write!(f, "({self})")
        } else {
            self.fmt(f)
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Int(n) => write!(f, "{n}"),
            ExprKind::Float(n) => write_float(f, *n),
            ExprKind::Str(s) => write_string(f, s),
            ExprKind::Bool(b) => write!(f, "{b}"),
            ExprKind::Null => f.write_str("null"),
            ExprKind::Ident(name) => f.write_str(name),
            ExprKind::List(items) => {
                f.write_char('[')?;
                write_joined(f, items)?;
                f.write_char(']')
            }
            ExprKind::Field { base, name } => {
                base.fmt_operand(f, PREC_ATOM)?;
                write!(f, ".{name}")
            }
            ExprKind::Call { name, args } => {
                write!(f, "{name}(")?;
                write_joined(f, args)?;
                f.write_char(')')
            }
            ExprKind::Unary { op: UnaryOp::Not, expr } => {
                f.write_str("not ")?;
                expr.fmt_operand(f, PREC_NOT)
            }
            ExprKind::Unary { op: UnaryOp::Neg, expr } => {
                f.write_char('-')?;
                // `-1` would read back as a literal
                if matches!(expr.kind, ExprKind::Int(_) | ExprKind::Float(_)) {
                    write!(f, "({expr})")
                } else {
                    expr.fmt_operand(f, PREC_NEG)
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let prec = op.precedence();
                lhs.fmt_operand(f, prec)?;
                write!(f, " {} ", op.symbol())?;
                rhs.fmt_operand(f, prec + 1)
            }
        }
    }
}

impl Display for Arg {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{name}: ")?;
        }
        self.value.fmt(f)
    }
}

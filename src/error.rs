use crate::eval::EvalErrorKind;
use crate::utils::get_line_and_column;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Every failure the loading pipeline can report. Each stage fails fast, so a
/// `LoadError` always describes the first problem found in the document.
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum LoadError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Constraint(#[from] ConstraintViolation),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Eval(#[from] EvalError),
}

impl LoadError {
    /// The primary source span of the error.
    #[must_use]
    pub fn span(&self) -> SourceSpan {
        match self {
            LoadError::Lex(e) => e.span(),
            LoadError::Parse(e) => e.span(),
            LoadError::Type(e) => e.span,
            LoadError::Constraint(e) => e.span,
            LoadError::Reference(e) => e.span(),
            LoadError::Eval(e) => e.span,
        }
    }

    fn named_source(&self) -> &NamedSource<String> {
        match self {
            LoadError::Lex(e) => e.src(),
            LoadError::Parse(e) => e.src(),
            LoadError::Type(e) => &e.src,
            LoadError::Constraint(e) => &e.src,
            LoadError::Reference(e) => e.src(),
            LoadError::Eval(e) => &e.src,
        }
    }

    /// 1-based line and column of the primary span.
    #[must_use]
    pub fn line_col(&self) -> (usize, usize) {
        get_line_and_column(self.named_source().inner(), self.span().offset())
    }
}

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum LexError {
    #[error("Unterminated string literal")]
    #[diagnostic(
        code(lexer::unterminated_string),
        help("Close the string with a `\"` before the end of the line.")
    )]
    UnterminatedString {
        #[source_code]
        src: NamedSource<String>,
        #[label("string starts here")]
        span: SourceSpan,
    },

    #[error("Invalid numeric literal `{literal}`")]
    #[diagnostic(code(lexer::invalid_number))]
    InvalidNumber {
        literal: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("not a valid number")]
        span: SourceSpan,
    },

    #[error("Unexpected character `{found}`")]
    #[diagnostic(code(lexer::unexpected_character))]
    UnexpectedCharacter {
        found: char,
        #[source_code]
        src: NamedSource<String>,
        #[label("not part of any token")]
        span: SourceSpan,
    },

    #[error("Tabs and spaces mixed in indentation")]
    #[diagnostic(
        code(lexer::mixed_indentation),
        help("Indent every line of a block with the same character.")
    )]
    MixedIndentation {
        #[source_code]
        src: NamedSource<String>,
        #[label("inconsistent indentation")]
        span: SourceSpan,
    },

    #[error("Dedent does not match any outer indentation level")]
    #[diagnostic(code(lexer::inconsistent_dedent))]
    InconsistentDedent {
        #[source_code]
        src: NamedSource<String>,
        #[label("this line is indented to {column} columns")]
        span: SourceSpan,
        column: usize,
    },
}

impl LexError {
    #[must_use]
    pub fn span(&self) -> SourceSpan {
        match self {
            LexError::UnterminatedString { span, .. }
            | LexError::InvalidNumber { span, .. }
            | LexError::UnexpectedCharacter { span, .. }
            | LexError::MixedIndentation { span, .. }
            | LexError::InconsistentDedent { span, .. } => *span,
        }
    }

    fn src(&self) -> &NamedSource<String> {
        match self {
            LexError::UnterminatedString { src, .. }
            | LexError::InvalidNumber { src, .. }
            | LexError::UnexpectedCharacter { src, .. }
            | LexError::MixedIndentation { src, .. }
            | LexError::InconsistentDedent { src, .. } => src,
        }
    }
}

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum ParseError {
    #[error("Unexpected token: expected {expected}, found {found}")]
    #[diagnostic(
        code(parser::unexpected_token),
        help("The parser found a token it did not expect in this position.")
    )]
    UnexpectedToken {
        expected: String,
        found: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("expected {expected}")]
        span: SourceSpan,
    },

    #[error("Unexpected end of file: expected {expected}")]
    #[diagnostic(
        code(parser::unexpected_eof),
        help("The file ended unexpectedly. The parser expected more tokens.")
    )]
    UnexpectedEof {
        expected: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("file ended here")]
        span: SourceSpan,
    },

    #[error("Nesting deeper than {limit} levels")]
    #[diagnostic(
        code(parser::too_deep),
        help("Split the value into named bindings and refer to them with `!name`.")
    )]
    TooDeep {
        limit: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("too deep here")]
        span: SourceSpan,
    },
}

impl ParseError {
    #[must_use]
    pub fn span(&self) -> SourceSpan {
        match self {
            ParseError::UnexpectedToken { span, .. }
            | ParseError::UnexpectedEof { span, .. }
            | ParseError::TooDeep { span, .. } => *span,
        }
    }

    /// What the parser was looking for when it gave up.
    #[must_use]
    pub fn expected(&self) -> &str {
        match self {
            ParseError::UnexpectedToken { expected, .. }
            | ParseError::UnexpectedEof { expected, .. } => expected,
            ParseError::TooDeep { .. } => "a less deeply nested value",
        }
    }

    fn src(&self) -> &NamedSource<String> {
        match self {
            ParseError::UnexpectedToken { src, .. }
            | ParseError::UnexpectedEof { src, .. }
            | ParseError::TooDeep { src, .. } => src,
        }
    }
}

/// The specific reason a [`TypeError`] was raised.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeErrorKind {
    #[error("unknown type `{0}`")]
    UnknownType(String),
    #[error("unknown constructor `{0}`")]
    UnknownConstructor(String),
    #[error("`{0}` is declared more than once")]
    DuplicateName(String),
    #[error("type `{name}` expects {expected} parameter(s) but was given {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("cannot infer which constructor of `{0}` this anonymous value uses")]
    AmbiguousAnonymousConstructor(String),
    #[error("no pattern rule turns {input:?} into a `{expected}`")]
    PatternMatchFailed { input: String, expected: String },
    #[error("expected a value of type `{expected}`, found {found}")]
    Mismatch { expected: String, found: String },
    #[error("constructor `{ctor}` does not belong to type `{expected}`")]
    ConstructorMismatch { ctor: String, expected: String },
    #[error("constructor `{ctor}` has no field `{field}`")]
    UnknownField { ctor: String, field: String },
    #[error("field `{field}` of `{ctor}` is given more than once")]
    DuplicateField { ctor: String, field: String },
    #[error("missing field `{field}` for constructor `{ctor}`")]
    MissingField { ctor: String, field: String },
    #[error("constructor `{ctor}` takes {expected} argument(s) but was given {found}")]
    TooManyArguments {
        ctor: String,
        expected: usize,
        found: usize,
    },
    #[error("invalid pattern template: {0}")]
    InvalidPattern(String),
}

#[derive(Error, Debug, Diagnostic, Clone)]
#[error("Type error: {kind}")]
#[diagnostic(code(types::error))]
pub struct TypeError {
    pub kind: TypeErrorKind,
    #[source_code]
    pub src: NamedSource<String>,
    #[label("here")]
    pub span: SourceSpan,
    #[help]
    pub help: Option<String>,
}

impl TypeError {
    pub(crate) fn new(kind: TypeErrorKind, src: NamedSource<String>, span: SourceSpan) -> Self {
        Self {
            kind,
            src,
            span,
            help: None,
        }
    }

    pub(crate) fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

/// A `where` clause evaluated to false for a constructed value.
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("Constraint `{constraint}` violated by `{constructor}`")]
#[diagnostic(code(constraint::violation))]
pub struct ConstraintViolation {
    pub constructor: String,
    pub constraint: String,
    /// Field names paired with the rendered value they were bound to.
    pub fields: Vec<(String, String)>,
    #[source_code]
    pub src: NamedSource<String>,
    #[label("this value")]
    pub span: SourceSpan,
    #[label("constraint declared here")]
    pub constraint_span: SourceSpan,
    #[help]
    pub help: String,
}

impl ConstraintViolation {
    pub(crate) fn new(
        constructor: String,
        constraint: String,
        fields: Vec<(String, String)>,
        src: NamedSource<String>,
        span: SourceSpan,
        constraint_span: SourceSpan,
    ) -> Self {
        let rendered = fields
            .iter()
            .map(|(name, value)| format!("{name} = {value}"))
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            constructor,
            constraint,
            fields,
            src,
            span,
            constraint_span,
            help: format!("field values: {rendered}"),
        }
    }
}

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum ReferenceError {
    #[error("Reference to undefined name `{name}`")]
    #[diagnostic(
        code(reference::undefined),
        help("Declare it with `{name} := ...` somewhere in the document.")
    )]
    Undefined {
        name: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("not defined")]
        span: SourceSpan,
    },

    #[error("`{name}` depends on its own value")]
    #[diagnostic(
        code(reference::self_dependency),
        help("A cycle may only pass through whole references used as record values.")
    )]
    SelfDependency {
        name: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("needs the value of `{name}` while it is still being built")]
        span: SourceSpan,
    },

    #[error("`{name}` has no field `{field}`")]
    #[diagnostic(code(reference::unknown_field))]
    UnknownField {
        name: String,
        field: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("no such field")]
        span: SourceSpan,
    },

    #[error("Resolving `{name}` follows more than {limit} nested references")]
    #[diagnostic(
        code(reference::too_deep),
        help("Reference chains this long cannot be resolved; shorten the chain.")
    )]
    TooDeep {
        name: String,
        limit: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("chain continues here")]
        span: SourceSpan,
    },

    #[error("`{name}` is bound more than once")]
    #[diagnostic(code(reference::duplicate_binding))]
    DuplicateBinding {
        name: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("second binding")]
        span: SourceSpan,
    },
}

impl ReferenceError {
    #[must_use]
    pub fn span(&self) -> SourceSpan {
        match self {
            ReferenceError::Undefined { span, .. }
            | ReferenceError::SelfDependency { span, .. }
            | ReferenceError::UnknownField { span, .. }
            | ReferenceError::TooDeep { span, .. }
            | ReferenceError::DuplicateBinding { span, .. } => *span,
        }
    }

    fn src(&self) -> &NamedSource<String> {
        match self {
            ReferenceError::Undefined { src, .. }
            | ReferenceError::SelfDependency { src, .. }
            | ReferenceError::UnknownField { src, .. }
            | ReferenceError::TooDeep { src, .. }
            | ReferenceError::DuplicateBinding { src, .. } => src,
        }
    }
}

/// An expression inside a constraint, guard or pattern target could not be evaluated.
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("Evaluation error: {kind}")]
#[diagnostic(code(eval::error))]
pub struct EvalError {
    pub kind: EvalErrorKind,
    #[source_code]
    pub src: NamedSource<String>,
    #[label("while evaluating this")]
    pub span: SourceSpan,
}

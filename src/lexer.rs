use crate::error::LexError;
use miette::{NamedSource, SourceSpan};
use std::fmt;
use std::sync::Arc;

/// A piece of a string literal, split at `{name}` template markers.
#[derive(Debug, PartialEq, Clone)]
pub enum TemplatePart {
    Literal(String),
    Placeholder(String),
    /// A `{` or `}` that is neither escaped nor part of a `{name}` marker.
    StrayBrace(char),
}

/// A decoded string literal. `text` is the string as data; `parts` keeps the
/// template structure for pattern rules.
#[derive(Debug, PartialEq, Clone)]
pub struct StrLit {
    pub text: String,
    pub parts: Vec<TemplatePart>,
}

impl StrLit {
    /// A literal without any template markers.
    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        let parts = if text.is_empty() {
            Vec::new()
        } else {
            vec![TemplatePart::Literal(text.clone())]
        };
        Self { text, parts }
    }
}

/// Represents the different kinds of tokens that the lexer can produce.
#[derive(Debug, PartialEq, Clone)]
pub enum TokenType {
    // == Layout ==
    /// End of the input. Always the last token.
    Eof,
    /// End of a logical line (or a line break inside brackets).
    Newline,
    /// The next line is indented deeper than the enclosing block.
    Indent,
    /// The current block ended.
    Dedent,

    // == Literals ==
    Identifier(String),
    String(StrLit),
    Int(i64),
    Float(f64),

    // == Keywords ==
    Type,
    Where,
    For,
    Except,
    Optional,
    List,
    And,
    Or,
    Not,
    True,
    False,
    Null,

    // == Punctuation & Operators ==
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Colon,
    /// `:=`, binds a name to a value.
    Define,
    Dot,
    Pipe,
    Equals,
    /// `=>`, separates a pattern template from its target.
    FatArrow,
    /// `!`, prefixes a reference use.
    Bang,
    Minus,
    Plus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl TokenType {
    /// Whether a value can end with this token. Used to tell `a -1` apart from `a, -1`.
    fn ends_value(&self) -> bool {
        matches!(
            self,
            TokenType::Identifier(_)
                | TokenType::String(_)
                | TokenType::Int(_)
                | TokenType::Float(_)
                | TokenType::True
                | TokenType::False
                | TokenType::Null
                | TokenType::RParen
                | TokenType::RBracket
                | TokenType::RBrace
        )
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenType::Eof => "end of file",
            TokenType::Newline => "newline",
            TokenType::Indent => "indentation",
            TokenType::Dedent => "end of block",
            TokenType::Identifier(name) => return write!(f, "identifier `{name}`"),
            TokenType::String(s) => return write!(f, "string {:?}", s.text),
            TokenType::Int(n) => return write!(f, "number `{n}`"),
            TokenType::Float(n) => return write!(f, "number `{n}`"),
            TokenType::Type => "`type`",
            TokenType::Where => "`where`",
            TokenType::For => "`for`",
            TokenType::Except => "`except`",
            TokenType::Optional => "`optional`",
            TokenType::List => "`list`",
            TokenType::And => "`and`",
            TokenType::Or => "`or`",
            TokenType::Not => "`not`",
            TokenType::True => "`true`",
            TokenType::False => "`false`",
            TokenType::Null => "`null`",
            TokenType::LBrace => "`{`",
            TokenType::RBrace => "`}`",
            TokenType::LBracket => "`[`",
            TokenType::RBracket => "`]`",
            TokenType::LParen => "`(`",
            TokenType::RParen => "`)`",
            TokenType::Comma => "`,`",
            TokenType::Colon => "`:`",
            TokenType::Define => "`:=`",
            TokenType::Dot => "`.`",
            TokenType::Pipe => "`|`",
            TokenType::Equals => "`=`",
            TokenType::FatArrow => "`=>`",
            TokenType::Bang => "`!`",
            TokenType::Minus => "`-`",
            TokenType::Plus => "`+`",
            TokenType::Star => "`*`",
            TokenType::Slash => "`/`",
            TokenType::Percent => "`%`",
            TokenType::EqEq => "`==`",
            TokenType::NotEq => "`!=`",
            TokenType::Lt => "`<`",
            TokenType::LtEq => "`<=`",
            TokenType::Gt => "`>`",
            TokenType::GtEq => "`>=`",
        };
        f.write_str(text)
    }
}

/// A token with its type and position
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub ttype: TokenType,
    pub pos_start: usize,
    pub pos_end: usize,
}

impl Token {
    pub fn new(ttype: TokenType, pos_start: usize, pos_end: usize) -> Token {
        Token {
            ttype,
            pos_start,
            pos_end,
        }
    }

    pub fn span(&self) -> SourceSpan {
        (self.pos_start, self.pos_end - self.pos_start).into()
    }
}

#[derive(Debug, Clone, Copy)]
struct IndentLevel {
    width: usize,
    ch: Option<char>,
}

/// Turns source text into tokens, deriving INDENT/DEDENT markers from line
/// indentation. Indentation is ignored inside brackets, where line breaks
/// become plain NEWLINE separators.
pub struct Lexer<'a> {
    input: &'a str,
    position: usize,
    source: Arc<NamedSource<String>>,
    tokens: Vec<Token>,
    indents: Vec<IndentLevel>,
    depth: usize,
    at_line_start: bool,
    line_has_tokens: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        let source = Arc::new(NamedSource::new("source.tdl", input.to_string()));
        Self::with_source(input, source)
    }

    pub fn with_source(input: &'a str, source: Arc<NamedSource<String>>) -> Self {
        Self {
            input,
            position: 0,
            source,
            tokens: Vec::new(),
            indents: Vec::new(),
            depth: 0,
            at_line_start: true,
            line_has_tokens: false,
        }
    }

    /// Lexes the whole input. Calling it again starts over from the beginning.
    pub fn lex(&mut self) -> Result<Vec<Token>, LexError> {
        self.position = 0;
        self.tokens.clear();
        self.indents = vec![IndentLevel { width: 0, ch: None }];
        self.depth = 0;
        self.at_line_start = true;
        self.line_has_tokens = false;

        loop {
            if self.at_line_start && self.depth == 0 {
                self.read_indentation()?;
            }
            let Some(c) = self.peek() else { break };
            match c {
                ' ' | '\t' | '\r' => {
                    self.advance();
                }
                '\n' => {
                    let start = self.position;
                    self.advance();
                    if self.depth > 0 {
                        if !matches!(self.tokens.last(), Some(t) if t.ttype == TokenType::Newline) {
                            self.push(TokenType::Newline, start);
                        }
                    } else {
                        if self.line_has_tokens {
                            self.push(TokenType::Newline, start);
                        }
                        self.at_line_start = true;
                        self.line_has_tokens = false;
                    }
                }
                '/' if self.peek_second() == Some('/') => self.skip_comment(),
                _ => {
                    let token = self.next_token()?;
                    self.tokens.push(token);
                    self.line_has_tokens = true;
                }
            }
        }

        let end = self.input.len();
        if self.line_has_tokens && self.depth == 0 {
            self.tokens.push(Token::new(TokenType::Newline, end, end));
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.tokens.push(Token::new(TokenType::Dedent, end, end));
        }
        self.tokens.push(Token::new(TokenType::Eof, end, end));
        log::trace!("lexed {} tokens", self.tokens.len());
        Ok(std::mem::take(&mut self.tokens))
    }

    fn push(&mut self, ttype: TokenType, start: usize) {
        self.tokens.push(Token::new(ttype, start, self.position));
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.input[self.position..].chars().nth(1)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn read_indentation(&mut self) -> Result<(), LexError> {
        let start = self.position;
        let (mut saw_space, mut saw_tab) = (false, false);
        while let Some(c) = self.peek() {
            match c {
                ' ' => saw_space = true,
                '\t' => saw_tab = true,
                _ => break,
            }
            self.advance();
        }

        // Blank and comment-only lines do not take part in indentation.
        match self.peek() {
            None | Some('\n' | '\r') => return Ok(()),
            Some('/') if self.peek_second() == Some('/') => return Ok(()),
            _ => {}
        }
        self.at_line_start = false;

        let width = self.position - start;
        let span: SourceSpan = (start, width).into();
        if saw_space && saw_tab {
            return Err(self.mixed_indentation(span));
        }
        let ch = if saw_tab {
            Some('\t')
        } else if saw_space {
            Some(' ')
        } else {
            None
        };

        let top = self.current_indent();
        if width > top.width {
            if top.ch.is_some() && top.ch != ch {
                return Err(self.mixed_indentation(span));
            }
            self.indents.push(IndentLevel { width, ch });
            self.push(TokenType::Indent, start);
        } else if width < top.width {
            while self.current_indent().width > width {
                self.indents.pop();
                self.tokens
                    .push(Token::new(TokenType::Dedent, self.position, self.position));
            }
            let level = self.current_indent();
            if level.width != width {
                return Err(LexError::InconsistentDedent {
                    src: (*self.source).clone(),
                    span,
                    column: width,
                });
            }
            if width > 0 && level.ch != ch {
                return Err(self.mixed_indentation(span));
            }
        } else if width > 0 && top.ch != ch {
            return Err(self.mixed_indentation(span));
        }
        Ok(())
    }

    fn current_indent(&self) -> IndentLevel {
        self.indents
            .last()
            .copied()
            .unwrap_or(IndentLevel { width: 0, ch: None })
    }

    fn mixed_indentation(&self, span: SourceSpan) -> LexError {
        LexError::MixedIndentation {
            src: (*self.source).clone(),
            span,
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        let start = self.position;
        let follows_value = self
            .tokens
            .last()
            .is_some_and(|t| t.ttype.ends_value());
        let Some(c) = self.advance() else {
            return Ok(Token::new(TokenType::Eof, start, start));
        };

        let ttype = match c {
            '{' => self.open(TokenType::LBrace),
            '}' => self.close(TokenType::RBrace),
            '[' => self.open(TokenType::LBracket),
            ']' => self.close(TokenType::RBracket),
            '(' => self.open(TokenType::LParen),
            ')' => self.close(TokenType::RParen),
            ',' => TokenType::Comma,
            '.' => TokenType::Dot,
            '|' => TokenType::Pipe,
            '+' => TokenType::Plus,
            '*' => TokenType::Star,
            '/' => TokenType::Slash,
            '%' => TokenType::Percent,
            ':' => {
                if self.match_char('=') {
                    TokenType::Define
                } else {
                    TokenType::Colon
                }
            }
            '=' => {
                if self.match_char('=') {
                    TokenType::EqEq
                } else if self.match_char('>') {
                    TokenType::FatArrow
                } else {
                    TokenType::Equals
                }
            }
            '!' => {
                if self.match_char('=') {
                    TokenType::NotEq
                } else {
                    TokenType::Bang
                }
            }
            '<' => {
                if self.match_char('=') {
                    TokenType::LtEq
                } else {
                    TokenType::Lt
                }
            }
            '>' => {
                if self.match_char('=') {
                    TokenType::GtEq
                } else {
                    TokenType::Gt
                }
            }
            '-' if !follows_value && self.peek().is_some_and(|c| c.is_ascii_digit()) => {
                self.read_number(start)?
            }
            '-' => TokenType::Minus,
            '"' => self.read_string(start)?,
            c if c.is_ascii_digit() => self.read_number(start)?,
            c if c.is_ascii_alphabetic() || c == '_' => self.read_identifier(start),
            found => {
                return Err(LexError::UnexpectedCharacter {
                    found,
                    src: (*self.source).clone(),
                    span: (start, found.len_utf8()).into(),
                })
            }
        };

        Ok(Token::new(ttype, start, self.position))
    }

    fn open(&mut self, ttype: TokenType) -> TokenType {
        self.depth += 1;
        ttype
    }

    fn close(&mut self, ttype: TokenType) -> TokenType {
        self.depth = self.depth.saturating_sub(1);
        ttype
    }

    fn read_identifier(&mut self, start: usize) -> TokenType {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        match &self.input[start..self.position] {
            "type" => TokenType::Type,
            "where" => TokenType::Where,
            "for" => TokenType::For,
            "except" => TokenType::Except,
            "optional" => TokenType::Optional,
            "list" => TokenType::List,
            "and" => TokenType::And,
            "or" => TokenType::Or,
            "not" => TokenType::Not,
            "true" => TokenType::True,
            "false" => TokenType::False,
            "null" => TokenType::Null,
            ident => TokenType::Identifier(ident.to_string()),
        }
    }

    fn eat_digits(&mut self) -> usize {
        let mut count = 0;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            count += 1;
        }
        count
    }

    fn read_number(&mut self, start: usize) -> Result<TokenType, LexError> {
        let mut is_float = false;
        let mut valid = true;
        self.eat_digits();

        if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            self.eat_digits();
            // `1.2.3`
            if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
                valid = false;
                self.advance();
                self.eat_digits();
            }
        }

        if matches!(self.peek(), Some('e' | 'E')) {
            is_float = true;
            self.advance();
            if matches!(self.peek(), Some('+' | '-')) {
                self.advance();
            }
            if self.eat_digits() == 0 {
                valid = false;
            }
        }

        // `12abc`
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            valid = false;
            self.advance();
        }

        let literal = &self.input[start..self.position];
        let parsed = if !valid {
            None
        } else if is_float {
            literal.parse::<f64>().ok().map(TokenType::Float)
        } else {
            literal.parse::<i64>().ok().map(TokenType::Int)
        };

        parsed.ok_or_else(|| LexError::InvalidNumber {
            literal: literal.to_string(),
            src: (*self.source).clone(),
            span: (start, self.position - start).into(),
        })
    }

    fn read_string(&mut self, start: usize) -> Result<TokenType, LexError> {
        let mut text = String::new();
        let mut parts = Vec::new();
        let mut literal = String::new();

        loop {
            let Some(c) = self.advance() else {
                return Err(self.unterminated(start));
            };
            match c {
                '"' => break,
                '\n' => return Err(self.unterminated(start)),
                '\\' => {
                    let Some(escaped) = self.advance() else {
                        return Err(self.unterminated(start));
                    };
                    let decoded = match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        '"' | '\\' | '{' | '}' => escaped,
                        other => {
                            literal.push('\\');
                            text.push('\\');
                            other
                        }
                    };
                    literal.push(decoded);
                    text.push(decoded);
                }
                '{' => {
                    flush_literal(&mut literal, &mut parts);
                    if let Some(name) = self.placeholder_ahead() {
                        self.position += name.len() + 1;
                        text.push('{');
                        text.push_str(&name);
                        text.push('}');
                        parts.push(TemplatePart::Placeholder(name));
                    } else {
                        text.push('{');
                        parts.push(TemplatePart::StrayBrace('{'));
                    }
                }
                '}' => {
                    flush_literal(&mut literal, &mut parts);
                    text.push('}');
                    parts.push(TemplatePart::StrayBrace('}'));
                }
                other => {
                    literal.push(other);
                    text.push(other);
                }
            }
        }
        flush_literal(&mut literal, &mut parts);
        Ok(TokenType::String(StrLit { text, parts }))
    }

    /// The identifier of a `{name}` marker starting right after a `{`.
    fn placeholder_ahead(&self) -> Option<String> {
        let rest = &self.input[self.position..];
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let name = &rest[..len];
        let starts_well = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if starts_well && rest[len..].starts_with('}') {
            Some(name.to_string())
        } else {
            None
        }
    }

    fn unterminated(&self, start: usize) -> LexError {
        LexError::UnterminatedString {
            src: (*self.source).clone(),
            span: (start, 1).into(),
        }
    }
}

fn flush_literal(literal: &mut String, parts: &mut Vec<TemplatePart>) {
    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(std::mem::take(literal)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_types(input: &str) -> Vec<TokenType> {
        let mut lexer = Lexer::new(input);
        lexer
            .lex()
            .unwrap()
            .into_iter()
            .map(|t| t.ttype)
            .collect()
    }

    fn lex_err(input: &str) -> LexError {
        let mut lexer = Lexer::new(input);
        lexer.lex().unwrap_err()
    }

    fn ident(name: &str) -> TokenType {
        TokenType::Identifier(name.to_string())
    }

    #[test]
    fn test_eof() {
        assert_eq!(lex_types(""), vec![TokenType::Eof]);
    }

    #[test]
    fn test_single_char_tokens() {
        let expected = vec![
            TokenType::LBrace,
            TokenType::RBrace,
            TokenType::LBracket,
            TokenType::RBracket,
            TokenType::LParen,
            TokenType::RParen,
            TokenType::Comma,
            TokenType::Colon,
            TokenType::Pipe,
            TokenType::Bang,
            TokenType::Dot,
            TokenType::Newline,
            TokenType::Eof,
        ];
        assert_eq!(lex_types("{}[](),:|!."), expected);
    }

    #[test]
    fn test_multi_char_operators() {
        let expected = vec![
            TokenType::Define,
            TokenType::FatArrow,
            TokenType::EqEq,
            TokenType::NotEq,
            TokenType::LtEq,
            TokenType::GtEq,
            TokenType::Equals,
            TokenType::Newline,
            TokenType::Eof,
        ];
        assert_eq!(lex_types(":= => == != <= >= ="), expected);
    }

    #[test]
    fn test_keywords() {
        let expected = vec![
            TokenType::Type,
            TokenType::Where,
            TokenType::For,
            TokenType::Except,
            TokenType::Optional,
            TokenType::List,
            TokenType::And,
            TokenType::Or,
            TokenType::Not,
            TokenType::True,
            TokenType::False,
            TokenType::Null,
            ident("money"),
            TokenType::Newline,
            TokenType::Eof,
        ];
        assert_eq!(
            lex_types("type where for except optional list and or not true false null money"),
            expected
        );
    }

    #[test]
    fn test_numbers() {
        let expected = vec![
            TokenType::Int(123),
            TokenType::Comma,
            TokenType::Float(45.67),
            TokenType::Comma,
            TokenType::Int(-10),
            TokenType::Comma,
            TokenType::Float(1e3),
            TokenType::Newline,
            TokenType::Eof,
        ];
        assert_eq!(lex_types("123, 45.67, -10, 1e3"), expected);
    }

    #[test]
    fn test_minus_after_value_is_an_operator() {
        let expected = vec![
            ident("a"),
            TokenType::Minus,
            TokenType::Int(1),
            TokenType::Gt,
            TokenType::Int(-2),
            TokenType::Newline,
            TokenType::Eof,
        ];
        assert_eq!(lex_types("a -1 > -2"), expected);
    }

    #[test]
    fn test_strings_with_escapes() {
        let types = lex_types(r#""say \"hi\"\n""#);
        match &types[0] {
            TokenType::String(s) => assert_eq!(s.text, "say \"hi\"\n"),
            other => panic!("expected a string, got {other:?}"),
        }
    }

    #[test]
    fn test_template_markers() {
        let types = lex_types(r#""${amount} {currency}""#);
        let TokenType::String(s) = &types[0] else {
            panic!("expected a string");
        };
        assert_eq!(s.text, "${amount} {currency}");
        assert_eq!(
            s.parts,
            vec![
                TemplatePart::Literal("$".to_string()),
                TemplatePart::Placeholder("amount".to_string()),
                TemplatePart::Literal(" ".to_string()),
                TemplatePart::Placeholder("currency".to_string()),
            ]
        );
    }

    #[test]
    fn test_escaped_and_stray_braces() {
        let types = lex_types(r#""\{x\} { }""#);
        let TokenType::String(s) = &types[0] else {
            panic!("expected a string");
        };
        assert_eq!(s.text, "{x} { }");
        assert_eq!(
            s.parts,
            vec![
                TemplatePart::Literal("{x} ".to_string()),
                TemplatePart::StrayBrace('{'),
                TemplatePart::Literal(" ".to_string()),
                TemplatePart::StrayBrace('}'),
            ]
        );
    }

    #[test]
    fn test_comments_and_blank_lines_are_skipped() {
        let input = "// header\n\na := 1 // trailing\n\n   // indented comment\nb := 2\n";
        let expected = vec![
            ident("a"),
            TokenType::Define,
            TokenType::Int(1),
            TokenType::Newline,
            ident("b"),
            TokenType::Define,
            TokenType::Int(2),
            TokenType::Newline,
            TokenType::Eof,
        ];
        assert_eq!(lex_types(input), expected);
    }

    #[test]
    fn test_indent_and_dedent() {
        let input = "os:\n    - \"macOS\"\n    - \"Linux\"\nx := 1\n";
        let expected = vec![
            ident("os"),
            TokenType::Colon,
            TokenType::Newline,
            TokenType::Indent,
            TokenType::Minus,
            TokenType::String(StrLit::plain("macOS")),
            TokenType::Newline,
            TokenType::Minus,
            TokenType::String(StrLit::plain("Linux")),
            TokenType::Newline,
            TokenType::Dedent,
            ident("x"),
            TokenType::Define,
            TokenType::Int(1),
            TokenType::Newline,
            TokenType::Eof,
        ];
        assert_eq!(lex_types(input), expected);
    }

    #[test]
    fn test_open_blocks_close_at_eof() {
        let types = lex_types("a:\n  b:\n    c: 1");
        let tail: Vec<_> = types.iter().rev().take(3).cloned().collect();
        assert_eq!(
            tail,
            vec![TokenType::Eof, TokenType::Dedent, TokenType::Dedent]
        );
    }

    #[test]
    fn test_brackets_suppress_indentation() {
        let input = "p(\n        a: 1,\n  b: 2\n)\n";
        let expected = vec![
            ident("p"),
            TokenType::LParen,
            TokenType::Newline,
            ident("a"),
            TokenType::Colon,
            TokenType::Int(1),
            TokenType::Comma,
            TokenType::Newline,
            ident("b"),
            TokenType::Colon,
            TokenType::Int(2),
            TokenType::Newline,
            TokenType::RParen,
            TokenType::Newline,
            TokenType::Eof,
        ];
        assert_eq!(lex_types(input), expected);
    }

    #[test]
    fn test_token_positions() {
        let mut lexer = Lexer::new("ab := \"x\"");
        let tokens = lexer.lex().unwrap();
        assert_eq!((tokens[0].pos_start, tokens[0].pos_end), (0, 2));
        assert_eq!((tokens[1].pos_start, tokens[1].pos_end), (3, 5));
        assert_eq!((tokens[2].pos_start, tokens[2].pos_end), (6, 9));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(
            lex_err("a := \"oops\nb := 1"),
            LexError::UnterminatedString { .. }
        ));
        assert!(matches!(
            lex_err("\"never closed"),
            LexError::UnterminatedString { .. }
        ));
    }

    #[test]
    fn test_invalid_numbers() {
        for input in ["1.2.3", "12abc", "1e", "99999999999999999999"] {
            assert!(
                matches!(lex_err(input), LexError::InvalidNumber { .. }),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn test_mixed_indentation() {
        let err = lex_err("a:\n \tb: 1\n");
        assert!(matches!(err, LexError::MixedIndentation { .. }));

        let err = lex_err("a:\n  b:\n\t\t\tc: 2\n");
        assert!(matches!(err, LexError::MixedIndentation { .. }));
    }

    #[test]
    fn test_dedent_to_unknown_level() {
        let err = lex_err("a:\n    b:\n        c: 1\n  d: 2\n");
        assert!(matches!(
            err,
            LexError::InconsistentDedent { column: 2, .. }
        ));
    }

    #[test]
    fn test_unexpected_character() {
        assert!(matches!(
            lex_err("a := 1 ^ 2"),
            LexError::UnexpectedCharacter { found: '^', .. }
        ));
    }
}

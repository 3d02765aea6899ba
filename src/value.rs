use crate::ast::{is_plain_ident, write_escaped};
use std::fmt::{self, Display, Formatter, Write};

/// Index of a top-level binding, in declaration order.
pub type BindingId = usize;

/// A use of `!name` or `!name.field...`. References are handles: every use
/// of the same binding points at the same slot, never at a copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub binding: BindingId,
    pub name: String,
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// `None` for plain objects written without any type context.
    pub type_name: Option<String>,
    pub ctor: Option<String>,
    /// Fields in declaration order. Positional fields have no name.
    pub fields: Vec<(Option<String>, Value)>,
}

impl Record {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field.as_deref() == Some(name))
            .map(|(_, value)| value)
    }

    pub fn positional(&self, index: usize) -> Option<&Value> {
        self.fields.get(index).map(|(_, value)| value)
    }
}

/// A resolved value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Record(Record),
    Ref(Reference),
}

impl Value {
    /// Short description used in type mismatch messages.
    pub fn describe(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "a bool".to_string(),
            Value::Int(_) => "an int".to_string(),
            Value::Float(_) => "a float".to_string(),
            Value::Str(_) => "a string".to_string(),
            Value::List(_) => "a list".to_string(),
            Value::Record(Record { ctor: Some(c), .. }) => format!("constructor `{c}`"),
            Value::Record(_) => "a record".to_string(),
            Value::Ref(r) => format!("a reference to `{}`", r.name),
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }
}

/// Why a field path could not be followed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PathError {
    UnknownField(String),
    /// The binding is still being built.
    Unavailable(String),
}

/// Follows `path` from `value`, looking through references with `root`.
/// The returned value is never a reference.
pub(crate) fn walk<'v, F>(value: &'v Value, path: &[String], root: &F) -> Result<&'v Value, PathError>
where
    F: Fn(BindingId) -> Option<&'v Value>,
{
    let mut current = value;
    let mut fields = path.iter();
    loop {
        while let Value::Ref(reference) = current {
            let base = root(reference.binding)
                .ok_or_else(|| PathError::Unavailable(reference.name.clone()))?;
            current = walk(base, &reference.path, root)?;
        }
        let Some(field) = fields.next() else {
            return Ok(current);
        };
        current = current
            .as_record()
            .and_then(|record| record.get(field))
            .ok_or_else(|| PathError::UnknownField(field.clone()))?;
    }
}

/// Values print in the document's own syntax.
impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n:?}"),
            Value::Str(s) => {
                f.write_char('"')?;
                write_escaped(f, s)?;
                f.write_char('"')
            }
            Value::List(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_char(']')
            }
            Value::Record(record) => record.fmt(f),
            Value::Ref(reference) => {
                write!(f, "!{}", reference.name)?;
                for field in &reference.path {
                    write!(f, ".{field}")?;
                }
                Ok(())
            }
        }
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (open, close) = match &self.ctor {
            Some(ctor) => {
                write!(f, "{ctor}")?;
                ('(', ')')
            }
            None => ('{', '}'),
        };
        f.write_char(open)?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match name {
                Some(name) if is_plain_ident(name) || self.ctor.is_some() => {
                    write!(f, "{name}: ")?
                }
                Some(name) => {
                    f.write_char('"')?;
                    write_escaped(f, name)?;
                    f.write_str("\": ")?;
                }
                None => {}
            }
            write!(f, "{value}")?;
        }
        f.write_char(close)
    }
}

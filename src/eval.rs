//! Pure evaluation of `where` conditions, pattern guards and pattern targets.
//!
//! A name that is not bound evaluates to [`EvalValue::Missing`]. Missing
//! values flow through operators and calls, are dropped by `and`/`or`, and a
//! condition that ends up missing as a whole is satisfied.

use crate::ast::{Arg, BinaryOp, Expr, ExprKind, UnaryOp};
use crate::value::{Record, Reference, Value};
use miette::SourceSpan;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum EvalValue {
    Missing,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<EvalValue>),
    Record {
        ctor: Option<String>,
        fields: Vec<(Option<String>, EvalValue)>,
    },
    Ref(Reference),
}

impl EvalValue {
    fn type_name(&self) -> &'static str {
        match self {
            EvalValue::Missing => "a missing value",
            EvalValue::Null => "null",
            EvalValue::Bool(_) => "bool",
            EvalValue::Int(_) => "int",
            EvalValue::Float(_) => "float",
            EvalValue::Str(_) => "string",
            EvalValue::List(_) => "list",
            EvalValue::Record { .. } => "record",
            EvalValue::Ref(_) => "reference",
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            EvalValue::Int(n) => Some(*n as f64),
            EvalValue::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Converts back into a resolved value. `Missing` has no counterpart.
    pub fn into_value(self) -> Option<Value> {
        Some(match self {
            EvalValue::Missing => return None,
            EvalValue::Null => Value::Null,
            EvalValue::Bool(b) => Value::Bool(b),
            EvalValue::Int(n) => Value::Int(n),
            EvalValue::Float(n) => Value::Float(n),
            EvalValue::Str(s) => Value::Str(s),
            EvalValue::List(items) => Value::List(
                items
                    .into_iter()
                    .map(|item| item.into_value().unwrap_or(Value::Null))
                    .collect(),
            ),
            EvalValue::Record { ctor, fields } => Value::Record(Record {
                type_name: None,
                ctor,
                fields: fields
                    .into_iter()
                    .map(|(name, v)| (name, v.into_value().unwrap_or(Value::Null)))
                    .collect(),
            }),
            EvalValue::Ref(r) => Value::Ref(r),
        })
    }
}

impl From<&Value> for EvalValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => EvalValue::Null,
            Value::Bool(b) => EvalValue::Bool(*b),
            Value::Int(n) => EvalValue::Int(*n),
            Value::Float(n) => EvalValue::Float(*n),
            Value::Str(s) => EvalValue::Str(s.clone()),
            Value::List(items) => EvalValue::List(items.iter().map(EvalValue::from).collect()),
            Value::Record(record) => EvalValue::Record {
                ctor: record.ctor.clone(),
                fields: record
                    .fields
                    .iter()
                    .map(|(name, v)| (name.clone(), EvalValue::from(v)))
                    .collect(),
            },
            Value::Ref(r) => EvalValue::Ref(r.clone()),
        }
    }
}

impl Display for EvalValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EvalValue::Missing => f.write_str("<missing>"),
            other => match other.clone().into_value() {
                Some(value) => value.fmt(f),
                None => f.write_str("<missing>"),
            },
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalErrorKind {
    #[error("operator `{op}` cannot be applied to {left} and {right}")]
    BinaryType {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("operator `{op}` cannot be applied to {operand}")]
    UnaryType {
        op: &'static str,
        operand: &'static str,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("`{name}` expects {expected} argument(s), found {found}")]
    Arity {
        name: String,
        expected: &'static str,
        found: usize,
    },
    #[error("`{name}` cannot be applied to {found}")]
    BadArgument { name: String, found: &'static str },
    #[error("cannot convert {value} to {target}")]
    Conversion { value: String, target: &'static str },
    #[error("{found} has no fields")]
    NotARecord { found: &'static str },
    #[error("condition evaluated to {0}, expected a bool")]
    NotBoolean(String),
    #[error("`{0}` does not take named arguments")]
    NamedArgument(String),
    #[error("the value of `{0}` is not available yet")]
    Unavailable(String),
}

/// An evaluation failure and the sub-expression it happened in.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalFault {
    pub kind: EvalErrorKind,
    pub pos_start: usize,
    pub pos_end: usize,
}

impl EvalFault {
    fn at(kind: EvalErrorKind, expr: &Expr) -> Self {
        Self {
            kind,
            pos_start: expr.pos_start,
            pos_end: expr.pos_end,
        }
    }

    pub fn span(&self) -> SourceSpan {
        (self.pos_start, self.pos_end.saturating_sub(self.pos_start)).into()
    }
}

/// Supplies the names an expression can see.
pub trait Environment {
    fn lookup(&self, name: &str) -> Option<EvalValue>;

    /// Looks through a reference handle. Environments without bindings have
    /// nothing to look through.
    fn deref(&self, reference: &Reference) -> Result<EvalValue, EvalErrorKind> {
        Err(EvalErrorKind::Unavailable(reference.name.clone()))
    }
}

impl Environment for HashMap<String, EvalValue> {
    fn lookup(&self, name: &str) -> Option<EvalValue> {
        self.get(name).cloned()
    }
}

pub struct Evaluator<'e, E: Environment + ?Sized> {
    env: &'e E,
}

type EvalResult = Result<EvalValue, EvalFault>;

impl<'e, E: Environment + ?Sized> Evaluator<'e, E> {
    pub fn new(env: &'e E) -> Self {
        Self { env }
    }

    /// Evaluates a condition. Missing results count as satisfied.
    pub fn check(&self, expr: &Expr) -> Result<bool, EvalFault> {
        match self.eval(expr)? {
            EvalValue::Bool(b) => Ok(b),
            EvalValue::Missing => Ok(true),
            other => Err(EvalFault::at(
                EvalErrorKind::NotBoolean(other.to_string()),
                expr,
            )),
        }
    }

    pub fn eval(&self, expr: &Expr) -> EvalResult {
        match &expr.kind {
            ExprKind::Int(n) => Ok(EvalValue::Int(*n)),
            ExprKind::Float(n) => Ok(EvalValue::Float(*n)),
            ExprKind::Str(s) => Ok(EvalValue::Str(s.clone())),
            ExprKind::Bool(b) => Ok(EvalValue::Bool(*b)),
            ExprKind::Null => Ok(EvalValue::Null),
            ExprKind::Ident(name) => {
                let value = self.env.lookup(name).unwrap_or(EvalValue::Missing);
                self.settle(value, expr)
            }
            ExprKind::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match self.eval(item)? {
                        EvalValue::Missing => return Ok(EvalValue::Missing),
                        value => values.push(value),
                    }
                }
                Ok(EvalValue::List(values))
            }
            ExprKind::Field { base, name } => match self.eval(base)? {
                EvalValue::Missing | EvalValue::Null => Ok(EvalValue::Missing),
                EvalValue::Record { fields, .. } => {
                    let value = fields
                        .into_iter()
                        .find(|(field, _)| field.as_deref() == Some(name.as_str()))
                        .map_or(EvalValue::Missing, |(_, v)| v);
                    self.settle(value, expr)
                }
                other => Err(EvalFault::at(
                    EvalErrorKind::NotARecord {
                        found: other.type_name(),
                    },
                    expr,
                )),
            },
            ExprKind::Call { name, args } => self.eval_call(name, args, expr),
            ExprKind::Unary { op, expr: operand } => {
                let value = self.eval(operand)?;
                eval_unary(*op, value).map_err(|kind| EvalFault::at(kind, expr))
            }
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinaryOp::And | BinaryOp::Or => self.eval_logic(*op, lhs, rhs),
                _ => {
                    let left = self.eval(lhs)?;
                    let right = self.eval(rhs)?;
                    eval_binary(*op, left, right).map_err(|kind| EvalFault::at(kind, expr))
                }
            },
        }
    }

    /// Looks through references and treats null as absent.
    fn settle(&self, value: EvalValue, expr: &Expr) -> EvalResult {
        match value {
            EvalValue::Null => Ok(EvalValue::Missing),
            EvalValue::Ref(reference) => {
                let target = self
                    .env
                    .deref(&reference)
                    .map_err(|kind| EvalFault::at(kind, expr))?;
                self.settle(target, expr)
            }
            other => Ok(other),
        }
    }

    fn eval_logic(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> EvalResult {
        let short_circuit = op == BinaryOp::Or;
        let left = match self.eval(lhs)? {
            EvalValue::Bool(b) if b == short_circuit => return Ok(EvalValue::Bool(b)),
            EvalValue::Bool(b) => Some(b),
            EvalValue::Missing => None,
            other => return Err(logic_type_error(op, &other, lhs)),
        };
        let right = match self.eval(rhs)? {
            EvalValue::Bool(b) => Some(b),
            EvalValue::Missing => None,
            other => return Err(logic_type_error(op, &other, rhs)),
        };
        // A missing side is dropped; only two missing sides stay missing.
        Ok(match (left, right) {
            (Some(_), Some(r)) => EvalValue::Bool(r),
            (Some(b), None) | (None, Some(b)) => EvalValue::Bool(b),
            (None, None) => EvalValue::Missing,
        })
    }

    fn eval_call(&self, name: &str, args: &[Arg], expr: &Expr) -> EvalResult {
        if args.iter().any(|a| a.name.is_some()) {
            return Err(EvalFault::at(
                EvalErrorKind::NamedArgument(name.to_string()),
                expr,
            ));
        }
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match self.eval(&arg.value)? {
                EvalValue::Missing => return Ok(EvalValue::Missing),
                value => values.push(value),
            }
        }
        call_builtin(name, values).map_err(|kind| EvalFault::at(kind, expr))
    }
}

fn logic_type_error(op: BinaryOp, value: &EvalValue, expr: &Expr) -> EvalFault {
    EvalFault::at(
        EvalErrorKind::UnaryType {
            op: op.symbol(),
            operand: value.type_name(),
        },
        expr,
    )
}

fn eval_unary(op: UnaryOp, value: EvalValue) -> Result<EvalValue, EvalErrorKind> {
    match (op, value) {
        (_, EvalValue::Missing) => Ok(EvalValue::Missing),
        (UnaryOp::Not, EvalValue::Bool(b)) => Ok(EvalValue::Bool(!b)),
        (UnaryOp::Neg, EvalValue::Int(n)) => n
            .checked_neg()
            .map(EvalValue::Int)
            .ok_or(EvalErrorKind::Overflow),
        (UnaryOp::Neg, EvalValue::Float(n)) => Ok(EvalValue::Float(-n)),
        (op, other) => Err(EvalErrorKind::UnaryType {
            op: match op {
                UnaryOp::Not => "not",
                UnaryOp::Neg => "-",
            },
            operand: other.type_name(),
        }),
    }
}

fn eval_binary(op: BinaryOp, left: EvalValue, right: EvalValue) -> Result<EvalValue, EvalErrorKind> {
    if left == EvalValue::Missing || right == EvalValue::Missing {
        return Ok(EvalValue::Missing);
    }
    let type_error = |left: &EvalValue, right: &EvalValue| EvalErrorKind::BinaryType {
        op: op.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    };

    match op {
        BinaryOp::Eq => Ok(EvalValue::Bool(values_equal(&left, &right))),
        BinaryOp::Ne => Ok(EvalValue::Bool(!values_equal(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&left, &right).ok_or_else(|| type_error(&left, &right))?;
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(EvalValue::Bool(result))
        }
        BinaryOp::Add => match (left, right) {
            (EvalValue::Int(a), EvalValue::Int(b)) => {
                a.checked_add(b).map(EvalValue::Int).ok_or(EvalErrorKind::Overflow)
            }
            (EvalValue::Str(a), EvalValue::Str(b)) => Ok(EvalValue::Str(a + &b)),
            (EvalValue::List(mut a), EvalValue::List(b)) => {
                a.extend(b);
                Ok(EvalValue::List(a))
            }
            (l, r) => float_op(&l, &r, |a, b| a + b).ok_or_else(|| type_error(&l, &r)),
        },
        BinaryOp::Sub => match (left, right) {
            (EvalValue::Int(a), EvalValue::Int(b)) => {
                a.checked_sub(b).map(EvalValue::Int).ok_or(EvalErrorKind::Overflow)
            }
            (l, r) => float_op(&l, &r, |a, b| a - b).ok_or_else(|| type_error(&l, &r)),
        },
        BinaryOp::Mul => match (left, right) {
            (EvalValue::Int(a), EvalValue::Int(b)) => {
                a.checked_mul(b).map(EvalValue::Int).ok_or(EvalErrorKind::Overflow)
            }
            (l, r) => float_op(&l, &r, |a, b| a * b).ok_or_else(|| type_error(&l, &r)),
        },
        // Division always produces a float.
        BinaryOp::Div => {
            let (a, b) = left
                .as_number()
                .zip(right.as_number())
                .ok_or_else(|| type_error(&left, &right))?;
            if b == 0.0 {
                return Err(EvalErrorKind::DivisionByZero);
            }
            Ok(EvalValue::Float(a / b))
        }
        BinaryOp::Rem => match (left, right) {
            (EvalValue::Int(_), EvalValue::Int(0)) => Err(EvalErrorKind::DivisionByZero),
            (EvalValue::Int(a), EvalValue::Int(b)) => {
                a.checked_rem(b).map(EvalValue::Int).ok_or(EvalErrorKind::Overflow)
            }
            (l, r) => {
                let (a, b) = l
                    .as_number()
                    .zip(r.as_number())
                    .ok_or_else(|| type_error(&l, &r))?;
                if b == 0.0 {
                    return Err(EvalErrorKind::DivisionByZero);
                }
                Ok(EvalValue::Float(a % b))
            }
        },
        BinaryOp::And | BinaryOp::Or => Err(type_error(&left, &right)),
    }
}

fn float_op(left: &EvalValue, right: &EvalValue, f: impl Fn(f64, f64) -> f64) -> Option<EvalValue> {
    let (a, b) = left.as_number().zip(right.as_number())?;
    Some(EvalValue::Float(f(a, b)))
}

fn values_equal(left: &EvalValue, right: &EvalValue) -> bool {
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn compare(left: &EvalValue, right: &EvalValue) -> Option<Ordering> {
    match (left, right) {
        (EvalValue::Int(a), EvalValue::Int(b)) => Some(a.cmp(b)),
        (EvalValue::Str(a), EvalValue::Str(b)) => Some(a.cmp(b)),
        _ => {
            let (a, b) = left.as_number().zip(right.as_number())?;
            a.partial_cmp(&b)
        }
    }
}

fn arity(name: &str, expected: &'static str, found: usize) -> EvalErrorKind {
    EvalErrorKind::Arity {
        name: name.to_string(),
        expected,
        found,
    }
}

fn bad_argument(name: &str, value: &EvalValue) -> EvalErrorKind {
    EvalErrorKind::BadArgument {
        name: name.to_string(),
        found: value.type_name(),
    }
}

fn conversion(value: &EvalValue, target: &'static str) -> EvalErrorKind {
    EvalErrorKind::Conversion {
        value: value.to_string(),
        target,
    }
}

fn call_builtin(name: &str, args: Vec<EvalValue>) -> Result<EvalValue, EvalErrorKind> {
    match name {
        "min" | "max" => return min_max(name, args),
        "contains" | "starts_with" | "ends_with" => return string_pair(name, args),
        _ => {}
    }

    let [arg] = <[EvalValue; 1]>::try_from(args).map_err(|args| arity(name, "1", args.len()))?;
    match (name, arg) {
        ("int", EvalValue::Int(n)) => Ok(EvalValue::Int(n)),
        ("int", EvalValue::Bool(b)) => Ok(EvalValue::Int(i64::from(b))),
        ("int", EvalValue::Float(n)) => {
            // Out-of-range floats would saturate silently.
            if n.is_finite() && n >= i64::MIN as f64 && n < i64::MAX as f64 {
                Ok(EvalValue::Int(n.trunc() as i64))
            } else {
                Err(conversion(&EvalValue::Float(n), "int"))
            }
        }
        ("int", EvalValue::Str(s)) => s
            .trim()
            .parse::<i64>()
            .map(EvalValue::Int)
            .map_err(|_| conversion(&EvalValue::Str(s), "int")),
        ("float", EvalValue::Int(n)) => Ok(EvalValue::Float(n as f64)),
        ("float", EvalValue::Float(n)) => Ok(EvalValue::Float(n)),
        ("float", EvalValue::Str(s)) => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(EvalValue::Float(n)),
            _ => Err(conversion(&EvalValue::Str(s), "float")),
        },
        ("str", EvalValue::Str(s)) => Ok(EvalValue::Str(s)),
        ("str", other) => Ok(EvalValue::Str(other.to_string())),
        ("bool", EvalValue::Bool(b)) => Ok(EvalValue::Bool(b)),
        ("bool", EvalValue::Int(n)) => Ok(EvalValue::Bool(n != 0)),
        ("bool", EvalValue::Str(s)) => match s.trim() {
            "true" => Ok(EvalValue::Bool(true)),
            "false" => Ok(EvalValue::Bool(false)),
            _ => Err(conversion(&EvalValue::Str(s), "bool")),
        },
        ("len", EvalValue::Str(s)) => Ok(EvalValue::Int(s.chars().count() as i64)),
        ("len", EvalValue::List(items)) => Ok(EvalValue::Int(items.len() as i64)),
        ("len", EvalValue::Record { fields, .. }) => Ok(EvalValue::Int(fields.len() as i64)),
        ("remove_whitespace", EvalValue::Str(s)) => Ok(EvalValue::Str(
            s.chars().filter(|c| !c.is_whitespace()).collect(),
        )),
        ("lower", EvalValue::Str(s)) => Ok(EvalValue::Str(s.to_lowercase())),
        ("upper", EvalValue::Str(s)) => Ok(EvalValue::Str(s.to_uppercase())),
        ("trim", EvalValue::Str(s)) => Ok(EvalValue::Str(s.trim().to_string())),
        ("abs", EvalValue::Int(n)) => n
            .checked_abs()
            .map(EvalValue::Int)
            .ok_or(EvalErrorKind::Overflow),
        ("abs", EvalValue::Float(n)) => Ok(EvalValue::Float(n.abs())),
        (
            "int" | "float" | "bool" | "len" | "remove_whitespace" | "lower" | "upper" | "trim"
            | "abs",
            other,
        ) => Err(bad_argument(name, &other)),
        _ => Err(EvalErrorKind::UnknownFunction(name.to_string())),
    }
}

fn string_pair(name: &str, args: Vec<EvalValue>) -> Result<EvalValue, EvalErrorKind> {
    let [haystack, needle] =
        <[EvalValue; 2]>::try_from(args).map_err(|args| arity(name, "2", args.len()))?;
    let result = match (name, &haystack, &needle) {
        ("contains", EvalValue::List(items), needle) => {
            items.iter().any(|item| values_equal(item, needle))
        }
        ("contains", EvalValue::Str(s), EvalValue::Str(sub)) => s.contains(sub.as_str()),
        ("starts_with", EvalValue::Str(s), EvalValue::Str(prefix)) => s.starts_with(prefix.as_str()),
        ("ends_with", EvalValue::Str(s), EvalValue::Str(suffix)) => s.ends_with(suffix.as_str()),
        (_, EvalValue::Str(_), other) => return Err(bad_argument(name, other)),
        (_, other, _) => return Err(bad_argument(name, other)),
    };
    Ok(EvalValue::Bool(result))
}

fn min_max(name: &str, args: Vec<EvalValue>) -> Result<EvalValue, EvalErrorKind> {
    let candidates = match <[EvalValue; 1]>::try_from(args) {
        Ok([EvalValue::List(items)]) => items,
        Ok([single]) => vec![single],
        Err(args) => args,
    };
    let wanted = if name == "min" {
        Ordering::Less
    } else {
        Ordering::Greater
    };

    let mut best: Option<EvalValue> = None;
    for candidate in candidates {
        if candidate.as_number().is_none() {
            return Err(bad_argument(name, &candidate));
        }
        best = match best {
            Some(current) if compare(&candidate, &current) != Some(wanted) => Some(current),
            _ => Some(candidate),
        };
    }
    best.ok_or_else(|| arity(name, "at least 1", 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn parse(source: &str) -> Expr {
        Parser::new(source).unwrap().parse_expr().unwrap()
    }

    fn env(pairs: &[(&str, EvalValue)]) -> HashMap<String, EvalValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn eval_in(source: &str, env: &HashMap<String, EvalValue>) -> Result<EvalValue, EvalErrorKind> {
        Evaluator::new(env).eval(&parse(source)).map_err(|f| f.kind)
    }

    fn eval(source: &str) -> Result<EvalValue, EvalErrorKind> {
        eval_in(source, &HashMap::new())
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3"), Ok(EvalValue::Int(7)));
        assert_eq!(eval("7 % 4"), Ok(EvalValue::Int(3)));
        assert_eq!(eval("7 / 2"), Ok(EvalValue::Float(3.5)));
        assert_eq!(eval("1 + 0.5"), Ok(EvalValue::Float(1.5)));
        assert_eq!(eval("\"ab\" + \"cd\""), Ok(EvalValue::Str("abcd".into())));
        assert_eq!(eval("-(2 - 5)"), Ok(EvalValue::Int(3)));
    }

    #[test]
    fn test_arithmetic_errors() {
        assert_eq!(eval("1 / 0"), Err(EvalErrorKind::DivisionByZero));
        assert_eq!(eval("1 % 0"), Err(EvalErrorKind::DivisionByZero));
        assert_eq!(eval("9223372036854775807 + 1"), Err(EvalErrorKind::Overflow));
        assert!(matches!(
            eval("1 + true"),
            Err(EvalErrorKind::BinaryType { op: "+", .. })
        ));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("1 < 2.5"), Ok(EvalValue::Bool(true)));
        assert_eq!(eval("2 == 2.0"), Ok(EvalValue::Bool(true)));
        assert_eq!(eval("\"a\" < \"b\""), Ok(EvalValue::Bool(true)));
        assert_eq!(eval("\"a\" == 1"), Ok(EvalValue::Bool(false)));
        assert!(eval("\"a\" < 1").is_err());
    }

    #[test]
    fn test_missing_propagates_through_operators() {
        assert_eq!(eval("absent + 1"), Ok(EvalValue::Missing));
        assert_eq!(eval("len(absent) > 3"), Ok(EvalValue::Missing));
        assert_eq!(eval("not absent"), Ok(EvalValue::Missing));
        assert_eq!(eval("[1, absent]"), Ok(EvalValue::Missing));
    }

    #[test]
    fn test_missing_is_excised_by_and_or() {
        let e = env(&[("x", EvalValue::Int(5))]);
        assert_eq!(eval_in("x > 3 and absent > 1", &e), Ok(EvalValue::Bool(true)));
        assert_eq!(eval_in("x > 9 and absent > 1", &e), Ok(EvalValue::Bool(false)));
        assert_eq!(eval_in("absent > 1 or x > 9", &e), Ok(EvalValue::Bool(false)));
        assert_eq!(eval_in("absent or other", &e), Ok(EvalValue::Missing));
    }

    #[test]
    fn test_missing_condition_passes() {
        let e = HashMap::new();
        let evaluator = Evaluator::new(&e);
        assert_eq!(evaluator.check(&parse("age >= 18")), Ok(true));
        assert_eq!(evaluator.check(&parse("1 > 2")), Ok(false));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let e = env(&[("nickname", EvalValue::Null)]);
        assert_eq!(
            eval_in("len(nickname) > 2", &e),
            Ok(EvalValue::Missing)
        );
    }

    #[test]
    fn test_non_boolean_condition_is_an_error() {
        let e = HashMap::new();
        let fault = Evaluator::new(&e).check(&parse("1 + 1")).unwrap_err();
        assert!(matches!(fault.kind, EvalErrorKind::NotBoolean(_)));
    }

    #[test]
    fn test_field_access() {
        let owner = EvalValue::Record {
            ctor: Some("person".into()),
            fields: vec![(Some("name".into()), EvalValue::Str("Ada".into()))],
        };
        let e = env(&[("owner", owner)]);
        assert_eq!(eval_in("owner.name", &e), Ok(EvalValue::Str("Ada".into())));
        assert_eq!(eval_in("owner.age", &e), Ok(EvalValue::Missing));
        assert!(matches!(
            eval("1.5.x"),
            Err(EvalErrorKind::NotARecord { found: "float" })
        ));
    }

    #[test]
    fn test_references_need_a_binding_environment() {
        let e = env(&[(
            "spouse",
            EvalValue::Ref(Reference {
                binding: 0,
                name: "bob".into(),
                path: vec![],
            }),
        )]);
        assert_eq!(
            eval_in("spouse.name", &e),
            Err(EvalErrorKind::Unavailable("bob".into()))
        );
    }

    #[test]
    fn test_builtins() {
        assert_eq!(eval("int(\"42\")"), Ok(EvalValue::Int(42)));
        assert_eq!(eval("int(3.9)"), Ok(EvalValue::Int(3)));
        assert_eq!(eval("float(\"29.99\")"), Ok(EvalValue::Float(29.99)));
        assert_eq!(eval("str(12)"), Ok(EvalValue::Str("12".into())));
        assert_eq!(eval("bool(\"true\")"), Ok(EvalValue::Bool(true)));
        assert_eq!(eval("len(\"héllo\")"), Ok(EvalValue::Int(5)));
        assert_eq!(eval("len([1, 2, 3])"), Ok(EvalValue::Int(3)));
        assert_eq!(
            eval("remove_whitespace(\" a b \")"),
            Ok(EvalValue::Str("ab".into()))
        );
        assert_eq!(eval("upper(\"ab\")"), Ok(EvalValue::Str("AB".into())));
        assert_eq!(eval("trim(\" x \")"), Ok(EvalValue::Str("x".into())));
        assert_eq!(eval("contains(\"abc\", \"b\")"), Ok(EvalValue::Bool(true)));
        assert_eq!(eval("contains([1, 2], 2.0)"), Ok(EvalValue::Bool(true)));
        assert_eq!(eval("starts_with(\"abc\", \"ab\")"), Ok(EvalValue::Bool(true)));
        assert_eq!(eval("ends_with(\"abc\", \"ab\")"), Ok(EvalValue::Bool(false)));
        assert_eq!(eval("abs(-3)"), Ok(EvalValue::Int(3)));
        assert_eq!(eval("min(3, 1.5, 2)"), Ok(EvalValue::Float(1.5)));
        assert_eq!(eval("max([3, 9, 2])"), Ok(EvalValue::Int(9)));
    }

    #[test]
    fn test_builtin_errors() {
        assert!(matches!(
            eval("float(\"abc\")"),
            Err(EvalErrorKind::Conversion { target: "float", .. })
        ));
        assert!(matches!(eval("len(1)"), Err(EvalErrorKind::BadArgument { .. })));
        assert!(matches!(eval("len(1, 2)"), Err(EvalErrorKind::Arity { .. })));
        assert_eq!(
            eval("shout(\"x\")"),
            Err(EvalErrorKind::UnknownFunction("shout".into()))
        );
        assert!(matches!(
            eval("len(x: \"a\")"),
            Err(EvalErrorKind::NamedArgument(_))
        ));
    }
}

use crate::value::{self, Record, Reference};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Boolean(bool),
    Null,
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

pub(crate) fn to_value(value: &value::Value) -> Value {
    match value {
        value::Value::Str(s) => Value::String(s.clone()),
        value::Value::Int(n) => Value::Int(*n),
        value::Value::Float(n) => Value::Float(*n),
        value::Value::Bool(b) => Value::Boolean(*b),
        value::Value::Null => Value::Null,
        value::Value::List(items) => Value::Array(items.iter().map(to_value).collect()),
        value::Value::Record(record) => record_to_value(record),
        // Handles stay handles so cyclic graphs serialize finitely.
        value::Value::Ref(reference) => reference_to_value(reference),
    }
}

fn record_to_value(record: &Record) -> Value {
    let mut map = BTreeMap::new();
    if let Some(ctor) = &record.ctor {
        map.insert("$ctor".to_string(), Value::String(ctor.clone()));
    }
    for (i, (name, field)) in record.fields.iter().enumerate() {
        let key = name.clone().unwrap_or_else(|| format!("_{i}"));
        map.insert(key, to_value(field));
    }
    Value::Object(map)
}

fn reference_to_value(reference: &Reference) -> Value {
    let mut map = BTreeMap::new();
    map.insert("$ref".to_string(), Value::String(reference.name.clone()));
    if !reference.path.is_empty() {
        let path = reference.path.iter().cloned().map(Value::String).collect();
        map.insert("$path".to_string(), Value::Array(path));
    }
    Value::Object(map)
}

use crate::ast::Document;
use crate::desugar::desugar;
use crate::error::LoadError;
use crate::matcher::PatternSet;
use crate::parser::Parser;
use crate::registry::TypeRegistry;
use crate::resolver::Resolver;
use crate::serialization::{self, to_value};
use crate::value::{walk, BindingId, Value};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};

/// A fully loaded TDL document: its declarations and every resolved value.
///
/// References inside values stay handles. Use [`Loaded::deref`] to follow
/// one, or serialize the whole result with [`Loaded::to_json`].
#[derive(Debug, Clone)]
pub struct Loaded {
    /// The document after desugaring.
    pub document: Document,
    pub registry: TypeRegistry,
    pub patterns: PatternSet,
    /// Named bindings in declaration order. A binding's position is its
    /// [`BindingId`].
    pub bindings: Vec<(String, Value)>,
    /// Top-level values without a name, in document order.
    pub anonymous: Vec<Value>,
    index: HashMap<String, BindingId>,
}

impl Serialize for Loaded {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let value = self.to_value();
        value.serialize(serializer)
    }
}

impl Loaded {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.index.get(name).map(|&id| &self.bindings[id].1)
    }

    /// Follows a reference handle, and its field path, to the value it
    /// denotes. Other values are returned unchanged.
    #[must_use]
    pub fn deref<'v>(&'v self, value: &'v Value) -> Option<&'v Value> {
        let root = |id: BindingId| self.bindings.get(id).map(|(_, value)| value);
        walk(value, &[], &root).ok()
    }

    /// Converts the resolved data into a generic, serializable `Value`:
    /// `{"bindings": {name: value, ...}, "values": [...]}`.
    #[must_use]
    pub fn to_value(&self) -> serialization::Value {
        let bindings = self
            .bindings
            .iter()
            .map(|(name, value)| (name.clone(), to_value(value)))
            .collect();
        let values = self.anonymous.iter().map(to_value).collect();

        let mut root = BTreeMap::new();
        root.insert("bindings".to_string(), serialization::Value::Object(bindings));
        root.insert("values".to_string(), serialization::Value::Array(values));
        serialization::Value::Object(root)
    }

    /// Serializes the resolved data into a pretty-printed JSON string.
    ///
    /// # Errors
    /// Returns a `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self)
    }

    /// Serializes the resolved data into a YAML string.
    ///
    /// # Errors
    /// Returns a `serde_yaml::Error` if serialization fails.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self)
    }
}

/// Loads a TDL document: parses, desugars, type-checks and resolves it.
///
/// # Errors
///
/// Returns the first [`LoadError`] any stage reports.
pub fn load(source: &str) -> Result<Loaded, LoadError> {
    load_named(source, "source.tdl")
}

/// Like [`load`], with `name` shown in diagnostics.
///
/// # Errors
///
/// Returns the first [`LoadError`] any stage reports.
pub fn load_named(source: &str, name: &str) -> Result<Loaded, LoadError> {
    let mut parser = Parser::new_with_name(source, name)?;
    let document = desugar(parser.parse_document()?);
    let src = parser.source();

    let registry = TypeRegistry::build(&document, &src)?;
    let patterns = PatternSet::compile(&document, &registry, &src)?;
    let resolution = Resolver::new(&registry, &patterns, src).resolve(&document)?;

    let index = resolution
        .bindings
        .iter()
        .enumerate()
        .map(|(id, (name, _))| (name.clone(), id))
        .collect();
    log::debug!(
        "loaded `{name}`: {} binding(s), {} anonymous value(s)",
        resolution.bindings.len(),
        resolution.anonymous.len()
    );
    Ok(Loaded {
        document,
        registry,
        patterns,
        bindings: resolution.bindings,
        anonymous: resolution.anonymous,
        index,
    })
}

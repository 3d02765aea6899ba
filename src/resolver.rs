//! Turns canonical data expressions into typed values.
//!
//! Every top-level binding moves through [`BindingState`]. A reference to a
//! binding that is still being built yields a handle right away, so bindings
//! may point at each other in cycles. Constraints that read through such a
//! handle wait until every binding is resolved. Anything that needs the
//! *contents* of an unfinished binding to build a value is a
//! [`ReferenceError::SelfDependency`].

use crate::ast::{DataArg, DataExpr, DataKind, Document, Entry, Expr, ExprKind, Item};
use crate::error::{ConstraintViolation, EvalError, LoadError, ReferenceError, TypeError, TypeErrorKind};
use crate::eval::{Environment, EvalErrorKind, EvalFault, EvalValue, Evaluator};
use crate::matcher::{PatternMatch, PatternSet};
use crate::registry::{Prim, Ty, TypeRegistry};
use crate::value::{walk, BindingId, PathError, Record, Reference, Value};
use miette::{NamedSource, SourceSpan};
use std::collections::HashMap;
use std::sync::Arc;

/// How many bindings may be forced from inside one another before giving up.
/// Forcing recurses, so longer chains would exhaust the stack.
pub const MAX_REFERENCE_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum BindingState {
    Unresolved,
    InProgress,
    Resolved(Value),
    Failed,
}

#[derive(Debug)]
struct BindingSlot<'a> {
    name: &'a str,
    expr: &'a DataExpr,
    /// Declared type, `any` when the binding has no annotation.
    ty: Ty,
    state: BindingState,
}

/// A type check on a binding that was still in progress when referenced.
#[derive(Debug)]
struct DeferredCheck {
    binding: BindingId,
    expected: Ty,
    span: SourceSpan,
}

/// Constraints of a record that read through a binding still in progress.
/// They are checked, starting at `from`, once every binding is resolved.
#[derive(Debug)]
struct DeferredConstraints {
    ctor: String,
    fields: Vec<(Option<String>, Value)>,
    from: usize,
    span: SourceSpan,
}

/// The resolved document.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Every binding in declaration order.
    pub bindings: Vec<(String, Value)>,
    /// Top-level values without a name, in document order.
    pub anonymous: Vec<Value>,
}

/// Resolves documents against a registry and a set of compiled patterns.
/// Both are only read, so one pair can serve many documents.
pub struct Resolver<'r> {
    registry: &'r TypeRegistry,
    patterns: &'r PatternSet,
    source: Arc<NamedSource<String>>,
}

impl<'r> Resolver<'r> {
    pub fn new(
        registry: &'r TypeRegistry,
        patterns: &'r PatternSet,
        source: Arc<NamedSource<String>>,
    ) -> Self {
        Self {
            registry,
            patterns,
            source,
        }
    }

    pub fn resolve<'a>(&self, document: &'a Document) -> Result<Resolution, LoadError> {
        let mut run = Run {
            registry: self.registry,
            patterns: self.patterns,
            src: &self.source,
            slots: Vec::new(),
            index: HashMap::new(),
            deferred: Vec::new(),
            deferred_constraints: Vec::new(),
            forcing: 0,
        };

        for item in &document.items {
            if let Item::Binding(binding) = item {
                if run.index.contains_key(binding.name.as_str()) {
                    return Err(ReferenceError::DuplicateBinding {
                        name: binding.name.clone(),
                        src: run.src(),
                        span: binding.span(),
                    }
                    .into());
                }
                let ty = match &binding.ty {
                    Some(ty) => self.registry.resolve_type(ty, &[], &self.source)?,
                    None => Ty::ANY,
                };
                run.index.insert(binding.name.as_str(), run.slots.len());
                run.slots.push(BindingSlot {
                    name: &binding.name,
                    expr: &binding.value,
                    ty,
                    state: BindingState::Unresolved,
                });
            }
        }
        log::debug!("resolving {} binding(s)", run.slots.len());

        let mut anonymous = Vec::new();
        let mut next_binding = 0;
        for item in &document.items {
            match item {
                Item::Binding(_) => {
                    run.force(next_binding)?;
                    next_binding += 1;
                }
                Item::Value(value) => anonymous.push(run.resolve_data(value, &Ty::ANY)?),
                Item::Type(_) | Item::Pattern(_) => {}
            }
        }
        run.run_deferred_checks()?;

        let bindings = run
            .slots
            .into_iter()
            .filter_map(|slot| match slot.state {
                BindingState::Resolved(value) => Some((slot.name.to_string(), value)),
                _ => None,
            })
            .collect();
        Ok(Resolution {
            bindings,
            anonymous,
        })
    }
}

/// Where an argument's value comes from.
#[derive(Clone, Copy)]
enum ArgValue<'x> {
    Data(&'x DataExpr),
    /// The items of a `ctor:` list block.
    List(&'x [DataExpr], SourceSpan),
    /// An expression of a pattern target, evaluated over the captures.
    Target(&'x Expr, &'x HashMap<String, EvalValue>),
}

struct CallArg<'x> {
    name: Option<&'x str>,
    value: ArgValue<'x>,
}

impl<'x> CallArg<'x> {
    fn data(arg: &'x DataArg) -> Self {
        CallArg {
            name: arg.name.as_deref(),
            value: ArgValue::Data(&arg.value),
        }
    }

    fn entry(entry: &'x Entry) -> Self {
        CallArg {
            name: Some(&entry.key),
            value: ArgValue::Data(&entry.value),
        }
    }
}

/// The state of one resolution.
struct Run<'r, 'a> {
    registry: &'r TypeRegistry,
    patterns: &'r PatternSet,
    src: &'r NamedSource<String>,
    slots: Vec<BindingSlot<'a>>,
    index: HashMap<&'a str, BindingId>,
    deferred: Vec<DeferredCheck>,
    deferred_constraints: Vec<DeferredConstraints>,
    /// Bindings currently being forced from inside one another.
    forcing: usize,
}

impl<'a> Run<'_, 'a> {
    fn src(&self) -> NamedSource<String> {
        self.src.clone()
    }

    fn type_error(&self, kind: TypeErrorKind, span: SourceSpan) -> LoadError {
        TypeError::new(kind, self.src(), span).into()
    }

    fn mismatch(&self, expected: &Ty, found: impl Into<String>, span: SourceSpan) -> LoadError {
        self.type_error(
            TypeErrorKind::Mismatch {
                expected: expected.to_string(),
                found: found.into(),
            },
            span,
        )
    }

    fn self_dependency(&self, name: &str, span: SourceSpan) -> LoadError {
        ReferenceError::SelfDependency {
            name: name.to_string(),
            src: self.src(),
            span,
        }
        .into()
    }

    fn resolved(&self, id: BindingId) -> Option<&Value> {
        match &self.slots.get(id)?.state {
            BindingState::Resolved(value) => Some(value),
            _ => None,
        }
    }

    fn force(&mut self, id: BindingId) -> Result<(), LoadError> {
        if self.slots[id].state != BindingState::Unresolved {
            return Ok(());
        }
        let BindingSlot { name, expr, .. } = self.slots[id];
        if self.forcing >= MAX_REFERENCE_DEPTH {
            return Err(ReferenceError::TooDeep {
                name: name.to_string(),
                limit: MAX_REFERENCE_DEPTH,
                src: self.src(),
                span: expr.span(),
            }
            .into());
        }
        let ty = self.slots[id].ty.clone();
        log::trace!("binding `{name}`: unresolved -> in progress");
        self.slots[id].state = BindingState::InProgress;
        self.forcing += 1;

        // A binding that is nothing but a reference is an alias, and an alias
        // of something still in progress would never settle.
        let result = match &expr.kind {
            DataKind::Reference { name: target, path } => {
                self.resolve_reference(target, path, expr.span(), &ty, true)
            }
            _ => self.resolve_data(expr, &ty),
        };
        self.forcing -= 1;
        match result {
            Ok(value) => {
                log::trace!("binding `{name}`: in progress -> resolved");
                self.slots[id].state = BindingState::Resolved(value);
                Ok(())
            }
            Err(err) => {
                log::trace!("binding `{name}`: in progress -> failed");
                self.slots[id].state = BindingState::Failed;
                Err(err)
            }
        }
    }

    fn resolve_data(&mut self, expr: &DataExpr, expected: &Ty) -> Result<Value, LoadError> {
        if let Ty::Optional(inner) = expected {
            return match expr.kind {
                DataKind::Null => Ok(Value::Null),
                _ => self.resolve_data(expr, inner),
            };
        }
        let span = expr.span();
        match &expr.kind {
            DataKind::Null if expected.is_open() => Ok(Value::Null),
            DataKind::Null => Err(self.mismatch(expected, "null", span)),
            DataKind::Bool(b) => self.coerce(Value::Bool(*b), expected, span),
            DataKind::Int(n) => self.coerce(Value::Int(*n), expected, span),
            DataKind::Float(n) => self.coerce(Value::Float(*n), expected, span),
            DataKind::Str(s) => self.resolve_string(s, expected, span),
            DataKind::List(items) | DataKind::DashList(items) => {
                self.resolve_list(items, expected, span)
            }
            DataKind::Call { ctor, args } => {
                let args = args.iter().map(CallArg::data).collect();
                self.instantiate(ctor, args, expected, span)
            }
            DataKind::CtorBlock { ctor, entries } => {
                let args = entries.iter().map(CallArg::entry).collect();
                self.instantiate(ctor, args, expected, span)
            }
            DataKind::ListBlock { ctor, items } => {
                let args = vec![CallArg {
                    name: None,
                    value: ArgValue::List(items, span),
                }];
                self.instantiate(ctor, args, expected, span)
            }
            DataKind::Anonymous(entries)
            | DataKind::FieldBlock(entries)
            | DataKind::DashRecord(entries) => self.resolve_anonymous(entries, expected, span),
            DataKind::Reference { name, path } => {
                self.resolve_reference(name, path, span, expected, false)
            }
        }
    }

    fn resolve_list(
        &mut self,
        items: &[DataExpr],
        expected: &Ty,
        span: SourceSpan,
    ) -> Result<Value, LoadError> {
        let item_ty = match expected {
            Ty::Optional(inner) => return self.resolve_list(items, inner, span),
            Ty::List(inner) => inner.as_ref(),
            open if open.is_open() => &Ty::ANY,
            _ => return Err(self.mismatch(expected, "a list", span)),
        };
        items
            .iter()
            .map(|item| self.resolve_data(item, item_ty))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List)
    }

    fn resolve_arg(&mut self, value: ArgValue<'_>, expected: &Ty, site: SourceSpan) -> Result<Value, LoadError> {
        match value {
            ArgValue::Data(expr) => self.resolve_data(expr, expected),
            ArgValue::List(items, span) => self.resolve_list(items, expected, span),
            ArgValue::Target(expr, env) => self.resolve_target(expr, env, expected, site),
        }
    }

    /// A string literal: kept as is, or destructured by a pattern rule when
    /// the expected type calls for a structured value.
    fn resolve_string(&mut self, input: &str, expected: &Ty, span: SourceSpan) -> Result<Value, LoadError> {
        let patterns = self.patterns;
        match expected {
            Ty::Prim(Prim::Str) => Ok(Value::Str(input.to_string())),
            Ty::Optional(inner) => self.resolve_string(input, inner, span),
            open if open.is_open() => match patterns.match_str(input) {
                Some(found) => {
                    let target_ty = Ty::Named {
                        name: found.rule.type_name.clone(),
                        args: Vec::new(),
                    };
                    self.instantiate_match(found, &target_ty, span)
                }
                None => Ok(Value::Str(input.to_string())),
            },
            Ty::Named { name, .. } => match patterns.match_typed(input, name) {
                Some(found) => self.instantiate_match(found, expected, span),
                None => Err(self.type_error(
                    TypeErrorKind::PatternMatchFailed {
                        input: input.to_string(),
                        expected: expected.to_string(),
                    },
                    span,
                )),
            },
            _ => Err(self.mismatch(expected, "a string", span)),
        }
    }

    fn instantiate_match(
        &mut self,
        found: PatternMatch<'_>,
        expected: &Ty,
        site: SourceSpan,
    ) -> Result<Value, LoadError> {
        let env = found.env();
        self.resolve_target(&found.rule.target, &env, expected, site)
    }

    /// Builds a value from a pattern target. Constructor calls nest, anything
    /// else is evaluated over the captures and converted to the field's type.
    fn resolve_target(
        &mut self,
        expr: &Expr,
        env: &HashMap<String, EvalValue>,
        expected: &Ty,
        site: SourceSpan,
    ) -> Result<Value, LoadError> {
        let registry = self.registry;
        let ctor_call = match &expr.kind {
            ExprKind::Call { name, args } if registry.lookup_constructor(name).is_some() => {
                Some((name, args.as_slice()))
            }
            ExprKind::Ident(name)
                if !env.contains_key(name) && registry.lookup_constructor(name).is_some() =>
            {
                Some((name, [].as_slice()))
            }
            _ => None,
        };
        if let Some((ctor, args)) = ctor_call {
            let expected = match expected {
                Ty::Optional(inner) => inner.as_ref(),
                other => other,
            };
            let args = args
                .iter()
                .map(|arg| CallArg {
                    name: arg.name.as_deref(),
                    value: ArgValue::Target(&arg.value, env),
                })
                .collect();
            return self.instantiate(ctor, args, expected, site);
        }

        let value = Evaluator::new(env)
            .eval(expr)
            .map_err(|fault| self.eval_error(fault))?
            .into_value()
            .unwrap_or(Value::Null);
        self.coerce(value, expected, site)
    }

    /// Fits an already computed value to `expected`. Strings headed for a
    /// structured type go through the pattern rules.
    fn coerce(&mut self, value: Value, expected: &Ty, span: SourceSpan) -> Result<Value, LoadError> {
        match (expected, value) {
            (Ty::Optional(_), Value::Null) => Ok(Value::Null),
            (Ty::Optional(inner), value) => self.coerce(value, inner, span),
            (open, value) if open.is_open() => Ok(value),
            (Ty::Prim(Prim::Int), Value::Int(n)) => Ok(Value::Int(n)),
            (Ty::Prim(Prim::Float), Value::Int(n)) => Ok(Value::Float(n as f64)),
            (Ty::Prim(Prim::Float), Value::Float(n)) => Ok(Value::Float(n)),
            (Ty::Prim(Prim::Bool), Value::Bool(b)) => Ok(Value::Bool(b)),
            (Ty::Prim(Prim::Str), Value::Str(s)) => Ok(Value::Str(s)),
            (Ty::Named { .. }, Value::Str(s)) => self.resolve_string(&s, expected, span),
            (Ty::Named { name, .. }, Value::Record(record))
                if record.type_name.as_deref() == Some(name.as_str()) =>
            {
                Ok(Value::Record(record))
            }
            (Ty::List(inner), Value::List(items)) => items
                .into_iter()
                .map(|item| self.coerce(item, inner, span))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            (_, value) => Err(self.mismatch(expected, value.describe(), span)),
        }
    }

    fn resolve_anonymous(
        &mut self,
        entries: &[Entry],
        expected: &Ty,
        span: SourceSpan,
    ) -> Result<Value, LoadError> {
        let type_name = match expected {
            Ty::Optional(inner) => return self.resolve_anonymous(entries, inner, span),
            Ty::Named { name, .. } => name,
            open if open.is_open() => return self.untyped_record(entries),
            _ => return Err(self.mismatch(expected, "a record", span)),
        };

        let registry = self.registry;
        if let Some(ctor) = registry.sole_constructor(type_name) {
            let args = entries.iter().map(CallArg::entry).collect();
            return self.instantiate(&ctor.name, args, expected, span);
        }

        // `{ctor: {...}}` names the constructor of a sum type explicitly.
        if let [tagged] = entries {
            let belongs = registry
                .lookup_constructor(&tagged.key)
                .is_some_and(|c| &c.type_name == type_name);
            if belongs {
                if let DataKind::Anonymous(inner)
                | DataKind::FieldBlock(inner)
                | DataKind::DashRecord(inner) = &tagged.value.kind
                {
                    let args = inner.iter().map(CallArg::entry).collect();
                    return self.instantiate(&tagged.key, args, expected, span);
                }
            }
        }

        Err(TypeError::new(
            TypeErrorKind::AmbiguousAnonymousConstructor(type_name.clone()),
            self.src(),
            span,
        )
        .with_help(format!(
            "Name the constructor, e.g. `{}(...)`.",
            registry
                .constructors_of(type_name)
                .first()
                .map_or("ctor", |c| c.name.as_str())
        ))
        .into())
    }

    fn untyped_record(&mut self, entries: &[Entry]) -> Result<Value, LoadError> {
        let mut fields: Vec<(Option<String>, Value)> = Vec::with_capacity(entries.len());
        for entry in entries {
            if fields.iter().any(|(key, _)| key.as_deref() == Some(entry.key.as_str())) {
                return Err(self.type_error(
                    TypeErrorKind::DuplicateField {
                        ctor: "{...}".to_string(),
                        field: entry.key.clone(),
                    },
                    entry.span(),
                ));
            }
            let value = self.resolve_data(&entry.value, &Ty::ANY)?;
            fields.push((Some(entry.key.clone()), value));
        }
        Ok(Value::Record(Record {
            type_name: None,
            ctor: None,
            fields,
        }))
    }

    fn instantiate(
        &mut self,
        ctor_name: &str,
        args: Vec<CallArg<'_>>,
        expected: &Ty,
        span: SourceSpan,
    ) -> Result<Value, LoadError> {
        let registry = self.registry;
        let Some(ctor) = registry.lookup_constructor(ctor_name) else {
            return Err(self.type_error(TypeErrorKind::UnknownConstructor(ctor_name.to_string()), span));
        };
        let type_args = match expected {
            Ty::Named { name, args } if *name == ctor.type_name => args.as_slice(),
            Ty::Named { name, .. } => {
                return Err(self.type_error(
                    TypeErrorKind::ConstructorMismatch {
                        ctor: ctor.name.clone(),
                        expected: name.clone(),
                    },
                    span,
                ))
            }
            open if open.is_open() => &[],
            _ => return Err(self.mismatch(expected, format!("constructor `{ctor_name}`"), span)),
        };
        let field_tys = registry.field_types(ctor, type_args);

        let given = args.len();
        let mut bound: Vec<Option<ArgValue<'_>>> = vec![None; ctor.fields.len()];
        let mut next_positional = 0;
        for arg in args {
            let index = match arg.name {
                None => {
                    if next_positional >= bound.len() {
                        return Err(self.type_error(
                            TypeErrorKind::TooManyArguments {
                                ctor: ctor.name.clone(),
                                expected: bound.len(),
                                found: given,
                            },
                            span,
                        ));
                    }
                    next_positional += 1;
                    next_positional - 1
                }
                Some(name) => ctor.field_index(name).ok_or_else(|| {
                    self.type_error(
                        TypeErrorKind::UnknownField {
                            ctor: ctor.name.clone(),
                            field: name.to_string(),
                        },
                        span,
                    )
                })?,
            };
            if bound[index].is_some() {
                return Err(self.type_error(
                    TypeErrorKind::DuplicateField {
                        ctor: ctor.name.clone(),
                        field: ctor.field_label(index),
                    },
                    span,
                ));
            }
            bound[index] = Some(arg.value);
        }

        let mut fields = Vec::with_capacity(bound.len());
        for (index, (arg, ty)) in bound.into_iter().zip(&field_tys).enumerate() {
            let value = match arg {
                Some(arg) => self.resolve_arg(arg, ty, span)?,
                None if matches!(ty, Ty::Optional(_)) => Value::Null,
                None => {
                    return Err(self.type_error(
                        TypeErrorKind::MissingField {
                            ctor: ctor.name.clone(),
                            field: ctor.field_label(index),
                        },
                        span,
                    ))
                }
            };
            fields.push((ctor.fields[index].name.clone(), value));
        }

        if let Some((from, _)) = self.check_constraints(ctor_name, &fields, 0, span)? {
            log::trace!("constraints of `{ctor_name}` wait for unfinished bindings");
            self.deferred_constraints.push(DeferredConstraints {
                ctor: ctor_name.to_string(),
                fields: fields.clone(),
                from,
                span,
            });
        }
        log::trace!("instantiated `{ctor_name}` with {} field(s)", fields.len());
        Ok(Value::Record(Record {
            type_name: Some(ctor.type_name.clone()),
            ctor: Some(ctor.name.clone()),
            fields,
        }))
    }

    /// Checks the constraints of `ctor_name` in order, skipping the first
    /// `from`. Returns the index of the first constraint that needs a binding
    /// which is not resolved yet, with that binding's name. Later constraints
    /// are left unchecked.
    fn check_constraints(
        &self,
        ctor_name: &str,
        fields: &[(Option<String>, Value)],
        from: usize,
        span: SourceSpan,
    ) -> Result<Option<(usize, String)>, LoadError> {
        let env = FieldEnv { fields, run: self };
        let evaluator = Evaluator::new(&env);
        let constraints = self.registry.constraints_for(ctor_name);
        for (index, constraint) in constraints.into_iter().enumerate().skip(from) {
            let satisfied = match evaluator.check(&constraint.condition) {
                Ok(satisfied) => satisfied,
                Err(EvalFault {
                    kind: EvalErrorKind::Unavailable(name),
                    ..
                }) => return Ok(Some((index, name))),
                Err(fault) => return Err(self.eval_error(fault)),
            };
            if !satisfied {
                let rendered = fields
                    .iter()
                    .enumerate()
                    .map(|(i, (name, value))| {
                        (name.clone().unwrap_or_else(|| format!("_{i}")), value.to_string())
                    })
                    .collect();
                return Err(ConstraintViolation::new(
                    ctor_name.to_string(),
                    constraint.text.clone(),
                    rendered,
                    self.src(),
                    span,
                    constraint.span(),
                )
                .into());
            }
        }
        Ok(None)
    }

    fn eval_error(&self, fault: EvalFault) -> LoadError {
        EvalError {
            span: fault.span(),
            kind: fault.kind,
            src: self.src(),
        }
        .into()
    }

    fn resolve_reference(
        &mut self,
        name: &str,
        path: &[String],
        span: SourceSpan,
        expected: &Ty,
        alias: bool,
    ) -> Result<Value, LoadError> {
        let Some(&id) = self.index.get(name) else {
            return Err(ReferenceError::Undefined {
                name: name.to_string(),
                src: self.src(),
                span,
            }
            .into());
        };
        self.force(id)?;

        let expected = match expected {
            Ty::Optional(inner) => inner.as_ref(),
            other => other,
        };
        let handle = Value::Ref(Reference {
            binding: id,
            name: name.to_string(),
            path: path.to_vec(),
        });

        if self.slots[id].state == BindingState::InProgress {
            let scalar = matches!(expected, Ty::Prim(p) if *p != Prim::Any);
            if alias || scalar || !path.is_empty() {
                return Err(self.self_dependency(name, span));
            }
            if !expected.is_open() {
                self.deferred.push(DeferredCheck {
                    binding: id,
                    expected: expected.clone(),
                    span,
                });
            }
            return Ok(handle);
        }

        let Some(value) = self.resolved(id) else {
            return Err(self.self_dependency(name, span));
        };
        let root = |binding: BindingId| self.resolved(binding);
        let target = walk(value, path, &root).map_err(|err| match err {
            PathError::UnknownField(field) => ReferenceError::UnknownField {
                name: name.to_string(),
                field,
                src: self.src(),
                span,
            }
            .into(),
            PathError::Unavailable(other) => self.self_dependency(&other, span),
        })?;
        if !conforms(target, expected) {
            return Err(self.mismatch(expected, target.describe(), span));
        }
        Ok(handle)
    }

    fn run_deferred_checks(&self) -> Result<(), LoadError> {
        log::debug!("running {} deferred reference check(s)", self.deferred.len());
        let root = |binding: BindingId| self.resolved(binding);
        for check in &self.deferred {
            let name = self.slots[check.binding].name;
            let target = self
                .resolved(check.binding)
                .and_then(|value| walk(value, &[], &root).ok())
                .ok_or_else(|| self.self_dependency(name, check.span))?;
            if !conforms(target, &check.expected) {
                return Err(self.mismatch(&check.expected, target.describe(), check.span));
            }
        }

        log::debug!(
            "running {} deferred constraint check(s)",
            self.deferred_constraints.len()
        );
        for pending in &self.deferred_constraints {
            let stuck =
                self.check_constraints(&pending.ctor, &pending.fields, pending.from, pending.span)?;
            if let Some((_, name)) = stuck {
                return Err(self.self_dependency(&name, pending.span));
            }
        }
        Ok(())
    }
}

/// Shallow type test for values reached through a reference. References
/// nested inside lists are taken on trust.
fn conforms(value: &Value, ty: &Ty) -> bool {
    match (ty, value) {
        (open, _) if open.is_open() => true,
        (Ty::Optional(_), Value::Null) => true,
        (Ty::Optional(inner), value) => conforms(value, inner),
        (_, Value::Ref(_)) => true,
        (Ty::Prim(Prim::Int), Value::Int(_)) => true,
        (Ty::Prim(Prim::Float), Value::Int(_) | Value::Float(_)) => true,
        (Ty::Prim(Prim::Str), Value::Str(_)) => true,
        (Ty::Prim(Prim::Bool), Value::Bool(_)) => true,
        (Ty::List(inner), Value::List(items)) => items.iter().all(|item| conforms(item, inner)),
        (Ty::Named { name, .. }, Value::Record(record)) => {
            record.type_name.as_deref() == Some(name.as_str())
        }
        _ => false,
    }
}

/// The fields of a value under construction, as seen by its constraints.
struct FieldEnv<'f, 'r, 'a> {
    fields: &'f [(Option<String>, Value)],
    run: &'f Run<'r, 'a>,
}

impl Environment for FieldEnv<'_, '_, '_> {
    fn lookup(&self, name: &str) -> Option<EvalValue> {
        self.fields
            .iter()
            .enumerate()
            .find(|(i, (field, _))| match field {
                Some(field) => field == name,
                None => name.strip_prefix('_').and_then(|n| n.parse().ok()) == Some(*i),
            })
            .map(|(_, (_, value))| EvalValue::from(value))
    }

    fn deref(&self, reference: &Reference) -> Result<EvalValue, EvalErrorKind> {
        let unavailable = || EvalErrorKind::Unavailable(reference.name.clone());
        let value = self.run.resolved(reference.binding).ok_or_else(unavailable)?;
        let root = |binding: BindingId| self.run.resolved(binding);
        match walk(value, &reference.path, &root) {
            Ok(found) => Ok(EvalValue::from(found)),
            Err(PathError::UnknownField(_)) => Ok(EvalValue::Missing),
            Err(PathError::Unavailable(name)) => Err(EvalErrorKind::Unavailable(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desugar::desugar;
    use crate::parser::Parser;

    fn resolve(source: &str) -> Result<Resolution, LoadError> {
        let mut parser = Parser::new(source).unwrap();
        let document = desugar(parser.parse_document().unwrap());
        let src = parser.source();
        let registry = TypeRegistry::build(&document, &src)?;
        let patterns = PatternSet::compile(&document, &registry, &src)?;
        Resolver::new(&registry, &patterns, src).resolve(&document)
    }

    fn binding<'r>(resolution: &'r Resolution, name: &str) -> &'r Value {
        &resolution
            .bindings
            .iter()
            .find(|(n, _)| n == name)
            .unwrap()
            .1
    }

    const PEOPLE: &str = "type person = person {name: str, friend: optional person}\n";

    #[test]
    fn test_mutual_references_share_handles() {
        let resolution = resolve(&format!(
            "{PEOPLE}alice := person(name: \"Alice\", friend: !bob)\nbob := person(name: \"Bob\", friend: !alice)\n"
        ))
        .unwrap();
        let alice = binding(&resolution, "alice").as_record().unwrap();
        let Value::Ref(friend) = alice.get("friend").unwrap() else {
            panic!("expected a reference");
        };
        assert_eq!(friend.name, "bob");
        assert_eq!(friend.binding, 1);

        let bob = binding(&resolution, "bob").as_record().unwrap();
        let Value::Ref(back) = bob.get("friend").unwrap() else {
            panic!("expected a reference");
        };
        assert_eq!(back.binding, 0);
    }

    #[test]
    fn test_self_reference_through_record_is_allowed() {
        let resolution = resolve(&format!(
            "{PEOPLE}narcissus := person(name: \"N\", friend: !narcissus)\n"
        ))
        .unwrap();
        let record = binding(&resolution, "narcissus").as_record().unwrap();
        assert!(matches!(record.get("friend"), Some(Value::Ref(r)) if r.binding == 0));
    }

    #[test]
    fn test_alias_cycles_are_rejected() {
        let err = resolve("a := !b\nb := !a\n").unwrap_err();
        assert!(matches!(err, LoadError::Reference(ReferenceError::SelfDependency { .. })));
        let err = resolve("a := !a\n").unwrap_err();
        assert!(matches!(err, LoadError::Reference(ReferenceError::SelfDependency { .. })));
    }

    #[test]
    fn test_scalar_self_dependency_is_rejected() {
        let err = resolve(
            "type counter = counter {count: int}\nc := counter(count: !c)\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LoadError::Reference(ReferenceError::SelfDependency { ref name, .. }) if name == "c"
        ));
    }

    #[test]
    fn test_path_into_unfinished_binding_is_rejected() {
        let err = resolve(&format!(
            "{PEOPLE}a := person(name: !b.name)\nb := person(name: \"B\", friend: !a)\nc := {{x: !a.name}}\n"
        ));
        // `a` needs `b`, and `b` only points at `a`, so this one resolves.
        assert!(err.is_ok());

        let err = resolve(&format!(
            "{PEOPLE}a := person(name: \"A\", friend: !b)\nb := person(name: !a.name)\n"
        ))
        .unwrap_err();
        assert!(matches!(err, LoadError::Reference(ReferenceError::SelfDependency { .. })));
    }

    #[test]
    fn test_reference_chain_depth_is_bounded() {
        let chain = |len: usize| {
            let mut source = String::new();
            for i in 0..len {
                source.push_str(&format!("b{i} := !b{}\n", i + 1));
            }
            source.push_str(&format!("b{len} := 1\n"));
            source
        };

        let ok = resolve(&chain(MAX_REFERENCE_DEPTH - 1)).unwrap();
        assert_eq!(ok.bindings.len(), MAX_REFERENCE_DEPTH);

        let err = resolve(&chain(MAX_REFERENCE_DEPTH + 10)).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Reference(ReferenceError::TooDeep { limit, .. }) if limit == MAX_REFERENCE_DEPTH
        ));
    }

    #[test]
    fn test_reference_paths_resolve_to_handles() {
        let resolution = resolve(&format!(
            "{PEOPLE}ada := person(name: \"Ada\")\nlabel := !ada.name\n"
        ))
        .unwrap();
        assert_eq!(
            binding(&resolution, "label"),
            &Value::Ref(Reference {
                binding: 0,
                name: "ada".to_string(),
                path: vec!["name".to_string()],
            })
        );

        let err = resolve(&format!("{PEOPLE}ada := person(name: \"Ada\")\nx := !ada.age\n")).unwrap_err();
        assert!(matches!(err, LoadError::Reference(ReferenceError::UnknownField { ref field, .. }) if field == "age"));
    }

    #[test]
    fn test_undefined_and_duplicate_bindings() {
        let err = resolve("x := !nowhere\n").unwrap_err();
        assert!(matches!(err, LoadError::Reference(ReferenceError::Undefined { ref name, .. }) if name == "nowhere"));

        let err = resolve("x := 1\nx := 2\n").unwrap_err();
        assert!(matches!(err, LoadError::Reference(ReferenceError::DuplicateBinding { .. })));
    }

    #[test]
    fn test_deferred_check_catches_wrong_type() {
        let err = resolve(
            "type pet = pet {name: str, owner: any}\ntype holder = holder {item: optional person}\ntype person = person {name: str}\np := pet(name: \"Rex\", owner: !h)\nh := holder(item: !p)\n",
        )
        .unwrap_err();
        match err {
            LoadError::Type(TypeError {
                kind: TypeErrorKind::Mismatch { expected, found },
                ..
            }) => {
                assert_eq!(expected, "person");
                assert_eq!(found, "constructor `pet`");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    const NODES: &str = "type node = node {id: int, next: optional node} where next.id != id\n";

    #[test]
    fn test_constraint_through_cycle_waits_for_resolution() {
        let resolution = resolve(&format!(
            "{NODES}a := node(id: 1, next: !b)\nb := node(id: 2, next: !a)\n"
        ))
        .unwrap();
        assert_eq!(resolution.bindings.len(), 2);
    }

    #[test]
    fn test_constraint_through_cycle_still_fails() {
        let err = resolve(&format!(
            "{NODES}a := node(id: 1, next: !b)\nb := node(id: 1, next: !a)\n"
        ))
        .unwrap_err();
        match err {
            LoadError::Constraint(violation) => {
                assert_eq!(violation.constraint, "next.id != id");
                assert_eq!(violation.fields[0], ("id".to_string(), "1".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_later_constraints_wait_behind_a_deferred_one() {
        // The second constraint fails, but only after the first can be read.
        let source = "type node = node {id: int, next: optional node}\nwhere next.id != id\nwhere id < 10\na := node(id: 1, next: !b)\nb := node(id: 20, next: !a)\n";
        match resolve(source).unwrap_err() {
            LoadError::Constraint(violation) => assert_eq!(violation.constraint, "id < 10"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_constraint_sees_finished_references() {
        let source = "type node = node {id: int, next: optional node} where next.id != id\nb := node(id: 2)\na := node(id: 1, next: !b)\nc := node(id: 2, next: !b)\n";
        let err = resolve(source).unwrap_err();
        match err {
            LoadError::Constraint(violation) => {
                assert_eq!(violation.constructor, "node");
                assert_eq!(violation.constraint, "next.id != id");
                assert_eq!(violation.fields[0], ("id".to_string(), "2".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_annotated_binding_gets_expected_type() {
        let resolution = resolve(
            "type point = point {x: float, y: float}\norigin: point := {x: 0, y: 1.5}\n",
        )
        .unwrap();
        assert_eq!(binding(&resolution, "origin").to_string(), "point(x: 0.0, y: 1.5)");
    }

    #[test]
    fn test_anonymous_values_without_context_stay_untyped() {
        let resolution = resolve("{name: \"x\", tags: [1, \"two\"]}\n").unwrap();
        let record = resolution.anonymous[0].as_record().unwrap();
        assert_eq!(record.ctor, None);
        assert_eq!(record.get("tags"), Some(&Value::List(vec![Value::Int(1), Value::Str("two".into())])));
    }

    #[test]
    fn test_anonymous_constructor_inference() {
        let types = "type point = point {x: int, y: int}\ntype shape = circle {r: int} | square {side: int}\ntype scene = scene {origin: point, shape: shape}\n";
        let ok = resolve(&format!(
            "{types}scene(origin: {{x: 1, y: 2}}, shape: {{circle: {{r: 3}}}})\n"
        ))
        .unwrap();
        assert_eq!(
            ok.anonymous[0].to_string(),
            "scene(origin: point(x: 1, y: 2), shape: circle(r: 3))"
        );

        let err = resolve(&format!(
            "{types}scene(origin: {{x: 1, y: 2}}, shape: {{r: 3}})\n"
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            LoadError::Type(TypeError {
                kind: TypeErrorKind::AmbiguousAnonymousConstructor(_),
                ..
            })
        ));
    }

    #[test]
    fn test_argument_binding_errors() {
        let types = "type pair = pair {left: int, right: optional int}\n";
        let kind = |data: &str| match resolve(&format!("{types}{data}\n")).unwrap_err() {
            LoadError::Type(err) => err.kind,
            other => panic!("unexpected error: {other:?}"),
        };
        assert!(matches!(kind("pair(1, 2, 3)"), TypeErrorKind::TooManyArguments { .. }));
        assert!(matches!(kind("pair(1, middle: 2)"), TypeErrorKind::UnknownField { .. }));
        assert!(matches!(kind("pair(1, left: 2)"), TypeErrorKind::DuplicateField { .. }));
        assert!(matches!(kind("pair(right: 2)"), TypeErrorKind::MissingField { .. }));
        assert!(matches!(kind("pair(\"one\")"), TypeErrorKind::Mismatch { .. }));

        let ok = resolve(&format!("{types}pair(1)\n")).unwrap();
        assert_eq!(ok.anonymous[0].to_string(), "pair(left: 1, right: null)");
    }

    #[test]
    fn test_type_parameters_are_substituted() {
        let types = "type box t = box {value: t}\ntype shelf = shelf {ints: box int, anything: box any}\n";
        let ok = resolve(&format!("{types}shelf(ints: box(1), anything: box(\"x\"))\n")).unwrap();
        assert_eq!(
            ok.anonymous[0].to_string(),
            "shelf(ints: box(value: 1), anything: box(value: \"x\"))"
        );

        let err = resolve(&format!("{types}shelf(ints: box(\"no\"), anything: box(1))\n")).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Type(TypeError {
                kind: TypeErrorKind::Mismatch { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_strings_destructure_through_patterns() {
        let source = "type money = money {amount: float, currency: str}\n\
                      type item = item {price: money}\n\
                      \"${amount} {currency}\" => money(amount: float(amount), currency: \"USD\")\n\
                      item(price: \"$29.99\")\n\
                      \"plain text\"\n";
        let resolution = resolve(source).unwrap();
        assert_eq!(
            resolution.anonymous[0].to_string(),
            "item(price: money(amount: 29.99, currency: \"USD\"))"
        );
        assert_eq!(resolution.anonymous[1], Value::Str("plain text".into()));

        let err = resolve(&source.replace("\"$29.99\"", "\"29.99\"")).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Type(TypeError {
                kind: TypeErrorKind::PatternMatchFailed { .. },
                ..
            })
        ));
    }
}

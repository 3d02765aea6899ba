use crate::ast::{Document, Expr, Item, Scope, TypeDecl, TypeExpr, TypeExprKind};
use crate::error::{TypeError, TypeErrorKind};
use miette::{NamedSource, SourceSpan};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prim {
    Int,
    Float,
    Str,
    Bool,
    /// Accepts every value. Also stands in for unbound type parameters.
    Any,
}

impl Prim {
    fn from_name(name: &str) -> Option<Prim> {
        match name {
            "int" => Some(Prim::Int),
            "float" => Some(Prim::Float),
            "str" => Some(Prim::Str),
            "bool" => Some(Prim::Bool),
            "any" => Some(Prim::Any),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Prim::Int => "int",
            Prim::Float => "float",
            Prim::Str => "str",
            Prim::Bool => "bool",
            Prim::Any => "any",
        }
    }
}

/// A checked type expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Ty {
    Prim(Prim),
    Named { name: String, args: Vec<Ty> },
    Param(String),
    Optional(Box<Ty>),
    List(Box<Ty>),
}

impl Ty {
    pub const ANY: Ty = Ty::Prim(Prim::Any);

    /// Replaces type parameters with `bindings`. Parameters without a binding become `any`.
    pub fn substitute(&self, bindings: &HashMap<&str, &Ty>) -> Ty {
        match self {
            Ty::Param(name) => bindings
                .get(name.as_str())
                .map_or(Ty::ANY, |ty| (*ty).clone()),
            Ty::Prim(p) => Ty::Prim(*p),
            Ty::Named { name, args } => Ty::Named {
                name: name.clone(),
                args: args.iter().map(|a| a.substitute(bindings)).collect(),
            },
            Ty::Optional(inner) => Ty::Optional(Box::new(inner.substitute(bindings))),
            Ty::List(inner) => Ty::List(Box::new(inner.substitute(bindings))),
        }
    }

    /// True for `any` and for parameters, which accept every value.
    pub fn is_open(&self) -> bool {
        matches!(self, Ty::Prim(Prim::Any) | Ty::Param(_))
    }

    fn is_atomic(&self) -> bool {
        match self {
            Ty::Named { args, .. } => args.is_empty(),
            Ty::Prim(_) | Ty::Param(_) => true,
            Ty::Optional(_) | Ty::List(_) => false,
        }
    }
}

impl Display for Ty {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Prim(p) => f.write_str(p.name()),
            Ty::Param(name) => f.write_str(name),
            Ty::Named { name, args } => {
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
            Ty::Optional(inner) | Ty::List(inner) => {
                let keyword = if matches!(self, Ty::List(_)) { "list" } else { "optional" };
                if inner.is_atomic() {
                    write!(f, "{keyword} {inner}")
                } else {
                    write!(f, "{keyword} ({inner})")
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: Option<String>,
    pub ty: Ty,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct Constructor {
    pub name: String,
    pub type_name: String,
    pub fields: Vec<Field>,
    pub span: SourceSpan,
}

impl Constructor {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.as_deref() == Some(name))
    }

    /// The field's name, or `_<index>` for positional fields.
    pub fn field_label(&self, index: usize) -> String {
        self.fields
            .get(index)
            .and_then(|f| f.name.clone())
            .unwrap_or_else(|| format!("_{index}"))
    }
}

#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub params: Vec<String>,
    /// Constructor names in declaration order.
    pub constructors: Vec<String>,
    pub span: SourceSpan,
}

/// One condition of a `where` clause. A clause with several conditions
/// yields one constraint per condition, in order.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub type_name: String,
    pub condition: Expr,
    pub scope: Scope,
    /// Source form of the condition, for diagnostics.
    pub text: String,
    /// Position among all constraints of the document.
    pub index: usize,
}

impl Constraint {
    pub fn span(&self) -> SourceSpan {
        self.condition.span()
    }
}

/// Every type and constructor declared in a document.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: Vec<TypeDef>,
    type_index: HashMap<String, usize>,
    ctors: Vec<Constructor>,
    ctor_index: HashMap<String, usize>,
    constraints: Vec<Constraint>,
}

impl TypeRegistry {
    pub fn build(document: &Document, src: &NamedSource<String>) -> Result<Self, TypeError> {
        let decls: Vec<&TypeDecl> = document
            .items
            .iter()
            .filter_map(|item| match item {
                Item::Type(decl) => Some(decl),
                _ => None,
            })
            .collect();

        let mut registry = TypeRegistry::default();
        let error = |kind: TypeErrorKind, span: SourceSpan| TypeError::new(kind, src.clone(), span);

        // Names first, so field types may refer to types declared later.
        for decl in &decls {
            if registry.type_index.contains_key(&decl.name) {
                return Err(error(TypeErrorKind::DuplicateName(decl.name.clone()), decl.span()));
            }
            for (i, param) in decl.params.iter().enumerate() {
                if decl.params[..i].contains(param) {
                    return Err(error(TypeErrorKind::DuplicateName(param.clone()), decl.span()));
                }
            }
            let mut constructors = Vec::new();
            for ctor in decl.ctors.ctors() {
                if registry.ctor_index.contains_key(&ctor.name) {
                    return Err(error(TypeErrorKind::DuplicateName(ctor.name.clone()), ctor.span())
                        .with_help("Constructor names must be unique across the whole document."));
                }
                registry.ctor_index.insert(ctor.name.clone(), registry.ctors.len());
                registry.ctors.push(Constructor {
                    name: ctor.name.clone(),
                    type_name: decl.name.clone(),
                    fields: Vec::new(),
                    span: ctor.span(),
                });
                constructors.push(ctor.name.clone());
            }
            registry.type_index.insert(decl.name.clone(), registry.types.len());
            registry.types.push(TypeDef {
                name: decl.name.clone(),
                params: decl.params.clone(),
                constructors,
                span: decl.span(),
            });
        }

        for decl in &decls {
            for ctor in decl.ctors.ctors() {
                let mut fields: Vec<Field> = Vec::with_capacity(ctor.fields.len());
                for field in &ctor.fields {
                    if let Some(name) = &field.name {
                        if fields.iter().any(|f| f.name.as_ref() == Some(name)) {
                            return Err(error(
                                TypeErrorKind::DuplicateField {
                                    ctor: ctor.name.clone(),
                                    field: name.clone(),
                                },
                                field.span(),
                            ));
                        }
                    }
                    fields.push(Field {
                        name: field.name.clone(),
                        ty: registry.resolve_type(&field.ty, &decl.params, src)?,
                        span: field.span(),
                    });
                }
                if let Some(&id) = registry.ctor_index.get(&ctor.name) {
                    registry.ctors[id].fields = fields;
                }
            }

            // Inline clauses come first, the same order desugaring produces.
            let inline = decl.ctors.ctors().iter().filter_map(|ctor| {
                ctor.inline_where
                    .as_ref()
                    .map(|clause| (clause, Scope::Only(vec![ctor.name.clone()])))
            });
            let trailing = decl.wheres.iter().map(|clause| (clause, clause.scope.clone()));
            for (clause, scope) in inline.chain(trailing).collect::<Vec<_>>() {
                for name in scope.names() {
                    let belongs = registry
                        .lookup_constructor(name)
                        .is_some_and(|c| c.type_name == decl.name);
                    if !belongs {
                        return Err(error(TypeErrorKind::UnknownConstructor(name.clone()), clause.span())
                            .with_help(format!("`{}` has no constructor named `{name}`.", decl.name)));
                    }
                }
                for condition in &clause.exprs {
                    registry.constraints.push(Constraint {
                        type_name: decl.name.clone(),
                        condition: condition.clone(),
                        scope: scope.clone(),
                        text: condition.to_string(),
                        index: registry.constraints.len(),
                    });
                }
            }
        }

        log::debug!(
            "registered {} type(s), {} constructor(s), {} constraint(s)",
            registry.types.len(),
            registry.ctors.len(),
            registry.constraints.len()
        );
        Ok(registry)
    }

    /// Checks a type expression written inside a declaration with `params`.
    pub fn resolve_type(
        &self,
        expr: &TypeExpr,
        params: &[String],
        src: &NamedSource<String>,
    ) -> Result<Ty, TypeError> {
        let error = |kind: TypeErrorKind| TypeError::new(kind, src.clone(), expr.span());
        match &expr.kind {
            TypeExprKind::Optional(inner) => Ok(Ty::Optional(Box::new(
                self.resolve_type(inner, params, src)?,
            ))),
            TypeExprKind::List(inner) => {
                Ok(Ty::List(Box::new(self.resolve_type(inner, params, src)?)))
            }
            TypeExprKind::Named { name, args } => {
                let expected = if params.contains(name) {
                    0
                } else if Prim::from_name(name).is_some() {
                    0
                } else if let Some(def) = self.lookup_type(name) {
                    def.params.len()
                } else {
                    return Err(error(TypeErrorKind::UnknownType(name.clone())));
                };
                if args.len() != expected {
                    return Err(error(TypeErrorKind::ArityMismatch {
                        name: name.clone(),
                        expected,
                        found: args.len(),
                    }));
                }

                if params.contains(name) {
                    Ok(Ty::Param(name.clone()))
                } else if let Some(prim) = Prim::from_name(name) {
                    Ok(Ty::Prim(prim))
                } else {
                    let args = args
                        .iter()
                        .map(|arg| self.resolve_type(arg, params, src))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(Ty::Named {
                        name: name.clone(),
                        args,
                    })
                }
            }
        }
    }

    pub fn lookup_type(&self, name: &str) -> Option<&TypeDef> {
        self.type_index.get(name).map(|&i| &self.types[i])
    }

    pub fn lookup_constructor(&self, name: &str) -> Option<&Constructor> {
        self.ctor_index.get(name).map(|&i| &self.ctors[i])
    }

    pub fn constructors_of(&self, type_name: &str) -> Vec<&Constructor> {
        self.lookup_type(type_name)
            .map(|def| {
                def.constructors
                    .iter()
                    .filter_map(|name| self.lookup_constructor(name))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_single_constructor(&self, type_name: &str) -> bool {
        self.sole_constructor(type_name).is_some()
    }

    /// The constructor an anonymous `{...}` value of this type stands for.
    pub fn sole_constructor(&self, type_name: &str) -> Option<&Constructor> {
        match self.constructors_of(type_name)[..] {
            [only] => Some(only),
            _ => None,
        }
    }

    /// Constraints that apply to `ctor`, in declaration order.
    pub fn constraints_for(&self, ctor: &str) -> Vec<&Constraint> {
        let Some(constructor) = self.lookup_constructor(ctor) else {
            return Vec::new();
        };
        self.constraints
            .iter()
            .filter(|c| c.type_name == constructor.type_name && c.scope.applies_to(ctor))
            .collect()
    }

    /// Field types of `ctor` with the owning type's parameters bound to `args`.
    pub fn field_types(&self, ctor: &Constructor, args: &[Ty]) -> Vec<Ty> {
        let params = self
            .lookup_type(&ctor.type_name)
            .map(|def| def.params.as_slice())
            .unwrap_or_default();
        let bindings: HashMap<&str, &Ty> = params
            .iter()
            .map(String::as_str)
            .zip(args.iter())
            .collect();
        ctor.fields
            .iter()
            .map(|field| field.ty.substitute(&bindings))
            .collect()
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.iter()
    }

    pub fn constructors(&self) -> impl Iterator<Item = &Constructor> {
        self.ctors.iter()
    }
}

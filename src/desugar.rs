//! Rewrites every shorthand notation into its canonical form.
//!
//! The pass works on the parser's own AST types and leaves a document for
//! which [`Document::is_canonical`] holds. Canonical input comes back unchanged.

use crate::ast::*;

pub fn desugar(document: Document) -> Document {
    let items = document
        .items
        .into_iter()
        .map(|item| match item {
            Item::Type(decl) => Item::Type(desugar_type(decl)),
            Item::Pattern(rule) => Item::Pattern(rule),
            Item::Binding(binding) => Item::Binding(Binding {
                value: desugar_data(binding.value),
                ..binding
            }),
            Item::Value(value) => Item::Value(desugar_data(value)),
        })
        .collect();
    Document { items }
}

/// Inline `where` clauses become `for {ctor}` clauses ahead of the type's
/// own clauses, and the constructor list takes the line form.
fn desugar_type(mut decl: TypeDecl) -> TypeDecl {
    let mut lifted = Vec::new();
    for ctor in decl.ctors.ctors_mut() {
        if let Some(mut clause) = ctor.inline_where.take() {
            clause.scope = Scope::Only(vec![ctor.name.clone()]);
            lifted.push(clause);
        }
    }
    if !lifted.is_empty() {
        log::trace!(
            "lifted {} inline where clause(s) of `{}`",
            lifted.len(),
            decl.name
        );
    }
    lifted.append(&mut decl.wheres);

    let ctors = match decl.ctors {
        CtorList::Piped(ctors) | CtorList::Lines(ctors) => ctors,
    };
    TypeDecl {
        ctors: CtorList::Lines(ctors),
        wheres: lifted,
        ..decl
    }
}

fn desugar_data(expr: DataExpr) -> DataExpr {
    let DataExpr {
        kind,
        pos_start,
        pos_end,
    } = expr;

    let kind = match kind {
        DataKind::List(items) | DataKind::DashList(items) => {
            DataKind::List(items.into_iter().map(desugar_data).collect())
        }
        DataKind::Call { ctor, args } => DataKind::Call {
            ctor,
            args: args
                .into_iter()
                .map(|arg| DataArg {
                    name: arg.name,
                    value: desugar_data(arg.value),
                })
                .collect(),
        },
        DataKind::Anonymous(entries)
        | DataKind::FieldBlock(entries)
        | DataKind::DashRecord(entries) => DataKind::Anonymous(desugar_entries(entries)),
        DataKind::CtorBlock { ctor, entries } => DataKind::Call {
            ctor,
            args: entries
                .into_iter()
                .map(|entry| DataArg {
                    name: Some(entry.key),
                    value: desugar_data(entry.value),
                })
                .collect(),
        },
        DataKind::ListBlock { ctor, items } => {
            let list = DataExpr {
                kind: DataKind::List(items.into_iter().map(desugar_data).collect()),
                pos_start,
                pos_end,
            };
            DataKind::Call {
                ctor,
                args: vec![DataArg {
                    name: None,
                    value: list,
                }],
            }
        }
        leaf @ (DataKind::Str(_)
        | DataKind::Int(_)
        | DataKind::Float(_)
        | DataKind::Bool(_)
        | DataKind::Null
        | DataKind::Reference { .. }) => leaf,
    };

    DataExpr {
        kind,
        pos_start,
        pos_end,
    }
}

fn desugar_entries(entries: Vec<Entry>) -> Vec<Entry> {
    entries
        .into_iter()
        .map(|entry| Entry {
            value: desugar_data(entry.value),
            ..entry
        })
        .collect()
}

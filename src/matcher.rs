//! Pattern rules compiled into ordered string matchers.
//!
//! Rules are tried in declaration order and the first one whose literal
//! structure and guard both accept the input wins.

use crate::ast::{Document, Expr, ExprKind, Item, PatternRule};
use crate::error::{TypeError, TypeErrorKind};
use crate::eval::{EvalValue, Evaluator};
use crate::lexer::TemplatePart;
use crate::registry::TypeRegistry;
use miette::{NamedSource, SourceSpan};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Capture(String),
}

#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub segments: Vec<Segment>,
    /// A constructor call built from the captured names.
    pub target: Expr,
    pub target_ctor: String,
    /// Type the target constructor belongs to.
    pub type_name: String,
    pub guard: Vec<Expr>,
    /// Declaration index. Lower wins.
    pub index: usize,
    pub span: SourceSpan,
}

/// A successful match: the rule and what each placeholder captured.
#[derive(Debug, Clone)]
pub struct PatternMatch<'p> {
    pub rule: &'p CompiledPattern,
    pub captures: Vec<(String, String)>,
}

impl PatternMatch<'_> {
    /// The captures as an evaluation environment. Every capture is a string.
    pub fn env(&self) -> HashMap<String, EvalValue> {
        capture_env(&self.captures)
    }
}

fn capture_env(captures: &[(String, String)]) -> HashMap<String, EvalValue> {
    captures
        .iter()
        .map(|(name, text)| (name.clone(), EvalValue::Str(text.clone())))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    rules: Vec<CompiledPattern>,
}

impl PatternSet {
    pub fn compile(
        document: &Document,
        registry: &TypeRegistry,
        src: &NamedSource<String>,
    ) -> Result<Self, TypeError> {
        let mut rules = Vec::new();
        for item in &document.items {
            if let Item::Pattern(rule) = item {
                let index = rules.len();
                rules.push(compile_rule(rule, index, registry, src)?);
            }
        }
        log::debug!("compiled {} pattern rule(s)", rules.len());
        Ok(PatternSet { rules })
    }

    pub fn rules(&self) -> &[CompiledPattern] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule, in declaration order, that accepts `input`.
    pub fn match_str(&self, input: &str) -> Option<PatternMatch<'_>> {
        self.first_match(input, |_| true)
    }

    /// Like [`PatternSet::match_str`], restricted to rules producing `type_name`.
    pub fn match_typed(&self, input: &str, type_name: &str) -> Option<PatternMatch<'_>> {
        self.first_match(input, |rule| rule.type_name == type_name)
    }

    fn first_match<F>(&self, input: &str, filter: F) -> Option<PatternMatch<'_>>
    where
        F: Fn(&CompiledPattern) -> bool,
    {
        self.rules
            .iter()
            .filter(|rule| filter(rule))
            .find_map(|rule| {
                let captures = rule.match_input(input)?;
                log::trace!(
                    "pattern rule #{} (`{}`) matched {input:?}",
                    rule.index,
                    rule.target_ctor
                );
                Some(PatternMatch { rule, captures })
            })
    }
}

impl CompiledPattern {
    /// Matches the template and then the guard.
    pub fn match_input(&self, input: &str) -> Option<Vec<(String, String)>> {
        let mut captures = Vec::new();
        if !Backtracker::new(&self.segments, input).run(0, 0, &mut captures) {
            log::trace!("pattern rule #{} rejects {input:?}", self.index);
            return None;
        }
        let env = capture_env(&captures);
        let evaluator = Evaluator::new(&env);
        for condition in &self.guard {
            match evaluator.check(condition) {
                Ok(true) => {}
                Ok(false) => {
                    log::trace!("guard `{condition}` of rule #{} failed", self.index);
                    return None;
                }
                Err(fault) => {
                    log::trace!(
                        "guard `{condition}` of rule #{} could not be evaluated: {}",
                        self.index,
                        fault.kind
                    );
                    return None;
                }
            }
        }
        Some(captures)
    }
}

fn is_blank(text: &str) -> bool {
    !text.is_empty() && text.chars().all(char::is_whitespace)
}

/// A template tail that may be left out once the input runs out: it starts
/// with whitespace and holds nothing but whitespace and placeholders.
fn is_omissible(segments: &[Segment]) -> bool {
    matches!(segments.first(), Some(Segment::Literal(lit)) if is_blank(lit))
        && segments.iter().all(|segment| match segment {
            Segment::Literal(lit) => is_blank(lit),
            Segment::Capture(_) => true,
        })
}

fn bind_empty(segments: &[Segment], out: &mut Vec<(String, String)>) {
    for segment in segments {
        if let Segment::Capture(name) = segment {
            out.push((name.clone(), String::new()));
        }
    }
}

/// Matches segments against an input, remembering every (segment, offset)
/// pair that is known to fail. A capture followed by a literal tries each
/// occurrence of that literal; without the memo, `k` such captures over a
/// failing input revisit the same states on the order of `n^k` times.
struct Backtracker<'s> {
    segments: &'s [Segment],
    input: &'s str,
    failed: HashSet<(usize, usize)>,
}

impl<'s> Backtracker<'s> {
    fn new(segments: &'s [Segment], input: &'s str) -> Self {
        Self {
            segments,
            input,
            failed: HashSet::new(),
        }
    }

    /// Captures are only pushed on success; `out` is left as it was otherwise.
    fn run(&mut self, seg: usize, pos: usize, out: &mut Vec<(String, String)>) -> bool {
        if self.failed.contains(&(seg, pos)) {
            return false;
        }
        let matched = self.step(seg, pos, out);
        if !matched {
            self.failed.insert((seg, pos));
        }
        matched
    }

    fn step(&mut self, seg: usize, pos: usize, out: &mut Vec<(String, String)>) -> bool {
        let segments = self.segments;
        let text = self.input;
        let input = &text[pos..];
        let Some(first) = segments.get(seg) else {
            return input.is_empty();
        };
        let rest = &segments[seg + 1..];
        // The whole template is never omissible, only a tail of it.
        if input.is_empty() && seg > 0 && is_omissible(&segments[seg..]) {
            bind_empty(&segments[seg..], out);
            return true;
        }

        match first {
            Segment::Literal(lit) => {
                input.starts_with(lit.as_str()) && self.run(seg + 1, pos + lit.len(), out)
            }
            Segment::Capture(name) => match rest.first() {
                None => {
                    if input.is_empty() {
                        return false;
                    }
                    out.push((name.clone(), input.to_string()));
                    true
                }
                Some(Segment::Literal(lit)) => {
                    let mark = out.len();
                    for (idx, _) in input.match_indices(lit.as_str()).filter(|(idx, _)| *idx > 0) {
                        if self.run(seg + 1, pos + idx, out) {
                            out.insert(mark, (name.clone(), input[..idx].to_string()));
                            return true;
                        }
                    }
                    if !input.is_empty() && is_omissible(rest) {
                        out.push((name.clone(), input.to_string()));
                        bind_empty(rest, out);
                        return true;
                    }
                    false
                }
                // Adjacent placeholders never survive compilation.
                Some(Segment::Capture(_)) => false,
            },
        }
    }
}

fn compile_rule(
    rule: &PatternRule,
    index: usize,
    registry: &TypeRegistry,
    src: &NamedSource<String>,
) -> Result<CompiledPattern, TypeError> {
    let invalid = |message: String| {
        TypeError::new(TypeErrorKind::InvalidPattern(message), src.clone(), rule.span())
    };

    let mut segments: Vec<Segment> = Vec::new();
    for part in &rule.template.parts {
        match part {
            TemplatePart::Literal(text) => {
                if text.is_empty() {
                    continue;
                }
                if let Some(Segment::Literal(previous)) = segments.last_mut() {
                    previous.push_str(text);
                } else {
                    segments.push(Segment::Literal(text.clone()));
                }
            }
            TemplatePart::Placeholder(name) => {
                if name.is_empty() {
                    return Err(invalid("empty placeholder name".to_string()));
                }
                if matches!(segments.last(), Some(Segment::Capture(_))) {
                    return Err(invalid(format!(
                        "placeholder `{{{name}}}` directly follows another placeholder"
                    ))
                    .with_help("Separate placeholders with at least one literal character."));
                }
                if segments.contains(&Segment::Capture(name.clone())) {
                    return Err(invalid(format!("placeholder `{{{name}}}` appears twice")));
                }
                segments.push(Segment::Capture(name.clone()));
            }
            TemplatePart::StrayBrace(brace) => {
                return Err(invalid(format!("unmatched `{brace}` in template"))
                    .with_help("Write `\\{` or `\\}` for a literal brace."));
            }
        }
    }

    let ExprKind::Call { name: target_ctor, .. } = &rule.target.kind else {
        return Err(invalid("the target must be a constructor call".to_string()));
    };
    let Some(ctor) = registry.lookup_constructor(target_ctor) else {
        return Err(TypeError::new(
            TypeErrorKind::UnknownConstructor(target_ctor.clone()),
            src.clone(),
            rule.target.span(),
        ));
    };

    let captured = |name: &str| {
        segments
            .iter()
            .any(|segment| matches!(segment, Segment::Capture(c) if c == name))
    };
    for expr in std::iter::once(&rule.target).chain(&rule.guard) {
        for name in expr.free_names() {
            if !captured(name) && registry.lookup_constructor(name).is_none() {
                return Err(invalid(format!("`{name}` is not a placeholder of the template")));
            }
        }
    }

    Ok(CompiledPattern {
        segments,
        target: rule.target.clone(),
        target_ctor: target_ctor.clone(),
        type_name: ctor.type_name.clone(),
        guard: rule.guard.clone(),
        index,
        span: rule.span(),
    })
}

use std::{cell::RefCell, fmt::Write, num::NonZeroUsize, rc::Rc};

use derive_ex::Ex;

use crate::{
    cache::Cache,
    core::TrackContext,
    value::{Key, Value},
    Error, Result, Scope,
};

#[cfg(test)]
mod tests;

/// Parses binding expressions.
pub trait Evaluator {
    /// Parses an expression, or an interpolated text such as `"Hello {{ name }}"`.
    fn parse_getter(&self, expr: &str, is_interpolate: bool) -> Result<Getter>;

    /// Parses an assignable expression.
    fn parse_setter(&self, expr: &str) -> Result<Path>;
}

/// Compiled expression.
///
/// A getter that is not dynamic reads nothing from the scope and always yields the same value.
#[derive(Clone)]
pub struct Getter {
    dynamic: bool,
    eval: Rc<dyn Fn(&Scope, &mut TrackContext) -> Value>,
}

impl Getter {
    pub fn new(dynamic: bool, eval: impl Fn(&Scope, &mut TrackContext) -> Value + 'static) -> Self {
        Self {
            dynamic,
            eval: Rc::new(eval),
        }
    }
    pub fn constant(value: Value) -> Self {
        Self::new(false, move |_, _| value.clone())
    }
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }
    pub fn evaluate(&self, scope: &Scope, cx: &mut TrackContext) -> Value {
        (self.eval)(scope, cx)
    }
}
impl std::fmt::Debug for Getter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Getter")
            .field("dynamic", &self.dynamic)
            .finish_non_exhaustive()
    }
}

/// Member path such as `a.b[0]['c']`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    root: String,
    members: Vec<Key>,
}

impl Path {
    pub fn parse(expr: &str) -> Result<Self> {
        let err = || Error::Expression(expr.to_owned());
        let s = expr.trim();
        let mut rest = s;
        let root = take_ident(&mut rest).ok_or_else(err)?;
        let mut members = Vec::new();
        while let Some(c) = rest.chars().next() {
            match c {
                '.' => {
                    rest = &rest[1..];
                    members.push(Key::Name(take_ident(&mut rest).ok_or_else(err)?));
                }
                '[' => {
                    let end = rest.find(']').ok_or_else(err)?;
                    let inner = rest[1..end].trim();
                    rest = &rest[end + 1..];
                    if let Ok(index) = inner.parse::<usize>() {
                        members.push(Key::Index(index));
                    } else {
                        members.push(Key::Name(unquote(inner).ok_or_else(err)?.to_owned()));
                    }
                }
                _ => return Err(err()),
            }
        }
        Ok(Self { root, members })
    }

    pub fn root(&self) -> &str {
        &self.root
    }
    pub fn members(&self) -> &[Key] {
        &self.members
    }

    pub fn evaluate(&self, scope: &Scope, cx: &mut TrackContext) -> Value {
        let mut value = scope.lookup(&self.root, cx);
        for key in &self.members {
            value = match &value {
                Value::Object(o) => {
                    cx.track(o);
                    o.get_key(key)
                }
                _ => Value::Undefined,
            };
        }
        if let Value::Object(o) = &value {
            cx.track(o);
        }
        value
    }
}

fn take_ident(s: &mut &str) -> Option<String> {
    let is_start = |c: char| c.is_ascii_alphabetic() || c == '_' || c == '$';
    let is_rest = |c: char| is_start(c) || c.is_ascii_digit();
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if is_start(c) => {}
        _ => return None,
    }
    let end = chars
        .find(|&(_, c)| !is_rest(c))
        .map_or(s.len(), |(i, _)| i);
    let ident = s[..end].to_owned();
    *s = &s[end..];
    Some(ident)
}

fn unquote(s: &str) -> Option<&str> {
    let quote = s.chars().next()?;
    if (quote == '\'' || quote == '"') && s.len() >= 2 && s.ends_with(quote) {
        let inner = &s[1..s.len() - 1];
        (!inner.contains(quote)).then_some(inner)
    } else {
        None
    }
}

enum Expr {
    Literal(Value),
    Path(Path),
}

impl Expr {
    fn parse(expr: &str) -> Result<Self> {
        let s = expr.trim();
        if let Some(text) = unquote(s) {
            return Ok(Expr::Literal(text.into()));
        }
        match s {
            "true" => return Ok(Expr::Literal(true.into())),
            "false" => return Ok(Expr::Literal(false.into())),
            "null" => return Ok(Expr::Literal(Value::Null)),
            "undefined" => return Ok(Expr::Literal(Value::Undefined)),
            _ => {}
        }
        if s.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.') {
            return s
                .parse::<f64>()
                .map(|n| Expr::Literal(n.into()))
                .map_err(|_| Error::Expression(expr.to_owned()));
        }
        Path::parse(s).map(Expr::Path)
    }
    fn is_dynamic(&self) -> bool {
        matches!(self, Expr::Path(_))
    }
    fn evaluate(&self, scope: &Scope, cx: &mut TrackContext) -> Value {
        match self {
            Expr::Literal(value) => value.clone(),
            Expr::Path(path) => path.evaluate(scope, cx),
        }
    }
}

enum Part {
    Text(String),
    Expr(Expr),
}

fn parse_interpolation(text: &str) -> Result<Vec<Part>> {
    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        if start > 0 {
            parts.push(Part::Text(rest[..start].to_owned()));
        }
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| Error::Expression(text.to_owned()))?;
        parts.push(Part::Expr(Expr::parse(&after[..end])?));
        rest = &after[end + 2..];
    }
    if !rest.is_empty() {
        parts.push(Part::Text(rest.to_owned()));
    }
    Ok(parts)
}

fn build_getter(expr: &str, is_interpolate: bool) -> Result<Getter> {
    if !is_interpolate {
        let e = Expr::parse(expr)?;
        return Ok(Getter::new(e.is_dynamic(), move |scope, cx| {
            e.evaluate(scope, cx)
        }));
    }
    let mut parts = parse_interpolation(expr)?;
    let dynamic = parts.iter().any(|p| matches!(p, Part::Expr(e) if e.is_dynamic()));
    if let [Part::Expr(_)] = parts.as_slice() {
        if let Some(Part::Expr(e)) = parts.pop() {
            return Ok(Getter::new(dynamic, move |scope, cx| e.evaluate(scope, cx)));
        }
    }
    Ok(Getter::new(dynamic, move |scope, cx| {
        let mut s = String::new();
        for part in &parts {
            match part {
                Part::Text(text) => s.push_str(text),
                Part::Expr(e) => {
                    let _ = write!(s, "{}", e.evaluate(scope, cx));
                }
            }
        }
        s.into()
    }))
}

/// Default [`Evaluator`]: literals, member paths and `{{ }}` interpolation.
///
/// Parsed getters are cached by expression text, keeping the most recently used ones.
#[derive(Ex)]
#[derive_ex(Default)]
#[default(Self::new())]
pub struct PathEvaluator {
    getters: RefCell<Cache<(String, bool), Getter>>,
}

impl PathEvaluator {
    pub const DEFAULT_CAPACITY: NonZeroUsize = NonZeroUsize::MIN.saturating_add(1023);

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            getters: RefCell::new(Cache::with_capacity(capacity)),
        }
    }
}

impl Evaluator for PathEvaluator {
    fn parse_getter(&self, expr: &str, is_interpolate: bool) -> Result<Getter> {
        let key = (expr.to_owned(), is_interpolate);
        if let Some(getter) = self.getters.borrow_mut().get(&key) {
            return Ok(getter.clone());
        }
        let getter = build_getter(expr, is_interpolate)?;
        self.getters.borrow_mut().set(key, getter.clone());
        Ok(getter)
    }
    fn parse_setter(&self, expr: &str) -> Result<Path> {
        Path::parse(expr)
    }
}

//! `repeat`: renders one copy of its element per item and keeps the copies in sync with the list.
//!
//! ```text
//! <li x-repeat="item in items">...</li>
//! <li x-repeat="value, key in object">...</li>
//! <li x-repeat="i in 3">...</li>
//! ```
//!
//! Each copy gets its own child scope. Object items keep their scope (and node) for as long as
//! the same object stays in the list. Primitive items reuse scopes by value.

use std::{
    any::Any,
    cell::{Cell, RefCell},
    collections::HashSet,
    mem::take,
    rc::{Rc, Weak},
};

use crate::{
    binding::{Binding, BindingDefinition, BindingHooks},
    cache::Cache,
    dom::Node,
    template::{self, Executor},
    value::{Object, Value},
    Error, Result, Scope,
};


pub const PRIORITY: i32 = 90;

pub fn definition() -> BindingDefinition {
    BindingDefinition::new(|| {
        let repeat = Rc::new(Repeat::new());
        let r0 = repeat.clone();
        let r1 = repeat.clone();
        let r2 = repeat.clone();
        BindingHooks::new()
            .on_init(move |b, _, _| r0.init(b))
            .on_update(move |b, new, _| r1.update(b, new))
            .on_release(move |_| r2.release())
            .with_state(repeat)
    })
    .terminal()
    .priority(PRIORITY)
}

/// Counts of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub reused: usize,
    pub released: usize,
    pub inserted: usize,
    pub moved: usize,
}

/// Parsed `<value>[, <key>] in <source>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatExpr {
    pub value_name: String,
    pub key_name: Option<String>,
    pub source: String,
}

impl RepeatExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        let err = || Error::config(format!("invalid repeat expression: `{expr}`"));
        let separators = in_separators(expr);
        let [(head_end, source_start)] = separators[..] else {
            return Err(err());
        };
        let head = expr[..head_end].trim();
        let source = expr[source_start..].trim();
        if source.is_empty() {
            return Err(err());
        }
        let (value_name, key_name) = match head.split_once(',') {
            Some((value, key)) => (value.trim(), Some(key.trim())),
            None => (head, None),
        };
        if !is_identifier(value_name) || key_name.is_some_and(|k| !is_identifier(k)) {
            return Err(err());
        }
        Ok(Self {
            value_name: value_name.to_owned(),
            key_name: key_name.map(str::to_owned),
            source: source.to_owned(),
        })
    }
}

/// Byte ranges `(start, end)` of every whitespace-delimited `in`.
fn in_separators(expr: &str) -> Vec<(usize, usize)> {
    let bytes = expr.as_bytes();
    let mut result = Vec::new();
    for (i, _) in expr.match_indices("in") {
        let before = i.checked_sub(1).map(|j| bytes[j]);
        let after = bytes.get(i + 2).copied();
        if before.is_some_and(|b| b.is_ascii_whitespace())
            && after.is_some_and(|b| b.is_ascii_whitespace())
        {
            result.push((i, i + 2));
        }
    }
    result
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn next_repeat_id() -> u64 {
    thread_local! {
        static NEXT: Cell<u64> = const { Cell::new(0) };
    }
    NEXT.with(|n| {
        let id = n.get();
        n.set(id + 1);
        id
    })
}

enum Slot {
    Tagged(Object),
    Bucket(String),
    Untracked,
}

struct ItemScope {
    scope: Rc<Scope>,
    root: Node,
    checked: Cell<bool>,
    bound: Cell<bool>,
    slot: Slot,
}

struct Setup {
    id: u64,
    expr: RepeatExpr,
    template: Node,
    start: Node,
    end: Node,
    executor: Executor,
    parent: Weak<Scope>,
    capacity: usize,
}

#[derive(Default)]
struct RepeatState {
    setup: Option<Setup>,
    items: Vec<Rc<ItemScope>>,
    buckets: Option<Cache<String, Vec<Rc<ItemScope>>>>,
    stats: ReconcileStats,
}

/// State of one `repeat` binding, available through [`Binding::state`].
pub struct Repeat(RefCell<RepeatState>);

impl Repeat {
    fn new() -> Self {
        Self(RefCell::new(RepeatState::default()))
    }

    /// Counts of the last reconciliation.
    pub fn stats(&self) -> ReconcileStats {
        self.0.borrow().stats
    }
    pub fn len(&self) -> usize {
        self.0.borrow().items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Item scopes in list order.
    pub fn scopes(&self) -> Vec<Rc<Scope>> {
        self.0.borrow().items.iter().map(|i| i.scope.clone()).collect()
    }

    /// Rendered copies in list order.
    pub fn roots(&self) -> Vec<Node> {
        self.0.borrow().items.iter().map(|i| i.root.clone()).collect()
    }

    /// Number of reusable scopes kept for a primitive value.
    pub fn bucket_len(&self, value: &Value) -> usize {
        let mut s = self.0.borrow_mut();
        s.buckets
            .as_mut()
            .and_then(|b| b.get(&value.to_key_string()))
            .map_or(0, Vec::len)
    }

    fn init(&self, binding: &Binding) -> Result<()> {
        let expression = binding.expression().unwrap_or_default();
        let expr = RepeatExpr::parse(&expression)?;
        let (Some(scope), Some(template)) = (binding.scope(), binding.target()) else {
            return Err(Error::config("repeat binding requires a scope and a target"));
        };
        let rt = scope.runtime();
        let executor = template::compile(rt, &template)?;
        let capacity = rt.config().repeat_cache_capacity;
        let buckets = Cache::new(capacity)?;

        let start = Node::comment(&format!("repeat-start: {expression}"));
        let end = Node::comment(&format!("repeat-ended: {expression}"));
        template.insert_before(&start);
        template.replace_with(&end);
        binding.set_expression(&expr.source);

        let mut s = self.0.borrow_mut();
        s.buckets = Some(buckets);
        s.setup = Some(Setup {
            id: next_repeat_id(),
            expr,
            template,
            start,
            end,
            executor,
            parent: Rc::downgrade(&scope),
            capacity,
        });
        Ok(())
    }

    fn update(&self, binding: &Binding, value: &Value) -> Result<()> {
        let (executor, parent, unbound) = {
            let mut s = self.0.borrow_mut();
            let s = &mut *s;
            let Some(setup) = &s.setup else {
                return Ok(());
            };
            let Some(parent) = setup.parent.upgrade() else {
                return Ok(());
            };
            let Some(buckets) = &mut s.buckets else {
                return Ok(());
            };
            let mut stats = ReconcileStats::default();

            let entries = entries(value);
            let len = entries.len();

            // Buckets only hold live scopes, so none may be evicted during the pass.
            let new_keys: HashSet<String> = entries
                .iter()
                .filter(|(_, v)| !matches!(v, Value::Object(_)))
                .map(|(_, v)| v.to_key_string())
                .filter(|k| !buckets.contains_key(k))
                .collect();
            buckets.set_capacity(setup.capacity.max(buckets.len() + new_keys.len()))?;

            let mut items = Vec::with_capacity(len);
            for (index, (key, value)) in entries.into_iter().enumerate() {
                let reused = match &value {
                    Value::Object(o) => o
                        .tag(setup.id)
                        .and_then(|a| a.downcast::<ItemScope>().ok())
                        .filter(|item| !item.checked.get()),
                    _ => buckets
                        .get(&value.to_key_string())
                        .and_then(|b| b.iter().find(|item| !item.checked.get()).cloned()),
                };
                let item = match reused {
                    Some(item) => {
                        refresh(&setup.expr, item.scope.model(), index, len, &key, &value);
                        stats.reused += 1;
                        item
                    }
                    None => {
                        stats.created += 1;
                        create_item(setup, buckets, &parent, index, len, key, value)
                    }
                };
                item.checked.set(true);
                items.push(item);
            }

            let old_items = take(&mut s.items);
            if old_items.is_empty() {
                for item in &items {
                    setup.end.insert_before(&item.root);
                    stats.inserted += 1;
                }
            } else {
                for item in &old_items {
                    if !item.checked.get() {
                        release_item(setup.id, buckets, item);
                        stats.released += 1;
                    }
                }
                let mut pointer = previous_live(&setup.end);
                for item in items.iter().rev() {
                    if pointer.as_ref() == Some(&item.root) {
                        pointer = pointer.as_ref().and_then(previous_live);
                        continue;
                    }
                    let attached = item.root.parent().is_some();
                    pointer.as_ref().unwrap_or(&setup.start).insert_after(&item.root);
                    if attached {
                        stats.moved += 1;
                    } else {
                        stats.inserted += 1;
                    }
                }
            }

            buckets.set_capacity(setup.capacity.max(buckets.len()))?;

            let unbound: Vec<_> = items
                .iter()
                .filter(|item| !item.bound.get())
                .cloned()
                .collect();
            for item in &items {
                item.checked.set(false);
            }
            s.items = items;
            s.stats = stats;
            tracing::debug!(
                binding = binding.id(),
                created = stats.created,
                reused = stats.reused,
                released = stats.released,
                inserted = stats.inserted,
                moved = stats.moved,
                "repeat reconciled"
            );
            (setup.executor.clone(), parent, unbound)
        };
        let mut error = None;
        for item in unbound {
            match executor(&item.scope, &item.root, Some(&parent), None) {
                Ok(()) => item.bound.set(true),
                Err(e) => {
                    // retried on the next pass
                    for b in item.scope.bindings() {
                        b.dispose();
                    }
                    error.get_or_insert(e);
                }
            }
        }
        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn release(&self) {
        let mut s = self.0.borrow_mut();
        let s = &mut *s;
        let items = take(&mut s.items);
        if let (Some(setup), Some(buckets)) = (&s.setup, &mut s.buckets) {
            for item in &items {
                release_item(setup.id, buckets, item);
            }
            setup.start.remove();
            setup.end.replace_with(&setup.template);
            buckets.clear();
        }
    }
}

/// `(key, value)` pairs of a repeat source.
fn entries(value: &Value) -> Vec<(Value, Value)> {
    match value {
        Value::Object(o) if o.is_list() => o
            .values()
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.into(), v))
            .collect(),
        Value::Object(o) => o
            .entries()
            .into_iter()
            .map(|(k, v)| (Value::from(k), v))
            .collect(),
        Value::Number(n) if n.is_finite() && *n > 0.0 => {
            (0..n.ceil() as usize).map(|i| (i.into(), i.into())).collect()
        }
        _ => Vec::new(),
    }
}

fn refresh(
    expr: &RepeatExpr,
    model: &Object,
    index: usize,
    len: usize,
    key: &Value,
    value: &Value,
) {
    model.set("$first", index == 0);
    model.set("$last", index + 1 == len);
    model.set("$odd", index % 2 == 0);
    model.set(&expr.value_name, value.clone());
    if let Some(key_name) = &expr.key_name {
        model.set(key_name, key.clone());
    }
}

fn create_item(
    setup: &Setup,
    buckets: &mut Cache<String, Vec<Rc<ItemScope>>>,
    parent: &Rc<Scope>,
    index: usize,
    len: usize,
    key: Value,
    value: Value,
) -> Rc<ItemScope> {
    let model = Object::new_map();
    refresh(&setup.expr, &model, index, len, &key, &value);
    let slot = match &value {
        Value::Object(o) if o.tag(setup.id).is_none() => Slot::Tagged(o.clone()),
        Value::Object(_) => Slot::Untracked,
        _ => Slot::Bucket(value.to_key_string()),
    };
    let item = Rc::new(ItemScope {
        scope: Scope::with_parent(parent, model),
        root: setup.template.deep_clone(),
        checked: Cell::new(false),
        bound: Cell::new(false),
        slot,
    });
    match &item.slot {
        Slot::Tagged(o) => {
            let weak: Weak<ItemScope> = Rc::downgrade(&item);
            let weak: Weak<dyn Any> = weak;
            o.set_tag(setup.id, Some(weak));
        }
        Slot::Bucket(key) => match buckets.get_mut(key) {
            Some(bucket) => bucket.push(item.clone()),
            None => buckets.set(key.clone(), vec![item.clone()]),
        },
        Slot::Untracked => {}
    }
    item
}

fn release_item(
    id: u64,
    buckets: &mut Cache<String, Vec<Rc<ItemScope>>>,
    item: &Rc<ItemScope>,
) {
    match &item.slot {
        Slot::Tagged(o) => {
            let tagged = o.tag(id).and_then(|a| a.downcast::<ItemScope>().ok());
            if tagged.is_some_and(|t| Rc::ptr_eq(&t, item)) {
                o.set_tag(id, None);
            }
        }
        Slot::Bucket(key) => {
            let is_empty = match buckets.get_mut(key) {
                Some(bucket) => {
                    bucket.retain(|i| !Rc::ptr_eq(i, item));
                    bucket.is_empty()
                }
                None => false,
            };
            if is_empty {
                buckets.remove(key);
            }
        }
        Slot::Untracked => {}
    }
    item.root.set_disposed();
    item.scope.dispose();
    item.root.remove();
}

fn previous_live(node: &Node) -> Option<Node> {
    let mut prev = node.previous_sibling();
    while let Some(p) = &prev {
        if !p.is_disposed() {
            break;
        }
        prev = p.previous_sibling();
    }
    prev
}

use std::{
    cell::{Cell, RefCell},
    mem::{replace, take},
    rc::{Rc, Weak},
};

use crate::{
    core::{BindSink, SourceBindings, TrackContext},
    expr::Getter,
    scheduler::{FlushKey, Scheduler},
    Result, Scope, Value,
};

pub(crate) type Callback = Rc<RefCell<dyn FnMut(&Value, &Value) -> Result<()>>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct WatchKey {
    expr: String,
    deep: bool,
    interpolate: bool,
}

impl WatchKey {
    pub fn new(expr: &str, deep: bool, interpolate: bool) -> Self {
        Self {
            expr: expr.to_owned(),
            deep,
            interpolate,
        }
    }
}

fn next_flush_key() -> FlushKey {
    thread_local! {
        static NEXT: Cell<u64> = const { Cell::new(0) };
    }
    NEXT.with(|n| {
        let id = n.get();
        n.set(id + 1);
        FlushKey(id)
    })
}

/// Shared observer of one expression on one scope.
pub(crate) struct Watcher {
    this: Weak<Self>,
    flush_key: FlushKey,
    key: WatchKey,
    scope: Weak<Scope>,
    getter: Getter,
    scheduler: Rc<dyn Scheduler>,
    data: RefCell<WatcherData>,
}

struct WatcherData {
    value: Value,
    sources: SourceBindings,
    pending: bool,
    torn_down: bool,
    subscribers: Vec<(usize, Callback)>,
    next_id: usize,
}

impl Watcher {
    pub fn new(scope: &Rc<Scope>, key: WatchKey, getter: Getter) -> Rc<Self> {
        let watcher = Rc::new_cyclic(|this| Self {
            this: this.clone(),
            flush_key: next_flush_key(),
            key,
            scope: Rc::downgrade(scope),
            getter,
            scheduler: scope.runtime().scheduler().clone(),
            data: RefCell::new(WatcherData {
                value: Value::Undefined,
                sources: SourceBindings::new(),
                pending: false,
                torn_down: false,
                subscribers: Vec::new(),
                next_id: 0,
            }),
        });
        let value = watcher.evaluate();
        watcher.data.borrow_mut().value = value;
        tracing::trace!(expr = %watcher.key.expr, key = %watcher.flush_key, "watcher created");
        watcher
    }

    pub fn key(&self) -> &WatchKey {
        &self.key
    }
    pub fn value(&self) -> Value {
        self.data.borrow().value.clone()
    }

    fn evaluate(&self) -> Value {
        let Some(scope) = self.scope.upgrade() else {
            return Value::Undefined;
        };
        let mut cx = TrackContext::new();
        let value = self.getter.evaluate(&scope, &mut cx);
        if self.key.deep {
            value.track_deep(&mut cx);
        }
        let sink: Weak<dyn BindSink> = self.this.clone();
        self.data
            .borrow_mut()
            .sources
            .update(&sink, cx.into_sources());
        value
    }

    pub fn subscribe(&self, callback: Callback) -> usize {
        let mut d = self.data.borrow_mut();
        let id = d.next_id;
        d.next_id += 1;
        d.subscribers.push((id, callback));
        id
    }

    /// Removes a subscriber. The last one to leave tears the watcher down.
    pub fn unsubscribe(self: &Rc<Self>, id: usize) {
        let is_empty = {
            let mut d = self.data.borrow_mut();
            d.subscribers.retain(|(i, _)| *i != id);
            d.subscribers.is_empty()
        };
        if is_empty {
            if let Some(scope) = self.scope.upgrade() {
                scope.remove_watcher(self);
            }
            self.teardown();
        }
    }
    fn has_subscriber(&self, id: usize) -> bool {
        self.data.borrow().subscribers.iter().any(|(i, _)| *i == id)
    }

    pub fn teardown(&self) {
        let (sources, subscribers) = {
            let mut d = self.data.borrow_mut();
            d.torn_down = true;
            (take(&mut d.sources), take(&mut d.subscribers))
        };
        drop(sources);
        drop(subscribers);
        tracing::trace!(expr = %self.key.expr, "watcher torn down");
    }

    fn flush(&self) -> Result<()> {
        {
            let mut d = self.data.borrow_mut();
            d.pending = false;
            if d.torn_down {
                return Ok(());
            }
        }
        let value = self.evaluate();
        let (old, subscribers) = {
            let mut d = self.data.borrow_mut();
            if !self.key.deep && !value.is_object() && value.same(&d.value) {
                return Ok(());
            }
            let old = replace(&mut d.value, value.clone());
            (old, d.subscribers.clone())
        };
        for (id, callback) in subscribers {
            if self.has_subscriber(id) {
                (&mut *callback.borrow_mut())(&value, &old)?;
            }
        }
        Ok(())
    }
}

impl BindSink for Watcher {
    fn notify(self: Rc<Self>) {
        {
            let mut d = self.data.borrow_mut();
            if d.pending || d.torn_down {
                return;
            }
            d.pending = true;
        }
        let this = Rc::downgrade(&self);
        self.scheduler.schedule_once(
            self.flush_key,
            Box::new(move || match this.upgrade() {
                Some(watcher) => watcher.flush(),
                None => Ok(()),
            }),
        );
    }
}

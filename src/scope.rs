use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet},
    fmt,
    mem::take,
    rc::{Rc, Weak},
};

use crate::{
    binding::Binding,
    core::TrackContext,
    value::{Key, Object, Value},
    Error, Result, Runtime, Subscription,
};

use self::watcher::{WatchKey, Watcher};

mod watcher;


/// Function callable from a template by name.
pub type Handler = Rc<dyn Fn(&Rc<Scope>, &[Value]) -> Result<Value>>;

/// How [`Scope::watch`] observes an expression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WatchOptions {
    /// Also observe every object reachable from the value.
    pub deep: bool,

    /// Parse the expression as text with `{{ }}` interpolation.
    pub interpolate: bool,

    /// Deliver `(current, undefined)` to the callback before returning.
    pub immediate: bool,
}

impl WatchOptions {
    pub fn deep() -> Self {
        Self {
            deep: true,
            ..Self::default()
        }
    }
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }
}

/// Observable model that expressions are evaluated against.
///
/// A child scope sees the names its parent could see at creation time and does not own itself.
/// Reading such a name reads the parent, and assigning it writes the parent.
pub struct Scope {
    runtime: Rc<Runtime>,
    model: Object,
    parent: Option<Weak<Scope>>,
    proxied: HashSet<String>,
    watchers: RefCell<HashMap<WatchKey, Rc<Watcher>>>,
    bindings: RefCell<Vec<Rc<Binding>>>,
    handlers: RefCell<HashMap<String, Handler>>,
    disposed: Cell<bool>,
}

impl Scope {
    pub fn new(runtime: &Rc<Runtime>, model: Object) -> Rc<Self> {
        Rc::new(Self {
            runtime: runtime.clone(),
            model,
            parent: None,
            proxied: HashSet::new(),
            watchers: RefCell::new(HashMap::new()),
            bindings: RefCell::new(Vec::new()),
            handlers: RefCell::new(HashMap::new()),
            disposed: Cell::new(false),
        })
    }

    /// Creates a child scope whose own properties are the entries of `model`.
    pub fn with_parent(parent: &Rc<Scope>, model: Object) -> Rc<Self> {
        let proxied = parent
            .visible_names()
            .into_iter()
            .filter(|name| !model.contains(name))
            .collect();
        Rc::new(Self {
            runtime: parent.runtime.clone(),
            model,
            parent: Some(Rc::downgrade(parent)),
            proxied,
            watchers: RefCell::new(HashMap::new()),
            bindings: RefCell::new(Vec::new()),
            handlers: RefCell::new(HashMap::new()),
            disposed: Cell::new(false),
        })
    }

    pub fn runtime(&self) -> &Rc<Runtime> {
        &self.runtime
    }
    pub fn model(&self) -> &Object {
        &self.model
    }
    pub fn parent(&self) -> Option<Rc<Scope>> {
        self.parent.as_ref()?.upgrade()
    }
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Names readable from this scope: its own properties followed by the proxied ones.
    pub fn visible_names(&self) -> Vec<String> {
        let mut names = self.model.keys();
        let mut proxied: Vec<_> = self
            .proxied
            .iter()
            .filter(|name| !self.model.contains(name))
            .cloned()
            .collect();
        proxied.sort();
        names.extend(proxied);
        names
    }
    pub fn is_proxied(&self, name: &str) -> bool {
        self.proxied.contains(name) && !self.model.contains(name)
    }

    /// Reads a name without recording a dependency.
    pub fn get(&self, name: &str) -> Value {
        self.lookup(name, &mut TrackContext::untracked())
    }

    /// Assigns a name, following the same ownership rule as [`set_value`](Self::set_value).
    pub fn set(&self, name: &str, value: impl Into<Value>) {
        self.assign(name, value.into());
    }

    /// Reads a name and records the objects the read depends on.
    ///
    /// The own model is always recorded, so that a name assigned later on this scope is observed
    /// even while the read falls through to the parent.
    pub fn lookup(&self, name: &str, cx: &mut TrackContext) -> Value {
        cx.track(&self.model);
        if self.model.contains(name) {
            return self.model.get(name);
        }
        if self.proxied.contains(name) {
            if let Some(parent) = self.parent() {
                return parent.lookup(name, cx);
            }
        }
        Value::Undefined
    }

    fn assign(&self, name: &str, value: Value) {
        if !self.is_proxied(name) {
            self.model.set(name, value);
            return;
        }
        match self.parent() {
            Some(parent) => parent.assign(name, value),
            None => self.model.set(name, value),
        }
    }

    /// Evaluates an expression once without watching it.
    pub fn eval(&self, expr: &str, is_interpolate: bool) -> Result<Value> {
        let getter = self.runtime.evaluator().parse_getter(expr, is_interpolate)?;
        Ok(getter.evaluate(self, &mut TrackContext::untracked()))
    }

    /// Assigns `value` to the location `expr` refers to.
    ///
    /// Assigning through a value that is not an object has no effect.
    pub fn set_value(&self, expr: &str, value: impl Into<Value>) -> Result<()> {
        let path = self.runtime.evaluator().parse_setter(expr)?;
        let value = value.into();
        let Some((last, init)) = path.members().split_last() else {
            self.assign(path.root(), value);
            return Ok(());
        };
        let mut target = self.get(path.root());
        for key in init {
            target = match &target {
                Value::Object(o) => o.get_key(key),
                _ => Value::Undefined,
            };
        }
        match (&target, last) {
            (Value::Object(o), Key::Name(name)) => o.set(name, value),
            (Value::Object(o), Key::Index(index)) if o.is_list() => o.set_index(*index, value),
            (Value::Object(o), Key::Index(index)) => o.set(&index.to_string(), value),
            _ => tracing::debug!(expr, "assignment target is not an object"),
        }
        Ok(())
    }

    /// Observes an expression.
    ///
    /// Watchers are shared per expression: subscribing to an expression that is already watched
    /// adds a subscriber to the existing watcher. Changes are delivered through the runtime's
    /// scheduler as `(new, old)`, once per frame however many writes the frame contains.
    pub fn watch(
        self: &Rc<Self>,
        expr: &str,
        options: WatchOptions,
        callback: impl FnMut(&Value, &Value) -> Result<()> + 'static,
    ) -> Result<Subscription> {
        let key = WatchKey::new(expr, options.deep, options.interpolate);
        let cached = self.watchers.borrow().get(&key).cloned();
        let watcher = match cached {
            Some(watcher) => watcher,
            None => {
                let getter = self
                    .runtime
                    .evaluator()
                    .parse_getter(expr, options.interpolate)?;
                let watcher = Watcher::new(self, key.clone(), getter);
                self.watchers.borrow_mut().insert(key, watcher.clone());
                watcher
            }
        };
        let callback: watcher::Callback = Rc::new(RefCell::new(callback));
        let id = watcher.subscribe(callback.clone());
        let s = Subscription::from_weak_fn(Rc::downgrade(&watcher), move |watcher: Rc<Watcher>| {
            watcher.unsubscribe(id)
        });
        if options.immediate {
            let value = watcher.value();
            (&mut *callback.borrow_mut())(&value, &Value::Undefined)?;
        }
        Ok(s)
    }

    pub fn has_watcher(&self, expr: &str, deep: bool) -> bool {
        let watchers = self.watchers.borrow();
        [false, true]
            .iter()
            .any(|&interpolate| watchers.contains_key(&WatchKey::new(expr, deep, interpolate)))
    }
    pub fn watcher_count(&self) -> usize {
        self.watchers.borrow().len()
    }
    fn remove_watcher(&self, watcher: &Rc<Watcher>) {
        let mut watchers = self.watchers.borrow_mut();
        if watchers
            .get(watcher.key())
            .is_some_and(|w| Rc::ptr_eq(w, watcher))
        {
            watchers.remove(watcher.key());
        }
    }

    pub fn bindings(&self) -> Vec<Rc<Binding>> {
        self.bindings.borrow().clone()
    }
    pub(crate) fn add_binding(&self, binding: Rc<Binding>) {
        self.bindings.borrow_mut().push(binding);
    }
    pub(crate) fn remove_binding(&self, binding: &Binding) {
        self.bindings
            .borrow_mut()
            .retain(|b| !std::ptr::eq(Rc::as_ptr(b), binding));
    }

    /// Defines a handler visible to this scope and its descendants.
    pub fn define_handler(
        &self,
        name: &str,
        f: impl Fn(&Rc<Scope>, &[Value]) -> Result<Value> + 'static,
    ) {
        self.handlers.borrow_mut().insert(name.to_owned(), Rc::new(f));
    }

    /// Finds a handler on this scope, its ancestors, then the runtime's globals.
    ///
    /// The handler runs with the scope it was found on, or with this scope for a global.
    pub fn handler(self: &Rc<Self>, name: &str) -> Result<BoundHandler> {
        let mut scope = Some(self.clone());
        while let Some(s) = scope {
            let handler = s.handlers.borrow().get(name).cloned();
            if let Some(handler) = handler {
                return Ok(BoundHandler { scope: s, handler });
            }
            scope = s.parent();
        }
        match self.runtime.global(name) {
            Some(handler) => Ok(BoundHandler {
                scope: self.clone(),
                handler,
            }),
            None => Err(Error::MissingHandler(name.to_owned())),
        }
    }

    /// Disposes every binding created on this scope and tears down its watchers.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let bindings = take(&mut *self.bindings.borrow_mut());
        for binding in bindings {
            binding.dispose();
        }
        let watchers = take(&mut *self.watchers.borrow_mut());
        for watcher in watchers.values() {
            watcher.teardown();
        }
        self.handlers.borrow_mut().clear();
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("model", &self.model)
            .field("proxied", &self.proxied)
            .field("disposed", &self.disposed.get())
            .finish_non_exhaustive()
    }
}

/// Handler resolved by [`Scope::handler`] together with the scope it runs with.
#[derive(Clone)]
pub struct BoundHandler {
    scope: Rc<Scope>,
    handler: Handler,
}

impl BoundHandler {
    pub fn scope(&self) -> &Rc<Scope> {
        &self.scope
    }
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.handler)(&self.scope, args)
    }
}

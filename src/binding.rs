use std::{
    any::Any,
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use crate::{core::TrackContext, dom::Node, scope::WatchOptions, Result, Scope, Subscription, Value};

pub use self::registry::{Registry, TerminalBinding};

mod registry;

#[cfg(test)]
mod tests;

/// Well-known binding priorities. Higher priority bindings are compiled first.
pub mod priority {
    pub const LOW: i32 = -100;
    pub const BELOW_NORMAL: i32 = -50;
    pub const NORMAL: i32 = 0;
    pub const ABOVE_NORMAL: i32 = 50;
    pub const HIGH: i32 = 100;
}

pub type InitHook = Box<dyn FnMut(&Binding, Option<&Rc<Scope>>, Option<&Node>) -> Result<()>>;
pub type UpdateHook = Box<dyn FnMut(&Binding, &Value, &Value) -> Result<()>>;
pub type ReleaseHook = Box<dyn FnMut(&Binding)>;

/// Lifecycle hooks of one binding instance.
///
/// A definition creates a fresh set per binding, so hooks can own per-instance state.
#[derive(Default)]
pub struct BindingHooks {
    pub init: Option<InitHook>,
    pub update: Option<UpdateHook>,
    pub release: Option<ReleaseHook>,

    /// State shared between the hooks and [`Binding::state`].
    pub state: Option<Rc<dyn Any>>,
}

impl BindingHooks {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn on_init(
        mut self,
        f: impl FnMut(&Binding, Option<&Rc<Scope>>, Option<&Node>) -> Result<()> + 'static,
    ) -> Self {
        self.init = Some(Box::new(f));
        self
    }
    pub fn on_update(
        mut self,
        f: impl FnMut(&Binding, &Value, &Value) -> Result<()> + 'static,
    ) -> Self {
        self.update = Some(Box::new(f));
        self
    }
    pub fn on_release(mut self, f: impl FnMut(&Binding) + 'static) -> Self {
        self.release = Some(Box::new(f));
        self
    }
    pub fn with_state(mut self, state: Rc<dyn Any>) -> Self {
        self.state = Some(state);
        self
    }
}

/// Named recipe for creating bindings.
#[derive(Clone)]
pub struct BindingDefinition {
    pub priority: i32,

    /// A terminal binding takes over its element: the element's other attributes and its
    /// descendants are not compiled by the enclosing template.
    pub is_terminal: bool,

    /// Watch the expression deeply, so that nested changes are delivered.
    pub is_deep_watch: bool,

    /// Keep the binding attribute on the element after compilation.
    pub retain_attribute: bool,

    hooks: Rc<dyn Fn() -> BindingHooks>,
}

impl BindingDefinition {
    pub fn new(hooks: impl Fn() -> BindingHooks + 'static) -> Self {
        Self {
            priority: priority::NORMAL,
            is_terminal: false,
            is_deep_watch: false,
            retain_attribute: false,
            hooks: Rc::new(hooks),
        }
    }

    /// Definition whose only hook is `update`.
    pub fn from_update(f: impl Fn(&Binding, &Value, &Value) -> Result<()> + Clone + 'static) -> Self {
        Self::new(move || BindingHooks::new().on_update(f.clone()))
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
    pub fn terminal(mut self) -> Self {
        self.is_terminal = true;
        self
    }
    pub fn deep_watch(mut self) -> Self {
        self.is_deep_watch = true;
        self
    }
    pub fn retain_attribute(mut self) -> Self {
        self.retain_attribute = true;
        self
    }

    pub(crate) fn hooks(&self) -> BindingHooks {
        (self.hooks)()
    }
}

impl fmt::Debug for BindingDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingDefinition")
            .field("priority", &self.priority)
            .field("is_terminal", &self.is_terminal)
            .field("is_deep_watch", &self.is_deep_watch)
            .field("retain_attribute", &self.retain_attribute)
            .finish_non_exhaustive()
    }
}

/// Everything needed to create one binding.
#[derive(Debug, Clone)]
pub struct BindingDescriptor {
    pub name: String,
    pub definition: BindingDefinition,
    pub expression: String,
    pub is_interpolate: bool,
}

struct BindingCore {
    scope: Option<Rc<Scope>>,
    target: Option<Node>,
    expression: Option<String>,
    unwatch: Option<Subscription>,
}

/// Live connection between an expression on a scope and a target node.
pub struct Binding {
    id: u64,
    name: String,
    is_deep_watch: bool,
    is_interpolate: bool,
    core: RefCell<BindingCore>,
    active: Cell<bool>,
    // value of the pending locked write
    locked: RefCell<Option<Value>>,
    hooks: RefCell<BindingHooks>,
    state: Option<Rc<dyn Any>>,
}

fn next_binding_id() -> u64 {
    thread_local! {
        static NEXT: Cell<u64> = const { Cell::new(0) };
    }
    NEXT.with(|n| {
        let id = n.get();
        n.set(id + 1);
        id
    })
}

impl Binding {
    pub(crate) fn new(
        scope: &Rc<Scope>,
        target: &Node,
        descriptor: &BindingDescriptor,
    ) -> Rc<Self> {
        let mut hooks = descriptor.definition.hooks();
        let state = hooks.state.take();
        Rc::new(Self {
            id: next_binding_id(),
            name: descriptor.name.clone(),
            is_deep_watch: descriptor.definition.is_deep_watch,
            is_interpolate: descriptor.is_interpolate,
            core: RefCell::new(BindingCore {
                scope: Some(scope.clone()),
                target: Some(target.clone()),
                expression: Some(descriptor.expression.clone()),
                unwatch: None,
            }),
            active: Cell::new(false),
            locked: RefCell::new(None),
            hooks: RefCell::new(hooks),
            state,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn is_active(&self) -> bool {
        self.active.get()
    }
    pub fn is_locked(&self) -> bool {
        self.locked.borrow().is_some()
    }
    pub fn is_interpolate(&self) -> bool {
        self.is_interpolate
    }

    /// `None` once the binding is disposed.
    pub fn scope(&self) -> Option<Rc<Scope>> {
        self.core.borrow().scope.clone()
    }
    pub fn target(&self) -> Option<Node> {
        self.core.borrow().target.clone()
    }
    pub fn expression(&self) -> Option<String> {
        self.core.borrow().expression.clone()
    }

    /// Replaces the expression to watch. Only meaningful from the `init` hook.
    pub fn set_expression(&self, expression: &str) {
        self.core.borrow_mut().expression = Some(expression.to_owned());
    }

    /// State created by the definition's hooks.
    pub fn state<T: 'static>(&self) -> Option<&T> {
        self.state.as_deref()?.downcast_ref()
    }

    /// Runs `init`, then starts watching the expression if the binding has an `update` hook.
    ///
    /// A static expression is delivered once to `update` and never watched.
    pub fn initialize(
        self: &Rc<Self>,
        parent: Option<&Rc<Scope>>,
        anchor: Option<&Node>,
    ) -> Result<()> {
        if let Some(init) = &mut self.hooks.borrow_mut().init {
            init(&**self, parent, anchor)?;
        }
        self.active.set(true);
        if self.hooks.borrow().update.is_none() {
            return Ok(());
        }
        let (Some(scope), Some(expression)) = (self.scope(), self.expression()) else {
            return Ok(());
        };

        let getter = scope
            .runtime()
            .evaluator()
            .parse_getter(&expression, self.is_interpolate)?;
        if !getter.is_dynamic() {
            let value = getter.evaluate(&scope, &mut TrackContext::untracked());
            return self.update(&value, &Value::Undefined);
        }

        let this = Rc::downgrade(self);
        let options = WatchOptions {
            deep: self.is_deep_watch,
            interpolate: self.is_interpolate,
            immediate: true,
        };
        let unwatch = scope.watch(&expression, options, move |new, old| {
            let Some(this) = this.upgrade() else {
                return Ok(());
            };
            if !this.is_active() {
                return Ok(());
            }
            let locked = this.locked.take();
            if locked.is_some_and(|v| v.same(new)) {
                return Ok(());
            }
            this.update(new, old)
        })?;
        if self.is_active() {
            self.core.borrow_mut().unwatch = Some(unwatch);
        }
        Ok(())
    }

    fn update(&self, new: &Value, old: &Value) -> Result<()> {
        if let Some(update) = &mut self.hooks.borrow_mut().update {
            update(self, new, old)?;
        }
        Ok(())
    }

    /// Writes a value back through the expression.
    ///
    /// With `is_locked`, the change this write causes is not delivered back to this binding.
    /// The lock is released by the next delivery. If that delivery carries a different value, it
    /// still reaches `update`. Any later write replaces the lock.
    pub fn set_value(&self, value: impl Into<Value>, is_locked: bool) -> Result<()> {
        let (Some(scope), Some(expression)) = (self.scope(), self.expression()) else {
            return Ok(());
        };
        let value = value.into();
        let lock = is_locked && !scope.eval(&expression, self.is_interpolate)?.same(&value);
        *self.locked.borrow_mut() = lock.then(|| value.clone());
        scope.set_value(&expression, value)
    }

    /// Stops the binding and runs `release`. Calling it again has no effect.
    pub fn dispose(&self) {
        if !self.active.replace(false) && self.scope().is_none() {
            return;
        }
        if let Some(release) = &mut self.hooks.borrow_mut().release {
            release(self);
        }
        let core = {
            let mut core = self.core.borrow_mut();
            BindingCore {
                scope: core.scope.take(),
                target: core.target.take(),
                expression: core.expression.take(),
                unwatch: core.unwatch.take(),
            }
        };
        drop(core.unwatch);
        if let Some(scope) = &core.scope {
            scope.remove_binding(self);
            if let Some(target) = &core.target {
                scope.runtime().registry().remove_element_binding(target, self);
            }
        }
        tracing::trace!(name = %self.name, id = self.id, "binding disposed");
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("expression", &self.expression())
            .field("active", &self.active.get())
            .finish_non_exhaustive()
    }
}

pub(crate) fn weak_eq(weak: &Weak<Binding>, binding: &Binding) -> bool {
    std::ptr::eq(weak.as_ptr(), binding)
}

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::{
    binding::Registry,
    bindings,
    dom::Node,
    expr::{Evaluator, PathEvaluator},
    scheduler::Scheduler,
    scope::Handler,
    template, Config, Result, Scope, Value,
};

/// Process-scoped state of the binding engine.
///
/// Owns the binding registry and the collaborators every scope and binding created from it
/// shares. Independent runtimes do not observe each other.
pub struct Runtime {
    config: Config,
    registry: Registry,
    scheduler: Rc<dyn Scheduler>,
    evaluator: Rc<dyn Evaluator>,
    globals: RefCell<HashMap<String, Handler>>,
}

impl Runtime {
    /// Creates a runtime with the default configuration and the built-in `repeat` binding.
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Rc<Self> {
        Self::from_parts(Config::default(), scheduler, Rc::new(PathEvaluator::new()))
    }
    pub fn builder(scheduler: Rc<dyn Scheduler>) -> RuntimeBuilder {
        RuntimeBuilder {
            config: Config::default(),
            scheduler,
            evaluator: None,
        }
    }

    fn from_parts(
        config: Config,
        scheduler: Rc<dyn Scheduler>,
        evaluator: Rc<dyn Evaluator>,
    ) -> Rc<Self> {
        let rt = Rc::new(Self {
            config,
            registry: Registry::new(),
            scheduler,
            evaluator,
            globals: RefCell::new(HashMap::new()),
        });
        rt.registry.define("repeat", bindings::repeat::definition());
        rt
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
    pub fn scheduler(&self) -> &Rc<dyn Scheduler> {
        &self.scheduler
    }
    pub fn evaluator(&self) -> &Rc<dyn Evaluator> {
        &self.evaluator
    }

    /// Registers a handler found by [`Scope::handler`] when no scope on the chain defines `name`.
    pub fn define_global(
        &self,
        name: &str,
        f: impl Fn(&Rc<Scope>, &[Value]) -> Result<Value> + 'static,
    ) {
        self.globals.borrow_mut().insert(name.to_owned(), Rc::new(f));
    }
    pub(crate) fn global(&self, name: &str) -> Option<Handler> {
        self.globals.borrow().get(name).cloned()
    }

    /// Compiles `node` and binds it to `scope` in place.
    pub fn mount(self: &Rc<Self>, scope: &Rc<Scope>, node: &Node) -> Result<()> {
        let executor = template::compile(self, node)?;
        executor(scope, node, None, None)
    }
}

pub struct RuntimeBuilder {
    config: Config,
    scheduler: Rc<dyn Scheduler>,
    evaluator: Option<Rc<dyn Evaluator>>,
}

impl RuntimeBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }
    pub fn evaluator(mut self, evaluator: Rc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Fails with [`Error::Configuration`](crate::Error::Configuration) if the configuration is invalid.
    pub fn build(self) -> Result<Rc<Runtime>> {
        self.config.validate()?;
        let evaluator = self
            .evaluator
            .unwrap_or_else(|| Rc::new(PathEvaluator::new()));
        Ok(Runtime::from_parts(self.config, self.scheduler, evaluator))
    }
}

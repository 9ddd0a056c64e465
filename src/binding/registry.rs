use std::{
    cell::RefCell,
    collections::HashMap,
    rc::{Rc, Weak},
};

use crate::{
    binding::{weak_eq, Binding, BindingDefinition, BindingDescriptor},
    dom::{Node, NodeId},
    Result, Scope,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalBinding {
    pub name: String,
    pub priority: i32,
}

/// Binding definitions by name, and the live bindings of each element.
#[derive(Default)]
pub struct Registry {
    definitions: RefCell<HashMap<String, BindingDefinition>>,
    terminals: RefCell<Vec<TerminalBinding>>,
    element_bindings: RefCell<HashMap<NodeId, Vec<Weak<Binding>>>>,
    element_scopes: RefCell<HashMap<NodeId, Weak<Scope>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition. A later definition with the same name replaces the earlier one.
    pub fn define(&self, name: &str, definition: BindingDefinition) {
        let mut terminals = self.terminals.borrow_mut();
        match (
            terminals.iter().position(|t| t.name == name),
            definition.is_terminal,
        ) {
            (Some(i), true) => terminals[i].priority = definition.priority,
            (Some(i), false) => {
                terminals.remove(i);
            }
            (None, true) => terminals.push(TerminalBinding {
                name: name.to_owned(),
                priority: definition.priority,
            }),
            (None, false) => {}
        }
        terminals.sort_by(|a, b| b.priority.cmp(&a.priority));
        let old = self
            .definitions
            .borrow_mut()
            .insert(name.to_owned(), definition);
        if old.is_some() {
            tracing::warn!(name, "binding redefined");
        }
    }
    pub fn definition(&self, name: &str) -> Option<BindingDefinition> {
        self.definitions.borrow().get(name).cloned()
    }

    /// Terminal definitions, highest priority first. Equal priorities keep registration order.
    pub fn terminal_bindings(&self) -> Vec<TerminalBinding> {
        self.terminals.borrow().clone()
    }

    /// Creates a binding, attaches it to `scope` and `target`, and initializes it.
    pub fn create(
        &self,
        scope: &Rc<Scope>,
        target: &Node,
        descriptor: &BindingDescriptor,
        parent: Option<&Rc<Scope>>,
        anchor: Option<&Node>,
    ) -> Result<Rc<Binding>> {
        let binding = Binding::new(scope, target, descriptor);
        scope.add_binding(binding.clone());
        self.element_bindings
            .borrow_mut()
            .entry(target.id())
            .or_default()
            .push(Rc::downgrade(&binding));
        self.element_scopes
            .borrow_mut()
            .insert(target.id(), Rc::downgrade(scope));
        tracing::trace!(
            name = %descriptor.name,
            expression = %descriptor.expression,
            "create binding"
        );
        if let Err(e) = binding.initialize(parent, anchor) {
            binding.dispose();
            return Err(e);
        }
        Ok(binding)
    }

    /// Live bindings of an element.
    pub fn bindings_of(&self, node: &Node) -> Vec<Rc<Binding>> {
        self.element_bindings
            .borrow()
            .get(&node.id())
            .map(|bs| bs.iter().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }

    /// Scope an element was last bound to, while it has live bindings.
    pub fn scope_of(&self, node: &Node) -> Option<Rc<Scope>> {
        self.element_scopes.borrow().get(&node.id())?.upgrade()
    }

    pub(crate) fn remove_element_binding(&self, node: &Node, binding: &Binding) {
        let mut element_bindings = self.element_bindings.borrow_mut();
        let Some(bs) = element_bindings.get_mut(&node.id()) else {
            return;
        };
        bs.retain(|b| !weak_eq(b, binding) && b.strong_count() > 0);
        if bs.is_empty() {
            element_bindings.remove(&node.id());
            self.element_scopes.borrow_mut().remove(&node.id());
        }
    }
}

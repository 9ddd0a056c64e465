//! Compiles a node subtree into a reusable executor that binds copies of it.

use std::rc::Rc;

use crate::{
    binding::BindingDescriptor,
    dom::{Node, NodeKind},
    Result, Runtime, Scope,
};

#[cfg(test)]
mod tests;

/// Binds a tree that has the template's shape: `(scope, root, parent, anchor)`.
pub type Executor = Rc<dyn Fn(&Rc<Scope>, &Node, Option<&Rc<Scope>>, Option<&Node>) -> Result<()>>;

/// Name of the definition used for `{{ }}` in text nodes.
pub const INTERPOLATION_BINDING: &str = "bind";

struct PlanEntry {
    path: Vec<usize>,
    descriptors: Vec<BindingDescriptor>,
}

/// Compiles `template`.
///
/// Binding attributes are removed from `template` unless their definition retains them, so
/// copies made from it afterwards carry only plain attributes.
pub fn compile(runtime: &Runtime, template: &Node) -> Result<Executor> {
    let mut plan = Vec::new();
    compile_node(runtime, template, &mut Vec::new(), &mut plan)?;
    tracing::trace!(entries = plan.len(), "template compiled");
    Ok(Rc::new(
        move |scope: &Rc<Scope>,
              root: &Node,
              parent: Option<&Rc<Scope>>,
              anchor: Option<&Node>|
              -> Result<()> {
            let mut targets = Vec::with_capacity(plan.len());
            for entry in &plan {
                match resolve(root, &entry.path) {
                    Some(node) => targets.push((node, &entry.descriptors)),
                    None => tracing::warn!(path = ?entry.path, "template node not found"),
                }
            }
            let registry = scope.runtime().registry();
            for (node, descriptors) in targets {
                for d in descriptors {
                    registry.create(scope, &node, d, parent, anchor)?;
                }
            }
            Ok(())
        },
    ))
}

fn resolve(root: &Node, path: &[usize]) -> Option<Node> {
    let mut node = root.clone();
    for &index in path {
        node = node.child(index)?;
    }
    Some(node)
}

fn compile_node(
    runtime: &Runtime,
    node: &Node,
    path: &mut Vec<usize>,
    plan: &mut Vec<PlanEntry>,
) -> Result<()> {
    let registry = runtime.registry();
    let prefix = &runtime.config().prefix;
    match node.kind() {
        NodeKind::Element(_) => {
            for terminal in registry.terminal_bindings() {
                let attr = format!("{prefix}{}", terminal.name);
                let Some(expression) = node.attribute(&attr) else {
                    continue;
                };
                let Some(definition) = registry.definition(&terminal.name) else {
                    continue;
                };
                if !definition.retain_attribute {
                    node.remove_attribute(&attr);
                }
                plan.push(PlanEntry {
                    path: path.clone(),
                    descriptors: vec![BindingDescriptor {
                        name: terminal.name,
                        definition,
                        expression,
                        is_interpolate: false,
                    }],
                });
                return Ok(());
            }

            let mut descriptors = Vec::new();
            for (attr, expression) in node.attributes() {
                let Some(name) = attr.strip_prefix(prefix.as_str()) else {
                    continue;
                };
                let Some(definition) = registry.definition(name) else {
                    tracing::debug!(attr = %attr, "no binding named by attribute");
                    continue;
                };
                if definition.is_terminal {
                    continue;
                }
                if !definition.retain_attribute {
                    node.remove_attribute(&attr);
                }
                descriptors.push(BindingDescriptor {
                    name: name.to_owned(),
                    definition,
                    expression,
                    is_interpolate: false,
                });
            }
            descriptors.sort_by(|a, b| b.definition.priority.cmp(&a.definition.priority));
            if !descriptors.is_empty() {
                plan.push(PlanEntry {
                    path: path.clone(),
                    descriptors,
                });
            }

            for (index, child) in node.children().iter().enumerate() {
                path.push(index);
                compile_node(runtime, child, path, plan)?;
                path.pop();
            }
        }
        NodeKind::Text => {
            let text = node.text_content();
            if !text.contains("{{") {
                return Ok(());
            }
            if let Some(definition) = registry.definition(INTERPOLATION_BINDING) {
                runtime.evaluator().parse_getter(&text, true)?;
                plan.push(PlanEntry {
                    path: path.clone(),
                    descriptors: vec![BindingDescriptor {
                        name: INTERPOLATION_BINDING.to_owned(),
                        definition,
                        expression: text,
                        is_interpolate: true,
                    }],
                });
            }
        }
        NodeKind::Comment => {}
    }
    Ok(())
}

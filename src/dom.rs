//! Minimal document tree that templates are compiled from and bound into.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use indexmap::IndexMap;

#[cfg(test)]
mod tests;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        thread_local! {
            static NEXT: Cell<u64> = const { Cell::new(0) };
        }
        NEXT.with(|n| {
            let id = n.get();
            n.set(id + 1);
            NodeId(id)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element(String),
    Text,
    Comment,
}

struct NodeData {
    id: NodeId,
    kind: NodeKind,
    attrs: RefCell<IndexMap<String, String>>,
    text: RefCell<String>,
    parent: RefCell<Weak<NodeData>>,
    children: RefCell<Vec<Node>>,
    disposed: Cell<bool>,
}

/// Shared handle to a tree node. Two handles are equal if they refer to the same node.
#[derive(Clone)]
pub struct Node(Rc<NodeData>);

impl Node {
    fn with_kind(kind: NodeKind, text: &str) -> Self {
        Node(Rc::new(NodeData {
            id: NodeId::next(),
            kind,
            attrs: RefCell::new(IndexMap::new()),
            text: RefCell::new(text.to_owned()),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            disposed: Cell::new(false),
        }))
    }
    pub fn element(tag: &str) -> Self {
        Self::with_kind(NodeKind::Element(tag.to_owned()), "")
    }
    pub fn text(text: &str) -> Self {
        Self::with_kind(NodeKind::Text, text)
    }
    pub fn comment(text: &str) -> Self {
        Self::with_kind(NodeKind::Comment, text)
    }

    /// Builder-style helper for constructing trees.
    pub fn with_attr(self, name: &str, value: &str) -> Self {
        self.set_attribute(name, value);
        self
    }
    pub fn with_child(self, child: Node) -> Self {
        self.append_child(&child);
        self
    }

    pub fn id(&self) -> NodeId {
        self.0.id
    }
    pub fn kind(&self) -> &NodeKind {
        &self.0.kind
    }
    pub fn is_element(&self) -> bool {
        matches!(self.0.kind, NodeKind::Element(_))
    }
    pub fn tag(&self) -> Option<&str> {
        match &self.0.kind {
            NodeKind::Element(tag) => Some(tag),
            _ => None,
        }
    }
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.0.attrs.borrow().get(name).cloned()
    }
    pub fn attributes(&self) -> Vec<(String, String)> {
        let attrs = self.0.attrs.borrow();
        attrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
    pub fn set_attribute(&self, name: &str, value: &str) {
        self.0
            .attrs
            .borrow_mut()
            .insert(name.to_owned(), value.to_owned());
    }
    pub fn remove_attribute(&self, name: &str) -> Option<String> {
        self.0.attrs.borrow_mut().shift_remove(name)
    }

    /// Text of a text or comment node.
    pub fn text_content(&self) -> String {
        self.0.text.borrow().clone()
    }
    pub fn set_text(&self, text: &str) {
        *self.0.text.borrow_mut() = text.to_owned();
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.parent.borrow().upgrade().map(Node)
    }
    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().clone()
    }
    pub fn child(&self, index: usize) -> Option<Node> {
        self.0.children.borrow().get(index).cloned()
    }
    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    fn index_in_parent(&self) -> Option<(Node, usize)> {
        let parent = self.parent()?;
        let index = parent
            .0
            .children
            .borrow()
            .iter()
            .position(|c| c.ptr_eq(self))?;
        Some((parent, index))
    }
    pub fn previous_sibling(&self) -> Option<Node> {
        let (parent, index) = self.index_in_parent()?;
        let prev = index.checked_sub(1)?;
        parent.child(prev)
    }
    pub fn next_sibling(&self) -> Option<Node> {
        let (parent, index) = self.index_in_parent()?;
        parent.child(index + 1)
    }

    /// Detaches this node from its parent. Does nothing if it has none.
    pub fn remove(&self) {
        if let Some((parent, index)) = self.index_in_parent() {
            parent.0.children.borrow_mut().remove(index);
        }
        *self.0.parent.borrow_mut() = Weak::new();
    }

    fn insert_child_at(&self, index: usize, child: &Node) {
        child.remove();
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.children.borrow_mut().insert(index, child.clone());
    }
    pub fn append_child(&self, child: &Node) {
        child.remove();
        let len = self.child_count();
        self.insert_child_at(len, child);
    }

    /// Moves `node` so that it directly precedes `self`. Does nothing if `self` has no parent.
    pub fn insert_before(&self, node: &Node) {
        if node.ptr_eq(self) {
            return;
        }
        node.remove();
        if let Some((parent, index)) = self.index_in_parent() {
            parent.insert_child_at(index, node);
        }
    }

    /// Moves `node` so that it directly follows `self`. Does nothing if `self` has no parent.
    pub fn insert_after(&self, node: &Node) {
        if node.ptr_eq(self) {
            return;
        }
        node.remove();
        if let Some((parent, index)) = self.index_in_parent() {
            parent.insert_child_at(index + 1, node);
        }
    }

    /// Puts `node` where `self` is and detaches `self`.
    pub fn replace_with(&self, node: &Node) {
        if node.ptr_eq(self) {
            return;
        }
        node.remove();
        if let Some((parent, index)) = self.index_in_parent() {
            parent.0.children.borrow_mut()[index] = node.clone();
            *node.0.parent.borrow_mut() = Rc::downgrade(&parent.0);
        }
        *self.0.parent.borrow_mut() = Weak::new();
    }

    /// Copies this node and its descendants. The copy is detached.
    pub fn deep_clone(&self) -> Node {
        let node = Node::with_kind(self.0.kind.clone(), &self.0.text.borrow());
        *node.0.attrs.borrow_mut() = self.0.attrs.borrow().clone();
        for child in self.children() {
            node.append_child(&child.deep_clone());
        }
        node
    }

    /// Marks the node as released by the binding that created it.
    pub fn set_disposed(&self) {
        self.0.disposed.set(true);
    }
    pub fn is_disposed(&self) -> bool {
        self.0.disposed.get()
    }

    /// Serializes the subtree. Attributes are written in insertion order without escaping.
    pub fn to_markup(&self) -> String {
        let mut s = String::new();
        self.write_markup(&mut s);
        s
    }
    fn write_markup(&self, s: &mut String) {
        match &self.0.kind {
            NodeKind::Element(tag) => {
                s.push('<');
                s.push_str(tag);
                for (name, value) in self.0.attrs.borrow().iter() {
                    s.push_str(&format!(" {name}=\"{value}\""));
                }
                s.push('>');
                for child in self.children() {
                    child.write_markup(s);
                }
                s.push_str(&format!("</{tag}>"));
            }
            NodeKind::Text => s.push_str(&self.0.text.borrow()),
            NodeKind::Comment => s.push_str(&format!("<!--{}-->", self.0.text.borrow())),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}
impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({:?}, {})", self.0.id, self.to_markup())
    }
}

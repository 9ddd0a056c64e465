use super::*;

fn list(items: &[&str]) -> Node {
    let ul = Node::element("ul");
    for item in items {
        ul.append_child(&Node::element("li").with_child(Node::text(item)));
    }
    ul
}

#[test]
fn markup() {
    let div = Node::element("div")
        .with_attr("class", "a")
        .with_child(Node::text("x"))
        .with_child(Node::comment("c"));
    assert_eq!(div.to_markup(), r#"<div class="a">x<!--c--></div>"#);
}

#[test]
fn insert_after_moves_attached_node() {
    let ul = list(&["a", "b", "c"]);
    let a = ul.child(0).unwrap();
    let c = ul.child(2).unwrap();
    c.insert_after(&a);
    assert_eq!(ul.to_markup(), "<ul><li>b</li><li>c</li><li>a</li></ul>");
    assert_eq!(a.parent(), Some(ul.clone()));
    assert_eq!(a.previous_sibling(), Some(c));
}

#[test]
fn insert_before_and_remove() {
    let ul = list(&["a", "b"]);
    let b = ul.child(1).unwrap();
    let x = Node::element("li").with_child(Node::text("x"));
    b.insert_before(&x);
    assert_eq!(ul.to_markup(), "<ul><li>a</li><li>x</li><li>b</li></ul>");
    x.remove();
    assert_eq!(x.parent(), None);
    assert_eq!(ul.child_count(), 2);
}

#[test]
fn replace_with() {
    let ul = list(&["a", "b"]);
    let a = ul.child(0).unwrap();
    let marker = Node::comment("m");
    a.replace_with(&marker);
    assert_eq!(ul.to_markup(), "<ul><!--m--><li>b</li></ul>");
    assert_eq!(a.parent(), None);
    assert_eq!(marker.parent(), Some(ul));
}

#[test]
fn deep_clone_is_detached_copy() {
    let ul = list(&["a"]);
    let li = ul.child(0).unwrap().with_attr("x-text", "item");
    let copy = li.deep_clone();
    assert_ne!(copy, li);
    assert_eq!(copy.parent(), None);
    assert_eq!(copy.to_markup(), li.to_markup());
    copy.remove_attribute("x-text");
    assert_eq!(li.attribute("x-text").as_deref(), Some("item"));
}

#[test]
fn insert_without_parent_is_noop() {
    let a = Node::element("a");
    let b = Node::element("b");
    a.insert_after(&b);
    assert_eq!(b.parent(), None);
    assert_eq!(a.previous_sibling(), None);
}

use assert_call::{call, CallRecorder};
use serde_json::json;
use tracing_test::traced_test;

use super::*;
use crate::{
    test_helpers::{runtime, scope},
    Error,
};

fn recording(name: &'static str) -> BindingDefinition {
    BindingDefinition::from_update(move |_, new, old| {
        call!("{name}:{new}<-{old}");
        Ok(())
    })
}
fn descriptor(definition: BindingDefinition, expression: &str) -> BindingDescriptor {
    BindingDescriptor {
        name: "test".into(),
        definition,
        expression: expression.into(),
        is_interpolate: false,
    }
}

#[test]
fn static_expression_updates_once() {
    let mut cr = CallRecorder::new();
    let (s, rt) = runtime();
    let sc = scope(&rt, json!({}));
    let node = Node::element("span");
    let d = descriptor(recording("text"), "'hello'");
    rt.registry().create(&sc, &node, &d, None, None).unwrap();
    cr.verify("text:hello<-");
    assert_eq!(sc.watcher_count(), 0);
    assert_eq!(s.run_frame(), Ok(0));
    cr.verify(());
}

#[test]
fn dynamic_expression_is_batched() {
    let mut cr = CallRecorder::new();
    let (s, rt) = runtime();
    let sc = scope(&rt, json!({ "name": "a" }));
    let node = Node::element("span");
    let d = descriptor(recording("text"), "name");
    rt.registry().create(&sc, &node, &d, None, None).unwrap();
    cr.verify("text:a<-");

    sc.set("name", "b");
    sc.set("name", "c");
    s.run_frame().unwrap();
    cr.verify("text:c<-a");
}

#[test]
fn interpolation() {
    let mut cr = CallRecorder::new();
    let (s, rt) = runtime();
    let sc = scope(&rt, json!({ "n": 1 }));
    let d = BindingDescriptor {
        is_interpolate: true,
        ..descriptor(recording("bind"), "count: {{ n }}")
    };
    rt.registry()
        .create(&sc, &Node::text(""), &d, None, None)
        .unwrap();
    cr.verify("bind:count: 1<-");
    sc.set("n", 2);
    s.run_frame().unwrap();
    cr.verify("bind:count: 2<-count: 1");
}

#[test]
fn locked_write_is_not_echoed() {
    let mut cr = CallRecorder::new();
    let (s, rt) = runtime();
    let sc = scope(&rt, json!({ "v": "a" }));
    let d = descriptor(recording("input"), "v");
    let b = rt
        .registry()
        .create(&sc, &Node::element("input"), &d, None, None)
        .unwrap();
    cr.verify("input:a<-");

    b.set_value("typed", true).unwrap();
    assert_eq!(sc.get("v"), "typed".into());
    s.run_frame().unwrap();
    cr.verify(());
    assert!(!b.is_locked());

    sc.set("v", "external");
    s.run_frame().unwrap();
    cr.verify("input:external<-typed");
}

#[test]
fn unlocked_write_releases_lock() {
    let mut cr = CallRecorder::new();
    let (s, rt) = runtime();
    let sc = scope(&rt, json!({ "v": "a" }));
    let d = descriptor(recording("input"), "v");
    let b = rt
        .registry()
        .create(&sc, &Node::element("input"), &d, None, None)
        .unwrap();
    cr.verify("input:a<-");

    b.set_value("typed", true).unwrap();
    assert!(b.is_locked());
    b.set_value("programmatic", false).unwrap();
    assert!(!b.is_locked());
    s.run_frame().unwrap();
    cr.verify("input:programmatic<-a");
}

#[test]
fn undelivered_lock_does_not_swallow_next_update() {
    let mut cr = CallRecorder::new();
    let (s, rt) = runtime();
    let sc = scope(&rt, json!({ "v": "a" }));
    let d = descriptor(recording("input"), "v");
    let b = rt
        .registry()
        .create(&sc, &Node::element("input"), &d, None, None)
        .unwrap();
    cr.verify("input:a<-");

    b.set_value("typed", true).unwrap();
    sc.set("v", "a");
    s.run_frame().unwrap();
    cr.verify(());

    sc.set("v", "z");
    s.run_frame().unwrap();
    cr.verify("input:z<-a");
    assert!(!b.is_locked());
}

#[test]
fn unchanged_locked_write_does_not_lock() {
    let mut cr = CallRecorder::new();
    let (s, rt) = runtime();
    let sc = scope(&rt, json!({ "v": "a" }));
    let d = descriptor(recording("input"), "v");
    let b = rt
        .registry()
        .create(&sc, &Node::element("input"), &d, None, None)
        .unwrap();
    cr.verify("input:a<-");

    b.set_value("a", true).unwrap();
    assert!(!b.is_locked());
    sc.set("v", "b");
    s.run_frame().unwrap();
    cr.verify("input:b<-a");
}

#[test]
fn dispose_before_flush_drops_update() {
    let mut cr = CallRecorder::new();
    let (s, rt) = runtime();
    let sc = scope(&rt, json!({ "name": "a" }));
    let node = Node::element("span");
    let d = descriptor(recording("text"), "name");
    let b = rt.registry().create(&sc, &node, &d, None, None).unwrap();
    cr.verify("text:a<-");

    sc.set("name", "b");
    b.dispose();
    s.run_frame().unwrap();
    cr.verify(());
    assert!(b.scope().is_none());
    assert!(b.target().is_none());
    assert!(rt.registry().bindings_of(&node).is_empty());
    assert!(rt.registry().scope_of(&node).is_none());
}

#[test]
fn dispose_runs_release_once() {
    let mut cr = CallRecorder::new();
    let (_s, rt) = runtime();
    let sc = scope(&rt, json!({ "name": "a" }));
    let def = BindingDefinition::new(|| {
        BindingHooks::new()
            .on_init(|b, _, _| {
                call!("init {}", b.expression().unwrap_or_default());
                Ok(())
            })
            .on_release(|_| {
                call!("release");
            })
    });
    let node = Node::element("div");
    let b = rt
        .registry()
        .create(&sc, &node, &descriptor(def, "name"), None, None)
        .unwrap();
    cr.verify("init name");
    assert!(b.is_active());
    assert_eq!(sc.watcher_count(), 0);
    assert_eq!(rt.registry().bindings_of(&node).len(), 1);
    assert_eq!(sc.bindings().len(), 1);

    b.dispose();
    b.dispose();
    cr.verify("release");
    assert!(!b.is_active());
    assert!(sc.bindings().is_empty());
}

#[test]
fn scope_dispose_disposes_bindings() {
    let mut cr = CallRecorder::new();
    let (_s, rt) = runtime();
    let sc = scope(&rt, json!({ "name": "a" }));
    let def = BindingDefinition::new(|| {
        BindingHooks::new().on_release(|b| {
            call!("release {}", b.name());
        })
    });
    let node = Node::element("div");
    rt.registry()
        .create(&sc, &node, &descriptor(def, "name"), None, None)
        .unwrap();
    sc.dispose();
    cr.verify("release test");
    assert!(rt.registry().bindings_of(&node).is_empty());
}

#[test]
fn init_error_propagates() {
    let (_s, rt) = runtime();
    let sc = scope(&rt, json!({}));
    let def = BindingDefinition::new(|| {
        BindingHooks::new().on_init(|_, _, _| Err(Error::Hook("bad element".into())))
    });
    let node = Node::element("div");
    let r = rt
        .registry()
        .create(&sc, &node, &descriptor(def, "x"), None, None);
    assert_eq!(r.err(), Some(Error::Hook("bad element".into())));
    assert!(rt.registry().bindings_of(&node).is_empty());
    assert!(sc.bindings().is_empty());
}

#[test]
fn update_error_propagates_from_frame() {
    let (s, rt) = runtime();
    let sc = scope(&rt, json!({ "n": 0 }));
    let def = BindingDefinition::from_update(|_, new, _| match new.as_f64() {
        Some(n) if n > 0.0 => Err(Error::Hook(format!("rejected {new}"))),
        _ => Ok(()),
    });
    rt.registry()
        .create(&sc, &Node::element("div"), &descriptor(def, "n"), None, None)
        .unwrap();
    sc.set("n", 3);
    assert_eq!(s.run_frame(), Err(Error::Hook("rejected 3".into())));
}

#[test]
fn deep_watch_definition() {
    let mut cr = CallRecorder::new();
    let (s, rt) = runtime();
    let sc = scope(&rt, json!({ "user": { "name": "a" } }));
    let def = BindingDefinition::from_update(|_, new, _| {
        call!("{}", new.as_object().map(|o| o.get("name")).unwrap_or_default());
        Ok(())
    })
    .deep_watch();
    rt.registry()
        .create(&sc, &Node::element("div"), &descriptor(def, "user"), None, None)
        .unwrap();
    cr.verify("a");
    sc.eval("user", false)
        .unwrap()
        .as_object()
        .unwrap()
        .set("name", "b");
    s.run_frame().unwrap();
    cr.verify("b");
}

#[test]
fn terminal_order() {
    let r = Registry::new();
    let def = || BindingDefinition::new(BindingHooks::new);
    r.define("a", def().terminal().priority(10));
    r.define("b", def().terminal().priority(50));
    r.define("c", def());
    r.define("d", def().terminal().priority(50));
    let names = |r: &Registry| {
        r.terminal_bindings()
            .into_iter()
            .map(|t| t.name)
            .collect::<Vec<_>>()
    };
    assert_eq!(names(&r), vec!["b", "d", "a"]);

    r.define("a", def().terminal().priority(60));
    assert_eq!(names(&r), vec!["a", "b", "d"]);
    r.define("b", def());
    assert_eq!(names(&r), vec!["a", "d"]);
    assert!(!r.definition("b").unwrap().is_terminal);
}

#[traced_test]
#[test]
fn redefinition_warns() {
    let r = Registry::new();
    r.define("x", BindingDefinition::new(BindingHooks::new));
    assert!(!logs_contain("binding redefined"));
    r.define("x", BindingDefinition::new(BindingHooks::new));
    assert!(logs_contain("binding redefined"));
}

#[test]
fn state_is_shared_with_hooks() {
    use std::cell::Cell;

    let (_s, rt) = runtime();
    let sc = scope(&rt, json!({ "n": 1 }));
    let def = BindingDefinition::new(|| {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        BindingHooks::new()
            .on_update(move |_, _, _| {
                c.set(c.get() + 1);
                Ok(())
            })
            .with_state(count)
    });
    let b = rt
        .registry()
        .create(&sc, &Node::element("div"), &descriptor(def, "n"), None, None)
        .unwrap();
    assert_eq!(b.state::<Cell<i32>>().map(Cell::get), Some(1));
    assert!(b.state::<String>().is_none());
}

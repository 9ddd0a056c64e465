use assert_call::{call, CallRecorder};
use serde_json::json;

use super::*;
use crate::{
    binding::{BindingDefinition, BindingHooks},
    test_helpers::{runtime, scope},
    Error,
};

fn recording(name: &'static str) -> BindingDefinition {
    BindingDefinition::from_update(move |b, new, _| {
        let tag = b
            .target()
            .and_then(|t| t.tag().map(str::to_owned))
            .unwrap_or_else(|| "#text".into());
        call!("{name} {tag} {new}");
        Ok(())
    })
}

#[test]
fn non_terminal_bindings_in_priority_then_document_order() {
    let mut cr = CallRecorder::new();
    let (_s, rt) = runtime();
    rt.registry().define("low", recording("low").priority(-10));
    rt.registry().define("high", recording("high").priority(10));
    let sc = scope(&rt, json!({ "a": 1, "b": 2 }));
    let root = Node::element("div")
        .with_attr("x-low", "a")
        .with_attr("x-high", "b")
        .with_attr("class", "c")
        .with_child(Node::element("span").with_attr("x-low", "b"));
    rt.mount(&sc, &root).unwrap();
    cr.verify(["high div 2", "low div 1", "low span 2"]);
    assert_eq!(root.to_markup(), r#"<div class="c"><span></span></div>"#);
}

#[test]
fn terminal_binding_stops_descent() {
    let mut cr = CallRecorder::new();
    let (_s, rt) = runtime();
    rt.registry().define("text", recording("text"));
    rt.registry().define(
        "own",
        BindingDefinition::new(|| {
            BindingHooks::new().on_init(|b, _, _| {
                call!("own {}", b.expression().unwrap_or_default());
                Ok(())
            })
        })
        .terminal()
        .priority(95),
    );
    let sc = scope(&rt, json!({ "a": 1 }));
    let root = Node::element("div").with_child(
        Node::element("p")
            .with_attr("x-own", "a")
            .with_attr("x-text", "a")
            .with_child(Node::element("span").with_attr("x-text", "a")),
    );
    rt.mount(&sc, &root).unwrap();
    cr.verify("own a");
    let p = root.child(0).unwrap();
    assert_eq!(p.attribute("x-own"), None);
    assert_eq!(p.attribute("x-text").as_deref(), Some("a"));
}

#[test]
fn interpolated_text_uses_bind() {
    let mut cr = CallRecorder::new();
    let (_s, rt) = runtime();
    let sc = scope(&rt, json!({ "name": "ann" }));
    let root = Node::element("p").with_child(Node::text("hi {{ name }}"));

    rt.mount(&sc, &root).unwrap();
    cr.verify(());

    rt.registry().define("bind", recording("bind"));
    let root = Node::element("p").with_child(Node::text("hi {{ name }}"));
    rt.mount(&sc, &root).unwrap();
    cr.verify("bind #text hi ann");
}

#[test]
fn retained_attribute() {
    let (_s, rt) = runtime();
    rt.registry()
        .define("keep", recording("keep").retain_attribute());
    let sc = scope(&rt, json!({}));
    let root = Node::element("div").with_attr("x-keep", "'v'");
    let mut cr = CallRecorder::new();
    rt.mount(&sc, &root).unwrap();
    cr.verify("keep div v");
    assert_eq!(root.attribute("x-keep").as_deref(), Some("'v'"));
}

#[test]
fn executor_binds_copies() {
    let mut cr = CallRecorder::new();
    let (_s, rt) = runtime();
    rt.registry().define("text", recording("text"));
    let template = Node::element("li").with_child(Node::element("b").with_attr("x-text", "v"));
    let executor = compile(&rt, &template).unwrap();
    assert_eq!(template.to_markup(), "<li><b></b></li>");

    for v in ["x", "y"] {
        let sc = scope(&rt, json!({ "v": v }));
        executor(&sc, &template.deep_clone(), None, None).unwrap();
    }
    cr.verify(["text b x", "text b y"]);
}

#[test]
fn custom_prefix() {
    let mut cr = CallRecorder::new();
    let scheduler = std::rc::Rc::new(crate::FrameScheduler::new());
    let rt = Runtime::builder(scheduler)
        .config(crate::Config {
            prefix: "data-".into(),
            ..Default::default()
        })
        .build()
        .unwrap();
    rt.registry().define("text", recording("text"));
    let sc = scope(&rt, json!({ "v": 1 }));
    let root = Node::element("i")
        .with_attr("data-text", "v")
        .with_attr("x-text", "v");
    rt.mount(&sc, &root).unwrap();
    cr.verify("text i 1");
    assert_eq!(root.attribute("x-text").as_deref(), Some("v"));
}

#[test]
fn invalid_interpolation_fails_compile() {
    let (_s, rt) = runtime();
    rt.registry().define("bind", recording("bind"));
    let root = Node::element("p").with_child(Node::text("{{ a + }}"));
    assert!(matches!(compile(&rt, &root), Err(Error::Expression(_))));
}

#[test]
fn invalid_config_fails_build() {
    let scheduler = std::rc::Rc::new(crate::FrameScheduler::new());
    let r = Runtime::builder(scheduler)
        .config(crate::Config {
            repeat_cache_capacity: 0,
            ..Default::default()
        })
        .build();
    assert!(matches!(r, Err(Error::Configuration(_))));
}

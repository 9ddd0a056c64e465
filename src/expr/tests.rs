use rstest::rstest;
use serde_json::json;

use super::*;
use crate::test_helpers::{runtime, scope};

#[rstest]
#[case("a", "a", vec![])]
#[case(" a.b ", "a", vec![Key::Name("b".into())])]
#[case("a[0].b", "a", vec![Key::Index(0), Key::Name("b".into())])]
#[case("a['x y'][\"z\"]", "a", vec![Key::Name("x y".into()), Key::Name("z".into())])]
#[case("$first", "$first", vec![])]
fn path_parse(#[case] input: &str, #[case] root: &str, #[case] members: Vec<Key>) {
    let p = Path::parse(input).unwrap();
    assert_eq!(p.root(), root);
    assert_eq!(p.members(), members.as_slice());
}

#[rstest]
#[case("")]
#[case("1a")]
#[case("a.")]
#[case("a[0")]
#[case("a['x]")]
#[case("a b")]
#[case("a + b")]
fn path_parse_error(#[case] input: &str) {
    assert_eq!(Path::parse(input), Err(Error::Expression(input.into())));
}

#[rstest]
#[case("'x'", false)]
#[case("12.5", false)]
#[case("true", false)]
#[case("null", false)]
#[case("a.b", true)]
fn getter_is_dynamic(#[case] input: &str, #[case] dynamic: bool) {
    let e = PathEvaluator::new();
    assert_eq!(e.parse_getter(input, false).unwrap().is_dynamic(), dynamic);
}

#[test]
fn interpolation_is_dynamic_only_with_paths() {
    let e = PathEvaluator::new();
    assert!(!e.parse_getter("plain {{ 'text' }}", true).unwrap().is_dynamic());
    assert!(e.parse_getter("hi {{ name }}", true).unwrap().is_dynamic());
    assert!(matches!(
        e.parse_getter("hi {{ name", true),
        Err(Error::Expression(_))
    ));
}

#[test]
fn evaluate() {
    let (_s, rt) = runtime();
    let sc = scope(&rt, json!({ "user": { "name": "ann", "tags": ["a", "b"] }, "n": 2 }));
    assert_eq!(sc.eval("user.name", false), Ok("ann".into()));
    assert_eq!(sc.eval("user.tags[1]", false), Ok("b".into()));
    assert_eq!(sc.eval("user.missing.deeper", false), Ok(Value::Undefined));
    assert_eq!(sc.eval("-1.5", false), Ok((-1.5).into()));
    assert_eq!(
        sc.eval("{{ user.name }} has {{ n }} tags", true),
        Ok("ann has 2 tags".into())
    );
}

#[test]
fn single_interpolation_keeps_value() {
    let (_s, rt) = runtime();
    let sc = scope(&rt, json!({ "n": 2 }));
    assert_eq!(sc.eval("{{ n }}", true), Ok(2.into()));
    assert_eq!(sc.eval(" {{ n }}", true), Ok(" 2".into()));
}

#[test]
fn evaluation_tracks_traversed_objects() {
    let (_s, rt) = runtime();
    let sc = scope(&rt, json!({ "user": { "tags": ["a"] } }));
    let getter = rt.evaluator().parse_getter("user.tags", false).unwrap();
    let mut cx = TrackContext::new();
    getter.evaluate(&sc, &mut cx);
    let sources = cx.into_sources();
    assert_eq!(sources.len(), 3);
    assert!(sources[0].ptr_eq(sc.model()));
}

#[test]
fn getters_are_cached() {
    let e = PathEvaluator::new();
    let a = e.parse_getter("a", false).unwrap();
    let b = e.parse_getter("a", false).unwrap();
    assert!(Rc::ptr_eq(&a.eval, &b.eval));
}

#[test]
fn getter_cache_is_bounded() {
    let e = PathEvaluator::with_capacity(NonZeroUsize::MIN.saturating_add(1));
    let a = e.parse_getter("a", false).unwrap();
    e.parse_getter("b", false).unwrap();
    e.parse_getter("c", false).unwrap();
    assert_eq!(e.getters.borrow().len(), 2);
    let a2 = e.parse_getter("a", false).unwrap();
    assert!(!Rc::ptr_eq(&a.eval, &a2.eval));
}

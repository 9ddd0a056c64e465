use std::rc::Rc;

use crate::{FrameScheduler, Object, Runtime, Scope, Value};

pub fn runtime() -> (Rc<FrameScheduler>, Rc<Runtime>) {
    let scheduler = Rc::new(FrameScheduler::new());
    let rt = Runtime::new(scheduler.clone());
    (scheduler, rt)
}

pub fn object(json: serde_json::Value) -> Object {
    let value: Value = serde_json::from_value(json).unwrap();
    value.as_object().unwrap().clone()
}

pub fn scope(rt: &Rc<Runtime>, json: serde_json::Value) -> Rc<Scope> {
    Scope::new(rt, object(json))
}

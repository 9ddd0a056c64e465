use std::{
    collections::HashSet,
    mem::take,
    rc::{Rc, Weak},
};

use slabmap::SlabMap;

use crate::value::{Object, ObjectId};


/// Receives change notifications from the observable objects it depends on.
pub(crate) trait BindSink: 'static {
    fn notify(self: Rc<Self>);
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub(crate) struct BindKey(usize);

/// Sinks that depend on one observable object.
#[derive(Default)]
pub(crate) struct SinkBindings(SlabMap<Weak<dyn BindSink>>);

impl SinkBindings {
    pub fn new() -> Self {
        Self(SlabMap::new())
    }
    pub fn bind(&mut self, sink: Weak<dyn BindSink>) -> BindKey {
        BindKey(self.0.insert(sink))
    }
    pub fn unbind(&mut self, key: BindKey) {
        self.0.remove(key.0);
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Live sinks to notify. Returned by value so that the caller can release its borrow first.
    pub fn sinks(&mut self) -> Vec<Rc<dyn BindSink>> {
        self.0.optimize();
        self.0.values().filter_map(|s| s.upgrade()).collect()
    }
}

struct SourceBinding {
    source: Object,
    key: BindKey,
}

/// Objects that one sink depends on.
#[derive(Default)]
pub(crate) struct SourceBindings(Vec<SourceBinding>);

impl SourceBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current dependencies with `sources`.
    pub fn update(&mut self, sink: &Weak<dyn BindSink>, sources: Vec<Object>) {
        self.clear();
        for source in sources {
            let key = source.bind_sink(sink.clone());
            self.0.push(SourceBinding { source, key });
        }
    }
    pub fn clear(&mut self) {
        for b in take(&mut self.0) {
            b.source.unbind_sink(b.key);
        }
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
}
impl Drop for SourceBindings {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Context for evaluating expressions and recording which objects were read.
///
/// An untracked context evaluates without recording anything.
pub struct TrackContext {
    sources: Option<Vec<Object>>,
    seen: HashSet<ObjectId>,
}

impl TrackContext {
    pub fn new() -> Self {
        Self {
            sources: Some(Vec::new()),
            seen: HashSet::new(),
        }
    }
    pub fn untracked() -> Self {
        Self {
            sources: None,
            seen: HashSet::new(),
        }
    }
    pub fn is_tracking(&self) -> bool {
        self.sources.is_some()
    }

    /// Adds a dependency on `object`. Returns `false` if it was already recorded.
    pub fn track(&mut self, object: &Object) -> bool {
        let Some(sources) = &mut self.sources else {
            return false;
        };
        if !self.seen.insert(object.id()) {
            return false;
        }
        sources.push(object.clone());
        true
    }

    pub(crate) fn into_sources(self) -> Vec<Object> {
        self.sources.unwrap_or_default()
    }
}
impl Default for TrackContext {
    fn default() -> Self {
        Self::new()
    }
}

use std::{
    any::Any,
    cell::{Cell, Ref, RefCell},
    collections::HashMap,
    fmt,
    rc::{Rc, Weak},
};

use indexmap::IndexMap;
use serde::{
    de::{MapAccess, SeqAccess, Visitor},
    ser::{SerializeMap, SerializeSeq},
    Deserialize, Deserializer, Serialize, Serializer,
};

use crate::core::{BindKey, BindSink, SinkBindings, TrackContext};


/// Dynamically typed value stored in scopes.
///
/// Primitives compare by value. Objects compare by identity.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(Object),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Value identity: primitives by value (`NaN` is the same as `NaN`), objects by reference.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// String used to bucket primitive values, e.g. `1` and `"1"` share the key `"1"`.
    pub fn to_key_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            _ => self.to_string(),
        }
    }

    pub(crate) fn track_deep(&self, cx: &mut TrackContext) {
        if let Value::Object(o) = self {
            o.track_deep(cx);
        }
    }
}

fn fmt_number(n: f64, f: &mut fmt::Formatter) -> fmt::Result {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

/// Text form used for rendering. `undefined` and `null` render as an empty string.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined | Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => fmt_number(*n, f),
            Value::String(s) => f.write_str(s),
            Value::Object(o) => match &*o.data() {
                ObjectData::List(items) => {
                    for (i, item) in items.iter().enumerate() {
                        if i != 0 {
                            f.write_str(",")?;
                        }
                        write!(f, "{item}")?;
                    }
                    Ok(())
                }
                ObjectData::Map(_) => f.write_str("[object Object]"),
            },
        }
    }
}
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => fmt_number(*n, f),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(o) => fmt::Debug::fmt(o, f),
        }
    }
}
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}
impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}
macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(value: $t) -> Self {
                Value::Number(value as f64)
            }
        })*
    };
}
impl_from_int!(i32, i64, u32, u64, usize);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.into())
    }
}
impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value.into())
    }
}
impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Position of a child value inside an [`Object`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Index(usize),
    Name(String),
}
impl From<Key> for Value {
    fn from(value: Key) -> Self {
        match value {
            Key::Index(i) => i.into(),
            Key::Name(name) => name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        thread_local! {
            static NEXT_ID: Cell<u64> = const { Cell::new(0) };
        }
        NEXT_ID.with(|id| {
            let value = id.get();
            id.set(value + 1);
            ObjectId(value)
        })
    }
}

pub enum ObjectData {
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

/// Observable list or insertion-ordered map with reference identity.
///
/// Every mutation that changes the content notifies the watchers that read this object.
#[derive(Clone)]
pub struct Object(Rc<ObjectNode>);

struct ObjectNode {
    id: ObjectId,
    data: RefCell<ObjectData>,
    sinks: RefCell<SinkBindings>,
    tags: RefCell<HashMap<u64, Weak<dyn Any>>>,
}

impl Object {
    fn from_data(data: ObjectData) -> Self {
        Self(Rc::new(ObjectNode {
            id: ObjectId::next(),
            data: RefCell::new(data),
            sinks: RefCell::new(SinkBindings::new()),
            tags: RefCell::new(HashMap::new()),
        }))
    }
    pub fn new_list() -> Self {
        Self::from_data(ObjectData::List(Vec::new()))
    }
    pub fn new_map() -> Self {
        Self::from_data(ObjectData::Map(IndexMap::new()))
    }
    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::from_data(ObjectData::List(
            items.into_iter().map(Into::into).collect(),
        ))
    }
    pub fn map<K: Into<String>, T: Into<Value>>(entries: impl IntoIterator<Item = (K, T)>) -> Self {
        Self::from_data(ObjectData::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
    pub fn is_list(&self) -> bool {
        matches!(&*self.data(), ObjectData::List(_))
    }
    pub fn data(&self) -> Ref<'_, ObjectData> {
        self.0.data.borrow()
    }
    pub fn len(&self) -> usize {
        match &*self.data() {
            ObjectData::List(items) => items.len(),
            ObjectData::Map(entries) => entries.len(),
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads a member by name. List members are addressed by their decimal index.
    pub fn get(&self, name: &str) -> Value {
        match &*self.data() {
            ObjectData::List(items) => name
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or_default(),
            ObjectData::Map(entries) => entries.get(name).cloned().unwrap_or_default(),
        }
    }
    pub fn get_index(&self, index: usize) -> Value {
        match &*self.data() {
            ObjectData::List(items) => items.get(index).cloned().unwrap_or_default(),
            ObjectData::Map(entries) => entries
                .get_index(index)
                .map(|(_, v)| v.clone())
                .unwrap_or_default(),
        }
    }
    pub fn get_key(&self, key: &Key) -> Value {
        match key {
            Key::Index(i) if self.is_list() => self.get_index(*i),
            Key::Index(i) => self.get(&i.to_string()),
            Key::Name(name) => self.get(name),
        }
    }
    pub fn contains(&self, name: &str) -> bool {
        match &*self.data() {
            ObjectData::List(items) => name.parse::<usize>().is_ok_and(|i| i < items.len()),
            ObjectData::Map(entries) => entries.contains_key(name),
        }
    }
    /// Member names in iteration order.
    pub fn keys(&self) -> Vec<String> {
        match &*self.data() {
            ObjectData::List(items) => (0..items.len()).map(|i| i.to_string()).collect(),
            ObjectData::Map(entries) => entries.keys().cloned().collect(),
        }
    }
    /// Snapshot of all members in iteration order.
    pub fn entries(&self) -> Vec<(Key, Value)> {
        match &*self.data() {
            ObjectData::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (Key::Index(i), v.clone()))
                .collect(),
            ObjectData::Map(entries) => entries
                .iter()
                .map(|(k, v)| (Key::Name(k.clone()), v.clone()))
                .collect(),
        }
    }
    pub fn values(&self) -> Vec<Value> {
        match &*self.data() {
            ObjectData::List(items) => items.clone(),
            ObjectData::Map(entries) => entries.values().cloned().collect(),
        }
    }

    /// Sets a member by name and notifies if the stored value changed.
    ///
    /// On a list the name must be a decimal index; writing past the end pads with `undefined`.
    pub fn set(&self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        let changed = match &mut *self.0.data.borrow_mut() {
            ObjectData::List(items) => match name.parse::<usize>() {
                Ok(index) => set_list_item(items, index, value),
                Err(_) => false,
            },
            ObjectData::Map(entries) => match entries.get_mut(name) {
                Some(slot) if slot.same(&value) => false,
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => {
                    entries.insert(name.to_owned(), value);
                    true
                }
            },
        };
        if changed {
            self.notify();
        }
    }
    pub fn set_index(&self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        let changed = match &mut *self.0.data.borrow_mut() {
            ObjectData::List(items) => set_list_item(items, index, value),
            ObjectData::Map(entries) => match entries.get_index_mut(index) {
                Some((_, slot)) if !slot.same(&value) => {
                    *slot = value;
                    true
                }
                _ => false,
            },
        };
        if changed {
            self.notify();
        }
    }
    pub fn push(&self, value: impl Into<Value>) {
        self.modify_list(|items| items.push(value.into()));
    }
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        self.modify_list(|items| items.insert(index.min(items.len()), value.into()));
    }
    pub fn remove_at(&self, index: usize) -> Value {
        let mut removed = Value::Undefined;
        self.modify_list(|items| {
            if index < items.len() {
                removed = items.remove(index);
            }
        });
        removed
    }
    pub fn reverse(&self) {
        self.modify_list(|items| items.reverse());
    }
    /// Does nothing if either index is out of range.
    pub fn swap(&self, a: usize, b: usize) {
        let len = self.len();
        if a < len && b < len {
            self.modify_list(|items| items.swap(a, b));
        }
    }
    /// Removes a map member, keeping the order of the others.
    pub fn remove(&self, name: &str) -> Value {
        let removed = match &mut *self.0.data.borrow_mut() {
            ObjectData::List(_) => None,
            ObjectData::Map(entries) => entries.shift_remove(name),
        };
        if removed.is_some() {
            self.notify();
        }
        removed.unwrap_or_default()
    }
    pub fn clear(&self) {
        let was_empty = self.is_empty();
        match &mut *self.0.data.borrow_mut() {
            ObjectData::List(items) => items.clear(),
            ObjectData::Map(entries) => entries.clear(),
        }
        if !was_empty {
            self.notify();
        }
    }

    fn modify_list(&self, f: impl FnOnce(&mut Vec<Value>)) {
        let is_list = match &mut *self.0.data.borrow_mut() {
            ObjectData::List(items) => {
                f(items);
                true
            }
            ObjectData::Map(_) => false,
        };
        if is_list {
            self.notify();
        }
    }

    pub(crate) fn notify(&self) {
        let sinks = self.0.sinks.borrow_mut().sinks();
        for sink in sinks {
            sink.notify();
        }
    }
    pub(crate) fn bind_sink(&self, sink: Weak<dyn BindSink>) -> BindKey {
        self.0.sinks.borrow_mut().bind(sink)
    }
    pub(crate) fn unbind_sink(&self, key: BindKey) {
        self.0.sinks.borrow_mut().unbind(key)
    }
    pub(crate) fn sink_count(&self) -> usize {
        self.0.sinks.borrow().len()
    }

    fn track_deep(&self, cx: &mut TrackContext) {
        if cx.track(self) {
            for value in self.values() {
                value.track_deep(cx);
            }
        }
    }

    /// Hidden back-reference stored on the object, keyed by an owner id.
    pub(crate) fn tag(&self, owner: u64) -> Option<Rc<dyn Any>> {
        self.0.tags.borrow().get(&owner)?.upgrade()
    }
    pub(crate) fn set_tag(&self, owner: u64, target: Option<Weak<dyn Any>>) {
        let mut tags = self.0.tags.borrow_mut();
        match target {
            Some(target) => {
                tags.insert(owner, target);
            }
            None => {
                tags.remove(&owner);
            }
        }
    }
}

fn set_list_item(items: &mut Vec<Value>, index: usize, value: Value) -> bool {
    if let Some(slot) = items.get_mut(index) {
        if slot.same(&value) {
            return false;
        }
        *slot = value;
    } else {
        items.resize(index, Value::Undefined);
        items.push(value);
    }
    true
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.data.try_borrow() {
            Ok(data) => match &*data {
                ObjectData::List(items) => write!(f, "List#{}(len = {})", self.0.id.0, items.len()),
                ObjectData::Map(entries) => {
                    write!(f, "Map#{}{:?}", self.0.id.0, entries.keys().collect::<Vec<_>>())
                }
            },
            Err(_) => write!(f, "Object#{}(<borrowed>)", self.0.id.0),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Undefined | Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Object(o) => o.serialize(serializer),
        }
    }
}
impl Serialize for Object {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self
            .0
            .data
            .try_borrow()
            .map_err(|_| serde::ser::Error::custom("borrowed"))?;
        match &*data {
            ObjectData::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            ObjectData::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any value")
    }
    fn visit_bool<E>(self, v: bool) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Bool(v))
    }
    fn visit_i64<E>(self, v: i64) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Number(v as f64))
    }
    fn visit_u64<E>(self, v: u64) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Number(v as f64))
    }
    fn visit_f64<E>(self, v: f64) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Number(v))
    }
    fn visit_str<E>(self, v: &str) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(v.into())
    }
    fn visit_unit<E>(self) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Null)
    }
    fn visit_none<E>(self) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Null)
    }
    fn visit_some<D>(self, deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer)
    }
    fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element::<Value>()? {
            items.push(item);
        }
        Ok(Object::list(items).into())
    }
    fn visit_map<A>(self, mut map: A) -> Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = IndexMap::new();
        while let Some((k, v)) = map.next_entry::<String, Value>()? {
            entries.insert(k, v);
        }
        Ok(Object::from_data(ObjectData::Map(entries)).into())
    }
}

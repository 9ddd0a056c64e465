//! Reactive view binding.
//!
//! A [`Scope`] holds observable state. [`Binding`]s connect expressions on a scope to nodes of a
//! [`dom`] tree, and are re-run, batched per frame by a [`Scheduler`], when the state they read
//! changes. The built-in `repeat` binding renders one copy of an element per list item and
//! reconciles the copies with minimal moves when the list changes.

mod cache;
mod config;
mod core;
mod error;
mod runtime;
mod scheduler;
mod scope;
mod subscription;
mod value;

pub mod binding;
pub mod bindings;
pub mod dom;
pub mod expr;
pub mod template;

#[cfg(test)]
mod test_helpers;

pub use binding::{
    priority, Binding, BindingDefinition, BindingDescriptor, BindingHooks, Registry,
};
pub use cache::Cache;
pub use config::Config;
pub use crate::core::TrackContext;
pub use error::{Error, Result};
pub use expr::{Evaluator, Getter, Path, PathEvaluator};
pub use runtime::{Runtime, RuntimeBuilder};
pub use scheduler::{FlushKey, FlushTask, FrameScheduler, Scheduler};
pub use scope::{BoundHandler, Handler, Scope, WatchOptions};
pub use subscription::Subscription;
pub use value::{Key, Object, ObjectData, ObjectId, Value};

//! Bindings every runtime registers.

pub mod repeat;

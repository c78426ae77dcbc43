//! Sift Types
//!
//! This crate defines the value model shared by the Sift fact engine. Facts are
//! tuples of [`Value`]s; keeping the value type in its own crate lets embedding
//! applications build argument lists without pulling in the engine.

#![deny(missing_docs)]

mod types;
pub use types::{EntityRef, Value};

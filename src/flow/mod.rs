// SPDX-License-Identifier: MIT

//! Conversational workflows as node trees
//!
//! This module provides:
//! - `Flow` - fluent construction of named node sequences
//! - `Node` - the closed set of workflow step kinds
//! - `Engine` - the transactional interpreter

pub mod builder;
pub mod engine;
pub mod node;

pub use builder::Flow;
pub use engine::Engine;
pub use node::{CustomFn, Node};

// SPDX-License-Identifier: MIT

//! Schema-checked conversation state
//!
//! This module provides:
//! - `StateSchema` - declares field types, defaults, and required fields
//! - `State` - the runtime container with transactional edits and
//!   shared-key aliasing across clones

mod schema;
mod store;

pub use schema::{FieldDef, FieldType, StateSchema};
pub use store::State;

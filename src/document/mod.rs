// SPDX-License-Identifier: MIT

//! Declarative flow documents
//!
//! This module provides:
//! - Serde types mirroring the YAML document format ([`FlowDoc`] and friends)
//! - A structural validator that reports every problem in one pass
//! - A serializer converting between runtime flows and YAML documents

mod serializer;
mod types;
mod validator;

pub use serializer::FlowSerializer;
pub use types::{
    ContentDoc, FlowDoc, InstructionDoc, MessageDoc, NodeDoc, ToolDoc, TypedInstructionDoc,
    FLOW_DOC_VERSION,
};
pub use validator::FlowValidator;

//! Conversational workflows as typed node trees.
//!
//! This crate provides:
//! - A fluent [`Flow`] builder and an [`Engine`] that executes node trees,
//!   treating branches as transactions over the conversation
//! - A [`Decider`] trait abstracting the external decision provider
//! - A schema-checked [`State`] container with transactional edits
//! - A YAML [`FlowSerializer`] and a collect-all [`FlowValidator`] for
//!   declarative flow documents
//! - A [`Chatbot`] session layer composing skills and tools

pub mod chatbot;
pub mod context;
pub mod decider;
pub mod document;
pub mod error;
pub mod flow;
pub mod message;
pub mod registry;
pub mod state;
pub mod tool;

pub use chatbot::{Chatbot, DEFAULT_SYSTEM_PROMPT};
pub use context::Context;
pub use decider::{Decider, ModelSpec};
pub use document::{FlowSerializer, FlowValidator};
pub use error::{
    ConfigError, ExecutionError, ParleyError, SerializeError, StateError, StateValidationError,
    ValidationError,
};
pub use flow::{Engine, Flow, Node};
pub use message::{Content, Instruction, Instructions, Message, Role};
pub use registry::ToolRegistry;
pub use state::{FieldDef, FieldType, State, StateSchema};
pub use tool::{FnTool, Tool, ToolRef, ToolResult};

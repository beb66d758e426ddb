// SPDX-License-Identifier: MIT

//! YAML schema types for flow documents
//!
//! These structures mirror the on-disk document format one-to-one. The
//! serializer converts between them and runtime flows; the validator
//! checks raw YAML before they are decoded.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::decider::ModelSpec;
use crate::message::Role;

/// Format version written into every serialized document. Read back
/// but not enforced.
pub const FLOW_DOC_VERSION: &str = "1.0";

/// Top-level flow document
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FlowDoc {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub nodes: Vec<NodeDoc>,
}

/// One node of a flow document, tagged by kind
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeDoc {
    Append {
        message: MessageDoc,
    },
    Prepend {
        message: MessageDoc,
    },
    Reply {
        instructions: Vec<InstructionDoc>,
    },
    Invoke {
        tools: Vec<ToolDoc>,
    },
    Create {
        model: ModelSpec,
        instructions: Vec<InstructionDoc>,
    },
    Noop,
    Sequence {
        nodes: Vec<NodeDoc>,
    },
    Decide {
        on_true: Box<NodeDoc>,
        on_false: Box<NodeDoc>,
        instructions: Vec<InstructionDoc>,
    },
    Choose {
        /// Sorted so documents serialize deterministically
        choices: BTreeMap<String, NodeDoc>,
        instructions: Vec<InstructionDoc>,
    },
    Route {
        flows: Vec<FlowDoc>,
    },
}

/// A message with explicit role and structured content
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MessageDoc {
    pub role: Role,
    pub content: ContentDoc,
}

/// Message content, tagged by kind
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ContentDoc {
    String { value: String },
    Mapping { value: Map<String, Value> },
    Sequence { value: Vec<Value> },
    StructuredModel { model: String, data: Value },
}

/// An instruction entry: either a bare string or a typed form
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum InstructionDoc {
    Bare(String),
    Typed(TypedInstructionDoc),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TypedInstructionDoc {
    String { value: String },
    Message { value: MessageDoc },
}

/// A tool descriptor, tagged by how the tool is recovered on load
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolDoc {
    /// Resolved from the serializer's registry by name
    Registered { name: String },
    /// Rebuilt by a factory registered for the target path
    Function {
        name: String,
        description: String,
        target: String,
    },
    /// Same as function, for tools built by a constructor
    Constructor {
        name: String,
        description: String,
        target: String,
    },
}

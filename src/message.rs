// SPDX-License-Identifier: MIT

//! Conversation messages and instruction values
//!
//! Messages are immutable once constructed; use the per-role factory
//! functions. Instructions are the steering values handed to the decision
//! provider by Reply/Decide/Choose/Create steps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message roles understood by decision providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// Message payload - plain text, a mapping, a sequence, or an instance of
/// a user-declared schema type (model path plus data).
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Mapping(Map<String, Value>),
    Sequence(Vec<Value>),
    Structured { model: String, data: Value },
}

impl Content {
    /// Returns the text payload, if this content is plain text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Content::Text(text),
            Value::Object(map) => Content::Mapping(map),
            Value::Array(items) => Content::Sequence(items),
            other => Content::Text(other.to_string()),
        }
    }
}

/// One entry of the conversation transcript
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    pub fn system(content: impl Into<Content>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<Content>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<Content>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
        }
    }

    /// Text payload, if the content is plain text
    pub fn text(&self) -> Option<&str> {
        self.content.as_text()
    }
}

// Bare strings read as system messages, the common case for prompts
impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::system(text)
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::system(text)
    }
}

/// A steering value for one decision-provider call: either a bare string
/// or a full message with an explicit role.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Text(String),
    Message(Message),
}

impl Instruction {
    /// Render as a message; bare text becomes a system message
    pub fn as_message(&self) -> Message {
        match self {
            Instruction::Text(text) => Message::system(text.as_str()),
            Instruction::Message(message) => message.clone(),
        }
    }
}

impl From<&str> for Instruction {
    fn from(text: &str) -> Self {
        Instruction::Text(text.to_string())
    }
}

impl From<String> for Instruction {
    fn from(text: String) -> Self {
        Instruction::Text(text)
    }
}

impl From<Message> for Instruction {
    fn from(message: Message) -> Self {
        Instruction::Message(message)
    }
}

/// Anything that can be handed to a builder step as its instruction set:
/// `()`, a single string or message, an array, or a vec.
pub trait Instructions {
    fn into_instructions(self) -> Vec<Instruction>;
}

impl Instructions for () {
    fn into_instructions(self) -> Vec<Instruction> {
        Vec::new()
    }
}

impl Instructions for &str {
    fn into_instructions(self) -> Vec<Instruction> {
        vec![self.into()]
    }
}

impl Instructions for String {
    fn into_instructions(self) -> Vec<Instruction> {
        vec![self.into()]
    }
}

impl Instructions for Message {
    fn into_instructions(self) -> Vec<Instruction> {
        vec![self.into()]
    }
}

impl Instructions for Instruction {
    fn into_instructions(self) -> Vec<Instruction> {
        vec![self]
    }
}

impl<T: Into<Instruction>, const N: usize> Instructions for [T; N] {
    fn into_instructions(self) -> Vec<Instruction> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<Instruction>> Instructions for Vec<T> {
    fn into_instructions(self) -> Vec<Instruction> {
        self.into_iter().map(Into::into).collect()
    }
}

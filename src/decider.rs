// SPDX-License-Identifier: MIT

//! Decision provider abstraction
//!
//! Every judgement a flow needs at runtime goes through the [`Decider`]
//! trait: free-form replies, yes/no decisions, picking an option, producing
//! structured data, and selecting/running tools. Implementations typically
//! wrap an LLM client; tests script the answers.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::ExecutionError;
use crate::message::{Instruction, Message};
use crate::tool::{Tool, ToolResult};

/// Identifies a structured-output model and carries its JSON schema.
///
/// The module/name split survives serialization, so a document produced
/// in one process can name the model it expects without linking to the
/// concrete type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub module: String,
    pub name: String,
    /// JSON schema the provider must conform to
    #[serde(default)]
    pub schema: Value,
}

impl ModelSpec {
    /// Builds a spec from a schema-deriving type, using its Rust path
    /// as the module/name pair.
    pub fn of<T: JsonSchema>() -> Self {
        let full = std::any::type_name::<T>();
        let (module, name) = match full.rsplit_once("::") {
            Some((module, name)) => (module.to_string(), name.to_string()),
            None => (String::new(), full.to_string()),
        };
        let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null);
        Self {
            module,
            name,
            schema,
        }
    }

    pub fn new(
        module: impl Into<String>,
        name: impl Into<String>,
        schema: Value,
    ) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            schema,
        }
    }

    /// Fully qualified path, e.g. `my_app::models::Order`
    pub fn path(&self) -> String {
        if self.module.is_empty() {
            self.name.clone()
        } else {
            format!("{}::{}", self.module, self.name)
        }
    }
}

/// Provider of conversational judgements.
///
/// All methods see the transcript so far plus step-local instructions and
/// must not mutate either; the engine owns message bookkeeping.
#[async_trait]
pub trait Decider: Send + Sync {
    /// Produce the next assistant message.
    async fn reply(
        &self,
        messages: &[Message],
        instructions: &[Instruction],
    ) -> Result<Message, ExecutionError>;

    /// Answer a yes/no question about the conversation.
    async fn decide(
        &self,
        messages: &[Message],
        instructions: &[Instruction],
    ) -> Result<bool, ExecutionError>;

    /// Pick one of the given options, returned verbatim.
    async fn choose(
        &self,
        messages: &[Message],
        options: &[String],
        instructions: &[Instruction],
    ) -> Result<String, ExecutionError>;

    /// Produce structured data conforming to the model's schema.
    async fn create(
        &self,
        messages: &[Message],
        model: &ModelSpec,
        instructions: &[Instruction],
    ) -> Result<Value, ExecutionError>;

    /// Select the most suitable tool for the conversation.
    async fn equip(
        &self,
        messages: &[Message],
        tools: &[Arc<dyn Tool>],
    ) -> Result<Arc<dyn Tool>, ExecutionError>;

    /// Produce arguments for the tool and run it.
    async fn invoke(
        &self,
        messages: &[Message],
        tool: &Arc<dyn Tool>,
    ) -> Result<ToolResult, ExecutionError>;
}

use serde_json::Value;
use std::sync::Arc;

use crate::decider::{Decider, ModelSpec};
use crate::error::ExecutionError;
use crate::message::{Instruction, Message};
use crate::tool::{Tool, ToolResult};

/// The conversation a flow executes against: the transcript so far plus
/// the decision provider consulted for every judgement.
///
/// Branching nodes capture a [`savepoint`](Context::savepoint) before
/// entering a branch and [`rollback_to`](Context::rollback_to) it if the
/// branch fails, so partial output never leaks into the transcript.
pub struct Context {
    messages: Vec<Message>,
    decider: Arc<dyn Decider>,
    tools: Vec<Arc<dyn Tool>>,
}

impl Context {
    pub fn new(decider: Arc<dyn Decider>, messages: Vec<Message>) -> Self {
        Self {
            messages,
            decider,
            tools: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_front(&mut self, message: Message) {
        self.messages.insert(0, message);
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Makes a session-level tool available to custom steps.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    /// Current message count, to be restored with
    /// [`rollback_to`](Context::rollback_to).
    pub fn savepoint(&self) -> usize {
        self.messages.len()
    }

    /// Discards every message appended after the savepoint was taken.
    pub fn rollback_to(&mut self, savepoint: usize) {
        if self.messages.len() > savepoint {
            log::debug!(
                "Rolling back {} message(s)",
                self.messages.len() - savepoint
            );
            self.messages.truncate(savepoint);
        }
    }

    pub async fn reply(&self, instructions: &[Instruction]) -> Result<Message, ExecutionError> {
        self.decider.reply(&self.messages, instructions).await
    }

    pub async fn decide(&self, instructions: &[Instruction]) -> Result<bool, ExecutionError> {
        self.decider.decide(&self.messages, instructions).await
    }

    pub async fn choose(
        &self,
        options: &[String],
        instructions: &[Instruction],
    ) -> Result<String, ExecutionError> {
        self.decider
            .choose(&self.messages, options, instructions)
            .await
    }

    pub async fn create(
        &self,
        model: &ModelSpec,
        instructions: &[Instruction],
    ) -> Result<Value, ExecutionError> {
        self.decider.create(&self.messages, model, instructions).await
    }

    pub async fn equip(
        &self,
        tools: &[Arc<dyn Tool>],
    ) -> Result<Arc<dyn Tool>, ExecutionError> {
        self.decider.equip(&self.messages, tools).await
    }

    pub async fn invoke(&self, tool: &Arc<dyn Tool>) -> Result<ToolResult, ExecutionError> {
        self.decider.invoke(&self.messages, tool).await
    }
}

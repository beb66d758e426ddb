// SPDX-License-Identifier: MIT

//! Fluent flow construction
//!
//! A [`Flow`] is a named sequence of nodes built by chaining. Steps that
//! cannot be misconfigured return `Self`; steps with arity requirements
//! (`invoke`, `choose`, `route`) return `Result` so a bad build fails at
//! construction time, not mid-conversation.

use schemars::JsonSchema;
use std::sync::Arc;
use uuid::Uuid;

use crate::context::Context;
use crate::decider::{Decider, ModelSpec};
use crate::error::{ConfigError, ExecutionError};
use crate::flow::engine::Engine;
use crate::flow::node::Node;
use crate::message::{Instruction, Instructions, Message};
use crate::tool::Tool;

/// A named, ordered sequence of workflow steps.
#[derive(Debug, Clone)]
pub struct Flow {
    name: String,
    description: String,
    nodes: Vec<Node>,
}

impl Flow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            nodes: Vec::new(),
        }
    }

    /// A flow with a generated unique name.
    pub fn anonymous() -> Self {
        Self::new(format!("Flow-{}", Uuid::new_v4()))
    }

    pub(crate) fn from_parts(name: String, description: String, nodes: Vec<Node>) -> Self {
        Self {
            name,
            description,
            nodes,
        }
    }

    /// Sets the description used when a route presents this flow as an
    /// option.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Appends a prebuilt node.
    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Adds a fixed message to the end of the conversation.
    /// Bare strings become system messages.
    pub fn append(self, message: impl Into<Message>) -> Self {
        self.node(Node::Append(message.into()))
    }

    /// Inserts a fixed message at the front of the conversation.
    pub fn prepend(self, message: impl Into<Message>) -> Self {
        self.node(Node::Prepend(message.into()))
    }

    /// Asks the provider for the next assistant message. Pass `()` for
    /// no extra instructions.
    pub fn reply(self, instructions: impl Instructions) -> Self {
        self.node(Node::Reply(instructions.into_instructions()))
    }

    /// Branches on a yes/no judgement of the prompt.
    pub fn decide(
        self,
        prompt: impl Into<Message>,
        on_true: impl Into<Node>,
        on_false: impl Into<Node>,
    ) -> Self {
        self.node(Node::Decide {
            on_true: Box::new(on_true.into()),
            on_false: Box::new(on_false.into()),
            instructions: vec![Instruction::Message(prompt.into())],
        })
    }

    /// Branches on a keyed selection among the given choices.
    pub fn choose<K, N>(
        self,
        prompt: impl Into<Message>,
        choices: impl IntoIterator<Item = (K, N)>,
    ) -> Result<Self, ConfigError>
    where
        K: Into<String>,
        N: Into<Node>,
    {
        let choices = choices
            .into_iter()
            .map(|(key, node)| (key.into(), node.into()))
            .collect();
        let node = Node::choose(choices, vec![Instruction::Message(prompt.into())])?;
        Ok(self.node(node))
    }

    /// Lets the provider pick one of the tools and run it.
    pub fn invoke(
        self,
        tools: impl IntoIterator<Item = Arc<dyn Tool>>,
    ) -> Result<Self, ConfigError> {
        let node = Node::invoke(tools.into_iter().collect())?;
        Ok(self.node(node))
    }

    /// Asks the provider for structured data conforming to `T`'s schema.
    pub fn create<T: JsonSchema>(self, instructions: impl Instructions) -> Self {
        self.create_model(ModelSpec::of::<T>(), instructions)
    }

    /// Like [`create`](Flow::create), but with an explicit model spec.
    pub fn create_model(self, model: ModelSpec, instructions: impl Instructions) -> Self {
        self.node(Node::Create {
            model,
            instructions: instructions.into_instructions(),
        })
    }

    /// Runs another flow inline.
    pub fn then(self, flow: Flow) -> Self {
        self.node(Node::Flow(flow))
    }

    /// Dispatches to whichever of the flows best fits the conversation,
    /// judged by their descriptions.
    pub fn route(self, flows: impl IntoIterator<Item = Flow>) -> Result<Self, ConfigError> {
        let node = Node::route(flows.into_iter().collect())?;
        Ok(self.node(node))
    }

    /// Adds an in-process async step. Custom steps cannot be serialized.
    pub fn custom<F>(self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> futures::future::BoxFuture<'a, Result<(), ExecutionError>>
            + Send
            + Sync
            + 'static,
    {
        self.node(Node::custom(f))
    }

    /// Executes this flow against an existing context.
    pub async fn execute(&self, context: &mut Context) -> Result<(), ExecutionError> {
        Engine::new().run(self, context).await
    }

    /// Executes this flow on a fresh context seeded with the given
    /// messages, returning the finished context.
    pub async fn run(
        &self,
        decider: Arc<dyn Decider>,
        messages: Vec<Message>,
    ) -> Result<Context, ExecutionError> {
        let mut context = Context::new(decider, messages);
        self.execute(&mut context).await?;
        Ok(context)
    }
}

impl Default for Flow {
    fn default() -> Self {
        Self::anonymous()
    }
}

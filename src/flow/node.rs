use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::decider::ModelSpec;
use crate::error::{ConfigError, ExecutionError};
use crate::flow::Flow;
use crate::message::{Instruction, Message};
use crate::tool::Tool;

/// Async closure over the context, usable only in-process.
pub type CustomFn =
    dyn for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<(), ExecutionError>> + Send + Sync;

/// One step of workflow logic.
///
/// The set of kinds is closed: the engine and the serializer both match
/// exhaustively, so adding a kind forces every consumer to handle it.
/// [`Node::Custom`] is the runtime-only escape hatch and refuses to
/// serialize.
#[derive(Clone)]
pub enum Node {
    /// Append a fixed message to the end of the conversation
    Append(Message),
    /// Insert a fixed message at the front of the conversation
    Prepend(Message),
    /// Ask the provider for the next assistant message
    Reply(Vec<Instruction>),
    /// Have the provider pick one of the tools and run it
    Invoke(Vec<Arc<dyn Tool>>),
    /// Have the provider produce data conforming to a model schema
    Create {
        model: ModelSpec,
        instructions: Vec<Instruction>,
    },
    /// Do nothing
    NoOp,
    /// Run child nodes in order, without isolation
    Sequence(Vec<Node>),
    /// Yes/no branch; the taken branch runs isolated
    Decide {
        on_true: Box<Node>,
        on_false: Box<Node>,
        instructions: Vec<Instruction>,
    },
    /// Keyed branch; the selected branch runs isolated
    Choose {
        choices: Vec<(String, Node)>,
        instructions: Vec<Instruction>,
    },
    /// Dispatch to one of several named flows by description
    Route(Vec<Flow>),
    /// A nested flow run inline
    Flow(Flow),
    /// In-process async step, not serializable
    Custom(Arc<CustomFn>),
}

impl Node {
    pub fn invoke(tools: Vec<Arc<dyn Tool>>) -> Result<Node, ConfigError> {
        if tools.is_empty() {
            return Err(ConfigError::InvokeWithoutTools);
        }
        Ok(Node::Invoke(tools))
    }

    pub fn choose(
        choices: Vec<(String, Node)>,
        instructions: Vec<Instruction>,
    ) -> Result<Node, ConfigError> {
        if choices.is_empty() {
            return Err(ConfigError::ChooseWithoutChoices);
        }
        Ok(Node::Choose {
            choices,
            instructions,
        })
    }

    pub fn route(flows: Vec<Flow>) -> Result<Node, ConfigError> {
        if flows.len() < 2 {
            return Err(ConfigError::RouteTooFewFlows(flows.len()));
        }
        Ok(Node::Route(flows))
    }

    pub fn custom<F>(f: F) -> Node
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<(), ExecutionError>>
            + Send
            + Sync
            + 'static,
    {
        Node::Custom(Arc::new(f))
    }

    /// Lowercase kind name, matching the document `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Append(_) => "append",
            Node::Prepend(_) => "prepend",
            Node::Reply(_) => "reply",
            Node::Invoke(_) => "invoke",
            Node::Create { .. } => "create",
            Node::NoOp => "noop",
            Node::Sequence(_) => "sequence",
            Node::Decide { .. } => "decide",
            Node::Choose { .. } => "choose",
            Node::Route(_) => "route",
            Node::Flow(_) => "flow",
            Node::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Append(m) | Node::Prepend(m) => {
                write!(f, "{}({:?})", self.kind(), m.text().unwrap_or("<structured>"))
            }
            Node::Invoke(tools) => write!(f, "invoke({} tool(s))", tools.len()),
            Node::Create { model, .. } => write!(f, "create({})", model.path()),
            Node::Sequence(nodes) => write!(f, "sequence({} node(s))", nodes.len()),
            Node::Choose { choices, .. } => write!(f, "choose({} option(s))", choices.len()),
            Node::Route(flows) => write!(f, "route({} flow(s))", flows.len()),
            Node::Flow(flow) => write!(f, "flow({:?})", flow.name()),
            _ => write!(f, "{}", self.kind()),
        }
    }
}

impl From<Flow> for Node {
    fn from(flow: Flow) -> Self {
        Node::Flow(flow)
    }
}

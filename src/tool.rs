use async_trait::async_trait;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};
use std::error::Error;
use std::sync::Arc;

use crate::message::Content;

static EMPTY_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {}
    })
});

/// How a tool can be rebuilt from a document when the instance itself
/// is not registered.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRef {
    /// A free function addressable by target path
    Function { target: String },
    /// A constructor or factory addressable by target path
    Constructor { target: String },
}

impl ToolRef {
    pub fn target(&self) -> &str {
        match self {
            ToolRef::Function { target } => target,
            ToolRef::Constructor { target } => target,
        }
    }
}

/// A capability a decision provider can select and run
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name
    fn name(&self) -> &str;

    /// Human-readable description of what the tool does
    fn description(&self) -> &str;

    /// JSON schema describing the tool's arguments
    fn schema(&self) -> &Value;

    /// Run the tool with provider-generated arguments.
    async fn run(&self, args: Value) -> Result<Value, Box<dyn Error + Send + Sync>>;

    /// Declarative handle for serialization. Tools without one can only
    /// appear in documents through a registry.
    fn reference(&self) -> Option<&ToolRef> {
        None
    }
}

/// Outcome of a single tool run
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool: String,
    pub result: Value,
}

impl ToolResult {
    pub fn new(tool: impl Into<String>, result: Value) -> Self {
        Self {
            tool: tool.into(),
            result,
        }
    }

    /// Renders the result as `{tool, result}` mapping content for the
    /// transcript.
    pub fn into_content(self) -> Content {
        let mut map = Map::new();
        map.insert("tool".to_string(), Value::String(self.tool));
        map.insert("result".to_string(), self.result);
        Content::Mapping(map)
    }
}

type ToolFn =
    dyn Fn(Value) -> BoxFuture<'static, Result<Value, Box<dyn Error + Send + Sync>>> + Send + Sync;

/// A tool backed by an async closure.
///
/// ```ignore
/// let double = FnTool::new("double", "Doubles a number", |args| {
///     Box::pin(async move {
///         let n = args["n"].as_i64().unwrap_or(0);
///         Ok(json!(n * 2))
///     })
/// });
/// ```
pub struct FnTool {
    name: String,
    description: String,
    schema: Value,
    reference: Option<ToolRef>,
    run: Arc<ToolFn>,
}

impl FnTool {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, run: F) -> Self
    where
        F: Fn(Value) -> BoxFuture<'static, Result<Value, Box<dyn Error + Send + Sync>>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema: EMPTY_SCHEMA.clone(),
            reference: None,
            run: Arc::new(run),
        }
    }

    /// Replaces the default empty-object argument schema.
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Marks the tool as serializable through the given reference.
    pub fn with_reference(mut self, reference: ToolRef) -> Self {
        self.reference = Some(reference);
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> &Value {
        &self.schema
    }

    async fn run(&self, args: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        (self.run)(args).await
    }

    fn reference(&self) -> Option<&ToolRef> {
        self.reference.as_ref()
    }
}

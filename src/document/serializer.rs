use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::document::types::{
    ContentDoc, FlowDoc, InstructionDoc, MessageDoc, NodeDoc, ToolDoc, TypedInstructionDoc,
    FLOW_DOC_VERSION,
};
use crate::document::validator::FlowValidator;
use crate::error::{SerializeError, ValidationError};
use crate::flow::{Flow, Node};
use crate::message::{Content, Instruction, Message};
use crate::registry::ToolRegistry;
use crate::tool::{Tool, ToolRef};

/// Converts between runtime flows and YAML documents.
///
/// Serialization is total over the declarative node kinds and refuses
/// `Custom` nodes. Deserialization validates the raw YAML first, so
/// every structural problem is reported in one pass, then decodes the
/// document and resolves tools through the registry.
pub struct FlowSerializer {
    registry: ToolRegistry,
    validator: FlowValidator,
}

impl FlowSerializer {
    pub fn new() -> Self {
        Self::with_registry(ToolRegistry::new())
    }

    pub fn with_registry(registry: ToolRegistry) -> Self {
        Self {
            registry,
            validator: FlowValidator::new(),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    /// Registers a tool so it serializes by name and resolves on load.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        self.registry.register(tool);
    }

    /// Registers a factory for function and constructor tool documents.
    pub fn register_target<F>(&mut self, target: impl Into<String>, factory: F)
    where
        F: Fn(&str, &str) -> Arc<dyn Tool> + Send + Sync + 'static,
    {
        self.registry.register_target(target, factory);
    }

    pub fn serialize_flow(&self, flow: &Flow) -> Result<FlowDoc, SerializeError> {
        let nodes = flow
            .nodes()
            .iter()
            .map(|node| self.serialize_node(node))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FlowDoc {
            name: flow.name().to_string(),
            description: flow.description().to_string(),
            version: Some(FLOW_DOC_VERSION.to_string()),
            nodes,
        })
    }

    fn serialize_node(&self, node: &Node) -> Result<NodeDoc, SerializeError> {
        match node {
            Node::Append(message) => Ok(NodeDoc::Append {
                message: serialize_message(message),
            }),
            Node::Prepend(message) => Ok(NodeDoc::Prepend {
                message: serialize_message(message),
            }),
            Node::Reply(instructions) => Ok(NodeDoc::Reply {
                instructions: serialize_instructions(instructions),
            }),
            Node::Invoke(tools) => {
                let tools = tools
                    .iter()
                    .map(|tool| self.serialize_tool(tool))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(NodeDoc::Invoke { tools })
            }
            Node::Create {
                model,
                instructions,
            } => Ok(NodeDoc::Create {
                model: model.clone(),
                instructions: serialize_instructions(instructions),
            }),
            Node::NoOp => Ok(NodeDoc::Noop),
            Node::Sequence(nodes) => Ok(NodeDoc::Sequence {
                nodes: nodes
                    .iter()
                    .map(|child| self.serialize_node(child))
                    .collect::<Result<Vec<_>, _>>()?,
            }),
            Node::Decide {
                on_true,
                on_false,
                instructions,
            } => Ok(NodeDoc::Decide {
                on_true: Box::new(self.serialize_node(on_true)?),
                on_false: Box::new(self.serialize_node(on_false)?),
                instructions: serialize_instructions(instructions),
            }),
            Node::Choose {
                choices,
                instructions,
            } => {
                let mut sorted = BTreeMap::new();
                for (key, child) in choices {
                    sorted.insert(key.clone(), self.serialize_node(child)?);
                }
                Ok(NodeDoc::Choose {
                    choices: sorted,
                    instructions: serialize_instructions(instructions),
                })
            }
            Node::Route(flows) => Ok(NodeDoc::Route {
                flows: flows
                    .iter()
                    .map(|flow| self.serialize_flow(flow))
                    .collect::<Result<Vec<_>, _>>()?,
            }),
            // A nested flow flattens to a sequence; its name is not kept
            Node::Flow(flow) => Ok(NodeDoc::Sequence {
                nodes: flow
                    .nodes()
                    .iter()
                    .map(|child| self.serialize_node(child))
                    .collect::<Result<Vec<_>, _>>()?,
            }),
            Node::Custom(_) => Err(SerializeError::not_serializable("Custom node")),
        }
    }

    fn serialize_tool(&self, tool: &Arc<dyn Tool>) -> Result<ToolDoc, SerializeError> {
        if let Some(name) = self.registry.name_of(tool) {
            return Ok(ToolDoc::Registered {
                name: name.to_string(),
            });
        }
        match tool.reference() {
            Some(ToolRef::Function { target }) => Ok(ToolDoc::Function {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                target: target.clone(),
            }),
            Some(ToolRef::Constructor { target }) => Ok(ToolDoc::Constructor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                target: target.clone(),
            }),
            None => Err(SerializeError::not_serializable(format!(
                "Tool '{}'",
                tool.name()
            ))),
        }
    }

    pub fn deserialize_flow(&self, doc: &FlowDoc) -> Result<Flow, SerializeError> {
        let nodes = doc
            .nodes
            .iter()
            .map(|node| self.deserialize_node(node))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Flow::from_parts(
            doc.name.clone(),
            doc.description.clone(),
            nodes,
        ))
    }

    fn deserialize_node(&self, doc: &NodeDoc) -> Result<Node, SerializeError> {
        match doc {
            NodeDoc::Append { message } => Ok(Node::Append(deserialize_message(message))),
            NodeDoc::Prepend { message } => Ok(Node::Prepend(deserialize_message(message))),
            NodeDoc::Reply { instructions } => {
                Ok(Node::Reply(deserialize_instructions(instructions)))
            }
            NodeDoc::Invoke { tools } => {
                let tools = tools
                    .iter()
                    .map(|tool| self.deserialize_tool(tool))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Node::invoke(tools)?)
            }
            NodeDoc::Create {
                model,
                instructions,
            } => Ok(Node::Create {
                model: model.clone(),
                instructions: deserialize_instructions(instructions),
            }),
            NodeDoc::Noop => Ok(Node::NoOp),
            NodeDoc::Sequence { nodes } => Ok(Node::Sequence(
                nodes
                    .iter()
                    .map(|child| self.deserialize_node(child))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            NodeDoc::Decide {
                on_true,
                on_false,
                instructions,
            } => Ok(Node::Decide {
                on_true: Box::new(self.deserialize_node(on_true)?),
                on_false: Box::new(self.deserialize_node(on_false)?),
                instructions: deserialize_instructions(instructions),
            }),
            NodeDoc::Choose {
                choices,
                instructions,
            } => {
                let mut runtime = Vec::with_capacity(choices.len());
                for (key, child) in choices {
                    runtime.push((key.clone(), self.deserialize_node(child)?));
                }
                Ok(Node::choose(
                    runtime,
                    deserialize_instructions(instructions),
                )?)
            }
            NodeDoc::Route { flows } => {
                let flows = flows
                    .iter()
                    .map(|flow| self.deserialize_flow(flow))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Node::route(flows)?)
            }
        }
    }

    fn deserialize_tool(&self, doc: &ToolDoc) -> Result<Arc<dyn Tool>, SerializeError> {
        match doc {
            ToolDoc::Registered { name } => self
                .registry
                .get(name)
                .ok_or_else(|| SerializeError::unresolved(name, "Tool is not registered")),
            ToolDoc::Function {
                name,
                description,
                target,
            }
            | ToolDoc::Constructor {
                name,
                description,
                target,
            } => self.registry.resolve(target, name, description).ok_or_else(|| {
                SerializeError::unresolved(target, "No factory registered for this target")
            }),
        }
    }

    /// Renders a flow as a YAML document.
    pub fn to_yaml(&self, flow: &Flow) -> Result<String, SerializeError> {
        let doc = self.serialize_flow(flow)?;
        Ok(serde_yaml::to_string(&doc)?)
    }

    /// Validates and loads a flow from YAML text.
    pub fn from_yaml(&self, text: &str) -> Result<Flow, SerializeError> {
        let raw: serde_yaml::Value = serde_yaml::from_str(text)?;
        self.validator.validate(&raw)?;
        let doc: FlowDoc = serde_yaml::from_value(raw)?;
        let flow = self.deserialize_flow(&doc)?;
        log::info!(
            "Loaded flow '{}' with {} node(s)",
            flow.name(),
            flow.nodes().len()
        );
        Ok(flow)
    }

    /// Checks YAML text against the document schema without building a
    /// flow. Syntax errors are reported through the same error type as
    /// structural ones.
    pub fn validate_yaml(&self, text: &str) -> Result<(), ValidationError> {
        let raw: serde_yaml::Value = match serde_yaml::from_str(text) {
            Ok(raw) => raw,
            Err(err) => {
                return Err(ValidationError::new(
                    "Invalid YAML syntax".to_string(),
                    vec![err.to_string()],
                ))
            }
        };
        self.validator.validate(&raw)
    }

    pub fn save_yaml(&self, flow: &Flow, path: impl AsRef<Path>) -> Result<(), SerializeError> {
        let yaml = self.to_yaml(flow)?;
        std::fs::write(path.as_ref(), yaml)?;
        log::debug!("Saved flow '{}' to {}", flow.name(), path.as_ref().display());
        Ok(())
    }

    pub fn load_yaml(&self, path: impl AsRef<Path>) -> Result<Flow, SerializeError> {
        let text = std::fs::read_to_string(path)?;
        self.from_yaml(&text)
    }
}

impl Default for FlowSerializer {
    fn default() -> Self {
        Self::new()
    }
}

fn serialize_message(message: &Message) -> MessageDoc {
    MessageDoc {
        role: message.role,
        content: serialize_content(&message.content),
    }
}

fn serialize_content(content: &Content) -> ContentDoc {
    match content {
        Content::Text(value) => ContentDoc::String {
            value: value.clone(),
        },
        Content::Mapping(value) => ContentDoc::Mapping {
            value: value.clone(),
        },
        Content::Sequence(value) => ContentDoc::Sequence {
            value: value.clone(),
        },
        Content::Structured { model, data } => ContentDoc::StructuredModel {
            model: model.clone(),
            data: data.clone(),
        },
    }
}

fn serialize_instructions(instructions: &[Instruction]) -> Vec<InstructionDoc> {
    instructions.iter().map(serialize_instruction).collect()
}

fn serialize_instruction(instruction: &Instruction) -> InstructionDoc {
    match instruction {
        Instruction::Text(value) => InstructionDoc::Typed(TypedInstructionDoc::String {
            value: value.clone(),
        }),
        Instruction::Message(message) => InstructionDoc::Typed(TypedInstructionDoc::Message {
            value: serialize_message(message),
        }),
    }
}

fn deserialize_message(doc: &MessageDoc) -> Message {
    Message {
        role: doc.role,
        content: deserialize_content(&doc.content),
    }
}

fn deserialize_content(doc: &ContentDoc) -> Content {
    match doc {
        ContentDoc::String { value } => Content::Text(value.clone()),
        ContentDoc::Mapping { value } => Content::Mapping(value.clone()),
        ContentDoc::Sequence { value } => Content::Sequence(value.clone()),
        ContentDoc::StructuredModel { model, data } => Content::Structured {
            model: model.clone(),
            data: data.clone(),
        },
    }
}

fn deserialize_instructions(docs: &[InstructionDoc]) -> Vec<Instruction> {
    docs.iter().map(deserialize_instruction).collect()
}

fn deserialize_instruction(doc: &InstructionDoc) -> Instruction {
    match doc {
        InstructionDoc::Bare(text) => Instruction::Text(text.clone()),
        InstructionDoc::Typed(TypedInstructionDoc::String { value }) => {
            Instruction::Text(value.clone())
        }
        InstructionDoc::Typed(TypedInstructionDoc::Message { value }) => {
            Instruction::Message(deserialize_message(value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decider::ModelSpec;
    use crate::tool::FnTool;
    use serde_json::json;

    fn echo_tool(name: &str) -> Arc<dyn Tool> {
        Arc::new(FnTool::new(name, "Echoes the arguments", |args| {
            Box::pin(async move { Ok(args) })
        }))
    }

    fn sample_flow() -> Flow {
        let escalate = Flow::new("Escalate")
            .describe("Hands off to a human")
            .append(Message::assistant("Let me get a human."));
        let resolve = Flow::new("Resolve")
            .describe("Answers directly")
            .reply("Be helpful.");
        Flow::new("support")
            .describe("Support entry point")
            .append("You are a support agent.")
            .decide(
                "Is the user angry?",
                Node::Append(Message::assistant("I understand your frustration.")),
                Node::NoOp,
            )
            .choose(
                "What does the user need?",
                [
                    ("refund", Node::Reply(vec!["Offer a refund.".into()])),
                    ("other", Node::NoOp),
                ],
            )
            .unwrap()
            .route([escalate, resolve])
            .unwrap()
            .create_model(
                ModelSpec::new("support", "Ticket", json!({"type": "object"})),
                "Summarize the conversation as a ticket.",
            )
            .reply(())
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let serializer = FlowSerializer::new();
        let flow = sample_flow();

        let yaml = serializer.to_yaml(&flow).unwrap();
        let reloaded = serializer.from_yaml(&yaml).unwrap();

        assert_eq!(reloaded.name(), "support");
        assert_eq!(reloaded.description(), "Support entry point");
        assert_eq!(
            serializer.serialize_flow(&flow).unwrap(),
            serializer.serialize_flow(&reloaded).unwrap()
        );
    }

    #[test]
    fn test_version_is_emitted() {
        let serializer = FlowSerializer::new();
        let yaml = serializer
            .to_yaml(&Flow::new("v").append("x"))
            .unwrap();
        assert!(yaml.contains("version: '1.0'"));
    }

    #[test]
    fn test_custom_nodes_refuse_to_serialize() {
        let serializer = FlowSerializer::new();
        let flow = Flow::new("runtime-only").custom(|_| Box::pin(async { Ok(()) }));

        let err = serializer.to_yaml(&flow).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Custom node cannot be serialized. Use YAML for declarative flows only."
        );
    }

    #[test]
    fn test_nested_flow_flattens_to_sequence() {
        let serializer = FlowSerializer::new();
        let inner = Flow::new("inner").append("a").append("b");
        let flow = Flow::new("outer").then(inner);

        let doc = serializer.serialize_flow(&flow).unwrap();
        match &doc.nodes[0] {
            NodeDoc::Sequence { nodes } => assert_eq!(nodes.len(), 2),
            other => panic!("expected sequence, got {other:?}"),
        }
    }

    #[test]
    fn test_registered_tool_serializes_by_name() {
        let mut serializer = FlowSerializer::new();
        let tool = echo_tool("echo");
        serializer.register_tool(tool.clone());
        let flow = Flow::new("tools").invoke([tool]).unwrap();

        let doc = serializer.serialize_flow(&flow).unwrap();
        match &doc.nodes[0] {
            NodeDoc::Invoke { tools } => {
                assert_eq!(
                    tools[0],
                    ToolDoc::Registered {
                        name: "echo".to_string()
                    }
                );
            }
            other => panic!("expected invoke, got {other:?}"),
        }

        let reloaded = serializer.deserialize_flow(&doc).unwrap();
        match &reloaded.nodes()[0] {
            Node::Invoke(tools) => assert_eq!(tools[0].name(), "echo"),
            other => panic!("expected invoke, got {other:?}"),
        }
    }

    #[test]
    fn test_referenced_tool_round_trips_through_factory() {
        let mut serializer = FlowSerializer::new();
        let tool: Arc<dyn Tool> = Arc::new(
            FnTool::new("weather", "Looks up the forecast", |_| {
                Box::pin(async { Ok(json!("sunny")) })
            })
            .with_reference(ToolRef::Function {
                target: "demos::weather".to_string(),
            }),
        );
        let flow = Flow::new("forecast").invoke([tool]).unwrap();

        let doc = serializer.serialize_flow(&flow).unwrap();
        match &doc.nodes[0] {
            NodeDoc::Invoke { tools } => {
                assert_eq!(
                    tools[0],
                    ToolDoc::Function {
                        name: "weather".to_string(),
                        description: "Looks up the forecast".to_string(),
                        target: "demos::weather".to_string(),
                    }
                );
            }
            other => panic!("expected invoke, got {other:?}"),
        }

        let err = serializer.deserialize_flow(&doc).unwrap_err();
        assert!(matches!(err, SerializeError::UnresolvedReference { .. }));
        assert!(err.to_string().contains("demos::weather"));

        serializer.register_target("demos::weather", |name, description| {
            Arc::new(FnTool::new(name, description, |_| {
                Box::pin(async { Ok(json!("sunny")) })
            })) as Arc<dyn Tool>
        });
        let reloaded = serializer.deserialize_flow(&doc).unwrap();
        match &reloaded.nodes()[0] {
            Node::Invoke(tools) => {
                assert_eq!(tools[0].name(), "weather");
                assert_eq!(tools[0].description(), "Looks up the forecast");
            }
            other => panic!("expected invoke, got {other:?}"),
        }
    }

    #[test]
    fn test_anonymous_tool_refuses_to_serialize() {
        let serializer = FlowSerializer::new();
        let flow = Flow::new("tools").invoke([echo_tool("mystery")]).unwrap();

        let err = serializer.to_yaml(&flow).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Tool 'mystery' cannot be serialized. Use YAML for declarative flows only."
        );
    }

    #[test]
    fn test_missing_registry_entry_reports_reference() {
        let serializer = FlowSerializer::new();
        let yaml = r#"
            name: tools
            nodes:
              - type: invoke
                tools:
                  - type: registered
                    name: absent
        "#;
        let err = serializer.from_yaml(yaml).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot resolve reference 'absent': Tool is not registered"
        );
    }

    #[test]
    fn test_from_yaml_reports_all_validation_errors() {
        let serializer = FlowSerializer::new();
        let yaml = r#"
            nodes:
              - type: replay
              - type: append
        "#;
        let err = serializer.from_yaml(yaml).unwrap_err();
        match err {
            SerializeError::Validation(err) => {
                assert_eq!(err.errors.len(), 3);
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_validate_yaml_wraps_syntax_errors() {
        let serializer = FlowSerializer::new();
        let err = serializer.validate_yaml("name: [unclosed").unwrap_err();
        assert_eq!(err.message, "Invalid YAML syntax");
        assert_eq!(err.errors.len(), 1);
    }

    #[test]
    fn test_save_and_load_yaml() {
        let serializer = FlowSerializer::new();
        let flow = Flow::new("disk").append("persisted").reply(());
        let path = std::env::temp_dir().join(format!("parley-{}.yaml", uuid::Uuid::new_v4()));

        serializer.save_yaml(&flow, &path).unwrap();
        let reloaded = serializer.load_yaml(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(reloaded.name(), "disk");
        assert_eq!(reloaded.nodes().len(), 2);
    }
}

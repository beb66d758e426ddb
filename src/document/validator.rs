use serde_yaml::Value;

use crate::error::ValidationError;

const VALID_NODE_TYPES: [&str; 10] = [
    "append", "choose", "create", "decide", "invoke", "noop", "prepend", "reply", "route",
    "sequence",
];

const VALID_ROLES: [&str; 4] = ["assistant", "system", "tool", "user"];
const VALID_CONTENT_TYPES: [&str; 4] = ["mapping", "sequence", "string", "structured-model"];
const VALID_TOOL_TYPES: [&str; 3] = ["constructor", "function", "registered"];

/// Structural validator for flow documents.
///
/// Walks the raw YAML and collects every problem it can find rather
/// than stopping at the first, so a single pass reports the full repair
/// list. Locations are spelled out in the diagnostics, e.g.
/// `Node 3 (sequence).node[1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowValidator;

impl FlowValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validates a parsed document.
    pub fn validate(&self, doc: &Value) -> Result<(), ValidationError> {
        let errors = self.collect(doc);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(
                format!("Flow validation failed with {} error(s)", errors.len()),
                errors,
            ))
        }
    }

    /// Collects every diagnostic without judging the overall result.
    pub fn collect(&self, doc: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        self.check_flow(doc, &mut errors);
        errors
    }

    fn check_flow(&self, doc: &Value, errors: &mut Vec<String>) {
        if !doc.is_mapping() {
            errors.push("Flow document must be a mapping".to_string());
            return;
        }

        match doc.get("name") {
            None => errors.push("Missing required field: 'name'".to_string()),
            Some(name) if !name.is_string() => {
                errors.push("Field 'name' must be a string".to_string())
            }
            _ => {}
        }

        if let Some(description) = doc.get("description") {
            if !description.is_string() {
                errors.push("Field 'description' must be a string if present".to_string());
            }
        }

        match doc.get("nodes") {
            None => errors.push("Missing required field: 'nodes'".to_string()),
            Some(nodes) => match nodes.as_sequence() {
                None => errors.push("Field 'nodes' must be a list".to_string()),
                Some(nodes) => self.check_nodes(nodes, errors),
            },
        }
    }

    fn check_nodes(&self, nodes: &[Value], errors: &mut Vec<String>) {
        if nodes.is_empty() {
            errors.push("'nodes' list cannot be empty".to_string());
            return;
        }
        for (i, node) in nodes.iter().enumerate() {
            self.check_node(node, &format!("Node {i}"), errors);
        }
    }

    /// Validates a route's inner flow, prefixing every diagnostic with
    /// the route's location.
    fn check_flow_scoped(&self, doc: &Value, scope: &str, errors: &mut Vec<String>) {
        let mut inner = Vec::new();
        self.check_flow(doc, &mut inner);
        errors.extend(inner.into_iter().map(|e| format!("{scope}: {e}")));
    }

    fn check_node(&self, node: &Value, label: &str, errors: &mut Vec<String>) {
        if !node.is_mapping() {
            errors.push(format!("{label}: Node must be a mapping"));
            return;
        }

        let node_type = match node.get("type") {
            None => {
                errors.push(format!("{label}: Missing 'type' field"));
                return;
            }
            Some(t) => match t.as_str() {
                Some(t) => t,
                None => {
                    errors.push(format!("{label}: 'type' must be a string"));
                    return;
                }
            },
        };

        if !VALID_NODE_TYPES.contains(&node_type) {
            let mut message = format!("{label}: Invalid type '{node_type}'.");
            if let Some(suggestion) = suggest(node_type, &VALID_NODE_TYPES) {
                message.push_str(&format!(" Did you mean '{suggestion}'?"));
            }
            message.push_str(&format!(" Must be one of: {}", VALID_NODE_TYPES.join(", ")));
            errors.push(message);
            return;
        }

        let scoped = format!("{label} ({node_type})");
        match node_type {
            "append" | "prepend" => match node.get("message") {
                None => errors.push(missing_field(&scoped, "message")),
                Some(message) => self.check_message(message, &scoped, errors),
            },
            "reply" => match node.get("instructions") {
                None => errors.push(missing_field(&scoped, "instructions")),
                Some(instructions) => self.check_instructions(instructions, &scoped, errors),
            },
            "invoke" => match node.get("tools") {
                None => errors.push(missing_field(&scoped, "tools")),
                Some(tools) => self.check_tools(tools, &scoped, errors),
            },
            "create" => {
                match node.get("model") {
                    None => errors.push(missing_field(&scoped, "model")),
                    Some(model) => self.check_model(model, &scoped, errors),
                }
                match node.get("instructions") {
                    None => errors.push(missing_field(&scoped, "instructions")),
                    Some(instructions) => self.check_instructions(instructions, &scoped, errors),
                }
            }
            "noop" => {}
            "sequence" => match node.get("nodes") {
                None => errors.push(missing_field(&scoped, "nodes")),
                Some(nodes) => match nodes.as_sequence() {
                    None => errors.push(format!("{scoped}: 'nodes' must be a list")),
                    Some(nodes) => {
                        if nodes.is_empty() {
                            errors
                                .push(format!("{scoped}: Sequence 'nodes' list cannot be empty"));
                        }
                        for (i, child) in nodes.iter().enumerate() {
                            self.check_node(child, &format!("{scoped}.node[{i}]"), errors);
                        }
                    }
                },
            },
            "decide" => {
                match node.get("on_true") {
                    None => errors.push(missing_field(&scoped, "on_true")),
                    Some(child) => self.check_node(child, &format!("{scoped}.on_true"), errors),
                }
                match node.get("on_false") {
                    None => errors.push(missing_field(&scoped, "on_false")),
                    Some(child) => self.check_node(child, &format!("{scoped}.on_false"), errors),
                }
                match node.get("instructions") {
                    None => errors.push(missing_field(&scoped, "instructions")),
                    Some(instructions) => self.check_instructions(instructions, &scoped, errors),
                }
            }
            "choose" => {
                match node.get("choices") {
                    None => errors.push(missing_field(&scoped, "choices")),
                    Some(choices) => self.check_choices(choices, &scoped, errors),
                }
                match node.get("instructions") {
                    None => errors.push(missing_field(&scoped, "instructions")),
                    Some(instructions) => self.check_instructions(instructions, &scoped, errors),
                }
            }
            "route" => match node.get("flows") {
                None => errors.push(missing_field(&scoped, "flows")),
                Some(flows) => self.check_flows(flows, &scoped, errors),
            },
            _ => {}
        }
    }

    fn check_message(&self, message: &Value, label: &str, errors: &mut Vec<String>) {
        if !message.is_mapping() {
            errors.push(format!("{label}: 'message' must be a mapping"));
            return;
        }

        match message.get("role") {
            None => errors.push(format!("{label}: Message missing 'role' field")),
            Some(role) => {
                let role = render(role);
                if !VALID_ROLES.contains(&role.as_str()) {
                    errors.push(format!(
                        "{label}: Invalid role '{role}'. Must be one of: {}",
                        VALID_ROLES.join(", ")
                    ));
                }
            }
        }

        match message.get("content") {
            None => errors.push(format!("{label}: Message missing 'content' field")),
            Some(content) => {
                if content.is_mapping() {
                    self.check_content(content, label, errors);
                } else {
                    errors.push(format!("{label}: 'content' must be a mapping"));
                }
            }
        }
    }

    fn check_content(&self, content: &Value, label: &str, errors: &mut Vec<String>) {
        let content_type = match content.get("type") {
            None => {
                errors.push(format!("{label}: Message content missing 'type' field"));
                return;
            }
            Some(t) => render(t),
        };

        if !VALID_CONTENT_TYPES.contains(&content_type.as_str()) {
            errors.push(format!(
                "{label}: Invalid content type '{content_type}'. Must be one of: {}",
                VALID_CONTENT_TYPES.join(", ")
            ));
            return;
        }

        let required: &[&str] = match content_type.as_str() {
            "structured-model" => &["model", "data"],
            _ => &["value"],
        };
        for field in required {
            if content.get(*field).is_none() {
                errors.push(format!("{label}: Message content missing '{field}' field"));
            }
        }
    }

    fn check_instructions(&self, instructions: &Value, label: &str, errors: &mut Vec<String>) {
        let items = match instructions.as_sequence() {
            Some(items) => items,
            None => {
                errors.push(format!("{label}: 'instructions' must be a list"));
                return;
            }
        };

        for (i, item) in items.iter().enumerate() {
            if item.is_string() {
                continue;
            }
            if !item.is_mapping() {
                errors.push(format!("{label}: Instruction {i} must be a string or mapping"));
                continue;
            }
            let item_type = match item.get("type") {
                None => {
                    errors.push(format!("{label}: Instruction {i} missing 'type' field"));
                    continue;
                }
                Some(t) => render(t),
            };
            match item_type.as_str() {
                "string" => {
                    if item.get("value").is_none() {
                        errors.push(format!("{label}: Instruction {i} missing 'value' field"));
                    }
                }
                "message" => {
                    let empty = Value::Mapping(serde_yaml::Mapping::new());
                    let value = item.get("value").unwrap_or(&empty);
                    self.check_message(value, &format!("{label} instruction {i}"), errors);
                }
                other => {
                    errors.push(format!("{label}: Instruction {i} has invalid type '{other}'"))
                }
            }
        }
    }

    fn check_tools(&self, tools: &Value, label: &str, errors: &mut Vec<String>) {
        let items = match tools.as_sequence() {
            Some(items) => items,
            None => {
                errors.push(format!("{label}: 'tools' must be a list"));
                return;
            }
        };

        if items.is_empty() {
            errors.push(format!("{label}: 'tools' list cannot be empty"));
        }

        for (i, tool) in items.iter().enumerate() {
            if !tool.is_mapping() {
                errors.push(format!("{label}: Tool {i} must be a mapping"));
                continue;
            }
            let tool_type = match tool.get("type") {
                None => {
                    errors.push(format!("{label}: Tool {i} missing 'type' field"));
                    continue;
                }
                Some(t) => render(t),
            };
            let required: &[&str] = match tool_type.as_str() {
                "registered" => &["name"],
                "function" | "constructor" => &["name", "description", "target"],
                other => {
                    errors.push(format!(
                        "{label}: Tool {i} has invalid type '{other}'. Must be one of: {}",
                        VALID_TOOL_TYPES.join(", ")
                    ));
                    continue;
                }
            };
            for field in required {
                if tool.get(*field).is_none() {
                    errors.push(format!(
                        "{label}: Tool {i} ({tool_type}): Missing '{field}' field"
                    ));
                }
            }
        }
    }

    fn check_model(&self, model: &Value, label: &str, errors: &mut Vec<String>) {
        if !model.is_mapping() {
            errors.push(format!("{label}: 'model' must be a mapping"));
            return;
        }
        for field in ["module", "name"] {
            if model.get(field).is_none() {
                errors.push(format!("{label}: Model missing '{field}' field"));
            }
        }
    }

    fn check_choices(&self, choices: &Value, label: &str, errors: &mut Vec<String>) {
        let mapping = match choices.as_mapping() {
            Some(mapping) => mapping,
            None => {
                errors.push(format!("{label}: 'choices' must be a mapping"));
                return;
            }
        };

        if mapping.is_empty() {
            errors.push(format!("{label}: 'choices' mapping cannot be empty"));
        }

        for (key, value) in mapping {
            let key = match key.as_str() {
                Some(key) => key,
                None => {
                    errors.push(format!("{label}: Choice key must be a string"));
                    continue;
                }
            };
            if !value.is_mapping() {
                errors.push(format!("{label}: Choice '{key}' value must be a mapping"));
                continue;
            }
            self.check_node(value, &format!("{label}.choice['{key}']"), errors);
        }
    }

    fn check_flows(&self, flows: &Value, label: &str, errors: &mut Vec<String>) {
        let items = match flows.as_sequence() {
            Some(items) => items,
            None => {
                errors.push(format!("{label}: 'flows' must be a list"));
                return;
            }
        };

        if items.len() < 2 {
            errors.push(format!(
                "{label}: Route needs at least 2 flows, got {}",
                items.len()
            ));
        }

        for (i, flow) in items.iter().enumerate() {
            if !flow.is_mapping() {
                errors.push(format!("{label}: Flow {i} must be a mapping"));
                continue;
            }
            self.check_flow_scoped(flow, &format!("{label} flow {i}"), errors);
        }
    }
}

fn missing_field(label: &str, field: &str) -> String {
    format!("{label}: Missing required field '{field}'")
}

/// Best-effort text of a scalar for diagnostics.
fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_yaml::to_string(other)
            .unwrap_or_default()
            .trim_end()
            .to_string(),
    }
}

/// Closest valid name within edit distance 2, for typo hints.
fn suggest<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|candidate| (levenshtein(input, candidate), *candidate))
        .filter(|(distance, _)| *distance <= 2)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

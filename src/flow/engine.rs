use futures::future::BoxFuture;

use crate::context::Context;
use crate::error::ExecutionError;
use crate::flow::builder::Flow;
use crate::flow::node::Node;
use crate::message::{Content, Instruction, Message};

/// Interprets a node tree against a context.
///
/// Branching nodes (`Decide`, `Choose`, `Route`) run their selected branch
/// transactionally: a savepoint is taken before the branch and the
/// conversation is rolled back to it if the branch fails, so observers
/// never see partial branch output. Plain sequences are not isolated.
pub struct Engine {
    strict_choices: bool,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            strict_choices: false,
        }
    }

    /// An engine that fails on undeclared selections instead of logging
    /// and skipping them.
    pub fn strict() -> Self {
        Self {
            strict_choices: true,
        }
    }

    /// Runs every node of the flow in order.
    pub async fn run(&self, flow: &Flow, context: &mut Context) -> Result<(), ExecutionError> {
        log::debug!("Executing flow '{}'", flow.name());
        for node in flow.nodes() {
            self.execute(node, context).await?;
        }
        Ok(())
    }

    /// Executes a single node. Boxed so branch nodes can recurse.
    pub fn execute<'a>(
        &'a self,
        node: &'a Node,
        context: &'a mut Context,
    ) -> BoxFuture<'a, Result<(), ExecutionError>> {
        Box::pin(async move {
            log::trace!("Executing node {node:?}");
            match node {
                Node::Append(message) => {
                    context.push(message.clone());
                    Ok(())
                }
                Node::Prepend(message) => {
                    context.push_front(message.clone());
                    Ok(())
                }
                Node::Reply(instructions) => {
                    let reply = context.reply(instructions).await?;
                    context.push(reply);
                    Ok(())
                }
                Node::Invoke(tools) => {
                    let tool = context.equip(tools).await?;
                    log::debug!("Invoking tool '{}'", tool.name());
                    let result = context.invoke(&tool).await?;
                    context.push(Message::tool(result.into_content()));
                    Ok(())
                }
                Node::Create {
                    model,
                    instructions,
                } => {
                    let data = context.create(model, instructions).await?;
                    context.push(Message::system(Content::Structured {
                        model: model.path(),
                        data,
                    }));
                    Ok(())
                }
                Node::NoOp => Ok(()),
                Node::Sequence(nodes) => {
                    for child in nodes {
                        self.execute(child, context).await?;
                    }
                    Ok(())
                }
                Node::Decide {
                    on_true,
                    on_false,
                    instructions,
                } => {
                    let verdict = context.decide(instructions).await?;
                    log::debug!("Decision: {verdict}");
                    let branch = if verdict { on_true } else { on_false };
                    self.run_isolated(branch, context).await
                }
                Node::Choose {
                    choices,
                    instructions,
                } => {
                    let options: Vec<String> =
                        choices.iter().map(|(key, _)| key.clone()).collect();
                    let selected = context.choose(&options, instructions).await?;
                    match choices.iter().find(|(key, _)| *key == selected) {
                        Some((_, branch)) => self.run_isolated(branch, context).await,
                        None => self.undeclared("Choose", &selected),
                    }
                }
                Node::Route(flows) => {
                    let instruction = route_instruction(flows);
                    let options: Vec<String> =
                        flows.iter().map(|flow| flow.name().to_string()).collect();
                    let selected = context
                        .choose(&options, &[Instruction::Text(instruction)])
                        .await?;
                    match flows.iter().find(|flow| flow.name() == selected) {
                        Some(flow) => {
                            log::debug!("Routing to flow '{selected}'");
                            let savepoint = context.savepoint();
                            match self.run(flow, context).await {
                                Ok(()) => Ok(()),
                                Err(err) => {
                                    log::warn!("Routed flow '{selected}' failed: {err}");
                                    context.rollback_to(savepoint);
                                    Err(err)
                                }
                            }
                        }
                        None => self.undeclared("Route", &selected),
                    }
                }
                Node::Flow(flow) => self.run(flow, context).await,
                Node::Custom(step) => step(context).await,
            }
        })
    }

    async fn run_isolated(
        &self,
        node: &Node,
        context: &mut Context,
    ) -> Result<(), ExecutionError> {
        let savepoint = context.savepoint();
        match self.execute(node, context).await {
            Ok(()) => Ok(()),
            Err(err) => {
                log::warn!("Branch failed: {err}");
                context.rollback_to(savepoint);
                Err(err)
            }
        }
    }

    fn undeclared(&self, kind: &str, selected: &str) -> Result<(), ExecutionError> {
        if self.strict_choices {
            return Err(ExecutionError::UnknownChoice {
                choice: selected.to_string(),
            });
        }
        log::warn!("{kind} selected '{selected}', which is not a declared option; skipping");
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// The selection prompt a route presents, built from each flow's name
/// and description.
fn route_instruction(flows: &[Flow]) -> String {
    let descriptions: Vec<String> = flows
        .iter()
        .map(|flow| {
            let description = if flow.description().is_empty() {
                "No description provided."
            } else {
                flow.description()
            };
            format!("{}: {}", flow.name(), description)
        })
        .collect();
    format!(
        "Read the following option descriptions:\n{}\n\nSelect the most appropriate option to handle the conversation.",
        descriptions.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decider::{Decider, ModelSpec};
    use crate::message::Role;
    use crate::tool::{FnTool, Tool, ToolResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    struct ScriptedDecider {
        decision: bool,
        choice: String,
        captured: Arc<Mutex<Vec<String>>>,
    }

    fn scripted(decision: bool, choice: &str) -> (Arc<ScriptedDecider>, Arc<Mutex<Vec<String>>>) {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let decider = Arc::new(ScriptedDecider {
            decision,
            choice: choice.to_string(),
            captured: captured.clone(),
        });
        (decider, captured)
    }

    #[async_trait]
    impl Decider for ScriptedDecider {
        async fn reply(
            &self,
            _messages: &[Message],
            _instructions: &[Instruction],
        ) -> Result<Message, ExecutionError> {
            Ok(Message::assistant("scripted reply"))
        }

        async fn decide(
            &self,
            _messages: &[Message],
            _instructions: &[Instruction],
        ) -> Result<bool, ExecutionError> {
            Ok(self.decision)
        }

        async fn choose(
            &self,
            _messages: &[Message],
            _options: &[String],
            instructions: &[Instruction],
        ) -> Result<String, ExecutionError> {
            let mut captured = self.captured.lock().unwrap();
            for instruction in instructions {
                captured.push(
                    instruction
                        .as_message()
                        .text()
                        .unwrap_or_default()
                        .to_string(),
                );
            }
            Ok(self.choice.clone())
        }

        async fn create(
            &self,
            _messages: &[Message],
            _model: &ModelSpec,
            _instructions: &[Instruction],
        ) -> Result<Value, ExecutionError> {
            Ok(json!({"city": "Paris", "temperature": 21.5}))
        }

        async fn equip(
            &self,
            _messages: &[Message],
            tools: &[Arc<dyn Tool>],
        ) -> Result<Arc<dyn Tool>, ExecutionError> {
            tools
                .first()
                .cloned()
                .ok_or_else(|| ExecutionError::provider("no tools offered"))
        }

        async fn invoke(
            &self,
            _messages: &[Message],
            tool: &Arc<dyn Tool>,
        ) -> Result<ToolResult, ExecutionError> {
            let result = tool
                .run(json!({"a": 3, "b": 4}))
                .await
                .map_err(|e| ExecutionError::tool(tool.name(), e.to_string()))?;
            Ok(ToolResult::new(tool.name(), result))
        }
    }

    fn failing_node() -> Node {
        Node::custom(|_context| Box::pin(async { Err(ExecutionError::other("boom")) }))
    }

    fn texts(context: &Context) -> Vec<String> {
        context
            .messages()
            .iter()
            .map(|m| m.text().unwrap_or_default().to_string())
            .collect()
    }

    #[tokio::test]
    async fn append_reply_and_prepend_shape_the_transcript() {
        let (decider, _) = scripted(true, "");
        let flow = Flow::new("basics")
            .append(Message::user("hi"))
            .reply(())
            .prepend("You are terse.");

        let context = flow.run(decider, vec![]).await.unwrap();
        assert_eq!(
            texts(&context),
            vec!["You are terse.", "hi", "scripted reply"]
        );
        assert_eq!(context.messages()[0].role, Role::System);
        assert_eq!(context.messages()[2].role, Role::Assistant);
    }

    #[tokio::test]
    async fn sequence_failure_keeps_earlier_messages() {
        let (decider, _) = scripted(true, "");
        let flow = Flow::new("partial")
            .append(Message::user("kept"))
            .node(failing_node());

        let mut context = Context::new(decider, vec![]);
        let result = Engine::new().run(&flow, &mut context).await;
        assert!(result.is_err());
        assert_eq!(texts(&context), vec!["kept"]);
    }

    #[tokio::test]
    async fn decide_runs_the_matching_branch() {
        let (yes, _) = scripted(true, "");
        let flow = Flow::new("gate").decide(
            "Is this a greeting?",
            Node::Append(Message::assistant("hello branch")),
            Node::Append(Message::assistant("other branch")),
        );

        let context = flow.run(yes, vec![Message::user("hi")]).await.unwrap();
        assert_eq!(texts(&context), vec!["hi", "hello branch"]);

        let (no, _) = scripted(false, "");
        let flow = Flow::new("gate").decide(
            "Is this a greeting?",
            Node::Append(Message::assistant("hello branch")),
            Node::Append(Message::assistant("other branch")),
        );
        let context = flow.run(no, vec![Message::user("bye")]).await.unwrap();
        assert_eq!(texts(&context), vec!["bye", "other branch"]);
    }

    #[tokio::test]
    async fn failing_branch_rolls_back_to_savepoint() {
        let (decider, _) = scripted(true, "");
        let branch = Flow::new("doomed")
            .append(Message::assistant("partial one"))
            .append(Message::assistant("partial two"))
            .node(failing_node());
        let flow = Flow::new("gate").decide("Proceed?", branch, Node::NoOp);

        let mut context = Context::new(decider, vec![Message::user("hi")]);
        let result = Engine::new().run(&flow, &mut context).await;

        assert!(result.is_err());
        assert_eq!(texts(&context), vec!["hi"]);
    }

    #[tokio::test]
    async fn choose_dispatches_on_the_selected_key() {
        let (decider, _) = scripted(true, "refund");
        let flow = Flow::new("support")
            .choose(
                "What does the user want?",
                [
                    ("refund", Node::Append(Message::assistant("refund path"))),
                    ("billing", Node::Append(Message::assistant("billing path"))),
                ],
            )
            .unwrap();

        let context = flow.run(decider, vec![]).await.unwrap();
        assert_eq!(texts(&context), vec!["refund path"]);
    }

    #[tokio::test]
    async fn undeclared_choice_is_skipped_by_default() {
        let (decider, _) = scripted(true, "un-offered");
        let flow = Flow::new("support")
            .choose(
                "What does the user want?",
                [("refund", Node::Append(Message::assistant("refund path")))],
            )
            .unwrap()
            .append(Message::assistant("after"));

        let context = flow.run(decider, vec![]).await.unwrap();
        assert_eq!(texts(&context), vec!["after"]);
    }

    #[tokio::test]
    async fn strict_engine_rejects_undeclared_choice() {
        let (decider, _) = scripted(true, "un-offered");
        let flow = Flow::new("support")
            .choose(
                "What does the user want?",
                [("refund", Node::Append(Message::assistant("refund path")))],
            )
            .unwrap();

        let mut context = Context::new(decider, vec![]);
        let result = Engine::strict().run(&flow, &mut context).await;
        match result {
            Err(ExecutionError::UnknownChoice { choice }) => assert_eq!(choice, "un-offered"),
            other => panic!("expected unknown choice error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn route_presents_descriptions_and_runs_selected_flow() {
        let (decider, captured) = scripted(true, "MathFlow");
        let math = Flow::new("MathFlow")
            .describe("Handles arithmetic questions")
            .append(Message::assistant("math answer"));
        let other = Flow::new("OtherFlow").append(Message::assistant("other answer"));
        let flow = Flow::new("router").route([math, other]).unwrap();

        let context = flow
            .run(decider, vec![Message::user("what is 2+2?")])
            .await
            .unwrap();
        assert_eq!(texts(&context), vec!["what is 2+2?", "math answer"]);

        let captured = captured.lock().unwrap();
        assert_eq!(
            captured[0],
            "Read the following option descriptions:\n\
             MathFlow: Handles arithmetic questions\n\
             OtherFlow: No description provided.\n\n\
             Select the most appropriate option to handle the conversation."
        );
    }

    #[tokio::test]
    async fn failed_routed_flow_rolls_back() {
        let (decider, _) = scripted(true, "Doomed");
        let doomed = Flow::new("Doomed")
            .append(Message::assistant("partial"))
            .node(failing_node());
        let safe = Flow::new("Safe").append(Message::assistant("safe"));
        let flow = Flow::new("router").route([doomed, safe]).unwrap();

        let mut context = Context::new(decider, vec![Message::user("hi")]);
        let result = Engine::new().run(&flow, &mut context).await;
        assert!(result.is_err());
        assert_eq!(texts(&context), vec!["hi"]);
    }

    #[tokio::test]
    async fn invoke_appends_a_tool_message() {
        let (decider, _) = scripted(true, "");
        let adder: Arc<dyn Tool> = Arc::new(FnTool::new("adder", "Adds two numbers", |args| {
            Box::pin(async move {
                let a = args["a"].as_i64().unwrap_or(0);
                let b = args["b"].as_i64().unwrap_or(0);
                Ok(json!(a + b))
            })
        }));
        let flow = Flow::new("calc").invoke([adder]).unwrap();

        let context = flow.run(decider, vec![]).await.unwrap();
        let message = &context.messages()[0];
        assert_eq!(message.role, Role::Tool);
        match &message.content {
            Content::Mapping(map) => {
                assert_eq!(map["tool"], json!("adder"));
                assert_eq!(map["result"], json!(7));
            }
            other => panic!("expected mapping content, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_appends_structured_content() {
        let (decider, _) = scripted(true, "");
        let model = ModelSpec::new("weather", "Forecast", json!({"type": "object"}));
        let flow = Flow::new("forecast").create_model(model, "Forecast for tomorrow");

        let context = flow.run(decider, vec![]).await.unwrap();
        let message = &context.messages()[0];
        assert_eq!(message.role, Role::System);
        match &message.content {
            Content::Structured { model, data } => {
                assert_eq!(model, "weather::Forecast");
                assert_eq!(data["city"], json!("Paris"));
            }
            other => panic!("expected structured content, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn nested_flow_runs_inline_without_isolation() {
        let (decider, _) = scripted(true, "");
        let inner = Flow::new("inner")
            .append(Message::assistant("inner kept"))
            .node(failing_node());
        let flow = Flow::new("outer").then(inner);

        let mut context = Context::new(decider, vec![]);
        let result = Engine::new().run(&flow, &mut context).await;
        assert!(result.is_err());
        assert_eq!(texts(&context), vec!["inner kept"]);
    }
}

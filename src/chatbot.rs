//! Session-level assembly of skills and tools
//!
//! A [`Chatbot`] owns the conversation history and rebuilds its main flow
//! on every turn from the skills registered so far. Skills are ordinary
//! flows; with several of them the main flow routes by description.

use std::sync::Arc;

use crate::context::Context;
use crate::decider::Decider;
use crate::error::{ConfigError, ExecutionError, ParleyError};
use crate::flow::{Engine, Flow};
use crate::message::{Message, Role};
use crate::tool::Tool;

/// System prompt template applied when none is supplied. `{name}` and
/// `{description}` are replaced with the chatbot's fields.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are {name}, a conversational assistant.

{description}

Stay on topic and keep your answers grounded in the conversation so far.";

/// A stateful conversational session over skills and tools.
///
/// Each `chat` turn assembles a main flow from the registered skills
/// (none: plain reply; one: inlined; several: routed by description),
/// executes it against the session history, and adopts the result.
pub struct Chatbot {
    name: String,
    description: String,
    system_prompt: String,
    decider: Arc<dyn Decider>,
    skills: Vec<Flow>,
    tools: Vec<Arc<dyn Tool>>,
    messages: Vec<Message>,
    engine: Engine,
}

impl Chatbot {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        decider: Arc<dyn Decider>,
    ) -> Self {
        let name = name.into();
        let description = description.into();
        let system_prompt = render_prompt(DEFAULT_SYSTEM_PROMPT, &name, &description);
        Self {
            name,
            description,
            system_prompt,
            decider,
            skills: Vec::new(),
            tools: Vec::new(),
            messages: Vec::new(),
            engine: Engine::new(),
        }
    }

    /// Replaces the system prompt template. `{name}` and `{description}`
    /// placeholders are filled immediately.
    pub fn with_system_prompt(mut self, template: impl Into<String>) -> Self {
        self.system_prompt = render_prompt(&template.into(), &self.name, &self.description);
        self
    }

    /// Registers a skill flow. Its description is what routing sees.
    pub fn with_skill(mut self, skill: Flow) -> Self {
        self.skills.push(skill);
        self
    }

    /// Registers a session tool, available to custom steps through the
    /// context.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Replaces the engine, e.g. with [`Engine::strict`].
    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    /// Runs one conversation turn and returns the final message.
    ///
    /// The user text joins the history first; if the turn fails it stays
    /// there while the failed flow's effects are discarded with the
    /// context.
    pub async fn chat(&mut self, text: impl Into<String>) -> Result<Message, ParleyError> {
        self.messages.push(Message::user(text.into()));
        log::debug!(
            "Chat turn for '{}' with {} message(s) in history",
            self.name,
            self.messages.len()
        );

        let flow = self.build_flow()?;
        let mut context = Context::new(self.decider.clone(), self.seed_messages());
        for tool in &self.tools {
            context.register(tool.clone());
        }

        self.engine.run(&flow, &mut context).await?;

        self.messages = context.into_messages();
        self.messages
            .last()
            .cloned()
            .ok_or_else(|| ExecutionError::other("Conversation ended empty").into())
    }

    fn build_flow(&self) -> Result<Flow, ConfigError> {
        let flow = Flow::new("Main flow").prepend(self.system_prompt.as_str());

        match self.skills.len() {
            0 => Ok(flow.reply(())),
            1 => Ok(flow.then(self.skills[0].clone())),
            _ => flow.route(self.skills.iter().cloned()),
        }
    }

    // The flow prepends the prompt each turn; strip the copy adopted
    // last turn so only one stays at the front.
    fn seed_messages(&self) -> Vec<Message> {
        let mut seed = self.messages.clone();
        let has_prompt = seed
            .first()
            .map(|m| m.role == Role::System && m.text() == Some(self.system_prompt.as_str()))
            .unwrap_or(false);
        if has_prompt {
            seed.remove(0);
        }
        seed
    }
}

fn render_prompt(template: &str, name: &str, description: &str) -> String {
    template
        .replace("{name}", name)
        .replace("{description}", description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decider::ModelSpec;
    use crate::message::Instruction;
    use crate::tool::ToolResult;
    use async_trait::async_trait;
    use serde_json::Value;

    struct CannedDecider {
        reply: &'static str,
        route: Option<&'static str>,
        fail: bool,
    }

    impl CannedDecider {
        fn arc(reply: &'static str) -> Arc<dyn Decider> {
            Arc::new(Self {
                reply,
                route: None,
                fail: false,
            })
        }

        fn routing(reply: &'static str, route: &'static str) -> Arc<dyn Decider> {
            Arc::new(Self {
                reply,
                route: Some(route),
                fail: false,
            })
        }

        fn failing() -> Arc<dyn Decider> {
            Arc::new(Self {
                reply: "",
                route: None,
                fail: true,
            })
        }
    }

    #[async_trait]
    impl Decider for CannedDecider {
        async fn reply(
            &self,
            _messages: &[Message],
            _instructions: &[Instruction],
        ) -> Result<Message, ExecutionError> {
            if self.fail {
                return Err(ExecutionError::provider("model offline"));
            }
            Ok(Message::assistant(self.reply))
        }

        async fn decide(
            &self,
            _messages: &[Message],
            _instructions: &[Instruction],
        ) -> Result<bool, ExecutionError> {
            Ok(false)
        }

        async fn choose(
            &self,
            _messages: &[Message],
            options: &[String],
            _instructions: &[Instruction],
        ) -> Result<String, ExecutionError> {
            if let Some(route) = self.route {
                return Ok(route.to_string());
            }
            options
                .first()
                .cloned()
                .ok_or_else(|| ExecutionError::provider("no options"))
        }

        async fn create(
            &self,
            _messages: &[Message],
            _model: &ModelSpec,
            _instructions: &[Instruction],
        ) -> Result<Value, ExecutionError> {
            Ok(Value::Null)
        }

        async fn equip(
            &self,
            _messages: &[Message],
            tools: &[Arc<dyn Tool>],
        ) -> Result<Arc<dyn Tool>, ExecutionError> {
            tools
                .first()
                .cloned()
                .ok_or_else(|| ExecutionError::provider("no tools"))
        }

        async fn invoke(
            &self,
            _messages: &[Message],
            tool: &Arc<dyn Tool>,
        ) -> Result<ToolResult, ExecutionError> {
            let result = tool
                .run(serde_json::json!({}))
                .await
                .map_err(|err| ExecutionError::tool(tool.name(), err.to_string()))?;
            Ok(ToolResult::new(tool.name(), result))
        }
    }

    #[test]
    fn test_default_prompt_fills_placeholders() {
        let bot = Chatbot::new("Ada", "A math tutor.", CannedDecider::arc("ok"));
        assert!(bot.system_prompt().contains("Ada"));
        assert!(bot.system_prompt().contains("A math tutor."));
        assert!(!bot.system_prompt().contains("{name}"));
        assert!(!bot.system_prompt().contains("{description}"));
    }

    #[test]
    fn test_custom_prompt_template() {
        let bot = Chatbot::new("Ada", "A math tutor.", CannedDecider::arc("ok"))
            .with_system_prompt("{name}: {description}");
        assert_eq!(bot.system_prompt(), "Ada: A math tutor.");
    }

    #[test]
    fn test_flow_shape_without_skills() {
        let bot = Chatbot::new("Ada", "tutor", CannedDecider::arc("ok"));
        let flow = bot.build_flow().unwrap();
        let kinds: Vec<_> = flow.nodes().iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, ["prepend", "reply"]);
    }

    #[test]
    fn test_flow_shape_with_one_skill() {
        let bot = Chatbot::new("Ada", "tutor", CannedDecider::arc("ok"))
            .with_skill(Flow::new("solver"));
        let flow = bot.build_flow().unwrap();
        let kinds: Vec<_> = flow.nodes().iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, ["prepend", "flow"]);
    }

    #[test]
    fn test_flow_shape_with_many_skills() {
        let bot = Chatbot::new("Ada", "tutor", CannedDecider::arc("ok"))
            .with_skill(Flow::new("solver").describe("Solves equations"))
            .with_skill(Flow::new("grapher").describe("Plots functions"));
        let flow = bot.build_flow().unwrap();
        let kinds: Vec<_> = flow.nodes().iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, ["prepend", "route"]);
    }

    #[tokio::test]
    async fn test_chat_adopts_history_without_stacking_prompts() {
        let mut bot = Chatbot::new("Ada", "tutor", CannedDecider::arc("hello"));

        let reply = bot.chat("hi").await.unwrap();
        assert_eq!(reply.text(), Some("hello"));
        let roles: Vec<_> = bot.history().iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant]);

        bot.chat("more").await.unwrap();
        let system_count = bot
            .history()
            .iter()
            .filter(|m| m.role == Role::System)
            .count();
        assert_eq!(system_count, 1);
        assert_eq!(bot.history().len(), 5);
    }

    #[tokio::test]
    async fn test_chat_routes_to_named_skill() {
        let math = Flow::new("MathFlow")
            .describe("Handles math questions")
            .append(Message::assistant("math path"));
        let other = Flow::new("OtherFlow")
            .describe("Handles everything else")
            .append(Message::assistant("other path"));
        let mut bot = Chatbot::new("Ada", "tutor", CannedDecider::routing("ok", "MathFlow"))
            .with_skill(math)
            .with_skill(other);

        let reply = bot.chat("what is 2 + 2?").await.unwrap();
        assert_eq!(reply.text(), Some("math path"));
        assert!(!bot
            .history()
            .iter()
            .any(|m| m.text() == Some("other path")));
    }

    #[tokio::test]
    async fn test_failed_turn_keeps_user_message_only() {
        let mut bot = Chatbot::new("Ada", "tutor", CannedDecider::failing());

        let err = bot.chat("hi").await.unwrap_err();
        assert!(err.to_string().contains("model offline"));
        assert_eq!(bot.history().len(), 1);
        assert_eq!(bot.history()[0].role, Role::User);
        assert_eq!(bot.history()[0].text(), Some("hi"));
    }
}

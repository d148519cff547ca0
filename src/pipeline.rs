//! Response pipeline: decides between the tool-using agent and a plain
//! memory-backed conversation turn, and recovers an answer when the agent is
//! cut short.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::agent::context::RunLimits;
use crate::agent::executor::AgentExecutor;
use crate::agent::memory::{ConversationMemory, Role, SessionStore, DEFAULT_SESSION};
use crate::agent::tools::{Tool, ToolKind, ToolRegistry};
use crate::agent::{AgentRunResult, AgentStep};
use crate::error::Result;
use crate::model::ModelClient;
use crate::settings::{AgentConfig, RouterConfig};

/// Answer when the agent ran out of iterations without using any tool.
pub const APOLOGY: &str = "I tried to search but couldn't find relevant information. \
Please try again with a more specific query.";

/// Which path an input takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ToolSeeking,
    Conversational,
}

/// Keyword heuristic: any configured keyword as a case-insensitive substring
/// marks the input as tool-seeking.
///
/// Matching is plain substring search, so "find my cat a name" is
/// tool-seeking too.
pub fn classify_intent(input: &str, keywords: &[String]) -> Intent {
    let lower = input.to_lowercase();
    if keywords
        .iter()
        .any(|k| !k.is_empty() && lower.contains(&k.to_lowercase()))
    {
        Intent::ToolSeeking
    } else {
        Intent::Conversational
    }
}

/// If a completion is a JSON object with a non-empty string `output`, return
/// that. Anything else, an empty `output` included, comes back unchanged.
pub fn unwrap_output(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(map)) => match map.get("output") {
            Some(Value::String(output)) if !output.is_empty() => output.clone(),
            _ => raw.to_string(),
        },
        _ => raw.to_string(),
    }
}

pub struct ResponsePipeline {
    model: Arc<dyn ModelClient>,
    executor: AgentExecutor,
    tools: ToolRegistry,
    sessions: SessionStore,
    router: RouterConfig,
}

impl ResponsePipeline {
    pub fn new(
        model: Arc<dyn ModelClient>,
        tools: ToolRegistry,
        agent: &AgentConfig,
        router: RouterConfig,
    ) -> Self {
        Self {
            executor: AgentExecutor::new(model.clone(), RunLimits::from(agent)),
            model,
            tools,
            sessions: SessionStore::new(),
            router,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Add or replace a tool; the next agent run sees it.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        self.tools.register(tool)
    }

    /// Memory of a session, if it has been used.
    pub fn memory(&self, session_id: &str) -> Option<&ConversationMemory> {
        self.sessions.get(session_id).map(|s| s.memory())
    }

    /// Answer `input` in the default session.
    pub async fn respond(&mut self, input: &str) -> Result<String> {
        self.respond_in(DEFAULT_SESSION, input).await
    }

    /// Answer `input` in the given session.
    ///
    /// Fails fast with a connectivity error if the model service is down;
    /// no tool runs and memory is untouched in that case.
    pub async fn respond_in(&mut self, session_id: &str, input: &str) -> Result<String> {
        self.model.ping().await?;

        let intent = classify_intent(input, &self.router.tool_keywords);
        tracing::info!("Routing input in session '{}' as {:?}", session_id, intent);

        match intent {
            Intent::ToolSeeking => self.answer_with_tools(session_id, input).await,
            Intent::Conversational => self.converse(session_id, input).await,
        }
    }

    async fn answer_with_tools(&mut self, session_id: &str, input: &str) -> Result<String> {
        let session = self.sessions.get_or_create(session_id);
        let result = self.executor.run(input, &self.tools, session.memory()).await?;

        let answer = match result {
            AgentRunResult::Completed { output, .. } => unwrap_output(&output),
            AgentRunResult::Truncated { steps, reason } => {
                tracing::warn!(
                    "Agent truncated ({:?}) with {} steps, synthesizing",
                    reason,
                    steps.len()
                );
                if steps.is_empty() {
                    APOLOGY.to_string()
                } else {
                    let prompt = synthesis_prompt(input, &steps, &self.tools);
                    tracing::debug!("Synthesis prompt:\n{}", prompt);
                    unwrap_output(&self.model.complete(&prompt).await?)
                }
            }
        };

        if self.router.record_tool_turns {
            let memory = session.memory_mut();
            memory.append(Role::Human, input);
            memory.append(Role::Assistant, answer.clone());
        }
        Ok(answer)
    }

    async fn converse(&mut self, session_id: &str, input: &str) -> Result<String> {
        let session = self.sessions.get_or_create(session_id);
        let prompt = conversation_prompt(session.memory(), input);
        tracing::debug!("Conversation prompt:\n{}", prompt);

        let answer = unwrap_output(&self.model.complete(&prompt).await?);

        let memory = session.memory_mut();
        memory.append(Role::Human, input);
        memory.append(Role::Assistant, answer.clone());
        Ok(answer)
    }

    /// Clear the default session's memory.
    pub fn reset(&mut self) {
        self.reset_session(DEFAULT_SESSION);
    }

    /// Give a session a fresh empty memory. Returns whether it existed.
    pub fn reset_session(&mut self, session_id: &str) -> bool {
        match self.sessions.reset(session_id) {
            Some(old) => {
                tracing::info!(
                    "Reset session '{}' ({} turns discarded)",
                    session_id,
                    old.len()
                );
                true
            }
            None => false,
        }
    }
}

fn conversation_prompt(memory: &ConversationMemory, input: &str) -> String {
    if memory.is_empty() {
        format!("Human: {}\nAI:", input)
    } else {
        format!("{}\nHuman: {}\nAI:", memory.transcript(), input)
    }
}

/// Prompt that turns the steps of a truncated run into an answer.
///
/// Outputs are grouped by tool in order of first use. Tools whose results
/// only make sense next to their input (shell) show the command too.
pub(crate) fn synthesis_prompt(input: &str, steps: &[AgentStep], tools: &ToolRegistry) -> String {
    let mut order: Vec<&str> = Vec::new();
    let mut grouped: BTreeMap<&str, Vec<&AgentStep>> = BTreeMap::new();
    for step in steps {
        let name = step.tool_name.as_str();
        if !grouped.contains_key(name) {
            order.push(name);
        }
        grouped.entry(name).or_default().push(step);
    }

    let mut sections = Vec::with_capacity(order.len());
    for name in order {
        let echoes_input = tools
            .get(name)
            .map(|t| t.kind())
            .unwrap_or(ToolKind::Custom)
            .echoes_input();
        let entries: Vec<String> = grouped
            .get(name)
            .into_iter()
            .flatten()
            .map(|step| {
                if echoes_input {
                    format!("[{}] $ {}\n{}", name, step.tool_input, step.tool_output)
                } else {
                    format!("[{}] {}", name, step.tool_output)
                }
            })
            .collect();
        sections.push(format!("Results from {}:\n{}", name, entries.join("\n\n")));
    }

    format!(
        "Based on the following tool results about \"{}\", \
         please provide a helpful and complete response:\n\n{}\n\n\
         Your complete analysis and response:",
        input,
        sections.join("\n\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tools::tests::CountingTool;
    use crate::error::LanternError;
    use crate::model::mock::ScriptedModel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn keywords() -> Vec<String> {
        RouterConfig::default().tool_keywords
    }

    fn pipeline_with(
        model: Arc<ScriptedModel>,
        router: RouterConfig,
    ) -> (ResponsePipeline, Arc<AtomicUsize>) {
        let tool = CountingTool::new("web_search", 3, "Sunny, 21°C in Lisbon");
        let calls = tool.calls.clone();
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(tool));
        let pipeline = ResponsePipeline::new(model, tools, &AgentConfig::default(), router);
        (pipeline, calls)
    }

    fn pipeline(model: Arc<ScriptedModel>) -> (ResponsePipeline, Arc<AtomicUsize>) {
        pipeline_with(model, RouterConfig::default())
    }

    fn step(tool: &str, input: &str, output: &str) -> AgentStep {
        AgentStep {
            tool_name: tool.into(),
            tool_input: input.into(),
            tool_output: output.into(),
        }
    }

    #[test]
    fn test_classify_intent() {
        let kw = keywords();
        assert_eq!(classify_intent("What is 2+2?", &kw), Intent::Conversational);
        assert_eq!(classify_intent("SEARCH the news", &kw), Intent::ToolSeeking);
        assert_eq!(classify_intent("please Look Up rust", &kw), Intent::ToolSeeking);
        // Known heuristic limitation
        assert_eq!(classify_intent("find my cat a name", &kw), Intent::ToolSeeking);
        assert_eq!(classify_intent("anything", &[]), Intent::Conversational);
    }

    #[test]
    fn test_unwrap_output() {
        assert_eq!(unwrap_output(r#"{"output": "4"}"#), "4");
        assert_eq!(unwrap_output("plain text"), "plain text");
        assert_eq!(unwrap_output(r#"{"output": 4}"#), r#"{"output": 4}"#);
        assert_eq!(unwrap_output(r#"["output"]"#), r#"["output"]"#);
        assert_eq!(unwrap_output(r#"{"output": ""}"#), r#"{"output": ""}"#);
    }

    #[test]
    fn test_synthesis_prompt_groups_by_tool() {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(CountingTool::new("web_search", 3, "")));
        let steps = vec![
            step("web_search", "weather", "Sunny"),
            step("calculator", "2+2", "4"),
            step("web_search", "forecast", "Rain tomorrow"),
        ];
        let prompt = synthesis_prompt("weather and math", &steps, &tools);

        assert!(prompt.contains("about \"weather and math\""));
        let search = prompt.find("Results from web_search:\n[web_search] Sunny\n\n[web_search] Rain tomorrow");
        let calc = prompt.find("Results from calculator:\n[calculator] 4");
        assert!(search.is_some() && calc.is_some());
        assert!(search < calc, "groups follow first use");
    }

    #[test]
    fn test_synthesis_prompt_shows_shell_commands() {
        use crate::agent::builtin::shell::{CommandOutput, CommandRunner, ShellTool};

        struct NoopRunner;
        #[async_trait::async_trait]
        impl CommandRunner for NoopRunner {
            async fn run(&self, _command: &str) -> Result<CommandOutput> {
                Ok(CommandOutput::default())
            }
        }

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(ShellTool::new(Arc::new(NoopRunner), 2)));
        let prompt = synthesis_prompt("disk usage", &[step("shell", "df -h", "50% used")], &tools);
        assert!(prompt.contains("[shell] $ df -h\n50% used"));
    }

    #[tokio::test]
    async fn test_conversational_path() {
        let model = Arc::new(ScriptedModel::new(["2 + 2 is 4."]));
        let (mut pipeline, calls) = pipeline(model.clone());

        let answer = pipeline.respond("What is 2+2?").await.unwrap();

        assert_eq!(answer, "2 + 2 is 4.");
        assert_eq!(model.prompts(), vec!["Human: What is 2+2?\nAI:".to_string()]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let memory = pipeline.memory(DEFAULT_SESSION).unwrap();
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.turns()[0].role, Role::Human);
        assert_eq!(memory.turns()[0].text, "What is 2+2?");
        assert_eq!(memory.turns()[1].role, Role::Assistant);
        assert_eq!(memory.turns()[1].text, "2 + 2 is 4.");
    }

    #[tokio::test]
    async fn test_conversation_carries_history_and_unwraps() {
        let model = Arc::new(ScriptedModel::new(["Hi Ada!", r#"{"output": "Your name is Ada."}"#]));
        let (mut pipeline, _) = pipeline(model.clone());

        pipeline.respond("Hello, I'm Ada").await.unwrap();
        let answer = pipeline.respond("What's my name?").await.unwrap();

        assert_eq!(answer, "Your name is Ada.");
        assert_eq!(
            model.prompts()[1],
            "Human: Hello, I'm Ada\nAI: Hi Ada!\nHuman: What's my name?\nAI:"
        );
        assert_eq!(pipeline.memory(DEFAULT_SESSION).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_tool_path_search_then_answer() {
        let model = Arc::new(ScriptedModel::new([
            " I need the weather.\nAction: web_search\nAction Input: today's weather",
            " I now know the final answer\nFinal Answer: It's sunny and 21°C.",
        ]));
        let (mut pipeline, calls) = pipeline(model.clone());

        let answer = pipeline.respond("search for today's weather").await.unwrap();

        assert_eq!(answer, "It's sunny and 21°C.");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.memory(DEFAULT_SESSION).map(|m| m.len()), Some(0));
    }

    #[tokio::test]
    async fn test_tool_path_records_turns_when_configured() {
        let model = Arc::new(ScriptedModel::new(["Final Answer: done"]));
        let router = RouterConfig {
            record_tool_turns: true,
            ..RouterConfig::default()
        };
        let (mut pipeline, _) = pipeline_with(model, router);

        pipeline.respond("search something").await.unwrap();
        assert_eq!(pipeline.memory(DEFAULT_SESSION).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_truncation_with_steps_synthesizes() {
        let greedy = "Action: web_search\nAction Input: weather";
        let model = Arc::new(
            ScriptedModel::new(Vec::<String>::new()).with_fallback(greedy),
        );
        let (mut pipeline, calls) = pipeline(model.clone());

        let answer = pipeline.respond("search the weather").await.unwrap();

        // The synthesis completion also gets the fallback reply
        assert_eq!(answer, greedy);
        assert_eq!(calls.load(Ordering::SeqCst), 3, "budget caps the search");
        let prompts = model.prompts();
        assert_eq!(prompts.len(), 6, "five iterations plus one synthesis");
        let synthesis = prompts.last().unwrap();
        assert!(synthesis.contains("Results from web_search:"));
        assert!(synthesis.contains("Sunny, 21°C in Lisbon"));
    }

    #[tokio::test]
    async fn test_truncation_without_steps_apologizes() {
        let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
        let (mut pipeline, calls) = pipeline(model.clone());

        let answer = pipeline.respond("find nothing useful").await.unwrap();

        assert_eq!(answer, APOLOGY);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(model.calls(), 5, "no synthesis completion");
    }

    #[tokio::test]
    async fn test_reset_clears_history() {
        let model = Arc::new(ScriptedModel::new(["first", "second"]));
        let (mut pipeline, _) = pipeline(model.clone());

        pipeline.respond("Hello").await.unwrap();
        pipeline.reset();
        pipeline.respond("Hello again").await.unwrap();

        assert_eq!(model.prompts()[1], "Human: Hello again\nAI:");
        assert_eq!(pipeline.memory(DEFAULT_SESSION).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let model = Arc::new(ScriptedModel::new(["a", "b"]));
        let (mut pipeline, _) = pipeline(model.clone());

        pipeline.respond_in("alice", "hi").await.unwrap();
        pipeline.respond_in("bob", "hello").await.unwrap();

        assert_eq!(model.prompts()[1], "Human: hello\nAI:");
        assert!(pipeline.reset_session("alice"));
        assert!(!pipeline.reset_session("carol"));
        assert_eq!(pipeline.memory("bob").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_model_fails_fast() {
        let model = Arc::new(ScriptedModel::unreachable());
        let (mut pipeline, calls) = pipeline(model);

        let err = pipeline.respond("search the weather").await.unwrap_err();
        assert!(matches!(err, LanternError::ModelUnavailable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(pipeline.memory(DEFAULT_SESSION).is_none());
    }

    #[tokio::test]
    async fn test_registered_tool_is_used_next_run() {
        let model = Arc::new(ScriptedModel::new([
            "Action: document_qa\nAction Input: refund policy",
            "Final Answer: 14 days",
        ]));
        let (mut pipeline, _) = pipeline(model.clone());
        let doc_tool = CountingTool::new("document_qa", 3, "Refunds within 14 days");
        let doc_calls = doc_tool.calls.clone();
        pipeline.register_tool(Arc::new(doc_tool));

        let answer = pipeline.respond("find the refund policy").await.unwrap();
        assert_eq!(answer, "14 days");
        assert_eq!(doc_calls.load(Ordering::SeqCst), 1);
        assert!(model.prompts()[0].contains("document_qa: "));
    }
}

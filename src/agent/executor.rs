//! ReAct Executor: Reason + Act agent loop over a plain-text protocol.
//!
//! Each iteration:
//! 1. Builds a prompt from the tool descriptions, prior conversation, the
//!    question and the scratchpad of earlier actions and observations
//! 2. Completes it with the model client
//! 3. Parses the reply into a tool call or a final answer
//! 4. Invokes the tool under its budget and appends the observation
//!
//! The loop stops on a final answer, on the iteration limit, or when the
//! wall-clock limit has passed (checked between iterations). Only a model
//! connectivity failure ends a run with an error.

use std::sync::Arc;

use super::context::{RunContext, RunLimits};
use super::memory::ConversationMemory;
use super::tools::ToolRegistry;
use super::AgentRunResult;
use crate::error::Result;
use crate::model::ModelClient;

const FINAL_ANSWER: &str = "Final Answer:";
const ACTION: &str = "Action:";
const ACTION_INPUT: &str = "Action Input:";

pub const MISSING_ACTION_HINT: &str = "Invalid Format: Missing 'Action:' after 'Thought:'";
pub const MISSING_ACTION_INPUT_HINT: &str =
    "Invalid Format: Missing 'Action Input:' after 'Action:'";
pub const AMBIGUOUS_REPLY_HINT: &str = "Invalid Format: Reply contains both an action and a \
final answer. Either take one action or give the final answer.";

const PROMPT_PREFIX: &str =
    "Answer the following questions as best you can. You have access to the following tools:";

const FORMAT_INSTRUCTIONS: &str = "Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question";

/// What the model asked for in one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentIntent {
    ToolCall { tool: String, input: String },
    FinalAnswer { output: String },
}

/// The agent executor: runs ReAct loops against a model client.
pub struct AgentExecutor {
    model: Arc<dyn ModelClient>,
    limits: RunLimits,
}

impl AgentExecutor {
    pub fn new(model: Arc<dyn ModelClient>, limits: RunLimits) -> Self {
        Self { model, limits }
    }

    /// Execute one agent run for `input`.
    ///
    /// Budgets are counted in a fresh [`RunContext`], so every run starts with
    /// all tools at zero uses.
    pub async fn run(
        &self,
        input: &str,
        tools: &ToolRegistry,
        memory: &ConversationMemory,
    ) -> Result<AgentRunResult> {
        let mut ctx = RunContext::new(self.limits);
        let mut scratchpad = String::new();

        tracing::info!(
            "Agent run: model={}, tools={}, max_iter={}",
            self.model.model_name(),
            tools.len(),
            self.limits.max_iterations
        );

        loop {
            if let Some(reason) = ctx.limit_reached() {
                tracing::warn!(
                    "Agent stopped without a final answer after {} iterations ({:?}, {} steps)",
                    ctx.iterations(),
                    reason,
                    ctx.steps().len()
                );
                return Ok(AgentRunResult::Truncated {
                    steps: ctx.into_steps(),
                    reason,
                });
            }

            let iteration = ctx.begin_iteration();
            let prompt = build_prompt(tools, memory, input, &scratchpad);
            tracing::debug!("Agent iteration {} prompt:\n{}", iteration, prompt);

            let reply = match self.model.complete(&prompt).await {
                Ok(reply) => reply,
                Err(e) if e.is_connectivity() => return Err(e),
                Err(e) => {
                    tracing::warn!("Agent iteration {}: completion failed: {}", iteration, e);
                    append_observation(&mut scratchpad, "", &format!("Error: {}", e));
                    continue;
                }
            };
            let reply = strip_hallucinated_observation(&reply);

            match parse_intent(reply) {
                Ok(AgentIntent::FinalAnswer { output }) => {
                    tracing::info!(
                        "Agent finished in {} iterations, {} steps, {}ms",
                        iteration,
                        ctx.steps().len(),
                        ctx.elapsed().as_millis()
                    );
                    return Ok(AgentRunResult::Completed {
                        output,
                        steps: ctx.into_steps(),
                    });
                }
                Ok(AgentIntent::ToolCall { tool, input: tool_input }) => {
                    tracing::info!("Agent iteration {}: {}({})", iteration, tool, tool_input);
                    let invocation = tools.invoke(&mut ctx, &tool, &tool_input).await?;
                    append_observation(&mut scratchpad, reply, invocation.observation());
                }
                Err(hint) => {
                    tracing::warn!("Agent iteration {}: unparseable reply", iteration);
                    append_observation(&mut scratchpad, reply, hint);
                }
            }
        }
    }
}

/// Render the full ReAct prompt for one iteration.
pub(crate) fn build_prompt(
    tools: &ToolRegistry,
    memory: &ConversationMemory,
    input: &str,
    scratchpad: &str,
) -> String {
    let mut prompt = String::with_capacity(2048);
    prompt.push_str(PROMPT_PREFIX);
    prompt.push_str("\n\n");
    prompt.push_str(&tools.describe());
    prompt.push_str("\n\n");
    prompt.push_str(&FORMAT_INSTRUCTIONS.replace("{tool_names}", &tools.names().join(", ")));
    prompt.push_str("\n\n");

    if !memory.is_empty() {
        prompt.push_str("Previous conversation:\n");
        prompt.push_str(&memory.transcript());
        prompt.push_str("\n\n");
    }

    prompt.push_str("Begin!\n\nQuestion: ");
    prompt.push_str(input);
    prompt.push_str("\nThought:");
    prompt.push_str(scratchpad);
    prompt
}

fn append_observation(scratchpad: &mut String, reply: &str, observation: &str) {
    scratchpad.push_str(reply);
    scratchpad.push_str("\nObservation: ");
    scratchpad.push_str(observation);
    scratchpad.push_str("\nThought:");
}

/// Models often keep going and invent their own observation; drop it.
fn strip_hallucinated_observation(reply: &str) -> &str {
    match reply.find("\nObservation:") {
        Some(idx) => &reply[..idx],
        None => reply,
    }
}

/// Parse a model reply into an intent, or a corrective hint for the model.
pub fn parse_intent(reply: &str) -> std::result::Result<AgentIntent, &'static str> {
    let action_at = reply.find(ACTION);
    let final_at = reply.find(FINAL_ANSWER);

    match (action_at, final_at) {
        (Some(_), Some(_)) => Err(AMBIGUOUS_REPLY_HINT),
        (None, Some(idx)) => Ok(AgentIntent::FinalAnswer {
            output: reply[idx + FINAL_ANSWER.len()..].trim().to_string(),
        }),
        (Some(idx), None) => {
            let rest = &reply[idx + ACTION.len()..];
            let Some(input_at) = rest.find(ACTION_INPUT) else {
                return Err(MISSING_ACTION_INPUT_HINT);
            };
            let tool = clean_tool_name(&rest[..input_at]);
            if tool.is_empty() {
                return Err(MISSING_ACTION_HINT);
            }
            let input = clean_tool_input(&rest[input_at + ACTION_INPUT.len()..]);
            Ok(AgentIntent::ToolCall { tool, input })
        }
        (None, None) => Err(MISSING_ACTION_HINT),
    }
}

fn clean_tool_name(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| matches!(c, '`' | '"' | '\'' | '[' | ']' | '*'))
        .trim()
        .to_string()
}

fn clean_tool_input(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}

//! Tool registry: named tools with per-run call budgets.
//!
//! Tools are trait objects keyed by unique name. The registry can grow at
//! runtime (the document QA tool is re-registered after every upload); the
//! agent rebuilds its tool description block on every run, so nothing needs
//! invalidating when the set changes.
//!
//! Budgets are enforced here but counted in the caller's [`RunContext`], which
//! the agent creates fresh per run.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::context::RunContext;
use super::AgentStep;
use crate::error::{LanternError, Result};

/// Observations longer than this are cut before they reach the prompt.
const MAX_OBSERVATION_CHARS: usize = 8000;

/// Broad category of a tool, used when summarizing its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Search,
    Calculator,
    Shell,
    Retrieval,
    Custom,
}

impl ToolKind {
    /// Whether results should be shown alongside the command that made them.
    pub fn echoes_input(self) -> bool {
        matches!(self, ToolKind::Shell)
    }
}

/// A capability the agent can invoke with a text input.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model uses in `Action:` lines.
    fn name(&self) -> &str;

    /// One-line description shown to the model for tool selection.
    fn description(&self) -> &str;

    /// Maximum invocations per agent run.
    fn budget(&self) -> usize;

    fn kind(&self) -> ToolKind {
        ToolKind::Custom
    }

    /// Run the tool. Errors become observations unless they are connectivity
    /// failures of the model service.
    async fn invoke(&self, input: &str) -> Result<String>;
}

/// Outcome of asking the registry to invoke a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// The tool ran and produced output.
    Executed(String),
    /// The tool's budget was already spent; it did not run.
    BudgetExhausted(String),
    /// The tool ran and failed; the message describes the failure.
    Failed(String),
    /// The tool declined the input without acting on it.
    Refused(String),
    /// No tool with that name is registered.
    Unknown(String),
}

impl Invocation {
    /// Text fed back to the model as the observation.
    pub fn observation(&self) -> &str {
        match self {
            Invocation::Executed(s)
            | Invocation::BudgetExhausted(s)
            | Invocation::Failed(s)
            | Invocation::Refused(s)
            | Invocation::Unknown(s) => s,
        }
    }
}

/// Sentinel returned instead of running a tool past its budget.
pub fn budget_exhausted_message(name: &str, budget: usize) -> String {
    format!(
        "Tool '{}' has reached its limit of {} uses for this question. \
         Analyze the information you already have.",
        name, budget
    )
}

/// Tools available to the agent, keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing (and returning) any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        let name = tool.name().to_string();
        tracing::info!("Registering tool '{}' (budget {})", name, tool.budget());
        self.tools.insert(name, tool)
    }

    /// Find a registered tool by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| LanternError::ToolNotFound(name.to_string()))
    }

    /// Tool names in stable (sorted) order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// `name: description` lines for the agent prompt.
    pub fn describe(&self) -> String {
        self.tools
            .values()
            .map(|t| format!("{}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Invoke a tool under its budget, recording a step if it executed.
    /// Refusals spend budget but are not steps.
    ///
    /// Only a model connectivity failure is returned as `Err`; everything
    /// else is folded into the [`Invocation`].
    pub async fn invoke(
        &self,
        ctx: &mut RunContext,
        name: &str,
        input: &str,
    ) -> Result<Invocation> {
        let Some(tool) = self.tools.get(name) else {
            return Ok(Invocation::Unknown(format!(
                "{} is not a valid tool, try one of [{}].",
                name,
                self.names().join(", ")
            )));
        };

        if !ctx.try_consume(name, tool.budget()) {
            tracing::warn!("Tool '{}' over budget ({})", name, tool.budget());
            return Ok(Invocation::BudgetExhausted(budget_exhausted_message(
                name,
                tool.budget(),
            )));
        }

        let start = std::time::Instant::now();
        match tool.invoke(input).await {
            Ok(output) => {
                let output = truncate_observation(output);
                tracing::info!(
                    "Tool '{}' completed in {}ms ({} bytes)",
                    name,
                    start.elapsed().as_millis(),
                    output.len()
                );
                ctx.record_step(AgentStep {
                    tool_name: name.to_string(),
                    tool_input: input.to_string(),
                    tool_output: output.clone(),
                });
                Ok(Invocation::Executed(output))
            }
            Err(e) if e.is_connectivity() => Err(e),
            Err(LanternError::Refused(reason)) => {
                tracing::warn!("Tool '{}' refused its input", name);
                Ok(Invocation::Refused(reason))
            }
            Err(e) => {
                tracing::warn!("Tool '{}' failed: {}", name, e);
                Ok(Invocation::Failed(format!("Error: {}", e)))
            }
        }
    }
}

/// Cut an observation at a char boundary so it cannot blow the context.
fn truncate_observation(text: String) -> String {
    if text.len() <= MAX_OBSERVATION_CHARS {
        return text;
    }
    let safe_end = (0..=MAX_OBSERVATION_CHARS)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0);
    format!(
        "{}...\n[Result truncated: {} bytes total]",
        &text[..safe_end],
        text.len()
    )
}

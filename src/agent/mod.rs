//! Lantern agent engine.
//!
//! Implements a ReAct (Reason + Act) agent loop that:
//! 1. Describes the registered tools to the model in a text prompt
//! 2. Parses each completion into a tool call or a final answer
//! 3. Invokes tools under per-run call budgets
//! 4. Feeds observations back until a final answer or a limit is hit
//!
//! Truncation is a normal outcome: the caller gets the steps gathered so far
//! and decides how to answer from them.

pub mod builtin;
pub mod context;
pub mod executor;
pub mod memory;
pub mod safety;
pub mod tools;

use serde::Serialize;

/// One tool invocation that executed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentStep {
    pub tool_name: String,
    pub tool_input: String,
    pub tool_output: String,
}

/// Why a run stopped without a final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationReason {
    MaxIterations,
    WallTime,
}

/// Terminal state of an agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentRunResult {
    Completed {
        output: String,
        steps: Vec<AgentStep>,
    },
    Truncated {
        steps: Vec<AgentStep>,
        reason: TruncationReason,
    },
}

impl AgentRunResult {
    pub fn steps(&self) -> &[AgentStep] {
        match self {
            AgentRunResult::Completed { steps, .. } | AgentRunResult::Truncated { steps, .. } => {
                steps
            }
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, AgentRunResult::Truncated { .. })
    }
}

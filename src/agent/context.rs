//! Per-run state for the agent loop.
//!
//! A [`RunContext`] is created fresh for every agent run and threaded through
//! the loop and every tool invocation. It owns the tool call counters, so
//! budgets can never leak from one run into the next.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::{AgentStep, TruncationReason};

/// Iteration and wall-clock limits for one run.
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub max_iterations: usize,
    pub max_wall_time: Duration,
}

impl From<&crate::settings::AgentConfig> for RunLimits {
    fn from(config: &crate::settings::AgentConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            max_wall_time: config.max_wall_time(),
        }
    }
}

#[derive(Debug)]
pub struct RunContext {
    limits: RunLimits,
    started: Instant,
    iterations: usize,
    invocations: HashMap<String, usize>,
    steps: Vec<AgentStep>,
}

impl RunContext {
    pub fn new(limits: RunLimits) -> Self {
        Self {
            limits,
            started: Instant::now(),
            iterations: 0,
            invocations: HashMap::new(),
            steps: Vec::new(),
        }
    }

    /// Zero every tool counter.
    pub fn reset_budgets(&mut self) {
        self.invocations.clear();
    }

    /// How many times `tool` has been invoked in this run.
    pub fn invocations(&self, tool: &str) -> usize {
        self.invocations.get(tool).copied().unwrap_or(0)
    }

    /// Count one invocation of `tool` if it is still under `budget`.
    pub fn try_consume(&mut self, tool: &str, budget: usize) -> bool {
        let used = self.invocations.entry(tool.to_string()).or_insert(0);
        if *used >= budget {
            return false;
        }
        *used += 1;
        true
    }

    /// Which limit, if any, stops the loop before another iteration.
    pub fn limit_reached(&self) -> Option<TruncationReason> {
        if self.iterations >= self.limits.max_iterations {
            Some(TruncationReason::MaxIterations)
        } else if self.started.elapsed() >= self.limits.max_wall_time {
            Some(TruncationReason::WallTime)
        } else {
            None
        }
    }

    pub fn begin_iteration(&mut self) -> usize {
        self.iterations += 1;
        self.iterations
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn record_step(&mut self, step: AgentStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[AgentStep] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<AgentStep> {
        self.steps
    }
}

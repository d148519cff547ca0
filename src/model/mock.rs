//! Scripted model client for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::ModelClient;
use crate::error::{LanternError, Result};

/// Replays queued completions and records every prompt it receives.
pub(crate) struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
    reachable: bool,
    embeddings: bool,
}

impl ScriptedModel {
    pub(crate) fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            fallback: "Thought: I should keep going.".into(),
            prompts: Mutex::new(Vec::new()),
            reachable: true,
            embeddings: false,
        }
    }

    /// Reply used once the queue is drained.
    pub(crate) fn with_fallback(mut self, fallback: &str) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub(crate) fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new(Vec::<String>::new())
        }
    }

    /// Produce bag-of-letters embeddings instead of failing.
    pub(crate) fn with_embeddings(mut self) -> Self {
        self.embeddings = true;
        self
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if !self.reachable {
            return Err(LanternError::ModelUnavailable("connection refused".into()));
        }
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self.replies.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if !self.reachable {
            return Err(LanternError::ModelUnavailable("connection refused".into()));
        }
        if !self.embeddings {
            return Err(LanternError::Model("embedding model not pulled".into()));
        }
        let mut v = vec![0.0f32; 26];
        for c in text.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
            v[(c as u8 - b'a') as usize] += 1.0;
        }
        Ok(v)
    }

    async fn ping(&self) -> Result<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(LanternError::ModelUnavailable("connection refused".into()))
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

//! Retrieval tool over uploaded documents.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::tools::{Tool, ToolKind};
use crate::documents::DocumentStore;
use crate::error::{LanternError, Result};
use crate::model::ModelClient;

pub const DOCUMENT_QA_TOOL: &str = "document_qa";

/// Passages returned per question.
const PASSAGES_PER_QUERY: usize = 3;

pub struct DocumentQaTool {
    store: Arc<DocumentStore>,
    model: Arc<dyn ModelClient>,
    budget: usize,
    description: String,
}

impl DocumentQaTool {
    /// Build the tool for the store's current contents.
    ///
    /// The description names the uploaded files, so the tool is rebuilt and
    /// re-registered after every ingest.
    pub fn new(store: Arc<DocumentStore>, model: Arc<dyn ModelClient>, budget: usize) -> Self {
        let filenames = store.filenames();
        let description = if filenames.is_empty() {
            "Answer questions from the user's uploaded documents. \
             Input should be a question about their content."
                .to_string()
        } else {
            format!(
                "Answer questions from the user's uploaded documents ({}). \
                 Input should be a question about their content.",
                filenames.join(", ")
            )
        };
        Self {
            store,
            model,
            budget,
            description,
        }
    }
}

#[async_trait]
impl Tool for DocumentQaTool {
    fn name(&self) -> &str {
        DOCUMENT_QA_TOOL
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn budget(&self) -> usize {
        self.budget
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Retrieval
    }

    async fn invoke(&self, input: &str) -> Result<String> {
        let question = input.trim();
        if question.is_empty() {
            return Err(LanternError::Tool("Empty question".into()));
        }
        let passages = self
            .store
            .query(self.model.as_ref(), question, PASSAGES_PER_QUERY)
            .await?;
        if passages.is_empty() {
            return Ok("No relevant passages found in the uploaded documents.".into());
        }
        Ok(passages
            .iter()
            .map(|p| format!("[{}] {}", p.filename, p.content))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

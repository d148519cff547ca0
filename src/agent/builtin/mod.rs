//! Built-in tools registered at startup.

pub mod calculator;
pub mod document_qa;
pub mod shell;
pub mod web_search;

use std::sync::Arc;

use super::tools::Tool;
use crate::settings::AgentConfig;

pub use calculator::CalculatorTool;
pub use document_qa::{DocumentQaTool, DOCUMENT_QA_TOOL};
pub use shell::{ShellTool, SystemShell};
pub use web_search::WebSearchTool;

/// Tools available before any document is uploaded.
pub fn builtin_tools(config: &AgentConfig) -> Vec<Arc<dyn Tool>> {
    let mut tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(WebSearchTool::new(config.search_budget)),
        Arc::new(CalculatorTool::new(config.calculator_budget)),
    ];
    if config.shell_enabled {
        let runner = Arc::new(SystemShell::new(config.shell_timeout()));
        tools.push(Arc::new(ShellTool::new(runner, config.shell_budget)));
    }
    tools
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_is_opt_in() {
        let mut config = AgentConfig::default();
        let names: Vec<String> = builtin_tools(&config)
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(names, vec!["web_search", "calculator"]);

        config.shell_enabled = true;
        let tools = builtin_tools(&config);
        assert!(tools.iter().any(|t| t.name() == "shell"));
    }

    #[test]
    fn test_budgets_follow_config() {
        let config = AgentConfig {
            search_budget: 1,
            ..AgentConfig::default()
        };
        let tools = builtin_tools(&config);
        assert_eq!(tools[0].budget(), 1);
        assert_eq!(tools[1].budget(), config.calculator_budget);
    }
}

use crate::tools::types::{ToolContext, ToolDefinition, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult;

    fn name(&self) -> String {
        self.definition().name
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name();
        if self.tools.insert(name.clone(), tool).is_some() {
            log::warn!("[TOOLS] Tool '{}' registered twice, keeping the last one", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Definitions for `names`, in the given order. Unknown names are skipped.
    pub fn definitions_for(&self, names: &[&str]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|name| match self.tools.get(*name) {
                Some(tool) => Some(tool.definition()),
                None => {
                    log::warn!("[TOOLS] No tool named '{}' in the registry", name);
                    None
                }
            })
            .collect()
    }

    pub async fn execute(&self, name: &str, params: Value, context: &ToolContext) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.execute(params, context).await,
            None => ToolResult::error(format!("Unknown tool: {}", name)),
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::test_support::test_context;
    use crate::tools::types::ToolInputSchema;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".to_string(),
                description: "Echo the input".to_string(),
                input_schema: ToolInputSchema::default(),
            }
        }

        async fn execute(&self, params: Value, _context: &ToolContext) -> ToolResult {
            ToolResult::success(params.to_string())
        }
    }

    #[tokio::test]
    async fn test_execute_known_and_unknown() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let ctx = test_context();

        let ok = registry.execute("echo", json!({"a": 1}), &ctx).await;
        assert!(ok.success);
        assert_eq!(ok.content, r#"{"a":1}"#);

        let missing = registry.execute("nope", json!({}), &ctx).await;
        assert!(!missing.success);
        assert_eq!(missing.content, "Unknown tool: nope");
    }

    #[test]
    fn test_definitions_for_keeps_order_and_skips_unknown() {
        let registry = crate::tools::create_default_registry();
        let defs = registry.definitions_for(&["select_hotel", "missing", "reserve"]);
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["select_hotel", "reserve"]);
    }
}

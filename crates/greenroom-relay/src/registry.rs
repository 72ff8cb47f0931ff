//! Merged tool catalog: tool name to owning service.

use std::collections::HashMap;

use tracing::warn;

use greenroom_core::{is_injection_tool, ToolDef};

/// The single tool surface presented to the agent. Injection tools are
/// never registered here; reserved names resolve to nothing.
#[derive(Default)]
pub struct ToolRegistry {
    owners: HashMap<String, String>,
    catalog: Vec<ToolDef>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry::default()
    }

    /// Merge one service's public catalog. First registration of a name
    /// wins; later duplicates are dropped with a warning.
    pub fn register(&mut self, service: &str, tools: Vec<ToolDef>) {
        for tool in tools {
            if is_injection_tool(&tool.name) {
                warn!(service, tool = %tool.name, "backend advertised a reserved tool; dropping");
                continue;
            }
            if let Some(owner) = self.owners.get(&tool.name) {
                warn!(
                    service,
                    tool = %tool.name,
                    owner = %owner,
                    "duplicate tool name; keeping first registration"
                );
                continue;
            }
            self.owners.insert(tool.name.clone(), service.to_string());
            self.catalog.push(tool);
        }
    }

    /// The service owning a tool, if any.
    pub fn service_for(&self, tool: &str) -> Option<&str> {
        self.owners.get(tool).map(|s| s.as_str())
    }

    /// The merged catalog, in registration order.
    pub fn catalog(&self) -> &[ToolDef] {
        &self.catalog
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }
}

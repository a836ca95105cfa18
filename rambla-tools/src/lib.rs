//! Rambla Tools - Capabilities for the Reason-Act Loop
//!
//! A tool is a named capability `{describe, schema, invoke}`; the registry
//! is a name -> tool mapping handed to the executor. Tools are pure values
//! plus an async invocation; all shared state lives behind their own ports.

mod itinerary;
mod places;

pub use itinerary::{CreateItineraryTool, Itinerary, ItineraryStep, TimeSlot, parse_duration_minutes};
pub use places::{MockPlaceSource, PlaceSearch, PlaceSource, PlacesClient, SearchPlacesTool, normalize_place_query};

use async_trait::async_trait;
use rambla_core::{
    AgentResult, Coordinates, Language, PlanState, ToolError, ToolSpec,
};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// TOOL TRAIT
// ============================================================================

/// Per-invocation context shared with every tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub language: Language,
    /// Caller's coordinates, when the request carried any
    pub location: Option<Coordinates>,
    /// Merged plan parameters for this request
    pub plan_params: PlanState,
}

impl ToolContext {
    pub fn new(language: Language) -> Self {
        Self { language, location: None, plan_params: PlanState::default() }
    }

    pub fn with_location(mut self, location: Option<Coordinates>) -> Self {
        self.location = location;
        self
    }

    pub fn with_plan_params(mut self, plan_params: PlanState) -> Self {
        self.plan_params = plan_params;
        self
    }
}

/// A side-effecting capability callable from the reason-act loop.
/// Implementations must be thread-safe; the executor invokes them across
/// concurrent requests.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry name, also used by the model to address the tool.
    fn name(&self) -> &str;

    /// Prompt-facing description.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's arguments.
    fn schema(&self) -> serde_json::Value;

    /// Invoke with structured arguments, returning a structured observation.
    async fn invoke(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> AgentResult<serde_json::Value>;
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Name -> tool mapping exposed to the executor.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name. Replaces any previous
    /// registration for that name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> AgentResult<Arc<dyn Tool>> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::UnknownTool { name: name.to_string() }.into())
    }

    /// Prompt-facing specs for every registered tool, sorted by name for
    /// deterministic prompts.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Capabilities exposed to agents as callable tools
//!
//! Each [`Capability`] is backed by one [`Tool`]. The registry hands an agent
//! only the tools its role is allowed to use, and refuses calls to anything
//! else.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use web_tools::backends::serper::SerperBackend;
use web_tools::{ScrapeService, SearchBackend};

use crate::config::{Credentials, Settings};
use crate::error::{PipelineError, Result};
use crate::executor::types::{FunctionSpec, ToolSpec};
use crate::role::{Capability, Role};

/// A callable capability
#[async_trait]
pub trait Tool: Send + Sync {
    fn capability(&self) -> Capability;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object
    fn parameters(&self) -> Value;

    async fn call(&self, arguments: Value) -> Result<String>;
}

/// Generate an argument schema the way chat-completion providers expect it
pub fn parameters_for<T: JsonSchema>() -> Value {
    let schema = serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}));
    clean_schema(&schema)
}

/// Remove `$schema`, `title` and similar keys some providers choke on
fn clean_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(obj) => Value::Object(
            obj.iter()
                .filter(|(key, _)| !matches!(key.as_str(), "$schema" | "title"))
                .map(|(key, value)| (key.clone(), clean_schema(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(clean_schema).collect()),
        other => other.clone(),
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(capability: Capability, arguments: Value) -> Result<T> {
    serde_json::from_value(arguments)
        .map_err(|e| PipelineError::tool(capability.tool_name(), format!("invalid arguments: {e}")))
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// Mandatory search query you want to use to search the internet
    pub search_query: String,
}

/// Internet search through a [`SearchBackend`]
pub struct SearchTool {
    backend: Arc<dyn SearchBackend>,
    max_results: usize,
}

impl SearchTool {
    pub fn new(backend: Arc<dyn SearchBackend>, max_results: usize) -> Self {
        Self {
            backend,
            max_results,
        }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn capability(&self) -> Capability {
        Capability::Search
    }

    fn description(&self) -> &str {
        "Search the internet with a query and return the top results with title, link and snippet."
    }

    fn parameters(&self) -> Value {
        parameters_for::<SearchArgs>()
    }

    async fn call(&self, arguments: Value) -> Result<String> {
        let args: SearchArgs = parse_args(self.capability(), arguments)?;
        tracing::info!(backend = self.backend.name(), query = %args.search_query, "search");

        let results = self
            .backend
            .search(&args.search_query, self.max_results)
            .await
            .map_err(|e| PipelineError::tool(self.capability().tool_name(), e))?;
        Ok(results.to_string())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ScrapeArgs {
    /// Mandatory website url to read the content of
    pub website_url: String,
}

/// Page fetch plus HTML-to-text
pub struct ScrapeTool {
    service: ScrapeService,
}

impl ScrapeTool {
    pub fn new(service: ScrapeService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for ScrapeTool {
    fn capability(&self) -> Capability {
        Capability::Scrape
    }

    fn description(&self) -> &str {
        "Read the text content of a website page."
    }

    fn parameters(&self) -> Value {
        parameters_for::<ScrapeArgs>()
    }

    async fn call(&self, arguments: Value) -> Result<String> {
        let args: ScrapeArgs = parse_args(self.capability(), arguments)?;
        tracing::info!(url = %args.website_url, "scrape");

        let page = self
            .service
            .scrape(&args.website_url)
            .await
            .map_err(|e| PipelineError::tool(self.capability().tool_name(), e))?;

        let mut text = String::new();
        if let Some(title) = &page.title {
            text.push_str(&format!("Title: {}\n\n", title));
        }
        text.push_str(&page.text);
        if page.truncated {
            text.push_str("\n\n[content truncated]");
        }
        Ok(text)
    }
}

/// Tools keyed by the capability they provide
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<Capability, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serper search plus the HTTP scraper
    pub fn web(settings: &Settings, credentials: &Credentials) -> Result<Self> {
        let backend = SerperBackend::new(settings.search.clone(), credentials.serper_api_key.clone())
            .map_err(|e| PipelineError::configuration(e.to_string()))?;
        let scraper = ScrapeService::new(&settings.scrape)
            .map_err(|e| PipelineError::configuration(e.to_string()))?;

        Ok(Self::new()
            .with_tool(SearchTool::new(Arc::new(backend), settings.search.max_results))
            .with_tool(ScrapeTool::new(scraper)))
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.capability(), Arc::new(tool));
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, capability: Capability) -> Option<&Arc<dyn Tool>> {
        self.tools.get(&capability)
    }

    /// Tools the role may call
    pub fn for_role<'a>(&'a self, role: &'a Role) -> impl Iterator<Item = &'a Arc<dyn Tool>> + 'a {
        self.tools
            .iter()
            .filter(move |(capability, _)| role.can(**capability))
            .map(|(_, tool)| tool)
    }

    /// Function specs advertised to the model for this role
    pub fn specs(&self, role: &Role) -> Vec<ToolSpec> {
        self.for_role(role)
            .map(|tool| ToolSpec {
                tool_type: "function".to_string(),
                function: FunctionSpec {
                    name: tool.capability().tool_name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.parameters(),
                },
            })
            .collect()
    }

    /// Dispatch a model-requested call on behalf of `role`
    ///
    /// `arguments` is the JSON-encoded string from the tool call.
    pub async fn call(&self, role: &Role, name: &str, arguments: &str) -> Result<String> {
        let capability = Capability::from_tool_name(name)
            .ok_or_else(|| PipelineError::tool(name, "unknown tool"))?;

        if !role.can(capability) {
            return Err(PipelineError::tool(
                name,
                format!("role '{}' does not have the {} capability", role.id(), capability),
            ));
        }

        let tool = self
            .get(capability)
            .ok_or_else(|| PipelineError::tool(name, "no tool registered for this capability"))?;

        let arguments = if arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(arguments)
                .map_err(|e| PipelineError::tool(name, format!("arguments are not valid JSON: {e}")))?
        };

        tool.call(arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use web_tools::{SearchResult, SearchResults, WebToolResult};

    struct FixedBackend;

    #[async_trait]
    impl SearchBackend for FixedBackend {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn search(&self, query: &str, limit: usize) -> WebToolResult<SearchResults> {
            let results = (1..=limit.min(2))
                .map(|position| SearchResult {
                    title: format!("Venue {position}"),
                    url: format!("https://venues.example/{position}"),
                    description: "Conference hall".to_string(),
                    position,
                })
                .collect();
            Ok(SearchResults {
                query: query.to_string(),
                results,
                backend: "fixed".to_string(),
            })
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new().with_tool(SearchTool::new(Arc::new(FixedBackend), 5))
    }

    fn searcher() -> Role {
        Role::new("Searcher", "find things", [Capability::Search], "").unwrap()
    }

    #[test]
    fn test_search_parameters_schema() {
        let params = parameters_for::<SearchArgs>();
        assert_eq!(params["type"], "object");
        assert!(params["properties"]["search_query"].is_object());
        assert!(params.get("$schema").is_none());
        assert!(params.get("title").is_none());
    }

    #[test]
    fn test_specs_filtered_by_role() {
        let registry = registry();
        let writer = Role::new("Writer", "write", [Capability::Scrape], "").unwrap();

        let specs = registry.specs(&searcher());
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].function.name, "search_internet");
        assert!(registry.specs(&writer).is_empty());
    }

    #[tokio::test]
    async fn test_call_search() {
        let output = registry()
            .call(&searcher(), "search_internet", r#"{"search_query": "sf venues"}"#)
            .await
            .unwrap();
        assert!(output.contains("Venue 1"));
        assert!(output.contains("https://venues.example/2"));
    }

    #[tokio::test]
    async fn test_call_unknown_tool() {
        let err = registry().call(&searcher(), "delete_files", "{}").await.unwrap_err();
        assert!(matches!(err, PipelineError::ToolInvocation { ref tool, .. } if tool == "delete_files"));
    }

    #[tokio::test]
    async fn test_call_outside_role_capabilities() {
        let writer = Role::new("Writer", "write", [Capability::Scrape], "").unwrap();
        let err = registry()
            .call(&writer, "search_internet", r#"{"search_query": "x"}"#)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not have the search capability"));
    }

    #[tokio::test]
    async fn test_call_with_bad_arguments() {
        let err = registry()
            .call(&searcher(), "search_internet", r#"{"query": 1}"#)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid arguments"));
    }
}

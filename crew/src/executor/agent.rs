//! Tool-using agent loop over an OpenAI-compatible chat API
//!
//! 1. The role's system prompt and the task prompt are sent with the tools
//!    the role may use
//! 2. The model either answers or requests tool calls
//! 3. Tool results are fed back and the loop continues
//! 4. After [`MAX_ITERATIONS`] rounds the model is asked for a final answer
//!    without tools

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::types::{ChatMessage, ChatRequest, ChatResponse, ToolSpec};
use super::{ExecutionRequest, TaskExecutor};
use crate::config::LlmSettings;
use crate::error::{PipelineError, Result};
use crate::prompts;
use crate::tools::ToolRegistry;

/// Maximum number of tool-calling iterations to prevent infinite loops
pub const MAX_ITERATIONS: usize = 10;

const FINAL_ANSWER_NUDGE: &str =
    "You have reached the tool call limit. Give your best final answer now using what you have gathered.";

/// One round trip to the model
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatMessage>;
}

/// `POST {base_url}/chat/completions` with a bearer token
pub struct OpenAiClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(settings: &LlmSettings, api_key: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| PipelineError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatMessage> {
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "chat completion request"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| PipelineError::Provider(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(300).collect();
            return Err(PipelineError::Provider(format!("API error {}: {}", status, preview)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Provider(format!("failed to parse response: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| PipelineError::Provider("response contained no choices".to_string()))
    }
}

/// Executes tasks by running a role-scoped agent loop
pub struct AgentExecutor {
    client: Arc<dyn ChatClient>,
    model: String,
    temperature: f32,
    tools: ToolRegistry,
}

impl AgentExecutor {
    /// Production executor talking to the configured provider
    pub fn new(settings: &LlmSettings, api_key: impl Into<String>, tools: ToolRegistry) -> Result<Self> {
        let client = OpenAiClient::new(settings, api_key)?;
        Ok(Self::with_client(Arc::new(client), settings, tools))
    }

    pub fn with_client(client: Arc<dyn ChatClient>, settings: &LlmSettings, tools: ToolRegistry) -> Self {
        Self {
            client,
            model: settings.model.clone(),
            temperature: settings.temperature,
            tools,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn chat_request(&self, messages: &[ChatMessage], tools: Vec<ToolSpec>) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            tools,
            temperature: self.temperature,
        }
    }

    fn final_answer(task_index: usize, message: &ChatMessage) -> Result<String> {
        let answer = message.text().trim();
        if answer.is_empty() {
            return Err(PipelineError::Provider(format!(
                "model returned an empty answer for task {}",
                task_index
            )));
        }
        Ok(answer.to_string())
    }
}

#[async_trait]
impl TaskExecutor for AgentExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> Result<String> {
        let total_start = Instant::now();
        let role = &request.role;
        let tool_specs = self.tools.specs(role);

        tracing::info!(
            task = request.task_index,
            role = role.id(),
            tools = tool_specs.len(),
            attempt = request.attempt(),
            "agent started"
        );

        let mut messages = vec![
            ChatMessage::system(prompts::system_prompt(role)),
            ChatMessage::user(prompts::task_prompt(request)),
        ];

        for iteration in 1..=MAX_ITERATIONS {
            tracing::debug!(task = request.task_index, iteration, "agent iteration");

            let reply = self
                .client
                .complete(&self.chat_request(&messages, tool_specs.clone()))
                .await?;

            if reply.tool_calls.is_empty() {
                tracing::info!(
                    task = request.task_index,
                    iterations = iteration,
                    elapsed_ms = total_start.elapsed().as_millis() as u64,
                    "agent answered"
                );
                return Self::final_answer(request.task_index, &reply);
            }

            tracing::info!(task = request.task_index, calls = reply.tool_calls.len(), "agent making tool call(s)");
            let calls = reply.tool_calls.clone();
            messages.push(reply);

            for call in &calls {
                let tool_start = Instant::now();
                let result = self
                    .tools
                    .call(role, &call.function.name, &call.function.arguments)
                    .await?;
                tracing::debug!(
                    tool = %call.function.name,
                    elapsed_ms = tool_start.elapsed().as_millis() as u64,
                    bytes = result.len(),
                    "tool returned"
                );
                messages.push(ChatMessage::tool_result(&call.id, result));
            }
        }

        tracing::warn!(
            task = request.task_index,
            "agent reached max iterations ({}), requesting final answer",
            MAX_ITERATIONS
        );
        messages.push(ChatMessage::user(FINAL_ANSWER_NUDGE));
        let reply = self.client.complete(&self.chat_request(&messages, Vec::new())).await?;
        Self::final_answer(request.task_index, &reply)
    }
}

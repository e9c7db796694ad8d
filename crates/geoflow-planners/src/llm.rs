use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use geoflow_core::planner::{PlanError, Planner, PlannerContext, PlannerOutput};

use crate::static_plan::parse_plan_json;

const MAX_PROMPT_LOG_CHARS: usize = 4_000;
const MAX_LLM_OUTPUT_LOG_CHARS: usize = 8_000;

/// LLM request payload
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: String,
    pub user: String,
    pub model: String,
    pub temperature: f32,
}

/// LLM client trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError>;
}

#[async_trait]
impl LlmClient for Arc<dyn LlmClient> {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError> {
        (**self).complete(request).await
    }
}

/// LLM errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(String),
    #[error("response error: {0}")]
    Response(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Planner config for LLM
#[derive(Debug, Clone)]
pub struct LlmPlannerConfig {
    pub model: String,
    pub temperature: f32,
    pub system_prompt: String,
}

impl Default for LlmPlannerConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            system_prompt: "You are a GIS analysis planner. You translate a user's geospatial \
                            question into geometry operations over the loaded layers. \
                            Return ONLY valid JSON."
                .to_string(),
        }
    }
}

/// LLM-based planner
pub struct LlmPlanner<C: LlmClient> {
    pub client: C,
    pub config: LlmPlannerConfig,
}

impl<C: LlmClient> LlmPlanner<C> {
    pub fn new(client: C, config: LlmPlannerConfig) -> Self {
        Self { client, config }
    }

    fn build_prompt(&self, query: &str, context: &PlannerContext) -> (String, String) {
        let system = build_system_prompt(&self.config.system_prompt, context);
        let mut user = String::new();
        user.push_str(&format!("Query:\n{}\n\n", query.trim()));

        if !context.request_context.is_null() {
            user.push_str(&format!(
                "Request context:\n{}\n\n",
                truncate_for_log(&context.request_context.to_string(), MAX_PROMPT_LOG_CHARS)
            ));
        }

        user.push_str("Return a JSON object with shape:\n");
        user.push_str(
            r#"{"message":"...","actions":[{"action":"operation_name","params":{"layer_name":"Layer 1"}}]}"#,
        );
        user.push_str(
            "\nUse only operation names listed in the Operation Catalog. Return JSON only.\n",
        );

        (system, user)
    }
}

fn build_system_prompt(base: &str, context: &PlannerContext) -> String {
    let mut system = String::new();
    system.push_str(base.trim());

    system.push_str("\n\nPlanning Rules:\n");
    system.push_str("1) Return ONLY one valid JSON object with `message` and `actions`.\n");
    system.push_str("2) Actions run in dependency order; list them in the order you intend.\n");
    system.push_str("3) Refer to existing layers by their identifier, e.g. \"Layer 1\".\n");
    let _ = writeln!(
        system,
        "4) The output of your i-th action (counting from 0) is named \"Result_{{{} + i}}\": \
         the first action is \"{}\", the second \"{}\". Use these names to chain actions.",
        context.result_base,
        context.placeholder_for(0),
        context.placeholder_for(1),
    );
    system.push_str("5) Never reference an action's own result or a result that no action produces.\n");
    system.push_str("6) Supply every required parameter; distances are in the layer's CRS units.\n");
    system.push_str(
        "7) If the question needs no geometry work, answer in `message` and return an empty `actions` list.\n",
    );

    system.push_str("\nOperation Catalog:\n");
    for operation in &context.operations {
        let _ = writeln!(system, "- name: {}", operation.name);
        let _ = writeln!(system, "  description: {}", operation.description);
        let _ = writeln!(
            system,
            "  required_params: [{}]",
            operation.required_params.join(", ")
        );
        if !operation.optional_params.is_empty() {
            let _ = writeln!(
                system,
                "  optional_params: [{}]",
                operation.optional_params.join(", ")
            );
        }
    }

    system.push_str("\nLayers:\n");
    if context.layers.is_empty() {
        system.push_str("- (none loaded)\n");
    }
    for layer in &context.layers {
        let _ = writeln!(
            system,
            "- {}: {} feature(s), geometry {}, crs {}",
            layer.id,
            layer.feature_count,
            layer.geometry_type.as_deref().unwrap_or("none"),
            layer.crs
        );
    }
    system
}

fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("... [truncated, total_chars={}]", char_count));
    preview
}

#[async_trait]
impl<C: LlmClient> Planner for LlmPlanner<C> {
    async fn plan(&self, query: &str, context: &PlannerContext) -> Result<PlannerOutput, PlanError> {
        let (system, user) = self.build_prompt(query, context);
        info!(
            model = %self.config.model,
            temperature = self.config.temperature,
            query_len = query.len(),
            operation_count = context.operations.len(),
            layer_count = context.layers.len(),
            result_base = context.result_base,
            "planner request prepared"
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            let system_preview = truncate_for_log(&system, MAX_PROMPT_LOG_CHARS);
            let user_preview = truncate_for_log(&user, MAX_PROMPT_LOG_CHARS);
            debug!(
                system_prompt = %system_preview,
                user_prompt = %user_preview,
                "planner prompts"
            );
        }
        let request = LlmRequest {
            system,
            user,
            model: self.config.model.clone(),
            temperature: self.config.temperature,
        };
        let output = self
            .client
            .complete(request)
            .await
            .map_err(|e| PlanError::LlmError(e.to_string()))?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                llm_output = %truncate_for_log(&output, MAX_LLM_OUTPUT_LOG_CHARS),
                "planner raw llm output"
            );
        }

        let json_str = extract_json(&output)
            .ok_or_else(|| PlanError::Generation("LLM output did not contain JSON".to_string()))?;
        let plan = parse_plan_json(json_str)?;
        info!(
            action_count = plan.actions.len(),
            "planner parsed plan"
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                message = %truncate_for_log(&plan.message, MAX_PROMPT_LOG_CHARS),
                actions = %truncate_for_log(&format!("{:?}", plan.actions), MAX_LLM_OUTPUT_LOG_CHARS),
                "planner plan detail"
            );
        }
        Ok(plan)
    }
}

/// Mock LLM client for tests/examples
pub struct MockLlmClient {
    pub response: String,
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _request: LlmRequest) -> Result<String, LlmError> {
        Ok(self.response.clone())
    }
}

/// HTTP client config (OpenAI-compatible)
#[derive(Debug, Clone)]
pub struct HttpLlmClientConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub extra_headers: HeaderMap,
}

impl Default for HttpLlmClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            timeout_secs: 30,
            extra_headers: HeaderMap::new(),
        }
    }
}

/// HTTP LLM client using an OpenAI-compatible API
pub struct HttpLlmClient {
    client: reqwest::Client,
    config: HttpLlmClientConfig,
}

impl HttpLlmClient {
    pub fn new(config: HttpLlmClientConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError> {
        let mut headers = self.config.extra_headers.clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.config.api_key {
            let value = format!("Bearer {}", key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&value).map_err(|e| LlmError::Http(e.to_string()))?,
            );
        }

        let body = ChatRequest {
            model: request.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user,
                },
            ],
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Response(format!("HTTP {}: {}", status, text)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;
        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Serialization(e.to_string()))?;

        parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::Response("Missing choices".to_string()))
    }
}

/// Outermost JSON object or array in free text (models like code fences).
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoflow_core::operation::OperationMeta;
    use geoflow_core::types::{Crs, LayerId, LayerSummary};
    use serde_json::json;
    use std::sync::Mutex;

    /// Captures the request it was given.
    struct RecordingClient {
        response: String,
        seen: Mutex<Option<LlmRequest>>,
    }

    #[async_trait]
    impl LlmClient for RecordingClient {
        async fn complete(&self, request: LlmRequest) -> Result<String, LlmError> {
            if let Ok(mut seen) = self.seen.lock() {
                *seen = Some(request);
            }
            Ok(self.response.clone())
        }
    }

    struct FailingClient;

    #[async_trait]
    impl LlmClient for FailingClient {
        async fn complete(&self, _request: LlmRequest) -> Result<String, LlmError> {
            Err(LlmError::Http("connection refused".to_string()))
        }
    }

    fn context() -> PlannerContext {
        PlannerContext::new(
            vec![OperationMeta {
                name: "buffer_layer".to_string(),
                description: "Buffer every feature".to_string(),
                required_params: vec!["layer_name".to_string(), "distance".to_string()],
                optional_params: Vec::new(),
            }],
            vec![LayerSummary {
                id: LayerId::numbered(1),
                feature_count: 3,
                geometry_type: Some("Point".to_string()),
                crs: Crs::web_mercator(),
            }],
            1,
        )
    }

    #[test]
    fn test_system_prompt_contains_catalog_layers_and_placeholder_rule() {
        let planner = LlmPlanner::new(
            MockLlmClient {
                response: "{}".to_string(),
            },
            LlmPlannerConfig {
                system_prompt: "Base prompt.".to_string(),
                ..LlmPlannerConfig::default()
            },
        );

        let (system, user) = planner.build_prompt("buffer the wells by 500 m", &context());

        assert!(system.starts_with("Base prompt."));
        assert!(system.contains("Operation Catalog"));
        assert!(system.contains("- name: buffer_layer"));
        assert!(system.contains("required_params: [layer_name, distance]"));
        assert!(system.contains("- Layer 1: 3 feature(s), geometry Point, crs EPSG:3857"));
        assert!(system.contains("\"Result_1\""));
        assert!(system.contains("\"Result_2\""));
        assert!(user.contains("buffer the wells by 500 m"));
        assert!(!user.contains("Request context"));
    }

    #[test]
    fn test_request_context_is_forwarded() {
        let planner = LlmPlanner::new(
            MockLlmClient {
                response: "{}".to_string(),
            },
            LlmPlannerConfig::default(),
        );
        let context = context().with_request_context(json!({"visible": ["Layer 1"]}));

        let (_system, user) = planner.build_prompt("q", &context);
        assert!(user.contains("Request context"));
        assert!(user.contains("visible"));
    }

    #[test]
    fn test_plan_parses_fenced_json() {
        let client = RecordingClient {
            response: "Here you go:\n```json\n{\"message\":\"Buffering\",\"actions\":[{\"action\":\"buffer_layer\",\"params\":{\"layer_name\":\"Layer 1\",\"distance\":500}}]}\n```".to_string(),
            seen: Mutex::new(None),
        };
        let planner = LlmPlanner::new(
            client,
            LlmPlannerConfig {
                model: "test-model".to_string(),
                ..LlmPlannerConfig::default()
            },
        );

        let output = tokio_test::block_on(planner.plan("buffer", &context())).expect("plan");
        assert_eq!(output.message, "Buffering");
        assert_eq!(output.actions.len(), 1);
        assert_eq!(output.actions[0].action, "buffer_layer");
        assert_eq!(output.actions[0].params["distance"], json!(500));

        let seen = planner.client.seen.lock().unwrap();
        let request = seen.as_ref().expect("request recorded");
        assert_eq!(request.model, "test-model");
    }

    #[test]
    fn test_plan_errors() {
        let planner = LlmPlanner::new(FailingClient, LlmPlannerConfig::default());
        let err = tokio_test::block_on(planner.plan("q", &context())).unwrap_err();
        assert!(matches!(err, PlanError::LlmError(msg) if msg.contains("connection refused")));

        let planner = LlmPlanner::new(
            MockLlmClient {
                response: "I cannot help with that".to_string(),
            },
            LlmPlannerConfig::default(),
        );
        let err = tokio_test::block_on(planner.plan("q", &context())).unwrap_err();
        assert!(matches!(err, PlanError::Generation(_)));
    }

    #[test]
    fn test_extract_json() {
        assert_eq!(extract_json("x {\"a\":1} y"), Some("{\"a\":1}"));
        assert_eq!(extract_json("[{\"action\":\"a\"}]"), Some("[{\"action\":\"a\"}]"));
        assert_eq!(extract_json("no json"), None);
        assert_eq!(extract_json("} {"), None);
    }
}

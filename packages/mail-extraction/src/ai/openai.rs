//! OpenAI implementation of the `LanguageModel` trait.
//!
//! # Example
//!
//! ```rust,ignore
//! use mail_extraction::ai::OpenAiModel;
//!
//! let model = OpenAiModel::new("sk-...").with_model("gpt-4o-mini");
//! let orchestrator = Orchestrator::new(mailbox, model, config)?;
//! ```

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::pipeline::{
    extract::{parse_extraction_response, ExtractionResponse},
    planner::parse_query_proposal,
    prompts::{format_extract_records_prompt, format_plan_query_prompt, SYSTEM_PROMPT},
};
use crate::traits::ai::{ExtractionRequest, LanguageModel, QueryProposal, QueryRequest};
use crate::types::record::RecordCandidate;

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat-completions model.
#[derive(Debug)]
pub struct OpenAiModel {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl OpenAiModel {
    /// Create a new client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: SecretString::from(api_key.into()),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Set the chat model (default: gpt-4o).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Chat completion constrained to a JSON response.
    async fn chat_json(&self, user: &str, response_format: serde_json::Value) -> ModelResult<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: 0.0,
            response_format,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Request(Box::new(e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ModelError::Request(
                format!("OpenAI API error {}: {}", status, error_text).into(),
            ));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Request(Box::new(e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ModelError::unparsable("no content in OpenAI response"))
    }
}

/// `response_format` carrying the extraction schema.
fn extraction_response_format() -> serde_json::Value {
    let schema = schemars::schema_for!(ExtractionResponse);
    serde_json::json!({
        "type": "json_schema",
        "json_schema": {
            "name": "extraction_response",
            "strict": false,
            "schema": schema,
        }
    })
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn propose_query(&self, request: &QueryRequest) -> ModelResult<QueryProposal> {
        let prompt = format_plan_query_prompt(request);
        let response = self
            .chat_json(&prompt, serde_json::json!({ "type": "json_object" }))
            .await?;
        parse_query_proposal(&response)
    }

    async fn extract_records(
        &self,
        request: &ExtractionRequest<'_>,
    ) -> ModelResult<Vec<RecordCandidate>> {
        let prompt = format_extract_records_prompt(request);
        let response = self.chat_json(&prompt, extraction_response_format()).await?;
        parse_extraction_response(&response)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_builder() {
        let model = OpenAiModel::new("sk-test")
            .with_model("gpt-4o-mini")
            .with_base_url("http://localhost:8080/v1/");

        assert_eq!(model.model(), "gpt-4o-mini");
        assert_eq!(model.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let model = OpenAiModel::new("sk-very-secret");
        assert!(!format!("{model:?}").contains("sk-very-secret"));
    }

    #[test]
    fn test_extraction_schema_lists_records() {
        let format = extraction_response_format();
        assert_eq!(format["type"], "json_schema");
        assert!(format["json_schema"]["schema"]["properties"]["records"].is_object());
    }

    #[test]
    fn test_chat_response_parses_null_content() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}

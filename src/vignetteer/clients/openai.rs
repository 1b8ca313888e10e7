//! OpenAI-compatible chat-completions client.
//!
//! Implements [`TextGenerator`] over any endpoint that speaks the OpenAI
//! `/chat/completions` protocol. The default base URL targets OpenAI itself;
//! use [`OpenAIClient::new_with_base_url`] for compatible gateways.
//!
//! # Example
//!
//! ```rust,no_run
//! use vignetteer::clients::openai::{Model, OpenAIClient};
//! use vignetteer::generation::{Message, Role, TextGenerator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let key = std::env::var("OPENAI_API_KEY")?;
//!     let client = OpenAIClient::new_with_model_enum(&key, Model::Gpt4o);
//!     let text = client
//!         .generate(
//!             "You are terse.",
//!             &[Message::new(Role::User, "Name one cranial nerve.")],
//!         )
//!         .await?;
//!     println!("{}", text);
//!     Ok(())
//! }
//! ```

use crate::vignetteer::generation::{GenerateError, Message, TextGenerator, TokenUsage};
use async_trait::async_trait;
use log::error;
use serde_json::{json, Value};
use std::sync::Mutex;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat models commonly used by the pipeline.
pub enum Model {
    Gpt4,
    Gpt4o,
    Gpt4oMini,
    Gpt41,
    Gpt41Mini,
    Gpt41Nano,
}

/// Convert a [`Model`] variant into its public string identifier.
pub fn model_to_string(model: Model) -> String {
    match model {
        Model::Gpt4 => "gpt-4".to_string(),
        Model::Gpt4o => "gpt-4o".to_string(),
        Model::Gpt4oMini => "gpt-4o-mini".to_string(),
        Model::Gpt41 => "gpt-4.1".to_string(),
        Model::Gpt41Mini => "gpt-4.1-mini".to_string(),
        Model::Gpt41Nano => "gpt-4.1-nano".to_string(),
    }
}

/// Client for OpenAI-compatible chat-completions endpoints.
pub struct OpenAIClient {
    http: reqwest::Client,
    secret_key: String,
    base_url: String,
    model: String,
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAIClient {
    pub fn new_with_model_str(secret_key: &str, model_name: &str) -> Self {
        Self::new_with_base_url(secret_key, model_name, DEFAULT_BASE_URL)
    }

    pub fn new_with_model_enum(secret_key: &str, model: Model) -> Self {
        Self::new_with_model_str(secret_key, &model_to_string(model))
    }

    /// Point the client at a custom OpenAI-compatible base URL
    /// (e.g. an Azure deployment or a local gateway).
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        OpenAIClient {
            http: reqwest::Client::new(),
            secret_key: secret_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model_name.to_string(),
            token_usage: Mutex::new(None),
        }
    }

    /// Build the chat-completions request body from system prompt + context.
    fn request_body(&self, system_prompt: &str, context: &[Message]) -> Value {
        let mut messages = Vec::with_capacity(context.len() + 1);
        if !system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": system_prompt}));
        }
        for msg in context {
            messages.push(json!({"role": msg.role.as_str(), "content": msg.content}));
        }
        json!({"model": self.model, "messages": messages})
    }
}

#[async_trait]
impl TextGenerator for OpenAIClient {
    async fn generate(
        &self,
        system_prompt: &str,
        context: &[Message],
    ) -> Result<String, GenerateError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(&self.request_body(system_prompt, context))
            .send()
            .await
            .map_err(|e| {
                error!("OpenAIClient::generate transport error: {}", e);
                Box::new(e) as GenerateError
            })?;

        let status = response.status();
        let body: Value = response.json().await.map_err(|e| {
            error!("OpenAIClient::generate body parse error: {}", e);
            Box::new(e) as GenerateError
        })?;

        if !status.is_success() {
            let api_msg = body["error"]["message"].as_str().unwrap_or("unknown error");
            error!("OpenAIClient::generate API error {}: {}", status, api_msg);
            return Err(format!("OpenAI API error {}: {}", status, api_msg).into());
        }

        if let Some(usage) = body.get("usage") {
            let recorded = TokenUsage {
                input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as usize,
                output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as usize,
                total_tokens: usage["total_tokens"].as_u64().unwrap_or(0) as usize,
            };
            if let Ok(mut slot) = self.token_usage.lock() {
                *slot = Some(recorded);
            }
        }

        match body["choices"][0]["message"]["content"].as_str() {
            Some(content) => Ok(content.to_string()),
            None => {
                error!("OpenAIClient::generate: response had no message content");
                Err("OpenAI response contained no message content".into())
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}

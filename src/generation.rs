//! Generative model adapters for clause extraction.
//!
//! Both adapters send a two-message chat (system instruction, then the
//! question followed by the retrieved contract text) at temperature 0.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use contract_rag_core::generate::{user_message, Generator};

use crate::config::GenerationConfig;
use crate::embedding::{openai_api_key, DEFAULT_OLLAMA_URL, DEFAULT_OPENAI_URL};
use crate::retry::{ensure_success, send_with_retry};

/// Build the generator selected by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

fn chat_messages(system_prompt: &str, question: &str, context: &str) -> Value {
    json!([
        { "role": "system", "content": system_prompt },
        { "role": "user", "content": user_message(question, context) }
    ])
}

pub struct OpenAIGenerator {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    max_retries: u32,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: openai_api_key()?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system_prompt: &str, question: &str, context: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.url);
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": chat_messages(system_prompt, question, context),
        });

        let response = send_with_retry("OpenAI chat", self.max_retries, || {
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
        })
        .await?;
        let response = ensure_success("OpenAI chat", response).await?;
        let json: Value = response.json().await?;
        parse_openai_chat(&json)
    }
}

fn parse_openai_chat(json: &Value) -> Result<String> {
    json.get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid OpenAI chat response: missing choices[0].message.content"))
}

pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    max_retries: u32,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system_prompt: &str, question: &str, context: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.url);
        let body = json!({
            "model": self.model,
            "stream": false,
            "options": { "temperature": 0 },
            "messages": chat_messages(system_prompt, question, context),
        });

        let response = send_with_retry("Ollama chat", self.max_retries, || {
            self.client.post(&url).json(&body)
        })
        .await
        .map_err(|e| anyhow!("{} (is Ollama running at {}?)", e, self.url))?;
        let response = ensure_success("Ollama chat", response).await?;
        let json: Value = response.json().await?;
        parse_ollama_chat(&json)
    }
}

fn parse_ollama_chat(json: &Value) -> Result<String> {
    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid Ollama chat response: missing message.content"))
}

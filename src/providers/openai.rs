//! OpenAI-compatible REST client for chat, embeddings and image generation.
//!
//! Works against any server exposing the `/chat/completions`, `/embeddings`
//! and `/images/generations` endpoints. All requests go through the shared
//! [`ResilientClient`].

use super::{ChatProvider, CompletionOptions, EmbeddingProvider, ImageProvider};
use crate::api::ResilientClient;
use crate::config::OpenAiConfig;
use crate::error::{PipelineError, Result};
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, instrument};

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'static str,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    #[serde(default)]
    url: Option<String>,
}

pub struct OpenAiClient {
    client: ResilientClient,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    image_model: String,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("client", &self.client)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(client: ResilientClient, config: &OpenAiConfig, api_key: String) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            image_model: config.image_model.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    #[instrument(
        level = "info",
        skip_all,
        fields(purpose = options.purpose, model = %self.chat_model)
    )]
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String> {
        let t0 = Instant::now();
        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: options.json_response.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let body = self
            .client
            .post_json(
                options.purpose,
                &self.endpoint("chat/completions"),
                Some(&self.api_key),
                &[],
                &request,
            )
            .await?;
        let response: ChatResponse = serde_json::from_str(&body)?;
        let content = response
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| PipelineError::Provider {
                status: 200,
                message: "chat completion contained no message content".to_string(),
            })?;

        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            bytes = content.len(),
            "chat completion finished"
        );
        debug!(preview = %truncate_for_log(&content, 300), "chat completion content");
        Ok(content)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    #[instrument(level = "debug", skip_all, fields(chars = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
        };
        let body = self
            .client
            .post_json(
                "embeddings",
                &self.endpoint("embeddings"),
                Some(&self.api_key),
                &[],
                &request,
            )
            .await?;
        let response: EmbeddingResponse = serde_json::from_str(&body)?;
        Ok(response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .unwrap_or_default())
    }
}

#[async_trait]
impl ImageProvider for OpenAiClient {
    #[instrument(level = "info", skip_all, fields(model = %self.image_model))]
    async fn generate(&self, prompt: &str) -> Result<Option<String>> {
        let request = ImageRequest {
            model: &self.image_model,
            prompt,
            n: 1,
            size: "1024x1024",
        };
        let body = self
            .client
            .post_json(
                "image_generation",
                &self.endpoint("images/generations"),
                Some(&self.api_key),
                &[],
                &request,
            )
            .await?;
        let response: ImageResponse = serde_json::from_str(&body)?;
        Ok(response.data.into_iter().find_map(|d| d.url))
    }
}

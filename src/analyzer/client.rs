//! ビジョンモデルAPIクライアント
//!
//! - OpenAI: chat completions（`image_url` にData URL、`response_format: json_object`）
//! - Gemini: generateContent（`inline_data`、`responseMimeType: application/json`）

use super::VisionModel;
use crate::ai_provider::AiProvider;
use crate::config::Config;
use crate::error::{Result, ScaflowError};
use crate::table::ImageAttachment;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

// =============================================
// OpenAI
// =============================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn openai_request<'a>(model: &'a str, prompt: &'a str, image: &ImageAttachment, max_tokens: u32) -> ChatRequest<'a> {
    ChatRequest {
        model,
        response_format: ResponseFormat { kind: "json_object" },
        messages: vec![ChatMessage {
            role: "user",
            content: vec![
                ContentPart::Text { text: prompt },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.to_data_uri(),
                    },
                },
            ],
        }],
        max_tokens,
    }
}

/// 本文がない場合は空オブジェクト扱い
fn openai_content(response: ChatResponse) -> String {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| "{}".to_string())
}

// =============================================
// Gemini
// =============================================

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

fn gemini_request<'a>(prompt: &'a str, image: &'a ImageAttachment, max_tokens: u32) -> GeminiRequest<'a> {
    GeminiRequest {
        contents: vec![Content {
            parts: vec![
                Part::Text { text: prompt },
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: &image.media_type,
                        data: image.to_base64(),
                    },
                },
            ],
        }],
        generation_config: GenerationConfig {
            temperature: 0.1,
            response_mime_type: "application/json",
            max_output_tokens: max_tokens,
        },
    }
}

fn gemini_content(response: GeminiResponse) -> Result<String> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content.parts.into_iter().next())
        .map(|p| p.text)
        .ok_or_else(|| ScaflowError::ApiParse("Empty response".into()))
}

// =============================================
// クライアント
// =============================================

/// HTTP経由のビジョンモデルクライアント
pub struct HttpVisionClient {
    http: reqwest::Client,
    provider: AiProvider,
    api_base: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl HttpVisionClient {
    pub fn new(
        provider: AiProvider,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            provider,
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.provider,
            config.api_base(),
            config.get_api_key()?,
            config.model(),
            config.max_tokens,
            Duration::from_secs(config.timeout_seconds),
        )
    }

    pub fn provider(&self) -> AiProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn send_error(&self, e: reqwest::Error) -> ScaflowError {
        if e.is_timeout() {
            ScaflowError::Timeout(self.timeout)
        } else {
            ScaflowError::ApiCall(e.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let preview: String = body.chars().take(500).collect();
        Err(ScaflowError::ApiCall(format!("API error {}: {}", status, preview)))
    }

    async fn complete_openai(&self, prompt: &str, image: &ImageAttachment) -> Result<String> {
        let request = openai_request(&self.model, prompt, image, self.max_tokens);
        let url = format!("{}/chat/completions", self.api_base);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let payload: ChatResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ScaflowError::ApiParse(e.to_string()))?;

        Ok(openai_content(payload))
    }

    async fn complete_gemini(&self, prompt: &str, image: &ImageAttachment) -> Result<String> {
        let request = gemini_request(prompt, image, self.max_tokens);
        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let payload: GeminiResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ScaflowError::ApiParse(e.to_string()))?;

        gemini_content(payload)
    }
}

impl VisionModel for HttpVisionClient {
    fn complete(
        &self,
        prompt: &str,
        image: &ImageAttachment,
    ) -> impl Future<Output = Result<String>> + Send {
        async move {
            match self.provider {
                AiProvider::OpenAi => self.complete_openai(prompt, image).await,
                AiProvider::Gemini => self.complete_gemini(prompt, image).await,
            }
        }
    }
}

use crate::{
    config::ChatConfig,
    error::{RemixError, Result},
    models::{
        ApiErrorBody, ChatCompletionChunk, ChatCompletionRequest, ChatMessage, ContentPart,
        ImageUrl, StreamChunk, UploadedImage,
    },
    pipeline::{TextStream, VisionModel},
    prompt,
};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use tokio_stream::wrappers::ReceiverStream;

const DONE_MARKER: &str = "[DONE]";

/// Builds the single user message: the rendered instruction followed by the image as a data URI.
pub fn build_vision_request(
    config: &ChatConfig,
    image: &UploadedImage,
    instruction: &str,
) -> Result<ChatCompletionRequest> {
    Ok(ChatCompletionRequest {
        model: config.model.clone(),
        messages: vec![ChatMessage::user(vec![
            ContentPart::Text {
                text: prompt::render(instruction)?,
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_uri(),
                    detail: "auto".to_string(),
                },
            },
        ])],
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        stream: true,
    })
}

/// Turns one SSE `data:` payload into a chunk. `[DONE]` and any `finish_reason` end the stream.
pub fn parse_sse_data(data: &str) -> Result<StreamChunk> {
    let data = data.trim();
    if data == DONE_MARKER {
        return Ok(StreamChunk::finished("done"));
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(data)
        .map_err(|e| RemixError::Response(format!("Malformed stream chunk: {}", e)))?;

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(StreamChunk::text(""));
    };

    Ok(StreamChunk {
        chunk: choice.delta.content.unwrap_or_default(),
        done: choice.finish_reason.is_some(),
        finish_reason: choice.finish_reason,
    })
}

pub(crate) fn api_error(status: StatusCode, body: &str) -> RemixError {
    let message = match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => match parsed.error.error_type.as_deref() {
            Some("insufficient_quota") => format!("Quota exceeded: {}", parsed.error.message),
            Some("authentication_error") => {
                format!("Authentication failed: {}", parsed.error.message)
            }
            _ => parsed.error.message,
        },
        Err(_) if body.is_empty() => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
        Err(_) => body.to_string(),
    };

    RemixError::Api {
        status: status.as_u16(),
        message,
    }
}

#[derive(Clone)]
pub struct ChatClient {
    http: Client,
    config: ChatConfig,
}

impl ChatClient {
    pub fn new(http: Client, config: ChatConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub async fn generate_stream(&self, request: ChatCompletionRequest) -> Result<TextStream> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| RemixError::Config("Chat API key is not configured".into()))?;
        let endpoint = self.config.endpoint();

        log::info!("Invoking streaming model: {} at {}", request.model, endpoint);
        log::debug!(
            "Chat request: temperature={} max_tokens={} parts={}",
            request.temperature,
            request.max_tokens,
            request.messages.iter().map(|m| m.content.len()).sum::<usize>()
        );

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .header("Accept", "text/event-stream")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("Chat completion failed with {}: {}", status, body);
            return Err(api_error(status, &body));
        }

        let mut events = response.bytes_stream().eventsource();
        let (tx, rx) = tokio::sync::mpsc::channel(100);

        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let result = match event {
                    Ok(event) => parse_sse_data(&event.data),
                    Err(e) => Err(RemixError::Stream(e.to_string())),
                };
                let finished = !matches!(&result, Ok(chunk) if !chunk.done);

                if tx.send(result).await.is_err() || finished {
                    break;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[async_trait]
impl VisionModel for ChatClient {
    async fn stream_prompt(&self, request: ChatCompletionRequest) -> Result<TextStream> {
        self.generate_stream(request).await
    }
}

use crate::{
    config::ImageConfig,
    error::{RemixError, Result},
    models::{GeneratedImage, ImageGenerationRequest, ImageGenerationResponse},
    openai::chat_client::api_error,
    pipeline::ImageModel,
};
use async_trait::async_trait;
use reqwest::Client;

#[derive(Clone)]
pub struct ImageClient {
    http: Client,
    config: ImageConfig,
}

impl ImageClient {
    pub fn new(http: Client, config: ImageConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    pub async fn generate(&self, request: ImageGenerationRequest) -> Result<GeneratedImage> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| RemixError::Config("Image API key is not configured".into()))?;

        log::info!(
            "Generating image with model: {} ({}, {})",
            request.model,
            request.size,
            request.quality
        );
        log::debug!("Image prompt: {}", request.prompt);

        let response = self
            .http
            .post(self.config.endpoint())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            log::error!("Image generation failed with {}: {}", status, body);
            return Err(api_error(status, &body));
        }

        parse_image_response(&body)
    }
}

pub fn parse_image_response(body: &str) -> Result<GeneratedImage> {
    let response: ImageGenerationResponse = serde_json::from_str(body)?;

    let first = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| RemixError::Response("No images generated".into()))?;

    match first.url {
        Some(url) if !url.is_empty() => Ok(GeneratedImage {
            url,
            revised_prompt: first.revised_prompt,
        }),
        _ => Err(RemixError::Response("No images generated".into())),
    }
}

#[async_trait]
impl ImageModel for ImageClient {
    async fn generate(&self, request: ImageGenerationRequest) -> Result<GeneratedImage> {
        ImageClient::generate(self, request).await
    }
}

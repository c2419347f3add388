use crate::{
    error::{RemixError, Result},
    models::{
        ChatCompletionRequest, GeneratedImage, ImageFormat, ImageGenerationRequest, StreamChunk,
        UploadedImage,
    },
    pipeline::{ImageModel, TextStream, VisionModel},
};
use async_trait::async_trait;
use std::sync::Mutex;

pub fn sample_image() -> UploadedImage {
    UploadedImage::new(
        "tower.png",
        ImageFormat::Png,
        vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
    )
    .unwrap()
}

/// Replays a fixed token sequence and records every request.
pub struct StubVision {
    tokens: Vec<String>,
    failure: Option<String>,
    requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl StubVision {
    pub fn new(tokens: &[&str]) -> Self {
        Self {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            failure: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(&[])
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionModel for StubVision {
    async fn stream_prompt(&self, request: ChatCompletionRequest) -> Result<TextStream> {
        self.requests.lock().unwrap().push(request);
        if let Some(message) = &self.failure {
            return Err(RemixError::Api {
                status: 500,
                message: message.clone(),
            });
        }

        let mut chunks: Vec<Result<StreamChunk>> = self
            .tokens
            .iter()
            .map(|token| Ok(StreamChunk::text(token.clone())))
            .collect();
        chunks.push(Ok(StreamChunk::finished("stop")));
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// Returns a fixed URL and records every request.
pub struct StubImages {
    url: String,
    requests: Mutex<Vec<ImageGenerationRequest>>,
}

impl StubImages {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ImageGenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageModel for StubImages {
    async fn generate(&self, request: ImageGenerationRequest) -> Result<GeneratedImage> {
        self.requests.lock().unwrap().push(request);
        Ok(GeneratedImage {
            url: self.url.clone(),
            revised_prompt: None,
        })
    }
}

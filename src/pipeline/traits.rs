use crate::{
    error::Result,
    models::{ChatCompletionRequest, GeneratedImage, ImageGenerationRequest, StreamChunk},
};
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

/// Finite, non-restartable sequence of text fragments from the chat model.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn stream_prompt(&self, request: ChatCompletionRequest) -> Result<TextStream>;
}

#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn generate(&self, request: ImageGenerationRequest) -> Result<GeneratedImage>;
}

//! Upload + instruction in, streamed prompt and one generated image out.
//!
//! [`RemixPipeline::run`] validates the submission synchronously, then drives both hosted
//! services on a spawned task. Progress is reported as [`RemixEvent`]s through a bounded
//! channel; dropping the returned stream stops the task at its next event.

pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

use crate::{
    config::{ChatConfig, ImageConfig},
    error::{RemixError, Result},
    logger,
    models::{GeneratedImage, ImageGenerationRequest, UploadedImage},
    openai::build_vision_request,
};
use futures::{stream::Stream, StreamExt};
use serde::Serialize;
use std::{pin::Pin, sync::Arc};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub use traits::{ImageModel, TextStream, VisionModel};

pub type EventStream = Pin<Box<dyn Stream<Item = RemixEvent> + Send>>;

const EVENT_BUFFER: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RemixEvent {
    PromptStarted,
    PromptChunk {
        text: String,
    },
    PromptDone {
        prompt: String,
    },
    ImageStarted,
    ImageReady {
        url: String,
        caption: String,
        revised_prompt: Option<String>,
    },
    Error {
        message: String,
    },
}

impl RemixEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RemixEvent::PromptStarted => "prompt_started",
            RemixEvent::PromptChunk { .. } => "prompt_chunk",
            RemixEvent::PromptDone { .. } => "prompt_done",
            RemixEvent::ImageStarted => "image_started",
            RemixEvent::ImageReady { .. } => "image_ready",
            RemixEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RemixEvent::ImageReady { .. } | RemixEvent::Error { .. })
    }
}

/// Everything one submission needs; nothing is read from ambient state.
#[derive(Debug, Clone)]
pub struct Submission {
    pub image: Option<UploadedImage>,
    pub instruction: String,
}

impl Submission {
    pub fn new(image: Option<UploadedImage>, instruction: impl Into<String>) -> Self {
        Self {
            image,
            instruction: instruction.into(),
        }
    }

    fn into_parts(self) -> Result<(UploadedImage, String)> {
        let image = self.image.ok_or(RemixError::MissingUpload)?;
        let instruction = self.instruction.trim();
        if instruction.is_empty() {
            return Err(RemixError::EmptyInstruction);
        }
        Ok((image, instruction.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemixOutcome {
    pub instruction: String,
    pub image: UploadedImage,
    pub prompt: String,
    pub generated: GeneratedImage,
}

#[derive(Clone)]
pub struct RemixPipeline {
    vision: Arc<dyn VisionModel>,
    images: Arc<dyn ImageModel>,
    chat_config: ChatConfig,
    image_config: ImageConfig,
}

impl RemixPipeline {
    pub fn new(
        vision: Arc<dyn VisionModel>,
        images: Arc<dyn ImageModel>,
        chat_config: ChatConfig,
        image_config: ImageConfig,
    ) -> Self {
        Self {
            vision,
            images,
            chat_config,
            image_config,
        }
    }

    pub fn run(&self, submission: Submission) -> Result<EventStream> {
        self.run_with(submission, |_| {})
    }

    /// Like [`run`](Self::run), but `on_finish` is called exactly once with the final result,
    /// including when the consumer went away mid-run.
    pub fn run_with<F>(&self, submission: Submission, on_finish: F) -> Result<EventStream>
    where
        F: FnOnce(Result<RemixOutcome>) + Send + 'static,
    {
        let (image, instruction) = submission.into_parts()?;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let pipeline = self.clone();

        tokio::spawn(async move {
            let result = pipeline.drive(image, instruction, &tx).await;
            if let Err(e) = &result {
                log::error!("Remix failed: {}", e);
                let _ = tx
                    .send(RemixEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
            on_finish(result);
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    /// Runs a submission to completion, discarding the intermediate events.
    pub async fn execute(&self, submission: Submission) -> Result<RemixOutcome> {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let mut events = self.run_with(submission, move |result| {
            let _ = done_tx.send(result);
        })?;
        while events.next().await.is_some() {}

        done_rx
            .await
            .map_err(|_| RemixError::Stream("Remix task ended without a result".into()))?
    }

    async fn drive(
        &self,
        image: UploadedImage,
        instruction: String,
        tx: &mpsc::Sender<RemixEvent>,
    ) -> Result<RemixOutcome> {
        let _timer = logger::timer("remix");

        emit(tx, RemixEvent::PromptStarted).await?;
        let request = build_vision_request(&self.chat_config, &image, &instruction)?;
        let mut stream = self.vision.stream_prompt(request).await?;

        let mut prompt = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if !chunk.chunk.is_empty() {
                prompt.push_str(&chunk.chunk);
                emit(tx, RemixEvent::PromptChunk { text: chunk.chunk }).await?;
            }
            if chunk.done {
                if let Some(reason) = chunk.finish_reason {
                    log::debug!("Prompt stream finished: {}", reason);
                }
                break;
            }
        }

        if prompt.trim().is_empty() {
            return Err(RemixError::Response(
                "The vision model returned an empty prompt".into(),
            ));
        }
        log::info!("Image prompt ready ({} characters)", prompt.chars().count());

        emit(
            tx,
            RemixEvent::PromptDone {
                prompt: prompt.clone(),
            },
        )
        .await?;
        emit(tx, RemixEvent::ImageStarted).await?;

        let request = ImageGenerationRequest::from_prompt(&self.image_config, prompt.clone());
        let generated = self.images.generate(request).await?;
        log::info!("Image generated: {}", generated.url);

        emit(
            tx,
            RemixEvent::ImageReady {
                url: generated.url.clone(),
                caption: prompt.clone(),
                revised_prompt: generated.revised_prompt.clone(),
            },
        )
        .await?;

        Ok(RemixOutcome {
            instruction,
            image,
            prompt,
            generated,
        })
    }
}

async fn emit(tx: &mpsc::Sender<RemixEvent>, event: RemixEvent) -> Result<()> {
    tx.send(event)
        .await
        .map_err(|_| RemixError::Stream("Client disconnected".into()))
}

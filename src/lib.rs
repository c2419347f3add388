//! Upload an image, say how it should change, and get a new image back.
//!
//! A vision chat model turns the upload and the instruction into an English image prompt,
//! streamed to the page as it is written; an image-generation service then draws it.

pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod openai;
pub mod pipeline;
pub mod prompt;
pub mod server;
pub mod session;

pub use config::{ChatConfig, Config, ImageConfig};
pub use error::{RemixError, Result};
pub use models::*;
pub use openai::{ChatClient, ImageClient, OpenAiClient};
pub use pipeline::{
    EventStream, ImageModel, RemixEvent, RemixOutcome, RemixPipeline, Submission, TextStream,
    VisionModel,
};
pub use server::AppState;
pub use session::{SessionPhase, SessionStore};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub chunk: String,
    pub done: bool,
    pub finish_reason: Option<String>,
}

impl StreamChunk {
    pub fn text(chunk: impl Into<String>) -> Self {
        Self {
            chunk: chunk.into(),
            done: false,
            finish_reason: None,
        }
    }

    pub fn finished(reason: impl Into<String>) -> Self {
        Self {
            chunk: String::new(),
            done: true,
            finish_reason: Some(reason.into()),
        }
    }
}

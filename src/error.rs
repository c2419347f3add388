use actix_web::{http::StatusCode, HttpResponse, ResponseError};

#[derive(Debug, thiserror::Error)]
pub enum RemixError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("Response error: {0}")]
    Response(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Unsupported image format: {0} (expected png, jpg, jpeg, webp or gif)")]
    UnsupportedFormat(String),

    #[error("Uploaded file is empty")]
    EmptyUpload,

    #[error("Uploaded file exceeds {limit} bytes")]
    UploadTooLarge { limit: usize },

    #[error("No image has been uploaded")]
    MissingUpload,

    #[error("No instruction was given")]
    EmptyInstruction,

    #[error("An image is already being generated for this session")]
    Busy,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemixError {
    /// True for errors caused by what the user submitted rather than by an upstream service.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            RemixError::UnsupportedFormat(_)
                | RemixError::EmptyUpload
                | RemixError::UploadTooLarge { .. }
                | RemixError::MissingUpload
                | RemixError::EmptyInstruction
        )
    }
}

impl ResponseError for RemixError {
    fn status_code(&self) -> StatusCode {
        match self {
            e if e.is_input_error() => StatusCode::BAD_REQUEST,
            RemixError::Busy => StatusCode::CONFLICT,
            RemixError::Api { .. }
            | RemixError::Http(_)
            | RemixError::Response(_)
            | RemixError::Stream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("text/plain; charset=utf-8")
            .body(self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RemixError>;

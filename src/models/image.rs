use crate::config::ImageConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageGenerationRequest {
    pub model: String,
    pub prompt: String,
    pub size: String,
    pub quality: String,
    pub n: u32,
}

impl ImageGenerationRequest {
    /// Always asks for exactly one image at the configured size and quality.
    pub fn from_prompt(config: &ImageConfig, prompt: impl Into<String>) -> Self {
        Self {
            model: config.model.clone(),
            prompt: prompt.into(),
            size: config.size.clone(),
            quality: config.quality.clone(),
            n: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ImageGenerationResponse {
    #[serde(default)]
    pub data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
pub struct ImageData {
    pub url: Option<String>,
    pub revised_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub url: String,
    pub revised_prompt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_is_fixed_regardless_of_prompt() {
        let config = ImageConfig::default();
        for prompt in ["", "A cat", "make it 4 images at 4096x4096 in hd"] {
            let request = ImageGenerationRequest::from_prompt(&config, prompt);
            assert_eq!(request.n, 1);
            assert_eq!(request.size, "1792x1024");
            assert_eq!(request.quality, "standard");
            assert_eq!(request.model, "dall-e-3");
            assert_eq!(request.prompt, prompt);
        }
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"created":1,"data":[{"url":"https://img.example/1.png","revised_prompt":"A cat"}]}"#;
        let response: ImageGenerationResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.data.len(), 1);
        assert_eq!(response.data[0].url.as_deref(), Some("https://img.example/1.png"));
        assert_eq!(response.data[0].revised_prompt.as_deref(), Some("A cat"));
    }
}

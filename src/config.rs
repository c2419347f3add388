use crate::error::{RemixError, Result};
use std::env;

pub const DEFAULT_CHAT_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_CHAT_MODEL: &str = "deepseek-chat";
pub const DEFAULT_IMAGE_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
pub const IMAGE_SIZE: &str = "1792x1024";
pub const IMAGE_QUALITY: &str = "standard";

/// Settings for the vision chat model that writes the image prompt.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Settings for the image generation service.
#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub size: String,
    pub quality: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub session_ttl_secs: u64,
    pub chat: ChatConfig,
    pub image: ImageConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            api_key: None,
            base_url: DEFAULT_CHAT_BASE_URL.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: 512,
        }
    }
}

impl ChatConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let api_key = env::var("DEEP_SEEK_API_KEY")
            .or_else(|_| env::var("CHAT_API_KEY"))
            .ok()
            .filter(|key| !key.is_empty());
        let base_url = env::var("CHAT_BASE_URL").unwrap_or(defaults.base_url);
        let model = env::var("CHAT_MODEL").unwrap_or(defaults.model);
        let temperature = env::var("CHAT_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.temperature);
        let max_tokens = env::var("CHAT_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_tokens);

        ChatConfig {
            api_key,
            base_url,
            model,
            temperature,
            max_tokens,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig {
            api_key: None,
            base_url: DEFAULT_IMAGE_BASE_URL.to_string(),
            model: DEFAULT_IMAGE_MODEL.to_string(),
            size: IMAGE_SIZE.to_string(),
            quality: IMAGE_QUALITY.to_string(),
        }
    }
}

impl ImageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // Size and quality are fixed; only the credentials, endpoint and model come from the environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let api_key = env::var("OPENAI_API_KEY").ok().filter(|key| !key.is_empty());
        let base_url = env::var("IMAGE_BASE_URL").unwrap_or(defaults.base_url);
        let model = env::var("IMAGE_MODEL").unwrap_or(defaults.model);

        ImageConfig {
            api_key,
            base_url,
            model,
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}/images/generations", self.base_url.trim_end_matches('/'))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "127.0.0.1".to_string(),
            port: 8501,
            max_upload_bytes: 20 * 1024 * 1024,
            session_ttl_secs: 3600,
            chat: ChatConfig::default(),
            image: ImageConfig::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let host = env::var("HOST").unwrap_or(defaults.host);
        let port = env::var("PORT")
            .ok()
            .and_then(|port| port.parse().ok())
            .unwrap_or(defaults.port);
        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or(defaults.max_upload_bytes);
        let session_ttl_secs = env::var("SESSION_TTL_SECS")
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or(defaults.session_ttl_secs);

        Config {
            host,
            port,
            max_upload_bytes,
            session_ttl_secs,
            chat: ChatConfig::from_env(),
            image: ImageConfig::from_env(),
        }
    }

    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    pub fn with_chat(mut self, chat: ChatConfig) -> Self {
        self.chat = chat;
        self
    }

    pub fn with_image(mut self, image: ImageConfig) -> Self {
        self.image = image;
        self
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    /// Checks that both services have credentials and that the numeric settings are usable.
    pub fn validate(&self) -> Result<()> {
        if self.chat.api_key.is_none() {
            return Err(RemixError::Config(
                "DEEP_SEEK_API_KEY (or CHAT_API_KEY) is not set".into(),
            ));
        }
        if self.image.api_key.is_none() {
            return Err(RemixError::Config("OPENAI_API_KEY is not set".into()));
        }
        if !(0.0..=2.0).contains(&self.chat.temperature) {
            return Err(RemixError::Config(format!(
                "CHAT_TEMPERATURE must be between 0 and 2, got {}",
                self.chat.temperature
            )));
        }
        if self.chat.max_tokens == 0 {
            return Err(RemixError::Config("CHAT_MAX_TOKENS must be positive".into()));
        }
        if self.max_upload_bytes == 0 {
            return Err(RemixError::Config("MAX_UPLOAD_BYTES must be positive".into()));
        }
        Ok(())
    }
}

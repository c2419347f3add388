pub mod chat_client;
pub mod image_client;

#[cfg(test)]
pub(crate) mod testing;

use crate::{config::Config, error::Result};
use std::time::Duration;

pub use chat_client::{build_vision_request, ChatClient};
pub use image_client::ImageClient;

/// Both hosted-service clients, sharing one connection pool.
#[derive(Clone)]
pub struct OpenAiClient {
    chat_client: ChatClient,
    image_client: ImageClient,
}

impl OpenAiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            chat_client: ChatClient::new(http.clone(), config.chat.clone()),
            image_client: ImageClient::new(http, config.image.clone()),
        })
    }

    pub fn into_parts(self) -> (ChatClient, ImageClient) {
        (self.chat_client, self.image_client)
    }
}

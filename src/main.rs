use image_remix::{logger, server, AppState, Config, OpenAiClient, RemixPipeline};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_file = dotenv::dotenv();

    logger::init_with_config(logger::LoggerConfig::from_env())?;

    match env_file {
        Ok(path) => log::info!("✅ Loaded environment from {}", path.display()),
        Err(_) => log::warn!("⚠️  No .env file found, using system environment variables"),
    }

    let config = Config::from_env();
    logger::log_startup_info(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), &config);
    logger::log_config_info(&config);

    if let Err(e) = config.validate() {
        log::error!("❌ {}", e);
        return Err(e.into());
    }

    let (chat, images) = OpenAiClient::new(&config)?.into_parts();
    let pipeline = RemixPipeline::new(
        Arc::new(chat),
        Arc::new(images),
        config.chat.clone(),
        config.image.clone(),
    );
    let state = AppState::new(pipeline, config.max_upload_bytes);

    server::serve(&config, state).await?;
    log::info!("👋 Server stopped");
    Ok(())
}

pub mod page;

use crate::{
    config::Config,
    error::{RemixError, Result},
    models::{ImageFormat, UploadedImage},
    pipeline::{RemixEvent, RemixPipeline, Submission},
    session::SessionStore,
};
use actix_multipart::Multipart;
use actix_web::{
    cookie::{Cookie, SameSite},
    http::header,
    middleware, web, App, HttpRequest, HttpResponse, HttpServer,
};
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use std::{convert::Infallible, time::Duration};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "remix_session";
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    pub pipeline: RemixPipeline,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(pipeline: RemixPipeline, max_upload_bytes: usize) -> Self {
        Self {
            sessions: SessionStore::new(),
            pipeline,
            max_upload_bytes,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RemixForm {
    #[serde(default)]
    pub instruction: String,
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/upload", web::post().to(upload))
        .route("/upload/image", web::get().to(upload_image))
        .route("/result/image", web::get().to(result_image))
        .route("/remix", web::post().to(remix))
        .route("/health", web::get().to(health));
}

fn session_id(req: &HttpRequest) -> Option<Uuid> {
    req.cookie(SESSION_COOKIE)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

fn session_cookie(id: Uuid) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, id.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish()
}

/// Formats one event as a server-sent-event frame.
pub fn sse_frame(event: &RemixEvent) -> String {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("event: {}\ndata: {}\n\n", event.kind(), data)
}

async fn index(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    let (view, created) = state.sessions.get_or_create(session_id(&req));
    let html = page::render_page(&view)?;

    let mut response = HttpResponse::Ok();
    response.content_type("text/html; charset=utf-8");
    if created {
        response.cookie(session_cookie(view.id));
    }
    Ok(response.body(html))
}

async fn upload(
    req: HttpRequest,
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse> {
    let (view, created) = state.sessions.get_or_create(session_id(&req));
    let limit = state.max_upload_bytes;
    let mut image = None;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| RemixError::Request(e.to_string()))?
    {
        let disposition = field.content_disposition();
        if disposition.get_name() != Some("file") {
            continue;
        }
        let file_name = disposition.get_filename().unwrap_or_default().to_string();
        let content_type = field.content_type().map(|mime| mime.essence_str().to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| RemixError::Request(e.to_string()))?;
            if bytes.len() + chunk.len() > limit {
                log::warn!("Rejected upload {} above {} bytes", file_name, limit);
                return Err(RemixError::UploadTooLarge { limit });
            }
            bytes.extend_from_slice(&chunk);
        }

        if file_name.is_empty() && bytes.is_empty() {
            continue;
        }
        let format = ImageFormat::resolve(Some(&file_name), content_type.as_deref())?;
        image = Some(UploadedImage::new(file_name, format, bytes)?);
    }

    let image = image.ok_or(RemixError::MissingUpload)?;
    state.sessions.store_upload(&view.id, image)?;

    let mut response = HttpResponse::SeeOther();
    response.insert_header((header::LOCATION, "/"));
    if created {
        response.cookie(session_cookie(view.id));
    }
    Ok(response.finish())
}

fn image_response(image: Option<UploadedImage>) -> HttpResponse {
    match image {
        Some(image) => HttpResponse::Ok()
            .content_type(image.mime_type())
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .body(image.bytes),
        None => HttpResponse::NotFound().finish(),
    }
}

async fn upload_image(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    image_response(session_id(&req).and_then(|id| state.sessions.upload(&id)))
}

async fn result_image(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    image_response(
        session_id(&req)
            .and_then(|id| state.sessions.last_result(&id))
            .map(|last| last.image),
    )
}

async fn remix(
    req: HttpRequest,
    state: web::Data<AppState>,
    form: web::Form<RemixForm>,
) -> Result<HttpResponse> {
    let id = session_id(&req)
        .filter(|id| state.sessions.get(id).is_some())
        .ok_or(RemixError::MissingUpload)?;
    let instruction = form.into_inner().instruction;
    if instruction.trim().is_empty() {
        return Err(RemixError::EmptyInstruction);
    }

    let image = state.sessions.begin_generation(&id)?;
    log::info!("Session {} submitted: {}", id, instruction.trim());

    let sessions = state.sessions.clone();
    let events = state
        .pipeline
        .run_with(Submission::new(Some(image), instruction), move |result| {
            let recorded = match result {
                Ok(outcome) => sessions.finish_generation(&id, outcome),
                Err(_) => sessions.fail_generation(&id),
            };
            if let Err(e) = recorded {
                log::warn!("Could not record result for session {}: {}", id, e);
            }
        });

    let events = match events {
        Ok(events) => events,
        Err(e) => {
            state.sessions.fail_generation(&id)?;
            return Err(e);
        }
    };

    let body = events.map(|event| Ok::<_, Infallible>(web::Bytes::from(sse_frame(&event))));

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(body))
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn spawn_session_eviction(sessions: SessionStore, ttl_secs: u64) {
    let max_age = chrono::Duration::seconds(ttl_secs.min(u32::MAX as u64) as i64);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EVICTION_INTERVAL);
        loop {
            interval.tick().await;
            let evicted = sessions.evict_idle(max_age);
            if evicted > 0 {
                log::info!("Evicted {} idle sessions ({} remaining)", evicted, sessions.len());
            }
        }
    });
}

pub async fn serve(config: &Config, state: AppState) -> Result<()> {
    spawn_session_eviction(state.sessions.clone(), config.session_ttl_secs);

    let data = web::Data::new(state);
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::new("%r %s %b %Dms"))
            .app_data(data.clone())
            .configure(routes)
    })
    .bind(config.bind_address())?
    .run()
    .await?;

    Ok(())
}

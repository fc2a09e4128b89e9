//! HTTP routes serving the merged outputs.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use interfaces::Config;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::codec::epg as guide_codec;
use crate::codec::site::{MultiRepo, SiteRepo};
use crate::mixer::{self, site::mix_spider};
use crate::source_manager::SourceManager;
use crate::types::MixError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sources: SourceManager,
}

impl AppState {
    pub fn new(config: Config, sources: SourceManager) -> Self {
        Self {
            config: Arc::new(config),
            sources,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0} is disabled")]
    Disabled(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Mix(#[from] MixError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Disabled(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Mix(e) => {
                error!("Merge failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/v1/tvbox/repo", get(site_repo))
        .route("/v1/tvbox/multi_repo", get(multi_repo))
        .route("/v1/tvbox/spider", get(spider))
        .route("/v1/epg.xml", get(guide))
        .route("/v1/m3u/media_playlist", get(media_playlist))
        .route("/v1/refresh", post(refresh))
        .with_state(state)
}

/// Run the site and multi repo merges once so a broken config fails at start-up.
pub async fn prerun(state: &AppState) -> crate::types::Result<()> {
    let config = state.config.as_ref();
    if !config.tvbox_single_repo_opt.disable {
        mixer::mix_site_repo(config, &state.sources).await?;
    }
    if !config.tvbox_multi_repo_opt.disable {
        mixer::mix_multi_repo(config, &state.sources).await?;
    }
    Ok(())
}

pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}", addr);
    }
    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await
}

async fn home() -> &'static str {
    "Hello, MixProxy!"
}

async fn site_repo(State(state): State<AppState>) -> ApiResult<Json<SiteRepo>> {
    if state.config.tvbox_single_repo_opt.disable {
        return Err(ApiError::Disabled("single repo"));
    }
    Ok(Json(mixer::mix_site_repo(&state.config, &state.sources).await?))
}

async fn multi_repo(State(state): State<AppState>) -> ApiResult<Json<MultiRepo>> {
    if state.config.tvbox_multi_repo_opt.disable {
        return Err(ApiError::Disabled("multi repo"));
    }
    Ok(Json(mixer::mix_multi_repo(&state.config, &state.sources).await?))
}

async fn spider(State(state): State<AppState>) -> ApiResult<Redirect> {
    match mix_spider(&state.config, &state.sources).await? {
        Some(url) => Ok(Redirect::temporary(&url)),
        None => Err(ApiError::NotFound("spider")),
    }
}

#[derive(Debug, Default, Deserialize)]
struct GuideQuery {
    #[serde(default)]
    format: Option<String>,
}

/// The guide is always gzip-encoded; `?format=gz` also marks it as a download.
async fn guide(State(state): State<AppState>, Query(query): Query<GuideQuery>) -> ApiResult<Response> {
    if state.config.epg.disable {
        return Err(ApiError::Disabled("epg"));
    }
    let guide = mixer::mix_epg(&state.config, &state.sources).await?;
    let body = guide_codec::to_gzip(&guide)?;

    let mut response = (
        [
            (header::CONTENT_TYPE, "application/xml; charset=utf-8"),
            (header::CONTENT_ENCODING, "gzip"),
        ],
        body,
    )
        .into_response();
    if query.format.as_deref() == Some("gz") {
        response.headers_mut().insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=epg.xml.gz"),
        );
    }
    Ok(response)
}

async fn media_playlist(State(state): State<AppState>) -> ApiResult<Response> {
    if state.config.m3u.disable {
        return Err(ApiError::Disabled("m3u"));
    }
    let playlist = mixer::mix_playlist(&state.config, &state.sources).await?;
    Ok(([(header::CONTENT_TYPE, "audio/x-mpegurl; charset=utf-8")], playlist.to_string()).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct RefreshQuery {
    #[serde(default)]
    force: bool,
}

async fn refresh(State(state): State<AppState>, Query(query): Query<RefreshQuery>) -> StatusCode {
    state.sources.trigger_refresh(query.force);
    StatusCode::ACCEPTED
}

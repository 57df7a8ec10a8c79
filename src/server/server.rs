use anyhow::{Context, Result};
use std::time::Duration;

use tracing::{error, info, warn};

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{log_requests, metrics, state::*, ServerConfig};
use crate::ingestion::{now_playing_event, Appender};
use crate::play_event::Source;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize, Debug)]
struct NowPlayingBody {
    pub key: String,
    pub message: String,
}

fn reply(status: StatusCode, label: &str, text: &'static str) -> Response {
    metrics::record_webhook_submission(label);
    (status, text).into_response()
}

async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    Json(ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
    })
}

/// Accepts `{"key": .., "message": "<track> by <artist>"}` and appends it
/// to the raw log as a now-playing play.
async fn submit_now_playing(State(state): State<ServerState>, body: Bytes) -> Response {
    let body: NowPlayingBody = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(err) => {
            warn!("Webhook body is not valid json: {}", err);
            return reply(StatusCode::BAD_REQUEST, "bad_json", "failed to parse json");
        }
    };

    if body.key != state.config.webhook_token {
        warn!("Webhook submission with wrong key");
        return reply(StatusCode::UNAUTHORIZED, "unauthorized", "unauthorized");
    }

    let play = match now_playing_event(&body.message, Utc::now()) {
        Ok(play) => play,
        Err(err) => {
            warn!("Could not parse now playing message {:?}: {}", body.message, err);
            return reply(
                StatusCode::BAD_REQUEST,
                "bad_message",
                "failed to parse message",
            );
        }
    };

    if state.config.dry_run {
        info!(
            "Dry run: not storing now playing \"{}\" by \"{}\"",
            play.track, play.artist
        );
        return reply(StatusCode::OK, "dry_run", "completed");
    }

    let appender = Appender::new(
        state.raw_store.as_ref(),
        state.config.append_chunk_size,
        false,
    );
    match appender.append(Source::NowPlaying, std::slice::from_ref(&play)) {
        Ok(report) => {
            info!(
                "Stored now playing \"{}\" by \"{}\" ({} new)",
                play.track, play.artist, report.appended
            );
            reply(StatusCode::OK, "completed", "completed")
        }
        Err(err) => {
            error!("Failed to store now playing submission: {}", err);
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_failed",
                "failed to upload track",
            )
        }
    }
}

pub fn make_app(state: ServerState) -> Router {
    Router::new()
        .route("/", post(submit_now_playing))
        .route("/health", get(health))
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

pub fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics::metrics_handler))
}

pub async fn run_server(config: ServerConfig, raw_store: GuardedRawPlayStore) -> Result<()> {
    let port = config.port;
    let metrics_port = config.metrics_port;
    let app = make_app(ServerState::new(config, raw_store));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind webhook port {}", port))?;
    let metrics_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;

    info!("Ready to serve at port {}!", port);
    info!("Metrics available at port {}!", metrics_port);

    tokio::try_join!(
        async { axum::serve(listener, app).await.context("Webhook server failed") },
        async {
            axum::serve(metrics_listener, make_metrics_app())
                .await
                .context("Metrics server failed")
        },
    )?;
    Ok(())
}

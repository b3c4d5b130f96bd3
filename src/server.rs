use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::info;

use crate::{
    backend::ScanBackend,
    controller::StartOutcome,
    dashboard::Dashboard,
    detail::DetailRecord,
    types::ListKey,
};

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub accepted: bool,
    pub outcome: Option<StartOutcome>,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct DetailResponse {
    pub record: DetailRecord,
    pub html: String,
}

/// API routes plus a static fallback that serves `ui/` when it exists.
pub fn router<B: ScanBackend>(dashboard: Arc<Dashboard<B>>) -> Router {
    let api = Router::new()
        .route("/state", get(get_state::<B>))
        .route("/view", get(get_view::<B>))
        .route("/scan", post(post_scan::<B>))
        .route(
            "/detail",
            get(get_detail::<B>).delete(delete_detail::<B>),
        )
        .route("/detail/{list}/{index}", post(post_detail::<B>))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(dashboard);

    let static_svc = ServeDir::new("ui").append_index_html_on_directories(true);

    Router::new()
        .nest("/api", api)
        .fallback_service(static_svc)
        .layer(TraceLayer::new_for_http())
}

pub async fn spawn_server<B: ScanBackend>(bind: &str, dashboard: Arc<Dashboard<B>>) -> Result<()> {
    let app = router(dashboard);
    info!(%bind, "serving dashboard UI");
    axum::serve(tokio::net::TcpListener::bind(bind).await?, app).await?;
    Ok(())
}

async fn get_state<B: ScanBackend>(State(dash): State<Arc<Dashboard<B>>>) -> impl IntoResponse {
    (StatusCode::OK, Json(dash.state().await))
}

async fn get_view<B: ScanBackend>(State(dash): State<Arc<Dashboard<B>>>) -> impl IntoResponse {
    (StatusCode::OK, Json(dash.rendered()))
}

async fn post_scan<B: ScanBackend>(State(dash): State<Arc<Dashboard<B>>>) -> impl IntoResponse {
    let outcome = dash.start_scan().await;
    let accepted = matches!(
        outcome,
        Some(StartOutcome::Pending(_)) | Some(StartOutcome::Completed(_))
    );
    let code = match outcome {
        Some(StartOutcome::Pending(_)) => StatusCode::ACCEPTED,
        Some(StartOutcome::Ignored { .. }) => StatusCode::CONFLICT,
        None => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    let body = ScanResponse {
        accepted,
        outcome,
        status: dash.status().status_text,
    };
    (code, Json(body))
}

async fn post_detail<B: ScanBackend>(
    State(dash): State<Arc<Dashboard<B>>>,
    Path((list, index)): Path<(String, String)>,
) -> impl IntoResponse {
    let list = match list.parse::<ListKey>() {
        Ok(l) => l,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    match dash.open_detail(list, &index).await {
        Some(record) => {
            let html = record.render_html();
            (StatusCode::OK, Json(DetailResponse { record, html })).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn get_detail<B: ScanBackend>(State(dash): State<Arc<Dashboard<B>>>) -> impl IntoResponse {
    match dash.detail().await {
        Some(record) => {
            let html = record.render_html();
            (StatusCode::OK, Json(DetailResponse { record, html })).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn delete_detail<B: ScanBackend>(State(dash): State<Arc<Dashboard<B>>>) -> impl IntoResponse {
    dash.close_detail().await;
    StatusCode::NO_CONTENT
}

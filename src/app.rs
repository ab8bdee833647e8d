use std::net::SocketAddr;
use std::sync::Arc;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Extension, Json, Router, TypedHeader};
use serde::Deserialize;
use tokio::sync::Semaphore;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::info;
use crate::config::Config;
use crate::handlers::attendance::AttendanceBackend;
use crate::handlers::event_actor::{Clock, Dependencies};
use crate::handlers::geocoder::FallbackGeocoder;
use crate::handlers::websocket_actor::CheckInSession;
use crate::jwt_auth::{auth, ErrorResponse};
use crate::models::session::Session;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub geocoder: Arc<dyn FallbackGeocoder>,
    pub backend: Arc<dyn AttendanceBackend>,
    pub clock: Arc<dyn Clock>,
    pub sessions: Arc<Semaphore>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// `false` when the browser has no `navigator.geolocation`.
    #[serde(default = "default_true")]
    pub geolocation: bool,
}

fn default_true() -> bool {
    true
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws/checkin", get(checkin_ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth))
        .route("/health", get(|| async { "OK" }))
        // logging so we can see whats going on
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .with_state(state)
}

async fn checkin_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(params): Query<ConnectParams>,
    user_agent: Option<TypedHeader<headers::UserAgent>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    let Some(settings) = state.config.flow_settings(session.role) else {
        return reject(StatusCode::FORBIDDEN, format!("{:?} accounts do not check in", session.role));
    };
    let Ok(permit) = state.sessions.clone().try_acquire_owned() else {
        return reject(StatusCode::SERVICE_UNAVAILABLE, "Too many active check-in sessions".to_string());
    };

    info!("{} ({:?}) connected from {} with {}", session.user_id, session.role, addr,
        user_agent.map(|TypedHeader(ua)| ua.as_str().to_string()).unwrap_or_else(|| "unknown agent".to_string()));

    ws.on_upgrade(move |socket| async move {
        let check_in = CheckInSession::new(session, settings, params.geolocation, |provider| Dependencies {
            provider,
            geocoder: state.geocoder.clone(),
            backend: state.backend.clone(),
            clock: state.clock.clone(),
        });
        check_in.run(socket).await;
        drop(permit);
    })
}

fn reject(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorResponse { status: "fail", message })).into_response()
}

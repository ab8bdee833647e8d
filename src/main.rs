//! Location-verified attendance check-in service.
//!
//! A tutor's browser opens `/ws/checkin?token=<jwt>`; the service drives the
//! browser's geolocation over that socket, checks the fixes against the
//! tutor's assigned center and submits the day's attendance once the tutor
//! is close enough.
//!
//! Run the server with
//! ```not_rust
//! JWT_SECRET=... ATTENDANCE_API_URL=https://.../api/attendance cargo run
//! ```

mod app;
mod config;
mod handlers;
mod jwt_auth;
mod models;
#[cfg(test)]
mod test_support;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use crate::app::AppState;
use crate::config::Config;
use crate::handlers::attendance::HttpAttendanceBackend;
use crate::handlers::event_actor::LocalClock;
use crate::handlers::geocoder::HttpGeocoder;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "checkin_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match serve().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn serve() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    if config.geocoder_api_key.is_none() {
        info!("GEOCODER_API_KEY not set, fallback geocoding disabled");
    }

    let state = AppState {
        geocoder: Arc::new(HttpGeocoder::new(
            config.geocoder_url.clone(),
            config.geocoder_api_key.clone(),
            config.geocoder_timeout,
        )?),
        backend: Arc::new(HttpAttendanceBackend::new(config.attendance_api_url.clone())?),
        clock: Arc::new(LocalClock),
        sessions: Arc::new(Semaphore::new(config.max_concurrent_sessions)),
        config: Arc::new(config),
    };

    let addr: SocketAddr = format!("{}:{}", state.config.host, state.config.port).parse()?;
    info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app::router(state).into_make_service_with_connect_info::<SocketAddr>())
        .await?;
    Ok(())
}

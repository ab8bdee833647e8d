use std::time::Duration;
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{info, warn};
use crate::models::attendance::{AttendanceOutcome, AttendanceRequest, BackendResponse};
use crate::models::position::Coordinate;

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(15);
const MONGO_DUPLICATE_KEY: i64 = 11000;

/// The one write the check-in flow performs.
#[async_trait]
pub trait AttendanceBackend: Send + Sync {
    async fn mark_attendance(&self, coordinate: Coordinate, token: &str) -> AttendanceOutcome;
}

pub struct HttpAttendanceBackend {
    client: reqwest::Client,
    url: String,
}

impl HttpAttendanceBackend {
    pub fn new(url: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(SUBMIT_TIMEOUT)
            .build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl AttendanceBackend for HttpAttendanceBackend {
    async fn mark_attendance(&self, coordinate: Coordinate, token: &str) -> AttendanceOutcome {
        let response = match self.client
            .post(&self.url)
            .bearer_auth(token)
            .json(&AttendanceRequest::new(coordinate))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Attendance request failed: {}", e);
                return AttendanceOutcome::Failed(
                    "Unable to reach the attendance service. Please try again.".to_string());
            }
        };

        let status = response.status();
        // Error bodies are not always JSON.
        let body = response.text().await
            .ok()
            .and_then(|text| serde_json::from_str::<BackendResponse>(&text).ok())
            .unwrap_or_default();

        let outcome = classify(status, body);
        info!("Attendance submission answered {}: {:?}", status, outcome);
        outcome
    }
}

/// Splits backend answers into marked, already-marked and failed.
pub fn classify(status: StatusCode, body: BackendResponse) -> AttendanceOutcome {
    let message = body.message.clone().or_else(|| body.error.clone());

    if status.is_success() {
        return AttendanceOutcome::Marked(
            message.unwrap_or_else(|| "Attendance marked successfully".to_string()));
    }

    if status == StatusCode::CONFLICT || is_duplicate(&body) {
        return AttendanceOutcome::AlreadyMarked(
            "Request denied: attendance has already been marked for today".to_string());
    }

    AttendanceOutcome::Failed(
        message.unwrap_or_else(|| "Failed to mark attendance. Please try again.".to_string()))
}

fn is_duplicate(body: &BackendResponse) -> bool {
    let code_matches = match &body.code {
        Some(serde_json::Value::Number(n)) => n.as_i64() == Some(MONGO_DUPLICATE_KEY),
        Some(serde_json::Value::String(s)) => s.trim() == MONGO_DUPLICATE_KEY.to_string(),
        _ => false,
    };
    let text_matches = [&body.message, &body.error]
        .into_iter()
        .flatten()
        .map(|text| text.to_lowercase())
        .any(|text| text.contains("duplicate key") || text.contains("e11000") || text.contains("already marked"));
    code_matches || text_matches
}

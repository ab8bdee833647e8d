use std::env;
use std::str::FromStr;
use std::time::Duration;
use chrono::Weekday;
use thiserror::Error;
use crate::models::session::Role;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub attendance_api_url: String,
    pub geocoder_url: String,
    pub geocoder_api_key: Option<String>,
    pub geocoder_timeout: Duration,
    pub tutor_threshold_m: f64,
    pub guest_tutor_threshold_m: f64,
    pub update_interval: Duration,
    pub escalation_delay: Duration,
    pub error_debounce: Duration,
    pub rest_day: Weekday,
    pub max_concurrent_sessions: usize,
}

/// Per-session knobs handed to the check-in flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowSettings {
    pub threshold_m: f64,
    pub update_interval: Duration,
    pub escalation_delay: Duration,
    pub error_debounce: Duration,
    pub rest_day: Weekday,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            threshold_m: 100.0,
            update_interval: Duration::from_millis(5000),
            escalation_delay: Duration::from_millis(5000),
            error_debounce: Duration::from_millis(5000),
            rest_day: Weekday::Sun,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let millis = |key: &'static str, default: u64| -> Result<Duration, ConfigError> {
            parse(key, lookup(key), default).map(Duration::from_millis)
        };

        let rest_day = match lookup("REST_DAY") {
            Some(value) => Weekday::from_str(value.trim())
                .map_err(|_| ConfigError::Invalid { key: "REST_DAY", value })?,
            None => Weekday::Sun,
        };

        Ok(Config {
            host: string("HOST", "0.0.0.0"),
            port: parse("PORT", lookup("PORT"), 3000)?,
            jwt_secret: string("JWT_SECRET", "SECRET"),
            attendance_api_url: string("ATTENDANCE_API_URL", "http://localhost:5000/api/attendance"),
            geocoder_url: string("GEOCODER_URL", "https://api.opencagedata.com/geocode/v1/json"),
            geocoder_api_key: lookup("GEOCODER_API_KEY").filter(|k| !k.trim().is_empty()),
            geocoder_timeout: millis("GEOCODER_TIMEOUT_MS", 8000)?,
            tutor_threshold_m: parse("TUTOR_THRESHOLD_M", lookup("TUTOR_THRESHOLD_M"), 100.0)?,
            guest_tutor_threshold_m: parse("GUEST_TUTOR_THRESHOLD_M", lookup("GUEST_TUTOR_THRESHOLD_M"), 1300.0)?,
            update_interval: millis("UPDATE_INTERVAL_MS", 5000)?,
            escalation_delay: millis("ESCALATION_DELAY_MS", 5000)?,
            error_debounce: millis("ERROR_DEBOUNCE_MS", 5000)?,
            rest_day,
            max_concurrent_sessions: parse("MAX_CONCURRENT_SESSIONS", lookup("MAX_CONCURRENT_SESSIONS"), 10_000)?,
        })
    }

    /// Distance threshold for roles that check in; `None` for roles that don't.
    pub fn threshold_for(&self, role: Role) -> Option<f64> {
        match role {
            Role::Tutor => Some(self.tutor_threshold_m),
            Role::GuestTutor => Some(self.guest_tutor_threshold_m),
            Role::Admin | Role::Supervisor => None,
        }
    }

    pub fn flow_settings(&self, role: Role) -> Option<FlowSettings> {
        self.threshold_for(role).map(|threshold_m| FlowSettings {
            threshold_m,
            update_interval: self.update_interval,
            escalation_delay: self.escalation_delay,
            error_debounce: self.error_debounce,
            rest_day: self.rest_day,
        })
    }
}

fn parse<T: FromStr>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

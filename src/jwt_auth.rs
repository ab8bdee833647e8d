use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::Json;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use headers::authorization::Bearer;
use headers::{Authorization, HeaderMapExt};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, warn};
use crate::app::AppState;
use crate::models::position::Coordinate;
use crate::models::session::{Center, Role, Session};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default)]
    pub name: String,
    pub role: Role,
    pub center: Center,
    pub iat: usize,
    /// Checked when present; tokens without an expiry are accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<usize>,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("You are not logged in, please provide token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("Assigned center has invalid coordinates")]
    InvalidCenter,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::MissingToken | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AuthError::InvalidCenter => StatusCode::BAD_REQUEST,
        };
        let body = ErrorResponse { status: "fail", message: self.to_string() };
        (status, Json(body)).into_response()
    }
}

pub async fn auth<B>(
    State(state): State<AppState>,
    mut req: Request<B>,
    next: Next<B>,
) -> Result<impl IntoResponse, AuthError> {
    // Browsers can't set headers on a WebSocket upgrade, so `?token=` is accepted too.
    let token = req.headers()
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_owned())
        .or_else(|| query_token(req.uri().query()))
        .ok_or(AuthError::MissingToken)?;

    let session = verify(&token, &state.config.jwt_secret)?;
    debug!("Authenticated {} as {:?}", session.user_id, session.role);

    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

/// Decodes the token and turns its claims into the session handed to the flow.
pub fn verify(token: &str, secret: &str) -> Result<Session, AuthError> {
    let mut validation = Validation::default();
    validation.required_spec_claims.remove("exp");

    let claims = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )
        .map_err(|e| {
            warn!("Rejected token: {}", e);
            AuthError::InvalidToken(e)
        })?
        .claims;

    Coordinate::new(claims.center.latitude, claims.center.longitude)
        .map_err(|_| AuthError::InvalidCenter)?;

    Ok(Session {
        user_id: claims.sub,
        name: claims.name,
        role: claims.role,
        center: claims.center,
        token: token.to_owned(),
    })
}

fn query_token(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "token")
        .map(|(_, value)| value.to_owned())
        .filter(|value| !value.is_empty())
}

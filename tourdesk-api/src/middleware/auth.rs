use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tourdesk_booking::{Requester, Role};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
    pub exp: usize,
}

impl From<Claims> for Requester {
    fn from(claims: Claims) -> Self {
        let requester = match claims.role {
            Role::Customer => Requester::customer(claims.sub),
            Role::Admin => Requester::admin(claims.sub),
        };
        match claims.email {
            Some(email) => requester.with_email(email),
            None => requester,
        }
    }
}

fn authenticate(state: &AppState, req: &Request) -> Result<Requester, StatusCode> {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("Rejected bearer token: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    Ok(token_data.claims.into())
}

/// Any valid token; the caller is injected as a [`Requester`] extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let requester = authenticate(&state, &req)?;
    req.extensions_mut().insert(requester);
    Ok(next.run(req).await)
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let requester = authenticate(&state, &req)?;
    if !requester.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }
    req.extensions_mut().insert(requester);
    Ok(next.run(req).await)
}

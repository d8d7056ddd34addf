//! Exchange the API token for a session credential.
//!
//! `POST <serverUrl>/servers/authentication` with `{"token", "version"}`.
//! A 2xx reply carries the credential in `data`; anything else should carry
//! an `ErrorResult` describing why.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::daemon::Session;
use crate::error::AuthError;
use crate::hub::ErrorResult;
use crate::traits::{Headers, HttpClient, HttpError};

/// Path of the authentication endpoint relative to the server URL.
pub const AUTHENTICATION_PATH: &str = "servers/authentication";

/// User agent sent with every authentication request.
pub const USER_AGENT: &str = "accessh-daemon-client";

/// Shortest API token accepted.
pub const MIN_TOKEN_LENGTH: usize = 50;

#[derive(Serialize)]
struct AuthenticationRequest<'a> {
    token: &'a str,
    version: &'a str,
}

#[derive(Deserialize)]
struct AuthenticationResponse {
    #[serde(default, alias = "Data", alias = "jwt", alias = "Jwt")]
    data: Option<String>,
}

/// Reject tokens that are empty or too short to be real.
pub fn validate_token(token: &str) -> Result<(), AuthError> {
    let length = token.trim().chars().count();
    if length < MIN_TOKEN_LENGTH {
        return Err(AuthError::InvalidToken { length });
    }
    Ok(())
}

/// Full authentication URL for a server base URL.
pub fn authentication_url(server_url: &str) -> String {
    format!(
        "{}/{}",
        server_url.trim().trim_end_matches('/'),
        AUTHENTICATION_PATH
    )
}

/// HTTP client for the authentication endpoint.
#[derive(Clone)]
pub struct AuthenticationClient {
    http: Arc<dyn HttpClient>,
}

impl AuthenticationClient {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// Authenticate the session's API token.
    ///
    /// The token is validated before any request is made. The session is
    /// not modified; the caller stores the returned credential.
    pub async fn authenticate(&self, session: &Session) -> Result<String, AuthError> {
        validate_token(&session.api_token)?;

        let url = authentication_url(&session.server_url);
        let body = serde_json::to_string(&AuthenticationRequest {
            token: session.api_token.trim(),
            version: &session.client_version,
        })
        .map_err(|e| AuthError::Protocol {
            status: 0,
            message: e.to_string(),
        })?;

        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("User-Agent".to_string(), USER_AGENT.to_string());

        debug!("Authenticating against {}", url);
        let response = self
            .http
            .post(&url, &body, &headers)
            .await
            .map_err(transport_error)?;

        if response.is_success() {
            let decoded: AuthenticationResponse =
                response.json().map_err(|e| AuthError::Protocol {
                    status: response.status,
                    message: e.to_string(),
                })?;

            return decoded
                .data
                .filter(|jwt| !jwt.trim().is_empty())
                .ok_or(AuthError::Protocol {
                    status: response.status,
                    message: "response carries no session credential".to_string(),
                });
        }

        match response.json::<ErrorResult<serde_json::Value>>() {
            Ok(result) if result.has_detail() => Err(AuthError::Rejected {
                status: response.status,
                messages: result.message_list(),
                exception: result.exception,
            }),
            _ => Err(AuthError::Protocol {
                status: response.status,
                message: summarize_body(&response.text_lossy()),
            }),
        }
    }
}

fn transport_error(err: HttpError) -> AuthError {
    AuthError::NetworkTransient {
        message: err.to_string(),
    }
}

/// First line of a body, shortened for logs.
fn summarize_body(body: &str) -> String {
    const LIMIT: usize = 120;
    let line = body.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        return "empty response body".to_string();
    }
    match line.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}

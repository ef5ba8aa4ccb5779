use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::session::BoxError;

/// Authentication errors surfaced by the strategy and the session driver.
///
/// Token-introspection and refresh helpers never produce these — they degrade
/// to their negative result variants instead.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Twitch token endpoint rejected the authorization code.
    #[error("token exchange failed with status {status}: {detail}")]
    TokenExchange { status: u16, detail: String },

    /// Twitch users endpoint rejected the access token.
    #[error("profile fetch failed with status {status}: {detail}")]
    ProfileFetch { status: u16, detail: String },

    /// Users endpoint answered 2xx but the body carried no usable profile.
    #[error("invalid profile data in users response")]
    InvalidProfile,

    /// Transport-level failure talking to Twitch.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Session store operation failed.
    #[error("session store error: {0}")]
    Session(#[source] BoxError),

    /// The verification callback rejected the credentials.
    #[error("identity verification failed: {0}")]
    Verify(#[source] BoxError),

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status this failure maps to when surfaced to a client.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::TokenExchange { .. } | Self::ProfileFetch { .. } => StatusCode::UNAUTHORIZED,
            Self::InvalidProfile
            | Self::Http(_)
            | Self::Session(_)
            | Self::Verify(_)
            | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "auth internal error");
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_failures_map_to_unauthorized() {
        let err = Error::TokenExchange {
            status: 400,
            detail: "invalid code".into(),
        };
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = Error::ProfileFetch {
            status: 403,
            detail: String::new(),
        };
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn malformed_payload_maps_to_internal_error() {
        assert_eq!(
            Error::InvalidProfile.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

use serde::Deserialize;
use url::Url;

/// Client credentials and refresh token for a renewal attempt.
#[derive(Debug, Clone, Copy)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

/// Outcome of a `grant_type=refresh_token` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refresh {
    /// Twitch minted a fresh token pair; the old pair is superseded.
    Renewed {
        access_token: String,
        refresh_token: String,
        expires_in: u64,
    },
    Failed,
}

// Missing any of the three fields makes the response unusable, so all are
// required at deserialization.
#[derive(Debug, Deserialize)]
struct RenewedTokens {
    access_token: String,
    refresh_token: String,
    expires_in: u64,
}

/// Exchanges a refresh token for a new access/refresh token pair.
///
/// Infallible by contract: non-2xx answers, structurally incomplete bodies,
/// unparseable bodies, and transport failures all come back as
/// [`Refresh::Failed`].
pub async fn refresh_access_token(
    http: &reqwest::Client,
    token_url: &Url,
    request: RefreshRequest<'_>,
) -> Refresh {
    let params = [
        ("grant_type", "refresh_token"),
        ("refresh_token", request.refresh_token),
        ("client_id", request.client_id),
        ("client_secret", request.client_secret),
    ];

    let response = match http.post(token_url.clone()).form(&params).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "token refresh request failed");
            return Refresh::Failed;
        }
    };

    if !response.status().is_success() {
        tracing::warn!(status = %response.status(), "token refresh was rejected");
        return Refresh::Failed;
    }

    match response.json::<RenewedTokens>().await {
        Ok(body) => Refresh::Renewed {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_in: body.expires_in,
        },
        Err(e) => {
            tracing::warn!(error = %e, "token refresh response was malformed");
            Refresh::Failed
        }
    }
}

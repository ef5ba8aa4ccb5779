use serde::Deserialize;
use url::Url;

/// Outcome of introspecting an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// Token is live; `expires_in` is the remaining lifetime in seconds.
    Valid { expires_in: u64 },
    Invalid,
}

impl Validation {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    expires_in: u64,
}

/// Asks the introspection endpoint whether an access token is still usable.
///
/// Infallible by contract: non-2xx answers, bodies without `expires_in`,
/// unparseable bodies, and transport failures all come back as
/// [`Validation::Invalid`].
pub async fn validate_access_token(
    http: &reqwest::Client,
    validate_url: &Url,
    access_token: &str,
) -> Validation {
    let response = match http
        .get(validate_url.clone())
        .bearer_auth(access_token)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "token validation request failed");
            return Validation::Invalid;
        }
    };

    if !response.status().is_success() {
        return Validation::Invalid;
    }

    match response.json::<ValidateResponse>().await {
        Ok(body) => Validation::Valid {
            expires_in: body.expires_in,
        },
        Err(e) => {
            tracing::warn!(error = %e, "token validation response was malformed");
            Validation::Invalid
        }
    }
}

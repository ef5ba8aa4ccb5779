use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use axum::http::{Request, Uri};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::TwitchConfig;
use crate::error::Error;
use crate::session::BoxError;
use crate::state::{RandomState, StateGenerator};

/// Twitch user profile from the Helix users endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct TwitchProfile {
    pub id: String,
    pub login: String,
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    pub profile_image_url: String,
}

/// Extra token-endpoint fields alongside the tokens themselves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtraParams {
    pub expires_in: Option<u64>,
    pub token_type: Option<String>,
}

/// Everything a successful code exchange produced, handed to the
/// verification callback.
#[derive(Debug, Clone)]
pub struct VerifyParams {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub extra: ExtraParams,
    pub profile: TwitchProfile,
}

/// Caller-supplied verification: decides what subset of credentials and
/// profile becomes the persisted identity.
///
/// Implemented for any `Fn(VerifyParams) -> impl Future<Output = Result<User, BoxError>>`,
/// so a closure works:
///
/// ```rust,ignore
/// let strategy = TwitchStrategy::new(config, |params: VerifyParams| async move {
///     Ok(MyUser {
///         twitch_id: params.profile.id,
///         token: params.access_token,
///     })
/// });
/// ```
pub trait Verify<User>: Send + Sync + 'static {
    fn verify(&self, params: VerifyParams)
    -> impl Future<Output = Result<User, BoxError>> + Send;
}

impl<User, F, Fut> Verify<User> for F
where
    F: Fn(VerifyParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<User, BoxError>> + Send,
{
    fn verify(
        &self,
        params: VerifyParams,
    ) -> impl Future<Output = Result<User, BoxError>> + Send {
        self(params)
    }
}

/// Result of driving [`TwitchStrategy::authenticate`] one step.
///
/// Phase 1 of the code flow is a *redirect*, not an error: callers
/// pattern-match instead of catching a control-flow exception.
#[derive(Debug)]
pub enum Outcome<User> {
    /// Send the user agent to Twitch's authorize endpoint (HTTP 302).
    Redirect(Url),
    /// The code exchange and profile fetch succeeded; here is the verified
    /// identity.
    Authenticated(User),
}

/// Stateless OAuth2 authorization-code engine for Twitch.
///
/// Owns nothing persistent: each [`authenticate`](Self::authenticate) call is
/// driven to completion by the inbound request, with at most two outbound
/// calls (token exchange, profile fetch).
pub struct TwitchStrategy<User, V> {
    config: TwitchConfig,
    http: reqwest::Client,
    state: Arc<dyn StateGenerator>,
    verify: V,
    _user: PhantomData<fn() -> User>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    token_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsersEnvelope {
    #[serde(default)]
    data: Vec<TwitchProfile>,
}

impl<User, V: Verify<User>> TwitchStrategy<User, V> {
    /// Create a new strategy with the given configuration and verification
    /// callback.
    #[must_use]
    pub fn new(config: TwitchConfig, verify: V) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            state: Arc::new(RandomState),
            verify,
            _user: PhantomData,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Replace the `state`-parameter source (deterministic under test).
    #[must_use]
    pub fn with_state_generator(mut self, state: impl StateGenerator) -> Self {
        self.state = Arc::new(state);
        self
    }

    /// Drive the code flow one step for an inbound request.
    ///
    /// Without a `code` query parameter this returns [`Outcome::Redirect`]
    /// carrying the authorize URL. With one, it exchanges the code, fetches
    /// the profile, and runs the verification callback.
    ///
    /// # Errors
    ///
    /// [`Error::TokenExchange`] / [`Error::ProfileFetch`] when Twitch answers
    /// non-2xx, [`Error::InvalidProfile`] when the users response carries no
    /// profile, [`Error::Verify`] when the callback rejects.
    pub async fn authenticate<B>(&self, request: &Request<B>) -> Result<Outcome<User>, Error> {
        let Some(code) = query_param(request.uri(), "code") else {
            return Ok(Outcome::Redirect(self.authorization_url()));
        };

        let tokens = self.exchange_code(&code).await?;
        let profile = self.fetch_profile(&tokens.access_token).await?;

        let user = self
            .verify
            .verify(VerifyParams {
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
                extra: ExtraParams {
                    expires_in: tokens.expires_in,
                    token_type: tokens.token_type,
                },
                profile,
            })
            .await
            .map_err(Error::Verify)?;

        Ok(Outcome::Authenticated(user))
    }

    /// Build the authorize URL with a freshly generated `state` parameter.
    #[must_use]
    pub fn authorization_url(&self) -> Url {
        let mut url = self.config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.callback_url.as_str())
            .append_pair("scope", &self.config.scope_string())
            .append_pair("state", &self.state.generate());
        url
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, Error> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.callback_url.as_str()),
        ];

        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::TokenExchange { status, detail });
        }

        response.json::<TokenResponse>().await.map_err(Into::into)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<TwitchProfile, Error> {
        let response = self
            .http
            .get(self.config.userinfo_url.clone())
            .bearer_auth(access_token)
            .header("Client-Id", &self.config.client_id)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::ProfileFetch { status, detail });
        }

        let envelope = response
            .json::<UsersEnvelope>()
            .await
            .map_err(|_| Error::InvalidProfile)?;

        envelope
            .data
            .into_iter()
            .next()
            .ok_or(Error::InvalidProfile)
    }
}

fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

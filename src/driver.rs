use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::config::TwitchConfig;
use crate::error::Error;
use crate::refresh::{Refresh, RefreshRequest, refresh_access_token};
use crate::session::{BoxError, Session, SessionStorage};
use crate::strategy::{Outcome, TwitchProfile, TwitchStrategy, Verify, VerifyParams};
use crate::validate::{Validation, validate_access_token};

/// Session key the identity lives under. At most one identity per session;
/// a new login overwrites it, logout removes it.
const USER_KEY: &str = "user";

/// The identity the driver persists: the Twitch profile enriched with the
/// token pair, so later requests can validate and refresh without
/// re-authenticating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwitchAuthUser {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(flatten)]
    pub profile: TwitchProfile,
}

/// Per-call redirect targets for
/// [`TwitchAuthenticator::authenticate_with_redirect`]. Both default to `/`.
#[derive(Debug, Clone, Default)]
pub struct RedirectOptions {
    pub success_redirect: Option<String>,
    pub failure_redirect: Option<String>,
}

/// Verification used by the driver: keep the whole profile plus the tokens.
struct EnrichVerify;

impl Verify<TwitchAuthUser> for EnrichVerify {
    async fn verify(&self, params: VerifyParams) -> Result<TwitchAuthUser, BoxError> {
        Ok(TwitchAuthUser {
            access_token: params.access_token,
            refresh_token: params.refresh_token,
            profile: params.profile,
        })
    }
}

/// Binds [`TwitchStrategy`] to a session store and exposes request-level
/// operations: login (with redirect UX), logout, current-user lookup, and the
/// access-token lifecycle helpers.
///
/// Owns the session for the duration of one request only; the store gives
/// last-write-wins semantics and is never locked here.
pub struct TwitchAuthenticator<S> {
    config: TwitchConfig,
    strategy: TwitchStrategy<TwitchAuthUser, EnrichVerify>,
    http: reqwest::Client,
    sessions: S,
    redirect_after_logout: String,
}

impl<S: SessionStorage> TwitchAuthenticator<S> {
    /// Create a new authenticator over the given session backing.
    #[must_use]
    pub fn new(config: TwitchConfig, sessions: S) -> Self {
        let http = reqwest::Client::new();
        let strategy =
            TwitchStrategy::new(config.clone(), EnrichVerify).with_http_client(http.clone());
        Self {
            config,
            strategy,
            http,
            sessions,
            redirect_after_logout: "/".into(),
        }
    }

    /// Where [`logout`](Self::logout) sends the user agent (default `/`).
    #[must_use]
    pub fn with_redirect_after_logout(mut self, target: impl Into<String>) -> Self {
        self.redirect_after_logout = target.into();
        self
    }

    /// Use a custom HTTP client for all outbound Twitch calls.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.strategy = self.strategy.with_http_client(client.clone());
        self.http = client;
        self
    }

    /// Replace the strategy's `state`-parameter source.
    #[must_use]
    pub fn with_state_generator(mut self, state: impl crate::state::StateGenerator) -> Self {
        self.strategy = self.strategy.with_state_generator(state);
        self
    }

    /// Drive the OAuth flow one step without touching the session.
    ///
    /// # Errors
    ///
    /// Propagates the strategy's failures unchanged; see
    /// [`TwitchStrategy::authenticate`].
    pub async fn authenticate<B>(
        &self,
        request: &Request<B>,
    ) -> Result<Outcome<TwitchAuthUser>, Error> {
        self.strategy.authenticate(request).await
    }

    /// Drive the OAuth flow and convert every outcome into a redirect
    /// response.
    ///
    /// Phase 1 redirects the user agent to Twitch. A completed login stores
    /// the identity under `"user"`, commits the session, and redirects to
    /// `success_redirect` with the committed `Set-Cookie`. Any failure —
    /// exchange, profile fetch, or session commit — redirects to
    /// `failure_redirect` without a cookie.
    pub async fn authenticate_with_redirect<B>(
        &self,
        request: &Request<B>,
        options: RedirectOptions,
    ) -> Response {
        match self.strategy.authenticate(request).await {
            Ok(Outcome::Redirect(url)) => found(url.as_str(), None),
            Ok(Outcome::Authenticated(user)) => match self.store_user(request, &user).await {
                Ok(cookie) => {
                    tracing::info!(login = %user.profile.login, "twitch login successful");
                    found(
                        options.success_redirect.as_deref().unwrap_or("/"),
                        Some(&cookie),
                    )
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to persist authenticated session");
                    found(options.failure_redirect.as_deref().unwrap_or("/"), None)
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "twitch authentication failed");
                found(options.failure_redirect.as_deref().unwrap_or("/"), None)
            }
        }
    }

    /// Remove the stored identity (whether or not one was present), commit,
    /// and redirect to the configured logout target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the store fails to load or commit.
    pub async fn logout<B>(&self, request: &Request<B>) -> Result<Response, Error> {
        let mut session = self.load_session(request).await?;
        session.unset(USER_KEY);
        let cookie = self
            .sessions
            .commit(session)
            .await
            .map_err(Error::Session)?;
        Ok(found(&self.redirect_after_logout, Some(&cookie)))
    }

    /// The identity stored in the request's session, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the store fails to load.
    pub async fn auth_user<B>(&self, request: &Request<B>) -> Result<Option<TwitchAuthUser>, Error> {
        let session = self.load_session(request).await?;
        Ok(session
            .get(USER_KEY)
            .and_then(|value| serde_json::from_value(value.clone()).ok()))
    }

    /// Introspect the stored access token.
    ///
    /// Short-circuits to [`Validation::Invalid`] without a network call when
    /// no identity (or no access token) is stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the store fails to load.
    pub async fn is_access_token_valid<B>(
        &self,
        request: &Request<B>,
    ) -> Result<Validation, Error> {
        match self.auth_user(request).await? {
            Some(user) if !user.access_token.is_empty() => {
                Ok(
                    validate_access_token(&self.http, self.config.validate_url(), &user.access_token)
                        .await,
                )
            }
            _ => Ok(Validation::Invalid),
        }
    }

    /// Return a usable identity, renewing the access token when introspection
    /// says it has gone stale.
    ///
    /// `None` when no identity, access token, or refresh token is stored, and
    /// when renewal fails — in that last case the stale identity is left in
    /// the session untouched. A still-valid token returns the identity
    /// unchanged with no session write.
    ///
    /// The committed `Set-Cookie` value is not surfaced by this operation;
    /// a caller that needs the updated cookie must commit again through its
    /// own session layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the store fails to load or commit.
    pub async fn refresh_access_token_if_needed<B>(
        &self,
        request: &Request<B>,
    ) -> Result<Option<TwitchAuthUser>, Error> {
        let Some(user) = self.auth_user(request).await? else {
            return Ok(None);
        };
        if user.access_token.is_empty() {
            return Ok(None);
        }
        let Some(refresh_token) = user.refresh_token.clone() else {
            return Ok(None);
        };

        let validation =
            validate_access_token(&self.http, self.config.validate_url(), &user.access_token).await;
        if validation.is_valid() {
            return Ok(Some(user));
        }

        let renewed = refresh_access_token(
            &self.http,
            self.config.token_url(),
            RefreshRequest {
                refresh_token: &refresh_token,
                client_id: self.config.client_id(),
                client_secret: &self.config.client_secret,
            },
        )
        .await;

        let Refresh::Renewed {
            access_token,
            refresh_token,
            ..
        } = renewed
        else {
            tracing::warn!(
                login = %user.profile.login,
                "access token refresh failed; leaving stale session untouched"
            );
            return Ok(None);
        };

        let updated = TwitchAuthUser {
            access_token,
            refresh_token: Some(refresh_token),
            profile: user.profile,
        };

        self.store_user(request, &updated).await?;
        tracing::info!(login = %updated.profile.login, "access token refreshed");
        Ok(Some(updated))
    }

    async fn load_session<B>(&self, request: &Request<B>) -> Result<S::Session, Error> {
        let cookie = request
            .headers()
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok());
        self.sessions.load(cookie).await.map_err(Error::Session)
    }

    async fn store_user<B>(
        &self,
        request: &Request<B>,
        user: &TwitchAuthUser,
    ) -> Result<String, Error> {
        let mut session = self.load_session(request).await?;
        let value = serde_json::to_value(user).map_err(|e| Error::Session(Box::new(e)))?;
        session.set(USER_KEY, value);
        self.sessions.commit(session).await.map_err(Error::Session)
    }
}

/// 302 Found with an optional `Set-Cookie`.
fn found(location: &str, set_cookie: Option<&str>) -> Response {
    let mut builder = axum::http::Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, location);
    if let Some(cookie) = set_cookie {
        builder = builder.header(header::SET_COOKIE, cookie);
    }
    builder
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::{Value, json};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::session::{MemorySession, MemoryStore};

    fn mock_config(server: &MockServer) -> TwitchConfig {
        TwitchConfig::new(
            "mock-client-id",
            "mock-client-secret",
            "http://localhost:3000/auth/twitch/callback".parse().unwrap(),
        )
        .with_token_url(format!("{}/oauth2/token", server.uri()).parse().unwrap())
        .with_userinfo_url(format!("{}/helix/users", server.uri()).parse().unwrap())
        .with_validate_url(format!("{}/oauth2/validate", server.uri()).parse().unwrap())
    }

    fn request(uri: &str, cookie: Option<&str>) -> Request<()> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(()).unwrap()
    }

    fn sample_user() -> TwitchAuthUser {
        TwitchAuthUser {
            access_token: "old-access".into(),
            refresh_token: Some("old-refresh".into()),
            profile: TwitchProfile {
                id: "123".into(),
                login: "u".into(),
                display_name: "U".into(),
                email: "u@x.com".into(),
                profile_image_url: "http://x/a.png".into(),
            },
        }
    }

    async fn seed_user(store: &MemoryStore, user: &TwitchAuthUser) -> String {
        let mut session = store.load(None).await.unwrap();
        session.set(USER_KEY, serde_json::to_value(user).unwrap());
        store.commit(session).await.unwrap()
    }

    /// Session backing that counts `set` calls, for exactly-once assertions.
    #[derive(Clone, Default)]
    struct CountingStore {
        inner: MemoryStore,
        sets: Arc<AtomicUsize>,
    }

    struct CountingSession {
        inner: MemorySession,
        sets: Arc<AtomicUsize>,
    }

    impl Session for CountingSession {
        fn get(&self, key: &str) -> Option<&Value> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: Value) {
            self.sets.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value);
        }

        fn unset(&mut self, key: &str) {
            self.inner.unset(key);
        }
    }

    impl SessionStorage for CountingStore {
        type Session = CountingSession;

        async fn load(&self, cookie_header: Option<&str>) -> Result<Self::Session, BoxError> {
            Ok(CountingSession {
                inner: self.inner.load(cookie_header).await?,
                sets: self.sets.clone(),
            })
        }

        async fn commit(&self, session: Self::Session) -> Result<String, BoxError> {
            self.inner.commit(session.inner).await
        }
    }

    // ── authenticate_with_redirect ─────────────────────────────────

    #[tokio::test]
    async fn phase_one_redirects_to_twitch_with_302() {
        let server = MockServer::start().await;
        let auth = TwitchAuthenticator::new(mock_config(&server), MemoryStore::default());

        let response = auth
            .authenticate_with_redirect(
                &request("http://localhost:3000/auth/twitch", None),
                RedirectOptions::default(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://id.twitch.tv/oauth2/authorize?"));
        assert!(location.contains("client_id=mock-client-id"));
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn completed_login_stores_user_and_sets_cookie() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok",
                "refresh_token": "ref",
                "expires_in": 3600,
                "token_type": "bearer",
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/helix/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "id": "123",
                    "login": "u",
                    "display_name": "U",
                    "email": "u@x.com",
                    "profile_image_url": "http://x/a.png",
                }],
            })))
            .mount(&server)
            .await;

        let store = MemoryStore::default();
        let auth = TwitchAuthenticator::new(mock_config(&server), store.clone());

        let response = auth
            .authenticate_with_redirect(
                &request("http://localhost:3000/auth/twitch/callback?code=abc123", None),
                RedirectOptions {
                    success_redirect: Some("/dashboard".into()),
                    failure_redirect: Some("/login".into()),
                },
            )
            .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION].to_str().unwrap(),
            "/dashboard"
        );
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();

        let stored = store.peek(cookie, USER_KEY).unwrap();
        assert_eq!(stored["access_token"], "tok");
        assert_eq!(stored["refresh_token"], "ref");
        assert_eq!(stored["login"], "u");
    }

    #[tokio::test]
    async fn failed_exchange_redirects_to_failure_target_without_cookie() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let auth = TwitchAuthenticator::new(mock_config(&server), MemoryStore::default());

        let response = auth
            .authenticate_with_redirect(
                &request("http://localhost:3000/auth/twitch/callback?code=bad", None),
                RedirectOptions {
                    success_redirect: Some("/dashboard".into()),
                    failure_redirect: Some("/login".into()),
                },
            )
            .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION].to_str().unwrap(),
            "/login"
        );
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    // ── logout ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn logout_removes_user_and_redirects() {
        let server = MockServer::start().await;
        let store = MemoryStore::default();
        let cookie = seed_user(&store, &sample_user()).await;

        let auth = TwitchAuthenticator::new(mock_config(&server), store.clone())
            .with_redirect_after_logout("/bye");

        let response = auth
            .logout(&request("http://localhost:3000/logout", Some(&cookie)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION].to_str().unwrap(),
            "/bye"
        );
        assert!(response.headers().get(header::SET_COOKIE).is_some());
        assert_eq!(store.peek(&cookie, USER_KEY), None);
    }

    #[tokio::test]
    async fn logout_without_stored_user_still_redirects() {
        let server = MockServer::start().await;
        let auth = TwitchAuthenticator::new(mock_config(&server), MemoryStore::default());

        let response = auth
            .logout(&request("http://localhost:3000/logout", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION].to_str().unwrap(), "/");
    }

    // ── auth_user / is_access_token_valid ──────────────────────────

    #[tokio::test]
    async fn auth_user_roundtrips_the_stored_identity() {
        let server = MockServer::start().await;
        let store = MemoryStore::default();
        let cookie = seed_user(&store, &sample_user()).await;

        let auth = TwitchAuthenticator::new(mock_config(&server), store);

        let user = auth
            .auth_user(&request("http://localhost:3000/", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(user, Some(sample_user()));

        let anonymous = auth
            .auth_user(&request("http://localhost:3000/", None))
            .await
            .unwrap();
        assert_eq!(anonymous, None);
    }

    #[tokio::test]
    async fn token_validity_short_circuits_without_session_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/validate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"expires_in": 100})))
            .expect(0)
            .mount(&server)
            .await;

        let auth = TwitchAuthenticator::new(mock_config(&server), MemoryStore::default());

        let validation = auth
            .is_access_token_valid(&request("http://localhost:3000/", None))
            .await
            .unwrap();
        assert_eq!(validation, Validation::Invalid);
    }

    #[tokio::test]
    async fn token_validity_delegates_to_introspection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/validate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"expires_in": 100})))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryStore::default();
        let cookie = seed_user(&store, &sample_user()).await;
        let auth = TwitchAuthenticator::new(mock_config(&server), store);

        let validation = auth
            .is_access_token_valid(&request("http://localhost:3000/", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(validation, Validation::Valid { expires_in: 100 });
    }

    // ── refresh_access_token_if_needed ─────────────────────────────

    #[tokio::test]
    async fn valid_token_returns_identity_without_refresh_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/validate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"expires_in": 100})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let store = MemoryStore::default();
        let cookie = seed_user(&store, &sample_user()).await;
        let auth = TwitchAuthenticator::new(mock_config(&server), store.clone());

        let user = auth
            .refresh_access_token_if_needed(&request("http://localhost:3000/", Some(&cookie)))
            .await
            .unwrap();

        assert_eq!(user, Some(sample_user()));
        assert_eq!(
            store.peek(&cookie, USER_KEY).unwrap()["access_token"],
            "old-access"
        );
    }

    #[tokio::test]
    async fn stale_token_is_renewed_and_persisted_with_one_set() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/validate"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "refresh_token": "new-refresh",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = CountingStore::default();
        let cookie = seed_user(&store.inner, &sample_user()).await;
        let auth = TwitchAuthenticator::new(mock_config(&server), store.clone());

        let user = auth
            .refresh_access_token_if_needed(&request("http://localhost:3000/", Some(&cookie)))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(user.access_token, "new-access");
        assert_eq!(user.refresh_token.as_deref(), Some("new-refresh"));
        assert_eq!(user.profile, sample_user().profile);
        assert_eq!(store.sets.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.inner.peek(&cookie, USER_KEY).unwrap()["access_token"],
            "new-access"
        );
    }

    #[tokio::test]
    async fn failed_refresh_returns_none_and_leaves_session_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/validate"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let store = CountingStore::default();
        let cookie = seed_user(&store.inner, &sample_user()).await;
        let auth = TwitchAuthenticator::new(mock_config(&server), store.clone());

        let user = auth
            .refresh_access_token_if_needed(&request("http://localhost:3000/", Some(&cookie)))
            .await
            .unwrap();

        assert_eq!(user, None);
        assert_eq!(store.sets.load(Ordering::SeqCst), 0);
        assert_eq!(
            store.inner.peek(&cookie, USER_KEY).unwrap()["access_token"],
            "old-access"
        );
    }

    #[tokio::test]
    async fn missing_refresh_token_short_circuits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/validate"))
            .respond_with(ResponseTemplate::new(401))
            .expect(0)
            .mount(&server)
            .await;

        let store = MemoryStore::default();
        let mut user = sample_user();
        user.refresh_token = None;
        let cookie = seed_user(&store, &user).await;
        let auth = TwitchAuthenticator::new(mock_config(&server), store);

        let result = auth
            .refresh_access_token_if_needed(&request("http://localhost:3000/", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(result, None);
    }
}

use url::Url;

use crate::error::Error;

/// Scope requested when the caller does not configure one.
pub const DEFAULT_SCOPE: &str = "user:read:email";

/// Requested OAuth2 scope, either a preformatted string or a list of scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Single(String),
    List(Vec<String>),
}

impl From<&str> for Scope {
    fn from(s: &str) -> Self {
        Self::Single(s.to_owned())
    }
}

impl From<String> for Scope {
    fn from(s: String) -> Self {
        Self::Single(s)
    }
}

impl From<Vec<String>> for Scope {
    fn from(list: Vec<String>) -> Self {
        Self::List(list)
    }
}

impl From<&[&str]> for Scope {
    fn from(list: &[&str]) -> Self {
        Self::List(list.iter().map(|s| (*s).to_owned()).collect())
    }
}

/// Normalizes an optional scope into the string sent on the authorize URL.
///
/// `None` and an empty list both fall back to `default`; a list is
/// space-joined per RFC 6749 §3.3.
#[must_use]
pub fn normalize_scope(scope: Option<&Scope>, default: &str) -> String {
    match scope {
        None => default.to_owned(),
        Some(Scope::Single(s)) => s.clone(),
        Some(Scope::List(list)) if list.is_empty() => default.to_owned(),
        Some(Scope::List(list)) => list.join(" "),
    }
}

/// Twitch OAuth2 configuration.
///
/// Required fields are constructor parameters — no runtime "missing field"
/// errors. Endpoint URLs default to the production Twitch endpoints and can
/// be overridden (useful against a mock server).
///
/// ```rust,ignore
/// use twitch_auth::TwitchConfig;
///
/// let config = TwitchConfig::new(
///     "my-client-id",
///     "my-client-secret",
///     "https://my-app.com/auth/twitch/callback".parse()?,
/// )
/// .with_scope(["channel:read:subscriptions", "user:read:email"].as_slice());
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct TwitchConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) callback_url: Url,
    pub(crate) scope: Option<Scope>,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) userinfo_url: Url,
    pub(crate) validate_url: Url,
}

impl TwitchConfig {
    /// Create a new Twitch OAuth2 configuration.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        callback_url: Url,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            callback_url,
            scope: None,
            auth_url: "https://id.twitch.tv/oauth2/authorize"
                .parse()
                .expect("valid default URL"),
            token_url: "https://id.twitch.tv/oauth2/token"
                .parse()
                .expect("valid default URL"),
            userinfo_url: "https://api.twitch.tv/helix/users"
                .parse()
                .expect("valid default URL"),
            validate_url: "https://id.twitch.tv/oauth2/validate"
                .parse()
                .expect("valid default URL"),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Required env vars
    /// - `TWITCH_CLIENT_ID`: OAuth2 client ID
    /// - `TWITCH_CLIENT_SECRET`: OAuth2 client secret
    /// - `TWITCH_CALLBACK_URL`: OAuth2 callback URI (must be a valid URL)
    ///
    /// # Optional env vars
    /// - `TWITCH_AUTH_URL`: Override the authorize endpoint
    /// - `TWITCH_TOKEN_URL`: Override the token endpoint
    /// - `TWITCH_USERINFO_URL`: Override the users endpoint
    /// - `TWITCH_VALIDATE_URL`: Override the introspection endpoint
    /// - `TWITCH_SCOPES`: Comma-separated OAuth2 scopes
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or URLs are
    /// invalid.
    pub fn from_env() -> Result<Self, Error> {
        let client_id = std::env::var("TWITCH_CLIENT_ID")
            .map_err(|_| Error::Config("TWITCH_CLIENT_ID is required".into()))?;
        let client_secret = std::env::var("TWITCH_CLIENT_SECRET")
            .map_err(|_| Error::Config("TWITCH_CLIENT_SECRET is required".into()))?;
        let callback_url: Url = std::env::var("TWITCH_CALLBACK_URL")
            .map_err(|_| Error::Config("TWITCH_CALLBACK_URL is required".into()))?
            .parse()
            .map_err(|e| Error::Config(format!("TWITCH_CALLBACK_URL: {e}")))?;

        let mut config = Self::new(client_id, client_secret, callback_url);

        if let Ok(url_str) = std::env::var("TWITCH_AUTH_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("TWITCH_AUTH_URL: {e}")))?;
            config = config.with_auth_url(url);
        }
        if let Ok(url_str) = std::env::var("TWITCH_TOKEN_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("TWITCH_TOKEN_URL: {e}")))?;
            config = config.with_token_url(url);
        }
        if let Ok(url_str) = std::env::var("TWITCH_USERINFO_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("TWITCH_USERINFO_URL: {e}")))?;
            config = config.with_userinfo_url(url);
        }
        if let Ok(url_str) = std::env::var("TWITCH_VALIDATE_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("TWITCH_VALIDATE_URL: {e}")))?;
            config = config.with_validate_url(url);
        }
        if let Ok(scopes) = std::env::var("TWITCH_SCOPES") {
            config = config.with_scope(Scope::List(
                scopes.split(',').map(|s| s.trim().to_owned()).collect(),
            ));
        }

        Ok(config)
    }

    /// Set the requested scope (default: `user:read:email`).
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<Scope>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Override the authorize endpoint.
    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    /// Override the token endpoint.
    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    /// Override the users (profile) endpoint.
    #[must_use]
    pub fn with_userinfo_url(mut self, url: Url) -> Self {
        self.userinfo_url = url;
        self
    }

    /// Override the token introspection endpoint.
    #[must_use]
    pub fn with_validate_url(mut self, url: Url) -> Self {
        self.validate_url = url;
        self
    }

    /// OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// OAuth2 callback URI registered with Twitch.
    #[must_use]
    pub fn callback_url(&self) -> &Url {
        &self.callback_url
    }

    /// Authorization endpoint URL.
    #[must_use]
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    /// Token exchange endpoint URL.
    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Users (profile) endpoint URL.
    #[must_use]
    pub fn userinfo_url(&self) -> &Url {
        &self.userinfo_url
    }

    /// Token introspection endpoint URL.
    #[must_use]
    pub fn validate_url(&self) -> &Url {
        &self.validate_url
    }

    /// Scope string as it will appear on the authorize URL.
    #[must_use]
    pub fn scope_string(&self) -> String {
        normalize_scope(self.scope.as_ref(), DEFAULT_SCOPE)
    }
}

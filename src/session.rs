use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use serde_json::Value;

/// Error type session backings report; the driver wraps it in
/// [`Error::Session`](crate::Error::Session).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One request's session: an opaque key-value bag.
///
/// The driver only ever touches the single key `"user"`; the bag may carry
/// whatever else the application stores in it.
pub trait Session: Send {
    fn get(&self, key: &str) -> Option<&Value>;
    fn set(&mut self, key: &str, value: Value);
    fn unset(&mut self, key: &str);
}

/// Consumer-provided session persistence.
///
/// Sessions are addressed by the raw `Cookie` request header; committing a
/// session yields the `Set-Cookie` value that makes the mutation stick on the
/// client. The driver assumes nothing else about the backing (signed cookie,
/// Redis, database row) and performs no locking — last write wins.
///
/// # Example
///
/// ```rust,ignore
/// impl SessionStorage for MyRedisSessions {
///     type Session = MyRedisSession;
///
///     async fn load(&self, cookie_header: Option<&str>) -> Result<Self::Session, BoxError> {
///         let id = self.session_id_from_cookie(cookie_header);
///         self.fetch_or_create(id).await
///     }
///
///     async fn commit(&self, session: Self::Session) -> Result<String, BoxError> {
///         self.persist(&session).await?;
///         Ok(format!("sid={}; Path=/; HttpOnly", session.id()))
///     }
/// }
/// ```
pub trait SessionStorage: Send + Sync + 'static {
    type Session: Session;

    /// Load the session addressed by the request's `Cookie` header, creating
    /// a fresh one when the header carries no known session.
    fn load(
        &self,
        cookie_header: Option<&str>,
    ) -> impl Future<Output = Result<Self::Session, BoxError>> + Send;

    /// Persist the session. Returns the `Set-Cookie` header value.
    fn commit(
        &self,
        session: Self::Session,
    ) -> impl Future<Output = Result<String, BoxError>> + Send;
}

const MEMORY_COOKIE_NAME: &str = "__twitch_session";

/// In-memory [`SessionStorage`] for tests and local development.
///
/// Addresses sessions with a `__twitch_session=<id>` cookie. Not for
/// production: state is lost on restart and never expires.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, HashMap<String, Value>>>>,
}

/// Session handle produced by [`MemoryStore`].
pub struct MemorySession {
    id: String,
    values: HashMap<String, Value>,
}

impl Session for MemorySession {
    fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_owned(), value);
    }

    fn unset(&mut self, key: &str) {
        self.values.remove(key);
    }
}

impl MemoryStore {
    /// Read a value straight out of the store, bypassing the session handle.
    /// Intended for assertions in tests.
    #[must_use]
    pub fn peek(&self, cookie_header: &str, key: &str) -> Option<Value> {
        let id = session_id_from_cookie(Some(cookie_header))?;
        self.inner
            .lock()
            .ok()?
            .get(&id)
            .and_then(|values| values.get(key).cloned())
    }
}

impl SessionStorage for MemoryStore {
    type Session = MemorySession;

    async fn load(&self, cookie_header: Option<&str>) -> Result<Self::Session, BoxError> {
        let id = session_id_from_cookie(cookie_header).unwrap_or_else(new_session_id);
        let values = self
            .inner
            .lock()
            .map_err(|_| "session store lock poisoned")?
            .get(&id)
            .cloned()
            .unwrap_or_default();
        Ok(MemorySession { id, values })
    }

    async fn commit(&self, session: Self::Session) -> Result<String, BoxError> {
        self.inner
            .lock()
            .map_err(|_| "session store lock poisoned")?
            .insert(session.id.clone(), session.values);
        Ok(format!(
            "{MEMORY_COOKIE_NAME}={}; Path=/; HttpOnly; SameSite=Lax",
            session.id
        ))
    }
}

fn session_id_from_cookie(cookie_header: Option<&str>) -> Option<String> {
    cookie_header?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == MEMORY_COOKIE_NAME)
        .map(|(_, value)| value.to_owned())
}

fn new_session_id() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

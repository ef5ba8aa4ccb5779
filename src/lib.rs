#![doc = include_str!("../README.md")]

pub mod config;
pub mod driver;
pub mod error;
pub mod refresh;
pub mod session;
pub mod state;
pub mod strategy;
pub mod validate;

// Re-exports for convenient access
pub use config::{DEFAULT_SCOPE, Scope, TwitchConfig, normalize_scope};
pub use driver::{RedirectOptions, TwitchAuthUser, TwitchAuthenticator};
pub use error::Error;
pub use refresh::{Refresh, RefreshRequest, refresh_access_token};
pub use session::{BoxError, MemorySession, MemoryStore, Session, SessionStorage};
pub use state::{RandomState, StateGenerator};
pub use strategy::{
    ExtraParams, Outcome, TwitchProfile, TwitchStrategy, Verify, VerifyParams,
};
pub use validate::{Validation, validate_access_token};

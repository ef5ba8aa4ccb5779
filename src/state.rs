use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;

/// Source of the OAuth2 `state` parameter.
///
/// Injected into [`TwitchStrategy`](crate::TwitchStrategy) so tests can pin
/// the value; production code uses [`RandomState`].
///
/// Note: the generated value is currently only attached to the authorize URL,
/// not verified on the callback leg.
pub trait StateGenerator: Send + Sync + 'static {
    fn generate(&self) -> String;
}

/// Cryptographically random `state` values (16 random bytes → base64url,
/// 22 characters).
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomState;

impl StateGenerator for RandomState {
    fn generate(&self) -> String {
        let random_bytes: [u8; 16] = rand::rng().random();
        URL_SAFE_NO_PAD.encode(random_bytes)
    }
}

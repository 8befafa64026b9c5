//! Bearer tokens and the session that carries them.
//!
//! Acquiring a token (the login redirect dance) happens elsewhere; this module
//! only holds whatever token the host hands over and lets interested parties
//! react when it appears, changes or goes away.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use tokio::sync::watch;

/// An opaque bearer token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(Arc<str>);
impl Token {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::from(token.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}
impl Debug for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("Token(<redacted>)")
    }
}
impl From<&str> for Token {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}
impl From<String> for Token {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

/// The current authentication state, shared by everything that makes requests.
///
/// Cloning is cheap and every clone observes the same token. Absence of a token
/// means "don't even try": callers skip network work instead of sending
/// requests that are bound to come back 401.
#[derive(Clone, Debug)]
pub struct Session {
    token: Arc<watch::Sender<Option<Token>>>,
}
impl Session {
    pub fn new(token: impl Into<Option<Token>>) -> Self {
        let (token, _) = watch::channel(token.into());
        Self { token: Arc::new(token) }
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }

    pub fn token(&self) -> Option<Token> {
        self.token.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.borrow().is_some()
    }

    /// Hand over a (new) token. Subscribers are only woken if it differs.
    pub fn set_token(&self, token: impl Into<Token>) {
        let token = Some(token.into());
        self.token.send_if_modified(|current| {
            let changed = *current != token;
            if changed {
                *current = token;
            }
            changed
        });
    }

    /// Forget the token (logout / expiry).
    pub fn clear(&self) {
        self.token.send_if_modified(|current| current.take().is_some());
    }

    /// Watch for token changes. The current value counts as already seen.
    pub fn subscribe(&self) -> watch::Receiver<Option<Token>> {
        self.token.subscribe()
    }
}
impl Default for Session {
    fn default() -> Self {
        Self::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_debug_is_redacted() {
        let token = Token::new("eyJhbGciOi.secret");
        assert_eq!(format!("{token:?}"), "Token(<redacted>)");
        assert_eq!(token.bearer(), "Bearer eyJhbGciOi.secret");
    }

    #[tokio::test]
    async fn test_subscribers_see_new_tokens_only() {
        let session = Session::anonymous();
        let mut rx = session.subscribe();
        assert!(!rx.has_changed().unwrap());

        session.set_token("abc");
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().map(Token::as_str), Some("abc"));

        // Same token again is not a change.
        session.set_token("abc");
        assert!(!rx.has_changed().unwrap());

        session.clear();
        assert!(rx.has_changed().unwrap());
        assert!(!session.is_authenticated());
    }
}

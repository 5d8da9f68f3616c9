//! Login for the preview server.
//!
//! The server only needs to know whether a valid session exists: the index
//! page and the post-login rescan are gated on it. Credential checking sits
//! behind [`Authenticator`] so the HTTP layer can tell "wrong password"
//! (user-visible) apart from "could not check" (server-side).

use arc_swap::ArcSwapOption;
use std::sync::Arc;
use thiserror::Error;

use crate::config::AuthConfig;

/// Form fields posted to `/auth`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Opaque authentication state. Consumers only read `valid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: String,
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,

    /// The check itself could not run.
    #[error("authentication unavailable: {0}")]
    Unavailable(String),
}

pub trait Authenticator: Send + Sync {
    fn authenticate(&self, creds: &Credentials) -> Result<Session, AuthError>;
}

/// Checks against the `[auth]` section of `markview.toml`.
///
/// Secrets are kept as blake3 digests and compared in constant time.
pub struct ConfigAuthenticator {
    username: String,
    password: blake3::Hash,
}

impl ConfigAuthenticator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            username: config.username.clone(),
            password: blake3::hash(config.password.as_bytes()),
        }
    }
}

impl Authenticator for ConfigAuthenticator {
    fn authenticate(&self, creds: &Credentials) -> Result<Session, AuthError> {
        let user_ok = blake3::hash(creds.username.as_bytes())
            == blake3::hash(self.username.as_bytes());
        // blake3::Hash equality is constant time.
        let pass_ok = blake3::hash(creds.password.as_bytes()) == self.password;

        if user_ok && pass_ok {
            Ok(Session {
                user: creds.username.clone(),
                valid: true,
            })
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

/// Accepts everyone. Used when `[auth]` is absent.
pub struct OpenAccess;

impl Authenticator for OpenAccess {
    fn authenticate(&self, creds: &Credentials) -> Result<Session, AuthError> {
        Ok(Session {
            user: creds.username.clone(),
            valid: true,
        })
    }
}

/// Build the authenticator for a config's `[auth]` section.
pub fn from_config(auth: Option<&AuthConfig>) -> Arc<dyn Authenticator> {
    match auth {
        Some(config) => Arc::new(ConfigAuthenticator::new(config)),
        None => Arc::new(OpenAccess),
    }
}

/// The server-wide session. Single user, last successful login wins.
#[derive(Default)]
pub struct SessionStore {
    current: ArcSwapOption<Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open mode: start with a valid anonymous session.
    pub fn open() -> Self {
        let store = Self::new();
        store.store(Session {
            user: String::new(),
            valid: true,
        });
        store
    }

    /// Authenticate and, on success, replace the current session.
    ///
    /// A failed attempt leaves any existing session untouched.
    pub fn login(
        &self,
        authenticator: &dyn Authenticator,
        creds: &Credentials,
    ) -> Result<Arc<Session>, AuthError> {
        let session = authenticator.authenticate(creds)?;
        if !session.valid {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(self.store(session))
    }

    fn store(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        self.current.store(Some(Arc::clone(&session)));
        session
    }

    pub fn current(&self) -> Option<Arc<Session>> {
        self.current.load_full()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().is_some_and(|s| s.valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(user: &str, pass: &str) -> Credentials {
        Credentials {
            username: user.into(),
            password: pass.into(),
        }
    }

    fn alice() -> ConfigAuthenticator {
        ConfigAuthenticator::new(&AuthConfig {
            username: "alice".into(),
            password: "s3cret".into(),
        })
    }

    struct Broken;

    impl Authenticator for Broken {
        fn authenticate(&self, _: &Credentials) -> Result<Session, AuthError> {
            Err(AuthError::Unavailable("backend down".into()))
        }
    }

    #[test]
    fn test_config_authenticator() {
        let auth = alice();
        assert!(auth.authenticate(&creds("alice", "s3cret")).unwrap().valid);
        assert_eq!(
            auth.authenticate(&creds("alice", "wrong")),
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(
            auth.authenticate(&creds("bob", "s3cret")),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn test_failed_login_keeps_store_empty() {
        let store = SessionStore::new();
        assert!(!store.is_authenticated());
        assert!(store.login(&alice(), &creds("alice", "nope")).is_err());
        assert!(!store.is_authenticated());
        assert!(store.current().is_none());
    }

    #[test]
    fn test_successful_login() {
        let store = SessionStore::new();
        let session = store.login(&alice(), &creds("alice", "s3cret")).unwrap();
        assert_eq!(session.user, "alice");
        assert!(store.is_authenticated());
    }

    #[test]
    fn test_failed_login_keeps_existing_session() {
        let store = SessionStore::new();
        store.login(&alice(), &creds("alice", "s3cret")).unwrap();
        store.login(&alice(), &creds("alice", "bad")).unwrap_err();
        assert_eq!(store.current().unwrap().user, "alice");
    }

    #[test]
    fn test_unavailable_is_distinct() {
        let store = SessionStore::new();
        let err = store.login(&Broken, &creds("a", "b")).unwrap_err();
        assert!(matches!(err, AuthError::Unavailable(_)));
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_open_mode() {
        assert!(SessionStore::open().is_authenticated());
        assert!(from_config(None).authenticate(&creds("", "")).is_ok());
    }
}

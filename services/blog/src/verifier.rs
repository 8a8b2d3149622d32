//! Auth verifier: resolves basic and bearer credentials to a principal

use tracing::{debug, warn};

use crate::{
    credentials::CredentialStore,
    error::AuthError,
    models::{Token, User},
    password,
    tokens::TokenManager,
};

/// Whether bearer authentication is enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Enforced,
    /// Development only: every bearer request runs as `dev_user_id`.
    Disabled { dev_user_id: i64 },
}

/// The authenticated caller of a request
#[derive(Debug, Clone)]
pub struct Principal {
    pub user: User,
    /// The token the request presented; `None` when auth is disabled.
    pub token: Option<Token>,
}

#[derive(Clone)]
pub struct AuthVerifier {
    credentials: CredentialStore,
    tokens: TokenManager,
    mode: AuthMode,
}

impl AuthVerifier {
    pub fn new(credentials: CredentialStore, tokens: TokenManager, mode: AuthMode) -> Self {
        if let AuthMode::Disabled { dev_user_id } = mode {
            warn!(
                "AUTHENTICATION IS DISABLED: every bearer request runs as user {}",
                dev_user_id
            );
        }
        Self {
            credentials,
            tokens,
            mode,
        }
    }

    /// Verify a username-or-email and password pair.
    ///
    /// Unknown identifiers and wrong passwords fail the same way.
    pub async fn basic(&self, identifier: &str, password: &str) -> Result<User, AuthError> {
        let user = self.credentials.find_by_username_or_email(identifier).await?;

        let verified = match user {
            Some(user) if self.credentials.check_password(&user, password) => Some(user),
            Some(_) => None,
            None => {
                password::verify_password(password, password::DUMMY_PASSWORD_HASH);
                None
            }
        };

        verified.ok_or_else(|| {
            debug!("Basic authentication failed");
            AuthError::Unauthenticated
        })
    }

    /// Verify a bearer access envelope, if one was presented.
    pub async fn bearer(&self, access_envelope: Option<&str>) -> Result<Principal, AuthError> {
        if let AuthMode::Disabled { dev_user_id } = self.mode {
            let mut user = self
                .credentials
                .find_by_id(dev_user_id)
                .await?
                .ok_or(AuthError::Unauthenticated)?;
            self.credentials.touch_last_seen(&mut user).await?;
            return Ok(Principal { user, token: None });
        }

        let envelope = access_envelope.ok_or(AuthError::Unauthenticated)?;
        let (user, token) = self.tokens.verify_access(envelope).await?;
        Ok(Principal {
            user,
            token: Some(token),
        })
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::error::{AuthError, AuthResult};
use crate::types::AuthRequest;

/// Identity as reported by the external provider for the current request.
///
/// Roles and permissions come from the provider's token claims. The provider
/// is authoritative for identity, not for local session presence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityUser {
    /// Provider subject, matched against `User::external_id`.
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl IdentityUser {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            email: None,
            name: None,
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = permissions;
        self
    }
}

/// Opaque access token handed back by the provider. Never logged and never
/// stored in session metadata.
#[derive(Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_in: u64,
}

// Debug intentionally omits the token value.
impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Adapter over the external identity provider's SDK.
///
/// Implementations read provider credentials from the request (cookies or
/// headers) and verify them against the provider. Token issuance and
/// verification internals stay behind this trait.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the identity attached to this request, if any.
    async fn get_user(&self, req: &AuthRequest) -> AuthResult<Option<IdentityUser>>;

    /// Whether the request carries a currently valid provider session.
    async fn is_authenticated(&self, req: &AuthRequest) -> AuthResult<bool>;

    /// Fetch the provider access token for the request.
    async fn get_access_token(&self, req: &AuthRequest) -> AuthResult<AccessToken>;
}

/// Canned identity provider for tests and local development.
///
/// Holds a fixed identity and flags controlling failure modes, so guard
/// behavior can be exercised without a network dependency.
pub struct StaticIdentityProvider {
    state: Mutex<StaticProviderState>,
}

struct StaticProviderState {
    user: Option<IdentityUser>,
    fail_with: Option<fn() -> AuthError>,
}

impl StaticIdentityProvider {
    /// Provider reporting no authenticated identity.
    pub fn anonymous() -> Self {
        Self {
            state: Mutex::new(StaticProviderState {
                user: None,
                fail_with: None,
            }),
        }
    }

    /// Provider reporting `user` as authenticated.
    pub fn authenticated(user: IdentityUser) -> Self {
        Self {
            state: Mutex::new(StaticProviderState {
                user: Some(user),
                fail_with: None,
            }),
        }
    }

    /// Provider whose calls all fail, for exercising the fail-closed path.
    pub fn failing(factory: fn() -> AuthError) -> Self {
        Self {
            state: Mutex::new(StaticProviderState {
                user: None,
                fail_with: Some(factory),
            }),
        }
    }

    /// Swap the reported identity, e.g. to simulate external revocation.
    pub fn set_user(&self, user: Option<IdentityUser>) {
        self.state.lock().expect("provider state poisoned").user = user;
    }

    fn check_failure(&self) -> AuthResult<Option<IdentityUser>> {
        let state = self.state.lock().expect("provider state poisoned");
        if let Some(factory) = state.fail_with {
            return Err(factory());
        }
        Ok(state.user.clone())
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn get_user(&self, _req: &AuthRequest) -> AuthResult<Option<IdentityUser>> {
        self.check_failure()
    }

    async fn is_authenticated(&self, _req: &AuthRequest) -> AuthResult<bool> {
        Ok(self.check_failure()?.is_some())
    }

    async fn get_access_token(&self, _req: &AuthRequest) -> AuthResult<AccessToken> {
        match self.check_failure()? {
            Some(_) => Ok(AccessToken {
                access_token: "static-access-token".to_string(),
                expires_in: 3600,
            }),
            None => Err(AuthError::Unauthenticated),
        }
    }
}

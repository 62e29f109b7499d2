use chrono::Duration;

use crate::error::AuthError;
use crate::retry::RetryPolicy;

/// Top-level configuration for the auth subsystem.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for signing session cookie values. At least 32 characters.
    pub secret: String,

    /// Session lifecycle policy.
    pub session: SessionConfig,

    /// Route protection policy.
    pub guard: GuardConfig,

    /// Client retry policy for recoverable errors.
    pub retry: RetryPolicy,
}

/// Session-specific configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// TTL applied when a session is created without an explicit one.
    pub default_ttl: Duration,

    /// Lower bound for caller-supplied TTLs.
    pub min_ttl: Duration,

    /// Upper bound for caller-supplied TTLs.
    pub max_ttl: Duration,

    /// Cookie carrying the signed session id.
    pub cookie_name: String,
}

/// Route guard configuration.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Path prefixes reachable without authentication. Matched on full path
    /// segments, so `/api/auth` covers `/api/auth/login` but not `/api/auth2`.
    pub public_paths: Vec<String>,

    /// Login entry point unauthenticated page requests are redirected to.
    pub login_path: String,

    /// Query parameter carrying the percent-encoded original path and query.
    pub return_to_param: String,

    /// Require a valid local session in addition to the identity provider
    /// reporting authenticated. The local session is authoritative once
    /// established.
    pub require_local_session: bool,

    /// Upper bound on identity provider calls made during guard evaluation.
    pub provider_timeout: std::time::Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::hours(24),
            min_ttl: Duration::seconds(1),
            max_ttl: Duration::days(30),
            cookie_name: "dashboard.session".to_string(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            public_paths: vec!["/api/auth".to_string(), "/health".to_string()],
            login_path: "/api/auth/login".to_string(),
            return_to_param: "returnTo".to_string(),
            require_local_session: true,
            provider_timeout: std::time::Duration::from_secs(5),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            session: SessionConfig::default(),
            guard: GuardConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl AuthConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Default::default()
        }
    }

    pub fn session_default_ttl(mut self, ttl: Duration) -> Self {
        self.session.default_ttl = ttl;
        self
    }

    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.session.cookie_name = name.into();
        self
    }

    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.guard.login_path = path.into();
        self
    }

    pub fn public_paths(mut self, paths: Vec<String>) -> Self {
        self.guard.public_paths = paths;
        self
    }

    pub fn require_local_session(mut self, require: bool) -> Self {
        self.guard.require_local_session = require;
        self
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        if self.secret.is_empty() {
            return Err(AuthError::config("Secret key cannot be empty"));
        }

        if self.secret.len() < 32 {
            return Err(AuthError::config(
                "Secret key must be at least 32 characters",
            ));
        }

        if self.session.min_ttl > self.session.max_ttl {
            return Err(AuthError::config("Session min TTL exceeds max TTL"));
        }

        if self.session.default_ttl < self.session.min_ttl
            || self.session.default_ttl > self.session.max_ttl
        {
            return Err(AuthError::config("Session default TTL out of bounds"));
        }

        if !self.guard.login_path.starts_with('/') {
            return Err(AuthError::config("Login path must be absolute"));
        }

        Ok(())
    }
}

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::error::AuthResult;
use crate::identity::{IdentityProvider, IdentityUser};
use crate::middleware::Middleware;
use crate::session::SessionManager;
use crate::types::{AuthRequest, AuthResponse};

/// Declared requirements for a protected route.
///
/// Role and permission checks are deliberately asymmetric: `required_roles`
/// is satisfied by ANY matching role (OR), while `required_permissions`
/// demands ALL listed permissions (AND). Both encode differing product
/// semantics and must not be unified.
#[derive(Debug, Clone, Default)]
pub struct RouteRequirements {
    pub required_roles: Vec<String>,
    pub required_permissions: Vec<String>,
}

impl RouteRequirements {
    /// Authentication only, no role or permission gating.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.required_roles = roles;
        self
    }

    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.required_permissions = permissions;
        self
    }

    /// OR over roles, AND over permissions.
    pub fn is_satisfied_by(&self, user: &IdentityUser) -> bool {
        let roles_ok = self.required_roles.is_empty()
            || self
                .required_roles
                .iter()
                .any(|role| user.roles.contains(role));

        let permissions_ok = self
            .required_permissions
            .iter()
            .all(|perm| user.permissions.contains(perm));

        roles_ok && permissions_ok
    }
}

/// Per-request access decision, computed fresh each time and never persisted.
#[derive(Debug, Clone)]
pub enum GuardOutcome {
    /// Path is on the public allowlist; no check performed.
    Public,
    /// No valid identity or local session.
    Unauthenticated,
    /// Valid session but the route's role/permission requirements failed.
    Unauthorized,
    /// Valid session, all checks passed.
    Authorized {
        user: IdentityUser,
        session_id: Option<String>,
    },
}

/// Route protection engine shared by the page and API entry points.
///
/// The identity provider is checked first; when `require_local_session` is
/// set, a valid local session must also exist — the local session is
/// authoritative once established, so an externally valid token cannot
/// resurrect a terminated session. Provider failures fail closed to
/// `Unauthenticated`.
pub struct RouteGuard {
    config: Arc<AuthConfig>,
    sessions: Arc<SessionManager>,
    identity: Arc<dyn IdentityProvider>,
}

impl RouteGuard {
    pub fn new(
        config: Arc<AuthConfig>,
        sessions: Arc<SessionManager>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            config,
            sessions,
            identity,
        }
    }

    /// Public paths match on whole segments: `/api/auth` covers
    /// `/api/auth/login` but not `/api/auth2`. The login path itself is
    /// always public.
    pub fn is_public_path(&self, path: &str) -> bool {
        if path == self.config.guard.login_path {
            return true;
        }
        self.config.guard.public_paths.iter().any(|prefix| {
            path == prefix
                || (path.starts_with(prefix.as_str())
                    && path.as_bytes().get(prefix.len()) == Some(&b'/'))
        })
    }

    /// Evaluate the request against the route's requirements.
    pub async fn evaluate(
        &self,
        req: &AuthRequest,
        requirements: &RouteRequirements,
    ) -> GuardOutcome {
        if self.is_public_path(req.path()) {
            return GuardOutcome::Public;
        }

        let timeout = self.config.guard.provider_timeout;

        let authenticated =
            match tokio::time::timeout(timeout, self.identity.is_authenticated(req)).await {
                Ok(Ok(value)) => value,
                Ok(Err(error)) => {
                    tracing::error!(%error, "identity provider check failed; failing closed");
                    return GuardOutcome::Unauthenticated;
                }
                Err(_) => {
                    tracing::error!("identity provider check timed out; failing closed");
                    return GuardOutcome::Unauthenticated;
                }
            };
        if !authenticated {
            return GuardOutcome::Unauthenticated;
        }

        let user = match tokio::time::timeout(timeout, self.identity.get_user(req)).await {
            Ok(Ok(Some(user))) => user,
            Ok(Ok(None)) => return GuardOutcome::Unauthenticated,
            Ok(Err(error)) => {
                tracing::error!(%error, "identity provider user fetch failed; failing closed");
                return GuardOutcome::Unauthenticated;
            }
            Err(_) => {
                tracing::error!("identity provider user fetch timed out; failing closed");
                return GuardOutcome::Unauthenticated;
            }
        };

        // Local session cross-check: the provider reporting authenticated is
        // not enough once a local session has been established.
        let mut session_id = None;
        if self.config.guard.require_local_session {
            let Some(id) = self.sessions.extract_session_id(req) else {
                return GuardOutcome::Unauthenticated;
            };
            match self.sessions.validate_session(&id).await {
                Ok(true) => session_id = Some(id),
                Ok(false) => return GuardOutcome::Unauthenticated,
                Err(error) => {
                    tracing::error!(%error, "session validation failed; failing closed");
                    return GuardOutcome::Unauthenticated;
                }
            }
        }

        if !requirements.is_satisfied_by(&user) {
            return GuardOutcome::Unauthorized;
        }

        // Best-effort activity bump; a storage error must not block access.
        if let Some(id) = &session_id {
            if let Err(error) = self.sessions.update_activity(id).await {
                tracing::warn!(%error, session_id = %id, "failed to update session activity");
            }
        }

        GuardOutcome::Authorized { user, session_id }
    }

    /// Login URL carrying the original path and query, percent-encoded under
    /// the configured return parameter. The caller consumes the parameter
    /// after login; the guard only encodes the intent.
    pub fn login_redirect_target(&self, req: &AuthRequest) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        serializer.append_pair(&self.config.guard.return_to_param, &req.path_and_query());
        format!("{}?{}", self.config.guard.login_path, serializer.finish())
    }
}

/// Inline fallback for UI-level guards when the caller is authenticated but
/// lacks the required role or permission. Announced to assistive technology
/// via the alert live region; the guard does not navigate away.
pub fn render_permission_fallback() -> String {
    "<div role=\"alert\" aria-live=\"assertive\">You do not have permission to view this content.</div>"
        .to_string()
}

/// Guard for page routes: unauthenticated requests get a 307 redirect to the
/// login entry point with a `returnTo` parameter.
pub struct PageGuard {
    guard: Arc<RouteGuard>,
    requirements: RouteRequirements,
}

impl PageGuard {
    pub fn new(guard: Arc<RouteGuard>) -> Self {
        Self {
            guard,
            requirements: RouteRequirements::none(),
        }
    }

    pub fn with_requirements(mut self, requirements: RouteRequirements) -> Self {
        self.requirements = requirements;
        self
    }
}

#[async_trait]
impl Middleware for PageGuard {
    fn name(&self) -> &'static str {
        "page-guard"
    }

    async fn before_request(&self, req: &AuthRequest) -> AuthResult<Option<AuthResponse>> {
        match self.guard.evaluate(req, &self.requirements).await {
            GuardOutcome::Public | GuardOutcome::Authorized { .. } => Ok(None),
            GuardOutcome::Unauthenticated => Ok(Some(AuthResponse::redirect(
                self.guard.login_redirect_target(req),
            ))),
            GuardOutcome::Unauthorized => {
                let body = render_permission_fallback();
                Ok(Some(
                    AuthResponse::text(403, body).with_header("content-type", "text/html"),
                ))
            }
        }
    }
}

/// Guard for API routes: JSON errors, never a redirect.
pub struct ApiGuard {
    guard: Arc<RouteGuard>,
    requirements: RouteRequirements,
}

impl ApiGuard {
    pub fn new(guard: Arc<RouteGuard>) -> Self {
        Self {
            guard,
            requirements: RouteRequirements::none(),
        }
    }

    pub fn with_requirements(mut self, requirements: RouteRequirements) -> Self {
        self.requirements = requirements;
        self
    }
}

#[async_trait]
impl Middleware for ApiGuard {
    fn name(&self) -> &'static str {
        "api-guard"
    }

    async fn before_request(&self, req: &AuthRequest) -> AuthResult<Option<AuthResponse>> {
        match self.guard.evaluate(req, &self.requirements).await {
            GuardOutcome::Public | GuardOutcome::Authorized { .. } => Ok(None),
            GuardOutcome::Unauthenticated => Ok(Some(AuthResponse::json(
                401,
                &serde_json::json!({ "error": "Unauthorized", "code": "UNAUTHORIZED" }),
            )?)),
            GuardOutcome::Unauthorized => Ok(Some(AuthResponse::json(
                403,
                &serde_json::json!({ "error": "Forbidden", "code": "FORBIDDEN" }),
            )?)),
        }
    }
}

/// Dispatches to the API or page guard based on the request path, so one
/// middleware can front a mixed surface. Everything under `api_prefix` gets
/// JSON errors; everything else gets the redirect behavior.
pub struct SurfaceGuard {
    page: PageGuard,
    api: ApiGuard,
    api_prefix: String,
}

impl SurfaceGuard {
    pub fn new(guard: Arc<RouteGuard>) -> Self {
        Self {
            page: PageGuard::new(guard.clone()),
            api: ApiGuard::new(guard),
            api_prefix: "/api".to_string(),
        }
    }

    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    fn is_api_path(&self, path: &str) -> bool {
        path == self.api_prefix
            || (path.starts_with(self.api_prefix.as_str())
                && path.as_bytes().get(self.api_prefix.len()) == Some(&b'/'))
    }
}

#[async_trait]
impl Middleware for SurfaceGuard {
    fn name(&self) -> &'static str {
        "surface-guard"
    }

    async fn before_request(&self, req: &AuthRequest) -> AuthResult<Option<AuthResponse>> {
        if self.is_api_path(req.path()) {
            self.api.before_request(req).await
        } else {
            self.page.before_request(req).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(roles: &[&str], permissions: &[&str]) -> IdentityUser {
        IdentityUser::new("ext_1")
            .with_roles(roles.iter().map(|s| s.to_string()).collect())
            .with_permissions(permissions.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn roles_are_or_semantics() {
        let requirements = RouteRequirements::none()
            .with_roles(vec!["admin".to_string(), "user".to_string()]);

        assert!(requirements.is_satisfied_by(&user_with(&["user"], &[])));
        assert!(requirements.is_satisfied_by(&user_with(&["admin"], &[])));
        assert!(!requirements.is_satisfied_by(&user_with(&["viewer"], &[])));
    }

    #[test]
    fn permissions_are_and_semantics() {
        let requirements = RouteRequirements::none()
            .with_permissions(vec!["read".to_string(), "write".to_string()]);

        assert!(!requirements.is_satisfied_by(&user_with(&[], &["read"])));
        assert!(requirements.is_satisfied_by(&user_with(&[], &["read", "write"])));
    }

    #[test]
    fn empty_requirements_pass_any_user() {
        assert!(RouteRequirements::none().is_satisfied_by(&user_with(&[], &[])));
    }

    #[test]
    fn permission_fallback_is_an_alert_live_region() {
        let html = render_permission_fallback();
        assert!(html.contains("role=\"alert\""));
        assert!(html.contains("permission"));
    }
}

use std::sync::Arc;

use crate::adapters::DatabaseAdapter;
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::guard::{RouteGuard, SurfaceGuard};
use crate::identity::IdentityProvider;
use crate::middleware::{run_after, run_before, Middleware};
use crate::profile::ProfileService;
use crate::routes::UserRoutes;
use crate::session::SessionManager;
use crate::types::{AuthRequest, AuthResponse};

/// The assembled authentication surface.
///
/// All collaborators are injected through [`AuthBuilder`] rather than read
/// from ambient globals, so tests and multi-tenant hosts can stand up
/// isolated instances.
pub struct DashboardAuth {
    config: Arc<AuthConfig>,
    sessions: Arc<SessionManager>,
    guard: Arc<RouteGuard>,
    routes: UserRoutes,
    middlewares: Vec<Box<dyn Middleware>>,
}

impl std::fmt::Debug for DashboardAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardAuth")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DashboardAuth {
    pub fn builder(config: AuthConfig) -> AuthBuilder {
        AuthBuilder::new(config)
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn guard(&self) -> &Arc<RouteGuard> {
        &self.guard
    }

    /// Run only the middleware before-chain. Integrations use this to guard
    /// routes served by the host application rather than by this crate.
    pub async fn check_request(&self, req: &AuthRequest) -> AuthResult<Option<AuthResponse>> {
        run_before(&self.middlewares, req).await
    }

    /// Full request pipeline: middleware before-chain, route dispatch,
    /// middleware after-chain. Unknown paths produce a JSON 404.
    pub async fn handle_request(&self, req: &AuthRequest) -> AuthResult<AuthResponse> {
        if let Some(response) = run_before(&self.middlewares, req).await? {
            return Ok(response);
        }

        let response = match self.routes.handle_request(req).await? {
            Some(response) => response,
            None => AuthResponse::json(
                404,
                &serde_json::json!({ "error": "Not found", "code": "NOT_FOUND" }),
            )?,
        };

        run_after(&self.middlewares, req, response).await
    }
}

/// Builder wiring the database adapter, identity provider, and middleware
/// chain into a [`DashboardAuth`]. Configuration is validated at `build`.
pub struct AuthBuilder {
    config: AuthConfig,
    database: Option<Arc<dyn DatabaseAdapter>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    middlewares: Vec<Box<dyn Middleware>>,
    install_default_guard: bool,
}

impl AuthBuilder {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            database: None,
            identity: None,
            middlewares: Vec::new(),
            install_default_guard: true,
        }
    }

    pub fn database(mut self, database: Arc<dyn DatabaseAdapter>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Append a middleware; runs after the default guard, in insertion order.
    pub fn middleware(mut self, middleware: Box<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Skip installing the default [`SurfaceGuard`]. The caller then owns
    /// route protection entirely.
    pub fn without_default_guard(mut self) -> Self {
        self.install_default_guard = false;
        self
    }

    pub fn build(self) -> AuthResult<DashboardAuth> {
        self.config.validate()?;

        let database = self
            .database
            .ok_or_else(|| AuthError::config("A database adapter is required"))?;
        let identity = self
            .identity
            .ok_or_else(|| AuthError::config("An identity provider is required"))?;

        let config = Arc::new(self.config);
        let sessions = Arc::new(SessionManager::new(config.clone(), database.clone()));
        let guard = Arc::new(RouteGuard::new(
            config.clone(),
            sessions.clone(),
            identity.clone(),
        ));
        let profiles = ProfileService::new(database.clone());
        let routes = UserRoutes::new(database, sessions.clone(), profiles);

        let mut middlewares: Vec<Box<dyn Middleware>> = Vec::new();
        if self.install_default_guard {
            middlewares.push(Box::new(SurfaceGuard::new(guard.clone())));
        }
        middlewares.extend(self.middlewares);

        Ok(DashboardAuth {
            config,
            sessions,
            guard,
            routes,
            middlewares,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryDatabaseAdapter;
    use crate::identity::StaticIdentityProvider;

    fn test_config() -> AuthConfig {
        AuthConfig::new("a-test-secret-that-is-long-enough!!")
    }

    #[tokio::test]
    async fn build_requires_database_and_identity() {
        let err = DashboardAuth::builder(test_config()).build().unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn build_rejects_invalid_config() {
        let err = DashboardAuth::builder(AuthConfig::new("short"))
            .database(Arc::new(MemoryDatabaseAdapter::new()))
            .identity(Arc::new(StaticIdentityProvider::anonymous()))
            .build()
            .unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }

    #[tokio::test]
    async fn unknown_api_path_is_not_found() {
        let auth = DashboardAuth::builder(test_config())
            .database(Arc::new(MemoryDatabaseAdapter::new()))
            .identity(Arc::new(StaticIdentityProvider::anonymous()))
            .without_default_guard()
            .build()
            .unwrap();

        let req = AuthRequest::new(crate::types::HttpMethod::Get, "/api/user/unknown");
        let response = auth.handle_request(&req).await.unwrap();
        assert_eq!(response.status, 404);
    }
}

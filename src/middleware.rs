use async_trait::async_trait;

use crate::error::AuthResult;
use crate::types::{AuthRequest, AuthResponse};

/// Request/response interception seam.
///
/// Guards implement this trait so integrations can run them ahead of route
/// dispatch. `before_request` may short-circuit with a response (redirect,
/// 401) without the request ever reaching a handler.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &'static str;

    /// Runs before dispatch. `Ok(Some(response))` short-circuits;
    /// `Ok(None)` lets the request continue.
    async fn before_request(&self, req: &AuthRequest) -> AuthResult<Option<AuthResponse>>;

    /// Runs after a response has been produced; may mutate it. The default
    /// is a pass-through.
    async fn after_request(
        &self,
        _req: &AuthRequest,
        response: AuthResponse,
    ) -> AuthResult<AuthResponse> {
        Ok(response)
    }
}

/// Run the before-request chain in order. Returns the first short-circuit
/// response, if any.
pub async fn run_before(
    middlewares: &[Box<dyn Middleware>],
    req: &AuthRequest,
) -> AuthResult<Option<AuthResponse>> {
    for mw in middlewares {
        if let Some(response) = mw.before_request(req).await? {
            tracing::debug!(middleware = mw.name(), "request short-circuited");
            return Ok(Some(response));
        }
    }
    Ok(None)
}

/// Run the after-request chain in reverse order.
pub async fn run_after(
    middlewares: &[Box<dyn Middleware>],
    req: &AuthRequest,
    mut response: AuthResponse,
) -> AuthResult<AuthResponse> {
    for mw in middlewares.iter().rev() {
        response = mw.after_request(req, response).await?;
    }
    Ok(response)
}

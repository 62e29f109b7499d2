use std::sync::Arc;

use crate::adapters::DatabaseAdapter;
use crate::error::{validate_request_body, AuthResult};
use crate::profile::ProfileService;
use crate::session::SessionManager;
use crate::types::{
    AuthRequest, AuthResponse, HttpMethod, Session, UpdateProfile, UpdateProfileRequest, User,
};

/// Framework-agnostic dispatch for the `/api/user/*` surface.
///
/// Handlers resolve the caller from the request's session credential and
/// enforce ownership; route-level authentication gating is the API guard's
/// job, but these checks hold on their own.
pub struct UserRoutes {
    database: Arc<dyn DatabaseAdapter>,
    sessions: Arc<SessionManager>,
    profiles: ProfileService,
}

impl UserRoutes {
    pub fn new(
        database: Arc<dyn DatabaseAdapter>,
        sessions: Arc<SessionManager>,
        profiles: ProfileService,
    ) -> Self {
        Self {
            database,
            sessions,
            profiles,
        }
    }

    /// Dispatch a request. Returns `Ok(None)` when the path is not ours.
    pub async fn handle_request(&self, req: &AuthRequest) -> AuthResult<Option<AuthResponse>> {
        match (req.method(), req.path()) {
            (HttpMethod::Get, "/api/user/profile") => {
                Ok(Some(self.handle_get_profile(req).await?))
            }
            (HttpMethod::Put, "/api/user/profile") => {
                Ok(Some(self.handle_put_profile(req).await?))
            }
            (HttpMethod::Get, "/api/user/preferences") => {
                Ok(Some(self.handle_get_preferences(req).await?))
            }
            (HttpMethod::Put, "/api/user/preferences") => {
                Ok(Some(self.handle_put_preferences(req).await?))
            }
            (HttpMethod::Get, "/api/user/sessions") => {
                Ok(Some(self.handle_list_sessions(req).await?))
            }
            (HttpMethod::Delete, path) => {
                if let Some(session_id) = path.strip_prefix("/api/user/sessions/") {
                    if !session_id.is_empty() && !session_id.contains('/') {
                        let session_id = session_id.to_string();
                        return Ok(Some(self.handle_delete_session(req, &session_id).await?));
                    }
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    async fn handle_get_profile(&self, req: &AuthRequest) -> AuthResult<AuthResponse> {
        let Some((user, _session)) = self.authenticate(req).await? else {
            return unauthorized_response();
        };

        match self.profiles.get_profile(&user.id).await {
            Ok(profile) => Ok(AuthResponse::json(200, &profile)?),
            Err(err) => Ok(err.into_response()),
        }
    }

    async fn handle_put_profile(&self, req: &AuthRequest) -> AuthResult<AuthResponse> {
        let Some((user, _session)) = self.authenticate(req).await? else {
            return unauthorized_response();
        };

        let body: UpdateProfileRequest = match validate_request_body(req) {
            Ok(body) => body,
            Err(response) => return Ok(response),
        };

        let update = UpdateProfile {
            display_name: body.display_name,
            theme: body.theme,
            locale: body.locale,
            dashboard_layout: body.dashboard_layout,
            expected_updated_at: body.expected_updated_at,
        };

        match self.profiles.update_profile(&user.id, update).await {
            Ok(profile) => Ok(AuthResponse::json(200, &profile)?),
            Err(err) => Ok(err.into_response()),
        }
    }

    async fn handle_get_preferences(&self, req: &AuthRequest) -> AuthResult<AuthResponse> {
        let Some((user, _session)) = self.authenticate(req).await? else {
            return unauthorized_response();
        };

        match self.profiles.get_preferences(&user.id).await {
            Ok(preferences) => Ok(AuthResponse::json(200, &preferences)?),
            Err(err) => Ok(err.into_response()),
        }
    }

    async fn handle_put_preferences(&self, req: &AuthRequest) -> AuthResult<AuthResponse> {
        let Some((user, _session)) = self.authenticate(req).await? else {
            return unauthorized_response();
        };

        let preferences: serde_json::Value = match req.body_as_json() {
            Ok(value) => value,
            Err(e) => {
                return Ok(AuthResponse::json(
                    400,
                    &serde_json::json!({
                        "error": format!("Invalid JSON: {}", e),
                        "code": "VALIDATION_ERROR",
                    }),
                )?);
            }
        };

        match self.profiles.update_preferences(&user.id, preferences).await {
            Ok(saved) => Ok(AuthResponse::json(200, &saved)?),
            Err(err) => Ok(err.into_response()),
        }
    }

    async fn handle_list_sessions(&self, req: &AuthRequest) -> AuthResult<AuthResponse> {
        let Some((user, _session)) = self.authenticate(req).await? else {
            return unauthorized_response();
        };

        let sessions = self.sessions.get_user_sessions(&user.id).await?;
        Ok(AuthResponse::json(200, &sessions)?)
    }

    async fn handle_delete_session(
        &self,
        req: &AuthRequest,
        session_id: &str,
    ) -> AuthResult<AuthResponse> {
        let Some((user, _session)) = self.authenticate(req).await? else {
            return unauthorized_response();
        };

        // Raw row fetch: terminating an already-expired session is allowed,
        // but terminating someone else's is not.
        let Some(target) = self.database.get_session(session_id).await? else {
            return Ok(AuthResponse::json(
                404,
                &serde_json::json!({ "error": "Session not found", "code": "NOT_FOUND" }),
            )?);
        };

        if target.user_id != user.id {
            return Ok(AuthResponse::json(
                403,
                &serde_json::json!({ "error": "Forbidden", "code": "FORBIDDEN" }),
            )?);
        }

        self.sessions.terminate_session(session_id).await?;
        Ok(AuthResponse::json(200, &serde_json::json!({ "success": true }))?)
    }

    /// Resolve the caller from the request's session credential. The local
    /// session is the authority here; no provider round-trip.
    async fn authenticate(&self, req: &AuthRequest) -> AuthResult<Option<(User, Session)>> {
        let Some(session_id) = self.sessions.extract_session_id(req) else {
            return Ok(None);
        };

        let Some(session) = self.sessions.get_session(&session_id).await? else {
            return Ok(None);
        };

        let Some(user) = self.database.get_user_by_id(&session.user_id).await? else {
            return Ok(None);
        };
        if !user.is_active {
            return Ok(None);
        }

        Ok(Some((user, session)))
    }
}

fn unauthorized_response() -> AuthResult<AuthResponse> {
    Ok(AuthResponse::json(
        401,
        &serde_json::json!({ "error": "Unauthorized", "code": "UNAUTHORIZED" }),
    )?)
}

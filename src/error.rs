use thiserror::Error;

/// Error taxonomy for the authentication subsystem.
///
/// Each variant maps to an HTTP status code via [`AuthError::status_code`] and
/// a stable machine-readable code via [`AuthError::code`]. Use
/// [`AuthError::into_response`] to produce the standardized JSON body
/// `{ "error": "...", "code": "..." }`.
#[derive(Error, Debug)]
pub enum AuthError {
    // --- 400 Bad Request ---
    #[error("Validation error: {0}")]
    Validation(String),

    // --- 401 Unauthorized ---
    #[error("Unauthorized")]
    Unauthenticated,

    #[error("Access token expired")]
    TokenExpired,

    #[error("Access token invalid")]
    TokenInvalid,

    #[error("Session not found or expired")]
    SessionInvalid,

    // --- 403 Forbidden ---
    #[error("{0}")]
    Forbidden(String),

    // --- 404 Not Found ---
    #[error("User not found")]
    UserNotFound,

    #[error("{0}")]
    NotFound(String),

    // --- 409 Conflict ---
    #[error("{0}")]
    Conflict(String),

    // --- 429 Too Many Requests ---
    #[error("Too many requests")]
    RateLimited,

    // --- 502 Bad Gateway ---
    #[error("Identity provider error: {0}")]
    Provider(String),

    // --- 504 Gateway Timeout ---
    #[error("Operation timed out")]
    Timeout,

    // --- 500 Internal Server Error ---
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Unauthenticated
            | Self::TokenExpired
            | Self::TokenInvalid
            | Self::SessionInvalid => 401,
            Self::Forbidden(_) => 403,
            Self::UserNotFound | Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::RateLimited => 429,
            Self::Provider(_) => 502,
            Self::Timeout => 504,
            Self::Database(_) | Self::Serialization(_) | Self::Config(_) | Self::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code for programmatic handling by clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthenticated => "UNAUTHORIZED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenInvalid => "TOKEN_INVALID",
            Self::SessionInvalid => "SESSION_INVALID",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::UserNotFound | Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::RateLimited => "RATE_LIMITED",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) | Self::Config(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a client may retry this operation with backoff.
    ///
    /// Covers transient conditions: timeouts, rate limiting, and database
    /// connection failures. Query failures and invalid sessions are not
    /// retryable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimited | Self::Database(DatabaseError::Connection(_))
        )
    }

    /// Whether this error indicates the caller must re-authenticate rather
    /// than retry.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated | Self::TokenExpired | Self::TokenInvalid | Self::SessionInvalid
        )
    }

    /// Convert this error into a standardized JSON [`AuthResponse`].
    ///
    /// Server-side errors (5xx) are surfaced with a generic message so that
    /// database or provider details never reach the client.
    pub fn into_response(self) -> crate::types::AuthResponse {
        let status = self.status_code();
        let code = self.code();
        let message = if status >= 500 {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        crate::types::AuthResponse::json(
            status,
            &serde_json::json!({ "error": message, "code": code }),
        )
        .unwrap_or_else(|_| crate::types::AuthResponse::text(status, &message))
    }

    // --- Constructors ---

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Database failure kinds, split so callers can distinguish connection
/// problems (retryable) from query problems (not retryable).
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

#[cfg(feature = "sqlx-postgres")]
impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() || db_err.is_foreign_key_violation() {
                    DatabaseError::Constraint(db_err.to_string())
                } else {
                    DatabaseError::Query(db_err.to_string())
                }
            }
            sqlx::Error::PoolClosed => DatabaseError::Connection("Pool closed".to_string()),
            sqlx::Error::PoolTimedOut => DatabaseError::Connection("Pool timed out".to_string()),
            sqlx::Error::Io(e) => DatabaseError::Connection(e.to_string()),
            _ => DatabaseError::Query(err.to_string()),
        }
    }
}

#[cfg(feature = "sqlx-postgres")]
impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::Database(DatabaseError::from(err))
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Convert `validator::ValidationErrors` into a standardized 400 response with
/// per-field messages: `{ "error": "...", "code": "VALIDATION_ERROR", "fields": {...} }`.
pub fn validation_error_response(errors: &validator::ValidationErrors) -> crate::types::AuthResponse {
    let field_errors: std::collections::HashMap<&str, Vec<String>> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages: Vec<String> = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value for {}", field))
                })
                .collect();
            (field, messages)
        })
        .collect();

    let body = serde_json::json!({
        "error": "Validation failed",
        "code": "VALIDATION_ERROR",
        "fields": field_errors,
    });

    crate::types::AuthResponse::json(400, &body)
        .unwrap_or_else(|_| crate::types::AuthResponse::text(400, "Validation failed"))
}

/// Parse and validate a JSON request body, returning the typed value or a
/// ready-made error response.
pub fn validate_request_body<T>(
    req: &crate::types::AuthRequest,
) -> Result<T, crate::types::AuthResponse>
where
    T: serde::de::DeserializeOwned + validator::Validate,
{
    let value: T = req.body_as_json().map_err(|e| {
        crate::types::AuthResponse::json(
            400,
            &serde_json::json!({
                "error": format!("Invalid JSON: {}", e),
                "code": "VALIDATION_ERROR",
            }),
        )
        .unwrap_or_else(|_| crate::types::AuthResponse::text(400, "Invalid JSON"))
    })?;

    value.validate().map_err(|e| validation_error_response(&e))?;

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(AuthError::Unauthenticated.status_code(), 401);
        assert_eq!(AuthError::forbidden("no").status_code(), 403);
        assert_eq!(AuthError::UserNotFound.status_code(), 404);
        assert_eq!(AuthError::conflict("stale").status_code(), 409);
        assert_eq!(AuthError::RateLimited.status_code(), 429);
        assert_eq!(AuthError::Timeout.status_code(), 504);
        assert_eq!(
            AuthError::Database(DatabaseError::Query("x".into())).status_code(),
            500
        );
    }

    #[test]
    fn recoverable_errors_are_transient_only() {
        assert!(AuthError::Timeout.is_recoverable());
        assert!(AuthError::RateLimited.is_recoverable());
        assert!(AuthError::Database(DatabaseError::Connection("down".into())).is_recoverable());
        assert!(!AuthError::Database(DatabaseError::Query("bad sql".into())).is_recoverable());
        assert!(!AuthError::SessionInvalid.is_recoverable());
    }

    #[test]
    fn session_and_token_errors_require_reauthentication() {
        assert!(AuthError::SessionInvalid.requires_reauthentication());
        assert!(AuthError::TokenExpired.requires_reauthentication());
        assert!(!AuthError::Timeout.requires_reauthentication());
    }

    #[test]
    fn internal_errors_use_generic_client_message() {
        let response = AuthError::internal("pool exploded").into_response();
        assert_eq!(response.status, 500);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["error"], "Internal server error");
        assert!(!body["error"].as_str().unwrap().contains("pool"));
    }

    #[test]
    fn client_errors_keep_message_and_stable_code() {
        let response = AuthError::conflict("profile was modified").into_response();
        assert_eq!(response.status, 409);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["code"], "CONFLICT");
        assert_eq!(body["error"], "profile was modified");
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

/// User record mirroring the identity provider's subject, persisted locally.
///
/// Rows are written by the authentication callback flow and the profile
/// service only; the session manager looks users up but never creates them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    #[serde(rename = "externalId")]
    pub external_id: String,
    pub email: String,
    pub name: Option<String>,
    #[serde(rename = "givenName")]
    pub given_name: Option<String>,
    #[serde(rename = "familyName")]
    pub family_name: Option<String>,
    pub picture: Option<String>,
    #[serde(rename = "isActive")]
    pub is_active: bool,
    /// Opaque user-defined preference bag; validated to be a JSON object at
    /// the write edge, not statically typed.
    pub preferences: serde_json::Value,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// One authenticated browser/device session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Correlation id from the identity provider, when it supplies one.
    #[serde(rename = "externalSessionId")]
    pub external_session_id: Option<String>,
    #[serde(rename = "userAgent")]
    pub user_agent: Option<String>,
    #[serde(rename = "ipAddress")]
    pub ip_address: Option<String>,
    pub status: SessionStatus,
    /// Device/location tags and similar advisory data. Never holds token or
    /// secret material.
    pub metadata: serde_json::Value,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "lastActivityAt")]
    pub last_activity_at: DateTime<Utc>,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether the row's expiry has passed. Expiry is derived from
    /// `expires_at`, not stored as a status.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Stored session state. Expired sessions keep `Active` until lazy expiry
/// flips them to `Terminated` during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Terminated,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for SessionStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "terminated" => Self::Terminated,
            _ => Self::Active,
        }
    }
}

/// Result of a diagnosable session lookup.
///
/// [`crate::SessionManager::get_session`] keeps the simpler conflated
/// `Option<Session>` contract on top of this; use
/// [`crate::SessionManager::lookup_session`] when the caller needs to tell
/// "never existed" apart from "existed but invalid".
#[derive(Debug, Clone)]
pub enum SessionLookup {
    Found(Session),
    FoundButInvalid(InvalidReason),
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    Expired,
    Terminated,
}

/// Per-user dashboard profile, one-to-one with [`User`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    pub theme: String,
    pub locale: String,
    #[serde(rename = "dashboardLayout")]
    pub dashboard_layout: serde_json::Value,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// User creation data, used by the authentication callback flow.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub id: Option<String>,
    pub external_id: String,
    pub email: String,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
    pub preferences: Option<serde_json::Value>,
}

impl CreateUser {
    pub fn new(external_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            external_id: external_id.into(),
            email: email.into(),
            name: None,
            given_name: None,
            family_name: None,
            picture: None,
            preferences: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_picture(mut self, picture: impl Into<String>) -> Self {
        self.picture = Some(picture.into());
        self
    }

    pub fn with_preferences(mut self, preferences: serde_json::Value) -> Self {
        self.preferences = Some(preferences);
        self
    }
}

/// Session creation data as handed to the database adapter. Built by the
/// session manager after sanitization and TTL policy have been applied.
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub user_id: String,
    pub external_session_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Caller-facing session creation request. Untrusted client metadata goes in
/// as-is; the session manager sanitizes it.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: String,
    pub external_session_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    /// Bounded to 1 second..=30 days; defaults to 24 hours when absent.
    pub ttl: Option<chrono::Duration>,
}

impl NewSession {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            external_session_id: None,
            user_agent: None,
            ip_address: None,
            ttl: None,
        }
    }

    pub fn with_external_session_id(mut self, id: impl Into<String>) -> Self {
        self.external_session_id = Some(id.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Profile creation data, used by the callback flow when provisioning a user.
#[derive(Debug, Clone)]
pub struct CreateProfile {
    pub user_id: String,
    pub display_name: Option<String>,
    pub theme: Option<String>,
    pub locale: Option<String>,
    pub dashboard_layout: Option<serde_json::Value>,
}

impl CreateProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            theme: None,
            locale: None,
            dashboard_layout: None,
        }
    }
}

/// Profile update data. `expected_updated_at` enables optimistic concurrency:
/// when present and stale, the update is rejected with a conflict.
#[derive(Debug, Clone, Default)]
pub struct UpdateProfile {
    pub display_name: Option<String>,
    pub theme: Option<String>,
    pub locale: Option<String>,
    pub dashboard_layout: Option<serde_json::Value>,
    pub expected_updated_at: Option<DateTime<Utc>>,
}

/// Inbound profile update body for `PUT /api/user/profile`.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[serde(rename = "displayName")]
    #[validate(length(max = 120, message = "Display name is too long"))]
    pub display_name: Option<String>,
    #[validate(length(min = 1, max = 32, message = "Invalid theme"))]
    pub theme: Option<String>,
    #[validate(length(min = 2, max = 16, message = "Invalid locale"))]
    pub locale: Option<String>,
    #[serde(rename = "dashboardLayout")]
    pub dashboard_layout: Option<serde_json::Value>,
    #[serde(rename = "expectedUpdatedAt")]
    pub expected_updated_at: Option<DateTime<Utc>>,
}

/// HTTP method enumeration for the framework-agnostic request wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

/// Framework-agnostic request wrapper. Integrations convert their native
/// request type into this before dispatch.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    /// Parsed query parameters for lookups. Duplicate keys collapse here;
    /// `raw_query` keeps the original string.
    pub query: HashMap<String, String>,
    /// Query string exactly as the client sent it. Authoritative for
    /// [`Self::path_and_query`] so redirect targets round-trip duplicate
    /// keys and ordering verbatim.
    pub raw_query: Option<String>,
}

impl AuthRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HashMap::new(),
            body: None,
            query: HashMap::new(),
            raw_query: None,
        }
    }

    pub fn method(&self) -> &HttpMethod {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn header(&self, name: &str) -> Option<&String> {
        self.headers.get(name)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_raw_query(mut self, raw: impl Into<String>) -> Self {
        self.raw_query = Some(raw.into());
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Original path plus query string, as the client requested it. Used to
    /// build the post-login return target.
    ///
    /// Prefers `raw_query` so duplicate keys and ordering survive; falls
    /// back to re-serializing the parsed map for requests built without one.
    pub fn path_and_query(&self) -> String {
        if let Some(raw) = &self.raw_query {
            if !raw.is_empty() {
                return format!("{}?{}", self.path, raw);
            }
            return self.path.clone();
        }
        if self.query.is_empty() {
            return self.path.clone();
        }
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        let mut pairs: Vec<_> = self.query.iter().collect();
        pairs.sort();
        for (key, value) in pairs {
            serializer.append_pair(key, value);
        }
        format!("{}?{}", self.path, serializer.finish())
    }

    pub fn body_as_json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        if let Some(body) = &self.body {
            serde_json::from_slice(body)
        } else {
            serde_json::from_str("{}")
        }
    }
}

/// Framework-agnostic response wrapper.
#[derive(Debug, Clone)]
pub struct AuthResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl AuthResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn json<T: Serialize>(status: u16, data: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(data)?;
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());

        Ok(Self {
            status,
            headers,
            body,
        })
    }

    pub fn text(status: u16, text: impl Into<String>) -> Self {
        let body = text.into().into_bytes();
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/plain".to_string());

        Self {
            status,
            headers,
            body,
        }
    }

    /// 307 temporary redirect preserving the request method.
    pub fn redirect(location: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("location".to_string(), location.into());

        Self {
            status: 307,
            headers,
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

// Manual FromRow implementations for PostgreSQL
#[cfg(feature = "sqlx-postgres")]
mod postgres_impls {
    use super::*;
    use sqlx::postgres::PgRow;
    use sqlx::{FromRow, Row};

    impl FromRow<'_, PgRow> for User {
        fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
            Ok(Self {
                id: row.try_get("id")?,
                external_id: row.try_get("external_id")?,
                email: row.try_get("email")?,
                name: row.try_get("name")?,
                given_name: row.try_get("given_name")?,
                family_name: row.try_get("family_name")?,
                picture: row.try_get("picture")?,
                is_active: row.try_get("is_active")?,
                preferences: {
                    let json_value: sqlx::types::Json<serde_json::Value> =
                        row.try_get("preferences")?;
                    json_value.0
                },
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            })
        }
    }

    impl FromRow<'_, PgRow> for Session {
        fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
            let status: String = row.try_get("status")?;
            Ok(Self {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                external_session_id: row.try_get("external_session_id")?,
                user_agent: row.try_get("user_agent")?,
                ip_address: row.try_get("ip_address")?,
                status: SessionStatus::from(status),
                metadata: {
                    let json_value: sqlx::types::Json<serde_json::Value> =
                        row.try_get("metadata")?;
                    json_value.0
                },
                created_at: row.try_get("created_at")?,
                last_activity_at: row.try_get("last_activity_at")?,
                expires_at: row.try_get("expires_at")?,
            })
        }
    }

    impl FromRow<'_, PgRow> for Profile {
        fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
            Ok(Self {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                display_name: row.try_get("display_name")?,
                theme: row.try_get("theme")?,
                locale: row.try_get("locale")?,
                dashboard_layout: {
                    let json_value: sqlx::types::Json<serde_json::Value> =
                        row.try_get("dashboard_layout")?;
                    json_value.0
                },
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_serializes_with_camel_case_fields() {
        let session = Session {
            id: "s1".to_string(),
            user_id: "u1".to_string(),
            external_session_id: None,
            user_agent: Some("Mozilla/5.0".to_string()),
            ip_address: Some("127.0.0.1".to_string()),
            status: SessionStatus::Active,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            last_activity_at: Utc::now(),
            expires_at: Utc::now(),
        };

        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["status"], "active");
        assert!(value.get("expiresAt").is_some());
    }

    #[test]
    fn path_and_query_round_trips_query_string() {
        let req = AuthRequest::new(HttpMethod::Get, "/dashboard")
            .with_query("tab", "widgets")
            .with_query("page", "2");
        assert_eq!(req.path_and_query(), "/dashboard?page=2&tab=widgets");

        let bare = AuthRequest::new(HttpMethod::Get, "/dashboard");
        assert_eq!(bare.path_and_query(), "/dashboard");
    }

    #[test]
    fn raw_query_preserves_duplicate_keys_and_ordering() {
        let req = AuthRequest::new(HttpMethod::Get, "/dashboard")
            .with_raw_query("z=1&a=2&tag=x&tag=y")
            .with_query("z", "1")
            .with_query("a", "2")
            .with_query("tag", "y");
        assert_eq!(req.path_and_query(), "/dashboard?z=1&a=2&tag=x&tag=y");

        let empty = AuthRequest::new(HttpMethod::Get, "/dashboard").with_raw_query("");
        assert_eq!(empty.path_and_query(), "/dashboard");
    }

    #[test]
    fn session_status_parses_from_storage_strings() {
        assert_eq!(SessionStatus::from("terminated".to_string()), SessionStatus::Terminated);
        assert_eq!(SessionStatus::from("active".to_string()), SessionStatus::Active);
        assert_eq!(SessionStatus::Terminated.to_string(), "terminated");
    }
}

pub mod memory;

#[cfg(feature = "sqlx-postgres")]
pub mod database;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AuthResult;
use crate::types::{
    CreateProfile, CreateSession, CreateUser, Profile, Session, SessionStatus, UpdateProfile, User,
};

pub use memory::MemoryDatabaseAdapter;

#[cfg(feature = "sqlx-postgres")]
pub use database::{PoolConfig, SqlxAdapter};

/// Persistence seam for users, sessions, and profiles.
///
/// Every state transition is a single-row statement keyed by primary key, so
/// no operation here requires a multi-statement transaction. All validity
/// policy lives in [`crate::SessionManager`]; adapters store and fetch rows
/// as-is.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync + 'static {
    // User operations. Users are written by the authentication callback flow;
    // the session manager only reads them.
    async fn upsert_user(&self, user: CreateUser) -> AuthResult<User>;
    async fn get_user_by_id(&self, id: &str) -> AuthResult<Option<User>>;
    async fn get_user_by_external_id(&self, external_id: &str) -> AuthResult<Option<User>>;
    async fn update_user_preferences(
        &self,
        user_id: &str,
        preferences: serde_json::Value,
    ) -> AuthResult<User>;

    // Session operations.
    async fn create_session(&self, session: CreateSession) -> AuthResult<Session>;
    /// Fetch the raw row regardless of status or expiry.
    async fn get_session(&self, id: &str) -> AuthResult<Option<Session>>;
    /// Rows with `status = active`, newest activity first. Expiry filtering
    /// is the session manager's job.
    async fn get_user_sessions(&self, user_id: &str) -> AuthResult<Vec<Session>>;
    /// Returns false when the row no longer exists.
    async fn update_session_activity(&self, id: &str, at: DateTime<Utc>) -> AuthResult<bool>;
    /// Shallow-merge `patch` into the session metadata bag.
    async fn update_session_metadata(
        &self,
        id: &str,
        patch: serde_json::Value,
    ) -> AuthResult<bool>;
    async fn update_session_status(&self, id: &str, status: SessionStatus) -> AuthResult<bool>;
    /// Terminate all active sessions for a user, optionally sparing one.
    /// Returns the number of rows affected.
    async fn terminate_user_sessions(
        &self,
        user_id: &str,
        exclude_session_id: Option<&str>,
    ) -> AuthResult<usize>;
    /// Delete rows whose expiry has passed. Storage reclamation only.
    async fn delete_expired_sessions(&self) -> AuthResult<usize>;
    /// Delete terminated rows older than `cutoff` (retention policy).
    async fn delete_terminated_sessions_before(&self, cutoff: DateTime<Utc>) -> AuthResult<usize>;

    // Profile operations.
    async fn create_profile(&self, profile: CreateProfile) -> AuthResult<Profile>;
    async fn get_profile(&self, user_id: &str) -> AuthResult<Option<Profile>>;
    /// Apply a partial update. Fails with `NotFound` when no row exists and
    /// `Conflict` when `expected_updated_at` is stale.
    async fn update_profile(&self, user_id: &str, update: UpdateProfile) -> AuthResult<Profile>;
}

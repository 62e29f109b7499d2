use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::types::{
    CreateProfile, CreateSession, CreateUser, Profile, Session, SessionStatus, UpdateProfile, User,
};

use super::DatabaseAdapter;

/// PostgreSQL adapter via SQLx.
///
/// Schema lives in `migrations/0001_create_auth_tables.sql`. Each operation
/// is a single statement; cascade deletes on `user_sessions.user_id` and
/// `user_profiles.user_id` keep referential integrity in the database.
pub struct SqlxAdapter {
    pool: PgPool,
}

impl SqlxAdapter {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Create adapter with custom pool configuration.
    pub async fn with_config(database_url: &str, config: PoolConfig) -> Result<Self, sqlx::Error> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Test database connection.
    pub async fn test_connection(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: std::time::Duration,
    pub idle_timeout: Option<std::time::Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout: std::time::Duration::from_secs(30),
            idle_timeout: Some(std::time::Duration::from_secs(600)),
        }
    }
}

#[async_trait]
impl DatabaseAdapter for SqlxAdapter {
    async fn upsert_user(&self, create: CreateUser) -> AuthResult<User> {
        let id = create.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now();

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, external_id, email, name, given_name, family_name, picture, is_active, preferences, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8, $9, $9)
            ON CONFLICT (external_id) DO UPDATE SET
                email = EXCLUDED.email,
                name = COALESCE(EXCLUDED.name, users.name),
                given_name = COALESCE(EXCLUDED.given_name, users.given_name),
                family_name = COALESCE(EXCLUDED.family_name, users.family_name),
                picture = COALESCE(EXCLUDED.picture, users.picture),
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&create.external_id)
        .bind(&create.email)
        .bind(&create.name)
        .bind(&create.given_name)
        .bind(&create.family_name)
        .bind(&create.picture)
        .bind(sqlx::types::Json(
            create.preferences.unwrap_or_else(|| serde_json::json!({})),
        ))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_user_by_id(&self, id: &str) -> AuthResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn get_user_by_external_id(&self, external_id: &str) -> AuthResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn update_user_preferences(
        &self,
        user_id: &str,
        preferences: serde_json::Value,
    ) -> AuthResult<User> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET preferences = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
        )
        .bind(sqlx::types::Json(preferences))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        user.ok_or(AuthError::UserNotFound)
    }

    async fn create_session(&self, create: CreateSession) -> AuthResult<Session> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO user_sessions (id, user_id, external_session_id, user_agent, ip_address, status, metadata, created_at, last_activity_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, 'active', '{}', $6, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&create.user_id)
        .bind(&create.external_session_id)
        .bind(&create.user_agent)
        .bind(&create.ip_address)
        .bind(now)
        .bind(create.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    async fn get_session(&self, id: &str) -> AuthResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM user_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(session)
    }

    async fn get_user_sessions(&self, user_id: &str) -> AuthResult<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(
            r#"
            SELECT * FROM user_sessions
            WHERE user_id = $1 AND status = 'active'
            ORDER BY last_activity_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn update_session_activity(&self, id: &str, at: DateTime<Utc>) -> AuthResult<bool> {
        let result = sqlx::query("UPDATE user_sessions SET last_activity_at = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_session_metadata(
        &self,
        id: &str,
        patch: serde_json::Value,
    ) -> AuthResult<bool> {
        let result =
            sqlx::query("UPDATE user_sessions SET metadata = metadata || $1 WHERE id = $2")
                .bind(sqlx::types::Json(patch))
                .bind(id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_session_status(&self, id: &str, status: SessionStatus) -> AuthResult<bool> {
        let result = sqlx::query("UPDATE user_sessions SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn terminate_user_sessions(
        &self,
        user_id: &str,
        exclude_session_id: Option<&str>,
    ) -> AuthResult<usize> {
        let mut query = sqlx::QueryBuilder::new(
            "UPDATE user_sessions SET status = 'terminated' WHERE status = 'active' AND user_id = ",
        );
        query.push_bind(user_id);
        if let Some(exclude) = exclude_session_id {
            query.push(" AND id != ");
            query.push_bind(exclude);
        }

        let result = query.build().execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }

    async fn delete_expired_sessions(&self) -> AuthResult<usize> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn delete_terminated_sessions_before(&self, cutoff: DateTime<Utc>) -> AuthResult<usize> {
        let result = sqlx::query(
            "DELETE FROM user_sessions WHERE status = 'terminated' AND created_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn create_profile(&self, create: CreateProfile) -> AuthResult<Profile> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO user_profiles (id, user_id, display_name, theme, locale, dashboard_layout, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&create.user_id)
        .bind(&create.display_name)
        .bind(create.theme.unwrap_or_else(|| "system".to_string()))
        .bind(create.locale.unwrap_or_else(|| "en".to_string()))
        .bind(sqlx::types::Json(
            create
                .dashboard_layout
                .unwrap_or_else(|| serde_json::json!({})),
        ))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(profile)
    }

    async fn get_profile(&self, user_id: &str) -> AuthResult<Option<Profile>> {
        let profile =
            sqlx::query_as::<_, Profile>("SELECT * FROM user_profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(profile)
    }

    async fn update_profile(&self, user_id: &str, update: UpdateProfile) -> AuthResult<Profile> {
        let mut query = sqlx::QueryBuilder::new("UPDATE user_profiles SET updated_at = NOW()");

        if let Some(display_name) = &update.display_name {
            query.push(", display_name = ");
            query.push_bind(display_name);
        }
        if let Some(theme) = &update.theme {
            query.push(", theme = ");
            query.push_bind(theme);
        }
        if let Some(locale) = &update.locale {
            query.push(", locale = ");
            query.push_bind(locale);
        }
        if let Some(layout) = &update.dashboard_layout {
            query.push(", dashboard_layout = ");
            query.push_bind(sqlx::types::Json(layout.clone()));
        }

        query.push(" WHERE user_id = ");
        query.push_bind(user_id);
        if let Some(expected) = update.expected_updated_at {
            query.push(" AND updated_at = ");
            query.push_bind(expected);
        }
        query.push(" RETURNING *");

        let updated = query
            .build_query_as::<Profile>()
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(profile) => Ok(profile),
            // Distinguish a missing row from a stale expected_updated_at.
            None => match self.get_profile(user_id).await? {
                Some(_) => Err(AuthError::conflict("Profile was modified concurrently")),
                None => Err(AuthError::not_found("Profile not found")),
            },
        }
    }
}

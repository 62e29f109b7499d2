use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::types::{
    CreateProfile, CreateSession, CreateUser, Profile, Session, SessionStatus, UpdateProfile, User,
};

use super::DatabaseAdapter;

/// In-memory database adapter for tests and examples.
///
/// Not intended for production use; rows live in process-local maps guarded
/// by mutexes.
#[derive(Default)]
pub struct MemoryDatabaseAdapter {
    users: Mutex<HashMap<String, User>>,
    sessions: Mutex<HashMap<String, Session>>,
    profiles: Mutex<HashMap<String, Profile>>,
}

impl MemoryDatabaseAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn merge_objects(base: &mut serde_json::Value, patch: &serde_json::Value) {
        if let (Some(base_map), Some(patch_map)) = (base.as_object_mut(), patch.as_object()) {
            for (key, value) in patch_map {
                base_map.insert(key.clone(), value.clone());
            }
        }
    }
}

#[async_trait]
impl DatabaseAdapter for MemoryDatabaseAdapter {
    async fn upsert_user(&self, create: CreateUser) -> AuthResult<User> {
        let mut users = self.users.lock().expect("users lock poisoned");
        let now = Utc::now();

        if let Some(existing) = users
            .values_mut()
            .find(|u| u.external_id == create.external_id)
        {
            existing.email = create.email;
            if create.name.is_some() {
                existing.name = create.name;
            }
            if create.given_name.is_some() {
                existing.given_name = create.given_name;
            }
            if create.family_name.is_some() {
                existing.family_name = create.family_name;
            }
            if create.picture.is_some() {
                existing.picture = create.picture;
            }
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let user = User {
            id: create.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            external_id: create.external_id,
            email: create.email,
            name: create.name,
            given_name: create.given_name,
            family_name: create.family_name,
            picture: create.picture,
            is_active: true,
            preferences: create.preferences.unwrap_or_else(|| serde_json::json!({})),
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user_by_id(&self, id: &str) -> AuthResult<Option<User>> {
        let users = self.users.lock().expect("users lock poisoned");
        Ok(users.get(id).cloned())
    }

    async fn get_user_by_external_id(&self, external_id: &str) -> AuthResult<Option<User>> {
        let users = self.users.lock().expect("users lock poisoned");
        Ok(users
            .values()
            .find(|u| u.external_id == external_id)
            .cloned())
    }

    async fn update_user_preferences(
        &self,
        user_id: &str,
        preferences: serde_json::Value,
    ) -> AuthResult<User> {
        let mut users = self.users.lock().expect("users lock poisoned");
        let user = users.get_mut(user_id).ok_or(AuthError::UserNotFound)?;
        user.preferences = preferences;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn create_session(&self, create: CreateSession) -> AuthResult<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: create.user_id,
            external_session_id: create.external_session_id,
            user_agent: create.user_agent,
            ip_address: create.ip_address,
            status: SessionStatus::Active,
            metadata: serde_json::json!({}),
            created_at: now,
            last_activity_at: now,
            expires_at: create.expires_at,
        };

        let mut sessions = self.sessions.lock().expect("sessions lock poisoned");
        sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> AuthResult<Option<Session>> {
        let sessions = self.sessions.lock().expect("sessions lock poisoned");
        Ok(sessions.get(id).cloned())
    }

    async fn get_user_sessions(&self, user_id: &str) -> AuthResult<Vec<Session>> {
        let sessions = self.sessions.lock().expect("sessions lock poisoned");
        let mut result: Vec<Session> = sessions
            .values()
            .filter(|s| s.user_id == user_id && s.status == SessionStatus::Active)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(result)
    }

    async fn update_session_activity(&self, id: &str, at: DateTime<Utc>) -> AuthResult<bool> {
        let mut sessions = self.sessions.lock().expect("sessions lock poisoned");
        match sessions.get_mut(id) {
            Some(session) => {
                session.last_activity_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_session_metadata(
        &self,
        id: &str,
        patch: serde_json::Value,
    ) -> AuthResult<bool> {
        let mut sessions = self.sessions.lock().expect("sessions lock poisoned");
        match sessions.get_mut(id) {
            Some(session) => {
                Self::merge_objects(&mut session.metadata, &patch);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_session_status(&self, id: &str, status: SessionStatus) -> AuthResult<bool> {
        let mut sessions = self.sessions.lock().expect("sessions lock poisoned");
        match sessions.get_mut(id) {
            Some(session) => {
                session.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn terminate_user_sessions(
        &self,
        user_id: &str,
        exclude_session_id: Option<&str>,
    ) -> AuthResult<usize> {
        let mut sessions = self.sessions.lock().expect("sessions lock poisoned");
        let mut count = 0;
        for session in sessions.values_mut() {
            if session.user_id == user_id
                && session.status == SessionStatus::Active
                && exclude_session_id != Some(session.id.as_str())
            {
                session.status = SessionStatus::Terminated;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_expired_sessions(&self) -> AuthResult<usize> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().expect("sessions lock poisoned");
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        Ok(before - sessions.len())
    }

    async fn delete_terminated_sessions_before(&self, cutoff: DateTime<Utc>) -> AuthResult<usize> {
        let mut sessions = self.sessions.lock().expect("sessions lock poisoned");
        let before = sessions.len();
        sessions.retain(|_, s| !(s.status == SessionStatus::Terminated && s.created_at < cutoff));
        Ok(before - sessions.len())
    }

    async fn create_profile(&self, create: CreateProfile) -> AuthResult<Profile> {
        let mut profiles = self.profiles.lock().expect("profiles lock poisoned");
        if profiles.contains_key(&create.user_id) {
            return Err(AuthError::conflict("Profile already exists"));
        }

        let now = Utc::now();
        let profile = Profile {
            id: Uuid::new_v4().to_string(),
            user_id: create.user_id.clone(),
            display_name: create.display_name,
            theme: create.theme.unwrap_or_else(|| "system".to_string()),
            locale: create.locale.unwrap_or_else(|| "en".to_string()),
            dashboard_layout: create
                .dashboard_layout
                .unwrap_or_else(|| serde_json::json!({})),
            created_at: now,
            updated_at: now,
        };
        profiles.insert(create.user_id, profile.clone());
        Ok(profile)
    }

    async fn get_profile(&self, user_id: &str) -> AuthResult<Option<Profile>> {
        let profiles = self.profiles.lock().expect("profiles lock poisoned");
        Ok(profiles.get(user_id).cloned())
    }

    async fn update_profile(&self, user_id: &str, update: UpdateProfile) -> AuthResult<Profile> {
        let mut profiles = self.profiles.lock().expect("profiles lock poisoned");
        let profile = profiles
            .get_mut(user_id)
            .ok_or_else(|| AuthError::not_found("Profile not found"))?;

        if let Some(expected) = update.expected_updated_at {
            if expected != profile.updated_at {
                return Err(AuthError::conflict("Profile was modified concurrently"));
            }
        }

        if let Some(display_name) = update.display_name {
            profile.display_name = Some(display_name);
        }
        if let Some(theme) = update.theme {
            profile.theme = theme;
        }
        if let Some(locale) = update.locale {
            profile.locale = locale;
        }
        if let Some(layout) = update.dashboard_layout {
            profile.dashboard_layout = layout;
        }
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_user_matches_on_external_id() {
        let db = MemoryDatabaseAdapter::new();
        let first = db
            .upsert_user(CreateUser::new("ext_1", "a@example.com"))
            .await
            .unwrap();
        let second = db
            .upsert_user(CreateUser::new("ext_1", "b@example.com"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.email, "b@example.com");
    }

    #[tokio::test]
    async fn terminate_user_sessions_can_spare_one() {
        let db = MemoryDatabaseAdapter::new();
        let user = db
            .upsert_user(CreateUser::new("ext_1", "a@example.com"))
            .await
            .unwrap();

        let mut ids = Vec::new();
        for _ in 0..3 {
            let session = db
                .create_session(CreateSession {
                    user_id: user.id.clone(),
                    external_session_id: None,
                    user_agent: None,
                    ip_address: None,
                    expires_at: Utc::now() + chrono::Duration::hours(1),
                })
                .await
                .unwrap();
            ids.push(session.id);
        }

        let count = db
            .terminate_user_sessions(&user.id, Some(&ids[0]))
            .await
            .unwrap();
        assert_eq!(count, 2);

        let remaining = db.get_user_sessions(&user.id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, ids[0]);
    }

    #[tokio::test]
    async fn profile_update_detects_stale_writes() {
        let db = MemoryDatabaseAdapter::new();
        let user = db
            .upsert_user(CreateUser::new("ext_1", "a@example.com"))
            .await
            .unwrap();
        let profile = db.create_profile(CreateProfile::new(&user.id)).await.unwrap();

        let stale = UpdateProfile {
            theme: Some("dark".to_string()),
            expected_updated_at: Some(profile.updated_at - chrono::Duration::seconds(5)),
            ..Default::default()
        };
        let err = db.update_profile(&user.id, stale).await.unwrap_err();
        assert_eq!(err.status_code(), 409);

        let fresh = UpdateProfile {
            theme: Some("dark".to_string()),
            expected_updated_at: Some(profile.updated_at),
            ..Default::default()
        };
        let updated = db.update_profile(&user.id, fresh).await.unwrap();
        assert_eq!(updated.theme, "dark");
    }
}

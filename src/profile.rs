use std::sync::Arc;

use crate::adapters::DatabaseAdapter;
use crate::error::{AuthError, AuthResult};
use crate::types::{Profile, UpdateProfile};

/// CRUD over the per-user profile row and the user preferences bag.
///
/// Thin by design; the interesting policy (auth, ownership) lives in the
/// guard and the route layer.
pub struct ProfileService {
    database: Arc<dyn DatabaseAdapter>,
}

impl ProfileService {
    pub fn new(database: Arc<dyn DatabaseAdapter>) -> Self {
        Self { database }
    }

    pub async fn get_profile(&self, user_id: &str) -> AuthResult<Profile> {
        self.database
            .get_profile(user_id)
            .await?
            .ok_or_else(|| AuthError::not_found("Profile not found"))
    }

    /// Partial update; propagates `NotFound` for a missing row and
    /// `Conflict` when the caller's `expected_updated_at` is stale.
    pub async fn update_profile(
        &self,
        user_id: &str,
        update: UpdateProfile,
    ) -> AuthResult<Profile> {
        self.database.update_profile(user_id, update).await
    }

    pub async fn get_preferences(&self, user_id: &str) -> AuthResult<serde_json::Value> {
        let user = self
            .database
            .get_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        Ok(user.preferences)
    }

    /// Replace the preferences bag. The value is opaque user-defined data,
    /// validated only to be a JSON object at this edge.
    pub async fn update_preferences(
        &self,
        user_id: &str,
        preferences: serde_json::Value,
    ) -> AuthResult<serde_json::Value> {
        if !preferences.is_object() {
            return Err(AuthError::validation("Preferences must be a JSON object"));
        }
        let user = self
            .database
            .update_user_preferences(user_id, preferences)
            .await?;
        Ok(user.preferences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryDatabaseAdapter;
    use crate::types::{CreateProfile, CreateUser};

    async fn service_with_user() -> (ProfileService, String) {
        let database = Arc::new(MemoryDatabaseAdapter::new());
        let user = database
            .upsert_user(CreateUser::new("ext_1", "a@example.com"))
            .await
            .unwrap();
        (ProfileService::new(database), user.id)
    }

    #[tokio::test]
    async fn missing_profile_is_not_found() {
        let (service, user_id) = service_with_user().await;
        let err = service.get_profile(&user_id).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn preferences_round_trip() {
        let (service, user_id) = service_with_user().await;

        let updated = service
            .update_preferences(&user_id, serde_json::json!({ "theme": "dark" }))
            .await
            .unwrap();
        assert_eq!(updated["theme"], "dark");

        let fetched = service.get_preferences(&user_id).await.unwrap();
        assert_eq!(fetched, updated);
    }

    #[tokio::test]
    async fn non_object_preferences_are_rejected() {
        let (service, user_id) = service_with_user().await;
        let err = service
            .update_preferences(&user_id, serde_json::json!([1, 2, 3]))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn profile_update_applies_partial_fields() {
        let (service, user_id) = service_with_user().await;
        service
            .database
            .create_profile(CreateProfile::new(&user_id))
            .await
            .unwrap();

        let updated = service
            .update_profile(
                &user_id,
                UpdateProfile {
                    locale: Some("de".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.locale, "de");
        assert_eq!(updated.theme, "system");
    }
}

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::net::IpAddr;
use std::sync::Arc;

use crate::adapters::DatabaseAdapter;
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::identity::IdentityProvider;
use crate::types::{
    AuthRequest, CreateSession, InvalidReason, NewSession, Session, SessionLookup, SessionStatus,
};

type HmacSha256 = Hmac<Sha256>;

const UNKNOWN_USER_AGENT: &str = "Unknown User Agent";
const UNKNOWN_IP: &str = "unknown";
const MAX_USER_AGENT_LEN: usize = 512;

/// Metadata keys that would smuggle credential material into the session
/// metadata bag. Rejected on write.
const FORBIDDEN_METADATA_KEYS: &[&str] =
    &["token", "access_token", "refresh_token", "id_token", "secret", "password"];

/// Sole reader/writer of the session entity; all validity policy lives here.
///
/// Expiry is enforced lazily: a session found expired during lookup is
/// terminated on the spot, so the cleanup sweeps are storage reclamation
/// only, never a correctness requirement.
pub struct SessionManager {
    config: Arc<AuthConfig>,
    database: Arc<dyn DatabaseAdapter>,
}

impl SessionManager {
    pub fn new(config: Arc<AuthConfig>, database: Arc<dyn DatabaseAdapter>) -> Self {
        Self { config, database }
    }

    /// Create a session for an existing, active user.
    ///
    /// Client-supplied `user_agent`/`ip_address` are sanitized rather than
    /// rejected, so creation never fails on untrusted metadata. The TTL must
    /// fall within the configured bounds; when absent the default applies.
    pub async fn create_session(&self, new: NewSession) -> AuthResult<Session> {
        let ttl = match new.ttl {
            Some(ttl) => {
                if ttl < self.config.session.min_ttl || ttl > self.config.session.max_ttl {
                    return Err(AuthError::validation("Session TTL out of bounds"));
                }
                ttl
            }
            None => self.config.session.default_ttl,
        };

        let user = self
            .database
            .get_user_by_id(&new.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::forbidden("User account is disabled"));
        }

        let create = CreateSession {
            user_id: new.user_id,
            external_session_id: new.external_session_id,
            user_agent: sanitize_user_agent(new.user_agent),
            ip_address: sanitize_ip_address(new.ip_address),
            expires_at: Utc::now() + ttl,
        };

        self.database.create_session(create).await
    }

    /// Diagnosable lookup distinguishing "never existed" from "existed but
    /// invalid". A row found expired is terminated here (lazy expiry).
    pub async fn lookup_session(&self, id: &str) -> AuthResult<SessionLookup> {
        let Some(session) = self.database.get_session(id).await? else {
            return Ok(SessionLookup::NotFound);
        };

        if session.status == SessionStatus::Terminated {
            return Ok(SessionLookup::FoundButInvalid(InvalidReason::Terminated));
        }

        if session.is_expired_at(Utc::now()) {
            tracing::debug!(session_id = %id, "terminating session found expired during lookup");
            self.database
                .update_session_status(id, SessionStatus::Terminated)
                .await?;
            return Ok(SessionLookup::FoundButInvalid(InvalidReason::Expired));
        }

        Ok(SessionLookup::Found(session))
    }

    /// Simple contract: `None` covers missing, terminated, and expired rows
    /// alike. Use [`Self::lookup_session`] when the distinction matters.
    pub async fn get_session(&self, id: &str) -> AuthResult<Option<Session>> {
        match self.lookup_session(id).await? {
            SessionLookup::Found(session) => Ok(Some(session)),
            _ => Ok(None),
        }
    }

    /// Active, unexpired sessions for a user, newest activity first.
    pub async fn get_user_sessions(&self, user_id: &str) -> AuthResult<Vec<Session>> {
        let now = Utc::now();
        let sessions = self.database.get_user_sessions(user_id).await?;
        Ok(sessions
            .into_iter()
            .filter(|s| !s.is_expired_at(now))
            .collect())
    }

    /// Record activity on a session. A no-op when the session no longer
    /// exists; `last_activity_at` is advisory, not a security boundary.
    pub async fn update_activity(&self, id: &str) -> AuthResult<()> {
        self.database
            .update_session_activity(id, Utc::now())
            .await?;
        Ok(())
    }

    /// Merge device/location tags into the session metadata bag.
    ///
    /// The patch must be a JSON object and must not carry credential
    /// material.
    pub async fn update_metadata(&self, id: &str, patch: serde_json::Value) -> AuthResult<()> {
        let Some(object) = patch.as_object() else {
            return Err(AuthError::validation("Session metadata must be an object"));
        };
        for key in object.keys() {
            if FORBIDDEN_METADATA_KEYS.contains(&key.to_lowercase().as_str()) {
                return Err(AuthError::validation(
                    "Session metadata must not contain credential material",
                ));
            }
        }

        self.database.update_session_metadata(id, patch).await?;
        Ok(())
    }

    /// Direct status transition. Used internally by the terminate operations
    /// and exposed for administrative flows.
    pub async fn update_status(&self, id: &str, status: SessionStatus) -> AuthResult<()> {
        self.database.update_session_status(id, status).await?;
        Ok(())
    }

    /// Terminate one session. Idempotent: terminating an already-terminated
    /// or missing session is not an error.
    pub async fn terminate_session(&self, id: &str) -> AuthResult<()> {
        self.update_status(id, SessionStatus::Terminated).await
    }

    /// Terminate every active session for a user. Used on password change
    /// and security events. Returns the number of sessions affected.
    pub async fn terminate_all_user_sessions(&self, user_id: &str) -> AuthResult<usize> {
        self.database.terminate_user_sessions(user_id, None).await
    }

    /// "Log out all other devices": terminate all active sessions except the
    /// current one. Returns the number of sessions affected.
    pub async fn terminate_other_sessions(
        &self,
        user_id: &str,
        current_session_id: &str,
    ) -> AuthResult<usize> {
        self.database
            .terminate_user_sessions(user_id, Some(current_session_id))
            .await
    }

    /// True iff the session exists, is active, and has not expired. Expired
    /// rows are terminated as a side effect.
    pub async fn validate_session(&self, id: &str) -> AuthResult<bool> {
        Ok(matches!(
            self.lookup_session(id).await?,
            SessionLookup::Found(_)
        ))
    }

    /// Cross-check local validity against the identity provider: both must
    /// agree. Defends against a local session outliving an externally
    /// revoked provider session, and the reverse — a terminated local
    /// session is never resurrected by a still-valid provider token.
    pub async fn validate_with_provider(
        &self,
        id: &str,
        provider: &dyn IdentityProvider,
        req: &AuthRequest,
    ) -> AuthResult<bool> {
        if !self.validate_session(id).await? {
            return Ok(false);
        }
        provider.is_authenticated(req).await
    }

    /// Delete rows whose expiry has passed. Storage reclamation for an
    /// externally scheduled job; lazy expiry already keeps validation
    /// correct without it.
    pub async fn cleanup_expired_sessions(&self) -> AuthResult<usize> {
        let count = self.database.delete_expired_sessions().await?;
        if count > 0 {
            tracing::info!(count, "deleted expired sessions");
        }
        Ok(count)
    }

    /// Delete terminated rows created before `cutoff` (retention policy).
    pub async fn cleanup_old_sessions(
        &self,
        cutoff: chrono::DateTime<Utc>,
    ) -> AuthResult<usize> {
        let count = self
            .database
            .delete_terminated_sessions_before(cutoff)
            .await?;
        if count > 0 {
            tracing::info!(count, "deleted old terminated sessions");
        }
        Ok(count)
    }

    /// Signed cookie value for a session: `id.base64url_signature`.
    pub fn cookie_value(&self, session: &Session) -> String {
        sign_session_id(&session.id, &self.config.secret)
    }

    /// Extract the session id from a request.
    ///
    /// Tries a Bearer token from the Authorization header first (raw id, no
    /// HMAC for API clients), then falls back to the configured cookie with
    /// signature verification.
    pub fn extract_session_id(&self, req: &AuthRequest) -> Option<String> {
        if let Some(auth_header) = req.headers.get("authorization") {
            if let Some(id) = auth_header.strip_prefix("Bearer ") {
                return Some(id.to_string());
            }
        }

        if let Some(cookie_header) = req.headers.get("cookie") {
            let cookie_name = &self.config.session.cookie_name;
            for part in cookie_header.split(';') {
                let part = part.trim();
                if let Some(value) = part.strip_prefix(&format!("{}=", cookie_name)) {
                    if !value.is_empty() {
                        return verify_signed_session_id(value, &self.config.secret);
                    }
                }
            }
        }

        None
    }
}

/// Sanitize an untrusted user-agent string for storage.
///
/// Markup and SQL metacharacters are stripped so stored values can be
/// rendered back to users listing their sessions. Script-bearing or emptied
/// input becomes a safe placeholder; over-long input is truncated.
pub fn sanitize_user_agent(input: Option<String>) -> Option<String> {
    let raw = input?;
    let lowered = raw.to_lowercase();
    if lowered.contains("<script") || lowered.contains("javascript:") {
        return Some(UNKNOWN_USER_AGENT.to_string());
    }

    let mut cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '"' | '\'' | ';' | '\\'))
        .collect();
    cleaned = cleaned
        .replace("--", "")
        .replace("/*", "")
        .replace("*/", "");
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return Some(UNKNOWN_USER_AGENT.to_string());
    }
    if cleaned.len() > MAX_USER_AGENT_LEN {
        let mut end = MAX_USER_AGENT_LEN;
        while !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        return Some(cleaned[..end].to_string());
    }
    Some(cleaned.to_string())
}

/// Sanitize an untrusted IP string: anything that does not parse as an IPv4
/// or IPv6 address is replaced with a placeholder.
pub fn sanitize_ip_address(input: Option<String>) -> Option<String> {
    let raw = input?;
    match raw.trim().parse::<IpAddr>() {
        Ok(addr) => Some(addr.to_string()),
        Err(_) => Some(UNKNOWN_IP.to_string()),
    }
}

/// Sign a session id with HMAC-SHA256, producing `id.base64url_signature`.
fn sign_session_id(id: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(id.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    format!("{}.{}", id, signature)
}

/// Verify an HMAC-signed cookie value and extract the raw session id.
/// `Mac::verify_slice` compares in constant time.
fn verify_signed_session_id(signed_value: &str, secret: &str) -> Option<String> {
    let (id, signature) = signed_value.rsplit_once('.')?;
    if id.is_empty() || signature.is_empty() {
        return None;
    }

    let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(id.as_bytes());
    mac.verify_slice(&signature).ok()?;

    Some(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_sanitizer_strips_markup_and_sql_metacharacters() {
        let cleaned = sanitize_user_agent(Some("Mozilla/5.0'; DROP TABLE users;--".to_string()));
        let cleaned = cleaned.unwrap();
        assert!(!cleaned.contains('\''));
        assert!(!cleaned.contains(';'));
        assert!(!cleaned.contains("--"));
        assert!(cleaned.contains("Mozilla/5.0"));
    }

    #[test]
    fn script_bearing_user_agent_becomes_placeholder() {
        assert_eq!(
            sanitize_user_agent(Some("<script>alert(1)</script>".to_string())),
            Some(UNKNOWN_USER_AGENT.to_string())
        );
        assert_eq!(
            sanitize_user_agent(Some("<<<>>>".to_string())),
            Some(UNKNOWN_USER_AGENT.to_string())
        );
        assert_eq!(sanitize_user_agent(None), None);
    }

    #[test]
    fn over_long_user_agent_is_truncated() {
        let long = "a".repeat(2000);
        let cleaned = sanitize_user_agent(Some(long)).unwrap();
        assert_eq!(cleaned.len(), MAX_USER_AGENT_LEN);
    }

    #[test]
    fn ip_sanitizer_accepts_valid_and_replaces_invalid() {
        assert_eq!(
            sanitize_ip_address(Some("192.168.1.10".to_string())),
            Some("192.168.1.10".to_string())
        );
        assert_eq!(
            sanitize_ip_address(Some("::1".to_string())),
            Some("::1".to_string())
        );
        assert_eq!(
            sanitize_ip_address(Some("10.0.0.1'; DELETE FROM user_sessions".to_string())),
            Some(UNKNOWN_IP.to_string())
        );
        assert_eq!(sanitize_ip_address(None), None);
    }

    #[test]
    fn signed_session_id_round_trips() {
        let secret = "a-secret-key-that-is-at-least-32-chars";
        let signed = sign_session_id("sess_123", secret);
        assert_eq!(
            verify_signed_session_id(&signed, secret),
            Some("sess_123".to_string())
        );
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let secret = "a-secret-key-that-is-at-least-32-chars";
        let signed = sign_session_id("sess_123", secret);
        let tampered = signed.replace("sess_123", "sess_456");
        assert_eq!(verify_signed_session_id(&tampered, secret), None);
        assert_eq!(verify_signed_session_id(&signed, "another-secret-key-32-chars-long!!"), None);
        assert_eq!(verify_signed_session_id("no-separator", secret), None);
    }
}

use std::sync::Arc;

use dashboard_auth::{
    ApiGuard, AuthConfig, AuthError, AuthRequest, CreateUser, DatabaseAdapter, GuardOutcome,
    HttpMethod, IdentityUser, MemoryDatabaseAdapter, Middleware, NewSession, PageGuard,
    RouteGuard, RouteRequirements, SessionManager, StaticIdentityProvider,
};

const SECRET: &str = "an-integration-test-secret-of-32-chars!";

struct Setup {
    database: Arc<MemoryDatabaseAdapter>,
    sessions: Arc<SessionManager>,
    provider: Arc<StaticIdentityProvider>,
    guard: Arc<RouteGuard>,
    user_id: String,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn setup(provider: StaticIdentityProvider) -> Setup {
    init_tracing();
    let config = Arc::new(AuthConfig::new(SECRET));
    let database = Arc::new(MemoryDatabaseAdapter::new());
    let user = database
        .upsert_user(CreateUser::new("kinde|user_1", "user@example.com"))
        .await
        .unwrap();
    let sessions = Arc::new(SessionManager::new(config.clone(), database.clone()));
    let provider = Arc::new(provider);
    let guard = Arc::new(RouteGuard::new(config, sessions.clone(), provider.clone()));
    Setup {
        database,
        sessions,
        provider,
        guard,
        user_id: user.id,
    }
}

fn identity() -> IdentityUser {
    IdentityUser::new("kinde|user_1")
        .with_roles(vec!["user".to_string()])
        .with_permissions(vec!["dashboard:read".to_string()])
}

/// Create a local session and return a request carrying its signed cookie.
async fn authenticated_request(setup: &Setup, path: &str) -> AuthRequest {
    let session = setup
        .sessions
        .create_session(NewSession::new(&setup.user_id))
        .await
        .unwrap();
    let cookie = setup.sessions.cookie_value(&session);
    AuthRequest::new(HttpMethod::Get, path)
        .with_header("cookie", format!("dashboard.session={}", cookie))
}

#[tokio::test]
async fn unauthenticated_page_request_redirects_to_login_with_return_target() {
    let setup = setup(StaticIdentityProvider::anonymous()).await;
    let page_guard = PageGuard::new(setup.guard.clone());

    let req = AuthRequest::new(HttpMethod::Get, "/dashboard");
    let response = page_guard.before_request(&req).await.unwrap().unwrap();

    assert_eq!(response.status, 307);
    let location = response.headers.get("location").unwrap();
    assert!(location.starts_with("/api/auth/login?"));
    assert!(location.contains("returnTo=%2Fdashboard"));
}

#[tokio::test]
async fn redirect_target_preserves_the_query_string() {
    let setup = setup(StaticIdentityProvider::anonymous()).await;

    let req = AuthRequest::new(HttpMethod::Get, "/dashboard").with_query("tab", "overview");
    let target = setup.guard.login_redirect_target(&req);

    assert!(target.contains("returnTo=%2Fdashboard%3Ftab%3Doverview"));
}

#[tokio::test]
async fn redirect_target_keeps_duplicate_query_keys_verbatim() {
    let setup = setup(StaticIdentityProvider::anonymous()).await;

    // Mirrors what the HTTP bridges do: parsed map for lookups, the raw
    // string kept alongside it.
    let req = AuthRequest::new(HttpMethod::Get, "/dashboard")
        .with_raw_query("z=1&a=2&tag=x&tag=y")
        .with_query("z", "1")
        .with_query("a", "2")
        .with_query("tag", "y");
    let target = setup.guard.login_redirect_target(&req);

    assert_eq!(
        target,
        "/api/auth/login?returnTo=%2Fdashboard%3Fz%3D1%26a%3D2%26tag%3Dx%26tag%3Dy"
    );
}

#[tokio::test]
async fn unauthenticated_api_request_gets_401_json_without_redirect() {
    let setup = setup(StaticIdentityProvider::anonymous()).await;
    let api_guard = ApiGuard::new(setup.guard.clone());

    let req = AuthRequest::new(HttpMethod::Get, "/api/user/profile");
    let response = api_guard.before_request(&req).await.unwrap().unwrap();

    assert_eq!(response.status, 401);
    assert!(response.headers.get("location").is_none());
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn public_paths_skip_all_checks() {
    let setup = setup(StaticIdentityProvider::anonymous()).await;

    for path in ["/api/auth/login", "/api/auth/callback", "/health"] {
        let req = AuthRequest::new(HttpMethod::Get, path);
        let outcome = setup.guard.evaluate(&req, &RouteRequirements::none()).await;
        assert!(matches!(outcome, GuardOutcome::Public), "path {}", path);
    }
}

#[tokio::test]
async fn public_prefixes_match_whole_segments_only() {
    let setup = setup(StaticIdentityProvider::anonymous()).await;
    assert!(setup.guard.is_public_path("/api/auth/login"));
    assert!(setup.guard.is_public_path("/api/auth"));
    assert!(!setup.guard.is_public_path("/api/auth2"));
    assert!(!setup.guard.is_public_path("/api/authx/login"));
}

#[tokio::test]
async fn provider_failure_fails_closed() {
    let setup = setup(StaticIdentityProvider::failing(|| {
        AuthError::provider("identity provider unreachable")
    }))
    .await;

    let req = authenticated_request(&setup, "/dashboard").await;
    let outcome = setup.guard.evaluate(&req, &RouteRequirements::none()).await;
    assert!(matches!(outcome, GuardOutcome::Unauthenticated));
}

#[tokio::test]
async fn provider_authentication_alone_is_not_enough() {
    let setup = setup(StaticIdentityProvider::authenticated(identity())).await;

    // No local session cookie: denied despite a valid provider identity.
    let req = AuthRequest::new(HttpMethod::Get, "/dashboard");
    let outcome = setup.guard.evaluate(&req, &RouteRequirements::none()).await;
    assert!(matches!(outcome, GuardOutcome::Unauthenticated));
}

#[tokio::test]
async fn terminated_local_session_denies_despite_valid_provider() {
    let setup = setup(StaticIdentityProvider::authenticated(identity())).await;

    let req = authenticated_request(&setup, "/dashboard").await;
    let id = setup.sessions.extract_session_id(&req).unwrap();
    setup.sessions.terminate_session(&id).await.unwrap();

    let outcome = setup.guard.evaluate(&req, &RouteRequirements::none()).await;
    assert!(matches!(outcome, GuardOutcome::Unauthenticated));
}

#[tokio::test]
async fn authorized_request_carries_identity_and_bumps_activity() {
    let setup = setup(StaticIdentityProvider::authenticated(identity())).await;

    let req = authenticated_request(&setup, "/dashboard").await;
    let before = {
        let id = setup.sessions.extract_session_id(&req).unwrap();
        setup
            .database
            .get_session(&id)
            .await
            .unwrap()
            .unwrap()
            .last_activity_at
    };

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let outcome = setup.guard.evaluate(&req, &RouteRequirements::none()).await;
    let GuardOutcome::Authorized { user, session_id } = outcome else {
        panic!("expected authorized outcome");
    };
    assert_eq!(user.subject, "kinde|user_1");

    let after = setup
        .database
        .get_session(&session_id.unwrap())
        .await
        .unwrap()
        .unwrap()
        .last_activity_at;
    assert!(after > before);
}

#[tokio::test]
async fn role_requirements_use_or_semantics() {
    let setup = setup(StaticIdentityProvider::authenticated(identity())).await;
    let req = authenticated_request(&setup, "/admin").await;

    // Caller has "user"; requiring admin OR user passes.
    let either = RouteRequirements::none()
        .with_roles(vec!["admin".to_string(), "user".to_string()]);
    assert!(matches!(
        setup.guard.evaluate(&req, &either).await,
        GuardOutcome::Authorized { .. }
    ));

    let admin_only = RouteRequirements::none().with_roles(vec!["admin".to_string()]);
    assert!(matches!(
        setup.guard.evaluate(&req, &admin_only).await,
        GuardOutcome::Unauthorized
    ));
}

#[tokio::test]
async fn permission_requirements_use_and_semantics() {
    let setup = setup(StaticIdentityProvider::authenticated(identity())).await;
    let req = authenticated_request(&setup, "/reports").await;

    let read_only = RouteRequirements::none()
        .with_permissions(vec!["dashboard:read".to_string()]);
    assert!(matches!(
        setup.guard.evaluate(&req, &read_only).await,
        GuardOutcome::Authorized { .. }
    ));

    // Caller has read but not write; AND over permissions fails.
    let read_and_write = RouteRequirements::none().with_permissions(vec![
        "dashboard:read".to_string(),
        "dashboard:write".to_string(),
    ]);
    assert!(matches!(
        setup.guard.evaluate(&req, &read_and_write).await,
        GuardOutcome::Unauthorized
    ));
}

#[tokio::test]
async fn unauthorized_page_request_gets_inline_fallback_not_redirect() {
    let setup = setup(StaticIdentityProvider::authenticated(identity())).await;
    let page_guard = PageGuard::new(setup.guard.clone())
        .with_requirements(RouteRequirements::none().with_roles(vec!["admin".to_string()]));

    let req = authenticated_request(&setup, "/admin").await;
    let response = page_guard.before_request(&req).await.unwrap().unwrap();

    assert_eq!(response.status, 403);
    assert!(response.headers.get("location").is_none());
    let body = String::from_utf8(response.body).unwrap();
    assert!(body.contains("role=\"alert\""));
}

#[tokio::test]
async fn unauthorized_api_request_gets_403_json() {
    let setup = setup(StaticIdentityProvider::authenticated(identity())).await;
    let api_guard = ApiGuard::new(setup.guard.clone())
        .with_requirements(RouteRequirements::none().with_roles(vec!["admin".to_string()]));

    let req = authenticated_request(&setup, "/api/reports").await;
    let response = api_guard.before_request(&req).await.unwrap().unwrap();

    assert_eq!(response.status, 403);
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn external_revocation_takes_effect_on_the_next_request() {
    let setup = setup(StaticIdentityProvider::authenticated(identity())).await;
    let req = authenticated_request(&setup, "/dashboard").await;

    assert!(matches!(
        setup.guard.evaluate(&req, &RouteRequirements::none()).await,
        GuardOutcome::Authorized { .. }
    ));

    setup.provider.set_user(None);
    assert!(matches!(
        setup.guard.evaluate(&req, &RouteRequirements::none()).await,
        GuardOutcome::Unauthenticated
    ));
}

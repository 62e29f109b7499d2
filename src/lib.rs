//! Session management and route protection for multi-tenant dashboard
//! applications.
//!
//! The crate wraps an external identity provider (which owns credentials and
//! token issuance) with a local session layer that is authoritative for
//! application access: sessions can be renewed, terminated, and swept
//! independently of provider token lifetimes. Route guards sit in front of
//! page and API surfaces and turn access decisions into redirects or JSON
//! errors.
//!
//! Everything is wired through [`DashboardAuth`] and its builder; there are
//! no global singletons, so hosts can run several isolated instances.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dashboard_auth::{AuthConfig, DashboardAuth, MemoryDatabaseAdapter, StaticIdentityProvider};
//!
//! # fn main() -> dashboard_auth::AuthResult<()> {
//! let auth = DashboardAuth::builder(AuthConfig::new("a-secret-of-at-least-32-characters!"))
//!     .database(Arc::new(MemoryDatabaseAdapter::new()))
//!     .identity(Arc::new(StaticIdentityProvider::anonymous()))
//!     .build()?;
//! # let _ = auth;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod profile;
pub mod retry;
pub mod routes;
pub mod session;
pub mod types;

pub use adapters::{DatabaseAdapter, MemoryDatabaseAdapter};
#[cfg(feature = "sqlx-postgres")]
pub use adapters::{PoolConfig, SqlxAdapter};
pub use app::{AuthBuilder, DashboardAuth};
pub use config::{AuthConfig, GuardConfig, SessionConfig};
pub use error::{AuthError, AuthResult, DatabaseError};
pub use guard::{ApiGuard, GuardOutcome, PageGuard, RouteGuard, RouteRequirements, SurfaceGuard};
pub use identity::{AccessToken, IdentityProvider, IdentityUser, StaticIdentityProvider};
pub use middleware::Middleware;
pub use profile::ProfileService;
pub use retry::RetryPolicy;
pub use routes::UserRoutes;
pub use session::SessionManager;
pub use types::{
    AuthRequest, AuthResponse, CreateProfile, CreateSession, CreateUser, HttpMethod,
    InvalidReason, NewSession, Profile, Session, SessionLookup, SessionStatus, UpdateProfile,
    UpdateProfileRequest, User,
};

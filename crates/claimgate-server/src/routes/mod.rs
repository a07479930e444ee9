//! API routes.

pub mod health;
pub mod userinfo;

pub use health::{AuthenticatorMode, CacheHealth, HealthResponse, health_routes};
pub use userinfo::{UserInfoResponse, userinfo_handler};

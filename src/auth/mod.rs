//! Authentication
//! Login, refresh, registration via invite, and bearer-token middleware.

pub mod api;
pub mod jwt;
pub mod middleware;
pub mod models;

pub use jwt::JwtHandler;
pub use middleware::auth_middleware;

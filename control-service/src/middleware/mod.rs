pub mod auth;
pub mod rate_limit;

pub use auth::{CurrentUser, session_auth_middleware};
pub use rate_limit::action_rate_limit_middleware;

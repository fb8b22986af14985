/// Middleware module
///
/// Custom middleware for authentication and role authorization.

mod jwt_middleware;
mod role_middleware;

pub use jwt_middleware::JwtMiddleware;
pub use role_middleware::RoleMiddleware;

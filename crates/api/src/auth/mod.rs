pub mod jwt;
pub mod principal;

pub use jwt::{Claims, JwtValidator};
pub use principal::{resolve_principal, verify_service_key};

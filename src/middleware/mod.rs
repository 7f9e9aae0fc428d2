pub mod auth;

pub use auth::{IdentityVerifier, JwtVerifier, SharedVerifier, User};

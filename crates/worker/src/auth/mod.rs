//! Credential acquisition and lifecycle
//!
//! Owns the bearer token used by the request pipeline:
//! - [`types`]: token and login-response shapes, expiry math
//! - [`manager`]: on-demand acquisition with single-flight refresh

pub mod manager;
pub mod types;

pub use manager::{AuthConfig, CredentialManager};
pub use types::{AccessToken, LoginResponse, REFRESH_BUFFER_SECONDS};

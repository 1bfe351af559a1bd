//! Access token types and expiry math
//!
//! A token is immutable once constructed; refresh replaces it wholesale. The
//! expiry timestamp is stamped at the moment the login response is received.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tokens whose remaining lifetime is at most this many seconds are
/// preemptively renewed; they remain usable until actual expiry.
pub const REFRESH_BUFFER_SECONDS: i64 = 300;

/// A bearer credential with expiry metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// Opaque access string presented to the API
    pub access_token: String,

    /// Authorization scheme label (typically "Bearer")
    pub token_type: String,

    /// Lifetime in seconds as reported by the auth endpoint
    pub expires_in: i64,

    /// Instant the login response was received
    pub issued_at: DateTime<Utc>,
}

impl AccessToken {
    /// Create a token stamped with the current instant.
    #[must_use]
    pub fn new(access_token: String, token_type: String, expires_in: i64) -> Self {
        Self { access_token, token_type, expires_in, issued_at: Utc::now() }
    }

    /// Absolute expiry instant (`issued_at + expires_in`).
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + chrono::Duration::seconds(self.expires_in)
    }

    /// Whether the token is expired or expires within `threshold_seconds`.
    #[must_use]
    pub fn is_expired(&self, threshold_seconds: i64) -> bool {
        Utc::now() + chrono::Duration::seconds(threshold_seconds) >= self.expires_at()
    }

    /// Whether the token has entered the refresh buffer.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.is_expired(REFRESH_BUFFER_SECONDS)
    }

    /// Seconds until expiry; negative once expired.
    #[must_use]
    pub fn seconds_until_expiry(&self) -> i64 {
        (self.expires_at() - Utc::now()).num_seconds()
    }

    /// Value for the `Authorization` header, e.g. `Bearer <token>`.
    #[must_use]
    pub fn authorization_value(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// Login response from the authentication endpoint
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl From<LoginResponse> for AccessToken {
    fn from(response: LoginResponse) -> Self {
        Self::new(response.access_token, response.token_type, response.expires_in)
    }
}

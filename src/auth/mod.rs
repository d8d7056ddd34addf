//! Authentication against the acces.sh API.

pub mod client;

pub use client::{
    authentication_url, validate_token, AuthenticationClient, AUTHENTICATION_PATH,
    MIN_TOKEN_LENGTH, USER_AGENT,
};

//! Per-session data owned by the lifecycle.

use std::fmt;

use crate::config::DaemonConfig;

/// Everything needed to authenticate and open the hub channel.
///
/// The lifecycle owns the only mutable copy. Scheduled tasks receive clones
/// taken at scheduling time.
#[derive(Clone, PartialEq)]
pub struct Session {
    pub server_url: String,
    pub hub_url: String,
    pub api_token: String,
    pub client_version: String,
    jwt: Option<String>,
}

impl Session {
    pub fn new(
        server_url: impl Into<String>,
        hub_url: impl Into<String>,
        api_token: impl Into<String>,
        client_version: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            hub_url: hub_url.into(),
            api_token: api_token.into(),
            client_version: client_version.into(),
            jwt: None,
        }
    }

    pub fn from_config(config: &DaemonConfig) -> Self {
        Self::new(
            config.server_url.clone(),
            config.hub_url.clone(),
            config.api_token.clone(),
            config.version.clone(),
        )
    }

    /// Session credential from the last successful authentication.
    pub fn jwt(&self) -> Option<&str> {
        self.jwt.as_deref()
    }

    /// Store the session credential. Returns false, leaving the stored
    /// value untouched, if one is already set.
    pub fn set_jwt(&mut self, jwt: String) -> bool {
        if self.jwt.is_some() {
            return false;
        }
        self.jwt = Some(jwt);
        true
    }

    /// Forget the session credential before re-authenticating.
    pub fn clear_jwt(&mut self) {
        self.jwt = None;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("server_url", &self.server_url)
            .field("hub_url", &self.hub_url)
            .field("api_token", &"<redacted>")
            .field("client_version", &self.client_version)
            .field("jwt", &self.jwt.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_is_write_once() {
        let mut session = Session::new("https://s", "https://h", "token", "1.0");
        assert_eq!(session.jwt(), None);
        assert!(session.set_jwt("first".to_string()));
        assert!(!session.set_jwt("second".to_string()));
        assert_eq!(session.jwt(), Some("first"));

        session.clear_jwt();
        assert!(session.set_jwt("third".to_string()));
        assert_eq!(session.jwt(), Some("third"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut session = Session::new("https://s", "https://h", "secret-token", "1.0");
        session.set_jwt("secret-jwt".to_string());
        let printed = format!("{:?}", session);
        assert!(!printed.contains("secret-token"));
        assert!(!printed.contains("secret-jwt"));
        assert!(printed.contains("https://s"));
    }
}

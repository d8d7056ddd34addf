//! Tungstenite-based hub adapter.
//!
//! Wraps [`HubClient`] behind the [`HubConnector`]/[`HubChannel`] traits.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::HubError;
use crate::hub::{HubClient, HubClientConfig, Invocation};
use crate::traits::{HubChannel, HubConnector, OpenChannel};

/// Opens hub connections over tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct TungsteniteHubConnector {
    connect_timeout: Duration,
}

impl TungsteniteHubConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl HubConnector for TungsteniteHubConnector {
    async fn connect(&self, hub_url: &str, access_token: &str) -> Result<OpenChannel, HubError> {
        let config =
            HubClientConfig::new(hub_url, access_token).with_connect_timeout(self.connect_timeout);
        let (client, events) = HubClient::connect(config).await?;
        Ok((Box::new(client), events))
    }
}

#[async_trait]
impl HubChannel for HubClient {
    async fn send(&self, invocation: Invocation) -> Result<(), HubError> {
        HubClient::send(self, invocation).await
    }

    async fn close(&self) -> Result<(), HubError> {
        HubClient::close(self).await
    }

    fn is_open(&self) -> bool {
        HubClient::is_open(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused_is_retryable() {
        let connector = TungsteniteHubConnector::new(Duration::from_secs(5));
        let result = connector.connect("http://127.0.0.1:59998/hub", "jwt").await;
        match result {
            Err(err) => assert!(err.is_retryable(), "unexpected {:?}", err),
            Ok(_) => panic!("connect should fail"),
        }
    }

    #[tokio::test]
    async fn test_connect_invalid_url_is_fatal() {
        let connector = TungsteniteHubConnector::new(Duration::from_secs(5));
        match connector.connect("hub", "jwt").await {
            Err(err) => assert!(matches!(err, HubError::InvalidUrl(_))),
            Ok(_) => panic!("connect should fail"),
        }
    }
}

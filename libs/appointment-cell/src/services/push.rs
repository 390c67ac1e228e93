// libs/appointment-cell/src/services/push.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::debug;

use shared_config::AppConfig;

/// Source of the device's push-messaging registration token.
#[async_trait]
pub trait PushTokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<String>;
}

/// Serves the registration token provisioned through configuration.
pub struct ConfiguredPushToken {
    token: Option<String>,
}

impl ConfiguredPushToken {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            token: config.push_registration_token.clone(),
        }
    }
}

#[async_trait]
impl PushTokenSource for ConfiguredPushToken {
    async fn fetch_token(&self) -> Result<String> {
        debug!("Fetching push registration token");
        self.token
            .clone()
            .ok_or_else(|| anyhow!("Push registration token is not configured"))
    }
}

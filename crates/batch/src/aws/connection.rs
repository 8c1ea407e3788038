//! Region and credential resolution into an SDK configuration.

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;

use crate::config::BatchConfig;

/// Connection settings shared by every AWS client the runner builds.
#[derive(Debug, Clone)]
pub struct Connection {
    region: String,
    access_key_id: Option<String>,
    secret_key_id: Option<String>,
    session_token: Option<String>,
    endpoint_override: Option<String>,
}

impl Connection {
    pub fn new(config: &BatchConfig) -> Self {
        Self {
            region: config.region.clone(),
            access_key_id: config.access_key_id.clone(),
            secret_key_id: config.secret_key_id.clone(),
            session_token: config.session_token.clone(),
            endpoint_override: config.endpoint_override.clone(),
        }
    }

    /// Resolve credentials and region into an SDK configuration.
    ///
    /// A static key/secret pair is used when both parts are
    /// configured; otherwise the ambient default provider chain
    /// applies.
    pub async fn sdk_config(&self) -> aws_config::SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()));

        if let (Some(key), Some(secret)) = (&self.access_key_id, &self.secret_key_id) {
            loader = loader.credentials_provider(Credentials::new(
                key.clone(),
                secret.clone(),
                self.session_token.clone(),
                None,
                "static",
            ));
        }
        if let Some(endpoint) = &self.endpoint_override {
            loader = loader.endpoint_url(endpoint);
        }

        loader.load().await
    }
}

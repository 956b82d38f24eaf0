use crate::shared::config::{ConfigError, OfflineConfig, OfflineConfigBuilder};

/// Client configuration: offline settings plus the session token
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    offline: OfflineConfig,
    token: Option<String>,
}

impl From<OfflineConfig> for ClientConfig {
    fn from(offline: OfflineConfig) -> Self {
        Self { offline, token: None }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builder(builder: OfflineConfigBuilder) -> Result<Self, ConfigError> {
        Ok(builder.build()?.into())
    }

    /// Load from `CLIENT_API_URL`, `OFFLINE_DB_PATH` and friends
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(OfflineConfig::from_env()?.into())
    }

    pub fn offline(&self) -> &OfflineConfig {
        &self.offline
    }

    /// Set the JWT token attached to credentialed requests
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn get_token(&self) -> Option<&String> {
        self.token.as_ref()
    }

    /// Clear the token (logout)
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        self.offline.api_url(path)
    }

    pub fn server_url(&self) -> &str {
        self.offline.server_url.trim_end_matches('/')
    }
}

//! Crate configuration.

use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_API_BASE_URL: &str = "https://api.moyo.app";

/// Configuration for the auth core, shared by the HTTP client and the
/// identity-verification adapter.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    api_base_url: String,
    request_timeout: Duration,
    pass_merchant_code: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(pass_merchant_code: String) -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            pass_merchant_code,
        }
    }

    #[must_use]
    pub fn with_api_base_url(mut self, base_url: String) -> Self {
        // Trailing slashes would double up when joining paths.
        self.api_base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    #[must_use]
    pub fn pass_merchant_code(&self) -> &str {
        &self.pass_merchant_code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = AuthConfig::new("imp00000000".to_string())
            .with_api_base_url("https://staging.moyo.app/".to_string());
        assert_eq!(config.api_base_url(), "https://staging.moyo.app");
    }

    #[test]
    fn defaults_apply() {
        let config = AuthConfig::new("imp00000000".to_string());
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.pass_merchant_code(), "imp00000000");
    }
}

//! Test configuration pointing the client at a mock API

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thingmirror::{ApiClient, ApiConfig, Config, Mirror, MirrorConfig, RetryConfig};
use wiremock::MockServer;

/// API key used by every test; must never show up in a snapshot
pub const TEST_API_KEY: &str = "test-key-123";

/// Configuration mirroring into `target` from `server`
pub fn test_config(target: &Path, server: &MockServer) -> Config {
    Config {
        mirror: MirrorConfig {
            target_dir: target.to_path_buf(),
            ..MirrorConfig::default()
        },
        api: ApiConfig {
            base_url: server.uri(),
            api_key: Some(TEST_API_KEY.to_string()),
            timeout: Duration::from_secs(5),
            ..ApiConfig::default()
        },
        retry: RetryConfig {
            max_attempts: 1,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            jitter: false,
        },
    }
}

/// Build a mirror backed by a real [`ApiClient`] from `config`
pub fn mirror_for(config: Config) -> Mirror {
    let api_key = config.resolve_api_key().expect("test config has a key");
    let client = Arc::new(
        ApiClient::new(&config.api, api_key, config.retry.clone()).expect("client builds"),
    );
    Mirror::with_client(config, client).expect("valid config")
}

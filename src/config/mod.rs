// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a file (YAML or JSON)
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let config: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&contents).context("Failed to parse YAML config")?
        }
        _ => serde_json::from_str(&contents).context("Failed to parse JSON config")?,
    };

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_json_config() {
        let path = std::env::temp_dir().join(format!("rr-balancer-{}.json", uuid::Uuid::new_v4()));
        let json = r#"{
            "listen": { "port": 4000 },
            "backends": [
                { "url": "http://127.0.0.1:4001" },
                { "url": "http://127.0.0.1:4002" }
            ],
            "retry": { "retry_delay_ms": 25 }
        }"#;
        tokio::fs::write(&path, json).await.unwrap();

        let config = load_config(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(config.listen.port, 4000);
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.retry.retry_delay_ms, 25);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[tokio::test]
    async fn test_invalid_config_is_fatal() {
        let path = std::env::temp_dir().join(format!("rr-balancer-{}.yaml", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, "backends: []\n").await.unwrap();

        let result = load_config(&path).await;
        tokio::fs::remove_file(&path).await.unwrap();

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_file() {
        assert!(load_config("/nonexistent/rr-balancer.yaml").await.is_err());
    }
}

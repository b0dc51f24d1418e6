//! Server configuration.

use std::path::PathBuf;

use axum::http::HeaderValue;

use resmatch_core::defaults;

/// Origins used when `ALLOWED_ORIGINS` is unset or empty.
const DEFAULT_ALLOWED_ORIGINS: &[&str] = &["http://localhost:3000", "http://localhost:5173"];

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding uploaded resumes until their job finishes.
    pub upload_dir: PathBuf,
    /// Per-file upload limit.
    pub max_upload_size_bytes: usize,
    /// Maximum resumes in one batch submission.
    pub max_batch_size: usize,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: defaults::SERVER_PORT,
            upload_dir: PathBuf::from(defaults::UPLOAD_DIR),
            max_upload_size_bytes: defaults::MAX_UPLOAD_SIZE_BYTES,
            max_batch_size: defaults::MAX_BATCH_SIZE,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `HOST` | `0.0.0.0` | Bind address |
    /// | `PORT` | `3000` | Bind port |
    /// | `UPLOAD_DIR` | `data/uploads` | Artifact directory |
    /// | `MAX_UPLOAD_SIZE_BYTES` | `5242880` | Per-file upload limit |
    /// | `MAX_BATCH_SIZE` | `50` | Resumes per batch |
    /// | `ALLOWED_ORIGINS` | localhost dev origins | Comma-separated CORS origins |
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(base.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(base.port),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(base.upload_dir),
            max_upload_size_bytes: std::env::var("MAX_UPLOAD_SIZE_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(base.max_upload_size_bytes),
            max_batch_size: std::env::var("MAX_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(base.max_batch_size)
                .max(1),
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .map(|v| split_origins(&v))
                .ok()
                .filter(|o| !o.is_empty())
                .unwrap_or(base.allowed_origins),
        }
    }

    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    pub fn with_max_upload_size_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_size_bytes = bytes;
        self
    }

    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max.max(1);
        self
    }

    /// Request body limit for a batch upload: every file at full size plus
    /// room for the job description and multipart framing.
    pub fn body_limit_bytes(&self) -> usize {
        self.max_upload_size_bytes
            .saturating_mul(self.max_batch_size)
            .saturating_add(1024 * 1024)
    }

    /// Configured origins as header values; invalid entries are dropped.
    pub fn cors_origins(&self) -> Vec<HeaderValue> {
        parse_allowed_origins(&self.allowed_origins.join(","))
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a comma-separated origin list.
///
/// An empty list falls back to the local development origins.
pub fn parse_allowed_origins(raw: &str) -> Vec<HeaderValue> {
    let origins = split_origins(raw);
    if origins.is_empty() {
        return DEFAULT_ALLOWED_ORIGINS
            .iter()
            .map(|s| HeaderValue::from_static(s))
            .collect();
    }

    origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("Invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_allowed_origins_trims_and_splits() {
        let origins = parse_allowed_origins("https://a.example, http://localhost:3000 ,");
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[0], "https://a.example");
        assert_eq!(origins[1], "http://localhost:3000");
    }

    #[test]
    fn test_parse_allowed_origins_empty_uses_defaults() {
        assert_eq!(parse_allowed_origins("  ").len(), DEFAULT_ALLOWED_ORIGINS.len());
    }

    #[test]
    fn test_parse_allowed_origins_drops_invalid() {
        let origins = parse_allowed_origins("https://ok.example,bad\norigin");
        assert_eq!(origins.len(), 1);
    }

    #[test]
    fn test_body_limit_scales_with_batch_size() {
        let config = ServerConfig::default()
            .with_max_upload_size_bytes(1000)
            .with_max_batch_size(3);
        assert_eq!(config.body_limit_bytes(), 3000 + 1024 * 1024);
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_upload_size_bytes, 5 * 1024 * 1024);
        assert_eq!(config.max_batch_size, 50);
    }
}

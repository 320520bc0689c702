//! Engine configuration.
//!
//! [`EngineConfig`] carries every size and policy knob of the engine. It is plain data with
//! defaults for every field, so a TOML file only needs to mention what it overrides:
//!
//! ```toml
//! block_size = 4096
//! response_buffer_size = 32768
//! server_header = "micro-h1"
//! ```
//!
//! A configuration is checked once by [`EngineConfig::validate`] before it is shared
//! (behind an `Arc`) by the buffer pool and every connection.

use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::ensure;
use crate::pool::CHUNK_HEADER_RESERVE;
use crate::response::OutputEncoding;

/// Largest block payload a 4 hex digit chunk header can describe.
pub const MAX_BLOCK_PAYLOAD: usize = 0xFFFF;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the request URI buffer, longer URIs are truncated.
    pub uri_buffer_size: usize,
    /// Capacity of the header char buffer holding keys, values and the URI host.
    pub header_buffer_size: usize,
    /// Maximum number of stored request headers.
    pub max_headers: usize,
    /// Upper bound of buffered bytes while a request head is incomplete.
    pub max_head_bytes: usize,
    /// Initial capacity of the connection read buffer.
    pub read_buffer_size: usize,
    /// Size of one pooled output block, including the 8 bytes reserved for chunk framing.
    pub block_size: usize,
    /// Bytes buffered before the response head is committed.
    pub response_buffer_size: usize,
    /// Capacity of the staging char buffer used by `print`.
    pub char_buffer_size: usize,
    pub max_idle_stores: usize,
    pub max_idle_blocks: usize,
    /// Requests served by one connection before it is closed, 0 disables keep-alive.
    pub keepalive_max_requests: usize,
    /// Swallow client disconnects instead of reporting them to the caller.
    pub ignore_client_disconnect: bool,
    /// Append `HttpOnly` to every cookie.
    pub cookie_http_only: bool,
    pub server_header: Option<String>,
    /// Largest response a cache tap may record.
    pub cache_max_length: u64,
    pub default_encoding: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            uri_buffer_size: 1024,
            header_buffer_size: 16 * 1024,
            max_headers: 128,
            max_head_bytes: 64 * 1024,
            read_buffer_size: 8 * 1024,
            block_size: 8 * 1024,
            response_buffer_size: 16 * 1024,
            char_buffer_size: 256,
            max_idle_stores: 64,
            max_idle_blocks: 256,
            keepalive_max_requests: 100,
            ignore_client_disconnect: true,
            cookie_http_only: false,
            server_header: None,
            cache_max_length: 1024 * 1024,
            default_encoding: "utf-8".to_owned(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read config file: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("can't parse config: {source}")]
    Parse {
        #[from]
        source: toml::de::Error,
    },

    #[error("invalid config `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid<S: ToString>(field: &'static str, reason: S) -> Self {
        Self::Invalid { field, reason: reason.to_string() }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] for malformed TOML and [`ConfigError::Invalid`] when a
    /// value fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    ///
    /// # Errors
    /// Same as [`EngineConfig::from_toml_str`], plus [`ConfigError::Io`] when the file
    /// can't be read.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Checks the invariants the engine relies on.
    ///
    /// # Errors
    /// Returns the first violated invariant as [`ConfigError::Invalid`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.block_size > CHUNK_HEADER_RESERVE,
            ConfigError::invalid("block_size", format!("must be larger than {CHUNK_HEADER_RESERVE}"))
        );
        ensure!(
            self.block_size <= MAX_BLOCK_PAYLOAD + CHUNK_HEADER_RESERVE,
            ConfigError::invalid("block_size", format!("payload can't exceed {MAX_BLOCK_PAYLOAD:#x} bytes"))
        );
        ensure!(self.uri_buffer_size > 0, ConfigError::invalid("uri_buffer_size", "must not be zero"));
        ensure!(self.header_buffer_size > 0, ConfigError::invalid("header_buffer_size", "must not be zero"));
        ensure!(self.max_headers > 0, ConfigError::invalid("max_headers", "must not be zero"));
        ensure!(self.char_buffer_size > 0, ConfigError::invalid("char_buffer_size", "must not be zero"));
        ensure!(self.read_buffer_size > 0, ConfigError::invalid("read_buffer_size", "must not be zero"));
        ensure!(
            self.max_head_bytes >= self.read_buffer_size,
            ConfigError::invalid("max_head_bytes", "must not be smaller than read_buffer_size")
        );
        OutputEncoding::for_label(&self.default_encoding)
            .map_err(|e| ConfigError::invalid("default_encoding", e))?;
        Ok(())
    }

    /// Payload bytes one output block can hold, at most [`MAX_BLOCK_PAYLOAD`].
    #[inline]
    pub fn block_payload(&self) -> usize {
        self.block_size.saturating_sub(CHUNK_HEADER_RESERVE).clamp(1, MAX_BLOCK_PAYLOAD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.block_payload(), 8 * 1024 - 8);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let str = indoc! {r#"
        block_size = 4096
        server_header = "micro-h1"
        ignore_client_disconnect = false
        "#};

        let config = EngineConfig::from_toml_str(str).unwrap();
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.server_header.as_deref(), Some("micro-h1"));
        assert!(!config.ignore_client_disconnect);
        assert_eq!(config.max_headers, EngineConfig::default().max_headers);
    }

    #[test]
    fn test_block_too_large() {
        let config = EngineConfig { block_size: MAX_BLOCK_PAYLOAD + CHUNK_HEADER_RESERVE + 1, ..EngineConfig::default() };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "block_size", .. }));

        let config = EngineConfig { block_size: MAX_BLOCK_PAYLOAD + CHUNK_HEADER_RESERVE, ..EngineConfig::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_encoding() {
        let err = EngineConfig::from_toml_str(r#"default_encoding = "koi8-r""#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "default_encoding", .. }));
    }

    #[test]
    fn test_malformed_toml() {
        let err = EngineConfig::from_toml_str("block_size = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("micro-h1-config-{}.toml", std::process::id()));
        fs::write(&path, "keepalive_max_requests = 3\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(config.keepalive_max_requests, 3);
    }

    #[test]
    fn test_load_missing_file() {
        let err = EngineConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

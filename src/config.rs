//!
//! Configuration objects
//! ---------------------
//! Explicit config structs constructed once by the binaries (flags with
//! env-var fallbacks) and passed down to the components that need them.
//! Nothing in this crate reads configuration from ambient global state.
//!
//! The shared secret ("salt") is a 64-character value, usually loaded from a
//! file. Its length and presence are validated here, at startup, so the
//! token module can assume a well-formed secret.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Required salt length after trimming surrounding whitespace.
pub const SALT_LENGTH: usize = 64;

/// Reference bound on concurrently in-flight server request handlers.
pub const DEFAULT_MAX_CONNECTIONS: usize = 100;

/// Default cap on concurrently running client downloads.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 8;

/// Default bounded retries per failing download.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Artifact extension served and reconciled by default.
pub const DEFAULT_ARTIFACT_EXTENSION: &str = "jar";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Parent of the `increment` / `decrement` watch directories.
    pub target_folder: PathBuf,
    pub port: u16,
    pub salt: String,
    /// Monitoring URL probed by the background heartbeat when set.
    pub heartbeat_url: Option<String>,
    pub max_connections: usize,
    pub artifact_extension: String,
    /// Request access log file, duplicated to the console.
    pub access_log_path: PathBuf,
}

impl ServerConfig {
    pub fn increment_dir(&self) -> PathBuf { self.target_folder.join("increment") }
    pub fn decrement_dir(&self) -> PathBuf { self.target_folder.join("decrement") }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URI the artifact bytes are downloaded from.
    pub resource_base: String,
    /// Local installation root.
    pub base_path: PathBuf,
    /// Inventory subdirectory under `base_path`.
    pub ref_path: String,
    /// Catalog endpoint host and port.
    pub endpoint_host: String,
    pub endpoint_port: u16,
    pub salt: String,
    pub download_concurrency: usize,
    pub retry_limit: u32,
    pub artifact_extension: String,
}

impl ClientConfig {
    /// Directory holding the local artifact inventory.
    pub fn inventory_dir(&self) -> PathBuf {
        self.base_path.join(&self.ref_path)
    }

    /// Catalog endpoint URL carrying the auth token.
    pub fn catalog_url(&self, auth_token: &str) -> String {
        format!(
            "http://{}:{}/?authToken={}",
            self.endpoint_host, self.endpoint_port, auth_token
        )
    }

    /// Download URL for one artifact.
    pub fn artifact_url(&self, file_name: &str) -> String {
        let base = self.resource_base.trim_end_matches('/');
        format!("{}/{}", base, file_name)
    }
}

/// Trim surrounding whitespace and require exactly [`SALT_LENGTH`] characters.
pub fn validate_salt(raw: &str) -> Result<String> {
    let salt = raw.trim();
    if salt.chars().count() != SALT_LENGTH {
        bail!(
            "salt value is not valid: length must be {} characters, got {}",
            SALT_LENGTH,
            salt.chars().count()
        );
    }
    Ok(salt.to_string())
}

/// Read and validate the salt from a file.
pub fn read_salt_file(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading salt file {}", path.display()))?;
    validate_salt(&raw).with_context(|| format!("salt file {}", path.display()))
}

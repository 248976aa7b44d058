// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Bridge Configuration Types
//
// Defines the configuration schema for a pod file bridge process:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Exec transport selection (Docker engine or local process)
// - Chunked transfer sizing and temp file placement
// - Session idle and revalidation windows

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::listing::TEXT_DETECTION_LIMIT;
use crate::domain::transfer::{TransferMode, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MAX_TEMP_DIR_LEN};

pub const API_VERSION: &str = "podfs.io/v1";
pub const KIND: &str = "BridgeConfig";

/// Top-level Kubernetes-style bridge configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfigManifest {
    /// API version (must be "podfs.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "BridgeConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: BridgeConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfigSpec {
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportBackend {
    /// Exec through the Docker engine API
    Docker,
    /// Run commands on this host (development only)
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_backend")]
    pub backend: TransportBackend,

    /// Path to Docker socket
    /// Default: auto-detect (DOCKER_HOST or the platform socket)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_socket_path: Option<String>,

    /// Container used when a session does not name one
    #[serde(default = "default_container")]
    pub default_container: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            docker_socket_path: None,
            default_container: default_container(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Raw bytes per base64 slice on the write path
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Bytes per stdin write when streaming through stdin
    #[serde(default = "default_stdin_slice_size")]
    pub stdin_slice_size: usize,

    /// Remote directory for upload temp files
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,

    #[serde(default)]
    pub mode: TransferMode,

    /// Files at or above this size skip MIME detection
    #[serde(default = "default_text_detection_limit")]
    pub text_detection_limit: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            stdin_slice_size: default_stdin_slice_size(),
            temp_dir: default_temp_dir(),
            mode: TransferMode::default(),
            text_detection_limit: default_text_detection_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions idle for longer than this are rejected and reaped
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// A successful pod check is trusted for this long
    #[serde(default = "default_freshness")]
    pub freshness_window_secs: u64,

    /// Period of the background sweep that drops idle sessions
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            freshness_window_secs: default_freshness(),
            reap_interval_secs: default_reap_interval(),
        }
    }
}

impl Default for BridgeConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "podfs-bridge".to_string(),
                version: Some("1.0.0".to_string()),
            },
            spec: BridgeConfigSpec::default(),
        }
    }
}

impl BridgeConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. PODFS_CONFIG_PATH environment variable
    /// 2. ./podfs-config.yaml (working directory)
    /// 3. ~/.podfs/config.yaml (user home)
    /// 4. /etc/podfs/config.yaml (system, Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("PODFS_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./podfs-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".podfs").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/podfs/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PODFS_CHUNK_SIZE") {
            match val.parse::<usize>() {
                Ok(size) if size > 0 => {
                    tracing::info!("Environment override: PODFS_CHUNK_SIZE={}", size);
                    self.spec.transfer.chunk_size = size;
                }
                _ => tracing::warn!(
                    "Invalid value for PODFS_CHUNK_SIZE: '{}'. Expected a positive integer. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("PODFS_TRANSFER_MODE") {
            match val.parse::<TransferMode>() {
                Ok(mode) => {
                    tracing::info!("Environment override: PODFS_TRANSFER_MODE={:?}", mode);
                    self.spec.transfer.mode = mode;
                }
                Err(e) => tracing::warn!("Invalid value for PODFS_TRANSFER_MODE: {}. Ignoring.", e),
            }
        }

        if let Ok(val) = std::env::var("PODFS_DOCKER_SOCKET") {
            if !val.is_empty() {
                tracing::info!("Environment override: PODFS_DOCKER_SOCKET={}", val);
                self.spec.transport.docker_socket_path = Some(val);
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let transfer = &self.spec.transfer;
        if transfer.chunk_size == 0 {
            anyhow::bail!("spec.transfer.chunk_size must be greater than zero");
        }
        if transfer.chunk_size > MAX_CHUNK_SIZE {
            anyhow::bail!(
                "spec.transfer.chunk_size {} exceeds the maximum of {} bytes per command line",
                transfer.chunk_size,
                MAX_CHUNK_SIZE
            );
        }
        if transfer.stdin_slice_size == 0 {
            anyhow::bail!("spec.transfer.stdin_slice_size must be greater than zero");
        }
        if !transfer.temp_dir.starts_with('/') {
            anyhow::bail!("spec.transfer.temp_dir must be an absolute path");
        }
        if transfer.temp_dir.len() > MAX_TEMP_DIR_LEN {
            anyhow::bail!(
                "spec.transfer.temp_dir is longer than {} bytes",
                MAX_TEMP_DIR_LEN
            );
        }

        if self.spec.transport.default_container.is_empty() {
            anyhow::bail!("spec.transport.default_container cannot be empty");
        }

        if self.spec.session.idle_timeout_secs == 0 {
            anyhow::bail!("spec.session.idle_timeout_secs must be greater than zero");
        }
        if self.spec.session.reap_interval_secs == 0 {
            anyhow::bail!("spec.session.reap_interval_secs must be greater than zero");
        }

        Ok(())
    }
}

fn default_backend() -> TransportBackend {
    TransportBackend::Docker
}

fn default_container() -> String {
    "main".to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_stdin_slice_size() -> usize {
    64 * 1024
}

fn default_temp_dir() -> String {
    "/tmp".to_string()
}

fn default_text_detection_limit() -> u64 {
    TEXT_DETECTION_LIMIT
}

fn default_idle_timeout() -> u64 {
    30 * 60
}

fn default_freshness() -> u64 {
    30
}

fn default_reap_interval() -> u64 {
    60
}

//! Notary configuration.
//!
//! Stored at `<config_dir>/pdf-notary/config.toml`. A missing file yields the
//! defaults; a file that exists but cannot be read or parsed is an error.

use crate::bridge::BridgeMode;
use crate::intake::MAX_FILE_SIZE;
use crate::preview::{DEFAULT_CACHE_PAGES, DEFAULT_SCALE, PreviewOptions};
use crate::session::SessionOptions;
use crate::wallet::{DynWalletProvider, IntoDynProvider, LocalKeyProvider, ProviderError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid wallet configuration: {0}")]
    Wallet(#[from] ProviderError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Largest accepted file in bytes.
    pub max_file_size: u64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        IntakeConfig {
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub scale: f64,
    /// Rendered pages kept in memory.
    pub cache_pages: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        PreviewConfig {
            scale: DEFAULT_SCALE,
            cache_pages: DEFAULT_CACHE_PAGES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub mode: BridgeMode,
    /// JSON-RPC endpoint of the wallet.
    pub rpc_url: Option<String>,
    /// Hex secp256k1 key for the in-process signer.
    pub dev_private_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotaryConfig {
    pub intake: IntakeConfig,
    pub preview: PreviewConfig,
    pub wallet: WalletConfig,
}

impl NotaryConfig {
    /// Default config path, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "pdf-notary")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Loads from `path`, or from the default location when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::info!("no config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let config = Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            max_file_size: self.intake.max_file_size,
            preview: PreviewOptions {
                scale: self.preview.scale,
                cache_pages: self.preview.cache_pages,
            },
            mode: self.wallet.mode,
        }
    }

    /// The wallet provider this config describes.
    ///
    /// An RPC URL wins over a development key; with neither, there is no
    /// provider.
    pub fn build_provider(&self) -> Result<Option<DynWalletProvider>, ConfigError> {
        if let Some(url) = self.wallet.rpc_url.as_deref().filter(|u| !u.is_empty()) {
            return rpc_provider(url).map(Some);
        }
        match self.wallet.dev_private_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => {
                let provider = LocalKeyProvider::from_hex(key)?;
                tracing::info!(account = %provider.address(), "using local development signer");
                Ok(Some(provider.into_dyn()))
            }
            None => Ok(None),
        }
    }
}

#[cfg(feature = "rpc")]
fn rpc_provider(url: &str) -> Result<DynWalletProvider, ConfigError> {
    let provider = crate::wallet::JsonRpcProvider::new(url)?;
    tracing::info!(url, "using JSON-RPC wallet");
    Ok(provider.into_dyn())
}

#[cfg(not(feature = "rpc"))]
fn rpc_provider(url: &str) -> Result<DynWalletProvider, ConfigError> {
    Err(ConfigError::Wallet(ProviderError::Transport(format!(
        "cannot use {}: built without the rpc feature",
        url
    ))))
}

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::Role;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Request header carrying the identity asserted by the fronting identity provider.
    /// If not set, identity claims are ignored and only tokens are honored.
    pub identity_header: Option<String>,
    /// Role given to the token minted with each new project.
    pub default_token_role: Role,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("atelier.db")
    }

    /// Reads a TOML config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ServerConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.message().to_string()))?;

        if let Some(header) = &config.identity_header {
            axum::http::HeaderName::from_bytes(header.as_bytes()).map_err(|_| {
                Error::Config(format!("identity_header '{header}' is not a valid header name"))
            })?;
        }

        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            identity_header: None,
            default_token_role: Role::Editor,
        }
    }
}

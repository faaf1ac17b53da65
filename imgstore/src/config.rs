//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `IMGSTORE_CONFIG`
//! environment variable. A missing file is not an error: every field has a default.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `IMGSTORE_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `IMGSTORE_STORAGE__ROOT=/srv/images` sets the `storage.root` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use imgstore::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Example
//!
//! ```yaml
//! port: 5000
//! storage:
//!   root: ./public/images
//!   public_prefix: /images
//! uploads:
//!   field_name: image
//!   max_file_size: 52428800
//! cors:
//!   allowed_origins:
//!     - http://localhost:5173
//!     - https://learnio-psi.vercel.app
//! ```

use axum::http::{HeaderName, Method};
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use crate::errors::Error;

/// Paths served by the router itself, which the public file prefix must stay clear of.
const RESERVED_PATHS: &[&str] = &["/upload", "/healthz", "/api-docs", "/internal"];

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "IMGSTORE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Where uploaded files are written and how they are addressed
    pub storage: StorageConfig,
    /// Upload endpoint settings
    pub uploads: UploadsConfig,
    /// Cross-origin policy applied to every route
    pub cors: CorsConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Blob storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Flat directory that receives every uploaded file
    pub root: PathBuf,
    /// URL path prefix under which stored files are addressed (no trailing slash)
    pub public_prefix: String,
    /// Create `root` on startup if it is missing
    pub create_root: bool,
    /// Serve stored files back under `public_prefix`
    pub serve_files: bool,
}

/// Upload endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    /// Multipart field that carries the file
    pub field_name: String,
    /// Maximum accepted file size in bytes
    pub max_file_size: u64,
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allowed request methods
    pub allowed_methods: Vec<String>,
    /// Allowed request headers
    pub allowed_headers: Vec<String>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// An allowed CORS origin.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

impl CorsOrigin {
    /// Value as it appears in an `Origin` request header (scheme, host and port, no path)
    pub fn header_value(&self) -> String {
        match self {
            CorsOrigin::Wildcard => "*".to_string(),
            CorsOrigin::Url(url) => url.origin().ascii_serialization(),
        }
    }
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            storage: StorageConfig::default(),
            uploads: UploadsConfig::default(),
            cors: CorsConfig::default(),
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./public/images"),
            public_prefix: "/images".to_string(),
            create_root: true,
            serve_files: true,
        }
    }
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            field_name: "image".to_string(),
            max_file_size: 50 * 1024 * 1024, // 50 MiB
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                CorsOrigin::Url(Url::parse("http://localhost:5173").expect("valid default origin")), // Development frontend (Vite)
                CorsOrigin::Url(Url::parse("https://learnio-psi.vercel.app").expect("valid default origin")),
            ],
            allowed_methods: ["GET", "POST", "PATCH", "PUT", "DELETE"].map(String::from).to_vec(),
            allowed_headers: ["Content-Type", "Authorization"].map(String::from).to_vec(),
            allow_credentials: false,
            max_age: None,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            // IMGSTORE_CONFIG names the file itself and is not a config key
            .merge(Env::prefixed("IMGSTORE_").ignore(&["config"]).split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Public path of a stored file, e.g. `/images/<storage_name>`
    pub fn public_path(&self, storage_name: &str) -> String {
        format!("{}/{}", self.storage.public_prefix, storage_name)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.uploads.field_name.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: uploads.field_name cannot be empty".to_string(),
            });
        }

        if self.uploads.max_file_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: uploads.max_file_size must be positive".to_string(),
            });
        }

        if usize::try_from(self.uploads.max_file_size).is_err() {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: uploads.max_file_size ({}) does not fit in memory addressing on this platform",
                    self.uploads.max_file_size
                ),
            });
        }

        let prefix = &self.storage.public_prefix;
        if !prefix.starts_with('/') || prefix.ends_with('/') {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: storage.public_prefix ({prefix:?}) must start with '/' and must not end with '/'"
                ),
            });
        }

        for reserved in RESERVED_PATHS {
            let collides = prefix
                .strip_prefix(reserved)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
            if collides {
                return Err(Error::Internal {
                    operation: format!("Config validation: storage.public_prefix ({prefix:?}) collides with the {reserved} route"),
                });
            }
        }

        if self.storage.root.as_os_str().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: storage.root cannot be empty".to_string(),
            });
        }

        // Validate CORS configuration
        if self.cors.allowed_origins.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: CORS allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            });
        }

        let has_wildcard = self.cors.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard));
        if has_wildcard && self.cors.allow_credentials {
            return Err(Error::Internal {
                operation: "Config validation: CORS wildcard origin '*' cannot be combined with allow_credentials".to_string(),
            });
        }

        for method in &self.cors.allowed_methods {
            if Method::from_bytes(method.as_bytes()).is_err() {
                return Err(Error::Internal {
                    operation: format!("Config validation: invalid CORS method {method:?}"),
                });
            }
        }

        for header in &self.cors.allowed_headers {
            if HeaderName::from_bytes(header.as_bytes()).is_err() {
                return Err(Error::Internal {
                    operation: format!("Config validation: invalid CORS header {header:?}"),
                });
            }
        }

        Ok(())
    }
}

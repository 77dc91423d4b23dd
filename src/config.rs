//! Configuration loading and types.
//!
//! Two layers live here.  [`VolumeSettings`] is what a host application
//! stores: raw strings, each of which may be indirected through an
//! environment variable.  [`ClientConfig`] and [`Credentials`] are the
//! resolved, validated values a [`crate::Client`] is built from.  The
//! translation between the two goes through a pluggable [`ValueResolver`],
//! so the client itself never interprets environment syntax.

use std::fmt;
use std::path::Path;

use garde::Validate;
use serde::Deserialize;
use tracing::warn;

use crate::errors::{ClientError, Result};
use crate::object::{Acl, CacheExpiry};
use crate::resolver::AddressingStyle;

// -- Resolved client configuration -------------------------------------------

/// Access key pair.  The secret never appears in `Debug` output.
#[derive(Clone, Validate)]
pub struct Credentials {
    #[garde(length(min = 1), pattern(r"\S"))]
    pub access_key_id: String,
    #[garde(length(min = 1))]
    pub secret_key: String,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Immutable, validated settings for one client instance.
#[derive(Debug, Clone, Validate)]
pub struct ClientConfig {
    /// Service endpoint, e.g. `https://nyc3.digitaloceanspaces.com`.
    #[garde(length(min = 1))]
    pub endpoint: String,

    /// Region used in the signing scope, e.g. `nyc3`.
    #[garde(length(min = 1))]
    pub region: String,

    /// Bucket (Space) name.
    #[garde(length(min = 3, max = 63), pattern(r"^[a-z0-9][a-z0-9.\-]*[a-z0-9]$"))]
    pub bucket: String,

    /// Path segment prepended to every key.  Empty for none.
    #[garde(skip)]
    pub subfolder: String,

    /// ACL applied to uploads without an explicit override.
    #[garde(skip)]
    pub default_acl: Acl,

    /// Relative cache lifetime for uploads.  `None` disables cache headers.
    #[garde(skip)]
    pub cache_expiry: Option<CacheExpiry>,

    /// `Content-Disposition` applied to uploads, e.g. `attachment`.
    #[garde(skip)]
    pub content_disposition: Option<String>,

    /// Virtual-hosted or path-style addressing.
    #[garde(skip)]
    pub addressing: AddressingStyle,

    /// Public base URL (CDN or custom domain) objects are served from.
    #[garde(skip)]
    pub public_url: Option<String>,

    /// HTTP transport tuning.
    #[garde(dive)]
    pub transport: TransportConfig,

    /// Page size for listings (`max-keys`).
    #[garde(range(min = 1, max = 1000))]
    pub list_page_size: u32,
}

impl ClientConfig {
    /// Configuration with the given endpoint, region and bucket and
    /// defaults for everything else.
    pub fn new(
        endpoint: impl Into<String>,
        region: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: region.into(),
            bucket: bucket.into(),
            subfolder: String::new(),
            default_acl: Acl::default(),
            cache_expiry: None,
            content_disposition: None,
            addressing: AddressingStyle::default(),
            public_url: None,
            transport: TransportConfig::default(),
            list_page_size: default_list_page_size(),
        }
    }

    pub fn with_subfolder(mut self, subfolder: impl Into<String>) -> Self {
        self.subfolder = subfolder.into();
        self
    }

    pub fn with_default_acl(mut self, acl: Acl) -> Self {
        self.default_acl = acl;
        self
    }

    pub fn with_cache_expiry(mut self, expiry: Option<CacheExpiry>) -> Self {
        self.cache_expiry = expiry;
        self
    }

    pub fn with_content_disposition(mut self, disposition: impl Into<String>) -> Self {
        self.content_disposition = Some(disposition.into());
        self
    }

    pub fn with_addressing(mut self, addressing: AddressingStyle) -> Self {
        self.addressing = addressing;
        self
    }

    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = Some(url.into());
        self
    }

    pub fn with_list_page_size(mut self, size: u32) -> Self {
        self.list_page_size = size;
        self
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Run field validation, reporting every violation at once.
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|report| ClientError::Config(report.to_string()))
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TransportConfig {
    /// Whole-request timeout in seconds, body transfer included.
    #[serde(default = "default_request_timeout")]
    #[garde(range(min = 1))]
    pub request_timeout_secs: u64,

    /// TCP/TLS connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    #[garde(range(min = 1))]
    pub connect_timeout_secs: u64,

    /// How long idle pooled connections are kept.
    #[serde(default = "default_pool_idle_timeout")]
    #[garde(skip)]
    pub pool_idle_timeout_secs: u64,

    /// Maximum idle connections kept per host.
    #[serde(default = "default_pool_max_idle")]
    #[garde(skip)]
    pub pool_max_idle_per_host: usize,

    /// `User-Agent` sent with every request.
    #[serde(default = "default_user_agent")]
    #[garde(skip)]
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            pool_idle_timeout_secs: default_pool_idle_timeout(),
            pool_max_idle_per_host: default_pool_max_idle(),
            user_agent: default_user_agent(),
        }
    }
}

// -- Value resolution ----------------------------------------------------------

/// Resolves a raw configured string into its effective value.
///
/// Hosts inject their own indirection scheme (environment variables,
/// secrets stores, aliases).  Closures of type
/// `Fn(&str) -> Result<String>` implement the trait too.
pub trait ValueResolver: Send + Sync {
    fn resolve(&self, raw: &str) -> Result<String>;
}

impl<F> ValueResolver for F
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    fn resolve(&self, raw: &str) -> Result<String> {
        self(raw)
    }
}

/// Uses every value verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainResolver;

impl ValueResolver for PlainResolver {
    fn resolve(&self, raw: &str) -> Result<String> {
        Ok(raw.to_string())
    }
}

/// Replaces values of the form `$NAME` or `${NAME}` with the environment
/// variable `NAME`.  Anything else is used verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvResolver;

impl ValueResolver for EnvResolver {
    fn resolve(&self, raw: &str) -> Result<String> {
        let trimmed = raw.trim();
        let name = trimmed
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
            .or_else(|| trimmed.strip_prefix('$'));

        match name {
            Some(name) if is_env_name(name) => std::env::var(name).map_err(|_| {
                ClientError::Config(format!("environment variable {name} is not set"))
            }),
            _ => Ok(raw.to_string()),
        }
    }
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// -- Host-facing settings ------------------------------------------------------

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// The storage volume: bucket, credentials, upload defaults.
    pub storage: VolumeSettings,

    /// HTTP transport settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Resolve the storage settings into a client configuration.
    pub fn client_config(
        &self,
        resolver: &dyn ValueResolver,
    ) -> Result<(ClientConfig, Credentials)> {
        let (config, credentials) = self.storage.resolve(resolver)?;
        Ok((config.with_transport(self.transport.clone()), credentials))
    }
}

/// Raw volume settings as a host application stores them.
///
/// Every string may be an indirection such as `$SPACES_SECRET`; see
/// [`ValueResolver`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VolumeSettings {
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub region: String,

    #[serde(default)]
    pub bucket: String,

    /// Access key ID (also accepts `key_id`).
    #[serde(alias = "key_id", default)]
    pub access_key: String,

    /// Secret key (also accepts `secret`).
    #[serde(alias = "secret", default)]
    pub secret_key: String,

    #[serde(default)]
    pub subfolder: String,

    /// Cache period such as `2 weeks`.  Empty or invalid disables caching.
    #[serde(default)]
    pub expires: String,

    /// `inline`, `attachment`, or empty.
    #[serde(default)]
    pub content_disposition: String,

    /// `private` or `public-read` (also accepts `asset_permissions`).
    #[serde(alias = "asset_permissions", default)]
    pub acl: String,

    /// Public base URL objects are served from.
    #[serde(default)]
    pub public_url: String,

    /// Use path-style addressing instead of virtual-hosted buckets.
    #[serde(default)]
    pub path_style: bool,

    #[serde(default = "default_list_page_size")]
    pub list_page_size: u32,
}

impl VolumeSettings {
    /// Resolve every field through `resolver` and validate the result.
    pub fn resolve(&self, resolver: &dyn ValueResolver) -> Result<(ClientConfig, Credentials)> {
        let value = |raw: &str| -> Result<String> {
            if raw.trim().is_empty() {
                return Ok(String::new());
            }
            resolver.resolve(raw).map(|v| v.trim().to_string())
        };

        let endpoint = value(&self.endpoint)?;
        let region = value(&self.region)?;
        let bucket = value(&self.bucket)?;
        let credentials = Credentials::new(value(&self.access_key)?, value(&self.secret_key)?);

        let acl = value(&self.acl)?;
        let default_acl = if acl.is_empty() {
            Acl::default()
        } else {
            acl.parse()?
        };

        let expires = value(&self.expires)?;
        let cache_expiry = if expires.is_empty() {
            None
        } else {
            let parsed = CacheExpiry::parse(&expires);
            if parsed.is_none() {
                warn!(
                    "Ignoring cache expiry {:?}: not a positive duration, cache headers disabled",
                    expires
                );
            }
            parsed
        };

        let content_disposition = value(&self.content_disposition)?;
        let content_disposition = match content_disposition.to_ascii_lowercase().as_str() {
            "" => None,
            "inline" | "attachment" => Some(content_disposition.to_ascii_lowercase()),
            _ => {
                return Err(ClientError::Config(format!(
                    "content disposition must be inline or attachment, got {content_disposition:?}"
                )))
            }
        };
        let public_url = Some(value(&self.public_url)?).filter(|v| !v.is_empty());

        let config = ClientConfig {
            endpoint,
            region,
            bucket,
            subfolder: value(&self.subfolder)?,
            default_acl,
            cache_expiry,
            content_disposition,
            addressing: if self.path_style {
                AddressingStyle::Path
            } else {
                AddressingStyle::VirtualHosted
            },
            public_url,
            transport: TransportConfig::default(),
            list_page_size: self.list_page_size,
        };

        config.check()?;
        credentials
            .validate()
            .map_err(|report| ClientError::Config(format!("credentials: {report}")))?;

        Ok((config, credentials))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_request_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_pool_idle_timeout() -> u64 {
    90
}

fn default_pool_max_idle() -> usize {
    16
}

fn default_user_agent() -> String {
    concat!("spaces-client/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_list_page_size() -> u32 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

// -- Tests -------------------------------------------------------------------

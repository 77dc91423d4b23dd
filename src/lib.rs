//! spaces-client: S3-compatible object storage client.
//!
//! A self-contained client for DigitalOcean Spaces and any other service
//! speaking the S3 REST API: SigV4 request signing, endpoint and key
//! resolution, a pooled HTTP transport, object operations, and a typed
//! error taxonomy.  The [`config`] module turns host-level settings into a
//! validated [`ClientConfig`].
//!
//! ```no_run
//! use spaces_client::{Client, ClientConfig, Credentials, PutRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> spaces_client::Result<()> {
//! let config = ClientConfig::new("https://nyc3.digitaloceanspaces.com", "nyc3", "my-space")
//!     .with_subfolder("uploads");
//! let client = Client::new(config, Credentials::new("AKID", "SECRET"))?;
//!
//! let cancel = CancellationToken::new();
//! client.put(PutRequest::new("hello.txt", "hello world"), &cancel).await?;
//! let _body = client.get("hello.txt", &cancel).await?.bytes().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod object;
pub mod resolver;
pub mod signer;
pub mod transport;
pub mod xml;

#[cfg(test)]
mod testing;

pub use client::Client;
pub use config::{
    ClientConfig, Config, Credentials, EnvResolver, PlainResolver, TransportConfig, ValueResolver,
    VolumeSettings,
};
pub use errors::{ClientError, Result};
pub use object::{
    Acl, CacheExpiry, ObjectListing, ObjectMetadata, ObjectStream, PutPayload, PutRequest,
};
pub use resolver::AddressingStyle;

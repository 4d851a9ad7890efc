//! Reading sources from local paths or URLs.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use crate::error::LoadError;
use anyhow::Result;
use flate2::read::GzDecoder;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Where a source is read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceLocation {
    Path(PathBuf),
    Url(String),
}

impl SourceLocation {
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            SourceLocation::Url(raw.to_string())
        } else {
            SourceLocation::Path(PathBuf::from(raw))
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::Path(path) => write!(f, "{}", path.display()),
            SourceLocation::Url(url) => f.write_str(url),
        }
    }
}

/// Identifies one version of a source: its location plus its raw content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceIdentity {
    pub location: SourceLocation,
    pub len: usize,
    pub content_hash: u64,
}

/// Decoded contents of a source together with its identity.
#[derive(Debug, Clone)]
pub struct SourceBytes {
    pub identity: SourceIdentity,
    pub bytes: Vec<u8>,
}

impl SourceBytes {
    /// Wraps raw bytes, gunzipping them when they carry the gzip magic.
    pub fn new(location: SourceLocation, raw: Vec<u8>) -> Result<Self, LoadError> {
        let mut hasher = DefaultHasher::new();
        raw.hash(&mut hasher);
        let identity = SourceIdentity {
            len: raw.len(),
            content_hash: hasher.finish(),
            location,
        };

        let bytes = if raw.starts_with(&GZIP_MAGIC) {
            let mut out = Vec::new();
            GzDecoder::new(raw.as_slice())
                .read_to_end(&mut out)
                .map_err(|err| LoadError::Unreadable {
                    location: identity.location.to_string(),
                    message: format!("gzip: {}", err),
                })?;
            debug!(location = %identity.location, compressed = raw.len(), decoded = out.len(), "Decompressed source");
            out
        } else {
            raw
        };

        Ok(Self { identity, bytes })
    }
}

/// GETs `url`, failing on non-success status codes.
pub async fn fetch_bytes<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

/// Reads a source from disk or over HTTP.
#[tracing::instrument(skip_all, fields(location = %location))]
pub async fn read_source<C: HttpClient + ?Sized>(
    client: &C,
    location: &SourceLocation,
) -> Result<SourceBytes, LoadError> {
    let raw = match location {
        SourceLocation::Path(path) => tokio::fs::read(path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                LoadError::MissingInput(location.to_string())
            } else {
                LoadError::Unreadable {
                    location: location.to_string(),
                    message: err.to_string(),
                }
            }
        })?,
        SourceLocation::Url(url) => {
            fetch_bytes(client, url)
                .await
                .map_err(|err| LoadError::Unreadable {
                    location: location.to_string(),
                    message: format!("{:#}", err),
                })?
        }
    };

    debug!(bytes = raw.len(), "Read source");
    SourceBytes::new(location.clone(), raw)
}

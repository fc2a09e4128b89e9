use crate::types::{Result, SourceSnapshot};
use async_trait::async_trait;
use bytes::Bytes;

/// Reads raw bytes from a source locator (`file://` or `http(s)://`).
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<Bytes>;
}

/// Looks up a source's current payload by name.
#[async_trait]
pub trait Sourcer: Send + Sync {
    async fn get_source(&self, name: &str) -> Result<SourceSnapshot>;
}

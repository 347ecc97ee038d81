//! Object storage collaborator contract.
//!
//! The core never moves media bytes itself; it only issues time-bounded
//! direct-upload locations and renders public URLs for derived objects.

pub mod signer;

use crate::error::CoreResult;
use async_trait::async_trait;
use std::time::Duration;

pub use signer::SignedUrlStorage;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// A write location for `object` the client can PUT to for `ttl`
    async fn signed_upload_url(&self, object: &str, ttl: Duration) -> CoreResult<String>;

    /// Stable public read URL for `object`
    fn public_url(&self, object: &str) -> String;
}

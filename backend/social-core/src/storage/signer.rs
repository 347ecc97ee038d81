//! HMAC-SHA256 signed upload URLs.
//!
//! URL format: `https://{domain}/{bucket}/{object}?exp={unix}&sig={hex}`.
//! The signature covers `{bucket}/{object}:{exp}`, so neither the target
//! object nor the expiry can be swapped without invalidating the URL.

use super::ObjectStorage;
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct SignedUrlStorage {
    secret_key: String,
    domain: String,
    bucket: String,
}

impl SignedUrlStorage {
    pub fn new(secret_key: String, domain: String, bucket: String) -> Self {
        Self {
            secret_key,
            domain,
            bucket,
        }
    }

    /// Check an upload URL produced by this signer: signature must match and
    /// the expiry must be in the future
    pub fn verify_upload_url(&self, url: &str) -> CoreResult<()> {
        let (path, query) = url
            .strip_prefix(&format!("https://{}/", self.domain))
            .and_then(|rest| rest.split_once('?'))
            .ok_or_else(|| CoreError::InvalidRequest("malformed upload URL".to_string()))?;

        let mut exp: Option<u64> = None;
        let mut sig: Option<&str> = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("exp", v)) => exp = v.parse().ok(),
                Some(("sig", v)) => sig = Some(v),
                _ => {}
            }
        }
        let exp =
            exp.ok_or_else(|| CoreError::InvalidRequest("missing exp parameter".to_string()))?;
        let sig =
            sig.ok_or_else(|| CoreError::InvalidRequest("missing sig parameter".to_string()))?;

        if unix_now()? > exp {
            return Err(CoreError::InvalidRequest("upload URL expired".to_string()));
        }

        let expected = self.compute_signature(&format!("{}:{}", path, exp))?;
        if sig != expected {
            return Err(CoreError::InvalidRequest("invalid signature".to_string()));
        }
        Ok(())
    }

    fn compute_signature(&self, payload: &str) -> CoreResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| CoreError::Internal(format!("hmac key error: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

fn unix_now() -> CoreResult<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| CoreError::Internal(format!("time error: {}", e)))?
        .as_secs())
}

#[async_trait]
impl ObjectStorage for SignedUrlStorage {
    async fn signed_upload_url(&self, object: &str, ttl: Duration) -> CoreResult<String> {
        let expiration = unix_now()? + ttl.as_secs();
        let path = format!("{}/{}", self.bucket, object);
        let signature = self.compute_signature(&format!("{}:{}", path, expiration))?;
        Ok(format!(
            "https://{}/{}?exp={}&sig={}",
            self.domain, path, expiration, signature
        ))
    }

    fn public_url(&self, object: &str) -> String {
        format!("https://{}/{}/{}", self.domain, self.bucket, object)
    }
}

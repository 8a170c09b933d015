//! Local MD5 matching with remote confirmation

use async_trait::async_trait;
use ::md5::{Digest, Md5};
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::CheckService;
use crate::error::{KeyforgeError, Result};
use crate::types::CheckVerdict;

/// Raw MD5 digest
pub type Md5Digest = [u8; 16];

/// `CheckService` that treats the remote target as an MD5 hex digest
///
/// Candidates are hashed locally; the remote service only sees a candidate
/// whose digest matches, and its verdict is final.
pub struct Md5CheckService {
    remote: Arc<dyn CheckService>,
    digest: OnceCell<Md5Digest>,
}

impl Md5CheckService {
    /// Fetch the digest from `remote` on first use
    pub fn new(remote: Arc<dyn CheckService>) -> Self {
        Self {
            remote,
            digest: OnceCell::new(),
        }
    }

    /// Use a known digest instead of fetching one
    pub fn with_digest(remote: Arc<dyn CheckService>, digest: &str) -> Result<Self> {
        Ok(Self {
            remote,
            digest: OnceCell::new_with(Some(parse_digest(digest)?)),
        })
    }

    async fn digest(&self) -> Result<&Md5Digest> {
        self.digest
            .get_or_try_init(|| async {
                let target = self.remote.fetch_target().await?;
                parse_digest(&target)
            })
            .await
    }
}

/// Parse a 32-character hex MD5 digest, either case
pub fn parse_digest(text: &str) -> Result<Md5Digest> {
    let mut digest = [0u8; 16];
    hex::decode_to_slice(text.trim(), &mut digest).map_err(|e| {
        KeyforgeError::protocol(
            format!("Target is not an MD5 hex digest: {}", e),
            Some(text.to_string()),
        )
    })?;
    Ok(digest)
}

pub fn md5_matches(candidate: &str, digest: &Md5Digest) -> bool {
    Md5::digest(candidate.as_bytes()).as_slice() == digest.as_slice()
}

#[async_trait]
impl CheckService for Md5CheckService {
    async fn prepare(&self) -> Result<()> {
        self.remote.prepare().await?;
        self.digest().await.map(|_| ())
    }

    async fn fetch_target(&self) -> Result<String> {
        Ok(hex::encode(self.digest().await?))
    }

    async fn check(&self, candidate: &str) -> Result<CheckVerdict> {
        let digest = self.digest().await?;
        if !md5_matches(candidate, digest) {
            return Ok(CheckVerdict::Failure);
        }

        tracing::info!(candidate = %candidate, "Digest matched, confirming with service");
        self.remote.check(candidate).await
    }
}

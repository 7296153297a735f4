//! Image fetching with the driver's pull policy.
//!
//! Task-container images are always pulled so that only callers whose
//! credentials authorize the image can run it; a cached copy pulled by
//! another tenant must not be reusable. Infrastructure images are pulled
//! conditionally: when missing locally, when tagged `latest`, or when the
//! caller forces it.

use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::client::RuntimeClient;
use crate::error::Result;
use crate::registry::{self, DockerConfig};

/// Idempotent image puller.
pub struct ImageFetcher {
    client: Arc<dyn RuntimeClient>,
}

impl ImageFetcher {
    pub fn new(client: Arc<dyn RuntimeClient>) -> Self {
        Self { client }
    }

    /// Fetches an image, copying the engine's pull progress to `out`.
    ///
    /// The pull is skipped when the image already exists locally, is not
    /// tagged `latest` and `always_fetch` is false. Credentials are resolved
    /// from `config` by registry host; unknown registries pull anonymously.
    pub async fn fetch(
        &self,
        image: &str,
        always_fetch: bool,
        config: Option<&DockerConfig>,
        out: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()> {
        let auth = registry::resolve_auth(image, config)?;
        let tag = registry::tag_or_digest(image)?;

        let exists = !self.client.image_list(image).await?.is_empty();

        // fetch only if forced, tagged latest or not present locally
        if !always_fetch && tag != "latest" && exists {
            debug!(image, "image already present, skipping pull");
            return Ok(());
        }

        debug!(image, always_fetch, "pulling image");
        let mut progress = self.client.image_pull(image, &auth).await?;
        while let Some(chunk) = progress.next().await {
            out.write_all(&chunk?).await?;
        }
        Ok(())
    }
}

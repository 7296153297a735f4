//! Pod-scoped volume management.
//!
//! Every pod owns exactly two volumes, co-created with the pod and
//! co-destroyed on remove: the read-only toolbox volume (seeded once with the
//! in-container helper) and the read-write project volume used as the task
//! workspace. Both are labelled with the full driver label set so discovery
//! can reattach them to their pod.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::AsyncWrite;
use tracing::debug;

use crate::client::{RuntimeClient, VolumeInfo};
use crate::constants::{
    AGOLA_LABEL_KEY, AGOLA_LABEL_VALUE, EXECUTOR_ID_KEY, POD_ID_KEY, PROJECT_VOLUME_NAME,
    TOOLBOX_VOLUME_NAME, VOLUME_NAME_KEY,
};
use crate::error::Result;
use crate::image::ImageFetcher;
use crate::registry::DockerConfig;
use crate::toolbox::ToolboxSeeder;

/// Creates, labels and removes the two pod-scoped volumes.
pub struct VolumeManager {
    client: Arc<dyn RuntimeClient>,
    executor_id: String,
    init_image: String,
    init_registry_config: Option<DockerConfig>,
    fetcher: ImageFetcher,
    seeder: ToolboxSeeder,
}

impl VolumeManager {
    pub fn new(
        client: Arc<dyn RuntimeClient>,
        executor_id: String,
        init_image: String,
        init_registry_config: Option<DockerConfig>,
        fetcher: ImageFetcher,
        seeder: ToolboxSeeder,
    ) -> Self {
        Self {
            client,
            executor_id,
            init_image,
            init_registry_config,
            fetcher,
            seeder,
        }
    }

    fn volume_labels(&self, pod_id: &str, volume_name: &str) -> HashMap<String, String> {
        HashMap::from([
            (AGOLA_LABEL_KEY.to_string(), AGOLA_LABEL_VALUE.to_string()),
            (EXECUTOR_ID_KEY.to_string(), self.executor_id.clone()),
            (POD_ID_KEY.to_string(), pod_id.to_string()),
            (VOLUME_NAME_KEY.to_string(), volume_name.to_string()),
        ])
    }

    /// Creates the read-write project volume for a pod.
    pub async fn create_project_volume(&self, pod_id: &str) -> Result<VolumeInfo> {
        let volume = self
            .client
            .volume_create(self.volume_labels(pod_id, PROJECT_VOLUME_NAME))
            .await?;
        debug!(pod = pod_id, volume = %volume.name, "created project volume");
        Ok(volume)
    }

    /// Creates and seeds the read-only toolbox volume for a pod.
    ///
    /// Pulls the init image first (conditional policy: only when missing or
    /// tagged `latest`), copying pull progress to `out`, then delegates
    /// population to the seeder. The volume is populated exactly once per
    /// pod; toolbox volumes are never reused across pods.
    pub async fn create_toolbox_volume(
        &self,
        pod_id: &str,
        out: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<VolumeInfo> {
        self.fetcher
            .fetch(
                &self.init_image,
                false,
                self.init_registry_config.as_ref(),
                out,
            )
            .await?;

        let volume = self
            .client
            .volume_create(self.volume_labels(pod_id, TOOLBOX_VOLUME_NAME))
            .await?;

        self.seeder.seed(&volume.name).await?;
        debug!(pod = pod_id, volume = %volume.name, "created and seeded toolbox volume");
        Ok(volume)
    }

    /// Force-removes a volume by name.
    pub async fn remove_volume(&self, name: &str) -> Result<()> {
        self.client.volume_remove(name, true).await
    }
}

//! The pod runtime view and its lifecycle operations.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::client::{MountPoint, RuntimeClient};
use crate::constants::{CONTAINER_STOP_TIMEOUT, TASK_ID_KEY};
use crate::error::{Errors, Result};

/// A running pod: an ordered set of containers sharing the main container's
/// network namespace plus the pod's toolbox and project volumes.
///
/// The container list and name map are immutable after construction; the
/// only mutation a pod supports is spawning execs inside member containers.
pub struct Pod {
    pub(crate) id: String,
    pub(crate) client: Arc<dyn RuntimeClient>,
    pub(crate) executor_id: String,
    /// Pod-wide labels, mirrored from the index-0 container and restricted
    /// to the driver's label prefix.
    pub(crate) labels: HashMap<String, String>,
    /// Member containers in ascending index order.
    pub(crate) containers: Vec<PodContainer>,
    /// Name → position in `containers`. The empty-string key aliases the
    /// main container.
    pub(crate) containers_map: HashMap<String, usize>,
    /// Empty when the volume was not discovered (orphaned pods).
    pub(crate) toolbox_volume_name: String,
    pub(crate) project_volume_name: String,
    /// Mount path of the toolbox volume inside containers; empty on pods
    /// rehydrated from discovery.
    pub(crate) init_volume_dir: String,
}

/// One container of a pod.
#[derive(Debug, Clone)]
pub struct PodContainer {
    /// Position within the pod; 0 is the main container.
    pub index: i32,
    /// Runtime handle.
    pub id: String,
    /// Logical name; empty for unnamed sidecars.
    pub name: String,
    /// Mount points, sorted by destination path.
    pub mounts: Vec<MountPoint>,
}

impl Pod {
    /// Returns the pod identity.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the identity of the executor owning this pod.
    #[must_use]
    pub fn executor_id(&self) -> &str {
        &self.executor_id
    }

    /// Returns the upstream task identity, taken from the pod labels.
    #[must_use]
    pub fn task_id(&self) -> &str {
        self.labels.get(TASK_ID_KEY).map_or("", String::as_str)
    }

    /// Returns the pod-wide labels.
    #[must_use]
    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    /// Returns the member containers in ascending index order.
    #[must_use]
    pub fn containers(&self) -> &[PodContainer] {
        &self.containers
    }

    /// Looks up a member container by name; the empty name resolves to the
    /// main container.
    #[must_use]
    pub fn container(&self, name: &str) -> Option<&PodContainer> {
        self.containers_map
            .get(name)
            .map(|&pos| &self.containers[pos])
    }

    /// Gracefully stops every member container.
    ///
    /// Each container gets a one second graceful timeout before the runtime
    /// escalates to kill. Individual failures do not short-circuit; all of
    /// them are reported as one aggregate error.
    pub async fn stop(&self) -> Result<()> {
        debug!(pod = %self.id, "stopping pod");
        let mut errs = Errors::new();
        for container in &self.containers {
            if let Err(err) = self
                .client
                .container_stop(&container.id, CONTAINER_STOP_TIMEOUT)
                .await
            {
                errs.push(err);
            }
        }
        errs.into_result()
    }

    /// Force-removes every member container and both pod volumes.
    ///
    /// Best effort: every removal is attempted and failures are aggregated,
    /// so a second remove of an already-gone pod reports the missing
    /// resources but leaves the runtime in the same state.
    pub async fn remove(&self) -> Result<()> {
        debug!(pod = %self.id, "removing pod");
        let mut errs = Errors::new();
        for container in &self.containers {
            if let Err(err) = self.client.container_remove(&container.id, true).await {
                errs.push(err);
            }
        }
        if !self.toolbox_volume_name.is_empty()
            && let Err(err) = self
                .client
                .volume_remove(&self.toolbox_volume_name, true)
                .await
        {
            errs.push(err);
        }
        if !self.project_volume_name.is_empty()
            && let Err(err) = self
                .client
                .volume_remove(&self.project_volume_name, true)
                .await
        {
            errs.push(err);
        }
        errs.into_result()
    }
}

impl std::fmt::Debug for Pod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pod")
            .field("id", &self.id)
            .field("executor_id", &self.executor_id)
            .field("containers", &self.containers)
            .field("toolbox_volume_name", &self.toolbox_volume_name)
            .field("project_volume_name", &self.project_volume_name)
            .finish_non_exhaustive()
    }
}

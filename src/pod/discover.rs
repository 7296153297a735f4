//! Label-based pod discovery.
//!
//! Rebuilds the pod view from runtime listings alone. Only containers and
//! volumes whose executor label matches this driver are considered; pods
//! containing any container without a parseable index label are tainted and
//! dropped wholesale, since acting on them would be unsafe.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::warn;

use crate::client::{ContainerSummary, RuntimeClient, VolumeInfo};
use crate::constants::{
    CONTAINER_INDEX_KEY, CONTAINER_NAME_KEY, EXECUTOR_ID_KEY, LABEL_PREFIX, POD_ID_KEY,
    PROJECT_VOLUME_NAME, TOOLBOX_VOLUME_NAME, VOLUME_NAME_KEY,
};
use crate::pod::{Pod, PodContainer};

/// Restricts a container label map to the driver's pod-wide labels: only
/// keys under the driver prefix, excluding the per-container name label.
pub(crate) fn pod_labels(labels: &HashMap<String, String>) -> HashMap<String, String> {
    labels
        .iter()
        .filter(|(k, _)| k.starts_with(LABEL_PREFIX) && k.as_str() != CONTAINER_NAME_KEY)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[derive(Default)]
struct PodParts {
    containers: Vec<PodContainer>,
    labels: HashMap<String, String>,
    toolbox_volume_name: String,
    project_volume_name: String,
}

/// Regroups runtime listings into pods, keyed by the pod-id label.
///
/// Pure over its inputs: the client handle is only stored on the returned
/// pods for their later lifecycle calls.
pub(crate) fn assemble_pods(
    client: &Arc<dyn RuntimeClient>,
    executor_id: &str,
    containers: Vec<ContainerSummary>,
    volumes: Vec<VolumeInfo>,
) -> Vec<Pod> {
    let mut parts: HashMap<String, PodParts> = HashMap::new();
    let mut tainted: HashSet<String> = HashSet::new();

    for container in containers {
        if container.labels.get(EXECUTOR_ID_KEY).map(String::as_str) != Some(executor_id) {
            continue;
        }
        let Some(pod_id) = container.labels.get(POD_ID_KEY) else {
            continue;
        };

        let index = container
            .labels
            .get(CONTAINER_INDEX_KEY)
            .and_then(|s| s.parse::<i32>().ok());
        let Some(index) = index else {
            // one unlabelled container taints the whole pod
            warn!(
                pod = %pod_id,
                container = %container.id,
                "dropping pod: container has no parseable index label"
            );
            tainted.insert(pod_id.clone());
            continue;
        };

        let pod = parts.entry(pod_id.clone()).or_default();

        let mut mounts = container.mounts;
        mounts.sort_by(|a, b| a.destination.cmp(&b.destination));

        if index == 0 {
            pod.labels = pod_labels(&container.labels);
        }

        pod.containers.push(PodContainer {
            index,
            id: container.id,
            name: container
                .labels
                .get(CONTAINER_NAME_KEY)
                .cloned()
                .unwrap_or_default(),
            mounts,
        });
    }

    for pod_id in &tainted {
        parts.remove(pod_id);
    }

    for volume in volumes {
        if volume.labels.get(EXECUTOR_ID_KEY).map(String::as_str) != Some(executor_id) {
            continue;
        }
        let Some(pod_id) = volume.labels.get(POD_ID_KEY) else {
            continue;
        };
        // volumes whose pod is absent are left for a later reconciliation
        let Some(pod) = parts.get_mut(pod_id) else {
            continue;
        };
        match volume.labels.get(VOLUME_NAME_KEY).map(String::as_str) {
            Some(TOOLBOX_VOLUME_NAME) => pod.toolbox_volume_name = volume.name,
            Some(PROJECT_VOLUME_NAME) => pod.project_volume_name = volume.name,
            _ => {}
        }
    }

    parts
        .into_iter()
        .map(|(pod_id, mut pod)| {
            pod.containers.sort_by_key(|c| c.index);

            let mut containers_map = HashMap::new();
            for (pos, container) in pod.containers.iter().enumerate() {
                if !container.name.is_empty() {
                    containers_map.insert(container.name.clone(), pos);
                }
                if container.index == 0 {
                    containers_map.insert(String::new(), pos);
                }
            }

            Pod {
                id: pod_id,
                client: client.clone(),
                executor_id: executor_id.to_string(),
                labels: pod.labels,
                containers: pod.containers,
                containers_map,
                toolbox_volume_name: pod.toolbox_volume_name,
                project_volume_name: pod.project_volume_name,
                init_volume_dir: String::new(),
            }
        })
        .collect()
}

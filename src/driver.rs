//! The executor pod driver.
//!
//! Turns a [`PodConfig`] into running containers on the local runtime and
//! rehydrates existing pods from label-based discovery. The driver owns a
//! single host: the executor group and executor list both collapse to its
//! own identity, and the offered architectures are exactly the local one.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncWrite;
use tracing::{debug, info};

use crate::client::{ContainerCreateSpec, MountSpec, NetworkMode, RuntimeClient, VolumeInfo};
use crate::constants::{
    AGOLA_LABEL_KEY, AGOLA_LABEL_VALUE, CONTAINER_INDEX_KEY, CONTAINER_NAME_KEY,
    DEFAULT_PROJECT_DIR, EXECUTOR_ID_KEY, MAIN_CONTAINER_NAME, POD_ID_KEY, TASK_ID_KEY,
};
use crate::error::{Error, Result};
use crate::image::ImageFetcher;
use crate::platform::Arch;
use crate::pod::{assemble_pods, make_env, pod_labels, Pod, PodConfig, PodContainer};
use crate::registry::DockerConfig;
use crate::toolbox::ToolboxSeeder;
use crate::volume::VolumeManager;

/// Driver configuration.
#[derive(Debug, Clone, Default)]
pub struct DriverConfig {
    /// Identity of this driver instance; the ownership boundary for every
    /// runtime object it touches.
    pub executor_id: String,
    /// Directory holding the per-architecture toolbox binaries.
    pub toolbox_dir: PathBuf,
    /// Image used to seed toolbox volumes.
    pub init_image: String,
    /// Credentials for pulling the init image.
    pub init_registry_config: Option<DockerConfig>,
    /// Network joined by every main container; `None` uses the runtime
    /// default.
    pub network: Option<String>,
}

/// The executor pod driver.
///
/// Safe to share across concurrent callers: it holds only the runtime client
/// handle, its identity and immutable configuration.
pub struct Driver {
    client: Arc<dyn RuntimeClient>,
    executor_id: String,
    arch: Arch,
    network: Option<String>,
    fetcher: ImageFetcher,
    volumes: VolumeManager,
}

impl Driver {
    /// Creates a driver over a runtime client.
    pub fn new(client: Arc<dyn RuntimeClient>, config: DriverConfig) -> Self {
        let arch = Arch::detect();
        let fetcher = ImageFetcher::new(client.clone());
        let seeder = ToolboxSeeder::new(
            client.clone(),
            config.toolbox_dir,
            config.init_image.clone(),
            arch,
        );
        let volumes = VolumeManager::new(
            client.clone(),
            config.executor_id.clone(),
            config.init_image,
            config.init_registry_config,
            ImageFetcher::new(client.clone()),
            seeder,
        );
        Self {
            client,
            executor_id: config.executor_id,
            arch,
            network: config.network,
            fetcher,
            volumes,
        }
    }

    /// One-time setup hook; nothing to do for the local runtime.
    pub async fn setup(&self) -> Result<()> {
        Ok(())
    }

    /// Returns the architectures this driver can run tasks on: the local one.
    #[must_use]
    pub fn archs(&self) -> Vec<Arch> {
        vec![self.arch]
    }

    /// Returns the executor group; a single-node driver uses its own
    /// identity.
    #[must_use]
    pub fn executor_group(&self) -> String {
        self.executor_id.clone()
    }

    /// Returns the executors of the group: just this driver.
    #[must_use]
    pub fn get_executors(&self) -> Vec<String> {
        vec![self.executor_id.clone()]
    }

    fn container_labels(&self, config: &PodConfig) -> HashMap<String, String> {
        HashMap::from([
            (AGOLA_LABEL_KEY.to_string(), AGOLA_LABEL_VALUE.to_string()),
            (EXECUTOR_ID_KEY.to_string(), self.executor_id.clone()),
            (POD_ID_KEY.to_string(), config.id.clone()),
            (TASK_ID_KEY.to_string(), config.task_id.clone()),
        ])
    }

    /// Creates and starts all containers of a pod, returning the assembled
    /// pod view.
    ///
    /// Volumes are created first (toolbox, then project), then containers
    /// start in declaration order, each sidecar joining the main container's
    /// network namespace. The result is re-read from the runtime by label so
    /// the returned pod reflects what discovery will later observe. On
    /// failure no rollback is performed; orphaned resources are reconciled
    /// by later [`Driver::get_pods`] and [`Pod::remove`] calls.
    pub async fn new_pod(
        &self,
        config: &PodConfig,
        out: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<Pod> {
        if config.containers.is_empty() {
            return Err(Error::BadInput("empty container config".to_string()));
        }

        info!(pod = %config.id, task = %config.task_id, "creating pod");

        let toolbox_vol = self.volumes.create_toolbox_volume(&config.id, out).await?;
        let project_vol = self.volumes.create_project_volume(&config.id).await?;

        let mut main_container_id = String::new();
        for index in 0..config.containers.len() {
            let container_id = self
                .create_container(
                    index,
                    config,
                    &main_container_id,
                    &toolbox_vol,
                    &project_vol,
                    out,
                )
                .await?;

            if index == 0 {
                main_container_id = container_id.clone();
            }

            self.client.container_start(&container_id).await?;
            debug!(pod = %config.id, container = %container_id, index, "started container");
        }

        // Labels are the source of truth: re-read the members so the
        // returned pod matches what a later discovery would observe.
        let search_labels = self.container_labels(config);
        let listed = self.client.container_list(&search_labels, false).await?;

        let mut members: Vec<PodContainer> = Vec::new();
        let mut seen_indexes: HashSet<i32> = HashSet::new();
        let mut labels = HashMap::new();
        for container in listed {
            let Some(index) = container
                .labels
                .get(CONTAINER_INDEX_KEY)
                .and_then(|s| s.parse::<i32>().ok())
            else {
                continue;
            };
            if !seen_indexes.insert(index) {
                return Err(Error::Inconsistent(format!(
                    "duplicate container with index {index}"
                )));
            }
            if index == 0 {
                labels = pod_labels(&container.labels);
            }

            let mut mounts = container.mounts;
            mounts.sort_by(|a, b| a.destination.cmp(&b.destination));

            members.push(PodContainer {
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

        if members.len() != config.containers.len() {
            return Err(Error::Inconsistent(format!(
                "expected {} containers but got {}",
                config.containers.len(),
                members.len()
            )));
        }

        members.sort_by_key(|c| c.index);
        for (pos, member) in members.iter().enumerate() {
            if member.index != pos as i32 {
                return Err(Error::Inconsistent(format!(
                    "container indices are not contiguous: missing index {pos}"
                )));
            }
        }

        let mut containers_map = HashMap::new();
        for (pos, member) in members.iter().enumerate() {
            if !member.name.is_empty() {
                containers_map.insert(member.name.clone(), pos);
            }
        }
        // the main container is the first one
        containers_map.insert(String::new(), 0);

        info!(pod = %config.id, containers = members.len(), "pod running");

        Ok(Pod {
            id: config.id.clone(),
            client: self.client.clone(),
            executor_id: self.executor_id.clone(),
            labels,
            containers: members,
            containers_map,
            toolbox_volume_name: toolbox_vol.name,
            project_volume_name: project_vol.name,
            init_volume_dir: config.init_volume_dir.clone(),
        })
    }

    async fn create_container(
        &self,
        index: usize,
        config: &PodConfig,
        main_container_id: &str,
        toolbox_vol: &VolumeInfo,
        project_vol: &VolumeInfo,
        out: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<String> {
        let container_config = &config.containers[index];

        // Task images are always pulled, so only callers whose credentials
        // authorize the image can run it; a copy cached by another tenant
        // must not be enough.
        self.fetcher
            .fetch(
                &container_config.image,
                true,
                config.registry_config.as_ref(),
                out,
            )
            .await?;

        let name = if container_config.name.is_empty() && index == 0 {
            MAIN_CONTAINER_NAME.to_string()
        } else {
            container_config.name.clone()
        };

        let mut labels = self.container_labels(config);
        labels.insert(CONTAINER_INDEX_KEY.to_string(), index.to_string());
        labels.insert(CONTAINER_NAME_KEY.to_string(), name.clone());

        let network = if index == 0 {
            match &self.network {
                Some(network) => NetworkMode::Network(network.clone()),
                None => NetworkMode::Default,
            }
        } else {
            // sidecars join the main container's network namespace
            NetworkMode::SharedWith(main_container_id.to_string())
        };

        let mut mounts = Vec::new();
        if !name.is_empty() {
            mounts.push(MountSpec::Volume {
                source: toolbox_vol.name.clone(),
                target: config.init_volume_dir.clone(),
                read_only: true,
            });
            mounts.push(MountSpec::Volume {
                source: project_vol.name.clone(),
                target: DEFAULT_PROJECT_DIR.to_string(),
                read_only: false,
            });
        }
        for volume in &container_config.volumes {
            match &volume.tmpfs {
                Some(tmpfs) => mounts.push(MountSpec::Tmpfs {
                    target: volume.path.clone(),
                    size_bytes: tmpfs.size,
                }),
                None => {
                    return Err(Error::BadInput(format!(
                        "missing tmpfs config for volume at {:?}; only tmpfs volumes are supported",
                        volume.path
                    )));
                }
            }
        }

        let spec = ContainerCreateSpec {
            image: container_config.image.clone(),
            entrypoint: container_config.cmd.clone(),
            env: make_env(&container_config.env),
            working_dir: container_config.working_dir.clone(),
            user: container_config.user.clone(),
            tty: true,
            privileged: container_config.privileged,
            labels,
            network,
            mounts,
        };

        self.client.container_create(spec).await
    }

    /// Rehydrates the pods owned by this executor from runtime state.
    ///
    /// `all` includes stopped containers. Pods with any container missing a
    /// parseable index label are dropped; volumes whose pod is absent are
    /// ignored until a later remove reconciles them.
    pub async fn get_pods(&self, all: bool) -> Result<Vec<Pod>> {
        let containers = self.client.container_list(&HashMap::new(), all).await?;
        let volumes = self.client.volume_list().await?;
        Ok(assemble_pods(
            &self.client,
            &self.executor_id,
            containers,
            volumes,
        ))
    }
}

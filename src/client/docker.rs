//! Docker engine implementation of [`RuntimeClient`].
//!
//! Targets the API shape of a Docker-compatible engine at wire version
//! >= 1.26, reached through the local socket. All engine specifics stay in
//! this module: the `container:<id>` network-mode string, the stream
//! multiplex framing of non-TTY attaches (demultiplexed by bollard into
//! per-stream frames) and the `X-Registry-Auth` credential handoff.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::exec::{StartExecOptions, StartExecResults};
use bollard::models::{
    ContainerCreateBody, ExecConfig, HostConfig, Mount, MountTmpfsOptions, MountTypeEnum,
    VolumeCreateOptions,
};
use bollard::query_parameters::{
    CreateImageOptionsBuilder, ListContainersOptionsBuilder, ListImagesOptionsBuilder,
    ListVolumesOptions, RemoveContainerOptionsBuilder, RemoveVolumeOptionsBuilder,
    StartContainerOptions, StopContainerOptionsBuilder, UploadToContainerOptionsBuilder,
};
use bytes::Bytes;
use futures::StreamExt;

use crate::client::{
    ContainerCreateSpec, ContainerSummary, ExecCreateSpec, ExecInspect, ExecOutput, ExecStream,
    MountPoint, MountSpec, NetworkMode, PullProgress, RuntimeClient, VolumeInfo,
};
use crate::error::{Error, Result};
use crate::registry::RegistryAuth;

/// Docker engine client.
///
/// Cheap to clone; all clones share the underlying connection pool. The
/// engine client is safe for concurrent use, so a single [`DockerClient`] is
/// shared by every pod the driver owns.
#[derive(Clone)]
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Connects to the local engine socket using the environment defaults.
    pub fn new() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|err| Error::runtime("failed to connect to container engine", err))?;
        Ok(Self { docker })
    }

    /// Wraps an already-connected engine client.
    #[must_use]
    pub fn with_docker(docker: Docker) -> Self {
        Self { docker }
    }
}

fn map_engine_error(context: &str, err: BollardError) -> Error {
    if let BollardError::DockerResponseServerError {
        status_code: 404,
        message,
    } = &err
    {
        return Error::NotFound(format!("{context}: {message}"));
    }
    Error::runtime(context, err)
}

fn label_filters(label_filter: &HashMap<String, String>) -> HashMap<String, Vec<String>> {
    let labels: Vec<String> = label_filter
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    if labels.is_empty() {
        HashMap::new()
    } else {
        HashMap::from([("label".to_string(), labels)])
    }
}

fn convert_mounts(mounts: Vec<MountSpec>) -> Vec<Mount> {
    mounts
        .into_iter()
        .map(|mount| match mount {
            MountSpec::Volume {
                source,
                target,
                read_only,
            } => Mount {
                typ: Some(MountTypeEnum::VOLUME),
                source: Some(source),
                target: Some(target),
                read_only: Some(read_only),
                ..Mount::default()
            },
            MountSpec::Tmpfs { target, size_bytes } => Mount {
                typ: Some(MountTypeEnum::TMPFS),
                target: Some(target),
                tmpfs_options: Some(MountTmpfsOptions {
                    size_bytes: Some(size_bytes),
                    ..MountTmpfsOptions::default()
                }),
                ..Mount::default()
            },
        })
        .collect()
}

fn convert_mount_points(mounts: Option<Vec<bollard::models::MountPoint>>) -> Vec<MountPoint> {
    mounts
        .unwrap_or_default()
        .into_iter()
        .map(|m| MountPoint {
            source: m.name.or(m.source).unwrap_or_default(),
            destination: m.destination.unwrap_or_default(),
            read_only: !m.rw.unwrap_or(true),
        })
        .collect()
}

fn convert_credentials(auth: &RegistryAuth) -> DockerCredentials {
    let opt = |s: &String| {
        if s.is_empty() {
            None
        } else {
            Some(s.clone())
        }
    };
    DockerCredentials {
        username: opt(&auth.username),
        password: opt(&auth.password),
        auth: opt(&auth.auth),
        email: opt(&auth.email),
        identitytoken: opt(&auth.identitytoken),
        registrytoken: opt(&auth.registrytoken),
        ..DockerCredentials::default()
    }
}

#[async_trait]
impl RuntimeClient for DockerClient {
    async fn image_list(&self, reference: &str) -> Result<Vec<String>> {
        let filters = HashMap::from([("reference".to_string(), vec![reference.to_string()])]);
        let options = ListImagesOptionsBuilder::new().filters(&filters).build();
        let images = self
            .docker
            .list_images(Some(options))
            .await
            .map_err(|err| map_engine_error("failed to list images", err))?;
        Ok(images.into_iter().map(|img| img.id).collect())
    }

    async fn image_pull(&self, image: &str, auth: &RegistryAuth) -> Result<PullProgress> {
        let options = CreateImageOptionsBuilder::new().from_image(image).build();
        let credentials = convert_credentials(auth);
        let progress = self
            .docker
            .create_image(Some(options), None, Some(credentials))
            .map(|item| match item {
                Ok(info) => {
                    let mut line = serde_json::to_vec(&info).unwrap_or_default();
                    line.push(b'\n');
                    Ok(Bytes::from(line))
                }
                Err(err) => Err(map_engine_error("image pull failed", err)),
            })
            .boxed();
        Ok(progress)
    }

    async fn volume_create(&self, labels: HashMap<String, String>) -> Result<VolumeInfo> {
        let volume = self
            .docker
            .create_volume(VolumeCreateOptions {
                driver: Some("local".to_string()),
                labels: Some(labels),
                ..VolumeCreateOptions::default()
            })
            .await
            .map_err(|err| map_engine_error("failed to create volume", err))?;
        Ok(VolumeInfo {
            name: volume.name,
            labels: volume.labels,
        })
    }

    async fn volume_list(&self) -> Result<Vec<VolumeInfo>> {
        let response = self
            .docker
            .list_volumes(None::<ListVolumesOptions>)
            .await
            .map_err(|err| map_engine_error("failed to list volumes", err))?;
        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|v| VolumeInfo {
                name: v.name,
                labels: v.labels,
            })
            .collect())
    }

    async fn volume_remove(&self, name: &str, force: bool) -> Result<()> {
        let options = RemoveVolumeOptionsBuilder::new().force(force).build();
        self.docker
            .remove_volume(name, Some(options))
            .await
            .map_err(|err| map_engine_error(&format!("failed to remove volume {name}"), err))
    }

    async fn container_create(&self, spec: ContainerCreateSpec) -> Result<String> {
        let network_mode = match spec.network {
            NetworkMode::Default => None,
            NetworkMode::Network(name) => Some(name),
            NetworkMode::SharedWith(id) => Some(format!("container:{id}")),
        };
        let mounts = convert_mounts(spec.mounts);

        let host_config = HostConfig {
            privileged: Some(spec.privileged),
            network_mode,
            mounts: if mounts.is_empty() {
                None
            } else {
                Some(mounts)
            },
            ..HostConfig::default()
        };

        let body = ContainerCreateBody {
            image: Some(spec.image),
            entrypoint: Some(spec.entrypoint),
            env: Some(spec.env),
            working_dir: if spec.working_dir.is_empty() {
                None
            } else {
                Some(spec.working_dir)
            },
            user: if spec.user.is_empty() {
                None
            } else {
                Some(spec.user)
            },
            tty: Some(spec.tty),
            labels: Some(spec.labels),
            host_config: Some(host_config),
            ..ContainerCreateBody::default()
        };

        let response = self
            .docker
            .create_container(
                None::<bollard::query_parameters::CreateContainerOptions>,
                body,
            )
            .await
            .map_err(|err| map_engine_error("failed to create container", err))?;
        Ok(response.id)
    }

    async fn container_start(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await
            .map_err(|err| map_engine_error(&format!("failed to start container {id}"), err))
    }

    async fn container_stop(&self, id: &str, timeout: Duration) -> Result<()> {
        let options = StopContainerOptionsBuilder::new()
            .t(timeout.as_secs() as i32)
            .build();
        self.docker
            .stop_container(id, Some(options))
            .await
            .map_err(|err| map_engine_error(&format!("failed to stop container {id}"), err))
    }

    async fn container_remove(&self, id: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptionsBuilder::new().force(force).build();
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|err| map_engine_error(&format!("failed to remove container {id}"), err))
    }

    async fn container_list(
        &self,
        label_filter: &HashMap<String, String>,
        all: bool,
    ) -> Result<Vec<ContainerSummary>> {
        let filters = label_filters(label_filter);
        let options = ListContainersOptionsBuilder::new()
            .all(all)
            .filters(&filters)
            .build();
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|err| map_engine_error("failed to list containers", err))?;
        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                labels: c.labels.unwrap_or_default(),
                mounts: convert_mount_points(c.mounts),
            })
            .collect())
    }

    async fn copy_into(&self, id: &str, dest_dir: &str, archive: Bytes) -> Result<()> {
        let options = UploadToContainerOptionsBuilder::new().path(dest_dir).build();
        self.docker
            .upload_to_container(id, Some(options), bollard::body_full(archive))
            .await
            .map_err(|err| map_engine_error(&format!("failed to copy into container {id}"), err))
    }

    async fn exec_create(&self, container_id: &str, spec: ExecCreateSpec) -> Result<String> {
        let config = ExecConfig {
            cmd: Some(spec.cmd),
            user: if spec.user.is_empty() {
                None
            } else {
                Some(spec.user)
            },
            tty: Some(spec.tty),
            attach_stdin: Some(spec.attach_stdin),
            attach_stdout: Some(spec.attach_stdout),
            attach_stderr: Some(spec.attach_stderr),
            ..ExecConfig::default()
        };
        let response = self
            .docker
            .create_exec(container_id, config)
            .await
            .map_err(|err| map_engine_error("failed to create exec", err))?;
        Ok(response.id)
    }

    async fn exec_attach(&self, exec_id: &str, tty: bool) -> Result<ExecStream> {
        let results = self
            .docker
            .start_exec(
                exec_id,
                Some(StartExecOptions {
                    detach: false,
                    tty,
                    ..StartExecOptions::default()
                }),
            )
            .await
            .map_err(|err| map_engine_error("failed to attach exec", err))?;

        match results {
            StartExecResults::Attached { output, input } => {
                let output = output
                    .filter_map(|item| {
                        futures::future::ready(match item {
                            Ok(LogOutput::StdOut { message })
                            | Ok(LogOutput::Console { message }) => {
                                Some(Ok(ExecOutput::Stdout(message)))
                            }
                            Ok(LogOutput::StdErr { message }) => {
                                Some(Ok(ExecOutput::Stderr(message)))
                            }
                            Ok(LogOutput::StdIn { .. }) => None,
                            Err(err) => Some(Err(map_engine_error("exec stream failed", err))),
                        })
                    })
                    .boxed();
                Ok(ExecStream { output, input })
            }
            StartExecResults::Detached => Err(Error::Inconsistent(
                "exec attach returned a detached stream".to_string(),
            )),
        }
    }

    async fn exec_inspect(&self, exec_id: &str) -> Result<ExecInspect> {
        let response = self
            .docker
            .inspect_exec(exec_id)
            .await
            .map_err(|err| map_engine_error("failed to inspect exec", err))?;
        Ok(ExecInspect {
            running: response.running.unwrap_or(false),
            exit_code: response.exit_code,
        })
    }
}

//! # agola-driver
//!
//! **Executor pod driver for a Docker-compatible container runtime.**
//!
//! This crate turns an abstract task description (a *pod* of cooperating
//! containers sharing network and storage) into running workloads on a local
//! container runtime, and marshals streaming command execution, output
//! multiplexing and orderly teardown.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           Driver                                 │
//! │   new_pod(config) ─▶ volumes ─▶ containers ─▶ discovery ─▶ Pod   │
//! │   get_pods(all)   ─▶ label-filtered listing  ─▶ [Pod]            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   Pod                                                            │
//! │   ├── containers (index 0 = main, owns the pod network)          │
//! │   ├── toolbox volume (ro, seeded helper) / project volume (rw)   │
//! │   ├── exec(config) ─▶ ContainerExec (streams, stdin, wait)       │
//! │   └── stop() / remove()   (best effort, aggregated errors)       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   RuntimeClient trait                                            │
//! │   containers │ volumes │ images │ exec │ copy-in                 │
//! │        └── DockerClient (bollard, engine API >= 1.26)            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Pod Model
//!
//! The index-0 container is the **main container**: it owns the pod's
//! network namespace (every sidecar joins it) and its labels are mirrored as
//! the pod-wide labels. All driver-owned runtime objects carry a label set
//! under the `agola.io/` prefix; labels, not an in-memory registry, are the
//! source of truth, so [`Driver::get_pods`] rebuilds pods purely from
//! runtime state across driver restarts.
//!
//! Every pod owns two volumes, co-created with the pod and destroyed by
//! [`Pod::remove`]: the read-only *toolbox* volume, seeded once from the
//! init image with the `agola-toolbox` helper binary, and the read-write
//! *project* volume used as the task workspace.
//!
//! # Exec Sessions
//!
//! [`Pod::exec`] always wraps the user command in the toolbox helper
//! (`agola-toolbox exec -e <env-json> -w <dir> -- <cmd>`) so environment and
//! working directory apply uniformly across runtime versions. The session
//! exposes demultiplexed stdout/stderr sinks, a half-closable stdin and a
//! [`ContainerExec::wait`] that polls the final exit code and honors
//! cancellation.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use agola_driver::{Driver, DriverConfig, DockerClient, PodConfig, ContainerConfig};
//!
//! #[tokio::main]
//! async fn main() -> agola_driver::Result<()> {
//!     let client = Arc::new(DockerClient::new()?);
//!     let driver = Driver::new(client, DriverConfig {
//!         executor_id: "executor-01".to_string(),
//!         toolbox_dir: "/usr/local/lib/agola".into(),
//!         init_image: "busybox:stable".to_string(),
//!         ..DriverConfig::default()
//!     });
//!
//!     let mut out = tokio::io::stdout();
//!     let pod = driver
//!         .new_pod(
//!             &PodConfig {
//!                 id: "pod-1".to_string(),
//!                 task_id: "task-1".to_string(),
//!                 init_volume_dir: "/mnt/agola".to_string(),
//!                 containers: vec![ContainerConfig {
//!                     image: "alpine:3".to_string(),
//!                     cmd: vec!["sh".to_string()],
//!                     ..ContainerConfig::default()
//!                 }],
//!                 registry_config: None,
//!             },
//!             &mut out,
//!         )
//!         .await?;
//!
//!     pod.stop().await?;
//!     pod.remove().await?;
//!     Ok(())
//! }
//! ```

mod constants;
mod driver;
mod error;
mod image;
mod platform;
mod registry;
mod toolbox;
mod volume;

/// Runtime capability interface and the Docker engine implementation.
pub mod client;

/// Pods, their configuration and exec sessions.
pub mod pod;

pub use client::DockerClient;
pub use constants::{
    AGOLA_LABEL_KEY, AGOLA_LABEL_VALUE, CONTAINER_INDEX_KEY, CONTAINER_NAME_KEY,
    DEFAULT_PROJECT_DIR, EXECUTOR_ID_KEY, LABEL_PREFIX, MAIN_CONTAINER_NAME, POD_ID_KEY,
    PROJECT_VOLUME_NAME, TASK_ID_KEY, TOOLBOX_EXEC_NAME, TOOLBOX_SEED_DIR, TOOLBOX_VOLUME_NAME,
    VOLUME_NAME_KEY,
};
pub use driver::{Driver, DriverConfig};
pub use error::{Error, ErrorKind, Errors, Result};
pub use platform::Arch;
pub use pod::{
    ContainerConfig, ContainerExec, ContainerVolume, ExecConfig, ExecStdin, Pod, PodConfig,
    PodContainer, TmpfsConfig,
};
pub use registry::{DockerConfig, RegistryAuth};

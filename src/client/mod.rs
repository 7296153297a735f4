//! Narrow container-runtime capability interface.
//!
//! The driver core never talks to a concrete runtime SDK. It goes through
//! [`RuntimeClient`], a small trait covering exactly the capabilities the
//! driver needs: container lifecycle, label-filtered listing, volume
//! management, image list/pull, exec create/attach/inspect and tar copy-in.
//! Alternative runtimes sharing the pod contract can substitute their own
//! implementation without touching the core.
//!
//! [`DockerClient`] is the production implementation against a
//! Docker-compatible engine.

mod docker;

use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::io::AsyncWrite;

use crate::error::Result;
use crate::registry::RegistryAuth;

pub use docker::DockerClient;

// =============================================================================
// Container Types
// =============================================================================

/// How a created container attaches to the network.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NetworkMode {
    /// The runtime's default network.
    #[default]
    Default,
    /// A named runtime network.
    Network(String),
    /// Share the network namespace of another container, identified by its
    /// runtime handle.
    SharedWith(String),
}

/// One mount attached to a container at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSpec {
    /// A named volume mounted at `target`.
    Volume {
        source: String,
        target: String,
        read_only: bool,
    },
    /// A tmpfs of `size_bytes` mounted at `target`.
    Tmpfs { target: String, size_bytes: i64 },
}

/// Container creation parameters.
#[derive(Debug, Clone, Default)]
pub struct ContainerCreateSpec {
    pub image: String,
    pub entrypoint: Vec<String>,
    /// Flattened `KEY=VALUE` environment entries.
    pub env: Vec<String>,
    pub working_dir: String,
    pub user: String,
    pub tty: bool,
    pub privileged: bool,
    pub labels: HashMap<String, String>,
    pub network: NetworkMode,
    pub mounts: Vec<MountSpec>,
}

/// One mount of a listed container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    /// Volume name backing the mount; empty for tmpfs mounts.
    pub source: String,
    /// Path inside the container.
    pub destination: String,
    pub read_only: bool,
}

/// A container as reported by the runtime's list endpoint.
#[derive(Debug, Clone, Default)]
pub struct ContainerSummary {
    pub id: String,
    pub labels: HashMap<String, String>,
    pub mounts: Vec<MountPoint>,
}

// =============================================================================
// Volume Types
// =============================================================================

/// A named volume as reported by the runtime.
#[derive(Debug, Clone, Default)]
pub struct VolumeInfo {
    pub name: String,
    pub labels: HashMap<String, String>,
}

// =============================================================================
// Exec Types
// =============================================================================

/// Exec creation parameters.
#[derive(Debug, Clone, Default)]
pub struct ExecCreateSpec {
    pub cmd: Vec<String>,
    pub user: String,
    pub tty: bool,
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
}

/// One frame of exec output.
///
/// Non-TTY attaches carry the runtime's stream multiplex framing; the client
/// demultiplexes it into these frames. In TTY mode the runtime folds stderr
/// into stdout, so every frame arrives as [`ExecOutput::Stdout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutput {
    Stdout(Bytes),
    Stderr(Bytes),
}

/// Duplex byte stream attached to a started exec.
pub struct ExecStream {
    /// Output frames until the exec's streams close.
    pub output: BoxStream<'static, Result<ExecOutput>>,
    /// Write half of the duplex. Shutting it down closes only this half, so
    /// the remote process observes EOF on stdin while output continues to
    /// flow.
    pub input: Pin<Box<dyn AsyncWrite + Send>>,
}

impl std::fmt::Debug for ExecStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecStream").finish_non_exhaustive()
    }
}

/// Exec state snapshot from inspection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecInspect {
    pub running: bool,
    pub exit_code: Option<i64>,
}

/// Progress frames of an image pull, as reported by the engine.
pub type PullProgress = BoxStream<'static, Result<Bytes>>;

// =============================================================================
// Runtime Client Trait
// =============================================================================

/// Capability interface over a container runtime.
///
/// Implementations must be safe for concurrent use from many callers; the
/// driver shares a single client across all pods.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Lists the ids of local images matching an exact reference.
    async fn image_list(&self, reference: &str) -> Result<Vec<String>>;

    /// Pulls an image, returning the engine's progress stream.
    async fn image_pull(&self, image: &str, auth: &RegistryAuth) -> Result<PullProgress>;

    /// Creates a local-driver volume carrying the given labels.
    async fn volume_create(&self, labels: HashMap<String, String>) -> Result<VolumeInfo>;

    /// Lists all volumes.
    async fn volume_list(&self) -> Result<Vec<VolumeInfo>>;

    /// Removes a volume.
    async fn volume_remove(&self, name: &str, force: bool) -> Result<()>;

    /// Creates a container, returning its runtime handle.
    async fn container_create(&self, spec: ContainerCreateSpec) -> Result<String>;

    /// Starts a created container.
    async fn container_start(&self, id: &str) -> Result<()>;

    /// Requests a graceful stop, escalating to kill after `timeout`.
    async fn container_stop(&self, id: &str, timeout: Duration) -> Result<()>;

    /// Removes a container.
    async fn container_remove(&self, id: &str, force: bool) -> Result<()>;

    /// Lists containers, restricted to those carrying every label in
    /// `label_filter` (an empty filter lists everything). `all` includes
    /// stopped containers.
    async fn container_list(
        &self,
        label_filter: &HashMap<String, String>,
        all: bool,
    ) -> Result<Vec<ContainerSummary>>;

    /// Extracts a tar archive into `dest_dir` of a running container.
    async fn copy_into(&self, id: &str, dest_dir: &str, archive: Bytes) -> Result<()>;

    /// Creates an exec inside a container, returning the exec id.
    async fn exec_create(&self, container_id: &str, spec: ExecCreateSpec) -> Result<String>;

    /// Starts the exec and attaches its bidirectional byte stream.
    async fn exec_attach(&self, exec_id: &str, tty: bool) -> Result<ExecStream>;

    /// Reports whether the exec is still running and its exit code.
    async fn exec_inspect(&self, exec_id: &str) -> Result<ExecInspect>;
}

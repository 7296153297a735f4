//! Shared test harness: an in-memory runtime client plus buffer sinks.
//!
//! `MockRuntime` implements the driver's `RuntimeClient` trait over plain
//! maps, recording every mutation so tests can assert on pull policy, label
//! stamping, network wiring, seeding and exec behavior without a container
//! engine.

// each test binary uses a different slice of the harness
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncWrite;

use agola_driver::client::{
    ContainerCreateSpec, ContainerSummary, ExecCreateSpec, ExecInspect, ExecOutput, ExecStream,
    MountPoint, MountSpec, PullProgress, RuntimeClient, VolumeInfo,
};
use agola_driver::{
    Arch, ContainerConfig, Driver, DriverConfig, Error, PodConfig, RegistryAuth, Result,
};

/// Executor identity every harness driver runs under.
pub const EXECUTOR_ID: &str = "executor-01";

/// Init image used to seed toolbox volumes in tests.
pub const INIT_IMAGE: &str = "busybox:stable";

/// Builds a driver over a fresh mock runtime.
///
/// The temp dir holds a fake toolbox binary for the local architecture and
/// must outlive the driver.
pub fn test_driver() -> (Arc<MockRuntime>, Driver, tempfile::TempDir) {
    test_driver_with_init(INIT_IMAGE)
}

/// Same as [`test_driver`] with a custom init image.
pub fn test_driver_with_init(init_image: &str) -> (Arc<MockRuntime>, Driver, tempfile::TempDir) {
    let runtime = Arc::new(MockRuntime::new());
    let toolbox_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        toolbox_dir
            .path()
            .join(format!("agola-toolbox-linux-{}", Arch::detect())),
        b"#!/bin/sh\nexit 0\n",
    )
    .unwrap();

    let client: Arc<dyn RuntimeClient> = runtime.clone();
    let driver = Driver::new(
        client,
        DriverConfig {
            executor_id: EXECUTOR_ID.to_string(),
            toolbox_dir: toolbox_dir.path().to_path_buf(),
            init_image: init_image.to_string(),
            init_registry_config: None,
            network: None,
        },
    );
    (runtime, driver, toolbox_dir)
}

/// Minimal pod configuration with the given containers.
pub fn pod_config(id: &str, task_id: &str, containers: Vec<ContainerConfig>) -> PodConfig {
    PodConfig {
        id: id.to_string(),
        task_id: task_id.to_string(),
        init_volume_dir: "/mnt/agola".to_string(),
        containers,
        registry_config: None,
    }
}

/// A plain single-image container declaration.
pub fn container(image: &str, name: &str) -> ContainerConfig {
    ContainerConfig {
        image: image.to_string(),
        cmd: vec!["sh".to_string()],
        name: name.to_string(),
        ..ContainerConfig::default()
    }
}

// =============================================================================
// Shared buffer sink
// =============================================================================

/// Cloneable in-memory `AsyncWrite` sink.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    pub fn writer(&self) -> Box<dyn AsyncWrite + Send + Unpin> {
        Box::new(self.clone())
    }
}

impl AsyncWrite for SharedBuf {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

// =============================================================================
// Mock runtime state
// =============================================================================

#[derive(Clone)]
pub struct MockContainer {
    pub id: String,
    pub spec: ContainerCreateSpec,
    pub running: bool,
}

/// Scripted behavior of one exec; fixtures are consumed in creation order.
#[derive(Clone, Default)]
pub struct ExecFixture {
    pub frames: Vec<ExecOutput>,
    pub exit_code: i64,
    /// Never complete the output stream (for cancellation tests).
    pub hang: bool,
}

#[derive(Clone)]
pub struct RecordedExec {
    pub container_id: String,
    pub spec: ExecCreateSpec,
    pub stdin_data: Arc<Mutex<Vec<u8>>>,
    pub stdin_closed: Arc<AtomicBool>,
    fixture: ExecFixture,
}

#[derive(Default)]
struct State {
    containers: HashMap<String, MockContainer>,
    volumes: HashMap<String, VolumeInfo>,
    local_images: HashSet<String>,
    pulls: Vec<String>,
    execs: HashMap<String, RecordedExec>,
    exec_order: Vec<String>,
    exec_fixtures: VecDeque<ExecFixture>,
    /// Extra containers appended to every matching list result.
    injected: Vec<ContainerSummary>,
    /// Tar archives copied into containers.
    seeds: Vec<(String, String, Bytes)>,
    next_id: u64,
}

/// In-memory `RuntimeClient`.
#[derive(Default)]
pub struct MockRuntime {
    state: Mutex<State>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(state: &mut State, prefix: &str) -> String {
        state.next_id += 1;
        format!("{prefix}-{}", state.next_id)
    }

    /// Marks an image as already present locally.
    pub fn preload_image(&self, reference: &str) {
        self.state
            .lock()
            .unwrap()
            .local_images
            .insert(reference.to_string());
    }

    /// Image references pulled so far, in order.
    pub fn pulls(&self) -> Vec<String> {
        self.state.lock().unwrap().pulls.clone()
    }

    /// All containers known to the runtime (including stopped).
    pub fn containers(&self) -> Vec<MockContainer> {
        let state = self.state.lock().unwrap();
        let mut containers: Vec<_> = state.containers.values().cloned().collect();
        containers.sort_by(|a, b| a.id.cmp(&b.id));
        containers
    }

    pub fn container(&self, id: &str) -> Option<MockContainer> {
        self.state.lock().unwrap().containers.get(id).cloned()
    }

    /// Volumes currently known to the runtime.
    pub fn volumes(&self) -> Vec<VolumeInfo> {
        let mut volumes: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .volumes
            .values()
            .cloned()
            .collect();
        volumes.sort_by(|a, b| a.name.cmp(&b.name));
        volumes
    }

    /// Tar archives copied into containers: (container id, dest dir, bytes).
    pub fn copied_archives(&self) -> Vec<(String, String, Bytes)> {
        self.state.lock().unwrap().seeds.clone()
    }

    /// Queues the behavior of the next created exec.
    pub fn push_exec_fixture(&self, fixture: ExecFixture) {
        self.state.lock().unwrap().exec_fixtures.push_back(fixture);
    }

    /// Execs created so far, in order.
    pub fn execs(&self) -> Vec<RecordedExec> {
        let state = self.state.lock().unwrap();
        state
            .exec_order
            .iter()
            .map(|id| state.execs[id].clone())
            .collect()
    }

    /// Appends a raw entry to future container listings (matching filters),
    /// for inconsistency and taint scenarios.
    pub fn inject_listed_container(&self, summary: ContainerSummary) {
        self.state.lock().unwrap().injected.push(summary);
    }

    fn summarize(container: &MockContainer) -> ContainerSummary {
        let mounts = container
            .spec
            .mounts
            .iter()
            .map(|m| match m {
                MountSpec::Volume {
                    source,
                    target,
                    read_only,
                } => MountPoint {
                    source: source.clone(),
                    destination: target.clone(),
                    read_only: *read_only,
                },
                MountSpec::Tmpfs { target, .. } => MountPoint {
                    source: String::new(),
                    destination: target.clone(),
                    read_only: false,
                },
            })
            .collect();
        ContainerSummary {
            id: container.id.clone(),
            labels: container.spec.labels.clone(),
            mounts,
        }
    }

    fn matches(labels: &HashMap<String, String>, filter: &HashMap<String, String>) -> bool {
        filter
            .iter()
            .all(|(k, v)| labels.get(k).map(String::as_str) == Some(v.as_str()))
    }
}

#[async_trait]
impl RuntimeClient for MockRuntime {
    async fn image_list(&self, reference: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        if state.local_images.contains(reference) {
            Ok(vec![format!("sha256:{:016x}", reference.len())])
        } else {
            Ok(Vec::new())
        }
    }

    async fn image_pull(&self, image: &str, _auth: &RegistryAuth) -> Result<PullProgress> {
        let mut state = self.state.lock().unwrap();
        state.pulls.push(image.to_string());
        state.local_images.insert(image.to_string());
        let line = Bytes::from(format!("{{\"status\":\"Pulling {image}\"}}\n"));
        Ok(futures::stream::iter(vec![Ok(line)]).boxed())
    }

    async fn volume_create(&self, labels: HashMap<String, String>) -> Result<VolumeInfo> {
        let mut state = self.state.lock().unwrap();
        let name = Self::next_id(&mut state, "vol");
        let volume = VolumeInfo {
            name: name.clone(),
            labels,
        };
        state.volumes.insert(name, volume.clone());
        Ok(volume)
    }

    async fn volume_list(&self) -> Result<Vec<VolumeInfo>> {
        Ok(self.state.lock().unwrap().volumes.values().cloned().collect())
    }

    async fn volume_remove(&self, name: &str, _force: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.volumes.remove(name).is_none() {
            return Err(Error::NotFound(format!("no such volume: {name}")));
        }
        Ok(())
    }

    async fn container_create(&self, spec: ContainerCreateSpec) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let id = Self::next_id(&mut state, "ctr");
        state.containers.insert(
            id.clone(),
            MockContainer {
                id: id.clone(),
                spec,
                running: false,
            },
        );
        Ok(id)
    }

    async fn container_start(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(id) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(Error::NotFound(format!("no such container: {id}"))),
        }
    }

    async fn container_stop(&self, id: &str, _timeout: Duration) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(id) {
            Some(container) => {
                container.running = false;
                Ok(())
            }
            None => Err(Error::NotFound(format!("no such container: {id}"))),
        }
    }

    async fn container_remove(&self, id: &str, _force: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.containers.remove(id).is_none() {
            return Err(Error::NotFound(format!("no such container: {id}")));
        }
        Ok(())
    }

    async fn container_list(
        &self,
        label_filter: &HashMap<String, String>,
        all: bool,
    ) -> Result<Vec<ContainerSummary>> {
        let state = self.state.lock().unwrap();
        let mut listed: Vec<ContainerSummary> = state
            .containers
            .values()
            .filter(|c| (all || c.running) && Self::matches(&c.spec.labels, label_filter))
            .map(Self::summarize)
            .collect();
        listed.sort_by(|a, b| a.id.cmp(&b.id));
        listed.extend(
            state
                .injected
                .iter()
                .filter(|c| Self::matches(&c.labels, label_filter))
                .cloned(),
        );
        Ok(listed)
    }

    async fn copy_into(&self, id: &str, dest_dir: &str, archive: Bytes) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.containers.contains_key(id) {
            return Err(Error::NotFound(format!("no such container: {id}")));
        }
        state
            .seeds
            .push((id.to_string(), dest_dir.to_string(), archive));
        Ok(())
    }

    async fn exec_create(&self, container_id: &str, spec: ExecCreateSpec) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if !state.containers.contains_key(container_id) {
            return Err(Error::NotFound(format!("no such container: {container_id}")));
        }
        let fixture = state.exec_fixtures.pop_front().unwrap_or_default();
        let id = Self::next_id(&mut state, "exec");
        state.execs.insert(
            id.clone(),
            RecordedExec {
                container_id: container_id.to_string(),
                spec,
                stdin_data: Arc::new(Mutex::new(Vec::new())),
                stdin_closed: Arc::new(AtomicBool::new(false)),
                fixture,
            },
        );
        state.exec_order.push(id.clone());
        Ok(id)
    }

    async fn exec_attach(&self, exec_id: &str, _tty: bool) -> Result<ExecStream> {
        let state = self.state.lock().unwrap();
        let exec = state
            .execs
            .get(exec_id)
            .ok_or_else(|| Error::NotFound(format!("no such exec: {exec_id}")))?;

        let output: futures::stream::BoxStream<'static, Result<ExecOutput>> = if exec.fixture.hang
        {
            futures::stream::pending().boxed()
        } else {
            futures::stream::iter(exec.fixture.frames.clone().into_iter().map(Ok)).boxed()
        };

        let input = MockStdin {
            data: exec.stdin_data.clone(),
            closed: exec.stdin_closed.clone(),
        };

        Ok(ExecStream {
            output,
            input: Box::pin(input),
        })
    }

    async fn exec_inspect(&self, exec_id: &str) -> Result<ExecInspect> {
        let state = self.state.lock().unwrap();
        let exec = state
            .execs
            .get(exec_id)
            .ok_or_else(|| Error::NotFound(format!("no such exec: {exec_id}")))?;
        Ok(ExecInspect {
            running: false,
            exit_code: Some(exec.fixture.exit_code),
        })
    }
}

/// Write half handed out by [`MockRuntime::exec_attach`].
struct MockStdin {
    data: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicBool>,
}

impl AsyncWrite for MockStdin {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.data.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.closed.store(true, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

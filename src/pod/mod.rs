//! Pods: groups of containers sharing network and storage.
//!
//! A pod is one task's execution environment: an ordered set of containers
//! joined to the main (index 0) container's network namespace, plus two
//! conventional volumes (read-only toolbox, read-write project). Pods are
//! built by the driver, observable through label-based discovery, mutated
//! only by spawning execs inside member containers and destroyed by
//! [`Pod::remove`].
//!
//! Labels, not any in-memory registry, are the source of truth: discovery is
//! a pure function of runtime state, so pods survive driver restarts.

mod config;
mod discover;
mod exec;
#[allow(clippy::module_inception)]
mod pod;

pub use config::{ContainerConfig, ContainerVolume, ExecConfig, PodConfig, TmpfsConfig};
pub use exec::{ContainerExec, ExecStdin};
pub use pod::{Pod, PodContainer};

pub(crate) use config::make_env;
pub(crate) use discover::{assemble_pods, pod_labels};

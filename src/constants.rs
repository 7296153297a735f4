//! Constants for the pod driver.
//!
//! All label keys, canonical paths, timeouts and poll intervals are defined
//! here to ensure consistency and prevent magic values throughout the
//! codebase.

use std::time::Duration;

// =============================================================================
// Label Namespace
// =============================================================================

/// Prefix shared by every label the driver stamps on runtime objects.
pub const LABEL_PREFIX: &str = "agola.io/";

/// Marker label present on every driver-owned container and volume.
pub const AGOLA_LABEL_KEY: &str = "agola.io/agola";

/// Value of [`AGOLA_LABEL_KEY`].
pub const AGOLA_LABEL_VALUE: &str = "true";

/// Label carrying the executor identity that owns an object.
pub const EXECUTOR_ID_KEY: &str = "agola.io/executorid";

/// Label carrying the pod identity an object belongs to.
pub const POD_ID_KEY: &str = "agola.io/podid";

/// Label carrying the upstream task identity.
pub const TASK_ID_KEY: &str = "agola.io/taskid";

/// Label carrying the decimal container index within a pod (0 = main).
pub const CONTAINER_INDEX_KEY: &str = "agola.io/containerindex";

/// Label carrying the logical container name; empty for unnamed sidecars.
pub const CONTAINER_NAME_KEY: &str = "agola.io/containername";

/// Label distinguishing the two pod volumes (`toolbox` or `project`).
pub const VOLUME_NAME_KEY: &str = "agola.io/volumename";

// =============================================================================
// Canonical Names and Paths
// =============================================================================

/// [`VOLUME_NAME_KEY`] value of the read-only toolbox volume.
pub const TOOLBOX_VOLUME_NAME: &str = "toolbox";

/// [`VOLUME_NAME_KEY`] value of the read-write project volume.
pub const PROJECT_VOLUME_NAME: &str = "project";

/// Name assigned to an unnamed index-0 container.
pub const MAIN_CONTAINER_NAME: &str = "main";

/// Name of the toolbox helper executable inside the toolbox volume.
pub const TOOLBOX_EXEC_NAME: &str = "agola-toolbox";

/// Mount path of the toolbox volume inside the seeding helper container.
pub const TOOLBOX_SEED_DIR: &str = "/tmp/agola";

/// Default project workspace directory mounted read-write in every named
/// container.
pub const DEFAULT_PROJECT_DIR: &str = "/project";

// =============================================================================
// Timeouts
// =============================================================================

/// Graceful stop timeout per container before the runtime escalates to kill.
pub const CONTAINER_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Poll cadence while waiting for an exec to report its exit code.
pub const EXEC_EXIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

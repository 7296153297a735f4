//! Pod and exec configuration types.

use std::collections::HashMap;

use tokio::io::AsyncWrite;

use crate::registry::DockerConfig;

/// Input to pod creation.
#[derive(Debug, Clone, Default)]
pub struct PodConfig {
    /// Opaque pod identity, chosen by the caller.
    pub id: String,
    /// Upstream task identity.
    pub task_id: String,
    /// Directory where the toolbox volume is mounted inside containers.
    pub init_volume_dir: String,
    /// Ordered container declarations; index 0 is the main container.
    pub containers: Vec<ContainerConfig>,
    /// Registry credentials for task-container image pulls.
    pub registry_config: Option<DockerConfig>,
}

/// One container declaration within a pod.
#[derive(Debug, Clone, Default)]
pub struct ContainerConfig {
    pub image: String,
    /// Entrypoint command vector.
    pub cmd: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: String,
    pub user: String,
    /// Logical name; empty means unnamed (the index-0 container is then
    /// named `main`).
    pub name: String,
    pub privileged: bool,
    pub volumes: Vec<ContainerVolume>,
}

/// An extra volume of a container. Only tmpfs volumes are supported;
/// named and host volumes are intentionally rejected by the driver.
#[derive(Debug, Clone, Default)]
pub struct ContainerVolume {
    /// Mount path inside the container.
    pub path: String,
    pub tmpfs: Option<TmpfsConfig>,
}

/// Size of a tmpfs volume.
#[derive(Debug, Clone, Copy, Default)]
pub struct TmpfsConfig {
    pub size: i64,
}

/// Input to command execution inside a pod.
#[derive(Default)]
pub struct ExecConfig {
    /// Target container name; empty targets the main container.
    pub container: String,
    pub cmd: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: String,
    pub user: String,
    pub tty: bool,
    pub attach_stdin: bool,
    /// Sink for stdout; stdout is only attached when present.
    pub stdout: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    /// Sink for stderr; stderr is only attached when present. Ignored in
    /// TTY mode, where the runtime folds stderr into stdout.
    pub stderr: Option<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl std::fmt::Debug for ExecConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecConfig")
            .field("container", &self.container)
            .field("cmd", &self.cmd)
            .field("working_dir", &self.working_dir)
            .field("user", &self.user)
            .field("tty", &self.tty)
            .field("attach_stdin", &self.attach_stdin)
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish()
    }
}

/// Flattens an environment mapping into `KEY=VALUE` entries.
pub(crate) fn make_env(env: &HashMap<String, String>) -> Vec<String> {
    env.iter().map(|(k, v)| format!("{k}={v}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_env_flattens_pairs() {
        let env = HashMap::from([
            ("HOME".to_string(), "/root".to_string()),
            ("CI".to_string(), "true".to_string()),
        ]);
        let mut flat = make_env(&env);
        flat.sort();
        assert_eq!(flat, vec!["CI=true", "HOME=/root"]);
    }

    #[test]
    fn make_env_is_empty_for_empty_map() {
        assert!(make_env(&HashMap::new()).is_empty());
    }
}

//! Toolbox volume seeding.
//!
//! Every pod carries a read-only toolbox volume holding the driver's
//! in-container helper binary. Seeding launches a throwaway container from
//! the init image with a blocking entrypoint, binds the toolbox volume to a
//! canonical path and streams a tar archive containing the
//! architecture-appropriate helper, renamed to its canonical name, into that
//! path. The helper container is then discarded; the volume is the artifact.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::client::{ContainerCreateSpec, MountSpec, RuntimeClient};
use crate::constants::{TOOLBOX_EXEC_NAME, TOOLBOX_SEED_DIR};
use crate::error::{Error, Result};
use crate::platform::Arch;

/// Returns the path of the toolbox binary for an architecture.
///
/// The toolbox directory holds one statically linked binary per supported
/// architecture, named `agola-toolbox-linux-<arch>`.
pub(crate) fn toolbox_exec_path(toolbox_dir: &Path, arch: Arch) -> Result<PathBuf> {
    match arch {
        Arch::Amd64 | Arch::Arm64 | Arch::Arm => {
            Ok(toolbox_dir.join(format!("{TOOLBOX_EXEC_NAME}-linux-{arch}")))
        }
        Arch::Unknown => Err(Error::Unsupported(
            "no toolbox binary for unknown architecture".to_string(),
        )),
    }
}

/// Builds the single-entry tar archive carrying the toolbox binary under its
/// canonical name.
fn toolbox_archive(contents: &[u8]) -> Result<Bytes> {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, TOOLBOX_EXEC_NAME, contents)?;
    Ok(Bytes::from(builder.into_inner()?))
}

/// Materialises the toolbox binary into freshly created toolbox volumes.
pub struct ToolboxSeeder {
    client: Arc<dyn RuntimeClient>,
    toolbox_dir: PathBuf,
    init_image: String,
    arch: Arch,
}

impl ToolboxSeeder {
    pub fn new(
        client: Arc<dyn RuntimeClient>,
        toolbox_dir: PathBuf,
        init_image: String,
        arch: Arch,
    ) -> Self {
        Self {
            client,
            toolbox_dir,
            init_image,
            arch,
        }
    }

    /// Copies the toolbox binary into `volume_name`.
    ///
    /// The init image must already be present locally. Removal failures of
    /// the helper container are swallowed.
    pub async fn seed(&self, volume_name: &str) -> Result<()> {
        let exec_path = toolbox_exec_path(&self.toolbox_dir, self.arch)?;
        let contents = tokio::fs::read(&exec_path).await?;
        let archive = toolbox_archive(&contents)?;

        let spec = ContainerCreateSpec {
            image: self.init_image.clone(),
            entrypoint: vec!["cat".to_string()],
            tty: true,
            mounts: vec![MountSpec::Volume {
                source: volume_name.to_string(),
                target: TOOLBOX_SEED_DIR.to_string(),
                read_only: false,
            }],
            ..ContainerCreateSpec::default()
        };
        let container_id = self.client.container_create(spec).await?;
        self.client.container_start(&container_id).await?;

        debug!(volume = volume_name, container = %container_id, "seeding toolbox volume");
        self.client
            .copy_into(&container_id, TOOLBOX_SEED_DIR, archive)
            .await?;

        // the volume is the artifact, the helper container is disposable
        let _ = self.client.container_remove(&container_id, true).await;

        Ok(())
    }
}

//! Streaming command execution inside pod containers.
//!
//! An exec session attaches a bidirectional byte stream to a command running
//! inside one member container. Output is copied to the caller's sinks by a
//! background task that publishes its terminal result on a single-shot
//! completion channel; stdin is exposed as a write-closable stream whose
//! shutdown closes only the write half of the duplex, so the remote command
//! observes EOF while output keeps flowing.

use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::{ExecCreateSpec, ExecOutput, ExecStream, RuntimeClient};
use crate::constants::{EXEC_EXIT_POLL_INTERVAL, TOOLBOX_EXEC_NAME};
use crate::error::{Error, Result};
use crate::pod::{ExecConfig, Pod};

impl Pod {
    /// Starts a command inside a member container and attaches to it.
    ///
    /// The target container is resolved by name; the empty name targets the
    /// main container. Output streams attach only when the corresponding
    /// sink is present in `config`.
    ///
    /// Older runtime APIs do not accept env and working directory on exec
    /// creation, so the command is always wrapped in a call to the toolbox
    /// helper, which applies both before exec'ing the real command. This
    /// keeps env and cwd semantics uniform across runtime versions.
    pub async fn exec(&self, config: ExecConfig) -> Result<ContainerExec> {
        let target = self
            .container(&config.container)
            .ok_or_else(|| Error::NotFound(format!("container {:?} not found", config.container)))?;

        let env_json = serde_json::to_string(&config.env)
            .map_err(|err| Error::runtime("failed to encode exec env", err))?;
        let toolbox = Path::new(&self.init_volume_dir).join(TOOLBOX_EXEC_NAME);
        let mut cmd = vec![
            toolbox.to_string_lossy().into_owned(),
            "exec".to_string(),
            "-e".to_string(),
            env_json,
            "-w".to_string(),
            config.working_dir.clone(),
            "--".to_string(),
        ];
        cmd.extend(config.cmd.iter().cloned());

        let spec = ExecCreateSpec {
            cmd,
            user: config.user.clone(),
            tty: config.tty,
            attach_stdin: config.attach_stdin,
            attach_stdout: config.stdout.is_some(),
            attach_stderr: config.stderr.is_some(),
        };
        let exec_id = self.client.exec_create(&target.id, spec).await?;
        let ExecStream { mut output, input } =
            self.client.exec_attach(&exec_id, config.tty).await?;

        // absent sinks discard their stream
        let mut stdout: Box<dyn AsyncWrite + Send + Unpin> = config
            .stdout
            .unwrap_or_else(|| Box::new(tokio::io::sink()));
        let mut stderr: Box<dyn AsyncWrite + Send + Unpin> = config
            .stderr
            .unwrap_or_else(|| Box::new(tokio::io::sink()));

        let (end_tx, end_rx) = oneshot::channel();
        let copy_task = tokio::spawn(async move {
            let result = async {
                while let Some(frame) = output.next().await {
                    match frame? {
                        ExecOutput::Stdout(bytes) => stdout.write_all(&bytes).await?,
                        ExecOutput::Stderr(bytes) => stderr.write_all(&bytes).await?,
                    }
                }
                stdout.flush().await?;
                stderr.flush().await?;
                Ok(())
            }
            .await;
            let _ = end_tx.send(result);
        });

        debug!(pod = %self.id, exec = %exec_id, container = %target.id, "attached exec session");

        Ok(ContainerExec {
            exec_id,
            client: self.client.clone(),
            stdin: Some(ExecStdin { inner: input }),
            end_rx,
            copy_task,
        })
    }
}

/// One invocation of a command inside a pod container.
///
/// Dropping the session (or letting [`ContainerExec::wait`] consume it)
/// closes the attached duplex; the remote process may keep running until the
/// runtime observes the closed attach.
pub struct ContainerExec {
    exec_id: String,
    client: Arc<dyn RuntimeClient>,
    stdin: Option<ExecStdin>,
    end_rx: oneshot::Receiver<Result<()>>,
    copy_task: JoinHandle<()>,
}

impl ContainerExec {
    /// Takes the stdin handle, so it can be driven independently of
    /// [`ContainerExec::wait`]. Returns `None` after the first call.
    pub fn take_stdin(&mut self) -> Option<ExecStdin> {
        self.stdin.take()
    }

    /// Waits for the command to finish and returns its exit code.
    ///
    /// Blocks until the output copy completes, then polls exec inspection at
    /// a bounded cadence until the runtime reports the exec stopped.
    /// Streaming I/O errors are surfaced here. Cancelling `cancel` aborts
    /// the copy, closes the session and returns [`Error::Cancelled`]
    /// immediately.
    pub async fn wait(mut self, cancel: &CancellationToken) -> Result<i32> {
        tokio::select! {
            () = cancel.cancelled() => {
                self.copy_task.abort();
                return Err(Error::Cancelled);
            }
            res = &mut self.end_rx => {
                if let Ok(Err(err)) = res {
                    return Err(err);
                }
            }
        }

        let exit_code = loop {
            let inspect = self.client.exec_inspect(&self.exec_id).await?;
            if !inspect.running {
                break inspect.exit_code.unwrap_or(0);
            }
            tokio::time::sleep(EXEC_EXIT_POLL_INTERVAL).await;
        };

        Ok(i32::try_from(exit_code).unwrap_or(-1))
    }
}

impl std::fmt::Debug for ContainerExec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerExec")
            .field("exec_id", &self.exec_id)
            .finish_non_exhaustive()
    }
}

/// Write half of an exec's attached duplex.
///
/// Shutting the writer down (via [`ExecStdin::close_write`] or
/// `AsyncWriteExt::shutdown`) closes only the write half of the connection:
/// the remote command sees EOF on its stdin while the driver continues to
/// read its output.
pub struct ExecStdin {
    inner: Pin<Box<dyn AsyncWrite + Send>>,
}

impl ExecStdin {
    /// Half-closes the duplex.
    pub async fn close_write(&mut self) -> std::io::Result<()> {
        self.inner.shutdown().await
    }
}

impl AsyncWrite for ExecStdin {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.inner.as_mut().poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.inner.as_mut().poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.inner.as_mut().poll_shutdown(cx)
    }
}

impl std::fmt::Debug for ExecStdin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecStdin").finish_non_exhaustive()
    }
}

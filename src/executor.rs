//! The central state machine: one ephemeral container per invocation.
//!
//! Grounded on `wonop-io-wonopcode`'s and `pantsbuild-pants`'s bollard-based
//! Docker runtime files for the create/attach/start/exec/remove option
//! shapes, and on the teacher's `daemon.rs` convention of expressing
//! concurrent cooperating work as spawned tasks joined through channels —
//! here rebuilt with `tokio::spawn` + `tokio::select!` since the attach/demux
//! pipeline has no synchronous expression.

use anyhow::{Context, Result};
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions, LogOutput,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

/// Working directory the runner image is contractually obliged to read/write in.
const CONTAINER_WORKDIR: &str = "/data";
const CONTAINER_USER: &str = "1000:1000";
const MEMORY_LIMIT_BYTES: i64 = 256 * 1024 * 1024;
/// Half a logical CPU, expressed in bollard's nano-CPU units (1e9 = 1 core).
const NANO_CPUS: i64 = 500_000_000;
const DRAIN_DELAY: Duration = Duration::from_millis(100);

/// Inputs to a single container execution.
pub struct ExecutionRequest<'a> {
    pub image_reference: &'a str,
    pub host_bind_path: &'a str,
    pub code: &'a str,
    pub network_enabled: bool,
    pub env: &'a HashMap<String, String>,
    pub timeout: Duration,
    pub cleanup_timeout: Duration,
}

/// Outcome of a single container execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub timed_out: bool,
}

impl ExecutionOutcome {
    fn failure(stderr: impl Into<String>) -> Self {
        ExecutionOutcome {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: -1,
            timed_out: false,
        }
    }
}

pub struct Executor {
    docker: Docker,
}

impl Executor {
    pub fn new(docker: Docker) -> Self {
        Executor { docker }
    }

    /// Run `request` to completion, always attempting container removal
    /// before returning regardless of how the run ended.
    pub async fn run(&self, request: ExecutionRequest<'_>) -> ExecutionOutcome {
        let container_name = format!("mcp-exec-{}", uuid_like());

        let container_id = match self.create_container(&container_name, &request).await {
            Ok(id) => id,
            Err(err) => return ExecutionOutcome::failure(format!("container creation failed: {err}")),
        };

        let attach = match self.attach(&container_id).await {
            Ok(attach) => attach,
            Err(err) => {
                self.remove_best_effort(&container_id, request.cleanup_timeout).await;
                return ExecutionOutcome::failure(format!("container attach failed: {err}"));
            }
        };

        if let Err(err) = self.start(&container_id).await {
            self.remove_best_effort(&container_id, request.cleanup_timeout).await;
            return ExecutionOutcome::failure(format!("container start failed: {err}"));
        }

        let outcome = self
            .run_attached(&container_id, attach, request.code, request.timeout)
            .await;

        self.remove_best_effort(&container_id, request.cleanup_timeout).await;

        outcome
    }

    async fn create_container(&self, name: &str, request: &ExecutionRequest<'_>) -> Result<String> {
        let mut env: Vec<String> = request
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        env.sort();

        let network_mode = if request.network_enabled { "bridge" } else { "none" };

        let mut labels = HashMap::new();
        labels.insert("sandbox.exec".to_string(), "true".to_string());

        let config = Config {
            image: Some(request.image_reference.to_string()),
            working_dir: Some(CONTAINER_WORKDIR.to_string()),
            user: Some(CONTAINER_USER.to_string()),
            env: Some(env),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            open_stdin: Some(true),
            stdin_once: Some(true),
            tty: Some(false),
            labels: Some(labels),
            host_config: Some(HostConfig {
                binds: Some(vec![format!("{}:{}:rw", request.host_bind_path, CONTAINER_WORKDIR)]),
                memory: Some(MEMORY_LIMIT_BYTES),
                nano_cpus: Some(NANO_CPUS),
                network_mode: Some(network_mode.to_string()),
                auto_remove: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.to_string(),
                    platform: None,
                }),
                config,
            )
            .await
            .context("create_container")?;

        Ok(response.id)
    }

    async fn attach(&self, container_id: &str) -> Result<AttachContainerResults> {
        self.docker
            .attach_container(
                container_id,
                Some(AttachContainerOptions::<String> {
                    stdin: Some(true),
                    stdout: Some(true),
                    stderr: Some(true),
                    stream: Some(true),
                    logs: Some(true),
                    ..Default::default()
                }),
            )
            .await
            .context("attach_container")
    }

    async fn start(&self, container_id: &str) -> Result<()> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .context("start_container")
    }

    /// Drive the RUNNING state: writer, reader, and waiter tasks, raced
    /// against the execution timeout, followed by a short drain delay.
    async fn run_attached(
        &self,
        container_id: &str,
        attach: AttachContainerResults,
        code: &str,
        exec_timeout: Duration,
    ) -> ExecutionOutcome {
        let AttachContainerResults { mut output, mut input } = attach;
        let code = code.to_string();

        // Writer: push the code to stdin, then half-close. A short-lived
        // runner process may close its end of the pipe before we finish
        // writing; treat the resulting broken pipe as benign.
        tokio::spawn(async move {
            if let Err(err) = input.write_all(code.as_bytes()).await {
                log::debug!("stdin write ended early (tolerated): {err}");
                return;
            }
            if let Err(err) = input.shutdown().await {
                log::debug!("stdin half-close failed (tolerated): {err}");
            }
        });

        // Reader: demultiplex stdout/stderr frames as they arrive. bollard
        // already demultiplexes the attach stream into `LogOutput` variants.
        let (stdout_tx, mut stdout_rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
        let (stderr_tx, mut stderr_rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
        let reader = tokio::spawn(async move {
            while let Some(frame) = output.next().await {
                match frame {
                    Ok(LogOutput::StdOut { message }) => {
                        let _ = stdout_tx.send(message.to_vec());
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        let _ = stderr_tx.send(message.to_vec());
                    }
                    Ok(_) => {}
                    Err(err) => {
                        log::debug!("attach stream ended: {err}");
                        break;
                    }
                }
            }
        });

        let mut waiter = Box::pin(
            self.docker
                .wait_container(container_id, None::<WaitContainerOptions<String>>),
        );

        let (exit_code, timed_out, wait_error) = match timeout(exec_timeout, waiter.next()).await {
            Ok(Some(Ok(response))) => (response.status_code, false, None),
            Ok(Some(Err(err))) => (0, false, Some(err.to_string())),
            Ok(None) => (0, false, Some("daemon wait stream closed with no response".to_string())),
            Err(_) => (-1, true, None),
        };

        tokio::time::sleep(DRAIN_DELAY).await;
        reader.abort();

        let mut stdout = Vec::new();
        while let Ok(chunk) = stdout_rx.try_recv() {
            stdout.extend(chunk);
        }
        let mut stderr = Vec::new();
        while let Ok(chunk) = stderr_rx.try_recv() {
            stderr.extend(chunk);
        }

        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let mut stderr = String::from_utf8_lossy(&stderr).into_owned();

        // Decide success from the typed outcome of the wait, before any
        // human-readable text gets prefixed onto stderr below — stderr is
        // arbitrary user-controlled output and must never be re-inspected to
        // classify the run (see SPEC_FULL.md §8's success invariant).
        let success = !timed_out && wait_error.is_none() && exit_code == 0;

        if timed_out {
            stderr = format!(
                "execution timed out after {}s\n{stderr}",
                exec_timeout.as_secs()
            );
        } else if let Some(err) = wait_error {
            stderr = format!("container wait failed: {err}\n{stderr}");
        }

        ExecutionOutcome {
            success,
            stdout,
            stderr,
            exit_code,
            timed_out,
        }
    }

    async fn remove_best_effort(&self, container_id: &str, cleanup_timeout: Duration) {
        let remove = self.docker.remove_container(
            container_id,
            Some(RemoveContainerOptions {
                force: true,
                ..Default::default()
            }),
        );

        match timeout(cleanup_timeout, remove).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => log::warn!("failed to remove container {container_id}: {err}"),
            Err(_) => log::warn!("removing container {container_id} did not finish within {cleanup_timeout:?}"),
        }
    }
}

/// A short pseudo-random suffix for container names. Not cryptographic —
/// collisions only risk a create_container name clash, which simply fails
/// that one request.
fn uuid_like() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{nanos:x}")
}

//! End-to-end execution scenarios against a live Docker daemon.
//!
//! These exercise the full Executor state machine (SPEC_FULL.md §4.4/§8)
//! and need a real daemon plus a runner image built from a trivial
//! Dockerfile (`ENTRYPOINT` reads stdin, executes it with `python3`,
//! propagates the exit code — the opaque runner-image contract of §6).
//! Skipped with a notice when Docker is unreachable, mirroring the
//! teacher's precedent of best-effort, non-fatal environment checks rather
//! than failing a whole suite on missing infrastructure.

use mcp_sandbox::executor::{ExecutionRequest, Executor};
use std::collections::HashMap;
use std::time::Duration;

const RUNNER_IMAGE: &str = "mcp-sandbox-test-runner:python";

async fn docker_with_test_runner() -> Option<bollard::Docker> {
    let docker = bollard::Docker::connect_with_local_defaults().ok()?;
    docker.ping().await.ok()?;
    docker.inspect_image(RUNNER_IMAGE).await.ok()?;
    Some(docker)
}

#[tokio::test]
async fn hello_world_python() {
    let Some(docker) = docker_with_test_runner().await else {
        eprintln!("skipping: Docker daemon or {RUNNER_IMAGE} image not available");
        return;
    };

    let dir = tempfile::TempDir::new().unwrap();
    let executor = Executor::new(docker);
    let env = HashMap::new();

    let outcome = executor
        .run(ExecutionRequest {
            image_reference: RUNNER_IMAGE,
            host_bind_path: &dir.path().to_string_lossy(),
            code: "print(\"hi\")",
            network_enabled: false,
            env: &env,
            timeout: Duration::from_secs(30),
            cleanup_timeout: Duration::from_secs(5),
        })
        .await;

    assert!(outcome.success);
    assert!(outcome.stdout.contains("hi"));
    assert_eq!(outcome.exit_code, 0);
    assert!(!outcome.timed_out);
}

#[tokio::test]
async fn timeout_produces_no_dangling_container() {
    let Some(docker) = docker_with_test_runner().await else {
        eprintln!("skipping: Docker daemon or {RUNNER_IMAGE} image not available");
        return;
    };

    let dir = tempfile::TempDir::new().unwrap();
    let executor = Executor::new(docker.clone());
    let env = HashMap::new();

    let outcome = executor
        .run(ExecutionRequest {
            image_reference: RUNNER_IMAGE,
            host_bind_path: &dir.path().to_string_lossy(),
            code: "import time; time.sleep(60)",
            network_enabled: false,
            env: &env,
            timeout: Duration::from_secs(2),
            cleanup_timeout: Duration::from_secs(5),
        })
        .await;

    assert!(!outcome.success);
    assert!(outcome.timed_out);
    assert_eq!(outcome.exit_code, -1);

    let mut filters = HashMap::new();
    filters.insert("label".to_string(), vec!["sandbox.exec=true".to_string()]);
    let containers = docker
        .list_containers(Some(bollard::container::ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        }))
        .await
        .unwrap();
    assert!(containers.is_empty(), "expected no dangling container after timeout");
}

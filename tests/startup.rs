//! Smoke test that the binary fails fast with a readable message when
//! required configuration is missing, rather than panicking or hanging.
//! Mirrors the teacher's use of `assert_cmd` for CLI-level tests.

use assert_cmd::Command;

#[test]
fn missing_required_env_vars_exits_non_zero_with_readable_message() {
    let mut cmd = Command::cargo_bin("mcp-sandbox").unwrap();
    cmd.env_clear();
    cmd.env("PATH", std::env::var("PATH").unwrap_or_default());

    let output = cmd.output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("MCP_API_TOKEN"));
}

//! Process-wide configuration, loaded once from the environment at startup.
//!
//! Mirrors the fail-fast-with-a-readable-message convention of the teacher's
//! `sandbox_config::SandboxConfig::load`, adapted from a `.sandbox.toml` file
//! to pure environment variables (see DESIGN.md for why the TOML file format
//! was dropped).

use anyhow::{Context, Result};

const DEFAULT_HTTP_ADDR: &str = ":8080";
const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CLEANUP_TIMEOUT_SECS: u64 = 5;

/// The full configuration surface described in SPEC_FULL.md §6.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub http_addr: String,
    pub api_token: String,
    pub sandbox_root: String,
    pub sandbox_host_path: String,
    pub file_secret: String,
    pub public_base_url: String,
    pub docker_host: Option<String>,
    pub exec_timeout_secs: u64,
    pub cleanup_timeout_secs: u64,
}

impl ServiceConfig {
    /// Load configuration from the process environment, failing fast with a
    /// readable message if a required variable is missing.
    pub fn from_env() -> Result<Self> {
        let http_addr =
            std::env::var("MCP_HTTP_ADDR").unwrap_or_else(|_| DEFAULT_HTTP_ADDR.to_string());

        let api_token = require_env("MCP_API_TOKEN")?;
        let sandbox_root = require_env("SANDBOX_ROOT")?;
        let sandbox_host_path =
            std::env::var("SANDBOX_HOST_PATH").unwrap_or_else(|_| sandbox_root.clone());
        let file_secret = require_env("FILE_SECRET")?;
        let public_base_url = require_env("PUBLIC_BASE_URL")?;
        let docker_host = std::env::var("DOCKER_HOST").ok();

        let exec_timeout_secs = optional_env_u64("MCP_EXEC_TIMEOUT_SECS", DEFAULT_EXEC_TIMEOUT_SECS)?;
        let cleanup_timeout_secs = DEFAULT_CLEANUP_TIMEOUT_SECS;

        Ok(ServiceConfig {
            http_addr,
            api_token,
            sandbox_root,
            sandbox_host_path,
            file_secret,
            public_base_url,
            docker_host,
            exec_timeout_secs,
            cleanup_timeout_secs,
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name)
        .with_context(|| format!("required environment variable '{name}' is not set"))
}

fn optional_env_u64(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("environment variable '{name}' must be a positive integer, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests mutate process-wide env vars; serialize them against each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for name in [
            "MCP_HTTP_ADDR",
            "MCP_API_TOKEN",
            "SANDBOX_ROOT",
            "SANDBOX_HOST_PATH",
            "FILE_SECRET",
            "PUBLIC_BASE_URL",
            "DOCKER_HOST",
            "MCP_EXEC_TIMEOUT_SECS",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn missing_required_var_is_a_fatal_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        let result = ServiceConfig::from_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("MCP_API_TOKEN"));
    }

    #[test]
    fn sandbox_host_path_defaults_to_sandbox_root() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        std::env::set_var("MCP_API_TOKEN", "tok");
        std::env::set_var("SANDBOX_ROOT", "/data/sandboxes");
        std::env::set_var("FILE_SECRET", "secret");
        std::env::set_var("PUBLIC_BASE_URL", "https://example.com");

        let cfg = ServiceConfig::from_env().unwrap();
        assert_eq!(cfg.sandbox_host_path, "/data/sandboxes");
        assert_eq!(cfg.http_addr, DEFAULT_HTTP_ADDR);
        assert_eq!(cfg.exec_timeout_secs, DEFAULT_EXEC_TIMEOUT_SECS);
        clear_all();
    }

    #[test]
    fn explicit_host_path_overrides_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        std::env::set_var("MCP_API_TOKEN", "tok");
        std::env::set_var("SANDBOX_ROOT", "/data/sandboxes");
        std::env::set_var("SANDBOX_HOST_PATH", "/host/sandboxes");
        std::env::set_var("FILE_SECRET", "secret");
        std::env::set_var("PUBLIC_BASE_URL", "https://example.com");

        let cfg = ServiceConfig::from_env().unwrap();
        assert_eq!(cfg.sandbox_host_path, "/host/sandboxes");
        clear_all();
    }
}

//! Owns the on-disk per-conversation scratch directories.
//!
//! Grounded on the teacher's `sandbox::SandboxInfo` directory lifecycle:
//! best-effort ownership fixups that log and continue rather than fail, and
//! idempotent directory creation. Simplified to a flat per-conversation
//! directory — no mounts, overlays, or PID tracking, since each execution
//! gets a fresh single-shot container rather than a reused long-lived one.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::signer;

/// uid/gid the sandbox directory and its files are (best-effort) owned by,
/// matching the user the Executor runs the container as.
const SANDBOX_UID: u32 = 1000;
const SANDBOX_GID: u32 = 1000;

pub struct Manager {
    sandbox_root: PathBuf,
    sandbox_host_path: PathBuf,
    file_secret: String,
}

impl Manager {
    pub fn new(sandbox_root: impl Into<PathBuf>, sandbox_host_path: impl Into<PathBuf>, file_secret: impl Into<String>) -> Self {
        Manager {
            sandbox_root: sandbox_root.into(),
            sandbox_host_path: sandbox_host_path.into(),
            file_secret: file_secret.into(),
        }
    }

    fn hashed_id(&self, conversation_id: &str) -> String {
        signer::hashed_id(conversation_id, &self.file_secret)
    }

    /// Server-view root of all sandbox directories.
    pub fn sandbox_root(&self) -> &Path {
        &self.sandbox_root
    }

    /// Host-view path for a conversation's sandbox, for use only in bind-mount
    /// specs handed to the container daemon. Does not touch the filesystem.
    pub fn host_path(&self, conversation_id: &str) -> PathBuf {
        self.sandbox_host_path.join(self.hashed_id(conversation_id))
    }

    /// Compose the server-view absolute path for a file, given a hashed-id
    /// already validated by the caller (see `signer::is_valid_hashed_id`).
    pub fn file_path(&self, hashed_id: &str, filename: &str) -> PathBuf {
        self.sandbox_root.join(hashed_id).join(filename)
    }

    /// Ensure the sandbox directory for `conversation_id` exists. Idempotent.
    /// Returns (hashed_id, server-view path).
    pub fn ensure(&self, conversation_id: &str) -> Result<(String, PathBuf)> {
        let hashed_id = self.hashed_id(conversation_id);
        let dir = self.sandbox_root.join(&hashed_id);

        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create sandbox directory for {hashed_id}"))?;

        if let Err(err) = fs::set_permissions(&dir, fs::Permissions::from_mode(0o777)) {
            log::warn!("chmod 0o777 on sandbox {hashed_id} failed (continuing): {err}");
        }
        if let Err(err) = chown_best_effort(&dir) {
            log::warn!("chown 1000:1000 on sandbox {hashed_id} failed (continuing): {err}");
        }

        Ok((hashed_id, dir))
    }

    /// Write a file into a conversation's sandbox, creating the directory if needed.
    pub fn write_file(&self, conversation_id: &str, filename: &str, bytes: &[u8]) -> Result<()> {
        let (hashed_id, dir) = self.ensure(conversation_id)?;
        let path = dir.join(filename);

        fs::write(&path, bytes)
            .with_context(|| format!("failed to write file into sandbox {hashed_id}"))?;

        if let Err(err) = fs::set_permissions(&path, fs::Permissions::from_mode(0o666)) {
            log::warn!("chmod 0o666 on uploaded file in sandbox {hashed_id} failed (continuing): {err}");
        }
        if let Err(err) = chown_best_effort(&path) {
            log::warn!("chown 1000:1000 on uploaded file in sandbox {hashed_id} failed (continuing): {err}");
        }

        Ok(())
    }

    /// List the regular files at depth 1 in a conversation's sandbox.
    /// Returns an empty sequence (not an error) if the directory doesn't exist.
    pub fn list_files(&self, conversation_id: &str) -> Result<Vec<String>> {
        let dir = self.sandbox_root.join(self.hashed_id(conversation_id));
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("failed to read sandbox directory {}", dir.display()))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    /// Remove a conversation's sandbox directory entirely. Operational use only.
    pub fn delete(&self, conversation_id: &str) -> Result<()> {
        let dir = self.sandbox_root.join(self.hashed_id(conversation_id));
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("failed to delete sandbox directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn chown_best_effort(path: &Path) -> Result<()> {
    use nix::unistd::{Gid, Uid};
    nix::unistd::chown(path, Some(Uid::from_raw(SANDBOX_UID)), Some(Gid::from_raw(SANDBOX_GID)))
        .context("chown failed")
}

#[cfg(not(unix))]
fn chown_best_effort(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> Manager {
        Manager::new(dir.path(), dir.path(), "test-secret")
    }

    #[test]
    fn ensure_is_idempotent_and_deterministic() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);

        let (id1, path1) = m.ensure("conv-1").unwrap();
        let (id2, path2) = m.ensure("conv-1").unwrap();

        assert_eq!(id1, id2);
        assert_eq!(path1, path2);
        assert!(path1.is_dir());
    }

    #[test]
    fn list_files_on_missing_sandbox_is_empty_not_error() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        let files = m.list_files("never-created").unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn write_file_then_list_and_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);

        m.write_file("conv-1", "out.txt", b"hello").unwrap();
        let files = m.list_files("conv-1").unwrap();
        assert_eq!(files, vec!["out.txt".to_string()]);

        let (hashed_id, _) = m.ensure("conv-1").unwrap();
        let contents = fs::read(m.file_path(&hashed_id, "out.txt")).unwrap();
        assert_eq!(contents, b"hello");
    }

    #[test]
    fn list_files_skips_subdirectories() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        let (_, path) = m.ensure("conv-1").unwrap();
        fs::create_dir(path.join("subdir")).unwrap();
        fs::write(path.join("file.txt"), b"x").unwrap();

        let files = m.list_files("conv-1").unwrap();
        assert_eq!(files, vec!["file.txt".to_string()]);
    }

    #[test]
    fn host_path_does_not_touch_filesystem() {
        let dir = TempDir::new().unwrap();
        let host_root = dir.path().join("host-view");
        let m = Manager::new(dir.path().join("server-view"), &host_root, "secret");

        let p = m.host_path("conv-1");
        assert!(p.starts_with(&host_root));
        assert!(!dir.path().join("server-view").exists());
    }
}

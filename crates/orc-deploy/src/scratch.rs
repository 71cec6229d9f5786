//! Per-deployment scratch directory resolution: tries
//! `/var/lib/<app>/deployments/{id}`, then `/tmp/<app>-deployments/{id}`,
//! then the system temp dir; first writable wins. Holds the rendered
//! `docker-compose.yml` the apply tool is pointed at; purged on delete.

use crate::error::{DeployError, Result};
use std::path::PathBuf;

const APP_NAME: &str = "orchestrator";

pub fn candidate_dirs(deployment_id: &str) -> Vec<PathBuf> {
    vec![
        PathBuf::from(format!("/var/lib/{APP_NAME}/deployments/{deployment_id}")),
        PathBuf::from(format!("/tmp/{APP_NAME}-deployments/{deployment_id}")),
        std::env::temp_dir().join(APP_NAME).join("deployments").join(deployment_id),
    ]
}

/// Creates (if needed) and returns the first writable scratch directory.
pub fn ensure_scratch_dir(deployment_id: &str) -> Result<PathBuf> {
    for dir in candidate_dirs(deployment_id) {
        if std::fs::create_dir_all(&dir).is_ok() {
            return Ok(dir);
        }
    }
    Err(DeployError::NoScratchDirectory(deployment_id.to_string()))
}

pub fn compose_file_path(scratch_dir: &std::path::Path) -> PathBuf {
    scratch_dir.join("docker-compose.yml")
}

/// Best-effort purge on delete; sweeps every candidate location since we
/// don't track which one was actually used.
pub fn purge_scratch(deployment_id: &str) {
    for dir in candidate_dirs(deployment_id) {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_scratch_dir_creates_a_directory_and_is_idempotent() {
        let id = format!("test-scratch-{}", std::process::id());
        let dir = ensure_scratch_dir(&id).unwrap();
        assert!(dir.exists());
        let dir_again = ensure_scratch_dir(&id).unwrap();
        assert_eq!(dir, dir_again);
        purge_scratch(&id);
        assert!(!dir.exists());
    }

    #[test]
    fn compose_file_path_is_named_docker_compose_yml() {
        let path = compose_file_path(std::path::Path::new("/tmp/x"));
        assert_eq!(path.file_name().unwrap(), "docker-compose.yml");
    }
}

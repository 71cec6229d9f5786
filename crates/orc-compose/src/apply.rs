//! Runs the external compose/stack tool against a rewritten document and
//! discovers the containers it produced.
//!
//! Single-host mode shells out to `docker-compose` (project-scoped up/down);
//! cluster mode shells out to the orchestrator's `stack deploy`/`stack rm`,
//! treating the stack name as `deploy-{deployment_id}`.

use crate::error::{ComposeError, Result};
use bollard::models::ContainerSummary;
use orc_runtime::ContainerRuntime;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Label carried by every container this crate deploys, used for the
/// cluster-mode discovery filter.
pub const DEPLOYMENT_ID_LABEL: &str = "orchestrator.deployment_id";

/// Compose-project label Docker Compose itself attaches, used for the
/// single-host discovery filter.
const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

pub fn stack_name(deployment_id: &str) -> String {
    format!("deploy-{deployment_id}")
}

/// `docker-compose -p NAME -f FILE up -d --force-recreate --remove-orphans`.
pub async fn compose_up(project_name: &str, compose_file: &Path) -> Result<()> {
    info!(project = project_name, "applying compose file (single-host)");
    let output = Command::new("docker-compose")
        .arg("-f")
        .arg(compose_file)
        .arg("-p")
        .arg(project_name)
        .arg("up")
        .arg("-d")
        .arg("--force-recreate")
        .arg("--remove-orphans")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        return Err(ComposeError::apply_failed(format!("compose up -p {project_name}"), stderr));
    }
    Ok(())
}

/// `docker-compose -p NAME -f FILE down`, falling back to label-filtered
/// per-container stop/remove when the tool itself fails.
pub async fn compose_down(project_name: &str, compose_file: &Path, deployment_id: &str) -> Result<()> {
    info!(project = project_name, "tearing down compose project (single-host)");
    let output = Command::new("docker-compose")
        .arg("-f")
        .arg(compose_file)
        .arg("-p")
        .arg(project_name)
        .arg("down")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(project = project_name, %stderr, "compose down failed, falling back to label-filtered teardown");
        fallback_teardown(deployment_id).await?;
    }
    Ok(())
}

/// `<orchestrator> stack deploy -c FILE --with-registry-auth NAME`.
pub async fn stack_deploy(stack: &str, compose_file: &Path) -> Result<()> {
    info!(stack, "applying stack (cluster mode)");
    let output = Command::new("docker")
        .arg("stack")
        .arg("deploy")
        .arg("-c")
        .arg(compose_file)
        .arg("--with-registry-auth")
        .arg(stack)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        return Err(ComposeError::apply_failed(format!("stack deploy {stack}"), stderr));
    }
    Ok(())
}

/// `<orchestrator> stack rm NAME`, with the same label-filtered fallback.
pub async fn stack_rm(stack: &str, deployment_id: &str) -> Result<()> {
    info!(stack, "removing stack (cluster mode)");
    let output = Command::new("docker")
        .arg("stack")
        .arg("rm")
        .arg(stack)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(stack, %stderr, "stack rm failed, falling back to label-filtered teardown");
        fallback_teardown(deployment_id).await?;
    }
    Ok(())
}

async fn fallback_teardown(deployment_id: &str) -> Result<()> {
    let runtime = ContainerRuntime::new();
    let containers = discover_by_deployment_label(&runtime, deployment_id).await?;
    for container in containers {
        if let Some(id) = container.id {
            runtime.stop_container(&id, Some(10)).await.ok();
            runtime.remove_container(&id, true).await.ok();
        }
    }
    Ok(())
}

/// Cluster-mode discovery: containers carrying the deployment-id label.
pub async fn discover_by_deployment_label(
    runtime: &ContainerRuntime,
    deployment_id: &str,
) -> Result<Vec<ContainerSummary>> {
    let mut filters = HashMap::new();
    filters.insert("label".to_string(), vec![format!("{DEPLOYMENT_ID_LABEL}={deployment_id}")]);
    Ok(runtime.list_containers(filters, false).await.unwrap_or_default())
}

/// Single-host discovery: containers carrying the compose project label,
/// retried with a lowercased project name to tolerate tool normalization.
pub async fn discover_by_project(runtime: &ContainerRuntime, project_name: &str) -> Result<Vec<ContainerSummary>> {
    let containers = list_by_project(runtime, project_name).await?;
    if !containers.is_empty() {
        return Ok(containers);
    }

    let lowered = project_name.to_lowercase();
    if lowered != project_name {
        debug!(project = project_name, "retrying discovery with lowercased project name");
        return list_by_project(runtime, &lowered).await;
    }
    Ok(containers)
}

async fn list_by_project(runtime: &ContainerRuntime, project_name: &str) -> Result<Vec<ContainerSummary>> {
    let mut filters = HashMap::new();
    filters.insert("label".to_string(), vec![format!("{COMPOSE_PROJECT_LABEL}={project_name}")]);
    Ok(runtime.list_containers(filters, false).await.unwrap_or_default())
}

/// Registers discovered containers, erroring when none are running: a
/// deployment with zero running containers is a failed deploy, not an
/// empty success.
pub fn require_nonempty(containers: Vec<ContainerSummary>, deployment_id: &str) -> Result<Vec<ContainerSummary>> {
    if containers.is_empty() {
        return Err(ComposeError::NoContainersRegistered(deployment_id.to_string()));
    }
    Ok(containers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_name_is_deploy_prefixed() {
        assert_eq!(stack_name("abc123"), "deploy-abc123");
    }

    #[test]
    fn require_nonempty_rejects_empty_list() {
        let result = require_nonempty(Vec::new(), "dep1");
        assert!(result.is_err());
    }
}

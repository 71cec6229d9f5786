//! Thin wrapper over the container runtime's container operations: list,
//! inspect, create, start, stop, remove, exec, tail logs.

use crate::error::{Result, RuntimeError};
use crate::pool::get_runtime_connection;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::container::LogOutput;
use bollard::models::{ContainerInspectResponse, ContainerSummary};
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

/// Tail-log cap: at most 4 KiB of trailing log output is ever returned.
pub const LOG_TAIL_BYTE_CAP: usize = 4 * 1024;

#[derive(Debug, Clone, Default)]
pub struct ContainerRuntime;

impl ContainerRuntime {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self))]
    pub async fn list_containers(&self, filters: HashMap<String, Vec<String>>, all: bool) -> Result<Vec<ContainerSummary>> {
        let filters = filters.into_iter().map(|(k, v)| (k, v)).collect();
        let options = ListContainersOptions { all, filters, ..Default::default() };
        let connection = get_runtime_connection().await?;
        Ok(connection.docker().list_containers(Some(options)).await?)
    }

    #[instrument(skip(self))]
    pub async fn inspect_container(&self, name: &str) -> Result<ContainerInspectResponse> {
        let connection = get_runtime_connection().await?;
        connection
            .docker()
            .inspect_container(name, None)
            .await
            .map_err(|_| RuntimeError::ContainerNotFound(name.to_owned()))
    }

    pub async fn container_exists(&self, name: &str) -> bool {
        self.inspect_container(name).await.is_ok()
    }

    #[instrument(skip(self, config))]
    pub async fn create_container(&self, name: &str, config: Config<String>) -> Result<String> {
        let options = CreateContainerOptions { name, platform: None };
        let connection = get_runtime_connection().await?;
        let response = connection.docker().create_container(Some(options), config).await?;
        Ok(response.id)
    }

    #[instrument(skip(self))]
    pub async fn start_container(&self, name: &str) -> Result<()> {
        let connection = get_runtime_connection().await?;
        connection.docker().start_container(name, None::<StartContainerOptions<String>>).await?;
        Ok(())
    }

    /// Stop proceeds even if the container is missing; failures are logged,
    /// never propagated, so callers can retry freely.
    #[instrument(skip(self))]
    pub async fn stop_container(&self, name: &str, timeout: Option<i64>) -> Result<()> {
        let options = StopContainerOptions { t: timeout.unwrap_or(10) };
        let connection = get_runtime_connection().await?;
        if let Err(e) = connection.docker().stop_container(name, Some(options)).await {
            warn!(container = name, error = %e, "stop_container failed, continuing");
        }
        Ok(())
    }

    /// Remove of a missing container is treated as success.
    #[instrument(skip(self))]
    pub async fn remove_container(&self, name: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions { force, v: true, ..Default::default() };
        let connection = get_runtime_connection().await?;
        match connection.docker().remove_container(name, Some(options)).await {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Stop-then-remove used before (re)creating a deterministically-named
    /// container, so a redeploy never collides with its own prior instance.
    #[instrument(skip(self))]
    pub async fn remove_stale(&self, name: &str) -> Result<()> {
        if self.container_exists(name).await {
            debug!(container = name, "removing stale container before recreation");
            self.stop_container(name, Some(10)).await?;
            self.remove_container(name, true).await?;
        }
        Ok(())
    }

    /// Up to `LOG_TAIL_BYTE_CAP` bytes of combined stdout/stderr tail.
    #[instrument(skip(self))]
    pub async fn tail_logs(&self, name: &str, tail_lines: usize) -> Result<String> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail_lines.to_string(),
            ..Default::default()
        };
        let connection = get_runtime_connection().await?;
        let mut stream = connection.docker().logs(name, Some(options));
        let mut buf = String::new();
        while let Some(Ok(chunk)) = stream.next().await {
            let message = match chunk {
                LogOutput::StdOut { message } | LogOutput::StdErr { message } | LogOutput::Console { message } | LogOutput::StdIn { message } => message,
            };
            buf.push_str(&String::from_utf8_lossy(&message));
            if buf.len() >= LOG_TAIL_BYTE_CAP {
                break;
            }
        }
        buf.truncate(LOG_TAIL_BYTE_CAP.min(buf.len()));
        Ok(buf)
    }
}

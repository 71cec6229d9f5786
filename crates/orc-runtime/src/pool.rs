//! Connection pooling for the container runtime client, so repeated
//! reconciliation passes don't pay per-call connection setup.

use crate::error::{Result, RuntimeError};
use bollard::Docker;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: usize,
    pub max_idle_time: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            max_idle_time: Duration::from_secs(300),
        }
    }
}

struct PooledConnection {
    docker: Docker,
    last_used: Mutex<Instant>,
}

impl PooledConnection {
    fn new(docker: Docker) -> Self {
        Self { docker, last_used: Mutex::new(Instant::now()) }
    }

    async fn mark_used(&self) {
        *self.last_used.lock().await = Instant::now();
    }
}

pub struct RuntimePool {
    connections: Arc<Mutex<Vec<Arc<PooledConnection>>>>,
    semaphore: Arc<Semaphore>,
    config: PoolConfig,
}

impl RuntimePool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            connections: Arc::new(Mutex::new(Vec::new())),
            semaphore: Arc::new(Semaphore::new(config.max_connections)),
            config,
        }
    }

    pub async fn get_connection(&self) -> Result<PooledDocker> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RuntimeError::ConnectionError("failed to acquire connection permit".into()))?;

        let connection = {
            let mut connections = self.connections.lock().await;
            let now = Instant::now();
            let max_idle = self.config.max_idle_time;
            let mut retained = Vec::with_capacity(connections.len());
            for conn in connections.drain(..) {
                let keep = match conn.last_used.try_lock() {
                    Ok(last_used) => now.duration_since(*last_used) <= max_idle,
                    Err(_) => true,
                };
                if keep {
                    retained.push(conn);
                }
            }
            let taken = retained.pop();
            *connections = retained;
            taken
        };

        let pooled = match connection {
            Some(conn) => {
                conn.mark_used().await;
                conn
            }
            None => {
                let docker = Docker::connect_with_local_defaults()
                    .map_err(|e| RuntimeError::ConnectionError(format!("failed to connect: {e}")))?;
                Arc::new(PooledConnection::new(docker))
            }
        };

        Ok(PooledDocker { connection: pooled, pool: self.connections.clone(), _permit: permit })
    }
}

pub struct PooledDocker {
    connection: Arc<PooledConnection>,
    pool: Arc<Mutex<Vec<Arc<PooledConnection>>>>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl PooledDocker {
    pub fn docker(&self) -> &Docker {
        &self.connection.docker
    }
}

impl Drop for PooledDocker {
    fn drop(&mut self) {
        let pool = self.pool.clone();
        let connection = self.connection.clone();
        tokio::spawn(async move {
            pool.lock().await.push(connection);
        });
    }
}

static RUNTIME_POOL: once_cell::sync::Lazy<RuntimePool> = once_cell::sync::Lazy::new(|| RuntimePool::new(PoolConfig::default()));

pub async fn get_runtime_connection() -> Result<PooledDocker> {
    RUNTIME_POOL.get_connection().await
}

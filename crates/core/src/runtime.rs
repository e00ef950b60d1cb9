//! Sandbox runtime contract.
//!
//! The driver only needs a reachable execution endpoint for its tools. How
//! that endpoint comes to exist (a container, a remote VM, a host directory)
//! is the runtime's business.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::info;

use crate::error::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeStatus {
    Uninitialized,
    Created,
    Running,
    Stopped,
}

#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    fn id(&self) -> &str;

    fn status(&self) -> RuntimeStatus;

    /// Provision a new environment.
    async fn create(&self) -> Result<(), RuntimeError>;

    /// Attach to an environment that already exists.
    async fn connect(&self) -> Result<(), RuntimeError>;

    async fn start(&self) -> Result<(), RuntimeError>;

    async fn stop(&self) -> Result<(), RuntimeError>;

    /// Make a port inside the environment reachable and return its URL.
    async fn expose_port(&self, port: u16) -> Result<String, RuntimeError>;

    /// Where tools operate.
    fn workspace_root(&self) -> &Path;
}

/// A runtime backed by a directory on the host.
#[derive(Debug)]
pub struct LocalRuntime {
    id: String,
    root: PathBuf,
    status: Mutex<RuntimeStatus>,
    ports: Mutex<BTreeMap<u16, String>>,
}

impl LocalRuntime {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            id: format!("local:{}", root.display()),
            root,
            status: Mutex::new(RuntimeStatus::Uninitialized),
            ports: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn exposed_ports(&self) -> Vec<u16> {
        self.ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    fn set_status(&self, status: RuntimeStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

#[async_trait]
impl SandboxRuntime for LocalRuntime {
    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> RuntimeStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn create(&self) -> Result<(), RuntimeError> {
        tokio::fs::create_dir_all(&self.root).await?;
        self.set_status(RuntimeStatus::Created);
        info!(runtime = %self.id, "Runtime created");
        Ok(())
    }

    async fn connect(&self) -> Result<(), RuntimeError> {
        let metadata = tokio::fs::metadata(&self.root)
            .await
            .map_err(|_| RuntimeError::NotCreated(self.root.display().to_string()))?;
        if !metadata.is_dir() {
            return Err(RuntimeError::NotCreated(self.root.display().to_string()));
        }
        if self.status() == RuntimeStatus::Uninitialized {
            self.set_status(RuntimeStatus::Created);
        }
        Ok(())
    }

    async fn start(&self) -> Result<(), RuntimeError> {
        if self.status() == RuntimeStatus::Uninitialized {
            return Err(RuntimeError::NotCreated(self.id.clone()));
        }
        self.set_status(RuntimeStatus::Running);
        info!(runtime = %self.id, "Runtime started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), RuntimeError> {
        self.ports.lock().unwrap_or_else(PoisonError::into_inner).clear();
        self.set_status(RuntimeStatus::Stopped);
        info!(runtime = %self.id, "Runtime stopped");
        Ok(())
    }

    async fn expose_port(&self, port: u16) -> Result<String, RuntimeError> {
        if self.status() != RuntimeStatus::Running {
            return Err(RuntimeError::NotRunning(self.id.clone()));
        }
        if port == 0 {
            return Err(RuntimeError::InvalidPort(port));
        }
        let url = format!("http://127.0.0.1:{port}");
        self.ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(port, url.clone());
        Ok(url)
    }

    fn workspace_root(&self) -> &Path {
        &self.root
    }
}

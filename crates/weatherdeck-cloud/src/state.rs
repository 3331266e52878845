//! State management for cloud resources
//!
//! Each stack keeps its state in `.weatherdeck/<stack>.state.json`, which
//! records the outputs of every created resource together with a digest of
//! the inputs it was created from.

use crate::error::{CloudError, Result};
use crate::graph::{OutputTable, ResourceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".weatherdeck";

/// State of one stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackState {
    /// State file version
    pub version: u32,

    /// Stack name
    pub stack: String,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Resources indexed by logical name
    pub resources: BTreeMap<String, ResourceState>,

    /// Stack outputs resolved by the last apply
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
}

impl StackState {
    pub fn new(stack: impl Into<String>) -> Self {
        Self {
            version: STATE_VERSION,
            stack: stack.into(),
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Add or update a resource
    pub fn set_resource(&mut self, key: impl Into<String>, state: ResourceState) {
        self.resources.insert(key.into(), state);
        self.updated_at = Utc::now();
    }

    /// Remove a resource
    pub fn remove_resource(&mut self, key: &str) -> Option<ResourceState> {
        let result = self.resources.remove(key);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    /// Get a resource by key
    pub fn get_resource(&self, key: &str) -> Option<&ResourceState> {
        self.resources.get(key)
    }

    /// Outputs of every recorded resource, for input resolution
    pub fn output_table(&self) -> OutputTable {
        self.resources
            .iter()
            .map(|(name, state)| {
                (
                    ResourceId::new(name.clone()),
                    state.attributes.clone().into_iter().collect(),
                )
            })
            .collect()
    }

    /// Logical names in deletion order: dependents before their dependencies
    pub fn deletion_order(&self) -> Vec<String> {
        let mut order: Vec<String> = Vec::with_capacity(self.resources.len());
        let mut remaining: Vec<&String> = self.resources.keys().collect();

        while !remaining.is_empty() {
            let before = remaining.len();
            remaining.retain(|name| {
                let still_needed = self.resources.iter().any(|(other, state)| {
                    !order.contains(other)
                        && other != *name
                        && state.dependencies.iter().any(|d| d == *name)
                });
                if still_needed {
                    true
                } else {
                    order.push((*name).clone());
                    false
                }
            });

            // Dependency loops cannot be produced by a validated graph; drain
            // whatever is left rather than spin.
            if remaining.len() == before {
                order.extend(remaining.drain(..).cloned());
            }
        }

        order
    }
}

/// State of a single resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Provider-specific resource ID
    pub id: String,

    /// Resource type
    pub resource_type: String,

    /// Current status
    pub status: ResourceStatus,

    /// SHA-256 of the resolved inputs the resource was applied with
    pub inputs_digest: String,

    /// Logical names this resource depended on when applied
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Resource attributes (URI, keys, etc.)
    pub attributes: BTreeMap<String, serde_json::Value>,

    /// When the resource was created
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            status: ResourceStatus::Ready,
            inputs_digest: String::new(),
            dependencies: Vec::new(),
            attributes: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.inputs_digest = digest.into();
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Whether the resource is healthy and was applied from these inputs
    pub fn is_current(&self, resource_type: &str, inputs_digest: &str) -> bool {
        self.status == ResourceStatus::Ready
            && self.resource_type == resource_type
            && self.inputs_digest == inputs_digest
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Resource exists and matches its recorded inputs
    Ready,
    /// Last update failed; the resource is re-applied on the next run
    Error,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Ready => write!(f, "ready"),
            ResourceStatus::Error => write!(f, "error"),
        }
    }
}

/// State manager for reading/writing per-stack state files
#[derive(Debug, Clone)]
pub struct StateManager {
    /// Project root directory
    project_root: PathBuf,

    /// Stack name
    stack: String,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>, stack: impl Into<String>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
            stack: stack.into(),
        }
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// Get the state directory path
    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    /// Get the state file path
    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(format!("{}.state.json", self.stack))
    }

    /// Get the backup file path
    fn backup_path(&self) -> PathBuf {
        self.state_dir()
            .join(format!("{}.state.json.backup", self.stack))
    }

    /// Get the lock file path
    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(format!("{}.lock.json", self.stack))
    }

    /// Ensure the state directory exists
    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the current state
    pub async fn load(&self) -> Result<StackState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!(stack = %self.stack, "State file not found, returning empty state");
            return Ok(StackState::new(&self.stack));
        }

        let content = fs::read_to_string(&path).await?;
        let state: StackState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        if state.stack != self.stack {
            return Err(CloudError::StateError(format!(
                "State file {} belongs to stack '{}', not '{}'",
                path.display(),
                state.stack,
                self.stack
            )));
        }

        tracing::debug!("Loaded state with {} resources", state.resources.len());
        Ok(state)
    }

    /// Save the state
    pub async fn save(&self, state: &StackState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        // Create backup if state file exists
        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created state backup");
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} resources", state.resources.len());
        Ok(())
    }

    /// Acquire a lock for exclusive access
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // Locks older than an hour are considered abandoned
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::LockError(format!(
                    "Stack '{}' is locked by {} since {}",
                    self.stack, lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!(stack = %self.stack, "Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

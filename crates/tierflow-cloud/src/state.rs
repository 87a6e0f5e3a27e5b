//! Recorded state of a stack
//!
//! Each stack keeps its own directory `.tierflow/<stack>/`:
//!
//! - `state.json`: what the last apply left behind, written atomically
//! - `state.json.backup`: the previous `state.json`
//! - `lock.json`: present while an apply is running

use crate::error::{CloudError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Directory under the project root holding per-stack state
pub const STATE_DIR: &str = ".tierflow";

const FORMAT_VERSION: u32 = 1;
const STATE_FILE: &str = "state.json";
const BACKUP_FILE: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

fn stale_after() -> Duration {
    Duration::hours(1)
}

/// Resources and outputs recorded by the last apply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    /// On-disk format version
    pub version: u32,

    /// Bumped by every save
    #[serde(default)]
    pub serial: u64,

    pub updated_at: DateTime<Utc>,

    /// Keyed by resource address (`type.name`)
    pub resources: BTreeMap<String, ResourceState>,

    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            serial: 0,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_resource(&mut self, address: String, resource: ResourceState) {
        self.resources.insert(address, resource);
    }

    pub fn remove_resource(&mut self, address: &str) -> Option<ResourceState> {
        self.resources.remove(address)
    }

    pub fn get_resource(&self, address: &str) -> Option<&ResourceState> {
        self.resources.get(address)
    }

    /// `attribute` of the resource at `address`, if both are recorded
    pub fn attribute(&self, address: &str, attribute: &str) -> Option<&serde_json::Value> {
        self.get_resource(address)?.attributes.get(attribute)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// One recorded resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Identifier assigned by the cloud (vpc-…, subnet-…, table name, …)
    pub id: String,

    pub resource_type: String,

    pub status: ResourceStatus,

    /// Declared configuration with references left unresolved.
    /// The planner compares against this, not against `attributes`.
    #[serde(default)]
    pub config: serde_json::Value,

    /// Resolved arguments plus computed attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub depends_on: Vec<String>,

    pub created_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            status: ResourceStatus::Unknown,
            config: serde_json::Value::Null,
            attributes: BTreeMap::new(),
            depends_on: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// Typed view of one attribute
    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.attributes.get(key)?;
        serde_json::from_value(value.clone()).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Created and recorded by a successful action
    Available,
    /// Read back from an engine that does not report status
    Unknown,
    /// Left behind by an apply that stopped partway; its attributes may still
    /// point at resources replaced in that run, so the next plan replaces it
    Tainted,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Available => "available",
            ResourceStatus::Unknown => "unknown",
            ResourceStatus::Tainted => "tainted",
        }
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reads and writes the state directory of one stack
pub struct StateManager {
    dir: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>, stack: &str) -> Self {
        Self {
            dir: project_root.as_ref().join(STATE_DIR).join(stack),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.dir
    }

    /// Recorded state, or an empty one before the first apply
    pub async fn load(&self) -> Result<GlobalState> {
        let content = match fs::read_to_string(self.dir.join(STATE_FILE)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(dir = %self.dir.display(), "No state recorded yet");
                return Ok(GlobalState::new());
            }
            Err(e) => return Err(e.into()),
        };

        let state: GlobalState = serde_json::from_str(&content)?;
        if state.version != FORMAT_VERSION {
            return Err(CloudError::StateError(format!(
                "{}: unsupported state format {} (expected {})",
                self.dir.join(STATE_FILE).display(),
                state.version,
                FORMAT_VERSION
            )));
        }

        tracing::debug!(
            serial = state.serial,
            resources = state.resources.len(),
            "Loaded state"
        );
        Ok(state)
    }

    /// Persist `state`, bumping its serial
    ///
    /// The previous file is copied to `state.json.backup` and the new one is
    /// written to a temporary file first, so an interrupted save never leaves
    /// a truncated `state.json`.
    pub async fn save(&self, state: &mut GlobalState) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(STATE_FILE);
        match fs::copy(&path, self.dir.join(BACKUP_FILE)).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        state.serial += 1;
        state.updated_at = Utc::now();

        let tmp = self.dir.join(format!("{}.tmp", STATE_FILE));
        write_replacing(&tmp, &path, &serde_json::to_vec_pretty(state)?).await?;

        tracing::debug!(
            serial = state.serial,
            resources = state.resources.len(),
            "Saved state"
        );
        Ok(())
    }

    /// Take the apply lock of this stack
    ///
    /// A lock older than one hour is assumed to belong to a crashed run and
    /// is taken over.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(LOCK_FILE);

        for _ in 0..2 {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    let holder = LockHolder::current();
                    file.write_all(&serde_json::to_vec_pretty(&holder)?).await?;
                    file.flush().await?;
                    tracing::debug!(pid = holder.pid, "Acquired state lock");
                    return Ok(StateLock { path: Some(path) });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let content = fs::read_to_string(&path).await?;
                    match serde_json::from_str::<LockHolder>(&content) {
                        Ok(holder) if Utc::now() - holder.acquired_at < stale_after() => {
                            return Err(CloudError::LockError(format!(
                                "{} is locked by {} (pid {}) since {}",
                                self.dir.display(),
                                holder.host,
                                holder.pid,
                                holder.acquired_at
                            )));
                        }
                        Ok(holder) => tracing::warn!(
                            host = %holder.host,
                            pid = holder.pid,
                            "Taking over stale state lock"
                        ),
                        Err(_) => tracing::warn!("Taking over unreadable state lock"),
                    }
                    fs::remove_file(&path).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CloudError::LockError(format!(
            "{} could not be locked",
            self.dir.display()
        )))
    }
}

/// Contents of `lock.json`
#[derive(Debug, Serialize, Deserialize)]
struct LockHolder {
    host: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

impl LockHolder {
    fn current() -> Self {
        Self {
            host: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "localhost".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }
}

/// Held apply lock; removed on [`release`](StateLock::release) or drop
pub struct StateLock {
    path: Option<PathBuf>,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if let Some(path) = self.path.take() {
            match fs::remove_file(&path).await {
                Ok(()) => tracing::debug!("Released state lock"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Write `contents` to `tmp`, then move it over `path`
///
/// `tmp` never outlives a failed rename.
async fn write_replacing(tmp: &Path, path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(tmp, contents).await?;
    if let Err(e) = fs::rename(tmp, path).await {
        if let Err(cleanup) = fs::remove_file(tmp).await {
            tracing::warn!("Could not remove {}: {}", tmp.display(), cleanup);
        }
        return Err(e.into());
    }
    Ok(())
}

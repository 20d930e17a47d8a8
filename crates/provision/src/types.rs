//! Core types for account reconciliation

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Name of the per-account SSH directory inside the home directory
pub const SSH_DIR: &str = ".ssh";

/// Authorization list inside [`SSH_DIR`]
pub const AUTHORIZED_KEYS: &str = "authorized_keys";

/// Policy file inside a slice override directory
pub const POLICY_FILE: &str = "override.conf";

/// Desired state of a manifest record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesiredState {
    /// Account should exist
    Present,
    /// Anything else, including an empty or missing state. Left alone.
    Other(String),
}

impl DesiredState {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("present") => Self::Present,
            other => Self::Other(other.unwrap_or_default().to_string()),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present)
    }
}

impl Default for DesiredState {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl std::fmt::Display for DesiredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Present => f.write_str("present"),
            Self::Other(s) if s.is_empty() => f.write_str("<unset>"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// One desired account, as declared in the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIntent {
    pub username: String,
    /// Used as uid, gid and in the slice name
    pub id: u32,
    /// Empty means no SSH access is configured
    pub public_key: String,
    /// Written verbatim into the slice override
    pub resource_limits: String,
    pub state: DesiredState,
}

impl UserIntent {
    /// Create a `present` intent with no key and no limits
    pub fn present(username: &str, id: u32) -> Self {
        Self {
            username: username.to_string(),
            id,
            public_key: String::new(),
            resource_limits: String::new(),
            state: DesiredState::Present,
        }
    }

    pub fn with_public_key(mut self, key: &str) -> Self {
        self.public_key = key.to_string();
        self
    }

    pub fn with_resource_limits(mut self, limits: &str) -> Self {
        self.resource_limits = limits.to_string();
        self
    }

    pub fn with_state(mut self, state: DesiredState) -> Self {
        self.state = state;
        self
    }

    /// First character of the username, naming the home bucket
    pub fn bucket(&self) -> &str {
        match self.username.char_indices().nth(1) {
            Some((end, _)) => &self.username[..end],
            None => &self.username,
        }
    }

    pub fn has_public_key(&self) -> bool {
        !self.public_key.is_empty()
    }
}

/// Host layout and defaults used while provisioning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Login shell for every created account
    pub shell: String,
    /// Parent of the per-letter home buckets
    pub home_root: PathBuf,
    /// Directory holding `user-<id>.slice.d` overrides
    pub policy_root: PathBuf,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            shell: "/bin/bash".to_string(),
            home_root: PathBuf::from("/home"),
            policy_root: PathBuf::from("/etc/systemd/system"),
        }
    }
}

impl ProvisionConfig {
    pub fn bucket_dir(&self, intent: &UserIntent) -> PathBuf {
        self.home_root.join(intent.bucket())
    }

    pub fn home_dir(&self, intent: &UserIntent) -> PathBuf {
        self.bucket_dir(intent).join(&intent.username)
    }

    pub fn ssh_dir(&self, intent: &UserIntent) -> PathBuf {
        self.home_dir(intent).join(SSH_DIR)
    }

    pub fn authorized_keys(&self, intent: &UserIntent) -> PathBuf {
        self.ssh_dir(intent).join(AUTHORIZED_KEYS)
    }

    /// Slice override directory, e.g. `/etc/systemd/system/user-2001.slice.d`
    pub fn policy_dir(&self, intent: &UserIntent) -> PathBuf {
        self.policy_root.join(format!("user-{}.slice.d", intent.id))
    }

    pub fn policy_file(&self, intent: &UserIntent) -> PathBuf {
        self.policy_dir(intent).join(POLICY_FILE)
    }
}

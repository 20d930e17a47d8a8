//! Resource policy writer
//!
//! Each provisioned account gets a systemd drop-in at
//! `<policy_root>/user-<id>.slice.d/override.conf` whose contents are the
//! manifest's limit text, written byte for byte.

use crate::error::{PolicyError, PolicyStep};
use crate::fs::Filesystem;
use crate::provisioner::PlannedAction;
use crate::types::{ProvisionConfig, UserIntent};
use std::path::PathBuf;

pub const POLICY_DIR_MODE: u32 = 0o755;
pub const POLICY_FILE_MODE: u32 = 0o644;

/// Writes per-account slice overrides
pub struct PolicyWriter<'a> {
    config: &'a ProvisionConfig,
    fs: &'a dyn Filesystem,
}

impl<'a> PolicyWriter<'a> {
    pub fn new(config: &'a ProvisionConfig, fs: &'a dyn Filesystem) -> Self {
        Self { config, fs }
    }

    /// Create the override directory and write the limits into it.
    ///
    /// The directory must not exist yet. The file is truncated if present.
    /// Returns the path of the written file.
    pub fn write_policy(&self, intent: &UserIntent) -> Result<PathBuf, PolicyError> {
        let dir = self.config.policy_dir(intent);
        let file = self.config.policy_file(intent);

        let failed = |step, source| PolicyError {
            username: intent.username.clone(),
            step,
            source,
        };

        self.fs
            .create_dir(&dir, POLICY_DIR_MODE)
            .map_err(|e| failed(PolicyStep::CreateDir, e))?;

        self.fs
            .write_file(&file, POLICY_FILE_MODE, intent.resource_limits.as_bytes())
            .map_err(|e| failed(PolicyStep::WriteFile, e))?;

        log::debug!(
            "{}: wrote {} bytes to {}",
            intent.username,
            intent.resource_limits.len(),
            file.display()
        );
        Ok(file)
    }

    /// Describe what [`write_policy`](Self::write_policy) would do
    pub fn plan(&self, intent: &UserIntent) -> Vec<PlannedAction> {
        vec![
            PlannedAction::new(
                PolicyStep::CreateDir.label(),
                self.config.policy_dir(intent).display().to_string(),
            ),
            PlannedAction::new(
                PolicyStep::WriteFile.label(),
                self.config.policy_file(intent).display().to_string(),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{HostFilesystem, MemoryFilesystem};
    use std::path::Path;

    #[test]
    fn test_write_policy() {
        let config = ProvisionConfig::default();
        let fs = MemoryFilesystem::new();
        let writer = PolicyWriter::new(&config, &fs);

        let intent = UserIntent::present("alice", 2001).with_resource_limits("MemoryMax=2G");
        let path = writer.write_policy(&intent).unwrap();

        assert_eq!(
            path,
            Path::new("/etc/systemd/system/user-2001.slice.d/override.conf")
        );
        assert!(fs.is_dir("/etc/systemd/system/user-2001.slice.d"));
        let entry = fs.entry(&path).unwrap();
        assert_eq!(entry.mode, POLICY_FILE_MODE);
        assert_eq!(fs.read(&path).unwrap(), b"MemoryMax=2G");
    }

    #[test]
    fn test_empty_limits_write_empty_file() {
        let config = ProvisionConfig::default();
        let fs = MemoryFilesystem::new();
        let writer = PolicyWriter::new(&config, &fs);

        let path = writer.write_policy(&UserIntent::present("bob", 7)).unwrap();
        assert_eq!(fs.read(&path).unwrap(), b"");
    }

    #[test]
    fn test_existing_dir_fails() {
        let config = ProvisionConfig::default();
        let fs = MemoryFilesystem::new().with_dir("/etc/systemd/system/user-7.slice.d");
        let writer = PolicyWriter::new(&config, &fs);

        let err = writer.write_policy(&UserIntent::present("bob", 7)).unwrap_err();
        assert_eq!(err.username, "bob");
        assert_eq!(err.step, PolicyStep::CreateDir);
    }

    #[test]
    fn test_file_failure() {
        let config = ProvisionConfig::default();
        let fs = MemoryFilesystem::new();
        fs.fail_on("/etc/systemd/system/user-7.slice.d/override.conf");
        let writer = PolicyWriter::new(&config, &fs);

        let err = writer.write_policy(&UserIntent::present("bob", 7)).unwrap_err();
        assert_eq!(err.step, PolicyStep::WriteFile);
    }

    #[test]
    fn test_plan_lists_dir_and_file() {
        let config = ProvisionConfig::default();
        let fs = MemoryFilesystem::new();
        let writer = PolicyWriter::new(&config, &fs);

        let plan = writer.plan(&UserIntent::present("bob", 7));
        let labels: Vec<_> = plan.iter().map(|a| a.label).collect();
        assert_eq!(labels, ["create slice override directory", "write slice override"]);
        assert_eq!(plan[0].target, "/etc/systemd/system/user-7.slice.d");
        assert_eq!(fs.mutations(), 0);
    }

    #[test]
    fn test_round_trip_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ProvisionConfig {
            policy_root: tmp.path().to_path_buf(),
            ..Default::default()
        };
        let writer = PolicyWriter::new(&config, &HostFilesystem);

        let limits = "[Slice]\nMemoryMax=2G\nCPUQuota=150%\n# trailing comment without newline";
        let intent = UserIntent::present("alice", 2001).with_resource_limits(limits);
        let path = writer.write_policy(&intent).unwrap();

        assert_eq!(path, tmp.path().join("user-2001.slice.d").join("override.conf"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), limits);
    }
}

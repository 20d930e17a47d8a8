//! Account provisioning
//!
//! Creates the bucket directory, group, account and SSH authorization for a
//! user that is known to be absent. Not idempotent: callers check existence
//! first and must not provision the same username twice.

use crate::directory::{AccountDirectory, AccountSpec};
use crate::error::{ProvisionError, ProvisionStep, StepError};
use crate::fs::Filesystem;
use crate::types::{ProvisionConfig, UserIntent};
use std::fmt;

/// Mode of the shared per-letter home bucket
pub const BUCKET_MODE: u32 = 0o755;

/// Mode of `~/.ssh`
pub const SSH_DIR_MODE: u32 = 0o700;

/// Mode of `~/.ssh/authorized_keys`
pub const AUTHORIZED_KEYS_MODE: u32 = 0o600;

/// One step that would run, for dry-run reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub label: &'static str,
    pub target: String,
}

impl PlannedAction {
    pub fn new(label: &'static str, target: impl Into<String>) -> Self {
        Self {
            label,
            target: target.into(),
        }
    }
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.target)
    }
}

/// Creates accounts and their home material
pub struct AccountProvisioner<'a> {
    config: &'a ProvisionConfig,
    directory: &'a dyn AccountDirectory,
    fs: &'a dyn Filesystem,
}

impl<'a> AccountProvisioner<'a> {
    pub fn new(
        config: &'a ProvisionConfig,
        directory: &'a dyn AccountDirectory,
        fs: &'a dyn Filesystem,
    ) -> Self {
        Self {
            config,
            directory,
            fs,
        }
    }

    /// Provision one absent account.
    ///
    /// Stops at the first failing step; earlier steps are left in place.
    pub fn provision(&self, intent: &UserIntent) -> Result<(), ProvisionError> {
        let bucket = self.config.bucket_dir(intent);

        log::debug!("{}: ensuring bucket {}", intent.username, bucket.display());
        self.fs
            .ensure_dir(&bucket, BUCKET_MODE)
            .map_err(|e| failed(intent, ProvisionStep::EnsureBucket, e))?;

        log::debug!("{}: creating group with gid {}", intent.username, intent.id);
        self.directory
            .create_group(&intent.username, intent.id)
            .map_err(|e| failed(intent, ProvisionStep::CreateGroup, e))?;

        log::debug!("{}: creating account with uid {}", intent.username, intent.id);
        self.directory
            .create_account(&self.account_spec(intent))
            .map_err(|e| failed(intent, ProvisionStep::CreateAccount, e))?;

        if !intent.has_public_key() {
            log::debug!("{}: no public key, skipping ssh setup", intent.username);
            return Ok(());
        }

        let ssh_dir = self.config.ssh_dir(intent);
        let keys = self.config.authorized_keys(intent);

        self.fs
            .create_dir(&ssh_dir, SSH_DIR_MODE)
            .map_err(|e| failed(intent, ProvisionStep::CreateSshDir, e))?;

        self.fs
            .append_file(&keys, AUTHORIZED_KEYS_MODE, intent.public_key.as_bytes())
            .map_err(|e| failed(intent, ProvisionStep::WriteAuthorizedKeys, e))?;

        for path in [&ssh_dir, &keys] {
            self.fs
                .chown(path, intent.id, intent.id)
                .map_err(|e| failed(intent, ProvisionStep::ChownSsh, e))?;
        }

        log::debug!("{}: wrote {}", intent.username, keys.display());
        Ok(())
    }

    /// Describe what [`provision`](Self::provision) would do
    pub fn plan(&self, intent: &UserIntent) -> Vec<PlannedAction> {
        let mut actions = vec![
            PlannedAction::new(
                ProvisionStep::EnsureBucket.label(),
                self.config.bucket_dir(intent).display().to_string(),
            ),
            PlannedAction::new(
                ProvisionStep::CreateGroup.label(),
                format!("{} (gid {})", intent.username, intent.id),
            ),
            PlannedAction::new(
                ProvisionStep::CreateAccount.label(),
                format!(
                    "{} (uid {}, home {}, shell {})",
                    intent.username,
                    intent.id,
                    self.config.home_dir(intent).display(),
                    self.config.shell
                ),
            ),
        ];

        if intent.has_public_key() {
            let ssh_dir = self.config.ssh_dir(intent);
            let keys = self.config.authorized_keys(intent);
            actions.extend([
                PlannedAction::new(
                    ProvisionStep::CreateSshDir.label(),
                    ssh_dir.display().to_string(),
                ),
                PlannedAction::new(
                    ProvisionStep::WriteAuthorizedKeys.label(),
                    keys.display().to_string(),
                ),
                PlannedAction::new(
                    ProvisionStep::ChownSsh.label(),
                    format!("{} {}:{}", ssh_dir.display(), intent.id, intent.id),
                ),
            ]);
        }

        actions
    }

    fn account_spec(&self, intent: &UserIntent) -> AccountSpec {
        AccountSpec {
            username: intent.username.clone(),
            uid: intent.id,
            group: intent.username.clone(),
            shell: self.config.shell.clone(),
            home: self.config.home_dir(intent),
            create_home: true,
        }
    }
}

fn failed(intent: &UserIntent, step: ProvisionStep, source: impl Into<StepError>) -> ProvisionError {
    ProvisionError {
        username: intent.username.clone(),
        step,
        source: source.into(),
    }
}

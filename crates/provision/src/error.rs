//! Error types for reconciliation.
//!
//! Every failure is fatal to the run. The variants exist so the caller can
//! report which user and which step broke, not to drive recovery.

use crate::manifest::ManifestFormat;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The manifest could not be read or decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Manifest file could not be read
    #[error("could not read manifest {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Structural or type error reported by the decoder
    #[error("invalid {format} manifest: {message}")]
    Syntax {
        format: ManifestFormat,
        message: String,
    },

    /// A record decoded but violates a field invariant
    #[error("invalid manifest record #{index}: {message}")]
    InvalidRecord { index: usize, message: String },
}

/// The account database could not answer an existence query.
///
/// "No such account" is never reported through this type.
#[derive(Debug, Error)]
#[error("could not look up account {username}")]
pub struct LookupError {
    pub username: String,
    #[source]
    pub source: io::Error,
}

/// An external command could not be run or exited unsuccessfully.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The process could not be spawned
    #[error("failed to execute `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The process ran and reported failure
    #[error("`{command}` failed with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// A filesystem operation failed.
#[derive(Debug, Error)]
#[error("failed to {op} {}", .path.display())]
pub struct FsError {
    pub op: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl FsError {
    pub fn new(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Step of account provisioning, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    EnsureBucket,
    CreateGroup,
    CreateAccount,
    CreateSshDir,
    WriteAuthorizedKeys,
    ChownSsh,
}

impl ProvisionStep {
    pub fn label(&self) -> &'static str {
        match self {
            Self::EnsureBucket => "ensure home bucket",
            Self::CreateGroup => "create group",
            Self::CreateAccount => "create account",
            Self::CreateSshDir => "create .ssh directory",
            Self::WriteAuthorizedKeys => "write authorized_keys",
            Self::ChownSsh => "chown ssh material",
        }
    }
}

impl std::fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Underlying cause of a failed provisioning step.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Provisioning of one account stopped at `step`.
///
/// Earlier steps are not undone.
#[derive(Debug, Error)]
#[error("failed to provision {username}: {step}")]
pub struct ProvisionError {
    pub username: String,
    pub step: ProvisionStep,
    #[source]
    pub source: StepError,
}

/// Step of the resource policy write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyStep {
    CreateDir,
    WriteFile,
}

impl PolicyStep {
    pub fn label(&self) -> &'static str {
        match self {
            Self::CreateDir => "create slice override directory",
            Self::WriteFile => "write slice override",
        }
    }
}

impl std::fmt::Display for PolicyStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The resource policy fragment for one account could not be written.
#[derive(Debug, Error)]
#[error("failed to write resource policy for {username}: {step}")]
pub struct PolicyError {
    pub username: String,
    pub step: PolicyStep,
    #[source]
    pub source: FsError,
}

/// The service manager could not be reached or refused to reload.
#[derive(Debug, Error)]
pub enum ServiceManagerError {
    /// No connection to the system bus
    #[error("failed to connect to the service manager over D-Bus")]
    Connect(#[source] zbus::Error),

    /// The `Reload` call failed or was refused
    #[error("failed to reload service manager configuration")]
    Reload(#[source] zbus::Error),
}

/// Any error that aborts a reconciliation run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    ServiceManager(#[from] ServiceManagerError),
}

impl ReconcileError {
    /// Username the failure is attributed to, if any.
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Lookup(e) => Some(&e.username),
            Self::Provision(e) => Some(&e.username),
            Self::Policy(e) => Some(&e.username),
            Self::Decode(_) | Self::ServiceManager(_) => None,
        }
    }
}

/// Result type for reconciliation operations
pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_provision_error_names_user_and_step() {
        let err = ProvisionError {
            username: "bob".to_string(),
            step: ProvisionStep::CreateAccount,
            source: StepError::Command(CommandError::Failed {
                command: "useradd bob".to_string(),
                status: "exit code 9".to_string(),
                stderr: "username already in use".to_string(),
            }),
        };

        assert_eq!(err.to_string(), "failed to provision bob: create account");
        let source = err.source().unwrap().to_string();
        assert!(source.contains("useradd bob"));
        assert!(source.contains("exit code 9"));
    }

    #[test]
    fn test_reconcile_error_username() {
        let lookup = ReconcileError::from(LookupError {
            username: "alice".to_string(),
            source: io::Error::other("nss unreachable"),
        });
        assert_eq!(lookup.username(), Some("alice"));

        let decode = ReconcileError::from(DecodeError::InvalidRecord {
            index: 0,
            message: "username is empty".to_string(),
        });
        assert_eq!(decode.username(), None);
    }
}

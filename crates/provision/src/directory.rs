//! Account directory adapter
//!
//! The [`AccountDirectory`] trait is the only way reconciliation touches the
//! system's user and group database. [`SystemDirectory`] queries NSS for
//! existence and shells out to `groupadd`/`useradd` for creation;
//! [`MockDirectory`] keeps everything in memory for tests.

use crate::error::{CommandError, LookupError};
use crate::runner::CommandRunner;
use nix::errno::Errno;
use nix::unistd::User;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Everything needed to create one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSpec {
    pub username: String,
    pub uid: u32,
    /// Primary group name
    pub group: String,
    pub shell: String,
    pub home: PathBuf,
    /// Create the home directory and copy the skeleton into it
    pub create_home: bool,
}

/// Query and mutate the system account database
pub trait AccountDirectory: Send + Sync {
    /// Whether an account named `username` exists.
    ///
    /// Only a definite "no such account" answer yields `Ok(false)`.
    fn exists(&self, username: &str) -> Result<bool, LookupError>;

    /// Create a group with a fixed gid
    fn create_group(&self, name: &str, gid: u32) -> Result<(), CommandError>;

    /// Create an account
    fn create_account(&self, spec: &AccountSpec) -> Result<(), CommandError>;
}

/// The host's account database, via NSS and the shadow utilities
#[derive(Debug, Clone)]
pub struct SystemDirectory<R> {
    runner: R,
}

impl<R: CommandRunner> SystemDirectory<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> AccountDirectory for SystemDirectory<R> {
    fn exists(&self, username: &str) -> Result<bool, LookupError> {
        match User::from_name(username) {
            Ok(found) => Ok(found.is_some()),
            // Some NSS modules report a missing entry as an error
            Err(Errno::ENOENT | Errno::ESRCH) => Ok(false),
            Err(errno) => Err(LookupError {
                username: username.to_string(),
                source: io::Error::from(errno),
            }),
        }
    }

    fn create_group(&self, name: &str, gid: u32) -> Result<(), CommandError> {
        let gid = gid.to_string();
        log::debug!("groupadd -g {} {}", gid, name);
        self.runner.run_checked("groupadd", &["-g", gid.as_str(), name])?;
        Ok(())
    }

    fn create_account(&self, spec: &AccountSpec) -> Result<(), CommandError> {
        let uid = spec.uid.to_string();
        let home = spec.home.to_string_lossy();

        let mut args = vec!["-d", &*home];
        if spec.create_home {
            args.push("-m");
        }
        args.extend([
            "-u",
            uid.as_str(),
            "-g",
            spec.group.as_str(),
            "-s",
            spec.shell.as_str(),
            spec.username.as_str(),
        ]);

        log::debug!("useradd {}", args.join(" "));
        self.runner.run_checked("useradd", &args)?;
        Ok(())
    }
}

/// Operations a [`MockDirectory`] can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryOp {
    Lookup,
    CreateGroup,
    CreateAccount,
}

#[derive(Debug, Default)]
struct MockDirectoryState {
    users: BTreeSet<String>,
    groups: BTreeMap<String, u32>,
    accounts: Vec<AccountSpec>,
    mutations: usize,
    failures: Vec<(DirectoryOp, String)>,
}

/// In-memory account directory.
///
/// Created accounts become visible to later `exists` calls, like the real
/// database.
#[derive(Debug, Clone, Default)]
pub struct MockDirectory {
    state: Arc<Mutex<MockDirectoryState>>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a pre-existing account
    pub fn with_user(self, username: &str) -> Self {
        self.state.lock().unwrap().users.insert(username.to_string());
        self
    }

    /// Make `op` fail for `username` (or group name)
    pub fn fail(&self, op: DirectoryOp, username: &str) {
        let mut state = self.state.lock().unwrap();
        state.failures.push((op, username.to_string()));
    }

    /// Accounts created through this directory, in order
    pub fn accounts(&self) -> Vec<AccountSpec> {
        self.state.lock().unwrap().accounts.clone()
    }

    /// Gid of a group created through this directory
    pub fn group(&self, name: &str) -> Option<u32> {
        self.state.lock().unwrap().groups.get(name).copied()
    }

    /// Number of create calls attempted, failed ones included
    pub fn mutations(&self) -> usize {
        self.state.lock().unwrap().mutations
    }

    fn should_fail(state: &MockDirectoryState, op: DirectoryOp, name: &str) -> bool {
        state.failures.iter().any(|(o, n)| *o == op && n == name)
    }
}

impl AccountDirectory for MockDirectory {
    fn exists(&self, username: &str) -> Result<bool, LookupError> {
        let state = self.state.lock().unwrap();
        if Self::should_fail(&state, DirectoryOp::Lookup, username) {
            return Err(LookupError {
                username: username.to_string(),
                source: io::Error::other("directory service unreachable"),
            });
        }
        Ok(state.users.contains(username))
    }

    fn create_group(&self, name: &str, gid: u32) -> Result<(), CommandError> {
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        if Self::should_fail(&state, DirectoryOp::CreateGroup, name) || state.groups.contains_key(name)
        {
            return Err(CommandError::Failed {
                command: format!("groupadd -g {gid} {name}"),
                status: "exit code 9".to_string(),
                stderr: format!("groupadd: group '{name}' already exists"),
            });
        }
        state.groups.insert(name.to_string(), gid);
        Ok(())
    }

    fn create_account(&self, spec: &AccountSpec) -> Result<(), CommandError> {
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        if Self::should_fail(&state, DirectoryOp::CreateAccount, &spec.username) {
            return Err(CommandError::Failed {
                command: format!("useradd {}", spec.username),
                status: "exit code 1".to_string(),
                stderr: "useradd: cannot lock /etc/passwd; try again later.".to_string(),
            });
        }
        state.users.insert(spec.username.clone());
        state.accounts.push(spec.clone());
        Ok(())
    }
}

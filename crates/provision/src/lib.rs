//! # provision
//!
//! Reconcile Unix accounts and systemd user-slice limits against a
//! declarative manifest.
//!
//! For every manifest record whose state is `present` and whose account does
//! not exist, the reconciler creates the home bucket, group, account, SSH
//! `authorized_keys` and a `user-<id>.slice.d/override.conf` drop-in, then
//! asks the service manager to reload once all records are processed.
//!
//! ## Example
//!
//! ```no_run
//! use provision::{
//!     HostFilesystem, NoObserver, ProvisionConfig, Reconciler, SystemDirectory, Systemd,
//! };
//! # use provision::{CommandOutput, CommandRunner};
//! # struct Host;
//! # impl CommandRunner for Host {
//! #     fn run(&self, program: &str, args: &[&str]) -> std::io::Result<CommandOutput> {
//! #         std::process::Command::new(program).args(args).output().map(Into::into)
//! #     }
//! # }
//!
//! let config = ProvisionConfig::default();
//! let systemd = Systemd::connect()?;
//! let directory = SystemDirectory::new(Host);
//!
//! let summary = Reconciler::new(&config, &directory, &HostFilesystem, &systemd)
//!     .reconcile_path("users.toml".as_ref(), &mut NoObserver)?;
//! println!("provisioned {} accounts", summary.provisioned);
//! # Ok::<(), provision::ReconcileError>(())
//! ```
//!
//! ## Boundaries
//!
//! Every side effect goes through a trait so the reconciliation logic can be
//! tested in memory:
//!
//! - [`AccountDirectory`]: existence checks, group and account creation
//! - [`Filesystem`]: directories, files, ownership
//! - [`ServiceManager`]: configuration reload
//! - [`CommandRunner`]: external programs used by the system adapters

pub mod directory;
pub mod error;
pub mod fs;
pub mod manifest;
pub mod policy;
pub mod provisioner;
pub mod reconcile;
pub mod runner;
pub mod service;
pub mod types;

pub use directory::{AccountDirectory, AccountSpec, MockDirectory, SystemDirectory};
pub use error::{
    CommandError, DecodeError, FsError, LookupError, PolicyError, PolicyStep, ProvisionError,
    ProvisionStep, ReconcileError, ServiceManagerError,
};
pub use fs::{Filesystem, HostFilesystem, MemoryFilesystem};
pub use manifest::ManifestFormat;
pub use policy::PolicyWriter;
pub use provisioner::{AccountProvisioner, PlannedAction};
pub use reconcile::{
    NoObserver, ReconcileObserver, ReconcileOptions, ReconcileSummary, Reconciler,
};
pub use runner::{CommandOutput, CommandRunner, MockRunner};
pub use service::{MockServiceManager, ServiceManager, Systemd};
pub use types::{DesiredState, ProvisionConfig, UserIntent};

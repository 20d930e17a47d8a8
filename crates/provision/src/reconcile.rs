//! Reconciliation driver
//!
//! Walks the manifest in order, provisions every `present` account that does
//! not exist yet and reloads the service manager once at the end. The first
//! error stops the run: nothing is cleaned up, later records are not looked
//! at, and the reload does not happen.

use crate::directory::AccountDirectory;
use crate::error::Result;
use crate::fs::Filesystem;
use crate::manifest;
use crate::policy::PolicyWriter;
use crate::provisioner::{AccountProvisioner, PlannedAction};
use crate::service::ServiceManager;
use crate::types::{ProvisionConfig, UserIntent};
use std::path::Path;

/// Options for a reconciliation run
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Check existence only; report what would be created, change nothing
    pub dry_run: bool,
}

/// What a run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub provisioned: usize,
    /// Absent accounts a dry run would have created
    pub planned: usize,
    /// `present` records whose account already existed
    pub existing: usize,
    /// Records with any state other than `present`
    pub ignored: usize,
    pub reloaded: bool,
}

impl ReconcileSummary {
    /// Total number of records seen
    pub fn total(&self) -> usize {
        self.provisioned + self.planned + self.existing + self.ignored
    }

    /// Whether the run created anything
    pub fn has_changes(&self) -> bool {
        self.provisioned > 0
    }
}

/// Receives progress updates during reconciliation
pub trait ReconcileObserver {
    /// Called once with the number of manifest records
    fn on_start(&mut self, total: usize);

    /// Record skipped because its state is not `present`
    fn on_ignored(&mut self, intent: &UserIntent);

    /// Record skipped because the account exists
    fn on_existing(&mut self, intent: &UserIntent);

    /// Dry run: the steps that would run for an absent account
    fn on_planned(&mut self, intent: &UserIntent, actions: &[PlannedAction]);

    /// Account, keys and policy created
    fn on_provisioned(&mut self, intent: &UserIntent, policy: &Path);

    /// Service manager reloaded
    fn on_reloaded(&mut self);
}

/// No-op observer
pub struct NoObserver;

impl ReconcileObserver for NoObserver {
    fn on_start(&mut self, _total: usize) {}
    fn on_ignored(&mut self, _intent: &UserIntent) {}
    fn on_existing(&mut self, _intent: &UserIntent) {}
    fn on_planned(&mut self, _intent: &UserIntent, _actions: &[PlannedAction]) {}
    fn on_provisioned(&mut self, _intent: &UserIntent, _policy: &Path) {}
    fn on_reloaded(&mut self) {}
}

/// Drives a reconciliation run against injected collaborators
pub struct Reconciler<'a> {
    config: &'a ProvisionConfig,
    directory: &'a dyn AccountDirectory,
    fs: &'a dyn Filesystem,
    service: &'a dyn ServiceManager,
    options: ReconcileOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        config: &'a ProvisionConfig,
        directory: &'a dyn AccountDirectory,
        fs: &'a dyn Filesystem,
        service: &'a dyn ServiceManager,
    ) -> Self {
        Self {
            config,
            directory,
            fs,
            service,
            options: ReconcileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    /// Load the manifest at `path` and reconcile it
    pub fn reconcile_path<O: ReconcileObserver>(
        &self,
        path: &Path,
        observer: &mut O,
    ) -> Result<ReconcileSummary> {
        let intents = manifest::load_path(path)?;
        log::info!("Loaded {} records from {}", intents.len(), path.display());
        self.reconcile(&intents, observer)
    }

    /// Reconcile already-decoded records, in order
    pub fn reconcile<O: ReconcileObserver>(
        &self,
        intents: &[UserIntent],
        observer: &mut O,
    ) -> Result<ReconcileSummary> {
        let provisioner = AccountProvisioner::new(self.config, self.directory, self.fs);
        let policy = PolicyWriter::new(self.config, self.fs);
        let mut summary = ReconcileSummary::default();

        observer.on_start(intents.len());

        for intent in intents {
            if !intent.state.is_present() {
                log::debug!("{}: state is {}, leaving alone", intent.username, intent.state);
                summary.ignored += 1;
                observer.on_ignored(intent);
                continue;
            }

            if self.directory.exists(&intent.username)? {
                log::debug!("{}: account exists, skipping", intent.username);
                summary.existing += 1;
                observer.on_existing(intent);
                continue;
            }

            if self.options.dry_run {
                let mut actions = provisioner.plan(intent);
                actions.extend(policy.plan(intent));
                summary.planned += 1;
                observer.on_planned(intent, &actions);
                continue;
            }

            provisioner.provision(intent)?;
            let policy_file = policy.write_policy(intent)?;

            log::info!("Provisioned {} (id {})", intent.username, intent.id);
            summary.provisioned += 1;
            observer.on_provisioned(intent, &policy_file);
        }

        if self.options.dry_run {
            log::info!("Dry run, not reloading the service manager");
            return Ok(summary);
        }

        self.service.reload()?;
        summary.reloaded = true;
        observer.on_reloaded();

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{DirectoryOp, MockDirectory};
    use crate::error::{ProvisionStep, ReconcileError};
    use crate::fs::MemoryFilesystem;
    use crate::service::MockServiceManager;
    use crate::types::DesiredState;
    use std::io::Write;

    const ALICE_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIK0wmN/Cr3JXqmLW7u+g9pTh+wyqDHpSQEIQczXkVx9q alice@example.org";

    struct Harness {
        config: ProvisionConfig,
        directory: MockDirectory,
        fs: MemoryFilesystem,
        service: MockServiceManager,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                config: ProvisionConfig::default(),
                directory: MockDirectory::new(),
                fs: MemoryFilesystem::new().with_dir("/home"),
                service: MockServiceManager::new(),
            }
        }

        fn reconciler(&self) -> Reconciler<'_> {
            Reconciler::new(&self.config, &self.directory, &self.fs, &self.service)
        }

        fn run(&self, intents: &[UserIntent]) -> Result<ReconcileSummary> {
            self.reconciler().reconcile(intents, &mut NoObserver)
        }
    }

    /// Records observer callbacks as strings
    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl ReconcileObserver for Recorder {
        fn on_start(&mut self, total: usize) {
            self.0.push(format!("start {total}"));
        }
        fn on_ignored(&mut self, intent: &UserIntent) {
            self.0.push(format!("ignored {}", intent.username));
        }
        fn on_existing(&mut self, intent: &UserIntent) {
            self.0.push(format!("existing {}", intent.username));
        }
        fn on_planned(&mut self, intent: &UserIntent, actions: &[PlannedAction]) {
            self.0.push(format!("planned {} ({})", intent.username, actions.len()));
        }
        fn on_provisioned(&mut self, intent: &UserIntent, policy: &Path) {
            self.0.push(format!("provisioned {} {}", intent.username, policy.display()));
        }
        fn on_reloaded(&mut self) {
            self.0.push("reloaded".to_string());
        }
    }

    fn alice() -> UserIntent {
        UserIntent::present("alice", 2001)
            .with_public_key(ALICE_KEY)
            .with_resource_limits("MemoryMax=2G")
    }

    #[test]
    fn test_empty_manifest_still_reloads() {
        let h = Harness::new();
        let summary = h.run(&[]).unwrap();

        assert!(summary.reloaded);
        assert_eq!(summary.total(), 0);
        assert_eq!(h.service.reloads(), 1);
    }

    #[test]
    fn test_only_non_present_records_still_reload() {
        let h = Harness::new();
        let intents = [
            UserIntent::present("x", 1).with_state(DesiredState::Other("absent".into())),
            UserIntent::present("y", 2).with_state(DesiredState::default()),
        ];

        let summary = h.run(&intents).unwrap();
        assert_eq!(summary.ignored, 2);
        assert_eq!(h.service.reloads(), 1);
        assert_eq!(h.directory.mutations(), 0);
        assert_eq!(h.fs.mutations(), 0);
    }

    #[test]
    fn test_provisions_absent_account() {
        let h = Harness::new();
        let summary = h.run(&[alice()]).unwrap();

        assert_eq!(summary.provisioned, 1);
        assert!(summary.has_changes());

        assert_eq!(h.directory.group("alice"), Some(2001));
        let account = &h.directory.accounts()[0];
        assert_eq!(account.uid, 2001);
        assert_eq!(account.home, Path::new("/home/a/alice"));

        let keys = h.fs.entry("/home/a/alice/.ssh/authorized_keys").unwrap();
        assert_eq!(keys.owner, Some((2001, 2001)));
        assert_eq!(
            h.fs.read("/home/a/alice/.ssh/authorized_keys").unwrap(),
            ALICE_KEY.as_bytes()
        );
        assert_eq!(h.fs.entry("/home/a/alice/.ssh").unwrap().owner, Some((2001, 2001)));
        assert_eq!(
            h.fs.read("/etc/systemd/system/user-2001.slice.d/override.conf").unwrap(),
            b"MemoryMax=2G"
        );
        assert_eq!(h.service.reloads(), 1);
    }

    #[test]
    fn test_existing_account_is_untouched() {
        let mut h = Harness::new();
        h.directory = MockDirectory::new().with_user("alice");

        let summary = h.run(&[alice()]).unwrap();

        assert_eq!(summary.existing, 1);
        assert_eq!(summary.provisioned, 0);
        assert_eq!(h.directory.mutations(), 0);
        assert_eq!(h.fs.mutations(), 0);
        assert_eq!(h.service.reloads(), 1);
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let h = Harness::new();
        h.run(&[alice()]).unwrap();
        let mutations = (h.directory.mutations(), h.fs.mutations());

        let summary = h.run(&[alice()]).unwrap();
        assert_eq!(summary.existing, 1);
        assert_eq!((h.directory.mutations(), h.fs.mutations()), mutations);
        assert_eq!(h.service.reloads(), 2);
    }

    #[test]
    fn test_duplicate_username_second_is_skipped() {
        let h = Harness::new();
        let second = UserIntent::present("alice", 3001).with_resource_limits("MemoryMax=8G");

        let summary = h.run(&[alice(), second]).unwrap();

        assert_eq!(summary.provisioned, 1);
        assert_eq!(summary.existing, 1);
        assert_eq!(h.directory.accounts().len(), 1);
        assert_eq!(h.directory.accounts()[0].uid, 2001);
        assert!(h.fs.entry("/etc/systemd/system/user-3001.slice.d").is_none());
    }

    #[test]
    fn test_account_failure_aborts_run() {
        let h = Harness::new();
        h.directory.fail(DirectoryOp::CreateAccount, "bob");
        let intents = [
            UserIntent::present("amy", 1000),
            UserIntent::present("bob", 1001),
            UserIntent::present("cat", 1002),
        ];

        let err = h.run(&intents).unwrap_err();
        match &err {
            ReconcileError::Provision(e) => {
                assert_eq!(e.username, "bob");
                assert_eq!(e.step, ProvisionStep::CreateAccount);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.username(), Some("bob"));

        // Earlier work stays, bob's group stays, cat is never reached
        assert!(h.directory.exists("amy").unwrap());
        assert_eq!(h.directory.group("bob"), Some(1001));
        assert_eq!(h.directory.group("cat"), None);
        assert!(h.fs.is_dir("/etc/systemd/system/user-1000.slice.d"));
        assert!(!h.fs.is_dir("/etc/systemd/system/user-1001.slice.d"));
        assert_eq!(h.service.reloads(), 0);
    }

    #[test]
    fn test_half_created_group_fails_on_rerun() {
        let h = Harness::new();
        h.directory.fail(DirectoryOp::CreateAccount, "bob");
        assert!(h.run(&[UserIntent::present("bob", 1001)]).is_err());

        // The account is still absent, so the rerun tries again and trips on the group
        let err = h.run(&[UserIntent::present("bob", 1001)]).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Provision(ref e) if e.step == ProvisionStep::CreateGroup
        ));
        assert_eq!(h.service.reloads(), 0);
    }

    #[test]
    fn test_lookup_failure_is_fatal() {
        let h = Harness::new();
        h.directory.fail(DirectoryOp::Lookup, "alice");

        let err = h.run(&[alice()]).unwrap_err();
        assert!(matches!(err, ReconcileError::Lookup(_)));
        assert_eq!(h.directory.mutations(), 0);
        assert_eq!(h.service.reloads(), 0);
    }

    #[test]
    fn test_lookup_skipped_for_non_present() {
        let h = Harness::new();
        h.directory.fail(DirectoryOp::Lookup, "ghost");
        let ghost = UserIntent::present("ghost", 9).with_state(DesiredState::Other("absent".into()));

        assert!(h.run(&[ghost]).is_ok());
    }

    #[test]
    fn test_policy_failure_is_fatal() {
        let h = Harness::new();
        h.fs.fail_on("/etc/systemd/system/user-2001.slice.d");

        let err = h.run(&[alice(), UserIntent::present("zoe", 2002)]).unwrap_err();
        assert!(matches!(err, ReconcileError::Policy(_)));
        assert!(h.directory.exists("alice").unwrap());
        assert!(!h.directory.exists("zoe").unwrap());
        assert_eq!(h.service.reloads(), 0);
    }

    #[test]
    fn test_reload_failure_is_fatal() {
        let h = Harness::new();
        h.service.set_failing(true);

        let err = h.run(&[alice()]).unwrap_err();
        assert!(matches!(err, ReconcileError::ServiceManager(_)));
        assert!(h.directory.exists("alice").unwrap());
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let mut h = Harness::new();
        h.directory = MockDirectory::new().with_user("bob");
        let intents = [alice(), UserIntent::present("bob", 2)];
        let mut recorder = Recorder::default();

        let summary = h
            .reconciler()
            .with_options(ReconcileOptions { dry_run: true })
            .reconcile(&intents, &mut recorder)
            .unwrap();

        assert_eq!(summary.planned, 1);
        assert_eq!(summary.existing, 1);
        assert!(!summary.reloaded);
        assert_eq!(h.directory.mutations(), 0);
        assert_eq!(h.fs.mutations(), 0);
        assert_eq!(h.service.reloads(), 0);
        // six account steps plus the policy directory and file
        assert_eq!(recorder.0, ["start 2", "planned alice (8)", "existing bob"]);
    }

    #[test]
    fn test_observer_sequence() {
        let h = Harness::new();
        let intents = [
            alice(),
            UserIntent::present("old", 5).with_state(DesiredState::Other("absent".into())),
        ];
        let mut recorder = Recorder::default();

        h.reconciler().reconcile(&intents, &mut recorder).unwrap();
        assert_eq!(
            recorder.0,
            [
                "start 2",
                "provisioned alice /etc/systemd/system/user-2001.slice.d/override.conf",
                "ignored old",
                "reloaded",
            ]
        );
    }

    #[test]
    fn test_reconcile_path_decode_failure_touches_nothing() {
        let h = Harness::new();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(b"[[user]\nusername = alice").unwrap();

        let err = h
            .reconciler()
            .reconcile_path(file.path(), &mut NoObserver)
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Decode(_)));
        assert_eq!(h.directory.mutations(), 0);
        assert_eq!(h.fs.mutations(), 0);
        assert_eq!(h.service.reloads(), 0);
    }

    #[test]
    fn test_reconcile_path_option_like_username_runs_nothing() {
        let h = Harness::new();
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(b"- username: alice\n  id: 2001\n  state: present\n- username: -o\n  id: 2002\n  state: present\n")
            .unwrap();

        let err = h
            .reconciler()
            .reconcile_path(file.path(), &mut NoObserver)
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Decode(_)));
        assert_eq!(h.directory.mutations(), 0);
        assert_eq!(h.service.reloads(), 0);
    }

    #[test]
    fn test_reconcile_path_scenario() {
        let h = Harness::new();
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"[{{"username": "alice", "id": "2001", "public_key": "{ALICE_KEY}", "systemd_limits": "MemoryMax=2G", "state": "present"}}]"#
        )
        .unwrap();

        let summary = h
            .reconciler()
            .reconcile_path(file.path(), &mut NoObserver)
            .unwrap();

        assert_eq!(summary.provisioned, 1);
        assert_eq!(h.directory.group("alice"), Some(2001));
        assert_eq!(
            h.fs.read("/etc/systemd/system/user-2001.slice.d/override.conf").unwrap(),
            b"MemoryMax=2G"
        );
        assert_eq!(h.service.reloads(), 1);
    }
}

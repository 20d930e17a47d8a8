//! Terminal progress reporting for reconciliation runs.

use provision::{PlannedAction, ReconcileObserver, UserIntent};
use std::path::Path;

use crate::ui;

/// Prints one line per manifest record
pub struct TerminalObserver {
    quiet: bool,
    verbose: bool,
    total: usize,
    seen: usize,
}

impl TerminalObserver {
    pub fn new(quiet: bool, verbose: bool) -> Self {
        Self {
            quiet,
            verbose,
            total: 0,
            seen: 0,
        }
    }

    fn next(&mut self, msg: &str) {
        self.seen += 1;
        if !self.quiet {
            ui::step(self.seen, self.total, msg);
        }
    }
}

impl ReconcileObserver for TerminalObserver {
    fn on_start(&mut self, total: usize) {
        self.total = total;
        if !self.quiet {
            ui::header(&format!("Reconciling {} users", total));
        }
    }

    fn on_ignored(&mut self, intent: &UserIntent) {
        self.next(&format!("{} (state {}, ignored)", intent.username, intent.state));
    }

    fn on_existing(&mut self, intent: &UserIntent) {
        self.next(&format!("{} already exists", intent.username));
    }

    fn on_planned(&mut self, intent: &UserIntent, actions: &[PlannedAction]) {
        self.next(&format!("{} would be created", intent.username));
        if !self.quiet {
            for action in actions {
                ui::dim(&action.to_string());
            }
        }
    }

    fn on_provisioned(&mut self, intent: &UserIntent, policy: &Path) {
        self.next(&format!("{} created (id {})", intent.username, intent.id));
        if self.verbose && !self.quiet {
            ui::dim(&format!("policy: {}", policy.display()));
        }
    }

    fn on_reloaded(&mut self) {
        if !self.quiet {
            ui::success("systemd configuration reloaded");
        }
    }
}

//! Console event emitter: progress lines on stderr while a pass runs.

use hisab_core::{EntityReport, SyncStatus};
use hisab_sync::SyncEventEmitter;

pub struct ConsoleEmitter {
    quiet: bool,
}

impl ConsoleEmitter {
    /// A quiet emitter prints nothing; used with `--json`.
    pub fn new(quiet: bool) -> Self {
        ConsoleEmitter { quiet }
    }
}

impl SyncEventEmitter for ConsoleEmitter {
    fn emit_status(&self, status: &SyncStatus) {
        if !self.quiet && status.is_syncing {
            eprintln!("Syncing...");
        }
    }

    fn emit_progress(&self, report: &EntityReport) {
        if self.quiet {
            return;
        }
        if report.skipped {
            eprintln!("  {:<22} skipped", report.kind.plural());
        } else {
            eprintln!(
                "  {:<22} pushed {:>3}  failed {:>3}  deleted {:>3}",
                report.kind.plural(),
                report.synced,
                report.failed,
                report.deleted
            );
        }
    }

    fn emit_error(&self, message: &str) {
        if !self.quiet {
            eprintln!("  ! {}", message);
        }
    }
}

//! The backup, filter, run, restore protocol.
//!
//! A configuration moves `Clean -> Backed` when the live database is backed
//! up and replaced by its filtered view, and `Backed -> Clean` when the
//! backup is copied back and removed. [`BackedGuard`] ties the second
//! transition to scope exit, so it runs whether the external tool succeeds,
//! fails, panics, or returns early.
//!
//! The backup's existence is the only lock. Two processes racing on the
//! same configuration can both see `Clean` before either writes its backup;
//! the exclusive backup create makes the loser fail instead of overwriting,
//! but the window between the check and the load remains.

use std::path::PathBuf;

use crate::error::CompdbError;
use crate::filter::{filter_with_report, FilterReport};
use crate::store::{ArtifactStore, TransformState};

/// Result of a `Clean -> Backed` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The backup was written and the live file filtered.
    Applied(FilterReport),
    /// A backup was already present; nothing was touched.
    AlreadyBacked,
}

/// Result of a `Backed -> Clean` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The original was copied back and the backup removed.
    Restored,
    /// There was no backup; the configuration was already clean.
    AlreadyClean,
}

/// Applies and reverts the generated-file filter for one project.
#[derive(Debug, Clone)]
pub struct GuardedTransform {
    store: ArtifactStore,
    patterns: Vec<String>,
}

impl GuardedTransform {
    /// Creates a transform over `store` hiding files matching `patterns`.
    pub fn new(store: ArtifactStore, patterns: Vec<String>) -> Self {
        Self { store, patterns }
    }

    /// The underlying store.
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// `Clean -> Backed`: backs up the live database and filters it.
    ///
    /// A no-op returning [`ApplyOutcome::AlreadyBacked`] when a backup
    /// exists, so repeating the surrounding workflow never re-filters or
    /// clobbers the original. A missing live database fails with
    /// [`CompdbError::NotFound`] before any backup is written.
    pub fn apply(&self, config: &str) -> Result<ApplyOutcome, CompdbError> {
        if self.store.backup_exists(config) {
            tracing::info!(config, "backup already present, leaving database as is");
            return Ok(ApplyOutcome::AlreadyBacked);
        }

        let original = self.store.load_snapshot(config)?;

        match self.store.write_backup(config, &original.bytes) {
            Ok(()) => {}
            Err(CompdbError::BackupAlreadyExists { .. }) => {
                tracing::info!(config, "backup appeared concurrently, leaving database as is");
                return Ok(ApplyOutcome::AlreadyBacked);
            }
            Err(e) => return Err(e),
        }

        let (filtered, report) = filter_with_report(&original.database, &self.patterns);
        if let Err(e) = self.store.write_live(config, &filtered) {
            // A failed atomic write never replaces the live file, which still
            // holds the original.
            if let Err(undo) = self.store.discard_backup(config) {
                tracing::error!(config, error = %undo, "could not discard backup after failed write");
            }
            return Err(e);
        }

        tracing::info!(
            config,
            before = report.before,
            after = report.after,
            "filtered compile command database"
        );
        Ok(ApplyOutcome::Applied(report))
    }

    /// `Backed -> Clean`, tolerating a configuration that is already clean.
    pub fn restore(&self, config: &str) -> Result<RestoreOutcome, CompdbError> {
        match self.store.restore_from_backup(config) {
            Ok(()) => {
                tracing::info!(config, "restored compile command database");
                Ok(RestoreOutcome::Restored)
            }
            Err(CompdbError::NoBackup { .. }) => Ok(RestoreOutcome::AlreadyClean),
            Err(e) => Err(self.restore_failed(config, e)),
        }
    }

    /// Restores a `Backed` state left behind by an earlier run that died
    /// before its own restore.
    ///
    /// Call at start-up, before [`GuardedTransform::guard`], so a new run
    /// always filters the original database with the current patterns.
    pub fn recover(&self, config: &str) -> Result<RestoreOutcome, CompdbError> {
        if self.store.state(config) == TransformState::Clean {
            return Ok(RestoreOutcome::AlreadyClean);
        }
        tracing::warn!(config, "found stale backup from an interrupted run, restoring");
        self.restore(config)
    }

    /// Applies the transform and returns a guard that restores on drop.
    pub fn guard(&self, config: &str) -> Result<BackedGuard<'_>, CompdbError> {
        let outcome = self.apply(config)?;
        Ok(BackedGuard {
            transform: self,
            config: config.to_string(),
            outcome,
            released: false,
        })
    }

    /// Runs `f` between `Clean -> Backed` and `Backed -> Clean`.
    ///
    /// Restoration runs however `f` exits. `f`'s value is returned only if
    /// restoration succeeded; a failed restore outranks whatever `f`
    /// produced.
    pub fn run<T, F>(&self, config: &str, f: F) -> Result<T, CompdbError>
    where
        F: FnOnce(&BackedGuard<'_>) -> T,
    {
        let guard = self.guard(config)?;
        let value = f(&guard);
        guard.finish()?;
        Ok(value)
    }

    fn release(&self, config: &str) -> Result<(), CompdbError> {
        match self.store.restore_from_backup(config) {
            Ok(()) => {
                tracing::info!(config, "restored compile command database");
                Ok(())
            }
            // The guard saw Backed, so a vanished backup means the original is lost.
            Err(e) => Err(self.restore_failed(config, e)),
        }
    }

    fn restore_failed(&self, config: &str, source: CompdbError) -> CompdbError {
        CompdbError::RestoreFailed {
            path: self.store.live_path(config),
            source: Box::new(source),
        }
    }
}

/// Scoped `Backed` state of one configuration.
///
/// Dropping the guard restores the original database. Prefer
/// [`BackedGuard::finish`], which reports restore failures instead of only
/// logging them.
#[must_use = "dropping the guard restores the database immediately"]
#[derive(Debug)]
pub struct BackedGuard<'a> {
    transform: &'a GuardedTransform,
    config: String,
    outcome: ApplyOutcome,
    released: bool,
}

impl BackedGuard<'_> {
    /// What the apply step did.
    pub fn outcome(&self) -> ApplyOutcome {
        self.outcome
    }

    /// The configuration this guard protects.
    pub fn config(&self) -> &str {
        &self.config
    }

    /// Path of the live (filtered) database to hand to external tools.
    pub fn live_path(&self) -> PathBuf {
        self.transform.store.live_path(&self.config)
    }

    /// `Backed -> Clean`, surfacing any failure.
    pub fn finish(mut self) -> Result<(), CompdbError> {
        self.released = true;
        self.transform.release(&self.config)
    }
}

impl Drop for BackedGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.transform.release(&self.config) {
            tracing::error!(config = %self.config, error = %e, "restore on scope exit failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{InvocationDatabase, InvocationRecord};
    use crate::store::StoreLayout;

    fn setup(files: &[&str]) -> (tempfile::TempDir, GuardedTransform) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), StoreLayout::default());
        let db: InvocationDatabase = files.iter().map(|f| InvocationRecord::new(*f)).collect();
        store.write_live("debug", &db).unwrap();
        let transform = GuardedTransform::new(store, vec!["moc_".to_string()]);
        (dir, transform)
    }

    fn live_files(transform: &GuardedTransform) -> Vec<String> {
        transform
            .store()
            .load("debug")
            .unwrap()
            .iter()
            .map(|r| r.file().to_string())
            .collect()
    }

    #[test]
    fn apply_filters_and_backs_up() {
        let (_dir, t) = setup(&["a.cpp", "moc_b.cpp"]);
        let outcome = t.apply("debug").unwrap();
        assert_eq!(
            outcome,
            ApplyOutcome::Applied(FilterReport {
                before: 2,
                after: 1
            })
        );
        assert_eq!(live_files(&t), vec!["a.cpp"]);
        assert_eq!(t.store().load_backup("debug").unwrap().len(), 2);
    }

    #[test]
    fn second_apply_is_noop() {
        let (_dir, t) = setup(&["a.cpp", "moc_b.cpp"]);
        t.apply("debug").unwrap();
        assert_eq!(t.apply("debug").unwrap(), ApplyOutcome::AlreadyBacked);
        // Backup still holds the unfiltered original.
        assert_eq!(t.store().load_backup("debug").unwrap().len(), 2);
    }

    #[test]
    fn apply_without_database_creates_no_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), StoreLayout::default());
        let t = GuardedTransform::new(store, vec!["moc_".to_string()]);
        let err = t.apply("debug").unwrap_err();
        assert!(matches!(err, CompdbError::NotFound { .. }));
        assert!(!t.store().backup_exists("debug"));
    }

    #[test]
    fn failed_filtered_write_rolls_back_to_clean() {
        let (_dir, t) = setup(&["a.cpp", "moc_b.cpp"]);
        let live = t.store().live_path("debug");
        let before = std::fs::read(&live).unwrap();
        // Occupy the temp name the atomic replace writes through.
        let blocker = live.with_file_name(format!(
            ".compile_commands.json.{}.tmp",
            std::process::id()
        ));
        std::fs::create_dir(&blocker).unwrap();

        let err = t.apply("debug").unwrap_err();

        assert!(matches!(err, CompdbError::Persistence { .. }));
        assert_eq!(std::fs::read(&live).unwrap(), before);
        assert!(!t.store().backup_exists("debug"));
        assert_eq!(t.store().state("debug"), TransformState::Clean);
    }

    #[test]
    fn restore_on_clean_is_benign() {
        let (_dir, t) = setup(&["a.cpp"]);
        assert_eq!(t.restore("debug").unwrap(), RestoreOutcome::AlreadyClean);
    }

    #[test]
    fn finish_restores_original() {
        let (_dir, t) = setup(&["a.cpp", "moc_b.cpp"]);
        let guard = t.guard("debug").unwrap();
        assert_eq!(guard.config(), "debug");
        guard.finish().unwrap();
        assert_eq!(live_files(&t), vec!["a.cpp", "moc_b.cpp"]);
        assert!(!t.store().backup_exists("debug"));
    }

    #[test]
    fn drop_restores_original() {
        let (_dir, t) = setup(&["a.cpp", "moc_b.cpp"]);
        {
            let _guard = t.guard("debug").unwrap();
            assert_eq!(live_files(&t), vec!["a.cpp"]);
        }
        assert_eq!(live_files(&t), vec!["a.cpp", "moc_b.cpp"]);
        assert!(!t.store().backup_exists("debug"));
    }

    #[test]
    fn panic_inside_run_restores_original() {
        let (_dir, t) = setup(&["a.cpp", "moc_b.cpp"]);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            t.run("debug", |_| panic!("tool crashed"))
        }));
        assert!(result.is_err());
        assert_eq!(live_files(&t), vec!["a.cpp", "moc_b.cpp"]);
        assert!(!t.store().backup_exists("debug"));
    }

    #[test]
    fn run_sees_filtered_view_and_returns_value() {
        let (_dir, t) = setup(&["a.cpp", "moc_b.cpp"]);
        let seen = t
            .run("debug", |guard| {
                InvocationDatabase::from_json(&std::fs::read_to_string(guard.live_path()).unwrap())
                    .unwrap()
                    .len()
            })
            .unwrap();
        assert_eq!(seen, 1);
        assert_eq!(live_files(&t).len(), 2);
    }

    #[test]
    fn failed_tool_still_restores() {
        let (_dir, t) = setup(&["a.cpp", "moc_b.cpp"]);
        let result: Result<Result<(), i32>, _> = t.run("debug", |_| Err(1));
        assert_eq!(result.unwrap(), Err(1));
        assert_eq!(live_files(&t), vec!["a.cpp", "moc_b.cpp"]);
        let err = t.store().restore_from_backup("debug").unwrap_err();
        assert!(matches!(err, CompdbError::NoBackup { .. }));
    }

    #[test]
    fn vanished_backup_is_fatal_for_guard() {
        let (_dir, t) = setup(&["a.cpp", "moc_b.cpp"]);
        let guard = t.guard("debug").unwrap();
        std::fs::remove_file(t.store().backup_path("debug")).unwrap();
        let err = guard.finish().unwrap_err();
        assert!(matches!(err, CompdbError::RestoreFailed { .. }));
    }

    #[test]
    fn recover_restores_stale_backup() {
        let (_dir, t) = setup(&["a.cpp", "moc_b.cpp"]);
        t.apply("debug").unwrap();
        // Simulate a process killed mid-run: the guard never ran.
        assert_eq!(t.recover("debug").unwrap(), RestoreOutcome::Restored);
        assert_eq!(live_files(&t), vec!["a.cpp", "moc_b.cpp"]);
        assert_eq!(t.recover("debug").unwrap(), RestoreOutcome::AlreadyClean);
    }

    #[test]
    fn guard_over_existing_backup_still_restores() {
        let (_dir, t) = setup(&["a.cpp", "moc_b.cpp"]);
        t.apply("debug").unwrap();
        let guard = t.guard("debug").unwrap();
        assert_eq!(guard.outcome(), ApplyOutcome::AlreadyBacked);
        guard.finish().unwrap();
        assert_eq!(live_files(&t), vec!["a.cpp", "moc_b.cpp"]);
    }

    #[test]
    fn two_cycles_leave_database_unchanged() {
        let (_dir, t) = setup(&["a.cpp", "moc_b.cpp", "c.cpp"]);
        let before = t.store().load("debug").unwrap();
        t.run("debug", |_| ()).unwrap();
        t.run("debug", |_| ()).unwrap();
        assert_eq!(t.store().load("debug").unwrap(), before);
    }
}

//! Filesystem storage for the live database and its backup.
//!
//! Every configuration (CMake preset) owns a build directory holding the
//! live `compile_commands.json` and, while a transform is active, a backup
//! named by appending a suffix to it. Nothing else in the workspace touches
//! these two files.
//!
//! Writes never leave a half-written file behind: content goes to a sibling
//! temp file, is flushed, and is then moved into place.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use kiln_config::resolve::build_dir_for;
use kiln_config::ProjectConfig;

use crate::database::InvocationDatabase;
use crate::error::CompdbError;

/// Where the database files of a configuration live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    /// Build directory template relative to the root, `{preset}` expanded.
    pub build_dir: String,
    /// File name of the live database.
    pub file_name: String,
    /// Suffix appended to `file_name` for the backup.
    pub backup_suffix: String,
}

impl StoreLayout {
    /// Takes the layout from the `[build]` and `[compdb]` sections.
    pub fn from_config(config: &ProjectConfig) -> Self {
        Self {
            build_dir: config.build.build_dir.clone(),
            file_name: config.compdb.file_name.clone(),
            backup_suffix: config.compdb.backup_suffix.clone(),
        }
    }
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            build_dir: "build-{preset}".to_string(),
            file_name: "compile_commands.json".to_string(),
            backup_suffix: ".backup".to_string(),
        }
    }
}

/// Whether a configuration currently has a transform applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformState {
    /// No backup exists; the live file is the generated original.
    Clean,
    /// A backup exists; the live file holds the filtered view.
    Backed,
}

/// A live database as read from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// The file's exact contents.
    pub bytes: Vec<u8>,
    /// The parsed records.
    pub database: InvocationDatabase,
}

/// Reads and writes the live database and backup of each configuration.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    /// Project root the build directories are relative to.
    root: PathBuf,
    layout: StoreLayout,
}

impl ArtifactStore {
    /// Creates a store rooted at the project directory.
    pub fn new(root: &Path, layout: StoreLayout) -> Self {
        Self {
            root: root.to_path_buf(),
            layout,
        }
    }

    /// Build directory of a configuration.
    pub fn build_dir(&self, config: &str) -> PathBuf {
        self.root.join(build_dir_for(&self.layout.build_dir, config))
    }

    /// Path of the live database of a configuration.
    pub fn live_path(&self, config: &str) -> PathBuf {
        self.build_dir(config).join(&self.layout.file_name)
    }

    /// Path of the backup of a configuration.
    pub fn backup_path(&self, config: &str) -> PathBuf {
        self.build_dir(config).join(format!(
            "{}{}",
            self.layout.file_name, self.layout.backup_suffix
        ))
    }

    /// Whether the live database exists.
    pub fn live_exists(&self, config: &str) -> bool {
        self.live_path(config).is_file()
    }

    /// Whether a backup exists. Has no side effects.
    pub fn backup_exists(&self, config: &str) -> bool {
        self.backup_path(config).exists()
    }

    /// Current transform state, derived from the backup's existence.
    pub fn state(&self, config: &str) -> TransformState {
        if self.backup_exists(config) {
            TransformState::Backed
        } else {
            TransformState::Clean
        }
    }

    /// Loads the live database.
    ///
    /// Fails with [`CompdbError::NotFound`] when the build has not produced
    /// one yet.
    pub fn load(&self, config: &str) -> Result<InvocationDatabase, CompdbError> {
        Ok(self.load_snapshot(config)?.database)
    }

    /// Loads the live database together with the bytes it was parsed from.
    pub fn load_snapshot(&self, config: &str) -> Result<Snapshot, CompdbError> {
        let path = self.live_path(config);
        match fs::read(&path) {
            Ok(bytes) => {
                let database = decode(&bytes, &path)?;
                Ok(Snapshot { bytes, database })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CompdbError::NotFound { path }),
            Err(e) => Err(CompdbError::persistence(path, e)),
        }
    }

    /// Loads the backup, failing with [`CompdbError::NoBackup`] if absent.
    pub fn load_backup(&self, config: &str) -> Result<InvocationDatabase, CompdbError> {
        let path = self.backup_path(config);
        let bytes = read_backup(&path)?;
        decode(&bytes, &path)
    }

    /// Atomically replaces the live database with `db`.
    pub fn write_live(&self, config: &str, db: &InvocationDatabase) -> Result<(), CompdbError> {
        let path = self.live_path(config);
        let bytes = encode(db, &path)?;
        replace_atomically(&path, &bytes)?;
        tracing::debug!(path = %path.display(), records = db.len(), "wrote live database");
        Ok(())
    }

    /// Persists `original` as the backup of a configuration, byte for byte.
    ///
    /// Refuses with [`CompdbError::BackupAlreadyExists`] if one is present:
    /// existence is checked right before writing, and the final link into
    /// place fails rather than overwrite a backup that appeared in between.
    pub fn write_backup(&self, config: &str, original: &[u8]) -> Result<(), CompdbError> {
        let path = self.backup_path(config);
        if path.exists() {
            return Err(CompdbError::BackupAlreadyExists { path });
        }

        let tmp = write_temp(&path, original)?;

        match fs::hard_link(&tmp, &path) {
            Ok(()) => {
                let _ = fs::remove_file(&tmp);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let _ = fs::remove_file(&tmp);
                return Err(CompdbError::BackupAlreadyExists { path });
            }
            Err(_) => {
                // No hard links on this filesystem. Fall back to a checked rename.
                if path.exists() {
                    let _ = fs::remove_file(&tmp);
                    return Err(CompdbError::BackupAlreadyExists { path });
                }
                if let Err(e) = fs::rename(&tmp, &path) {
                    let _ = fs::remove_file(&tmp);
                    return Err(CompdbError::persistence(path, e));
                }
            }
        }
        sync_parent(&path);

        tracing::debug!(path = %path.display(), bytes = original.len(), "wrote backup");
        Ok(())
    }

    /// Deletes the backup without touching the live database.
    ///
    /// Only valid while the live file still holds the original, as after a
    /// failed [`ArtifactStore::write_live`].
    pub fn discard_backup(&self, config: &str) -> Result<(), CompdbError> {
        let path = self.backup_path(config);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CompdbError::persistence(path, e)),
        }
        sync_parent(&path);
        tracing::debug!(path = %path.display(), "discarded backup");
        Ok(())
    }

    /// Copies the backup over the live database, then deletes the backup.
    ///
    /// The live file is replaced atomically before the backup is removed,
    /// so an interruption at any point leaves either the untouched backup
    /// or the finished restore. Rerunning after a crash redoes the copy.
    /// A backup that does not parse is left in place and reported as
    /// [`CompdbError::Malformed`].
    pub fn restore_from_backup(&self, config: &str) -> Result<(), CompdbError> {
        let backup = self.backup_path(config);
        let live = self.live_path(config);

        let bytes = read_backup(&backup)?;
        decode(&bytes, &backup)?;
        replace_atomically(&live, &bytes)?;

        match fs::remove_file(&backup) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CompdbError::persistence(backup, e)),
        }
        sync_parent(&live);

        tracing::debug!(path = %live.display(), "restored live database from backup");
        Ok(())
    }
}

fn read_backup(path: &Path) -> Result<Vec<u8>, CompdbError> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(CompdbError::NoBackup {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(CompdbError::persistence(path, e)),
    }
}

fn decode(bytes: &[u8], path: &Path) -> Result<InvocationDatabase, CompdbError> {
    serde_json::from_slice(bytes).map_err(|e| CompdbError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn encode(db: &InvocationDatabase, path: &Path) -> Result<Vec<u8>, CompdbError> {
    serde_json::to_vec_pretty(db).map_err(|e| CompdbError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Sibling temp path, hidden and tagged with the process id.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}

/// Writes `bytes` to the temp sibling of `path` and flushes it to disk.
fn write_temp(path: &Path, bytes: &[u8]) -> Result<PathBuf, CompdbError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CompdbError::persistence(parent, e))?;
    }

    let tmp = temp_path(path);
    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(CompdbError::persistence(tmp, e));
    }
    Ok(tmp)
}

fn replace_atomically(path: &Path, bytes: &[u8]) -> Result<(), CompdbError> {
    let tmp = write_temp(path, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(CompdbError::persistence(path, e));
    }
    sync_parent(path);
    Ok(())
}

/// Flushes the directory entry of `path`. Best effort: not every platform
/// can open a directory for syncing.
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InvocationRecord;

    fn make_store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), StoreLayout::default());
        (dir, store)
    }

    fn encoded(db: &InvocationDatabase) -> Vec<u8> {
        serde_json::to_vec_pretty(db).unwrap()
    }

    fn sample() -> InvocationDatabase {
        vec![
            InvocationRecord::new("/work/src/a.cpp")
                .with_field("directory", "/work/build-debug")
                .with_field("command", "c++ -c /work/src/a.cpp"),
            InvocationRecord::new("/work/build-debug/moc_b.cpp")
                .with_field("directory", "/work/build-debug"),
        ]
        .into()
    }

    #[test]
    fn paths_follow_layout() {
        let (dir, store) = make_store();
        assert_eq!(
            store.live_path("debug"),
            dir.path().join("build-debug").join("compile_commands.json")
        );
        assert_eq!(
            store.backup_path("release"),
            dir.path()
                .join("build-release")
                .join("compile_commands.json.backup")
        );
    }

    #[test]
    fn custom_layout() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout {
            build_dir: "out/{preset}".to_string(),
            file_name: "cdb.json".to_string(),
            backup_suffix: ".orig".to_string(),
        };
        let store = ArtifactStore::new(dir.path(), layout);
        assert_eq!(
            store.backup_path("ci"),
            dir.path().join("out").join("ci").join("cdb.json.orig")
        );
    }

    #[test]
    fn layout_from_config() {
        let config = kiln_config::load_config_from_str(
            "[project]\nname = \"app\"\n\n[compdb]\nbackup_suffix = \".bak\"\n",
        )
        .unwrap();
        let layout = StoreLayout::from_config(&config);
        assert_eq!(layout.backup_suffix, ".bak");
        assert_eq!(layout.build_dir, "build-{preset}");
    }

    #[test]
    fn write_live_then_load_roundtrip() {
        let (_dir, store) = make_store();
        let db = sample();
        store.write_live("debug", &db).unwrap();
        assert_eq!(store.load("debug").unwrap(), db);
    }

    #[test]
    fn write_live_leaves_no_temp_files() {
        let (_dir, store) = make_store();
        store.write_live("debug", &sample()).unwrap();
        store.write_live("debug", &InvocationDatabase::new()).unwrap();
        let entries: Vec<_> = fs::read_dir(store.build_dir("debug"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("compile_commands.json")]);
    }

    #[test]
    fn load_missing_is_not_found() {
        let (_dir, store) = make_store();
        let err = store.load("debug").unwrap_err();
        assert!(matches!(err, CompdbError::NotFound { .. }));
        assert!(!store.backup_exists("debug"));
    }

    #[test]
    fn load_garbage_is_malformed() {
        let (_dir, store) = make_store();
        fs::create_dir_all(store.build_dir("debug")).unwrap();
        fs::write(store.live_path("debug"), "not json").unwrap();
        let err = store.load("debug").unwrap_err();
        assert!(matches!(err, CompdbError::Malformed { .. }));
    }

    #[test]
    fn fresh_configuration_is_clean() {
        let (_dir, store) = make_store();
        assert!(!store.backup_exists("debug"));
        assert_eq!(store.state("debug"), TransformState::Clean);
    }

    #[test]
    fn write_backup_once() {
        let (_dir, store) = make_store();
        let db = sample();
        store.write_backup("debug", &encoded(&db)).unwrap();
        assert!(store.backup_exists("debug"));
        assert_eq!(store.state("debug"), TransformState::Backed);
        assert_eq!(store.load_backup("debug").unwrap(), db);
    }

    #[test]
    fn second_backup_is_refused_and_first_kept() {
        let (_dir, store) = make_store();
        let original = sample();
        store.write_backup("debug", &encoded(&original)).unwrap();

        let err = store
            .write_backup("debug", b"[]")
            .unwrap_err();
        assert!(matches!(err, CompdbError::BackupAlreadyExists { .. }));
        assert_eq!(store.load_backup("debug").unwrap(), original);
    }

    #[test]
    fn restore_copies_backup_and_removes_it() {
        let (_dir, store) = make_store();
        let original = sample();
        store.write_live("debug", &original).unwrap();
        store.write_backup("debug", &encoded(&original)).unwrap();
        store
            .write_live("debug", &InvocationDatabase::new())
            .unwrap();

        store.restore_from_backup("debug").unwrap();
        assert_eq!(store.load("debug").unwrap(), original);
        assert!(!store.backup_exists("debug"));
    }

    #[test]
    fn restore_is_byte_exact() {
        let (_dir, store) = make_store();
        fs::create_dir_all(store.build_dir("debug")).unwrap();
        // Compact formatting that a re-serialization would not reproduce.
        let raw = r#"[{"file":"a.cpp","directory":"/w"}]"#;
        fs::write(store.backup_path("debug"), raw).unwrap();
        fs::write(store.live_path("debug"), "[]").unwrap();

        store.restore_from_backup("debug").unwrap();
        assert_eq!(fs::read_to_string(store.live_path("debug")).unwrap(), raw);
    }

    #[test]
    fn snapshot_keeps_file_bytes() {
        let (_dir, store) = make_store();
        fs::create_dir_all(store.build_dir("debug")).unwrap();
        let raw = "[\n{\n  \"directory\": \"/w\",\n  \"file\": \"a.cpp\"\n}\n]";
        fs::write(store.live_path("debug"), raw).unwrap();

        let snapshot = store.load_snapshot("debug").unwrap();
        assert_eq!(snapshot.bytes, raw.as_bytes());
        assert_eq!(snapshot.database.records()[0].file(), "a.cpp");
    }

    #[test]
    fn backup_is_written_verbatim() {
        let (_dir, store) = make_store();
        let raw = b"[ {\"file\":\"a.cpp\", \"id\": 123456789012345678901234567890} ]\n";
        store.write_backup("debug", raw).unwrap();
        assert_eq!(fs::read(store.backup_path("debug")).unwrap(), raw);
    }

    #[test]
    fn restore_without_backup_fails() {
        let (_dir, store) = make_store();
        let err = store.restore_from_backup("debug").unwrap_err();
        assert!(matches!(err, CompdbError::NoBackup { .. }));
    }

    #[test]
    fn restore_rerun_after_crash_between_copy_and_delete() {
        let (_dir, store) = make_store();
        let original = sample();
        store.write_backup("debug", &encoded(&original)).unwrap();
        // Copy finished, backup deletion did not happen.
        store.write_live("debug", &original).unwrap();

        store.restore_from_backup("debug").unwrap();
        assert_eq!(store.load("debug").unwrap(), original);
        assert!(!store.backup_exists("debug"));
    }

    #[test]
    fn corrupt_backup_is_kept() {
        let (_dir, store) = make_store();
        store.write_live("debug", &sample()).unwrap();
        fs::write(store.backup_path("debug"), "{truncated").unwrap();

        let err = store.restore_from_backup("debug").unwrap_err();
        assert!(matches!(err, CompdbError::Malformed { .. }));
        assert!(store.backup_exists("debug"));
        assert_eq!(store.load("debug").unwrap(), sample());
    }

    #[test]
    fn discard_backup_keeps_live() {
        let (_dir, store) = make_store();
        store.write_live("debug", &sample()).unwrap();
        store.write_backup("debug", b"[]").unwrap();

        store.discard_backup("debug").unwrap();
        assert!(!store.backup_exists("debug"));
        assert_eq!(store.load("debug").unwrap(), sample());
        store.discard_backup("debug").unwrap();
    }

    #[test]
    fn configurations_are_independent() {
        let (_dir, store) = make_store();
        store.write_backup("debug", &encoded(&sample())).unwrap();
        assert!(store.backup_exists("debug"));
        assert!(!store.backup_exists("release"));
    }
}

//! Removal of generated sources from a database.

use crate::database::{InvocationDatabase, InvocationRecord};

/// Record counts before and after a filter pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterReport {
    /// Records in the input database.
    pub before: usize,
    /// Records that survived.
    pub after: usize,
}

impl FilterReport {
    /// Number of records dropped.
    pub fn removed(&self) -> usize {
        self.before - self.after
    }
}

/// Whether `file` contains any of `patterns` as a substring.
pub fn is_generated<S: AsRef<str>>(file: &str, patterns: &[S]) -> bool {
    patterns.iter().any(|p| file.contains(p.as_ref()))
}

/// Returns the records of `db` whose `file` matches none of `patterns`.
///
/// Matching is unanchored substring containment. Surviving records keep
/// their relative order, so filtering an already filtered database with
/// the same patterns is a no-op.
pub fn filter<S: AsRef<str>>(db: &InvocationDatabase, patterns: &[S]) -> InvocationDatabase {
    if patterns.is_empty() {
        return db.clone();
    }
    db.iter()
        .filter(|record| !is_generated(record.file(), patterns))
        .cloned()
        .collect()
}

/// Like [`filter`], also reporting how many records were dropped.
pub fn filter_with_report<S: AsRef<str>>(
    db: &InvocationDatabase,
    patterns: &[S],
) -> (InvocationDatabase, FilterReport) {
    let filtered = filter(db, patterns);
    let report = FilterReport {
        before: db.len(),
        after: filtered.len(),
    };
    (filtered, report)
}

/// Files of the records [`filter`] would drop, in order.
pub fn generated_files<'a, S: AsRef<str>>(
    db: &'a InvocationDatabase,
    patterns: &'a [S],
) -> impl Iterator<Item = &'a str> + 'a {
    db.iter()
        .map(InvocationRecord::file)
        .filter(move |file| is_generated(file, patterns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_config::DEFAULT_EXCLUDE_PATTERNS;

    fn db(files: &[&str]) -> InvocationDatabase {
        files
            .iter()
            .map(|f| InvocationRecord::new(*f).with_field("directory", "/work/build-debug"))
            .collect()
    }

    fn files(db: &InvocationDatabase) -> Vec<&str> {
        db.iter().map(InvocationRecord::file).collect()
    }

    #[test]
    fn drops_moc_output() {
        let input = db(&["a.cpp", "moc_b.cpp"]);
        let out = filter(&input, &["moc_"]);
        assert_eq!(files(&out), vec!["a.cpp"]);
    }

    #[test]
    fn default_patterns_drop_every_generator() {
        let input = db(&[
            "/work/src/main.cpp",
            "/work/build-debug/app_autogen/mocs_compilation.cpp",
            "/work/build-debug/moc_window.cpp",
            "/work/build-debug/qrc_resources.cpp",
            "/work/build-debug/ui_dialog.cpp",
            "/work/build-debug/app_qmltyperegistrations.cpp",
            "/work/build-debug/.qt/rcc/qmlcache/app_main_qml.cpp",
            "/work/build-debug/.rcc/qrc_qml.cpp",
            "/work/src/window.cpp",
        ]);
        let out = filter(&input, DEFAULT_EXCLUDE_PATTERNS);
        assert_eq!(files(&out), vec!["/work/src/main.cpp", "/work/src/window.cpp"]);
    }

    #[test]
    fn matching_is_unanchored() {
        // "ui_" matches anywhere, including inside ordinary names.
        let input = db(&["src/gui_main.cpp", "src/main.cpp"]);
        let out = filter(&input, &["ui_"]);
        assert_eq!(files(&out), vec!["src/main.cpp"]);
    }

    #[test]
    fn only_file_field_participates() {
        let input: InvocationDatabase = vec![InvocationRecord::new("src/a.cpp")
            .with_field("directory", "/work/moc_dir")
            .with_field("command", "c++ -c moc_a.cpp")]
        .into();
        assert_eq!(filter(&input, &["moc_"]).len(), 1);
    }

    #[test]
    fn empty_patterns_return_input_unchanged() {
        let input = db(&["moc_a.cpp", "b.cpp"]);
        let none: [&str; 0] = [];
        assert_eq!(filter(&input, &none), input);
    }

    #[test]
    fn empty_database_filters_to_empty() {
        let out = filter(&InvocationDatabase::new(), DEFAULT_EXCLUDE_PATTERNS);
        assert!(out.is_empty());
    }

    #[test]
    fn filtering_is_idempotent() {
        let input = db(&["x.cpp", "moc_x.cpp", "y.cpp", "qrc_y.cpp", "z.cpp"]);
        let once = filter(&input, DEFAULT_EXCLUDE_PATTERNS);
        let twice = filter(&once, DEFAULT_EXCLUDE_PATTERNS);
        assert_eq!(once, twice);
    }

    #[test]
    fn surviving_order_is_preserved() {
        let input = db(&["z.cpp", "moc_a.cpp", "m.cpp", "ui_b.cpp", "a.cpp"]);
        let out = filter(&input, DEFAULT_EXCLUDE_PATTERNS);
        assert_eq!(files(&out), vec!["z.cpp", "m.cpp", "a.cpp"]);
    }

    #[test]
    fn opaque_fields_survive_filtering() {
        let input = db(&["a.cpp", "moc_a.cpp"]);
        let out = filter(&input, &["moc_"]);
        assert_eq!(out.records()[0], input.records()[0]);
    }

    #[test]
    fn report_counts() {
        let input = db(&["a.cpp", "moc_a.cpp", "qrc_res.cpp"]);
        let (out, report) = filter_with_report(&input, DEFAULT_EXCLUDE_PATTERNS);
        assert_eq!(out.len(), 1);
        assert_eq!(report, FilterReport { before: 3, after: 1 });
        assert_eq!(report.removed(), 2);
    }

    #[test]
    fn lists_generated_files() {
        let input = db(&["a.cpp", "moc_a.cpp", "b.cpp", "ui_b.cpp"]);
        let patterns = vec!["moc_".to_string(), "ui_".to_string()];
        let generated: Vec<_> = generated_files(&input, &patterns).collect();
        assert_eq!(generated, vec!["moc_a.cpp", "ui_b.cpp"]);
    }
}

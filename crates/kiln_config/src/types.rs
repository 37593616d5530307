//! Configuration types deserialized from `kiln.toml`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Substrings marking files produced by the Qt code generators.
///
/// Autogen markers, moc, rcc, uic, QML type registrations, QML cache and
/// resource containers, in that order.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    "_autogen",
    "moc_",
    "qrc_",
    "ui_",
    "_qmltyperegistrations",
    "qmlcache",
    ".rcc",
];

/// The top-level project configuration parsed from `kiln.toml`.
///
/// Every section except `[project]` is optional and falls back to the
/// defaults the orchestrator has always used.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Core project metadata.
    pub project: ProjectMeta,
    /// Configure/build settings (presets, build directories, job count).
    #[serde(default)]
    pub build: BuildConfig,
    /// Compile-command database handling.
    #[serde(default)]
    pub compdb: CompdbConfig,
    /// `clang-format` settings.
    #[serde(default)]
    pub format: FormatConfig,
    /// `cppcheck` settings.
    #[serde(default)]
    pub cppcheck: CppcheckConfig,
    /// `run-clang-tidy` settings.
    #[serde(default)]
    pub tidy: TidyConfig,
    /// Environment overlay applied to every spawned tool. Entries are
    /// layered over [`default_env`].
    #[serde(default = "default_env", deserialize_with = "deserialize_env")]
    pub env: BTreeMap<String, String>,
}

/// Core project metadata required in every `kiln.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectMeta {
    /// The project name. Also the stem of the built executable.
    pub name: String,
    /// The project version string.
    #[serde(default)]
    pub version: String,
}

/// Build configuration for the CMake preset workflow.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Preset used when a command is given none.
    pub default_preset: String,
    /// Declared presets. Empty means any preset name is accepted.
    pub presets: Vec<String>,
    /// Build directory relative to the project root. `{preset}` is
    /// replaced with the preset name.
    pub build_dir: String,
    /// Parallel job count. `None` means the number of available CPUs.
    pub jobs: Option<usize>,
    /// The configure/build program.
    pub cmake: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            default_preset: "debug".to_string(),
            presets: Vec::new(),
            build_dir: "build-{preset}".to_string(),
            jobs: None,
            cmake: "cmake".to_string(),
        }
    }
}

impl BuildConfig {
    /// Returns the effective parallel job count.
    pub fn effective_jobs(&self) -> usize {
        self.jobs.unwrap_or_else(available_cpus)
    }
}

/// Returns the number of available CPU cores.
fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

/// Compile-command database settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompdbConfig {
    /// File name of the database inside the build directory.
    ///
    /// run-clang-tidy always reads `compile_commands.json`, so `kiln tidy`
    /// refuses any other name.
    pub file_name: String,
    /// Suffix appended to `file_name` for the backup copy.
    pub backup_suffix: String,
    /// Preset whose database the analysis tools read.
    pub analysis_preset: String,
    /// Substrings of `file` entries hidden from the analysis tools.
    ///
    /// Accepts either a single string or a list of strings.
    #[serde(deserialize_with = "deserialize_string_or_vec")]
    pub exclude_patterns: Vec<String>,
}

impl Default for CompdbConfig {
    fn default() -> Self {
        Self {
            file_name: "compile_commands.json".to_string(),
            backup_suffix: ".backup".to_string(),
            analysis_preset: "debug".to_string(),
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// `clang-format` settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FormatConfig {
    /// The formatter program.
    pub program: String,
    /// Directories scanned for sources, relative to the project root.
    #[serde(deserialize_with = "deserialize_string_or_vec")]
    pub source_dirs: Vec<String>,
    /// File extensions (without the dot) that are formatted.
    pub extensions: Vec<String>,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            program: "clang-format".to_string(),
            source_dirs: vec!["src".to_string(), "include".to_string()],
            extensions: vec!["cpp".to_string(), "hpp".to_string()],
        }
    }
}

/// `cppcheck` settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CppcheckConfig {
    /// The cppcheck program.
    pub program: String,
    /// Arguments passed before `--project`.
    pub args: Vec<String>,
    /// Suppressions list, used only when the file exists.
    pub suppressions_file: String,
}

impl Default for CppcheckConfig {
    fn default() -> Self {
        Self {
            program: "cppcheck".to_string(),
            args: [
                "--enable=all",
                "--library=qt",
                "--error-exitcode=1",
                "--file-filter=src/*",
                "--file-filter=include/*",
                "-I",
                "include",
                "--suppress=normalCheckLevelMaxBranches",
                "--suppress=checkersReport",
            ]
            .iter()
            .map(|a| a.to_string())
            .collect(),
            suppressions_file: ".cppcheck_suppressions".to_string(),
        }
    }
}

/// `run-clang-tidy` settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TidyConfig {
    /// Name of the run-clang-tidy script looked up on `PATH`.
    pub program: String,
    /// Interpreter used to launch the script. `None` or an empty string
    /// runs the script directly.
    pub launcher: Option<String>,
    /// clang-tidy configuration file, relative to the project root.
    pub config_file: String,
    /// Regex of headers whose diagnostics are reported.
    pub header_filter: String,
    /// Values passed as `-extra-arg=<value>`.
    pub extra_args: Vec<String>,
}

impl Default for TidyConfig {
    fn default() -> Self {
        let launcher = if cfg!(windows) { "python" } else { "python3" };
        Self {
            program: "run-clang-tidy".to_string(),
            launcher: Some(launcher.to_string()),
            config_file: ".clang-tidy".to_string(),
            header_filter: "/src/.*".to_string(),
            extra_args: vec![
                "-Wno-unknown-argument".to_string(),
                "-std=c++20".to_string(),
                "--target=x86_64-w64-windows-gnu".to_string(),
            ],
        }
    }
}

/// Environment variables forcing colored output from the wrapped tools.
pub fn default_env() -> BTreeMap<String, String> {
    [
        ("CLICOLOR_FORCE", "1"),
        ("GTEST_COLOR", "1"),
        ("PYTEST_ADDOPTS", "--color=yes"),
        ("CMAKE_COLOR_DIAGNOSTICS", "ON"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn deserialize_env<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut env = default_env();
    env.extend(BTreeMap::<String, String>::deserialize(deserializer)?);
    Ok(env)
}

/// Deserializes a field that can be either a single string or a list of strings.
///
/// Allows TOML config to accept both `exclude_patterns = "moc_"` (string) and
/// `exclude_patterns = ["moc_", "qrc_"]` (array of strings).
fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut vec = Vec::new();
            while let Some(val) = seq.next_element::<String>()? {
                vec.push(val);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}

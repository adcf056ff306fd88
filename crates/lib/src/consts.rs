//! Constants shared across the crate.

/// Version of this tool, checked against `project(kiln_version = ...)`.
pub const KILN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the build description file expected in every project directory.
pub const BUILD_FILENAME: &str = "kiln.lua";

/// Default directory (relative to a project root) holding subprojects and wrap files.
pub const DEFAULT_SUBPROJECT_DIR: &str = "subprojects";

/// Extension of wrap files describing where a subproject's sources live.
pub const WRAP_EXTENSION: &str = "wrap";

/// Target names may not start with this prefix; it is reserved for generated targets.
pub const RESERVED_TARGET_PREFIX: &str = "kiln-";

/// Names the backend claims for its own targets.
pub const RESERVED_TARGET_NAMES: &[&str] = &[
  "clean",
  "clean-ctlist",
  "clean-gcno",
  "clean-gcda",
  "coverage",
  "coverage-text",
  "coverage-xml",
  "coverage-html",
  "phony",
  "PHONY",
  "all",
  "test",
  "benchmark",
  "install",
  "uninstall",
  "build.ninja",
  "scan-build",
  "reconfigure",
  "dist",
  "distcheck",
];

/// Version string used when a project or dependency does not declare one.
pub const UNDEFINED_VERSION: &str = "undefined";

/// Length of the subdirectory hash prefix inside target identifiers.
pub const TARGET_ID_HASH_LEN: usize = 7;

/// Private state directory inside the build directory.
pub const PRIVATE_DIRNAME: &str = "kiln-private";

/// Introspection output directory inside the build directory.
pub const INFO_DIRNAME: &str = "kiln-info";

/// Persisted configuration state file, inside [`PRIVATE_DIRNAME`].
pub const COREDATA_FILENAME: &str = "coredata.json";

/// Finished build graph file, inside [`INFO_DIRNAME`].
pub const GRAPH_FILENAME: &str = "graph.json";

/// Default timeout in seconds for `test()` and `benchmark()`.
pub const DEFAULT_TEST_TIMEOUT: i64 = 30;

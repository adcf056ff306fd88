use std::fs;
use std::path::{Path, PathBuf};

use kiln_lib::eval::{EvalError, evaluate_project};
use kiln_lib::graph::BuildGraph;
use kiln_lib::options::EvalOptions;
use tempfile::TempDir;

/// A source tree in a temporary directory, evaluated into `<tmp>/build`.
pub struct Fixture {
  dir: TempDir,
  options: EvalOptions,
}

impl Fixture {
  pub fn new() -> Self {
    Self {
      dir: TempDir::new().unwrap(),
      options: EvalOptions {
        use_pkg_config: false,
        ..EvalOptions::default()
      },
    }
  }

  /// Write `content` to `rel` below the source root, creating parent directories.
  pub fn file(self, rel: &str, content: &str) -> Self {
    let path = self.source().join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
    self
  }

  /// Describe the dependencies "installed" on the system.
  pub fn system_deps(mut self, json: &str) -> Self {
    let path = self.dir.path().join("system-deps.json");
    fs::write(&path, json).unwrap();
    self.options.system_deps = Some(path);
    self
  }

  pub fn defines(mut self, defines: &[&str]) -> Self {
    self.options = self.options.with_defines(defines).unwrap();
    self
  }

  pub fn source(&self) -> PathBuf {
    self.dir.path().join("src")
  }

  pub fn build(&self) -> PathBuf {
    self.dir.path().join("build")
  }

  pub fn evaluate(&self) -> Result<BuildGraph, EvalError> {
    self.evaluate_into(&self.build())
  }

  pub fn evaluate_into(&self, build: &Path) -> Result<BuildGraph, EvalError> {
    evaluate_project(&self.source(), build, self.options.clone())
  }
}

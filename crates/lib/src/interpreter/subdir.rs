use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Interpreter, join_subdir};
use crate::consts::{BUILD_FILENAME, RESERVED_TARGET_PREFIX};
use crate::error::InterpError;
use crate::value::Value;

/// Saved state of a `subdir()` call, handed back to
/// [`Interpreter::leave_subdir`] once the nested build file finished.
#[derive(Debug)]
#[must_use]
pub struct SubdirFrame {
  prev_subdir: String,
  /// Absolute path of the nested build file.
  pub build_file: PathBuf,
}

impl Interpreter {
  /// Validate a `subdir()` call and switch the current directory.
  ///
  /// Returns `None` when an `if_found` handle is not found; the directory is
  /// then skipped.
  pub fn enter_subdir(&mut self, dirname: &str, if_found: &[Value]) -> Result<Option<SubdirFrame>, InterpError> {
    self.require_project("subdir")?;
    if if_found.iter().any(|v| !v.found()) {
      debug!(dir = dirname, "skipping subdir: if_found not satisfied");
      return Ok(None);
    }
    if dirname.contains("..") {
      return Err(InterpError::invalid_args("Subdir contains .."));
    }
    if Path::new(dirname).is_absolute() {
      return Err(InterpError::invalid_args("Subdir argument must be a relative path."));
    }
    let at_root = self.ctx.subdir == self.ctx.root_subdir;
    if at_root && !self.ctx.is_subproject() && dirname == self.ctx.subproject_dir {
      return Err(InterpError::invalid_args(
        "Must not go into subprojects dir with subdir(), use subproject() instead.",
      ));
    }
    if at_root && dirname.starts_with(RESERVED_TARGET_PREFIX) {
      return Err(InterpError::invalid_args(format!(
        "The \"{}\" prefix is reserved and cannot be used for top-level subdir().",
        RESERVED_TARGET_PREFIX
      )));
    }

    let subdir = join_subdir(&self.ctx.subdir, dirname);
    let rel = join_subdir(&subdir, BUILD_FILENAME);
    if self.ctx.processed_buildfiles.contains(&rel) {
      return Err(InterpError::invalid_args(format!(
        "Tried to enter directory \"{}\", which has already been visited.",
        subdir
      )));
    }
    let build_file = self.source_root().join(&rel);
    if !build_file.is_file() {
      return Err(InterpError::invalid_code(format!("Nonexistent build file '{}'", rel)));
    }
    self.ctx.processed_buildfiles.insert(rel.clone());
    self.fragment.add_build_def_file(&rel);
    debug!(dir = %subdir, "entering subdir");
    let prev_subdir = std::mem::replace(&mut self.ctx.subdir, subdir);
    Ok(Some(SubdirFrame { prev_subdir, build_file }))
  }

  /// Restore the directory saved by [`Interpreter::enter_subdir`].
  pub fn leave_subdir(&mut self, frame: SubdirFrame) {
    self.ctx.subdir = frame.prev_subdir;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::declared_interpreter;
  use std::fs;
  use tempfile::TempDir;

  fn make_dir(dir: &TempDir, rel: &str) {
    fs::create_dir_all(dir.path().join(rel)).unwrap();
    fs::write(dir.path().join(rel).join(BUILD_FILENAME), "").unwrap();
  }

  #[test]
  fn enter_and_leave_restores_directory() {
    let dir = TempDir::new().unwrap();
    make_dir(&dir, "src");
    let mut interp = declared_interpreter(dir.path());
    let frame = interp.enter_subdir("src", &[]).unwrap().unwrap();
    assert_eq!(interp.ctx.subdir, "src");
    assert!(frame.build_file.ends_with("src/kiln.lua"));
    interp.leave_subdir(frame);
    assert_eq!(interp.ctx.subdir, "");
    assert!(interp.fragment.build_def_files.contains("src/kiln.lua"));
  }

  #[test]
  fn second_visit_fails() {
    let dir = TempDir::new().unwrap();
    make_dir(&dir, "src");
    let mut interp = declared_interpreter(dir.path());
    let frame = interp.enter_subdir("src", &[]).unwrap().unwrap();
    interp.leave_subdir(frame);
    let err = interp.enter_subdir("src", &[]).unwrap_err();
    assert!(err.to_string().contains("already been visited"));
  }

  #[test]
  fn subprojects_dir_is_off_limits() {
    let dir = TempDir::new().unwrap();
    make_dir(&dir, "subprojects");
    let mut interp = declared_interpreter(dir.path());
    assert!(interp.enter_subdir("subprojects", &[]).is_err());
  }

  #[test]
  fn parent_traversal_and_reserved_prefix_rejected() {
    let dir = TempDir::new().unwrap();
    make_dir(&dir, "kiln-stuff");
    let mut interp = declared_interpreter(dir.path());
    assert!(interp.enter_subdir("../x", &[]).is_err());
    assert!(interp.enter_subdir("kiln-stuff", &[]).is_err());
  }

  #[test]
  fn missing_build_file_fails() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("empty")).unwrap();
    let mut interp = declared_interpreter(dir.path());
    assert!(matches!(interp.enter_subdir("empty", &[]), Err(InterpError::InvalidCode(_))));
  }

  #[test]
  fn if_found_skips_directory() {
    let dir = TempDir::new().unwrap();
    let mut interp = declared_interpreter(dir.path());
    let frame = interp.enter_subdir("whatever", &[Value::Disabler]).unwrap();
    assert!(frame.is_none());
  }
}

//! External programs returned by `find_program()`.

use std::path::PathBuf;

/// A program located on disk, in the source tree, or provided by a subproject.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalProgram {
  pub name: String,
  /// `None` when the program was not found.
  pub path: Option<PathBuf>,
  pub version: Option<String>,
  /// Set when the program is an executable target of a subproject.
  pub subproject: Option<String>,
}

impl ExternalProgram {
  pub fn not_found(name: &str) -> Self {
    Self {
      name: name.to_string(),
      path: None,
      version: None,
      subproject: None,
    }
  }

  pub fn found_at(name: &str, path: PathBuf) -> Self {
    Self {
      name: name.to_string(),
      path: Some(path),
      version: None,
      subproject: None,
    }
  }

  pub fn found(&self) -> bool {
    self.path.is_some()
  }

  pub fn path_string(&self) -> String {
    self
      .path
      .as_ref()
      .map(|p| p.to_string_lossy().into_owned())
      .unwrap_or_default()
  }
}
